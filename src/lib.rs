//! Local-first lookups with an online/offline fallback.
//!
//! [`cache`] holds the reusable pieces; [`rhymes`], [`weather`] and [`chat`]
//! wire them to concrete web APIs.

pub mod cache;
pub mod chat;
pub mod config;
pub mod logging;
pub mod rhymes;
pub mod weather;

#[cfg(test)]
mod test_support;
