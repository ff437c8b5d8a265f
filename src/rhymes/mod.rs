//! Rhyme lookup: bundled suffix table first, Datamuse API second.

pub mod api_types;
pub mod cached_client;
pub mod client;
pub mod syllables;
pub mod table;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::cache::CacheValue;

pub use cached_client::CachedRhymeClient;
pub use client::RhymeClient;
pub use table::{RhymeRecord, SuffixTable};

/// Ranked list of rhyming words.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rhymes(pub Vec<String>);

impl CacheValue for Rhymes {
  fn namespace() -> &'static str {
    "rhymes"
  }
}

impl fmt::Display for Rhymes {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, word) in self.0.iter().enumerate() {
      writeln!(f, "{:>2}. {}", i + 1, word)?;
    }
    Ok(())
  }
}
