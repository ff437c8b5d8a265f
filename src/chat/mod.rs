//! Chat with a completion proxy; messages typed while offline are queued.

pub mod client;
pub mod session;

pub use client::ChatClient;
pub use session::{ChatNotice, ChatSession};
