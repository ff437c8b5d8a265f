//! Generic local-first lookup layer with offline support.
//!
//! This module provides a domain-agnostic caching mechanism that:
//! - Answers from a local store first, keyed exactly or by suffix
//! - Falls back to a remote source when online, optionally persisting the answer
//! - Returns a caller-supplied fallback whenever neither source can answer
//! - Queues outbound messages while offline and drains them in order on reconnect

mod connectivity;
mod error;
mod layer;
mod outbox;
mod storage;
mod strategy;
mod traits;

pub use connectivity::{probe, Connectivity};
pub use error::{LookupError, RemoteError};
pub use layer::{CachePolicy, LookupCache, RemoteSource, DEFAULT_TIMEOUT};
pub use outbox::{FlushReport, Notice, Outbox, RemoteSink, SendOutcome};
pub use storage::{CacheStorage, HistoryRecord, MemoryStorage, NoopStorage, QueueStorage, SqliteStorage};
pub use strategy::{suffix, KeyStrategy, Normalizer, INVALID_WORD};
pub use traits::{CacheEntry, CacheValue, Provenance, Resolution};
