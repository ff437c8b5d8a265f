//! Core traits and types for the caching system.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;

use super::error::LookupError;

/// Trait for values that can be held in a local store.
///
/// The namespace keeps different value types apart when they share one
/// backing store (e.g. rhymes and weather in the same SQLite file).
pub trait CacheValue: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
  /// Storage namespace for this value type (e.g., "rhymes", "weather")
  fn namespace() -> &'static str;
}

/// A single stored value with the time it was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<V> {
  /// Derived lookup key (exact or suffix, depending on strategy)
  pub key: String,
  /// Normalized query the key was derived from, when known
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub query: Option<String>,
  pub value: V,
  pub stored_at: DateTime<Utc>,
}

impl<V> CacheEntry<V> {
  /// Create an entry stamped with the current time.
  pub fn new(key: impl Into<String>, value: V) -> Self {
    Self {
      key: key.into(),
      query: None,
      value,
      stored_at: Utc::now(),
    }
  }

  /// Remember the query this entry answers.
  pub fn with_query(mut self, query: impl Into<String>) -> Self {
    self.query = Some(query.into());
    self
  }
}

/// Result of resolving a query, including data and metadata about the source.
///
/// A resolution always carries a value: when neither source could answer,
/// `value` is the caller's fallback sentinel and `error` says why.
#[derive(Debug, Clone)]
pub struct Resolution<V> {
  /// The resolved value, or the fallback sentinel
  pub value: V,
  /// Where the value came from
  pub provenance: Provenance,
  /// When the value was stored (local hits only)
  pub stored_at: Option<DateTime<Utc>>,
  /// Why no real answer was available (`Provenance::None` only)
  pub error: Option<LookupError>,
}

impl<V> Resolution<V> {
  /// Create a resolution served from the local store.
  pub fn local(value: V, stored_at: DateTime<Utc>) -> Self {
    Self {
      value,
      provenance: Provenance::Local,
      stored_at: Some(stored_at),
      error: None,
    }
  }

  /// Create a resolution from fresh remote data.
  pub fn remote(value: V) -> Self {
    Self {
      value,
      provenance: Provenance::Remote,
      stored_at: None,
      error: None,
    }
  }

  /// Create a resolution carrying the fallback sentinel.
  pub fn fallback(value: V, error: LookupError) -> Self {
    Self {
      value,
      provenance: Provenance::None,
      stored_at: None,
      error: Some(error),
    }
  }

  pub fn is_resolved(&self) -> bool {
    self.provenance != Provenance::None
  }
}

/// Indicates where a resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
  /// Fresh entry in the local store
  Local,
  /// Fetched from the remote source
  Remote,
  /// Neither source answered; the value is the fallback sentinel
  None,
}

impl fmt::Display for Provenance {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Provenance::Local => f.write_str("local"),
      Provenance::Remote => f.write_str("remote"),
      Provenance::None => f.write_str("none"),
    }
  }
}
