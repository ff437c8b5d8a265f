//! Query normalization and key derivation.

use serde::Deserialize;

use super::error::LookupError;

/// Message returned for queries rejected by [`Normalizer::Letters`].
pub const INVALID_WORD: &str = "Please provide a valid word";

/// How a raw query is cleaned up before lookup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Normalizer {
  /// Trim surrounding whitespace; reject empty input
  #[default]
  Trim,
  /// Trim, then accept only ASCII letters and whitespace
  Letters,
}

impl Normalizer {
  pub fn normalize(&self, query: &str) -> Result<String, LookupError> {
    let trimmed = query.trim();
    match self {
      Normalizer::Trim => {
        if trimmed.is_empty() {
          return Err(LookupError::Validation("Please provide a value".to_string()));
        }
      }
      Normalizer::Letters => {
        let textual = trimmed
          .chars()
          .all(|c| c.is_ascii_alphabetic() || c.is_whitespace());
        if trimmed.is_empty() || !textual {
          return Err(LookupError::Validation(INVALID_WORD.to_string()));
        }
      }
    }
    Ok(trimmed.to_string())
  }
}

/// How a lookup key is derived from a normalized query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStrategy {
  /// The whole query, lowercased
  Exact,
  /// The last `len` characters, lowercased (the whole query if shorter)
  Suffix { len: usize },
}

impl KeyStrategy {
  pub fn derive_key(&self, normalized: &str) -> String {
    let lowered = normalized.to_lowercase();
    match *self {
      KeyStrategy::Exact => lowered,
      KeyStrategy::Suffix { len } => suffix(&lowered, len).to_string(),
    }
  }
}

/// Last `len` characters of `s`, respecting char boundaries.
pub fn suffix(s: &str, len: usize) -> &str {
  let count = s.chars().count();
  if count <= len {
    return s;
  }
  let start = s
    .char_indices()
    .nth(count - len)
    .map(|(idx, _)| idx)
    .unwrap_or(0);
  &s[start..]
}
