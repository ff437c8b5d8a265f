//! Wire types for the Datamuse words API.

use serde::Deserialize;

/// One candidate from `GET /words?rel_rhy=<word>`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ApiWord {
  pub word: String,
  /// Relevance; absent for some low-ranked results
  #[serde(default)]
  pub score: u64,
  #[serde(rename = "numSyllables")]
  pub num_syllables: Option<u32>,
}
