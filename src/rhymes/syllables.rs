//! Rough English syllable estimate used to rank rhyme candidates.

use regex::Regex;
use std::sync::LazyLock;

static SILENT_ENDING: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?:[^laeiouy]es|ed|[^laeiouy]e)$").expect("valid regex"));
static LEADING_Y: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^y").expect("valid regex"));
static VOWEL_GROUP: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"[aeiouy]{1,2}").expect("valid regex"));

/// Estimate the number of syllables in `word`. Always at least 1.
pub fn count(word: &str) -> usize {
  let word = word.to_lowercase();
  if word.chars().count() <= 3 {
    return 1;
  }

  let word = SILENT_ENDING.replace(&word, "");
  let word = LEADING_Y.replace(&word, "");

  VOWEL_GROUP.find_iter(&word).count().max(1)
}
