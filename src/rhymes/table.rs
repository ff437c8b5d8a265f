//! Static rhyme table matched by word ending.
//!
//! The table is a JSON array of `{ "word": .., "rhymes": [..] }` records.
//! Each record is indexed by the last `suffix_len` letters of its word; when
//! several records share an ending, the first one in the file wins.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::cache::{suffix, CacheEntry, CacheStorage};

use super::Rhymes;

/// Table shipped with the binary, used when no table file is configured.
const BUNDLED_TABLE: &str = include_str!("../../data/rhymes.json");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RhymeRecord {
  pub word: String,
  pub rhymes: Vec<String>,
}

struct TableState {
  records: Vec<RhymeRecord>,
  /// suffix -> index into `records`
  index: HashMap<String, usize>,
}

/// Suffix-keyed rhyme lookup table, optionally backed by a file that
/// receives new entries.
pub struct SuffixTable {
  state: Mutex<TableState>,
  suffix_len: usize,
  path: Option<PathBuf>,
  loaded_at: DateTime<Utc>,
}

impl SuffixTable {
  /// Build a table from records held only in memory.
  pub fn from_records(records: Vec<RhymeRecord>, suffix_len: usize) -> Self {
    let index = build_index(&records, suffix_len);
    Self {
      state: Mutex::new(TableState { records, index }),
      suffix_len,
      path: None,
      loaded_at: Utc::now(),
    }
  }

  /// The table compiled into the binary.
  pub fn bundled(suffix_len: usize) -> Result<Self> {
    let records: Vec<RhymeRecord> = serde_json::from_str(BUNDLED_TABLE)
      .map_err(|e| eyre!("Failed to parse bundled rhyme table: {}", e))?;
    Ok(Self::from_records(records, suffix_len))
  }

  /// Load a table file. A missing file yields an empty table that will be
  /// created on the first write.
  pub fn load(path: &Path, suffix_len: usize) -> Result<Self> {
    let records: Vec<RhymeRecord> = if path.exists() {
      let contents = std::fs::read_to_string(path)
        .map_err(|e| eyre!("Failed to read rhyme table {}: {}", path.display(), e))?;
      serde_json::from_str(&contents)
        .map_err(|e| eyre!("Failed to parse rhyme table {}: {}", path.display(), e))?
    } else {
      tracing::warn!(path = %path.display(), "rhyme table not found, starting empty");
      Vec::new()
    };

    tracing::debug!(path = %path.display(), records = records.len(), "loaded rhyme table");
    let mut table = Self::from_records(records, suffix_len);
    table.path = Some(path.to_path_buf());
    Ok(table)
  }

  pub fn len(&self) -> usize {
    self.state.lock().map(|s| s.records.len()).unwrap_or(0)
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  fn save(&self, records: &[RhymeRecord]) -> Result<()> {
    let Some(path) = &self.path else {
      return Ok(());
    };

    let contents = serde_json::to_string_pretty(records)
      .map_err(|e| eyre!("Failed to serialize rhyme table: {}", e))?;

    // Write next to the target and rename so readers never see a partial file
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, contents)
      .map_err(|e| eyre!("Failed to write rhyme table {}: {}", tmp.display(), e))?;
    std::fs::rename(&tmp, path)
      .map_err(|e| eyre!("Failed to replace rhyme table {}: {}", path.display(), e))?;

    Ok(())
  }
}

fn build_index(records: &[RhymeRecord], suffix_len: usize) -> HashMap<String, usize> {
  let mut index = HashMap::new();
  for (position, record) in records.iter().enumerate() {
    let key = suffix(&record.word.to_lowercase(), suffix_len).to_string();
    index.entry(key).or_insert(position);
  }
  index
}

impl CacheStorage<Rhymes> for SuffixTable {
  fn get_entry(&self, key: &str) -> Result<Option<CacheEntry<Rhymes>>> {
    let state = self
      .state
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let entry = state
      .index
      .get(key)
      .map(|&i| &state.records[i])
      // A record without rhymes carries no answer
      .filter(|record| !record.rhymes.is_empty())
      .map(|record| CacheEntry {
        key: key.to_string(),
        query: Some(record.word.clone()),
        value: Rhymes(record.rhymes.clone()),
        stored_at: self.loaded_at,
      });

    Ok(entry)
  }

  fn put_entry(&self, entry: &CacheEntry<Rhymes>) -> Result<()> {
    let mut state = self
      .state
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    // Keep the full word so the record still matches under a longer suffix
    let record = RhymeRecord {
      word: entry.query.clone().unwrap_or_else(|| entry.key.clone()),
      rhymes: entry.value.0.clone(),
    };
    let key = suffix(&entry.key.to_lowercase(), self.suffix_len).to_string();

    let existing = state.index.get(&key).copied();
    match existing {
      Some(i) => state.records[i] = record,
      None => {
        state.records.push(record);
        let position = state.records.len() - 1;
        state.index.insert(key, position);
      }
    }

    self.save(&state.records)
  }
}
