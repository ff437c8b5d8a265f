//! Cache storage traits and their SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::traits::{CacheEntry, CacheValue};

/// Trait for local lookup stores.
///
/// A put with an existing key replaces the entry; stores never hold two
/// entries for one key.
pub trait CacheStorage<V>: Send + Sync {
  /// Get the entry stored under `key`, if any.
  fn get_entry(&self, key: &str) -> Result<Option<CacheEntry<V>>>;

  /// Store an entry, replacing any previous entry with the same key.
  fn put_entry(&self, entry: &CacheEntry<V>) -> Result<()>;
}

/// Trait for persisting a pending-message queue.
///
/// The queue is always saved whole, so a crash between saves leaves either
/// the old or the new queue, never a mix.
pub trait QueueStorage<M>: Send + Sync {
  /// Load the persisted queue, oldest first.
  fn load_queue(&self) -> Result<Vec<M>>;

  /// Replace the persisted queue.
  fn save_queue(&self, messages: &[M]) -> Result<()>;
}

/// Storage implementation that doesn't keep anything.
/// Lookups always miss and queues live only in memory.
pub struct NoopStorage;

impl<V: CacheValue> CacheStorage<V> for NoopStorage {
  fn get_entry(&self, _key: &str) -> Result<Option<CacheEntry<V>>> {
    Ok(None) // Always miss
  }

  fn put_entry(&self, _entry: &CacheEntry<V>) -> Result<()> {
    Ok(()) // Discard
  }
}

impl<M: Send + Sync> QueueStorage<M> for NoopStorage {
  fn load_queue(&self) -> Result<Vec<M>> {
    Ok(Vec::new())
  }

  fn save_queue(&self, _messages: &[M]) -> Result<()> {
    Ok(())
  }
}

/// In-process store, useful when persistence across runs is not wanted.
pub struct MemoryStorage<V> {
  entries: Mutex<HashMap<String, CacheEntry<V>>>,
}

impl<V> MemoryStorage<V> {
  pub fn new() -> Self {
    Self {
      entries: Mutex::new(HashMap::new()),
    }
  }

  pub fn len(&self) -> usize {
    self.entries.lock().map(|e| e.len()).unwrap_or(0)
  }
}

impl<V> Default for MemoryStorage<V> {
  fn default() -> Self {
    Self::new()
  }
}

impl<V: Clone + Send + Sync> CacheStorage<V> for MemoryStorage<V> {
  fn get_entry(&self, key: &str) -> Result<Option<CacheEntry<V>>> {
    let entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(entries.get(key).cloned())
  }

  fn put_entry(&self, entry: &CacheEntry<V>) -> Result<()> {
    let mut entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    entries.insert(entry.key.clone(), entry.clone());
    Ok(())
  }
}

/// A line of the chat transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRecord {
  pub role: String,
  pub content: String,
  pub created_at: DateTime<Utc>,
}

/// SQLite-based storage for lookup entries, pending queues and the chat
/// transcript.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open the storage at the default location.
  pub fn open() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  /// Open (or create) the storage at `path`.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::from_connection(conn)
  }

  /// Open a private in-memory database.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    Ok(crate::config::data_dir()?.join("cache.db"))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }

  /// Append a line to the chat transcript.
  pub fn append_history(&self, role: &str, content: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT INTO chat_history (role, content, created_at) VALUES (?, ?, ?)",
        params![role, content, Utc::now().to_rfc3339()],
      )
      .map_err(|e| eyre!("Failed to append chat history: {}", e))?;

    Ok(())
  }

  /// The most recent `limit` transcript lines, oldest first.
  pub fn history(&self, limit: usize) -> Result<Vec<HistoryRecord>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare(
        "SELECT role, content, created_at FROM chat_history
         ORDER BY id DESC LIMIT ?",
      )
      .map_err(|e| eyre!("Failed to prepare history query: {}", e))?;

    let rows: Vec<(String, String, String)> = stmt
      .query_map(params![limit as i64], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
      })
      .map_err(|e| eyre!("Failed to query history: {}", e))?
      .collect::<rusqlite::Result<_>>()
      .map_err(|e| eyre!("Failed to read history row: {}", e))?;

    let mut records = rows
      .into_iter()
      .map(|(role, content, created_at)| {
        Ok(HistoryRecord {
          role,
          content,
          created_at: parse_datetime(&created_at)?,
        })
      })
      .collect::<Result<Vec<_>>>()?;
    records.reverse();

    Ok(records)
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- Lookup entries (stores serialized JSON)
CREATE TABLE IF NOT EXISTS lookup_cache (
    namespace TEXT NOT NULL,
    key_hash TEXT NOT NULL,
    lookup_key TEXT NOT NULL,
    data BLOB NOT NULL,
    stored_at TEXT NOT NULL,
    PRIMARY KEY (namespace, key_hash)
);

-- Messages waiting for connectivity (preserves order)
CREATE TABLE IF NOT EXISTS pending_queue (
    position INTEGER PRIMARY KEY,
    data BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS chat_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL
);
"#;

impl<V: CacheValue> CacheStorage<V> for SqliteStorage {
  fn get_entry(&self, key: &str) -> Result<Option<CacheEntry<V>>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare(
        "SELECT data, stored_at FROM lookup_cache
         WHERE namespace = ? AND key_hash = ?",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let result: Option<(Vec<u8>, String)> = stmt
      .query_row(params![V::namespace(), key_hash(key)], |row| {
        Ok((row.get(0)?, row.get(1)?))
      })
      .optional()
      .map_err(|e| eyre!("Failed to read entry {}: {}", key, e))?;

    match result {
      Some((data, stored_at)) => {
        let value: V = serde_json::from_slice(&data)
          .map_err(|e| eyre!("Failed to deserialize entry {}: {}", key, e))?;
        Ok(Some(CacheEntry {
          key: key.to_string(),
          query: None,
          value,
          stored_at: parse_datetime(&stored_at)?,
        }))
      }
      None => Ok(None),
    }
  }

  fn put_entry(&self, entry: &CacheEntry<V>) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let data =
      serde_json::to_vec(&entry.value).map_err(|e| eyre!("Failed to serialize entry: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO lookup_cache (namespace, key_hash, lookup_key, data, stored_at)
         VALUES (?, ?, ?, ?, ?)",
        params![
          V::namespace(),
          key_hash(&entry.key),
          entry.key,
          data,
          entry.stored_at.to_rfc3339()
        ],
      )
      .map_err(|e| eyre!("Failed to store entry: {}", e))?;

    Ok(())
  }
}

impl<M: Serialize + DeserializeOwned + Send + Sync> QueueStorage<M> for SqliteStorage {
  fn load_queue(&self) -> Result<Vec<M>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT data FROM pending_queue ORDER BY position")
      .map_err(|e| eyre!("Failed to prepare queue query: {}", e))?;

    let rows: Vec<Vec<u8>> = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to query queue: {}", e))?
      .collect::<rusqlite::Result<_>>()
      .map_err(|e| eyre!("Failed to read queue row: {}", e))?;

    rows
      .iter()
      .map(|data| {
        serde_json::from_slice(data).map_err(|e| eyre!("Failed to deserialize message: {}", e))
      })
      .collect()
  }

  fn save_queue(&self, messages: &[M]) -> Result<()> {
    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute("DELETE FROM pending_queue", [])
      .map_err(|e| eyre!("Failed to clear queue: {}", e))?;

    for (position, message) in messages.iter().enumerate() {
      let data =
        serde_json::to_vec(message).map_err(|e| eyre!("Failed to serialize message: {}", e))?;
      tx.execute(
        "INSERT INTO pending_queue (position, data) VALUES (?, ?)",
        params![position as i64, data],
      )
      .map_err(|e| eyre!("Failed to store queued message: {}", e))?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }
}

/// SHA256 hash for stable, fixed-length keys.
fn key_hash(key: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(key.as_bytes());
  hex::encode(hasher.finalize())
}

/// Parse an RFC 3339 timestamp written by this module.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Duration;
  use serde::Deserialize;

  #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
  struct Note {
    text: String,
  }

  impl CacheValue for Note {
    fn namespace() -> &'static str {
      "note"
    }
  }

  #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
  struct Other(u32);

  impl CacheValue for Other {
    fn namespace() -> &'static str {
      "other"
    }
  }

  fn note(text: &str) -> Note {
    Note {
      text: text.to_string(),
    }
  }

  #[test]
  fn test_sqlite_put_then_get() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let entry = CacheEntry::new("paris", note("sunny"));
    storage.put_entry(&entry).unwrap();

    let got: CacheEntry<Note> = storage.get_entry("paris").unwrap().unwrap();
    assert_eq!(got.value, note("sunny"));
    assert_eq!(got.key, "paris");
    assert_eq!(got.stored_at, entry.stored_at);
  }

  #[test]
  fn test_sqlite_put_overwrites_same_key() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.put_entry(&CacheEntry::new("k", note("old"))).unwrap();
    storage.put_entry(&CacheEntry::new("k", note("new"))).unwrap();

    let got: CacheEntry<Note> = storage.get_entry("k").unwrap().unwrap();
    assert_eq!(got.value, note("new"));

    let conn = storage.conn.lock().unwrap();
    let count: i64 = conn
      .query_row("SELECT COUNT(*) FROM lookup_cache", [], |row| row.get(0))
      .unwrap();
    assert_eq!(count, 1);
  }

  #[test]
  fn test_sqlite_namespaces_are_separate() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.put_entry(&CacheEntry::new("k", note("a"))).unwrap();

    let other: Option<CacheEntry<Other>> = storage.get_entry("k").unwrap();
    assert!(other.is_none());
  }

  #[test]
  fn test_sqlite_keeps_old_timestamps() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let mut entry = CacheEntry::new("k", note("a"));
    entry.stored_at = Utc::now() - Duration::hours(2);
    storage.put_entry(&entry).unwrap();

    let got: CacheEntry<Note> = storage.get_entry("k").unwrap().unwrap();
    assert_eq!(got.stored_at, entry.stored_at);
  }

  #[test]
  fn test_sqlite_queue_roundtrip_preserves_order() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let queue = vec!["m1".to_string(), "m2".to_string(), "m3".to_string()];
    storage.save_queue(&queue).unwrap();
    assert_eq!(QueueStorage::<String>::load_queue(&storage).unwrap(), queue);

    storage.save_queue(&queue[1..]).unwrap();
    assert_eq!(
      QueueStorage::<String>::load_queue(&storage).unwrap(),
      vec!["m2".to_string(), "m3".to_string()]
    );
  }

  #[test]
  fn test_sqlite_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("cache.db");
    {
      let storage = SqliteStorage::open_at(&path).unwrap();
      storage.put_entry(&CacheEntry::new("k", note("kept"))).unwrap();
      storage.save_queue(&["queued".to_string()]).unwrap();
    }

    let storage = SqliteStorage::open_at(&path).unwrap();
    let got: CacheEntry<Note> = storage.get_entry("k").unwrap().unwrap();
    assert_eq!(got.value, note("kept"));
    assert_eq!(
      QueueStorage::<String>::load_queue(&storage).unwrap(),
      vec!["queued".to_string()]
    );
  }

  #[test]
  fn test_history_is_oldest_first_and_limited() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.append_history("user", "one").unwrap();
    storage.append_history("assistant", "two").unwrap();
    storage.append_history("user", "three").unwrap();

    let lines = storage.history(2).unwrap();
    let contents: Vec<_> = lines.iter().map(|l| l.content.as_str()).collect();
    assert_eq!(contents, vec!["two", "three"]);
    assert_eq!(lines[0].role, "assistant");
  }

  #[test]
  fn test_memory_storage_overwrites() {
    let storage = MemoryStorage::new();
    storage.put_entry(&CacheEntry::new("k", 1)).unwrap();
    storage.put_entry(&CacheEntry::new("k", 2)).unwrap();
    assert_eq!(storage.len(), 1);
    assert_eq!(storage.get_entry("k").unwrap().unwrap().value, 2);
  }

  #[test]
  fn test_noop_storage_always_misses() {
    let storage = NoopStorage;
    CacheStorage::<Note>::put_entry(&storage, &CacheEntry::new("k", note("x"))).unwrap();
    let got: Option<CacheEntry<Note>> = storage.get_entry("k").unwrap();
    assert!(got.is_none());
  }
}
