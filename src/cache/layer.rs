//! Cache layer that orchestrates local lookups with remote fetching.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;

use super::connectivity::Connectivity;
use super::error::{LookupError, RemoteError};
use super::storage::CacheStorage;
use super::strategy::{KeyStrategy, Normalizer};
use super::traits::{CacheEntry, Resolution};

/// Default upper bound on a single remote call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A slow, authoritative source consulted on a local miss.
pub trait RemoteSource<V>: Send + Sync {
  /// Look up the normalized query. Empty or unusable answers must be
  /// reported as [`RemoteError::Malformed`].
  fn query<'a>(&'a self, input: &'a str) -> BoxFuture<'a, Result<V, RemoteError>>;
}

/// Knobs that select one of the lookup variants.
#[derive(Debug, Clone)]
pub struct CachePolicy<V> {
  pub strategy: KeyStrategy,
  pub normalizer: Normalizer,
  /// Entries older than this are treated as absent. `None` never expires.
  pub ttl: Option<chrono::Duration>,
  /// Write remote answers back into the local store
  pub persist_remote: bool,
  pub timeout: Duration,
  /// Returned whenever no real answer is available
  pub fallback: V,
}

impl<V> CachePolicy<V> {
  /// Exact keys, trimmed input, no expiry, remote answers persisted.
  pub fn new(fallback: V) -> Self {
    Self {
      strategy: KeyStrategy::Exact,
      normalizer: Normalizer::Trim,
      ttl: None,
      persist_remote: true,
      timeout: DEFAULT_TIMEOUT,
      fallback,
    }
  }

  pub fn with_strategy(mut self, strategy: KeyStrategy) -> Self {
    self.strategy = strategy;
    self
  }

  pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
    self.normalizer = normalizer;
    self
  }

  pub fn with_ttl(mut self, ttl: chrono::Duration) -> Self {
    self.ttl = Some(ttl);
    self
  }

  pub fn with_persist_remote(mut self, persist: bool) -> Self {
    self.persist_remote = persist;
    self
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }
}

/// Local-first lookup with a remote fallback.
///
/// Each call to [`resolve`](Self::resolve) is independent; the only state
/// shared between queries is the backing store.
pub struct LookupCache<V, S, R> {
  storage: Arc<S>,
  remote: Arc<R>,
  connectivity: Connectivity,
  policy: CachePolicy<V>,
}

impl<V, S, R> LookupCache<V, S, R>
where
  V: Clone + Send + Sync,
  S: CacheStorage<V>,
  R: RemoteSource<V>,
{
  pub fn new(storage: S, remote: R, connectivity: Connectivity, policy: CachePolicy<V>) -> Self {
    Self::from_shared(Arc::new(storage), Arc::new(remote), connectivity, policy)
  }

  /// Build a cache over a store or remote that is also used elsewhere.
  pub fn from_shared(
    storage: Arc<S>,
    remote: Arc<R>,
    connectivity: Connectivity,
    policy: CachePolicy<V>,
  ) -> Self {
    Self {
      storage,
      remote,
      connectivity,
      policy,
    }
  }

  pub fn policy(&self) -> &CachePolicy<V> {
    &self.policy
  }

  /// Check if an entry written at `stored_at` may still be served.
  fn is_fresh(&self, stored_at: DateTime<Utc>) -> bool {
    match self.policy.ttl {
      Some(ttl) => Utc::now() - stored_at < ttl,
      None => true,
    }
  }

  fn fallback(&self, error: LookupError) -> Resolution<V> {
    Resolution::fallback(self.policy.fallback.clone(), error)
  }

  /// Resolve a query to a value.
  ///
  /// 1. Normalize; invalid input yields the fallback
  /// 2. Fresh local entry: return it without touching the remote
  /// 3. Offline: return the fallback
  /// 4. Ask the remote; persist and return its answer, or the fallback
  ///
  /// Never fails: every error degrades to the fallback sentinel.
  pub async fn resolve(&self, query: &str) -> Resolution<V> {
    let normalized = match self.policy.normalizer.normalize(query) {
      Ok(n) => n,
      Err(e) => {
        tracing::debug!(query, "rejected query");
        return self.fallback(e);
      }
    };
    let key = self.policy.strategy.derive_key(&normalized);

    match self.storage.get_entry(&key) {
      Ok(Some(entry)) if self.is_fresh(entry.stored_at) => {
        tracing::debug!(%key, "local hit");
        return Resolution::local(entry.value, entry.stored_at);
      }
      Ok(Some(_)) => tracing::debug!(%key, "local entry expired"),
      Ok(None) => tracing::debug!(%key, "local miss"),
      Err(e) => tracing::warn!(%key, error = %e, "local store read failed, treating as miss"),
    }

    if !self.connectivity.is_online() {
      tracing::info!(%key, "offline with no local data");
      return self.fallback(LookupError::Offline);
    }

    let outcome = match tokio::time::timeout(self.policy.timeout, self.remote.query(&normalized)).await {
      Ok(outcome) => outcome,
      Err(_) => Err(RemoteError::Unavailable(format!(
        "no response within {:?}",
        self.policy.timeout
      ))),
    };

    match outcome {
      Ok(value) => {
        if self.policy.persist_remote {
          let entry = CacheEntry::new(key.clone(), value.clone()).with_query(normalized.as_str());
          if let Err(e) = self.storage.put_entry(&entry) {
            tracing::warn!(%key, error = %e, "failed to store remote answer");
          }
        }
        tracing::debug!(%key, "remote answer");
        Resolution::remote(value)
      }
      Err(e) => {
        tracing::warn!(%key, error = %e, "remote lookup failed");
        self.fallback(e.into())
      }
    }
  }
}

impl<V: Clone, S, R> Clone for LookupCache<V, S, R> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      remote: Arc::clone(&self.remote),
      connectivity: self.connectivity.clone(),
      policy: self.policy.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::storage::MemoryStorage;
  use crate::cache::strategy::INVALID_WORD;
  use crate::cache::traits::Provenance;
  use color_eyre::eyre::eyre;
  use std::sync::atomic::{AtomicUsize, Ordering};

  type Words = Vec<String>;

  fn words(list: &[&str]) -> Words {
    list.iter().map(|s| s.to_string()).collect()
  }

  /// Remote that counts calls and replays a canned answer.
  struct FakeRemote {
    calls: Arc<AtomicUsize>,
    reply: Result<Words, RemoteError>,
    delay: Option<Duration>,
    go_offline: Option<Connectivity>,
  }

  impl FakeRemote {
    fn answering(reply: Result<Words, RemoteError>) -> (Self, Arc<AtomicUsize>) {
      let calls = Arc::new(AtomicUsize::new(0));
      let remote = Self {
        calls: calls.clone(),
        reply,
        delay: None,
        go_offline: None,
      };
      (remote, calls)
    }
  }

  impl RemoteSource<Words> for FakeRemote {
    fn query<'a>(&'a self, _input: &'a str) -> BoxFuture<'a, Result<Words, RemoteError>> {
      Box::pin(async move {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(conn) = &self.go_offline {
          conn.set_online(false);
        }
        if let Some(delay) = self.delay {
          tokio::time::sleep(delay).await;
        }
        self.reply.clone()
      })
    }
  }

  struct BrokenStorage;

  impl CacheStorage<Words> for BrokenStorage {
    fn get_entry(&self, _key: &str) -> color_eyre::Result<Option<CacheEntry<Words>>> {
      Err(eyre!("disk on fire"))
    }

    fn put_entry(&self, _entry: &CacheEntry<Words>) -> color_eyre::Result<()> {
      Err(eyre!("disk on fire"))
    }
  }

  fn fallback() -> Words {
    words(&["no matching words found"])
  }

  fn cache_with(
    storage: MemoryStorage<Words>,
    remote: FakeRemote,
    online: bool,
  ) -> LookupCache<Words, MemoryStorage<Words>, FakeRemote> {
    LookupCache::new(
      storage,
      remote,
      Connectivity::new(online),
      CachePolicy::new(fallback()),
    )
  }

  #[tokio::test]
  async fn test_fresh_local_hit_skips_remote() {
    let storage = MemoryStorage::new();
    storage
      .put_entry(&CacheEntry::new("paris", words(&["sunny"])))
      .unwrap();
    let (remote, calls) = FakeRemote::answering(Ok(words(&["rainy"])));
    let cache = cache_with(storage, remote, true);

    let r = cache.resolve("  Paris ").await;
    assert_eq!(r.provenance, Provenance::Local);
    assert_eq!(r.value, words(&["sunny"]));
    assert!(r.stored_at.is_some());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_remote_answer_is_served_locally_next_time() {
    let (remote, calls) = FakeRemote::answering(Ok(words(&["light", "sight"])));
    let cache = cache_with(MemoryStorage::new(), remote, true);

    let first = cache.resolve("night").await;
    assert_eq!(first.provenance, Provenance::Remote);
    assert_eq!(first.value, words(&["light", "sight"]));

    let second = cache.resolve("NIGHT").await;
    assert_eq!(second.provenance, Provenance::Local);
    assert_eq!(second.value, words(&["light", "sight"]));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_persisted_entry_remembers_query() {
    let storage = Arc::new(MemoryStorage::new());
    let (remote, _calls) = FakeRemote::answering(Ok(words(&["tragic"])));
    let cache = LookupCache::from_shared(
      storage.clone(),
      Arc::new(remote),
      Connectivity::online(),
      CachePolicy::new(fallback()).with_strategy(KeyStrategy::Suffix { len: 3 }),
    );

    cache.resolve(" magic ").await;
    let entry = storage.get_entry("gic").unwrap().unwrap();
    assert_eq!(entry.query.as_deref(), Some("magic"));
  }

  #[tokio::test]
  async fn test_offline_miss_returns_fallback_without_remote() {
    let (remote, calls) = FakeRemote::answering(Ok(words(&["x"])));
    let cache = cache_with(MemoryStorage::new(), remote, false);

    let r = cache.resolve("night").await;
    assert_eq!(r.provenance, Provenance::None);
    assert_eq!(r.value, fallback());
    assert_eq!(r.error, Some(LookupError::Offline));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_offline_still_serves_fresh_local() {
    let storage = MemoryStorage::new();
    storage
      .put_entry(&CacheEntry::new("night", words(&["light"])))
      .unwrap();
    let (remote, _) = FakeRemote::answering(Ok(words(&["x"])));
    let cache = cache_with(storage, remote, false);

    assert_eq!(cache.resolve("night").await.provenance, Provenance::Local);
  }

  #[tokio::test]
  async fn test_expired_entry_goes_to_remote() {
    let storage = MemoryStorage::new();
    let mut stale = CacheEntry::new("paris", words(&["old"]));
    stale.stored_at = Utc::now() - chrono::Duration::minutes(30) - chrono::Duration::seconds(1);
    storage.put_entry(&stale).unwrap();

    let (remote, calls) = FakeRemote::answering(Ok(words(&["new"])));
    let cache = LookupCache::new(
      storage,
      remote,
      Connectivity::online(),
      CachePolicy::new(fallback()).with_ttl(chrono::Duration::minutes(30)),
    );

    let r = cache.resolve("paris").await;
    assert_eq!(r.provenance, Provenance::Remote);
    assert_eq!(r.value, words(&["new"]));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // The replacement is fresh
    assert_eq!(cache.resolve("paris").await.provenance, Provenance::Local);
  }

  #[tokio::test]
  async fn test_entry_within_ttl_is_local() {
    let storage = MemoryStorage::new();
    let mut entry = CacheEntry::new("paris", words(&["recent"]));
    entry.stored_at = Utc::now() - chrono::Duration::minutes(29);
    storage.put_entry(&entry).unwrap();

    let (remote, calls) = FakeRemote::answering(Ok(words(&["new"])));
    let cache = LookupCache::new(
      storage,
      remote,
      Connectivity::online(),
      CachePolicy::new(fallback()).with_ttl(chrono::Duration::minutes(30)),
    );

    assert_eq!(cache.resolve("paris").await.provenance, Provenance::Local);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_expired_entry_offline_is_fallback() {
    let storage = MemoryStorage::new();
    let mut stale = CacheEntry::new("paris", words(&["old"]));
    stale.stored_at = Utc::now() - chrono::Duration::hours(1);
    storage.put_entry(&stale).unwrap();

    let (remote, _) = FakeRemote::answering(Ok(words(&["new"])));
    let cache = LookupCache::new(
      storage,
      remote,
      Connectivity::offline(),
      CachePolicy::new(fallback()).with_ttl(chrono::Duration::minutes(30)),
    );

    let r = cache.resolve("paris").await;
    assert_eq!(r.provenance, Provenance::None);
    assert_eq!(r.value, fallback());
  }

  #[tokio::test]
  async fn test_remote_failure_returns_fallback() {
    let (remote, _) =
      FakeRemote::answering(Err(RemoteError::Unavailable("connection refused".into())));
    let cache = cache_with(MemoryStorage::new(), remote, true);

    let r = cache.resolve("night").await;
    assert_eq!(r.provenance, Provenance::None);
    assert_eq!(r.value, fallback());
    assert_eq!(
      r.error,
      Some(LookupError::RemoteUnavailable("connection refused".into()))
    );
  }

  #[tokio::test]
  async fn test_malformed_remote_is_not_stored() {
    let storage = Arc::new(MemoryStorage::new());
    let (remote, _) = FakeRemote::answering(Err(RemoteError::Malformed("empty".into())));
    let cache = LookupCache::from_shared(
      storage.clone(),
      Arc::new(remote),
      Connectivity::online(),
      CachePolicy::new(fallback()),
    );

    let r = cache.resolve("night").await;
    assert_eq!(r.error, Some(LookupError::RemoteMalformed("empty".into())));
    assert_eq!(storage.len(), 0);
  }

  #[tokio::test]
  async fn test_slow_remote_times_out() {
    let (mut remote, _) = FakeRemote::answering(Ok(words(&["late"])));
    remote.delay = Some(Duration::from_secs(5));
    let cache = LookupCache::new(
      MemoryStorage::new(),
      remote,
      Connectivity::online(),
      CachePolicy::new(fallback()).with_timeout(Duration::from_millis(20)),
    );

    let r = cache.resolve("night").await;
    assert_eq!(r.provenance, Provenance::None);
    assert!(matches!(r.error, Some(LookupError::RemoteUnavailable(_))));
  }

  #[tokio::test]
  async fn test_persist_off_keeps_asking_remote() {
    let (remote, calls) = FakeRemote::answering(Ok(words(&["light"])));
    let cache = LookupCache::new(
      MemoryStorage::new(),
      remote,
      Connectivity::online(),
      CachePolicy::new(fallback()).with_persist_remote(false),
    );

    assert_eq!(cache.resolve("night").await.provenance, Provenance::Remote);
    assert_eq!(cache.resolve("night").await.provenance, Provenance::Remote);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_invalid_query_never_reaches_remote() {
    let (remote, calls) = FakeRemote::answering(Ok(words(&["x"])));
    let cache = LookupCache::new(
      MemoryStorage::new(),
      remote,
      Connectivity::online(),
      CachePolicy::new(fallback()).with_normalizer(Normalizer::Letters),
    );

    let r = cache.resolve("n1ght").await;
    assert_eq!(r.provenance, Provenance::None);
    assert_eq!(r.value, fallback());
    assert_eq!(r.error, Some(LookupError::Validation(INVALID_WORD.into())));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_store_errors_are_misses() {
    let (remote, calls) = FakeRemote::answering(Ok(words(&["light"])));
    let cache = LookupCache::new(
      BrokenStorage,
      remote,
      Connectivity::online(),
      CachePolicy::new(fallback()),
    );

    let r = cache.resolve("night").await;
    assert_eq!(r.provenance, Provenance::Remote);
    assert_eq!(r.value, words(&["light"]));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_suffix_three_matches_table_entry() {
    let storage = MemoryStorage::new();
    storage
      .put_entry(&CacheEntry::new("ght", words(&["light", "sight"])))
      .unwrap();
    let (remote, calls) = FakeRemote::answering(Ok(words(&["x"])));
    let cache = LookupCache::new(
      storage,
      remote,
      Connectivity::offline(),
      CachePolicy::new(fallback()).with_strategy(KeyStrategy::Suffix { len: 3 }),
    );

    let r = cache.resolve("night").await;
    assert_eq!(r.provenance, Provenance::Local);
    assert_eq!(r.value, words(&["light", "sight"]));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_suffix_two_misses_without_two_letter_entry() {
    let storage = MemoryStorage::new();
    storage
      .put_entry(&CacheEntry::new("ght", words(&["light", "sight"])))
      .unwrap();
    let (remote, _) = FakeRemote::answering(Ok(words(&["x"])));
    let cache = LookupCache::new(
      storage,
      remote,
      Connectivity::offline(),
      CachePolicy::new(fallback()).with_strategy(KeyStrategy::Suffix { len: 2 }),
    );

    let r = cache.resolve("night").await;
    assert_eq!(r.provenance, Provenance::None);
    assert_eq!(r.value, fallback());
  }

  #[tokio::test]
  async fn test_going_offline_does_not_interrupt_remote_call() {
    let conn = Connectivity::online();
    let (mut remote, _) = FakeRemote::answering(Ok(words(&["light"])));
    remote.go_offline = Some(conn.clone());
    let cache = LookupCache::new(
      MemoryStorage::new(),
      remote,
      conn.clone(),
      CachePolicy::new(fallback()),
    );

    let r = cache.resolve("night").await;
    assert_eq!(r.provenance, Provenance::Remote);
    assert!(!conn.is_online());
    // Stored while the call was in flight, so still answerable offline
    assert_eq!(cache.resolve("night").await.provenance, Provenance::Local);
  }
}
