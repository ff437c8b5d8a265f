//! Rhyme client that answers from the suffix table before calling the API.

use color_eyre::Result;

use crate::cache::{CachePolicy, Connectivity, KeyStrategy, LookupCache, Normalizer, Resolution};
use crate::config::Config;

use super::client::RhymeClient;
use super::table::SuffixTable;
use super::Rhymes;

/// Rhyme lookup with transparent table matching and offline support.
#[derive(Clone)]
pub struct CachedRhymeClient {
  cache: LookupCache<Rhymes, SuffixTable, RhymeClient>,
}

impl CachedRhymeClient {
  /// Create a cached rhyme client from configuration.
  ///
  /// Uses the configured table file if any, otherwise the bundled table.
  pub fn new(config: &Config, connectivity: Connectivity) -> Result<Self> {
    let rhymes = &config.rhymes;
    let table = match &rhymes.table {
      Some(path) => SuffixTable::load(path, rhymes.suffix_len)?,
      None => SuffixTable::bundled(rhymes.suffix_len)?,
    };
    let client = RhymeClient::new(rhymes, config.timeout())?;

    Ok(Self::with_parts(table, client, connectivity, Self::policy(config)))
  }

  pub fn with_parts(
    table: SuffixTable,
    client: RhymeClient,
    connectivity: Connectivity,
    policy: CachePolicy<Rhymes>,
  ) -> Self {
    Self {
      cache: LookupCache::new(table, client, connectivity, policy),
    }
  }

  /// Lookup policy for rhymes: letters-only input, suffix keys, no expiry.
  pub fn policy(config: &Config) -> CachePolicy<Rhymes> {
    CachePolicy::new(Rhymes(vec![config.rhymes.fallback.clone()]))
      .with_normalizer(Normalizer::Letters)
      .with_strategy(KeyStrategy::Suffix {
        len: config.rhymes.suffix_len,
      })
      .with_persist_remote(config.rhymes.persist_remote)
      .with_timeout(config.timeout())
  }

  /// Find rhymes for a word.
  pub async fn find_rhymes(&self, word: &str) -> Resolution<Rhymes> {
    self.cache.resolve(word).await
  }
}
