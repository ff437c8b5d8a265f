//! Weather client that serves recent observations from SQLite.

use color_eyre::Result;
use std::sync::Arc;

use crate::cache::{CachePolicy, Connectivity, LookupCache, Resolution, SqliteStorage};
use crate::config::Config;

use super::client::WeatherClient;
use super::Conditions;

/// Weather lookup with transparent caching and offline support.
#[derive(Clone)]
pub struct CachedWeatherClient {
  cache: LookupCache<Conditions, SqliteStorage, WeatherClient>,
}

impl CachedWeatherClient {
  /// Create a cached weather client on top of a shared database.
  pub fn new(config: &Config, storage: Arc<SqliteStorage>, connectivity: Connectivity) -> Result<Self> {
    let api_key = match Config::get_weather_key() {
      Ok(key) => Some(key),
      Err(e) => {
        tracing::warn!(error = %e, "weather lookups limited to cached data");
        None
      }
    };
    let client = WeatherClient::new(&config.weather, api_key, config.timeout())?;

    Ok(Self::with_parts(storage, client, connectivity, Self::policy(config)?))
  }

  pub fn with_parts(
    storage: Arc<SqliteStorage>,
    client: WeatherClient,
    connectivity: Connectivity,
    policy: CachePolicy<Conditions>,
  ) -> Self {
    Self {
      cache: LookupCache::from_shared(storage, Arc::new(client), connectivity, policy),
    }
  }

  /// Lookup policy for weather: exact lowercase city keys with a lifetime.
  pub fn policy(config: &Config) -> Result<CachePolicy<Conditions>> {
    let policy = CachePolicy::new(Conditions::Unavailable {
      message: config.weather.fallback.clone(),
    })
    .with_ttl(config.weather.ttl()?)
    .with_persist_remote(config.weather.persist_remote)
    .with_timeout(config.timeout());
    Ok(policy)
  }

  /// Get current conditions for a city.
  pub async fn current(&self, city: &str) -> Resolution<Conditions> {
    self.cache.resolve(city).await
  }
}
