use crate::cache::{RemoteError, RemoteSource};
use crate::config::WeatherConfig;
use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use reqwest::StatusCode;
use std::time::Duration;
use url::Url;

use super::api_types::ApiCurrentResponse;
use super::{Conditions, Observation};

/// Weatherbit current-conditions client
#[derive(Clone)]
pub struct WeatherClient {
  http: reqwest::Client,
  api_url: Url,
  api_key: Option<String>,
}

impl WeatherClient {
  /// Create a client. Without an API key every query fails as unavailable,
  /// which still lets cached observations be served.
  pub fn new(config: &WeatherConfig, api_key: Option<String>, timeout: Duration) -> Result<Self> {
    let api_url = Url::parse(&config.api_url)
      .map_err(|e| eyre!("Invalid weather API url {}: {}", config.api_url, e))?;

    let http = reqwest::Client::builder()
      .timeout(timeout)
      .user_agent(concat!("localfirst/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      api_url,
      api_key,
    })
  }

  /// Get current conditions for a city
  pub async fn current(&self, city: &str) -> Result<Observation, RemoteError> {
    let key = self
      .api_key
      .as_deref()
      .ok_or_else(|| RemoteError::Unavailable("weather API key not configured".to_string()))?;

    let mut url = self.api_url.clone();
    url
      .query_pairs_mut()
      .append_pair("city", city)
      .append_pair("key", key);

    tracing::debug!(city, "fetching weather from API");
    let response = self.http.get(url).send().await?;

    let status = response.status();
    // Weatherbit answers unknown cities with an empty body
    if status == StatusCode::NO_CONTENT {
      return Err(RemoteError::Malformed("City not found".to_string()));
    }
    if !status.is_success() {
      return Err(RemoteError::Unavailable(format!(
        "weather API returned {}",
        status
      )));
    }

    let body: ApiCurrentResponse = response
      .json()
      .await
      .map_err(|e| RemoteError::Malformed(format!("failed to parse weather API response: {}", e)))?;

    body
      .data
      .into_iter()
      .next()
      .map(|obs| obs.into_observation())
      .ok_or_else(|| RemoteError::Malformed("City not found".to_string()))
  }
}

impl RemoteSource<Conditions> for WeatherClient {
  fn query<'a>(&'a self, input: &'a str) -> BoxFuture<'a, Result<Conditions, RemoteError>> {
    Box::pin(async move { self.current(input).await.map(Conditions::Current) })
  }
}
