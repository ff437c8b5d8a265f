use crate::cache::{RemoteError, RemoteSource};
use crate::config::RhymesConfig;
use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use std::time::Duration;
use url::Url;

use super::api_types::ApiWord;
use super::syllables;
use super::Rhymes;

/// Datamuse rhyme API client
#[derive(Clone)]
pub struct RhymeClient {
  http: reqwest::Client,
  api_url: Url,
  candidates: usize,
  max_results: usize,
  match_syllables: bool,
}

impl RhymeClient {
  pub fn new(config: &RhymesConfig, timeout: Duration) -> Result<Self> {
    let api_url = Url::parse(&config.api_url)
      .map_err(|e| eyre!("Invalid rhyme API url {}: {}", config.api_url, e))?;

    let http = reqwest::Client::builder()
      .timeout(timeout)
      .user_agent(concat!("localfirst/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      api_url,
      candidates: config.candidates,
      max_results: config.max_results,
      match_syllables: config.match_syllables,
    })
  }

  /// Fetch raw rhyme candidates for a word
  pub async fn fetch_candidates(&self, word: &str) -> Result<Vec<ApiWord>, RemoteError> {
    let mut url = self.api_url.clone();
    url
      .query_pairs_mut()
      .append_pair("rel_rhy", word)
      .append_pair("max", &self.candidates.to_string());

    tracing::debug!(word, "fetching rhymes from API");
    let response = self.http.get(url).send().await?;

    let status = response.status();
    if !status.is_success() {
      return Err(RemoteError::Unavailable(format!(
        "rhyme API returned {}",
        status
      )));
    }

    response
      .json::<Vec<ApiWord>>()
      .await
      .map_err(|e| RemoteError::Malformed(format!("failed to parse rhyme API response: {}", e)))
  }
}

impl RemoteSource<Rhymes> for RhymeClient {
  fn query<'a>(&'a self, input: &'a str) -> BoxFuture<'a, Result<Rhymes, RemoteError>> {
    Box::pin(async move {
      let candidates = self.fetch_candidates(input).await?;
      let ranked = rank_candidates(input, candidates, self.match_syllables, self.max_results);

      if ranked.is_empty() {
        return Err(RemoteError::Malformed(format!(
          "no rhymes with {} syllable(s) for \"{}\"",
          syllables::count(input),
          input
        )));
      }
      Ok(Rhymes(ranked))
    })
  }
}

/// Order candidates by score, best first, keeping at most `max` words.
///
/// With `match_syllables`, candidates whose syllable count differs from the
/// query's are dropped first. The API's own count is used when it sent one.
/// Equal scores keep their API order.
pub fn rank_candidates(
  word: &str,
  mut candidates: Vec<ApiWord>,
  match_syllables: bool,
  max: usize,
) -> Vec<String> {
  if match_syllables {
    let target = syllables::count(word);
    candidates.retain(|c| {
      let n = c
        .num_syllables
        .map(|n| n as usize)
        .unwrap_or_else(|| syllables::count(&c.word));
      n == target
    });
  }

  candidates.sort_by(|a, b| b.score.cmp(&a.score));
  candidates.into_iter().take(max).map(|c| c.word).collect()
}
