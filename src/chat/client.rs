use crate::cache::{RemoteError, RemoteSink};
use crate::config::ChatConfig;
use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

#[derive(Debug, Serialize)]
struct ApiChatRequest<'a> {
  message: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiChatResponse {
  reply: Option<String>,
  error: Option<ApiChatError>,
}

/// The proxy sends `{"error": "text"}`; upstream errors arrive as
/// `{"error": {"message": "text"}}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ApiChatError {
  Text(String),
  Detail { message: String },
}

impl ApiChatError {
  fn into_message(self) -> String {
    match self {
      ApiChatError::Text(message) | ApiChatError::Detail { message } => message,
    }
  }
}

/// Client for the chat-completion proxy
#[derive(Clone)]
pub struct ChatClient {
  http: reqwest::Client,
  server_url: Url,
}

impl ChatClient {
  pub fn new(config: &ChatConfig, timeout: Duration) -> Result<Self> {
    let server_url = Url::parse(&config.server_url)
      .map_err(|e| eyre!("Invalid chat server url {}: {}", config.server_url, e))?;

    let http = reqwest::Client::builder()
      .timeout(timeout)
      .user_agent(concat!("localfirst/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { http, server_url })
  }

  /// Send one message and return the assistant's reply
  pub async fn send_message(&self, message: &str) -> Result<String, RemoteError> {
    let response = self
      .http
      .post(self.server_url.clone())
      .json(&ApiChatRequest { message })
      .send()
      .await?;

    let status = response.status();
    match status {
      StatusCode::UNAUTHORIZED => {
        return Err(RemoteError::Unavailable(
          "Invalid API Key or Authentication Failed".to_string(),
        ))
      }
      StatusCode::TOO_MANY_REQUESTS => {
        return Err(RemoteError::Unavailable(
          "429: Too many requests. Rate limit exceeded".to_string(),
        ))
      }
      _ => {}
    }

    let body: Option<ApiChatResponse> = response.json().await.ok();

    if !status.is_success() {
      let detail = body
        .and_then(|b| b.error)
        .map(ApiChatError::into_message)
        .unwrap_or_else(|| status.to_string());
      return Err(RemoteError::Unavailable(format!("Error: {}", detail)));
    }

    body
      .and_then(|b| b.reply)
      .ok_or_else(|| RemoteError::Malformed("chat server response had no reply".to_string()))
  }
}

impl RemoteSink<String> for ChatClient {
  type Reply = String;

  fn submit<'a>(&'a self, message: &'a String) -> BoxFuture<'a, Result<String, RemoteError>> {
    Box::pin(self.send_message(message))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_support::serve_once;

  fn client_for(url: &str) -> ChatClient {
    let config = ChatConfig {
      server_url: url.to_string(),
      ..ChatConfig::default()
    };
    ChatClient::new(&config, Duration::from_secs(5)).unwrap()
  }

  #[tokio::test]
  async fn test_reply_is_returned() {
    let (base, request) = serve_once("200 OK", r#"{"reply":"Hello!"}"#).await;
    let client = client_for(&format!("{base}/chat"));

    let reply = client.send_message("hi there").await.unwrap();
    assert_eq!(reply, "Hello!");

    let request = request.await.unwrap();
    assert!(request.starts_with("POST /chat "));
    assert!(request.ends_with(r#"{"message":"hi there"}"#));
  }

  #[tokio::test]
  async fn test_rate_limit_message() {
    let (base, _request) = serve_once("429 Too Many Requests", "{}").await;
    let err = client_for(&base).send_message("hi").await.unwrap_err();
    assert_eq!(
      err,
      RemoteError::Unavailable("429: Too many requests. Rate limit exceeded".into())
    );
  }

  #[tokio::test]
  async fn test_server_error_surfaces_message() {
    let body = r#"{"error":{"message":"model overloaded"}}"#;
    let (base, _request) = serve_once("500 Internal Server Error", body).await;
    let err = client_for(&base).send_message("hi").await.unwrap_err();
    assert_eq!(err, RemoteError::Unavailable("Error: model overloaded".into()));
  }

  #[tokio::test]
  async fn test_proxy_error_string_surfaces() {
    let body = r#"{"error":"Message is required"}"#;
    let (base, _request) = serve_once("400 Bad Request", body).await;
    let err = client_for(&base).send_message("").await.unwrap_err();
    assert_eq!(err, RemoteError::Unavailable("Error: Message is required".into()));
  }

  #[tokio::test]
  async fn test_success_without_reply_is_malformed() {
    let (base, _request) = serve_once("200 OK", r#"{"other":1}"#).await;
    let err = client_for(&base).send_message("hi").await.unwrap_err();
    assert!(matches!(err, RemoteError::Malformed(_)));
  }
}
