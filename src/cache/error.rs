//! Error taxonomy for lookups and submissions.
//!
//! None of these are fatal: the cache turns every one of them into a
//! fallback resolution or a failure notice.

use thiserror::Error;

/// Reason a lookup produced no real answer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
  /// The query was malformed; the message is meant for the end user.
  #[error("{0}")]
  Validation(String),
  /// The local store failed to read; treated as a miss.
  #[error("local store error: {0}")]
  LocalStore(String),
  /// Network failure, timeout or non-success response.
  #[error("remote unavailable: {0}")]
  RemoteUnavailable(String),
  /// The remote answered with an unexpected or empty payload.
  #[error("remote returned no usable data: {0}")]
  RemoteMalformed(String),
  /// No local answer and no connectivity to ask the remote.
  #[error("offline and no local data")]
  Offline,
}

/// Failure reported by a remote source or sink adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
  #[error("{0}")]
  Unavailable(String),
  #[error("{0}")]
  Malformed(String),
}

impl From<RemoteError> for LookupError {
  fn from(err: RemoteError) -> Self {
    match err {
      RemoteError::Unavailable(msg) => LookupError::RemoteUnavailable(msg),
      RemoteError::Malformed(msg) => LookupError::RemoteMalformed(msg),
    }
  }
}

impl From<reqwest::Error> for RemoteError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_decode() {
      RemoteError::Malformed(err.to_string())
    } else {
      RemoteError::Unavailable(err.to_string())
    }
  }
}
