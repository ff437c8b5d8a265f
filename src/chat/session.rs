//! Chat session: outbox plus a persisted transcript.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::cache::{
  Connectivity, FlushReport, HistoryRecord, Notice, Outbox, RemoteSink, SendOutcome, SqliteStorage,
};

use super::client::ChatClient;

pub type ChatNotice = Notice<String, String>;

/// Transcript roles
pub const ROLE_USER: &str = "user";
pub const ROLE_ASSISTANT: &str = "assistant";
pub const ROLE_SYSTEM: &str = "system";

/// Sends chat messages through an offline-tolerant outbox and keeps the
/// conversation in SQLite.
pub struct ChatSession<K = ChatClient>
where
  K: RemoteSink<String, Reply = String>,
{
  outbox: Arc<Outbox<String, SqliteStorage, K>>,
  storage: Arc<SqliteStorage>,
}

impl<K> ChatSession<K>
where
  K: RemoteSink<String, Reply = String> + 'static,
{
  pub fn new(
    storage: Arc<SqliteStorage>,
    sink: K,
    connectivity: Connectivity,
  ) -> Result<(Self, mpsc::UnboundedReceiver<ChatNotice>)> {
    let (outbox, notices) = Outbox::new(storage.clone(), sink, connectivity)?;
    let session = Self {
      outbox: Arc::new(outbox),
      storage,
    };
    Ok((session, notices))
  }

  pub fn outbox(&self) -> &Arc<Outbox<String, SqliteStorage, K>> {
    &self.outbox
  }

  /// Send a message, recording it and its outcome in the transcript.
  pub async fn send(&self, message: &str) -> Result<SendOutcome<String>> {
    let message = message.trim();
    if message.is_empty() {
      return Err(eyre!("Message is empty"));
    }

    self.storage.append_history(ROLE_USER, message)?;
    let outcome = self.outbox.send(message.to_string()).await?;

    match &outcome {
      SendOutcome::Delivered(reply) => self.storage.append_history(ROLE_ASSISTANT, reply)?,
      SendOutcome::Failed(e) => self.storage.append_history(ROLE_SYSTEM, &e.to_string())?,
      SendOutcome::Queued => self
        .storage
        .append_history(ROLE_SYSTEM, "Message queued for sending when online")?,
    }

    Ok(outcome)
  }

  /// Drain queued messages now.
  pub async fn flush(&self) -> Result<Option<FlushReport>> {
    self.outbox.flush_pending().await
  }

  /// Record the outcome of a queued message in the transcript.
  ///
  /// `Queued` notices are skipped since [`send`](Self::send) already
  /// recorded them.
  pub fn record_notice(&self, notice: &ChatNotice) -> Result<()> {
    match notice {
      Notice::Queued(_) => Ok(()),
      Notice::Delivered { reply, .. } => self.storage.append_history(ROLE_ASSISTANT, reply),
      Notice::Failed { message, error } => self
        .storage
        .append_history(ROLE_SYSTEM, &format!("Failed to send \"{}\": {}", message, error)),
    }
  }

  pub fn pending(&self) -> Vec<String> {
    self.outbox.pending()
  }

  pub fn history(&self, limit: usize) -> Result<Vec<HistoryRecord>> {
    self.storage.history(limit)
  }
}
