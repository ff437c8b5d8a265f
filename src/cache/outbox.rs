//! Deferred submission queue for messages sent while offline.
//!
//! Messages are delivered at most once: a failed submission is reported on
//! the notice channel and dropped, never re-queued.

use color_eyre::Result;
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::connectivity::Connectivity;
use super::error::RemoteError;
use super::layer::DEFAULT_TIMEOUT;
use super::storage::QueueStorage;

/// Destination for outbound messages.
pub trait RemoteSink<M>: Send + Sync {
  type Reply: Send + 'static;

  fn submit<'a>(&'a self, message: &'a M) -> BoxFuture<'a, Result<Self::Reply, RemoteError>>;
}

/// Side-channel report about a message's fate.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice<M, R> {
  /// Held until connectivity returns
  Queued(M),
  Delivered { message: M, reply: R },
  /// Dropped after a failed submission
  Failed { message: M, error: RemoteError },
}

/// Immediate result of [`Outbox::send`].
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome<R> {
  Delivered(R),
  Failed(RemoteError),
  Queued,
}

/// Counts from one drain of the pending queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
  pub delivered: usize,
  pub failed: usize,
  /// Messages still queued (non-zero when connectivity dropped mid-drain)
  pub remaining: usize,
}

/// Clears the draining flag even if the drain future is dropped.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
  fn drop(&mut self) {
    self.0.store(false, Ordering::Release);
  }
}

/// Outbound queue that submits immediately while online and holds messages
/// while offline.
pub struct Outbox<M, Q, K>
where
  K: RemoteSink<M>,
{
  storage: Arc<Q>,
  sink: Arc<K>,
  connectivity: Connectivity,
  pending: Mutex<VecDeque<M>>,
  draining: AtomicBool,
  notices: mpsc::UnboundedSender<Notice<M, K::Reply>>,
  timeout: Duration,
}

impl<M, Q, K> Outbox<M, Q, K>
where
  M: Clone + Send + Sync + 'static,
  Q: QueueStorage<M> + 'static,
  K: RemoteSink<M> + 'static,
{
  /// Create an outbox, restoring any messages queued by a previous run.
  pub fn new(
    storage: Arc<Q>,
    sink: K,
    connectivity: Connectivity,
  ) -> Result<(Self, mpsc::UnboundedReceiver<Notice<M, K::Reply>>)> {
    let restored = storage.load_queue()?;
    if !restored.is_empty() {
      tracing::info!(count = restored.len(), "restored pending messages");
    }
    let (tx, rx) = mpsc::unbounded_channel();

    let outbox = Self {
      storage,
      sink: Arc::new(sink),
      connectivity,
      pending: Mutex::new(restored.into()),
      draining: AtomicBool::new(false),
      notices: tx,
      timeout: DEFAULT_TIMEOUT,
    };
    Ok((outbox, rx))
  }

  /// Set the upper bound on a single submission.
  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  /// Messages waiting for connectivity, oldest first.
  pub fn pending(&self) -> Vec<M> {
    self
      .pending
      .lock()
      .map(|q| q.iter().cloned().collect())
      .unwrap_or_default()
  }

  pub fn is_draining(&self) -> bool {
    self.draining.load(Ordering::Acquire)
  }

  /// Submit now if online, otherwise queue for later.
  pub async fn send(&self, message: M) -> Result<SendOutcome<K::Reply>> {
    if !self.connectivity.is_online() {
      self.enqueue(message.clone())?;
      self.notify(Notice::Queued(message));
      return Ok(SendOutcome::Queued);
    }

    match self.submit(&message).await {
      Ok(reply) => Ok(SendOutcome::Delivered(reply)),
      Err(e) => {
        tracing::warn!(error = %e, "submission failed");
        Ok(SendOutcome::Failed(e))
      }
    }
  }

  /// Drain the pending queue in order, one submission at a time.
  ///
  /// Returns `None` without doing anything if a drain is already running.
  /// Stops early if connectivity drops; the remaining messages stay queued.
  /// A queue store failure ends the drain with an error and leaves the
  /// unsent message at the front of the queue.
  pub async fn flush_pending(&self) -> Result<Option<FlushReport>> {
    if self.draining.swap(true, Ordering::AcqRel) {
      tracing::debug!("drain already in progress");
      return Ok(None);
    }
    let _guard = DrainGuard(&self.draining);

    let mut report = FlushReport::default();
    while self.connectivity.is_online() {
      let Some(message) = self.pop_front()? else {
        break;
      };

      match self.submit(&message).await {
        Ok(reply) => {
          report.delivered += 1;
          self.notify(Notice::Delivered { message, reply });
        }
        Err(error) => {
          tracing::warn!(error = %error, "dropping queued message after failed submission");
          report.failed += 1;
          self.notify(Notice::Failed { message, error });
        }
      }
    }

    report.remaining = self.pending.lock().map(|q| q.len()).unwrap_or(0);
    tracing::info!(
      delivered = report.delivered,
      failed = report.failed,
      remaining = report.remaining,
      "pending queue drained"
    );
    Ok(Some(report))
  }

  /// Flush the queue every time connectivity comes back.
  pub fn spawn_reconnect_flush(self: &Arc<Self>) -> JoinHandle<()> {
    let outbox = Arc::clone(self);
    let mut rx = self.connectivity.subscribe();

    tokio::spawn(async move {
      while rx.changed().await.is_ok() {
        let online = *rx.borrow_and_update();
        if !online {
          continue;
        }
        if let Err(e) = outbox.flush_pending().await {
          tracing::error!(error = %e, "failed to flush pending queue");
        }
      }
    })
  }

  async fn submit(&self, message: &M) -> Result<K::Reply, RemoteError> {
    match tokio::time::timeout(self.timeout, self.sink.submit(message)).await {
      Ok(result) => result,
      Err(_) => Err(RemoteError::Unavailable(format!(
        "no response within {:?}",
        self.timeout
      ))),
    }
  }

  fn enqueue(&self, message: M) -> Result<()> {
    let mut pending = self
      .pending
      .lock()
      .map_err(|e| color_eyre::eyre::eyre!("Lock poisoned: {}", e))?;
    pending.push_back(message);
    if let Err(e) = self.storage.save_queue(pending.make_contiguous()) {
      // Not persisted, so not queued
      pending.pop_back();
      return Err(e);
    }
    Ok(())
  }

  /// Remove the oldest message and persist the shortened queue before the
  /// message is submitted. If the save fails the message goes back to the
  /// front of the queue.
  fn pop_front(&self) -> Result<Option<M>> {
    let mut pending = self
      .pending
      .lock()
      .map_err(|e| color_eyre::eyre::eyre!("Lock poisoned: {}", e))?;
    let Some(message) = pending.pop_front() else {
      return Ok(None);
    };
    if let Err(e) = self.storage.save_queue(pending.make_contiguous()) {
      tracing::error!(error = %e, "failed to persist queue, stopping drain");
      pending.push_front(message);
      return Err(e);
    }
    Ok(Some(message))
  }

  fn notify(&self, notice: Notice<M, K::Reply>) {
    // A dropped receiver just means nobody is listening
    let _ = self.notices.send(notice);
  }
}
