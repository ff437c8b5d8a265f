//! Online/offline signal shared between lookups and the outbox.

use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;

/// A boolean connectivity signal that the host pushes changes into.
///
/// Clones share the same underlying state.
#[derive(Clone, Debug)]
pub struct Connectivity {
  tx: Arc<watch::Sender<bool>>,
}

impl Connectivity {
  pub fn new(online: bool) -> Self {
    let (tx, _rx) = watch::channel(online);
    Self { tx: Arc::new(tx) }
  }

  pub fn online() -> Self {
    Self::new(true)
  }

  pub fn offline() -> Self {
    Self::new(false)
  }

  pub fn is_online(&self) -> bool {
    *self.tx.borrow()
  }

  /// Update the state. Subscribers are only woken on an actual transition.
  pub fn set_online(&self, online: bool) {
    let changed = self.tx.send_if_modified(|current| {
      if *current == online {
        false
      } else {
        *current = online;
        true
      }
    });
    if changed {
      tracing::info!(online, "connectivity changed");
    }
  }

  /// Receive state changes.
  pub fn subscribe(&self) -> watch::Receiver<bool> {
    self.tx.subscribe()
  }
}

/// Decide whether the network is reachable by opening a TCP connection to
/// `addr` within `timeout`.
pub async fn probe(addr: &str, timeout: Duration) -> bool {
  match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
    Ok(Ok(_)) => true,
    Ok(Err(e)) => {
      tracing::debug!(addr, error = %e, "connectivity probe failed");
      false
    }
    Err(_) => {
      tracing::debug!(addr, "connectivity probe timed out");
      false
    }
  }
}
