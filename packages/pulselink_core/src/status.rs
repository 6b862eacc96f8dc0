//! Connection status holder
//!
//! A process-wide connected/disconnected flag with a single writer (the
//! supervisor) and any number of read-only observers. Writes deduplicate,
//! so observers see strictly alternating transitions per connection
//! attempt: disconnected → connected → disconnected.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;

pub struct ConnectionStatus {
    connected: AtomicBool,
    status_tx: broadcast::Sender<bool>,
}

impl ConnectionStatus {
    pub fn new() -> Self {
        let (status_tx, _) = broadcast::channel(32);
        Self {
            connected: AtomicBool::new(false),
            status_tx,
        }
    }

    /// Current status, for polling readers.
    pub fn get(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Update the status. Only actual transitions are broadcast; setting
    /// the same value twice emits nothing. Returns whether a transition
    /// occurred.
    pub fn set(&self, connected: bool) -> bool {
        let previous = self.connected.swap(connected, Ordering::SeqCst);
        if previous != connected {
            let _ = self.status_tx.send(connected);
            true
        } else {
            false
        }
    }

    /// Subscribe to status transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<bool> {
        self.status_tx.subscribe()
    }
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self::new()
    }
}
