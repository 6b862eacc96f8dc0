//! Classification window buffer
//!
//! An append-only buffer of decoded samples with a fixed classification
//! window size. When the buffer reaches [`WINDOW_SIZE`] samples it is
//! atomically snapshotted and cleared, and the snapshot is delivered to
//! every observer exactly once, in push order, before `push` returns.
//! Windows never overlap.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::broadcast;
use uuid::Uuid;

/// Number of samples in one classification window, fixed by the trained
/// model's input shape.
pub const WINDOW_SIZE: usize = 187;

/// Append-only sample buffer with exactly-once window notifications.
///
/// The supervisor's I/O task is the single writer; display and classifier
/// observers read concurrently via [`WindowBuffer::current`], callback
/// subscriptions, or a broadcast receiver.
pub struct WindowBuffer {
    samples: Mutex<Vec<f32>>,
    subscribers: Mutex<HashMap<Uuid, Box<dyn Fn(&[f32]) + Send + Sync>>>,
    window_tx: broadcast::Sender<Vec<f32>>,
    windows_completed: AtomicU64,
}

impl WindowBuffer {
    pub fn new() -> Self {
        let (window_tx, _) = broadcast::channel(32);
        Self {
            samples: Mutex::new(Vec::with_capacity(WINDOW_SIZE)),
            subscribers: Mutex::new(HashMap::new()),
            window_tx,
            windows_completed: AtomicU64::new(0),
        }
    }

    /// Append a sample.
    ///
    /// When this push completes a window, the snapshot is delivered to all
    /// observers and also returned to the caller, and the buffer is left
    /// empty for the next window.
    pub fn push(&self, sample: f32) -> Option<Vec<f32>> {
        let completed = {
            let mut samples = self.samples.lock().unwrap();
            samples.push(sample);
            if samples.len() == WINDOW_SIZE {
                Some(std::mem::replace(
                    &mut *samples,
                    Vec::with_capacity(WINDOW_SIZE),
                ))
            } else {
                None
            }
        };

        let window = completed?;
        self.windows_completed.fetch_add(1, Ordering::Relaxed);
        let _ = self.window_tx.send(window.clone());
        if let Ok(subs) = self.subscribers.lock() {
            for callback in subs.values() {
                callback(&window);
            }
        }
        Some(window)
    }

    /// Non-destructive read of the samples collected so far, for live
    /// display. Never blocks on I/O.
    pub fn current(&self) -> Vec<f32> {
        self.samples.lock().unwrap().clone()
    }

    /// Number of samples currently buffered.
    pub fn len(&self) -> usize {
        self.samples.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of windows completed since creation.
    pub fn windows_completed(&self) -> u64 {
        self.windows_completed.load(Ordering::Relaxed)
    }

    /// Subscribe to completed windows (typed callback).
    pub fn subscribe(&self, callback: Box<dyn Fn(&[f32]) + Send + Sync>) -> Uuid {
        let id = Uuid::new_v4();
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.insert(id, callback);
        }
        id
    }

    /// Unsubscribe a previously registered callback.
    pub fn unsubscribe(&self, id: Uuid) {
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.remove(&id);
        }
    }

    /// Subscribe to completed windows via a broadcast receiver.
    pub fn windows(&self) -> broadcast::Receiver<Vec<f32>> {
        self.window_tx.subscribe()
    }
}

impl Default for WindowBuffer {
    fn default() -> Self {
        Self::new()
    }
}
