//! Classifier collaborator seam
//!
//! The monitor feeds each completed window to a pre-trained model and
//! displays the resulting score. The model, and the per-index
//! normalization table tied to it, are opaque external resources; this
//! module only defines the seam: the [`Classifier`] trait a driver
//! implements, a [`LatestScore`] holder with the same single-writer /
//! many-observer discipline as the connection status, and a task wiring
//! supervisor window events to a classifier.

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use crate::supervisor::{MonitorEvent, Supervisor};

/// An opaque classification function: one full window in, one score out.
///
/// Implementations own any preprocessing (normalization, reshaping) their
/// model requires.
pub trait Classifier: Send + Sync {
    fn classify(&self, window: &[f32]) -> f32;
}

/// The most recent classification score, observable by the display.
pub struct LatestScore {
    score: Mutex<Option<f32>>,
    score_tx: broadcast::Sender<f32>,
}

impl LatestScore {
    pub fn new() -> Self {
        let (score_tx, _) = broadcast::channel(32);
        Self {
            score: Mutex::new(None),
            score_tx,
        }
    }

    pub fn get(&self) -> Option<f32> {
        *self.score.lock().unwrap()
    }

    pub fn set(&self, score: f32) {
        *self.score.lock().unwrap() = Some(score);
        let _ = self.score_tx.send(score);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<f32> {
        self.score_tx.subscribe()
    }
}

impl Default for LatestScore {
    fn default() -> Self {
        Self::new()
    }
}

/// Drive a classifier from the supervisor's window events, publishing
/// each score to `latest`. Runs until the supervisor's event channel
/// closes.
pub fn spawn_scoring(
    supervisor: &Arc<Supervisor>,
    classifier: Arc<dyn Classifier>,
    latest: Arc<LatestScore>,
) -> tokio::task::JoinHandle<()> {
    let mut events = supervisor.events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(MonitorEvent::WindowReady(window)) => {
                    latest.set(classifier.classify(&window));
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("Scoring fell behind, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
