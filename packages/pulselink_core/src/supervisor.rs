//! Session supervisor
//!
//! The state machine tying the link, decoder, and window buffer together.
//! One supervisor owns at most one live session at a time: it listens,
//! accepts a single peer, drives the decode/buffer loop, and on any
//! disconnection tears the session down and re-enters listening until
//! explicitly stopped. Observers (display, classifier trigger) receive
//! connection-status and sample events on a single ordered channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use uuid::Uuid;

use crate::decode::SampleDecoder;
use crate::link::service::{heart_rate_service_uuid, StatusEvent};
use crate::link::transport::{LinkSession, WirelessTransport};
use crate::link::LinkError;
use crate::status::ConnectionStatus;
use crate::window::WindowBuffer;

/// Lifecycle state of the supervisor's session, cyclic: `Closing` always
/// returns to `Idle`, and the supervisor re-listens from there unless it
/// was explicitly stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SessionState {
    Idle,
    Listening,
    Connected,
    Streaming,
    Closing,
}

/// Events delivered to external observers, in the order they occur.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    ConnectionStatusChanged(bool),
    SampleAppended(f32),
    WindowReady(Vec<f32>),
}

/// Configuration for the supervisor loop.
#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    /// Service identifier advertised by the listening endpoint. The
    /// wearable must be configured with the same value.
    pub service_id: Uuid,
    /// Backoff before retrying after a failed listen or accept.
    pub retry_delay: Duration,
    /// Interval for re-broadcasting a status event to the connected peer,
    /// or `None` to disable the periodic task.
    pub status_interval: Option<Duration>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            service_id: heart_rate_service_uuid(),
            retry_delay: Duration::from_secs(2),
            status_interval: None,
        }
    }
}

/// Why the streaming loop ended.
enum SessionEnd {
    PeerClosed,
    Fault,
    Shutdown,
}

/// Supervises the session lifecycle and sample flow.
pub struct Supervisor {
    config: SupervisorConfig,
    transport: Arc<dyn WirelessTransport>,
    window: Arc<WindowBuffer>,
    decoder: SampleDecoder,
    status: Arc<ConnectionStatus>,
    state_tx: watch::Sender<SessionState>,
    event_tx: broadcast::Sender<MonitorEvent>,
    shutdown_tx: broadcast::Sender<()>,
    running: AtomicBool,
}

impl Supervisor {
    /// Create a new supervisor over the given transport.
    pub fn new(transport: Arc<dyn WirelessTransport>, config: SupervisorConfig) -> Arc<Self> {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        let (event_tx, _) = broadcast::channel(256);
        let (shutdown_tx, _) = broadcast::channel(1);

        Arc::new(Self {
            config,
            transport,
            window: Arc::new(WindowBuffer::new()),
            decoder: SampleDecoder::new(),
            status: Arc::new(ConnectionStatus::new()),
            state_tx,
            event_tx,
            shutdown_tx,
            running: AtomicBool::new(false),
        })
    }

    pub fn window(&self) -> &Arc<WindowBuffer> {
        &self.window
    }

    pub fn status(&self) -> &Arc<ConnectionStatus> {
        &self.status
    }

    /// Subscribe to monitor events. Subscribe before `start` to observe
    /// the first connection.
    pub fn events(&self) -> broadcast::Receiver<MonitorEvent> {
        self.event_tx.subscribe()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// Watch lifecycle state transitions.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Number of chunks dropped by the decoder so far.
    pub fn malformed_samples(&self) -> u64 {
        self.decoder.malformed_count()
    }

    /// Start the supervisor loop on a background task.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            log::warn!("Supervisor already running");
            return;
        }
        // Subscribe before spawning so a stop() racing startup is not lost.
        let shutdown = self.shutdown_tx.subscribe();
        let supervisor = Arc::clone(self);
        tokio::spawn(async move {
            supervisor.run(shutdown).await;
        });
    }

    /// Request shutdown. Safe to call from any task; outstanding accept or
    /// read operations are cancelled promptly and no re-listen follows.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }

    fn set_state(&self, state: SessionState) {
        self.state_tx.send_replace(state);
    }

    fn emit(&self, event: MonitorEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Backoff that still honors shutdown. Returns false when shutdown
    /// arrived during the wait.
    async fn backoff(&self, shutdown: &mut broadcast::Receiver<()>) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(self.config.retry_delay) => true,
            _ = shutdown.recv() => false,
        }
    }

    async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        loop {
            // Idle -> Listening
            let listener = match self.transport.listen(self.config.service_id).await {
                Ok(listener) => listener,
                Err(e) => {
                    log::warn!("Listen failed: {}", e);
                    if self.backoff(&mut shutdown).await {
                        continue;
                    }
                    break;
                }
            };
            self.set_state(SessionState::Listening);

            // Listening -> Connected. The listener is consumed by accept;
            // if shutdown wins the race, dropping the accept future drops
            // the listener and releases the endpoint.
            let session = tokio::select! {
                result = listener.accept() => match result {
                    Ok(session) => session,
                    Err(e) => {
                        log::warn!("Accept failed: {}", e);
                        self.set_state(SessionState::Idle);
                        if self.backoff(&mut shutdown).await {
                            continue;
                        }
                        break;
                    }
                },
                _ = shutdown.recv() => break,
            };

            let session: Arc<dyn LinkSession> = Arc::from(session);
            log::info!("Peer {} connected", session.peer_address());
            self.set_state(SessionState::Connected);
            self.status.set(true);
            self.emit(MonitorEvent::ConnectionStatusChanged(true));
            self.notify_peer(&session, true).await;

            let rebroadcast = self.spawn_status_rebroadcast(&session);

            let end = self.stream(&session, &mut shutdown).await;

            // Streaming -> Closing -> Idle
            self.set_state(SessionState::Closing);
            if let Some(handle) = rebroadcast {
                handle.abort();
            }
            let _ = session.close().await;
            log::info!("Peer {} disconnected", session.peer_address());
            self.status.set(false);
            self.emit(MonitorEvent::ConnectionStatusChanged(false));
            self.set_state(SessionState::Idle);

            match end {
                SessionEnd::Shutdown => break,
                SessionEnd::PeerClosed | SessionEnd::Fault => {
                    // Re-enter listening automatically.
                }
            }
        }

        self.set_state(SessionState::Idle);
        self.running.store(false, Ordering::SeqCst);
        log::info!("Supervisor stopped");
    }

    /// The decode/buffer loop for one session.
    async fn stream(
        &self,
        session: &Arc<dyn LinkSession>,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> SessionEnd {
        let mut streaming = false;
        loop {
            tokio::select! {
                result = session.read() => match result {
                    Ok(chunk) => {
                        if !streaming {
                            self.set_state(SessionState::Streaming);
                            streaming = true;
                        }
                        for sample in self.decoder.decode(&chunk) {
                            let completed = self.window.push(sample);
                            self.emit(MonitorEvent::SampleAppended(sample));
                            if let Some(window) = completed {
                                self.emit(MonitorEvent::WindowReady(window));
                            }
                        }
                    }
                    Err(LinkError::PeerDisconnected) => return SessionEnd::PeerClosed,
                    Err(LinkError::Closed) => return SessionEnd::Shutdown,
                    Err(e) => {
                        log::warn!("Read failed: {}", e);
                        return SessionEnd::Fault;
                    }
                },
                _ = shutdown.recv() => return SessionEnd::Shutdown,
            }
        }
    }

    /// Best-effort status notification to the peer.
    async fn notify_peer(&self, session: &Arc<dyn LinkSession>, connected: bool) {
        if let Ok(line) = StatusEvent::now(connected).to_line() {
            if let Err(e) = session.send(&line).await {
                log::warn!("Status notification failed: {}", e);
            }
        }
    }

    /// Periodic status re-broadcast to the peer, if configured.
    fn spawn_status_rebroadcast(
        self: &Arc<Self>,
        session: &Arc<dyn LinkSession>,
    ) -> Option<tokio::task::JoinHandle<()>> {
        let interval = self.config.status_interval?;
        let supervisor = Arc::clone(self);
        let session = Arc::clone(session);
        let mut shutdown = self.shutdown_tx.subscribe();
        Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        let event = StatusEvent::now(supervisor.status.get());
                        if let Ok(line) = event.to_line() {
                            if session.send(&line).await.is_err() {
                                break;
                            }
                        }
                    }
                    _ = shutdown.recv() => break,
                }
            }
        }))
    }
}
