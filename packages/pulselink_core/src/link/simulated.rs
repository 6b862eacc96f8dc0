//! In-process wireless link simulator
//!
//! Provides a simulated radio environment where multiple devices can
//! advertise, connect, and exchange chunks entirely in-process. Used for
//! integration testing and the CLI demo without requiring real hardware.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, Mutex, Notify};
use uuid::Uuid;

use super::transport::{LinkListener, LinkSession, WirelessTransport, MAX_CHUNK_LEN};
use super::LinkError;

/// A registered listening endpoint: the advertised service and the channel
/// through which connection requests are delivered.
#[derive(Clone)]
struct SimEndpoint {
    service_id: Uuid,
    conn_tx: mpsc::Sender<Box<dyn LinkSession>>,
}

/// The simulated "air" — a shared medium through which all simulated
/// devices communicate.
pub struct SimNetwork {
    /// Registry of listening endpoints keyed by device address. Entries
    /// are replaced on re-listen; a stale entry whose listener was dropped
    /// simply rejects connection attempts.
    endpoints: StdMutex<HashMap<Uuid, SimEndpoint>>,
}

impl SimNetwork {
    /// Create a new simulated network.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            endpoints: StdMutex::new(HashMap::new()),
        })
    }

    /// Create a new simulated device on this network.
    pub fn create_device(self: &Arc<Self>) -> SimDevice {
        SimDevice {
            address: Uuid::new_v4(),
            network: Arc::clone(self),
            radio_enabled: AtomicBool::new(true),
        }
    }
}

/// A simulated wireless device that can listen for a peer or connect to
/// another device's advertised endpoint.
pub struct SimDevice {
    address: Uuid,
    network: Arc<SimNetwork>,
    radio_enabled: AtomicBool,
}

impl SimDevice {
    /// Get this device's address on the simulated network.
    pub fn address(&self) -> Uuid {
        self.address
    }

    /// Toggle the simulated radio. A disabled radio makes `listen` and
    /// `connect` fail with [`LinkError::Unavailable`].
    pub fn set_radio_enabled(&self, enabled: bool) {
        self.radio_enabled.store(enabled, Ordering::SeqCst);
    }

    /// Connect to a listening device advertising the given service.
    pub async fn connect(
        &self,
        peer: Uuid,
        service_id: Uuid,
    ) -> Result<Box<dyn LinkSession>, LinkError> {
        if !self.radio_enabled.load(Ordering::SeqCst) {
            return Err(LinkError::Unavailable("radio disabled".to_string()));
        }

        let endpoint = {
            let endpoints = self.network.endpoints.lock().unwrap();
            endpoints.get(&peer).cloned()
        };
        let endpoint = endpoint
            .ok_or_else(|| LinkError::ConnectionError(format!("no listener at {}", peer)))?;

        if endpoint.service_id != service_id {
            return Err(LinkError::ConnectionError(
                "service identifier mismatch".to_string(),
            ));
        }

        let (local, remote) = SimSession::create_pair(self.address, peer);
        endpoint.conn_tx.send(Box::new(remote)).await.map_err(|_| {
            LinkError::ConnectionError("peer is no longer accepting connections".to_string())
        })?;

        Ok(Box::new(local))
    }
}

#[async_trait]
impl WirelessTransport for SimDevice {
    async fn listen(&self, service_id: Uuid) -> Result<Box<dyn LinkListener>, LinkError> {
        if !self.radio_enabled.load(Ordering::SeqCst) {
            return Err(LinkError::Unavailable("radio disabled".to_string()));
        }

        let (conn_tx, conn_rx) = mpsc::channel(4);
        {
            let mut endpoints = self.network.endpoints.lock().unwrap();
            endpoints.insert(
                self.address,
                SimEndpoint {
                    service_id,
                    conn_tx,
                },
            );
        }

        Ok(Box::new(SimListener {
            address: self.address,
            conn_rx,
        }))
    }
}

/// A simulated listening endpoint. Dropped (and thus released) as soon as
/// `accept` returns the first session.
pub struct SimListener {
    address: Uuid,
    conn_rx: mpsc::Receiver<Box<dyn LinkSession>>,
}

#[async_trait]
impl LinkListener for SimListener {
    async fn accept(mut self: Box<Self>) -> Result<Box<dyn LinkSession>, LinkError> {
        self.conn_rx.recv().await.ok_or(LinkError::Closed)
    }

    fn local_address(&self) -> Option<String> {
        Some(format!("sim:{}", self.address))
    }
}

/// A simulated session backed by tokio mpsc channels.
///
/// `closed` is this side's flag, `peer_closed` aliases the other side's
/// flag, and each side holds the other's `Notify` so `close` can wake a
/// read blocked on the far end.
pub struct SimSession {
    tx: mpsc::Sender<Bytes>,
    rx: Mutex<mpsc::Receiver<Bytes>>,
    closed: Arc<AtomicBool>,
    peer_closed: Arc<AtomicBool>,
    notify: Arc<Notify>,
    peer_notify: Arc<Notify>,
    peer_address: String,
}

impl SimSession {
    /// Create a symmetric pair of sessions between two addresses.
    fn create_pair(addr_a: Uuid, addr_b: Uuid) -> (SimSession, SimSession) {
        let (tx_ab, rx_ab) = mpsc::channel(64);
        let (tx_ba, rx_ba) = mpsc::channel(64);
        let closed_a = Arc::new(AtomicBool::new(false));
        let closed_b = Arc::new(AtomicBool::new(false));
        let notify_a = Arc::new(Notify::new());
        let notify_b = Arc::new(Notify::new());

        let session_a = SimSession {
            tx: tx_ab,
            rx: Mutex::new(rx_ba),
            closed: Arc::clone(&closed_a),
            peer_closed: Arc::clone(&closed_b),
            notify: Arc::clone(&notify_a),
            peer_notify: Arc::clone(&notify_b),
            peer_address: format!("sim:{}", addr_b),
        };

        let session_b = SimSession {
            tx: tx_ba,
            rx: Mutex::new(rx_ab),
            closed: closed_b,
            peer_closed: closed_a,
            notify: notify_b,
            peer_notify: notify_a,
            peer_address: format!("sim:{}", addr_a),
        };

        (session_a, session_b)
    }
}

#[async_trait]
impl LinkSession for SimSession {
    async fn read(&self) -> Result<Bytes, LinkError> {
        let mut rx = self.rx.lock().await;
        // Re-check after acquiring the receiver: a close may have landed
        // while we waited for the lock.
        if self.closed.load(Ordering::SeqCst) {
            return Err(LinkError::Closed);
        }
        if self.peer_closed.load(Ordering::SeqCst) {
            return Err(LinkError::PeerDisconnected);
        }
        tokio::select! {
            _ = self.notify.notified() => {
                if self.closed.load(Ordering::SeqCst) {
                    Err(LinkError::Closed)
                } else {
                    Err(LinkError::PeerDisconnected)
                }
            }
            chunk = rx.recv() => match chunk {
                Some(data) => Ok(data),
                None => Err(LinkError::PeerDisconnected),
            }
        }
    }

    async fn send(&self, data: &[u8]) -> Result<(), LinkError> {
        if data.len() > MAX_CHUNK_LEN {
            return Err(LinkError::ChunkTooLarge {
                size: data.len(),
                max: MAX_CHUNK_LEN,
            });
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(LinkError::Closed);
        }
        if self.peer_closed.load(Ordering::SeqCst) {
            return Err(LinkError::PeerDisconnected);
        }
        self.tx
            .send(Bytes::copy_from_slice(data))
            .await
            .map_err(|_| LinkError::PeerDisconnected)
    }

    async fn close(&self) -> Result<(), LinkError> {
        self.closed.store(true, Ordering::SeqCst);
        // notify_one stores a permit, so a read that registers after this
        // call still wakes instead of hanging.
        self.notify.notify_one();
        self.peer_notify.notify_one();
        Ok(())
    }

    fn peer_address(&self) -> &str {
        &self.peer_address
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && !self.peer_closed.load(Ordering::SeqCst)
    }
}
