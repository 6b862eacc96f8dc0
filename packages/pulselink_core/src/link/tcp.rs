//! TCP-backed link transport
//!
//! Stands in for the wearable radio link on development hosts: the monitor
//! binds a TCP endpoint and the wearable-side app connects to it. The
//! service identifier is exchanged as a one-line handshake immediately
//! after the socket opens; peers advertising a different service are
//! dropped and the listener keeps waiting for the configured one.
//!
//! After the handshake, inbound traffic is the raw sample stream: each
//! read surfaces whatever bytes are available, capped at 1024 per chunk.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

use super::transport::{LinkListener, LinkSession, WirelessTransport, MAX_CHUNK_LEN};
use super::LinkError;

/// How long a connecting peer has to present its service identifier.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// A TCP endpoint the monitor listens on.
pub struct TcpTransport {
    bind_addr: String,
}

impl TcpTransport {
    pub fn new(bind_addr: impl Into<String>) -> Self {
        Self {
            bind_addr: bind_addr.into(),
        }
    }
}

#[async_trait]
impl WirelessTransport for TcpTransport {
    async fn listen(&self, service_id: Uuid) -> Result<Box<dyn LinkListener>, LinkError> {
        let listener = TcpListener::bind(&self.bind_addr)
            .await
            .map_err(|e| LinkError::Unavailable(format!("bind {}: {}", self.bind_addr, e)))?;
        log::info!("Listening on {}", self.bind_addr);
        Ok(Box::new(TcpLinkListener {
            listener,
            service_id,
        }))
    }
}

pub struct TcpLinkListener {
    listener: TcpListener,
    service_id: Uuid,
}

#[async_trait]
impl LinkListener for TcpLinkListener {
    async fn accept(self: Box<Self>) -> Result<Box<dyn LinkSession>, LinkError> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            let (read_half, write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);

            let mut hello = String::new();
            let handshake =
                tokio::time::timeout(HANDSHAKE_TIMEOUT, reader.read_line(&mut hello)).await;
            match handshake {
                Ok(Ok(n)) if n > 0 => match hello.trim().parse::<Uuid>() {
                    Ok(id) if id == self.service_id => {
                        log::info!("Peer {} connected", peer);
                        // Returning drops the listener: the endpoint stops
                        // accepting until the next listen cycle.
                        return Ok(Box::new(TcpLinkSession::new(
                            reader,
                            write_half,
                            peer.to_string(),
                        )));
                    }
                    _ => {
                        log::warn!("Rejecting peer {}: service identifier mismatch", peer);
                    }
                },
                Ok(Ok(_)) => {
                    log::warn!("Rejecting peer {}: closed before handshake", peer);
                }
                Ok(Err(e)) => {
                    log::warn!("Rejecting peer {}: handshake read failed: {}", peer, e);
                }
                Err(_) => {
                    log::warn!("Rejecting peer {}: handshake timed out", peer);
                }
            }
        }
    }

    fn local_address(&self) -> Option<String> {
        self.listener.local_addr().ok().map(|a| a.to_string())
    }
}

pub struct TcpLinkSession {
    reader: Mutex<BufReader<OwnedReadHalf>>,
    writer: Mutex<OwnedWriteHalf>,
    closed: AtomicBool,
    peer_gone: AtomicBool,
    close_notify: Notify,
    peer_address: String,
}

impl TcpLinkSession {
    fn new(reader: BufReader<OwnedReadHalf>, writer: OwnedWriteHalf, peer_address: String) -> Self {
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            closed: AtomicBool::new(false),
            peer_gone: AtomicBool::new(false),
            close_notify: Notify::new(),
            peer_address,
        }
    }
}

#[async_trait]
impl LinkSession for TcpLinkSession {
    async fn read(&self) -> Result<Bytes, LinkError> {
        let mut reader = self.reader.lock().await;
        if self.closed.load(Ordering::SeqCst) {
            return Err(LinkError::Closed);
        }
        let result = tokio::select! {
            _ = self.close_notify.notified() => return Err(LinkError::Closed),
            result = async {
                let buf = reader.fill_buf().await?;
                let n = buf.len().min(MAX_CHUNK_LEN);
                let chunk = Bytes::copy_from_slice(&buf[..n]);
                reader.consume(n);
                std::io::Result::Ok(chunk)
            } => result,
        };
        match result {
            Ok(chunk) if chunk.is_empty() => {
                self.peer_gone.store(true, Ordering::SeqCst);
                Err(LinkError::PeerDisconnected)
            }
            Ok(chunk) => Ok(chunk),
            Err(e) => {
                self.peer_gone.store(true, Ordering::SeqCst);
                Err(LinkError::Io(e))
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
        let mut writer = self.writer.lock().await;
        writer.write_all(data).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), LinkError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.close_notify.notify_one();
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
        Ok(())
    }

    fn peer_address(&self) -> &str {
        &self.peer_address
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && !self.peer_gone.load(Ordering::SeqCst)
    }
}
