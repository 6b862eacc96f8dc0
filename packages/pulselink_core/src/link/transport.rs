//! Link transport trait definitions
//!
//! Defines the abstract wireless interface that both the simulated link
//! and the TCP-backed transport conform to. The listening side accepts
//! exactly one peer per listen cycle: `accept` consumes the listener, so
//! the endpoint is closed as soon as a session exists and a second accept
//! cannot be started on the same handle.

use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

use super::LinkError;

/// Upper bound on the size of a single read chunk, matching the peer's
/// 1024-byte write buffer.
pub const MAX_CHUNK_LEN: usize = 1024;

/// A wireless endpoint that can advertise a service and accept a peer.
#[async_trait]
pub trait WirelessTransport: Send + Sync {
    /// Begin advertising the given service identifier.
    ///
    /// Fails with [`LinkError::Unavailable`] when the underlying radio is
    /// disabled or the endpoint cannot be bound.
    async fn listen(&self, service_id: Uuid) -> Result<Box<dyn LinkListener>, LinkError>;
}

/// An advertising endpoint waiting for a peer.
///
/// Dropping the listener releases the endpoint without accepting.
#[async_trait]
pub trait LinkListener: Send {
    /// Wait until exactly one peer connects and return the session bound
    /// to it. Consumes the listener: the endpoint stops accepting further
    /// peers until `listen` is called again.
    async fn accept(self: Box<Self>) -> Result<Box<dyn LinkSession>, LinkError>;

    /// The local endpoint address, if the transport has one.
    fn local_address(&self) -> Option<String>;
}

/// An active session with a single connected peer.
#[async_trait]
pub trait LinkSession: Send + Sync {
    /// Read the next available chunk (0 < len ≤ [`MAX_CHUNK_LEN`]).
    ///
    /// Resolves to [`LinkError::PeerDisconnected`] when the stream ends and
    /// to [`LinkError::Closed`] when `close` races the read. Any other I/O
    /// error is fatal for the session.
    async fn read(&self) -> Result<Bytes, LinkError>;

    /// Best-effort one-way notification to the peer.
    async fn send(&self, data: &[u8]) -> Result<(), LinkError>;

    /// Release the stream. Idempotent; safe to call concurrently with an
    /// in-flight `read`, which then resolves to [`LinkError::Closed`].
    async fn close(&self) -> Result<(), LinkError>;

    /// The remote peer's address.
    fn peer_address(&self) -> &str;

    /// Check whether the session is still active.
    fn is_connected(&self) -> bool;
}
