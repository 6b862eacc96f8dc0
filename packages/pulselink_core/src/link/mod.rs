//! Wireless link layer for the wearable peer
//!
//! Provides the transport abstraction traits, a simulated link for testing,
//! a TCP-backed transport, and the service identifier / status wire format.

pub mod service;
pub mod simulated;
pub mod tcp;
pub mod transport;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Transport unavailable: {0}")]
    Unavailable(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Chunk exceeds limit ({size} > {max})")]
    ChunkTooLarge { size: usize, max: usize },

    #[error("Peer disconnected")]
    PeerDisconnected,

    #[error("Session closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
