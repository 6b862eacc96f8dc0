//! Service identity and status wire format
//!
//! Defines the fixed service identifier the listening endpoint advertises
//! and the status event the monitor writes back to the wearable. The
//! identifier is a compatibility constant: the wearable must be configured
//! with the same value or its connection attempts are rejected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Generate a deterministic UUID v4-format from a namespace and name.
/// Uses SHA-256 and formats the output as a UUID (similar to UUID v5 but
/// using SHA-256 instead of SHA-1).
fn deterministic_uuid(namespace: &str, name: &str) -> Uuid {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update(name.as_bytes());
    let hash = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);
    // Set version 4 and variant bits for UUID compatibility.
    bytes[6] = (bytes[6] & 0x0F) | 0x40; // version 4
    bytes[8] = (bytes[8] & 0x3F) | 0x80; // variant 1
    Uuid::from_bytes(bytes)
}

/// Service UUID advertised for the heart-rate sample stream.
pub fn heart_rate_service_uuid() -> Uuid {
    deterministic_uuid("pulselink.monitor", "heart-rate-stream")
}

/// A status notification sent to the connected wearable.
///
/// Serialized as one newline-delimited JSON object per event. This is the
/// only structured traffic on the link; inbound sample chunks are plain
/// text (see the `decode` module).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusEvent {
    /// Whether the monitor currently holds an open session.
    pub connected: bool,
    /// When the event was produced.
    pub timestamp: DateTime<Utc>,
}

impl StatusEvent {
    pub fn now(connected: bool) -> Self {
        Self {
            connected,
            timestamp: Utc::now(),
        }
    }

    /// Serialize as a newline-terminated JSON line.
    pub fn to_line(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }

    /// Parse a line previously produced by [`StatusEvent::to_line`].
    pub fn from_line(line: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(line)
    }
}
