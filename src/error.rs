//! Error types for the cache node
//!
//! Provides unified error handling using thiserror. Wire-level faults,
//! per-connection terminal errors and service lifecycle errors are kept
//! apart so a connection failure never looks like a service failure.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::service::ServiceStatus;

// == Protocol Error Enum ==
/// Faults raised while framing, encoding or validating a message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Short, oversized or otherwise malformed length prefix or body
    #[error("Malformed frame: {0}")]
    Frame(String),

    /// Recomputed checksum does not match the one carried by the frame
    #[error("Checksum mismatch: frame carries {expected:#010x}, payload hashes to {actual:#010x}")]
    Integrity { expected: u32, actual: u32 },

    /// Message cannot be serialized into a frame
    #[error("Encoding failed: {0}")]
    Encoding(String),
}

// == Connection Error Enum ==
/// Terminal error for a single connection.
///
/// Whatever ends a connection is reported exactly once to the
/// disconnect hook as one of these variants.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Socket read or write fault
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The peer sent a frame that failed framing or integrity checks
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The peer closed its end of the stream between frames
    #[error("Connection closed by peer")]
    PeerClosed,

    /// No complete frame arrived within the heartbeat timeout
    #[error("No frame received within {0:?}")]
    Timeout(Duration),

    /// The connection was closed locally
    #[error("Connection closed")]
    Closed,

    /// The service is shutting down
    #[error("Service shutting down")]
    Shutdown,

    /// The outbound queue is full
    #[error("Outbound queue full")]
    OutboundFull,
}

impl ConnectionError {
    /// Returns true for errors caused by the peer's end of the stream
    /// rather than by this node.
    pub fn is_peer_fault(&self) -> bool {
        matches!(
            self,
            ConnectionError::Io(_)
                | ConnectionError::Protocol(_)
                | ConnectionError::PeerClosed
                | ConnectionError::Timeout(_)
        )
    }
}

// == Service Error Enum ==
/// Lifecycle errors of the listening service.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// The listening socket could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The requested transition is not allowed from the current status
    #[error("Operation not allowed while service is {0:?}")]
    InvalidState(ServiceStatus),
}
