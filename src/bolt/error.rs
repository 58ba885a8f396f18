//! Bolt wire-level error types.
//!
//! These errors describe what went wrong on the wire. They carry no notion of
//! retries or server classifications; the driver layer maps them onto its own
//! taxonomy.

use std::io;

use thiserror::Error;

use super::packstream::PackStreamError;

/// Result type for Bolt operations.
pub type BoltResult<T> = Result<T, BoltError>;

/// Bolt protocol errors.
#[derive(Debug, Error)]
pub enum BoltError {
    /// Socket-level failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Version negotiation failed.
    #[error("Handshake error: {0}")]
    Handshake(String),

    /// Malformed PackStream payload.
    #[error("PackStream error: {0}")]
    PackStream(#[from] PackStreamError),

    /// Message that does not fit the protocol (unknown tag, wrong field count).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Inbound message exceeds the configured limit.
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Accumulated message size
        size: usize,
        /// Configured maximum
        max: usize,
    },

    /// No response within the configured read timeout.
    #[error("Timed out after {0:?} waiting for the server")]
    Timeout(std::time::Duration),

    /// Peer closed the socket.
    #[error("Connection closed by server")]
    ConnectionClosed,
}

impl BoltError {
    /// Create a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        BoltError::Protocol(msg.into())
    }

    /// Create a handshake error.
    pub fn handshake(msg: impl Into<String>) -> Self {
        BoltError::Handshake(msg.into())
    }

    /// Whether the failure happened in the transport rather than in message content.
    ///
    /// Transport failures leave the socket in an unknown position, framing and
    /// payload failures leave it desynchronised. Either way the connection is
    /// unusable afterwards; this only decides how the error is reported.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            BoltError::Io(_) | BoltError::Timeout(_) | BoltError::ConnectionClosed | BoltError::Handshake(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BoltError::protocol("unexpected tag 0x42");
        assert_eq!(err.to_string(), "Protocol error: unexpected tag 0x42");

        let err = BoltError::MessageTooLarge { size: 20, max: 10 };
        assert_eq!(err.to_string(), "Message too large: 20 bytes (max: 10)");
    }

    #[test]
    fn test_transport_classification() {
        let io = BoltError::from(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert!(io.is_transport());
        assert!(BoltError::ConnectionClosed.is_transport());
        assert!(!BoltError::protocol("bad").is_transport());
        assert!(!BoltError::from(PackStreamError::UnexpectedEof).is_transport());
    }
}
