//! Protocol error types.

use shoutlink_core::QueueError;
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while building requests or parsing responses.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The server response could not be understood.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// A request field cannot be put on the wire.
    #[error("cannot encode request: {0}")]
    Encoding(String),

    /// The server answered an in-band TLS upgrade request without upgrading.
    #[error("server refused TLS upgrade (status {status})")]
    UpgradeRefused { status: u16 },

    /// Buffer allocation failed.
    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl ProtocolError {
    /// Creates a malformed response error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    /// Creates an encoding error.
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding(message.into())
    }
}
