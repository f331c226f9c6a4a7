//! Error types for source connections.
//!
//! Every failure surfaced by the client is a [`ShoutError`]. Callers that
//! only need to decide what to do next can look at its [`ErrorKind`].

use std::fmt;
use std::io;

use shoutlink_core::{ConfigError, QueueError};
use shoutlink_protocol::ProtocolError;
use thiserror::Error;

use crate::connection::ConnectionState;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for client operations.
pub type ShoutResult<T> = Result<T, ShoutError>;

/// Errors raised by the socket layer, TLS included.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The host name did not resolve to any address.
    #[error("failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },

    /// Every resolved address refused the connection or timed out.
    #[error("failed to connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// Read or write failure on an established connection.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The peer closed the connection.
    #[error("connection closed by peer")]
    Closed,

    /// The TLS handshake failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The connector has no TLS backend.
    #[error("TLS is not available with this connector")]
    TlsUnavailable,

    /// No stream is attached.
    #[error("not connected")]
    NotConnected,

    /// The handshake did not finish in time.
    #[error("timed out after {0:?}")]
    TimedOut(std::time::Duration),

    /// Buffer allocation failed.
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Coarse classification of a [`ShoutError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Memory could not be allocated.
    ResourceExhausted,
    /// Socket, TLS or name resolution failure.
    TransportFailure,
    /// The server answered with something that is not the expected protocol.
    ProtocolViolation,
    /// The server refused the login.
    AuthenticationRejected,
    /// The configuration is unusable, or an operation was called in the
    /// wrong state.
    InvalidConfiguration,
}

impl ErrorKind {
    /// Returns a stable name for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResourceExhausted => "resource_exhausted",
            Self::TransportFailure => "transport_failure",
            Self::ProtocolViolation => "protocol_violation",
            Self::AuthenticationRejected => "authentication_rejected",
            Self::InvalidConfiguration => "invalid_configuration",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Top-level client error.
#[derive(Debug, Error)]
pub enum ShoutError {
    /// Stream configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The configuration file could not be used.
    #[error("config file {path}: {message}")]
    ConfigFile { path: String, message: String },

    /// Transport failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Request could not be built or the response was not understood.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The server refused the login.
    #[error("login rejected: {reason}")]
    AuthenticationRejected { reason: String },

    /// The operation is not valid in the current connection state.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: ConnectionState,
    },
}

impl ShoutError {
    /// Creates a configuration file error.
    pub fn config_file(path: impl fmt::Display, message: impl Into<String>) -> Self {
        Self::ConfigFile {
            path: path.to_string(),
            message: message.into(),
        }
    }

    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) | Self::ConfigFile { .. } | Self::InvalidState { .. } => {
                ErrorKind::InvalidConfiguration
            }
            Self::Transport(TransportError::Queue(_)) => ErrorKind::ResourceExhausted,
            Self::Transport(_) => ErrorKind::TransportFailure,
            Self::Protocol(ProtocolError::Queue(_)) => ErrorKind::ResourceExhausted,
            Self::Protocol(ProtocolError::UpgradeRefused { .. }) => ErrorKind::TransportFailure,
            Self::Protocol(ProtocolError::Malformed(_) | ProtocolError::Encoding(_)) => {
                ErrorKind::ProtocolViolation
            }
            Self::AuthenticationRejected { .. } => ErrorKind::AuthenticationRejected,
        }
    }
}

impl From<QueueError> for ShoutError {
    fn from(err: QueueError) -> Self {
        Self::Transport(TransportError::Queue(err))
    }
}
