//! Source connection engine and the `shoutout` command-line tool.
//!
//! [`Shout`] is the entry point: give it a [`StreamConfig`], open it, then
//! feed it payload. Underneath, a [`Connection`] drives the protocol
//! handshake over a non-blocking [`Transport`].
//!
//! [`StreamConfig`]: shoutlink_core::StreamConfig

pub mod cli;
pub mod config;
pub mod connection;
pub mod error;
pub mod pacing;
pub mod secret;
pub mod session;
pub mod transport;

pub use cli::Cli;
pub use connection::{Connection, ConnectionState};
pub use error::{ErrorKind, ShoutError, ShoutResult, TransportError, TransportResult};
pub use pacing::Pacer;
pub use session::Shout;
pub use transport::{Connector, IoStatus, READ_CHUNK, Stream, TcpConnector, Transport};
