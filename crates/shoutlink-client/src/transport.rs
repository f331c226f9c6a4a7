//! Non-blocking, queued socket transport.
//!
//! A [`Transport`] owns one connected stream plus an outbound and an inbound
//! [`ByteQueue`]. Writes are queued first and flushed as far as the socket
//! accepts; reads append whatever is available. Neither ever blocks: when
//! the socket is not ready the call returns [`IoStatus::Busy`].
//!
//! Establishing the stream goes through a [`Connector`], which is also where
//! TLS is plugged in.

use std::io::{self, ErrorKind as IoErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use shoutlink_core::{ByteQueue, TlsMode};
use tracing::{debug, trace, warn};

use crate::error::{TransportError, TransportResult};

/// Size of a single socket read.
pub const READ_CHUNK: usize = 1024;

/// A bidirectional byte stream, plain or encrypted.
pub trait Stream: Read + Write + Send {}

impl<T: Read + Write + Send + ?Sized> Stream for T {}

/// Opens streams and wraps them in TLS.
pub trait Connector: Send {
    /// Opens a non-blocking stream to `host:port`.
    fn connect(
        &mut self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> TransportResult<Box<dyn Stream>>;

    /// Runs a TLS client handshake over `stream`.
    fn start_tls(&mut self, stream: Box<dyn Stream>, host: &str)
    -> TransportResult<Box<dyn Stream>>;

    /// Whether [`Connector::start_tls`] can succeed at all.
    fn supports_tls(&self) -> bool {
        true
    }
}

impl std::fmt::Debug for dyn Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Connector")
    }
}

/// Plain TCP connector.
///
/// It has no TLS backend: [`Connector::start_tls`] always fails with
/// [`TransportError::TlsUnavailable`].
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    fn connect(
        &mut self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> TransportResult<Box<dyn Stream>> {
        let addrs: Vec<_> = (host, port)
            .to_socket_addrs()
            .map_err(|source| TransportError::Resolve {
                host: host.to_string(),
                source,
            })?
            .collect();
        if addrs.is_empty() {
            return Err(TransportError::Resolve {
                host: host.to_string(),
                source: io::Error::new(IoErrorKind::NotFound, "no addresses"),
            });
        }

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    stream.set_nonblocking(true)?;
                    debug!(%addr, "tcp connected");
                    return Ok(Box::new(stream));
                }
                Err(e) => {
                    debug!(%addr, error = %e, "tcp connect attempt failed");
                    last_err = Some(e);
                }
            }
        }

        Err(TransportError::Connect {
            host: host.to_string(),
            port,
            source: last_err
                .unwrap_or_else(|| io::Error::new(IoErrorKind::NotConnected, "no address tried")),
        })
    }

    fn start_tls(
        &mut self,
        _stream: Box<dyn Stream>,
        _host: &str,
    ) -> TransportResult<Box<dyn Stream>> {
        Err(TransportError::TlsUnavailable)
    }

    fn supports_tls(&self) -> bool {
        false
    }
}

/// Result of a non-blocking I/O attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoStatus {
    /// The operation completed.
    Ready,
    /// The socket is not ready; call again later.
    Busy,
}

/// A connected stream with its outbound and inbound queues.
pub struct Transport {
    stream: Option<Box<dyn Stream>>,
    tls: bool,
    outbound: ByteQueue,
    inbound: ByteQueue,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("connected", &self.stream.is_some())
            .field("tls", &self.tls)
            .field("outbound", &self.outbound.len())
            .field("inbound", &self.inbound.len())
            .finish()
    }
}

impl Transport {
    /// Wraps an already connected stream.
    pub fn from_stream(stream: Box<dyn Stream>, tls: bool) -> Self {
        Self {
            stream: Some(stream),
            tls,
            outbound: ByteQueue::new(),
            inbound: ByteQueue::new(),
        }
    }

    /// Connects to `host:port` and applies the TLS mode.
    ///
    /// `ForcedAfterRequest` connects in plain text; the upgrade happens
    /// later through [`Transport::start_tls`]. `Auto` goes straight to
    /// plain text when the connector has no TLS backend, and the modes that
    /// require TLS fail before dialing.
    pub fn connect(
        connector: &mut dyn Connector,
        host: &str,
        port: u16,
        tls: TlsMode,
        timeout: Duration,
    ) -> TransportResult<Self> {
        let tls = if connector.supports_tls() {
            tls
        } else {
            match tls {
                TlsMode::ForcedAtConnect | TlsMode::AutoNoPlain => {
                    return Err(TransportError::TlsUnavailable);
                }
                TlsMode::Auto => {
                    debug!(host, port, "no TLS backend, connecting in plain text");
                    TlsMode::Disabled
                }
                other => other,
            }
        };

        let stream = connector.connect(host, port, timeout)?;
        match tls {
            TlsMode::Disabled | TlsMode::ForcedAfterRequest => {
                Ok(Self::from_stream(stream, false))
            }
            TlsMode::ForcedAtConnect | TlsMode::AutoNoPlain => {
                let stream = connector.start_tls(stream, host)?;
                Ok(Self::from_stream(stream, true))
            }
            TlsMode::Auto => match connector.start_tls(stream, host) {
                Ok(stream) => Ok(Self::from_stream(stream, true)),
                Err(e) => {
                    warn!(host, port, error = %e, "TLS failed, reconnecting in plain text");
                    let stream = connector.connect(host, port, timeout)?;
                    Ok(Self::from_stream(stream, false))
                }
            },
        }
    }

    /// Upgrades the stream to TLS in place.
    ///
    /// Buffered bytes are kept. On failure the stream is gone.
    pub fn start_tls(&mut self, connector: &mut dyn Connector, host: &str) -> TransportResult<()> {
        let stream = self.stream.take().ok_or(TransportError::NotConnected)?;
        let stream = connector.start_tls(stream, host)?;
        self.stream = Some(stream);
        self.tls = true;
        debug!(host, "transport upgraded to TLS");
        Ok(())
    }

    /// Returns true while a stream is attached.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Returns true if the stream is encrypted.
    pub fn is_tls(&self) -> bool {
        self.tls
    }

    /// Queues bytes for sending.
    pub fn enqueue(&mut self, bytes: &[u8]) -> TransportResult<()> {
        self.outbound.push(bytes)?;
        Ok(())
    }

    /// Bytes queued but not yet written.
    pub fn outbound_len(&self) -> usize {
        self.outbound.len()
    }

    /// Received bytes not yet consumed.
    pub fn inbound(&self) -> &ByteQueue {
        &self.inbound
    }

    /// Mutable access to the received bytes.
    pub fn inbound_mut(&mut self) -> &mut ByteQueue {
        &mut self.inbound
    }

    /// Writes queued bytes until the queue is empty or the socket is full.
    pub fn try_flush_outbound(&mut self) -> TransportResult<IoStatus> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;

        while let Some(chunk) = self.outbound.front() {
            match stream.write(chunk) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => {
                    trace!(written = n, "flushed outbound bytes");
                    self.outbound.consume(n);
                }
                Err(e) if is_busy(&e) => return Ok(IoStatus::Busy),
                Err(e) => return Err(e.into()),
            }
        }

        match stream.flush() {
            Ok(()) => Ok(IoStatus::Ready),
            Err(e) if is_busy(&e) => Ok(IoStatus::Busy),
            Err(e) => Err(e.into()),
        }
    }

    /// Performs one read of up to [`READ_CHUNK`] bytes into the inbound
    /// queue.
    pub fn try_fill_inbound(&mut self) -> TransportResult<IoStatus> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        let mut buf = [0u8; READ_CHUNK];
        match stream.read(&mut buf) {
            Ok(0) => Err(TransportError::Closed),
            Ok(n) => {
                trace!(read = n, "received bytes");
                self.inbound.push(&buf[..n])?;
                Ok(IoStatus::Ready)
            }
            Err(e) if is_busy(&e) => Ok(IoStatus::Busy),
            Err(e) => Err(e.into()),
        }
    }

    /// Drops the stream and both queues. Safe to call repeatedly.
    pub fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            debug!("transport disconnected");
        }
        self.tls = false;
        self.outbound.clear();
        self.inbound.clear();
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn is_busy(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        IoErrorKind::WouldBlock | IoErrorKind::Interrupted
    )
}
