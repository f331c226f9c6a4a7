//! The user-facing source session.

use std::thread;
use std::time::{Duration, Instant};

use shoutlink_core::StreamConfig;
use tracing::debug;

use crate::connection::{Connection, ConnectionState};
use crate::error::{ShoutError, ShoutResult, TransportError};
use crate::pacing::Pacer;
use crate::transport::{Connector, IoStatus, TcpConnector};

/// Sleep between polls while [`Shout::open`] waits on the socket.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Sleep between flush attempts while [`Shout::send`] waits on the socket.
const FLUSH_INTERVAL: Duration = Duration::from_millis(1);

/// A source session: configure, open, send, pace, close.
///
/// ```no_run
/// use shoutlink_client::Shout;
/// use shoutlink_core::StreamConfig;
///
/// let config = StreamConfig::new("127.0.0.1", 8000)
///     .with_mount("/live.ogg")
///     .with_password("hackme");
/// let mut shout = Shout::new(config);
/// shout.open()?;
/// shout.send(b"...")?;
/// shout.sync();
/// shout.close();
/// # Ok::<(), shoutlink_client::ShoutError>(())
/// ```
#[derive(Debug)]
pub struct Shout {
    config: StreamConfig,
    connector: Option<Box<dyn Connector>>,
    connection: Option<Connection>,
    pacer: Pacer,
}

impl Shout {
    /// Creates a session that connects over plain TCP.
    pub fn new(config: StreamConfig) -> Self {
        Self::with_connector(config, Box::new(TcpConnector))
    }

    /// Creates a session with a custom connector, e.g. one with TLS.
    pub fn with_connector(config: StreamConfig, connector: Box<dyn Connector>) -> Self {
        let pacer = Pacer::new(config.audio.bitrate);
        Self {
            config,
            connector: Some(connector),
            connection: None,
            pacer,
        }
    }

    /// Current configuration.
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Mutable configuration; refused while a connection exists.
    pub fn config_mut(&mut self) -> ShoutResult<&mut StreamConfig> {
        if let Some(ref connection) = self.connection {
            return Err(ShoutError::InvalidState {
                operation: "change configuration",
                state: connection.state(),
            });
        }
        Ok(&mut self.config)
    }

    /// Connection state; `Init` before the first open.
    pub fn state(&self) -> ConnectionState {
        self.connection
            .as_ref()
            .map_or(ConnectionState::Init, Connection::state)
    }

    /// The underlying connection, once opened.
    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    /// Advances the login without blocking.
    pub fn poll_open(&mut self) -> ShoutResult<IoStatus> {
        if self.connection.is_none() {
            self.config.validate()?;
            let connector = self
                .connector
                .take()
                .unwrap_or_else(|| Box::new(TcpConnector));
            self.connection = Some(Connection::new(self.config.clone(), connector)?);
            self.pacer = Pacer::new(self.config.audio.bitrate);
        }
        match self.connection.as_mut() {
            Some(connection) => connection.poll_open(),
            None => Err(TransportError::NotConnected.into()),
        }
    }

    /// Opens the connection and waits until the login completes.
    ///
    /// The wait is bounded by the configured connect timeout.
    pub fn open(&mut self) -> ShoutResult<()> {
        let deadline = Instant::now() + self.config.connect_timeout;
        loop {
            if self.poll_open()? == IoStatus::Ready {
                return Ok(());
            }
            if Instant::now() >= deadline {
                let timeout = self.config.connect_timeout;
                self.close();
                return Err(TransportError::TimedOut(timeout).into());
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Queues payload and waits until the socket has taken all of it.
    ///
    /// The wait is bounded by the configured connect timeout; on expiry the
    /// rest stays queued and `TimedOut` is returned. Use
    /// [`Connection::send`] for the non-blocking form.
    pub fn send(&mut self, data: &[u8]) -> ShoutResult<()> {
        let timeout = self.config.connect_timeout;
        let mut status = self.streaming("send")?.send(data)?;
        self.pacer.record(data.len(), Instant::now());

        let deadline = Instant::now() + timeout;
        while status == IoStatus::Busy {
            if Instant::now() >= deadline {
                return Err(TransportError::TimedOut(timeout).into());
            }
            thread::sleep(FLUSH_INTERVAL);
            status = self.streaming("send")?.poll_flush()?;
        }
        Ok(())
    }

    /// Writes queued payload.
    pub fn poll_flush(&mut self) -> ShoutResult<IoStatus> {
        self.streaming("flush")?.poll_flush()
    }

    /// Bytes queued but not yet written.
    pub fn queue_len(&self) -> usize {
        self.connection.as_ref().map_or(0, Connection::queue_len)
    }

    /// Time [`Shout::sync`] would sleep.
    pub fn delay(&self) -> Duration {
        self.pacer.delay()
    }

    /// Sleeps until the announced bitrate allows more data.
    pub fn sync(&self) {
        let delay = self.delay();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }

    /// Closes the connection. The session can be reconfigured and opened
    /// again afterwards.
    pub fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            debug!(state = %connection.state(), "closing session");
            self.connector = Some(connection.into_connector());
        }
        self.pacer.reset();
    }

    fn streaming(&mut self, operation: &'static str) -> ShoutResult<&mut Connection> {
        match self.connection.as_mut() {
            Some(connection) => Ok(connection),
            None => Err(ShoutError::InvalidState {
                operation,
                state: ConnectionState::Init,
            }),
        }
    }
}

impl Drop for Shout {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use shoutlink_core::AudioInfo;

    use super::*;

    fn config() -> StreamConfig {
        StreamConfig::new("localhost", 8000).with_password("pw")
    }

    #[test]
    fn idle_session() {
        let mut shout = Shout::new(config());
        assert_eq!(shout.state(), ConnectionState::Init);
        assert!(shout.connection().is_none());
        assert_eq!(shout.queue_len(), 0);
        assert_eq!(shout.delay(), Duration::ZERO);
        shout.close();
        shout.close();
        assert!(shout.config_mut().is_ok());
    }

    #[test]
    fn invalid_config_keeps_connector() {
        let mut shout = Shout::new(StreamConfig::new("localhost", 0).with_password("pw"));
        assert!(shout.poll_open().is_err());
        assert!(shout.connection().is_none());
        assert!(shout.connector.is_some());
    }

    #[test]
    fn send_requires_open() {
        let audio = AudioInfo {
            bitrate: Some(128),
            ..Default::default()
        };
        let mut shout = Shout::new(config().with_audio(audio));
        let err = shout.send(b"data").unwrap_err();
        assert!(matches!(err, ShoutError::InvalidState { operation: "send", .. }));
        assert_eq!(shout.delay(), Duration::ZERO);
    }
}
