//! The source connection state machine.
//!
//! ```text
//! Init -> Connecting -> SendingRequest -> AwaitingResponse -> Streaming
//!                ^            ^                  |
//!                |            +-- Continue ------+
//!                |            +-- UpgradeTls ----+
//!                +-- Retrying <-- NeedRetry -----+   (once)
//!
//! any error -> Failed          disconnect() -> Closed
//! ```
//!
//! [`Connection::poll_open`] advances the machine as far as the socket
//! allows and returns [`IoStatus::Busy`] when it has to wait. It can be
//! called again and again until it yields [`IoStatus::Ready`] or an error.

use std::fmt;

use shoutlink_core::StreamConfig;
use shoutlink_protocol::{
    Capabilities, Handshake, HandshakeOutcome, ProtocolImpl, RequestContext,
};
use tracing::{debug, info, warn};

use crate::error::{ShoutError, ShoutResult, TransportError};
use crate::transport::{Connector, IoStatus, TcpConnector, Transport};

/// Retries allowed after a capability probe.
const MAX_RETRIES: u8 = 1;

/// Lifecycle of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Init,
    Connecting,
    SendingRequest,
    AwaitingResponse,
    Retrying,
    Streaming,
    Failed,
    Closed,
}

impl ConnectionState {
    /// Returns the state name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Connecting => "connecting",
            Self::SendingRequest => "sending request",
            Self::AwaitingResponse => "awaiting response",
            Self::Retrying => "retrying",
            Self::Streaming => "streaming",
            Self::Failed => "failed",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One source connection: transport, protocol variant and login progress.
pub struct Connection {
    config: StreamConfig,
    connector: Box<dyn Connector>,
    transport: Option<Transport>,
    protocol: ProtocolImpl,
    caps: Capabilities,
    state: ConnectionState,
    retries: u8,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("protocol", &self.protocol.protocol())
            .field("state", &self.state)
            .field("caps", &self.caps)
            .field("retries", &self.retries)
            .field("transport", &self.transport)
            .finish()
    }
}

impl Connection {
    /// Validates `config` and prepares a connection; nothing is dialed yet.
    pub fn new(config: StreamConfig, connector: Box<dyn Connector>) -> ShoutResult<Self> {
        config.validate()?;
        let protocol = ProtocolImpl::for_protocol(config.protocol);
        Ok(Self {
            config,
            connector,
            transport: None,
            protocol,
            caps: Capabilities::empty(),
            state: ConnectionState::Init,
            retries: 0,
        })
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Capabilities learned from the server.
    pub fn capabilities(&self) -> Capabilities {
        self.caps
    }

    /// Number of reconnects made after a capability probe.
    pub fn retries(&self) -> u8 {
        self.retries
    }

    /// Configuration this connection was opened with.
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Returns true while a socket is held.
    pub fn is_connected(&self) -> bool {
        self.transport.as_ref().is_some_and(Transport::is_connected)
    }

    /// Bytes queued for sending.
    pub fn queue_len(&self) -> usize {
        self.transport.as_ref().map_or(0, Transport::outbound_len)
    }

    /// Bytes received and not yet consumed.
    pub fn inbound_len(&self) -> usize {
        self.transport.as_ref().map_or(0, |t| t.inbound().len())
    }

    /// Gives the connector back, dropping the connection.
    pub fn into_connector(mut self) -> Box<dyn Connector> {
        self.disconnect();
        std::mem::replace(&mut self.connector, Box::new(TcpConnector))
    }

    /// Advances the handshake.
    ///
    /// Returns `Ready` once streaming, `Busy` when the socket has to be
    /// waited on. On error the connection is torn down and left `Failed`.
    pub fn poll_open(&mut self) -> ShoutResult<IoStatus> {
        if matches!(
            self.state,
            ConnectionState::Failed | ConnectionState::Closed
        ) {
            return Err(ShoutError::InvalidState {
                operation: "open",
                state: self.state,
            });
        }
        match self.step_until_blocked() {
            Ok(status) => Ok(status),
            Err(err) => Err(self.fail(err)),
        }
    }

    fn step_until_blocked(&mut self) -> ShoutResult<IoStatus> {
        loop {
            match self.state {
                ConnectionState::Init | ConnectionState::Retrying => {
                    self.set_state(ConnectionState::Connecting);
                }
                ConnectionState::Connecting => {
                    self.connect()?;
                    self.queue_request()?;
                    self.set_state(ConnectionState::SendingRequest);
                }
                ConnectionState::SendingRequest => {
                    if self.transport_mut()?.try_flush_outbound()? == IoStatus::Busy {
                        return Ok(IoStatus::Busy);
                    }
                    self.set_state(ConnectionState::AwaitingResponse);
                }
                ConnectionState::AwaitingResponse => {
                    let transport = self
                        .transport
                        .as_ref()
                        .ok_or(TransportError::NotConnected)?;
                    let complete = self.protocol.is_response_complete(transport.inbound());
                    if !complete {
                        if self.transport_mut()?.try_fill_inbound()? == IoStatus::Busy {
                            return Ok(IoStatus::Busy);
                        }
                        continue;
                    }
                    self.handle_response()?;
                }
                ConnectionState::Streaming => return Ok(IoStatus::Ready),
                ConnectionState::Failed | ConnectionState::Closed => {
                    return Err(ShoutError::InvalidState {
                        operation: "open",
                        state: self.state,
                    });
                }
            }
        }
    }

    fn connect(&mut self) -> ShoutResult<()> {
        let port = self.config.connect_port()?;
        let transport = Transport::connect(
            self.connector.as_mut(),
            &self.config.host,
            port,
            self.config.tls,
            self.config.connect_timeout,
        )?;
        info!(
            host = %self.config.host,
            port,
            protocol = %self.config.protocol,
            tls = transport.is_tls(),
            "connected"
        );
        self.transport = Some(transport);
        Ok(())
    }

    fn queue_request(&mut self) -> ShoutResult<()> {
        let transport = self
            .transport
            .as_mut()
            .ok_or(TransportError::NotConnected)?;
        let ctx = RequestContext::new(&self.config, self.caps, transport.is_tls());
        let request = self.protocol.build_request(&ctx)?;
        debug!(bytes = request.len(), "request queued");
        transport.enqueue(&request)?;
        Ok(())
    }

    fn handle_response(&mut self) -> ShoutResult<()> {
        let outcome = {
            let transport = self
                .transport
                .as_mut()
                .ok_or(TransportError::NotConnected)?;
            self.protocol
                .parse_response(transport.inbound_mut(), &mut self.caps)?
        };
        debug!(?outcome, caps = ?self.caps, "response parsed");

        match outcome {
            HandshakeOutcome::Success => {
                info!(mount = %self.config.mount, "login accepted, streaming");
                self.set_state(ConnectionState::Streaming);
            }
            HandshakeOutcome::Continue => {
                self.queue_request()?;
                self.set_state(ConnectionState::SendingRequest);
            }
            HandshakeOutcome::UpgradeTls => {
                let transport = self
                    .transport
                    .as_mut()
                    .ok_or(TransportError::NotConnected)?;
                transport.start_tls(self.connector.as_mut(), &self.config.host)?;
                self.queue_request()?;
                self.set_state(ConnectionState::SendingRequest);
            }
            HandshakeOutcome::NeedRetry => {
                if self.retries >= MAX_RETRIES {
                    return Err(ShoutError::AuthenticationRejected {
                        reason: "server refused the login after a capability retry".to_string(),
                    });
                }
                self.retries += 1;
                warn!(retry = self.retries, caps = ?self.caps, "reconnecting with learned capabilities");
                self.release();
                self.protocol.reset();
                self.set_state(ConnectionState::Retrying);
            }
            HandshakeOutcome::AuthFailed { reason } => {
                return Err(ShoutError::AuthenticationRejected { reason });
            }
        }
        Ok(())
    }

    /// Queues payload and flushes as much as possible.
    pub fn send(&mut self, data: &[u8]) -> ShoutResult<IoStatus> {
        self.expect_streaming("send")?;
        let result = self
            .transport_mut()
            .and_then(|t| {
                t.enqueue(data)?;
                Ok(t.try_flush_outbound()?)
            });
        result.map_err(|err| self.fail(err))
    }

    /// Flushes queued payload.
    pub fn poll_flush(&mut self) -> ShoutResult<IoStatus> {
        self.expect_streaming("flush")?;
        let result = self
            .transport_mut()
            .and_then(|t| Ok(t.try_flush_outbound()?));
        result.map_err(|err| self.fail(err))
    }

    /// Drops the transport from any state. Calling it twice is harmless.
    pub fn disconnect(&mut self) {
        self.release();
        if self.state != ConnectionState::Closed {
            debug!(from = %self.state, "connection closed");
            self.state = ConnectionState::Closed;
        }
    }

    fn expect_streaming(&self, operation: &'static str) -> ShoutResult<()> {
        if self.state == ConnectionState::Streaming {
            Ok(())
        } else {
            Err(ShoutError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn transport_mut(&mut self) -> ShoutResult<&mut Transport> {
        Ok(self
            .transport
            .as_mut()
            .ok_or(TransportError::NotConnected)?)
    }

    fn set_state(&mut self, state: ConnectionState) {
        debug!(from = %self.state, to = %state, "state transition");
        self.state = state;
    }

    fn release(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.disconnect();
        }
    }

    /// Single teardown path for every error.
    fn fail(&mut self, err: ShoutError) -> ShoutError {
        warn!(state = %self.state, kind = %err.kind(), error = %err, "connection failed");
        self.release();
        self.state = ConnectionState::Failed;
        err
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use shoutlink_core::{ConfigError, Protocol};

    use super::*;

    #[test]
    fn state_names() {
        assert_eq!(ConnectionState::AwaitingResponse.to_string(), "awaiting response");
        assert_eq!(ConnectionState::Streaming.as_str(), "streaming");
    }

    #[test]
    fn new_validates_before_dialing() {
        let config = StreamConfig::new("", 8000).with_password("pw");
        let err = Connection::new(config, Box::new(TcpConnector)).unwrap_err();
        assert!(matches!(err, ShoutError::Config(ConfigError::MissingHost)));
    }

    #[test]
    fn fresh_connection_holds_nothing() {
        let config = StreamConfig::new("localhost", 8000)
            .with_protocol(Protocol::XAudioCast)
            .with_password("pw");
        let mut connection = Connection::new(config, Box::new(TcpConnector)).unwrap();
        assert_eq!(connection.state(), ConnectionState::Init);
        assert!(!connection.is_connected());
        assert_eq!(connection.queue_len(), 0);
        assert_eq!(connection.capabilities(), Capabilities::empty());

        let err = connection.poll_flush().unwrap_err();
        assert!(matches!(
            err,
            ShoutError::InvalidState {
                operation: "flush",
                state: ConnectionState::Init
            }
        ));
    }
}
