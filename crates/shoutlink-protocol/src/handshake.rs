//! The contract shared by every protocol variant.

use shoutlink_core::{ByteQueue, StreamConfig};

use crate::error::ProtocolResult;

bitflags::bitflags! {
    /// What the dispatcher has learned about the server so far.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Capabilities: u32 {
        /// A first handshake attempt has been answered; the probe is over.
        const GOT_CAPS = 1 << 0;
        /// The server accepts `PUT` sources.
        const PUT = 1 << 1;
        /// The server accepts `SOURCE` sources.
        const SOURCE = 1 << 2;
    }
}

/// Result of parsing one complete server response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// Login accepted; payload may be sent.
    Success,
    /// Response accepted; the next request of the exchange follows on the
    /// same transport.
    Continue,
    /// The server agreed to switch the transport to TLS in-band.
    UpgradeTls,
    /// The attempt was a capability probe the server did not understand;
    /// reconnect and send a fresh request.
    NeedRetry,
    /// Well-formed negative answer.
    AuthFailed { reason: String },
}

/// Inputs for building a request.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'a> {
    /// Stream configuration, read-only during the handshake.
    pub config: &'a StreamConfig,
    /// Capabilities learned so far.
    pub caps: Capabilities,
    /// Whether the transport is already encrypted.
    pub tls_active: bool,
}

impl<'a> RequestContext<'a> {
    /// Creates a context for a fresh connection.
    pub fn new(config: &'a StreamConfig, caps: Capabilities, tls_active: bool) -> Self {
        Self {
            config,
            caps,
            tls_active,
        }
    }
}

/// Request construction, response detection and response parsing for one
/// wire protocol.
pub trait Handshake {
    /// Serializes the next request of the exchange.
    fn build_request(&mut self, ctx: &RequestContext<'_>) -> ProtocolResult<Vec<u8>>;

    /// Returns true once a full response is buffered.
    ///
    /// Must not consume anything; it is called again after every read.
    fn is_response_complete(&self, inbound: &ByteQueue) -> bool;

    /// Consumes the buffered response and decides what happens next.
    ///
    /// Only called after [`Handshake::is_response_complete`] returned true.
    fn parse_response(
        &mut self,
        inbound: &mut ByteQueue,
        caps: &mut Capabilities,
    ) -> ProtocolResult<HandshakeOutcome>;

    /// Restarts a multi-step exchange after a reconnect.
    fn reset(&mut self) {}
}

/// Returns the first line of `response` without its terminator.
pub(crate) fn first_line(response: &[u8]) -> &[u8] {
    let end = response
        .iter()
        .position(|b| *b == b'\n')
        .unwrap_or(response.len());
    let line = &response[..end];
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Returns true if `haystack` contains the bytes `OK`.
pub(crate) fn contains_ok(haystack: &[u8]) -> bool {
    haystack.windows(2).any(|w| w == b"OK")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_line_strips_terminators() {
        assert_eq!(first_line(b"OK2\r\nicy-caps:11\r\n"), b"OK2");
        assert_eq!(first_line(b"no newline"), b"no newline");
        assert_eq!(first_line(b"\n"), b"");
    }

    #[test]
    fn ok_marker() {
        assert!(contains_ok(b"OK"));
        assert!(contains_ok(b"HTTP/1.0 200 OK"));
        assert!(!contains_ok(b"Ok"));
        assert!(!contains_ok(b"O"));
    }
}
