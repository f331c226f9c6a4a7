//! XAudioCast (Icecast 1) source login.
//!
//! The request is a `SOURCE <password> <mount>` line followed by
//! `x-audiocast-*` headers and a blank line. The server answers with a
//! single line containing `OK` on success.
//!
//! Old servers reject a first attempt from clients they have never seen,
//! so a negative first answer is treated as a capability probe and the
//! login is retried once on a fresh connection.

use shoutlink_core::{ByteQueue, MetaKey};
use tracing::debug;

use crate::encode::{encode_resource, header_value};
use crate::error::ProtocolResult;
use crate::handshake::{
    Capabilities, Handshake, HandshakeOutcome, RequestContext, contains_ok, first_line,
};

/// Announced when no url is configured.
pub const DEFAULT_URL: &str = "http://www.icecast.org/";

/// Announced when no genre is configured.
pub const DEFAULT_GENRE: &str = "icecast";

/// Announced when no description is configured.
pub const DEFAULT_DESCRIPTION: &str = "Broadcasting with the icecast streaming media server!";

/// XAudioCast handshake.
#[derive(Debug, Default, Clone)]
pub struct XAudioCast;

impl XAudioCast {
    pub fn new() -> Self {
        Self
    }
}

impl Handshake for XAudioCast {
    fn build_request(&mut self, ctx: &RequestContext<'_>) -> ProtocolResult<Vec<u8>> {
        let config = ctx.config;
        let mut lines = vec![format!(
            "SOURCE {} {}",
            header_value("password", config.password_or_empty())?,
            encode_resource(&config.mount)
        )];

        if let Some(name) = config.meta(MetaKey::Name) {
            lines.push(format!("x-audiocast-name: {}", header_value("name", name)?));
        }
        let url = config.meta(MetaKey::Url).unwrap_or(DEFAULT_URL);
        let genre = config.meta(MetaKey::Genre).unwrap_or(DEFAULT_GENRE);
        let description = config
            .meta(MetaKey::Description)
            .unwrap_or(DEFAULT_DESCRIPTION);

        lines.push(format!("x-audiocast-url: {}", header_value("url", url)?));
        lines.push(format!("x-audiocast-genre: {}", header_value("genre", genre)?));
        lines.push(format!(
            "x-audiocast-bitrate: {}",
            config.audio.bitrate.unwrap_or(0)
        ));
        lines.push(format!("x-audiocast-public: {}", u8::from(config.public)));
        lines.push(format!(
            "x-audiocast-description: {}",
            header_value("description", description)?
        ));
        if let Some(ref dumpfile) = config.dumpfile {
            lines.push(format!(
                "x-audiocast-dumpfile: {}",
                header_value("dumpfile", dumpfile)?
            ));
        }

        let mut request = lines.join("\n");
        request.push_str("\n\n");
        Ok(request.into_bytes())
    }

    fn is_response_complete(&self, inbound: &ByteQueue) -> bool {
        inbound.peek_find(b'\n').is_some()
    }

    fn parse_response(
        &mut self,
        inbound: &mut ByteQueue,
        caps: &mut Capabilities,
    ) -> ProtocolResult<HandshakeOutcome> {
        let response = inbound.drain_all()?;
        let line = first_line(&response);

        if contains_ok(line) {
            caps.insert(Capabilities::GOT_CAPS);
            return Ok(HandshakeOutcome::Success);
        }

        let reason = String::from_utf8_lossy(line).trim().to_string();
        if !caps.contains(Capabilities::GOT_CAPS) {
            debug!(response = %reason, "xaudiocast login refused on first attempt");
            caps.insert(Capabilities::GOT_CAPS);
            return Ok(HandshakeOutcome::NeedRetry);
        }
        Ok(HandshakeOutcome::AuthFailed { reason })
    }
}

#[cfg(test)]
mod tests {
    use shoutlink_core::{AudioInfo, Protocol, StreamConfig};

    use super::*;
    use crate::error::ProtocolError;

    fn config() -> StreamConfig {
        StreamConfig::new("localhost", 8000)
            .with_protocol(Protocol::XAudioCast)
            .with_mount("/a b.ogg")
            .with_password("pw")
    }

    fn build(config: &StreamConfig) -> ProtocolResult<String> {
        let ctx = RequestContext::new(config, Capabilities::empty(), false);
        XAudioCast::new()
            .build_request(&ctx)
            .map(|bytes| String::from_utf8(bytes).unwrap())
    }

    fn queue(bytes: &[u8]) -> ByteQueue {
        let mut queue = ByteQueue::new();
        queue.push(bytes).unwrap();
        queue
    }

    #[test]
    fn default_request_is_exact() {
        let expected = "SOURCE pw /a%20b.ogg\n\
x-audiocast-url: http://www.icecast.org/\n\
x-audiocast-genre: icecast\n\
x-audiocast-bitrate: 0\n\
x-audiocast-public: 0\n\
x-audiocast-description: Broadcasting with the icecast streaming media server!\n\
\n";
        assert_eq!(build(&config()).unwrap(), expected);
    }

    #[test]
    fn request_with_metadata() {
        let config = config()
            .with_meta(MetaKey::Name, "Test FM")
            .with_meta(MetaKey::Genre, "jazz")
            .with_public(true)
            .with_dumpfile("dump.ogg")
            .with_audio(AudioInfo {
                bitrate: Some(128),
                ..Default::default()
            });
        let request = build(&config).unwrap();
        assert!(request.starts_with("SOURCE pw /a%20b.ogg\nx-audiocast-name: Test FM\n"));
        assert!(request.contains("x-audiocast-genre: jazz\n"));
        assert!(request.contains("x-audiocast-bitrate: 128\n"));
        assert!(request.contains("x-audiocast-public: 1\n"));
        assert!(request.ends_with("x-audiocast-dumpfile: dump.ogg\n\n"));
    }

    #[test]
    fn line_break_in_metadata_rejected() {
        let config = config().with_meta(MetaKey::Name, "evil\nSOURCE");
        assert!(matches!(build(&config), Err(ProtocolError::Encoding(_))));
    }

    #[test]
    fn complete_only_after_newline() {
        let handshake = XAudioCast::new();
        let mut inbound = queue(b"O");
        assert!(!handshake.is_response_complete(&inbound));
        inbound.push(b"K").unwrap();
        assert!(!handshake.is_response_complete(&inbound));
        inbound.push(b"\n").unwrap();
        assert!(handshake.is_response_complete(&inbound));
    }

    #[test]
    fn ok_is_success() {
        let mut caps = Capabilities::empty();
        let mut inbound = queue(b"OK\n");
        let outcome = XAudioCast::new()
            .parse_response(&mut inbound, &mut caps)
            .unwrap();
        assert_eq!(outcome, HandshakeOutcome::Success);
        assert!(caps.contains(Capabilities::GOT_CAPS));
        assert!(inbound.is_empty());
    }

    #[test]
    fn first_refusal_retries_then_fails() {
        let mut handshake = XAudioCast::new();
        let mut caps = Capabilities::empty();

        let mut inbound = queue(b"ERROR - Bad Password\n");
        let outcome = handshake.parse_response(&mut inbound, &mut caps).unwrap();
        assert_eq!(outcome, HandshakeOutcome::NeedRetry);
        assert!(caps.contains(Capabilities::GOT_CAPS));

        let mut inbound = queue(b"ERROR - Bad Password\n");
        let outcome = handshake.parse_response(&mut inbound, &mut caps).unwrap();
        assert_eq!(
            outcome,
            HandshakeOutcome::AuthFailed {
                reason: "ERROR - Bad Password".to_string()
            }
        );
    }

    #[test]
    fn ok_must_be_on_first_line() {
        let mut caps = Capabilities::GOT_CAPS;
        let mut inbound = queue(b"DENIED\nOK\n");
        let outcome = XAudioCast::new()
            .parse_response(&mut inbound, &mut caps)
            .unwrap();
        assert!(matches!(outcome, HandshakeOutcome::AuthFailed { .. }));
    }
}
