//! Legacy ICY (SHOUTcast v1) source login.
//!
//! The password goes first on its own line, followed by `icy-*` headers.
//! There is no capability probe: a refusal is final.

use shoutlink_core::{ByteQueue, MetaKey};

use crate::encode::header_value;
use crate::error::{ProtocolError, ProtocolResult};
use crate::handshake::{
    Capabilities, Handshake, HandshakeOutcome, RequestContext, contains_ok, first_line,
};
use crate::xaudiocast::{DEFAULT_GENRE, DEFAULT_URL};

/// ICY handshake.
#[derive(Debug, Default, Clone)]
pub struct Icy;

impl Icy {
    pub fn new() -> Self {
        Self
    }
}

impl Handshake for Icy {
    fn build_request(&mut self, ctx: &RequestContext<'_>) -> ProtocolResult<Vec<u8>> {
        let config = ctx.config;
        let name = config.meta(MetaKey::Name).unwrap_or("");
        let url = config.meta(MetaKey::Url).unwrap_or(DEFAULT_URL);
        let genre = config.meta(MetaKey::Genre).unwrap_or(DEFAULT_GENRE);

        let lines = [
            header_value("password", config.password_or_empty())?.to_string(),
            format!("icy-name:{}", header_value("name", name)?),
            format!("icy-url:{}", header_value("url", url)?),
            "icy-irc:".to_string(),
            "icy-aim:".to_string(),
            "icy-icq:".to_string(),
            format!("icy-pub:{}", u8::from(config.public)),
            format!("icy-genre:{}", header_value("genre", genre)?),
            format!("icy-br:{}", config.audio.bitrate.unwrap_or(0)),
        ];

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
        let Some(end) = inbound.peek_find(b'\n') else {
            return Err(ProtocolError::malformed("response line is not terminated"));
        };
        let response = inbound.take(end + 1)?.unwrap_or_default();
        let line = first_line(&response);
        caps.insert(Capabilities::GOT_CAPS);

        if contains_ok(line) {
            Ok(HandshakeOutcome::Success)
        } else {
            Ok(HandshakeOutcome::AuthFailed {
                reason: String::from_utf8_lossy(line).trim().to_string(),
            })
        }
    }
}
