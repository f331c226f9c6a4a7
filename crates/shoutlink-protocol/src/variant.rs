//! Runtime selection of the protocol variant.

use shoutlink_core::{ByteQueue, Protocol};

use crate::error::ProtocolResult;
use crate::handshake::{Capabilities, Handshake, HandshakeOutcome, RequestContext};
use crate::http::Http;
use crate::icy::Icy;
use crate::roaraudio::RoarAudio;
use crate::xaudiocast::XAudioCast;

/// The closed set of supported wire protocols.
#[derive(Debug, Clone)]
pub enum ProtocolImpl {
    Http(Http),
    Icy(Icy),
    XAudioCast(XAudioCast),
    RoarAudio(RoarAudio),
}

impl ProtocolImpl {
    /// Creates the variant for `protocol` in its initial state.
    pub fn for_protocol(protocol: Protocol) -> Self {
        match protocol {
            Protocol::Http => Self::Http(Http::new()),
            Protocol::Icy => Self::Icy(Icy::new()),
            Protocol::XAudioCast => Self::XAudioCast(XAudioCast::new()),
            Protocol::RoarAudio => Self::RoarAudio(RoarAudio::new()),
        }
    }

    /// Returns the protocol this variant speaks.
    pub fn protocol(&self) -> Protocol {
        match self {
            Self::Http(_) => Protocol::Http,
            Self::Icy(_) => Protocol::Icy,
            Self::XAudioCast(_) => Protocol::XAudioCast,
            Self::RoarAudio(_) => Protocol::RoarAudio,
        }
    }

    fn inner(&self) -> &dyn Handshake {
        match self {
            Self::Http(p) => p,
            Self::Icy(p) => p,
            Self::XAudioCast(p) => p,
            Self::RoarAudio(p) => p,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Handshake {
        match self {
            Self::Http(p) => p,
            Self::Icy(p) => p,
            Self::XAudioCast(p) => p,
            Self::RoarAudio(p) => p,
        }
    }
}

impl Handshake for ProtocolImpl {
    fn build_request(&mut self, ctx: &RequestContext<'_>) -> ProtocolResult<Vec<u8>> {
        self.inner_mut().build_request(ctx)
    }

    fn is_response_complete(&self, inbound: &ByteQueue) -> bool {
        self.inner().is_response_complete(inbound)
    }

    fn parse_response(
        &mut self,
        inbound: &mut ByteQueue,
        caps: &mut Capabilities,
    ) -> ProtocolResult<HandshakeOutcome> {
        self.inner_mut().parse_response(inbound, caps)
    }

    fn reset(&mut self) {
        self.inner_mut().reset();
    }
}
