//! Wire protocols for shoutlink source connections.
//!
//! Each protocol implements [`Handshake`]: it serializes requests, tells
//! when a full response has been buffered and turns that response into a
//! [`HandshakeOutcome`]. [`ProtocolImpl`] picks the variant at runtime.
//!
//! Nothing in this crate performs I/O; requests and responses move through
//! [`shoutlink_core::ByteQueue`]s owned by the caller.

pub mod encode;
pub mod error;
pub mod handshake;
pub mod http;
pub mod icy;
pub mod roaraudio;
pub mod variant;
pub mod xaudiocast;

pub use encode::{basic_auth, encode_resource};
pub use error::{ProtocolError, ProtocolResult};
pub use handshake::{Capabilities, Handshake, HandshakeOutcome, RequestContext};
pub use http::Http;
pub use icy::Icy;
pub use roaraudio::RoarAudio;
pub use variant::ProtocolImpl;
pub use xaudiocast::XAudioCast;
