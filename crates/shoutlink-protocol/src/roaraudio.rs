//! RoarAudio binary source login.
//!
//! Every message starts with a fixed 10 byte header:
//!
//! ```text
//! version(u8) command(u8) stream(u16) position(u32) datalen(u16)
//! ```
//!
//! all big endian, followed by `datalen` bytes of payload. A source login is
//! four round trips on one connection: IDENTIFY, AUTH, NEW_STREAM and
//! EXEC_STREAM. The server answers each with OK or ERROR.

use shoutlink_core::{ByteQueue, ContentFormat};
use tracing::debug;

use crate::error::{ProtocolError, ProtocolResult};
use crate::handshake::{Capabilities, Handshake, HandshakeOutcome, RequestContext};

/// Size of a message header.
pub const HEADER_LEN: usize = 10;

const VERSION: u8 = 0;
const NO_STREAM: u16 = 0xFFFF;

const CMD_IDENTIFY: u8 = 1;
const CMD_AUTH: u8 = 2;
const CMD_NEW_STREAM: u8 = 3;
const CMD_EXEC_STREAM: u8 = 5;
const CMD_OK: u8 = 254;
const CMD_ERROR: u8 = 255;

const DIR_PLAY: u32 = 1;
const NO_RELATIVE_ID: u32 = 0xFFFF_FFFF;
const DEFAULT_RATE: u32 = 44_100;
const DEFAULT_BITS: u32 = 16;
const DEFAULT_CHANNELS: u32 = 2;

const CODEC_OGG: u32 = 0x15;
const CODEC_MP3: u32 = 0x31;

/// One message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub command: u8,
    pub stream: u16,
    pub position: u32,
    pub datalen: u16,
}

impl MessageHeader {
    fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0] = VERSION;
        out[1] = self.command;
        out[2..4].copy_from_slice(&self.stream.to_be_bytes());
        out[4..8].copy_from_slice(&self.position.to_be_bytes());
        out[8..10].copy_from_slice(&self.datalen.to_be_bytes());
        out
    }

    fn decode(raw: &[u8]) -> ProtocolResult<Self> {
        if raw.len() < HEADER_LEN {
            return Err(ProtocolError::malformed("short message header"));
        }
        if raw[0] != VERSION {
            return Err(ProtocolError::malformed(format!(
                "unsupported message version {}",
                raw[0]
            )));
        }
        Ok(Self {
            command: raw[1],
            stream: u16::from_be_bytes([raw[2], raw[3]]),
            position: u32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]]),
            datalen: u16::from_be_bytes([raw[8], raw[9]]),
        })
    }
}

fn message(command: u8, stream: u16, data: &[u8]) -> ProtocolResult<Vec<u8>> {
    let datalen = u16::try_from(data.len())
        .map_err(|_| ProtocolError::encoding("message payload too large"))?;
    let header = MessageHeader {
        command,
        stream,
        position: 0,
        datalen,
    };
    let mut out = Vec::with_capacity(HEADER_LEN + data.len());
    out.extend_from_slice(&header.encode());
    out.extend_from_slice(data);
    Ok(out)
}

fn codec_for(format: ContentFormat) -> ProtocolResult<u32> {
    match format {
        ContentFormat::Ogg => Ok(CODEC_OGG),
        ContentFormat::Mp3 => Ok(CODEC_MP3),
        other => Err(ProtocolError::encoding(format!(
            "format {} cannot be carried",
            other
        ))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Identify,
    Auth,
    NewStream,
    Exec { stream: u16 },
}

/// RoarAudio handshake.
#[derive(Debug, Clone)]
pub struct RoarAudio {
    step: Step,
}

impl Default for RoarAudio {
    fn default() -> Self {
        Self::new()
    }
}

impl RoarAudio {
    pub fn new() -> Self {
        Self {
            step: Step::Identify,
        }
    }

    /// Stream id assigned by the server, once known.
    pub fn stream_id(&self) -> Option<u16> {
        match self.step {
            Step::Exec { stream } => Some(stream),
            _ => None,
        }
    }
}

impl Handshake for RoarAudio {
    fn build_request(&mut self, ctx: &RequestContext<'_>) -> ProtocolResult<Vec<u8>> {
        let config = ctx.config;
        match self.step {
            Step::Identify => {
                let mut data = Vec::with_capacity(5 + config.agent.len());
                data.push(1);
                data.extend_from_slice(&std::process::id().to_be_bytes());
                data.extend_from_slice(config.agent.as_bytes());
                message(CMD_IDENTIFY, NO_STREAM, &data)
            }
            Step::Auth => message(CMD_AUTH, NO_STREAM, &[]),
            Step::NewStream => {
                let fields = [
                    DIR_PLAY,
                    NO_RELATIVE_ID,
                    config.audio.samplerate.unwrap_or(DEFAULT_RATE),
                    DEFAULT_BITS,
                    config
                        .audio
                        .channels
                        .map(u32::from)
                        .unwrap_or(DEFAULT_CHANNELS),
                    codec_for(config.format)?,
                ];
                let data: Vec<u8> = fields.iter().flat_map(|f| f.to_be_bytes()).collect();
                message(CMD_NEW_STREAM, NO_STREAM, &data)
            }
            Step::Exec { stream } => message(CMD_EXEC_STREAM, stream, &[]),
        }
    }

    fn is_response_complete(&self, inbound: &ByteQueue) -> bool {
        let Some(raw) = inbound.peek_prefix(HEADER_LEN) else {
            return false;
        };
        match MessageHeader::decode(&raw) {
            Ok(header) => inbound.len() >= HEADER_LEN + usize::from(header.datalen),
            // Let the parser report it.
            Err(_) => true,
        }
    }

    fn parse_response(
        &mut self,
        inbound: &mut ByteQueue,
        caps: &mut Capabilities,
    ) -> ProtocolResult<HandshakeOutcome> {
        let raw = inbound
            .peek_prefix(HEADER_LEN)
            .ok_or_else(|| ProtocolError::malformed("short message header"))?;
        let header = MessageHeader::decode(&raw)?;
        inbound.take(HEADER_LEN + usize::from(header.datalen))?;

        match header.command {
            CMD_OK => {}
            CMD_ERROR => {
                return Ok(HandshakeOutcome::AuthFailed {
                    reason: format!("server refused step {:?}", self.step),
                });
            }
            other => {
                return Err(ProtocolError::malformed(format!(
                    "unexpected reply command {}",
                    other
                )));
            }
        }

        self.step = match self.step {
            Step::Identify => Step::Auth,
            Step::Auth => Step::NewStream,
            Step::NewStream => {
                if header.stream == NO_STREAM {
                    return Err(ProtocolError::malformed("no stream id assigned"));
                }
                debug!(stream = header.stream, "stream created");
                Step::Exec {
                    stream: header.stream,
                }
            }
            Step::Exec { .. } => {
                caps.insert(Capabilities::GOT_CAPS);
                return Ok(HandshakeOutcome::Success);
            }
        };
        Ok(HandshakeOutcome::Continue)
    }

    fn reset(&mut self) {
        self.step = Step::Identify;
    }
}
