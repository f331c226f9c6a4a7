//! Stream configuration.
//!
//! [`StreamConfig`] gathers everything needed to log in as a source: where
//! to connect, which wire protocol and TLS mode to use, what content is sent
//! and the metadata announced to listeners.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::content::{self, ContentError, ContentFormat, Usage};

/// Default server port.
pub const DEFAULT_PORT: u16 = 8000;

/// Default source user name.
pub const DEFAULT_USER: &str = "source";

/// Default user agent announced to the server.
pub const DEFAULT_AGENT: &str = concat!("shoutlink/", env!("CARGO_PKG_VERSION"));

/// Errors raised by configuration validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// No host was configured.
    #[error("host is not set")]
    MissingHost,

    /// The port is zero or otherwise unusable.
    #[error("invalid port: {0}")]
    InvalidPort(String),

    /// The mount point is empty or not absolute.
    #[error("invalid mount point: {0:?}")]
    InvalidMount(String),

    /// The protocol needs a password and none was set.
    #[error("password is required for protocol {0}")]
    MissingPassword(Protocol),

    /// The protocol does not carry this content format.
    #[error("protocol {protocol} does not support format {format}")]
    UnsupportedFormat {
        protocol: Protocol,
        format: ContentFormat,
    },

    /// The TLS mode cannot be used with this protocol.
    #[error("TLS mode {tls} is not supported by protocol {protocol}")]
    UnsupportedTlsMode { protocol: Protocol, tls: TlsMode },

    /// The value does not name a known option.
    #[error("unknown {kind}: {value}")]
    UnknownValue { kind: &'static str, value: String },

    /// Format/usage negotiation failed.
    #[error(transparent)]
    Content(#[from] ContentError),
}

/// Wire protocol used for the source handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// HTTP `PUT`/`SOURCE` request (Icecast 2).
    #[default]
    Http,
    /// Legacy ICY (SHOUTcast v1).
    Icy,
    /// XAudioCast (Icecast 1).
    XAudioCast,
    /// RoarAudio binary protocol.
    RoarAudio,
}

impl Protocol {
    /// Returns the canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Icy => "icy",
            Self::XAudioCast => "xaudiocast",
            Self::RoarAudio => "roaraudio",
        }
    }

    /// Formats the protocol can carry.
    pub fn supports_format(&self, format: ContentFormat) -> bool {
        match self {
            Self::Http => true,
            Self::XAudioCast | Self::RoarAudio => {
                matches!(format, ContentFormat::Ogg | ContentFormat::Mp3)
            }
            Self::Icy => format == ContentFormat::Mp3,
        }
    }

    /// Whether the protocol authenticates with the configured password.
    pub fn requires_password(&self) -> bool {
        !matches!(self, Self::RoarAudio)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "icy" => Ok(Self::Icy),
            "xaudiocast" => Ok(Self::XAudioCast),
            "roaraudio" | "roar" => Ok(Self::RoarAudio),
            _ => Err(ConfigError::UnknownValue {
                kind: "protocol",
                value: s.to_string(),
            }),
        }
    }
}

/// How TLS is negotiated on the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TlsMode {
    /// Plain TCP only.
    Disabled,
    /// Try TLS first, fall back to plain TCP if the peer refuses it.
    #[default]
    Auto,
    /// Try TLS, never fall back to plain TCP.
    AutoNoPlain,
    /// TLS handshake right after the TCP connect (RFC 2818).
    ForcedAtConnect,
    /// In-band upgrade after the first request (RFC 2817, HTTP only).
    ForcedAfterRequest,
}

impl TlsMode {
    /// Returns the canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Auto => "auto",
            Self::AutoNoPlain => "auto-no-plain",
            Self::ForcedAtConnect => "forced-at-connect",
            Self::ForcedAfterRequest => "forced-after-request",
        }
    }
}

impl fmt::Display for TlsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TlsMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disabled" | "off" => Ok(Self::Disabled),
            "auto" => Ok(Self::Auto),
            "auto-no-plain" => Ok(Self::AutoNoPlain),
            "forced-at-connect" | "rfc2818" => Ok(Self::ForcedAtConnect),
            "forced-after-request" | "rfc2817" => Ok(Self::ForcedAfterRequest),
            _ => Err(ConfigError::UnknownValue {
                kind: "TLS mode",
                value: s.to_string(),
            }),
        }
    }
}

/// Metadata keys announced during the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetaKey {
    Name,
    Url,
    Genre,
    Description,
}

impl MetaKey {
    /// Returns the key name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Url => "url",
            Self::Genre => "genre",
            Self::Description => "description",
        }
    }
}

impl FromStr for MetaKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "name" => Ok(Self::Name),
            "url" => Ok(Self::Url),
            "genre" => Ok(Self::Genre),
            "description" => Ok(Self::Description),
            _ => Err(ConfigError::UnknownValue {
                kind: "metadata key",
                value: s.to_string(),
            }),
        }
    }
}

/// Technical stream parameters announced to the server.
///
/// Nothing here is computed from the payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AudioInfo {
    /// Nominal bitrate in kbit/s.
    pub bitrate: Option<u32>,
    /// Sample rate in Hz.
    pub samplerate: Option<u32>,
    /// Number of channels.
    pub channels: Option<u8>,
    /// Encoder quality setting.
    pub quality: Option<String>,
}

impl AudioInfo {
    /// Returns true when no field is set.
    pub fn is_empty(&self) -> bool {
        self.bitrate.is_none()
            && self.samplerate.is_none()
            && self.channels.is_none()
            && self.quality.is_none()
    }

    /// Renders the `key=value;...` form used by the `ice-audio-info` header.
    pub fn to_header_value(&self) -> String {
        let mut parts = Vec::new();
        if let Some(bitrate) = self.bitrate {
            parts.push(format!("bitrate={}", bitrate));
        }
        if let Some(channels) = self.channels {
            parts.push(format!("channels={}", channels));
        }
        if let Some(samplerate) = self.samplerate {
            parts.push(format!("samplerate={}", samplerate));
        }
        if let Some(ref quality) = self.quality {
            parts.push(format!("quality={}", urlencoding::encode(quality)));
        }
        parts.join(";")
    }
}

/// Everything needed to open a source connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Server host name or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Mount point, e.g. `/live.ogg`.
    pub mount: String,
    /// Source user name.
    pub user: String,
    /// Source password.
    pub password: Option<String>,
    /// Wire protocol.
    pub protocol: Protocol,
    /// TLS negotiation mode.
    pub tls: TlsMode,
    /// Container format.
    pub format: ContentFormat,
    /// Usage flags; the format default applies when unset.
    pub usage: Option<Usage>,
    /// Whether the stream is listed in public directories.
    pub public: bool,
    /// Server-side dump file name (XAudioCast only).
    pub dumpfile: Option<String>,
    /// Announced metadata.
    pub metadata: BTreeMap<MetaKey, String>,
    /// Announced audio parameters.
    pub audio: AudioInfo,
    /// User agent sent to the server.
    pub agent: String,
    /// Upper bound for establishing the TCP connection.
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            mount: "/example.ogg".to_string(),
            user: DEFAULT_USER.to_string(),
            password: None,
            protocol: Protocol::default(),
            tls: TlsMode::default(),
            format: ContentFormat::default(),
            usage: None,
            public: false,
            dumpfile: None,
            metadata: BTreeMap::new(),
            audio: AudioInfo::default(),
            agent: DEFAULT_AGENT.to_string(),
            connect_timeout: Duration::from_secs(8),
        }
    }
}

impl StreamConfig {
    /// Creates a configuration for `host:port` with defaults elsewhere.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Builder: set the mount point.
    pub fn with_mount(mut self, mount: impl Into<String>) -> Self {
        self.mount = mount.into();
        self
    }

    /// Builder: set user and password.
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = Some(password.into());
        self
    }

    /// Builder: set the password, keeping the user.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Builder: set the protocol.
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Builder: set the TLS mode.
    pub fn with_tls(mut self, tls: TlsMode) -> Self {
        self.tls = tls;
        self
    }

    /// Builder: set format and optional usage.
    pub fn with_content(mut self, format: ContentFormat, usage: Option<Usage>) -> Self {
        self.format = format;
        self.usage = usage;
        self
    }

    /// Builder: set a metadata value.
    pub fn with_meta(mut self, key: MetaKey, value: impl Into<String>) -> Self {
        self.metadata.insert(key, value.into());
        self
    }

    /// Builder: set the public flag.
    pub fn with_public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }

    /// Builder: set the audio parameters.
    pub fn with_audio(mut self, audio: AudioInfo) -> Self {
        self.audio = audio;
        self
    }

    /// Builder: set the dump file.
    pub fn with_dumpfile(mut self, dumpfile: impl Into<String>) -> Self {
        self.dumpfile = Some(dumpfile.into());
        self
    }

    /// Builder: set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Returns a metadata value.
    pub fn meta(&self, key: MetaKey) -> Option<&str> {
        self.metadata.get(&key).map(String::as_str)
    }

    /// Password or the empty string.
    pub fn password_or_empty(&self) -> &str {
        self.password.as_deref().unwrap_or("")
    }

    /// Port actually dialed; ICY servers take sources on `port + 1`.
    pub fn connect_port(&self) -> Result<u16, ConfigError> {
        match self.protocol {
            Protocol::Icy => self
                .port
                .checked_add(1)
                .ok_or_else(|| ConfigError::InvalidPort(format!("{} (ICY uses port + 1)", self.port))),
            _ => Ok(self.port),
        }
    }

    /// Effective usage flags after applying the format default.
    pub fn effective_usage(&self) -> Result<Usage, ConfigError> {
        Ok(content::resolve_usage(self.format, self.usage)?)
    }

    /// MIME type derived from format and usage.
    pub fn mime_type(&self) -> Result<&'static str, ConfigError> {
        Ok(content::mime_type(self.format, self.effective_usage()?))
    }

    /// Checks every field before any I/O happens.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::MissingHost);
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort("0".to_string()));
        }
        self.connect_port()?;

        if self.protocol != Protocol::RoarAudio && !self.mount.starts_with('/') {
            return Err(ConfigError::InvalidMount(self.mount.clone()));
        }

        if self.protocol.requires_password() && self.password.is_none() {
            return Err(ConfigError::MissingPassword(self.protocol));
        }

        self.effective_usage()?;
        if !self.protocol.supports_format(self.format) {
            return Err(ConfigError::UnsupportedFormat {
                protocol: self.protocol,
                format: self.format,
            });
        }

        if self.tls == TlsMode::ForcedAfterRequest && self.protocol != Protocol::Http {
            return Err(ConfigError::UnsupportedTlsMode {
                protocol: self.protocol,
                tls: self.tls,
            });
        }

        Ok(())
    }
}

/// Parses a port given as a number or as a TCP service name.
///
/// Service names are looked up in `/etc/services`.
pub fn parse_port(value: &str) -> Result<u16, ConfigError> {
    let value = value.trim();
    if let Ok(port) = value.parse::<u16>() {
        if port == 0 {
            return Err(ConfigError::InvalidPort(value.to_string()));
        }
        return Ok(port);
    }

    let services = std::fs::read_to_string("/etc/services").unwrap_or_default();
    lookup_service(&services, value).ok_or_else(|| ConfigError::InvalidPort(value.to_string()))
}

/// Finds the TCP port of `name` in `services`-formatted text.
fn lookup_service(services: &str, name: &str) -> Option<u16> {
    for line in services.lines() {
        let line = line.split('#').next().unwrap_or("");
        let mut fields = line.split_whitespace();
        let (Some(service), Some(port_proto)) = (fields.next(), fields.next()) else {
            continue;
        };
        let Some((port, proto)) = port_proto.split_once('/') else {
            continue;
        };
        if proto != "tcp" {
            continue;
        }
        let matches = service == name || fields.any(|alias| alias == name);
        if matches {
            return port.parse().ok().filter(|p| *p != 0);
        }
    }
    None
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> StreamConfig {
        StreamConfig::new("radio.example.org", 8000)
            .with_mount("/live.ogg")
            .with_password("hackme")
    }

    #[test]
    fn defaults() {
        let config = StreamConfig::default();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.user, "source");
        assert_eq!(config.protocol, Protocol::Http);
        assert_eq!(config.tls, TlsMode::Auto);
        assert_eq!(config.format, ContentFormat::Ogg);
        assert!(config.agent.starts_with("shoutlink/"));
    }

    #[test]
    fn valid_config_passes() {
        assert_eq!(valid().validate(), Ok(()));
    }

    #[test]
    fn missing_host_rejected() {
        let config = StreamConfig::new("  ", 8000).with_password("x");
        assert_eq!(config.validate(), Err(ConfigError::MissingHost));
    }

    #[test]
    fn zero_port_rejected() {
        let config = valid();
        let config = StreamConfig { port: 0, ..config };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidPort(_))));
    }

    #[test]
    fn relative_mount_rejected() {
        let config = valid().with_mount("live.ogg");
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidMount("live.ogg".to_string()))
        );
    }

    #[test]
    fn password_required_except_roar() {
        let config = StreamConfig::new("h", 8000).with_mount("/m");
        assert_eq!(
            config.validate(),
            Err(ConfigError::MissingPassword(Protocol::Http))
        );
        let roar = StreamConfig::new("h", 16002)
            .with_protocol(Protocol::RoarAudio)
            .with_content(ContentFormat::Ogg, None);
        assert_eq!(roar.validate(), Ok(()));
    }

    #[test]
    fn icy_needs_room_for_port_plus_one() {
        let config = StreamConfig {
            port: u16::MAX,
            ..valid()
                .with_protocol(Protocol::Icy)
                .with_content(ContentFormat::Mp3, None)
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidPort(_))));

        let config = valid()
            .with_protocol(Protocol::Icy)
            .with_content(ContentFormat::Mp3, None);
        assert_eq!(config.connect_port(), Ok(8001));
    }

    #[test]
    fn protocol_format_support() {
        let config = valid()
            .with_protocol(Protocol::Icy)
            .with_content(ContentFormat::Ogg, None);
        assert_eq!(
            config.validate(),
            Err(ConfigError::UnsupportedFormat {
                protocol: Protocol::Icy,
                format: ContentFormat::Ogg,
            })
        );
        let config = valid()
            .with_protocol(Protocol::XAudioCast)
            .with_content(ContentFormat::WebM, None);
        assert!(config.validate().is_err());
    }

    #[test]
    fn upgrade_tls_only_for_http() {
        let config = valid()
            .with_protocol(Protocol::XAudioCast)
            .with_tls(TlsMode::ForcedAfterRequest);
        assert_eq!(
            config.validate(),
            Err(ConfigError::UnsupportedTlsMode {
                protocol: Protocol::XAudioCast,
                tls: TlsMode::ForcedAfterRequest,
            })
        );
        assert_eq!(
            valid().with_tls(TlsMode::ForcedAfterRequest).validate(),
            Ok(())
        );
    }

    #[test]
    fn invalid_usage_rejected() {
        let config = valid().with_content(ContentFormat::Mp3, Some(Usage::VISUAL));
        assert!(matches!(config.validate(), Err(ConfigError::Content(_))));
    }

    #[test]
    fn mime_from_negotiated_usage() {
        assert_eq!(valid().mime_type(), Ok("audio/ogg"));
        let config = valid().with_content(ContentFormat::WebM, None);
        assert_eq!(config.mime_type(), Ok("video/webm"));
    }

    #[test]
    fn parse_enums() {
        assert_eq!("XAudioCast".parse::<Protocol>(), Ok(Protocol::XAudioCast));
        assert_eq!("roar".parse::<Protocol>(), Ok(Protocol::RoarAudio));
        assert!("ftp".parse::<Protocol>().is_err());
        assert_eq!("rfc2818".parse::<TlsMode>(), Ok(TlsMode::ForcedAtConnect));
        assert_eq!("genre".parse::<MetaKey>(), Ok(MetaKey::Genre));
        assert!("artist".parse::<MetaKey>().is_err());
    }

    #[test]
    fn audio_info_header() {
        let info = AudioInfo {
            bitrate: Some(128),
            samplerate: Some(44100),
            channels: Some(2),
            quality: None,
        };
        assert_eq!(
            info.to_header_value(),
            "bitrate=128;channels=2;samplerate=44100"
        );
        assert!(AudioInfo::default().is_empty());
    }

    #[test]
    fn port_parsing() {
        assert_eq!(parse_port("8000"), Ok(8000));
        assert!(parse_port("0").is_err());
        assert!(parse_port("no-such-service-here").is_err());
    }

    #[test]
    fn service_lookup() {
        let services = "\
# comment line
http            80/tcp          www     # WorldWideWeb HTTP
http            80/udp
icecast         8000/tcp        shout
";
        assert_eq!(lookup_service(services, "http"), Some(80));
        assert_eq!(lookup_service(services, "www"), Some(80));
        assert_eq!(lookup_service(services, "shout"), Some(8000));
        assert_eq!(lookup_service(services, "ftp"), None);
    }

    #[test]
    fn deserialize_from_toml() {
        let config: StreamConfig = toml::from_str(
            r#"
host = "icecast.local"
port = 8443
mount = "/radio.mp3"
password = "secret"
protocol = "icy"
tls = "auto-no-plain"
format = "mp3"
usage = "audio"
public = true
connect_timeout = 3

[metadata]
name = "Test Radio"
genre = "jazz"

[audio]
bitrate = 192
"#,
        )
        .unwrap();
        assert_eq!(config.host, "icecast.local");
        assert_eq!(config.protocol, Protocol::Icy);
        assert_eq!(config.tls, TlsMode::AutoNoPlain);
        assert_eq!(config.usage, Some(Usage::AUDIO));
        assert_eq!(config.meta(MetaKey::Name), Some("Test Radio"));
        assert_eq!(config.meta(MetaKey::Url), None);
        assert_eq!(config.audio.bitrate, Some(192));
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.user, "source");
        assert_eq!(config.validate(), Ok(()));
    }
}
