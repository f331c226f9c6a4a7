//! `shoutout` configuration file.
//!
//! Settings live in `~/.config/shoutlink/config.toml` by default:
//!
//! ```toml
//! [server]
//! host = "icecast.example.org"
//! port = 8000
//! password = "env::ICECAST_SOURCE_PASSWORD"
//! protocol = "http"
//! tls = "auto"
//!
//! [stream]
//! mount = "/live.ogg"
//! format = "ogg"
//!
//! [metadata]
//! name = "My Radio"
//!
//! [audio]
//! bitrate = 128
//! ```
//!
//! Every field is optional; unset fields keep the built-in defaults and
//! command-line flags override whatever the file sets.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shoutlink_core::{AudioInfo, ContentFormat, MetaKey, Protocol, StreamConfig, TlsMode, Usage};

use crate::error::{ShoutError, ShoutResult};
use crate::secret;

/// Contents of `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub server: ServerSection,
    pub stream: StreamSection,
    pub metadata: MetadataSection,
    pub audio: AudioInfo,
}

/// `[server]`: where and how to log in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    /// Plain password or an `env::`/`pass::` reference.
    pub password: Option<String>,
    pub protocol: Option<Protocol>,
    pub tls: Option<TlsMode>,
    /// Seconds.
    pub connect_timeout: Option<u64>,
}

/// `[stream]`: what is sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StreamSection {
    pub mount: Option<String>,
    pub format: Option<ContentFormat>,
    pub usage: Option<Usage>,
    pub public: Option<bool>,
    pub dumpfile: Option<String>,
    pub agent: Option<String>,
}

/// `[metadata]`: announced stream information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetadataSection {
    pub name: Option<String>,
    pub url: Option<String>,
    pub genre: Option<String>,
    pub description: Option<String>,
}

impl FileConfig {
    /// Loads the default file, or defaults if it does not exist.
    pub fn load() -> ShoutResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads a specific file.
    pub fn load_from(path: &Path) -> ShoutResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ShoutError::config_file(path.display(), format!("cannot read: {}", e)))?;
        toml::from_str(&content)
            .map_err(|e| ShoutError::config_file(path.display(), format!("cannot parse: {}", e)))
    }

    /// Default location of `config.toml`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("shoutlink")
            .join("config.toml")
    }

    /// Renders the file back to TOML.
    pub fn to_toml(&self) -> ShoutResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ShoutError::config_file("<memory>", format!("cannot serialize: {}", e)))
    }

    /// Overlays the values set in the file onto `config`.
    ///
    /// Password references are resolved here.
    pub fn apply(&self, config: &mut StreamConfig) -> ShoutResult<()> {
        let server = &self.server;
        if let Some(ref host) = server.host {
            config.host = host.clone();
        }
        if let Some(port) = server.port {
            config.port = port;
        }
        if let Some(ref user) = server.user {
            config.user = user.clone();
        }
        if let Some(ref password) = server.password {
            let resolved = secret::resolve(password)
                .map_err(|e| ShoutError::config_file("[server] password", e))?;
            config.password = Some(resolved);
        }
        if let Some(protocol) = server.protocol {
            config.protocol = protocol;
        }
        if let Some(tls) = server.tls {
            config.tls = tls;
        }
        if let Some(secs) = server.connect_timeout {
            config.connect_timeout = Duration::from_secs(secs);
        }

        let stream = &self.stream;
        if let Some(ref mount) = stream.mount {
            config.mount = mount.clone();
        }
        if let Some(format) = stream.format {
            config.format = format;
        }
        if stream.usage.is_some() {
            config.usage = stream.usage;
        }
        if let Some(public) = stream.public {
            config.public = public;
        }
        if stream.dumpfile.is_some() {
            config.dumpfile = stream.dumpfile.clone();
        }
        if let Some(ref agent) = stream.agent {
            config.agent = agent.clone();
        }

        let meta = &self.metadata;
        for (key, value) in [
            (MetaKey::Name, &meta.name),
            (MetaKey::Url, &meta.url),
            (MetaKey::Genre, &meta.genre),
            (MetaKey::Description, &meta.description),
        ] {
            if let Some(value) = value {
                config.metadata.insert(key, value.clone());
            }
        }

        let audio = &self.audio;
        if audio.bitrate.is_some() {
            config.audio.bitrate = audio.bitrate;
        }
        if audio.samplerate.is_some() {
            config.audio.samplerate = audio.samplerate;
        }
        if audio.channels.is_some() {
            config.audio.channels = audio.channels;
        }
        if audio.quality.is_some() {
            config.audio.quality = audio.quality.clone();
        }

        Ok(())
    }
}
