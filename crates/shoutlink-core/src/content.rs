//! Content format and usage negotiation.
//!
//! A stream declares a container [`ContentFormat`] and a [`Usage`] bitmask
//! describing what the container carries. Which combinations are valid is a
//! table lookup, see [`validate`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Errors raised while negotiating the content format.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContentError {
    /// The format name is not one of the supported containers.
    #[error("unknown content format: {0}")]
    UnknownFormat(String),

    /// A usage flag name could not be parsed.
    #[error("unknown usage flag: {0}")]
    UnknownUsage(String),

    /// The usage flags are not allowed for this format.
    #[error("usage {usage} is not supported for format {format}")]
    UnsupportedUsage { format: ContentFormat, usage: Usage },
}

/// Supported container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentFormat {
    /// Ogg container.
    #[default]
    Ogg,
    /// MPEG audio (MP3).
    Mp3,
    /// WebM container.
    WebM,
}

impl ContentFormat {
    /// Returns the canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ogg => "ogg",
            Self::Mp3 => "mp3",
            Self::WebM => "webm",
        }
    }
}

impl fmt::Display for ContentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentFormat {
    type Err = ContentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ogg" => Ok(Self::Ogg),
            "mp3" | "mpeg" => Ok(Self::Mp3),
            "webm" => Ok(Self::WebM),
            _ => Err(ContentError::UnknownFormat(s.to_string())),
        }
    }
}

bitflags::bitflags! {
    /// Semantic categories of the content carried by a stream.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Usage: u32 {
        const AUDIO = 0x0001;
        const VISUAL = 0x0002;
        const TEXT = 0x0004;
        const SUBTITLE = 0x0008;
        const LIGHT = 0x0010;
        const UI = 0x0020;
        const METADATA = 0x0040;
        const APPLICATION = 0x0080;
        const CONTROL = 0x0100;
        const COMPLEX = 0x0200;
        const OTHER = 0x0400;
        const UNKNOWN = 0x0800;
        const SPATIAL_3D = 0x1000;
        const SPATIAL_4D = 0x2000;
    }
}

const USAGE_NAMES: &[(&str, Usage)] = &[
    ("audio", Usage::AUDIO),
    ("visual", Usage::VISUAL),
    ("text", Usage::TEXT),
    ("subtitle", Usage::SUBTITLE),
    ("light", Usage::LIGHT),
    ("ui", Usage::UI),
    ("metadata", Usage::METADATA),
    ("application", Usage::APPLICATION),
    ("control", Usage::CONTROL),
    ("complex", Usage::COMPLEX),
    ("other", Usage::OTHER),
    ("unknown", Usage::UNKNOWN),
    ("3d", Usage::SPATIAL_3D),
    ("4d", Usage::SPATIAL_4D),
];

impl fmt::Display for Usage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<&str> = USAGE_NAMES
            .iter()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(name, _)| *name)
            .collect();
        f.write_str(&names.join(","))
    }
}

impl FromStr for Usage {
    type Err = ContentError;

    /// Parses a comma separated list such as `audio,visual`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut usage = Usage::empty();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            if part.eq_ignore_ascii_case("none") {
                continue;
            }
            let flag = USAGE_NAMES
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(part))
                .map(|(_, flag)| *flag)
                .ok_or_else(|| ContentError::UnknownUsage(part.to_string()))?;
            usage |= flag;
        }
        Ok(usage)
    }
}

impl Serialize for Usage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Usage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

struct FormatRule {
    format: ContentFormat,
    allowed: Usage,
    allow_empty: bool,
    default_usage: Usage,
}

const FORMAT_TABLE: &[FormatRule] = &[
    FormatRule {
        format: ContentFormat::Ogg,
        allowed: Usage::all(),
        allow_empty: true,
        default_usage: Usage::AUDIO,
    },
    FormatRule {
        format: ContentFormat::Mp3,
        allowed: Usage::AUDIO.union(Usage::UNKNOWN),
        allow_empty: false,
        default_usage: Usage::AUDIO,
    },
    FormatRule {
        format: ContentFormat::WebM,
        allowed: Usage::AUDIO.union(Usage::VISUAL).union(Usage::UNKNOWN),
        allow_empty: false,
        default_usage: Usage::AUDIO.union(Usage::VISUAL),
    },
];

fn rule_for(format: ContentFormat) -> &'static FormatRule {
    FORMAT_TABLE
        .iter()
        .find(|rule| rule.format == format)
        .unwrap_or(&FORMAT_TABLE[0])
}

/// Returns true if `usage` is an accepted combination for `format`.
pub fn validate(format: ContentFormat, usage: Usage) -> bool {
    let rule = rule_for(format);
    if usage.is_empty() {
        return rule.allow_empty;
    }
    rule.allowed.contains(usage)
}

/// Usage assumed when a format is given without any usage.
pub fn default_usage_for(format: ContentFormat) -> Usage {
    rule_for(format).default_usage
}

/// Resolves the effective usage for a stream, applying the default when none
/// was given and validating the result.
pub fn resolve_usage(format: ContentFormat, usage: Option<Usage>) -> Result<Usage, ContentError> {
    let usage = usage.unwrap_or_else(|| default_usage_for(format));
    if validate(format, usage) {
        Ok(usage)
    } else {
        Err(ContentError::UnsupportedUsage { format, usage })
    }
}

/// MIME type announced for a format/usage pair.
pub fn mime_type(format: ContentFormat, usage: Usage) -> &'static str {
    match format {
        ContentFormat::Ogg => {
            if usage.contains(Usage::VISUAL) {
                "video/ogg"
            } else if usage == Usage::AUDIO {
                "audio/ogg"
            } else {
                "application/ogg"
            }
        }
        ContentFormat::Mp3 => "audio/mpeg",
        ContentFormat::WebM => {
            if usage.contains(Usage::VISUAL) {
                "video/webm"
            } else {
                "audio/webm"
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_FORMATS: [ContentFormat; 3] =
        [ContentFormat::Ogg, ContentFormat::Mp3, ContentFormat::WebM];

    #[test]
    fn unknown_usage_accepted_for_every_format() {
        for format in ALL_FORMATS {
            assert!(validate(format, Usage::UNKNOWN), "{}", format);
        }
    }

    #[test]
    fn unknown_format_name_rejected() {
        assert_eq!(
            "flac".parse::<ContentFormat>(),
            Err(ContentError::UnknownFormat("flac".to_string()))
        );
        assert_eq!("MPEG".parse::<ContentFormat>(), Ok(ContentFormat::Mp3));
        assert_eq!(" webm ".parse::<ContentFormat>(), Ok(ContentFormat::WebM));
    }

    #[test]
    fn defaults_per_format() {
        assert_eq!(default_usage_for(ContentFormat::Ogg), Usage::AUDIO);
        assert_eq!(default_usage_for(ContentFormat::Mp3), Usage::AUDIO);
        assert_eq!(
            default_usage_for(ContentFormat::WebM),
            Usage::AUDIO | Usage::VISUAL
        );
    }

    #[test]
    fn empty_usage_only_for_container_format() {
        assert!(validate(ContentFormat::Ogg, Usage::empty()));
        assert!(!validate(ContentFormat::Mp3, Usage::empty()));
        assert!(!validate(ContentFormat::WebM, Usage::empty()));
    }

    #[test]
    fn restricted_combinations() {
        assert!(validate(ContentFormat::Ogg, Usage::VISUAL | Usage::SUBTITLE));
        assert!(!validate(ContentFormat::Mp3, Usage::VISUAL));
        assert!(!validate(ContentFormat::WebM, Usage::TEXT));
        assert!(validate(ContentFormat::WebM, Usage::AUDIO));
    }

    #[test]
    fn resolve_applies_default_then_validates() {
        assert_eq!(
            resolve_usage(ContentFormat::WebM, None),
            Ok(Usage::AUDIO | Usage::VISUAL)
        );
        assert_eq!(
            resolve_usage(ContentFormat::Ogg, Some(Usage::empty())),
            Ok(Usage::empty())
        );
        assert!(matches!(
            resolve_usage(ContentFormat::Mp3, Some(Usage::TEXT)),
            Err(ContentError::UnsupportedUsage { .. })
        ));
    }

    #[test]
    fn usage_parse_and_display() {
        let usage: Usage = "audio, visual".parse().unwrap();
        assert_eq!(usage, Usage::AUDIO | Usage::VISUAL);
        assert_eq!(usage.to_string(), "audio,visual");
        assert_eq!("none".parse::<Usage>(), Ok(Usage::empty()));
        assert_eq!(Usage::empty().to_string(), "none");
        assert!(matches!(
            "smell".parse::<Usage>(),
            Err(ContentError::UnknownUsage(_))
        ));
    }

    #[test]
    fn mime_types() {
        assert_eq!(mime_type(ContentFormat::Ogg, Usage::AUDIO), "audio/ogg");
        assert_eq!(
            mime_type(ContentFormat::Ogg, Usage::AUDIO | Usage::VISUAL),
            "video/ogg"
        );
        assert_eq!(mime_type(ContentFormat::Ogg, Usage::empty()), "application/ogg");
        assert_eq!(mime_type(ContentFormat::Mp3, Usage::AUDIO), "audio/mpeg");
        assert_eq!(mime_type(ContentFormat::WebM, Usage::AUDIO), "audio/webm");
        assert_eq!(
            mime_type(ContentFormat::WebM, Usage::AUDIO | Usage::VISUAL),
            "video/webm"
        );
    }
}
