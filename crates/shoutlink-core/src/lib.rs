//! Core types for shoutlink: byte queue, content negotiation, stream
//! configuration and tracing setup.

pub mod config;
pub mod content;
pub mod queue;
pub mod tracing;

pub use config::{
    AudioInfo, ConfigError, DEFAULT_AGENT, DEFAULT_PORT, DEFAULT_USER, MetaKey, Protocol,
    StreamConfig, TlsMode, parse_port,
};
pub use content::{
    ContentError, ContentFormat, Usage, default_usage_for, mime_type, resolve_usage, validate,
};
pub use queue::{ByteQueue, QueueError, QueueResult};
pub use crate::tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
