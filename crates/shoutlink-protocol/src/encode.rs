//! Field encoding shared by the text protocols.

use base64::Engine;

use crate::error::{ProtocolError, ProtocolResult};

/// Percent-encodes a mount point, keeping the `/` separators.
pub fn encode_resource(mount: &str) -> String {
    mount
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Rejects values that would break line-oriented framing.
pub fn header_value<'a>(field: &str, value: &'a str) -> ProtocolResult<&'a str> {
    if value.contains(['\r', '\n']) {
        return Err(ProtocolError::encoding(format!(
            "{} contains a line break",
            field
        )));
    }
    Ok(value)
}

/// `Authorization` header value for HTTP Basic authentication.
pub fn basic_auth(user: &str, password: &str) -> String {
    let credentials = format!("{}:{}", user, password);
    let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
    format!("Basic {}", encoded)
}
