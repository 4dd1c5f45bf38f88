//! Frame decoding: raw transport payloads into [`DepthUpdate`]s.
//!
//! Decoding never fails loudly. A payload that is not valid UTF-8, not JSON,
//! or not shaped like a depth update is handed back unchanged so the caller
//! can drop it.

use crate::types::DepthUpdate;

/// A raw frame as delivered by an update source.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Text(s)
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Text(s.to_string())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(b: Vec<u8>) -> Self {
        Payload::Binary(b)
    }
}

/// Outcome of [`decode`].
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Update(DepthUpdate),
    /// The input could not be decoded and is returned as-is.
    Undecoded(Payload),
}

impl Decoded {
    /// The decoded update, or `None` for anything the caller should drop.
    pub fn into_update(self) -> Option<DepthUpdate> {
        match self {
            Decoded::Update(u) => Some(u),
            Decoded::Undecoded(_) => None,
        }
    }
}

/// Decode an owned payload.
pub fn decode(payload: Payload) -> Decoded {
    let parsed = match &payload {
        Payload::Text(text) => decode_str(text),
        Payload::Binary(bytes) => decode_slice(bytes),
    };
    match parsed {
        Some(update) => Decoded::Update(update),
        None => Decoded::Undecoded(payload),
    }
}

/// Decode a borrowed byte view as UTF-8 JSON.
pub fn decode_slice(bytes: &[u8]) -> Option<DepthUpdate> {
    let text = std::str::from_utf8(bytes).ok()?;
    decode_str(text)
}

/// Decode JSON text.
pub fn decode_str(text: &str) -> Option<DepthUpdate> {
    serde_json::from_str(text).ok()
}
