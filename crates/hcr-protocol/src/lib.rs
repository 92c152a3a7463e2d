//! Wire protocol for hot content reload.
//!
//! Every message is a WebSocket text frame holding a JSON object with a
//! single `event` field. Frames carry no payload: the event name is the
//! whole message.
//!
//! ```text
//! client ── {"event":"hello"} ──────────► server   (on every connect)
//! client ◄─ {"event":"hello"} ─────────── server   (same session only)
//! client ◄─ {"event":"props_changed"} ─── server   (broadcast)
//! ```

use serde::{Deserialize, Serialize};

/// Liveness probe name, used in both directions.
pub const HELLO_EVENT: &str = "hello";

/// A single protocol message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Message name.
    pub event: String,
}

/// Error encoding or decoding a frame.
#[derive(Debug, thiserror::Error)]
#[error("Invalid frame: {0}")]
pub struct ProtocolError(#[from] serde_json::Error);

impl Frame {
    /// Frame with the given message name.
    #[must_use]
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
        }
    }

    /// The `hello` liveness probe.
    #[must_use]
    pub fn hello() -> Self {
        Self::new(HELLO_EVENT)
    }

    /// Whether this frame is the liveness probe.
    #[must_use]
    pub fn is_hello(&self) -> bool {
        self.event == HELLO_EVENT
    }

    /// Encode as JSON text.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from JSON text.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_hello_encoding() {
        assert_eq!(Frame::hello().encode().unwrap(), r#"{"event":"hello"}"#);
    }

    #[test]
    fn test_encode_escapes_event_name() {
        let frame = Frame::new("a\"b");

        let decoded = Frame::decode(&frame.encode().unwrap()).unwrap();

        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_encode_change_event() {
        let text = Frame::new("props_changed").encode().unwrap();

        assert_eq!(text, r#"{"event":"props_changed"}"#);
    }

    #[test]
    fn test_decode_ignores_extra_fields() {
        let frame = Frame::decode(r#"{"event":"props_changed","data":null}"#).unwrap();

        assert_eq!(frame.event, "props_changed");
        assert!(!frame.is_hello());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(Frame::decode("hello").is_err());
        assert!(Frame::decode(r#"{"name":"hello"}"#).is_err());
    }
}
