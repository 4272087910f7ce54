//! Codec trait and implementations for serializing/deserializing messages.
//!
//! A "codec" (coder/decoder) converts between Rust types and the bytes of a
//! single frame. Framing itself (where one frame ends) belongs to the
//! transport; the codec only ever sees whole frames.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to frame bytes and decode them back.
///
/// - `Send + Sync` → shared by every connection task.
/// - `'static` → stored inside long-lived server and client state.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into the bytes of one frame.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes one frame back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or don't
    /// match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] that uses compact JSON (via `serde_json`).
///
/// Compact output never contains a raw newline (newlines inside strings are
/// escaped), which is what makes newline framing safe.
///
/// ```rust
/// use rookery_protocol::{Codec, Envelope, JsonCodec, MessageType, ResponseCode};
///
/// let codec = JsonCodec;
/// let envelope = Envelope::new(
///     MessageType::LobbyList,
///     ResponseCode::Ok,
///     serde_json::json!({ "players": ["alice", "bob"] }),
/// );
///
/// let bytes = codec.encode(&envelope).unwrap();
/// assert!(!bytes.contains(&b'\n'));
///
/// let decoded: Envelope = codec.decode(&bytes).unwrap();
/// assert_eq!(envelope, decoded);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_escapes_newlines_in_strings() {
        let bytes = JsonCodec
            .encode(&serde_json::json!({ "emoji": "line one\nline two" }))
            .unwrap();
        assert!(!bytes.contains(&b'\n'));
    }

    #[test]
    fn test_decode_garbage_returns_decode_error() {
        let result: Result<serde_json::Value, _> = JsonCodec.decode(b"{\"messageType\":}");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }
}
