//! Error types for the protocol layer.
//!
//! The `Display` text of most variants is written for the remote peer: the
//! server copies it into the `reason` of a `BadRequest` error envelope, so
//! keep it short and free of internal detail.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, truncated frames, wrong shapes.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The frame has no `messageType`, or it is not a string.
    #[error("Missing or invalid messageType")]
    MissingMessageType,

    /// The `messageType` names nothing this protocol knows.
    #[error("Unknown messageType: {0}")]
    UnknownMessageType(String),

    /// A known `messageType` that only the server may send.
    #[error("Unknown messageType: {0}")]
    NotARequest(String),

    /// The message type requires a payload and none was sent.
    #[error("Missing payload")]
    MissingPayload,

    /// The payload is present but has the wrong shape.
    #[error("Invalid payload: {0}")]
    InvalidPayload(serde_json::Error),

    /// A response code outside the protocol's table.
    #[error("unknown response code {0}")]
    InvalidResponseCode(u16),

    /// The message is invalid at the protocol level.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
