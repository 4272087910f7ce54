//! The two shapes a frame can take on the wire.
//!
//! - [`Request`]: client → server. `{messageType, payload?, sessionToken?}`
//! - [`Envelope`]: server → client. `{messageType, responseCode, payload}`
//!
//! Both carry the payload as an untyped [`serde_json::Value`]. The router
//! decides which payload struct to expect only after it has looked at the
//! `messageType`, so the payload is parsed in a second step
//! ([`Request::payload_as`], [`Envelope::payload_as`]).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ErrorPayload, MessageType, ProtocolError, ResponseCode};

// ---------------------------------------------------------------------------
// Envelope (server → client)
// ---------------------------------------------------------------------------

/// A message sent from the server to a client.
///
/// `#[serde(rename_all = "camelCase")]` gives the wire names
/// `messageType` / `responseCode`. `payload` defaults to `null` when a
/// peer omits it, which keeps the client tolerant of bare acks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub message_type: MessageType,
    pub response_code: ResponseCode,
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    /// Creates an envelope with an already-built JSON payload.
    pub fn new(message_type: MessageType, response_code: ResponseCode, payload: Value) -> Self {
        Self {
            message_type,
            response_code,
            payload,
        }
    }

    /// Creates an envelope from any serializable payload struct.
    ///
    /// The payload structs in this crate are plain data with string keys,
    /// so conversion cannot fail for them; anything that does fail is sent
    /// as `null`.
    pub fn with(
        message_type: MessageType,
        response_code: ResponseCode,
        payload: &impl Serialize,
    ) -> Self {
        Self::new(
            message_type,
            response_code,
            serde_json::to_value(payload).unwrap_or_default(),
        )
    }

    /// An `ERROR` envelope carrying `{ "reason": ... }`.
    pub fn error(code: ResponseCode, reason: impl Into<String>) -> Self {
        Self::with(
            MessageType::Error,
            code,
            &ErrorPayload {
                reason: reason.into(),
            },
        )
    }

    /// Parses the payload into a concrete type.
    ///
    /// # Errors
    /// [`ProtocolError::InvalidPayload`] if the shape does not match.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        T::deserialize(&self.payload).map_err(ProtocolError::InvalidPayload)
    }

    /// The `reason` field of the payload, if it has one.
    ///
    /// Set on every `ERROR` envelope and on `CHALLENGE_CANCELLED`.
    pub fn reason(&self) -> Option<&str> {
        self.payload.get("reason").and_then(Value::as_str)
    }

    /// Returns `true` for 2xx envelopes.
    pub fn is_success(&self) -> bool {
        self.response_code.is_success()
    }
}

// ---------------------------------------------------------------------------
// Request (client → server)
// ---------------------------------------------------------------------------

/// A message sent from a client to the server.
///
/// Serialization is derived. Parsing is hand-written in
/// [`Request::from_value`] because the server must tell apart four
/// failures that a derived `Deserialize` would collapse into one: not an
/// object, no `messageType`, an unknown `messageType`, and a server-only
/// `messageType`. Each produces a different error reason for the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub message_type: MessageType,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
}

impl Request {
    /// A request with no payload.
    pub fn new(message_type: MessageType) -> Self {
        Self {
            message_type,
            payload: Value::Null,
            session_token: None,
        }
    }

    /// A request carrying a serializable payload.
    pub fn with_payload(message_type: MessageType, payload: &impl Serialize) -> Self {
        Self {
            message_type,
            payload: serde_json::to_value(payload).unwrap_or_default(),
            session_token: None,
        }
    }

    /// Attaches a session token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Interprets an already-parsed JSON document as a request.
    ///
    /// # Errors
    /// - [`ProtocolError::InvalidMessage`] if the document is not an object
    /// - [`ProtocolError::MissingMessageType`] if `messageType` is absent or
    ///   not a string
    /// - [`ProtocolError::UnknownMessageType`] for names the protocol lacks
    /// - [`ProtocolError::NotARequest`] for server → client names
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let Value::Object(mut map) = value else {
            return Err(ProtocolError::InvalidMessage(
                "frame is not a JSON object".into(),
            ));
        };

        let message_type: MessageType = match map.get("messageType") {
            Some(Value::String(name)) => name.parse()?,
            _ => return Err(ProtocolError::MissingMessageType),
        };
        if !message_type.is_request() {
            return Err(ProtocolError::NotARequest(message_type.to_string()));
        }

        // A non-string token is treated like a wrong one: present but
        // unusable. An empty string counts as absent.
        let session_token = match map.remove("sessionToken") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.is_empty() => None,
            Some(Value::String(s)) => Some(s),
            Some(other) => Some(other.to_string()),
        };

        Ok(Self {
            message_type,
            payload: map.remove("payload").unwrap_or(Value::Null),
            session_token,
        })
    }

    /// Parses the payload into a concrete type.
    ///
    /// # Errors
    /// [`ProtocolError::MissingPayload`] if none was sent, or
    /// [`ProtocolError::InvalidPayload`] if the shape does not match.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        if self.payload.is_null() {
            return Err(ProtocolError::MissingPayload);
        }
        T::deserialize(&self.payload).map_err(ProtocolError::InvalidPayload)
    }
}

impl TryFrom<Value> for Request {
    type Error = ProtocolError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChallengeTarget, ChessMove};
    use serde_json::json;

    #[test]
    fn test_envelope_serializes_camel_case_fields() {
        let env = Envelope::new(
            MessageType::LobbyList,
            ResponseCode::Ok,
            json!({ "players": ["alice"] }),
        );
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(
            value,
            json!({
                "messageType": "LOBBY_LIST",
                "responseCode": 200,
                "payload": { "players": ["alice"] }
            })
        );
    }

    #[test]
    fn test_envelope_error_carries_reason() {
        let env = Envelope::error(ResponseCode::Forbidden, "Not in a game");
        assert_eq!(env.message_type, MessageType::Error);
        assert_eq!(env.response_code, ResponseCode::Forbidden);
        assert_eq!(env.reason(), Some("Not in a game"));
        assert!(!env.is_success());
    }

    #[test]
    fn test_envelope_missing_payload_defaults_to_null() {
        let env: Envelope =
            serde_json::from_str(r#"{"messageType":"AUTH_LOGOUT_ACK","responseCode":200}"#)
                .unwrap();
        assert!(env.payload.is_null());
    }

    #[test]
    fn test_request_from_value_reads_payload_and_token() {
        let req = Request::from_value(json!({
            "messageType": "CHALLENGE_REQ",
            "payload": { "username": "bob" },
            "sessionToken": "abc"
        }))
        .unwrap();
        assert_eq!(req.message_type, MessageType::ChallengeReq);
        assert_eq!(req.session_token.as_deref(), Some("abc"));
        let target: ChallengeTarget = req.payload_as().unwrap();
        assert_eq!(target.username, "bob");
    }

    #[test]
    fn test_request_from_value_missing_type_is_error() {
        let err = Request::from_value(json!({ "payload": {} })).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingMessageType));

        let err = Request::from_value(json!({ "messageType": 7 })).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingMessageType));
    }

    #[test]
    fn test_request_from_value_unknown_type_is_error() {
        let err = Request::from_value(json!({ "messageType": "TELEPORT" })).unwrap_err();
        assert_eq!(err.to_string(), "Unknown messageType: TELEPORT");
    }

    #[test]
    fn test_request_from_value_server_type_is_rejected() {
        let err = Request::from_value(json!({ "messageType": "GAME_START" })).unwrap_err();
        assert!(matches!(err, ProtocolError::NotARequest(_)));
    }

    #[test]
    fn test_request_from_value_non_object_is_rejected() {
        let err = Request::from_value(json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidMessage(_)));
    }

    #[test]
    fn test_request_from_value_empty_token_counts_as_absent() {
        let req = Request::from_value(json!({
            "messageType": "LOBBY_LIST",
            "sessionToken": ""
        }))
        .unwrap();
        assert!(req.session_token.is_none());
    }

    #[test]
    fn test_request_payload_as_missing_payload_is_error() {
        let req = Request::new(MessageType::MoveReq);
        let err = req.payload_as::<ChessMove>().unwrap_err();
        assert!(matches!(err, ProtocolError::MissingPayload));
    }

    #[test]
    fn test_request_payload_as_wrong_shape_is_error() {
        let req = Request::from_value(json!({
            "messageType": "MOVE_REQ",
            "payload": { "from": 12 }
        }))
        .unwrap();
        let err = req.payload_as::<ChessMove>().unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidPayload(_)));
    }

    #[test]
    fn test_request_serialize_omits_empty_fields() {
        let req = Request::new(MessageType::LobbyList);
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({ "messageType": "LOBBY_LIST" })
        );
    }
}
