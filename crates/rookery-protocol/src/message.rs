//! Message type names and response codes.
//!
//! Every frame on the wire carries a `messageType` string. The enum below is
//! the complete vocabulary; the strings are SCREAMING_SNAKE_CASE on the wire.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// MessageType
// ---------------------------------------------------------------------------

/// Every message type the protocol knows, in both directions.
///
/// `LOBBY_LIST` is the one name shared by a request and its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    // -- Authentication --
    AuthRegisterReq,
    AuthRegisterAck,
    AuthLoginReq,
    AuthLoginAck,
    AuthLogoutReq,
    AuthLogoutAck,

    // -- Lobby --
    LobbyList,

    // -- Matchmaking --
    MatchFindReq,
    MatchFindAck,
    ChallengeReq,
    ChallengeAck,
    ChallengeReceived,
    ChallengeAccept,
    ChallengeDecline,
    ChallengeResponse,
    ChallengeCancelled,
    GameStart,
    GameEnd,

    // -- Gameplay --
    MoveReq,
    MoveAck,
    MoveUpdate,
    DrawOffer,
    DrawAck,
    DrawOffered,
    DrawAccept,
    DrawDecline,
    DrawDeclined,
    Resign,

    // -- Interaction --
    EmojiSend,
    EmojiUpdate,

    // -- Errors --
    Error,
}

impl MessageType {
    /// Every variant, in declaration order.
    pub const ALL: [MessageType; 31] = [
        Self::AuthRegisterReq,
        Self::AuthRegisterAck,
        Self::AuthLoginReq,
        Self::AuthLoginAck,
        Self::AuthLogoutReq,
        Self::AuthLogoutAck,
        Self::LobbyList,
        Self::MatchFindReq,
        Self::MatchFindAck,
        Self::ChallengeReq,
        Self::ChallengeAck,
        Self::ChallengeReceived,
        Self::ChallengeAccept,
        Self::ChallengeDecline,
        Self::ChallengeResponse,
        Self::ChallengeCancelled,
        Self::GameStart,
        Self::GameEnd,
        Self::MoveReq,
        Self::MoveAck,
        Self::MoveUpdate,
        Self::DrawOffer,
        Self::DrawAck,
        Self::DrawOffered,
        Self::DrawAccept,
        Self::DrawDecline,
        Self::DrawDeclined,
        Self::Resign,
        Self::EmojiSend,
        Self::EmojiUpdate,
        Self::Error,
    ];

    /// The wire name of this message type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AuthRegisterReq => "AUTH_REGISTER_REQ",
            Self::AuthRegisterAck => "AUTH_REGISTER_ACK",
            Self::AuthLoginReq => "AUTH_LOGIN_REQ",
            Self::AuthLoginAck => "AUTH_LOGIN_ACK",
            Self::AuthLogoutReq => "AUTH_LOGOUT_REQ",
            Self::AuthLogoutAck => "AUTH_LOGOUT_ACK",
            Self::LobbyList => "LOBBY_LIST",
            Self::MatchFindReq => "MATCH_FIND_REQ",
            Self::MatchFindAck => "MATCH_FIND_ACK",
            Self::ChallengeReq => "CHALLENGE_REQ",
            Self::ChallengeAck => "CHALLENGE_ACK",
            Self::ChallengeReceived => "CHALLENGE_RECEIVED",
            Self::ChallengeAccept => "CHALLENGE_ACCEPT",
            Self::ChallengeDecline => "CHALLENGE_DECLINE",
            Self::ChallengeResponse => "CHALLENGE_RESPONSE",
            Self::ChallengeCancelled => "CHALLENGE_CANCELLED",
            Self::GameStart => "GAME_START",
            Self::GameEnd => "GAME_END",
            Self::MoveReq => "MOVE_REQ",
            Self::MoveAck => "MOVE_ACK",
            Self::MoveUpdate => "MOVE_UPDATE",
            Self::DrawOffer => "DRAW_OFFER",
            Self::DrawAck => "DRAW_ACK",
            Self::DrawOffered => "DRAW_OFFERED",
            Self::DrawAccept => "DRAW_ACCEPT",
            Self::DrawDecline => "DRAW_DECLINE",
            Self::DrawDeclined => "DRAW_DECLINED",
            Self::Resign => "RESIGN",
            Self::EmojiSend => "EMOJI_SEND",
            Self::EmojiUpdate => "EMOJI_UPDATE",
            Self::Error => "ERROR",
        }
    }

    /// Returns `true` for types a client may send to the server.
    pub fn is_request(self) -> bool {
        matches!(
            self,
            Self::AuthRegisterReq
                | Self::AuthLoginReq
                | Self::AuthLogoutReq
                | Self::LobbyList
                | Self::MatchFindReq
                | Self::ChallengeReq
                | Self::ChallengeAccept
                | Self::ChallengeDecline
                | Self::MoveReq
                | Self::EmojiSend
                | Self::DrawOffer
                | Self::DrawAccept
                | Self::DrawDecline
                | Self::Resign
        )
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownMessageType(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// ResponseCode
// ---------------------------------------------------------------------------

/// HTTP-style status carried by every server → client envelope.
///
/// Serialized as the bare number (`"responseCode": 404`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
pub enum ResponseCode {
    Ok,
    Created,
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    ServerError,
}

impl ResponseCode {
    /// The numeric value on the wire.
    pub fn as_u16(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::Created => 201,
            Self::BadRequest => 400,
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::ServerError => 500,
        }
    }

    /// Returns `true` for 2xx codes.
    pub fn is_success(self) -> bool {
        self.as_u16() < 300
    }
}

impl From<ResponseCode> for u16 {
    fn from(code: ResponseCode) -> Self {
        code.as_u16()
    }
}

impl TryFrom<u16> for ResponseCode {
    type Error = ProtocolError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Ok(match value {
            200 => Self::Ok,
            201 => Self::Created,
            400 => Self::BadRequest,
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            409 => Self::Conflict,
            500 => Self::ServerError,
            other => return Err(ProtocolError::InvalidResponseCode(other)),
        })
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_str_matches_serde_name_for_every_variant() {
        // `as_str` and the serde rename are two spellings of the same
        // table; a typo in either breaks the wire.
        for ty in MessageType::ALL {
            let json = serde_json::to_value(ty).unwrap();
            assert_eq!(json, serde_json::Value::String(ty.as_str().into()));
        }
    }

    #[test]
    fn test_from_str_parses_every_wire_name() {
        for ty in MessageType::ALL {
            assert_eq!(ty.as_str().parse::<MessageType>().unwrap(), ty);
        }
    }

    #[test]
    fn test_from_str_unknown_names_the_type() {
        let err = "FLY_TO_MOON".parse::<MessageType>().unwrap_err();
        assert_eq!(err.to_string(), "Unknown messageType: FLY_TO_MOON");
    }

    #[test]
    fn test_is_request_excludes_server_only_types() {
        assert!(MessageType::MoveReq.is_request());
        assert!(MessageType::LobbyList.is_request());
        assert!(!MessageType::MoveUpdate.is_request());
        assert!(!MessageType::GameStart.is_request());
        assert!(!MessageType::Error.is_request());
    }

    #[test]
    fn test_response_code_serializes_as_number() {
        assert_eq!(serde_json::to_string(&ResponseCode::NotFound).unwrap(), "404");
        let code: ResponseCode = serde_json::from_str("201").unwrap();
        assert_eq!(code, ResponseCode::Created);
    }

    #[test]
    fn test_response_code_rejects_unknown_number() {
        let result: Result<ResponseCode, _> = serde_json::from_str("418");
        assert!(result.is_err());
    }

    #[test]
    fn test_response_code_is_success() {
        assert!(ResponseCode::Ok.is_success());
        assert!(ResponseCode::Created.is_success());
        assert!(!ResponseCode::Conflict.is_success());
    }
}
