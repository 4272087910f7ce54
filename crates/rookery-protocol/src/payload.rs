//! Typed payloads for every message that has one.
//!
//! All payload structs use camelCase field names on the wire. Optional
//! fields are skipped when `None` so that what the server sends stays
//! minimal, and default to `None` when a client leaves them out.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Process-unique identifier for a match.
///
/// Sent to clients as `gameId` (a bare number).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchId(pub u64);

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G-{}", self.0)
    }
}

/// Which side of the board a player is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    White,
    Black,
}

impl Role {
    /// The other side.
    pub fn opposite(self) -> Self {
        match self {
            Self::White => Self::Black,
            Self::Black => Self::White,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::White => "white",
            Self::Black => "black",
        })
    }
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

/// `AUTH_REGISTER_REQ` / `AUTH_LOGIN_REQ`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: None,
            email: None,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

/// `AUTH_LOGIN_ACK`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginAck {
    pub username: String,
    pub session_token: String,
}

/// `AUTH_REGISTER_ACK`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAck {
    pub username: String,
}

// ---------------------------------------------------------------------------
// Lobby and matchmaking
// ---------------------------------------------------------------------------

/// `LOBBY_LIST` response.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlayerList {
    pub players: Vec<String>,
}

/// Outcome of a quick-match request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchFindStatus {
    /// Queued; a `GAME_START` follows when someone else asks.
    Searching,
    /// Paired at once; `GAME_START` has already been queued.
    Matched,
}

/// `MATCH_FIND_ACK`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchFindAck {
    pub status: MatchFindStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_id: Option<MatchId>,
}

/// `CHALLENGE_REQ`: whom to challenge.
///
/// Older clients name the field `opponent` or `to`; both are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeTarget {
    #[serde(alias = "opponent", alias = "to")]
    pub username: String,
}

/// `CHALLENGE_ACCEPT` / `CHALLENGE_DECLINE`.
///
/// `challenger` lets the responder say which challenge they are answering;
/// an answer naming an overwritten challenger is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeAnswer {
    #[serde(default, alias = "from", skip_serializing_if = "Option::is_none")]
    pub challenger: Option<String>,
}

/// `CHALLENGE_RECEIVED` (to the target) and `CHALLENGE_ACK` (to the sender).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeNotice {
    pub from: String,
    pub to: String,
}

/// `CHALLENGE_RESPONSE`, sent to the challenger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeVerdict {
    pub from: String,
    pub accepted: bool,
}

/// `CHALLENGE_CANCELLED`, sent to a responder whose answer came too late.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeCancelled {
    pub challenger: String,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Match lifecycle
// ---------------------------------------------------------------------------

/// `GAME_START`, sent to both sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStart {
    pub game_id: MatchId,
    pub opponent: String,
    pub role: Role,
}

/// Result of a finished match from one side's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameResult {
    Win,
    Loss,
    Draw,
}

impl GameResult {
    /// The same result seen from the other side.
    pub fn flipped(self) -> Self {
        match self {
            Self::Win => Self::Loss,
            Self::Loss => Self::Win,
            Self::Draw => Self::Draw,
        }
    }
}

/// `GAME_END`, sent to both sides (or the survivor of a disconnect).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameEnd {
    pub game_id: MatchId,
    pub reason: String,
    pub result: GameResult,
    pub opponent: String,
}

/// Well-known `GAME_END` reasons. The rules oracle may supply others.
pub mod end_reason {
    pub const OPPONENT_DISCONNECTED: &str = "opponent_disconnected";
    pub const RESIGNATION: &str = "resignation";
    pub const DRAW_AGREED: &str = "draw_agreed";
    pub const CHECKMATE: &str = "checkmate";
    pub const STALEMATE: &str = "stalemate";
}

// ---------------------------------------------------------------------------
// In-match
// ---------------------------------------------------------------------------

/// `MOVE_REQ`.
///
/// `from`/`to` are squares in algebraic notation (`"e2"`). `board` is an
/// opaque position (usually FEN) handed to the rules oracle as is. The
/// server forwards the received JSON to the opponent, not this struct, so
/// extra fields a client adds survive the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChessMove {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promotion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board: Option<Value>,
}

impl ChessMove {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            promotion: None,
            board: None,
        }
    }
}

/// `MOVE_ACK`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveAck {
    pub status: String,
}

impl MoveAck {
    pub fn accepted() -> Self {
        Self {
            status: "accepted".into(),
        }
    }
}

/// `EMOJI_SEND` / `EMOJI_UPDATE`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Emoji {
    pub emoji: String,
}

/// `DRAW_OFFERED` / `DRAW_DECLINED` / `DRAW_ACK`: who made the offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawNotice {
    pub from: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Payload of every `ERROR` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub reason: String,
}
