//! Error types for the Rookery server and client.
//!
//! Two families live here:
//!
//! - [`RookeryError`] wraps every sub-crate error for callers of the
//!   server and client APIs.
//! - [`RequestError`] is what a single request can fail with. It maps onto
//!   a response code and is reported to the sender as an `ERROR` envelope;
//!   it never closes the connection.

use rookery_lobby::LobbyError;
use rookery_protocol::{Envelope, ProtocolError, ResponseCode};
use rookery_session::SessionError;
use rookery_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum RookeryError {
    /// A transport-level error (bind, connect, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (auth, registration).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A lobby-level error (challenge, match, draw).
    #[error(transparent)]
    Lobby(#[from] LobbyError),

    /// The client has no open connection.
    #[error("not connected")]
    NotConnected,

    /// `connect` was called on a client that is already connected.
    #[error("already connected")]
    AlreadyConnected,
}

/// Why one request failed, in the terms the client sees.
///
/// Every variant except `Internal` carries the reason sent to the client.
/// `Internal` carries detail for the log only; the client gets a generic
/// reason.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Internal server error")]
    Internal(String),
}

impl RequestError {
    pub fn code(&self) -> ResponseCode {
        match self {
            Self::BadRequest(_) => ResponseCode::BadRequest,
            Self::Unauthorized(_) => ResponseCode::Unauthorized,
            Self::Forbidden(_) => ResponseCode::Forbidden,
            Self::NotFound(_) => ResponseCode::NotFound,
            Self::Conflict(_) => ResponseCode::Conflict,
            Self::Internal(_) => ResponseCode::ServerError,
        }
    }

    /// The `ERROR` envelope reporting this failure.
    pub fn to_envelope(&self) -> Envelope {
        Envelope::error(self.code(), self.to_string())
    }
}

impl From<LobbyError> for RequestError {
    fn from(err: LobbyError) -> Self {
        let reason = err.to_string();
        match err {
            LobbyError::NotAuthorized => Self::Unauthorized(reason),
            LobbyError::NotFound(_) => Self::NotFound(reason),
            LobbyError::SelfChallenge => Self::BadRequest(reason),
            LobbyError::Busy(_)
            | LobbyError::AlreadyOnline(_)
            | LobbyError::AlreadyInMatch
            | LobbyError::NoDrawOffer
            | LobbyError::OpponentMissing => Self::Conflict(reason),
            LobbyError::NotInMatch | LobbyError::QuickMatchDisabled => Self::Forbidden(reason),
        }
    }
}

impl From<ProtocolError> for RequestError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Decode(_) => Self::BadRequest("Invalid JSON format".into()),
            ProtocolError::Encode(e) => Self::Internal(format!("encode failed: {e}")),
            other => Self::BadRequest(other.to_string()),
        }
    }
}

impl From<SessionError> for RequestError {
    fn from(err: SessionError) -> Self {
        let reason = err.to_string();
        match err {
            SessionError::AuthFailed(_) | SessionError::InvalidToken => Self::Unauthorized(reason),
            SessionError::InvalidUsername(_) => Self::BadRequest(reason),
            SessionError::RegistrationFailed(_) => Self::Conflict(reason),
        }
    }
}
