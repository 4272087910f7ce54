//! # Rookery
//!
//! Session server and client transport for two-player online chess.
//!
//! The server accepts TCP connections that speak newline-delimited JSON,
//! keeps a lobby of logged-in players, pairs them by challenge or quick
//! match, and relays moves, emoji and draw offers between opponents. It
//! never looks at a chess position itself; plug in a [`RulesOracle`] to
//! judge moves.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rookery::prelude::*;
//!
//! # async fn run() -> Result<(), RookeryError> {
//! let server = RookeryServer::builder()
//!     .bind("0.0.0.0:5001")
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```
//!
//! [`RulesOracle`]: rookery_lobby::RulesOracle

mod client;
mod error;
mod handler;
mod router;
mod server;

pub use client::{Client, EventKind};
pub use error::{RequestError, RookeryError};
pub use server::{DEFAULT_BIND, RookeryServer, RookeryServerBuilder, ServerConfig, ServerHandle};

/// Everything needed to run a server or write a client.
pub mod prelude {
    pub use crate::{
        Client, DEFAULT_BIND, EventKind, RequestError, RookeryError, RookeryServer,
        RookeryServerBuilder, ServerConfig, ServerHandle,
    };
    pub use rookery_lobby::{
        AcceptAllOracle, LobbyConfig, LobbyError, MoveContext, MoveVerdict, RulesOracle,
    };
    pub use rookery_protocol::{
        ChallengeAnswer, ChallengeCancelled, ChallengeNotice, ChallengeTarget, ChallengeVerdict,
        ChessMove, Credentials, DrawNotice, Emoji, Envelope, ErrorPayload, GameEnd, GameResult,
        GameStart, LoginAck, MatchFindAck, MatchFindStatus, MatchId, MessageType, MoveAck,
        PlayerList, RegisterAck, Request, ResponseCode, Role, end_reason,
    };
    pub use rookery_session::{AllowAllAuthenticator, Authenticator, SessionError};
}
