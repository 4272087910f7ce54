//! Wire protocol for Rookery.
//!
//! This crate defines the "language" that clients and the server speak:
//!
//! - **Message types** ([`MessageType`], [`ResponseCode`]): the vocabulary
//!   of the `messageType` and `responseCode` fields.
//! - **Envelopes** ([`Request`], [`Envelope`]): the two frame shapes,
//!   client → server and server → client.
//! - **Payloads** ([`GameStart`], [`ChessMove`], ...): typed views of the
//!   `payload` object for each message that carries one.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how a whole frame is
//!   turned into bytes and back.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (whole frames of bytes) and
//! the server (sessions and matches). It doesn't know about sockets or
//! players; it only knows what a valid message looks like.
//!
//! ```text
//! Transport (frame bytes) → Protocol (Request / Envelope) → Router
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod codec;
mod envelope;
mod error;
mod message;
mod payload;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use codec::{Codec, JsonCodec};
pub use envelope::{Envelope, Request};
pub use error::ProtocolError;
pub use message::{MessageType, ResponseCode};
pub use payload::{
    ChallengeAnswer, ChallengeCancelled, ChallengeNotice, ChallengeTarget, ChallengeVerdict,
    ChessMove, Credentials, DrawNotice, Emoji, ErrorPayload, GameEnd, GameResult, GameStart,
    LoginAck, MatchFindAck, MatchFindStatus, MatchId, MoveAck, PlayerList, RegisterAck, Role,
    end_reason,
};
