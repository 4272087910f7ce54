//! Player sessions for Rookery.
//!
//! This crate handles the lifecycle of one connected socket:
//!
//! 1. **Authentication**: validating who a player is ([`Authenticator`] trait)
//! 2. **Session state**: username, seat in a match, outbound queue ([`Session`])
//! 3. **Ownership**: the one place live sessions are kept ([`SessionRegistry`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Lobby Layer (above)  ← pairs sessions into matches through their seats
//!     ↕
//! Session Layer (this crate)  ← identity and per-connection state
//!     ↕
//! Protocol / Transport (below)  ← Envelope, ConnectionId
//! ```
//!
//! # Ownership
//!
//! The registry owns each session for as long as its connection is open.
//! The connection handler keeps one more strong reference, and lobby
//! outboxes hold one briefly while delivering. The lobby's directory and
//! the opponent link in a [`Seat`] are `Weak`, so once the registry and the
//! handler let go, the session is unreachable everywhere else.

#![allow(async_fn_in_trait)]

mod auth;
mod error;
mod registry;
mod session;

pub use auth::{AllowAllAuthenticator, Authenticator, validate_username};
pub use error::SessionError;
pub use registry::SessionRegistry;
pub use session::{Seat, Session, generate_token};
