//! Player directory and matchmaking for Rookery.
//!
//! The [`Lobby`] is the one place that pairs sessions up. It owns:
//!
//! - the **directory** of online players (username → session)
//! - **pending challenges**, keyed by the player being challenged
//! - the **quick-match** waiting slot
//! - outstanding **draw offers**, one per match
//!
//! and it is the only code that sets or clears a session's
//! [`Seat`](rookery_session::Seat). All of that state lives behind a single
//! lock, so a match is always created or torn down as one step: nobody can
//! observe one player seated and the other not.
//!
//! # Key types
//!
//! - [`Lobby`]: the matchmaking engine
//! - [`LobbyConfig`]: role assignment and quick-match switch
//! - [`RulesOracle`]: the seam where move legality is decided

mod config;
mod error;
mod lobby;
mod oracle;

pub use config::LobbyConfig;
pub use error::LobbyError;
pub use lobby::{ChallengeOutcome, Lobby, QuickMatch};
pub use oracle::{AcceptAllOracle, MoveContext, MoveVerdict, RulesOracle};
