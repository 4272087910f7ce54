//! Error types for the lobby layer.

/// Errors returned by [`Lobby`](crate::Lobby) operations.
///
/// The `Display` text is what the player sees in the `reason` of the
/// resulting `ERROR` envelope.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LobbyError {
    /// The session has not logged in.
    #[error("Not logged in")]
    NotAuthorized,

    /// No online player has this name.
    #[error("Player not found: {0}")]
    NotFound(String),

    /// The target is already playing.
    #[error("Player is busy: {0}")]
    Busy(String),

    /// A player tried to challenge themselves.
    #[error("Cannot challenge yourself")]
    SelfChallenge,

    /// Another live session is logged in under this name.
    #[error("User already online: {0}")]
    AlreadyOnline(String),

    /// The caller is already seated in a match.
    #[error("Already in a game")]
    AlreadyInMatch,

    /// The caller has no active match.
    #[error("Not in a game")]
    NotInMatch,

    /// The caller's match exists but the opponent is gone.
    #[error("Opponent not available")]
    OpponentMissing,

    /// A draw answer with no offer from the opponent to answer.
    #[error("No pending draw offer")]
    NoDrawOffer,

    /// Quick match is switched off in the lobby config.
    #[error("Quick match is disabled")]
    QuickMatchDisabled,
}
