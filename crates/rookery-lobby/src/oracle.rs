//! The `RulesOracle` trait: where chess rules plug in.
//!
//! Rookery relays moves but doesn't know chess. Before a move is forwarded
//! to the opponent the server asks the oracle for a verdict. The default
//! [`AcceptAllOracle`] approves everything, which turns the server into a
//! pure relay and leaves validation to the clients.

use rookery_protocol::{ChessMove, MatchId, Role};

/// Everything the oracle is told about one move.
#[derive(Debug, Clone, Copy)]
pub struct MoveContext<'a> {
    pub match_id: MatchId,
    /// Side of the player who sent the move.
    pub role: Role,
    /// The move, including the client-supplied `board` if any.
    pub mv: &'a ChessMove,
}

/// What the oracle decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveVerdict {
    /// Forward the move.
    Legal,
    /// Reject the move with this reason; nothing is forwarded.
    Illegal(String),
    /// Forward the move, then end the match.
    ///
    /// `winner` is `None` for a draw (stalemate, insufficient material...).
    GameOver {
        winner: Option<Role>,
        reason: String,
    },
}

/// Validates moves and detects the end of a game.
///
/// Called synchronously from the connection task that received the move,
/// so implementations should be quick; there is no lock held around it.
///
/// # Example
///
/// ```rust
/// use rookery_lobby::{MoveContext, MoveVerdict, RulesOracle};
///
/// /// Rejects anything that isn't a square on the board.
/// struct SquaresOnly;
///
/// impl RulesOracle for SquaresOnly {
///     fn judge(&self, ctx: &MoveContext<'_>) -> MoveVerdict {
///         let on_board = |sq: &str| {
///             let b = sq.as_bytes();
///             b.len() == 2 && (b'a'..=b'h').contains(&b[0]) && (b'1'..=b'8').contains(&b[1])
///         };
///         if on_board(&ctx.mv.from) && on_board(&ctx.mv.to) {
///             MoveVerdict::Legal
///         } else {
///             MoveVerdict::Illegal("Invalid square".into())
///         }
///     }
/// }
/// ```
pub trait RulesOracle: Send + Sync + 'static {
    fn judge(&self, ctx: &MoveContext<'_>) -> MoveVerdict;
}

/// Approves every move.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllOracle;

impl RulesOracle for AcceptAllOracle {
    fn judge(&self, _ctx: &MoveContext<'_>) -> MoveVerdict {
        MoveVerdict::Legal
    }
}
