//! Session: the server's record of one connected socket.
//!
//! A session tracks:
//! - WHO is on the socket (`username`, empty until login)
//! - WHERE they sit (`seat`, present only during a match)
//! - HOW to reach them (`outbound`, drained by the connection's writer task)
//!
//! Everything mutable sits behind a small `std::sync` lock. None of them is
//! ever held across an `.await`, so the blocking locks are fine inside
//! async code and keep the accessors synchronous.

use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use rand::Rng;
use rookery_protocol::{Envelope, MatchId, Role};
use rookery_transport::ConnectionId;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Seat
// ---------------------------------------------------------------------------

/// A session's place in an active match.
///
/// `opponent` is `Weak`: a seat never keeps the other player alive. The
/// lobby sets both seats of a match together and clears them together, so
/// while a seat exists the opponent's seat points back at this session.
#[derive(Debug, Clone)]
pub struct Seat {
    pub match_id: MatchId,
    pub role: Role,
    pub opponent: Weak<Session>,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Server-side state for one connected, possibly-authenticated socket.
#[derive(Debug)]
pub struct Session {
    id: ConnectionId,
    token: String,
    username: RwLock<Option<String>>,
    seat: Mutex<Option<Seat>>,
    outbound: mpsc::UnboundedSender<Envelope>,
}

impl Session {
    /// Creates a session that delivers outbound envelopes into `outbound`.
    ///
    /// A fresh 128-bit token is generated for it.
    pub fn new(id: ConnectionId, outbound: mpsc::UnboundedSender<Envelope>) -> Arc<Self> {
        Arc::new(Self {
            id,
            token: generate_token(),
            username: RwLock::new(None),
            seat: Mutex::new(None),
            outbound,
        })
    }

    /// Creates a session together with the receiving end of its queue.
    pub fn channel(id: ConnectionId) -> (Arc<Self>, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(id, tx), rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The session token issued at creation, hex-encoded.
    pub fn token(&self) -> &str {
        &self.token
    }

    // -- Identity --

    /// The logged-in username, or `None` before login and after logout.
    pub fn username(&self) -> Option<String> {
        self.username
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_username(&self, name: impl Into<String>) {
        *self.username.write().unwrap_or_else(PoisonError::into_inner) = Some(name.into());
    }

    /// Clears the username and returns the old one.
    pub fn clear_username(&self) -> Option<String> {
        self.username
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// A session is authorized once it has a username.
    pub fn is_authorized(&self) -> bool {
        self.username
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_deref()
            .is_some_and(|name| !name.is_empty())
    }

    // -- Seat --

    pub fn seat(&self) -> Option<Seat> {
        self.seat.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Sets the seat. Only the lobby calls this, under its own lock.
    pub fn set_seat(&self, seat: Seat) {
        *self.seat.lock().unwrap_or_else(PoisonError::into_inner) = Some(seat);
    }

    /// Clears the seat and returns the old one.
    pub fn clear_seat(&self) -> Option<Seat> {
        self.seat.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    pub fn is_in_match(&self) -> bool {
        self.seat
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// The current opponent, if seated and the opponent is still alive.
    pub fn opponent(&self) -> Option<Arc<Session>> {
        self.seat
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(|seat| seat.opponent.upgrade())
    }

    // -- Delivery --

    /// Queues an envelope for this session's writer task.
    ///
    /// Never blocks and never touches the socket. Returns `false` if the
    /// writer has already gone away, which only happens during teardown.
    pub fn send(&self, envelope: Envelope) -> bool {
        match self.outbound.send(envelope) {
            Ok(()) => true,
            Err(_) => {
                tracing::debug!(conn_id = %self.id, "outbound queue closed, dropping message");
                false
            }
        }
    }
}

/// Generates a random 128-bit token as 32 lowercase hex characters.
pub fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
