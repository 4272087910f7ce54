//! Session registry: the owner of every live [`Session`].
//!
//! The registry is an arena keyed by [`ConnectionId`] with a secondary
//! index from session token to connection, which the router uses to check
//! a request's `sessionToken`. It owns each session for the connection's
//! lifetime. The connection handler holds one more strong reference, and
//! lobby outboxes hold one briefly while delivering; seats and the player
//! directory keep only `Weak` references.
//!
//! Removing a session is also the teardown gate. Two code paths try to
//! clean up a closed connection (the handler's normal exit and its drop
//! guard), and only the one that gets `Some` back from
//! [`remove`](SessionRegistry::remove) goes on to notify the lobby.

use std::collections::HashMap;
use std::sync::Arc;

use rookery_transport::ConnectionId;

use crate::Session;

/// Tracks all live sessions.
///
/// Not thread-safe by itself; the server wraps it in a
/// `tokio::sync::Mutex`.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<ConnectionId, Arc<Session>>,
    tokens: HashMap<String, ConnectionId>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a session, replacing any previous one with the same id.
    pub fn insert(&mut self, session: Arc<Session>) {
        let id = session.id();
        self.tokens.insert(session.token().to_string(), id);
        if let Some(old) = self.sessions.insert(id, session) {
            self.tokens.remove(old.token());
        }
        tracing::info!(conn_id = %id, "session created");
    }

    /// Removes a session and its token.
    ///
    /// Returns `None` if it was already removed. Callers use that to make
    /// disconnect cleanup run exactly once.
    pub fn remove(&mut self, id: ConnectionId) -> Option<Arc<Session>> {
        let session = self.sessions.remove(&id)?;
        self.tokens.remove(session.token());
        tracing::info!(conn_id = %id, "session closed");
        Some(session)
    }

    /// The connection that was issued `token`, while it is live.
    pub fn by_token(&self, token: &str) -> Option<ConnectionId> {
        self.tokens.get(token).copied()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: u64) -> Arc<Session> {
        Session::channel(ConnectionId::new(id)).0
    }

    #[test]
    fn test_by_token_resolves_issuing_connection() {
        let mut reg = SessionRegistry::new();
        let s = session(1);
        let token = s.token().to_string();
        reg.insert(s);
        reg.insert(session(2));

        assert_eq!(reg.len(), 2);
        assert_eq!(reg.by_token(&token), Some(ConnectionId::new(1)));
        assert!(reg.by_token("not-a-token").is_none());
    }

    #[test]
    fn test_remove_twice_returns_some_then_none() {
        let mut reg = SessionRegistry::new();
        reg.insert(session(1));

        assert!(reg.remove(ConnectionId::new(1)).is_some());
        assert!(
            reg.remove(ConnectionId::new(1)).is_none(),
            "second removal must be a no-op"
        );
        assert!(reg.is_empty());
    }

    #[test]
    fn test_remove_drops_token_index() {
        let mut reg = SessionRegistry::new();
        let s = session(1);
        let token = s.token().to_string();
        reg.insert(s);
        reg.remove(ConnectionId::new(1));
        assert!(reg.by_token(&token).is_none());
    }

    #[test]
    fn test_remove_releases_registry_reference() {
        let mut reg = SessionRegistry::new();
        let s = session(1);
        let weak = Arc::downgrade(&s);
        reg.insert(s);

        assert!(weak.upgrade().is_some());
        reg.remove(ConnectionId::new(1));
        assert!(weak.upgrade().is_none(), "removal should free the session");
    }

    #[test]
    fn test_insert_same_id_replaces_old_token() {
        let mut reg = SessionRegistry::new();
        let first = session(1);
        let old_token = first.token().to_string();
        reg.insert(first);
        reg.insert(session(1));

        assert_eq!(reg.len(), 1);
        assert!(reg.by_token(&old_token).is_none());
    }
}
