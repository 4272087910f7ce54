//! Error types for the session layer.

/// Errors that can occur while authenticating or tracking sessions.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The [`Authenticator`](crate::Authenticator) rejected the credentials.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The username is empty or contains characters the lobby can't list.
    #[error("invalid username: {0}")]
    InvalidUsername(String),

    /// The account store refused to create the account.
    #[error("registration failed: {0}")]
    RegistrationFailed(String),

    /// A request carried a session token the server never issued to this
    /// connection.
    #[error("Invalid session token")]
    InvalidToken,
}
