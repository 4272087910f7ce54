//! Authentication hook for validating player identity.
//!
//! Rookery doesn't store accounts or hash passwords itself. It defines the
//! [`Authenticator`] trait: the server calls it on `AUTH_LOGIN_REQ` and
//! `AUTH_REGISTER_REQ` and trusts whatever username it returns. Plug in an
//! account database, an external identity provider, or a mock in tests.

use rookery_protocol::Credentials;

use crate::SessionError;

/// Longest username the lobby will list.
const MAX_USERNAME_LEN: usize = 32;

/// Validates credentials and returns the canonical username.
///
/// # Trait bounds
///
/// - `Send + Sync` → shared by every connection task.
/// - `'static` → lives as long as the server.
///
/// # Example
///
/// ```rust
/// use rookery_protocol::Credentials;
/// use rookery_session::{Authenticator, SessionError};
///
/// /// Only lets in the names on a fixed guest list.
/// struct GuestList(Vec<String>);
///
/// impl Authenticator for GuestList {
///     async fn authenticate(&self, creds: &Credentials) -> Result<String, SessionError> {
///         if self.0.contains(&creds.username) {
///             Ok(creds.username.clone())
///         } else {
///             Err(SessionError::AuthFailed("not on the list".into()))
///         }
///     }
///
///     async fn register(&self, creds: &Credentials) -> Result<String, SessionError> {
///         Err(SessionError::RegistrationFailed(format!(
///             "{} must be added by an operator",
///             creds.username
///         )))
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Checks login credentials.
    ///
    /// # Returns
    /// - `Ok(username)`: the name the session will be known by
    /// - `Err(SessionError::AuthFailed)`: wrong password, unknown user, ...
    fn authenticate(
        &self,
        credentials: &Credentials,
    ) -> impl std::future::Future<Output = Result<String, SessionError>> + Send;

    /// Creates an account.
    ///
    /// # Returns
    /// - `Ok(username)`: the account now exists
    /// - `Err(SessionError::RegistrationFailed)`: name taken, store down, ...
    fn register(
        &self,
        credentials: &Credentials,
    ) -> impl std::future::Future<Output = Result<String, SessionError>> + Send;
}

/// Accepts every well-formed username and persists nothing.
///
/// Passwords are ignored. For development and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllAuthenticator;

impl Authenticator for AllowAllAuthenticator {
    async fn authenticate(&self, credentials: &Credentials) -> Result<String, SessionError> {
        validate_username(&credentials.username)?;
        Ok(credentials.username.clone())
    }

    async fn register(&self, credentials: &Credentials) -> Result<String, SessionError> {
        validate_username(&credentials.username)?;
        tracing::debug!(username = %credentials.username, "registration accepted (not persisted)");
        Ok(credentials.username.clone())
    }
}

/// Rejects names that are empty, too long, or contain whitespace or
/// control characters.
pub fn validate_username(name: &str) -> Result<(), SessionError> {
    if name.is_empty() {
        return Err(SessionError::InvalidUsername("username is empty".into()));
    }
    if name.chars().count() > MAX_USERNAME_LEN {
        return Err(SessionError::InvalidUsername(format!(
            "username is longer than {MAX_USERNAME_LEN} characters"
        )));
    }
    if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(SessionError::InvalidUsername(
            "username contains whitespace or control characters".into(),
        ));
    }
    Ok(())
}
