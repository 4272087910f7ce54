//! `RookeryServer` builder and accept loop.
//!
//! This is the entry point for running a Rookery server. It ties together
//! all the layers: transport → protocol → session → lobby.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rookery_lobby::{AcceptAllOracle, Lobby, LobbyConfig, RulesOracle};
use rookery_protocol::JsonCodec;
use rookery_session::{AllowAllAuthenticator, Authenticator, SessionRegistry};
use rookery_transport::{ConnectionId, FrameCodec, TcpTransport, Transport};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::RookeryError;
use crate::handler::handle_connection;

/// Default bind address.
pub const DEFAULT_BIND: &str = "127.0.0.1:5001";

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Server settings collected by [`RookeryServerBuilder`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Close connections that send nothing for this long. `None` disables
    /// the limit.
    pub idle_timeout: Option<Duration>,
    /// Longest frame accepted from a client.
    pub max_frame_len: usize,
    pub lobby: LobbyConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND.to_string(),
            idle_timeout: Some(Duration::from_secs(600)),
            max_frame_len: FrameCodec::DEFAULT_MAX_FRAME_LEN,
            lobby: LobbyConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared server state passed to each connection handler task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks. The registry
/// has its own lock; the lobby locks internally.
pub(crate) struct ServerState<A: Authenticator, O: RulesOracle> {
    pub(crate) sessions: Mutex<SessionRegistry>,
    pub(crate) lobby: Lobby,
    pub(crate) auth: A,
    pub(crate) oracle: O,
    pub(crate) codec: JsonCodec,
    pub(crate) config: ServerConfig,
}

impl<A: Authenticator, O: RulesOracle> ServerState<A, O> {
    /// Tears down everything the server knows about a connection.
    ///
    /// Runs at most once per connection: only the caller that actually
    /// removes the session from the registry goes on to the lobby.
    pub(crate) async fn disconnect(&self, conn_id: ConnectionId) {
        let removed = self.sessions.lock().await.remove(conn_id);
        if let Some(session) = removed {
            self.lobby.remove_player(&session).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for configuring and starting a Rookery server.
///
/// The authenticator and rules oracle default to accepting everything.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use rookery::prelude::*;
///
/// # async fn run() -> Result<(), RookeryError> {
/// let server = RookeryServer::builder()
///     .bind("0.0.0.0:5001")
///     .idle_timeout(Some(Duration::from_secs(300)))
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct RookeryServerBuilder<A = AllowAllAuthenticator, O = AcceptAllOracle> {
    config: ServerConfig,
    auth: A,
    oracle: O,
}

impl RookeryServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            auth: AllowAllAuthenticator,
            oracle: AcceptAllOracle,
        }
    }
}

impl Default for RookeryServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Authenticator, O: RulesOracle> RookeryServerBuilder<A, O> {
    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Sets (or with `None`, disables) the idle timeout.
    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Sets the longest frame accepted from a client.
    pub fn max_frame_len(mut self, max: usize) -> Self {
        self.config.max_frame_len = max;
        self
    }

    /// Sets the lobby configuration.
    pub fn lobby_config(mut self, config: LobbyConfig) -> Self {
        self.config.lobby = config;
        self
    }

    /// Replaces the authenticator.
    pub fn authenticator<A2: Authenticator>(self, auth: A2) -> RookeryServerBuilder<A2, O> {
        RookeryServerBuilder {
            config: self.config,
            auth,
            oracle: self.oracle,
        }
    }

    /// Replaces the rules oracle.
    pub fn oracle<O2: RulesOracle>(self, oracle: O2) -> RookeryServerBuilder<A, O2> {
        RookeryServerBuilder {
            config: self.config,
            auth: self.auth,
            oracle,
        }
    }

    /// Binds the listener and returns a server ready to [`run`](RookeryServer::run).
    pub async fn build(self) -> Result<RookeryServer<A, O>, RookeryError> {
        let transport = TcpTransport::bind(&self.config.bind_addr)
            .await?
            .with_max_frame_len(self.config.max_frame_len);

        let state = Arc::new(ServerState {
            sessions: Mutex::new(SessionRegistry::new()),
            lobby: Lobby::new(self.config.lobby.clone()),
            auth: self.auth,
            oracle: self.oracle,
            codec: JsonCodec,
            config: self.config,
        });

        Ok(RookeryServer {
            transport,
            state,
            shutdown: CancellationToken::new(),
        })
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// A bound Rookery server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct RookeryServer<A: Authenticator = AllowAllAuthenticator, O: RulesOracle = AcceptAllOracle> {
    transport: TcpTransport,
    state: Arc<ServerState<A, O>>,
    shutdown: CancellationToken,
}

impl RookeryServer {
    /// Creates a new builder.
    pub fn builder() -> RookeryServerBuilder {
        RookeryServerBuilder::new()
    }
}

impl<A: Authenticator, O: RulesOracle> RookeryServer<A, O> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// A handle for observing and stopping the server from another task.
    pub fn handle(&self) -> ServerHandle<A, O> {
        ServerHandle {
            state: Arc::clone(&self.state),
            shutdown: self.shutdown.clone(),
        }
    }

    /// Runs the accept loop until the shutdown token is cancelled.
    ///
    /// Each accepted connection gets its own task and a child of the
    /// shutdown token, so stopping the server also closes every
    /// connection.
    pub async fn run(mut self) -> Result<(), RookeryError> {
        tracing::info!(addr = %self.state.config.bind_addr, "Rookery server running");

        loop {
            let accepted = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = self.transport.accept() => accepted,
            };

            match accepted {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    let cancel = self.shutdown.child_token();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state, cancel).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }

        self.transport.shutdown().await?;
        tracing::info!("Rookery server stopped");
        Ok(())
    }
}

/// Cloneable view of a running server.
pub struct ServerHandle<A: Authenticator = AllowAllAuthenticator, O: RulesOracle = AcceptAllOracle> {
    state: Arc<ServerState<A, O>>,
    shutdown: CancellationToken,
}

impl<A: Authenticator, O: RulesOracle> Clone for ServerHandle<A, O> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<A: Authenticator, O: RulesOracle> ServerHandle<A, O> {
    /// Stops the accept loop and every connection task.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// The token [`shutdown`](Self::shutdown) cancels.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Number of live connections.
    pub async fn session_count(&self) -> usize {
        self.state.sessions.lock().await.len()
    }

    /// Logged-in players, in lexicographic order.
    pub async fn online_players(&self) -> Vec<String> {
        self.state.lobby.online_players().await
    }
}
