//! Client transport: the player's side of the connection.
//!
//! A [`Client`] owns one TCP connection and one background receive task.
//! The receive task is event-driven: it waits on the socket (or its
//! cancellation token), decodes each frame, records the fields the client
//! needs to remember (`sessionToken`, `gameId`, `username`), queues the
//! envelope for [`recv`](Client::recv), and then calls every callback
//! registered for the envelope's [`EventKind`].
//!
//! Sending happens on the caller's task. Writes go through the
//! connection's write lock, so `send` may be called from anywhere.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use rookery_protocol::{
    ChallengeAnswer, ChallengeTarget, ChessMove, Codec, Credentials, Emoji, Envelope, JsonCodec,
    MatchId, MessageType, Request,
};
use rookery_transport::{Connection, TcpConnection};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::RookeryError;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Groups of server messages a callback can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Register, login and logout acknowledgements.
    Login,
    /// Everything about a match: start, moves, emoji, draws, end.
    GameUpdate,
    /// Challenges sent, received, answered or cancelled.
    Challenge,
    /// `LOBBY_LIST` responses.
    PlayerList,
    /// `ERROR` envelopes.
    Error,
}

impl EventKind {
    /// The event group a message type belongs to, if any.
    pub fn of(message_type: MessageType) -> Option<Self> {
        use MessageType::*;
        Some(match message_type {
            AuthRegisterAck | AuthLoginAck | AuthLogoutAck => Self::Login,
            MatchFindAck | GameStart | GameEnd | MoveAck | MoveUpdate | EmojiUpdate | DrawAck
            | DrawOffered | DrawDeclined => Self::GameUpdate,
            ChallengeAck | ChallengeReceived | ChallengeResponse | ChallengeCancelled => {
                Self::Challenge
            }
            LobbyList => Self::PlayerList,
            Error => Self::Error,
            _ => return None,
        })
    }
}

type Callback = Arc<dyn Fn(&Envelope) + Send + Sync>;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Fields captured from server messages.
#[derive(Debug, Default)]
struct Captured {
    session_token: Option<String>,
    game_id: Option<MatchId>,
    username: Option<String>,
}

/// State shared between the client handle and its receive task.
#[derive(Default)]
struct Shared {
    captured: Mutex<Captured>,
    callbacks: RwLock<HashMap<EventKind, Vec<Callback>>>,
}

impl Shared {
    /// Forgets everything captured from a previous connection. Its token
    /// would be rejected by the next one.
    fn reset(&self) {
        *self.captured.lock().unwrap_or_else(PoisonError::into_inner) = Captured::default();
    }

    fn capture(&self, envelope: &Envelope) {
        if !envelope.is_success() {
            return;
        }
        let payload = &envelope.payload;
        let mut captured = self.captured.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(token) = payload.get("sessionToken").and_then(Value::as_str) {
            captured.session_token = Some(token.to_string());
        }
        match envelope.message_type {
            MessageType::AuthLoginAck => {
                if let Some(name) = payload.get("username").and_then(Value::as_str) {
                    captured.username = Some(name.to_string());
                }
            }
            MessageType::AuthLogoutAck => {
                captured.username = None;
                captured.game_id = None;
            }
            MessageType::GameStart => {
                captured.game_id = payload.get("gameId").and_then(Value::as_u64).map(MatchId);
            }
            MessageType::GameEnd => captured.game_id = None,
            _ => {}
        }
    }

    fn dispatch(&self, envelope: &Envelope) {
        let Some(kind) = EventKind::of(envelope.message_type) else {
            return;
        };
        // Copy the list out so a callback may register another callback.
        let callbacks: Vec<Callback> = self
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
            .unwrap_or_default();
        for callback in callbacks {
            callback(envelope);
        }
    }
}

/// A live connection and its receive task.
struct Link {
    conn: Arc<TcpConnection>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// A connection to a Rookery server.
///
/// ```rust,no_run
/// use rookery::prelude::*;
///
/// # async fn play() -> Result<(), RookeryError> {
/// let mut client = Client::new("127.0.0.1:5001");
/// client.on(EventKind::Challenge, |env| println!("challenge: {:?}", env.payload));
/// client.connect().await?;
/// client.login("alice", "hunter2").await?;
///
/// while let Some(envelope) = client.recv().await {
///     if envelope.message_type == MessageType::GameStart {
///         client.send_move(&ChessMove::new("e2", "e4")).await?;
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct Client {
    addr: String,
    link: Option<Link>,
    inbound: Option<mpsc::UnboundedReceiver<Envelope>>,
    shared: Arc<Shared>,
}

impl Client {
    /// Creates an unconnected client for `addr` (`host:port`).
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            link: None,
            inbound: None,
            shared: Arc::new(Shared::default()),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    // -- Connection ----------------------------------------------------------

    /// Opens the connection and starts the receive task.
    ///
    /// # Errors
    /// [`RookeryError::AlreadyConnected`] if a live connection exists, or a
    /// transport error if the server can't be reached.
    pub async fn connect(&mut self) -> Result<(), RookeryError> {
        if self.is_connected() {
            return Err(RookeryError::AlreadyConnected);
        }
        // Reap a link whose task already ended.
        self.disconnect().await;
        self.shared.reset();

        let conn = Arc::new(TcpConnection::connect(self.addr.as_str()).await?);
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(receive_loop(
            Arc::clone(&conn),
            Arc::clone(&self.shared),
            tx,
            cancel.clone(),
        ));

        tracing::info!(addr = %self.addr, conn_id = %conn.id(), "connected to server");
        self.inbound = Some(rx);
        self.link = Some(Link { conn, cancel, task });
        Ok(())
    }

    /// Returns `true` while the receive task is running.
    pub fn is_connected(&self) -> bool {
        self.link.as_ref().is_some_and(|link| !link.task.is_finished())
    }

    /// Stops the receive task and closes the socket.
    ///
    /// Messages received before the call stay readable through
    /// [`recv`](Self::recv). The captured token, game and username are
    /// cleared. Does nothing if not connected.
    pub async fn disconnect(&mut self) {
        let Some(link) = self.link.take() else {
            return;
        };
        link.cancel.cancel();
        if let Err(e) = link.task.await {
            if e.is_panic() {
                tracing::warn!("receive task panicked");
            }
        }
        if let Err(e) = link.conn.close().await {
            tracing::debug!(error = %e, "close after disconnect failed");
        }
        self.shared.reset();
        tracing::info!(addr = %self.addr, "disconnected from server");
    }

    // -- Sending -------------------------------------------------------------

    /// Sends one request without waiting for a reply.
    ///
    /// The captured session token is attached unless the request already
    /// carries one.
    pub async fn send(&self, mut request: Request) -> Result<(), RookeryError> {
        let link = self.link.as_ref().ok_or(RookeryError::NotConnected)?;
        if request.session_token.is_none() {
            request.session_token = self.session_token();
        }
        let bytes = JsonCodec.encode(&request)?;
        link.conn.send(&bytes).await?;
        Ok(())
    }

    pub async fn register(
        &self,
        username: &str,
        password: &str,
        email: Option<&str>,
    ) -> Result<(), RookeryError> {
        let mut credentials = Credentials::new(username).with_password(password);
        credentials.email = email.map(str::to_string);
        self.send(Request::with_payload(MessageType::AuthRegisterReq, &credentials))
            .await
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<(), RookeryError> {
        let credentials = Credentials::new(username).with_password(password);
        self.send(Request::with_payload(MessageType::AuthLoginReq, &credentials))
            .await
    }

    pub async fn logout(&self) -> Result<(), RookeryError> {
        self.send(Request::new(MessageType::AuthLogoutReq)).await
    }

    pub async fn request_player_list(&self) -> Result<(), RookeryError> {
        self.send(Request::new(MessageType::LobbyList)).await
    }

    /// Asks for a quick match with whoever else is looking.
    pub async fn find_match(&self) -> Result<(), RookeryError> {
        self.send(Request::new(MessageType::MatchFindReq)).await
    }

    pub async fn challenge(&self, username: &str) -> Result<(), RookeryError> {
        let target = ChallengeTarget {
            username: username.to_string(),
        };
        self.send(Request::with_payload(MessageType::ChallengeReq, &target))
            .await
    }

    /// Accepts the pending challenge; naming the challenger guards against
    /// accepting a newer one by accident.
    pub async fn accept_challenge(&self, challenger: Option<&str>) -> Result<(), RookeryError> {
        self.answer_challenge(MessageType::ChallengeAccept, challenger)
            .await
    }

    pub async fn decline_challenge(&self, challenger: Option<&str>) -> Result<(), RookeryError> {
        self.answer_challenge(MessageType::ChallengeDecline, challenger)
            .await
    }

    async fn answer_challenge(
        &self,
        message_type: MessageType,
        challenger: Option<&str>,
    ) -> Result<(), RookeryError> {
        let request = match challenger {
            Some(name) => Request::with_payload(
                message_type,
                &ChallengeAnswer {
                    challenger: Some(name.to_string()),
                },
            ),
            None => Request::new(message_type),
        };
        self.send(request).await
    }

    pub async fn send_move(&self, mv: &ChessMove) -> Result<(), RookeryError> {
        self.send(Request::with_payload(MessageType::MoveReq, mv)).await
    }

    pub async fn send_emoji(&self, emoji: &str) -> Result<(), RookeryError> {
        let emoji = Emoji {
            emoji: emoji.to_string(),
        };
        self.send(Request::with_payload(MessageType::EmojiSend, &emoji))
            .await
    }

    pub async fn offer_draw(&self) -> Result<(), RookeryError> {
        self.send(Request::new(MessageType::DrawOffer)).await
    }

    pub async fn accept_draw(&self) -> Result<(), RookeryError> {
        self.send(Request::new(MessageType::DrawAccept)).await
    }

    pub async fn decline_draw(&self) -> Result<(), RookeryError> {
        self.send(Request::new(MessageType::DrawDecline)).await
    }

    pub async fn resign(&self) -> Result<(), RookeryError> {
        self.send(Request::new(MessageType::Resign)).await
    }

    // -- Receiving -----------------------------------------------------------

    /// Waits for the next envelope.
    ///
    /// Returns `None` once the connection has ended and everything it
    /// delivered has been read, or if the client never connected.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.inbound.as_mut()?.recv().await
    }

    /// The next envelope if one is already queued.
    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.inbound.as_mut()?.try_recv().ok()
    }

    pub fn has_message(&self) -> bool {
        self.inbound.as_ref().is_some_and(|rx| !rx.is_empty())
    }

    /// Registers a callback for a group of server messages.
    ///
    /// Callbacks run on the receive task, after the envelope has been
    /// queued for [`recv`](Self::recv). Keep them short.
    pub fn on<F>(&self, kind: EventKind, callback: F)
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.shared
            .callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push(Arc::new(callback));
    }

    // -- Captured state ------------------------------------------------------

    /// The token from the last `AUTH_LOGIN_ACK`.
    pub fn session_token(&self) -> Option<String> {
        self.captured().session_token.clone()
    }

    /// The match announced by the last `GAME_START`, until it ends.
    pub fn game_id(&self) -> Option<MatchId> {
        self.captured().game_id
    }

    /// The name the server confirmed at login.
    pub fn username(&self) -> Option<String> {
        self.captured().username.clone()
    }

    fn captured(&self) -> std::sync::MutexGuard<'_, Captured> {
        self.shared
            .captured
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Some(link) = &self.link {
            link.cancel.cancel();
        }
    }
}

/// Reads frames until the socket closes or `cancel` fires.
async fn receive_loop(
    conn: Arc<TcpConnection>,
    shared: Arc<Shared>,
    inbound: mpsc::UnboundedSender<Envelope>,
    cancel: CancellationToken,
) {
    let conn_id = conn.id();
    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => break,
            received = conn.recv() => received,
        };

        let frame = match received {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::info!(%conn_id, "server closed the connection");
                break;
            }
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "receive failed");
                break;
            }
        };

        let envelope: Envelope = match JsonCodec.decode(&frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "undecodable frame from server");
                continue;
            }
        };

        shared.capture(&envelope);
        // The receiver may have been dropped with the client; callbacks
        // still run.
        let _ = inbound.send(envelope.clone());
        shared.dispatch(&envelope);
    }
}
