//! Per-connection handler: session setup, read loop, writer task, teardown.
//!
//! Each accepted connection gets its own Tokio task running
//! [`handle_connection`]. The flow is:
//!   1. Create the session, register it, arm the drop guard
//!   2. Spawn the writer task that drains the session's outbound queue
//!   3. Loop: receive frames → route them one at a time, in order
//!   4. On close, error, idle timeout or shutdown: disconnect cleanup,
//!      let the writer drain, close the socket

use std::sync::Arc;
use std::time::Duration;

use rookery_lobby::RulesOracle;
use rookery_protocol::{Codec, Envelope, JsonCodec, ResponseCode};
use rookery_session::{Authenticator, Session};
use rookery_transport::{Connection, ConnectionId, TcpConnection, TransportError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{RequestError, RookeryError};
use crate::router;
use crate::server::ServerState;

/// How long the writer gets to flush queued messages after the read side
/// has ended.
const WRITER_DRAIN: Duration = Duration::from_secs(2);

/// Drop guard that disconnects a session when the handler exits.
///
/// This ensures cleanup happens even if the handler panics. Since `Drop`
/// is synchronous, we spawn a fire-and-forget task for the async locks.
/// When the handler exits normally it has already run the cleanup and the
/// spawned call finds nothing left to remove.
struct SessionGuard<A: Authenticator, O: RulesOracle> {
    conn_id: ConnectionId,
    state: Arc<ServerState<A, O>>,
}

impl<A: Authenticator, O: RulesOracle> Drop for SessionGuard<A, O> {
    fn drop(&mut self) {
        let conn_id = self.conn_id;
        let state = Arc::clone(&self.state);
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                state.disconnect(conn_id).await;
            });
        }
    }
}

/// Why the read loop stopped.
enum ReadEnd {
    Closed,
    IdleTimeout,
    Cancelled,
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<A, O>(
    conn: TcpConnection,
    state: Arc<ServerState<A, O>>,
    cancel: CancellationToken,
) -> Result<(), RookeryError>
where
    A: Authenticator,
    O: RulesOracle,
{
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    let peer = conn.peer_addr();

    // --- Step 1: Session ---
    let (session, outbound) = Session::channel(conn_id);
    state.sessions.lock().await.insert(Arc::clone(&session));
    let _guard = SessionGuard {
        conn_id,
        state: Arc::clone(&state),
    };
    tracing::info!(%conn_id, %peer, "client connected");

    // --- Step 2: Writer ---
    let writer = tokio::spawn(write_loop(
        Arc::clone(&conn),
        outbound,
        state.codec,
        cancel.clone(),
    ));

    // --- Step 3: Read loop ---
    let result = read_loop(&conn, &session, &state, &cancel).await;
    match &result {
        Ok(ReadEnd::Closed) => tracing::info!(%conn_id, "connection closed cleanly"),
        Ok(ReadEnd::IdleTimeout) => tracing::info!(%conn_id, "connection idle, closing"),
        Ok(ReadEnd::Cancelled) => tracing::debug!(%conn_id, "connection cancelled"),
        Err(e) => tracing::debug!(%conn_id, error = %e, "connection read failed"),
    }

    // --- Step 4: Teardown ---
    state.disconnect(conn_id).await;

    // The writer stops once the last sender is gone, which is our copy of
    // the session (the registry's was just removed).
    drop(session);
    let mut writer = writer;
    if tokio::time::timeout(WRITER_DRAIN, &mut writer).await.is_err() {
        tracing::debug!(%conn_id, "writer did not drain in time");
        writer.abort();
    }
    if let Err(e) = conn.close().await {
        tracing::debug!(%conn_id, error = %e, "close failed");
    }

    result.map(|_| ()).map_err(RookeryError::Transport)
}

/// Reads frames and routes them until the connection ends.
async fn read_loop<A, O>(
    conn: &TcpConnection,
    session: &Arc<Session>,
    state: &Arc<ServerState<A, O>>,
    cancel: &CancellationToken,
) -> Result<ReadEnd, TransportError>
where
    A: Authenticator,
    O: RulesOracle,
{
    let idle_timeout = state.config.idle_timeout;

    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => return Ok(ReadEnd::Cancelled),
            received = recv_within(conn, idle_timeout) => received,
        };

        let frame = match received {
            Some(Ok(Some(frame))) => frame,
            Some(Ok(None)) => return Ok(ReadEnd::Closed),
            None => return Ok(ReadEnd::IdleTimeout),
            Some(Err(e @ TransportError::FrameTooLong { .. })) => {
                session.send(Envelope::error(ResponseCode::BadRequest, "Frame too long"));
                return Err(e);
            }
            Some(Err(e)) => return Err(e),
        };

        tracing::debug!(conn_id = %session.id(), len = frame.len(), "frame received");
        route_guarded(state, session, frame).await;
    }
}

/// Routes one frame on its own task so a panic in a collaborator
/// (authenticator, rules oracle) becomes a 500 instead of killing the
/// connection. Awaited before the next frame is read, so order holds.
async fn route_guarded<A, O>(
    state: &Arc<ServerState<A, O>>,
    session: &Arc<Session>,
    frame: Vec<u8>,
)
where
    A: Authenticator,
    O: RulesOracle,
{
    let task = tokio::spawn({
        let state = Arc::clone(state);
        let session = Arc::clone(session);
        async move { router::route(&state, &session, &frame).await }
    });

    if let Err(e) = task.await {
        let err = RequestError::Internal(format!("request handler failed: {e}"));
        tracing::error!(conn_id = %session.id(), error = %e, "request handler panicked");
        session.send(err.to_envelope());
    }
}

/// `conn.recv()`, bounded by `limit` when set. `None` means the limit hit.
async fn recv_within(
    conn: &TcpConnection,
    limit: Option<Duration>,
) -> Option<Result<Option<Vec<u8>>, TransportError>> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, conn.recv()).await.ok(),
        None => Some(conn.recv().await),
    }
}

/// Drains the session's outbound queue onto the socket.
///
/// A failed write cancels the connection's token so the read loop stops
/// too. When the token is cancelled from elsewhere (shutdown, idle
/// timeout), the writer keeps flushing until the queue closes; the handler
/// bounds that with [`WRITER_DRAIN`].
async fn write_loop(
    conn: Arc<TcpConnection>,
    mut outbound: mpsc::UnboundedReceiver<Envelope>,
    codec: JsonCodec,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = outbound.recv() => next,
        };
        let Some(envelope) = next else {
            return;
        };
        if write_envelope(&conn, codec, &envelope).await.is_err() {
            cancel.cancel();
            return;
        }
    }

    while let Some(envelope) = outbound.recv().await {
        if write_envelope(&conn, codec, &envelope).await.is_err() {
            break;
        }
    }
}

/// Encodes and writes one envelope. Only a failed write is an error; an
/// envelope that can't be encoded is logged and skipped.
async fn write_envelope(
    conn: &TcpConnection,
    codec: JsonCodec,
    envelope: &Envelope,
) -> Result<(), TransportError> {
    let conn_id = conn.id();
    let bytes = match codec.encode(envelope) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(%conn_id, error = %e, "failed to encode envelope");
            return Ok(());
        }
    };
    conn.send(&bytes).await.inspect_err(|e| {
        tracing::debug!(%conn_id, error = %e, "write failed, tearing down");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rookery_protocol::MessageType;
    use rookery_transport::{TcpTransport, Transport};

    async fn connected_pair() -> (TcpConnection, TcpConnection) {
        let mut transport = TcpTransport::bind("127.0.0.1:0").await.unwrap();
        let addr = transport.local_addr().unwrap();
        let client = TcpConnection::connect(addr).await.unwrap();
        let server = transport.accept().await.unwrap();
        (server, client)
    }

    #[tokio::test]
    async fn test_write_loop_cancelled_still_flushes_queue() {
        let (server, client) = connected_pair().await;
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(Envelope::error(ResponseCode::BadRequest, "Frame too long"))
            .unwrap();
        tx.send(Envelope::new(
            MessageType::GameEnd,
            ResponseCode::Ok,
            serde_json::json!({ "gameId": 1 }),
        ))
        .unwrap();
        drop(tx);

        let cancel = CancellationToken::new();
        cancel.cancel();
        tokio::time::timeout(
            Duration::from_secs(5),
            write_loop(Arc::new(server), rx, JsonCodec, cancel),
        )
        .await
        .expect("writer should finish once the queue is closed");

        let mut types = Vec::new();
        for _ in 0..2 {
            let frame = client.recv().await.unwrap().unwrap();
            let envelope: Envelope = JsonCodec.decode(&frame).unwrap();
            types.push(envelope.message_type);
        }
        assert_eq!(types, vec![MessageType::Error, MessageType::GameEnd]);
    }
}
