//! Message router: one frame in, zero or more envelopes out.
//!
//! The router is stateless. For each frame it:
//!   1. parses the JSON and the `messageType`
//!   2. resolves the optional `sessionToken` through the session registry
//!      and rejects it unless it names this connection
//!   3. dispatches on the type, checking preconditions in a fixed order:
//!      logged in → in a match → opponent reachable → payload
//!
//! Any failure becomes an `ERROR` envelope back to the sender. Nothing
//! here closes a connection.

use std::sync::Arc;

use rookery_lobby::{
    ChallengeOutcome, LobbyError, MoveContext, MoveVerdict, QuickMatch, RulesOracle,
};
use rookery_protocol::{
    ChallengeAnswer, ChallengeNotice, ChallengeTarget, ChessMove, Codec, Credentials, DrawNotice,
    Emoji, Envelope, GameResult, LoginAck, MatchFindAck, MatchFindStatus, MessageType, MoveAck,
    PlayerList, ProtocolError, RegisterAck, Request, ResponseCode,
};
use rookery_session::{Authenticator, Seat, Session, SessionError};
use serde_json::Value;

use crate::RequestError;
use crate::server::ServerState;

/// Routes one frame from `session`.
pub(crate) async fn route<A, O>(state: &ServerState<A, O>, session: &Arc<Session>, frame: &[u8])
where
    A: Authenticator,
    O: RulesOracle,
{
    let result = match parse(state, session, frame).await {
        Ok(request) => dispatch(state, session, &request).await,
        Err(e) => Err(e),
    };

    if let Err(err) = result {
        match &err {
            RequestError::Internal(detail) => {
                tracing::error!(conn_id = %session.id(), %detail, "request failed");
            }
            other => {
                tracing::debug!(conn_id = %session.id(), code = %other.code(), reason = %other, "request rejected");
            }
        }
        session.send(err.to_envelope());
    }
}

/// Frame → `Request`, including the token check.
async fn parse<A, O>(
    state: &ServerState<A, O>,
    session: &Session,
    frame: &[u8],
) -> Result<Request, RequestError>
where
    A: Authenticator,
    O: RulesOracle,
{
    let value: Value = state.codec.decode(frame)?;
    let request = Request::from_value(value)?;

    if let Some(token) = &request.session_token {
        let owner = state.sessions.lock().await.by_token(token);
        if owner != Some(session.id()) {
            return Err(SessionError::InvalidToken.into());
        }
    }
    Ok(request)
}

async fn dispatch<A, O>(
    state: &ServerState<A, O>,
    session: &Arc<Session>,
    request: &Request,
) -> Result<(), RequestError>
where
    A: Authenticator,
    O: RulesOracle,
{
    match request.message_type {
        MessageType::AuthRegisterReq => handle_register(state, session, request).await,
        MessageType::AuthLoginReq => handle_login(state, session, request).await,
        MessageType::AuthLogoutReq => handle_logout(state, session).await,
        MessageType::LobbyList => handle_lobby_list(state, session).await,
        MessageType::MatchFindReq => handle_find_match(state, session).await,
        MessageType::ChallengeReq => handle_challenge(state, session, request).await,
        MessageType::ChallengeAccept => handle_challenge_answer(state, session, request, true).await,
        MessageType::ChallengeDecline => {
            handle_challenge_answer(state, session, request, false).await
        }
        MessageType::MoveReq => handle_move(state, session, request).await,
        MessageType::EmojiSend => handle_emoji(state, session, request).await,
        MessageType::DrawOffer => handle_draw_offer(state, session).await,
        MessageType::DrawAccept => handle_draw_answer(state, session, true).await,
        MessageType::DrawDecline => handle_draw_answer(state, session, false).await,
        MessageType::Resign => handle_resign(state, session).await,
        other => Err(RequestError::BadRequest(format!(
            "Unknown messageType: {other}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Preconditions
// ---------------------------------------------------------------------------

fn require_auth(session: &Session) -> Result<String, RequestError> {
    session
        .username()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| RequestError::Unauthorized("Not logged in".into()))
}

/// The caller's seat. A seat whose opponent is gone is a broken pairing,
/// not a caller mistake, so it is a `Conflict`.
fn require_match(session: &Session) -> Result<Seat, RequestError> {
    let seat = session
        .seat()
        .ok_or_else(|| RequestError::Forbidden("Not in a game".into()))?;
    if seat.opponent.strong_count() == 0 {
        tracing::warn!(
            conn_id = %session.id(),
            match_id = %seat.match_id,
            "seated session has no live opponent"
        );
        return Err(LobbyError::OpponentMissing.into());
    }
    Ok(seat)
}

fn reply(session: &Session, message_type: MessageType, code: ResponseCode, payload: &impl serde::Serialize) {
    session.send(Envelope::with(message_type, code, payload));
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

async fn handle_register<A: Authenticator, O: RulesOracle>(
    state: &ServerState<A, O>,
    session: &Session,
    request: &Request,
) -> Result<(), RequestError> {
    let credentials: Credentials = request.payload_as()?;
    let username = state.auth.register(&credentials).await?;
    tracing::info!(conn_id = %session.id(), %username, "account registered");
    reply(
        session,
        MessageType::AuthRegisterAck,
        ResponseCode::Created,
        &RegisterAck { username },
    );
    Ok(())
}

async fn handle_login<A: Authenticator, O: RulesOracle>(
    state: &ServerState<A, O>,
    session: &Arc<Session>,
    request: &Request,
) -> Result<(), RequestError> {
    let credentials: Credentials = request.payload_as()?;

    if let Some(current) = session.username() {
        if current != credentials.username {
            return Err(RequestError::Conflict(format!(
                "Already logged in as {current}"
            )));
        }
    }

    let username = state.auth.authenticate(&credentials).await?;
    session.set_username(username.clone());
    if let Err(e) = state.lobby.add_player(session).await {
        session.clear_username();
        return Err(e.into());
    }

    tracing::info!(conn_id = %session.id(), %username, "player logged in");
    reply(
        session,
        MessageType::AuthLoginAck,
        ResponseCode::Ok,
        &LoginAck {
            username,
            session_token: session.token().to_string(),
        },
    );
    Ok(())
}

async fn handle_logout<A: Authenticator, O: RulesOracle>(
    state: &ServerState<A, O>,
    session: &Arc<Session>,
) -> Result<(), RequestError> {
    let username = require_auth(session)?;
    state.lobby.remove_player(session).await;
    session.clear_username();
    tracing::info!(conn_id = %session.id(), %username, "player logged out");
    session.send(Envelope::new(
        MessageType::AuthLogoutAck,
        ResponseCode::Ok,
        Value::Object(Default::default()),
    ));
    Ok(())
}

// ---------------------------------------------------------------------------
// Lobby and matchmaking
// ---------------------------------------------------------------------------

async fn handle_lobby_list<A: Authenticator, O: RulesOracle>(
    state: &ServerState<A, O>,
    session: &Session,
) -> Result<(), RequestError> {
    require_auth(session)?;
    let players = state.lobby.online_players().await;
    reply(
        session,
        MessageType::LobbyList,
        ResponseCode::Ok,
        &PlayerList { players },
    );
    Ok(())
}

async fn handle_find_match<A: Authenticator, O: RulesOracle>(
    state: &ServerState<A, O>,
    session: &Arc<Session>,
) -> Result<(), RequestError> {
    require_auth(session)?;
    let ack = match state.lobby.find_match(session).await? {
        QuickMatch::Searching => MatchFindAck {
            status: MatchFindStatus::Searching,
            game_id: None,
        },
        QuickMatch::Matched(match_id) => MatchFindAck {
            status: MatchFindStatus::Matched,
            game_id: Some(match_id),
        },
    };
    reply(session, MessageType::MatchFindAck, ResponseCode::Ok, &ack);
    Ok(())
}

async fn handle_challenge<A: Authenticator, O: RulesOracle>(
    state: &ServerState<A, O>,
    session: &Arc<Session>,
    request: &Request,
) -> Result<(), RequestError> {
    let from = require_auth(session)?;
    let target: ChallengeTarget = request.payload_as()?;
    state.lobby.challenge(session, &target.username).await?;
    reply(
        session,
        MessageType::ChallengeAck,
        ResponseCode::Ok,
        &ChallengeNotice {
            from,
            to: target.username,
        },
    );
    Ok(())
}

async fn handle_challenge_answer<A: Authenticator, O: RulesOracle>(
    state: &ServerState<A, O>,
    session: &Arc<Session>,
    request: &Request,
    accepted: bool,
) -> Result<(), RequestError> {
    require_auth(session)?;
    let answer = match request.payload_as::<ChallengeAnswer>() {
        Ok(answer) => answer,
        Err(ProtocolError::MissingPayload) => ChallengeAnswer::default(),
        Err(e) => return Err(e.into()),
    };

    let outcome = state
        .lobby
        .respond_to_challenge(session, answer.challenger.as_deref(), accepted)
        .await?;
    if matches!(outcome, ChallengeOutcome::NoPending | ChallengeOutcome::Stale) {
        tracing::debug!(conn_id = %session.id(), ?outcome, "challenge answer ignored");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// In-match
// ---------------------------------------------------------------------------

async fn handle_move<A: Authenticator, O: RulesOracle>(
    state: &ServerState<A, O>,
    session: &Arc<Session>,
    request: &Request,
) -> Result<(), RequestError> {
    require_auth(session)?;
    let seat = require_match(session)?;
    let mv: ChessMove = request.payload_as()?;

    let verdict = state.oracle.judge(&MoveContext {
        match_id: seat.match_id,
        role: seat.role,
        mv: &mv,
    });
    let game_over = match verdict {
        MoveVerdict::Illegal(reason) => return Err(RequestError::BadRequest(reason)),
        MoveVerdict::Legal => None,
        MoveVerdict::GameOver { winner, reason } => {
            let result = match winner {
                None => GameResult::Draw,
                Some(role) if role == seat.role => GameResult::Win,
                Some(_) => GameResult::Loss,
            };
            Some((result, reason))
        }
    };

    // The opponent gets the payload exactly as the mover sent it.
    state
        .lobby
        .relay(
            session,
            seat.match_id,
            Envelope::new(
                MessageType::MoveUpdate,
                ResponseCode::Ok,
                request.payload.clone(),
            ),
        )
        .await?;
    reply(session, MessageType::MoveAck, ResponseCode::Ok, &MoveAck::accepted());

    if let Some((result, reason)) = game_over {
        match state.lobby.finish_match(session, result, &reason).await {
            Ok(_) => {}
            Err(LobbyError::NotInMatch) => {
                tracing::debug!(conn_id = %session.id(), "match already ended before final move");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

async fn handle_emoji<A: Authenticator, O: RulesOracle>(
    state: &ServerState<A, O>,
    session: &Arc<Session>,
    request: &Request,
) -> Result<(), RequestError> {
    require_auth(session)?;
    let seat = require_match(session)?;
    let emoji: Emoji = request.payload_as()?;
    state
        .lobby
        .relay(
            session,
            seat.match_id,
            Envelope::with(MessageType::EmojiUpdate, ResponseCode::Ok, &emoji),
        )
        .await?;
    Ok(())
}

async fn handle_draw_offer<A: Authenticator, O: RulesOracle>(
    state: &ServerState<A, O>,
    session: &Arc<Session>,
) -> Result<(), RequestError> {
    let from = require_auth(session)?;
    require_match(session)?;
    state.lobby.offer_draw(session).await?;
    reply(
        session,
        MessageType::DrawAck,
        ResponseCode::Ok,
        &DrawNotice { from },
    );
    Ok(())
}

async fn handle_draw_answer<A: Authenticator, O: RulesOracle>(
    state: &ServerState<A, O>,
    session: &Arc<Session>,
    accepted: bool,
) -> Result<(), RequestError> {
    require_auth(session)?;
    require_match(session)?;
    state.lobby.answer_draw(session, accepted).await?;
    Ok(())
}

async fn handle_resign<A: Authenticator, O: RulesOracle>(
    state: &ServerState<A, O>,
    session: &Arc<Session>,
) -> Result<(), RequestError> {
    let username = require_auth(session)?;
    require_match(session)?;
    let match_id = state.lobby.resign(session).await?;
    tracing::info!(conn_id = %session.id(), %username, %match_id, "player resigned");
    Ok(())
}
