//! The matchmaking engine.
//!
//! Every operation follows the same shape:
//!
//! 1. lock `LobbyState`
//! 2. check preconditions, mutate state and seats, and collect the
//!    notifications to send into an outbox
//! 3. unlock
//! 4. deliver the outbox
//!
//! Delivery is a push onto each session's in-memory queue, so even step 4
//! never waits on a socket. Keeping it outside the lock anyway means a
//! slow consumer can never stretch the critical section.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};

use rookery_protocol::{
    ChallengeCancelled, ChallengeNotice, ChallengeVerdict, DrawNotice, Envelope, GameEnd,
    GameResult, GameStart, MatchId, MessageType, ResponseCode, Role, end_reason,
};
use rookery_session::{Seat, Session};
use rookery_transport::ConnectionId;
use tokio::sync::Mutex;

use crate::{LobbyConfig, LobbyError};

/// Notifications produced under the lock, delivered after it.
type Outbox = Vec<(Arc<Session>, Envelope)>;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// What happened to a challenge answer.
///
/// Only `ChallengerGone` and `Cancelled` send anything back to the
/// responder; the router acknowledges nothing for the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeOutcome {
    /// Nobody has challenged the responder. Ignored.
    NoPending,
    /// The answer names a challenger whose challenge was overwritten by a
    /// newer one. Ignored; the newer challenge stays pending.
    Stale,
    /// The challenger went offline. The responder got `CHALLENGE_CANCELLED`.
    ChallengerGone,
    /// One side is already playing. The responder got `CHALLENGE_CANCELLED`.
    Cancelled,
    /// The challenger was told no.
    Declined,
    /// The challenger was told yes and the match started.
    Matched(MatchId),
}

/// Result of a quick-match request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuickMatch {
    /// Queued until someone else asks.
    Searching,
    /// Paired with the waiting player.
    Matched(MatchId),
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct LobbyState {
    /// Online players, iterated in username order.
    directory: BTreeMap<String, Weak<Session>>,
    /// responder → challenger.
    pending: HashMap<String, String>,
    /// The one session waiting for a quick match.
    waiting: Option<Weak<Session>>,
    /// match → connection of the player who offered the draw.
    draw_offers: HashMap<MatchId, ConnectionId>,
    last_match_id: u64,
}

impl LobbyState {
    /// The live session listed under `name`.
    fn lookup(&self, name: &str) -> Option<Arc<Session>> {
        self.directory.get(name).and_then(Weak::upgrade)
    }

    /// Seats `a` and `b` against each other and queues both `GAME_START`s.
    fn create_match(
        &mut self,
        a: &Arc<Session>,
        b: &Arc<Session>,
        a_role: Role,
        outbox: &mut Outbox,
    ) -> MatchId {
        self.last_match_id += 1;
        let match_id = MatchId(self.last_match_id);

        a.set_seat(Seat {
            match_id,
            role: a_role,
            opponent: Arc::downgrade(b),
        });
        b.set_seat(Seat {
            match_id,
            role: a_role.opposite(),
            opponent: Arc::downgrade(a),
        });

        if self
            .waiting
            .as_ref()
            .is_some_and(|w| is_session(w, a) || is_session(w, b))
        {
            self.waiting = None;
        }

        let a_name = a.username().unwrap_or_default();
        let b_name = b.username().unwrap_or_default();
        let (white, black) = match a_role {
            Role::White => (&a_name, &b_name),
            Role::Black => (&b_name, &a_name),
        };
        tracing::info!(%match_id, %white, %black, "match started");

        outbox.push((
            Arc::clone(a),
            Envelope::with(
                MessageType::GameStart,
                ResponseCode::Ok,
                &GameStart {
                    game_id: match_id,
                    opponent: b_name.clone(),
                    role: a_role,
                },
            ),
        ));
        outbox.push((
            Arc::clone(b),
            Envelope::with(
                MessageType::GameStart,
                ResponseCode::Ok,
                &GameStart {
                    game_id: match_id,
                    opponent: a_name,
                    role: a_role.opposite(),
                },
            ),
        ));
        match_id
    }

    /// Clears both seats of `session`'s match and queues `GAME_END`.
    ///
    /// `result` is from `session`'s point of view; the opponent gets the
    /// flipped result. `session` itself is only notified when
    /// `notify_self` is set (it isn't when the session is going away).
    /// Returns `None` if `session` was not seated.
    fn end_match(
        &mut self,
        session: &Arc<Session>,
        result: GameResult,
        reason: &str,
        notify_self: bool,
        outbox: &mut Outbox,
    ) -> Option<MatchId> {
        let seat = session.clear_seat()?;
        let match_id = seat.match_id;
        self.draw_offers.remove(&match_id);

        let own_name = session.username().unwrap_or_default();
        let opponent = seat.opponent.upgrade();
        let opponent_name = opponent
            .as_ref()
            .and_then(|o| o.username())
            .unwrap_or_default();

        if let Some(opponent) = opponent {
            if opponent.seat().is_some_and(|s| s.match_id == match_id) {
                opponent.clear_seat();
            }
            outbox.push((
                opponent,
                game_end(match_id, reason, result.flipped(), &own_name),
            ));
        }
        if notify_self {
            outbox.push((
                Arc::clone(session),
                game_end(match_id, reason, result, &opponent_name),
            ));
        }

        tracing::info!(%match_id, reason, "match ended");
        Some(match_id)
    }
}

fn game_end(match_id: MatchId, reason: &str, result: GameResult, opponent: &str) -> Envelope {
    Envelope::with(
        MessageType::GameEnd,
        ResponseCode::Ok,
        &GameEnd {
            game_id: match_id,
            reason: reason.to_string(),
            result,
            opponent: opponent.to_string(),
        },
    )
}

fn challenge_cancelled(code: ResponseCode, challenger: &str, reason: &str) -> Envelope {
    Envelope::with(
        MessageType::ChallengeCancelled,
        code,
        &ChallengeCancelled {
            challenger: challenger.to_string(),
            reason: reason.to_string(),
        },
    )
}

fn is_session(weak: &Weak<Session>, session: &Arc<Session>) -> bool {
    std::ptr::eq(weak.as_ptr(), Arc::as_ptr(session))
}

fn username_of(session: &Session) -> Result<String, LobbyError> {
    session
        .username()
        .filter(|name| !name.is_empty())
        .ok_or(LobbyError::NotAuthorized)
}

/// The seated opponent, if still alive.
///
/// A seat whose opponent is gone breaks the pairing invariant: ending a
/// match clears both seats together.
fn live_opponent(session: &Session, seat: &Seat) -> Result<Arc<Session>, LobbyError> {
    seat.opponent.upgrade().ok_or_else(|| {
        tracing::warn!(
            conn_id = %session.id(),
            match_id = %seat.match_id,
            "seated session has no live opponent"
        );
        LobbyError::OpponentMissing
    })
}

fn deliver(outbox: Outbox) {
    for (session, envelope) in outbox {
        session.send(envelope);
    }
}

// ---------------------------------------------------------------------------
// Lobby
// ---------------------------------------------------------------------------

/// The player directory and matchmaking engine.
///
/// Shared by every connection task (`Arc<Lobby>`); all methods take
/// `&self`.
#[derive(Debug, Default)]
pub struct Lobby {
    state: Mutex<LobbyState>,
    config: LobbyConfig,
}

impl Lobby {
    pub fn new(config: LobbyConfig) -> Self {
        Self {
            state: Mutex::new(LobbyState::default()),
            config,
        }
    }

    pub fn config(&self) -> &LobbyConfig {
        &self.config
    }

    // -- Directory ---------------------------------------------------------

    /// Lists a logged-in session in the directory.
    ///
    /// # Errors
    /// - [`LobbyError::NotAuthorized`] if the session has no username
    /// - [`LobbyError::AlreadyOnline`] if another live session owns the name
    pub async fn add_player(&self, session: &Arc<Session>) -> Result<(), LobbyError> {
        let name = username_of(session)?;
        let mut state = self.state.lock().await;

        if let Some(existing) = state.lookup(&name) {
            if existing.id() == session.id() {
                return Ok(());
            }
            // An entry whose session has since logged out is stale.
            if existing.username().as_deref() == Some(name.as_str()) {
                return Err(LobbyError::AlreadyOnline(name));
            }
        }
        state.directory.insert(name.clone(), Arc::downgrade(session));
        drop(state);

        tracing::info!(conn_id = %session.id(), username = %name, "player added");
        Ok(())
    }

    /// Takes a session out of everything the lobby tracks.
    ///
    /// Ends its match (the opponent gets `GAME_END` with reason
    /// `opponent_disconnected`), forgets every challenge it sent or
    /// received, leaves the quick-match slot, and drops it from the
    /// directory. Safe to call more than once.
    pub async fn remove_player(&self, session: &Arc<Session>) {
        let name = session.username();
        let mut outbox = Outbox::new();
        {
            let mut state = self.state.lock().await;

            if let Some(name) = &name {
                if state
                    .directory
                    .get(name)
                    .is_some_and(|w| is_session(w, session))
                {
                    state.directory.remove(name);
                }
                state
                    .pending
                    .retain(|responder, challenger| responder != name && challenger != name);
            }

            if state
                .waiting
                .as_ref()
                .is_some_and(|w| is_session(w, session))
            {
                state.waiting = None;
            }

            state.end_match(
                session,
                GameResult::Loss,
                end_reason::OPPONENT_DISCONNECTED,
                false,
                &mut outbox,
            );
        }
        deliver(outbox);

        if let Some(name) = name {
            tracing::info!(conn_id = %session.id(), username = %name, "player removed");
        }
    }

    /// Snapshot of online usernames, in lexicographic order.
    pub async fn online_players(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .directory
            .iter()
            .filter(|(_, session)| session.strong_count() > 0)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// The live session listed under `name`.
    pub async fn player(&self, name: &str) -> Option<Arc<Session>> {
        self.state.lock().await.lookup(name)
    }

    // -- Challenges --------------------------------------------------------

    /// Records a challenge from `from` to the player named `to` and sends
    /// the target `CHALLENGE_RECEIVED`.
    ///
    /// A new challenge to the same target replaces the old one.
    ///
    /// # Errors
    /// Checked in this order: [`NotAuthorized`](LobbyError::NotAuthorized),
    /// [`SelfChallenge`](LobbyError::SelfChallenge),
    /// [`NotFound`](LobbyError::NotFound), [`Busy`](LobbyError::Busy) (target
    /// is playing), [`AlreadyInMatch`](LobbyError::AlreadyInMatch) (challenger
    /// is playing).
    pub async fn challenge(&self, from: &Arc<Session>, to: &str) -> Result<(), LobbyError> {
        let from_name = username_of(from)?;
        if to == from_name {
            return Err(LobbyError::SelfChallenge);
        }

        let target = {
            let mut state = self.state.lock().await;
            let target = state
                .lookup(to)
                .ok_or_else(|| LobbyError::NotFound(to.to_string()))?;
            if target.is_in_match() {
                return Err(LobbyError::Busy(to.to_string()));
            }
            if from.is_in_match() {
                return Err(LobbyError::AlreadyInMatch);
            }
            if let Some(previous) = state.pending.insert(to.to_string(), from_name.clone()) {
                tracing::debug!(responder = %to, %previous, "pending challenge replaced");
            }
            target
        };

        tracing::debug!(challenger = %from_name, responder = %to, "challenge sent");
        target.send(Envelope::with(
            MessageType::ChallengeReceived,
            ResponseCode::Ok,
            &ChallengeNotice {
                from: from_name,
                to: to.to_string(),
            },
        ));
        Ok(())
    }

    /// Answers the challenge pending against `responder`.
    ///
    /// `challenger_hint` is the challenger the responder believes they are
    /// answering; when given, it must match the pending entry.
    ///
    /// # Errors
    /// [`LobbyError::NotAuthorized`] if the responder is not logged in.
    /// Every other situation is an [`ChallengeOutcome`].
    pub async fn respond_to_challenge(
        &self,
        responder: &Arc<Session>,
        challenger_hint: Option<&str>,
        accepted: bool,
    ) -> Result<ChallengeOutcome, LobbyError> {
        let name = username_of(responder)?;
        let mut outbox = Outbox::new();

        let outcome = {
            let mut state = self.state.lock().await;

            let Some(current) = state.pending.get(&name).cloned() else {
                return Ok(ChallengeOutcome::NoPending);
            };
            if challenger_hint.is_some_and(|hint| hint != current) {
                return Ok(ChallengeOutcome::Stale);
            }
            state.pending.remove(&name);

            match state.lookup(&current) {
                None => {
                    outbox.push((
                        Arc::clone(responder),
                        challenge_cancelled(
                            ResponseCode::NotFound,
                            &current,
                            "Challenger disconnected",
                        ),
                    ));
                    ChallengeOutcome::ChallengerGone
                }
                Some(challenger) if challenger.is_in_match() || responder.is_in_match() => {
                    outbox.push((
                        Arc::clone(responder),
                        challenge_cancelled(ResponseCode::Conflict, &current, "Player is busy"),
                    ));
                    ChallengeOutcome::Cancelled
                }
                Some(challenger) => {
                    outbox.push((
                        Arc::clone(&challenger),
                        Envelope::with(
                            MessageType::ChallengeResponse,
                            ResponseCode::Ok,
                            &ChallengeVerdict {
                                from: name.clone(),
                                accepted,
                            },
                        ),
                    ));
                    if accepted {
                        let match_id = state.create_match(
                            &challenger,
                            responder,
                            self.config.challenger_role,
                            &mut outbox,
                        );
                        ChallengeOutcome::Matched(match_id)
                    } else {
                        ChallengeOutcome::Declined
                    }
                }
            }
        };
        deliver(outbox);

        tracing::debug!(responder = %name, ?outcome, "challenge answered");
        Ok(outcome)
    }

    /// The challenger currently pending against `responder`, if any.
    pub async fn pending_challenger(&self, responder: &str) -> Option<String> {
        self.state.lock().await.pending.get(responder).cloned()
    }

    // -- Matches -----------------------------------------------------------

    /// Starts a match between two logged-in, unseated sessions.
    ///
    /// `a` takes the configured challenger role.
    ///
    /// # Errors
    /// [`NotAuthorized`](LobbyError::NotAuthorized) if either side has no
    /// username, [`AlreadyInMatch`](LobbyError::AlreadyInMatch) if `a` is
    /// seated, [`Busy`](LobbyError::Busy) if `b` is.
    pub async fn create_match(
        &self,
        a: &Arc<Session>,
        b: &Arc<Session>,
    ) -> Result<MatchId, LobbyError> {
        username_of(a)?;
        let b_name = username_of(b)?;
        if a.id() == b.id() {
            return Err(LobbyError::SelfChallenge);
        }

        let mut outbox = Outbox::new();
        let match_id = {
            let mut state = self.state.lock().await;
            if a.is_in_match() {
                return Err(LobbyError::AlreadyInMatch);
            }
            if b.is_in_match() {
                return Err(LobbyError::Busy(b_name));
            }
            state.create_match(a, b, self.config.challenger_role, &mut outbox)
        };
        deliver(outbox);
        Ok(match_id)
    }

    /// Pairs the session with whoever is waiting, or makes it the one
    /// waiting.
    ///
    /// # Errors
    /// [`QuickMatchDisabled`](LobbyError::QuickMatchDisabled),
    /// [`NotAuthorized`](LobbyError::NotAuthorized),
    /// [`AlreadyInMatch`](LobbyError::AlreadyInMatch).
    pub async fn find_match(&self, session: &Arc<Session>) -> Result<QuickMatch, LobbyError> {
        if !self.config.quick_match {
            return Err(LobbyError::QuickMatchDisabled);
        }
        let name = username_of(session)?;

        let mut outbox = Outbox::new();
        let result = {
            let mut state = self.state.lock().await;
            if session.is_in_match() {
                return Err(LobbyError::AlreadyInMatch);
            }

            let waiting = state.waiting.as_ref().and_then(Weak::upgrade);
            match waiting {
                Some(other) if other.id() == session.id() => QuickMatch::Searching,
                Some(other) if other.is_authorized() && !other.is_in_match() => {
                    let match_id = state.create_match(
                        &other,
                        session,
                        self.config.challenger_role,
                        &mut outbox,
                    );
                    QuickMatch::Matched(match_id)
                }
                _ => {
                    state.waiting = Some(Arc::downgrade(session));
                    tracing::debug!(username = %name, "waiting for quick match");
                    QuickMatch::Searching
                }
            }
        };
        deliver(outbox);
        Ok(result)
    }

    /// Records a draw offer and sends the opponent `DRAW_OFFERED`.
    ///
    /// A second offer in the same match replaces the first.
    pub async fn offer_draw(&self, session: &Arc<Session>) -> Result<(), LobbyError> {
        let name = username_of(session)?;
        let opponent = {
            let mut state = self.state.lock().await;
            let seat = session.seat().ok_or(LobbyError::NotInMatch)?;
            let opponent = live_opponent(session, &seat)?;
            state.draw_offers.insert(seat.match_id, session.id());
            opponent
        };

        opponent.send(Envelope::with(
            MessageType::DrawOffered,
            ResponseCode::Ok,
            &DrawNotice { from: name },
        ));
        Ok(())
    }

    /// Accepts or declines the opponent's draw offer.
    ///
    /// Accepting ends the match as a draw (`draw_agreed`); declining sends
    /// the offerer `DRAW_DECLINED`. Either way the offer is consumed.
    ///
    /// # Errors
    /// [`NoDrawOffer`](LobbyError::NoDrawOffer) unless the *opponent* made
    /// the outstanding offer; a player can't accept their own.
    pub async fn answer_draw(&self, session: &Arc<Session>, accepted: bool) -> Result<(), LobbyError> {
        let name = username_of(session)?;
        let mut outbox = Outbox::new();
        {
            let mut state = self.state.lock().await;
            let seat = session.seat().ok_or(LobbyError::NotInMatch)?;
            let opponent = live_opponent(session, &seat)?;
            if state.draw_offers.get(&seat.match_id) != Some(&opponent.id()) {
                return Err(LobbyError::NoDrawOffer);
            }
            state.draw_offers.remove(&seat.match_id);

            if accepted {
                state.end_match(
                    session,
                    GameResult::Draw,
                    end_reason::DRAW_AGREED,
                    true,
                    &mut outbox,
                );
            } else {
                outbox.push((
                    opponent,
                    Envelope::with(
                        MessageType::DrawDeclined,
                        ResponseCode::Ok,
                        &DrawNotice { from: name },
                    ),
                ));
            }
        }
        deliver(outbox);
        Ok(())
    }

    /// Ends the session's match as a loss by resignation.
    pub async fn resign(&self, session: &Arc<Session>) -> Result<MatchId, LobbyError> {
        username_of(session)?;
        let mut outbox = Outbox::new();
        let match_id = {
            let mut state = self.state.lock().await;
            let seat = session.seat().ok_or(LobbyError::NotInMatch)?;
            live_opponent(session, &seat)?;
            state
                .end_match(
                    session,
                    GameResult::Loss,
                    end_reason::RESIGNATION,
                    true,
                    &mut outbox,
                )
                .ok_or(LobbyError::NotInMatch)?
        };
        deliver(outbox);
        Ok(match_id)
    }

    /// Pushes `envelope` to the opponent in match `match_id`.
    ///
    /// Moves and emoji are judged outside the lobby lock, so by the time
    /// they are relayed the match may have ended (resignation, agreed
    /// draw, disconnect). The seat is re-checked under the lock, which
    /// orders the relay strictly before or after any `GAME_END`.
    ///
    /// # Errors
    /// [`NotInMatch`](LobbyError::NotInMatch) when `session` is no longer
    /// seated in `match_id`;
    /// [`OpponentMissing`](LobbyError::OpponentMissing) when the opponent
    /// is gone.
    pub async fn relay(
        &self,
        session: &Arc<Session>,
        match_id: MatchId,
        envelope: Envelope,
    ) -> Result<(), LobbyError> {
        let _state = self.state.lock().await;
        let seat = session
            .seat()
            .filter(|seat| seat.match_id == match_id)
            .ok_or(LobbyError::NotInMatch)?;
        let opponent = live_opponent(session, &seat)?;
        opponent.send(envelope);
        Ok(())
    }

    /// Ends the session's match with an externally decided result.
    ///
    /// `result` is from `session`'s point of view. Used when the rules
    /// oracle reports checkmate, stalemate and the like.
    pub async fn finish_match(
        &self,
        session: &Arc<Session>,
        result: GameResult,
        reason: &str,
    ) -> Result<MatchId, LobbyError> {
        let mut outbox = Outbox::new();
        let match_id = {
            let mut state = self.state.lock().await;
            state
                .end_match(session, result, reason, true, &mut outbox)
                .ok_or(LobbyError::NotInMatch)?
        };
        deliver(outbox);
        Ok(match_id)
    }
}
