//! Integration tests for the matchmaking engine.
//!
//! Sessions here are real `Session`s whose outbound queues are read
//! directly, so every notification the lobby sends can be inspected
//! without a socket.

use std::sync::Arc;

use rookery_lobby::{ChallengeOutcome, Lobby, LobbyError, QuickMatch};
use rookery_protocol::{
    ChallengeCancelled, ChallengeNotice, ChallengeVerdict, DrawNotice, Envelope, GameEnd,
    GameResult, GameStart, MessageType, ResponseCode, Role, end_reason,
};
use rookery_session::Session;
use rookery_transport::ConnectionId;
use tokio::sync::mpsc::UnboundedReceiver;

// =========================================================================
// Helpers
// =========================================================================

struct Player {
    session: Arc<Session>,
    inbox: UnboundedReceiver<Envelope>,
}

impl Player {
    /// Drains everything queued so far.
    fn drain(&mut self) -> Vec<Envelope> {
        let mut out = Vec::new();
        while let Ok(env) = self.inbox.try_recv() {
            out.push(env);
        }
        out
    }

    fn types(&mut self) -> Vec<MessageType> {
        self.drain().into_iter().map(|e| e.message_type).collect()
    }
}

async fn online(lobby: &Lobby, id: u64, name: &str) -> Player {
    let (session, inbox) = Session::channel(ConnectionId::new(id));
    session.set_username(name);
    lobby.add_player(&session).await.expect("add_player");
    Player { session, inbox }
}

/// alice challenges bob and bob accepts; both inboxes are drained.
async fn seated_pair(lobby: &Lobby) -> (Player, Player) {
    let mut alice = online(lobby, 1, "alice").await;
    let mut bob = online(lobby, 2, "bob").await;
    lobby.challenge(&alice.session, "bob").await.unwrap();
    let outcome = lobby
        .respond_to_challenge(&bob.session, None, true)
        .await
        .unwrap();
    assert!(matches!(outcome, ChallengeOutcome::Matched(_)));
    alice.drain();
    bob.drain();
    (alice, bob)
}

// =========================================================================
// Challenges
// =========================================================================

#[tokio::test]
async fn test_challenge_notifies_target() {
    let lobby = Lobby::default();
    let alice = online(&lobby, 1, "alice").await;
    let mut bob = online(&lobby, 2, "bob").await;

    lobby.challenge(&alice.session, "bob").await.unwrap();

    let got = bob.drain();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].message_type, MessageType::ChallengeReceived);
    let notice: ChallengeNotice = got[0].payload_as().unwrap();
    assert_eq!(notice.from, "alice");
    assert_eq!(notice.to, "bob");
}

#[tokio::test]
async fn test_challenge_unauthorized_challenger_is_rejected() {
    let lobby = Lobby::default();
    let _bob = online(&lobby, 2, "bob").await;
    let (anon, _rx) = Session::channel(ConnectionId::new(9));

    assert_eq!(
        lobby.challenge(&anon, "bob").await,
        Err(LobbyError::NotAuthorized)
    );
}

#[tokio::test]
async fn test_challenge_busy_target_is_rejected() {
    let lobby = Lobby::default();
    let (_alice, _bob) = seated_pair(&lobby).await;
    let carol = online(&lobby, 3, "carol").await;

    assert_eq!(
        lobby.challenge(&carol.session, "bob").await,
        Err(LobbyError::Busy("bob".into()))
    );
}

#[tokio::test]
async fn test_challenge_from_seated_player_is_rejected() {
    let lobby = Lobby::default();
    let (alice, _bob) = seated_pair(&lobby).await;
    let _carol = online(&lobby, 3, "carol").await;

    assert_eq!(
        lobby.challenge(&alice.session, "carol").await,
        Err(LobbyError::AlreadyInMatch)
    );
}

#[tokio::test]
async fn test_challenge_last_challenge_wins() {
    let lobby = Lobby::default();
    let mut alice = online(&lobby, 1, "alice").await;
    let mut bob = online(&lobby, 2, "bob").await;
    let mut carol = online(&lobby, 3, "carol").await;

    lobby.challenge(&alice.session, "carol").await.unwrap();
    lobby.challenge(&bob.session, "carol").await.unwrap();
    assert_eq!(lobby.pending_challenger("carol").await.as_deref(), Some("bob"));
    carol.drain();

    let outcome = lobby
        .respond_to_challenge(&carol.session, None, true)
        .await
        .unwrap();
    assert!(matches!(outcome, ChallengeOutcome::Matched(_)));

    assert!(alice.drain().is_empty(), "overwritten challenger hears nothing");
    assert_eq!(
        bob.types(),
        vec![MessageType::ChallengeResponse, MessageType::GameStart]
    );
    assert_eq!(carol.types(), vec![MessageType::GameStart]);
    assert!(!alice.session.is_in_match());
}

#[tokio::test]
async fn test_respond_with_stale_hint_is_ignored() {
    let lobby = Lobby::default();
    let alice = online(&lobby, 1, "alice").await;
    let bob = online(&lobby, 2, "bob").await;
    let mut carol = online(&lobby, 3, "carol").await;

    lobby.challenge(&alice.session, "carol").await.unwrap();
    lobby.challenge(&bob.session, "carol").await.unwrap();
    carol.drain();

    let outcome = lobby
        .respond_to_challenge(&carol.session, Some("alice"), true)
        .await
        .unwrap();
    assert_eq!(outcome, ChallengeOutcome::Stale);
    assert_eq!(
        lobby.pending_challenger("carol").await.as_deref(),
        Some("bob"),
        "the newer challenge must survive"
    );
    assert!(!carol.session.is_in_match());
}

#[tokio::test]
async fn test_respond_with_matching_hint_is_accepted() {
    let lobby = Lobby::default();
    let alice = online(&lobby, 1, "alice").await;
    let bob = online(&lobby, 2, "bob").await;

    lobby.challenge(&alice.session, "bob").await.unwrap();
    let outcome = lobby
        .respond_to_challenge(&bob.session, Some("alice"), true)
        .await
        .unwrap();
    assert!(matches!(outcome, ChallengeOutcome::Matched(_)));
}

#[tokio::test]
async fn test_respond_without_pending_is_noop() {
    let lobby = Lobby::default();
    let mut bob = online(&lobby, 2, "bob").await;

    let outcome = lobby
        .respond_to_challenge(&bob.session, None, true)
        .await
        .unwrap();
    assert_eq!(outcome, ChallengeOutcome::NoPending);
    assert!(bob.drain().is_empty());
}

#[tokio::test]
async fn test_respond_decline_notifies_challenger_only() {
    let lobby = Lobby::default();
    let mut alice = online(&lobby, 1, "alice").await;
    let mut bob = online(&lobby, 2, "bob").await;

    lobby.challenge(&alice.session, "bob").await.unwrap();
    bob.drain();
    let outcome = lobby
        .respond_to_challenge(&bob.session, None, false)
        .await
        .unwrap();

    assert_eq!(outcome, ChallengeOutcome::Declined);
    let got = alice.drain();
    assert_eq!(got.len(), 1);
    let verdict: ChallengeVerdict = got[0].payload_as().unwrap();
    assert_eq!(verdict.from, "bob");
    assert!(!verdict.accepted);
    assert!(bob.drain().is_empty());
    assert!(lobby.pending_challenger("bob").await.is_none());
}

#[tokio::test]
async fn test_respond_after_challenger_left_is_cancelled() {
    let lobby = Lobby::default();
    let alice = online(&lobby, 1, "alice").await;
    let mut bob = online(&lobby, 2, "bob").await;

    lobby.challenge(&alice.session, "bob").await.unwrap();
    bob.drain();

    // The challenger's session dies without a clean removal: the pending
    // entry still exists but the directory can't resolve the name.
    let Player { session, inbox } = alice;
    drop((session, inbox));

    let outcome = lobby
        .respond_to_challenge(&bob.session, None, true)
        .await
        .unwrap();
    assert_eq!(outcome, ChallengeOutcome::ChallengerGone);

    let got = bob.drain();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].message_type, MessageType::ChallengeCancelled);
    assert_eq!(got[0].response_code, ResponseCode::NotFound);
    let cancelled: ChallengeCancelled = got[0].payload_as().unwrap();
    assert_eq!(cancelled.challenger, "alice");
    assert!(!bob.session.is_in_match());
}

#[tokio::test]
async fn test_respond_when_challenger_already_playing_is_cancelled() {
    let lobby = Lobby::default();
    let alice = online(&lobby, 1, "alice").await;
    let mut bob = online(&lobby, 2, "bob").await;
    let carol = online(&lobby, 3, "carol").await;

    lobby.challenge(&alice.session, "bob").await.unwrap();
    bob.drain();
    lobby.create_match(&alice.session, &carol.session).await.unwrap();

    let outcome = lobby
        .respond_to_challenge(&bob.session, None, true)
        .await
        .unwrap();
    assert_eq!(outcome, ChallengeOutcome::Cancelled);
    let got = bob.drain();
    assert_eq!(got[0].message_type, MessageType::ChallengeCancelled);
    assert_eq!(got[0].response_code, ResponseCode::Conflict);
    assert!(!bob.session.is_in_match());
}

#[tokio::test]
async fn test_responder_removed_then_response_is_noop() {
    let lobby = Lobby::default();
    let mut alice = online(&lobby, 1, "alice").await;
    let bob = online(&lobby, 2, "bob").await;

    lobby.challenge(&alice.session, "bob").await.unwrap();
    lobby.remove_player(&bob.session).await;
    assert!(lobby.pending_challenger("bob").await.is_none());

    let outcome = lobby
        .respond_to_challenge(&bob.session, None, true)
        .await
        .unwrap();
    assert_eq!(outcome, ChallengeOutcome::NoPending);
    assert!(alice.drain().is_empty());
    assert!(!alice.session.is_in_match());
}

#[tokio::test]
async fn test_remove_challenger_purges_its_challenges() {
    let lobby = Lobby::default();
    let alice = online(&lobby, 1, "alice").await;
    let _bob = online(&lobby, 2, "bob").await;

    lobby.challenge(&alice.session, "bob").await.unwrap();
    lobby.remove_player(&alice.session).await;
    assert!(lobby.pending_challenger("bob").await.is_none());
}

// =========================================================================
// Matches
// =========================================================================

#[tokio::test]
async fn test_accepted_challenge_links_sessions_symmetrically() {
    let lobby = Lobby::default();
    let mut alice = online(&lobby, 1, "alice").await;
    let mut bob = online(&lobby, 2, "bob").await;

    lobby.challenge(&alice.session, "bob").await.unwrap();
    bob.drain();
    let ChallengeOutcome::Matched(match_id) = lobby
        .respond_to_challenge(&bob.session, None, true)
        .await
        .unwrap()
    else {
        panic!("expected a match");
    };

    let a_seat = alice.session.seat().unwrap();
    let b_seat = bob.session.seat().unwrap();
    assert_eq!(a_seat.match_id, match_id);
    assert_eq!(b_seat.match_id, match_id);
    assert_eq!(a_seat.role, Role::White);
    assert_eq!(b_seat.role, Role::Black);
    assert_eq!(alice.session.opponent().unwrap().id(), bob.session.id());
    assert_eq!(bob.session.opponent().unwrap().id(), alice.session.id());

    // The challenger hears the verdict before the game starts.
    let got = alice.drain();
    assert_eq!(got[0].message_type, MessageType::ChallengeResponse);
    let start: GameStart = got[1].payload_as().unwrap();
    assert_eq!(start.game_id, match_id);
    assert_eq!(start.opponent, "bob");
    assert_eq!(start.role, Role::White);
}

#[tokio::test]
async fn test_remove_player_in_match_notifies_opponent_once() {
    let lobby = Lobby::default();
    let (alice, mut bob) = seated_pair(&lobby).await;

    lobby.remove_player(&alice.session).await;
    lobby.remove_player(&alice.session).await;

    assert!(alice.session.seat().is_none());
    assert!(bob.session.seat().is_none());
    let got = bob.drain();
    assert_eq!(got.len(), 1, "exactly one GAME_END");
    let end: GameEnd = got[0].payload_as().unwrap();
    assert_eq!(end.reason, end_reason::OPPONENT_DISCONNECTED);
    assert_eq!(end.result, GameResult::Win);
    assert_eq!(end.opponent, "alice");
    assert_eq!(lobby.online_players().await, vec!["bob"]);
}

#[tokio::test]
async fn test_remove_player_both_sides_leave_single_notification() {
    let lobby = Lobby::default();
    let (alice, mut bob) = seated_pair(&lobby).await;

    let (a, b) = (Arc::clone(&alice.session), Arc::clone(&bob.session));
    let l = Arc::new(lobby);
    let (l1, l2) = (Arc::clone(&l), Arc::clone(&l));
    let t1 = tokio::spawn(async move { l1.remove_player(&a).await });
    let t2 = tokio::spawn(async move { l2.remove_player(&b).await });
    t1.await.unwrap();
    t2.await.unwrap();

    let mut alice = alice;
    let total = alice.drain().len() + bob.drain().len();
    assert_eq!(total, 1, "only the first leaver's opponent is notified");
    assert!(l.online_players().await.is_empty());
}

#[tokio::test]
async fn test_resign_ends_match_for_both() {
    let lobby = Lobby::default();
    let (mut alice, mut bob) = seated_pair(&lobby).await;

    lobby.resign(&alice.session).await.unwrap();

    let a_end: GameEnd = alice.drain()[0].payload_as().unwrap();
    let b_end: GameEnd = bob.drain()[0].payload_as().unwrap();
    assert_eq!(a_end.result, GameResult::Loss);
    assert_eq!(b_end.result, GameResult::Win);
    assert_eq!(a_end.reason, end_reason::RESIGNATION);
    assert!(!alice.session.is_in_match());
    assert!(!bob.session.is_in_match());
}

#[tokio::test]
async fn test_resign_without_match_is_rejected() {
    let lobby = Lobby::default();
    let alice = online(&lobby, 1, "alice").await;
    assert_eq!(
        lobby.resign(&alice.session).await,
        Err(LobbyError::NotInMatch)
    );
}

#[tokio::test]
async fn test_finish_match_reports_result_from_each_side() {
    let lobby = Lobby::default();
    let (mut alice, mut bob) = seated_pair(&lobby).await;

    lobby
        .finish_match(&bob.session, GameResult::Win, end_reason::CHECKMATE)
        .await
        .unwrap();

    let a_end: GameEnd = alice.drain()[0].payload_as().unwrap();
    let b_end: GameEnd = bob.drain()[0].payload_as().unwrap();
    assert_eq!(a_end.result, GameResult::Loss);
    assert_eq!(b_end.result, GameResult::Win);
    assert_eq!(b_end.reason, "checkmate");
    assert_eq!(b_end.opponent, "alice");
}

// =========================================================================
// Draws
// =========================================================================

#[tokio::test]
async fn test_draw_offer_then_accept_ends_in_draw() {
    let lobby = Lobby::default();
    let (mut alice, mut bob) = seated_pair(&lobby).await;

    lobby.offer_draw(&alice.session).await.unwrap();
    let offered = bob.drain();
    assert_eq!(offered[0].message_type, MessageType::DrawOffered);
    let notice: DrawNotice = offered[0].payload_as().unwrap();
    assert_eq!(notice.from, "alice");

    lobby.answer_draw(&bob.session, true).await.unwrap();

    for player in [&mut alice, &mut bob] {
        let end: GameEnd = player.drain()[0].payload_as().unwrap();
        assert_eq!(end.result, GameResult::Draw);
        assert_eq!(end.reason, end_reason::DRAW_AGREED);
    }
    assert!(!alice.session.is_in_match());
}

#[tokio::test]
async fn test_draw_decline_notifies_offerer_and_keeps_match() {
    let lobby = Lobby::default();
    let (mut alice, mut bob) = seated_pair(&lobby).await;

    lobby.offer_draw(&alice.session).await.unwrap();
    bob.drain();
    lobby.answer_draw(&bob.session, false).await.unwrap();

    assert_eq!(alice.types(), vec![MessageType::DrawDeclined]);
    assert!(alice.session.is_in_match());
    assert_eq!(
        lobby.answer_draw(&bob.session, true).await,
        Err(LobbyError::NoDrawOffer),
        "a declined offer is consumed"
    );
}

#[tokio::test]
async fn test_draw_accept_own_offer_is_rejected() {
    let lobby = Lobby::default();
    let (alice, _bob) = seated_pair(&lobby).await;

    lobby.offer_draw(&alice.session).await.unwrap();
    assert_eq!(
        lobby.answer_draw(&alice.session, true).await,
        Err(LobbyError::NoDrawOffer)
    );
}

#[tokio::test]
async fn test_draw_offer_without_match_is_rejected() {
    let lobby = Lobby::default();
    let alice = online(&lobby, 1, "alice").await;
    assert_eq!(
        lobby.offer_draw(&alice.session).await,
        Err(LobbyError::NotInMatch)
    );
}

// =========================================================================
// Quick match
// =========================================================================

#[tokio::test]
async fn test_find_match_pairs_second_caller_with_first() {
    let lobby = Lobby::default();
    let mut alice = online(&lobby, 1, "alice").await;
    let mut bob = online(&lobby, 2, "bob").await;

    assert_eq!(
        lobby.find_match(&alice.session).await,
        Ok(QuickMatch::Searching)
    );
    let Ok(QuickMatch::Matched(match_id)) = lobby.find_match(&bob.session).await else {
        panic!("second caller should be matched");
    };

    let a_start: GameStart = alice.drain()[0].payload_as().unwrap();
    let b_start: GameStart = bob.drain()[0].payload_as().unwrap();
    assert_eq!(a_start.game_id, match_id);
    assert_eq!(a_start.role, Role::White, "the waiting player is the challenger");
    assert_eq!(b_start.role, Role::Black);
}

#[tokio::test]
async fn test_find_match_after_waiting_player_left_queues_caller() {
    let lobby = Lobby::default();
    let alice = online(&lobby, 1, "alice").await;
    let bob = online(&lobby, 2, "bob").await;

    lobby.find_match(&alice.session).await.unwrap();
    lobby.remove_player(&alice.session).await;

    assert_eq!(
        lobby.find_match(&bob.session).await,
        Ok(QuickMatch::Searching)
    );
    assert!(!alice.session.is_in_match());
}

#[tokio::test]
async fn test_find_match_waiting_player_who_accepted_challenge_is_skipped() {
    let lobby = Lobby::default();
    let alice = online(&lobby, 1, "alice").await;
    let bob = online(&lobby, 2, "bob").await;
    let carol = online(&lobby, 3, "carol").await;

    lobby.find_match(&alice.session).await.unwrap();
    lobby.create_match(&bob.session, &alice.session).await.unwrap();

    assert_eq!(
        lobby.find_match(&carol.session).await,
        Ok(QuickMatch::Searching)
    );
}
