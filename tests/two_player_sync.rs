//! Two clients sharing sessions through the in-process store.

use std::{future::Future, sync::Arc, time::Duration};

use aurora_games::{
    config::GameSettings,
    dao::{document_store::memory::MemoryDocumentStore, models::GAME_SESSIONS_COLLECTION},
    error::ServiceError,
    services::{
        game_client::{GameClient, JoinRequest},
        mirror::SessionMirror,
    },
    state::{
        GameSession, GameState, GameType, MemoryMatchState, MoveError, ParticipantPair,
        SeatStatus, SessionStatus,
    },
};
use rand::{SeedableRng, rngs::StdRng};
use tokio::time::{Instant, sleep, timeout};

const PATIENCE: Duration = Duration::from_secs(60);

async fn settle<F: Future>(future: F) -> F::Output {
    timeout(PATIENCE, future)
        .await
        .expect("timed out waiting for the session")
}

async fn join(
    store: &MemoryDocumentStore,
    game_type: GameType,
    me: &str,
    opponent: &str,
    seed: u64,
) -> GameClient {
    GameClient::join(
        Arc::new(store.clone()),
        JoinRequest {
            game_type,
            me: me.into(),
            opponent: opponent.into(),
        },
        GameSettings::default(),
        Box::new(StdRng::seed_from_u64(seed)),
    )
    .await
    .expect("join session")
}

async fn both(store: &MemoryDocumentStore, game_type: GameType) -> (GameClient, GameClient) {
    let alice = join(store, game_type, "alice", "bob", 1).await;
    let bob = join(store, game_type, "bob", "alice", 2).await;
    (alice, bob)
}

/// Wait until `client` holds a state matching `accept`.
async fn wait_until<F>(client: &GameClient, accept: F) -> GameSession
where
    F: FnMut(&GameSession) -> bool,
{
    let mut updates = client.watch();
    settle(updates.wait_for(accept))
        .await
        .expect("client stopped")
        .clone()
}

/// The client whose turn it is, then the other one.
fn by_turn<'a>(
    a: &'a GameClient,
    b: &'a GameClient,
    session: &GameSession,
) -> (&'a GameClient, &'a GameClient) {
    if session.seat_status(a.me()) == SeatStatus::YourTurn {
        (a, b)
    } else {
        (b, a)
    }
}

fn memory(session: &GameSession) -> &MemoryMatchState {
    match &session.game {
        GameState::MemoryMatch(game) => game,
        other => panic!("expected memory match, got {other:?}"),
    }
}

/// First hidden card and a hidden card with the same face.
fn matching_pair(game: &MemoryMatchState) -> (usize, usize) {
    let first = (0..game.cards.len())
        .find(|&i| !game.revealed[i])
        .expect("a hidden card");
    let second = (first + 1..game.cards.len())
        .find(|&i| !game.revealed[i] && game.cards[i] == game.cards[first])
        .expect("its partner");
    (first, second)
}

/// First hidden card and a hidden card with a different face.
fn mismatching_pair(game: &MemoryMatchState) -> (usize, usize) {
    let first = (0..game.cards.len())
        .find(|&i| !game.revealed[i])
        .expect("a hidden card");
    let second = (first + 1..game.cards.len())
        .find(|&i| !game.revealed[i] && game.cards[i] != game.cards[first])
        .expect("a different face");
    (first, second)
}

#[tokio::test(start_paused = true)]
async fn both_players_see_the_winning_line() {
    let store = MemoryDocumentStore::new();
    let (alice, bob) = both(&store, GameType::TicTacToe).await;
    let (first, second) = by_turn(&alice, &bob, &alice.snapshot());

    for (player, cell) in [(first, 0), (second, 3), (first, 1), (second, 4), (first, 2)] {
        let played = player.play_cell(cell).await.expect("legal move");
        let other = if std::ptr::eq(player, first) { second } else { first };
        wait_until(other, |session| *session == played).await;
    }

    assert_eq!(first.snapshot().status(), SessionStatus::Won);
    assert_eq!(first.status_for_me(), SeatStatus::YouWon);
    assert_eq!(second.status_for_me(), SeatStatus::YouLost);
    assert_eq!(second.status_for_me().to_string(), "You lost!");
    assert!(matches!(
        second.play_cell(8).await,
        Err(ServiceError::Rejected(MoveError::GameAlreadyOver))
    ));
}

#[tokio::test(start_paused = true)]
async fn out_of_turn_move_changes_nothing() {
    let store = MemoryDocumentStore::new();
    let (alice, bob) = both(&store, GameType::TicTacToe).await;
    let (_, waiting) = by_turn(&alice, &bob, &alice.snapshot());
    let before = waiting.snapshot();
    let stored = store.peek(GAME_SESSIONS_COLLECTION, before.session_id().as_str());

    let result = waiting.play_cell(4).await;

    assert!(matches!(
        result,
        Err(ServiceError::Rejected(MoveError::NotYourTurn))
    ));
    assert_eq!(waiting.snapshot(), before);
    assert_eq!(
        store.peek(GAME_SESSIONS_COLLECTION, before.session_id().as_str()),
        stored
    );
}

#[tokio::test(start_paused = true)]
async fn matching_pair_scores_and_keeps_the_turn() {
    let store = MemoryDocumentStore::new();
    let (alice, bob) = both(&store, GameType::MemoryMatch).await;
    let start = alice.snapshot();
    let (player, other) = by_turn(&alice, &bob, &start);
    let (i, j) = matching_pair(memory(&start));

    player.flip_card(i).await.expect("first flip");
    let resolved = player.flip_card(j).await.expect("second flip");

    let game = memory(&resolved);
    assert_eq!(game.score_player1 + game.score_player2, 1);
    assert!(game.flipped.is_empty());
    assert!(game.revealed[i] && game.revealed[j]);
    assert_eq!(player.status_for_me(), SeatStatus::YourTurn);

    wait_until(other, |session| *session == resolved).await;
    assert_eq!(other.status_for_me(), SeatStatus::OpponentsTurn);
}

#[tokio::test(start_paused = true)]
async fn mismatch_stays_visible_for_the_reveal_delay() {
    let store = MemoryDocumentStore::new();
    let (alice, bob) = both(&store, GameType::MemoryMatch).await;
    let start = alice.snapshot();
    let (player, other) = by_turn(&alice, &bob, &start);
    let (i, j) = mismatching_pair(memory(&start));

    player.flip_card(i).await.expect("first flip");
    let shown = player.flip_card(j).await.expect("second flip");
    let flipped_at = Instant::now();

    assert!(memory(&shown).revealed[i] && memory(&shown).revealed[j]);
    assert_eq!(shown.pending_pair(), Some((i, j)));
    let seen = wait_until(other, |session| session.pending_pair() == Some((i, j))).await;
    assert!(memory(&seen).revealed[i] && memory(&seen).revealed[j]);

    let hidden = wait_until(other, |session| session.pending_pair().is_none()).await;
    assert!(flipped_at.elapsed() >= Duration::from_secs(1));
    assert!(!memory(&hidden).revealed[i] && !memory(&hidden).revealed[j]);
    assert_eq!(other.status_for_me(), SeatStatus::YourTurn);

    wait_until(player, |session| *session == hidden).await;
    assert_eq!(player.status_for_me(), SeatStatus::OpponentsTurn);
}

#[tokio::test(start_paused = true)]
async fn clearing_every_pair_finishes_the_game() {
    let store = MemoryDocumentStore::new();
    let (alice, bob) = both(&store, GameType::MemoryMatch).await;

    let mut session = alice.snapshot();
    while session.status() == SessionStatus::Ongoing {
        let (player, other) = by_turn(&alice, &bob, &session);
        let (i, j) = matching_pair(memory(&session));
        player.flip_card(i).await.expect("first flip");
        session = player.flip_card(j).await.expect("second flip");
        wait_until(other, |seen| *seen == session).await;
    }

    let game = memory(&session);
    assert_eq!(session.status(), SessionStatus::Finished);
    assert_eq!(
        (game.score_player1 + game.score_player2) as usize,
        game.cards.len() / 2
    );
    assert!(game.revealed.iter().all(|&up| up));
    assert_eq!(alice.snapshot(), bob.snapshot());
}

#[tokio::test(start_paused = true)]
async fn republishing_an_unchanged_session_is_not_observed() {
    let store = MemoryDocumentStore::new();
    let (alice, bob) = both(&store, GameType::TicTacToe).await;
    let current = alice.snapshot();
    wait_until(&bob, |session| *session == current).await;

    let mut alice_updates = alice.watch();
    let mut bob_updates = bob.watch();
    alice_updates.mark_unchanged();
    bob_updates.mark_unchanged();

    SessionMirror::new(Arc::new(store.clone()))
        .publish(&current)
        .await
        .unwrap();
    sleep(Duration::from_millis(100)).await;

    assert!(!alice_updates.has_changed().unwrap());
    assert!(!bob_updates.has_changed().unwrap());
    assert_eq!(bob.snapshot(), current);
}

#[tokio::test(start_paused = true)]
async fn failed_write_restores_previous_state() {
    let store = MemoryDocumentStore::new();
    let (alice, bob) = both(&store, GameType::TicTacToe).await;
    let before = alice.snapshot();
    let (player, _) = by_turn(&alice, &bob, &before);

    store.set_offline(true);
    let result = player.play_cell(4).await;
    assert!(matches!(result, Err(ServiceError::Unavailable(_))));
    assert_eq!(player.snapshot(), before);

    store.set_offline(false);
    let played = player.play_cell(4).await.expect("retry succeeds");
    assert_ne!(played, before);
}

#[tokio::test(start_paused = true)]
async fn concurrent_resets_converge_on_the_last_write() {
    let store = MemoryDocumentStore::new();
    let (alice, bob) = both(&store, GameType::MemoryMatch).await;

    let (from_alice, from_bob) = tokio::join!(alice.reset(), bob.reset());
    from_alice.expect("alice reset");
    from_bob.expect("bob reset");

    // Last write wins: only convergence is guaranteed, not which reset survives.
    let id = alice.session_id().clone();
    let stored = store
        .peek(GAME_SESSIONS_COLLECTION, id.as_str())
        .expect("stored session");
    let expected = GameSession::from_fields(GameType::MemoryMatch, id, &stored)
        .with_participants(alice.snapshot().meta.participants.clone());

    wait_until(&alice, |session| *session == expected).await;
    wait_until(&bob, |session| *session == expected).await;
}

#[tokio::test(start_paused = true)]
async fn reset_by_opponent_drops_the_stale_correction() {
    let store = MemoryDocumentStore::new();
    let (alice, bob) = both(&store, GameType::MemoryMatch).await;
    let start = alice.snapshot();
    let (player, other) = by_turn(&alice, &bob, &start);
    let (i, j) = mismatching_pair(memory(&start));

    player.flip_card(i).await.expect("first flip");
    player.flip_card(j).await.expect("second flip");
    wait_until(other, |session| session.pending_pair() == Some((i, j))).await;

    let fresh = other.reset().await.expect("reset");
    wait_until(player, |session| *session == fresh).await;

    sleep(Duration::from_secs(2)).await;
    assert_eq!(player.snapshot(), fresh);
    assert_eq!(other.snapshot(), fresh);
    assert!(memory(&fresh).revealed.iter().all(|&up| !up));
}

#[tokio::test(start_paused = true)]
async fn leaving_mid_reveal_still_hands_the_turn_over() {
    let store = MemoryDocumentStore::new();
    let (alice, bob) = both(&store, GameType::MemoryMatch).await;
    assert_eq!(store.listener_count(), 2);

    let start = alice.snapshot();
    let on_turn = start.seat_status("alice") == SeatStatus::YourTurn;
    let (player, other) = if on_turn { (alice, bob) } else { (bob, alice) };
    let (i, j) = mismatching_pair(memory(&start));

    player.flip_card(i).await.expect("first flip");
    player.flip_card(j).await.expect("second flip");
    let flipped = Instant::now();
    player.leave().await.expect("leave");
    assert_eq!(store.listener_count(), 1);

    wait_until(&other, |session| session.pending_pair() == Some((i, j))).await;
    let hidden = wait_until(&other, |session| session.pending_pair().is_none()).await;
    assert!(flipped.elapsed() >= GameSettings::default().mismatch_reveal);
    assert!(!memory(&hidden).revealed[i] && !memory(&hidden).revealed[j]);
    assert_eq!(other.status_for_me(), SeatStatus::YourTurn);

    let (k, _) = mismatching_pair(memory(&hidden));
    other.flip_card(k).await.expect("opponent plays on");

    other.leave().await.expect("leave");
    assert_eq!(store.listener_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn rejoining_settles_a_pair_left_face_up() {
    let store = MemoryDocumentStore::new();
    let mut rng = StdRng::seed_from_u64(7);
    let fresh = GameSession::new_game(
        GameType::MemoryMatch,
        ParticipantPair::new("alice", "bob"),
        &GameSettings::default(),
        &mut rng,
    );
    let (me, opponent) = if fresh.seat_status("alice") == SeatStatus::YourTurn {
        ("alice", "bob")
    } else {
        ("bob", "alice")
    };
    let (i, j) = mismatching_pair(memory(&fresh));
    let left_open = fresh
        .flip(me, i)
        .and_then(|session| session.flip(me, j))
        .expect("two flips");
    SessionMirror::new(Arc::new(store.clone()))
        .publish(&left_open)
        .await
        .expect("seed session");

    let back = join(&store, GameType::MemoryMatch, me, opponent, 3).await;
    assert_eq!(back.snapshot().pending_pair(), Some((i, j)));

    let hidden = wait_until(&back, |session| session.pending_pair().is_none()).await;
    assert!(!memory(&hidden).revealed[i] && !memory(&hidden).revealed[j]);
    assert_eq!(hidden.seat_status(opponent), SeatStatus::YourTurn);

    back.leave().await.expect("leave");
    assert_eq!(store.listener_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn joining_an_unreachable_store_fails_without_listening() {
    let store = MemoryDocumentStore::new();
    store.set_offline(true);
    let result = GameClient::join(
        Arc::new(store.clone()),
        JoinRequest {
            game_type: GameType::MemoryMatch,
            me: "alice".into(),
            opponent: "bob".into(),
        },
        GameSettings::default(),
        Box::new(StdRng::seed_from_u64(0)),
    )
    .await;

    assert!(matches!(result, Err(ServiceError::Unavailable(_))));
    assert_eq!(store.listener_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn playing_yourself_is_refused() {
    let store = MemoryDocumentStore::new();
    let result = GameClient::join(
        Arc::new(store.clone()),
        JoinRequest {
            game_type: GameType::TicTacToe,
            me: "alice".into(),
            opponent: "alice".into(),
        },
        GameSettings::default(),
        Box::new(StdRng::seed_from_u64(0)),
    )
    .await;

    assert!(matches!(result, Err(ServiceError::InvalidInput(_))));
    assert_eq!(store.listener_count(), 0);
}
