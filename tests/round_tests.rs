#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Integration tests for the round controller.
//!
//! Every test runs on tokio's paused clock: timers fire deterministically and
//! a whole game takes no wall-clock time. The `TestAudio` sink from
//! `tests/common` stays inspectable after moving into the controller, which
//! is how fragment-window enforcement is observed.

mod common;

use std::time::Duration;

use beat_chaser_client::round::{RoundOptions, RoundPhase};
use beat_chaser_client::scoring::ScoreTier;
use beat_chaser_client::{GameSession, Guess, RoundController};

use common::{lock, single_track_catalog, song, wait_for_phase, TestAudio};

fn bohemian_catalog() -> Vec<beat_chaser_client::Song> {
    single_track_catalog("Bohemian Rhapsody", "Queen", 354.0)
}

fn options() -> RoundOptions {
    RoundOptions::default()
        .with_fragment_duration_secs(5.0)
        .with_audio_poll_interval(Duration::from_millis(250))
}

// ════════════════════════════════════════════════════════════════════
// Game progression
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn three_timeouts_complete_the_game_with_zero_score() {
    let session = GameSession::new("game-1", 3, 5);
    let (audio, _state) = TestAudio::new();
    let (controller, mut state) =
        RoundController::start(session, bohemian_catalog(), audio, options());

    for round in 1..=3 {
        let snapshot = wait_for_phase(&mut state, RoundPhase::Countdown).await;
        assert_eq!(snapshot.round, round);
        // The guess timer is at its full value at the start of every round.
        assert_eq!(snapshot.time_remaining_secs, 5);

        // No guess, no skip: the timer runs out.
        let snapshot = wait_for_phase(&mut state, RoundPhase::Revealed).await;
        let outcome = snapshot.last_outcome.clone().unwrap();
        assert_eq!(outcome.round, round);
        assert_eq!(outcome.tier, ScoreTier::Miss);
        assert_eq!(outcome.delta, 0);
        assert_eq!(snapshot.score, 0);

        controller.advance().unwrap();
    }

    let snapshot = wait_for_phase(&mut state, RoundPhase::Complete).await;
    assert_eq!(snapshot.round, 3);
    assert_eq!(snapshot.score, 0);
}

#[tokio::test(start_paused = true)]
async fn countdown_runs_three_ticks_before_the_guess_window() {
    let session = GameSession::new("game-1", 1, 30);
    let (audio, audio_state) = TestAudio::new();
    let (_controller, mut state) =
        RoundController::start(session, bohemian_catalog(), audio, options());

    assert_eq!(state.borrow().countdown, 3);
    assert_eq!(state.borrow().phase, RoundPhase::Countdown);
    // Nothing plays during the lead-in.
    assert!(lock(&audio_state).play_calls.is_empty());

    let snapshot = wait_for_phase(&mut state, RoundPhase::AwaitingGuess).await;
    assert_eq!(snapshot.countdown, 0);
    assert_eq!(lock(&audio_state).play_calls.len(), 1);
}

// ════════════════════════════════════════════════════════════════════
// Scoring
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn top_tier_guess_scores_one_hundred() {
    let session = GameSession::new("game-1", 1, 30);
    let (audio, _state) = TestAudio::new();
    let (controller, mut state) =
        RoundController::start(session, bohemian_catalog(), audio, options());

    wait_for_phase(&mut state, RoundPhase::AwaitingGuess).await;
    controller
        .submit_guess(Guess::new("bohemian rhapsody", "queen"))
        .unwrap();

    let snapshot = wait_for_phase(&mut state, RoundPhase::Revealed).await;
    let outcome = snapshot.last_outcome.clone().unwrap();
    assert_eq!(outcome.tier, ScoreTier::Both);
    assert_eq!(outcome.delta, 100);
    assert_eq!(snapshot.score, 100);
}

#[tokio::test(start_paused = true)]
async fn partial_title_guess_scores_the_title_tier() {
    let session = GameSession::new("game-1", 1, 30);
    let (audio, _state) = TestAudio::new();
    let (controller, mut state) =
        RoundController::start(session, bohemian_catalog(), audio, options());

    wait_for_phase(&mut state, RoundPhase::AwaitingGuess).await;
    controller
        .submit_guess(Guess::new("rhapsody", "the beatles"))
        .unwrap();

    let snapshot = wait_for_phase(&mut state, RoundPhase::Revealed).await;
    let outcome = snapshot.last_outcome.clone().unwrap();
    assert_eq!(outcome.tier, ScoreTier::TitleOnly);
    assert_eq!(outcome.delta, 60);
    assert_eq!(snapshot.score, 60);
}

#[tokio::test(start_paused = true)]
async fn skip_applies_the_penalty_against_earned_points() {
    let session = GameSession::new("game-1", 2, 30);
    let (audio, _state) = TestAudio::new();
    let (controller, mut state) =
        RoundController::start(session, bohemian_catalog(), audio, options());

    wait_for_phase(&mut state, RoundPhase::AwaitingGuess).await;
    controller
        .submit_guess(Guess::new("bohemian rhapsody", "queen"))
        .unwrap();
    let snapshot = wait_for_phase(&mut state, RoundPhase::Revealed).await;
    assert_eq!(snapshot.score, 100);
    controller.advance().unwrap();

    wait_for_phase(&mut state, RoundPhase::AwaitingGuess).await;
    controller.skip_round().unwrap();
    let snapshot = wait_for_phase(&mut state, RoundPhase::Revealed).await;
    let outcome = snapshot.last_outcome.clone().unwrap();
    assert_eq!(outcome.tier, ScoreTier::Skipped);
    assert_eq!(outcome.delta, -10);
    assert_eq!(snapshot.score, 90);
}

#[tokio::test(start_paused = true)]
async fn skip_at_zero_score_stays_at_zero() {
    let session = GameSession::new("game-1", 1, 30);
    let (audio, _state) = TestAudio::new();
    let (controller, mut state) =
        RoundController::start(session, bohemian_catalog(), audio, options());

    wait_for_phase(&mut state, RoundPhase::AwaitingGuess).await;
    controller.skip_round().unwrap();

    let snapshot = wait_for_phase(&mut state, RoundPhase::Revealed).await;
    assert_eq!(snapshot.last_outcome.clone().unwrap().delta, 0);
    assert_eq!(snapshot.score, 0);
}

// ════════════════════════════════════════════════════════════════════
// Timers
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn guess_timer_is_monotone_and_never_negative() {
    let session = GameSession::new("game-1", 1, 5);
    let (audio, _state) = TestAudio::new();
    let (_controller, mut state) =
        RoundController::start(session, bohemian_catalog(), audio, options());

    wait_for_phase(&mut state, RoundPhase::AwaitingGuess).await;

    let mut readings = vec![state.borrow().time_remaining_secs];
    loop {
        if state.changed().await.is_err() {
            break;
        }
        let snapshot = state.borrow().clone();
        readings.push(snapshot.time_remaining_secs);
        if snapshot.phase != RoundPhase::AwaitingGuess {
            break;
        }
    }

    assert!(readings.windows(2).all(|pair| pair[0] >= pair[1]));
    assert_eq!(readings.last().copied(), Some(0));
}

#[tokio::test(start_paused = true)]
async fn duplicate_round_end_signals_are_no_ops() {
    let session = GameSession::new("game-1", 1, 30);
    let (audio, _state) = TestAudio::new();
    let (controller, mut state) =
        RoundController::start(session, bohemian_catalog(), audio, options());

    wait_for_phase(&mut state, RoundPhase::AwaitingGuess).await;
    // Two submits race; only the first may score.
    controller
        .submit_guess(Guess::new("bohemian rhapsody", "queen"))
        .unwrap();
    controller
        .submit_guess(Guess::new("bohemian rhapsody", "queen"))
        .unwrap();
    controller.skip_round().unwrap();

    let snapshot = wait_for_phase(&mut state, RoundPhase::Revealed).await;
    assert_eq!(snapshot.score, 100);

    tokio::time::sleep(Duration::from_secs(2)).await;
    let snapshot = state.borrow().clone();
    assert_eq!(snapshot.phase, RoundPhase::Revealed);
    assert_eq!(snapshot.score, 100);
    assert_eq!(snapshot.last_outcome.clone().unwrap().tier, ScoreTier::Both);
}

#[tokio::test(start_paused = true)]
async fn guess_after_timeout_is_ignored() {
    let session = GameSession::new("game-1", 1, 3);
    let (audio, _state) = TestAudio::new();
    let (controller, mut state) =
        RoundController::start(session, bohemian_catalog(), audio, options());

    // Let the timer expire first.
    let snapshot = wait_for_phase(&mut state, RoundPhase::Revealed).await;
    assert_eq!(snapshot.last_outcome.clone().unwrap().tier, ScoreTier::Miss);

    controller
        .submit_guess(Guess::new("bohemian rhapsody", "queen"))
        .unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let snapshot = state.borrow().clone();
    assert_eq!(snapshot.phase, RoundPhase::Revealed);
    assert_eq!(snapshot.score, 0);
    assert_eq!(snapshot.last_outcome.clone().unwrap().tier, ScoreTier::Miss);
}

// ════════════════════════════════════════════════════════════════════
// Audio fragment window
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn fragment_is_force_paused_within_one_poll_interval() {
    let session = GameSession::new("game-1", 1, 30);
    let (audio, audio_state) = TestAudio::new();
    let (_controller, mut state) =
        RoundController::start(session, bohemian_catalog(), audio, options());

    let snapshot = wait_for_phase(&mut state, RoundPhase::AwaitingGuess).await;
    let start = snapshot.fragment_start_secs;
    assert!(lock(&audio_state).playing);

    // The 5 s fragment ends long before the 30 s guess window does.
    tokio::time::sleep(Duration::from_secs(6)).await;

    let snapshot = state.borrow().clone();
    assert_eq!(snapshot.phase, RoundPhase::AwaitingGuess);
    assert!(snapshot.time_remaining_secs > 0);

    let audio = lock(&audio_state);
    assert!(!audio.playing, "fragment should be force-paused");
    let position = audio.position_secs();
    assert!(
        position >= start + 5.0 && position <= start + 5.0 + 0.3,
        "paused at {position}, window started at {start}"
    );
}

#[tokio::test(start_paused = true)]
async fn short_track_clamps_the_fragment_window() {
    // 20 s track, 30 s fragment: the start pins to 0 and the enforced window
    // is [0, 20], not [0, 30].
    let session = GameSession::new("game-1", 1, 30);
    let catalog = vec![song("short", "Intro", "Band", 20.0)];
    let options = RoundOptions::default()
        .with_fragment_duration_secs(30.0)
        .with_audio_poll_interval(Duration::from_millis(250));
    let (audio, audio_state) = TestAudio::new();
    let (_controller, mut state) = RoundController::start(session, catalog, audio, options);

    let snapshot = wait_for_phase(&mut state, RoundPhase::AwaitingGuess).await;
    assert_eq!(snapshot.fragment_start_secs, 0.0);

    tokio::time::sleep(Duration::from_secs(22)).await;

    let audio = lock(&audio_state);
    assert!(!audio.playing);
    let position = audio.position_secs();
    assert!(
        (19.9..=20.3).contains(&position),
        "playback should stop at the track's end, stopped at {position}"
    );
}

// ════════════════════════════════════════════════════════════════════
// Teardown and content availability
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn quit_mid_round_leaves_no_pending_timers() {
    let session = GameSession::new("game-1", 1, 30);
    let (audio, audio_state) = TestAudio::new();
    let (mut controller, mut state) =
        RoundController::start(session, bohemian_catalog(), audio, options());

    wait_for_phase(&mut state, RoundPhase::AwaitingGuess).await;
    tokio::time::sleep(Duration::from_millis(1500)).await;

    controller.quit().await;
    let before = state.borrow().clone();
    assert_eq!(before.phase, RoundPhase::AwaitingGuess);

    // Advance the clock far past every timer the round ever owned: with the
    // driver gone, no tick may mutate state or restart playback.
    tokio::time::advance(Duration::from_secs(300)).await;
    // Drain any notification published before the quit; the value itself
    // must not have moved, and the channel must be closed.
    while state.changed().await.is_ok() {}
    let after = state.borrow().clone();
    assert_eq!(after, before);

    let audio = lock(&audio_state);
    assert!(!audio.playing);
    assert!(audio.reset_calls >= 1);
    assert_eq!(audio.position_secs(), 0.0);
}

#[tokio::test(start_paused = true)]
async fn empty_catalog_halts_until_tracks_are_supplied() {
    let session = GameSession::new("game-1", 2, 5);
    let (audio, _state) = TestAudio::new();
    let (controller, mut state) = RoundController::start(session, Vec::new(), audio, options());

    assert_eq!(state.borrow().phase, RoundPhase::ContentUnavailable);
    assert_eq!(state.borrow().track, None);

    // Progression stays halted; no timer drives it anywhere.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(state.borrow().phase, RoundPhase::ContentUnavailable);

    controller.supply_tracks(bohemian_catalog()).unwrap();
    let snapshot = wait_for_phase(&mut state, RoundPhase::Countdown).await;
    // The halt did not consume a round.
    assert_eq!(snapshot.round, 1);
    assert!(snapshot.track.is_some());

    wait_for_phase(&mut state, RoundPhase::AwaitingGuess).await;
}
