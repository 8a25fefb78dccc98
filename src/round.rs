//! Round and game progression state machine.
//!
//! [`RoundController`] owns the timing, scoring, and audio-window logic for
//! one game. [`RoundController::start`] spawns a background driver task and
//! returns a command handle plus a [`watch::Receiver`] that carries a fresh
//! [`RoundSnapshot`] on every phase transition and timer tick — a UI
//! re-renders from the snapshot and never touches the machine's internals.
//!
//! Each round walks `Countdown → AwaitingGuess → Revealed → Transitioning`,
//! then re-enters `Countdown` for the next round or ends in `Complete`. The
//! guess window closes on the first of: a submitted guess, an explicit skip,
//! or the timer reaching zero; later signals for the same round are no-ops.
//! The audio fragment is force-paused the moment the playback position
//! reaches the end of its window, independent of the guess timer.
//!
//! # Example
//!
//! ```rust,ignore
//! let session = GameSession::new(game.id, 3, 30);
//! let (controller, mut state) =
//!     RoundController::start(session, songs, SilentAudio::new(), RoundOptions::default());
//!
//! while state.changed().await.is_ok() {
//!     let snapshot = state.borrow().clone();
//!     render(&snapshot);
//! }
//! ```

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use rand::Rng;

use crate::api::Song;
use crate::audio::AudioSink;
use crate::error::{BeatChaserError, Result};
use crate::scoring::{score_guess, Guess, ScoreTier, SKIP_PENALTY};
use crate::session::GameSession;

/// Default number of lead-in ticks before the guess window opens.
const DEFAULT_COUNTDOWN_TICKS: u32 = 3;

/// Default length of the playable fragment, in seconds.
const DEFAULT_FRAGMENT_DURATION_SECS: f32 = 30.0;

/// Default cadence of the audio position checks.
const DEFAULT_AUDIO_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Default timeout for the graceful quit.
const DEFAULT_QUIT_TIMEOUT: Duration = Duration::from_secs(1);

// ── Options ─────────────────────────────────────────────────────────

/// Tuning knobs for a [`RoundController`].
///
/// # Example
///
/// ```
/// use beat_chaser_client::round::RoundOptions;
///
/// let options = RoundOptions::default()
///     .with_countdown_ticks(5)
///     .with_fragment_duration_secs(15.0);
/// assert_eq!(options.countdown_ticks, 5);
/// ```
#[derive(Debug, Clone)]
pub struct RoundOptions {
    /// Lead-in ticks (one per second) before each round's guess window.
    ///
    /// Defaults to **3**.
    pub countdown_ticks: u32,
    /// Length of the audio fragment played per round, in seconds. Fragments
    /// are clamped to fit inside the selected track.
    ///
    /// Defaults to **30 seconds**.
    pub fragment_duration_secs: f32,
    /// Cadence of the playback position checks that enforce the fragment
    /// window.
    ///
    /// Defaults to **250 ms**.
    pub audio_poll_interval: Duration,
    /// Points deducted from the running total for skipping a round, clamped
    /// so the total never goes negative.
    ///
    /// Defaults to **10**.
    pub skip_penalty: u32,
    /// Timeout for the graceful quit before the driver task is aborted.
    ///
    /// Defaults to **1 second**.
    pub quit_timeout: Duration,
}

impl Default for RoundOptions {
    fn default() -> Self {
        Self {
            countdown_ticks: DEFAULT_COUNTDOWN_TICKS,
            fragment_duration_secs: DEFAULT_FRAGMENT_DURATION_SECS,
            audio_poll_interval: DEFAULT_AUDIO_POLL_INTERVAL,
            skip_penalty: SKIP_PENALTY,
            quit_timeout: DEFAULT_QUIT_TIMEOUT,
        }
    }
}

impl RoundOptions {
    /// Set the number of lead-in ticks.
    #[must_use]
    pub fn with_countdown_ticks(mut self, ticks: u32) -> Self {
        self.countdown_ticks = ticks;
        self
    }

    /// Set the fragment length in seconds.
    #[must_use]
    pub fn with_fragment_duration_secs(mut self, secs: f32) -> Self {
        self.fragment_duration_secs = secs;
        self
    }

    /// Set the cadence of the audio position checks.
    #[must_use]
    pub fn with_audio_poll_interval(mut self, interval: Duration) -> Self {
        self.audio_poll_interval = interval;
        self
    }

    /// Set the skip penalty.
    #[must_use]
    pub fn with_skip_penalty(mut self, penalty: u32) -> Self {
        self.skip_penalty = penalty;
        self
    }

    /// Set the graceful quit timeout.
    #[must_use]
    pub fn with_quit_timeout(mut self, timeout: Duration) -> Self {
        self.quit_timeout = timeout;
        self
    }
}

// ── State ───────────────────────────────────────────────────────────

/// One discrete state of the per-round machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    /// Lead-in before the round's content is revealed.
    Countdown,
    /// The guess window is open and the fragment is playing.
    AwaitingGuess,
    /// The answer and score delta are shown; waiting for an advance.
    Revealed,
    /// Selecting the next track.
    Transitioning,
    /// Every round has been played.
    Complete,
    /// The song catalog is empty; progression is halted until tracks are
    /// supplied.
    ContentUnavailable,
}

/// What ended a round and what it was worth.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundOutcome {
    /// Which round this outcome belongs to.
    pub round: u32,
    /// Score bucket the round fell into.
    pub tier: ScoreTier,
    /// Change applied to the running total (negative for a skip penalty).
    pub delta: i32,
    /// The track that was playing.
    pub track: Song,
    /// The submitted guess, if the round ended with one.
    pub guess: Option<Guess>,
}

/// Renderable snapshot of the machine, published on every change.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundSnapshot {
    /// Current phase.
    pub phase: RoundPhase,
    /// Current round, 1-based.
    pub round: u32,
    /// Total rounds in the session.
    pub total_rounds: u32,
    /// Remaining lead-in ticks (meaningful during `Countdown`).
    pub countdown: u32,
    /// Remaining guess window, in seconds (meaningful during `AwaitingGuess`).
    pub time_remaining_secs: u32,
    /// Running score.
    pub score: u32,
    /// Track selected for the current round.
    pub track: Option<Song>,
    /// Where the current fragment starts, seconds into the track.
    pub fragment_start_secs: f32,
    /// Outcome of the most recently completed round.
    pub last_outcome: Option<RoundOutcome>,
}

// ── Commands ────────────────────────────────────────────────────────

#[derive(Debug)]
enum RoundCommand {
    SubmitGuess(Guess),
    Skip,
    Advance,
    SupplyTracks(Vec<Song>),
    Quit,
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Finished,
}

#[derive(Debug)]
enum RoundEnd {
    Guessed(Guess),
    Skipped,
    TimedOut,
}

// ── Controller handle ───────────────────────────────────────────────

/// Command handle for the round driver task.
///
/// All methods queue a command and return immediately; the driver applies
/// them in order between timer ticks. Dropping the handle aborts the driver.
#[derive(Debug)]
pub struct RoundController {
    cmd_tx: mpsc::UnboundedSender<RoundCommand>,
    task: Option<tokio::task::JoinHandle<()>>,
    quit_timeout: Duration,
}

impl RoundController {
    /// Bind a controller to `session`, spawn its driver task, and return the
    /// handle together with the state receiver.
    ///
    /// `tracks` is the catalog to draw rounds from; when it is empty the
    /// machine starts in [`RoundPhase::ContentUnavailable`] and waits for
    /// [`supply_tracks`](Self::supply_tracks).
    #[must_use = "the state receiver must be used to observe the game"]
    pub fn start(
        session: GameSession,
        tracks: Vec<Song>,
        audio: impl AudioSink,
        options: RoundOptions,
    ) -> (Self, watch::Receiver<RoundSnapshot>) {
        let quit_timeout = options.quit_timeout;
        let snapshot = RoundSnapshot {
            phase: RoundPhase::Countdown,
            round: 1,
            total_rounds: session.total_rounds,
            countdown: options.countdown_ticks,
            time_remaining_secs: session.round_duration_secs,
            score: 0,
            track: None,
            fragment_start_secs: 0.0,
            last_outcome: None,
        };
        let (publish_tx, state_rx) = watch::channel(snapshot.clone());

        let mut driver = Driver {
            session,
            options,
            tracks,
            audio,
            snapshot,
            publish_tx,
            fragment_end_secs: 0.0,
            fragment_active: false,
            started: false,
        };
        driver.begin_round();
        driver.publish();

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(driver.run(cmd_rx));

        (
            Self {
                cmd_tx,
                task: Some(task),
                quit_timeout,
            },
            state_rx,
        )
    }

    /// Submit the player's guess for the current round.
    ///
    /// Ignored by the driver outside the guess window, so racing a timeout
    /// is harmless.
    ///
    /// # Errors
    ///
    /// Returns [`BeatChaserError::ControllerClosed`] if the driver has stopped.
    pub fn submit_guess(&self, guess: Guess) -> Result<()> {
        self.command(RoundCommand::SubmitGuess(guess))
    }

    /// Skip the current round without a guess.
    ///
    /// # Errors
    ///
    /// Returns [`BeatChaserError::ControllerClosed`] if the driver has stopped.
    pub fn skip_round(&self) -> Result<()> {
        self.command(RoundCommand::Skip)
    }

    /// Leave the reveal screen: move on to the next round, or finish the game
    /// after the last one.
    ///
    /// # Errors
    ///
    /// Returns [`BeatChaserError::ControllerClosed`] if the driver has stopped.
    pub fn advance(&self) -> Result<()> {
        self.command(RoundCommand::Advance)
    }

    /// Replace the track catalog; resumes progression when the machine is
    /// halted in [`RoundPhase::ContentUnavailable`].
    ///
    /// # Errors
    ///
    /// Returns [`BeatChaserError::ControllerClosed`] if the driver has stopped.
    pub fn supply_tracks(&self, tracks: Vec<Song>) -> Result<()> {
        self.command(RoundCommand::SupplyTracks(tracks))
    }

    /// Quit the game, stopping every timer and resetting playback.
    ///
    /// The driver is given the configured quit timeout to exit gracefully
    /// before being aborted.
    pub async fn quit(&mut self) {
        debug!("round controller quit requested");
        let _ = self.cmd_tx.send(RoundCommand::Quit);

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.quit_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("round driver terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("round driver did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("round driver aborted: {join_err}");
                    }
                }
            }
        }
    }

    fn command(&self, cmd: RoundCommand) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| BeatChaserError::ControllerClosed)
    }
}

impl Drop for RoundController {
    fn drop(&mut self) {
        // No executor context is guaranteed inside Drop; aborting the task
        // drops the driver future and with it every timer it owns.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Driver ──────────────────────────────────────────────────────────

struct Driver<A: AudioSink> {
    session: GameSession,
    options: RoundOptions,
    tracks: Vec<Song>,
    audio: A,
    snapshot: RoundSnapshot,
    publish_tx: watch::Sender<RoundSnapshot>,
    /// Position at which the current fragment must stop, clamped to the
    /// track's end.
    fragment_end_secs: f32,
    fragment_active: bool,
    /// Whether the first round has been prepared; later preparations
    /// increment the round index.
    started: bool,
}

impl<A: AudioSink> Driver<A> {
    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<RoundCommand>) {
        debug!(
            game_id = %self.session.game_id,
            total_rounds = self.session.total_rounds,
            "round driver started"
        );

        let tick = Duration::from_secs(1);
        let mut second = tokio::time::interval_at(tokio::time::Instant::now() + tick, tick);
        second.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut audio_poll = tokio::time::interval_at(
            tokio::time::Instant::now() + self.options.audio_poll_interval,
            self.options.audio_poll_interval,
        );
        audio_poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let timer_live = matches!(
                self.snapshot.phase,
                RoundPhase::Countdown | RoundPhase::AwaitingGuess
            );
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    None | Some(RoundCommand::Quit) => break,
                    Some(cmd) => {
                        if self.apply(cmd, &mut second) == Flow::Finished {
                            break;
                        }
                    }
                },
                _ = second.tick(), if timer_live => self.on_second(),
                // Position checks don't touch the snapshot, so no publish.
                _ = audio_poll.tick(), if self.fragment_active => self.enforce_fragment_window(),
            }
        }

        // The intervals die with this task; stop playback so nothing
        // outlives the game.
        self.audio.reset();
        debug!("round driver exited");
    }

    fn apply(&mut self, cmd: RoundCommand, second: &mut tokio::time::Interval) -> Flow {
        let mut flow = Flow::Continue;
        match cmd {
            RoundCommand::SubmitGuess(guess) => self.finish_round(RoundEnd::Guessed(guess)),
            RoundCommand::Skip => self.finish_round(RoundEnd::Skipped),
            RoundCommand::Advance => flow = self.advance(second),
            RoundCommand::SupplyTracks(tracks) => {
                if tracks.is_empty() {
                    warn!("ignoring empty track catalog");
                } else {
                    self.tracks = tracks;
                }
                if self.snapshot.phase == RoundPhase::ContentUnavailable {
                    self.begin_round();
                    if self.snapshot.phase == RoundPhase::Countdown {
                        second.reset();
                    }
                }
            }
            RoundCommand::Quit => {}
        }
        self.publish();
        flow
    }

    fn on_second(&mut self) {
        match self.snapshot.phase {
            RoundPhase::Countdown => {
                self.snapshot.countdown = self.snapshot.countdown.saturating_sub(1);
                if self.snapshot.countdown == 0 {
                    self.open_guess_window();
                }
            }
            RoundPhase::AwaitingGuess => {
                self.snapshot.time_remaining_secs =
                    self.snapshot.time_remaining_secs.saturating_sub(1);
                if self.snapshot.time_remaining_secs == 0 {
                    self.finish_round(RoundEnd::TimedOut);
                }
            }
            _ => {}
        }
        self.publish();
    }

    /// Prepare the next round: pick a track, place the fragment window, reset
    /// the timers, and enter `Countdown`. Halts in `ContentUnavailable`
    /// (without consuming a round index) when the catalog is empty.
    fn begin_round(&mut self) {
        self.audio.reset();
        self.fragment_active = false;

        let Some(track) = pick_track(&self.tracks, &mut rand::rng()) else {
            warn!("song catalog is empty; halting round progression");
            self.snapshot.phase = RoundPhase::ContentUnavailable;
            return;
        };
        if self.started {
            self.snapshot.round += 1;
        } else {
            self.started = true;
        }

        let start = fragment_start_secs(
            track.duration_seconds,
            self.options.fragment_duration_secs,
            &mut rand::rng(),
        );
        debug!(
            round = self.snapshot.round,
            title = %track.title,
            fragment_start = start,
            "round prepared"
        );
        self.snapshot.fragment_start_secs = start;
        self.snapshot.track = Some(track);
        self.snapshot.time_remaining_secs = self.session.round_duration_secs;
        self.snapshot.countdown = self.options.countdown_ticks;
        self.snapshot.phase = RoundPhase::Countdown;
        if self.snapshot.countdown == 0 {
            self.open_guess_window();
        }
    }

    /// Enter `AwaitingGuess` and start the fragment.
    fn open_guess_window(&mut self) {
        self.snapshot.phase = RoundPhase::AwaitingGuess;
        let Some(track) = self.snapshot.track.clone() else {
            return;
        };
        let start = self.snapshot.fragment_start_secs;
        self.fragment_end_secs =
            (start + self.options.fragment_duration_secs).min(track.duration_seconds);
        match self.audio.play(&track, start) {
            Ok(()) => self.fragment_active = true,
            Err(e) => {
                // The round still runs; the player just hears nothing.
                warn!("audio playback failed: {e}");
                self.fragment_active = false;
            }
        }
    }

    /// Pause playback once the fragment window has elapsed, regardless of the
    /// guess timer.
    fn enforce_fragment_window(&mut self) {
        if self.audio.position_secs() >= self.fragment_end_secs {
            debug!("fragment window elapsed, pausing playback");
            self.audio.pause();
            self.fragment_active = false;
        }
    }

    /// Close the guess window and move to `Revealed`. The first signal wins:
    /// a racing timeout, duplicate submit, or late skip is a no-op.
    fn finish_round(&mut self, end: RoundEnd) {
        if self.snapshot.phase != RoundPhase::AwaitingGuess {
            debug!("round end signal ignored outside the guess window");
            return;
        }
        if self.fragment_active {
            self.audio.pause();
            self.fragment_active = false;
        }
        let Some(track) = self.snapshot.track.clone() else {
            return;
        };

        let (tier, delta, guess) = match end {
            RoundEnd::Guessed(guess) => {
                let (tier, points) = score_guess(&guess, &track);
                (tier, points as i32, Some(guess))
            }
            RoundEnd::TimedOut => (ScoreTier::Miss, 0, None),
            RoundEnd::Skipped => {
                let penalty = self.options.skip_penalty.min(self.snapshot.score);
                (ScoreTier::Skipped, -(penalty as i32), None)
            }
        };
        self.snapshot.score = self.snapshot.score.saturating_add_signed(delta);
        debug!(
            round = self.snapshot.round,
            ?tier,
            delta,
            total = self.snapshot.score,
            "round finished"
        );
        self.snapshot.last_outcome = Some(RoundOutcome {
            round: self.snapshot.round,
            tier,
            delta,
            track,
            guess,
        });
        self.snapshot.phase = RoundPhase::Revealed;
    }

    /// Leave `Revealed`: either prepare the next round or complete the game.
    fn advance(&mut self, second: &mut tokio::time::Interval) -> Flow {
        if self.snapshot.phase != RoundPhase::Revealed {
            debug!("advance ignored outside the reveal phase");
            return Flow::Continue;
        }
        self.snapshot.phase = RoundPhase::Transitioning;
        self.publish();

        if self.snapshot.round >= self.session.total_rounds {
            debug!(score = self.snapshot.score, "game complete");
            self.snapshot.phase = RoundPhase::Complete;
            return Flow::Finished;
        }

        self.begin_round();
        if self.snapshot.phase == RoundPhase::Countdown {
            second.reset();
        }
        Flow::Continue
    }

    fn publish(&self) {
        self.publish_tx.send_replace(self.snapshot.clone());
    }
}

// ── Selection helpers ───────────────────────────────────────────────

/// Uniform-random track choice; repeats across rounds are permitted.
fn pick_track<R: Rng>(tracks: &[Song], rng: &mut R) -> Option<Song> {
    if tracks.is_empty() {
        return None;
    }
    tracks.get(rng.random_range(0..tracks.len())).cloned()
}

/// Uniform-random fragment start in `[0, track − fragment]`, clamped to 0
/// when the track is shorter than the fragment.
fn fragment_start_secs<R: Rng>(track_secs: f32, fragment_secs: f32, rng: &mut R) -> f32 {
    let max_start = track_secs - fragment_secs;
    if max_start <= 0.0 {
        return 0.0;
    }
    rng.random_range(0.0..=max_start)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    fn song(id: &str, secs: f32) -> Song {
        Song {
            id: id.into(),
            title: format!("title-{id}"),
            artist: format!("artist-{id}"),
            album: String::new(),
            duration_seconds: secs,
            audio_preview_url: format!("{id}.mp3"),
        }
    }

    #[test]
    fn pick_track_returns_none_for_empty_catalog() {
        assert_eq!(pick_track(&[], &mut rand::rng()), None);
    }

    #[test]
    fn pick_track_draws_from_the_catalog() {
        let catalog = vec![song("a", 100.0), song("b", 200.0)];
        for _ in 0..50 {
            let track = pick_track(&catalog, &mut rand::rng()).unwrap();
            assert!(catalog.contains(&track));
        }
    }

    #[test]
    fn fragment_start_stays_inside_the_track() {
        for _ in 0..100 {
            let start = fragment_start_secs(180.0, 30.0, &mut rand::rng());
            assert!((0.0..=150.0).contains(&start), "start was {start}");
        }
    }

    #[test]
    fn fragment_start_clamps_for_short_tracks() {
        // A 20 s track with a 30 s fragment always starts at 0.
        for _ in 0..10 {
            assert_eq!(fragment_start_secs(20.0, 30.0, &mut rand::rng()), 0.0);
        }
        // Exact fit also pins the start.
        assert_eq!(fragment_start_secs(30.0, 30.0, &mut rand::rng()), 0.0);
    }
}
