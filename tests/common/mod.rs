#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for Beat Chaser client integration tests.
//!
//! Provides a scripted [`MockConnector`]/[`MockTransport`] pair for the
//! realtime client, an inspectable [`TestAudio`] sink for the round
//! controller, and helpers for building wire frames and awaiting phases.

use std::collections::VecDeque;
use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::watch;

use beat_chaser_client::api::Song;
use beat_chaser_client::audio::AudioSink;
use beat_chaser_client::protocol::{EventEnvelope, ServerFrame};
use beat_chaser_client::round::{RoundPhase, RoundSnapshot};
use beat_chaser_client::{BeatChaserError, Connector, Transport};

pub fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

// ── MockTransport / MockConnector ───────────────────────────────────

/// A channel-style mock transport: scripted inbound items are consumed in
/// order by `recv()`; all outbound frames are recorded in a shared log.
pub struct MockTransport {
    incoming: VecDeque<Option<Result<String, BeatChaserError>>>,
    sent: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), BeatChaserError> {
        lock(&self.sent).push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, BeatChaserError>> {
        if let Some(item) = self.incoming.pop_front() {
            item
        } else {
            // Scripted input exhausted — hang so the link stays up until the
            // client shuts it down.
            std::future::pending().await
        }
    }

    async fn close(&mut self) -> Result<(), BeatChaserError> {
        Ok(())
    }
}

/// One planned outcome for a [`MockConnector`] dial.
pub enum Dial {
    /// The handshake fails.
    Fail,
    /// The handshake yields a transport that replays these inbound items.
    Script(Vec<Option<Result<String, BeatChaserError>>>),
}

/// Connector that consumes one [`Dial`] plan per handshake; dials beyond the
/// plan fail. Outbound frames from every produced transport land in `sent`.
pub struct MockConnector {
    plan: Mutex<VecDeque<Dial>>,
    pub sent: Arc<Mutex<Vec<String>>>,
    pub dial_count: Arc<AtomicUsize>,
}

impl MockConnector {
    pub fn new(plan: Vec<Dial>) -> (Self, Arc<Mutex<Vec<String>>>, Arc<AtomicUsize>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let dial_count = Arc::new(AtomicUsize::new(0));
        (
            Self {
                plan: Mutex::new(plan.into()),
                sent: Arc::clone(&sent),
                dial_count: Arc::clone(&dial_count),
            },
            sent,
            dial_count,
        )
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>, BeatChaserError> {
        self.dial_count
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        match lock(&self.plan).pop_front() {
            Some(Dial::Script(incoming)) => Ok(Box::new(MockTransport {
                incoming: incoming.into(),
                sent: Arc::clone(&self.sent),
            })),
            Some(Dial::Fail) | None => {
                Err(BeatChaserError::TransportReceive("handshake refused".into()))
            }
        }
    }
}

// ── Wire frame builders ─────────────────────────────────────────────

/// Serialized delivery frame for `topic` carrying an envelope of `event_type`.
pub fn message_json(topic: &str, event_type: &str, payload: serde_json::Value) -> String {
    serde_json::to_string(&ServerFrame::Message {
        topic: topic.to_string(),
        message: EventEnvelope::new(event_type, payload),
    })
    .unwrap()
}

// ── TestAudio ───────────────────────────────────────────────────────

/// Observable state of a [`TestAudio`] sink.
#[derive(Debug, Default)]
pub struct TestAudioState {
    pub playing: bool,
    /// Frozen position while paused or stopped.
    position: f32,
    started_at: Option<tokio::time::Instant>,
    pub play_calls: Vec<(String, f32)>,
    pub pause_calls: usize,
    pub reset_calls: usize,
}

impl TestAudioState {
    /// Current playback position, advancing with the (possibly paused) tokio
    /// clock while playing.
    pub fn position_secs(&self) -> f32 {
        match (self.playing, self.started_at) {
            (true, Some(started_at)) => self.position + started_at.elapsed().as_secs_f32(),
            _ => self.position,
        }
    }
}

/// An [`AudioSink`] whose state stays inspectable after it moves into the
/// round controller.
pub struct TestAudio(pub Arc<Mutex<TestAudioState>>);

impl TestAudio {
    pub fn new() -> (Self, Arc<Mutex<TestAudioState>>) {
        let state = Arc::new(Mutex::new(TestAudioState::default()));
        (Self(Arc::clone(&state)), state)
    }
}

impl AudioSink for TestAudio {
    fn play(&mut self, track: &Song, start_secs: f32) -> Result<(), BeatChaserError> {
        let mut state = lock(&self.0);
        state.play_calls.push((track.id.clone(), start_secs));
        state.position = start_secs;
        state.started_at = Some(tokio::time::Instant::now());
        state.playing = true;
        Ok(())
    }

    fn position_secs(&self) -> f32 {
        lock(&self.0).position_secs()
    }

    fn pause(&mut self) {
        let mut state = lock(&self.0);
        if state.playing {
            state.position = state.position_secs();
            state.playing = false;
        }
        state.pause_calls += 1;
    }

    fn reset(&mut self) {
        let mut state = lock(&self.0);
        state.playing = false;
        state.position = 0.0;
        state.started_at = None;
        state.reset_calls += 1;
    }
}

// ── Catalog and phase helpers ───────────────────────────────────────

/// A song with the given identity and length.
pub fn song(id: &str, title: &str, artist: &str, duration_seconds: f32) -> Song {
    Song {
        id: id.into(),
        title: title.into(),
        artist: artist.into(),
        album: String::new(),
        duration_seconds,
        audio_preview_url: format!("{id}.mp3"),
    }
}

/// A one-track catalog so the actual track of every round is deterministic.
pub fn single_track_catalog(title: &str, artist: &str, duration_seconds: f32) -> Vec<Song> {
    vec![song("only", title, artist, duration_seconds)]
}

/// Follow the state channel until the machine reaches `phase`.
///
/// Panics if the channel closes first (driver exited in a different phase).
pub async fn wait_for_phase(
    state: &mut watch::Receiver<RoundSnapshot>,
    phase: RoundPhase,
) -> RoundSnapshot {
    loop {
        {
            let snapshot = state.borrow();
            if snapshot.phase == phase {
                return snapshot.clone();
            }
        }
        if state.changed().await.is_err() {
            let snapshot = state.borrow().clone();
            assert_eq!(
                snapshot.phase, phase,
                "state channel closed before reaching {phase:?}"
            );
            return snapshot;
        }
    }
}
