//! Audio playback seam.
//!
//! The round controller never talks to a real audio backend; it drives an
//! [`AudioSink`] — start a fragment, poll the playback position, pause, reset.
//! Applications wrap their platform's player in this trait; [`SilentAudio`]
//! is a clock-only implementation for headless use and tests.

use crate::api::Song;
use crate::error::Result;

/// The single logical "now playing" resource owned by a round controller.
///
/// Implementations do not need to enforce the fragment window themselves —
/// the controller polls [`position_secs`](AudioSink::position_secs) and calls
/// [`pause`](AudioSink::pause) when the window elapses.
pub trait AudioSink: Send + 'static {
    /// Start playing `track` from `start_secs` into the track.
    ///
    /// Any previous playback is replaced.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend cannot start playback; the round
    /// controller logs the failure and continues the round without audio.
    fn play(&mut self, track: &Song, start_secs: f32) -> Result<()>;

    /// Current playback position within the track, in seconds.
    ///
    /// While paused, reports the position playback stopped at.
    fn position_secs(&self) -> f32;

    /// Pause playback, keeping the current position.
    fn pause(&mut self);

    /// Stop playback and drop the current item.
    fn reset(&mut self);
}

/// An [`AudioSink`] that produces no sound and just keeps time.
///
/// Positions advance with the tokio clock, so paused-clock tests drive it
/// deterministically.
#[derive(Debug, Default)]
pub struct SilentAudio {
    playing: bool,
    /// Frozen position while paused or stopped.
    position: f32,
    started_at: Option<tokio::time::Instant>,
}

impl SilentAudio {
    /// Create a stopped sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the sink is currently playing.
    pub fn is_playing(&self) -> bool {
        self.playing
    }
}

impl AudioSink for SilentAudio {
    fn play(&mut self, track: &Song, start_secs: f32) -> Result<()> {
        tracing::debug!(title = %track.title, start_secs, "starting silent playback");
        self.position = start_secs;
        self.started_at = Some(tokio::time::Instant::now());
        self.playing = true;
        Ok(())
    }

    fn position_secs(&self) -> f32 {
        match (self.playing, self.started_at) {
            (true, Some(started_at)) => self.position + started_at.elapsed().as_secs_f32(),
            _ => self.position,
        }
    }

    fn pause(&mut self) {
        if self.playing {
            self.position = self.position_secs();
            self.playing = false;
        }
    }

    fn reset(&mut self) {
        self.playing = false;
        self.position = 0.0;
        self.started_at = None;
    }
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
    use std::time::Duration;

    fn track() -> Song {
        Song {
            id: "1".into(),
            title: "t".into(),
            artist: "a".into(),
            album: String::new(),
            duration_seconds: 120.0,
            audio_preview_url: "t.mp3".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn position_tracks_the_clock_while_playing() {
        let mut audio = SilentAudio::new();
        audio.play(&track(), 12.0).unwrap();

        tokio::time::advance(Duration::from_secs(5)).await;
        let pos = audio.position_secs();
        assert!((pos - 17.0).abs() < 0.01, "position was {pos}");
    }

    #[tokio::test(start_paused = true)]
    async fn pause_freezes_the_position() {
        let mut audio = SilentAudio::new();
        audio.play(&track(), 0.0).unwrap();

        tokio::time::advance(Duration::from_secs(3)).await;
        audio.pause();
        assert!(!audio.is_playing());

        tokio::time::advance(Duration::from_secs(60)).await;
        let pos = audio.position_secs();
        assert!((pos - 3.0).abs() < 0.01, "position was {pos}");
    }

    #[tokio::test(start_paused = true)]
    async fn reset_clears_playback() {
        let mut audio = SilentAudio::new();
        audio.play(&track(), 30.0).unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        audio.reset();
        assert!(!audio.is_playing());
        assert_eq!(audio.position_secs(), 0.0);
    }
}
