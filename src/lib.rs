//! # Beat Chaser Client
//!
//! Transport-agnostic Rust client core for the Beat Chaser music-guessing
//! game.
//!
//! This crate provides the two components every Beat Chaser front end is
//! built around, plus the glue to the backend's REST endpoints:
//!
//! - [`RealtimeClient`] — one logical connection to the backend's realtime
//!   channel: topic pub/sub, connection observers, and automatic linear-backoff
//!   reconnection. JSON text messages travel over any bidirectional transport.
//! - [`RoundController`] — the per-round state machine: countdown, the timed
//!   guess window, audio-fragment playback bounds, tiered scoring, and round
//!   advancement, published as renderable snapshots.
//!
//! ## Features
//!
//! - **Transport-agnostic** — implement the [`Transport`] and [`Connector`]
//!   traits for any backend
//! - **WebSocket built-in** — the default `transport-websocket` feature
//!   provides [`WebSocketTransport`](transports::WebSocketTransport)
//! - **Event-driven** — inbound messages become typed [`GameEvent`]s; round
//!   state arrives as [`RoundSnapshot`](round::RoundSnapshot)s on a watch
//!   channel
//! - **Headless-friendly** — the audio seam ([`AudioSink`]) and tokio's
//!   paused clock make the whole game loop testable without a UI
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use beat_chaser_client::{
//!     GameApi, RealtimeClient, RealtimeConfig, RoundController, RoundOptions, SilentAudio,
//! };
//! use beat_chaser_client::transports::WebSocketConnector;
//!
//! let api = GameApi::new("http://localhost:8080");
//! api.login("alice", "hunter2").await?;
//!
//! let realtime = RealtimeClient::new(
//!     WebSocketConnector::new("ws://localhost:8080/ws"),
//!     RealtimeConfig::default(),
//! );
//! realtime.connect().await;
//!
//! let config = beat_chaser_client::config::GameConfig::default();
//! let session = beat_chaser_client::session::start_singleplayer(&api, "alice", &config).await?;
//! let songs = api.all_songs().await?;
//!
//! let (controller, mut state) =
//!     RoundController::start(session, songs, SilentAudio::new(), RoundOptions::default());
//! ```

pub mod api;
pub mod audio;
pub mod config;
pub mod error;
pub mod event;
pub mod protocol;
pub mod realtime;
pub mod round;
pub mod scoring;
pub mod session;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use api::{GameApi, Song};
pub use audio::{AudioSink, SilentAudio};
pub use config::{ConfigStore, GameConfig};
pub use error::BeatChaserError;
pub use event::{GameEvent, GameEventKind};
pub use realtime::{ConnectionState, ConnectionStatus, RealtimeClient, RealtimeConfig};
pub use round::{RoundController, RoundOptions};
pub use scoring::Guess;
pub use session::GameSession;
pub use transport::{Connector, Transport};
