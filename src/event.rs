//! Typed game events delivered by the realtime channel.
//!
//! Inbound [`EventEnvelope`]s are normalized into [`GameEvent`]s before they
//! reach subscribers: the `type` string becomes a [`GameEventKind`] and the
//! payload stays as raw JSON until a consumer decodes it into one of the
//! payload structs below.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::api::GamePlayer;
use crate::error::Result;
use crate::protocol::EventEnvelope;

/// Known game event types, parsed from the envelope's `type` field.
///
/// Unknown types are preserved verbatim in [`Other`](GameEventKind::Other) so
/// new backend events do not break dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GameEventKind {
    /// The game session is set up and can be started.
    GameReady,
    /// Another player joined the game.
    PlayerJoined,
    /// The host started the game.
    GameStarted,
    /// The backend failed to set up or run the game.
    GameError,
    /// A new round is starting.
    RoundStart,
    /// The track for the current round.
    CurrentSong,
    /// A player submitted a guess.
    Guess,
    /// The game finished on the backend.
    GameOver,
    /// Any event type this client does not know about.
    Other(String),
}

impl GameEventKind {
    /// The wire name of this event type.
    pub fn as_str(&self) -> &str {
        match self {
            Self::GameReady => "game-ready",
            Self::PlayerJoined => "player-joined",
            Self::GameStarted => "game-started",
            Self::GameError => "game-error",
            Self::RoundStart => "round-start",
            Self::CurrentSong => "current-song",
            Self::Guess => "guess",
            Self::GameOver => "game-over",
            Self::Other(name) => name,
        }
    }
}

impl From<&str> for GameEventKind {
    fn from(name: &str) -> Self {
        match name {
            "game-ready" => Self::GameReady,
            "player-joined" => Self::PlayerJoined,
            "game-started" => Self::GameStarted,
            "game-error" => Self::GameError,
            "round-start" => Self::RoundStart,
            "current-song" => Self::CurrentSong,
            "guess" => Self::Guess,
            "game-over" => Self::GameOver,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for GameEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized inbound game event.
#[derive(Debug, Clone, PartialEq)]
pub struct GameEvent {
    /// Parsed event type.
    pub kind: GameEventKind,
    /// Raw event payload; decode with [`GameEvent::decode`].
    pub payload: serde_json::Value,
    /// RFC 3339 timestamp stamped by the backend.
    pub timestamp: String,
}

impl GameEvent {
    /// Decode the payload into a concrete type.
    ///
    /// # Errors
    ///
    /// Returns a serialization error when the payload does not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

impl From<EventEnvelope> for GameEvent {
    fn from(envelope: EventEnvelope) -> Self {
        Self {
            kind: GameEventKind::from(envelope.event_type.as_str()),
            payload: envelope.payload,
            timestamp: envelope.timestamp,
        }
    }
}

/// Payload of a [`GameStarted`](GameEventKind::GameStarted) event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStartedPayload {
    /// When the backend started the game.
    pub start_time: String,
    /// Roster at start time.
    #[serde(default)]
    pub players: Vec<GamePlayer>,
}

/// Payload of a [`PlayerJoined`](GameEventKind::PlayerJoined) event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerJoinedPayload {
    /// The player that joined.
    pub player: GamePlayer,
}

/// Payload of a [`GameError`](GameEventKind::GameError) event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameErrorPayload {
    /// Human-readable description of the failure.
    #[serde(default)]
    pub message: String,
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

    #[test]
    fn known_kinds_round_trip_through_wire_names() {
        for kind in [
            GameEventKind::GameReady,
            GameEventKind::PlayerJoined,
            GameEventKind::GameStarted,
            GameEventKind::GameError,
            GameEventKind::RoundStart,
            GameEventKind::CurrentSong,
            GameEventKind::Guess,
            GameEventKind::GameOver,
        ] {
            assert_eq!(GameEventKind::from(kind.as_str()), kind);
        }
    }

    #[test]
    fn unknown_kind_is_preserved() {
        let kind = GameEventKind::from("leaderboard-update");
        assert_eq!(kind, GameEventKind::Other("leaderboard-update".into()));
        assert_eq!(kind.as_str(), "leaderboard-update");
    }

    #[test]
    fn envelope_normalizes_into_event() {
        let envelope: EventEnvelope = serde_json::from_str(
            r#"{"type":"game-error","payload":{"message":"boom"},"timestamp":"2024-05-01T10:00:00Z"}"#,
        )
        .unwrap();
        let event = GameEvent::from(envelope);
        assert_eq!(event.kind, GameEventKind::GameError);
        let payload: GameErrorPayload = event.decode().unwrap();
        assert_eq!(payload.message, "boom");
    }

    #[test]
    fn decode_rejects_mismatched_payload() {
        let event = GameEvent {
            kind: GameEventKind::GameStarted,
            payload: serde_json::json!("not an object"),
            timestamp: String::new(),
        };
        assert!(event.decode::<GameStartedPayload>().is_err());
    }
}
