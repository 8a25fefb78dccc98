//! Wire types for the Beat Chaser realtime channel.
//!
//! The backend speaks JSON text messages. Every application-level message is
//! an [`EventEnvelope`] (`{type, payload, timestamp}`); the transport-level
//! frames pair envelopes with the topic or destination they travel on:
//!
//! - [`ClientFrame`] — subscribe/unsubscribe/publish, client → server
//! - [`ServerFrame`] — per-topic delivery, server → client

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Namespace prefix of per-game event topics.
pub const GAME_TOPIC_PREFIX: &str = "/topic/game-";

/// Suffix of per-game event topics.
pub const GAME_TOPIC_SUFFIX: &str = "/events";

/// Prefix of application destinations for outbound publishes.
pub const APP_DESTINATION_PREFIX: &str = "/app/";

/// Derive the event topic for a game from its server-assigned identifier.
///
/// # Example
///
/// ```
/// use beat_chaser_client::protocol::game_topic;
///
/// assert_eq!(game_topic("42ab"), "/topic/game-42ab/events");
/// ```
pub fn game_topic(game_id: &str) -> String {
    format!("{GAME_TOPIC_PREFIX}{game_id}{GAME_TOPIC_SUFFIX}")
}

/// Derive the envelope `type` for an outbound publish from its destination
/// path: the `/app/` prefix is stripped, everything else passes through.
pub fn destination_event_type(destination: &str) -> &str {
    destination
        .strip_prefix(APP_DESTINATION_PREFIX)
        .unwrap_or(destination)
}

/// Application-level message envelope, shared by both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Event type discriminator (e.g. `"game-started"`).
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event payload; shape depends on `event_type`.
    #[serde(default)]
    pub payload: serde_json::Value,
    /// RFC 3339 timestamp stamped by the sender.
    #[serde(default)]
    pub timestamp: String,
}

impl EventEnvelope {
    /// Create an envelope with the given type and payload, stamped with the
    /// current wall-clock time.
    pub fn new(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            timestamp: now_rfc3339(),
        }
    }

    /// Create an outbound envelope for a publish to `destination`, deriving
    /// the event type from the destination path.
    pub fn outbound(destination: &str, payload: serde_json::Value) -> Self {
        Self::new(destination_event_type(destination), payload)
    }
}

/// Current UTC time as an RFC 3339 string.
fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

/// Frame types sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Open a topic subscription. The server starts delivering matching
    /// [`ServerFrame::Message`]s until an `Unsubscribe` for the same topic.
    Subscribe {
        /// Topic to subscribe to.
        topic: String,
    },
    /// Close a topic subscription.
    Unsubscribe {
        /// Topic to unsubscribe from.
        topic: String,
    },
    /// Publish an envelope to an application destination.
    Send {
        /// Destination path (e.g. `"/app/guess"`).
        destination: String,
        /// Envelope to deliver.
        message: EventEnvelope,
    },
}

/// Frame types sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum ServerFrame {
    /// An envelope delivered on a subscribed topic.
    Message {
        /// Topic the envelope was published on.
        topic: String,
        /// The delivered envelope.
        message: EventEnvelope,
    },
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
    fn game_topic_concatenates_namespace_and_id() {
        assert_eq!(
            game_topic("abc-123"),
            "/topic/game-abc-123/events".to_string()
        );
    }

    #[test]
    fn destination_event_type_strips_app_prefix() {
        assert_eq!(destination_event_type("/app/guess"), "guess");
        assert_eq!(destination_event_type("/app/game-1/ready"), "game-1/ready");
        // Paths outside the app namespace pass through untouched.
        assert_eq!(destination_event_type("guess"), "guess");
    }

    #[test]
    fn outbound_envelope_derives_type_and_timestamp() {
        let env = EventEnvelope::outbound("/app/skip", serde_json::json!({"round": 2}));
        assert_eq!(env.event_type, "skip");
        assert_eq!(env.payload["round"], 2);
        assert!(!env.timestamp.is_empty());
    }

    #[test]
    fn server_frame_round_trips() {
        let frame = ServerFrame::Message {
            topic: game_topic("g1"),
            message: EventEnvelope::new("game-ready", serde_json::Value::Null),
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains(r#""frame":"message""#));
        let back: ServerFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn envelope_tolerates_missing_payload_and_timestamp() {
        let env: EventEnvelope = serde_json::from_str(r#"{"type":"game-ready"}"#).unwrap();
        assert_eq!(env.event_type, "game-ready");
        assert!(env.payload.is_null());
        assert!(env.timestamp.is_empty());
    }

    #[test]
    fn client_frame_send_carries_envelope() {
        let frame = ClientFrame::Send {
            destination: "/app/guess".into(),
            message: EventEnvelope::outbound("/app/guess", serde_json::json!({"songGuess": "x"})),
        };
        let json = serde_json::to_string(&frame).unwrap();
        let back: ClientFrame = serde_json::from_str(&json).unwrap();
        if let ClientFrame::Send { message, .. } = back {
            assert_eq!(message.event_type, "guess");
        } else {
            panic!("expected Send frame");
        }
    }
}
