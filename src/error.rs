//! Error types for the Beat Chaser client.

use thiserror::Error;

/// Errors that can occur when using the Beat Chaser client.
#[derive(Debug, Error)]
pub enum BeatChaserError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Attempted an operation that requires an active connection, but the client is not connected.
    #[error("not connected to server")]
    NotConnected,

    /// A live subscription already exists for the topic.
    #[error("already subscribed to topic {0}")]
    AlreadySubscribed(String),

    /// The bearer credential was missing, expired, or rejected.
    ///
    /// Never retried automatically — the caller must re-authenticate.
    #[error("not authorized: session expired or credentials rejected")]
    Unauthorized,

    /// The backend answered a REST call with a non-success status.
    #[error("api error (status {status}): {message}")]
    Api {
        /// HTTP status code returned by the backend.
        status: u16,
        /// Response body or a short description of the failure.
        message: String,
    },

    /// A REST call failed at the network level.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The song catalog has no tracks to play.
    #[error("no playable content available")]
    NoContent,

    /// The backend reported a game lifecycle failure (e.g. a `game-error` event).
    #[error("game lifecycle error: {0}")]
    GameLifecycle(String),

    /// The round controller's driver task is no longer running.
    #[error("round controller stopped")]
    ControllerClosed,

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for Beat Chaser client operations.
pub type Result<T> = std::result::Result<T, BeatChaserError>;
