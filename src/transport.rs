//! Transport abstraction for the Beat Chaser realtime channel.
//!
//! The [`Transport`] trait defines a bidirectional text message channel
//! between the client and the backend. The realtime protocol uses JSON text
//! frames, so every transport implementation must handle message framing
//! internally (e.g. WebSocket frames, length-prefixed TCP).
//!
//! Because the realtime client re-establishes its link after transient
//! failures, connection setup lives in a separate [`Connector`] trait: a
//! factory the client can invoke again for every reconnect attempt. Transports
//! themselves are always constructed already connected.

use async_trait::async_trait;

use crate::error::BeatChaserError;

/// A bidirectional text message transport for the realtime channel.
///
/// Implementors shuttle serialized JSON strings between the client and the
/// backend. Each call to [`send`](Transport::send) transmits one complete
/// frame; each call to [`recv`](Transport::recv) returns one complete frame.
///
/// # Object Safety
///
/// This trait is object-safe; the realtime client stores transports as
/// `Box<dyn Transport>` so one client can outlive many links.
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method **MUST** be cancel-safe because it is
/// used inside `tokio::select!`. If `recv` is cancelled before completion,
/// calling it again must not lose data. Channel-based implementations are
/// naturally cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text frame to the backend.
    ///
    /// # Errors
    ///
    /// Returns [`BeatChaserError::TransportSend`] if the frame could not be
    /// sent (e.g. connection broken, write buffer full).
    async fn send(&mut self, message: String) -> Result<(), BeatChaserError>;

    /// Receive the next JSON text frame from the backend.
    ///
    /// Returns:
    /// - `Some(Ok(text))` — a complete frame was received
    /// - `Some(Err(e))` — a transport error occurred
    /// - `None` — the connection was closed cleanly by the backend
    ///
    /// # Cancel Safety
    ///
    /// This method **MUST** be cancel-safe (see [trait documentation](Transport)).
    async fn recv(&mut self) -> Option<Result<String, BeatChaserError>>;

    /// Close the transport connection gracefully.
    ///
    /// After calling this method, subsequent calls to [`send`](Transport::send)
    /// and [`recv`](Transport::recv) may return errors or `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the graceful shutdown fails. Implementations should
    /// still release resources even if the close handshake fails.
    async fn close(&mut self) -> Result<(), BeatChaserError>;
}

/// Factory that establishes connected [`Transport`]s.
///
/// The realtime client holds one connector for its whole lifetime and calls
/// [`connect`](Connector::connect) for the initial handshake and for every
/// automatic reconnect attempt. Implementations carry whatever connection
/// parameters their transport needs (URL, host/port, TLS configuration).
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Establish a new connected transport.
    ///
    /// # Errors
    ///
    /// Returns a transport-level error when the handshake fails; the realtime
    /// client turns this into an error-observer notification and a scheduled
    /// retry, never a panic or an unhandled propagation.
    async fn connect(&self) -> Result<Box<dyn Transport>, BeatChaserError>;
}
