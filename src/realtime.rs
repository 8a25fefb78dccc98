//! Reconnecting realtime client for the Beat Chaser event channel.
//!
//! [`RealtimeClient`] owns one logical connection to the backend's realtime
//! endpoint. A background link loop multiplexes outbound frames and inbound
//! deliveries over `tokio::select!`; the client handle stays cheap to clone
//! and share. Transient link failures are recovered automatically with linear
//! backoff; callers observe connection changes through observer registries
//! instead of exception propagation.
//!
//! Applications construct exactly one client at startup, pass it by reference
//! to whatever needs the event channel, and call
//! [`disconnect`](RealtimeClient::disconnect) at shutdown.
//!
//! # Example
//!
//! ```rust,ignore
//! let connector = WebSocketConnector::new("ws://localhost:8080/ws");
//! let client = RealtimeClient::new(connector, RealtimeConfig::default());
//!
//! client.connect().await;
//! let sub = client.subscribe_to_game(&game.id, move |event| {
//!     // react to game-ready / player-joined / game-started / game-error
//! })?;
//! // …
//! sub.dispose();
//! client.disconnect();
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::error::{BeatChaserError, Result};
use crate::event::{GameEvent, GameEventKind};
use crate::protocol::{game_topic, ClientFrame, EventEnvelope, ServerFrame};
use crate::transport::{Connector, Transport};

/// Default delay multiplied by the attempt number between reconnect attempts.
const DEFAULT_RECONNECT_BASE_DELAY: Duration = Duration::from_secs(3);

/// Default cap on automatic reconnect attempts.
const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`RealtimeClient`].
///
/// # Example
///
/// ```
/// use beat_chaser_client::realtime::RealtimeConfig;
/// use std::time::Duration;
///
/// let config = RealtimeConfig::default()
///     .with_reconnect_base_delay(Duration::from_secs(1))
///     .with_max_reconnect_attempts(3);
/// assert_eq!(config.max_reconnect_attempts, 3);
/// ```
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Base delay of the linear reconnect backoff: attempt `n` waits
    /// `base_delay × n` before dialing again.
    ///
    /// Defaults to **3 seconds**.
    pub reconnect_base_delay: Duration,
    /// Maximum number of automatic reconnect attempts before the client
    /// stays `Errored` until a manual [`connect`](RealtimeClient::connect).
    ///
    /// Defaults to **5**.
    pub max_reconnect_attempts: u32,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            reconnect_base_delay: DEFAULT_RECONNECT_BASE_DELAY,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }
}

impl RealtimeConfig {
    /// Set the base delay of the linear reconnect backoff.
    #[must_use]
    pub fn with_reconnect_base_delay(mut self, delay: Duration) -> Self {
        self.reconnect_base_delay = delay;
        self
    }

    /// Set the cap on automatic reconnect attempts.
    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }
}

// ── Connection state ────────────────────────────────────────────────

/// Lifecycle stage of the realtime link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// No link, and none is wanted (initial state, or after an explicit
    /// [`disconnect`](RealtimeClient::disconnect)).
    #[default]
    Disconnected,
    /// A handshake is in flight. Always resolves to `Connected` or `Errored`.
    Connecting,
    /// The link is up.
    Connected,
    /// The link failed; automatic recovery may be scheduled.
    Errored,
}

/// Snapshot of the realtime link's state.
#[derive(Debug, Clone, Default)]
pub struct ConnectionState {
    /// Current lifecycle stage.
    pub status: ConnectionStatus,
    /// Automatic reconnect attempts made since the link was last up.
    /// Reset to 0 on every successful connection.
    pub reconnect_attempt: u32,
    /// Description of the most recent failure, if any.
    pub last_error: Option<String>,
}

// ── Handles ─────────────────────────────────────────────────────────

/// Disposer for a topic subscription.
///
/// [`dispose`](SubscriptionHandle::dispose) unsubscribes; repeated calls are
/// no-ops. Dropping the handle without disposing leaves the subscription
/// active until the client disconnects.
#[derive(Debug)]
pub struct SubscriptionHandle {
    inner: Weak<Inner>,
    topic: String,
    disposed: AtomicBool,
}

impl SubscriptionHandle {
    /// The topic this handle controls.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Release the subscription. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        if lock(&inner.subscriptions).remove(&self.topic).is_some() {
            if let Some(tx) = lock(&inner.outbound).as_ref() {
                let _ = tx.send(ClientFrame::Unsubscribe {
                    topic: self.topic.clone(),
                });
            }
            debug!(topic = %self.topic, "unsubscribed");
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum ObserverRegistry {
    Connect,
    Disconnect,
    Error,
    Event,
}

/// Disposer for a connection or event-type observer.
///
/// [`dispose`](ObserverHandle::dispose) removes the observer; repeated calls
/// are no-ops.
#[derive(Debug)]
pub struct ObserverHandle {
    inner: Weak<Inner>,
    registry: ObserverRegistry,
    id: u64,
    disposed: AtomicBool,
}

impl ObserverHandle {
    /// Remove the observer. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        match self.registry {
            ObserverRegistry::Connect => {
                lock(&inner.connect_observers).retain(|(id, _)| *id != self.id);
            }
            ObserverRegistry::Disconnect => {
                lock(&inner.disconnect_observers).retain(|(id, _)| *id != self.id);
            }
            ObserverRegistry::Error => {
                lock(&inner.error_observers).retain(|(id, _)| *id != self.id);
            }
            ObserverRegistry::Event => {
                lock(&inner.event_observers).retain(|entry| entry.id != self.id);
            }
        }
    }
}

// ── Shared state ────────────────────────────────────────────────────

type TopicHandler = Arc<dyn Fn(GameEvent) + Send + Sync>;
type ConnectionObserver = Arc<dyn Fn() + Send + Sync>;
type ErrorObserver = Arc<dyn Fn(&BeatChaserError) + Send + Sync>;

struct EventObserverEntry {
    id: u64,
    kind: GameEventKind,
    handler: TopicHandler,
}

struct Inner {
    connector: Box<dyn Connector>,
    config: RealtimeConfig,
    state: Mutex<ConnectionState>,
    /// Topic → handler registry; the sole owner of topic bindings.
    subscriptions: Mutex<HashMap<String, TopicHandler>>,
    event_observers: Mutex<Vec<EventObserverEntry>>,
    connect_observers: Mutex<Vec<(u64, ConnectionObserver)>>,
    disconnect_observers: Mutex<Vec<(u64, ConnectionObserver)>>,
    error_observers: Mutex<Vec<(u64, ErrorObserver)>>,
    /// Sender half of the live link's command channel, if a link is up.
    outbound: Mutex<Option<mpsc::UnboundedSender<ClientFrame>>>,
    /// Bumped on every successful connect and every explicit disconnect so a
    /// superseded link loop or retry timer can tell it is stale.
    epoch: AtomicU64,
    next_observer_id: AtomicU64,
}

impl std::fmt::Debug for Inner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inner")
            .field("state", &lock(&self.state).clone())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Client handle ───────────────────────────────────────────────────

/// Reconnecting topic pub/sub client for the Beat Chaser realtime channel.
///
/// Cloning yields another handle to the same logical connection.
#[derive(Debug, Clone)]
pub struct RealtimeClient {
    inner: Arc<Inner>,
}

impl RealtimeClient {
    /// Create a client that dials through `connector`.
    ///
    /// No connection is made until [`connect`](Self::connect) is called.
    pub fn new(connector: impl Connector, config: RealtimeConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                connector: Box::new(connector),
                config,
                state: Mutex::new(ConnectionState::default()),
                subscriptions: Mutex::new(HashMap::new()),
                event_observers: Mutex::new(Vec::new()),
                connect_observers: Mutex::new(Vec::new()),
                disconnect_observers: Mutex::new(Vec::new()),
                error_observers: Mutex::new(Vec::new()),
                outbound: Mutex::new(None),
                epoch: AtomicU64::new(0),
                next_observer_id: AtomicU64::new(0),
            }),
        }
    }

    /// Connect to the realtime endpoint.
    ///
    /// Idempotent: a no-op when already connected or connecting. Resolves when
    /// the handshake attempt settles; a failed handshake never surfaces as an
    /// error here — it is reported to error observers and retried with linear
    /// backoff. Calling this manually resets the reconnect attempt counter,
    /// so a client that exhausted its retry budget starts over.
    pub async fn connect(&self) {
        connect_attempt(Arc::clone(&self.inner), true).await;
    }

    /// Tear down the link and release every subscription.
    ///
    /// Idempotent. Subscriptions are released synchronously before this
    /// returns; the transport itself is closed by the link loop as it winds
    /// down. Pending automatic reconnect timers observe the new status and
    /// stand down.
    pub fn disconnect(&self) {
        let inner = &self.inner;
        {
            let mut st = lock(&inner.state);
            if st.status == ConnectionStatus::Disconnected {
                return;
            }
            st.status = ConnectionStatus::Disconnected;
            st.last_error = None;
        }
        inner.epoch.fetch_add(1, Ordering::SeqCst);
        *lock(&inner.outbound) = None;
        lock(&inner.subscriptions).clear();
        debug!("realtime client disconnected");
        notify_disconnect(inner);
    }

    /// Snapshot of the link state.
    pub fn state(&self) -> ConnectionState {
        lock(&self.inner.state).clone()
    }

    /// Current lifecycle stage of the link.
    pub fn status(&self) -> ConnectionStatus {
        lock(&self.inner.state).status
    }

    /// Whether the link is currently up.
    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Subscribe `handler` to every message published on `topic`.
    ///
    /// Messages are delivered in the order the transport yields them, one
    /// handler invocation per message.
    ///
    /// # Errors
    ///
    /// [`BeatChaserError::NotConnected`] when the link is not up (subscription
    /// requests are not queued), [`BeatChaserError::AlreadySubscribed`] when a
    /// live subscription for `topic` exists — release it first.
    pub fn subscribe(
        &self,
        topic: impl Into<String>,
        handler: impl Fn(GameEvent) + Send + Sync + 'static,
    ) -> Result<SubscriptionHandle> {
        let topic = topic.into();
        if !self.is_connected() {
            warn!(%topic, "cannot subscribe: realtime client not connected");
            return Err(BeatChaserError::NotConnected);
        }

        {
            let mut subs = lock(&self.inner.subscriptions);
            if subs.contains_key(&topic) {
                return Err(BeatChaserError::AlreadySubscribed(topic));
            }
            subs.insert(topic.clone(), Arc::new(handler));
        }

        if let Some(tx) = lock(&self.inner.outbound).as_ref() {
            let _ = tx.send(ClientFrame::Subscribe {
                topic: topic.clone(),
            });
        }
        debug!(%topic, "subscribed");

        Ok(SubscriptionHandle {
            inner: Arc::downgrade(&self.inner),
            topic,
            disposed: AtomicBool::new(false),
        })
    }

    /// Subscribe to a game's event stream.
    ///
    /// The topic is derived deterministically from the game identifier
    /// (see [`game_topic`]).
    ///
    /// # Errors
    ///
    /// As for [`subscribe`](Self::subscribe).
    pub fn subscribe_to_game(
        &self,
        game_id: &str,
        handler: impl Fn(GameEvent) + Send + Sync + 'static,
    ) -> Result<SubscriptionHandle> {
        self.subscribe(game_topic(game_id), handler)
    }

    /// Publish `payload` to an application destination.
    ///
    /// Fire-and-forget: when the link is not up the message is logged and
    /// dropped, never queued and never an error.
    pub fn send(&self, destination: &str, payload: serde_json::Value) {
        if !self.is_connected() {
            warn!(%destination, "cannot send: realtime client not connected; dropping message");
            return;
        }
        let Some(tx) = lock(&self.inner.outbound).as_ref().cloned() else {
            warn!(%destination, "cannot send: no live link; dropping message");
            return;
        };
        let message = EventEnvelope::outbound(destination, payload);
        debug!(%destination, event_type = %message.event_type, "publishing message");
        let _ = tx.send(ClientFrame::Send {
            destination: destination.to_string(),
            message,
        });
    }

    /// Register an observer invoked after every successful connection.
    ///
    /// Observers are invoked in registration order.
    pub fn on_connect(&self, handler: impl Fn() + Send + Sync + 'static) -> ObserverHandle {
        let id = self.next_observer_id();
        lock(&self.inner.connect_observers).push((id, Arc::new(handler)));
        self.observer_handle(ObserverRegistry::Connect, id)
    }

    /// Register an observer invoked whenever the link goes down.
    ///
    /// Observers are invoked in registration order.
    pub fn on_disconnect(&self, handler: impl Fn() + Send + Sync + 'static) -> ObserverHandle {
        let id = self.next_observer_id();
        lock(&self.inner.disconnect_observers).push((id, Arc::new(handler)));
        self.observer_handle(ObserverRegistry::Disconnect, id)
    }

    /// Register an observer invoked with every connection-level error.
    ///
    /// Observers are invoked in registration order.
    pub fn on_error(
        &self,
        handler: impl Fn(&BeatChaserError) + Send + Sync + 'static,
    ) -> ObserverHandle {
        let id = self.next_observer_id();
        lock(&self.inner.error_observers).push((id, Arc::new(handler)));
        self.observer_handle(ObserverRegistry::Error, id)
    }

    /// Register a type-keyed observer invoked for every inbound message of
    /// `kind`, regardless of which topic it arrived on.
    ///
    /// This is the second delivery path: each inbound message is handed to its
    /// topic's handler and to every matching type-keyed observer.
    pub fn on(
        &self,
        kind: GameEventKind,
        handler: impl Fn(GameEvent) + Send + Sync + 'static,
    ) -> ObserverHandle {
        let id = self.next_observer_id();
        lock(&self.inner.event_observers).push(EventObserverEntry {
            id,
            kind,
            handler: Arc::new(handler),
        });
        self.observer_handle(ObserverRegistry::Event, id)
    }

    fn next_observer_id(&self) -> u64 {
        self.inner.next_observer_id.fetch_add(1, Ordering::Relaxed)
    }

    fn observer_handle(&self, registry: ObserverRegistry, id: u64) -> ObserverHandle {
        ObserverHandle {
            inner: Arc::downgrade(&self.inner),
            registry,
            id,
            disposed: AtomicBool::new(false),
        }
    }
}

// ── Connection lifecycle ────────────────────────────────────────────

/// Drive one handshake attempt. `manual` distinguishes caller-initiated
/// connects (which reset the retry budget) from scheduled retries (which
/// stand down after an explicit disconnect).
async fn connect_attempt(inner: Arc<Inner>, manual: bool) {
    {
        let mut st = lock(&inner.state);
        match st.status {
            ConnectionStatus::Connected | ConnectionStatus::Connecting => {
                debug!("realtime client already connected or connecting");
                return;
            }
            ConnectionStatus::Disconnected if !manual => {
                debug!("skipping scheduled reconnect after explicit disconnect");
                return;
            }
            _ => {}
        }
        st.status = ConnectionStatus::Connecting;
        if manual {
            st.reconnect_attempt = 0;
        }
    }

    debug!("opening realtime connection");
    match inner.connector.connect().await {
        Ok(transport) => {
            {
                let mut st = lock(&inner.state);
                // A disconnect may have landed while the handshake was in
                // flight; honor it and discard the fresh transport.
                if st.status != ConnectionStatus::Connecting {
                    debug!("connection superseded during handshake; closing transport");
                    drop(st);
                    tokio::spawn(async move {
                        let mut transport = transport;
                        let _ = transport.close().await;
                    });
                    return;
                }
                st.status = ConnectionStatus::Connected;
                st.reconnect_attempt = 0;
                st.last_error = None;
            }

            let (tx, rx) = mpsc::unbounded_channel::<ClientFrame>();
            let epoch = inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;

            // Topics registered before a dropped link was re-established are
            // announced again so their handlers keep receiving messages. The
            // registry lock is held until the sender is published, so a
            // concurrent subscribe announces its topic exactly once.
            {
                let subs = lock(&inner.subscriptions);
                for topic in subs.keys() {
                    let _ = tx.send(ClientFrame::Subscribe {
                        topic: topic.clone(),
                    });
                }
                *lock(&inner.outbound) = Some(tx);
            }

            tokio::spawn(link_loop(Arc::clone(&inner), transport, rx, epoch));
            debug!("realtime connection established");
            notify_connect(&inner);
        }
        Err(e) => {
            warn!("realtime connection failed: {e}");
            {
                let mut st = lock(&inner.state);
                st.status = ConnectionStatus::Errored;
                st.last_error = Some(e.to_string());
            }
            notify_error(&inner, &e);
            schedule_reconnect(&inner);
        }
    }
}

/// Schedule the next automatic reconnect attempt, or give up once the retry
/// budget is exhausted.
fn schedule_reconnect(inner: &Arc<Inner>) {
    let attempt = {
        let mut st = lock(&inner.state);
        if st.reconnect_attempt >= inner.config.max_reconnect_attempts {
            error!(
                attempts = st.reconnect_attempt,
                "max reconnect attempts reached; staying errored until a manual connect"
            );
            return;
        }
        st.reconnect_attempt += 1;
        st.reconnect_attempt
    };

    let delay = inner.config.reconnect_base_delay * attempt;
    debug!(
        attempt,
        max = inner.config.max_reconnect_attempts,
        delay_ms = delay.as_millis() as u64,
        "scheduling reconnect"
    );

    let inner = Arc::clone(inner);
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        // Status is re-checked inside connect_attempt, so a manual connect or
        // disconnect that landed during the delay is respected.
        connect_attempt(inner, false).await;
    });
}

/// Handle an unexpected link loss observed by the link loop at `epoch`.
fn link_down(inner: &Arc<Inner>, epoch: u64, error: Option<BeatChaserError>) {
    if inner.epoch.load(Ordering::SeqCst) != epoch {
        // A manual connect or disconnect already superseded this link.
        debug!("stale link loop exited");
        return;
    }
    {
        let mut st = lock(&inner.state);
        st.status = ConnectionStatus::Errored;
        st.last_error = Some(match &error {
            Some(e) => e.to_string(),
            None => "connection closed by server".to_string(),
        });
    }
    *lock(&inner.outbound) = None;
    warn!("realtime link lost");
    notify_disconnect(inner);
    if let Some(e) = &error {
        notify_error(inner, e);
    }
    schedule_reconnect(inner);
}

// ── Link loop ───────────────────────────────────────────────────────

/// Background loop owning one live transport. Exits when:
/// - the command channel closes (explicit disconnect)
/// - the transport reports an error or a server-side close
async fn link_loop(
    inner: Arc<Inner>,
    mut transport: Box<dyn Transport>,
    mut cmd_rx: mpsc::UnboundedReceiver<ClientFrame>,
    epoch: u64,
) {
    debug!("link loop started");

    loop {
        tokio::select! {
            // Branch 1: outbound frame from the client handle
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(frame) => {
                        match serde_json::to_string(&frame) {
                            Ok(json) => {
                                if let Err(e) = transport.send(json).await {
                                    error!("transport send error: {e}");
                                    link_down(&inner, epoch, Some(e));
                                    break;
                                }
                            }
                            Err(e) => {
                                // Serialization errors are programming bugs; don't kill the loop.
                                error!("failed to serialize outbound frame: {e}");
                            }
                        }
                    }
                    // Command channel closed — an explicit disconnect dropped
                    // the sender. link_down is skipped: the epoch was already
                    // bumped by the disconnect.
                    None => {
                        debug!("command channel closed, shutting down link loop");
                        let _ = transport.close().await;
                        break;
                    }
                }
            }

            // Branch 2: inbound frame from the server
            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => dispatch_frame(&inner, &text),
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        link_down(&inner, epoch, Some(e));
                        break;
                    }
                    None => {
                        debug!("transport closed by server");
                        link_down(&inner, epoch, None);
                        break;
                    }
                }
            }
        }
    }

    debug!("link loop exited");
}

/// Deserialize one inbound frame and fan it out to both delivery paths:
/// the topic's handler and every matching type-keyed observer.
fn dispatch_frame(inner: &Arc<Inner>, text: &str) {
    let frame: ServerFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("dropping malformed realtime frame: {e} — raw: {text}");
            return;
        }
    };
    let ServerFrame::Message { topic, message } = frame;
    let event = GameEvent::from(message);
    debug!(%topic, kind = %event.kind, "received realtime event");

    let topic_handler = lock(&inner.subscriptions).get(&topic).cloned();
    match topic_handler {
        Some(handler) => handler(event.clone()),
        None => debug!(%topic, "no subscriber for topic"),
    }

    let observers: Vec<TopicHandler> = lock(&inner.event_observers)
        .iter()
        .filter(|entry| entry.kind == event.kind)
        .map(|entry| Arc::clone(&entry.handler))
        .collect();
    for observer in observers {
        observer(event.clone());
    }
}

// ── Observer notification ───────────────────────────────────────────

fn notify_connect(inner: &Arc<Inner>) {
    let handlers: Vec<ConnectionObserver> = lock(&inner.connect_observers)
        .iter()
        .map(|(_, h)| Arc::clone(h))
        .collect();
    for handler in handlers {
        handler();
    }
}

fn notify_disconnect(inner: &Arc<Inner>) {
    let handlers: Vec<ConnectionObserver> = lock(&inner.disconnect_observers)
        .iter()
        .map(|(_, h)| Arc::clone(h))
        .collect();
    for handler in handlers {
        handler();
    }
}

fn notify_error(inner: &Arc<Inner>, error: &BeatChaserError) {
    let handlers: Vec<ErrorObserver> = lock(&inner.error_observers)
        .iter()
        .map(|(_, h)| Arc::clone(h))
        .collect();
    for handler in handlers {
        handler(error);
    }
}

// ── Tests ───────────────────────────────────────────────────────────

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
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    /// Transport that replays scripted inbound items and records outbound frames.
    struct ScriptedTransport {
        incoming: VecDeque<Option<std::result::Result<String, BeatChaserError>>>,
        sent: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&mut self, message: String) -> std::result::Result<(), BeatChaserError> {
            lock(&self.sent).push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, BeatChaserError>> {
            if let Some(item) = self.incoming.pop_front() {
                item
            } else {
                // Scripted input exhausted — stay alive until shutdown.
                std::future::pending().await
            }
        }

        async fn close(&mut self) -> std::result::Result<(), BeatChaserError> {
            Ok(())
        }
    }

    /// Connector yielding one scripted transport per dial; fails once the
    /// script runs out.
    struct ScriptedConnector {
        scripts: Mutex<VecDeque<Vec<Option<std::result::Result<String, BeatChaserError>>>>>,
        sent: Arc<Mutex<Vec<String>>>,
        dials: Arc<AtomicUsize>,
    }

    impl ScriptedConnector {
        fn new(
            scripts: Vec<Vec<Option<std::result::Result<String, BeatChaserError>>>>,
        ) -> (Self, Arc<Mutex<Vec<String>>>, Arc<AtomicUsize>) {
            let sent = Arc::new(Mutex::new(Vec::new()));
            let dials = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    scripts: Mutex::new(scripts.into()),
                    sent: Arc::clone(&sent),
                    dials: Arc::clone(&dials),
                },
                sent,
                dials,
            )
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        async fn connect(&self) -> std::result::Result<Box<dyn Transport>, BeatChaserError> {
            self.dials.fetch_add(1, Ordering::SeqCst);
            match lock(&self.scripts).pop_front() {
                Some(incoming) => Ok(Box::new(ScriptedTransport {
                    incoming: incoming.into(),
                    sent: Arc::clone(&self.sent),
                })),
                None => Err(BeatChaserError::TransportReceive("dial refused".into())),
            }
        }
    }

    fn message_json(topic: &str, event_type: &str) -> String {
        serde_json::to_string(&ServerFrame::Message {
            topic: topic.to_string(),
            message: EventEnvelope::new(event_type, serde_json::Value::Null),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn connect_is_idempotent() {
        let (connector, _sent, dials) = ScriptedConnector::new(vec![vec![]]);
        let client = RealtimeClient::new(connector, RealtimeConfig::default());

        client.connect().await;
        client.connect().await;

        assert!(client.is_connected());
        assert_eq!(dials.load(Ordering::SeqCst), 1);
        assert_eq!(client.state().reconnect_attempt, 0);
    }

    #[tokio::test]
    async fn subscribe_requires_connection() {
        let (connector, _sent, _dials) = ScriptedConnector::new(vec![]);
        let client = RealtimeClient::new(connector, RealtimeConfig::default());

        let result = client.subscribe("/topic/x", |_| {});
        assert!(matches!(result, Err(BeatChaserError::NotConnected)));
    }

    #[tokio::test]
    async fn duplicate_subscription_is_rejected() {
        let (connector, _sent, _dials) = ScriptedConnector::new(vec![vec![]]);
        let client = RealtimeClient::new(connector, RealtimeConfig::default());
        client.connect().await;

        let first = client.subscribe("/topic/game-1/events", |_| {}).unwrap();
        let second = client.subscribe("/topic/game-1/events", |_| {});
        assert!(matches!(
            second,
            Err(BeatChaserError::AlreadySubscribed(_))
        ));

        // After releasing, the topic is free again.
        first.dispose();
        first.dispose(); // idempotent
        assert!(client.subscribe("/topic/game-1/events", |_| {}).is_ok());
    }

    #[tokio::test]
    async fn disconnect_releases_subscriptions_synchronously() {
        let (connector, _sent, _dials) = ScriptedConnector::new(vec![vec![], vec![]]);
        let client = RealtimeClient::new(connector, RealtimeConfig::default());
        client.connect().await;
        let _sub = client.subscribe("/topic/game-9/events", |_| {}).unwrap();

        client.disconnect();
        assert_eq!(client.status(), ConnectionStatus::Disconnected);

        // Registry was cleared, so the topic is free after reconnecting.
        client.connect().await;
        assert!(client.subscribe("/topic/game-9/events", |_| {}).is_ok());
    }

    #[tokio::test]
    async fn send_is_dropped_when_not_connected() {
        let (connector, sent, _dials) = ScriptedConnector::new(vec![]);
        let client = RealtimeClient::new(connector, RealtimeConfig::default());

        client.send("/app/guess", serde_json::json!({"songGuess": "x"}));
        tokio::task::yield_now().await;
        assert!(lock(&sent).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn inbound_message_reaches_topic_handler_and_type_observer() {
        let topic = game_topic("g1");
        let (connector, _sent, _dials) =
            ScriptedConnector::new(vec![vec![Some(Ok(message_json(&topic, "game-ready")))]]);
        let client = RealtimeClient::new(connector, RealtimeConfig::default());
        client.connect().await;

        let by_topic = Arc::new(AtomicUsize::new(0));
        let by_topic_handler = Arc::clone(&by_topic);
        let _sub = client
            .subscribe_to_game("g1", move |event| {
                assert_eq!(event.kind, GameEventKind::GameReady);
                by_topic_handler.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        let by_type = Arc::new(AtomicUsize::new(0));
        let by_type_handler = Arc::clone(&by_type);
        let _obs = client.on(GameEventKind::GameReady, move |_| {
            by_type_handler.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(by_topic.load(Ordering::SeqCst), 1);
        assert_eq!(by_type.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_frame_does_not_kill_dispatch() {
        let topic = game_topic("g1");
        let (connector, _sent, _dials) = ScriptedConnector::new(vec![vec![
            Some(Ok("{definitely not json".to_string())),
            Some(Ok(message_json(&topic, "player-joined"))),
        ]]);
        let client = RealtimeClient::new(connector, RealtimeConfig::default());
        client.connect().await;

        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = Arc::clone(&seen);
        let _sub = client
            .subscribe(&topic, move |_| {
                seen2.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_handshake_notifies_error_observers_and_retries() {
        // Every dial fails.
        let (connector, _sent, dials) = ScriptedConnector::new(vec![]);
        let config = RealtimeConfig::default()
            .with_reconnect_base_delay(Duration::from_millis(100))
            .with_max_reconnect_attempts(2);
        let client = RealtimeClient::new(connector, config);

        let errors = Arc::new(AtomicUsize::new(0));
        let errors2 = Arc::clone(&errors);
        let _obs = client.on_error(move |_| {
            errors2.fetch_add(1, Ordering::SeqCst);
        });

        client.connect().await;
        assert_eq!(client.status(), ConnectionStatus::Errored);

        // Let both scheduled retries fire and fail.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(dials.load(Ordering::SeqCst), 3); // 1 manual + 2 retries
        assert_eq!(errors.load(Ordering::SeqCst), 3);
        assert_eq!(client.status(), ConnectionStatus::Errored);
        assert!(client.state().last_error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_pending_retry() {
        let (connector, _sent, dials) = ScriptedConnector::new(vec![]);
        let config = RealtimeConfig::default()
            .with_reconnect_base_delay(Duration::from_millis(500))
            .with_max_reconnect_attempts(5);
        let client = RealtimeClient::new(connector, config);

        client.connect().await; // fails, schedules retry #1
        assert_eq!(dials.load(Ordering::SeqCst), 1);

        client.disconnect();
        tokio::time::sleep(Duration::from_secs(30)).await;
        // The scheduled retry observed Disconnected and stood down.
        assert_eq!(dials.load(Ordering::SeqCst), 1);
        assert_eq!(client.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn observers_fire_in_registration_order_and_dispose() {
        let (connector, _sent, _dials) = ScriptedConnector::new(vec![vec![], vec![]]);
        let client = RealtimeClient::new(connector, RealtimeConfig::default());

        let order = Arc::new(Mutex::new(Vec::new()));
        let o1 = Arc::clone(&order);
        let h1 = client.on_connect(move || lock(&o1).push(1));
        let o2 = Arc::clone(&order);
        let _h2 = client.on_connect(move || lock(&o2).push(2));

        client.connect().await;
        assert_eq!(lock(&order).clone(), vec![1, 2]);

        h1.dispose();
        h1.dispose(); // idempotent
        client.disconnect();
        client.connect().await;
        assert_eq!(lock(&order).clone(), vec![1, 2, 2]);
    }
}
