#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Integration tests for the reconnecting realtime client.
//!
//! Uses the scripted `MockConnector` from `tests/common` to drive handshake
//! outcomes and inbound frames, and tokio's paused clock to make the linear
//! backoff schedule observable.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use beat_chaser_client::protocol::{game_topic, ClientFrame};
use beat_chaser_client::realtime::ConnectionStatus;
use beat_chaser_client::{BeatChaserError, GameEventKind, RealtimeClient, RealtimeConfig};

use common::{lock, message_json, Dial, MockConnector};

type ConnectorHandles = (Arc<Mutex<Vec<String>>>, Arc<AtomicUsize>);

fn client_with_plan(plan: Vec<Dial>) -> (RealtimeClient, ConnectorHandles) {
    let (connector, sent, dials) = MockConnector::new(plan);
    let client = RealtimeClient::new(
        connector,
        RealtimeConfig::default()
            .with_reconnect_base_delay(Duration::from_secs(3))
            .with_max_reconnect_attempts(5),
    );
    (client, (sent, dials))
}

// ════════════════════════════════════════════════════════════════════
// Connect / disconnect settling
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn connect_then_disconnect_settles_on_last_operation() {
    let (client, (_sent, dials)) = client_with_plan(vec![Dial::Script(vec![]), Dial::Script(vec![])]);

    client.connect().await;
    assert_eq!(client.status(), ConnectionStatus::Connected);
    assert_eq!(client.state().reconnect_attempt, 0);

    client.disconnect();
    client.disconnect(); // idempotent
    assert_eq!(client.status(), ConnectionStatus::Disconnected);

    client.connect().await;
    assert_eq!(client.status(), ConnectionStatus::Connected);
    assert_eq!(client.state().reconnect_attempt, 0);
    assert_eq!(dials.load(Ordering::SeqCst), 2);
}

// ════════════════════════════════════════════════════════════════════
// Reconnect backoff and the attempt cap
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn five_failures_reach_the_cap_and_a_sixth_retry_never_fires() {
    // Six planned failures: the manual connect plus five automatic retries.
    let plan: Vec<Dial> = (0..6).map(|_| Dial::Fail).collect();
    let (client, (_sent, dials)) = client_with_plan(plan);

    client.connect().await;
    assert_eq!(client.status(), ConnectionStatus::Errored);
    assert_eq!(dials.load(Ordering::SeqCst), 1);

    // Linear backoff: retries at +3 s, +6 s, +9 s, +12 s, +15 s (45 s total).
    tokio::time::sleep(Duration::from_secs(46)).await;
    assert_eq!(dials.load(Ordering::SeqCst), 6);
    assert_eq!(client.status(), ConnectionStatus::Errored);
    assert_eq!(client.state().reconnect_attempt, 5);

    // The budget is spent: no further automatic attempt, ever.
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(dials.load(Ordering::SeqCst), 6);
    assert_eq!(client.status(), ConnectionStatus::Errored);
}

#[tokio::test(start_paused = true)]
async fn manual_connect_resumes_after_the_cap() {
    let mut plan: Vec<Dial> = (0..6).map(|_| Dial::Fail).collect();
    plan.push(Dial::Script(vec![]));
    let (client, (_sent, dials)) = client_with_plan(plan);

    client.connect().await;
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(dials.load(Ordering::SeqCst), 6);
    assert_eq!(client.status(), ConnectionStatus::Errored);

    // Only an explicit connect gets the client out of Errored.
    client.connect().await;
    assert_eq!(client.status(), ConnectionStatus::Connected);
    assert_eq!(client.state().reconnect_attempt, 0);
    assert_eq!(dials.load(Ordering::SeqCst), 7);
}

#[tokio::test(start_paused = true)]
async fn backoff_delays_grow_linearly() {
    let (client, (_sent, dials)) = client_with_plan(vec![Dial::Fail, Dial::Fail, Dial::Fail]);

    client.connect().await;
    assert_eq!(dials.load(Ordering::SeqCst), 1);

    // First retry fires 3 s after the failure, not before.
    tokio::time::sleep(Duration::from_millis(2900)).await;
    assert_eq!(dials.load(Ordering::SeqCst), 1);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(dials.load(Ordering::SeqCst), 2);

    // Second retry waits 2 × base after the second failure.
    tokio::time::sleep(Duration::from_millis(5900)).await;
    assert_eq!(dials.load(Ordering::SeqCst), 2);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(dials.load(Ordering::SeqCst), 3);
}

// ════════════════════════════════════════════════════════════════════
// Link loss recovery
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn dropped_link_reconnects_and_reannounces_subscriptions() {
    let topic = game_topic("g1");
    let (client, (sent, dials)) = client_with_plan(vec![
        // First link: one delivery, then a server-side close.
        Dial::Script(vec![
            Some(Ok(message_json(&topic, "game-ready", serde_json::Value::Null))),
            None,
        ]),
        // Second link: one more delivery, then stays open.
        Dial::Script(vec![Some(Ok(message_json(
            &topic,
            "player-joined",
            serde_json::Value::Null,
        )))]),
    ]);

    client.connect().await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen2 = Arc::clone(&seen);
    let _sub = client
        .subscribe(&topic, move |event| lock(&seen2).push(event.kind))
        .unwrap();

    let drops = Arc::new(AtomicUsize::new(0));
    let drops2 = Arc::clone(&drops);
    let _obs = client.on_disconnect(move || {
        drops2.fetch_add(1, Ordering::SeqCst);
    });

    // Let the first link deliver and die, and the retry re-establish.
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(dials.load(Ordering::SeqCst), 2);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    assert_eq!(client.status(), ConnectionStatus::Connected);
    assert_eq!(client.state().reconnect_attempt, 0);
    assert_eq!(
        lock(&seen).clone(),
        vec![GameEventKind::GameReady, GameEventKind::PlayerJoined]
    );

    // The surviving topic was announced on both links.
    let subscribes = lock(&sent)
        .iter()
        .filter(|raw| {
            matches!(
                serde_json::from_str::<ClientFrame>(raw),
                Ok(ClientFrame::Subscribe { topic: t }) if t == topic
            )
        })
        .count();
    assert_eq!(subscribes, 2);
}

// ════════════════════════════════════════════════════════════════════
// Dispatch: ordering and the dual delivery path
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn same_topic_messages_arrive_in_transport_order() {
    let topic = game_topic("g1");
    let incoming = vec![
        Some(Ok(message_json(&topic, "game-ready", serde_json::Value::Null))),
        Some(Ok(message_json(
            &topic,
            "player-joined",
            serde_json::json!({"player": {"gameId": "g1", "userId": "u2", "isHost": false, "isReady": false, "score": 0, "joinedAt": ""}}),
        ))),
        Some(Ok(message_json(&topic, "game-started", serde_json::Value::Null))),
    ];
    let (client, _handles) = client_with_plan(vec![Dial::Script(incoming)]);

    client.connect().await;
    let order = Arc::new(Mutex::new(Vec::new()));
    let order2 = Arc::clone(&order);
    let _sub = client
        .subscribe(&topic, move |event| lock(&order2).push(event.kind))
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        lock(&order).clone(),
        vec![
            GameEventKind::GameReady,
            GameEventKind::PlayerJoined,
            GameEventKind::GameStarted,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn type_observers_fire_regardless_of_topic() {
    let topic_a = game_topic("a");
    let topic_b = game_topic("b");
    let incoming = vec![
        Some(Ok(message_json(&topic_a, "game-started", serde_json::Value::Null))),
        Some(Ok(message_json(&topic_b, "game-started", serde_json::Value::Null))),
    ];
    let (client, _handles) = client_with_plan(vec![Dial::Script(incoming)]);
    client.connect().await;

    // Only topic A has a subscriber; the type observer must still see both.
    let by_topic = Arc::new(AtomicUsize::new(0));
    let by_topic2 = Arc::clone(&by_topic);
    let _sub = client
        .subscribe(&topic_a, move |_| {
            by_topic2.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    let by_type = Arc::new(AtomicUsize::new(0));
    let by_type2 = Arc::clone(&by_type);
    let _obs = client.on(GameEventKind::GameStarted, move |_| {
        by_type2.fetch_add(1, Ordering::SeqCst);
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(by_topic.load(Ordering::SeqCst), 1);
    assert_eq!(by_type.load(Ordering::SeqCst), 2);
}

// ════════════════════════════════════════════════════════════════════
// Registry invariants
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn one_handler_per_topic_even_when_subscribed_twice() {
    let topic = game_topic("g1");
    let (client, _handles) = client_with_plan(vec![Dial::Script(vec![Some(Ok(message_json(
        &topic,
        "game-ready",
        serde_json::Value::Null,
    )))])]);
    client.connect().await;

    let deliveries = Arc::new(AtomicUsize::new(0));
    let first = Arc::clone(&deliveries);
    let _sub = client
        .subscribe(&topic, move |_| {
            first.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    // The second registration is refused, so it can never double-deliver.
    let second = Arc::clone(&deliveries);
    let result = client.subscribe(&topic, move |_| {
        second.fetch_add(1, Ordering::SeqCst);
    });
    assert!(matches!(result, Err(BeatChaserError::AlreadySubscribed(_))));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(deliveries.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn send_is_fire_and_forget() {
    let (client, (sent, _dials)) = client_with_plan(vec![Dial::Script(vec![])]);

    // Not connected: dropped, no error, nothing recorded.
    client.send("/app/guess", serde_json::json!({"songGuess": "x"}));
    assert!(lock(&sent).is_empty());

    client.connect().await;
    client.send("/app/guess", serde_json::json!({"songGuess": "x"}));
    tokio::time::sleep(Duration::from_millis(20)).await;

    let frames: Vec<ClientFrame> = lock(&sent)
        .iter()
        .map(|raw| serde_json::from_str(raw).unwrap())
        .collect();
    match frames.as_slice() {
        [ClientFrame::Send { destination, message }] => {
            assert_eq!(destination, "/app/guess");
            assert_eq!(message.event_type, "guess");
        }
        other => panic!("expected a single Send frame, got {other:?}"),
    }
}
