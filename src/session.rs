//! Game session identity and the start-up flow.
//!
//! A [`GameSession`] binds a round controller to one backend game instance.
//! For multiplayer games, [`GameLobby`] buffers the game's realtime events
//! while players gather, and [`GameLobby::await_start`] resolves once the
//! backend pushes `game-started` — or fails on `game-error` without touching
//! the realtime subscription, so the caller can retry the start.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::api::{CreatedGame, GameApi};
use crate::config::GameConfig;
use crate::error::{BeatChaserError, Result};
use crate::event::{GameErrorPayload, GameEvent, GameEventKind, GameStartedPayload};
use crate::realtime::{RealtimeClient, SubscriptionHandle};

/// Fallback player cap when a multiplayer config does not set one.
pub const DEFAULT_MAX_PLAYERS: u32 = 4;

/// Generate an opaque player identifier for a session without a logged-in
/// account. Authenticated players use the identifier their token maps to.
pub fn guest_player_id() -> String {
    format!("guest-{}", uuid::Uuid::new_v4())
}

/// Identity and configuration of one game instance.
///
/// Immutable once created; a round controller is bound to exactly one
/// session for its lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSession {
    /// Server-assigned game identifier, treated as opaque.
    pub game_id: String,
    /// Number of rounds to play. At least 1.
    pub total_rounds: u32,
    /// Player cap (multiplayer only).
    pub max_players: Option<u32>,
    /// Guess window length per round, in seconds. At least 1.
    pub round_duration_secs: u32,
}

impl GameSession {
    /// Create a session, clamping rounds and duration to at least 1.
    pub fn new(game_id: impl Into<String>, total_rounds: u32, round_duration_secs: u32) -> Self {
        Self {
            game_id: game_id.into(),
            total_rounds: total_rounds.max(1),
            max_players: None,
            round_duration_secs: round_duration_secs.max(1),
        }
    }

    /// Set the player cap.
    #[must_use]
    pub fn with_max_players(mut self, max_players: u32) -> Self {
        self.max_players = Some(max_players.max(2));
        self
    }

    /// Build a session from a game-creation response and the player's
    /// chosen configuration.
    pub fn from_created(created: &CreatedGame, config: &GameConfig) -> Self {
        let session = Self::new(&created.id, created.total_rounds, config.time_limit_secs);
        match config.max_players {
            Some(max) => session.with_max_players(max),
            None => session,
        }
    }
}

/// Create a singleplayer game and bind a session to it.
///
/// # Errors
///
/// Propagates the REST error taxonomy ([`BeatChaserError::Unauthorized`],
/// [`BeatChaserError::Api`], [`BeatChaserError::Http`]).
pub async fn start_singleplayer(
    api: &GameApi,
    player_id: &str,
    config: &GameConfig,
) -> Result<GameSession> {
    let created = api
        .create_singleplayer_game(player_id, config.rounds)
        .await?;
    debug!(game_id = %created.id, "singleplayer game created");
    Ok(GameSession::from_created(&created, config))
}

/// Create a multiplayer game, subscribe to its event stream, and join it.
///
/// The subscription is opened before joining so no lobby event can slip by
/// between the two calls. On a join failure the subscription is released
/// again before the error propagates.
///
/// # Errors
///
/// REST errors as for [`start_singleplayer`], plus
/// [`BeatChaserError::NotConnected`] when the realtime client has no link.
pub async fn start_multiplayer(
    api: &GameApi,
    realtime: &RealtimeClient,
    player_id: &str,
    config: &GameConfig,
) -> Result<(GameSession, GameLobby)> {
    let max_players = config.max_players.unwrap_or(DEFAULT_MAX_PLAYERS);
    let created = api
        .create_multiplayer_game(player_id, config.rounds, max_players)
        .await?;
    debug!(game_id = %created.id, max_players, "multiplayer game created");

    let lobby = GameLobby::open(realtime, &created.id)?;
    if let Err(e) = api.join_game(&created.id, player_id).await {
        lobby.release();
        return Err(e);
    }

    Ok((GameSession::from_created(&created, config), lobby))
}

/// Join someone else's multiplayer game by its identifier.
///
/// # Errors
///
/// As for [`start_multiplayer`].
pub async fn join_multiplayer(
    api: &GameApi,
    realtime: &RealtimeClient,
    game_id: &str,
    player_id: &str,
    config: &GameConfig,
) -> Result<(GameSession, GameLobby)> {
    let lobby = GameLobby::open(realtime, game_id)?;
    if let Err(e) = api.join_game(game_id, player_id).await {
        lobby.release();
        return Err(e);
    }
    let session = GameSession::new(game_id, config.rounds, config.time_limit_secs)
        .with_max_players(config.max_players.unwrap_or(DEFAULT_MAX_PLAYERS));
    Ok((session, lobby))
}

/// A multiplayer waiting room: the game's event stream, buffered.
///
/// Holds the topic subscription for the game. Dropping the lobby leaves the
/// subscription active (the realtime client owns it until disconnect);
/// call [`release`](GameLobby::release) to unsubscribe explicitly.
#[derive(Debug)]
pub struct GameLobby {
    game_id: String,
    events: mpsc::UnboundedReceiver<GameEvent>,
    subscription: SubscriptionHandle,
}

impl GameLobby {
    /// Subscribe to `game_id`'s event stream and start buffering it.
    ///
    /// # Errors
    ///
    /// [`BeatChaserError::NotConnected`] when the realtime client has no
    /// link, [`BeatChaserError::AlreadySubscribed`] when a lobby for this
    /// game is already open.
    pub fn open(realtime: &RealtimeClient, game_id: &str) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = realtime.subscribe_to_game(game_id, move |event| {
            let _ = tx.send(event);
        })?;
        Ok(Self {
            game_id: game_id.to_string(),
            events: rx,
            subscription,
        })
    }

    /// The game this lobby belongs to.
    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    /// Receive the next buffered game event.
    ///
    /// Returns `None` once the subscription's sender side is gone (client
    /// disconnected and the handler was dropped).
    pub async fn next_event(&mut self) -> Option<GameEvent> {
        self.events.recv().await
    }

    /// Wait for the backend to start the game.
    ///
    /// Lobby chatter (`game-ready`, `player-joined`, unknown types) is
    /// skipped with a debug note. On `game-error` the pending start sequence
    /// is aborted and the error surfaces — the subscription stays intact so
    /// the caller may try starting again.
    ///
    /// # Errors
    ///
    /// [`BeatChaserError::GameLifecycle`] on a `game-error` event,
    /// [`BeatChaserError::NotConnected`] when the event stream ends before
    /// the game starts.
    pub async fn await_start(&mut self) -> Result<GameStartedPayload> {
        while let Some(event) = self.events.recv().await {
            match event.kind {
                GameEventKind::GameStarted => return event.decode::<GameStartedPayload>(),
                GameEventKind::GameError => {
                    let message = event
                        .decode::<GameErrorPayload>()
                        .map(|p| p.message)
                        .unwrap_or_else(|_| "unspecified game error".to_string());
                    warn!(game_id = %self.game_id, %message, "game start aborted by backend");
                    return Err(BeatChaserError::GameLifecycle(message));
                }
                kind => debug!(game_id = %self.game_id, %kind, "lobby event"),
            }
        }
        Err(BeatChaserError::NotConnected)
    }

    /// Release the game subscription.
    pub fn release(&self) {
        self.subscription.dispose();
    }
}

/// Announce this player's readiness to the lobby.
///
/// Fire-and-forget, like every realtime publish.
pub fn announce_ready(realtime: &RealtimeClient, game_id: &str, player_id: &str) {
    realtime.send(
        "/app/ready",
        serde_json::json!({ "gameId": game_id, "playerId": player_id }),
    );
}

/// Publish a guess for the current round.
pub fn send_guess(
    realtime: &RealtimeClient,
    game_id: &str,
    player_id: &str,
    guess: &crate::scoring::Guess,
) {
    realtime.send(
        "/app/guess",
        serde_json::json!({
            "gameId": game_id,
            "playerId": player_id,
            "songGuess": guess.song_guess,
            "artistGuess": guess.artist_guess,
        }),
    );
}

/// Publish a skip for the current round.
pub fn send_skip(realtime: &RealtimeClient, game_id: &str, round_number: u32) {
    realtime.send(
        "/app/skip",
        serde_json::json!({ "gameId": game_id, "roundNumber": round_number }),
    );
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

    fn created() -> CreatedGame {
        CreatedGame {
            id: "game-7".into(),
            total_rounds: 5,
            created_at: "2024-05-01T10:00:00Z".into(),
        }
    }

    #[test]
    fn session_from_created_takes_backend_rounds_and_config_duration() {
        let config = GameConfig {
            rounds: 99, // the backend's registered count wins
            time_limit_secs: 20,
            ..GameConfig::default()
        };
        let session = GameSession::from_created(&created(), &config);
        assert_eq!(session.game_id, "game-7");
        assert_eq!(session.total_rounds, 5);
        assert_eq!(session.round_duration_secs, 20);
        assert_eq!(session.max_players, None);
    }

    #[test]
    fn guest_player_ids_are_unique() {
        assert_ne!(guest_player_id(), guest_player_id());
        assert!(guest_player_id().starts_with("guest-"));
    }

    #[test]
    fn session_clamps_degenerate_values() {
        let session = GameSession::new("g", 0, 0);
        assert_eq!(session.total_rounds, 1);
        assert_eq!(session.round_duration_secs, 1);

        let session = session.with_max_players(1);
        assert_eq!(session.max_players, Some(2));
    }
}
