//! REST collaborators: game lifecycle, song catalog, and authentication.
//!
//! [`GameApi`] is a thin typed wrapper over the backend's HTTP endpoints. It
//! holds the opaque bearer credential issued by the auth endpoints and
//! attaches it to every request; the token is never interpreted client-side.
//!
//! Authorization failures (401/403) are reported as
//! [`BeatChaserError::Unauthorized`], distinct from network failures, so the
//! caller can prompt for re-authentication instead of retrying.

use serde::{Deserialize, Serialize};

use crate::error::{BeatChaserError, Result};

/// A song from the backend catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    /// Server-assigned identifier.
    pub id: String,
    /// Track title.
    pub title: String,
    /// Performing artist.
    pub artist: String,
    /// Album name.
    #[serde(default)]
    pub album: String,
    /// Full track length in seconds.
    pub duration_seconds: f32,
    /// URL of the preview asset; only its filename component is meaningful
    /// to this client (see [`Song::playable_url`]).
    pub audio_preview_url: String,
}

impl Song {
    /// The filename component of the preview URL, if any.
    pub fn preview_filename(&self) -> Option<&str> {
        self.audio_preview_url
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
    }

    /// Derive the playable URL for this track by joining the preview asset's
    /// filename onto the media base URL.
    pub fn playable_url(&self, media_base_url: &str) -> Option<String> {
        let filename = self.preview_filename()?;
        Some(format!(
            "{}/{}",
            media_base_url.trim_end_matches('/'),
            filename
        ))
    }
}

/// Response of the game creation endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedGame {
    /// Server-assigned game identifier, treated as opaque.
    pub id: String,
    /// Number of rounds the backend registered for this game.
    pub total_rounds: u32,
    /// Creation timestamp.
    pub created_at: String,
}

/// One player's membership in a game.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GamePlayer {
    /// Game the player belongs to.
    pub game_id: String,
    /// The player's user identifier.
    pub user_id: String,
    /// Whether this player created the game.
    pub is_host: bool,
    /// Whether the player signalled readiness in the lobby.
    pub is_ready: bool,
    /// The player's score as known to the backend.
    pub score: i64,
    /// When the player joined.
    pub joined_at: String,
}

/// Response of the start-game endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStart {
    /// When the backend started the game.
    pub start_time: String,
    /// Roster at start time.
    #[serde(default)]
    pub players: Vec<GamePlayer>,
}

/// Response of the login/register endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    /// Human-readable status message.
    #[serde(default)]
    pub message: String,
    /// Opaque bearer token to attach to subsequent requests.
    pub token: String,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    username: &'a str,
    email: &'a str,
    password: &'a str,
}

/// Typed client for the backend's REST endpoints.
///
/// Cheap to clone is not a goal here — construct one per application and
/// share it by reference, like the realtime client.
pub struct GameApi {
    http: reqwest::Client,
    base_url: String,
    token: std::sync::Mutex<Option<String>>,
}

impl std::fmt::Debug for GameApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The credential never appears in logs.
        f.debug_struct("GameApi")
            .field("base_url", &self.base_url)
            .field("has_token", &self.has_token())
            .finish_non_exhaustive()
    }
}

impl GameApi {
    /// Create a client for the backend at `base_url` (no trailing slash needed).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: std::sync::Mutex::new(None),
        }
    }

    /// Attach an externally obtained bearer credential to subsequent requests.
    pub fn set_token(&self, token: impl Into<String>) {
        *lock(&self.token) = Some(token.into());
    }

    /// Drop the stored credential (logout).
    pub fn clear_token(&self) {
        *lock(&self.token) = None;
    }

    /// Whether a credential is currently attached.
    pub fn has_token(&self) -> bool {
        lock(&self.token).is_some()
    }

    /// Log in and store the issued bearer token.
    ///
    /// # Errors
    ///
    /// [`BeatChaserError::Unauthorized`] on rejected credentials,
    /// [`BeatChaserError::Http`] on network failure.
    pub async fn login(&self, username: &str, password: &str) -> Result<AuthResponse> {
        let response: AuthResponse = self
            .execute(
                self.http
                    .post(self.url("/api/auth/login"))
                    .json(&LoginRequest { username, password }),
            )
            .await?;
        self.set_token(response.token.clone());
        Ok(response)
    }

    /// Register a new account and store the issued bearer token.
    ///
    /// # Errors
    ///
    /// As for [`login`](Self::login).
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthResponse> {
        let response: AuthResponse = self
            .execute(
                self.http
                    .post(self.url("/api/auth/register"))
                    .json(&RegisterRequest {
                        username,
                        email,
                        password,
                    }),
            )
            .await?;
        self.set_token(response.token.clone());
        Ok(response)
    }

    /// Create a singleplayer game.
    ///
    /// # Errors
    ///
    /// [`BeatChaserError::Unauthorized`], [`BeatChaserError::Api`], or
    /// [`BeatChaserError::Http`] per the crate error taxonomy.
    pub async fn create_singleplayer_game(
        &self,
        player_id: &str,
        rounds: u32,
    ) -> Result<CreatedGame> {
        self.execute(
            self.http
                .post(self.url("/api/game/create/singleplayer"))
                .query(&[
                    ("playerId", player_id.to_string()),
                    ("rounds", rounds.to_string()),
                ]),
        )
        .await
    }

    /// Create a multiplayer game with a player cap.
    ///
    /// # Errors
    ///
    /// As for [`create_singleplayer_game`](Self::create_singleplayer_game).
    pub async fn create_multiplayer_game(
        &self,
        player_id: &str,
        rounds: u32,
        max_players: u32,
    ) -> Result<CreatedGame> {
        self.execute(
            self.http
                .post(self.url("/api/game/create/multiplayer"))
                .query(&[
                    ("playerId", player_id.to_string()),
                    ("rounds", rounds.to_string()),
                    ("maxPlayers", max_players.to_string()),
                ]),
        )
        .await
    }

    /// Join an existing game.
    ///
    /// # Errors
    ///
    /// As for [`create_singleplayer_game`](Self::create_singleplayer_game).
    pub async fn join_game(&self, game_id: &str, player_id: &str) -> Result<GamePlayer> {
        self.execute(
            self.http
                .post(self.url("/api/game/join"))
                .query(&[("gameId", game_id), ("playerId", player_id)]),
        )
        .await
    }

    /// Start a game all players have joined.
    ///
    /// # Errors
    ///
    /// As for [`create_singleplayer_game`](Self::create_singleplayer_game).
    pub async fn start_game(&self, game_id: &str) -> Result<GameStart> {
        self.execute(
            self.http
                .post(self.url("/api/game/start"))
                .query(&[("gameId", game_id)]),
        )
        .await
    }

    /// Fetch the full song catalog.
    ///
    /// # Errors
    ///
    /// As for [`create_singleplayer_game`](Self::create_singleplayer_game).
    pub async fn all_songs(&self) -> Result<Vec<Song>> {
        self.execute(self.http.get(self.url("/api/song"))).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Send a request with the bearer credential attached and decode the
    /// response, mapping status codes onto the crate error taxonomy.
    async fn execute<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        let request = match lock(&self.token).clone() {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            tracing::warn!(status = status.as_u16(), "request rejected by backend auth");
            return Err(BeatChaserError::Unauthorized);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BeatChaserError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }
}

fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
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

    fn song(preview: &str) -> Song {
        Song {
            id: "s1".into(),
            title: "Bohemian Rhapsody".into(),
            artist: "Queen".into(),
            album: "A Night at the Opera".into(),
            duration_seconds: 354.0,
            audio_preview_url: preview.into(),
        }
    }

    #[test]
    fn playable_url_joins_filename_onto_media_base() {
        let s = song("https://cdn.example.com/previews/queen.mp3");
        assert_eq!(s.preview_filename(), Some("queen.mp3"));
        assert_eq!(
            s.playable_url("http://localhost:8080/music/"),
            Some("http://localhost:8080/music/queen.mp3".into())
        );
    }

    #[test]
    fn playable_url_handles_bare_filenames() {
        let s = song("queen.mp3");
        assert_eq!(
            s.playable_url("http://localhost:8080/music"),
            Some("http://localhost:8080/music/queen.mp3".into())
        );
    }

    #[test]
    fn playable_url_is_none_without_filename() {
        let s = song("https://cdn.example.com/previews/");
        assert_eq!(s.preview_filename(), None);
        assert_eq!(s.playable_url("http://localhost:8080/music"), None);
    }

    #[test]
    fn song_deserializes_from_backend_shape() {
        let json = r#"{
            "id": "7",
            "title": "Clair de Lune",
            "artist": "Debussy",
            "album": "Suite bergamasque",
            "durationSeconds": 300.5,
            "audioPreviewUrl": "https://cdn/p/clair.mp3"
        }"#;
        let s: Song = serde_json::from_str(json).unwrap();
        assert_eq!(s.duration_seconds, 300.5);
        assert_eq!(s.preview_filename(), Some("clair.mp3"));
    }

    #[test]
    fn token_lifecycle() {
        let api = GameApi::new("http://localhost:8080/");
        assert!(!api.has_token());
        api.set_token("abc");
        assert!(api.has_token());
        api.clear_token();
        assert!(!api.has_token());
    }

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let api = GameApi::new("http://localhost:8080/");
        assert_eq!(api.url("/api/song"), "http://localhost:8080/api/song");
    }
}
