//! Persisted game configuration.
//!
//! The player's chosen configuration is a single value object cached on disk
//! under a fixed file name: read at startup, overwritten on every change, and
//! cleared when the player quits. A stored blob that no longer parses is
//! discarded with a logged warning rather than surfaced as an error.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Fixed file name the configuration is cached under.
pub const CONFIG_FILE_NAME: &str = "gameConfig.json";

/// Song catalog difficulty selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

/// Song catalog category selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[default]
    Mixed,
    Rock,
    Pop,
    Jazz,
    Classical,
    Electronic,
}

/// Whether the game is played alone or against other players.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    #[default]
    Singleplayer,
    Multiplayer,
}

/// The player's chosen game configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameConfig {
    /// Number of rounds to play.
    pub rounds: u32,
    /// Difficulty selection.
    #[serde(default)]
    pub difficulty: Difficulty,
    /// Category selection.
    #[serde(default)]
    pub category: Category,
    /// Guess window length per round, in seconds.
    pub time_limit_secs: u32,
    /// Player cap (multiplayer only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_players: Option<u32>,
    /// Singleplayer or multiplayer.
    #[serde(default)]
    pub game_mode: GameMode,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            rounds: 10,
            difficulty: Difficulty::default(),
            category: Category::default(),
            time_limit_secs: 30,
            max_players: None,
            game_mode: GameMode::default(),
        }
    }
}

/// On-disk cache for the chosen [`GameConfig`].
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Create a store that keeps the configuration inside `dir` under
    /// [`CONFIG_FILE_NAME`].
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(CONFIG_FILE_NAME),
        }
    }

    /// Path of the cached file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the cached configuration, if a valid one exists.
    ///
    /// An unparsable cache is removed and treated as absent.
    pub fn load(&self) -> Option<GameConfig> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!("discarding unparsable game config cache: {e}");
                let _ = std::fs::remove_file(&self.path);
                None
            }
        }
    }

    /// Overwrite the cache with `config`.
    ///
    /// # Errors
    ///
    /// Returns an I/O or serialization error when the cache cannot be written.
    pub fn save(&self, config: &GameConfig) -> Result<()> {
        let raw = serde_json::to_string_pretty(config)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }

    /// Remove the cache (player quit).
    ///
    /// # Errors
    ///
    /// Returns an I/O error for failures other than the cache being absent.
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
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

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("beat-chaser-cfg-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn save_load_round_trip() {
        let store = ConfigStore::new(scratch_dir());
        let config = GameConfig {
            rounds: 5,
            difficulty: Difficulty::Hard,
            category: Category::Rock,
            time_limit_secs: 20,
            max_players: Some(4),
            game_mode: GameMode::Multiplayer,
        };

        store.save(&config).unwrap();
        assert_eq!(store.load(), Some(config));
    }

    #[test]
    fn load_returns_none_when_absent() {
        let store = ConfigStore::new(scratch_dir());
        assert_eq!(store.load(), None);
    }

    #[test]
    fn unparsable_cache_is_discarded() {
        let store = ConfigStore::new(scratch_dir());
        std::fs::write(store.path(), "{not json").unwrap();

        assert_eq!(store.load(), None);
        // The broken file is gone, so the next load is a plain miss.
        assert!(!store.path().exists());
    }

    #[test]
    fn clear_is_idempotent() {
        let store = ConfigStore::new(scratch_dir());
        store.save(&GameConfig::default()).unwrap();
        store.clear().unwrap();
        store.clear().unwrap();
        assert_eq!(store.load(), None);
    }

    #[test]
    fn defaults_match_the_configuration_screen() {
        let config = GameConfig::default();
        assert_eq!(config.rounds, 10);
        assert_eq!(config.time_limit_secs, 30);
        assert_eq!(config.game_mode, GameMode::Singleplayer);
        assert_eq!(config.max_players, None);
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let json = serde_json::to_string(&GameConfig::default()).unwrap();
        assert!(json.contains("timeLimitSecs"));
        assert!(json.contains("gameMode"));
        assert!(!json.contains("maxPlayers"));
    }
}
