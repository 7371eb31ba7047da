//! Lobby and game configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for the game lobbies this bot runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LobbySettings {
    /// Game name, used as the prefix of component ids (`<game>-join`)
    pub game_name: String,
    /// Human readable game title shown in the join prompt
    pub game_title: String,
    /// Reclaim lobbies without membership changes for this long
    pub idle_timeout_seconds: u64,
    /// How often to look for idle lobbies
    pub cleanup_interval_seconds: u64,
    /// Enable idle lobby reclamation
    pub reclaim_idle_lobbies: bool,
}

impl Default for LobbySettings {
    fn default() -> Self {
        Self {
            game_name: "secret-hitler".to_string(),
            game_title: "Secret Hitler".to_string(),
            idle_timeout_seconds: 3600, // 1 hour
            cleanup_interval_seconds: 60,
            reclaim_idle_lobbies: true,
        }
    }
}

impl LobbySettings {
    /// Get idle timeout as Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_seconds)
    }

    /// Get cleanup interval as Duration
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_seconds)
    }
}
