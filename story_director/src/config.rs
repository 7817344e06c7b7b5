//! Engine configuration.

use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("malformed engine config: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Tunable engine settings with workable defaults.
///
/// Content-level settings (a theme's `takeover` block) win over the engine
/// defaults where both are present.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DirectorConfig {
    /// AI-takeover detour length when the theme does not set one.
    pub takeover_rounds: u32,
    /// Sliding-window size for the snapshot's recent history.
    pub history_window: usize,
    /// Suggested delivery chunk size, in characters.
    pub chunk_size: usize,
    /// Hard cap on session length; the capped turn resolves, then the
    /// session ends. `None` means unlimited.
    pub max_turns: Option<u32>,
    /// Directory for append-only session logs.
    pub log_dir: PathBuf,
    /// Path of the rewritten-each-turn memory snapshot.
    pub snapshot_path: PathBuf,
}

impl Default for DirectorConfig {
    fn default() -> Self {
        Self {
            takeover_rounds: 3,
            history_window: 5,
            chunk_size: 280,
            max_turns: None,
            log_dir: PathBuf::from("logs"),
            snapshot_path: PathBuf::from("saves/memory.json"),
        }
    }
}

impl DirectorConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DirectorConfig::default();
        assert_eq!(config.takeover_rounds, 3);
        assert_eq!(config.history_window, 5);
        assert_eq!(config.chunk_size, 280);
        assert!(config.max_turns.is_none());
    }

    #[test]
    fn test_partial_toml_overrides_defaults() {
        let config = DirectorConfig::from_toml_str(
            r#"
            takeover_rounds = 5
            max_turns = 20
            snapshot_path = "state/mind.json"
            "#,
        )
        .unwrap();

        assert_eq!(config.takeover_rounds, 5);
        assert_eq!(config.max_turns, Some(20));
        assert_eq!(config.snapshot_path, PathBuf::from("state/mind.json"));
        // Untouched fields keep their defaults.
        assert_eq!(config.history_window, 5);
    }

    #[test]
    fn test_malformed_toml_is_an_error() {
        assert!(DirectorConfig::from_toml_str("takeover_rounds = \"three\"").is_err());
    }
}
