use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::app_dirs::AppDirs;
use crate::challenge::DifficultyTier;

/// Timer settings for the quick-time event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimingConfig {
    /// Countdown shown before the first symbol, in seconds
    pub countdown_from: u8,
    pub countdown_step_ms: u64,
    /// How often the per-symbol bar drains
    pub decay_interval_ms: u64,
    pub feedback_ms: u64,
    /// Pause between the end of the game and reporting its outcome
    pub result_delay_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            countdown_from: 3,
            countdown_step_ms: 1000,
            decay_interval_ms: 10,
            feedback_ms: 300,
            result_delay_ms: 1000,
        }
    }
}

impl TimingConfig {
    pub fn countdown_step(&self) -> Duration {
        Duration::from_millis(self.countdown_step_ms.max(1))
    }

    pub fn decay_interval(&self) -> Duration {
        Duration::from_millis(self.decay_interval_ms.max(1))
    }

    pub fn feedback_duration(&self) -> Duration {
        Duration::from_millis(self.feedback_ms)
    }

    pub fn result_delay(&self) -> Duration {
        Duration::from_millis(self.result_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub difficulty: DifficultyTier,
    pub timing: TimingConfig,
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = AppDirs::config_path().unwrap_or_else(|| PathBuf::from("catchdex_config.json"));
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        match fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice::<Config>(&bytes).unwrap_or_else(|e| {
                tracing::warn!(path = %self.path.display(), error = %e, "unreadable config, using defaults");
                Config::default()
            }),
            Err(_) => Config::default(),
        }
    }

    fn save(&self, cfg: &Config) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg)?;
        fs::write(&self.path, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempdir().unwrap();
        let store = FileConfigStore::with_path(dir.path().join("config.json"));
        let cfg = Config::default();
        store.save(&cfg).unwrap();
        assert_eq!(cfg, store.load());
    }

    #[test]
    fn save_and_load_custom_config() {
        let dir = tempdir().unwrap();
        let store = FileConfigStore::with_path(dir.path().join("nested").join("config.json"));
        let cfg = Config {
            difficulty: DifficultyTier::Legendary,
            timing: TimingConfig {
                countdown_from: 1,
                decay_interval_ms: 20,
                ..TimingConfig::default()
            },
        };
        store.save(&cfg).unwrap();
        assert_eq!(cfg, store.load());
    }

    #[test]
    fn missing_or_broken_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = FileConfigStore::with_path(&path);
        assert_eq!(store.load(), Config::default());

        fs::write(&path, b"{ not json").unwrap();
        assert_eq!(store.load(), Config::default());
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, br#"{ "difficulty": "hard", "timing": { "feedback_ms": 150 } }"#).unwrap();

        let cfg = FileConfigStore::with_path(&path).load();
        assert_eq!(cfg.difficulty, DifficultyTier::Hard);
        assert_eq!(cfg.timing.feedback_ms, 150);
        assert_eq!(cfg.timing.decay_interval_ms, 10);
        assert_eq!(cfg.timing.countdown_from, 3);
    }

    #[test]
    fn zero_intervals_are_clamped() {
        let timing = TimingConfig {
            countdown_step_ms: 0,
            decay_interval_ms: 0,
            ..TimingConfig::default()
        };
        assert_eq!(timing.countdown_step(), Duration::from_millis(1));
        assert_eq!(timing.decay_interval(), Duration::from_millis(1));
    }
}
