//! Configuration management
//!
//! Settings live in `<config dir>/tsplay/config.toml`. Every field has a
//! default, so a missing file or a partial file is fine.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::player::timing::clamp_speed;

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub player: PlayerConfig,
}

/// Tuning knobs for [`Player`](crate::player::Player).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlayerConfig {
    /// Number of events the preloader keeps buffered ahead of playback
    pub buffer_size: usize,
    /// Speed factor applied at construction (clamped to 0.1..=10.0)
    pub initial_speed: f64,
    /// Largest drift correction applied in one scheduling cycle (microseconds)
    pub compensation_step_us: i64,
    /// How often an idle scheduler re-checks an empty queue (milliseconds)
    pub idle_poll_ms: u64,
    /// Pause between preloader fill attempts (milliseconds)
    pub preload_interval_ms: u64,
    /// How long close waits for each worker before detaching it (milliseconds)
    pub shutdown_timeout_ms: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1024,
            initial_speed: 1.0,
            compensation_step_us: 10_000,
            idle_poll_ms: 5,
            preload_interval_ms: 1,
            shutdown_timeout_ms: 1_000,
        }
    }
}

impl PlayerConfig {
    /// Config with the given buffer size and defaults elsewhere.
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            buffer_size,
            ..Self::default()
        }
    }

    /// Buffer size, at least one event.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size.max(1)
    }

    pub fn initial_speed(&self) -> f64 {
        clamp_speed(self.initial_speed)
    }

    /// Compensation step, at least one microsecond.
    pub fn compensation_step_us(&self) -> i64 {
        self.compensation_step_us.max(1)
    }

    /// Idle poll interval, at least one millisecond so idling never spins.
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms.max(1))
    }

    pub fn preload_interval(&self) -> Duration {
        Duration::from_millis(self.preload_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl Config {
    /// Default config file location.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(dir.join("tsplay").join("config.toml"))
    }

    /// Load from the default location, falling back to defaults if absent.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load from `path`, falling back to defaults if the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
