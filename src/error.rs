//! Error types for sources, the player and configuration.

use std::path::PathBuf;

/// Errors raised by an [`EventSource`](crate::source::EventSource).
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Failed to read source: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed event at {location}: {message}")]
    Read { location: String, message: String },

    #[error("Source cannot seek to an arbitrary position")]
    SeekUnsupported,
}

impl SourceError {
    /// Build a [`SourceError::Read`] from anything displayable.
    pub fn read(location: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Read {
            location: location.into(),
            message: message.to_string(),
        }
    }
}

/// Errors returned by [`Player`](crate::player::Player) operations.
#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    #[error("Player is closed")]
    Closed,

    #[error("Seeking requires a seekable event source")]
    SeekUnsupported,

    #[error("Event source failed while seeking: {0}")]
    Source(#[source] SourceError),

    #[error("Event source was lost after the preloader failed to stop")]
    SourceLost,

    #[error("Event handler failed: {0}")]
    HandlerFault(String),

    #[error("Failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl From<SourceError> for PlayerError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::SeekUnsupported => PlayerError::SeekUnsupported,
            other => PlayerError::Source(other),
        }
    }
}

/// Errors loading or locating the configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine the user config directory")]
    NoConfigDir,

    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
