//! tsplay - replay timestamped event streams in real time
//!
//! Events are pulled from an [`EventSource`] by a background preloader into
//! a bounded [`EventQueue`], and a scheduler thread hands each one to a
//! handler at the moment its timestamp comes due, scaled by the playback
//! speed and corrected for accumulated scheduling drift.

pub mod cli;
pub mod config;
pub mod error;
pub mod event;
pub mod player;
pub mod queue;
pub mod source;

pub use config::{Config, PlayerConfig};
pub use error::{ConfigError, PlayerError, SourceError};
pub use event::TimestampedEvent;
pub use player::{PlaybackState, Player, PlayerStats, ShutdownReport, SourceStatus};
pub use queue::EventQueue;
pub use source::{CastSource, EventSource, IterSource, MappedFileSource, VecSource};
