//! CLI definitions for tsplay
//!
//! Shared between the binary and the xtask crate, which renders the man page
//! from the same definitions.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};

#[cfg(not(feature = "release"))]
pub const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("VERGEN_GIT_SHA"),
    " ",
    env!("TSPLAY_BUILD_DATE"),
    ")"
);

#[cfg(feature = "release")]
pub const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("TSPLAY_BUILD_DATE"),
    ")"
);

#[derive(Parser)]
#[command(name = "tsplay")]
#[command(version = VERSION)]
#[command(about = "Replay timestamped event streams in real time")]
#[command(long_about = "Replay timestamped event streams in real time.

Events are delivered at the moment their timestamps come due, scaled by the
playback speed. Small scheduling errors are absorbed gradually so playback
stays locked to the original timeline.

Supported inputs:
  cast     asciicast v3 recordings (output events are written to stdout)
  records  binary record files (8-byte timestamp, 4-byte length, payload)

Logging goes to stderr and is controlled with RUST_LOG (default: warn).")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Replay a file in real time
    #[command(long_about = "Replay a file in real time.

Cast output events are written to stdout unchanged. Record payloads are
written as one line each (invalid UTF-8 is replaced). Press Ctrl+C to stop.

EXAMPLES:
    tsplay play session.cast
    tsplay play session.cast --speed 2
    tsplay play capture.bin --format records --from 5000000")]
    Play {
        /// File to replay
        file: PathBuf,

        /// Playback speed factor (clamped to 0.1..=10)
        #[arg(short, long)]
        speed: Option<f64>,

        /// Number of events to buffer ahead of playback
        #[arg(short, long)]
        buffer: Option<usize>,

        /// Input format
        #[arg(short, long, value_enum, default_value_t = Format::Auto)]
        format: Format,

        /// Start position in microseconds
        #[arg(long, value_name = "MICROS")]
        from: Option<i64>,

        /// Config file to use instead of the default location
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Summarize a file without replaying it
    #[command(long_about = "Summarize a file without replaying it.

Prints the event count, first and last timestamps, duration and total
payload size.

EXAMPLE:
    tsplay inspect session.cast")]
    Inspect {
        /// File to inspect
        file: PathBuf,

        /// Input format
        #[arg(short, long, value_enum, default_value_t = Format::Auto)]
        format: Format,
    },

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration as TOML
    Show {
        /// Config file to use instead of the default location
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },
    /// Print the default config file location
    Path,
}

/// Input file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Pick by file extension (.cast is cast, anything else is records)
    Auto,
    /// asciicast v3
    Cast,
    /// Binary timestamped records
    Records,
}

impl Format {
    /// Resolve `Auto` against the file name.
    pub fn resolve(self, path: &Path) -> Format {
        match self {
            Format::Auto => {
                if path.extension().is_some_and(|ext| ext == "cast") {
                    Format::Cast
                } else {
                    Format::Records
                }
            }
            other => other,
        }
    }
}
