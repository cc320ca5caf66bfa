//! Subcommand handlers for the tsplay binary

pub mod config;
pub mod inspect;
pub mod play;

use std::path::Path;

use anyhow::{Context, Result};
use tsplay::Config;

/// Load the config from `path`, or from the default location.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    config.context("Failed to load configuration")
}
