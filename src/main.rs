//! tsplay CLI entry point

mod commands;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tsplay::cli::{Cli, Commands, ConfigCommands};

/// Send logs to stderr so stdout carries only replayed payloads.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Play {
            file,
            speed,
            buffer,
            format,
            from,
            config,
        } => commands::play::handle(commands::play::PlayArgs {
            file: &file,
            speed,
            buffer,
            format,
            from,
            config: config.as_deref(),
        }),
        Commands::Inspect { file, format } => commands::inspect::handle(&file, format),
        Commands::Config(cmd) => match cmd {
            ConfigCommands::Show { config } => commands::config::handle_show(config.as_deref()),
            ConfigCommands::Path => commands::config::handle_path(),
        },
    }
}
