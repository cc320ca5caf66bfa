//! Play command handler

use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tsplay::cli::Format;
use tsplay::source::CastRecord;
use tsplay::{CastSource, EventSource, MappedFileSource, PlaybackState, Player, PlayerConfig};

use super::load_config;

/// How often the main thread checks for Ctrl+C while waiting.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Options collected from the command line.
pub struct PlayArgs<'a> {
    pub file: &'a Path,
    pub speed: Option<f64>,
    pub buffer: Option<usize>,
    pub format: Format,
    pub from: Option<i64>,
    pub config: Option<&'a Path>,
}

#[cfg(not(tarpaulin_include))]
pub fn handle(args: PlayArgs<'_>) -> Result<()> {
    let mut player_config = load_config(args.config)?.player;
    if let Some(speed) = args.speed {
        player_config.initial_speed = speed;
    }
    if let Some(buffer) = args.buffer {
        player_config.buffer_size = buffer;
    }

    let file = args.file;
    match args.format.resolve(file) {
        Format::Cast => {
            let source = CastSource::open(file)
                .with_context(|| format!("Failed to open {}", file.display()))?;
            let stdout = io::stdout();
            replay(
                file,
                source,
                move |record: CastRecord| {
                    if record.is_output() {
                        let mut out = stdout.lock();
                        out.write_all(record.data.as_bytes())?;
                        out.flush()?;
                    }
                    Ok(())
                },
                &player_config,
                args.from,
            )
        }
        Format::Records | Format::Auto => {
            let source = MappedFileSource::bytes(file)
                .with_context(|| format!("Failed to open {}", file.display()))?;
            let stdout = io::stdout();
            replay(
                file,
                source,
                move |payload: Vec<u8>| {
                    let mut out = stdout.lock();
                    writeln!(out, "{}", String::from_utf8_lossy(&payload))?;
                    out.flush()?;
                    Ok(())
                },
                &player_config,
                args.from,
            )
        }
    }
}

/// Play `source` to the end, or until Ctrl+C.
fn replay<T, S, H>(
    file: &Path,
    source: S,
    handler: H,
    config: &PlayerConfig,
    from: Option<i64>,
) -> Result<()>
where
    T: Send + 'static,
    S: EventSource<T> + 'static,
    H: FnMut(T) -> anyhow::Result<()> + Send + 'static,
{
    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = Arc::clone(&interrupted);
        ctrlc::set_handler(move || interrupted.store(true, Ordering::SeqCst))
            .context("Failed to install Ctrl+C handler")?;
    }

    let player = Player::with_config(source, handler, config)?;
    match from {
        Some(target) => player.seek(target)?,
        None => player.play()?,
    }

    loop {
        if player.wait_until_drained(POLL_INTERVAL) {
            break;
        }
        if interrupted.load(Ordering::SeqCst) {
            tracing::debug!("interrupted, stopping playback");
            break;
        }
        if player.state() != PlaybackState::Playing {
            break;
        }
    }

    let stats = player.stats();
    let report = player.close();
    tracing::debug!(
        delivered = stats.delivered,
        drift_us = stats.drift_us,
        ?report,
        "playback finished"
    );

    if let Some(fault) = player.take_fault() {
        bail!("Playback stopped: {}", fault);
    }
    if let Some(error) = player.source_error() {
        bail!("Failed to read {}: {}", file.display(), error);
    }
    Ok(())
}
