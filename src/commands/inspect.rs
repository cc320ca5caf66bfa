//! Inspect command handler
//!
//! Drains a source without any timing and summarizes what it holds.

use std::path::Path;

use anyhow::{Context, Result};
use humansize::{format_size, DECIMAL};
use tsplay::cli::Format;
use tsplay::source::CastRecord;
use tsplay::{CastSource, EventSource, MappedFileSource};

/// Totals gathered from one pass over a source.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub events: u64,
    pub first_us: Option<i64>,
    pub last_us: Option<i64>,
    pub payload_bytes: u64,
}

impl Summary {
    /// Read `source` to the end, measuring payloads with `size_of`.
    pub fn collect<T, S>(source: &mut S, size_of: impl Fn(&T) -> usize) -> Result<Self>
    where
        S: EventSource<T> + ?Sized,
    {
        let mut summary = Self::default();
        while let Some(event) = source.next_event()? {
            summary.events += 1;
            if summary.first_us.is_none() {
                summary.first_us = Some(event.timestamp());
            }
            summary.last_us = Some(event.timestamp());
            summary.payload_bytes += size_of(event.payload()) as u64;
        }
        Ok(summary)
    }

    pub fn duration_us(&self) -> i64 {
        match (self.first_us, self.last_us) {
            (Some(first), Some(last)) => last - first,
            _ => 0,
        }
    }
}

fn format_micros(micros: Option<i64>) -> String {
    match micros {
        Some(us) => format!("{:.3}s ({} µs)", us as f64 / 1_000_000.0, us),
        None => "-".to_string(),
    }
}

#[cfg(not(tarpaulin_include))]
pub fn handle(file: &Path, format: Format) -> Result<()> {
    let format = format.resolve(file);
    let summary = match format {
        Format::Cast => {
            let mut source = CastSource::open(file)
                .with_context(|| format!("Failed to open {}", file.display()))?;
            if let Some(title) = &source.header().title {
                println!("Title:    {}", title);
            }
            Summary::collect(&mut source, |record: &CastRecord| record.data.len())?
        }
        Format::Records | Format::Auto => {
            let mut source = MappedFileSource::bytes(file)
                .with_context(|| format!("Failed to open {}", file.display()))?;
            Summary::collect(&mut source, |payload: &Vec<u8>| payload.len())?
        }
    };

    println!("Events:   {}", summary.events);
    println!("First:    {}", format_micros(summary.first_us));
    println!("Last:     {}", format_micros(summary.last_us));
    println!("Duration: {}", format_micros(Some(summary.duration_us())));
    println!("Payload:  {}", format_size(summary.payload_bytes, DECIMAL));
    Ok(())
}
