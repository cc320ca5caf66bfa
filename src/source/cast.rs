//! asciicast v3 recordings as an event source.
//!
//! Format reference: https://docs.asciinema.org/manual/asciicast/v3/
//!
//! Line one is a JSON header object. Each following non-blank line is a
//! JSON triple `[interval, kind, data]`, with `interval` in seconds since the
//! previous event. Timestamps handed to the player are the running total of
//! intervals in microseconds. Lines are read lazily so a long recording is
//! never held in memory.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::EventSource;
use crate::error::SourceError;
use crate::event::TimestampedEvent;

/// Header fields that matter for replay. Anything else in the header is
/// ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct Header {
    pub version: u8,
    #[serde(default)]
    pub term: Option<Terminal>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub idle_time_limit: Option<f64>,
}

/// Terminal size recorded in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Terminal {
    pub cols: u16,
    pub rows: u16,
}

/// What an event line carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum EventKind {
    #[serde(rename = "o")]
    Output,
    #[serde(rename = "i")]
    Input,
    #[serde(rename = "m")]
    Marker,
    #[serde(rename = "r")]
    Resize,
    #[serde(rename = "x")]
    Exit,
}

impl EventKind {
    /// Single-letter code used on disk.
    pub fn code(self) -> char {
        match self {
            EventKind::Output => 'o',
            EventKind::Input => 'i',
            EventKind::Marker => 'm',
            EventKind::Resize => 'r',
            EventKind::Exit => 'x',
        }
    }
}

/// Payload produced by [`CastSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastRecord {
    pub kind: EventKind,
    pub data: String,
}

impl CastRecord {
    pub fn is_output(&self) -> bool {
        self.kind == EventKind::Output
    }
}

/// Lazily reads an asciicast v3 file.
pub struct CastSource {
    path: PathBuf,
    header: Header,
    lines: Lines<BufReader<File>>,
    line_no: usize,
    elapsed_us: i64,
    // Events read ahead while seeking, handed out before reading more lines.
    pending: Option<TimestampedEvent<CastRecord>>,
}

impl CastSource {
    /// Open a recording and validate its header.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        let (header, lines) = Self::read_header(&path)?;
        tracing::debug!(path = %path.display(), "opened asciicast source");
        Ok(Self {
            path,
            header,
            lines,
            line_no: 1,
            elapsed_us: 0,
            pending: None,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_header(path: &Path) -> Result<(Header, Lines<BufReader<File>>), SourceError> {
        let mut lines = BufReader::new(File::open(path)?).lines();
        let location = format!("{}:1", path.display());

        let first = lines
            .next()
            .ok_or_else(|| SourceError::read(&location, "file is empty"))??;
        let header: Header = serde_json::from_str(&first)
            .map_err(|e| SourceError::read(&location, format!("invalid header: {}", e)))?;

        if header.version != 3 {
            return Err(SourceError::read(
                &location,
                format!("expected an asciicast v3 header, found version {}", header.version),
            ));
        }
        Ok((header, lines))
    }

    fn read_event(&mut self) -> Result<Option<TimestampedEvent<CastRecord>>, SourceError> {
        for line in self.lines.by_ref() {
            let line = line?;
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }

            let location = format!("{}:{}", self.path.display(), self.line_no);
            let (interval_us, record) =
                parse_event_line(&line).map_err(|message| SourceError::read(&location, message))?;
            self.elapsed_us = self.elapsed_us.checked_add(interval_us).ok_or_else(|| {
                SourceError::read(&location, "timestamp exceeds the 64-bit microsecond range")
            })?;
            return Ok(Some(TimestampedEvent::new(self.elapsed_us, record)));
        }
        Ok(None)
    }
}

/// Split an event line into its interval (microseconds) and record.
fn parse_event_line(line: &str) -> Result<(i64, CastRecord), String> {
    let (interval, kind, data): (f64, EventKind, String) =
        serde_json::from_str(line).map_err(|e| format!("invalid event: {}", e))?;

    if !interval.is_finite() || interval < 0.0 {
        return Err(format!("interval must be non-negative, got {}", interval));
    }
    let micros = (interval * 1_000_000.0).round();
    // i64::MAX rounds up to 2^63 as an f64, so this bound keeps the cast exact.
    if micros >= i64::MAX as f64 {
        return Err(format!("interval of {}s is too large", interval));
    }

    Ok((micros as i64, CastRecord { kind, data }))
}

impl EventSource<CastRecord> for CastSource {
    fn next_event(&mut self) -> Result<Option<TimestampedEvent<CastRecord>>, SourceError> {
        match self.pending.take() {
            Some(event) => Ok(Some(event)),
            None => self.read_event(),
        }
    }

    fn is_seekable(&self) -> bool {
        true
    }

    /// Reopen the file and read forward to the first event at or after
    /// `target`.
    fn seek(&mut self, target: i64) -> Result<(), SourceError> {
        let (header, lines) = Self::read_header(&self.path)?;
        self.header = header;
        self.lines = lines;
        self.line_no = 1;
        self.elapsed_us = 0;
        self.pending = None;

        while let Some(event) = self.read_event()? {
            if event.timestamp() >= target {
                self.pending = Some(event);
                break;
            }
        }
        Ok(())
    }
}
