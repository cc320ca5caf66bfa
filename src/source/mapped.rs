//! Binary record files read through a memory map.
//!
//! # Record layout
//!
//! Records are stored back to back, all integers big-endian:
//!
//! ```text
//! +----------------+---------------------+------------------------+
//! | timestamp: i64 | payload_length: u32 | payload: length bytes  |
//! +----------------+---------------------+------------------------+
//! ```
//!
//! The source is exhausted once fewer than [`RECORD_HEADER_LEN`] bytes
//! remain. A header that announces more payload than the file holds is a
//! read error, not exhaustion.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use super::EventSource;
use crate::error::SourceError;
use crate::event::TimestampedEvent;

/// Size of the fixed record header (timestamp + payload length).
pub const RECORD_HEADER_LEN: usize = 12;

type PayloadParser<T> = Box<dyn Fn(&[u8]) -> Result<T, SourceError> + Send>;

/// Decode the record starting at `offset`.
///
/// Returns the timestamp, the payload slice and the offset of the next
/// record, or `Ok(None)` when fewer than [`RECORD_HEADER_LEN`] bytes remain.
pub fn decode_record(bytes: &[u8], offset: usize) -> Result<Option<(i64, &[u8], usize)>, String> {
    let rest = bytes.get(offset..).unwrap_or_default();
    if rest.len() < RECORD_HEADER_LEN {
        return Ok(None);
    }

    let mut ts = [0u8; 8];
    ts.copy_from_slice(&rest[..8]);
    let mut len = [0u8; 4];
    len.copy_from_slice(&rest[8..RECORD_HEADER_LEN]);

    let timestamp = i64::from_be_bytes(ts);
    let length = u32::from_be_bytes(len) as usize;
    let body = &rest[RECORD_HEADER_LEN..];
    if body.len() < length {
        return Err(format!(
            "truncated payload: header announces {} bytes, {} remain",
            length,
            body.len()
        ));
    }

    Ok(Some((
        timestamp,
        &body[..length],
        offset + RECORD_HEADER_LEN + length,
    )))
}

/// Event source over a memory-mapped record file.
pub struct MappedFileSource<T> {
    // Zero-length files cannot be mapped on every platform.
    mmap: Option<Mmap>,
    path: PathBuf,
    offset: usize,
    record: u64,
    parser: PayloadParser<T>,
}

impl MappedFileSource<Vec<u8>> {
    /// Open a record file keeping payloads as raw bytes.
    pub fn bytes(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        Self::open(path, |payload| Ok(payload.to_vec()))
    }
}

impl<T> MappedFileSource<T> {
    /// Open a record file, decoding each payload with `parser`.
    pub fn open<F>(path: impl AsRef<Path>, parser: F) -> Result<Self, SourceError>
    where
        F: Fn(&[u8]) -> Result<T, SourceError> + Send + 'static,
    {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let mmap = if file.metadata()?.len() == 0 {
            None
        } else {
            // SAFETY: the mapping is read-only. Recordings are expected to be
            // left untouched by other processes while they are being replayed.
            Some(unsafe { Mmap::map(&file)? })
        };

        tracing::debug!(path = %path.display(), len = mmap.as_ref().map_or(0, |m| m.len()), "mapped record file");

        Ok(Self {
            mmap,
            path,
            offset: 0,
            record: 0,
            parser: Box::new(parser),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Total mapped length in bytes.
    pub fn len(&self) -> usize {
        self.bytes_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn bytes_slice(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or_default()
    }

    fn location(&self) -> String {
        format!("{} record {}", self.path.display(), self.record)
    }
}

impl<T> EventSource<T> for MappedFileSource<T> {
    fn next_event(&mut self) -> Result<Option<TimestampedEvent<T>>, SourceError> {
        let decoded = decode_record(self.bytes_slice(), self.offset)
            .map_err(|message| SourceError::read(self.location(), message))?;

        let Some((timestamp, payload, next)) = decoded else {
            return Ok(None);
        };
        let payload = (self.parser)(payload)?;

        self.offset = next;
        self.record += 1;
        Ok(Some(TimestampedEvent::new(timestamp, payload)))
    }

    fn is_seekable(&self) -> bool {
        true
    }

    fn seek(&mut self, target: i64) -> Result<(), SourceError> {
        let mut offset = 0;
        let mut record = 0;
        loop {
            let decoded = decode_record(self.bytes_slice(), offset).map_err(|message| {
                SourceError::read(format!("{} record {}", self.path.display(), record), message)
            })?;
            match decoded {
                Some((timestamp, _, next)) if timestamp < target => {
                    offset = next;
                    record += 1;
                }
                _ => break,
            }
        }
        self.offset = offset;
        self.record = record;
        Ok(())
    }
}

/// Writes events in the record layout read by [`MappedFileSource`].
pub struct RecordWriter<W: Write> {
    writer: W,
    written: u64,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    /// Append one record.
    pub fn write(&mut self, timestamp: i64, payload: &[u8]) -> io::Result<()> {
        let length = u32::try_from(payload.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "payload exceeds u32::MAX"))?;
        self.writer.write_all(&timestamp.to_be_bytes())?;
        self.writer.write_all(&length.to_be_bytes())?;
        self.writer.write_all(payload)?;
        self.written += 1;
        Ok(())
    }

    /// Number of records written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush and return the underlying writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}
