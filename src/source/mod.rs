//! Event sources feeding the player.
//!
//! A source is a pull-based, single-pass cursor over events sorted by
//! timestamp. Sources that can reposition their cursor advertise it through
//! [`EventSource::is_seekable`]; the player refuses to seek otherwise.
//!
//! Provided sources:
//! - [`VecSource`]: in-memory events, seekable
//! - [`IterSource`]: wraps any iterator, single-pass only
//! - [`MappedFileSource`]: binary record files read through a memory map
//! - [`CastSource`]: asciicast v3 recordings

mod cast;
mod mapped;

use crate::error::SourceError;
use crate::event::TimestampedEvent;

pub use cast::{CastRecord, CastSource, EventKind, Header, Terminal};
pub use mapped::{decode_record, MappedFileSource, RecordWriter, RECORD_HEADER_LEN};

/// A lazy, finite sequence of timestamp-ordered events.
pub trait EventSource<T>: Send {
    /// Pull the next event.
    ///
    /// `Ok(None)` means the source is exhausted. An error ends the source;
    /// callers must not pull again after one.
    fn next_event(&mut self) -> Result<Option<TimestampedEvent<T>>, SourceError>;

    /// Whether [`seek`](EventSource::seek) can reposition this source.
    fn is_seekable(&self) -> bool {
        false
    }

    /// Position the cursor on the first event with `timestamp >= target`.
    fn seek(&mut self, target: i64) -> Result<(), SourceError> {
        let _ = target;
        Err(SourceError::SeekUnsupported)
    }
}

impl<T, S: EventSource<T> + ?Sized> EventSource<T> for Box<S> {
    fn next_event(&mut self) -> Result<Option<TimestampedEvent<T>>, SourceError> {
        (**self).next_event()
    }

    fn is_seekable(&self) -> bool {
        (**self).is_seekable()
    }

    fn seek(&mut self, target: i64) -> Result<(), SourceError> {
        (**self).seek(target)
    }
}

/// In-memory source over events sorted by timestamp.
#[derive(Debug, Clone)]
pub struct VecSource<T> {
    events: Vec<TimestampedEvent<T>>,
    cursor: usize,
}

impl<T: Clone + Send> VecSource<T> {
    /// Build a source from events; they are sorted (stably) by timestamp.
    pub fn new(mut events: Vec<TimestampedEvent<T>>) -> Self {
        events.sort_by_key(|e| e.timestamp());
        Self { events, cursor: 0 }
    }

    /// Events not yet pulled.
    pub fn remaining(&self) -> usize {
        self.events.len() - self.cursor
    }
}

impl<T: Clone + Send> FromIterator<(i64, T)> for VecSource<T> {
    fn from_iter<I: IntoIterator<Item = (i64, T)>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(TimestampedEvent::from).collect())
    }
}

impl<T: Clone + Send> EventSource<T> for VecSource<T> {
    fn next_event(&mut self) -> Result<Option<TimestampedEvent<T>>, SourceError> {
        let event = self.events.get(self.cursor).cloned();
        if event.is_some() {
            self.cursor += 1;
        }
        Ok(event)
    }

    fn is_seekable(&self) -> bool {
        true
    }

    fn seek(&mut self, target: i64) -> Result<(), SourceError> {
        self.cursor = self.events.partition_point(|e| e.timestamp() < target);
        Ok(())
    }
}

/// Single-pass source over any iterator of events.
///
/// The iterator is trusted to yield events in timestamp order. Items may be
/// fallible so adapters can report read failures.
pub struct IterSource<I> {
    iter: I,
}

impl<I> IterSource<I> {
    pub fn new(iter: I) -> Self {
        Self { iter }
    }
}

impl<T, I> EventSource<T> for IterSource<I>
where
    I: Iterator<Item = Result<TimestampedEvent<T>, SourceError>> + Send,
{
    fn next_event(&mut self) -> Result<Option<TimestampedEvent<T>>, SourceError> {
        self.iter.next().transpose()
    }
}
