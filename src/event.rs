//! Timestamped event type shared by sources, the queue and the player.

/// A payload tagged with its logical timestamp.
///
/// Timestamps are microseconds on an epoch chosen by the source. The
/// payload is opaque to the player and is handed to the handler untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampedEvent<T> {
    timestamp: i64,
    payload: T,
}

impl<T> TimestampedEvent<T> {
    pub fn new(timestamp: i64, payload: T) -> Self {
        Self { timestamp, payload }
    }

    /// Logical timestamp in microseconds.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// Consume the event, returning its payload.
    pub fn into_payload(self) -> T {
        self.payload
    }

    /// Split into `(timestamp, payload)`.
    pub fn into_parts(self) -> (i64, T) {
        (self.timestamp, self.payload)
    }
}

impl<T> From<(i64, T)> for TimestampedEvent<T> {
    fn from((timestamp, payload): (i64, T)) -> Self {
        Self::new(timestamp, payload)
    }
}
