//! Player state management
//!
//! Contains the shared record every player thread synchronizes on, along
//! with the public status types reported to callers.

use std::time::Instant;

use super::timing::Anchor;

/// Transport state of a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Constructed, or halted by a seek in progress or a handler fault
    Stopped,
    /// Delivering events
    Playing,
    /// Halted by `pause`, resumes where it left off
    Paused,
    /// Terminal; no further deliveries
    Closed,
}

/// What the preloader last reported about the event source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceStatus {
    /// No preloader has run yet, or it was stopped before the source ended
    Idle,
    /// A preloader is filling the queue
    Running,
    /// The source ran out of events
    Exhausted,
    /// Reading the source failed; no more events will arrive
    Failed(String),
}

impl SourceStatus {
    /// Whether the source will never produce another event.
    pub fn is_finished(&self) -> bool {
        matches!(self, SourceStatus::Exhausted | SourceStatus::Failed(_))
    }
}

/// Point-in-time view of a player.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerStats {
    pub state: PlaybackState,
    pub speed: f64,
    /// Accumulated scheduling correction in microseconds
    pub drift_us: i64,
    /// Events handed to the handler so far
    pub delivered: u64,
    /// Events currently buffered
    pub queued: usize,
    /// Current logical position, when known
    pub position_us: Option<i64>,
    pub source: SourceStatus,
}

/// State shared by control calls, the scheduler and the preloader.
///
/// Guarded by a single mutex. Any change that should make the scheduler
/// abandon what it is doing bumps `generation`.
#[derive(Debug)]
pub(crate) struct Shared {
    pub state: PlaybackState,
    pub generation: u64,
    pub speed: f64,
    /// `None` while playing means the first event seen pins the anchor.
    pub anchor: Option<Anchor>,
    /// Logical position to resume from when not playing.
    pub resume_at: Option<i64>,
    pub drift_us: i64,
    pub delivering: bool,
    pub delivered: u64,
    /// Unacknowledged handler fault.
    pub fault: Option<String>,
    pub source: SourceStatus,
    /// Identifies the preloader allowed to report `source`.
    pub preload_session: u64,
}

impl Shared {
    pub fn new(speed: f64) -> Self {
        Self {
            state: PlaybackState::Stopped,
            generation: 0,
            speed,
            anchor: None,
            resume_at: None,
            drift_us: 0,
            delivering: false,
            delivered: 0,
            fault: None,
            source: SourceStatus::Idle,
            preload_session: 0,
        }
    }

    /// Invalidate whatever the scheduler is currently waiting on.
    pub fn bump(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    /// Logical position at `now`, if one is known.
    pub fn position_at(&self, now: Instant) -> Option<i64> {
        match (self.state, self.anchor) {
            (PlaybackState::Playing, Some(anchor)) => Some(anchor.position_at(now, self.speed)),
            _ => self.resume_at,
        }
    }

    /// Leave `Playing`, remembering where playback got to.
    pub fn halt(&mut self, next: PlaybackState, now: Instant) {
        if self.state == PlaybackState::Playing {
            self.resume_at = self.position_at(now);
        }
        self.anchor = None;
        self.state = next;
        self.bump();
    }

    /// Enter `Playing`, anchoring at the remembered position if any.
    pub fn start(&mut self, now: Instant) {
        self.anchor = self.resume_at.take().map(|logical| Anchor::new(logical, now));
        self.state = PlaybackState::Playing;
        self.bump();
    }

    /// Change speed, re-anchoring at the current instant while playing.
    pub fn set_speed(&mut self, speed: f64, now: Instant) {
        if self.state == PlaybackState::Playing {
            if let Some(anchor) = self.anchor {
                self.anchor = Some(Anchor::new(anchor.position_at(now, self.speed), now));
            }
            self.bump();
        }
        self.speed = speed;
    }
}
