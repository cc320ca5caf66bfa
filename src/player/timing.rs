//! Anchored mapping between logical timestamps and the real clock.
//!
//! An [`Anchor`] pairs a logical timestamp with the `Instant` at which
//! playback (re)started from it. An event at `anchor.logical_us + Δ` is due
//! at `anchor.real + Δ / speed`. All arithmetic is in signed microseconds
//! relative to the anchor's instant, so nothing here touches the clock.
//!
//! Timestamps may span the whole `i64` range, so every difference saturates
//! instead of overflowing.

use std::time::Instant;

pub const MIN_SPEED: f64 = 0.1;
pub const MAX_SPEED: f64 = 10.0;

/// Clamp a requested speed into `[MIN_SPEED, MAX_SPEED]`.
///
/// NaN has no meaningful clamp and falls back to normal speed.
pub fn clamp_speed(factor: f64) -> f64 {
    if factor.is_nan() {
        1.0
    } else {
        factor.clamp(MIN_SPEED, MAX_SPEED)
    }
}

/// Signed microseconds from `from` to `to`.
pub fn micros_between(from: Instant, to: Instant) -> i64 {
    if to >= from {
        to.duration_since(from).as_micros() as i64
    } else {
        -(from.duration_since(to).as_micros() as i64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub logical_us: i64,
    pub real: Instant,
}

impl Anchor {
    pub fn new(logical_us: i64, real: Instant) -> Self {
        Self { logical_us, real }
    }

    /// Real-time offset from the anchor instant at which `timestamp` is due.
    pub fn due_offset_us(&self, timestamp: i64, speed: f64) -> i64 {
        let logical = i128::from(timestamp) - i128::from(self.logical_us);
        // Float-to-int `as` saturates.
        (logical as f64 / speed).round() as i64
    }

    /// Logical position reached at `now` when playing at `speed`.
    pub fn position_at(&self, now: Instant, speed: f64) -> i64 {
        let elapsed = micros_between(self.real, now);
        self.logical_us
            .saturating_add((elapsed as f64 * speed).round() as i64)
    }
}

/// Outcome of one scheduling cycle for the head event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CyclePlan {
    /// Offset of the ideal delivery instant from the anchor instant
    pub due_offset_us: i64,
    /// Correction to add to the drift accumulator this cycle
    pub correction_us: i64,
    /// Remaining wait; zero or negative means deliver now
    pub delay_us: i64,
}

impl CyclePlan {
    pub fn is_due(&self) -> bool {
        self.delay_us <= 0
    }
}

/// Clamp the correction absorbed in one cycle to `step_us` either way.
///
/// Returns `(correction, remaining_delay)`. Delays within the step pass
/// through untouched.
pub fn compensate(delay_us: i64, step_us: i64) -> (i64, i64) {
    if delay_us.unsigned_abs() > step_us.unsigned_abs() {
        let correction = delay_us.clamp(-step_us, step_us);
        (correction, delay_us - correction)
    } else {
        (0, delay_us)
    }
}

/// Plan delivery of an event at `timestamp`.
///
/// `delay = due − now − drift`, then at most `step_us` of it is folded into
/// the drift accumulator.
pub fn plan_cycle(
    anchor: &Anchor,
    speed: f64,
    drift_us: i64,
    step_us: i64,
    timestamp: i64,
    now: Instant,
) -> CyclePlan {
    let due_offset_us = anchor.due_offset_us(timestamp, speed);
    let raw_delay = due_offset_us
        .saturating_sub(micros_between(anchor.real, now))
        .saturating_sub(drift_us);
    let (correction_us, delay_us) = compensate(raw_delay, step_us);
    CyclePlan {
        due_offset_us,
        correction_us,
        delay_us,
    }
}

/// Lateness of a delivery at `actual` versus its ideal instant.
pub fn delivery_lag(anchor: &Anchor, speed: f64, timestamp: i64, actual: Instant) -> i64 {
    micros_between(anchor.real, actual).saturating_sub(anchor.due_offset_us(timestamp, speed))
}
