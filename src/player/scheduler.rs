//! The delivery loop.
//!
//! One long-lived thread per player. While the player is not playing the
//! loop sleeps on the shared condvar. While playing, each cycle snapshots
//! the anchor, speed, drift and generation under the state lock, plans the
//! head event's delivery with [`plan_cycle`], and either delivers at once or
//! waits on the condvar until the deadline. Every control operation that
//! changes the plan bumps the generation and notifies the condvar, so a
//! waiting cycle wakes up, notices, and starts over without delivering.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::MutexGuard;

use super::state::{PlaybackState, Shared};
use super::timing::{delivery_lag, plan_cycle, Anchor};
use super::{Core, Handler};

/// Longest single sleep. Longer delays are re-planned after waking.
const MAX_WAIT_US: i64 = 3_600_000_000;

pub(crate) fn run<T>(core: Arc<Core<T>>, mut handler: Handler<T>) {
    let mut shared = core.shared.lock();

    loop {
        match shared.state {
            PlaybackState::Closed => break,
            PlaybackState::Playing => {}
            PlaybackState::Stopped | PlaybackState::Paused => {
                core.changed.wait(&mut shared);
                continue;
            }
        }

        let generation = shared.generation;

        let Some(timestamp) = core.queue.peek_timestamp() else {
            MutexGuard::unlocked(&mut shared, || {
                core.queue.wait_for_event(core.settings.idle_poll);
            });
            continue;
        };

        let now = Instant::now();
        let anchor = *shared.anchor.get_or_insert(Anchor::new(timestamp, now));
        let plan = plan_cycle(
            &anchor,
            shared.speed,
            shared.drift_us,
            core.settings.compensation_step_us,
            timestamp,
            now,
        );
        shared.drift_us = shared.drift_us.saturating_add(plan.correction_us);

        if !plan.is_due() {
            let capped = plan.delay_us > MAX_WAIT_US;
            let deadline = now + Duration::from_micros(plan.delay_us.min(MAX_WAIT_US) as u64);
            if !wait_until(&core, &mut shared, generation, deadline) || capped {
                continue;
            }
        }

        let Some(event) = core.queue.pop_min() else {
            continue;
        };

        let actual = Instant::now();
        let lag = delivery_lag(&anchor, shared.speed, event.timestamp(), actual);
        shared.drift_us = shared.drift_us.saturating_add(lag);
        shared.delivering = true;
        shared.delivered += 1;
        tracing::trace!(
            timestamp = event.timestamp(),
            lag_us = lag,
            drift_us = shared.drift_us,
            "delivering event"
        );

        let payload = event.into_payload();
        let outcome = MutexGuard::unlocked(&mut shared, || invoke(&mut handler, payload));

        shared.delivering = false;
        if let Err(message) = outcome {
            record_fault(&mut shared, message);
        }
        core.changed.notify_all();
    }

    tracing::debug!(delivered = shared.delivered, "delivery loop exited");
}

/// Sleep until `deadline` unless the generation moves first.
///
/// Returns `true` when the deadline passed with the plan still valid.
fn wait_until<T>(
    core: &Core<T>,
    shared: &mut MutexGuard<'_, Shared>,
    generation: u64,
    deadline: Instant,
) -> bool {
    loop {
        if shared.generation != generation || shared.state != PlaybackState::Playing {
            return false;
        }
        if core.changed.wait_until(shared, deadline).timed_out() {
            return shared.generation == generation && shared.state == PlaybackState::Playing;
        }
    }
}

fn invoke<T>(handler: &mut Handler<T>, payload: T) -> Result<(), String> {
    match panic::catch_unwind(AssertUnwindSafe(|| handler(payload))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(format!("{:#}", err)),
        Err(panic) => Err(format!("handler panicked: {}", panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Stop delivery after a handler fault; the fault is kept until acknowledged.
fn record_fault(shared: &mut Shared, message: String) {
    tracing::warn!(error = %message, "event handler failed, stopping playback");
    if shared.state == PlaybackState::Playing {
        shared.halt(PlaybackState::Stopped, Instant::now());
    }
    shared.fault = Some(message);
}
