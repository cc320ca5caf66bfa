//! Drift-compensated event player
//!
//! Replays events from an [`EventSource`] at an adjustable speed, keeping the
//! logical timeline of the events locked to the real clock.
//!
//! # Architecture
//!
//! The player is organized into submodules:
//! - `state`: the shared record guarded by one mutex, plus public status types
//! - `timing`: anchor arithmetic and drift compensation (pure functions)
//! - `preloader`: background thread filling the event queue from the source
//! - `scheduler`: long-lived thread running the delivery loop and the handler
//! - `worker`: named threads with a bounded join used by both
//!
//! Lock order is control → shared state → queue. The scheduler never takes
//! the control lock and the preloader never holds the state lock while
//! touching the queue.
//!
//! # Usage
//!
//! ```no_run
//! use tsplay::player::Player;
//! use tsplay::source::VecSource;
//!
//! let source: VecSource<String> = [(0, "start"), (1_000_000, "one second later")]
//!     .into_iter()
//!     .map(|(ts, text)| (ts, text.to_string()))
//!     .collect();
//! let player = Player::new(
//!     source,
//!     |payload: String| {
//!         println!("{}", payload);
//!         Ok(())
//!     },
//!     64,
//! )
//! .unwrap();
//!
//! player.set_speed(2.0);
//! player.play().unwrap();
//! player.wait_until_drained(std::time::Duration::from_secs(5));
//! player.close();
//! ```

mod preloader;
mod scheduler;
pub mod state;
pub mod timing;
mod worker;

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::config::PlayerConfig;
use crate::error::PlayerError;
use crate::queue::EventQueue;
use crate::source::EventSource;
use preloader::{BoxedSource, Preloader};
use worker::Worker;

pub use state::{PlaybackState, PlayerStats, SourceStatus};
pub use timing::{clamp_speed, MAX_SPEED, MIN_SPEED};
pub use worker::WorkerExit;

/// Callback receiving each delivered payload.
pub type Handler<T> = Box<dyn FnMut(T) -> anyhow::Result<()> + Send>;

/// Sanitised timing settings shared with the worker threads.
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub compensation_step_us: i64,
    pub idle_poll: Duration,
    pub preload_interval: Duration,
    pub shutdown_timeout: Duration,
}

impl From<&PlayerConfig> for Settings {
    fn from(config: &PlayerConfig) -> Self {
        Self {
            compensation_step_us: config.compensation_step_us(),
            idle_poll: config.idle_poll(),
            preload_interval: config.preload_interval(),
            shutdown_timeout: config.shutdown_timeout(),
        }
    }
}

/// Everything the worker threads share with the player.
pub(crate) struct Core<T> {
    pub shared: Mutex<state::Shared>,
    pub changed: Condvar,
    pub queue: EventQueue<T>,
    pub settings: Settings,
}

/// Thread ownership and the source cursor; serializes control operations.
struct Control<T> {
    /// The source while no preloader holds it.
    source: Option<BoxedSource<T>>,
    preloader: Option<Preloader<T>>,
    scheduler: Option<Worker<()>>,
    seekable: bool,
}

/// How each worker ended during [`Player::close`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    pub preloader: WorkerExit,
    pub scheduler: WorkerExit,
}

/// Replays events from a source into a handler in real time.
///
/// All methods take `&self`; wrap the player in an `Arc` to control it from
/// several threads.
pub struct Player<T: Send + 'static> {
    core: Arc<Core<T>>,
    control: Mutex<Control<T>>,
}

impl<T: Send + 'static> Player<T> {
    /// Create a stopped player buffering up to `buffer_size` events.
    pub fn new<S, H>(source: S, handler: H, buffer_size: u32) -> Result<Self, PlayerError>
    where
        S: EventSource<T> + 'static,
        H: FnMut(T) -> anyhow::Result<()> + Send + 'static,
    {
        Self::with_config(
            source,
            handler,
            &PlayerConfig::with_buffer_size(buffer_size as usize),
        )
    }

    /// Create a stopped player with explicit settings.
    ///
    /// The scheduler thread starts here and idles until [`play`](Self::play).
    pub fn with_config<S, H>(source: S, handler: H, config: &PlayerConfig) -> Result<Self, PlayerError>
    where
        S: EventSource<T> + 'static,
        H: FnMut(T) -> anyhow::Result<()> + Send + 'static,
    {
        let core = Arc::new(Core {
            shared: Mutex::new(state::Shared::new(config.initial_speed())),
            changed: Condvar::new(),
            queue: EventQueue::new(config.buffer_size()),
            settings: Settings::from(config),
        });

        let seekable = source.is_seekable();
        let handler: Handler<T> = Box::new(handler);
        let scheduler = {
            let core = Arc::clone(&core);
            Worker::spawn("tsplay-scheduler", move || scheduler::run(core, handler))?
        };

        tracing::debug!(
            buffer_size = config.buffer_size(),
            seekable,
            "player created"
        );

        Ok(Self {
            core,
            control: Mutex::new(Control {
                source: Some(Box::new(source)),
                preloader: None,
                scheduler: Some(scheduler),
                seekable,
            }),
        })
    }

    /// Start or resume playback. No-op when already playing.
    pub fn play(&self) -> Result<(), PlayerError> {
        let mut control = self.control.lock();
        self.play_locked(&mut control)
    }

    fn play_locked(&self, control: &mut Control<T>) -> Result<(), PlayerError> {
        {
            let shared = self.core.shared.lock();
            match shared.state {
                PlaybackState::Closed => return Err(PlayerError::Closed),
                PlaybackState::Playing => return Ok(()),
                PlaybackState::Stopped | PlaybackState::Paused => {}
            }
            if let Some(fault) = &shared.fault {
                return Err(PlayerError::HandlerFault(fault.clone()));
            }
        }

        if let Some(source) = control.source.take() {
            match Preloader::spawn(Arc::clone(&self.core), source) {
                Ok(preloader) => control.preloader = Some(preloader),
                Err((err, source)) => {
                    control.source = Some(source);
                    return Err(err);
                }
            }
        }

        let mut shared = self.core.shared.lock();
        shared.start(Instant::now());
        self.core.changed.notify_all();
        tracing::debug!(resume_at = ?shared.anchor.map(|a| a.logical_us), "playing");
        Ok(())
    }

    /// Halt delivery. Idempotent.
    ///
    /// No new delivery begins once this returns; a handler call already in
    /// progress is allowed to finish.
    pub fn pause(&self) {
        let _control = self.control.lock();
        let mut shared = self.core.shared.lock();
        if shared.state == PlaybackState::Playing {
            shared.halt(PlaybackState::Paused, Instant::now());
            self.core.changed.notify_all();
            tracing::debug!(position_us = ?shared.resume_at, "paused");
        }
    }

    /// Set the speed factor, clamped to `[MIN_SPEED, MAX_SPEED]`.
    ///
    /// Buffered events are kept. While playing, the timeline is re-anchored
    /// at the current position so pending waits are recomputed.
    pub fn set_speed(&self, factor: f64) {
        let speed = clamp_speed(factor);
        let mut shared = self.core.shared.lock();
        shared.set_speed(speed, Instant::now());
        self.core.changed.notify_all();
        tracing::debug!(requested = factor, speed, "speed changed");
    }

    /// Jump to `target` (logical microseconds) and play from there.
    ///
    /// Fails with [`PlayerError::SeekUnsupported`] before changing anything
    /// when the source cannot seek.
    pub fn seek(&self, target: i64) -> Result<(), PlayerError> {
        let mut control = self.control.lock();
        if self.core.shared.lock().state == PlaybackState::Closed {
            return Err(PlayerError::Closed);
        }
        if !control.seekable {
            return Err(PlayerError::SeekUnsupported);
        }

        {
            let mut shared = self.core.shared.lock();
            shared.halt(PlaybackState::Stopped, Instant::now());
            self.core.changed.notify_all();
        }

        let mut source = match self.reclaim_source(&mut control) {
            Ok(source) => source,
            Err(err) => {
                self.mark_source_lost();
                return Err(err);
            }
        };
        self.core.queue.clear();

        if let Err(err) = source.seek(target) {
            control.source = Some(source);
            return Err(err.into());
        }
        control.source = Some(source);

        {
            let mut shared = self.core.shared.lock();
            shared.resume_at = Some(target);
            shared.drift_us = 0;
        }
        tracing::debug!(target, "seeked");
        self.play_locked(&mut control)
    }

    /// Take the source back from a running or finished preloader.
    fn reclaim_source(&self, control: &mut Control<T>) -> Result<BoxedSource<T>, PlayerError> {
        if let Some(source) = control.source.take() {
            return Ok(source);
        }
        let preloader = control.preloader.take().ok_or(PlayerError::SourceLost)?;
        preloader
            .stop(self.core.settings.shutdown_timeout)
            .map_err(|_| PlayerError::SourceLost)
    }

    /// Record that the source is gone for good.
    ///
    /// Moving the session on keeps a detached preloader from overwriting the
    /// status, so waiters treat the timeline as finished once the queue is
    /// empty.
    fn mark_source_lost(&self) {
        self.core.queue.clear();
        let mut shared = self.core.shared.lock();
        shared.preload_session = shared.preload_session.wrapping_add(1);
        shared.source =
            SourceStatus::Failed("event source lost: preloader did not stop in time".into());
        self.core.changed.notify_all();
        tracing::warn!("event source lost during seek");
    }

    /// Stop playback for good and shut the worker threads down.
    ///
    /// The preloader is stopped first so nothing refills the queue, then
    /// the scheduler. Each gets the configured shutdown timeout before it is
    /// detached. Safe to call repeatedly and from any state.
    pub fn close(&self) -> ShutdownReport {
        let mut control = self.control.lock();
        {
            let mut shared = self.core.shared.lock();
            if shared.state != PlaybackState::Closed {
                shared.halt(PlaybackState::Closed, Instant::now());
            }
            self.core.changed.notify_all();
        }

        let timeout = self.core.settings.shutdown_timeout;
        let preloader = match control.preloader.take() {
            Some(preloader) => match preloader.stop(timeout) {
                Ok(_) => WorkerExit::Joined,
                Err(exit) => exit,
            },
            None => WorkerExit::NotRunning,
        };
        control.source = None;
        self.core.queue.clear();

        let scheduler = match control.scheduler.take() {
            Some(worker) => match worker.join_timeout(timeout) {
                Ok(()) => WorkerExit::Joined,
                Err(exit) => exit,
            },
            None => WorkerExit::NotRunning,
        };

        if preloader != WorkerExit::NotRunning || scheduler != WorkerExit::NotRunning {
            tracing::debug!(?preloader, ?scheduler, "player closed");
        }
        ShutdownReport {
            preloader,
            scheduler,
        }
    }

    /// Block until every event has been delivered.
    ///
    /// Returns `true` once the source is exhausted (or failed), the queue is
    /// empty and no handler call is running. Returns `false` if `timeout`
    /// elapses or playback stops (pause, fault, close) first.
    pub fn wait_until_drained(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut shared = self.core.shared.lock();
        loop {
            if shared.state != PlaybackState::Playing {
                return false;
            }
            if shared.source.is_finished() && !shared.delivering && self.core.queue.is_empty() {
                return true;
            }
            if self.core.changed.wait_until(&mut shared, deadline).timed_out() {
                return shared.source.is_finished()
                    && !shared.delivering
                    && self.core.queue.is_empty();
            }
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.core.shared.lock().state
    }

    pub fn speed(&self) -> f64 {
        self.core.shared.lock().speed
    }

    /// Snapshot of the player's counters and status.
    pub fn stats(&self) -> PlayerStats {
        let shared = self.core.shared.lock();
        PlayerStats {
            state: shared.state,
            speed: shared.speed,
            drift_us: shared.drift_us,
            delivered: shared.delivered,
            queued: self.core.queue.len(),
            position_us: shared.position_at(Instant::now()),
            source: shared.source.clone(),
        }
    }

    /// The read failure that stopped the preloader, if any.
    pub fn source_error(&self) -> Option<String> {
        match &self.core.shared.lock().source {
            SourceStatus::Failed(message) => Some(message.clone()),
            _ => None,
        }
    }

    /// Return the pending handler fault, clearing it so playback can resume.
    pub fn take_fault(&self) -> Option<String> {
        self.core.shared.lock().fault.take()
    }
}

impl<T: Send + 'static> Drop for Player<T> {
    fn drop(&mut self) {
        self.close();
    }
}
