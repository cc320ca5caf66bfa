//! Background worker keeping the event queue topped up.
//!
//! The preloader owns the source cursor while it runs. It pulls events until
//! the queue holds `target` of them, sleeps for the fill interval, and
//! repeats until the source ends, a read fails, or it is told to stop. The
//! source is handed back when the thread finishes so a later seek can reuse
//! it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::state::SourceStatus;
use super::worker::{Worker, WorkerExit};
use super::Core;
use crate::error::PlayerError;
use crate::source::EventSource;

pub(crate) type BoxedSource<T> = Box<dyn EventSource<T>>;

pub(crate) struct Preloader<T> {
    running: Arc<AtomicBool>,
    worker: Worker<Option<BoxedSource<T>>>,
}

impl<T: Send + 'static> Preloader<T> {
    /// Start filling `core.queue` from `source`.
    ///
    /// The source is handed to the thread only once it is running, so a
    /// failed spawn gives it back to the caller.
    pub fn spawn(
        core: Arc<Core<T>>,
        source: BoxedSource<T>,
    ) -> Result<Self, (PlayerError, BoxedSource<T>)> {
        let (handoff, inbox) = mpsc::channel::<(BoxedSource<T>, u64)>();
        let running = Arc::new(AtomicBool::new(true));
        let spawned = {
            let core = Arc::clone(&core);
            let running = Arc::clone(&running);
            Worker::spawn("tsplay-preload", move || {
                let (source, session) = inbox.recv().ok()?;
                Some(fill_loop(&core, source, &running, session))
            })
        };
        let worker = match spawned {
            Ok(worker) => worker,
            Err(err) => return Err((err, source)),
        };

        let session = {
            let mut shared = core.shared.lock();
            shared.preload_session = shared.preload_session.wrapping_add(1);
            shared.source = SourceStatus::Running;
            shared.preload_session
        };
        // The thread blocks on the handoff, so the receiver is alive here.
        if let Err(mpsc::SendError((source, _))) = handoff.send((source, session)) {
            core.shared.lock().source = SourceStatus::Idle;
            return Err((PlayerError::SourceLost, source));
        }
        Ok(Self { running, worker })
    }

    /// Signal shutdown and wait for the source to be handed back.
    pub fn stop(self, timeout: Duration) -> Result<BoxedSource<T>, WorkerExit> {
        self.running.store(false, Ordering::Release);
        self.worker.join_timeout(timeout)?.ok_or(WorkerExit::Detached)
    }
}

fn fill_loop<T>(
    core: &Core<T>,
    mut source: BoxedSource<T>,
    running: &AtomicBool,
    session: u64,
) -> BoxedSource<T> {
    let target = core.queue.capacity();
    let mut pulled = 0u64;

    let outcome = 'fill: loop {
        if !running.load(Ordering::Acquire) {
            break SourceStatus::Idle;
        }

        while core.queue.len() < target {
            match source.next_event() {
                Ok(Some(event)) => {
                    if !core.queue.offer(event, running) {
                        break 'fill SourceStatus::Idle;
                    }
                    pulled += 1;
                }
                Ok(None) => break 'fill SourceStatus::Exhausted,
                Err(err) => {
                    tracing::warn!(error = %err, "event source failed, preloader stopping");
                    break 'fill SourceStatus::Failed(err.to_string());
                }
            }
        }

        thread::sleep(core.settings.preload_interval);
    };

    tracing::debug!(pulled, status = ?outcome, "preloader finished");

    let mut shared = core.shared.lock();
    if shared.preload_session == session {
        shared.source = outcome;
        core.changed.notify_all();
    }
    drop(shared);

    source
}
