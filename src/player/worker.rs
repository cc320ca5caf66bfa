//! Named background threads with a bounded join.
//!
//! Each worker owns the sending half of a channel that is dropped when its
//! thread finishes (normally or by panic). Joining waits on the receiving
//! half with a timeout, so a stuck thread can be detached instead of
//! blocking the caller forever.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::PlayerError;

/// How a worker ended when it was asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// There was no thread to stop
    NotRunning,
    /// The thread finished and was joined
    Joined,
    /// The thread did not finish in time (or panicked) and was abandoned
    Detached,
}

pub(crate) struct Worker<R> {
    name: &'static str,
    handle: JoinHandle<R>,
    done_rx: Receiver<()>,
}

impl<R: Send + 'static> Worker<R> {
    pub fn spawn<F>(name: &'static str, body: F) -> Result<Self, PlayerError>
    where
        F: FnOnce() -> R + Send + 'static,
    {
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _done = done_tx;
                body()
            })
            .map_err(|source| PlayerError::Spawn { name, source })?;

        tracing::debug!(worker = name, "spawned worker");
        Ok(Self {
            name,
            handle,
            done_rx,
        })
    }

    /// Wait up to `timeout` for the thread to end and collect its result.
    pub fn join_timeout(self, timeout: Duration) -> Result<R, WorkerExit> {
        match self.done_rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    worker = self.name,
                    timeout_ms = timeout.as_millis() as u64,
                    "worker unresponsive, detaching"
                );
                Err(WorkerExit::Detached)
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => match self.handle.join() {
                Ok(result) => {
                    tracing::debug!(worker = self.name, "worker joined");
                    Ok(result)
                }
                Err(_) => {
                    tracing::warn!(worker = self.name, "worker panicked");
                    Err(WorkerExit::Detached)
                }
            },
        }
    }
}
