//! Bounded, thread-safe priority queue of timestamped events.
//!
//! Events are kept in a `BTreeMap` keyed by `(timestamp, sequence)` where the
//! sequence number is assigned on insertion. The smallest key is always the
//! next event to deliver, and events sharing a timestamp come out in the
//! order they went in.
//!
//! Every operation takes the queue lock exactly once, so pushes, pops and
//! clears are linearizable with respect to each other.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, MappedMutexGuard, Mutex, MutexGuard};

use crate::event::TimestampedEvent;

/// How long a cancellable push sleeps before re-checking its running flag.
const OFFER_RECHECK: Duration = Duration::from_millis(10);

struct Inner<T> {
    items: BTreeMap<(i64, u64), TimestampedEvent<T>>,
    next_seq: u64,
}

/// Min-ordered event buffer shared by the preloader and the scheduler.
pub struct EventQueue<T> {
    inner: Mutex<Inner<T>>,
    capacity: usize,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> EventQueue<T> {
    /// Create a queue holding at most `capacity` events (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: BTreeMap::new(),
                next_seq: 0,
            }),
            capacity: capacity.max(1),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    /// Insert an event, blocking while the queue is full.
    pub fn push(&self, event: TimestampedEvent<T>) {
        let mut guard = self.inner.lock();
        while guard.items.len() >= self.capacity {
            self.not_full.wait(&mut guard);
        }
        self.insert(&mut guard, event);
    }

    /// Insert an event unless `running` is cleared first.
    ///
    /// Blocks while the queue is full. The flag is read under the queue lock,
    /// so once the owner clears it and takes the lock itself (for example to
    /// clear the queue) no further event can slip in. Returns `false` when the
    /// event was not inserted.
    pub fn offer(&self, event: TimestampedEvent<T>, running: &AtomicBool) -> bool {
        let mut guard = self.inner.lock();
        loop {
            if !running.load(Ordering::Acquire) {
                return false;
            }
            if guard.items.len() < self.capacity {
                break;
            }
            self.not_full.wait_for(&mut guard, OFFER_RECHECK);
        }
        self.insert(&mut guard, event);
        true
    }

    fn insert(&self, guard: &mut MutexGuard<'_, Inner<T>>, event: TimestampedEvent<T>) {
        let seq = guard.next_seq;
        guard.next_seq += 1;
        guard.items.insert((event.timestamp(), seq), event);
        self.not_empty.notify_all();
    }

    /// Remove and return the earliest event.
    pub fn pop_min(&self) -> Option<TimestampedEvent<T>> {
        let mut guard = self.inner.lock();
        let popped = guard.items.pop_first().map(|(_, event)| event);
        if popped.is_some() {
            self.not_full.notify_one();
        }
        popped
    }

    /// Borrow the earliest event.
    ///
    /// The returned guard holds the queue lock; drop it before calling any
    /// other queue method from the same thread.
    pub fn peek_min(&self) -> Option<MappedMutexGuard<'_, TimestampedEvent<T>>> {
        MutexGuard::try_map(self.inner.lock(), |inner| inner.items.values_mut().next()).ok()
    }

    /// Timestamp of the earliest event, if any.
    pub fn peek_timestamp(&self) -> Option<i64> {
        self.inner
            .lock()
            .items
            .first_key_value()
            .map(|(&(timestamp, _), _)| timestamp)
    }

    /// Drop every buffered event and wake blocked pushers.
    pub fn clear(&self) {
        let mut guard = self.inner.lock();
        guard.items.clear();
        self.not_full.notify_all();
    }

    /// Park until the queue holds at least one event or `timeout` elapses.
    ///
    /// Returns whether the queue is non-empty on return.
    pub fn wait_for_event(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.inner.lock();
        while guard.items.is_empty() {
            if self.not_empty.wait_until(&mut guard, deadline).timed_out() {
                break;
            }
        }
        !guard.items.is_empty()
    }
}
