//! Blocking bounded FIFO queue for inter-thread hand-off.
//!
//! A mutex-and-condvar bounded queue with a non-blocking producer side and a
//! blocking (or timed-blocking) consumer side.
//!
//! # Overview
//!
//! - [`BoundedQueue::push`] - never blocks; a full queue rejects the value
//!   and hands it back to the caller (drop-newest)
//! - [`BoundedQueue::pop`] - blocks while empty
//! - [`BoundedQueue::timed_pop`] - blocks up to an absolute deadline
//! - [`BoundedQueue::try_pop`] - never blocks
//!
//! # Example
//!
//! ```
//! use pdu_relay::BoundedQueue;
//!
//! let queue = BoundedQueue::new(16);
//!
//! queue.push(42u64).expect("queue has room");
//! assert_eq!(queue.try_pop(), Some(42));
//! ```

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use minstant::Instant;

/// Thread-safe bounded FIFO of fixed capacity.
///
/// One mutex guards the contents; a condvar wakes consumers. Every push that
/// stores an element signals one waiter, and every pop removes exactly one
/// element, so return order is strictly FIFO regardless of how many threads
/// are waiting.
pub struct BoundedQueue<T> {
    inner: Mutex<VecDeque<T>>,
    available: Condvar,
    capacity: usize,
    near_full: usize,
}

impl<T> BoundedQueue<T> {
    /// Creates a queue holding at most `capacity` elements.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Queue capacity must be greater than 0");
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            available: Condvar::new(),
            capacity,
            near_full: capacity * 98 / 100,
        }
    }

    /// Attempts to insert `value` at the tail. Never blocks.
    ///
    /// # Errors
    ///
    /// Returns `Err(value)` if the queue is full; the value is not stored.
    pub fn push(&self, value: T) -> Result<(), T> {
        let mut queue = self.inner.lock().unwrap();
        if queue.len() >= self.capacity {
            return Err(value);
        }
        queue.push_back(value);
        drop(queue);
        self.available.notify_one();
        Ok(())
    }

    /// Removes and returns the head element, blocking while the queue is
    /// empty.
    ///
    /// Emptiness is re-checked after every wakeup, so spurious wakeups never
    /// produce a phantom element.
    pub fn pop(&self) -> T {
        let mut queue = self.inner.lock().unwrap();
        loop {
            if let Some(value) = queue.pop_front() {
                return value;
            }
            queue = self.available.wait(queue).unwrap();
        }
    }

    /// As [`pop`](Self::pop), giving up once `timeout` has elapsed.
    ///
    /// The absolute deadline is computed once at entry; waits are re-issued
    /// for the remaining slice after every wakeup, so neither spurious
    /// wakeups nor repeated waits stretch the total wait beyond `timeout`.
    /// Returns `None` only if the deadline passed with the queue still
    /// empty.
    #[must_use]
    pub fn timed_pop(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut queue = self.inner.lock().unwrap();
        loop {
            if let Some(value) = queue.pop_front() {
                return Some(value);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _timed_out) = self
                .available
                .wait_timeout(queue, deadline.duration_since(now))
                .unwrap();
            queue = guard;
        }
    }

    /// Removes and returns the head element if one is present. Never blocks.
    #[must_use]
    pub fn try_pop(&self) -> Option<T> {
        self.inner.lock().unwrap().pop_front()
    }

    /// Number of elements currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    /// True when no elements are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }

    /// Maximum number of elements, fixed at construction.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// True once the queue holds more than 98% of its capacity.
    ///
    /// A non-consuming signal for upstream flow-control decisions; it does
    /// not alter queue behavior.
    #[must_use]
    pub fn is_almost_full(&self) -> bool {
        self.inner.lock().unwrap().len() > self.near_full
    }
}
