//! Logical-channel PDU hand-off between the radio receive path and
//! upper-layer processing.
//!
//! Responsibilities:
//! - Hand pre-allocated buffers to the receive path ([`PduQueue::request`]).
//! - Accept filled PDUs without blocking, dropping under overload
//!   ([`PduQueue::push`]).
//! - Drain queued PDUs in FIFO order into the registered processor
//!   ([`PduQueue::process_pdus`]).
//! - Flush stale PDUs across reconfiguration boundaries
//!   ([`PduQueue::reset`]).
//!
//! The producer side is bounded in time: neither `request` nor `push` can
//! suspend, and overload degrades to counted drops rather than backpressure
//! on the radio.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use crate::pool::{BufferPool, PduBuffer};
use crate::sync::blocking::BoundedQueue;
use crate::trace::{debug, error, info, trace, warn};

/// Number of PDU buffers in the default pool.
pub const DEFAULT_POOL_CAPACITY: usize = 128;

/// Default per-buffer capacity: 150 Mbit/s worth of payload per 1 ms
/// transmission interval.
pub const DEFAULT_MAX_PDU_LEN: usize = 150 * 1024 / 8;

/// Logical channel tag carried by every PDU.
///
/// The hand-off queues and drains all three identically; only the registered
/// [`PduProcessor`] interprets the tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LogicalChannel {
    /// Ordinary data logical channels.
    #[default]
    Dch,
    /// Broadcast/system-information content.
    Bch,
    /// Multicast content.
    Mch,
}

/// Consumer capability invoked once per drained PDU.
///
/// Registered exactly once via [`PduQueue::init`] and always called outside
/// the queue and pool locks.
pub trait PduProcessor: Send + Sync {
    /// Processes one PDU. `pdu` is the payload truncated to the length given
    /// at push time.
    fn process_pdu(&self, pdu: &[u8], channel: LogicalChannel);
}

/// Snapshot of hand-off counters, taken with [`PduQueue::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PduQueueStats {
    /// PDUs accepted into the queue.
    pub pushed: u64,
    /// PDUs dispatched to the processor.
    pub processed: u64,
    /// PDUs lost to pool exhaustion, oversized requests, or a full queue.
    pub dropped: u64,
    /// Operations attempted before `init`, plus repeated `init` calls.
    pub config_errors: u64,
}

#[derive(Default)]
struct Counters {
    pushed: AtomicU64,
    processed: AtomicU64,
    dropped: AtomicU64,
    config_errors: AtomicU64,
}

/// Packet hand-off between one real-time producer and one asynchronous
/// consumer.
///
/// Composes a [`BufferPool`] and a [`BoundedQueue`] of equal capacity, so
/// in-flight PDUs can never outnumber physical buffers. Ownership transfers
/// by move: after a successful [`push`](Self::push) the producer no longer
/// holds the buffer, and the consumer returns each buffer to the pool as
/// part of the drain.
pub struct PduQueue {
    pool: BufferPool,
    queue: BoundedQueue<PduBuffer>,
    processor: OnceLock<Arc<dyn PduProcessor>>,
    counters: Counters,
}

impl PduQueue {
    /// Creates a hand-off with `pool_capacity` buffers of `max_pdu_len`
    /// bytes each.
    ///
    /// # Panics
    ///
    /// Panics if `pool_capacity` or `max_pdu_len` is 0.
    #[must_use]
    pub fn new(pool_capacity: usize, max_pdu_len: usize) -> Self {
        Self::with_capacities(pool_capacity, pool_capacity, max_pdu_len)
    }

    fn with_capacities(pool_capacity: usize, queue_capacity: usize, max_pdu_len: usize) -> Self {
        Self {
            pool: BufferPool::new(pool_capacity, max_pdu_len),
            queue: BoundedQueue::new(queue_capacity),
            processor: OnceLock::new(),
            counters: Counters::default(),
        }
    }

    /// Registers the consumer capability.
    ///
    /// Must be called once before [`push`](Self::push) and
    /// [`process_pdus`](Self::process_pdus) do anything useful. A second
    /// registration is counted as a configuration error and ignored; the
    /// first processor stays in place.
    pub fn init(&self, processor: Arc<dyn PduProcessor>) {
        if self.processor.set(processor).is_err() {
            self.counters.config_errors.fetch_add(1, Ordering::Relaxed);
            warn!("processor already registered, ignoring");
        } else {
            info!("processor registered");
        }
    }

    /// Hands out a free buffer sized for `len` payload bytes. Never blocks.
    ///
    /// Returns `None` when the pool is exhausted or `len` exceeds the
    /// per-buffer capacity; the drop is counted and the caller must not
    /// push.
    #[must_use]
    pub fn request(&self, len: usize) -> Option<PduBuffer> {
        match self.pool.request(len) {
            Ok(buf) => Some(buf),
            Err(_e) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(requested = len, error = %_e, "buffer request failed, dropping");
                None
            }
        }
    }

    /// Stamps the final length and channel on `buf` and enqueues it. Never
    /// blocks.
    ///
    /// `len` may be smaller than the length granted at request time (the
    /// actual received size); a length past the buffer capacity is clamped.
    /// If the queue is full the buffer goes straight back to the pool and
    /// the drop is counted; backpressure never reaches the producer beyond
    /// the counter. Returns `true` iff the PDU was queued.
    pub fn push(&self, mut buf: PduBuffer, len: usize, channel: LogicalChannel) -> bool {
        if self.processor.get().is_none() {
            self.counters.config_errors.fetch_add(1, Ordering::Relaxed);
            warn!("push before init, returning buffer to pool");
            self.release(buf);
            return false;
        }

        let capacity = buf.capacity();
        if len > capacity {
            warn!(len, capacity, "push length exceeds buffer capacity, clamping");
            buf.set_len(capacity);
        } else {
            buf.set_len(len);
        }
        buf.set_channel(channel);

        match self.queue.push(buf) {
            Ok(()) => {
                self.counters.pushed.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(buf) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(channel = ?channel, "queue full, dropping PDU");
                self.release(buf);
                false
            }
        }
    }

    /// Returns a requested-but-never-pushed buffer to the pool.
    ///
    /// The producer-side abandon path: a grant whose payload never
    /// materialized (a failed decode, a filtered packet) goes back here
    /// instead of through the queue.
    pub fn deallocate(&self, buf: PduBuffer) {
        self.release(buf);
    }

    /// Drains every PDU currently queued, dispatching each to the processor
    /// and returning its buffer to the pool.
    ///
    /// The drain is non-blocking: once the queue is observed empty the call
    /// returns rather than waiting for new arrivals. The processor runs
    /// outside all locks. Returns `true` iff at least one PDU was
    /// dispatched; dispatch order equals push order.
    pub fn process_pdus(&self) -> bool {
        let Some(processor) = self.processor.get() else {
            self.counters.config_errors.fetch_add(1, Ordering::Relaxed);
            warn!("process_pdus before init");
            return false;
        };

        let mut any = false;
        while let Some(buf) = self.queue.try_pop() {
            trace!(len = buf.len(), channel = ?buf.channel(), "dispatching PDU");
            processor.process_pdu(buf.as_slice(), buf.channel());
            self.counters.processed.fetch_add(1, Ordering::Relaxed);
            self.release(buf);
            any = true;
        }
        any
    }

    /// Discards every queued PDU without invoking the processor,
    /// returning each buffer to the pool.
    ///
    /// Used to flush stale data across a framing or reconfiguration
    /// boundary.
    pub fn reset(&self) {
        let mut _drained = 0usize;
        while let Some(buf) = self.queue.try_pop() {
            self.release(buf);
            _drained += 1;
        }
        debug!(count = _drained, "queue reset");
    }

    /// True once the queue holds more than 98% of its capacity.
    ///
    /// Upstream can raise its drop priority before hard drops begin; the
    /// signal itself changes nothing.
    #[must_use]
    pub fn is_almost_full(&self) -> bool {
        self.queue.is_almost_full()
    }

    /// Number of free buffers currently in the pool.
    #[must_use]
    pub fn free_buffers(&self) -> usize {
        self.pool.free_count()
    }

    /// Number of buffers currently out of the pool (held by the producer,
    /// the queue, or the consumer).
    #[must_use]
    pub fn in_use_buffers(&self) -> usize {
        self.pool.in_use_count()
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> PduQueueStats {
        PduQueueStats {
            pushed: self.counters.pushed.load(Ordering::Relaxed),
            processed: self.counters.processed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            config_errors: self.counters.config_errors.load(Ordering::Relaxed),
        }
    }

    fn release(&self, buf: PduBuffer) {
        if let Err(_e) = self.pool.deallocate(buf) {
            error!(error = %_e, "buffer release failed");
        }
    }
}

impl Default for PduQueue {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY, DEFAULT_MAX_PDU_LEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(Vec<u8>, LogicalChannel)>>,
    }

    impl PduProcessor for Recorder {
        fn process_pdu(&self, pdu: &[u8], channel: LogicalChannel) {
            self.seen.lock().unwrap().push((pdu.to_vec(), channel));
        }
    }

    #[test]
    fn test_default_channel_is_dch() {
        assert_eq!(LogicalChannel::default(), LogicalChannel::Dch);
    }

    #[test]
    fn test_push_before_init_returns_buffer() {
        let queue = PduQueue::new(4, 16);

        let buf = queue.request(8).unwrap();
        assert_eq!(queue.free_buffers(), 3);

        assert!(!queue.push(buf, 8, LogicalChannel::Dch));
        assert_eq!(queue.free_buffers(), 4);
        assert_eq!(queue.stats().config_errors, 1);
        assert_eq!(queue.stats().pushed, 0);
    }

    #[test]
    fn test_process_before_init_is_a_noop() {
        let queue = PduQueue::new(4, 16);

        assert!(!queue.process_pdus());
        assert_eq!(queue.stats().config_errors, 1);
    }

    #[test]
    fn test_second_init_is_ignored() {
        let queue = PduQueue::new(4, 16);
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());

        queue.init(first.clone());
        queue.init(second.clone());
        assert_eq!(queue.stats().config_errors, 1);

        let buf = queue.request(2).unwrap();
        assert!(queue.push(buf, 2, LogicalChannel::Bch));
        assert!(queue.process_pdus());

        assert_eq!(first.seen.lock().unwrap().len(), 1);
        assert!(second.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_oversized_request_is_counted_drop() {
        let queue = PduQueue::new(4, 16);

        assert!(queue.request(17).is_none());
        assert_eq!(queue.stats().dropped, 1);
        assert_eq!(queue.free_buffers(), 4);
    }

    #[test]
    fn test_full_queue_returns_buffer_to_pool() {
        // Queue capacity below pool capacity so the queue-full path is
        // reachable without exhausting the pool first.
        let queue = PduQueue::with_capacities(4, 2, 16);
        queue.init(Arc::new(Recorder::default()));

        let a = queue.request(1).unwrap();
        let b = queue.request(1).unwrap();
        let c = queue.request(1).unwrap();
        assert!(queue.push(a, 1, LogicalChannel::Dch));
        assert!(queue.push(b, 1, LogicalChannel::Dch));

        let free_before = queue.free_buffers();
        assert!(!queue.push(c, 1, LogicalChannel::Dch));
        assert_eq!(queue.free_buffers(), free_before + 1);
        assert_eq!(queue.stats().dropped, 1);
        assert_eq!(queue.stats().pushed, 2);
    }

    #[test]
    fn test_push_length_may_shrink_grant() {
        let queue = PduQueue::new(2, 16);
        let recorder = Arc::new(Recorder::default());
        queue.init(recorder.clone());

        let mut buf = queue.request(8).unwrap();
        buf.as_mut_slice().copy_from_slice(&[9; 8]);
        assert!(queue.push(buf, 3, LogicalChannel::Mch));
        assert!(queue.process_pdus());

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, vec![9, 9, 9]);
        assert_eq!(seen[0].1, LogicalChannel::Mch);
    }

    #[test]
    fn test_almost_full_signal_passes_through() {
        let queue = PduQueue::new(4, 16);
        queue.init(Arc::new(Recorder::default()));

        assert!(!queue.is_almost_full());
        for _ in 0..4 {
            let buf = queue.request(1).unwrap();
            assert!(queue.push(buf, 1, LogicalChannel::Dch));
        }
        assert!(queue.is_almost_full());

        queue.reset();
        assert!(!queue.is_almost_full());
    }

    #[test]
    fn test_push_length_past_capacity_is_clamped() {
        let queue = PduQueue::new(2, 16);
        let recorder = Arc::new(Recorder::default());
        queue.init(recorder.clone());

        let mut buf = queue.request(16).unwrap();
        buf.as_mut_slice().fill(7);
        assert!(queue.push(buf, 32, LogicalChannel::Dch));
        assert!(queue.process_pdus());

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, vec![7u8; 16]);
    }

    #[test]
    fn test_producer_abandon_path() {
        let queue = PduQueue::new(2, 16);
        queue.init(Arc::new(Recorder::default()));

        let buf = queue.request(8).unwrap();
        queue.deallocate(buf);
        assert_eq!(queue.free_buffers(), 2);
        assert_eq!(queue.in_use_buffers(), 0);
    }

    #[test]
    fn test_default_configuration_constants() {
        let queue = PduQueue::default();
        assert_eq!(queue.free_buffers(), DEFAULT_POOL_CAPACITY);
        assert!(queue.request(DEFAULT_MAX_PDU_LEN).is_some());
        assert!(queue.request(DEFAULT_MAX_PDU_LEN + 1).is_none());
    }
}
