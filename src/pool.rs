//! Fixed-capacity buffer pool for allocation-free PDU storage.
//!
//! All storage is allocated once at construction; the request path only
//! moves buffers between the free list and the caller. A [`PduBuffer`] owns
//! its bytes for as long as it is out of the pool, so the
//! pool → producer → queue → consumer → pool ownership chain is enforced by
//! moves rather than by convention.

use std::sync::Mutex;

use thiserror::Error;

use crate::pdu::LogicalChannel;

/// Errors returned by [`BufferPool`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    /// No free buffer remains. Real-time callers must treat this as a drop;
    /// the pool never blocks waiting for a return.
    #[error("buffer pool exhausted")]
    Exhausted,
    /// The requested length exceeds the per-buffer capacity.
    #[error("requested {requested} bytes, buffer capacity is {capacity}")]
    LenExceedsCapacity {
        /// Length the caller asked for.
        requested: usize,
        /// Fixed capacity of every buffer in the pool.
        capacity: usize,
    },
    /// The buffer was handed out by a different pool.
    #[error("buffer belongs to a different pool")]
    ForeignBuffer,
    /// The buffer's slot is already free. A release through a stale handle
    /// is rejected rather than corrupting the free list.
    #[error("slot {slot} is already free")]
    SlotAlreadyFree {
        /// Slot index carried by the rejected handle.
        slot: usize,
    },
}

/// A pooled PDU buffer.
///
/// Carries its payload bytes, the current length, and the logical-channel
/// tag stamped at hand-off time. The slice accessors expose only the current
/// length, never the full capacity.
#[derive(Debug)]
pub struct PduBuffer {
    bytes: Box<[u8]>,
    len: usize,
    channel: LogicalChannel,
    slot: usize,
    pool_tag: u32,
}

impl PduBuffer {
    fn new(slot: usize, pool_tag: u32, capacity: usize) -> Self {
        Self {
            bytes: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
            channel: LogicalChannel::default(),
            slot,
            pool_tag,
        }
    }

    /// Payload bytes up to the current length.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// Mutable payload bytes up to the current length.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes[..self.len]
    }

    /// Current payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the payload length is zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Fixed storage capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// Logical channel stamped on this PDU.
    #[must_use]
    pub fn channel(&self) -> LogicalChannel {
        self.channel
    }

    pub(crate) fn set_len(&mut self, len: usize) {
        debug_assert!(len <= self.bytes.len());
        self.len = len;
    }

    pub(crate) fn set_channel(&mut self, channel: LogicalChannel) {
        self.channel = channel;
    }
}

struct PoolState {
    free: Vec<PduBuffer>,
    in_use: Box<[bool]>,
}

/// Fixed set of pre-allocated, fixed-size buffers.
///
/// `request` and `deallocate` are safe to call from different threads
/// concurrently; the critical section covers only free-list bookkeeping.
/// Payload bytes travel inside the moved [`PduBuffer`] and are never touched
/// under the pool lock.
pub struct BufferPool {
    state: Mutex<PoolState>,
    tag: u32,
    capacity: usize,
    max_pdu_len: usize,
}

impl BufferPool {
    /// Creates a pool of `capacity` buffers of `max_pdu_len` bytes each.
    ///
    /// Every buffer is allocated here; nothing on the request path
    /// allocates.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` or `max_pdu_len` is 0.
    #[must_use]
    pub fn new(capacity: usize, max_pdu_len: usize) -> Self {
        assert!(capacity > 0, "Pool capacity must be greater than 0");
        assert!(max_pdu_len > 0, "Buffer capacity must be greater than 0");

        // Random tag so a buffer released into the wrong pool is detected
        // even across pools of identical shape.
        let tag: u32 = rand::random();
        let free = (0..capacity)
            .map(|slot| PduBuffer::new(slot, tag, max_pdu_len))
            .collect();

        Self {
            state: Mutex::new(PoolState {
                free,
                in_use: vec![false; capacity].into_boxed_slice(),
            }),
            tag,
            capacity,
            max_pdu_len,
        }
    }

    /// Hands out exclusive ownership of one free buffer, its length set to
    /// `len`. Never blocks.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::LenExceedsCapacity`] if `len` does not fit a
    /// pooled buffer (no buffer is consumed), or [`PoolError::Exhausted`]
    /// if the free list is empty.
    pub fn request(&self, len: usize) -> Result<PduBuffer, PoolError> {
        if len > self.max_pdu_len {
            return Err(PoolError::LenExceedsCapacity {
                requested: len,
                capacity: self.max_pdu_len,
            });
        }

        let mut buf = {
            let mut state = self.state.lock().unwrap();
            let buf = state.free.pop().ok_or(PoolError::Exhausted)?;
            state.in_use[buf.slot] = true;
            buf
        };

        buf.set_len(len);
        buf.set_channel(LogicalChannel::default());
        Ok(buf)
    }

    /// Returns `buf` to the free list.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::ForeignBuffer`] if `buf` was not handed out by
    /// this pool, or [`PoolError::SlotAlreadyFree`] if its slot is not
    /// marked in-use. The free list is untouched in both cases; the rejected
    /// buffer is dropped.
    pub fn deallocate(&self, buf: PduBuffer) -> Result<(), PoolError> {
        if buf.pool_tag != self.tag || buf.slot >= self.capacity {
            return Err(PoolError::ForeignBuffer);
        }

        let mut state = self.state.lock().unwrap();
        if !state.in_use[buf.slot] {
            return Err(PoolError::SlotAlreadyFree { slot: buf.slot });
        }
        state.in_use[buf.slot] = false;
        state.free.push(buf);
        Ok(())
    }

    /// Number of buffers currently on the free list.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.state.lock().unwrap().free.len()
    }

    /// Number of buffers currently handed out.
    ///
    /// Counted from the per-slot flags, independently of the free list, so
    /// `free_count() + in_use_count()` genuinely observes the conservation
    /// invariant.
    #[must_use]
    pub fn in_use_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .in_use
            .iter()
            .filter(|used| **used)
            .count()
    }

    /// Total number of buffers, fixed at construction.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Fixed per-buffer capacity in bytes.
    #[must_use]
    pub const fn max_pdu_len(&self) -> usize {
        self.max_pdu_len
    }
}
