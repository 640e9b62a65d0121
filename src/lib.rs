//! Real-time PDU hand-off between a hard-deadline radio receive path and
//! asynchronously scheduled upper-layer processing.
//!
//! The receive path obtains pre-allocated buffers from a fixed pool, fills
//! them in place, and enqueues them without ever blocking; overload is
//! resolved by dropping, never by stalling the radio. The upper layer drains
//! queued PDUs at its own pace through a registered [`PduProcessor`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use pdu_relay::{LogicalChannel, PduProcessor, PduQueue};
//!
//! struct Sink;
//!
//! impl PduProcessor for Sink {
//!     fn process_pdu(&self, pdu: &[u8], channel: LogicalChannel) {
//!         println!("{channel:?}: {} bytes", pdu.len());
//!     }
//! }
//!
//! let queue = PduQueue::new(8, 64);
//! queue.init(Arc::new(Sink));
//!
//! // Radio receive path: grab, fill, hand off. Never blocks.
//! let mut pdu = queue.request(4).expect("pool has free buffers");
//! pdu.as_mut_slice().copy_from_slice(&[1, 2, 3, 4]);
//! queue.push(pdu, 4, LogicalChannel::Dch);
//!
//! // Upper layer: drain whatever is queued.
//! assert!(queue.process_pdus());
//! ```

pub mod pdu;
pub mod pool;
pub mod sync;
mod trace;

pub use pdu::{
    DEFAULT_MAX_PDU_LEN, DEFAULT_POOL_CAPACITY, LogicalChannel, PduProcessor, PduQueue,
    PduQueueStats,
};
pub use pool::{BufferPool, PduBuffer, PoolError};
pub use sync::blocking::BoundedQueue;
pub use trace::init_tracing;
