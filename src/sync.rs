//! Synchronization primitives for in-process communication.
//!
//! This module provides the thread-safe bounded queue used to hand PDUs
//! from the receive path to the consumer.

pub mod blocking;
