//! Synchronization primitives for routines.
//!
//! A [`Semaphore`] is the base primitive: a ticket counter plus a
//! waiter list of weak slot references. Posting never touches another
//! worker's state; it elects a waiter and sends that waiter's worker a
//! command. [`channel`] builds bounded channels out of two semaphores
//! and a buffer.
//!
//! All waiting operations suspend only the calling routine.

pub(crate) mod channel;
pub(crate) mod semaphore;

pub use channel::{Receiver, Sender, channel};
pub use semaphore::Semaphore;

pub(crate) use channel::channel_with_engine;
