//! Worker threads and their scheduling loops.
//!
//! Each worker owns its slot arena, timer set, ready queue and bounded
//! command queue, and runs the event loop that multiplexes routines over
//! the thread. Everything inside a worker is single-threaded; other
//! threads interact with it exclusively by pushing commands and waking
//! its blocker.

pub(crate) mod blocker;
pub(crate) mod command;
pub(crate) mod core;
pub(crate) mod timer;

/// Index of a worker thread inside the engine's fixed pool.
pub type ThreadId = usize;
