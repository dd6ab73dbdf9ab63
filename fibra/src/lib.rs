//! # Fibra
//!
//! **Fibra** is a lightweight M:N coroutine runtime for Rust, designed as the
//! dedicated concurrency layer for the **Nebula** ecosystem.
//!
//! Unlike future-based runtimes, Fibra multiplexes stackful *routines* over a
//! fixed pool of worker threads: blocking-looking code (read, write, accept,
//! sleep, channel operations) suspends only the calling routine, never its
//! worker thread. Each worker runs its own event loop integrating timers,
//! fd readiness and in-process synchronization into a single wait mechanism,
//! with no locks on the hot path.
//!
//! Fibra is built from the ground up with simplicity and performance in mind,
//! offering:
//!
//! - A **fixed worker pool** with cooperative, thread-pinned routines
//! - **Multi-way waits**: one routine waiting on several fds, timers and
//!   semaphores at once, resolved to exactly one winner
//! - **Suspending I/O** wrappers that retry non-blocking system calls
//! - **Semaphores and bounded channels** that never block a worker
//! - **Ergonomic macros** like `#[fibra::main]` and `#[fibra::test]`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::time::Duration;
//!
//! #[fibra::main]
//! fn main(ctx: &mut fibra::Context) {
//!     // Spawn a background routine
//!     ctx.spawn(|ctx| {
//!         fibra::time::sleep(ctx, Duration::from_millis(100));
//!         println!("routine completed!");
//!     });
//! }
//! ```
//!
//! ## Modules
//!
//! - [`io`] — Suspending wrappers around non-blocking system calls
//! - [`sync`] — Semaphores and bounded channels
//! - [`time`] — Sleeping without blocking a worker
//!
//! ## Getting Started
//!
//! Add Fibra to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! fibra = { git = "https://github.com/nebula-platform/fibra", package = "fibra" }
//! ```

mod engine;
mod error;
mod reactor;
mod routine;
mod utils;
mod worker;

pub mod io;
pub mod sync;
pub mod time;

pub use engine::{Engine, EngineBuilder, run};
pub use error::WaitError;
pub use routine::{Context, EventResult, EventRound, EventStatus, RoutineId};
pub use worker::ThreadId;

pub use fibra_macros::*;
