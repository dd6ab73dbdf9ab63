//! Routine state machine and suspension protocol.
//!
//! A routine is a resumable execution context backed by its own stack.
//! This module owns:
//! - the routine status machine driven by the worker loop,
//! - the event-round protocol used by every suspending operation,
//! - the stack-switch boundary (all low-level coroutine mechanics stay
//!   behind [`core::Routine::resume`] and [`context::Context`]).
//!
//! Runtime users only see [`context::Context`], [`context::EventRound`]
//! and the result types; everything else is internal to the scheduler.

pub(crate) mod context;
pub(crate) mod core;

pub use self::context::{Context, EventRound};
pub use self::core::{EventResult, EventStatus, RoutineId};
