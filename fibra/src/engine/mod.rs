//! Engine: ownership and coordination of the worker pool.
//!
//! The engine owns the fixed set of workers and the reactor, routes new
//! routines and cross-worker notifications, and aggregates per-worker
//! status reports to decide process-wide completion.

pub(crate) mod builder;
pub(crate) mod core;

pub use self::builder::EngineBuilder;
pub use self::core::{Engine, run};
