//! Readiness multiplexer.
//!
//! The reactor runs on its own thread and owns the platform poller plus
//! the per-fd registration table. Workers register interest through the
//! reactor's command channel; when a descriptor becomes ready, the
//! reactor routes an `FdReady` command into the owning worker's queue
//! and wakes that worker.
//!
//! Registrations are one-shot per direction: a delivered event clears
//! its tag, and the waiting routine re-registers if it needs to wait
//! again. Workers never see the poller, and the reactor never touches a
//! worker's arena.

pub(crate) mod command;
pub(crate) mod core;
pub(crate) mod event;
pub(crate) mod poller;

pub(crate) use self::core::ReactorHandle;
