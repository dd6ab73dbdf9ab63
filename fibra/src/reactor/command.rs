use crate::reactor::event::Direction;
use crate::worker::ThreadId;

use std::os::fd::RawFd;

/// Destination of a readiness event: the worker and arena slot that
/// registered the wait.
#[derive(Clone, Copy)]
pub(crate) struct Tag {
    pub(crate) thread: ThreadId,
    pub(crate) slot: usize,
}

/// A message consumed by the reactor thread.
pub(crate) enum Command {
    /// Arm (or re-arm) interest in one direction of a descriptor.
    Register {
        fd: RawFd,
        direction: Direction,
        tag: Tag,
    },

    /// Drop interest in one direction, typically because the wait lost
    /// its event round.
    Unregister { fd: RawFd, direction: Direction },

    /// Stop the reactor thread.
    Shutdown,
}
