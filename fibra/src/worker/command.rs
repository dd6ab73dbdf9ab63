use crate::reactor::event::Direction;
use crate::routine::core::{RoutineBody, RoutineId};
use crate::sync::semaphore::SemaphoreCore;
use crate::worker::blocker::Blocker;

use std::os::fd::RawFd;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, SyncSender};
use std::sync::{Arc, Weak, mpsc};

use log::trace;

/// Capacity of each worker's inbound command queue.
///
/// Producers block when the queue is full; a dropped command would leak
/// a suspended routine, so backpressure is the only acceptable answer.
pub(crate) const COMMAND_QUEUE_CAPACITY: usize = 128;

/// A message consumed by the owning worker.
///
/// Commands are the only way anything crosses a worker boundary: the
/// engine routes new routines, semaphores forward wake-ups, the reactor
/// re-dispatches fd readiness. The owner applies them to its own arena
/// and queues; producers never touch those structures directly.
pub(crate) enum Command {
    /// Materialize and schedule a new routine on this worker.
    AddRoutine(RoutineSpec),

    /// A semaphore post elected the routine parked at `slot`.
    ///
    /// If the slot was already invalidated by another source, the wake
    /// is forwarded to the semaphore's next waiter instead.
    ScheduleWaiting {
        sema: Weak<SemaphoreCore>,
        slot: usize,
    },

    /// Readiness for `fd` was routed here by the reactor.
    FdReady {
        fd: RawFd,
        slot: usize,
        direction: Direction,
    },

    /// Stop once no routines remain.
    Finish,
}

/// A not-yet-started routine, routed to its target worker.
///
/// The coroutine itself is created on the worker that will run it;
/// only the entry point crosses threads.
pub(crate) struct RoutineSpec {
    pub(crate) id: RoutineId,
    pub(crate) body: RoutineBody,
}

/// Producer-side handle to one worker's command queue.
#[derive(Clone)]
pub(crate) struct WorkerHandle {
    sender: SyncSender<Command>,
    blocker: Arc<Blocker>,
    pending: Arc<AtomicUsize>,
}

impl WorkerHandle {
    /// Creates the queue for one worker.
    ///
    /// Returns the producer handle plus the consumer-side pieces the
    /// worker loop needs.
    pub(crate) fn channel() -> (WorkerHandle, Receiver<Command>, Arc<Blocker>, Arc<AtomicUsize>) {
        let (sender, receiver) = mpsc::sync_channel(COMMAND_QUEUE_CAPACITY);
        let blocker = Arc::new(Blocker::new());
        let pending = Arc::new(AtomicUsize::new(0));

        let handle = WorkerHandle {
            sender,
            blocker: blocker.clone(),
            pending: pending.clone(),
        };

        (handle, receiver, blocker, pending)
    }

    /// Enqueues a command and wakes the worker.
    ///
    /// Blocks while the queue is full. A send can only fail once the
    /// worker has exited, at which point no routine can be waiting on
    /// the command's outcome.
    pub(crate) fn push(&self, command: Command) {
        self.pending.fetch_add(1, Ordering::AcqRel);

        if self.sender.send(command).is_err() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            trace!("command dropped after worker exit");
            return;
        }

        self.blocker.wake();
    }
}
