use crate::reactor::event::Direction;
use crate::routine::context::Context;
use crate::sync::semaphore::SemaphoreCore;
use crate::worker::core::WorkerLocal;

use std::cell::RefCell;
use std::os::fd::RawFd;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use corosensei::stack::DefaultStack;
use corosensei::{Coroutine, CoroutineResult, Yielder};

/// Engine-wide unique routine identifier.
pub type RoutineId = u64;

/// Entry point of a routine, executed on its own stack.
pub(crate) type RoutineBody = Box<dyn FnOnce(&mut Context) + Send + 'static>;

/// Shared ownership cell for one event round.
///
/// Every slot registered for a round holds a clone of the round's cell.
/// Taking the routine out of the cell is the single claim point: exactly
/// one firing source succeeds, all later ones observe `None` and back
/// off. The cell is only ever touched by the owning worker thread.
pub(crate) type RoutineCell = Rc<RefCell<Option<Box<Routine>>>>;

/// Lifecycle states of a routine.
///
/// Transitions are driven by the routine itself (leaving a status behind
/// at a suspension point) and by the worker loop (candidate marking and
/// resume bookkeeping).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Status {
    /// Created, never resumed.
    New,
    /// Currently executing on its worker.
    Running,
    /// Suspended by an explicit yield; rescheduled on the next pass.
    Yielding,
    /// Suspended with a committed event round.
    WaitEvents,
    /// Tentatively woken by a semaphore; the wake may still lose its
    /// ticket race and fall back to `WaitEvents`.
    SemaEventCandidate,
    /// Ran to completion; dropped by the worker loop.
    Finished,
}

/// Why a suspended routine was resumed.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EventStatus {
    /// The source fired: fd readiness or an acquired semaphore ticket.
    Ready,
    /// The source was a timer and its deadline passed.
    TimedOut,
}

/// Outcome of a committed event round: which source won, and why.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct EventResult {
    /// Event index returned by the corresponding `add_*` call.
    pub index: usize,
    /// Reason tag accompanying the wake.
    pub status: EventStatus,
}

/// Value passed into a routine when the worker resumes it.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Wake {
    /// Plain reschedule after a yield (or the initial start).
    Resumed,
    /// The event round resolved to this winning source.
    Event { index: usize, status: EventStatus },
}

/// One source of an event round, as described by the suspending routine.
#[derive(Clone)]
pub(crate) enum EventSource {
    Timer(Instant),
    FdRead(RawFd),
    FdWrite(RawFd),
    Semaphore(Arc<SemaphoreCore>),
}

/// Value a routine leaves behind when it switches back to the worker.
pub(crate) enum Yielded {
    /// Explicit yield; the routine goes to the next pass's ready queue.
    Yield,
    /// A committed event round; the worker registers every source and
    /// parks the routine.
    WaitEvents(Vec<EventSource>),
}

/// A registered source of the routine's current event round.
pub(crate) struct WaitedEvent {
    pub(crate) source: EventSource,
    pub(crate) slot: usize,
}

/// A single resumable execution context.
///
/// The worker loop owns the `Routine` while it is ready or running; a
/// parked routine lives inside its round's [`RoutineCell`]. The
/// coroutine is created on the worker that will run it and never leaves
/// that thread.
pub(crate) struct Routine {
    id: RoutineId,
    status: Status,
    coro: Coroutine<Wake, Yielded, ()>,
    /// Sources of the current round, indexed by event index.
    events: Vec<WaitedEvent>,
    /// Round committed at the last suspension, waiting to be registered.
    pending_round: Option<Vec<EventSource>>,
    /// Winning source of the resolved round, consumed on resume.
    happened: Option<(usize, EventStatus)>,
}

impl Routine {
    /// Creates a routine around `body` with its own execution stack.
    pub(crate) fn new(
        id: RoutineId,
        stack_size: usize,
        local: Rc<WorkerLocal>,
        body: RoutineBody,
    ) -> Self {
        let stack = DefaultStack::new(stack_size).expect("failed to allocate routine stack");

        let coro = Coroutine::with_stack(stack, move |yielder: &Yielder<Wake, Yielded>, _: Wake| {
            let mut context = Context::new(id, local, yielder);
            body(&mut context);
        });

        Self {
            id,
            status: Status::New,
            coro,
            events: Vec::new(),
            pending_round: None,
            happened: None,
        }
    }

    pub(crate) fn id(&self) -> RoutineId {
        self.id
    }

    pub(crate) fn status(&self) -> Status {
        self.status
    }

    /// Switches into the routine's stack and runs it until the next
    /// suspension point, then records the status it left behind.
    ///
    /// This is the only place control enters a routine's stack.
    pub(crate) fn resume(&mut self) {
        let wake = match self.happened.take() {
            Some((index, status)) => Wake::Event { index, status },
            None => Wake::Resumed,
        };

        self.status = Status::Running;

        match self.coro.resume(wake) {
            CoroutineResult::Yield(Yielded::Yield) => {
                self.status = Status::Yielding;
            }
            CoroutineResult::Yield(Yielded::WaitEvents(sources)) => {
                self.pending_round = Some(sources);
                self.status = Status::WaitEvents;
            }
            CoroutineResult::Return(()) => {
                self.status = Status::Finished;
            }
        }
    }

    /// Marks a parked routine as a tentative semaphore wake.
    pub(crate) fn set_candidate(&mut self) {
        debug_assert!(matches!(
            self.status,
            Status::WaitEvents | Status::SemaEventCandidate
        ));
        self.status = Status::SemaEventCandidate;
    }

    /// Degrades a candidate that lost its ticket race back to waiting.
    pub(crate) fn revert_candidate(&mut self) {
        debug_assert!(matches!(
            self.status,
            Status::WaitEvents | Status::SemaEventCandidate
        ));
        self.status = Status::WaitEvents;
    }

    /// Records the winning source; delivered at the next resume.
    pub(crate) fn set_happened(&mut self, index: usize, status: EventStatus) {
        debug_assert!(self.happened.is_none());
        self.happened = Some((index, status));
    }

    /// Takes the round committed at the last suspension point.
    pub(crate) fn take_pending_round(&mut self) -> Option<Vec<EventSource>> {
        self.pending_round.take()
    }

    /// Resets the registration list before a new round is registered.
    pub(crate) fn clear_events(&mut self) {
        self.events.clear();
    }

    /// Records (or updates) the registration for one event index.
    ///
    /// Indices are registered in order; a semaphore wait that lost its
    /// claim re-records the same index with a fresh slot.
    pub(crate) fn record_event(&mut self, index: usize, source: EventSource, slot: usize) {
        if index == self.events.len() {
            self.events.push(WaitedEvent { source, slot });
        } else {
            self.events[index] = WaitedEvent { source, slot };
        }
    }

    /// Takes the round's registrations for loser cleanup after a claim.
    pub(crate) fn take_events(&mut self) -> Vec<WaitedEvent> {
        std::mem::take(&mut self.events)
    }

    /// Checks that `index` denotes a wait on this fd in this direction.
    ///
    /// Guards stale readiness deliveries against reused slot indices.
    pub(crate) fn event_is_fd_wait(&self, index: usize, fd: RawFd, direction: Direction) -> bool {
        match self.events.get(index).map(|event| &event.source) {
            Some(EventSource::FdRead(waited)) => direction == Direction::Read && *waited == fd,
            Some(EventSource::FdWrite(waited)) => direction == Direction::Write && *waited == fd,
            _ => false,
        }
    }

    /// Returns the semaphore registered at `index`, if any.
    pub(crate) fn semaphore_at(&self, index: usize) -> Option<Arc<SemaphoreCore>> {
        match self.events.get(index).map(|event| &event.source) {
            Some(EventSource::Semaphore(sema)) => Some(sema.clone()),
            _ => None,
        }
    }
}
