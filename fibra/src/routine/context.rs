use crate::routine::core::{
    EventResult, EventSource, RoutineId, Wake, Yielded,
};
use crate::sync::{Receiver, Semaphore, Sender};
use crate::worker::core::WorkerLocal;
use crate::worker::ThreadId;

use std::os::fd::RawFd;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use corosensei::Yielder;

/// Execution environment of a running routine.
///
/// A `Context` is handed to every routine body and carries a reference
/// to the owning worker. All suspending operations go through it, which
/// keeps the scheduler free of mutable thread-local state: a routine can
/// only suspend itself, on its own worker.
///
/// # Examples
///
/// ```rust,ignore
/// engine.start(|ctx| {
///     fibra::time::sleep(ctx, Duration::from_millis(10));
///     ctx.spawn(|ctx| {
///         ctx.yield_now();
///     });
/// });
/// ```
pub struct Context<'a> {
    id: RoutineId,
    worker: Rc<WorkerLocal>,
    yielder: &'a Yielder<Wake, Yielded>,
}

impl<'a> Context<'a> {
    pub(crate) fn new(
        id: RoutineId,
        worker: Rc<WorkerLocal>,
        yielder: &'a Yielder<Wake, Yielded>,
    ) -> Self {
        Self { id, worker, yielder }
    }

    /// Identifier of the running routine.
    pub fn routine_id(&self) -> RoutineId {
        self.id
    }

    /// Identifier of the worker thread this routine is pinned to.
    pub fn thread_id(&self) -> ThreadId {
        self.worker.id
    }

    /// Yields execution back to the worker loop.
    ///
    /// The routine is rescheduled on the next pass, after every routine
    /// that is already ready. Plain cooperative round-robin.
    pub fn yield_now(&mut self) {
        self.yielder.suspend(Yielded::Yield);
    }

    /// Starts a new routine on a worker chosen by the engine.
    pub fn spawn<F>(&self, body: F)
    where
        F: FnOnce(&mut Context) + Send + 'static,
    {
        self.worker.engine.start_routine(None, Box::new(body));
    }

    /// Starts a new routine on an explicit worker thread.
    ///
    /// # Panics
    ///
    /// Panics if `thread` is not a valid worker index.
    pub fn spawn_on<F>(&self, thread: ThreadId, body: F)
    where
        F: FnOnce(&mut Context) + Send + 'static,
    {
        self.worker.engine.start_routine(Some(thread), Box::new(body));
    }

    /// Creates a semaphore bound to this routine's engine.
    pub fn semaphore(&self, permits: usize) -> Semaphore {
        Semaphore::with_engine(Arc::downgrade(&self.worker.engine), permits)
    }

    /// Creates a bounded channel bound to this routine's engine.
    pub fn channel<T: Send>(&self, capacity: usize) -> (Sender<T>, Receiver<T>) {
        crate::sync::channel_with_engine(Arc::downgrade(&self.worker.engine), capacity)
    }

    /// Performs the stack switch for a committed event round and returns
    /// the winning source once the worker resumes the routine.
    pub(crate) fn suspend(&mut self, sources: Vec<EventSource>) -> EventResult {
        match self.yielder.suspend(Yielded::WaitEvents(sources)) {
            Wake::Event { index, status } => EventResult { index, status },
            Wake::Resumed => unreachable!("routine resumed without a winning event"),
        }
    }
}

/// A multi-way wait under construction.
///
/// A routine may register interest in several heterogeneous sources at
/// once: fd readiness, timers and semaphores. Each `add_*` call returns
/// a small event index identifying that source; [`commit`](Self::commit)
/// suspends the routine with a single stack switch and resolves to
/// exactly one winner. The losing sources are invalidated and produce no
/// visible effect.
///
/// # Examples
///
/// ```rust,ignore
/// let mut round = EventRound::new();
/// let a = round.add_read(pipe_a);
/// let b = round.add_read(pipe_b);
/// let result = round.commit(ctx);
/// if result.index == a {
///     // pipe A became readable first
/// }
/// ```
pub struct EventRound {
    sources: Vec<EventSource>,
}

impl EventRound {
    /// Starts building an event round.
    pub fn new() -> Self {
        Self { sources: Vec::new() }
    }

    fn add(&mut self, source: EventSource) -> usize {
        self.sources.push(source);
        self.sources.len() - 1
    }

    /// Adds a timer firing at an absolute deadline.
    pub fn add_timer(&mut self, deadline: Instant) -> usize {
        self.add(EventSource::Timer(deadline))
    }

    /// Adds a timer firing after `duration` from now.
    ///
    /// A timeout on a multi-way wait is just another competing source;
    /// when it wins, the round resolves with
    /// [`EventStatus::TimedOut`](crate::EventStatus::TimedOut).
    pub fn add_timeout(&mut self, duration: Duration) -> usize {
        self.add(EventSource::Timer(Instant::now() + duration))
    }

    /// Adds read-readiness interest on a file descriptor.
    ///
    /// The descriptor must be non-blocking. At most one routine may wait
    /// on a given fd per direction at a time.
    pub fn add_read(&mut self, fd: RawFd) -> usize {
        self.add(EventSource::FdRead(fd))
    }

    /// Adds write-readiness interest on a file descriptor.
    pub fn add_write(&mut self, fd: RawFd) -> usize {
        self.add(EventSource::FdWrite(fd))
    }

    /// Adds a wait for one ticket of `semaphore`.
    ///
    /// If this source wins, the ticket has already been acquired on the
    /// routine's behalf.
    pub fn add_semaphore(&mut self, semaphore: &Semaphore) -> usize {
        self.add(EventSource::Semaphore(semaphore.core().clone()))
    }

    /// Suspends the calling routine until exactly one source fires.
    ///
    /// # Panics
    ///
    /// Panics if the round is empty: a routine with nothing to wait for
    /// could never be woken again.
    pub fn commit(self, ctx: &mut Context) -> EventResult {
        assert!(
            !self.sources.is_empty(),
            "an event round needs at least one source"
        );
        ctx.suspend(self.sources)
    }
}

impl Default for EventRound {
    fn default() -> Self {
        Self::new()
    }
}
