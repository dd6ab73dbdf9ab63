use crate::engine::core::{Engine, EngineShared};
use crate::error::WaitError;
use crate::routine::context::{Context, EventRound};
use crate::routine::core::EventStatus;
use crate::worker::ThreadId;
use crate::worker::command::Command as WorkerCommand;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

/// A waiting routine: the worker it is pinned to and its arena slot.
struct Waiter {
    thread: ThreadId,
    slot: usize,
}

/// Counter and waiter list shared across threads.
///
/// The counter holds banked tickets and never goes negative. Waiters
/// are weak `(thread, slot)` references; electing one sends a command
/// to the owning worker instead of mutating its state, which is what
/// keeps slot invalidation single-writer.
pub(crate) struct SemaphoreCore {
    count: AtomicUsize,
    waiters: Mutex<VecDeque<Waiter>>,
    engine: Weak<EngineShared>,
    /// Back-reference handed out in wake commands.
    this: Weak<SemaphoreCore>,
}

impl SemaphoreCore {
    pub(crate) fn new(engine: Weak<EngineShared>, permits: usize) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            count: AtomicUsize::new(permits),
            waiters: Mutex::new(VecDeque::new()),
            engine,
            this: this.clone(),
        })
    }

    /// Takes one banked ticket if any is available.
    pub(crate) fn try_acquire(&self) -> bool {
        self.count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            })
            .is_ok()
    }

    /// Number of currently banked tickets.
    pub(crate) fn available(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Banks one ticket and elects a waiter for it.
    pub(crate) fn post(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
        self.notify_one();
    }

    /// Elects the next waiter and wakes its worker.
    ///
    /// Also used to forward a wake whose target was already resolved by
    /// another source: the banked ticket then goes to the next waiter
    /// in line, or stays banked for a future fast-path acquire.
    pub(crate) fn notify_one(&self) {
        let waiter = self.waiters.lock().unwrap().pop_front();
        let Some(waiter) = waiter else { return };

        let Some(engine) = self.engine.upgrade() else {
            return;
        };

        engine.workers[waiter.thread].push(WorkerCommand::ScheduleWaiting {
            sema: self.this.clone(),
            slot: waiter.slot,
        });
    }

    pub(crate) fn push_waiter(&self, thread: ThreadId, slot: usize) {
        self.waiters.lock().unwrap().push_back(Waiter { thread, slot });
    }

    /// Withdraws a specific registration from the waiter list.
    ///
    /// Returns `false` if a post already elected it, in which case a
    /// wake command is in flight and owns the slot's disposal.
    pub(crate) fn cancel_waiter(&self, thread: ThreadId, slot: usize) -> bool {
        let mut waiters = self.waiters.lock().unwrap();
        match waiters
            .iter()
            .position(|waiter| waiter.thread == thread && waiter.slot == slot)
        {
            Some(position) => {
                waiters.remove(position);
                true
            }
            None => false,
        }
    }
}

/// A counting semaphore usable from routines and plain threads.
///
/// [`post`](Self::post) never blocks and may be called from any thread.
/// [`wait`](Self::wait) suspends the calling routine until a ticket is
/// available; [`wait_timeout`](Self::wait_timeout) gives up after a
/// deadline. Every wake carries its reason: a routine is resumed either
/// with a ticket already acquired on its behalf or with the timeout.
///
/// # Examples
///
/// ```rust,ignore
/// let sema = Semaphore::new(&engine, 0);
/// let handoff = sema.clone();
///
/// engine.start(move |ctx| {
///     handoff.wait(ctx);
/// });
/// sema.post();
/// ```
#[derive(Clone)]
pub struct Semaphore {
    core: Arc<SemaphoreCore>,
}

impl Semaphore {
    /// Creates a semaphore with `permits` initial tickets.
    pub fn new(engine: &Engine, permits: usize) -> Self {
        Self::with_engine(Arc::downgrade(engine.shared()), permits)
    }

    pub(crate) fn with_engine(engine: Weak<EngineShared>, permits: usize) -> Self {
        Self {
            core: SemaphoreCore::new(engine, permits),
        }
    }

    pub(crate) fn core(&self) -> &Arc<SemaphoreCore> {
        &self.core
    }

    /// Banks one ticket, waking a waiting routine if there is one.
    pub fn post(&self) {
        self.core.post();
    }

    /// Takes a ticket without suspending, if one is banked.
    pub fn try_wait(&self) -> bool {
        self.core.try_acquire()
    }

    /// Suspends the calling routine until a ticket is acquired.
    pub fn wait(&self, ctx: &mut Context) {
        if self.core.try_acquire() {
            return;
        }

        let mut round = EventRound::new();
        round.add_semaphore(self);
        let result = round.commit(ctx);

        debug_assert_eq!(result.status, EventStatus::Ready);
    }

    /// Suspends until a ticket is acquired or `timeout` elapses.
    ///
    /// The timeout is just another source competing in the same event
    /// round; when it wins, the semaphore registration is invalidated
    /// lazily and any racing wake is forwarded to the next waiter.
    pub fn wait_timeout(&self, ctx: &mut Context, timeout: Duration) -> Result<(), WaitError> {
        if self.core.try_acquire() {
            return Ok(());
        }

        let mut round = EventRound::new();
        round.add_semaphore(self);
        let timer = round.add_timeout(timeout);
        let result = round.commit(ctx);

        if result.index == timer {
            Err(WaitError::TimedOut)
        } else {
            Ok(())
        }
    }
}
