use crate::engine::core::EngineShared;
use crate::reactor::command::{Command as ReactorCommand, Tag};
use crate::reactor::event::Direction;
use crate::routine::core::{
    EventSource, EventStatus, Routine, RoutineCell, Status,
};
use crate::sync::semaphore::SemaphoreCore;
use crate::utils::Slab;
use crate::worker::ThreadId;
use crate::worker::blocker::Blocker;
use crate::worker::command::Command;
use crate::worker::timer::TimerSet;

use std::cell::RefCell;
use std::collections::VecDeque;
use std::os::fd::RawFd;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Weak};
use std::time::Instant;

use log::{debug, trace};

/// One entry of the suspended-routine arena.
///
/// Each source of an event round registers its own slot; all slots of a
/// round share the round's owner cell. Indices held by timer buckets,
/// reactor tags and semaphore waiter lists are weak: any holder must
/// find the slot live and the cell occupied before acting on it.
pub(crate) struct Slot {
    pub(crate) cell: RoutineCell,
    pub(crate) event_index: usize,
}

/// Worker-local state shared between the loop and routine contexts.
///
/// The `RefCell`s are never borrowed across a stack switch; a borrow
/// conflict here is scheduler corruption, not a recoverable condition.
pub(crate) struct WorkerLocal {
    pub(crate) id: ThreadId,
    pub(crate) state: RefCell<WorkerState>,
    pub(crate) engine: Arc<EngineShared>,
}

pub(crate) struct WorkerState {
    pub(crate) arena: Slab<Slot>,
    pub(crate) timers: TimerSet,
    pub(crate) ready: VecDeque<Scheduled>,
    /// Number of parked routines (owner cells holding a routine).
    pub(crate) suspended: usize,
}

/// An entry of the ready queue.
pub(crate) enum Scheduled {
    /// A routine this worker exclusively owns: new, yielded, or the
    /// claimed winner of an event round.
    Owned(Box<Routine>),

    /// A tentative semaphore wake. The arena still owns the routine
    /// through the cell; the claim is resolved at execution time and may
    /// fail without touching the routine.
    Candidate {
        cell: RoutineCell,
        event_index: usize,
        sema: Weak<SemaphoreCore>,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum WorkerStatus {
    Idle,
    Busy,
    Finishing,
    Finished,
}

/// A worker thread of the engine.
///
/// The worker owns its event loop: it blocks on its [`Blocker`] for at
/// most the distance to the nearest timer deadline, drains its command
/// queue, fires due timers, then runs the ready queue to completion.
/// Exactly one routine executes at a time; a routine's own suspension
/// call is the only place it cedes control.
pub(crate) struct Worker {
    local: Rc<WorkerLocal>,
    receiver: Receiver<Command>,
    blocker: Arc<Blocker>,
    pending: Arc<AtomicUsize>,
    status: WorkerStatus,
    stack_size: usize,
}

impl Worker {
    pub(crate) fn new(
        id: ThreadId,
        engine: Arc<EngineShared>,
        receiver: Receiver<Command>,
        blocker: Arc<Blocker>,
        pending: Arc<AtomicUsize>,
        stack_size: usize,
    ) -> Self {
        let local = Rc::new(WorkerLocal {
            id,
            state: RefCell::new(WorkerState {
                arena: Slab::new(64),
                timers: TimerSet::new(),
                ready: VecDeque::new(),
                suspended: 0,
            }),
            engine,
        });

        Self {
            local,
            receiver,
            blocker,
            pending,
            status: WorkerStatus::Idle,
            stack_size,
        }
    }

    fn id(&self) -> ThreadId {
        self.local.id
    }

    /// Runs the scheduling loop until the worker finishes.
    ///
    /// Per pass: compute the timeout from the nearest deadline, block on
    /// the blocker, drain commands, fire the earliest due timer bucket,
    /// then execute the ready queue. A pass that leaves ready work skips
    /// blocking on the next iteration.
    pub(crate) fn run(&mut self) {
        debug!("worker {} started", self.id());

        // The first pass runs without blocking so an empty worker
        // reports idle right away.
        let mut more_work = true;
        while self.status != WorkerStatus::Finished {
            let mut fire_timers = false;

            if !more_work {
                let next_deadline = self.local.state.borrow().timers.next_deadline();
                match next_deadline {
                    Some(deadline) => {
                        let now = Instant::now();
                        if deadline <= now {
                            fire_timers = true;
                        } else if self.blocker.wait(Some(deadline - now)) {
                            fire_timers = true;
                        }
                    }
                    None => {
                        self.blocker.wait(None);
                    }
                }
            }

            if 0 < self.pending.load(Ordering::Acquire) {
                self.drain_commands();
            }

            if fire_timers {
                self.fire_due_timers();
            }

            more_work = self.execute_ready();
        }

        debug!("worker {} finished", self.id());
        self.local.engine.notify_end(self.id());
    }

    /// Drains the command queue completely.
    fn drain_commands(&mut self) {
        while let Ok(command) = self.receiver.try_recv() {
            self.pending.fetch_sub(1, Ordering::AcqRel);

            match command {
                Command::AddRoutine(spec) => {
                    trace!("worker {} takes routine {}", self.id(), spec.id);
                    let routine =
                        Routine::new(spec.id, self.stack_size, self.local.clone(), spec.body);
                    self.local
                        .state
                        .borrow_mut()
                        .ready
                        .push_back(Scheduled::Owned(Box::new(routine)));
                }
                Command::ScheduleWaiting { sema, slot } => self.schedule_waiting(sema, slot),
                Command::FdReady {
                    fd,
                    slot,
                    direction,
                } => self.fd_ready(fd, slot, direction),
                Command::Finish => {
                    self.status = WorkerStatus::Finishing;
                }
            }
        }
    }

    /// Resolves a `ScheduleWaiting` command.
    ///
    /// The slot is consumed either way. If it still denotes a parked
    /// routine, the routine becomes a scheduling candidate; otherwise
    /// the wake is passed to the semaphore's next waiter so the banked
    /// ticket is never lost.
    fn schedule_waiting(&mut self, sema: Weak<SemaphoreCore>, slot: usize) {
        let entry = {
            let mut state = self.local.state.borrow_mut();
            if state.arena.has(slot) {
                let slot = state.arena.remove(slot);
                Some((slot.cell, slot.event_index))
            } else {
                None
            }
        };

        let Some((cell, event_index)) = entry else {
            if let Some(sema) = sema.upgrade() {
                sema.notify_one();
            }
            return;
        };

        let alive = {
            let mut cell_ref = cell.borrow_mut();
            match cell_ref.as_mut() {
                Some(routine) => {
                    routine.set_candidate();
                    true
                }
                None => false,
            }
        };

        if alive {
            self.local
                .state
                .borrow_mut()
                .ready
                .push_back(Scheduled::Candidate {
                    cell,
                    event_index,
                    sema,
                });
        } else if let Some(sema) = sema.upgrade() {
            sema.notify_one();
        }
    }

    /// Resolves an externally delivered readiness event.
    ///
    /// The slot must still be live and must still describe a wait on
    /// this fd in this direction; anything else is a stale delivery for
    /// an already-resolved round and is dropped silently.
    fn fd_ready(&mut self, fd: RawFd, slot: usize, direction: Direction) {
        let fire = {
            let state = self.local.state.borrow();
            match state.arena.get(slot) {
                None => false,
                Some(entry) => {
                    let cell = entry.cell.borrow();
                    match cell.as_ref() {
                        None => false,
                        Some(routine) => {
                            routine.event_is_fd_wait(entry.event_index, fd, direction)
                        }
                    }
                }
            }
        };

        if fire {
            self.event_happened(slot, EventStatus::Ready);
        }
    }

    /// Fires every slot of the earliest due timer bucket, then drops the
    /// bucket.
    ///
    /// Timer slots are freed only here and in the cancellation sweep, so
    /// an index listed in a bucket is never reused out from under it.
    fn fire_due_timers(&mut self) {
        let bucket = {
            let mut state = self.local.state.borrow_mut();
            state.timers.take_first_due(Instant::now())
        };
        let Some(bucket) = bucket else { return };

        for slot in bucket.slots {
            let consumed = {
                let state = self.local.state.borrow();
                match state.arena.get(slot) {
                    None => None,
                    Some(entry) => Some(entry.cell.borrow().is_none()),
                }
            };

            match consumed {
                // Slot already freed by the winning path.
                None => {}
                // The round was won elsewhere; dispose of the leftover.
                Some(true) => {
                    let mut state = self.local.state.borrow_mut();
                    if state.arena.has(slot) {
                        state.arena.remove(slot);
                    }
                }
                Some(false) => self.event_happened(slot, EventStatus::TimedOut),
            }
        }
    }

    /// Generic event resolution: the first source to get here claims the
    /// routine; every later one observes an empty cell and backs off.
    ///
    /// The slot is freed only after the claim succeeded, and the round's
    /// losing registrations are invalidated before the routine becomes
    /// runnable again.
    fn event_happened(&mut self, slot: usize, status: EventStatus) {
        let mut state = self.local.state.borrow_mut();
        let state = &mut *state;

        let Some(entry) = state.arena.get(slot) else {
            return;
        };
        let (cell, event_index) = (entry.cell.clone(), entry.event_index);

        let Some(mut routine) = cell.borrow_mut().take() else {
            return;
        };

        state.arena.remove(slot);
        release_losers(self.local.id, &self.local.engine, state, &mut routine, event_index);
        routine.set_happened(event_index, status);
        state.suspended -= 1;
        state.ready.push_back(Scheduled::Owned(routine));
    }

    /// Runs the ready queue to completion for this pass.
    ///
    /// Returns `true` if the pass left work for an immediate next pass.
    /// Yielded routines go to the next pass's queue; entries appended by
    /// event resolution during the pass run within it.
    fn execute_ready(&mut self) -> bool {
        let mut next: VecDeque<Scheduled> = VecDeque::new();

        loop {
            let entry = self.local.state.borrow_mut().ready.pop_front();
            let Some(entry) = entry else { break };

            if self.status == WorkerStatus::Idle {
                self.status = WorkerStatus::Busy;
            }

            let routine = match entry {
                Scheduled::Owned(routine) => Some(routine),
                Scheduled::Candidate {
                    cell,
                    event_index,
                    sema,
                } => self.claim_candidate(cell, event_index, sema),
            };
            let Some(mut routine) = routine else { continue };

            let outcome =
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| routine.resume()));
            if let Err(payload) = outcome {
                // The routine's stack already unwound; fail fast on the
                // engine side instead of stalling its siblings.
                debug!("worker {} caught panic in routine {}", self.id(), routine.id());
                self.local.engine.notify_panicked(payload);
                continue;
            }

            match routine.status() {
                Status::Yielding => next.push_back(Scheduled::Owned(routine)),
                Status::WaitEvents => self.park(routine),
                Status::Finished => {
                    trace!("worker {} drops routine {}", self.id(), routine.id());
                }
                status @ (Status::New | Status::Running | Status::SemaEventCandidate) => {
                    unreachable!("routine {} left invalid status {:?}", routine.id(), status)
                }
            }
        }

        {
            let mut state = self.local.state.borrow_mut();
            let state = &mut *state;
            debug_assert!(state.ready.is_empty());
            state.ready = next;
            state.timers.sweep(&mut state.arena);
        }

        let (more, suspended, timers_empty) = {
            let state = self.local.state.borrow();
            (
                !state.ready.is_empty(),
                state.suspended,
                state.timers.is_empty(),
            )
        };

        if more {
            return true;
        }

        // Idle / termination logic. Pending commands postpone any
        // decision to the next pass; the blocker is already flagged.
        if 0 < self.pending.load(Ordering::Acquire) {
            return false;
        }

        if suspended == 0 && timers_empty {
            if self.status == WorkerStatus::Finishing {
                self.status = WorkerStatus::Finished;
            } else {
                self.status = WorkerStatus::Idle;
                self.local.engine.notify_idle(self.id(), 0);
            }
        } else {
            // Residual suspended/timed work: keep blocking. A worker
            // already told to finish must not lose that mark here.
            if self.status == WorkerStatus::Busy {
                self.status = WorkerStatus::Idle;
            }
            self.local.engine.notify_idle(self.id(), suspended);
        }

        false
    }

    /// Resolves a candidate's ticket race.
    ///
    /// Winning takes exclusive ownership of the routine with the ticket
    /// already acquired. Losing degrades the routine back to waiting and
    /// queues it up again; the routine is left addressable throughout so
    /// other sources of its round stay valid.
    fn claim_candidate(
        &mut self,
        cell: RoutineCell,
        event_index: usize,
        sema: Weak<SemaphoreCore>,
    ) -> Option<Box<Routine>> {
        if cell.borrow().is_none() {
            // Another source consumed the routine; hand the wake on.
            if let Some(sema) = sema.upgrade() {
                sema.notify_one();
            }
            return None;
        }

        let sema = {
            let cell_ref = cell.borrow();
            let routine = cell_ref.as_ref().unwrap();
            routine
                .semaphore_at(event_index)
                .expect("candidate event is not a semaphore wait")
        };

        if sema.try_acquire() {
            let mut routine = cell.borrow_mut().take().unwrap();
            {
                let mut state = self.local.state.borrow_mut();
                let state = &mut *state;
                release_losers(
                    self.local.id,
                    &self.local.engine,
                    state,
                    &mut routine,
                    event_index,
                );
                state.suspended -= 1;
            }
            routine.set_happened(event_index, EventStatus::Ready);
            Some(routine)
        } else {
            cell.borrow_mut().as_mut().unwrap().revert_candidate();
            self.register_semaphore_wait(&cell, event_index, sema);
            None
        }
    }

    /// Registers the committed event round of a freshly suspended
    /// routine.
    ///
    /// The routine is deposited into the round's owner cell before the
    /// first source is registered, so no firing path can observe a
    /// half-built round. Registration stops early if a source resolves
    /// the round on the spot.
    fn park(&mut self, mut routine: Box<Routine>) {
        let sources = routine
            .take_pending_round()
            .expect("routine suspended without a committed event round");

        routine.clear_events();

        let cell: RoutineCell = Rc::new(RefCell::new(None));
        *cell.borrow_mut() = Some(routine);
        self.local.state.borrow_mut().suspended += 1;

        for (index, source) in sources.into_iter().enumerate() {
            if cell.borrow().is_none() {
                break;
            }

            match source {
                EventSource::Timer(deadline) => {
                    let slot = {
                        let mut state = self.local.state.borrow_mut();
                        let slot = state.arena.insert(Slot {
                            cell: cell.clone(),
                            event_index: index,
                        });
                        state.timers.register(deadline, slot);
                        slot
                    };
                    record(&cell, index, EventSource::Timer(deadline), slot);
                }
                EventSource::FdRead(fd) => {
                    let slot = self.insert_slot(&cell, index);
                    record(&cell, index, EventSource::FdRead(fd), slot);
                    self.local.engine.reactor.send(ReactorCommand::Register {
                        fd,
                        direction: Direction::Read,
                        tag: Tag {
                            thread: self.id(),
                            slot,
                        },
                    });
                }
                EventSource::FdWrite(fd) => {
                    let slot = self.insert_slot(&cell, index);
                    record(&cell, index, EventSource::FdWrite(fd), slot);
                    self.local.engine.reactor.send(ReactorCommand::Register {
                        fd,
                        direction: Direction::Write,
                        tag: Tag {
                            thread: self.id(),
                            slot,
                        },
                    });
                }
                EventSource::Semaphore(sema) => {
                    self.register_semaphore_wait(&cell, index, sema);
                }
            }
        }
    }

    fn insert_slot(&self, cell: &RoutineCell, event_index: usize) -> usize {
        self.local.state.borrow_mut().arena.insert(Slot {
            cell: cell.clone(),
            event_index,
        })
    }

    /// Registers one semaphore wait, handling the banked-ticket race.
    ///
    /// After the waiter becomes visible, a ticket posted before the
    /// registration may already be banked. In that case the waiter takes
    /// itself back out of the list and races for the ticket; winning
    /// resolves the round immediately through the generic firing path.
    fn register_semaphore_wait(
        &mut self,
        cell: &RoutineCell,
        event_index: usize,
        sema: Arc<SemaphoreCore>,
    ) {
        loop {
            let slot = self.insert_slot(cell, event_index);
            record(cell, event_index, EventSource::Semaphore(sema.clone()), slot);

            sema.push_waiter(self.id(), slot);

            if sema.available() == 0 || !sema.cancel_waiter(self.id(), slot) {
                // Waiting, or a wake for this registration is already in
                // flight and will consume the slot.
                return;
            }

            if sema.try_acquire() {
                self.event_happened(slot, EventStatus::Ready);
                return;
            }

            // The banked ticket went to someone else; retire the aborted
            // registration and queue up again.
            let mut state = self.local.state.borrow_mut();
            if state.arena.has(slot) {
                state.arena.remove(slot);
            }
        }
    }
}

/// Records a registration on the parked routine through its cell.
fn record(cell: &RoutineCell, index: usize, source: EventSource, slot: usize) {
    if let Some(routine) = cell.borrow_mut().as_mut() {
        routine.record_event(index, source, slot);
    }
}

/// Invalidates the losing sources of a resolved round.
///
/// Runs on the winning path only, after the routine was claimed. Timer
/// losers are cancelled lazily; fd losers are deregistered and their
/// slots freed; semaphore losers are withdrawn from the waiter list,
/// leaving any in-flight wake to the forwarding path.
fn release_losers(
    thread: ThreadId,
    engine: &Arc<EngineShared>,
    state: &mut WorkerState,
    routine: &mut Routine,
    winner: usize,
) {
    for (index, event) in routine.take_events().into_iter().enumerate() {
        if index == winner {
            continue;
        }

        match event.source {
            EventSource::Timer(deadline) => {
                state.timers.cancel(deadline);
            }
            EventSource::FdRead(fd) => {
                engine.reactor.send(ReactorCommand::Unregister {
                    fd,
                    direction: Direction::Read,
                });
                if state.arena.has(event.slot) {
                    state.arena.remove(event.slot);
                }
            }
            EventSource::FdWrite(fd) => {
                engine.reactor.send(ReactorCommand::Unregister {
                    fd,
                    direction: Direction::Write,
                });
                if state.arena.has(event.slot) {
                    state.arena.remove(event.slot);
                }
            }
            EventSource::Semaphore(sema) => {
                if sema.cancel_waiter(thread, event.slot) && state.arena.has(event.slot) {
                    state.arena.remove(event.slot);
                }
            }
        }
    }
}
