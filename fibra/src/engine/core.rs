use crate::engine::builder::EngineBuilder;
use crate::reactor::ReactorHandle;
use crate::reactor::command::Command as ReactorCommand;
use crate::reactor::core::Reactor;
use crate::routine::context::Context;
use crate::routine::core::{RoutineBody, RoutineId};
use crate::worker::ThreadId;
use crate::worker::command::{Command as WorkerCommand, RoutineSpec, WorkerHandle};
use crate::worker::core::{Worker, WorkerStatus};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, trace};

/// A report or request processed by the engine's wait loop.
pub(crate) enum EngineCommand {
    /// Route a new routine to a worker.
    AddRoutine {
        target: Option<ThreadId>,
        id: RoutineId,
        body: RoutineBody,
    },

    /// A worker drained completely (`residual == 0`) or is blocked with
    /// only suspended/timed work left.
    Idle { thread: ThreadId, residual: usize },

    /// A worker exited its scheduling loop.
    EndOfThread { thread: ThreadId },

    /// A routine panicked; the payload is re-raised on the waiting
    /// thread.
    Panicked(Box<dyn std::any::Any + Send>),
}

/// Engine state shared with workers, semaphores and the reactor.
pub(crate) struct EngineShared {
    /// Command-queue handles, indexed by worker id.
    pub(crate) workers: Vec<WorkerHandle>,

    /// Handle to the reactor thread.
    pub(crate) reactor: ReactorHandle,

    /// Inbox of the engine's wait loop.
    sender: Sender<EngineCommand>,

    /// Engine-wide routine id source. The only piece of state mutated
    /// by more than one thread outside a queue.
    next_routine_id: AtomicU64,
}

impl EngineShared {
    /// Requests a new routine, routed by the wait loop.
    pub(crate) fn start_routine(&self, target: Option<ThreadId>, body: RoutineBody) {
        if let Some(target) = target {
            assert!(target < self.workers.len(), "invalid target thread");
        }

        let id = self.next_routine_id.fetch_add(1, Ordering::Relaxed);
        let _ = self.sender.send(EngineCommand::AddRoutine { target, id, body });
    }

    pub(crate) fn notify_idle(&self, thread: ThreadId, residual: usize) {
        let _ = self.sender.send(EngineCommand::Idle { thread, residual });
    }

    pub(crate) fn notify_end(&self, thread: ThreadId) {
        let _ = self.sender.send(EngineCommand::EndOfThread { thread });
    }

    pub(crate) fn notify_panicked(&self, payload: Box<dyn std::any::Any + Send>) {
        let _ = self.sender.send(EngineCommand::Panicked(payload));
    }
}

/// The coroutine engine.
///
/// Owns the worker pool and the reactor. Routines are requested with
/// [`start`](Self::start) and begin executing once [`wait`](Self::wait)
/// drives the engine loop; `wait` returns when every worker has drained
/// and exited.
///
/// # Examples
///
/// ```rust,ignore
/// let mut engine = EngineBuilder::new().worker_threads(2).build();
/// engine.start(|ctx| {
///     fibra::time::sleep(ctx, Duration::from_millis(5));
/// });
/// engine.wait();
/// ```
pub struct Engine {
    shared: Arc<EngineShared>,
    receiver: Receiver<EngineCommand>,
    handles: Vec<JoinHandle<()>>,
    /// Engine-side view of each worker, updated by the wait loop.
    statuses: Vec<WorkerStatus>,
    /// Round-robin cursor for routing without an idle worker.
    next_target: usize,
    /// Panic payload forwarded by a worker, re-raised by `wait`.
    panicked: Option<Box<dyn std::any::Any + Send>>,
    finished: bool,
}

impl Engine {
    /// Creates the engine: worker queues first, then the reactor (which
    /// needs every queue handle for routing), then the worker threads.
    pub(crate) fn new(worker_threads: usize, stack_size: usize) -> Self {
        let (sender, receiver) = channel();

        let mut worker_handles = Vec::with_capacity(worker_threads);
        let mut consumers = Vec::with_capacity(worker_threads);
        for _ in 0..worker_threads {
            let (handle, commands, blocker, pending) = WorkerHandle::channel();
            worker_handles.push(handle);
            consumers.push((commands, blocker, pending));
        }

        let (reactor, reactor_thread) = Reactor::start(worker_handles.clone());

        let shared = Arc::new(EngineShared {
            workers: worker_handles,
            reactor,
            sender,
            next_routine_id: AtomicU64::new(0),
        });

        let mut handles = Vec::with_capacity(worker_threads + 1);
        handles.push(reactor_thread);

        for (id, (commands, blocker, pending)) in consumers.into_iter().enumerate() {
            let shared = shared.clone();
            let handle = thread::Builder::new()
                .name(format!("fibra-worker-{}", id))
                .spawn(move || {
                    let mut worker = Worker::new(id, shared, commands, blocker, pending, stack_size);
                    worker.run();
                })
                .expect("failed to spawn worker thread");
            handles.push(handle);
        }

        Self {
            shared,
            receiver,
            handles,
            statuses: vec![WorkerStatus::Idle; worker_threads],
            next_target: 0,
            panicked: None,
            finished: false,
        }
    }

    /// Number of worker threads in the pool.
    pub fn worker_threads(&self) -> usize {
        self.statuses.len()
    }

    pub(crate) fn shared(&self) -> &Arc<EngineShared> {
        &self.shared
    }

    /// Requests a new routine on a worker chosen by the engine.
    ///
    /// Routines requested after [`wait`](Self::wait) has returned are
    /// silently ignored.
    pub fn start<F>(&self, body: F)
    where
        F: FnOnce(&mut Context) + Send + 'static,
    {
        self.shared.start_routine(None, Box::new(body));
    }

    /// Requests a new routine on an explicit worker thread.
    ///
    /// # Panics
    ///
    /// Panics if `thread` is not a valid worker index.
    pub fn start_on<F>(&self, thread: ThreadId, body: F)
    where
        F: FnOnce(&mut Context) + Send + 'static,
    {
        self.shared.start_routine(Some(thread), Box::new(body));
    }

    /// Drives the engine until every worker has finished.
    ///
    /// Routes queued routine requests, tracks idle reports, broadcasts
    /// `Finish` exactly once when every worker is simultaneously idle
    /// with nothing left, and finally joins all threads.
    pub fn wait(&mut self) {
        if self.finished {
            return;
        }

        let mut finish_sent = false;

        loop {
            let Ok(command) = self.receiver.recv() else { break };
            self.handle(command);

            // Drain everything in flight before deciding anything:
            // routing requests must be applied before an idle snapshot
            // can be trusted.
            while let Ok(command) = self.receiver.try_recv() {
                self.handle(command);
            }

            if let Some(payload) = self.panicked.take() {
                // Workers stay parked on their blockers; the process is
                // expected to exit after an escaped routine panic.
                self.finished = true;
                std::panic::resume_unwind(payload);
            }

            if !finish_sent
                && self
                    .statuses
                    .iter()
                    .all(|status| *status == WorkerStatus::Idle)
            {
                debug!("engine: all workers idle, finishing");
                for worker in &self.shared.workers {
                    worker.push(WorkerCommand::Finish);
                }
                finish_sent = true;
            }

            if self
                .statuses
                .iter()
                .all(|status| *status == WorkerStatus::Finished)
            {
                break;
            }
        }

        self.shared.reactor.send(ReactorCommand::Shutdown);
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }

        debug!("engine finished");
        self.finished = true;
    }

    fn handle(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::AddRoutine { target, id, body } => {
                let target = target.unwrap_or_else(|| self.pick_target());
                trace!("engine routes routine {} to worker {}", id, target);
                self.statuses[target] = WorkerStatus::Busy;
                self.shared.workers[target].push(WorkerCommand::AddRoutine(RoutineSpec {
                    id,
                    body,
                }));
            }
            EngineCommand::Idle { thread, residual } => {
                if residual == 0 {
                    self.statuses[thread] = WorkerStatus::Idle;
                }
            }
            EngineCommand::EndOfThread { thread } => {
                self.statuses[thread] = WorkerStatus::Finished;
            }
            EngineCommand::Panicked(payload) => {
                self.panicked = Some(payload);
            }
        }
    }

    /// Picks the next free worker, falling back to round-robin.
    fn pick_target(&mut self) -> ThreadId {
        if let Some(idle) = self
            .statuses
            .iter()
            .position(|status| *status == WorkerStatus::Idle)
        {
            return idle;
        }

        let target = self.next_target % self.statuses.len();
        self.next_target = self.next_target.wrapping_add(1);
        target
    }
}

impl Drop for Engine {
    /// Drives the engine to completion if [`wait`](Engine::wait) was
    /// never called, so worker threads are always joined.
    fn drop(&mut self) {
        if !self.finished {
            self.wait();
        }
    }
}

/// Builds an engine, starts `body` as its first routine, and waits for
/// every routine to finish.
///
/// `worker_threads == 0` selects the default pool size (one worker per
/// available logical CPU).
///
/// # Examples
///
/// ```rust,ignore
/// fibra::run(1, |ctx| {
///     ctx.spawn(|ctx| fibra::time::sleep(ctx, Duration::from_millis(1)));
/// });
/// ```
pub fn run<F>(worker_threads: usize, body: F)
where
    F: FnOnce(&mut Context) + Send + 'static,
{
    let mut builder = EngineBuilder::new();
    if worker_threads > 0 {
        builder = builder.worker_threads(worker_threads);
    }

    let mut engine = builder.build();
    engine.start(body);
    engine.wait();
}
