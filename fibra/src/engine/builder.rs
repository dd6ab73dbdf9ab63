use super::core::Engine;

use std::thread;

/// Default stack size of a routine, in bytes.
const DEFAULT_STACK_SIZE: usize = 1 << 20;

/// Builder for configuring and creating an engine.
///
/// `EngineBuilder` allows customizing engine parameters before
/// constructing the worker pool: the number of worker threads and the
/// stack size given to each routine.
///
/// # Examples
///
/// ```rust,ignore
/// let engine = EngineBuilder::new()
///     .worker_threads(4)
///     .routine_stack_size(256 * 1024)
///     .build();
/// ```
pub struct EngineBuilder {
    /// Number of worker threads in the pool.
    worker_threads: usize,

    /// Stack size allocated for each routine.
    stack_size: usize,
}

impl EngineBuilder {
    /// Creates a new `EngineBuilder` with default configuration.
    ///
    /// By default, the number of worker threads is set to the number
    /// of available logical CPUs, falling back to `1` if unavailable.
    pub fn new() -> Self {
        let worker_threads = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Self {
            worker_threads,
            stack_size: DEFAULT_STACK_SIZE,
        }
    }

    /// Sets the number of worker threads used by the engine.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn worker_threads(mut self, n: usize) -> Self {
        assert!(n > 0, "worker_threads must be > 0");

        self.worker_threads = n;
        self
    }

    /// Sets the stack size allocated for each routine.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is smaller than 16 KiB, the minimum needed to
    /// run any useful routine body.
    pub fn routine_stack_size(mut self, bytes: usize) -> Self {
        assert!(bytes >= 16 * 1024, "routine stacks need at least 16 KiB");

        self.stack_size = bytes;
        self
    }

    /// Builds the engine with the configured options.
    ///
    /// This starts the reactor and the worker threads; routines begin
    /// executing once [`Engine::wait`] drives the engine loop.
    pub fn build(self) -> Engine {
        Engine::new(self.worker_threads, self.stack_size)
    }
}

impl Default for EngineBuilder {
    /// Creates a default `EngineBuilder`.
    fn default() -> Self {
        Self::new()
    }
}
