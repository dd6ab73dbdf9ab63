use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// The single wait point of a worker loop.
///
/// A worker blocks on its `Blocker` between passes, for at most the
/// distance to its nearest timer deadline. Any producer that enqueues a
/// command (or the reactor, after routing a readiness event) wakes the
/// blocker, releasing the wait immediately regardless of the remaining
/// timeout.
pub(crate) struct Blocker {
    /// Wake flag; survives wakes that arrive before the wait starts.
    flag: Mutex<bool>,
    condvar: Condvar,
}

impl Blocker {
    pub(crate) fn new() -> Self {
        Self {
            flag: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    /// Wakes the owning worker.
    pub(crate) fn wake(&self) {
        let mut flag = self.flag.lock().unwrap();
        *flag = true;
        self.condvar.notify_one();
    }

    /// Blocks until woken or until `timeout` elapses.
    ///
    /// `None` blocks indefinitely. Returns `true` if the wait ended
    /// because the timeout elapsed. The wake flag is consumed either
    /// way.
    pub(crate) fn wait(&self, timeout: Option<Duration>) -> bool {
        let mut flag = self.flag.lock().unwrap();

        let timed_out = match timeout {
            None => {
                while !*flag {
                    flag = self.condvar.wait(flag).unwrap();
                }
                false
            }
            Some(timeout) => {
                let (guard, result) = self
                    .condvar
                    .wait_timeout_while(flag, timeout, |woken| !*woken)
                    .unwrap();
                flag = guard;
                result.timed_out()
            }
        };

        *flag = false;
        timed_out
    }
}
