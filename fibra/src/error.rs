use std::io;

use thiserror::Error;

/// Error returned by suspending operations.
///
/// A suspending call either completes, times out (when the caller
/// attached a timeout to the wait), or surfaces an operating system
/// error from the underlying non-blocking call.
#[derive(Debug, Error)]
pub enum WaitError {
    /// The wait's timeout source won the event round.
    #[error("operation timed out")]
    TimedOut,

    /// The retried system call failed with a real error.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl WaitError {
    /// Returns `true` for the timeout variant.
    pub fn is_timeout(&self) -> bool {
        matches!(self, WaitError::TimedOut)
    }
}
