//! Platform-specific I/O poller abstraction.
//!
//! This module provides a unified interface over the platform polling
//! mechanisms the reactor runs on: `epoll` on Linux and `kqueue` on
//! macOS. Both backends expose the same surface:
//! - register file descriptors with read/write interests,
//! - block waiting for readiness,
//! - wake the blocked poll when new commands arrive.
//!
//! The concrete implementation is selected at compile time depending on
//! the target operating system.

use std::os::fd::RawFd;

#[cfg(target_os = "linux")]
mod epoll;

#[cfg(target_os = "macos")]
mod kqueue;

#[cfg(target_os = "linux")]
pub(crate) type Poller = epoll::EpollPoller;

#[cfg(target_os = "macos")]
pub(crate) type Poller = kqueue::KqueuePoller;

#[cfg(unix)]
pub(crate) mod unix;

#[cfg(unix)]
pub(crate) use unix as platform;

/// Readiness interests of one registered descriptor.
#[derive(Clone, Copy)]
pub(crate) struct Interest {
    pub(crate) read: bool,
    pub(crate) write: bool,
}

/// Handle that interrupts a blocking poll from another thread.
///
/// Wraps the backend's wake descriptor (an `eventfd` on Linux, a user
/// event on macOS).
pub(crate) struct Waker(pub(crate) RawFd);

unsafe impl Send for Waker {}
unsafe impl Sync for Waker {}
