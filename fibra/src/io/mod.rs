//! Suspending wrappers around non-blocking system calls.
//!
//! Every function takes the routine's [`Context`] and retries its call
//! whenever the kernel reports `EAGAIN`/`EWOULDBLOCK`, suspending the
//! routine on fd readiness in between. An optional timeout bounds each
//! individual wait; when it fires, the call returns
//! [`WaitError::TimedOut`] and the readiness registration is
//! invalidated lazily.
//!
//! File descriptors passed here **must** be non-blocking; see
//! [`set_nonblocking`] and [`pipe`].

use crate::error::WaitError;
use crate::reactor::poller::platform;
use crate::routine::context::{Context, EventRound};
use crate::routine::core::EventStatus;

use std::io;
use std::mem;
use std::net::SocketAddr;
use std::os::fd::RawFd;
use std::time::Duration;

/// Suspends until `fd` is readable or `timeout` elapses.
pub fn wait_readable(
    ctx: &mut Context,
    fd: RawFd,
    timeout: Option<Duration>,
) -> Result<(), WaitError> {
    let mut round = EventRound::new();
    round.add_read(fd);
    if let Some(timeout) = timeout {
        round.add_timeout(timeout);
    }

    match round.commit(ctx).status {
        EventStatus::Ready => Ok(()),
        EventStatus::TimedOut => Err(WaitError::TimedOut),
    }
}

/// Suspends until `fd` is writable or `timeout` elapses.
pub fn wait_writable(
    ctx: &mut Context,
    fd: RawFd,
    timeout: Option<Duration>,
) -> Result<(), WaitError> {
    let mut round = EventRound::new();
    round.add_write(fd);
    if let Some(timeout) = timeout {
        round.add_timeout(timeout);
    }

    match round.commit(ctx).status {
        EventStatus::Ready => Ok(()),
        EventStatus::TimedOut => Err(WaitError::TimedOut),
    }
}

/// Reads from `fd`, suspending until data is available.
///
/// Returns the number of bytes read; `0` means end of stream.
pub fn read(
    ctx: &mut Context,
    fd: RawFd,
    buffer: &mut [u8],
    timeout: Option<Duration>,
) -> Result<usize, WaitError> {
    loop {
        let n = platform::sys_read(fd, buffer);
        if n >= 0 {
            return Ok(n as usize);
        }

        let error = io::Error::last_os_error();
        if error.kind() == io::ErrorKind::WouldBlock {
            wait_readable(ctx, fd, timeout)?;
        } else {
            return Err(error.into());
        }
    }
}

/// Writes to `fd`, suspending until buffer space is available.
///
/// Returns the number of bytes written; short writes are possible, as
/// with the underlying system call.
pub fn write(
    ctx: &mut Context,
    fd: RawFd,
    buffer: &[u8],
    timeout: Option<Duration>,
) -> Result<usize, WaitError> {
    loop {
        let n = platform::sys_write(fd, buffer);
        if n >= 0 {
            return Ok(n as usize);
        }

        let error = io::Error::last_os_error();
        if error.kind() == io::ErrorKind::WouldBlock {
            wait_writable(ctx, fd, timeout)?;
        } else {
            return Err(error.into());
        }
    }
}

/// Accepts a connection on `fd`, suspending until one is pending.
///
/// The accepted socket is switched to non-blocking mode before it is
/// returned.
pub fn accept(
    ctx: &mut Context,
    fd: RawFd,
    timeout: Option<Duration>,
) -> Result<(RawFd, SocketAddr), WaitError> {
    loop {
        let mut storage = unsafe { mem::zeroed() };
        let client = platform::sys_accept(fd, &mut storage);

        if client >= 0 {
            platform::sys_set_nonblocking(client)?;
            let addr = platform::sockaddr_storage_to_socketaddr(&storage)?;
            return Ok((client, addr));
        }

        let error = io::Error::last_os_error();
        if error.kind() == io::ErrorKind::WouldBlock {
            wait_readable(ctx, fd, timeout)?;
        } else {
            return Err(error.into());
        }
    }
}

/// Connects `fd` to `addr`, suspending while the connection is in
/// progress.
///
/// The connect call is not retried; completion is detected through
/// write readiness and the socket's pending error, as the kernel
/// requires.
pub fn connect(
    ctx: &mut Context,
    fd: RawFd,
    addr: &SocketAddr,
    timeout: Option<Duration>,
) -> Result<(), WaitError> {
    let rc = platform::sys_connect(fd, addr);
    if rc == 0 {
        return Ok(());
    }

    let error = io::Error::last_os_error();
    if error.raw_os_error() != Some(libc::EINPROGRESS) {
        return Err(error.into());
    }

    wait_writable(ctx, fd, timeout)?;

    let pending = platform::sys_socket_error(fd)?;
    if pending != 0 {
        return Err(io::Error::from_raw_os_error(pending).into());
    }

    Ok(())
}

/// Creates a non-blocking pipe, returning `(reader, writer)`.
pub fn pipe() -> io::Result<(RawFd, RawFd)> {
    platform::sys_pipe()
}

/// Switches an externally created descriptor to non-blocking mode.
pub fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    platform::sys_set_nonblocking(fd)
}

/// Closes a file descriptor.
pub fn close(fd: RawFd) {
    platform::sys_close(fd);
}
