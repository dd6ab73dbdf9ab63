//! macOS `kqueue`-based poller implementation.
//!
//! Functionally equivalent to the Linux `epoll` backend and exposing
//! the same interface to the reactor. The wake-up signal is a self-pipe
//! registered as a persistent read filter.

use super::{Interest, Waker};
use crate::reactor::event::Event;

use libc::{
    EV_ADD, EV_DELETE, EV_EOF, EV_ERROR, EVFILT_READ, EVFILT_WRITE, kevent, kqueue, timespec,
};
use std::io;
use std::os::unix::io::RawFd;
use std::ptr;
use std::sync::Arc;
use std::time::Duration;

/// Reserved token used internally for the wake-up pipe.
const WAKE_TOKEN: usize = usize::MAX;

/// macOS `kqueue` poller.
pub(crate) struct KqueuePoller {
    /// Kqueue file descriptor.
    kqueue: RawFd,

    /// Read end of the wake pipe.
    wake_reader: RawFd,

    /// Reusable buffer for kevents.
    events: Vec<kevent>,

    /// Waker wrapping the write end of the wake pipe.
    waker: Arc<Waker>,
}

unsafe impl Send for KqueuePoller {}

impl Waker {
    /// Wakes the poller by writing to the wake pipe.
    pub(crate) fn wake(&self) {
        let buf: u8 = 1;
        unsafe {
            libc::write(self.0, &buf as *const _ as *const _, 1);
        }
    }
}

fn change(fd: RawFd, filter: i16, flags: u16, token: usize) -> kevent {
    kevent {
        ident: fd as usize,
        filter,
        flags,
        fflags: 0,
        data: 0,
        udata: token as *mut libc::c_void,
    }
}

impl KqueuePoller {
    /// Creates the kqueue instance and its wake pipe, and registers the
    /// pipe's read end as a persistent wake source.
    pub(crate) fn new() -> Self {
        let kq = unsafe { kqueue() };
        assert!(kq >= 0, "kqueue failed");

        let mut fds = [0 as RawFd; 2];
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        assert!(rc == 0, "wake pipe failed");

        for fd in fds {
            let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
            unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
        }

        let registration = change(fds[0], EVFILT_READ, EV_ADD, WAKE_TOKEN);
        let rc = unsafe { kevent(kq, &registration, 1, ptr::null_mut(), 0, ptr::null()) };
        assert!(rc == 0, "failed to register wake pipe");

        Self {
            kqueue: kq,
            wake_reader: fds[0],
            events: Vec::with_capacity(64),
            waker: Arc::new(Waker(fds[1])),
        }
    }

    /// Returns the poller waker.
    pub(crate) fn waker(&self) -> Arc<Waker> {
        self.waker.clone()
    }

    fn apply(&self, fd: RawFd, token: usize, interest: Interest) {
        // One change per filter; deleting a filter that was never added
        // is harmless and ignored.
        let read_flags = if interest.read { EV_ADD } else { EV_DELETE };
        let write_flags = if interest.write { EV_ADD } else { EV_DELETE };

        let changes = [
            change(fd, EVFILT_READ, read_flags, token),
            change(fd, EVFILT_WRITE, write_flags, token),
        ];

        for registration in &changes {
            unsafe {
                kevent(self.kqueue, registration, 1, ptr::null_mut(), 0, ptr::null());
            }
        }
    }

    /// Registers a file descriptor with the poller.
    pub(crate) fn register(&self, fd: RawFd, token: usize, interest: Interest) {
        self.apply(fd, token, interest);
    }

    /// Updates interest filters for an already registered descriptor.
    pub(crate) fn reregister(&self, fd: RawFd, token: usize, interest: Interest) {
        self.apply(fd, token, interest);
    }

    /// Removes a file descriptor from the poller.
    pub(crate) fn deregister(&self, fd: RawFd) {
        self.apply(
            fd,
            0,
            Interest {
                read: false,
                write: false,
            },
        );
    }

    /// Polls for readiness events.
    pub(crate) fn poll(
        &mut self,
        events: &mut Vec<Event>,
        timeout: Option<Duration>,
    ) -> io::Result<()> {
        let ts = timeout.map(|t| timespec {
            tv_sec: t.as_secs() as libc::time_t,
            tv_nsec: t.subsec_nanos() as libc::c_long,
        });
        let ts_ptr = ts
            .as_ref()
            .map(|ts| ts as *const timespec)
            .unwrap_or(ptr::null());

        unsafe {
            self.events.set_len(self.events.capacity());
        }

        let n = unsafe {
            kevent(
                self.kqueue,
                ptr::null(),
                0,
                self.events.as_mut_ptr(),
                self.events.capacity() as i32,
                ts_ptr,
            )
        };

        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                unsafe {
                    self.events.set_len(0);
                }
                return Ok(());
            }
            return Err(err);
        }

        unsafe {
            self.events.set_len(n as usize);
        }

        events.clear();

        for ev in &self.events {
            let token = ev.udata as usize;

            if token == WAKE_TOKEN {
                // Drain the wake pipe so it can fire again.
                let mut buf = [0u8; 64];
                unsafe {
                    libc::read(self.wake_reader, buf.as_mut_ptr() as *mut _, buf.len());
                }
                continue;
            }

            let error = ev.flags & (EV_ERROR | EV_EOF) != 0;
            let readable = ev.filter == EVFILT_READ || error;
            let writable = ev.filter == EVFILT_WRITE || error;

            if let Some(e) = events.iter_mut().find(|e| e.token == token) {
                e.readable |= readable;
                e.writable |= writable;
            } else {
                events.push(Event {
                    token,
                    readable,
                    writable,
                });
            }
        }

        Ok(())
    }
}
