use crate::reactor::command::{Command, Tag};
use crate::reactor::event::{Direction, Event};
use crate::reactor::poller::{Interest, Poller, Waker};
use crate::utils::Slab;
use crate::worker::command::{Command as WorkerCommand, WorkerHandle};

use std::collections::HashMap;
use std::io;
use std::os::fd::RawFd;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread::{self, JoinHandle};

use log::debug;

/// Handle used by workers (and the engine) to talk to the reactor.
///
/// Sending wakes the poller so a registration takes effect even while
/// the reactor is blocked waiting for readiness.
#[derive(Clone)]
pub(crate) struct ReactorHandle {
    sender: Sender<Command>,
    waker: Arc<Waker>,
}

impl ReactorHandle {
    pub(crate) fn send(&self, command: Command) {
        // A send can only fail after the reactor exited during engine
        // teardown, when no routine is left to care about the fd.
        let _ = self.sender.send(command);
        self.waker.wake();
    }
}

/// Interest registered for one file descriptor.
///
/// At most one waiter per direction; a delivered event consumes its
/// tag, making every registration one-shot.
struct FdEntry {
    fd: RawFd,
    read: Option<Tag>,
    write: Option<Tag>,
}

impl FdEntry {
    fn interest(&self) -> Interest {
        Interest {
            read: self.read.is_some(),
            write: self.write.is_some(),
        }
    }
}

/// The reactor: platform poller plus fd registration table.
///
/// Runs on a dedicated thread. Readiness is routed to the registered
/// worker's command queue; the table is only ever touched here, so no
/// locking is needed around it.
pub(crate) struct Reactor {
    receiver: Receiver<Command>,
    poller: Poller,
    events: Vec<Event>,
    entries: Slab<FdEntry>,
    tokens: HashMap<RawFd, usize>,
    workers: Vec<WorkerHandle>,
}

impl Reactor {
    /// Starts the reactor thread and returns its handle.
    pub(crate) fn start(workers: Vec<WorkerHandle>) -> (ReactorHandle, JoinHandle<()>) {
        let (sender, receiver) = channel();
        let poller = Poller::new();
        let waker = poller.waker();

        let mut reactor = Self {
            receiver,
            poller,
            events: Vec::with_capacity(64),
            entries: Slab::new(64),
            tokens: HashMap::new(),
            workers,
        };

        let handle = thread::Builder::new()
            .name("fibra-reactor".to_string())
            .spawn(move || {
                if let Err(error) = reactor.run() {
                    debug!("reactor stopped on error: {}", error);
                }
            })
            .expect("failed to spawn reactor thread");

        (ReactorHandle { sender, waker }, handle)
    }

    fn run(&mut self) -> io::Result<()> {
        debug!("reactor started");

        loop {
            while let Ok(command) = self.receiver.try_recv() {
                match command {
                    Command::Register {
                        fd,
                        direction,
                        tag,
                    } => self.register(fd, direction, tag),
                    Command::Unregister { fd, direction } => self.unregister(fd, direction),
                    Command::Shutdown => {
                        debug!("reactor finished");
                        return Ok(());
                    }
                }
            }

            let mut events = std::mem::take(&mut self.events);
            self.poller.poll(&mut events, None)?;

            for event in &events {
                self.dispatch(event);
            }

            self.events = events;
        }
    }

    fn register(&mut self, fd: RawFd, direction: Direction, tag: Tag) {
        match self.tokens.get(&fd).copied() {
            Some(token) => {
                let entry = self
                    .entries
                    .get_mut(token)
                    .expect("fd table out of sync with token map");
                match direction {
                    Direction::Read => entry.read = Some(tag),
                    Direction::Write => entry.write = Some(tag),
                }
                let interest = entry.interest();
                self.poller.reregister(fd, token, interest);
            }
            None => {
                let mut entry = FdEntry {
                    fd,
                    read: None,
                    write: None,
                };
                match direction {
                    Direction::Read => entry.read = Some(tag),
                    Direction::Write => entry.write = Some(tag),
                }
                let interest = entry.interest();
                let token = self.entries.insert(entry);
                self.tokens.insert(fd, token);
                self.poller.register(fd, token, interest);
            }
        }
    }

    fn unregister(&mut self, fd: RawFd, direction: Direction) {
        let Some(&token) = self.tokens.get(&fd) else {
            return;
        };

        let interest = {
            let entry = self
                .entries
                .get_mut(token)
                .expect("fd table out of sync with token map");
            match direction {
                Direction::Read => entry.read = None,
                Direction::Write => entry.write = None,
            }
            entry.interest()
        };

        if interest.read || interest.write {
            self.poller.reregister(fd, token, interest);
        } else {
            self.poller.deregister(fd);
            self.entries.remove(token);
            self.tokens.remove(&fd);
        }
    }

    /// Routes one readiness event to the worker that registered it.
    fn dispatch(&mut self, event: &Event) {
        let Some(entry) = self.entries.get_mut(event.token) else {
            // Stale event for an entry dropped by an unregister.
            return;
        };
        let fd = entry.fd;

        let mut delivered = false;

        if event.readable {
            if let Some(tag) = entry.read.take() {
                self.workers[tag.thread].push(WorkerCommand::FdReady {
                    fd,
                    slot: tag.slot,
                    direction: Direction::Read,
                });
                delivered = true;
            }
        }

        if event.writable {
            if let Some(tag) = entry.write.take() {
                self.workers[tag.thread].push(WorkerCommand::FdReady {
                    fd,
                    slot: tag.slot,
                    direction: Direction::Write,
                });
                delivered = true;
            }
        }

        if !delivered {
            return;
        }

        let interest = {
            let entry = self.entries.get(event.token).unwrap();
            entry.interest()
        };

        if interest.read || interest.write {
            self.poller.reregister(fd, event.token, interest);
        } else {
            self.poller.deregister(fd);
            self.entries.remove(event.token);
            self.tokens.remove(&fd);
        }
    }
}
