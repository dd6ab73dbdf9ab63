use crate::engine::core::{Engine, EngineShared};
use crate::error::WaitError;
use crate::routine::context::Context;
use crate::sync::semaphore::Semaphore;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

/// Buffer and flow control shared by all endpoints of one channel.
///
/// `space` counts free buffer slots, `items` counts queued elements;
/// every queued element is paired with exactly one `items` ticket, so a
/// receiver that acquired a ticket always finds an element.
struct ChannelShared<T> {
    queue: Mutex<VecDeque<T>>,
    space: Semaphore,
    items: Semaphore,
}

/// Creates a bounded channel on `engine` with room for `capacity`
/// elements.
///
/// Senders suspend while the buffer is full, receivers while it is
/// empty. Both endpoints are cloneable; elements go to receivers in
/// arrival order.
///
/// # Panics
///
/// Panics if `capacity == 0`.
///
/// # Examples
///
/// ```rust,ignore
/// let (sender, receiver) = sync::channel(&engine, 4);
///
/// engine.start(move |ctx| {
///     sender.send(ctx, 1);
/// });
/// engine.start(move |ctx| {
///     let value = receiver.recv(ctx);
/// });
/// ```
pub fn channel<T: Send>(engine: &Engine, capacity: usize) -> (Sender<T>, Receiver<T>) {
    channel_with_engine(Arc::downgrade(engine.shared()), capacity)
}

pub(crate) fn channel_with_engine<T: Send>(
    engine: Weak<EngineShared>,
    capacity: usize,
) -> (Sender<T>, Receiver<T>) {
    assert!(capacity > 0, "channel capacity must be > 0");

    let shared = Arc::new(ChannelShared {
        queue: Mutex::new(VecDeque::with_capacity(capacity)),
        space: Semaphore::with_engine(engine.clone(), capacity),
        items: Semaphore::with_engine(engine, 0),
    });

    (
        Sender {
            shared: shared.clone(),
        },
        Receiver { shared },
    )
}

/// Sending endpoint of a bounded channel.
pub struct Sender<T> {
    shared: Arc<ChannelShared<T>>,
}

impl<T: Send> Sender<T> {
    /// Sends `value`, suspending while the buffer is full.
    pub fn send(&self, ctx: &mut Context, value: T) {
        self.shared.space.wait(ctx);
        self.shared.queue.lock().unwrap().push_back(value);
        self.shared.items.post();
    }

    /// Sends without suspending; gives the value back if the buffer is
    /// full.
    pub fn try_send(&self, value: T) -> Result<(), T> {
        if !self.shared.space.try_wait() {
            return Err(value);
        }
        self.shared.queue.lock().unwrap().push_back(value);
        self.shared.items.post();
        Ok(())
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

/// Receiving endpoint of a bounded channel.
pub struct Receiver<T> {
    shared: Arc<ChannelShared<T>>,
}

impl<T: Send> Receiver<T> {
    /// Receives the next element, suspending while the buffer is empty.
    pub fn recv(&self, ctx: &mut Context) -> T {
        self.shared.items.wait(ctx);
        self.take()
    }

    /// Receives with a timeout.
    pub fn recv_timeout(&self, ctx: &mut Context, timeout: Duration) -> Result<T, WaitError> {
        self.shared.items.wait_timeout(ctx, timeout)?;
        Ok(self.take())
    }

    /// Receives without suspending, if an element is queued.
    pub fn try_recv(&self) -> Option<T> {
        if !self.shared.items.try_wait() {
            return None;
        }
        Some(self.take())
    }

    fn take(&self) -> T {
        let value = self
            .shared
            .queue
            .lock()
            .unwrap()
            .pop_front()
            .expect("channel ticket without a queued element");
        self.shared.space.post();
        value
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}
