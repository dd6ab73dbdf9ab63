use fibra::sync::Semaphore;
use fibra::time::sleep;
use fibra::{EngineBuilder, WaitError};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[test]
fn test_initial_permits_do_not_suspend() {
    let acquired = Arc::new(AtomicUsize::new(0));

    let mut engine = EngineBuilder::new().worker_threads(1).build();
    let sema = Semaphore::new(&engine, 2);

    let counter = acquired.clone();
    engine.start(move |ctx| {
        sema.wait(ctx);
        sema.wait(ctx);
        counter.fetch_add(1, Ordering::SeqCst);
    });
    engine.wait();

    assert_eq!(acquired.load(Ordering::SeqCst), 1);
}

#[test]
fn test_post_wakes_waiting_routine() {
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut engine = EngineBuilder::new().worker_threads(2).build();
    let sema = Semaphore::new(&engine, 0);

    let log = order.clone();
    let waiter = sema.clone();
    engine.start(move |ctx| {
        log.lock().unwrap().push("waiting");
        waiter.wait(ctx);
        log.lock().unwrap().push("acquired");
    });

    let log = order.clone();
    engine.start(move |ctx| {
        sleep(ctx, Duration::from_millis(10));
        log.lock().unwrap().push("posting");
        sema.post();
    });

    engine.wait();

    assert_eq!(
        *order.lock().unwrap(),
        vec!["waiting", "posting", "acquired"]
    );
}

#[test]
fn test_no_wake_is_lost_under_storm() {
    // Every post must resume exactly one waiter; losing a single wake
    // would leave a routine parked forever and hang the engine.
    const WAITERS: usize = 16;

    let resumed = Arc::new(AtomicUsize::new(0));

    let mut engine = EngineBuilder::new().worker_threads(4).build();
    let sema = Semaphore::new(&engine, 0);

    for _ in 0..WAITERS {
        let sema = sema.clone();
        let counter = resumed.clone();
        engine.start(move |ctx| {
            sema.wait(ctx);
            counter.fetch_add(1, Ordering::SeqCst);
        });
    }

    engine.start(move |ctx| {
        for _ in 0..WAITERS {
            sema.post();
            ctx.yield_now();
        }
    });

    engine.wait();

    assert_eq!(resumed.load(Ordering::SeqCst), WAITERS);
}

#[test]
fn test_post_from_plain_thread() {
    let acquired = Arc::new(AtomicUsize::new(0));

    let mut engine = EngineBuilder::new().worker_threads(1).build();
    let sema = Semaphore::new(&engine, 0);

    let counter = acquired.clone();
    let waiter = sema.clone();
    engine.start(move |ctx| {
        waiter.wait(ctx);
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let poster = thread::spawn(move || {
        thread::sleep(Duration::from_millis(10));
        sema.post();
    });

    engine.wait();
    poster.join().unwrap();

    assert_eq!(acquired.load(Ordering::SeqCst), 1);
}

#[test]
fn test_wait_timeout_expires_without_post() {
    let outcome = Arc::new(Mutex::new(None));

    let mut engine = EngineBuilder::new().worker_threads(1).build();
    let sema = Semaphore::new(&engine, 0);

    let slot = outcome.clone();
    engine.start(move |ctx| {
        let result = sema.wait_timeout(ctx, Duration::from_millis(5));
        *slot.lock().unwrap() = Some(matches!(result, Err(WaitError::TimedOut)));
    });
    engine.wait();

    assert_eq!(*outcome.lock().unwrap(), Some(true));
}

#[test]
fn test_timed_out_waiter_does_not_steal_later_post() {
    // The first waiter gives up before the post arrives; the ticket
    // must go to the second waiter.
    let winner = Arc::new(Mutex::new(None));

    let mut engine = EngineBuilder::new().worker_threads(1).build();
    let sema = Semaphore::new(&engine, 0);

    let first = sema.clone();
    engine.start(move |ctx| {
        let _ = first.wait_timeout(ctx, Duration::from_millis(5));
    });

    let slot = winner.clone();
    let second = sema.clone();
    engine.start(move |ctx| {
        second.wait(ctx);
        *slot.lock().unwrap() = Some("second");
    });

    engine.start(move |ctx| {
        sleep(ctx, Duration::from_millis(20));
        sema.post();
    });

    engine.wait();

    assert_eq!(*winner.lock().unwrap(), Some("second"));
}
