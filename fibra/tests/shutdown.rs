use fibra::EngineBuilder;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn test_empty_engine_completes() {
    // Workers with zero outstanding routines report idle, receive the
    // finish command, and exit with exactly one end-of-thread
    // notification each; wait returns.
    let mut engine = EngineBuilder::new().worker_threads(2).build();
    engine.wait();
}

#[test]
fn test_wait_is_idempotent() {
    let mut engine = EngineBuilder::new().worker_threads(2).build();
    engine.wait();
    engine.wait();
}

#[test]
fn test_drop_drives_the_engine() {
    let counter = Arc::new(AtomicUsize::new(0));

    {
        let engine = EngineBuilder::new().worker_threads(1).build();
        let c = counter.clone();
        engine.start(move |_ctx| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        // The engine was never waited on; drop must run the routine to
        // completion and join every thread.
    }

    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn test_run_convenience_entry_point() {
    let counter = Arc::new(AtomicUsize::new(0));

    let c = counter.clone();
    fibra::run(2, move |ctx| {
        let inner = c.clone();
        ctx.spawn(move |_ctx| {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        c.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[test]
fn test_routine_panic_propagates_to_wait() {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let mut engine = EngineBuilder::new().worker_threads(1).build();
        engine.start(|_ctx| {
            panic!("routine exploded");
        });
        engine.wait();
    }));

    assert!(result.is_err());
}
