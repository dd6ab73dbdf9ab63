use fibra::EngineBuilder;

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[test]
fn test_single_worker_runs_routine() {
    let counter = Arc::new(AtomicUsize::new(0));

    let mut engine = EngineBuilder::new().worker_threads(1).build();
    let c = counter.clone();
    engine.start(move |_ctx| {
        c.fetch_add(1, Ordering::SeqCst);
    });
    engine.wait();

    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn test_many_routines_all_run() {
    let completed = Arc::new(Mutex::new(HashSet::new()));

    let mut engine = EngineBuilder::new().worker_threads(4).build();
    for i in 0..100 {
        let completed = completed.clone();
        engine.start(move |_ctx| {
            completed.lock().unwrap().insert(i);
        });
    }
    engine.wait();

    let set = completed.lock().unwrap();
    assert_eq!(set.len(), 100);
    for i in 0..100 {
        assert!(set.contains(&i), "routine {} should have completed", i);
    }
}

#[test]
fn test_chain_spawn() {
    let sum = Arc::new(AtomicUsize::new(0));

    let mut engine = EngineBuilder::new().worker_threads(2).build();
    let outer = sum.clone();
    engine.start(move |ctx| {
        outer.fetch_add(1, Ordering::SeqCst);
        let middle = outer.clone();
        ctx.spawn(move |ctx| {
            middle.fetch_add(10, Ordering::SeqCst);
            let inner = middle.clone();
            ctx.spawn(move |_ctx| {
                inner.fetch_add(100, Ordering::SeqCst);
            });
        });
    });
    engine.wait();

    assert_eq!(sum.load(Ordering::SeqCst), 111);
}

#[test]
fn test_start_on_pins_routine_to_worker() {
    let observed = Arc::new(Mutex::new(Vec::new()));

    let mut engine = EngineBuilder::new().worker_threads(2).build();
    for target in [1, 0, 1] {
        let observed = observed.clone();
        engine.start_on(target, move |ctx| {
            observed.lock().unwrap().push((target, ctx.thread_id()));
        });
    }
    engine.wait();

    for (target, actual) in observed.lock().unwrap().iter() {
        assert_eq!(target, actual);
    }
    assert_eq!(observed.lock().unwrap().len(), 3);
}

#[test]
fn test_yield_round_robin_interleaves() {
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut engine = EngineBuilder::new().worker_threads(1).build();
    for tag in ['a', 'b'] {
        let order = order.clone();
        engine.start(move |ctx| {
            for _ in 0..3 {
                order.lock().unwrap().push(tag);
                ctx.yield_now();
            }
        });
    }
    engine.wait();

    assert_eq!(*order.lock().unwrap(), vec!['a', 'b', 'a', 'b', 'a', 'b']);
}

#[test]
fn test_routine_ids_are_unique() {
    let ids = Arc::new(Mutex::new(HashSet::new()));

    let mut engine = EngineBuilder::new().worker_threads(4).build();
    for _ in 0..32 {
        let ids = ids.clone();
        engine.start(move |ctx| {
            ids.lock().unwrap().insert(ctx.routine_id());
        });
    }
    engine.wait();

    assert_eq!(ids.lock().unwrap().len(), 32);
}

#[test]
#[should_panic(expected = "worker_threads must be > 0")]
fn test_worker_threads_zero_panics() {
    let _ = EngineBuilder::new().worker_threads(0).build();
}

#[test]
fn test_sequential_engines() {
    for n in 1..=4 {
        let counter = Arc::new(AtomicUsize::new(0));

        let mut engine = EngineBuilder::new().worker_threads(n).build();
        let c = counter.clone();
        engine.start(move |_ctx| {
            c.fetch_add(n, Ordering::SeqCst);
        });
        engine.wait();

        assert_eq!(counter.load(Ordering::SeqCst), n);
    }
}

#[fibra::test]
fn test_macro_entry_point(ctx: &mut fibra::Context) {
    let id = ctx.routine_id();
    ctx.yield_now();
    assert_eq!(ctx.routine_id(), id);
}

#[fibra::test(worker_threads = 2)]
fn test_macro_worker_threads(ctx: &mut fibra::Context) {
    assert!(ctx.thread_id() < 2);
}
