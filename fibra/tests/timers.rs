use fibra::EngineBuilder;
use fibra::time::{sleep, sleep_until};

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[test]
fn test_timers_fire_in_deadline_order() {
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut engine = EngineBuilder::new().worker_threads(1).build();
    for (tag, delay_ms) in [('a', 10), ('b', 5), ('c', 20)] {
        let order = order.clone();
        engine.start(move |ctx| {
            sleep(ctx, Duration::from_millis(delay_ms));
            order.lock().unwrap().push(tag);
        });
    }
    engine.wait();

    assert_eq!(*order.lock().unwrap(), vec!['b', 'a', 'c']);
}

#[test]
fn test_sleep_waits_at_least_the_duration() {
    let elapsed = Arc::new(Mutex::new(Duration::ZERO));

    let mut engine = EngineBuilder::new().worker_threads(1).build();
    let slot = elapsed.clone();
    engine.start(move |ctx| {
        let started = Instant::now();
        sleep(ctx, Duration::from_millis(20));
        *slot.lock().unwrap() = started.elapsed();
    });
    engine.wait();

    assert!(*elapsed.lock().unwrap() >= Duration::from_millis(20));
}

#[fibra::test]
fn test_sleep_until_past_deadline_returns(ctx: &mut fibra::Context) {
    sleep_until(ctx, Instant::now() - Duration::from_millis(5));
}

#[test]
fn test_sleeping_routines_share_a_worker() {
    // Two routines sleeping on the same worker: the total runtime is
    // bounded by the longest sleep, not the sum, because only the
    // routines suspend.
    let started = Instant::now();

    let mut engine = EngineBuilder::new().worker_threads(1).build();
    for _ in 0..4 {
        engine.start(move |ctx| {
            sleep(ctx, Duration::from_millis(30));
        });
    }
    engine.wait();

    assert!(started.elapsed() < Duration::from_millis(120));
}
