use fibra::time::sleep;
use fibra::{EngineBuilder, WaitError, io};

use std::sync::{Arc, Mutex};
use std::time::Duration;

#[test]
fn test_pipe_roundtrip() {
    let (reader, writer) = io::pipe().unwrap();
    let received = Arc::new(Mutex::new(Vec::new()));

    let mut engine = EngineBuilder::new().worker_threads(1).build();

    let sink = received.clone();
    engine.start(move |ctx| {
        let mut buffer = [0u8; 8];
        let n = io::read(ctx, reader, &mut buffer, None).unwrap();
        sink.lock().unwrap().extend_from_slice(&buffer[..n]);
    });

    engine.start(move |ctx| {
        let n = io::write(ctx, writer, b"fibra!", None).unwrap();
        assert_eq!(n, 6);
    });

    engine.wait();

    assert_eq!(&*received.lock().unwrap(), b"fibra!");

    io::close(reader);
    io::close(writer);
}

#[test]
fn test_read_timeout_then_retry_succeeds() {
    // A read with a 5ms timeout first loses against the timer, then a
    // retry without a timeout succeeds once the partner's delayed write
    // lands.
    let (reader, writer) = io::pipe().unwrap();
    let outcomes = Arc::new(Mutex::new(Vec::new()));

    let mut engine = EngineBuilder::new().worker_threads(1).build();

    let log = outcomes.clone();
    engine.start(move |ctx| {
        let mut buffer = [0u8; 8];

        let first = io::read(ctx, reader, &mut buffer, Some(Duration::from_millis(5)));
        log.lock()
            .unwrap()
            .push(matches!(first, Err(WaitError::TimedOut)));

        let second = io::read(ctx, reader, &mut buffer, None);
        log.lock().unwrap().push(matches!(second, Ok(8)));
    });

    engine.start(move |ctx| {
        sleep(ctx, Duration::from_millis(10));
        let n = io::write(ctx, writer, &0u64.to_ne_bytes(), None).unwrap();
        assert_eq!(n, 8);
    });

    engine.wait();

    assert_eq!(*outcomes.lock().unwrap(), vec![true, true]);

    io::close(reader);
    io::close(writer);
}

#[test]
fn test_wait_readable_timeout() {
    let (reader, writer) = io::pipe().unwrap();
    let timed_out = Arc::new(Mutex::new(false));

    let mut engine = EngineBuilder::new().worker_threads(1).build();
    let flag = timed_out.clone();
    engine.start(move |ctx| {
        let result = io::wait_readable(ctx, reader, Some(Duration::from_millis(5)));
        *flag.lock().unwrap() = matches!(result, Err(WaitError::TimedOut));
    });
    engine.wait();

    assert!(*timed_out.lock().unwrap());

    io::close(reader);
    io::close(writer);
}

#[test]
fn test_cross_worker_pipe() {
    // Reader and writer pinned to different workers; readiness is
    // routed to the reader's worker through the reactor.
    let (reader, writer) = io::pipe().unwrap();
    let received = Arc::new(Mutex::new(0usize));

    let mut engine = EngineBuilder::new().worker_threads(2).build();

    let sink = received.clone();
    engine.start_on(0, move |ctx| {
        let mut buffer = [0u8; 4];
        *sink.lock().unwrap() = io::read(ctx, reader, &mut buffer, None).unwrap();
    });

    engine.start_on(1, move |ctx| {
        sleep(ctx, Duration::from_millis(5));
        io::write(ctx, writer, b"ping", None).unwrap();
    });

    engine.wait();

    assert_eq!(*received.lock().unwrap(), 4);

    io::close(reader);
    io::close(writer);
}
