use fibra::time::sleep;
use fibra::{EventRound, EventStatus, io, run};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[test]
fn test_two_pipes_resolve_in_write_order() {
    // The first multi-way wait resolves to pipe B, and after a
    // handshake the second one resolves to pipe A.
    let (reader_a, writer_a) = io::pipe().unwrap();
    let (reader_b, writer_b) = io::pipe().unwrap();
    let winners = Arc::new(Mutex::new(Vec::new()));

    let log = winners.clone();
    run(1, move |ctx| {
        let (ticket_tx, ticket_rx) = ctx.channel(1);

        let log = log.clone();
        ctx.spawn(move |ctx| {
            let mut buffer = [0u8; 8];

            let mut round = EventRound::new();
            let _a = round.add_read(reader_a);
            let b = round.add_read(reader_b);
            let result = round.commit(ctx);
            log.lock()
                .unwrap()
                .push(if result.index == b { 'b' } else { 'a' });
            io::read(ctx, reader_b, &mut buffer, None).unwrap();

            ticket_tx.send(ctx, ());

            let mut round = EventRound::new();
            let a = round.add_read(reader_a);
            let _b = round.add_read(reader_b);
            let result = round.commit(ctx);
            log.lock()
                .unwrap()
                .push(if result.index == a { 'a' } else { 'b' });
            io::read(ctx, reader_a, &mut buffer, None).unwrap();
        });

        ctx.spawn(move |ctx| {
            io::write(ctx, writer_b, &0u64.to_ne_bytes(), None).unwrap();
            // Wait for the partner to observe B before making A ready.
            ticket_rx.recv(ctx);
            io::write(ctx, writer_a, &0u64.to_ne_bytes(), None).unwrap();
        });
    });

    assert_eq!(*winners.lock().unwrap(), vec!['b', 'a']);

    for fd in [reader_a, writer_a, reader_b, writer_b] {
        io::close(fd);
    }
}

#[test]
fn test_at_most_one_winner() {
    // Two sources fire "simultaneously": the routine resumes exactly
    // once, with exactly one winning reason.
    let (reader_a, writer_a) = io::pipe().unwrap();
    let (reader_b, writer_b) = io::pipe().unwrap();

    let resumes = Arc::new(AtomicUsize::new(0));
    let winner = Arc::new(Mutex::new(None));

    let counter = resumes.clone();
    let observed = winner.clone();
    run(1, move |ctx| {
        let counter = counter.clone();
        let observed = observed.clone();
        ctx.spawn(move |ctx| {
            let mut round = EventRound::new();
            let a = round.add_read(reader_a);
            let b = round.add_read(reader_b);
            let timer = round.add_timeout(Duration::from_millis(50));
            let result = round.commit(ctx);

            counter.fetch_add(1, Ordering::SeqCst);
            *observed.lock().unwrap() = Some((result, a, b, timer));
        });

        ctx.spawn(move |ctx| {
            sleep(ctx, Duration::from_millis(5));
            io::write(ctx, writer_a, b"x", None).unwrap();
            io::write(ctx, writer_b, b"x", None).unwrap();
            // Give the losing delivery time to race before the engine
            // drains; it must no-op against the consumed slot.
            sleep(ctx, Duration::from_millis(20));
        });
    });

    assert_eq!(resumes.load(Ordering::SeqCst), 1);

    let (result, a, b, timer) = winner.lock().unwrap().take().unwrap();
    assert_eq!(result.status, EventStatus::Ready);
    assert!(result.index == a || result.index == b);
    assert_ne!(result.index, timer);

    for fd in [reader_a, writer_a, reader_b, writer_b] {
        io::close(fd);
    }
}

#[test]
fn test_timeout_is_just_another_source() {
    // No source fires: the timer wins and delivers the distinguished
    // timed-out result.
    let (reader, writer) = io::pipe().unwrap();
    let observed = Arc::new(Mutex::new(None));

    let slot = observed.clone();
    run(1, move |ctx| {
        let slot = slot.clone();
        ctx.spawn(move |ctx| {
            let mut round = EventRound::new();
            let _fd = round.add_read(reader);
            let timer = round.add_timeout(Duration::from_millis(5));
            let result = round.commit(ctx);
            *slot.lock().unwrap() = Some((result, timer));
        });
    });

    let (result, timer) = observed.lock().unwrap().take().unwrap();
    assert_eq!(result.index, timer);
    assert_eq!(result.status, EventStatus::TimedOut);

    io::close(reader);
    io::close(writer);
}

#[test]
fn test_mixed_semaphore_and_timer_round() {
    // A semaphore and a timer compete; the post lands first.
    let observed = Arc::new(Mutex::new(None));

    let slot = observed.clone();
    run(2, move |ctx| {
        let sema = ctx.semaphore(0);
        let poster = sema.clone();

        let slot = slot.clone();
        ctx.spawn(move |ctx| {
            let mut round = EventRound::new();
            let ticket = round.add_semaphore(&sema);
            let _timer = round.add_timeout(Duration::from_millis(100));
            let result = round.commit(ctx);
            *slot.lock().unwrap() = Some((result, ticket));
        });

        ctx.spawn(move |ctx| {
            sleep(ctx, Duration::from_millis(5));
            poster.post();
        });
    });

    let (result, ticket) = observed.lock().unwrap().take().unwrap();
    assert_eq!(result.index, ticket);
    assert_eq!(result.status, EventStatus::Ready);
}
