use vigil::{Reactor, Timer};

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn fires_no_earlier_than_the_delay() {
    let reactor = Reactor::start("delay-early", None).unwrap();

    let (tx, rx) = mpsc::channel();
    let armed = Instant::now();
    reactor
        .delay_task(50, move || {
            let _ = tx.send(armed.elapsed());
            0
        })
        .unwrap();

    let elapsed = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(
        elapsed >= Duration::from_millis(50),
        "fired after {elapsed:?}, before the 50ms deadline"
    );
}

#[test]
fn recurring_task_runs_three_times_then_stops() {
    let reactor = Reactor::start("delay-recur", None).unwrap();

    let hits = Arc::new(AtomicU32::new(0));
    let counted = hits.clone();
    reactor
        .delay_task(20, move || {
            let n = counted.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 { 20 } else { 0 }
        })
        .unwrap();

    thread::sleep(Duration::from_millis(150));
    assert_eq!(hits.load(Ordering::SeqCst), 3);

    // Returning zero retired the task for good.
    thread::sleep(Duration::from_millis(60));
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[test]
fn tasks_sharing_a_deadline_both_fire() {
    let reactor = Reactor::start("delay-ties", None).unwrap();

    let hits = Arc::new(AtomicU32::new(0));
    for _ in 0..2 {
        let counted = hits.clone();
        reactor
            .delay_task(30, move || {
                counted.fetch_add(1, Ordering::SeqCst);
                0
            })
            .unwrap();
    }

    thread::sleep(Duration::from_millis(120));
    assert_eq!(
        hits.load(Ordering::SeqCst),
        2,
        "deadline ties must preserve multiplicity, never overwrite"
    );
}

#[test]
fn zero_delay_is_rejected() {
    let reactor = Reactor::start("delay-zero", None).unwrap();
    assert!(reactor.delay_task(0, || 0).is_none());
}

#[test]
fn cancel_before_the_deadline_is_a_no_op_run() {
    let reactor = Reactor::start("delay-cancel", None).unwrap();

    let hits = Arc::new(AtomicU32::new(0));
    let counted = hits.clone();
    let task = reactor
        .delay_task(40, move || {
            counted.fetch_add(1, Ordering::SeqCst);
            0
        })
        .unwrap();

    task.cancel();

    thread::sleep(Duration::from_millis(120));
    assert_eq!(
        hits.load(Ordering::SeqCst),
        0,
        "a cancelled task must never execute"
    );
}

#[test]
fn reactor_shutdown_force_cancels_pending_tasks() {
    let reactor = Reactor::start("delay-shutdown", None).unwrap();

    let task = reactor.delay_task(60_000, || 0).unwrap();
    assert!(task.is_alive());

    drop(reactor);

    assert!(
        !task.is_alive(),
        "shutdown must drop the strong owner of every pending delayed task"
    );
}

#[test]
fn panicking_delayed_task_does_not_kill_the_loop() {
    let reactor = Reactor::start("delay-panic", None).unwrap();

    reactor.delay_task(10, || panic!("timer blew up")).unwrap();

    let (tx, rx) = mpsc::channel();
    reactor
        .delay_task(40, move || {
            let _ = tx.send(());
            0
        })
        .unwrap();

    assert!(
        rx.recv_timeout(Duration::from_secs(5)).is_ok(),
        "the reactor must keep sweeping deadlines after a panic"
    );
}

#[test]
fn timer_cancels_on_drop() {
    let reactor = Reactor::start("timer-drop", None).unwrap();

    let hits = Arc::new(AtomicU32::new(0));
    let counted = hits.clone();
    let timer = Timer::new(
        40,
        move || {
            counted.fetch_add(1, Ordering::SeqCst);
            40
        },
        Some(reactor.clone()),
    )
    .unwrap();

    drop(timer);

    thread::sleep(Duration::from_millis(120));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[test]
fn timer_repeats_until_cancelled() {
    let reactor = Reactor::start("timer-repeat", None).unwrap();

    let hits = Arc::new(AtomicU32::new(0));
    let counted = hits.clone();
    let timer = Timer::new(
        20,
        move || {
            counted.fetch_add(1, Ordering::SeqCst);
            20
        },
        Some(reactor.clone()),
    )
    .unwrap();

    thread::sleep(Duration::from_millis(110));
    timer.cancel();
    let after_cancel = hits.load(Ordering::SeqCst);

    assert!(
        after_cancel >= 3,
        "a 20ms repeating timer should tick several times in 110ms, got {after_cancel}"
    );

    thread::sleep(Duration::from_millis(60));
    assert_eq!(
        hits.load(Ordering::SeqCst),
        after_cancel,
        "no ticks may arrive after cancel"
    );
}
