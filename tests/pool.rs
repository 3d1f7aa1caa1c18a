use vigil::ThreadPool;

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// The pool is process-wide state, so its configuration, dispensing, and
// teardown behavior is exercised in one sequential test.
#[test]
fn pool_lifecycle() {
    // Explicit configuration wins over the CPU-count default.
    ThreadPool::initialize(2, 2, false);

    // A second call with different arguments is a no-op.
    ThreadPool::initialize(7, 9, true);

    let pool = ThreadPool::instance();
    assert_eq!(pool.poller_count(), 2, "initialize must be idempotent");
    assert_eq!(pool.worker_count(), 2, "initialize must be idempotent");

    // Round-robin: count + k requests reuse the same count threads.
    let mut poller_names = Vec::new();
    for _ in 0..6 {
        poller_names.push(ThreadPool::instance().get_poller().name().to_string());
    }
    assert_eq!(poller_names[0], poller_names[2]);
    assert_eq!(poller_names[0], poller_names[4]);
    assert_eq!(poller_names[1], poller_names[3]);
    assert_ne!(poller_names[0], poller_names[1]);

    let mut worker_names = Vec::new();
    for _ in 0..6 {
        worker_names.push(ThreadPool::instance().get_worker().name().to_string());
    }
    assert_eq!(worker_names[0], worker_names[2]);
    assert_ne!(worker_names[0], worker_names[1]);

    // Every dispensed handle is live and does real work.
    let (tx, rx) = mpsc::channel();
    let poller_tx = tx.clone();
    pool.get_poller().submit(move || {
        let _ = poller_tx.send("poller");
    });
    pool.get_worker().submit(move || {
        let _ = tx.send("worker");
    });

    let mut seen = vec![
        rx.recv_timeout(Duration::from_secs(5)).unwrap(),
        rx.recv_timeout(Duration::from_secs(5)).unwrap(),
    ];
    seen.sort();
    assert_eq!(seen, vec!["poller", "worker"]);

    // Deterministic teardown joins the owned threads; the defensive
    // lazy-create path then restores entries on demand.
    pool.shutdown();

    let revived = pool.get_worker();
    let (tx, rx) = mpsc::channel();
    revived.submit(move || {
        let _ = tx.send(());
    });
    assert!(
        rx.recv_timeout(Duration::from_secs(5)).is_ok(),
        "a name missing from the map must be recreated lazily"
    );
}

#[test]
fn end_to_end_ordering_through_one_worker_handle() {
    ThreadPool::initialize(2, 2, false);

    let worker = ThreadPool::instance().get_worker();
    let log = Arc::new(Mutex::new(Vec::with_capacity(1000)));

    for i in 0..1000 {
        let log = log.clone();
        worker.submit(move || {
            log.lock().unwrap().push(i);
        });
    }

    let (tx, rx) = mpsc::channel();
    worker.submit(move || {
        let _ = tx.send(());
    });
    rx.recv_timeout(Duration::from_secs(5)).unwrap();

    assert!(
        log.lock().unwrap().iter().copied().eq(0..1000),
        "submissions through one handle must execute in order"
    );
}
