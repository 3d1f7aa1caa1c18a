//! The process-wide reactor/worker pool.
//!
//! The pool owns every reactor and worker thread for the life of the
//! process. It is configured once, idempotently, through
//! [`ThreadPool::initialize`]; first access to [`ThreadPool::instance`]
//! applies CPU-count defaults if nothing was configured, then spawns the
//! full set of named threads.
//!
//! Handles are dispensed round-robin by an atomic index taken modulo the
//! configured count, so `count + k` requests reuse the same `count` threads
//! before anything else happens. The maps keep a defensive lazy-create path
//! for names that are unexpectedly absent (only reachable after
//! [`ThreadPool::shutdown`]); the configured counts themselves never grow.

use crate::error::Result;
use crate::reactor::Reactor;
use crate::worker::Worker;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

struct Config {
    pollers: usize,
    workers: usize,
    pin_affinity: bool,

    /// Set under the same lock as the counts, so a configuration is either
    /// fully visible or not applied at all.
    applied: bool,
}

static CONFIG: Mutex<Config> = Mutex::new(Config {
    pollers: 0,
    workers: 0,
    pin_affinity: true,
    applied: false,
});

static POOL: Lazy<ThreadPool> = Lazy::new(ThreadPool::from_config);

/// Owner of the process's reactor (`poller-<i>`) and worker (`worker-<i>`)
/// threads.
pub struct ThreadPool {
    pollers: Mutex<HashMap<String, Arc<Reactor>>>,
    workers: Mutex<HashMap<String, Arc<Worker>>>,

    poller_index: AtomicUsize,
    worker_index: AtomicUsize,

    poller_count: usize,
    worker_count: usize,
    pin_affinity: bool,
}

impl ThreadPool {
    /// Configures the pool. One-time and idempotent: every call after the
    /// first is a no-op, regardless of arguments.
    ///
    /// A count of `0` means "use the detected CPU count"; explicit counts
    /// are clamped to `[2, 2 * cpus]`.
    pub fn initialize(poller_threads: usize, worker_threads: usize, pin_affinity: bool) {
        let mut config = CONFIG.lock();
        if config.applied {
            return;
        }

        let cpus = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        *config = Config {
            pollers: resolve_count(poller_threads, cpus),
            workers: resolve_count(worker_threads, cpus),
            pin_affinity,
            applied: true,
        };
    }

    /// The process-wide pool, created on first access.
    ///
    /// # Panics
    ///
    /// Panics on first access if a loop thread cannot be started at all
    /// (e.g. epoll creation fails); such a failure is fatal to the runtime
    /// and is surfaced rather than swallowed.
    pub fn instance() -> &'static ThreadPool {
        &POOL
    }

    fn from_config() -> Self {
        // First use without an explicit initialize: CPU-count defaults.
        Self::initialize(0, 0, true);

        let (poller_count, worker_count, pin_affinity) = {
            let config = CONFIG.lock();
            (config.pollers, config.workers, config.pin_affinity)
        };

        let pool = ThreadPool {
            pollers: Mutex::new(HashMap::with_capacity(poller_count)),
            workers: Mutex::new(HashMap::with_capacity(worker_count)),
            poller_index: AtomicUsize::new(0),
            worker_index: AtomicUsize::new(0),
            poller_count,
            worker_count,
            pin_affinity,
        };

        {
            let mut pollers = pool.pollers.lock();
            for index in 0..poller_count {
                let name = format!("poller-{index}");
                let reactor = must_start(Reactor::start(&name, pool.pin(index)), &name);
                pollers.insert(name, reactor);
            }
        }

        {
            let mut workers = pool.workers.lock();
            for index in 0..worker_count {
                let name = format!("worker-{index}");
                let worker = must_start(Worker::start(&name, pool.pin(index)), &name);
                workers.insert(name, worker);
            }
        }

        pool
    }

    /// Returns a reactor handle, round-robin over the configured set.
    pub fn get_poller(&self) -> Arc<Reactor> {
        let index = self.poller_index.fetch_add(1, Ordering::Relaxed) % self.poller_count;
        let name = format!("poller-{index}");

        let mut pollers = self.pollers.lock();
        pollers
            .entry(name.clone())
            .or_insert_with(|| must_start(Reactor::start(&name, self.pin(index)), &name))
            .clone()
    }

    /// Returns a worker handle, round-robin over the configured set.
    pub fn get_worker(&self) -> Arc<Worker> {
        let index = self.worker_index.fetch_add(1, Ordering::Relaxed) % self.worker_count;
        let name = format!("worker-{index}");

        let mut workers = self.workers.lock();
        workers
            .entry(name.clone())
            .or_insert_with(|| must_start(Worker::start(&name, self.pin(index)), &name))
            .clone()
    }

    pub fn poller_count(&self) -> usize {
        self.poller_count
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Deterministic teardown point: drops the pool's handle to every owned
    /// thread. Each thread stops and is joined as its last handle goes away,
    /// so a caller still holding a handle delays only that thread's join.
    pub fn shutdown(&self) {
        self.pollers.lock().clear();
        self.workers.lock().clear();
    }

    fn pin(&self, index: usize) -> Option<usize> {
        self.pin_affinity.then_some(index)
    }
}

fn resolve_count(requested: usize, cpus: usize) -> usize {
    if requested == 0 {
        cpus
    } else {
        requested.clamp(2, cpus * 2)
    }
}

fn must_start<T>(started: Result<Arc<T>>, name: &str) -> Arc<T> {
    match started {
        Ok(handle) => handle,
        Err(e) => panic!("failed to start pool thread {name}: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_means_cpu_count() {
        let cpus = 8;
        assert_eq!(resolve_count(0, cpus), 8);
    }

    #[test]
    fn explicit_counts_are_clamped() {
        let cpus = 4;
        assert_eq!(resolve_count(1, cpus), 2);
        assert_eq!(resolve_count(3, cpus), 3);
        assert_eq!(resolve_count(100, cpus), 8);
    }

    #[test]
    fn single_cpu_still_gets_two_threads() {
        assert_eq!(resolve_count(1, 1), 2);
        assert_eq!(resolve_count(0, 1), 1);
    }

    #[test]
    fn racing_initializers_never_observe_zero_counts() {
        // Whoever loses the race must still see the winner's complete
        // configuration once its own initialize call returns.
        let mut racers = Vec::new();
        for _ in 0..8 {
            racers.push(thread::spawn(|| {
                ThreadPool::initialize(2, 2, false);
                let config = CONFIG.lock();
                assert!(config.applied);
                assert!(config.pollers >= 2, "partial configuration observed");
                assert!(config.workers >= 2, "partial configuration observed");
            }));
        }
        for racer in racers {
            racer.join().unwrap();
        }
    }
}
