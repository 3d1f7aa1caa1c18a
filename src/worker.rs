//! Worker: a serial, pull-based task executor.
//!
//! A worker binds one blocking [`TaskQueue`](crate::queue::TaskQueue) to one
//! OS thread. Its loop is deliberately simple: mark the load estimator
//! sleeping, block on the queue, mark awake, run the callback. Callbacks run
//! strictly serially; a panic is contained at the loop boundary.

use crate::error::{Error, Result};
use crate::load::LoadEstimator;
use crate::queue::TaskQueue;
use crate::task::{Priority, Task};

use parking_lot::Mutex;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};

struct Shared {
    name: String,
    queue: TaskQueue<Task>,
    load: LoadEstimator,
    tid: OnceLock<ThreadId>,
}

/// A thread running an order-preserving task queue.
pub struct Worker {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    /// Spawns the worker thread. `pin_cpu` optionally pins it to one CPU.
    pub fn start(name: &str, pin_cpu: Option<usize>) -> Result<Arc<Worker>> {
        let shared = Arc::new(Shared {
            name: name.to_string(),
            queue: TaskQueue::new(),
            load: LoadEstimator::new(),
            tid: OnceLock::new(),
        });

        let loop_shared = shared.clone();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run(loop_shared, pin_cpu))
            .map_err(|e| Error::ThreadSpawn {
                name: name.to_string(),
                source: e,
            })?;

        Ok(Arc::new(Worker {
            shared,
            thread: Mutex::new(Some(handle)),
        }))
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Busy estimate of the worker thread, `0..=100`.
    pub fn load(&self) -> u32 {
        self.shared.load.load()
    }

    pub fn is_current_thread(&self) -> bool {
        self.shared
            .tid
            .get()
            .is_some_and(|tid| *tid == thread::current().id())
    }

    /// Submits a callback with normal priority, running it inline when
    /// already on the worker thread.
    pub fn submit<F>(&self, func: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit_with(Priority::Normal, true, func);
    }

    /// Submits a callback for execution on the worker thread.
    ///
    /// With `may_sync` set and the caller already on the worker thread the
    /// callback runs synchronously, avoiding a self-deadlocking round-trip
    /// when a task schedules follow-up work onto its own worker. Otherwise
    /// it is enqueued, at the front for [`Priority::High`].
    ///
    /// Normal-priority submissions from one producer thread execute in
    /// submission order relative to each other.
    pub fn submit_with<F>(&self, priority: Priority, may_sync: bool, func: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if may_sync && self.is_current_thread() {
            func();
            return;
        }

        self.shared
            .queue
            .push(Box::new(func), priority == Priority::High);
    }
}

impl Drop for Worker {
    /// Closes the queue and joins the thread. Already-queued callbacks are
    /// drained before the loop exits.
    ///
    /// A task holding the last handle to its own worker drops it on the
    /// worker thread itself; joining there would deadlock, so the thread is
    /// detached and left to drain the backlog on its own.
    fn drop(&mut self) {
        self.shared.queue.close();

        if self.is_current_thread() {
            let _ = self.thread.lock().take();
            return;
        }

        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }
}

fn run(shared: Arc<Shared>, pin_cpu: Option<usize>) {
    let _ = shared.tid.set(thread::current().id());

    if let Some(cpu) = pin_cpu {
        crate::affinity::pin_current_to(cpu);
    }

    loop {
        shared.load.sleep();
        let task = shared.queue.pop();
        shared.load.wakeup();

        match task {
            Some(task) => {
                if catch_unwind(AssertUnwindSafe(task)).is_err() {
                    log::error!("{}: panic in task", shared.name);
                }
            }
            // Queue closed and drained: the worker is shutting down.
            None => break,
        }
    }
}
