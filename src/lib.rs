//! # Vigil
//!
//! **Vigil** is a small threading runtime built around two kinds of dedicated
//! OS threads:
//!
//! - **Reactors** run an `epoll`-based readiness loop over registered file
//!   descriptors and drive a deadline-ordered table of delayed tasks.
//! - **Workers** drain a blocking, priority-aware task queue and run plain
//!   callbacks serially.
//!
//! Unlike future-based runtimes, Vigil schedules ordinary closures: any thread
//! may submit work onto a reactor or worker, register descriptor interest, or
//! schedule a (possibly recurring) delayed task, and may cancel that task later
//! from any thread without racing the owning loop.
//!
//! The process-wide [`ThreadPool`] owns a bounded set of named reactors
//! (`poller-<i>`) and workers (`worker-<i>`) and hands them out round-robin.
//! It configures itself once, idempotently, on first use.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use vigil::{ThreadPool, Timer};
//!
//! ThreadPool::initialize(0, 0, true);
//!
//! ThreadPool::instance().get_worker().submit(|| {
//!     println!("hello from a worker thread");
//! });
//!
//! // Fires once after two seconds, then stops (callback returned 0).
//! let _timer = Timer::new(2_000, || {
//!     println!("hello from a poller thread");
//!     0
//! }, None);
//! ```
//!
//! ## Modules
//!
//! - [`pool`] — the process-wide reactor/worker pool
//! - [`reactor`] — the event loop and delayed-task scheduler
//! - [`worker`] — the serial task executor
//! - [`task`] — cancelable task handles
//! - [`timer`] — RAII wrapper around recurring delayed tasks
//! - [`fd`] — descriptor-option helpers (non-blocking, close-on-exec)
//!
//! Vigil targets Unix platforms; the readiness backend is Linux `epoll`.

mod affinity;
mod clock;
mod load;
mod pipe;
mod queue;

pub mod error;
pub mod fd;
pub mod pool;
pub mod reactor;
pub mod task;
pub mod timer;
pub mod worker;

pub use error::{Error, Result};
pub use pool::ThreadPool;
pub use reactor::{Event, Interest, Reactor};
pub use task::{CancelableTask, DelayTask, Priority};
pub use timer::Timer;
pub use worker::Worker;
