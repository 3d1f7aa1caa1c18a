//! Cancelable task handles.
//!
//! A [`CancelableTask`] pairs a strong, owning reference to a callback with
//! the weak observer the scheduler actually invokes. Cancelling (or dropping
//! the last owner) detaches the callback: every later invocation resolves the
//! weak reference, fails, and returns the result type's default value instead
//! of touching freed state.
//!
//! This is what lets delayed tasks and pending registrations be cancelled
//! from any thread without synchronizing with the loop that will invoke them.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// Priority of a submitted callback.
///
/// High-priority submissions are moved to the front of their queue and may
/// overtake previously queued normal work.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Priority {
    Normal,
    High,
}

/// A unit of work accepted by reactors and workers.
pub(crate) type Task = Box<dyn FnOnce() + Send>;

/// A callback reachable through a non-owning observer.
///
/// `R` is the callback's return type; invocation after cancellation yields
/// `R::default()` and performs no side effects.
pub struct CancelableTask<R = ()> {
    /// The owning reference. Dropping it is what cancels the task.
    strong: Mutex<Option<Arc<dyn Fn() -> R + Send + Sync>>>,

    /// The observer the scheduler resolves on every invocation.
    weak: Weak<dyn Fn() -> R + Send + Sync>,
}

impl<R: Default> CancelableTask<R> {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn() -> R + Send + Sync + 'static,
    {
        let strong: Arc<dyn Fn() -> R + Send + Sync> = Arc::new(func);
        let weak = Arc::downgrade(&strong);

        Self {
            strong: Mutex::new(Some(strong)),
            weak,
        }
    }

    /// Drops the owning reference.
    ///
    /// Idempotent and safe from any thread. An invocation already running on
    /// the owning loop is not interrupted; every future invocation becomes a
    /// no-op.
    pub fn cancel(&self) {
        self.strong.lock().take();
    }

    /// Whether the callback can still be invoked.
    pub fn is_alive(&self) -> bool {
        self.strong.lock().is_some()
    }

    /// Invokes the callback through the weak observer.
    ///
    /// Returns `R::default()` when the owner is gone.
    pub fn call(&self) -> R {
        match self.weak.upgrade() {
            Some(func) => func(),
            None => R::default(),
        }
    }
}

/// A delayed task: the callback returns the next delay in milliseconds,
/// or `0` to stop recurring.
pub type DelayTask = CancelableTask<u64>;
