//! RAII timer on top of delayed tasks.

use crate::pool::ThreadPool;
use crate::reactor::Reactor;
use crate::task::DelayTask;

use std::sync::Arc;

/// A repeating timer that cancels itself when dropped.
///
/// The callback returns the next delay in milliseconds; returning `0` stops
/// the timer. When no reactor is supplied, one is taken from the
/// process-wide pool.
///
/// # Examples
///
/// ```rust,ignore
/// // Tick every second until `Timer` is dropped.
/// let timer = Timer::new(1_000, || {
///     println!("tick");
///     1_000
/// }, None);
/// ```
pub struct Timer {
    task: Arc<DelayTask>,
}

impl Timer {
    /// Arms a timer firing `delay_ms` milliseconds from now.
    ///
    /// Returns `None` for a zero delay.
    pub fn new<F>(delay_ms: u64, func: F, poller: Option<Arc<Reactor>>) -> Option<Timer>
    where
        F: Fn() -> u64 + Send + Sync + 'static,
    {
        let poller = poller.unwrap_or_else(|| ThreadPool::instance().get_poller());
        let task = poller.delay_task(delay_ms, func)?;
        Some(Timer { task })
    }

    /// Stops the timer without dropping it.
    pub fn cancel(&self) {
        self.task.cancel();
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.task.cancel();
    }
}
