//! Per-thread load estimation.
//!
//! Each loop thread brackets its only blocking point with
//! [`LoadEstimator::sleep`] and [`LoadEstimator::wakeup`]. The estimator keeps
//! a bounded rolling window of (duration, was-sleeping) samples and reports
//! the busy share of the window as a percentage.
//!
//! The estimate is purely observational: nothing in the runtime uses it to
//! make scheduling decisions.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Most samples retained in the window.
const MAX_SAMPLES: usize = 64;

/// Longest total span the window may track.
const MAX_TRACKED: Duration = Duration::from_secs(1);

struct Sample {
    span: Duration,
    sleeping: bool,
}

struct Window {
    /// Whether the open interval is a sleep interval.
    sleeping: bool,
    /// Start of the open interval.
    since: Instant,
    samples: VecDeque<Sample>,
    /// Sum of all retained sample spans, kept incrementally.
    tracked: Duration,
}

/// Rolling sleep/run sample window for one loop thread.
pub(crate) struct LoadEstimator {
    inner: Mutex<Window>,
}

impl LoadEstimator {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Window {
                sleeping: false,
                since: Instant::now(),
                samples: VecDeque::with_capacity(MAX_SAMPLES),
                tracked: Duration::ZERO,
            }),
        }
    }

    /// Closes the open run interval; the thread is about to block.
    pub(crate) fn sleep(&self) {
        let mut inner = self.inner.lock();
        if inner.sleeping {
            return;
        }
        close_interval(&mut inner, false);
        inner.sleeping = true;
    }

    /// Closes the open sleep interval; the thread resumed.
    pub(crate) fn wakeup(&self) {
        let mut inner = self.inner.lock();
        if !inner.sleeping {
            return;
        }
        close_interval(&mut inner, true);
        inner.sleeping = false;
    }

    /// Busy share of the retained window, `0..=100`.
    ///
    /// The still-open interval counts toward whichever side it belongs to,
    /// so a thread blocked for a long time decays toward zero even without
    /// new samples.
    pub(crate) fn load(&self) -> u32 {
        let inner = self.inner.lock();

        let mut run = Duration::ZERO;
        let mut slept = Duration::ZERO;

        for sample in &inner.samples {
            if sample.sleeping {
                slept += sample.span;
            } else {
                run += sample.span;
            }
        }

        let open = inner.since.elapsed();
        if inner.sleeping {
            slept += open;
        } else {
            run += open;
        }

        let total = run + slept;
        if total.is_zero() {
            return 0;
        }

        // Nanosecond resolution: a nonzero total is never truncated to zero.
        (run.as_nanos() * 100 / total.as_nanos()) as u32
    }
}

/// Appends the open interval as a sample and evicts the oldest samples while
/// either window bound is exceeded.
fn close_interval(window: &mut Window, sleeping: bool) {
    let now = Instant::now();
    let span = now.duration_since(window.since);
    window.since = now;

    window.samples.push_back(Sample { span, sleeping });
    window.tracked += span;

    while window.samples.len() > MAX_SAMPLES || window.tracked > MAX_TRACKED {
        match window.samples.pop_front() {
            Some(old) => window.tracked = window.tracked.saturating_sub(old.span),
            None => break,
        }
    }
}
