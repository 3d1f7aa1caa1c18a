//! Monotonic millisecond clock.
//!
//! Delayed-task deadlines are absolute milliseconds on this clock, anchored
//! at the first use inside the process. Using a monotonic source keeps
//! deadlines immune to wall-clock adjustments.

use once_cell::sync::Lazy;
use std::time::Instant;

static ANCHOR: Lazy<Instant> = Lazy::new(Instant::now);

/// Milliseconds elapsed since the process-wide anchor.
pub(crate) fn now_millis() -> u64 {
    ANCHOR.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn advances_monotonically() {
        let a = now_millis();
        std::thread::sleep(Duration::from_millis(5));
        let b = now_millis();
        assert!(b >= a + 5, "clock should advance by at least the sleep time");
    }
}
