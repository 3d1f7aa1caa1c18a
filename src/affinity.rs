//! CPU-affinity helper for loop threads.

/// Pins the calling thread to one CPU.
///
/// Pinning is best-effort: the pool may be configured with more threads than
/// CPUs, in which case the extra indices fail to pin and the thread keeps the
/// default mask.
#[cfg(target_os = "linux")]
pub(crate) fn pin_current_to(cpu: usize) -> bool {
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(cpu, &mut set);

        libc::pthread_setaffinity_np(
            libc::pthread_self(),
            std::mem::size_of::<libc::cpu_set_t>(),
            &set,
        ) == 0
    }
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn pin_current_to(_cpu: usize) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(target_os = "linux")]
    fn pins_to_first_cpu() {
        assert!(pin_current_to(0), "cpu 0 always exists");
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn out_of_range_cpu_fails_cleanly() {
        assert!(!pin_current_to(1022));
    }
}
