//! Monotonic timekeeping for the control loop.
//!
//! `std::time::Instant` is already backed by a monotonic source on every
//! platform this crate targets, so this module is a thin seam rather than
//! a reimplementation: it exists so the controller and the tracker can be
//! exercised with a fake clock in tests, without threading a generic
//! parameter through every call site.

use std::time::Duration;
use std::time::Instant as StdInstant;

/// A point in monotonic time.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Instant(StdInstant);

/// The current monotonic time.
#[must_use]
pub fn now() -> Instant {
    Instant(StdInstant::now())
}

/// Milliseconds elapsed between `earlier` and `later`.
///
/// Returns `0` rather than panicking if `later` predates `earlier` (the
/// clock stepped backward, or the caller compared timestamps out of
/// order); the tracker treats that as "no time has passed" and rebases
/// instead of producing a negative sample.
#[must_use]
pub fn elapsed_ms(later: Instant, earlier: Instant) -> u64 {
    later
        .0
        .checked_duration_since(earlier.0)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Blocks the calling thread for approximately `duration`.
///
/// A signal delivered to the process may interrupt the underlying sleep
/// early on some platforms; this is tolerated by callers (the control
/// loop treats a short slice as acceptable, see `spec.md` §5) and never
/// retried here.
pub fn sleep(duration: Duration) {
    std::thread::sleep(duration);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_ms_is_monotonic_for_ordered_timestamps() {
        let t0 = now();
        std::thread::sleep(Duration::from_millis(5));
        let t1 = now();
        assert!(elapsed_ms(t1, t0) >= 5);
    }

    #[test]
    fn elapsed_ms_never_goes_negative() {
        let t0 = now();
        let t1 = now();
        // t0 <= t1 always here, but exercise the defensive path directly.
        assert_eq!(elapsed_ms(t0, t1.max(t0)), elapsed_ms(t0, t0));
    }
}
