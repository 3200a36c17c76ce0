//! Local clocks for offset measurement and display timestamps
//!
//! Every local timestamp in the crate is a signed nanosecond count on one
//! monotonic timebase. Display times produced by the decode side live on the
//! same timebase, so they compare directly with `LocalClock::now_ns()`.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source of local monotonic time in nanoseconds
pub trait LocalClock: Send + Sync {
    /// Current local time in nanoseconds. Must never decrease.
    fn now_ns(&self) -> i64;
}

/// Monotonic clock anchored at an `Instant`
///
/// All timestamps derive from this single source
/// to ensure monotonic ordering.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    start: Arc<Instant>,
}

impl MonotonicClock {
    /// Create a new clock with the current instant as time zero
    pub fn new() -> Self {
        Self {
            start: Arc::new(Instant::now()),
        }
    }

    /// Create a clock from an existing start instant
    ///
    /// Use this to share the same timebase between the encode/decode loop
    /// and the clock sync engine.
    pub fn from_instant(start: Instant) -> Self {
        Self {
            start: Arc::new(start),
        }
    }

    /// Get the start instant for sharing with other components
    pub fn start_instant(&self) -> Instant {
        *self.start
    }

    /// Local time in nanoseconds for a given instant
    ///
    /// The instant must be after the clock's start time.
    #[inline]
    pub fn ns_at(&self, instant: Instant) -> i64 {
        instant.duration_since(*self.start).as_nanos() as i64
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalClock for MonotonicClock {
    #[inline]
    fn now_ns(&self) -> i64 {
        self.start.elapsed().as_nanos() as i64
    }
}

/// Manually advanced clock for deterministic tests and replays
///
/// Clones share the same underlying counter.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start_ns: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start_ns)),
        }
    }

    pub fn set_ns(&self, ns: i64) {
        self.now.store(ns, Ordering::Release);
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_nanos() as i64, Ordering::AcqRel);
    }
}

impl LocalClock for ManualClock {
    fn now_ns(&self) -> i64 {
        self.now.load(Ordering::Acquire)
    }
}

impl<C: LocalClock + ?Sized> LocalClock for Arc<C> {
    fn now_ns(&self) -> i64 {
        (**self).now_ns()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_monotonic() {
        let clock = MonotonicClock::new();
        let t1 = clock.now_ns();
        thread::sleep(Duration::from_millis(10));
        let t2 = clock.now_ns();
        assert!(t2 > t1, "local time must be monotonically increasing");
    }

    #[test]
    fn test_shared_clock() {
        let clock1 = MonotonicClock::new();
        let clock2 = MonotonicClock::from_instant(clock1.start_instant());

        thread::sleep(Duration::from_millis(5));

        let t1 = clock1.now_ns();
        let t2 = clock2.now_ns();

        // Should be very close (within 1ms)
        assert!((t1 - t2).abs() < 1_000_000);
    }

    #[test]
    fn test_ns_at() {
        let start = Instant::now();
        let clock = MonotonicClock::from_instant(start);

        thread::sleep(Duration::from_millis(10));
        let now = Instant::now();

        assert!(clock.ns_at(now) >= 10_000_000, "Should be at least 10ms");
    }

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new(1_000);
        let other = clock.clone();
        clock.advance(Duration::from_micros(1));
        assert_eq!(other.now_ns(), 2_000);
        other.set_ns(42);
        assert_eq!(clock.now_ns(), 42);
    }
}
