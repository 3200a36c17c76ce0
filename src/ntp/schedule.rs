//! Resynchronization policy and the time-reference seam used by reconcilers

use std::time::Duration;

use super::client::{ClockSample, ClockSync, SyncStats};
use super::time_value::TimeValue;
use crate::errors::StampError;
use crate::timing::{LocalClock, MonotonicClock};

pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(10);

/// What a reconciler needs from a synchronized clock
pub trait TimeReference {
    /// Resynchronize if the schedule says so. May block on the network.
    fn maintain(&mut self);

    /// Reference time for "now"
    fn current_time(&self) -> Result<TimeValue, StampError>;

    /// Offset of the last valid sample, `None` before the first one
    fn clock_offset(&self) -> Option<i64>;

    /// Local monotonic time on the same timebase as the offset
    fn local_now_ns(&self) -> i64;

    fn stats(&self) -> SyncStats;
}

/// Caller-side rate limit for `synchronize()`
///
/// The attempt time is recorded before the outcome is known, so a dead
/// reference source costs at most one blocking exchange per backoff period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResyncSchedule {
    interval: Duration,
    retry_backoff: Duration,
    last_attempt_ns: Option<i64>,
    last_failed: bool,
}

impl ResyncSchedule {
    pub fn new(interval: Duration, retry_backoff: Duration) -> Self {
        Self {
            interval,
            retry_backoff,
            last_attempt_ns: None,
            last_failed: false,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn retry_backoff(&self) -> Duration {
        self.retry_backoff
    }

    pub fn is_due<C: LocalClock>(&self, engine: &ClockSync<C>) -> bool {
        if let Some(last) = self.last_attempt_ns {
            let wait = if self.last_failed {
                self.retry_backoff
            } else {
                self.interval
            };
            if engine.clock().now_ns() - last < wait.as_nanos() as i64 {
                return false;
            }
        }
        engine.needs_resync(self.interval)
    }

    /// Synchronize `engine` if due; `None` when nothing was attempted
    pub fn poll<C: LocalClock>(
        &mut self,
        engine: &mut ClockSync<C>,
    ) -> Option<Result<ClockSample, StampError>> {
        if !self.is_due(engine) {
            return None;
        }
        Some(self.force(engine))
    }

    /// Synchronize now regardless of the schedule, still recording the
    /// attempt so a failure backs off
    pub fn force<C: LocalClock>(
        &mut self,
        engine: &mut ClockSync<C>,
    ) -> Result<ClockSample, StampError> {
        self.last_attempt_ns = Some(engine.clock().now_ns());
        let result = engine.synchronize();
        self.last_failed = result.is_err();
        result
    }

    /// Forget the last attempt so the next poll runs immediately if needed
    pub fn reset(&mut self) {
        self.last_attempt_ns = None;
        self.last_failed = false;
    }
}

impl Default for ResyncSchedule {
    fn default() -> Self {
        Self::new(DEFAULT_RESYNC_INTERVAL, DEFAULT_RETRY_BACKOFF)
    }
}

/// Engine plus schedule, synchronizing inline on the caller's thread
///
/// The stall of one exchange (bounded by the engine timeout) lands on
/// whichever frame triggers the resync.
pub struct ScheduledSync<C: LocalClock> {
    engine: ClockSync<C>,
    schedule: ResyncSchedule,
}

impl<C: LocalClock> ScheduledSync<C> {
    pub fn new(engine: ClockSync<C>, schedule: ResyncSchedule) -> Self {
        Self { engine, schedule }
    }

    pub fn engine(&self) -> &ClockSync<C> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut ClockSync<C> {
        &mut self.engine
    }

    pub fn schedule(&self) -> &ResyncSchedule {
        &self.schedule
    }
}

impl<C: LocalClock> TimeReference for ScheduledSync<C> {
    fn maintain(&mut self) {
        // Outcome already logged by the engine
        let _ = self.schedule.poll(&mut self.engine);
    }

    fn current_time(&self) -> Result<TimeValue, StampError> {
        self.engine.current_time()
    }

    fn clock_offset(&self) -> Option<i64> {
        self.engine.sample().map(|s| s.offset_ns)
    }

    fn local_now_ns(&self) -> i64 {
        self.engine.clock().now_ns()
    }

    fn stats(&self) -> SyncStats {
        self.engine.stats()
    }
}

/// Reference that never synchronizes, for sessions with the clock disabled
///
/// Stampers emit frames unchanged and reconcilers stay on the linear mapping.
#[derive(Debug, Clone, Default)]
pub struct LocalOnly<C: LocalClock = MonotonicClock> {
    clock: C,
}

impl<C: LocalClock> LocalOnly<C> {
    pub fn with_clock(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: LocalClock> TimeReference for LocalOnly<C> {
    fn maintain(&mut self) {}

    fn current_time(&self) -> Result<TimeValue, StampError> {
        Err(StampError::NotSynced)
    }

    fn clock_offset(&self) -> Option<i64> {
        None
    }

    fn local_now_ns(&self) -> i64 {
        self.clock.now_ns()
    }

    fn stats(&self) -> SyncStats {
        SyncStats::default()
    }
}

impl<T: TimeReference + ?Sized> TimeReference for Box<T> {
    fn maintain(&mut self) {
        (**self).maintain()
    }

    fn current_time(&self) -> Result<TimeValue, StampError> {
        (**self).current_time()
    }

    fn clock_offset(&self) -> Option<i64> {
        (**self).clock_offset()
    }

    fn local_now_ns(&self) -> i64 {
        (**self).local_now_ns()
    }

    fn stats(&self) -> SyncStats {
        (**self).stats()
    }
}
