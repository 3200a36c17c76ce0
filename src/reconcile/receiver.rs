//! Decode side: map capture timestamps onto the local display timeline

use serde::{Deserialize, Serialize};

use crate::ntp::TimeReference;
use crate::sei::{find_record, TimestampRecord};

const STATS_WINDOW_NS: i64 = 1_000_000_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcilerState {
    /// The last frame was placed from a recovered record
    pub absolute_active: bool,
    /// Local clock minus capture pts, once established
    pub fallback_offset: Option<i64>,
    pub records_recovered: u64,
}

/// Frame and record counters, rates refreshed once per second
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReceiverStats {
    pub frames: u64,
    pub records_found: u64,
    /// Percentage of frames that carried a record
    pub detection_rate: f32,
    pub fps: f32,
    #[serde(skip)]
    window_start_ns: Option<i64>,
    #[serde(skip)]
    window_start_frames: u64,
}

impl ReceiverStats {
    fn record_frame(&mut self, found: bool, now_ns: i64) {
        self.frames += 1;
        if found {
            self.records_found += 1;
        }

        let Some(start) = self.window_start_ns else {
            self.window_start_ns = Some(now_ns);
            self.window_start_frames = self.frames;
            return;
        };

        let elapsed = now_ns - start;
        if elapsed >= STATS_WINDOW_NS {
            let frames = self.frames - self.window_start_frames;
            self.fps = (frames as f64 / (elapsed as f64 / 1e9)) as f32;
            self.detection_rate = (self.records_found as f64 * 100.0 / self.frames as f64) as f32;
            self.window_start_ns = Some(now_ns);
            self.window_start_frames = self.frames;
        }
    }
}

pub struct Reconciler<T: TimeReference> {
    reference: T,
    state: ReconcilerState,
    use_reference: bool,
    recalibrate_on_record: bool,
    anchored_to_record: bool,
    stats: ReceiverStats,
}

impl<T: TimeReference> Reconciler<T> {
    pub fn new(reference: T) -> Self {
        Self {
            reference,
            state: ReconcilerState::default(),
            use_reference: true,
            recalibrate_on_record: true,
            anchored_to_record: false,
            stats: ReceiverStats::default(),
        }
    }

    /// With `false`, records are still counted but every frame uses the
    /// linear mapping
    pub fn with_reference_enabled(mut self, enabled: bool) -> Self {
        self.use_reference = enabled;
        self
    }

    /// With `false`, the fallback offset is taken from the first record only
    /// instead of every record
    pub fn with_recalibrate_on_record(mut self, recalibrate: bool) -> Self {
        self.recalibrate_on_record = recalibrate;
        self
    }

    pub fn state(&self) -> ReconcilerState {
        self.state
    }

    pub fn stats(&self) -> ReceiverStats {
        self.stats
    }

    pub fn reference(&self) -> &T {
        &self.reference
    }

    /// Display time (local clock ns) for a decoded frame
    pub fn on_frame_decoded(&mut self, capture_pts: i64, access_unit: &[u8]) -> i64 {
        if self.use_reference {
            self.reference.maintain();
        }
        let record = find_record(access_unit);
        self.stats
            .record_frame(record.is_some(), self.reference.local_now_ns());
        self.reconcile(capture_pts, record.as_ref())
    }

    /// Same as [`Self::on_frame_decoded`] for callers that extracted SEI
    /// themselves; does not touch the stats
    pub fn reconcile(&mut self, capture_pts: i64, record: Option<&TimestampRecord>) -> i64 {
        if record.is_some() {
            self.state.records_recovered += 1;
        }

        let offset = self
            .use_reference
            .then(|| self.reference.clock_offset())
            .flatten();

        match (record, offset) {
            (Some(record), Some(offset)) => {
                let display = record.reference_ns() - offset;
                if self.recalibrate_on_record || !self.anchored_to_record {
                    self.state.fallback_offset = Some(display - capture_pts);
                    self.anchored_to_record = true;
                }
                if !self.state.absolute_active {
                    log::info!(
                        "Absolute sync active (reference offset {} ns, display {})",
                        offset,
                        display
                    );
                }
                self.state.absolute_active = true;
                if self.state.records_recovered % 300 == 0 {
                    log::debug!(
                        "Absolute sync: reference={} offset={} display={}",
                        record.reference_ns(),
                        offset,
                        display
                    );
                }
                display
            }
            _ => {
                self.state.absolute_active = false;
                self.linear(capture_pts)
            }
        }
    }

    /// Audio follows the video timeline through the fallback mapping
    pub fn audio_timestamp(&mut self, capture_pts: i64) -> i64 {
        self.linear(capture_pts)
    }

    fn linear(&mut self, capture_pts: i64) -> i64 {
        let offset = match self.state.fallback_offset {
            Some(offset) => offset,
            None => {
                let now = self.reference.local_now_ns();
                let offset = now - capture_pts;
                log::info!(
                    "Initialized linear sync offset: pts={} local={} offset={}",
                    capture_pts,
                    now,
                    offset
                );
                self.state.fallback_offset = Some(offset);
                offset
            }
        };
        capture_pts + offset
    }
}
