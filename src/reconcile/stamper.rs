//! Encode side: stamp keyframes with the synchronized reference time

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::errors::StampError;
use crate::ntp::TimeReference;
use crate::sei::{encode_record, merge_units, wrap_for_transport, Codec};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StamperStats {
    pub keyframes: u64,
    pub stamped: u64,
    /// Keyframes emitted without a record because no time was available
    pub skipped_unsynced: u64,
}

pub struct Stamper<T: TimeReference> {
    reference: T,
    codec: Codec,
    enabled: bool,
    stats: StamperStats,
}

impl<T: TimeReference> Stamper<T> {
    pub fn new(reference: T, codec: Codec) -> Self {
        if codec.sei_unit_kind().is_none() {
            log::warn!("Codec {} carries no SEI, frames will pass through unstamped", codec);
        }
        Self {
            reference,
            codec,
            enabled: true,
            stats: StamperStats::default(),
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn reference(&self) -> &T {
        &self.reference
    }

    pub fn stats(&self) -> StamperStats {
        self.stats
    }

    /// Entry point for every encoded access unit; only keyframes are touched
    pub fn on_access_unit<'a>(
        &mut self,
        capture_pts: i64,
        access_unit: &'a [u8],
        is_keyframe: bool,
    ) -> Cow<'a, [u8]> {
        if !is_keyframe {
            return Cow::Borrowed(access_unit);
        }
        self.on_keyframe_encoded(capture_pts, access_unit)
    }

    /// Prepend a timestamp SEI to a keyframe if a reference time is available
    pub fn on_keyframe_encoded<'a>(&mut self, capture_pts: i64, access_unit: &'a [u8]) -> Cow<'a, [u8]> {
        if !self.enabled || self.codec.sei_unit_kind().is_none() {
            return Cow::Borrowed(access_unit);
        }
        self.stats.keyframes += 1;

        match self.build_unit(capture_pts) {
            Ok(unit) => {
                self.stats.stamped += 1;
                Cow::Owned(merge_units(&unit, Some(access_unit)))
            }
            Err(e) => {
                self.stats.skipped_unsynced += 1;
                log::debug!("Keyframe at pts {} left unstamped: {}", capture_pts, e);
                Cow::Borrowed(access_unit)
            }
        }
    }

    /// Build the SEI unit for `capture_pts` without touching any access unit
    ///
    /// For pipelines that carry SEI separately from the picture data. May
    /// resynchronize the reference first.
    pub fn build_unit(&mut self, capture_pts: i64) -> Result<Vec<u8>, StampError> {
        let kind = self
            .codec
            .sei_unit_kind()
            .ok_or_else(|| StampError::ConfigError(format!("codec {} has no SEI", self.codec)))?;

        self.reference.maintain();
        let now = self.reference.current_time()?;
        Ok(wrap_for_transport(&encode_record(capture_pts, now), kind))
    }
}
