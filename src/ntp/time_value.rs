//! 64-bit NTP fixed-point timestamps

use bytes::{Buf, BufMut};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds between 1900-01-01 (NTP epoch) and 1970-01-01 (Unix epoch)
pub const NTP_UNIX_DELTA_SECS: i64 = 2_208_988_800;

const NANOS_PER_SEC: i64 = 1_000_000_000;
const ERA_MSB: u32 = 0x8000_0000;

/// NTP timestamp: whole seconds since 1900 plus a 1/2^32 s fraction
///
/// Conversions to Unix nanoseconds resolve the 32-bit seconds wrap with the
/// RFC 4330 rule: a set top bit means era 0 (1968-2036), a clear top bit
/// means era 1 (2036-2104).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct TimeValue {
    pub seconds: u32,
    pub fraction: u32,
}

impl TimeValue {
    /// Encoded size on the wire
    pub const SIZE: usize = 8;

    pub const fn new(seconds: u32, fraction: u32) -> Self {
        Self { seconds, fraction }
    }

    /// Reference time from the system wall clock
    pub fn now() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0);
        Self::from_unix_nanos(nanos)
    }

    /// Packed 64-bit representation (seconds in the high word)
    pub fn to_u64(self) -> u64 {
        (self.seconds as u64) << 32 | self.fraction as u64
    }

    pub fn from_u64(value: u64) -> Self {
        Self {
            seconds: (value >> 32) as u32,
            fraction: value as u32,
        }
    }

    /// Convert from nanoseconds since the Unix epoch
    pub fn from_unix_nanos(nanos: i64) -> Self {
        let secs = nanos.div_euclid(NANOS_PER_SEC);
        let sub = nanos.rem_euclid(NANOS_PER_SEC) as u64;

        // Rounded so that the reverse conversion lands on the same nanosecond
        let fraction = ((sub << 32) + (NANOS_PER_SEC as u64 / 2)) / NANOS_PER_SEC as u64;

        Self {
            seconds: (secs + NTP_UNIX_DELTA_SECS) as u32,
            fraction: fraction as u32,
        }
    }

    /// Convert to nanoseconds since the Unix epoch
    pub fn to_unix_nanos(self) -> i64 {
        let ntp_secs = if self.seconds & ERA_MSB != 0 {
            self.seconds as i64
        } else {
            self.seconds as i64 + (1i64 << 32)
        };
        let frac_ns = ((self.fraction as u64 * NANOS_PER_SEC as u64) + (1 << 31)) >> 32;

        (ntp_secs - NTP_UNIX_DELTA_SECS) * NANOS_PER_SEC + frac_ns as i64
    }

    /// UTC wall-clock view, for logs and CLI output
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        let nanos = self.to_unix_nanos();
        DateTime::from_timestamp(
            nanos.div_euclid(NANOS_PER_SEC),
            nanos.rem_euclid(NANOS_PER_SEC) as u32,
        )
    }

    pub fn write_to(self, buf: &mut impl BufMut) {
        buf.put_u32(self.seconds);
        buf.put_u32(self.fraction);
    }

    /// Caller guarantees at least `SIZE` bytes remain
    pub fn read_from(buf: &mut impl Buf) -> Self {
        let seconds = buf.get_u32();
        let fraction = buf.get_u32();
        Self { seconds, fraction }
    }
}

impl fmt::Display for TimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:08x}", self.seconds, self.fraction)
    }
}
