//! The 32-byte timestamp record carried inside a user-data SEI payload

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ntp::TimeValue;

/// Identifier that marks a payload as one of our timestamp records
pub const STAMP_ID: Uuid = Uuid::from_bytes([
    0xa5, 0xb3, 0xc2, 0xd1, 0xe4, 0xf5, 0x67, 0x89, 0xab, 0xcd, 0xef, 0x01, 0x23, 0x45, 0x67, 0x89,
]);

pub const RECORD_SIZE: usize = 32;
const ID_SIZE: usize = 16;

/// Capture timestamp plus the synchronized reference time it was taken at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampRecord {
    pub capture_pts: i64,
    pub time: TimeValue,
}

impl TimestampRecord {
    pub fn new(capture_pts: i64, time: TimeValue) -> Self {
        Self { capture_pts, time }
    }

    /// Reference time as Unix nanoseconds
    pub fn reference_ns(&self) -> i64 {
        self.time.to_unix_nanos()
    }

    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut out = [0u8; RECORD_SIZE];
        let mut buf = &mut out[..];
        buf.put_slice(STAMP_ID.as_bytes());
        buf.put_i64(self.capture_pts);
        self.time.write_to(&mut buf);
        out
    }

    /// Parse a record that starts exactly at `bytes[0]`
    fn parse_at(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < RECORD_SIZE || bytes[..ID_SIZE] != *STAMP_ID.as_bytes() {
            return None;
        }
        let mut buf = &bytes[ID_SIZE..RECORD_SIZE];
        let capture_pts = buf.get_i64();
        let time = TimeValue::read_from(&mut buf);
        Some(Self { capture_pts, time })
    }
}

pub fn encode_record(capture_pts: i64, time: TimeValue) -> [u8; RECORD_SIZE] {
    TimestampRecord::new(capture_pts, time).to_bytes()
}

/// Recover a record from payload bytes.
///
/// With `search_whole_buffer` the identifier may sit anywhere (other
/// user-data may precede it); otherwise it must start at offset 0.
/// Absence is `None`: most frames carry no record.
pub fn decode_record(bytes: &[u8], search_whole_buffer: bool) -> Option<TimestampRecord> {
    if bytes.len() < RECORD_SIZE {
        return None;
    }
    if !search_whole_buffer {
        return TimestampRecord::parse_at(bytes);
    }

    let id = STAMP_ID.as_bytes();
    (0..=bytes.len() - RECORD_SIZE)
        .find(|&i| bytes[i..i + ID_SIZE] == *id)
        .and_then(|i| TimestampRecord::parse_at(&bytes[i..]))
}
