//! Timestamp records embedded in H.264/H.265 SEI
//!
//! Everything here is a pure function over byte slices and safe to call
//! from any thread.
//!
//! # Example
//! ```rust
//! use seistamp::ntp::TimeValue;
//! use seistamp::sei::{encode_record, find_record, merge_units, wrap_for_transport, UnitKind};
//!
//! let record = encode_record(33_000_000, TimeValue::new(3_900_000_000, 0));
//! let unit = wrap_for_transport(&record, UnitKind::H264);
//! let access_unit = merge_units(&unit, Some(&[0, 0, 0, 1, 0x65, 0x88][..]));
//!
//! let found = find_record(&access_unit).unwrap();
//! assert_eq!(found.capture_pts, 33_000_000);
//! ```

mod annexb;
mod nal;
mod record;

pub use annexb::{find_record, merge_units, nal_units, start_code_offsets};
pub use nal::{
    extract_payload, read_varint, wrap_for_transport, write_varint, Codec, SeiPayload, UnitKind,
    H264_NAL_SEI, HEVC_NAL_PREFIX_SEI, HEVC_NAL_SUFFIX_SEI, SEI_TYPE_USER_DATA_UNREGISTERED,
};
pub use record::{decode_record, encode_record, TimestampRecord, RECORD_SIZE, STAMP_ID};
