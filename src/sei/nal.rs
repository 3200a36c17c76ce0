//! SEI NAL unit framing for H.264 and H.265
//!
//! Layout: `00 00 00 01`, NAL header (1 byte H.264, 2 bytes H.265),
//! payload type and payload size as 0xFF-continued varints, payload,
//! `rbsp_trailing_bits` (0x80).

use std::fmt;
use std::str::FromStr;

use bytes::BufMut;
use serde::{Deserialize, Serialize};

use crate::errors::StampError;

pub const SEI_TYPE_USER_DATA_UNREGISTERED: usize = 5;

pub const H264_NAL_SEI: u8 = 6;
pub const HEVC_NAL_PREFIX_SEI: u8 = 39;
pub const HEVC_NAL_SUFFIX_SEI: u8 = 40;

const START_CODE: [u8; 4] = [0, 0, 0, 1];
const TRAILING_BITS: u8 = 0x80;

/// Which SEI NAL header to emit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitKind {
    H264,
    H265Prefix,
    H265Suffix,
}

impl UnitKind {
    pub fn header(self) -> &'static [u8] {
        match self {
            UnitKind::H264 => &[H264_NAL_SEI],
            UnitKind::H265Prefix => &[HEVC_NAL_PREFIX_SEI << 1, 0x01],
            UnitKind::H265Suffix => &[HEVC_NAL_SUFFIX_SEI << 1, 0x01],
        }
    }

    /// Classify the first header byte after a start code
    ///
    /// H.264 is tried first, as decoders in the wild do.
    pub fn from_header_byte(byte: u8) -> Option<Self> {
        if byte & 0x1F == H264_NAL_SEI {
            return Some(UnitKind::H264);
        }
        match (byte >> 1) & 0x3F {
            HEVC_NAL_PREFIX_SEI => Some(UnitKind::H265Prefix),
            HEVC_NAL_SUFFIX_SEI => Some(UnitKind::H265Suffix),
            _ => None,
        }
    }
}

/// Video codec of the stream being stamped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    #[default]
    H264,
    Hevc,
    Av1,
}

impl Codec {
    /// SEI unit used for this codec; AV1 has no SEI and is never stamped
    pub fn sei_unit_kind(self) -> Option<UnitKind> {
        match self {
            Codec::H264 => Some(UnitKind::H264),
            Codec::Hevc => Some(UnitKind::H265Prefix),
            Codec::Av1 => None,
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Codec::H264 => "h264",
            Codec::Hevc => "hevc",
            Codec::Av1 => "av1",
        })
    }
}

impl FromStr for Codec {
    type Err = StampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "h264" | "avc" => Ok(Codec::H264),
            "hevc" | "h265" => Ok(Codec::Hevc),
            "av1" => Ok(Codec::Av1),
            other => Err(StampError::ConfigError(format!("unknown codec '{}'", other))),
        }
    }
}

pub fn write_varint(buf: &mut impl BufMut, mut value: usize) {
    while value >= 0xFF {
        buf.put_u8(0xFF);
        value -= 0xFF;
    }
    buf.put_u8(value as u8);
}

/// Decode a varint; returns `(value, bytes consumed)`
pub fn read_varint(data: &[u8]) -> Result<(usize, usize), StampError> {
    let mut value = 0usize;
    for (i, &byte) in data.iter().enumerate() {
        value = value
            .checked_add(byte as usize)
            .ok_or_else(|| StampError::MalformedUnit("varint overflow".to_string()))?;
        if byte != 0xFF {
            return Ok((value, i + 1));
        }
    }
    Err(StampError::MalformedUnit("truncated varint".to_string()))
}

/// Frame `payload` as a user-data-unregistered SEI NAL unit
pub fn wrap_for_transport(payload: &[u8], kind: UnitKind) -> Vec<u8> {
    let header = kind.header();
    let varint_len = |n: usize| n / 0xFF + 1;
    let mut unit = Vec::with_capacity(
        START_CODE.len()
            + header.len()
            + varint_len(SEI_TYPE_USER_DATA_UNREGISTERED)
            + varint_len(payload.len())
            + payload.len()
            + 1,
    );

    unit.put_slice(&START_CODE);
    unit.put_slice(header);
    write_varint(&mut unit, SEI_TYPE_USER_DATA_UNREGISTERED);
    write_varint(&mut unit, payload.len());
    unit.put_slice(payload);
    unit.put_u8(TRAILING_BITS);
    unit
}

/// First SEI message of a unit, borrowed from the input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeiPayload<'a> {
    pub kind: UnitKind,
    pub payload_type: usize,
    pub data: &'a [u8],
}

/// Inverse of [`wrap_for_transport`]
///
/// Accepts 3- or 4-byte start codes. Bytes past the declared payload are
/// ignored, so `unit` may run on into the rest of an access unit.
pub fn extract_payload(unit: &[u8]) -> Result<SeiPayload<'_>, StampError> {
    let malformed = |why: &str| StampError::MalformedUnit(why.to_string());

    if unit.len() < 5 {
        return Err(malformed("unit too short"));
    }
    let mut offset = match unit {
        [0, 0, 0, 1, ..] => 4,
        [0, 0, 1, ..] => 3,
        _ => return Err(malformed("missing start code")),
    };

    let kind = UnitKind::from_header_byte(unit[offset])
        .ok_or_else(|| malformed("not an SEI NAL unit"))?;
    offset += kind.header().len();
    if offset >= unit.len() {
        return Err(malformed("truncated NAL header"));
    }

    let (payload_type, used) = read_varint(&unit[offset..])?;
    offset += used;
    let (size, used) = read_varint(&unit[offset..])?;
    offset += used;

    let end = offset
        .checked_add(size)
        .filter(|&end| end <= unit.len())
        .ok_or_else(|| malformed("declared size exceeds unit"))?;

    Ok(SeiPayload {
        kind,
        payload_type,
        data: &unit[offset..end],
    })
}
