//! Annex B access unit helpers

use super::nal::{extract_payload, SEI_TYPE_USER_DATA_UNREGISTERED};
use super::record::{decode_record, TimestampRecord};

/// Byte offsets where a start code begins (a 4-byte code is reported at
/// its leading zero)
pub fn start_code_offsets(data: &[u8]) -> Vec<usize> {
    let mut offsets = Vec::new();
    let mut i = 0;
    while i + 3 <= data.len() {
        if data[i..i + 3] == [0, 0, 1] {
            let begin = if i > 0 && data[i - 1] == 0 { i - 1 } else { i };
            offsets.push(begin);
            i += 3;
        } else {
            i += 1;
        }
    }
    offsets
}

/// Split an Annex B access unit into NAL units, start codes removed
pub fn nal_units(data: &[u8]) -> Vec<&[u8]> {
    let mut units = Vec::new();
    let mut start = 0;

    while start < data.len() {
        let start_code_len = if data[start..].starts_with(&[0, 0, 0, 1]) {
            4
        } else if data[start..].starts_with(&[0, 0, 1]) {
            3
        } else {
            break;
        };

        // Runs to the next start code or the end of data
        let mut end = start + start_code_len;
        while end < data.len() {
            if data[end..].starts_with(&[0, 0, 1]) || data[end..].starts_with(&[0, 0, 0, 1]) {
                break;
            }
            end += 1;
        }

        if end > start + start_code_len {
            units.push(&data[start + start_code_len..end]);
        }
        start = end;
    }

    units
}

/// Custom unit first, then the encoder's own SEI bytes untouched
pub fn merge_units(custom: &[u8], original: Option<&[u8]>) -> Vec<u8> {
    let original = original.unwrap_or_default();
    let mut merged = Vec::with_capacity(custom.len() + original.len());
    merged.extend_from_slice(custom);
    merged.extend_from_slice(original);
    merged
}

/// Locate a timestamp record anywhere in an access unit
///
/// Record payloads are not emulation-prevented, so a record may itself
/// contain `00 00 01`. Extraction is therefore tried at every start code
/// against the rest of the buffer rather than per split unit, with a raw
/// identifier scan as the last resort.
pub fn find_record(access_unit: &[u8]) -> Option<TimestampRecord> {
    for offset in start_code_offsets(access_unit) {
        match extract_payload(&access_unit[offset..]) {
            Ok(sei) if sei.payload_type == SEI_TYPE_USER_DATA_UNREGISTERED => {
                if let Some(record) = decode_record(sei.data, true) {
                    return Some(record);
                }
            }
            Ok(_) => {}
            Err(e) => log::trace!("Skipping unit at {}: {}", offset, e),
        }
    }
    decode_record(access_unit, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ntp::TimeValue;
    use crate::sei::nal::{wrap_for_transport, UnitKind};

    const IDR_SLICE: [u8; 8] = [0, 0, 0, 1, 0x65, 0x88, 0x84, 0x21];
    const SPS: [u8; 7] = [0, 0, 0, 1, 0x67, 0x42, 0x1E];

    #[test]
    fn test_nal_units_split() {
        let mut au = SPS.to_vec();
        au.extend_from_slice(&[0, 0, 1, 0x68, 0xCE]);
        au.extend_from_slice(&IDR_SLICE);

        let units = nal_units(&au);
        assert_eq!(units.len(), 3);
        assert_eq!(units[0], &[0x67, 0x42, 0x1E]);
        assert_eq!(units[1], &[0x68, 0xCE]);
        assert_eq!(units[2], &[0x65, 0x88, 0x84, 0x21]);
    }

    #[test]
    fn test_nal_units_without_start_code() {
        assert!(nal_units(&[0x65, 0x88]).is_empty());
        assert!(nal_units(&[]).is_empty());
    }

    #[test]
    fn test_start_code_offsets() {
        let data = [0, 0, 0, 1, 0x09, 0, 0, 1, 0x06, 0xAA];
        assert_eq!(start_code_offsets(&data), vec![0, 5]);
    }

    #[test]
    fn test_merge_order() {
        assert_eq!(merge_units(&[1, 2], Some(&[3, 4][..])), vec![1, 2, 3, 4]);
        assert_eq!(merge_units(&[1, 2], None), vec![1, 2]);
    }

    #[test]
    fn test_find_record_with_start_code_inside_payload() {
        // pts = 1 encodes as 00 00 00 00 00 00 00 01
        let record = TimestampRecord::new(1, TimeValue::new(3_900_000_000, 0x0000_0001));
        let sei = wrap_for_transport(&record.to_bytes(), UnitKind::H264);
        let au = merge_units(&sei, Some(&IDR_SLICE[..]));

        assert!(nal_units(&au).len() > 2);
        assert_eq!(find_record(&au), Some(record));
    }

    #[test]
    fn test_find_record_behind_foreign_sei() {
        let record = TimestampRecord::new(66_000_000, TimeValue::new(3_950_000_000, 99));
        let foreign = wrap_for_transport(&[0x42; 40], UnitKind::H265Prefix);
        let ours = wrap_for_transport(&record.to_bytes(), UnitKind::H265Prefix);

        let mut au = foreign;
        au.extend_from_slice(&ours);
        au.extend_from_slice(&IDR_SLICE);
        assert_eq!(find_record(&au), Some(record));
    }

    #[test]
    fn test_find_record_absent() {
        let foreign = wrap_for_transport(&[0x42; 40], UnitKind::H264);
        let au = merge_units(&foreign, Some(&IDR_SLICE[..]));
        assert_eq!(find_record(&au), None);
        assert_eq!(find_record(&[]), None);
    }
}
