//! NTPv3 packet layout (RFC 1305), 48 bytes, big-endian

use bytes::{Buf, BufMut};

use super::time_value::TimeValue;
use crate::errors::StampError;

pub const NTP_PACKET_SIZE: usize = 48;
pub const NTP_VERSION: u8 = 3;
pub const MODE_CLIENT: u8 = 3;
pub const MODE_SERVER: u8 = 4;

/// One request or response on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NtpPacket {
    pub leap: u8,
    pub version: u8,
    pub mode: u8,
    pub stratum: u8,
    pub poll: i8,
    pub precision: i8,
    pub root_delay: u32,
    pub root_dispersion: u32,
    pub reference_id: u32,
    pub reference_ts: TimeValue,
    /// T1 as echoed by the server
    pub originate_ts: TimeValue,
    /// T2: server receive time
    pub receive_ts: TimeValue,
    /// T3 on responses, T1 on client requests
    pub transmit_ts: TimeValue,
}

impl NtpPacket {
    /// Client-mode request carrying the local send time
    ///
    /// Stratum, poll, precision and the root/reference fields stay zero.
    pub fn client_request(transmit: TimeValue) -> Self {
        Self {
            version: NTP_VERSION,
            mode: MODE_CLIENT,
            transmit_ts: transmit,
            ..Default::default()
        }
    }

    pub fn to_bytes(&self) -> [u8; NTP_PACKET_SIZE] {
        let mut out = [0u8; NTP_PACKET_SIZE];
        let mut buf = &mut out[..];

        buf.put_u8((self.leap & 0x03) << 6 | (self.version & 0x07) << 3 | (self.mode & 0x07));
        buf.put_u8(self.stratum);
        buf.put_i8(self.poll);
        buf.put_i8(self.precision);
        buf.put_u32(self.root_delay);
        buf.put_u32(self.root_dispersion);
        buf.put_u32(self.reference_id);
        self.reference_ts.write_to(&mut buf);
        self.originate_ts.write_to(&mut buf);
        self.receive_ts.write_to(&mut buf);
        self.transmit_ts.write_to(&mut buf);

        out
    }

    /// Parse a packet, ignoring any trailing extension fields
    pub fn parse(data: &[u8]) -> Result<Self, StampError> {
        if data.len() < NTP_PACKET_SIZE {
            return Err(StampError::SyncError(format!(
                "truncated NTP packet: {} bytes, need {}",
                data.len(),
                NTP_PACKET_SIZE
            )));
        }

        let mut buf = &data[..NTP_PACKET_SIZE];
        let li_vn_mode = buf.get_u8();

        Ok(Self {
            leap: li_vn_mode >> 6,
            version: (li_vn_mode >> 3) & 0x07,
            mode: li_vn_mode & 0x07,
            stratum: buf.get_u8(),
            poll: buf.get_i8(),
            precision: buf.get_i8(),
            root_delay: buf.get_u32(),
            root_dispersion: buf.get_u32(),
            reference_id: buf.get_u32(),
            reference_ts: TimeValue::read_from(&mut buf),
            originate_ts: TimeValue::read_from(&mut buf),
            receive_ts: TimeValue::read_from(&mut buf),
            transmit_ts: TimeValue::read_from(&mut buf),
        })
    }
}
