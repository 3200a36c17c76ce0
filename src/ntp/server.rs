//! Minimal reference time responder
//!
//! Answers client-mode requests as a stratum 1 server from the system wall
//! clock, optionally shifted by a fixed skew. Used by the CLI `serve`
//! command and by tests that need a controllable reference source.

use std::net::SocketAddr;

use tokio::net::{ToSocketAddrs, UdpSocket};
use tokio::sync::watch;

use super::packet::{NtpPacket, MODE_CLIENT, MODE_SERVER, NTP_PACKET_SIZE};
use super::time_value::TimeValue;
use crate::errors::StampError;

const LOCAL_REFERENCE_ID: [u8; 4] = *b"LOCL";
const SERVER_PRECISION: i8 = -20;

/// Build the reply to one request, or `None` if it is not a client request
pub fn build_response(
    request: &[u8],
    receive: TimeValue,
    transmit: TimeValue,
) -> Option<[u8; NTP_PACKET_SIZE]> {
    let request = NtpPacket::parse(request).ok()?;
    if request.mode != MODE_CLIENT {
        return None;
    }

    let response = NtpPacket {
        leap: 0,
        version: request.version,
        mode: MODE_SERVER,
        stratum: 1,
        poll: request.poll,
        precision: SERVER_PRECISION,
        root_delay: 0,
        root_dispersion: 0,
        reference_id: u32::from_be_bytes(LOCAL_REFERENCE_ID),
        reference_ts: receive,
        originate_ts: request.transmit_ts,
        receive_ts: receive,
        transmit_ts: transmit,
    };
    Some(response.to_bytes())
}

pub struct ReferenceServer {
    socket: UdpSocket,
    skew_ns: i64,
}

impl ReferenceServer {
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self, StampError> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self { socket, skew_ns: 0 })
    }

    /// Report reference times shifted by `skew_ns` from the system clock
    pub fn with_skew(mut self, skew_ns: i64) -> Self {
        self.skew_ns = skew_ns;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr, StampError> {
        Ok(self.socket.local_addr()?)
    }

    fn reference_now(&self) -> TimeValue {
        TimeValue::from_unix_nanos(TimeValue::now().to_unix_nanos() + self.skew_ns)
    }

    /// Serve until `shutdown` flips to true or its sender is dropped
    ///
    /// Returns the number of requests answered.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<u64, StampError> {
        let addr = self.local_addr()?;
        log::info!("Reference time server listening on {} (skew: {} ns)", addr, self.skew_ns);

        let mut buf = [0u8; 512];
        let mut served = 0u64;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                received = self.socket.recv_from(&mut buf) => {
                    if self.answer(received, &buf).await {
                        served += 1;
                    }
                }
            }
        }

        log::info!("Reference time server on {} stopped ({} requests served)", addr, served);
        Ok(served)
    }

    /// Reply to one received datagram; socket errors are logged and skipped
    async fn answer(&self, received: std::io::Result<(usize, SocketAddr)>, buf: &[u8]) -> bool {
        let (len, peer) = match received {
            Ok(received) => received,
            Err(e) => {
                // e.g. ICMP port unreachable surfacing as ConnectionReset on Windows
                log::warn!("Reference server receive failed: {}", e);
                return false;
            }
        };

        let receive = self.reference_now();
        let Some(reply) = build_response(&buf[..len], receive, self.reference_now()) else {
            log::debug!("Ignoring {} byte datagram from {}", len, peer);
            return false;
        };
        match self.socket.send_to(&reply, peer).await {
            Ok(_) => true,
            Err(e) => {
                log::warn!("Reference server reply to {} failed: {}", peer, e);
                false
            }
        }
    }
}
