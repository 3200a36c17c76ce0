//! Clock sync engine: one UDP exchange per `synchronize()` call
//!
//! The engine keeps the most recent successful sample and answers
//! `current_time()` from it by extrapolating on the local monotonic clock, so
//! the network is touched only when the caller decides to resynchronize.

use std::io::ErrorKind;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::packet::{NtpPacket, MODE_SERVER};
use super::time_value::TimeValue;
use crate::errors::StampError;
use crate::timing::{LocalClock, MonotonicClock};

pub const DEFAULT_NTP_PORT: u16 = 123;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

const RECV_BUFFER_SIZE: usize = 512;

/// Offset and round-trip delay from one four-timestamp exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockOffset {
    /// Reference clock minus local clock, nanoseconds
    pub offset_ns: i64,
    pub delay_ns: i64,
}

impl ClockOffset {
    /// Calculate offset and delay from NTP timestamps
    /// t1: local send time
    /// t2: reference receive time
    /// t3: reference transmit time
    /// t4: local receive time
    pub fn calculate(t1: i64, t2: i64, t3: i64, t4: i64) -> Self {
        Self {
            offset_ns: ((t2 - t1) + (t3 - t4)) / 2,
            delay_ns: (t4 - t1) - (t3 - t2),
        }
    }
}

/// A successful synchronization result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockSample {
    pub offset_ns: i64,
    pub delay_ns: i64,
    /// Local clock reading when the response arrived (T4)
    pub local_ns: i64,
    /// Estimated reference time at `local_ns`
    pub reference_ns: i64,
}

impl ClockSample {
    /// Reference time at a later local instant
    #[inline]
    pub fn reference_at(&self, local_now_ns: i64) -> i64 {
        self.reference_ns + (local_now_ns - self.local_ns)
    }

    #[inline]
    pub fn age_ns(&self, local_now_ns: i64) -> i64 {
        local_now_ns - self.local_ns
    }
}

/// Counters and last result, for logs and CLI output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub server: String,
    pub synced: bool,
    pub offset_ns: i64,
    pub delay_ns: i64,
    pub sync_count: u32,
    pub error_count: u32,
}

/// Synchronization state against one reference source
pub struct ClockSync<C: LocalClock = MonotonicClock> {
    address: String,
    port: u16,
    timeout: Duration,
    clock: C,
    sample: Option<ClockSample>,
    sync_count: u32,
    error_count: u32,
}

impl ClockSync<MonotonicClock> {
    /// Configure an engine on a fresh monotonic clock
    pub fn configure(address: &str, port: u16) -> Result<Self, StampError> {
        Self::with_clock(address, port, MonotonicClock::new())
    }
}

impl<C: LocalClock> ClockSync<C> {
    /// Configure an engine that reads local time from `clock`
    pub fn with_clock(address: &str, port: u16, clock: C) -> Result<Self, StampError> {
        validate_address(address, port)?;
        log::info!("NTP client initialized (server: {}:{})", address, port);

        Ok(Self {
            address: address.to_string(),
            port,
            timeout: DEFAULT_TIMEOUT,
            clock,
            sample: None,
            sync_count: 0,
            error_count: 0,
        })
    }

    /// Set the receive timeout for each exchange
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Point the engine at a new reference; drops the sample and counters
    pub fn reconfigure(&mut self, address: &str, port: u16) -> Result<(), StampError> {
        validate_address(address, port)?;
        self.address = address.to_string();
        self.port = port;
        self.sample = None;
        self.sync_count = 0;
        self.error_count = 0;
        log::info!("NTP client reconfigured (server: {}:{})", address, port);
        Ok(())
    }

    /// Run one exchange with the reference source
    ///
    /// Blocks for at most the configured timeout. A failure counts as an
    /// error and leaves the previous sample untouched.
    pub fn synchronize(&mut self) -> Result<ClockSample, StampError> {
        match self.exchange() {
            Ok(sample) => {
                self.sample = Some(sample);
                self.sync_count += 1;
                log::info!(
                    "NTP sync successful (offset: {} ms, delay: {} us, count: {})",
                    sample.offset_ns / 1_000_000,
                    sample.delay_ns / 1_000,
                    self.sync_count
                );
                Ok(sample)
            }
            Err(e) => {
                self.error_count += 1;
                log::warn!(
                    "NTP sync with {}:{} failed ({} errors): {}",
                    self.address,
                    self.port,
                    self.error_count,
                    e
                );
                Err(e)
            }
        }
    }

    fn exchange(&self) -> Result<ClockSample, StampError> {
        let server = resolve(&self.address, self.port)?;
        let bind_addr = if server.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };

        let socket = UdpSocket::bind(bind_addr)
            .map_err(|e| StampError::SyncError(format!("socket creation failed: {}", e)))?;
        socket
            .set_read_timeout(Some(self.timeout))
            .map_err(|e| StampError::SyncError(format!("failed to set timeout: {}", e)))?;

        let t1 = self.clock.now_ns();
        let request = NtpPacket::client_request(TimeValue::from_unix_nanos(t1));

        socket
            .send_to(&request.to_bytes(), server)
            .map_err(|e| StampError::SyncError(format!("send to {} failed: {}", server, e)))?;

        let mut buf = [0u8; RECV_BUFFER_SIZE];
        let len = loop {
            match socket.recv_from(&mut buf) {
                Ok((len, from)) if from == server => break len,
                Ok((_, from)) => log::debug!("Ignoring datagram from unexpected peer {}", from),
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Err(StampError::SyncError(format!(
                        "no response from {} within {:?}",
                        server, self.timeout
                    )));
                }
                Err(e) => {
                    return Err(StampError::SyncError(format!("receive failed: {}", e)));
                }
            }
        };

        let t4 = self.clock.now_ns();
        let response = NtpPacket::parse(&buf[..len])?;

        if response.mode != MODE_SERVER {
            return Err(StampError::SyncError(format!(
                "unexpected response mode {}",
                response.mode
            )));
        }
        if response.stratum == 0 {
            return Err(StampError::SyncError(format!(
                "kiss-o'-death from server (code {:08x})",
                response.reference_id
            )));
        }
        if response.originate_ts != request.transmit_ts {
            return Err(StampError::SyncError(
                "response does not echo our transmit timestamp".to_string(),
            ));
        }

        let t2 = response.receive_ts.to_unix_nanos();
        let t3 = response.transmit_ts.to_unix_nanos();
        let measured = ClockOffset::calculate(t1, t2, t3, t4);

        Ok(ClockSample {
            offset_ns: measured.offset_ns,
            delay_ns: measured.delay_ns,
            local_ns: t4,
            reference_ns: t4 + measured.offset_ns,
        })
    }

    /// Reference time for "now", extrapolated from the last sample
    pub fn current_time(&self) -> Result<TimeValue, StampError> {
        let sample = self.sample.ok_or(StampError::NotSynced)?;
        Ok(TimeValue::from_unix_nanos(
            sample.reference_at(self.clock.now_ns()),
        ))
    }

    /// Last valid offset, or zero if never synchronized
    pub fn offset(&self) -> i64 {
        self.sample.map(|s| s.offset_ns).unwrap_or(0)
    }

    /// True if never synchronized or the sample is older than `max_age`
    pub fn needs_resync(&self, max_age: Duration) -> bool {
        match self.sample {
            None => true,
            Some(sample) => sample.age_ns(self.clock.now_ns()) > max_age.as_nanos() as i64,
        }
    }

    pub fn is_synced(&self) -> bool {
        self.sample.is_some()
    }

    pub fn sample(&self) -> Option<ClockSample> {
        self.sample
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn sync_count(&self) -> u32 {
        self.sync_count
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    pub fn stats(&self) -> SyncStats {
        SyncStats {
            server: format!("{}:{}", self.address, self.port),
            synced: self.sample.is_some(),
            offset_ns: self.offset(),
            delay_ns: self.sample.map(|s| s.delay_ns).unwrap_or(0),
            sync_count: self.sync_count,
            error_count: self.error_count,
        }
    }
}

impl<C: LocalClock> Drop for ClockSync<C> {
    fn drop(&mut self) {
        log::info!(
            "NTP client destroyed (syncs: {}, errors: {})",
            self.sync_count,
            self.error_count
        );
    }
}

fn validate_address(address: &str, port: u16) -> Result<(), StampError> {
    if address.trim().is_empty() {
        return Err(StampError::ConfigError(
            "reference server address is empty".to_string(),
        ));
    }
    if port == 0 {
        return Err(StampError::ConfigError(
            "reference server port must be non-zero".to_string(),
        ));
    }
    Ok(())
}

fn resolve(address: &str, port: u16) -> Result<SocketAddr, StampError> {
    (address, port)
        .to_socket_addrs()
        .map_err(|e| StampError::SyncError(format!("failed to resolve {}: {}", address, e)))?
        .next()
        .ok_or_else(|| StampError::SyncError(format!("no addresses for {}", address)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::ManualClock;
    use std::thread;

    const LOCAL_START: i64 = 5_000_000_000;
    const REFERENCE_SKEW: i64 = 1_700_000_000_000_000_000;

    /// Reply once with T2 = T3 = the request's T1 plus `skew`
    fn spawn_fake_server(skew: i64, mode: u8) -> (u16, thread::JoinHandle<()>) {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = socket.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let mut buf = [0u8; 128];
            let (len, peer) = socket.recv_from(&mut buf).unwrap();
            let request = NtpPacket::parse(&buf[..len]).unwrap();
            let at = TimeValue::from_unix_nanos(request.transmit_ts.to_unix_nanos() + skew);
            let response = NtpPacket {
                version: 3,
                mode,
                stratum: 1,
                originate_ts: request.transmit_ts,
                receive_ts: at,
                transmit_ts: at,
                ..Default::default()
            };
            socket.send_to(&response.to_bytes(), peer).unwrap();
        });
        (port, handle)
    }

    #[test]
    fn test_offset_formula_symmetric_delay() {
        // Reference is 500ms ahead, 50ms each way, 10ms processing
        let t1 = 1_000_000_000;
        let t2 = t1 + 500_000_000 + 50_000_000;
        let t3 = t2 + 10_000_000;
        let t4 = t1 + 50_000_000 + 10_000_000 + 50_000_000;

        let result = ClockOffset::calculate(t1, t2, t3, t4);
        assert_eq!(result.offset_ns, 500_000_000);
        assert_eq!(result.delay_ns, 100_000_000);
    }

    #[test]
    fn test_offset_formula_negative_skew() {
        let result = ClockOffset::calculate(10_000, 7_100, 7_200, 10_300);
        // ((7100-10000) + (7200-10300)) / 2 = (-2900 + -3100) / 2
        assert_eq!(result.offset_ns, -3_000);
        assert_eq!(result.delay_ns, 200);
    }

    #[test]
    fn test_configure_rejects_empty_address() {
        let err = ClockSync::configure("", DEFAULT_NTP_PORT).err().unwrap();
        assert!(matches!(err, StampError::ConfigError(_)));
        assert!(ClockSync::configure("   ", DEFAULT_NTP_PORT).is_err());
        assert!(ClockSync::configure("pool.ntp.org", 0).is_err());
    }

    #[test]
    fn test_unsynced_state() {
        let engine = ClockSync::configure("127.0.0.1", 123).unwrap();
        assert!(!engine.is_synced());
        assert_eq!(engine.offset(), 0);
        assert!(matches!(engine.current_time(), Err(StampError::NotSynced)));
        assert!(engine.needs_resync(Duration::from_secs(60)));
    }

    #[test]
    fn test_synchronize_against_fake_server() {
        let (port, server) = spawn_fake_server(REFERENCE_SKEW, MODE_SERVER);
        let clock = ManualClock::new(LOCAL_START);
        let mut engine = ClockSync::with_clock("127.0.0.1", port, clock.clone())
            .unwrap()
            .with_timeout(Duration::from_secs(2));

        let sample = engine.synchronize().expect("sync should succeed");
        server.join().unwrap();

        // Frozen local clock: T1 == T4, so the offset is exactly the skew
        assert!((sample.offset_ns - REFERENCE_SKEW).abs() <= 1);
        assert!(sample.delay_ns.abs() <= 1);
        assert_eq!(engine.sync_count(), 1);
        assert!(!engine.needs_resync(Duration::from_secs(60)));

        clock.advance(Duration::from_millis(250));
        let now = engine.current_time().unwrap().to_unix_nanos();
        let expected = LOCAL_START + 250_000_000 + REFERENCE_SKEW;
        assert!((now - expected).abs() <= 2, "extrapolated {} vs {}", now, expected);

        clock.advance(Duration::from_secs(61));
        assert!(engine.needs_resync(Duration::from_secs(60)));
    }

    #[test]
    fn test_rejects_client_mode_reply() {
        let (port, server) = spawn_fake_server(0, 3);
        let mut engine = ClockSync::with_clock("127.0.0.1", port, ManualClock::new(1))
            .unwrap()
            .with_timeout(Duration::from_secs(2));

        assert!(matches!(engine.synchronize(), Err(StampError::SyncError(_))));
        server.join().unwrap();
        assert_eq!(engine.error_count(), 1);
        assert!(!engine.is_synced());
    }

    #[test]
    fn test_failed_sync_keeps_previous_sample() {
        let (port, server) = spawn_fake_server(REFERENCE_SKEW, MODE_SERVER);
        let mut engine = ClockSync::with_clock("127.0.0.1", port, ManualClock::new(LOCAL_START))
            .unwrap()
            .with_timeout(Duration::from_millis(200));
        let first = engine.synchronize().unwrap();
        server.join().unwrap();

        // Nobody answers any more
        assert!(engine.synchronize().is_err());
        assert_eq!(engine.error_count(), 1);
        assert_eq!(engine.sample(), Some(first));
        assert_eq!(engine.offset(), first.offset_ns);
        assert!(engine.current_time().is_ok());
    }

    #[test]
    fn test_reconfigure_resets_state() {
        let (port, server) = spawn_fake_server(0, MODE_SERVER);
        let mut engine = ClockSync::with_clock("127.0.0.1", port, ManualClock::new(1))
            .unwrap()
            .with_timeout(Duration::from_secs(2));
        engine.synchronize().unwrap();
        server.join().unwrap();

        engine.reconfigure("localhost", 4123).unwrap();
        assert!(!engine.is_synced());
        assert_eq!(engine.sync_count(), 0);
        assert_eq!(engine.port(), 4123);
        assert!(engine.reconfigure("", 123).is_err());
    }
}
