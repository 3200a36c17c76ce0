//! Clock synchronization on a dedicated worker thread
//!
//! The hot encode/decode loop only reads the latest published sample; the
//! blocking network exchange runs on the worker. Dropping or shutting down
//! the handle joins the worker, waiting out an exchange that is in flight.

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use super::client::{ClockSample, ClockSync, SyncStats};
use super::schedule::{ResyncSchedule, TimeReference};
use super::time_value::TimeValue;
use crate::errors::StampError;
use crate::timing::LocalClock;

const MAX_POLL_TICK: Duration = Duration::from_secs(1);

enum Command {
    ResyncNow,
    Shutdown,
}

#[derive(Default)]
struct Published {
    sample: Option<ClockSample>,
    stats: SyncStats,
}

/// Handle to a background synchronization worker
pub struct BackgroundSync<C: LocalClock + Clone + 'static> {
    published: Arc<Mutex<Published>>,
    clock: C,
    commands: Sender<Command>,
    worker: Option<JoinHandle<()>>,
}

impl<C: LocalClock + Clone + 'static> BackgroundSync<C> {
    /// Move `engine` onto a worker thread driven by `schedule`
    pub fn spawn(engine: ClockSync<C>, schedule: ResyncSchedule) -> Result<Self, StampError> {
        let clock = engine.clock().clone();
        let published = Arc::new(Mutex::new(Published {
            sample: engine.sample(),
            stats: engine.stats(),
        }));
        let (commands, receiver) = crossbeam_channel::unbounded();

        let worker_published = published.clone();
        let worker = std::thread::Builder::new()
            .name("seistamp-clock-sync".to_string())
            .spawn(move || run_worker(engine, schedule, receiver, worker_published))
            .map_err(|e| StampError::SyncError(format!("failed to spawn sync worker: {}", e)))?;

        Ok(Self {
            published,
            clock,
            commands,
            worker: Some(worker),
        })
    }

    /// Ask the worker to synchronize now, regardless of the schedule
    pub fn resync_now(&self) {
        let _ = self.commands.send(Command::ResyncNow);
    }

    pub fn sample(&self) -> Option<ClockSample> {
        self.published
            .lock()
            .map(|p| p.sample)
            .unwrap_or_else(|poisoned| poisoned.into_inner().sample)
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Stop the worker and wait for it (idempotent)
    pub fn shutdown(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = self.commands.send(Command::Shutdown);
            if worker.join().is_err() {
                log::error!("Clock sync worker panicked");
            }
            log::debug!("Clock sync worker stopped");
        }
    }
}

impl<C: LocalClock + Clone + 'static> Drop for BackgroundSync<C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<C: LocalClock + Clone + 'static> TimeReference for BackgroundSync<C> {
    fn maintain(&mut self) {}

    fn current_time(&self) -> Result<TimeValue, StampError> {
        let sample = self.sample().ok_or(StampError::NotSynced)?;
        Ok(TimeValue::from_unix_nanos(
            sample.reference_at(self.clock.now_ns()),
        ))
    }

    fn clock_offset(&self) -> Option<i64> {
        self.sample().map(|s| s.offset_ns)
    }

    fn local_now_ns(&self) -> i64 {
        self.clock.now_ns()
    }

    fn stats(&self) -> SyncStats {
        self.published
            .lock()
            .map(|p| p.stats.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().stats.clone())
    }
}

fn run_worker<C: LocalClock>(
    mut engine: ClockSync<C>,
    mut schedule: ResyncSchedule,
    commands: Receiver<Command>,
    published: Arc<Mutex<Published>>,
) {
    let tick = schedule
        .interval()
        .min(schedule.retry_backoff())
        .min(MAX_POLL_TICK);

    log::debug!("Clock sync worker started (tick: {:?})", tick);

    loop {
        if schedule.poll(&mut engine).is_some() {
            publish(&engine, &published);
        }

        match commands.recv_timeout(tick) {
            Ok(Command::ResyncNow) => {
                let _ = schedule.force(&mut engine);
                publish(&engine, &published);
            }
            Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }
}

fn publish<C: LocalClock>(engine: &ClockSync<C>, published: &Mutex<Published>) {
    let mut guard = match published.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    guard.sample = engine.sample();
    guard.stats = engine.stats();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ntp::packet::{NtpPacket, MODE_SERVER};
    use crate::timing::ManualClock;
    use std::net::UdpSocket;
    use std::time::Instant;

    fn spawn_responder(skew: i64) -> u16 {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = socket.local_addr().unwrap().port();
        std::thread::spawn(move || {
            let mut buf = [0u8; 128];
            while let Ok((len, peer)) = socket.recv_from(&mut buf) {
                let Ok(request) = NtpPacket::parse(&buf[..len]) else {
                    continue;
                };
                let at = TimeValue::from_unix_nanos(request.transmit_ts.to_unix_nanos() + skew);
                let response = NtpPacket {
                    version: 3,
                    mode: MODE_SERVER,
                    stratum: 1,
                    originate_ts: request.transmit_ts,
                    receive_ts: at,
                    transmit_ts: at,
                    ..Default::default()
                };
                let _ = socket.send_to(&response.to_bytes(), peer);
            }
        });
        port
    }

    fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_worker_publishes_sample() {
        let skew = 42_000_000_000;
        let port = spawn_responder(skew);
        let clock = ManualClock::new(1_000_000);
        let engine = ClockSync::with_clock("127.0.0.1", port, clock.clone())
            .unwrap()
            .with_timeout(Duration::from_secs(1));

        let mut sync = BackgroundSync::spawn(engine, ResyncSchedule::default()).unwrap();
        assert!(wait_for(|| sync.sample().is_some()), "worker never synced");

        let offset = sync.clock_offset().unwrap();
        assert!((offset - skew).abs() <= 1);
        assert_eq!(sync.stats().sync_count, 1);

        clock.advance(Duration::from_millis(10));
        let now = sync.current_time().unwrap().to_unix_nanos();
        assert!((now - (1_000_000 + 10_000_000 + skew)).abs() <= 2);

        sync.shutdown();
        assert!(!sync.is_running());
    }

    #[test]
    fn test_resync_now_runs_exchange() {
        let port = spawn_responder(0);
        let engine = ClockSync::with_clock("127.0.0.1", port, ManualClock::new(0))
            .unwrap()
            .with_timeout(Duration::from_secs(1));

        let sync = BackgroundSync::spawn(engine, ResyncSchedule::default()).unwrap();
        assert!(wait_for(|| sync.stats().sync_count == 1));

        sync.resync_now();
        assert!(wait_for(|| sync.stats().sync_count == 2));
    }

    #[test]
    fn test_failed_resync_now_is_not_retried_at_once() {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = socket.local_addr().unwrap().port();
        drop(socket);

        let engine = ClockSync::with_clock("127.0.0.1", port, ManualClock::new(0))
            .unwrap()
            .with_timeout(Duration::from_millis(100));
        let mut sync = BackgroundSync::spawn(engine, ResyncSchedule::default()).unwrap();
        assert!(wait_for(|| sync.stats().error_count == 1));

        sync.resync_now();
        assert!(wait_for(|| sync.stats().error_count == 2));

        // The local clock never advances, so the backoff never expires
        std::thread::sleep(Duration::from_millis(600));
        assert_eq!(sync.stats().error_count, 2);
        sync.shutdown();
    }

    #[test]
    fn test_shutdown_while_unsynced() {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = socket.local_addr().unwrap().port();
        drop(socket);

        let engine = ClockSync::with_clock("127.0.0.1", port, ManualClock::new(0))
            .unwrap()
            .with_timeout(Duration::from_millis(100));
        let mut sync = BackgroundSync::spawn(engine, ResyncSchedule::default()).unwrap();

        assert!(matches!(sync.current_time(), Err(StampError::NotSynced)));
        sync.shutdown();
        sync.shutdown();
        assert!(!sync.is_running());
    }
}
