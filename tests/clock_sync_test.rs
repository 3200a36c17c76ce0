//! End-to-end clock synchronization against the in-crate reference server

use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use seistamp::ntp::{
    BackgroundSync, ClockSync, ReferenceServer, ResyncSchedule, ScheduledSync, TimeReference,
};
use seistamp::StampError;
use tokio::runtime::Runtime;
use tokio::sync::watch;
use tokio::task::JoinHandle;

const TOLERANCE_NS: i64 = 100_000_000;

struct TestServer {
    runtime: Runtime,
    addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<Result<u64, StampError>>,
}

impl TestServer {
    fn start(skew_ns: i64) -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let (shutdown, rx) = watch::channel(false);

        let (addr, handle) = runtime.block_on(async {
            let server = ReferenceServer::bind("127.0.0.1:0")
                .await
                .unwrap()
                .with_skew(skew_ns);
            let addr = server.local_addr().unwrap();
            (addr, tokio::spawn(server.run(rx)))
        });

        Self {
            runtime,
            addr,
            shutdown,
            handle,
        }
    }

    fn stop(self) -> u64 {
        self.shutdown.send(true).unwrap();
        self.runtime.block_on(self.handle).unwrap().unwrap()
    }
}

fn wall_clock_ns() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos() as i64
}

#[test]
fn test_sync_tracks_reference_clock() {
    let skew = 5_000_000_000;
    let server = TestServer::start(skew);

    let mut engine = ClockSync::configure("127.0.0.1", server.addr.port())
        .unwrap()
        .with_timeout(Duration::from_secs(2));
    assert!(engine.needs_resync(Duration::from_secs(60)));

    let sample = engine.synchronize().unwrap();
    assert!(sample.delay_ns >= 0);
    assert!(engine.is_synced());
    assert!(!engine.needs_resync(Duration::from_secs(60)));
    assert_eq!(engine.offset(), sample.offset_ns);

    let reference = engine.current_time().unwrap().to_unix_nanos();
    let expected = wall_clock_ns() + skew;
    assert!(
        (reference - expected).abs() < TOLERANCE_NS,
        "reference {} vs expected {}",
        reference,
        expected
    );

    assert_eq!(server.stop(), 1);
}

#[test]
fn test_failed_sync_keeps_previous_sample() {
    let server = TestServer::start(0);
    let port = server.addr.port();

    let mut engine = ClockSync::configure("127.0.0.1", port)
        .unwrap()
        .with_timeout(Duration::from_millis(300));
    let first = engine.synchronize().unwrap();
    server.stop();

    // Nothing answers any more
    assert!(matches!(engine.synchronize(), Err(StampError::SyncError(_))));
    assert_eq!(engine.error_count(), 1);
    assert_eq!(engine.sample(), Some(first));
    assert!(engine.current_time().is_ok());
}

#[test]
fn test_scheduled_sync_inline() {
    let server = TestServer::start(-2_000_000_000);
    let engine = ClockSync::configure("127.0.0.1", server.addr.port())
        .unwrap()
        .with_timeout(Duration::from_secs(2));
    let mut reference = ScheduledSync::new(engine, ResyncSchedule::default());

    assert!(matches!(reference.current_time(), Err(StampError::NotSynced)));
    reference.maintain();
    reference.maintain();

    assert_eq!(reference.stats().sync_count, 1);
    assert!(reference.clock_offset().is_some());
    let now = reference.current_time().unwrap().to_unix_nanos();
    assert!((now - (wall_clock_ns() - 2_000_000_000)).abs() < TOLERANCE_NS);

    server.stop();
}

#[test]
fn test_background_sync_against_server() {
    let server = TestServer::start(1_000_000_000);
    let engine = ClockSync::configure("127.0.0.1", server.addr.port())
        .unwrap()
        .with_timeout(Duration::from_secs(2));
    let mut reference = BackgroundSync::spawn(engine, ResyncSchedule::default()).unwrap();

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while reference.clock_offset().is_none() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }

    let now = reference.current_time().unwrap().to_unix_nanos();
    assert!((now - (wall_clock_ns() + 1_000_000_000)).abs() < TOLERANCE_NS);

    reference.shutdown();
    assert!(!reference.is_running());
    server.stop();
}
