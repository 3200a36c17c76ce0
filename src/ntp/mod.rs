//! Network clock synchronization (NTPv3 client mode)
//!
//! # Example
//! ```rust,no_run
//! use std::time::Duration;
//! use seistamp::ntp::{ClockSync, ResyncSchedule, ScheduledSync, TimeReference};
//!
//! let engine = ClockSync::configure("time.windows.com", 123)?;
//! let mut reference = ScheduledSync::new(engine, ResyncSchedule::default());
//!
//! // On every keyframe:
//! reference.maintain();
//! if let Ok(now) = reference.current_time() {
//!     println!("reference time: {}", now);
//! }
//! # Ok::<(), seistamp::StampError>(())
//! ```

mod background;
mod client;
mod packet;
mod schedule;
mod server;
mod time_value;

pub use background::BackgroundSync;
pub use client::{ClockOffset, ClockSample, ClockSync, SyncStats, DEFAULT_NTP_PORT, DEFAULT_TIMEOUT};
pub use packet::{NtpPacket, MODE_CLIENT, MODE_SERVER, NTP_PACKET_SIZE, NTP_VERSION};
pub use schedule::{
    LocalOnly, ResyncSchedule, ScheduledSync, TimeReference, DEFAULT_RESYNC_INTERVAL,
    DEFAULT_RETRY_BACKOFF,
};
pub use server::{build_response, ReferenceServer};
pub use time_value::{TimeValue, NTP_UNIX_DELTA_SECS};
