//! seistamp: frame-accurate cross-machine timestamps for live video
//!
//! The encode side stamps each keyframe with a reference-clock time carried
//! in an SEI `user_data_unregistered` message; the decode side recovers it
//! and maps capture timestamps onto its own clock, falling back to a linear
//! mapping for frames without a record.
//!
//! # Features
//! - NTPv3 client-mode clock sync with rate-limited resync
//! - Inline or background-thread time reference
//! - SEI record codec for H.264 and H.265 (byte compatible, no emulation prevention)
//! - Decode-side reconciliation with absolute and fallback modes
//! - Optional openh264 encode adapter (`recording` feature)
//!
//! # Usage
//! ```rust,no_run
//! use seistamp::{SeiStampConfig, TimeReference};
//!
//! seistamp::init_logging();
//! let config = SeiStampConfig::load_or_default();
//!
//! // Encode side
//! let mut stamper = config.stamper(config.time_reference()?);
//! # let (pts, access_unit, keyframe) = (0i64, vec![0u8, 0, 0, 1, 0x65], true);
//! let out = stamper.on_access_unit(pts, &access_unit, keyframe);
//!
//! // Decode side
//! let mut reconciler = config.reconciler(config.time_reference()?);
//! let display_ns = reconciler.on_frame_decoded(pts, &out);
//! # Ok::<(), seistamp::StampError>(())
//! ```

pub mod config;
pub mod errors;
pub mod ntp;
pub mod reconcile;
pub mod sei;
pub mod timing;

#[cfg(feature = "recording")]
pub mod recording;

// Re-exports for convenience
pub use config::SeiStampConfig;
pub use errors::StampError;
pub use ntp::{BackgroundSync, ClockSync, ScheduledSync, TimeReference, TimeValue};
pub use reconcile::{Reconciler, Stamper};
pub use sei::{find_record, Codec, TimestampRecord};

/// Initialize logging (`RUST_LOG` defaults to `seistamp=info`)
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "seistamp=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
        recording: cfg!(feature = "recording"),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    /// Built with the openh264 encode adapter
    pub recording: bool,
}
