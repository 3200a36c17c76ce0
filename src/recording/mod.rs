//! H.264 encode adapter that stamps keyframes
//!
//! Stands in for the external encode collaborator:
//! - openh264 for H.264 encoding
//! - [`crate::reconcile::Stamper`] for the timestamp SEI
//!
//! # Example
//! ```rust,ignore
//! use seistamp::recording::{StampedStream, StreamConfig};
//!
//! let config = StreamConfig::new(1280, 720, 30.0);
//! let stamper = seistamp::SeiStampConfig::default().stamper(reference);
//! let mut stream = StampedStream::create("out.h264", config, stamper)?;
//!
//! // In your frame capture loop:
//! stream.write_rgb_frame(&rgb)?;
//!
//! let (stats, _file) = stream.finish()?;
//! ```

mod config;
mod encoder;
mod stream;

pub use config::{StreamConfig, StreamQuality, StreamStats};
pub use encoder::{EncodedFrame, H264Encoder};
pub use stream::StampedStream;
