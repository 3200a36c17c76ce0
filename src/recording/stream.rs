//! Encoder plus stamper writing an Annex B elementary stream

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use super::config::{StreamConfig, StreamStats};
use super::encoder::H264Encoder;
use crate::errors::StampError;
use crate::ntp::TimeReference;
use crate::reconcile::Stamper;

/// Encodes RGB frames, stamps keyframes and writes the result to `W`
pub struct StampedStream<T: TimeReference, W: Write> {
    encoder: H264Encoder,
    stamper: Stamper<T>,
    writer: W,
    config: StreamConfig,
    stats: StreamStats,
    start_time: Option<Instant>,
}

impl<T: TimeReference> StampedStream<T, BufWriter<File>> {
    /// Create a stream that writes to the specified file
    pub fn create<P: AsRef<Path>>(
        output_path: P,
        config: StreamConfig,
        stamper: Stamper<T>,
    ) -> Result<Self, StampError> {
        let file = File::create(&output_path)
            .map_err(|e| StampError::IoError(format!("Failed to create output file: {}", e)))?;
        log::info!("Writing stamped stream to {:?}", output_path.as_ref());
        Self::new(BufWriter::new(file), config, stamper)
    }
}

impl<T: TimeReference, W: Write> StampedStream<T, W> {
    pub fn new(writer: W, config: StreamConfig, stamper: Stamper<T>) -> Result<Self, StampError> {
        if !config.fps.is_finite() || config.fps <= 0.0 {
            return Err(StampError::EncodingError(format!("Invalid fps {}", config.fps)));
        }
        let encoder = H264Encoder::new(config.width, config.height)?;
        Ok(Self {
            encoder,
            stamper,
            writer,
            config,
            stats: StreamStats::default(),
            start_time: None,
        })
    }

    /// Encode, stamp and write one frame; returns its capture pts
    pub fn write_rgb_frame(&mut self, rgb_data: &[u8]) -> Result<i64, StampError> {
        if self.start_time.is_none() {
            self.start_time = Some(Instant::now());
        }

        let index = self.stats.frames;
        let interval = self.config.keyframe_interval as u64;
        if interval > 0 && index > 0 && index % interval == 0 {
            self.encoder.force_keyframe();
        }

        let encoded = self.encoder.encode_rgb(rgb_data)?;
        let pts = self.config.frame_pts_ns(index);
        self.stats.frames += 1;

        // The encoder may skip a frame entirely
        if encoded.data.is_empty() {
            return Ok(pts);
        }

        let stamped_before = self.stamper.stats().stamped;
        let out = self
            .stamper
            .on_access_unit(pts, &encoded.data, encoded.is_keyframe);
        self.writer.write_all(&out)?;

        self.stats.bytes_written += out.len() as u64;
        if encoded.is_keyframe {
            self.stats.keyframes += 1;
        }
        if self.stamper.stats().stamped > stamped_before {
            self.stats.stamped += 1;
        }
        Ok(pts)
    }

    pub fn frame_count(&self) -> u64 {
        self.stats.frames
    }

    pub fn stamper(&self) -> &Stamper<T> {
        &self.stamper
    }

    pub fn force_keyframe(&mut self) {
        self.encoder.force_keyframe();
    }

    /// Flush the writer and return statistics along with it
    pub fn finish(mut self) -> Result<(StreamStats, W), StampError> {
        self.writer.flush()?;
        self.stats.duration_secs = self.stats.frames as f64 / self.config.fps;
        if let Some(start) = self.start_time {
            log::info!(
                "Stream finished: {} frames, {} stamped keyframes in {:.2?}",
                self.stats.frames,
                self.stats.stamped,
                start.elapsed()
            );
        }
        Ok((self.stats, self.writer))
    }
}
