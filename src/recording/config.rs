//! Encoder adapter configuration types

use serde::{Deserialize, Serialize};

/// Resolution and frame rate presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StreamQuality {
    /// 640x360, for tests and previews
    Low,
    /// 1280x720
    #[default]
    Medium,
    /// 1920x1080
    High,
}

impl StreamQuality {
    pub fn resolution(&self) -> (u32, u32) {
        match self {
            StreamQuality::Low => (640, 360),
            StreamQuality::Medium => (1280, 720),
            StreamQuality::High => (1920, 1080),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Force an IDR every this many frames; 0 leaves it to the encoder
    pub keyframe_interval: u32,
}

impl StreamConfig {
    pub fn new(width: u32, height: u32, fps: f64) -> Self {
        Self {
            width,
            height,
            fps,
            keyframe_interval: 30,
        }
    }

    pub fn from_quality(quality: StreamQuality) -> Self {
        let (width, height) = quality.resolution();
        Self::new(width, height, 30.0)
    }

    pub fn with_keyframe_interval(mut self, frames: u32) -> Self {
        self.keyframe_interval = frames;
        self
    }

    /// Capture pts (ns) of the frame at `index`
    pub fn frame_pts_ns(&self, index: u64) -> i64 {
        (index as f64 * 1e9 / self.fps).round() as i64
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::from_quality(StreamQuality::default())
    }
}

/// Returned when a stream is finished
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamStats {
    pub frames: u64,
    pub keyframes: u64,
    /// Keyframes that carried a timestamp record
    pub stamped: u64,
    pub bytes_written: u64,
    pub duration_secs: f64,
}

impl StreamStats {
    pub fn avg_bitrate(&self) -> f64 {
        if self.duration_secs > 0.0 {
            (self.bytes_written as f64 * 8.0) / self.duration_secs
        } else {
            0.0
        }
    }
}
