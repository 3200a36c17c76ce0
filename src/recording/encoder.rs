//! H.264 encoder wrapper using openh264

use openh264::encoder::{Encoder, FrameType};
use openh264::formats::YUVBuffer;

use crate::errors::StampError;

/// H.264 encoder using openh264
pub struct H264Encoder {
    encoder: Encoder,
    width: u32,
    height: u32,
    frame_count: u64,
}

impl H264Encoder {
    /// Dimensions are taken from the YUV source at encode time; the values
    /// here only size-check the input.
    pub fn new(width: u32, height: u32) -> Result<Self, StampError> {
        if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
            return Err(StampError::EncodingError(format!(
                "Invalid dimensions {}x{} (must be even and non-zero)",
                width, height
            )));
        }

        let encoder = Encoder::new()
            .map_err(|e| StampError::EncodingError(format!("Failed to create encoder: {}", e)))?;

        Ok(Self {
            encoder,
            width,
            height,
            frame_count: 0,
        })
    }

    /// Encode an RGB24 frame to one Annex B access unit
    pub fn encode_rgb(&mut self, rgb_data: &[u8]) -> Result<EncodedFrame, StampError> {
        let expected_size = (self.width * self.height * 3) as usize;
        if rgb_data.len() != expected_size {
            return Err(StampError::EncodingError(format!(
                "Invalid frame size: expected {} bytes, got {}",
                expected_size,
                rgb_data.len()
            )));
        }

        let yuv = rgb_to_yuv420(rgb_data, self.width, self.height);
        self.encode_yuv(yuv)
    }

    pub fn encode_yuv(&mut self, yuv_data: Vec<u8>) -> Result<EncodedFrame, StampError> {
        let yuv_buffer = YUVBuffer::from_vec(yuv_data, self.width as usize, self.height as usize);

        let bitstream = self
            .encoder
            .encode(&yuv_buffer)
            .map_err(|e| StampError::EncodingError(format!("Encoding failed: {}", e)))?;

        self.frame_count += 1;

        Ok(EncodedFrame {
            is_keyframe: matches!(bitstream.frame_type(), FrameType::IDR | FrameType::I),
            data: bitstream.to_vec(),
        })
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Force the next frame to be a keyframe
    pub fn force_keyframe(&mut self) {
        self.encoder.force_intra_frame();
    }
}

/// One encoded access unit
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// Annex B bytes (with start codes)
    pub data: Vec<u8>,
    pub is_keyframe: bool,
}

/// RGB24 to planar YUV420, BT.601 studio range
pub(crate) fn rgb_to_yuv420(rgb: &[u8], width: u32, height: u32) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;

    let y_size = w * h;
    let uv_size = (w / 2) * (h / 2);
    let mut yuv = vec![0u8; y_size + uv_size * 2];

    let (y_plane, uv_planes) = yuv.split_at_mut(y_size);
    let (u_plane, v_plane) = uv_planes.split_at_mut(uv_size);

    for (row, line) in rgb.chunks_exact(w * 3).enumerate().take(h) {
        for (col, px) in line.chunks_exact(3).enumerate() {
            let (r, g, b) = (px[0] as i32, px[1] as i32, px[2] as i32);

            let y_val = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
            y_plane[row * w + col] = y_val.clamp(0, 255) as u8;

            // Chroma from the top-left pixel of each 2x2 block
            if row % 2 == 0 && col % 2 == 0 {
                let uv_idx = (row / 2) * (w / 2) + col / 2;
                let u_val = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
                let v_val = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
                u_plane[uv_idx] = u_val.clamp(0, 255) as u8;
                v_plane[uv_idx] = v_val.clamp(0, 255) as u8;
            }
        }
    }

    yuv
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_to_yuv420_size() {
        let rgb = vec![128u8; 64 * 48 * 3];
        let yuv = rgb_to_yuv420(&rgb, 64, 48);
        assert_eq!(yuv.len(), 64 * 48 * 3 / 2);
    }

    #[test]
    fn test_black_and_white_levels() {
        let black = rgb_to_yuv420(&[0u8; 2 * 2 * 3], 2, 2);
        assert_eq!(black, vec![16, 16, 16, 16, 128, 128]);

        let white = rgb_to_yuv420(&[255u8; 2 * 2 * 3], 2, 2);
        assert_eq!(&white[..4], &[235, 235, 235, 235]);
    }

    #[test]
    fn test_rejects_odd_dimensions() {
        assert!(H264Encoder::new(641, 480).is_err());
        assert!(H264Encoder::new(0, 480).is_err());
    }

    #[test]
    fn test_wrong_input_size() {
        let mut encoder = H264Encoder::new(64, 48).unwrap();
        assert!(encoder.encode_rgb(&[0u8; 10]).is_err());
        assert_eq!(encoder.frame_count(), 0);
    }

    #[test]
    fn test_first_frame_is_keyframe() {
        let mut encoder = H264Encoder::new(320, 240).unwrap();
        let encoded = encoder.encode_rgb(&vec![128u8; 320 * 240 * 3]).unwrap();

        assert!(!encoded.data.is_empty());
        assert!(
            encoded.data.starts_with(&[0x00, 0x00, 0x00, 0x01])
                || encoded.data.starts_with(&[0x00, 0x00, 0x01])
        );
        assert!(encoded.is_keyframe);
    }
}
