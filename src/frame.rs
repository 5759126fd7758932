use crate::error::{CamwatchError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use std::sync::Arc;
use std::time::SystemTime;

/// A captured video frame: raw RGB24 raster plus capture metadata.
///
/// Pixel data sits behind an `Arc` so the upload scheduler can take a stable
/// snapshot without copying, while the acquisition side keeps producing.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Monotonically increasing frame identifier within a session
    pub id: u64,
    /// Timestamp when the frame was captured
    pub timestamp: SystemTime,
    /// Raw RGB24 pixel data (3 bytes per pixel, row-major)
    pub data: Arc<Vec<u8>>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
}

impl Frame {
    pub fn new(id: u64, timestamp: SystemTime, data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            id,
            timestamp,
            data: Arc::new(data),
            width,
            height,
        }
    }

    /// Expected byte length for the frame's dimensions
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    /// Validate frame data size against the expected length
    pub fn validate_size(&self) -> bool {
        self.data.len() == self.expected_len()
    }

    /// View the pixel data as an owned `RgbImage` for processing
    pub fn to_rgb_image(&self) -> Option<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.as_ref().clone())
    }

    /// Build a frame from a processed `RgbImage`, keeping the original metadata
    pub fn from_rgb_image(id: u64, timestamp: SystemTime, image: RgbImage) -> Self {
        let width = image.width();
        let height = image.height();
        Self {
            id,
            timestamp,
            data: Arc::new(image.into_raw()),
            width,
            height,
        }
    }

    /// Encode the frame to a JPEG payload at the given quality
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
        encoder
            .encode(&self.data, self.width, self.height, image::ColorType::Rgb8)
            .map_err(|e| {
                CamwatchError::component("frame", format!("JPEG encoding failed: {}", e))
            })?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_creation_and_size_validation() {
        let frame = Frame::new(1, SystemTime::now(), vec![0u8; 64 * 48 * 3], 64, 48);
        assert_eq!(frame.id, 1);
        assert!(frame.validate_size());

        let truncated = Frame::new(2, SystemTime::now(), vec![0u8; 100], 64, 48);
        assert!(!truncated.validate_size());
    }

    #[test]
    fn test_jpeg_encoding_produces_jpeg_magic() {
        let frame = Frame::new(1, SystemTime::now(), vec![128u8; 32 * 32 * 3], 32, 32);
        let jpeg = frame.encode_jpeg(70).unwrap();
        assert!(jpeg.len() > 2);
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_rgb_image_round_trip_keeps_dimensions() {
        let frame = Frame::new(7, SystemTime::now(), vec![10u8; 16 * 8 * 3], 16, 8);
        let image = frame.to_rgb_image().unwrap();
        let rebuilt = Frame::from_rgb_image(frame.id, frame.timestamp, image);
        assert_eq!(rebuilt.id, 7);
        assert_eq!(rebuilt.width, 16);
        assert_eq!(rebuilt.height, 8);
        assert!(rebuilt.validate_size());
    }
}
