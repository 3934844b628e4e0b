use image::{ImageReader, RgbImage};
use std::io::Cursor;

/// A decoded camera frame with timestamp metadata.
///
/// Frames are owned by the pipeline for one iteration; only the session
/// controller buffers them (while waiting for motion to be confirmed).
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub image: RgbImage,
    /// Capture time, Unix millis.
    pub captured_at_ms: i64,
    /// Sequence number assigned by the frame source.
    pub seq: u64,
}

impl VideoFrame {
    /// Wrap an already-decoded image. Rejects zero-dimension images.
    pub fn new(image: RgbImage, captured_at_ms: i64, seq: u64) -> Result<Self, FrameError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(FrameError::InvalidFrame {
                width: image.width(),
                height: image.height(),
            });
        }
        Ok(Self {
            image,
            captured_at_ms,
            seq,
        })
    }

    /// Decode a JPEG payload into a frame.
    pub fn from_jpeg(jpeg_data: &[u8], captured_at_ms: i64, seq: u64) -> Result<Self, FrameError> {
        let img = ImageReader::new(Cursor::new(jpeg_data))
            .with_guessed_format()
            .map_err(|e| FrameError::Undecodable(e.to_string()))?
            .decode()
            .map_err(|e| FrameError::Undecodable(e.to_string()))?;
        Self::new(img.to_rgb8(), captured_at_ms, seq)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Capture time formatted for humans, e.g. "09:30:00".
    pub fn local_time(&self) -> String {
        chrono::DateTime::from_timestamp_millis(self.captured_at_ms)
            .unwrap_or_else(chrono::Utc::now)
            .format("%H:%M:%S")
            .to_string()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid frame: zero dimensions ({width}x{height})")]
    InvalidFrame { width: u32, height: u32 },
    #[error("invalid frame: {0}")]
    Undecodable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_frame_accepted() {
        let img = RgbImage::from_pixel(4, 4, image::Rgb([10, 20, 30]));
        let frame = VideoFrame::new(img, 1708300000000, 7).unwrap();
        assert_eq!(frame.width(), 4);
        assert_eq!(frame.height(), 4);
        assert_eq!(frame.seq, 7);
    }

    #[test]
    fn zero_dimension_frame_rejected() {
        let img = RgbImage::new(0, 0);
        let err = VideoFrame::new(img, 1000, 0).unwrap_err();
        assert!(matches!(
            err,
            FrameError::InvalidFrame {
                width: 0,
                height: 0
            }
        ));
    }

    #[test]
    fn garbage_jpeg_rejected() {
        let err = VideoFrame::from_jpeg(&[0xDE, 0xAD, 0xBE, 0xEF], 1000, 0).unwrap_err();
        assert!(matches!(err, FrameError::Undecodable(_)));
    }

    #[test]
    fn jpeg_roundtrip_decodes() {
        // Encode a small frame with the image crate, then decode it back.
        let img = RgbImage::from_pixel(8, 8, image::Rgb([128, 128, 128]));
        let mut jpeg = Vec::new();
        image::codecs::jpeg::JpegEncoder::new(&mut jpeg)
            .encode_image(&img)
            .unwrap();

        let frame = VideoFrame::from_jpeg(&jpeg, 1708300000000, 42).unwrap();
        assert_eq!(frame.width(), 8);
        assert_eq!(frame.captured_at_ms, 1708300000000);
        assert_eq!(frame.seq, 42);
    }

    #[test]
    fn local_time_is_hms() {
        let img = RgbImage::from_pixel(1, 1, image::Rgb([0, 0, 0]));
        let frame = VideoFrame::new(img, 0, 0).unwrap();
        assert_eq!(frame.local_time(), "00:00:00");
    }
}
