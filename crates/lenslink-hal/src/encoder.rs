//! Compressed-image encoding of captured frames.

use image::ExtendedColorType;
use image::codecs::jpeg::JpegEncoder;
use lenslink_types::LinkError;
use tracing::trace;

use crate::camera::FrameBuffer;

/// Default JPEG quality used when none is configured.
pub const DEFAULT_QUALITY: u8 = 80;

/// Turns a captured [`FrameBuffer`] into compressed image bytes.
///
/// Encoding is synchronous: the returned bytes no longer borrow the
/// buffer, so the caller may reuse it as soon as `encode` returns.
pub trait FrameEncoder: Send {
    /// Encode `frame`.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::EncodeFailure`] for zero-sized frames, frames
    /// whose pixel data does not match their dimensions, or codec errors.
    fn encode(&mut self, frame: &FrameBuffer) -> Result<Vec<u8>, LinkError>;
}

/// Baseline JPEG encoder with a fixed 0–100 quality setting.
#[derive(Debug, Clone)]
pub struct JpegFrameEncoder {
    quality: u8,
    /// Size of the previous output, used as the next capacity hint.
    last_len: usize,
}

impl JpegFrameEncoder {
    /// Create an encoder.  `quality` is clamped to 0–100; the codec treats
    /// 0 as its lowest setting.
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.min(100),
            last_len: 0,
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }
}

impl Default for JpegFrameEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_QUALITY)
    }
}

impl FrameEncoder for JpegFrameEncoder {
    fn encode(&mut self, frame: &FrameBuffer) -> Result<Vec<u8>, LinkError> {
        if frame.is_empty() {
            return Err(LinkError::EncodeFailure(format!(
                "zero-sized frame ({}x{})",
                frame.width(),
                frame.height()
            )));
        }
        let expected = FrameBuffer::byte_len(frame.width(), frame.height());
        if frame.pixels().len() != expected {
            return Err(LinkError::EncodeFailure(format!(
                "frame holds {} bytes, {}x{} RGB24 needs {}",
                frame.pixels().len(),
                frame.width(),
                frame.height(),
                expected
            )));
        }

        let mut out = Vec::with_capacity(self.last_len);
        JpegEncoder::new_with_quality(&mut out, self.quality.max(1))
            .encode(
                frame.pixels(),
                frame.width(),
                frame.height(),
                ExtendedColorType::Rgb8,
            )
            .map_err(|e| LinkError::EncodeFailure(e.to_string()))?;
        self.last_len = out.len();
        trace!(
            width = frame.width(),
            height = frame.height(),
            quality = self.quality,
            bytes = out.len(),
            "encoded jpeg frame"
        );
        Ok(out)
    }
}
