//! [`FrameSource`] trait and the reusable [`FrameBuffer`] it copies into.

use lenslink_types::LinkError;

/// A width × height RGB24 pixel grid.
///
/// Owned by the capture pipeline as scratch space: the backing allocation
/// is reused across ticks and only replaced when the source dimensions
/// change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl FrameBuffer {
    /// Bytes per pixel (3-channel, 8-bit).
    pub const CHANNELS: usize = 3;

    /// Allocate a zeroed buffer of the given dimensions.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0u8; Self::byte_len(width, height)],
        }
    }

    /// Number of bytes needed for a `width` × `height` RGB24 frame.
    pub fn byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * Self::CHANNELS
    }

    /// Make the buffer match `width` × `height`.
    ///
    /// Returns `true` when a new allocation was made, `false` when the
    /// existing storage already had the requested dimensions.
    pub fn ensure_dimensions(&mut self, width: u32, height: u32) -> bool {
        if self.width == width && self.height == height && !self.data.is_empty() {
            return false;
        }
        *self = Self::new(width, height);
        true
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// `true` for a zero-sized frame.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Row-major RGB24 pixel data.
    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Mutable access for sources copying their current frame in.
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// A live video source (camera, capture card, test pattern).
///
/// The pipeline never owns frames produced by the source; instead it asks
/// the source to copy its current picture into a caller-provided
/// [`FrameBuffer`] that is already sized to [`dimensions`][Self::dimensions].
pub trait FrameSource: Send {
    /// Stable identifier for this source, e.g. `"passthrough_left"`.
    fn id(&self) -> &str;

    /// Whether the source has produced at least one frame and is running.
    fn is_ready(&self) -> bool;

    /// Current frame dimensions in pixels. `(0, 0)` when unknown.
    fn dimensions(&self) -> (u32, u32);

    /// Copy the current frame into `frame`.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::SourceNotReady`] if no frame is available or
    /// `frame` does not match the source's current dimensions.
    fn read_into(&mut self, frame: &mut FrameBuffer) -> Result<(), LinkError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockSource {
        id: String,
    }

    impl FrameSource for MockSource {
        fn id(&self) -> &str {
            &self.id
        }

        fn is_ready(&self) -> bool {
            true
        }

        fn dimensions(&self) -> (u32, u32) {
            (2, 2)
        }

        fn read_into(&mut self, frame: &mut FrameBuffer) -> Result<(), LinkError> {
            frame.pixels_mut().fill(7);
            Ok(())
        }
    }

    #[test]
    fn mock_source_fills_buffer() {
        let mut src = MockSource {
            id: "front_rgb".to_string(),
        };
        assert_eq!(src.id(), "front_rgb");
        let (w, h) = src.dimensions();
        let mut frame = FrameBuffer::new(w, h);
        src.read_into(&mut frame).unwrap();
        assert_eq!(frame.pixels().len(), 12); // 2×2 RGB24
        assert!(frame.pixels().iter().all(|&b| b == 7));
    }

    #[test]
    fn ensure_dimensions_reallocates_only_on_change() {
        let mut frame = FrameBuffer::default();
        assert!(frame.is_empty());
        assert!(frame.ensure_dimensions(4, 3));
        assert_eq!(frame.pixels().len(), 36);

        frame.pixels_mut()[0] = 42;
        assert!(!frame.ensure_dimensions(4, 3));
        // Same storage, contents untouched.
        assert_eq!(frame.pixels()[0], 42);

        assert!(frame.ensure_dimensions(8, 3));
        assert_eq!(frame.width(), 8);
        assert_eq!(frame.pixels().len(), 72);
    }

    #[test]
    fn zero_sized_buffer_is_empty() {
        let frame = FrameBuffer::new(0, 10);
        assert!(frame.is_empty());
        assert_eq!(FrameBuffer::byte_len(0, 10), 0);
    }
}
