//! Local preview hook.

use crate::camera::FrameBuffer;

/// A display surface fed the live pixel buffer for local preview.
///
/// Called from the capture tick right after the frame has been copied and
/// before it is encoded, so implementations must return quickly and must
/// not hold on to the borrowed buffer.
pub trait PreviewSurface: Send {
    fn present(&mut self, frame: &FrameBuffer);
}
