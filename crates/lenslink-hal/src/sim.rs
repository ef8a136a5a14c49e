//! Simulated capture hardware for CI/CD testing without a physical camera.
//!
//! [`TestPatternSource`] renders a scrolling colour gradient and exposes a
//! [`SourceControls`] handle so tests (or the CLI) can flip readiness and
//! change dimensions after the source has been handed to a pipeline.
//! [`RecordingPreview`] counts the frames presented to it.
//!
//! # Example
//!
//! ```rust
//! use lenslink_hal::camera::{FrameBuffer, FrameSource};
//! use lenslink_hal::sim::TestPatternSource;
//!
//! let mut source = TestPatternSource::new("sim", 8, 4);
//! let (w, h) = source.dimensions();
//! let mut frame = FrameBuffer::new(w, h);
//! source.read_into(&mut frame).expect("test pattern is always ready");
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use lenslink_types::LinkError;
use parking_lot::Mutex;

use crate::camera::{FrameBuffer, FrameSource};
use crate::preview::PreviewSurface;

// ────────────────────────────────────────────────────────────────────────────
// Test-pattern source
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct ControlState {
    ready: AtomicBool,
    width: AtomicU32,
    height: AtomicU32,
    reads: AtomicU64,
}

/// Remote control for a [`TestPatternSource`].  Cheap to clone.
#[derive(Debug, Clone)]
pub struct SourceControls(Arc<ControlState>);

impl SourceControls {
    pub fn set_ready(&self, ready: bool) {
        self.0.ready.store(ready, Ordering::SeqCst);
    }

    pub fn set_dimensions(&self, width: u32, height: u32) {
        self.0.width.store(width, Ordering::SeqCst);
        self.0.height.store(height, Ordering::SeqCst);
    }

    /// Number of frames copied out of the source so far.
    pub fn reads(&self) -> u64 {
        self.0.reads.load(Ordering::SeqCst)
    }
}

/// A simulated camera producing a moving gradient.  Starts ready.
pub struct TestPatternSource {
    id: String,
    controls: SourceControls,
    frame_index: u32,
}

impl TestPatternSource {
    /// Create a new simulated source with the given identifier and size.
    pub fn new(id: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            id: id.into(),
            controls: SourceControls(Arc::new(ControlState {
                ready: AtomicBool::new(true),
                width: AtomicU32::new(width),
                height: AtomicU32::new(height),
                reads: AtomicU64::new(0),
            })),
            frame_index: 0,
        }
    }

    /// Builder-style: start in the not-ready state.
    pub fn not_ready(self) -> Self {
        self.controls.set_ready(false);
        self
    }

    /// Handle for changing readiness and size after the source is boxed.
    pub fn controls(&self) -> SourceControls {
        self.controls.clone()
    }
}

impl FrameSource for TestPatternSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_ready(&self) -> bool {
        self.controls.0.ready.load(Ordering::SeqCst)
    }

    fn dimensions(&self) -> (u32, u32) {
        (
            self.controls.0.width.load(Ordering::SeqCst),
            self.controls.0.height.load(Ordering::SeqCst),
        )
    }

    fn read_into(&mut self, frame: &mut FrameBuffer) -> Result<(), LinkError> {
        if !self.is_ready() {
            return Err(LinkError::SourceNotReady(format!("{} is not running", self.id)));
        }
        let (w, h) = self.dimensions();
        if frame.width() != w || frame.height() != h || frame.is_empty() {
            return Err(LinkError::SourceNotReady(format!(
                "{} is {w}x{h}, buffer is {}x{}",
                self.id,
                frame.width(),
                frame.height()
            )));
        }

        let shift = self.frame_index;
        let width = w as usize;
        for (i, px) in frame
            .pixels_mut()
            .chunks_exact_mut(FrameBuffer::CHANNELS)
            .enumerate()
        {
            let x = (i % width) as u32;
            let y = (i / width) as u32;
            px[0] = (x.wrapping_add(shift) & 0xFF) as u8;
            px[1] = (y.wrapping_add(shift) & 0xFF) as u8;
            px[2] = ((x ^ y) & 0xFF) as u8;
        }

        self.frame_index = self.frame_index.wrapping_add(1);
        self.controls.0.reads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Recording preview
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct PreviewLog {
    frames: u64,
    last_dimensions: Option<(u32, u32)>,
}

/// A preview surface that records what it was shown.  Clones share state.
#[derive(Debug, Clone, Default)]
pub struct RecordingPreview(Arc<Mutex<PreviewLog>>);

impl RecordingPreview {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.0.lock().frames
    }

    pub fn last_dimensions(&self) -> Option<(u32, u32)> {
        self.0.lock().last_dimensions
    }
}

impl PreviewSurface for RecordingPreview {
    fn present(&mut self, frame: &FrameBuffer) {
        let mut log = self.0.lock();
        log.frames += 1;
        log.last_dimensions = Some((frame.width(), frame.height()));
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_fills_frame_and_counts_reads() {
        let mut src = TestPatternSource::new("front", 4, 2);
        let controls = src.controls();
        let mut frame = FrameBuffer::new(4, 2);

        src.read_into(&mut frame).unwrap();
        let first = frame.pixels().to_vec();
        src.read_into(&mut frame).unwrap();

        assert_eq!(controls.reads(), 2);
        assert_ne!(first, frame.pixels(), "pattern must move between frames");
    }

    #[test]
    fn not_ready_source_refuses_reads() {
        let mut src = TestPatternSource::new("front", 4, 4).not_ready();
        assert!(!src.is_ready());
        let mut frame = FrameBuffer::new(4, 4);
        assert!(matches!(
            src.read_into(&mut frame),
            Err(LinkError::SourceNotReady(_))
        ));
    }

    #[test]
    fn controls_change_dimensions_after_boxing() {
        let src = TestPatternSource::new("front", 4, 4);
        let controls = src.controls();
        let boxed: Box<dyn FrameSource> = Box::new(src);

        controls.set_dimensions(16, 9);
        assert_eq!(boxed.dimensions(), (16, 9));
    }

    #[test]
    fn mismatched_buffer_is_rejected() {
        let mut src = TestPatternSource::new("front", 4, 4);
        let mut frame = FrameBuffer::new(2, 2);
        assert!(src.read_into(&mut frame).is_err());
    }

    #[test]
    fn recording_preview_tracks_frames() {
        let preview = RecordingPreview::new();
        let mut surface: Box<dyn PreviewSurface> = Box::new(preview.clone());
        surface.present(&FrameBuffer::new(3, 2));
        surface.present(&FrameBuffer::new(3, 2));
        assert_eq!(preview.frames(), 2);
        assert_eq!(preview.last_dimensions(), Some((3, 2)));
    }
}
