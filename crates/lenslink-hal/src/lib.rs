//! `lenslink-hal` – capture-side hardware abstraction.
//!
//! # Modules
//!
//! - [`camera`] – [`FrameSource`][camera::FrameSource] trait for live video
//!   sources and the reusable [`FrameBuffer`][camera::FrameBuffer] they copy
//!   into.
//! - [`encoder`] – [`FrameEncoder`][encoder::FrameEncoder] and the JPEG
//!   implementation used by the capture pipeline.
//! - [`preview`] – [`PreviewSurface`][preview::PreviewSurface] hook for a
//!   local display of the live frame.
//! - [`sim`] – simulated source and preview for headless runs and tests.

pub mod camera;
pub mod encoder;
pub mod preview;
pub mod sim;

pub use camera::{FrameBuffer, FrameSource};
pub use encoder::{FrameEncoder, JpegFrameEncoder};
pub use preview::PreviewSurface;
pub use sim::{RecordingPreview, SourceControls, TestPatternSource};
