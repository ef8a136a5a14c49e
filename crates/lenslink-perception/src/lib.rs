//! `lenslink-perception` – spatial state fed by the remote pose stream.
//!
//! # Modules
//!
//! - [`transform`] – [`Vec3`][transform::Vec3],
//!   [`Quaternion`][transform::Quaternion] and
//!   [`Transform3D`][transform::Transform3D], including the combined Euler
//!   construction the pose stream is authored against.
//! - [`pose`] – [`PoseUpdate`][pose::PoseUpdate]: best-effort parser for the
//!   line-oriented `T` / `R` pose protocol.
//! - [`spatial`] – [`SpatialSink`][spatial::SpatialSink]: shared
//!   position/orientation state, updated atomically and read as consistent
//!   snapshots.

pub mod pose;
pub mod spatial;
pub mod transform;

pub use pose::{AxisUpdate, PoseUpdate};
pub use spatial::{PositionMode, SpatialSink, SpatialState};
pub use transform::{Quaternion, Transform3D, Vec3};
