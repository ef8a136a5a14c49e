//! [`SpatialSink`] – the shared position/orientation state fed by pose
//! messages.
//!
//! One writer (the pose receiver) and any number of readers (a render
//! step, telemetry).  [`SpatialSink::apply`] computes the next state and
//! swaps it in under a single write lock, so [`SpatialSink::snapshot`]
//! always returns either the state before or after an update, never a mix.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::pose::PoseUpdate;
use crate::transform::{Quaternion, Transform3D, Vec3};

/// How translation records affect the sink's position.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PositionMode {
    /// Apply the parsed translation axes.
    #[default]
    Tracked,
    /// Parse translation records but keep the position pinned here.
    Anchored(Vec3),
}

/// A consistent position + orientation snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpatialState {
    pub transform: Transform3D,
    /// Last applied Euler angles (radians) the orientation was built from.
    pub euler_rad: Vec3,
    /// Number of updates applied so far.
    pub revision: u64,
}

impl SpatialState {
    /// State resting at `position` with no rotation.
    pub fn at(position: Vec3) -> Self {
        Self {
            transform: Transform3D::new(position, Quaternion::identity()),
            ..Self::default()
        }
    }

    pub fn position(&self) -> Vec3 {
        self.transform.translation
    }

    pub fn rotation(&self) -> Quaternion {
        self.transform.rotation
    }

    /// Absolute orientation as a row-major 3×3 matrix.
    pub fn orientation_matrix(&self) -> [[f32; 3]; 3] {
        self.transform.rotation.rotation_matrix()
    }

    /// The state that results from applying `update` on top of `self`.
    ///
    /// Fields the update did not carry keep their current value.  Rotation
    /// axes are merged in radians first and the whole orientation is then
    /// rebuilt from the three angles in one step.
    pub fn merged(&self, update: &PoseUpdate, mode: PositionMode) -> Self {
        let mut next = *self;

        next.transform.translation = match mode {
            PositionMode::Anchored(anchor) => anchor,
            PositionMode::Tracked => match update.translation {
                Some(axes) => {
                    let [x, y, z] = axes.resolve(self.transform.translation.to_array());
                    Vec3::new(x, y, z)
                }
                None => self.transform.translation,
            },
        };

        if let Some(axes) = update.rotation_rad {
            let [rx, ry, rz] = axes.resolve(self.euler_rad.to_array());
            next.euler_rad = Vec3::new(rx, ry, rz);
            next.transform.rotation =
                Quaternion::from_euler_degrees(rx.to_degrees(), ry.to_degrees(), rz.to_degrees());
        }

        next.revision = self.revision.wrapping_add(1);
        next
    }
}

/// Shared handle to the spatial state.  Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct SpatialSink {
    state: Arc<RwLock<SpatialState>>,
}

impl SpatialSink {
    pub fn new(initial: SpatialState) -> Self {
        Self {
            state: Arc::new(RwLock::new(initial)),
        }
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> SpatialState {
        *self.state.read()
    }

    /// Apply `update` atomically and return the new state.
    pub fn apply(&self, update: &PoseUpdate, mode: PositionMode) -> SpatialState {
        let mut state = self.state.write();
        let next = state.merged(update, mode);
        *state = next;
        next
    }
}
