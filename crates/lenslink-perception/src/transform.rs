//! Rigid-body math for the spatial sink.
//!
//! [`Quaternion::from_euler_degrees`] reproduces the engine convention the
//! remote pose stream is authored against: a single combined rotation that
//! applies Z first, then X, then Y.
//!
//! # Example
//!
//! ```rust
//! use lenslink_perception::transform::{Quaternion, Vec3};
//!
//! // 90° about Z turns +X into +Y.
//! let q = Quaternion::from_euler_degrees(0.0, 0.0, 90.0);
//! let v = q.rotate(Vec3::new(1.0, 0.0, 0.0));
//! assert!((v.y - 1.0).abs() < 1e-5);
//! ```

// ────────────────────────────────────────────────────────────────────────────
// Primitive types
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D vector.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    /// Create a new vector.
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

/// A unit quaternion representing a 3-D rotation (w, x, y, z convention).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Quaternion {
    /// Create a quaternion.  The caller is responsible for providing a unit
    /// quaternion (|q| = 1).
    pub fn new(w: f32, x: f32, y: f32, z: f32) -> Self {
        Self { w, x, y, z }
    }

    /// The identity rotation (no rotation).
    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// Rotation of `angle_rad` about a unit `axis`.
    pub fn from_axis_angle(axis: Vec3, angle_rad: f32) -> Self {
        let (s, c) = (angle_rad * 0.5).sin_cos();
        Self::new(c, axis.x * s, axis.y * s, axis.z * s)
    }

    /// Absolute orientation from Euler angles in degrees.
    ///
    /// Equivalent to rotating by `z` about Z, then `x` about X, then `y`
    /// about Y (all about the fixed parent axes), composed into one
    /// quaternion instead of being accumulated step by step.
    pub fn from_euler_degrees(x: f32, y: f32, z: f32) -> Self {
        let qx = Self::from_axis_angle(Vec3::new(1.0, 0.0, 0.0), x.to_radians());
        let qy = Self::from_axis_angle(Vec3::new(0.0, 1.0, 0.0), y.to_radians());
        let qz = Self::from_axis_angle(Vec3::new(0.0, 0.0, 1.0), z.to_radians());
        qy.mul(qx).mul(qz).normalize()
    }

    /// Hamilton product: compose two rotations.
    pub fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
        )
    }

    /// Conjugate (== inverse for a unit quaternion).
    pub fn conjugate(self) -> Self {
        Self::new(self.w, -self.x, -self.y, -self.z)
    }

    /// Scale to unit length.  A degenerate (zero) quaternion becomes the
    /// identity.
    pub fn normalize(self) -> Self {
        let n = (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt();
        if n <= f32::EPSILON || !n.is_finite() {
            return Self::identity();
        }
        Self::new(self.w / n, self.x / n, self.y / n, self.z / n)
    }

    /// Rotation angle in radians, in `[0, π]`.
    pub fn angle(self) -> f32 {
        2.0 * self.w.abs().min(1.0).acos()
    }

    /// Rotate a vector by this quaternion: p' = q * p * q*.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        // Express v as a pure quaternion.
        let p = Self::new(0.0, v.x, v.y, v.z);
        let rotated = self.mul(p).mul(self.conjugate());
        Vec3::new(rotated.x, rotated.y, rotated.z)
    }

    /// Row-major 3×3 rotation matrix.
    pub fn rotation_matrix(self) -> [[f32; 3]; 3] {
        let Self { w, x, y, z } = self;
        [
            [
                1.0 - 2.0 * (y * y + z * z),
                2.0 * (x * y - w * z),
                2.0 * (x * z + w * y),
            ],
            [
                2.0 * (x * y + w * z),
                1.0 - 2.0 * (x * x + z * z),
                2.0 * (y * z - w * x),
            ],
            [
                2.0 * (x * z - w * y),
                2.0 * (y * z + w * x),
                1.0 - 2.0 * (x * x + y * y),
            ],
        ]
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Transform3D
// ────────────────────────────────────────────────────────────────────────────

/// A rigid-body 3-D transform: rotation followed by translation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Transform3D {
    pub translation: Vec3,
    pub rotation: Quaternion,
}

impl Transform3D {
    /// Create a transform from a translation and rotation.
    pub fn new(translation: Vec3, rotation: Quaternion) -> Self {
        Self {
            translation,
            rotation,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_1_SQRT_2;

    fn assert_vec_eq(a: Vec3, b: Vec3) {
        assert!((a.x - b.x).abs() < 1e-4, "x: {} vs {}", a.x, b.x);
        assert!((a.y - b.y).abs() < 1e-4, "y: {} vs {}", a.y, b.y);
        assert!((a.z - b.z).abs() < 1e-4, "z: {} vs {}", a.z, b.z);
    }

    // ── Quaternion ──────────────────────────────────────────────────────────

    #[test]
    fn quaternion_identity_rotate_is_noop() {
        let q = Quaternion::identity();
        let v = Vec3::new(1.0, 2.0, 3.0);
        assert_vec_eq(q.rotate(v), v);
    }

    #[test]
    fn quaternion_90deg_yaw_rotates_x_to_y() {
        // 90° rotation around Z axis: (cos45°, 0, 0, sin45°)
        let q = Quaternion::new(FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2);
        assert_vec_eq(q.rotate(Vec3::new(1.0, 0.0, 0.0)), Vec3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn quaternion_conjugate_is_inverse() {
        let q = Quaternion::from_euler_degrees(30.0, 45.0, 60.0);
        let prod = q.mul(q.conjugate());
        assert!((prod.w - 1.0).abs() < 1e-5);
        assert!(prod.x.abs() < 1e-5);
        assert!(prod.y.abs() < 1e-5);
        assert!(prod.z.abs() < 1e-5);
    }

    #[test]
    fn euler_single_axis_matches_axis_angle() {
        let q = Quaternion::from_euler_degrees(0.0, 0.0, 90.0);
        let expected = Quaternion::new(FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2);
        assert!((q.w - expected.w).abs() < 1e-5);
        assert!((q.z - expected.z).abs() < 1e-5);
        assert!((q.angle() - 90f32.to_radians()).abs() < 1e-4);
    }

    #[test]
    fn euler_applies_z_then_x_then_y() {
        let (x, y, z) = (30.0, 45.0, 60.0);
        let combined = Quaternion::from_euler_degrees(x, y, z);
        let qx = Quaternion::from_euler_degrees(x, 0.0, 0.0);
        let qy = Quaternion::from_euler_degrees(0.0, y, 0.0);
        let qz = Quaternion::from_euler_degrees(0.0, 0.0, z);

        let v = Vec3::new(0.3, -1.2, 2.0);
        let stepwise = qy.rotate(qx.rotate(qz.rotate(v)));
        assert_vec_eq(combined.rotate(v), stepwise);
    }

    #[test]
    fn normalize_degenerate_is_identity() {
        let q = Quaternion::new(0.0, 0.0, 0.0, 0.0).normalize();
        assert_eq!(q, Quaternion::identity());
    }

    #[test]
    fn rotation_matrix_agrees_with_rotate() {
        let q = Quaternion::from_euler_degrees(10.0, -70.0, 120.0);
        let m = q.rotation_matrix();
        let v = Vec3::new(1.0, 2.0, 3.0);
        let by_matrix = Vec3::new(
            m[0][0] * v.x + m[0][1] * v.y + m[0][2] * v.z,
            m[1][0] * v.x + m[1][1] * v.y + m[1][2] * v.z,
            m[2][0] * v.x + m[2][1] * v.y + m[2][2] * v.z,
        );
        assert_vec_eq(by_matrix, q.rotate(v));
    }
}
