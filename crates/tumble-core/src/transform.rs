//! Transforms
//!
//! World-space pose of a game object. Every mutator raises the `moved` flag so
//! that subsystems caching derived data (the physics broad phase, for one) can
//! skip objects that did not change since they last looked.

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Transform component for entities
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    position: Vec3,
    rotation: Quat,
    scale: Vec3,
    /// Set by every mutation, cleared by whoever consumes the change
    #[serde(skip, default = "moved_default")]
    moved: bool,
}

fn moved_default() -> bool {
    true
}

impl Transform {
    /// Identity transform
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
        moved: true,
    };

    /// Create a new transform with the given position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    /// Create a new transform with position and rotation
    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self::new(position, rotation, Vec3::ONE)
    }

    /// Create a new transform from all components
    pub fn new(position: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            position,
            rotation: rotation.normalize(),
            scale,
            moved: true,
        }
    }

    /// World position
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// World rotation (unit quaternion)
    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    /// World scale
    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    /// Whether the transform changed since the flag was last cleared
    pub fn is_moved(&self) -> bool {
        self.moved
    }

    /// Acknowledge the latest change
    pub fn clear_moved(&mut self) {
        self.moved = false;
    }

    /// Set the position
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.moved = true;
    }

    /// Set the rotation; the quaternion is renormalized
    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation.normalize();
        self.moved = true;
    }

    /// Set the scale
    pub fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
        self.moved = true;
    }

    /// Translate the transform
    pub fn translate(&mut self, delta: Vec3) {
        self.position += delta;
        self.moved = true;
    }

    /// Rotate by a scaled axis (axis * angle in radians), all axes at once
    pub fn rotate_scaled_axis(&mut self, scaled_axis: Vec3) {
        if scaled_axis.length_squared() <= f32::EPSILON * f32::EPSILON {
            return;
        }
        self.rotation = (Quat::from_scaled_axis(scaled_axis) * self.rotation).normalize();
        self.moved = true;
    }

    /// Get the local transformation matrix
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Map a local-space point to world space
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.position + self.rotation * (self.scale * point)
    }

    /// Map a local-space direction to world space (rotation only)
    pub fn transform_direction(&self, direction: Vec3) -> Vec3 {
        self.rotation * direction
    }

    /// Map a world-space direction into local space (inverse rotation only)
    pub fn inverse_rotate(&self, direction: Vec3) -> Vec3 {
        self.rotation.inverse() * direction
    }

    /// Interpolate between two transforms
    pub fn lerp(&self, other: &Transform, t: f32) -> Transform {
        Transform::new(
            self.position.lerp(other.position, t),
            self.rotation.slerp(other.rotation, t),
            self.scale.lerp(other.scale, t),
        )
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_identity() {
        let t = Transform::IDENTITY;
        assert_eq!(t.position(), Vec3::ZERO);
        assert_eq!(t.rotation(), Quat::IDENTITY);
        assert_eq!(t.scale(), Vec3::ONE);
    }

    #[test]
    fn test_transform_matrix() {
        let t = Transform::from_position(Vec3::new(1.0, 2.0, 3.0));
        let translation = t.matrix().w_axis.truncate();
        assert!((translation - Vec3::new(1.0, 2.0, 3.0)).length() < 0.001);
    }

    #[test]
    fn test_moved_flag() {
        let mut t = Transform::from_position(Vec3::ZERO);
        assert!(t.is_moved());

        t.clear_moved();
        assert!(!t.is_moved());

        t.translate(Vec3::X);
        assert!(t.is_moved());

        t.clear_moved();
        t.rotate_scaled_axis(Vec3::ZERO);
        assert!(!t.is_moved(), "zero rotation is not a move");
    }

    #[test]
    fn test_transform_point_matches_matrix() {
        let t = Transform::new(
            Vec3::new(1.0, -2.0, 0.5),
            Quat::from_rotation_y(0.7),
            Vec3::new(2.0, 1.0, 0.5),
        );
        let p = Vec3::new(0.3, 0.4, -1.2);
        let expected = t.matrix().transform_point3(p);
        assert!((t.transform_point(p) - expected).length() < 1e-5);
    }

    #[test]
    fn test_inverse_rotate() {
        let t = Transform::from_position_rotation(Vec3::ZERO, Quat::from_rotation_z(1.1));
        let d = Vec3::new(0.2, 0.9, -0.4);
        assert!((t.transform_direction(t.inverse_rotate(d)) - d).length() < 1e-5);
    }

    #[test]
    fn test_rotate_scaled_axis_is_simultaneous() {
        let mut t = Transform::IDENTITY;
        let omega_dt = Vec3::new(0.3, 0.0, 0.4);
        t.rotate_scaled_axis(omega_dt);

        // A single rotation of |w| radians about w/|w|
        let (axis, angle) = t.rotation().to_axis_angle();
        assert!((angle - 0.5).abs() < 1e-5);
        assert!((axis - omega_dt / 0.5).length() < 1e-4);
    }

    #[test]
    fn test_transform_lerp() {
        let t1 = Transform::from_position(Vec3::ZERO);
        let t2 = Transform::from_position(Vec3::new(10.0, 0.0, 0.0));

        let mid = t1.lerp(&t2, 0.5);
        assert!((mid.position().x - 5.0).abs() < 0.001);
    }
}
