//! Rigid bodies
//!
//! Rotational inertia is a diagonal tensor in local space. Instead of
//! inverting and rotating the full tensor, the body answers "how hard is it
//! to spin me about this world axis" with [`RigidBody::inverse_moment_about`],
//! which projects the axis into local space and weights the diagonal by the
//! squared axis components.

use glam::{Quat, Vec3};
use tumble_core::Transform;

use crate::collider::Collider;
use crate::error::{PhysicsError, PhysicsResult};

/// Axes shorter than this contribute no rotation
const MIN_AXIS_LENGTH_SQUARED: f32 = 1e-12;

/// Rigid body component
#[derive(Debug, Clone, PartialEq)]
pub struct RigidBody {
    mass: f32,
    inv_mass: f32,
    local_inertia: Vec3,
    /// Linear velocity in world space
    pub velocity: Vec3,
    /// Angular velocity in world space, radians per second about its direction
    pub angular_velocity: Vec3,
    force: Vec3,
    torque: Vec3,
    kinematic: bool,
    /// Fraction of linear velocity kept per second, in (0, 1]
    pub linear_drag: f32,
    /// Fraction of angular velocity kept per second, in (0, 1]
    pub angular_drag: f32,
}

impl RigidBody {
    /// Dynamic body with the given mass and diagonal local inertia
    ///
    /// # Panics
    /// If `mass` is not finite and positive, or any inertia component is negative.
    pub fn new(mass: f32, local_inertia: Vec3) -> Self {
        match Self::try_new(mass, local_inertia) {
            Ok(body) => body,
            Err(err) => panic!("invalid rigid body: {err}"),
        }
    }

    /// Dynamic body, reporting an invalid mass
    pub fn try_new(mass: f32, local_inertia: Vec3) -> PhysicsResult<Self> {
        if !(mass.is_finite() && mass > 0.0) {
            return Err(PhysicsError::InvalidMass(mass));
        }
        assert!(
            local_inertia.is_finite() && local_inertia.min_element() >= 0.0,
            "rigid body inertia must be finite and non-negative, got {local_inertia}"
        );
        Ok(Self {
            mass,
            inv_mass: 1.0 / mass,
            local_inertia,
            velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            force: Vec3::ZERO,
            torque: Vec3::ZERO,
            kinematic: false,
            linear_drag: 0.99,
            angular_drag: 0.95,
        })
    }

    /// Kinematic body: moved by game code, immovable for the solver
    pub fn kinematic() -> Self {
        Self {
            mass: f32::INFINITY,
            inv_mass: 0.0,
            local_inertia: Vec3::ZERO,
            velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            force: Vec3::ZERO,
            torque: Vec3::ZERO,
            kinematic: true,
            linear_drag: 1.0,
            angular_drag: 1.0,
        }
    }

    /// Dynamic body with mass from `density * volume` and the inertia of the
    /// collider's local bounding box
    pub fn from_collider(collider: &Collider) -> Self {
        let mass = collider.density * collider.volume();
        let size = collider.local_aabb().size();
        let sq = size * size;
        let inertia = Vec3::new(sq.y + sq.z, sq.x + sq.z, sq.x + sq.y) * (mass / 12.0);
        Self::new(mass, inertia)
    }

    /// Set both drag coefficients
    pub fn with_drag(mut self, linear: f32, angular: f32) -> Self {
        debug_assert!(linear > 0.0 && linear <= 1.0, "linear drag {linear} outside (0, 1]");
        debug_assert!(angular > 0.0 && angular <= 1.0, "angular drag {angular} outside (0, 1]");
        self.linear_drag = linear;
        self.angular_drag = angular;
        self
    }

    /// Set the initial linear velocity
    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.velocity = velocity;
        self
    }

    /// Mass, infinite for kinematic bodies
    pub fn mass(&self) -> f32 {
        self.mass
    }

    /// Inverse mass, zero for kinematic bodies
    pub fn inverse_mass(&self) -> f32 {
        self.inv_mass
    }

    /// Diagonal inertia in local space
    pub fn local_inertia(&self) -> Vec3 {
        self.local_inertia
    }

    /// Whether the solver leaves this body alone
    pub fn is_kinematic(&self) -> bool {
        self.kinematic
    }

    /// Accumulated force since the last step
    pub fn force(&self) -> Vec3 {
        self.force
    }

    /// Accumulated torque since the last step
    pub fn torque(&self) -> Vec3 {
        self.torque
    }

    /// Accumulate a force through the center of mass
    pub fn add_force(&mut self, force: Vec3) {
        self.force += force;
    }

    /// Accumulate a torque
    pub fn add_torque(&mut self, torque: Vec3) {
        self.torque += torque;
    }

    /// Accumulate a force applied at `offset` from the center of mass
    pub fn add_force_at_point(&mut self, force: Vec3, offset: Vec3) {
        self.force += force;
        self.torque += offset.cross(force);
    }

    /// Inverse of the moment of inertia about a world-space axis.
    ///
    /// Zero for kinematic bodies, negligible axes and axes the body has no
    /// inertia about.
    pub fn inverse_moment_about(&self, axis: Vec3, rotation: Quat) -> f32 {
        if self.kinematic || axis.length_squared() <= MIN_AXIS_LENGTH_SQUARED {
            return 0.0;
        }
        let local = (rotation.inverse() * axis).normalize();
        let moment = self.local_inertia.dot(local * local);
        if moment <= f32::EPSILON {
            return 0.0;
        }
        1.0 / moment
    }

    /// Apply an impulse at `offset` from the center of mass.
    ///
    /// Changes linear velocity by `impulse * inverse_mass` and angular velocity
    /// by the inverse moment about `offset x impulse` times that axis.
    pub fn impulse(&mut self, offset: Vec3, impulse: Vec3, rotation: Quat) {
        if self.kinematic {
            return;
        }
        debug_assert!(impulse.is_finite(), "non-finite impulse {impulse}");
        self.velocity += impulse * self.inv_mass;
        let angular = offset.cross(impulse);
        self.angular_velocity += angular * self.inverse_moment_about(angular, rotation);
    }

    /// Velocity of the body's material at `offset` from its center
    pub fn velocity_at(&self, offset: Vec3) -> Vec3 {
        self.velocity + self.angular_velocity.cross(offset)
    }

    /// Advance velocities and pose by `dt` and clear the accumulators.
    ///
    /// Kinematic bodies are left untouched. Accumulated force and torque are
    /// applied as one velocity change each, `force * inverse_mass` and
    /// `torque` scaled by the inverse moment about its own axis.
    pub fn integrate(&mut self, transform: &mut Transform, gravity: Vec3, dt: f32) {
        if self.kinematic {
            return;
        }

        self.velocity += gravity * dt;
        self.velocity *= self.linear_drag.powf(dt);
        self.angular_velocity *= self.angular_drag.powf(dt);

        self.velocity += self.force * self.inv_mass;
        self.angular_velocity +=
            self.torque * self.inverse_moment_about(self.torque, transform.rotation());
        self.force = Vec3::ZERO;
        self.torque = Vec3::ZERO;

        let delta = self.velocity * dt;
        if delta != Vec3::ZERO {
            transform.translate(delta);
        }
        transform.rotate_scaled_axis(self.angular_velocity * dt);
    }

    /// Linear momentum
    pub fn momentum(&self) -> Vec3 {
        if self.kinematic {
            Vec3::ZERO
        } else {
            self.velocity * self.mass
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tumble_core::Entity;

    use super::*;
    use crate::shape::ConvexMesh;

    fn unit_body() -> RigidBody {
        RigidBody::new(1.0, Vec3::splat(1.0 / 6.0)).with_drag(1.0, 1.0)
    }

    #[test]
    fn test_invalid_mass() {
        assert_eq!(
            RigidBody::try_new(0.0, Vec3::ONE).err(),
            Some(PhysicsError::InvalidMass(0.0))
        );
        assert!(RigidBody::try_new(-2.0, Vec3::ONE).is_err());
        assert!(RigidBody::try_new(f32::NAN, Vec3::ONE).is_err());
    }

    #[test]
    #[should_panic(expected = "invalid rigid body")]
    fn test_new_panics_on_zero_mass() {
        let _ = RigidBody::new(0.0, Vec3::ONE);
    }

    #[test]
    fn test_from_collider_unit_cube() {
        let collider = Collider::new(
            Entity::new(0, 0),
            Arc::new(ConvexMesh::cuboid(Vec3::splat(0.5))),
        )
        .with_density(2.0);
        let body = RigidBody::from_collider(&collider);
        assert!((body.mass() - 2.0).abs() < 1e-5);
        assert!((body.local_inertia().x - 2.0 / 6.0).abs() < 1e-5);
    }

    #[test]
    fn test_inverse_moment_about() {
        let body = RigidBody::new(1.0, Vec3::new(1.0, 2.0, 4.0));
        assert!((body.inverse_moment_about(Vec3::Y * 3.0, Quat::IDENTITY) - 0.5).abs() < 1e-6);
        // Rotating the body a quarter turn about z swaps its x and y moments
        let rot = Quat::from_rotation_z(std::f32::consts::FRAC_PI_2);
        assert!((body.inverse_moment_about(Vec3::Y, rot) - 1.0).abs() < 1e-5);
        assert_eq!(body.inverse_moment_about(Vec3::ZERO, Quat::IDENTITY), 0.0);
        assert_eq!(RigidBody::kinematic().inverse_moment_about(Vec3::X, Quat::IDENTITY), 0.0);
    }

    #[test]
    fn test_impulse_linear_and_angular() {
        let mut body = unit_body();
        body.impulse(Vec3::ZERO, Vec3::X * 2.0, Quat::IDENTITY);
        assert_eq!(body.velocity, Vec3::X * 2.0);
        assert_eq!(body.angular_velocity, Vec3::ZERO);

        body.impulse(Vec3::Y, Vec3::X, Quat::IDENTITY);
        // offset x impulse = Y x X = -Z, inverse moment 6
        assert!((body.angular_velocity - Vec3::NEG_Z * 6.0).length() < 1e-4);
    }

    #[test]
    fn test_kinematic_ignores_impulse_and_integration() {
        let mut body = RigidBody::kinematic();
        body.velocity = Vec3::X;
        body.impulse(Vec3::Y, Vec3::X * 10.0, Quat::IDENTITY);
        assert_eq!(body.velocity, Vec3::X);

        let mut t = Transform::IDENTITY;
        t.clear_moved();
        body.integrate(&mut t, Vec3::new(0.0, -9.81, 0.0), 0.1);
        assert_eq!(t.position(), Vec3::ZERO);
        assert!(!t.is_moved());
    }

    #[test]
    fn test_integrate_gravity_and_force() {
        let mut body = unit_body();
        let mut t = Transform::IDENTITY;
        body.add_force(Vec3::X * 3.0);
        body.integrate(&mut t, Vec3::new(0.0, -10.0, 0.0), 0.5);
        assert!((body.velocity - Vec3::new(3.0, -5.0, 0.0)).length() < 1e-5);
        assert!((t.position() - Vec3::new(1.5, -2.5, 0.0)).length() < 1e-5);
        assert_eq!(body.force(), Vec3::ZERO);
        assert!(t.is_moved());
    }

    #[test]
    fn test_drag_is_timestep_independent() {
        let mut a = RigidBody::new(1.0, Vec3::ONE).with_drag(0.5, 0.5).with_velocity(Vec3::X);
        let mut b = a.clone();
        let (mut ta, mut tb) = (Transform::IDENTITY, Transform::IDENTITY);
        a.integrate(&mut ta, Vec3::ZERO, 1.0);
        for _ in 0..4 {
            b.integrate(&mut tb, Vec3::ZERO, 0.25);
        }
        assert!((a.velocity.x - 0.5).abs() < 1e-5);
        assert!((b.velocity.x - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_rotation_about_all_axes_at_once() {
        let mut body = unit_body();
        body.angular_velocity = Vec3::new(1.0, 1.0, 0.0);
        let mut t = Transform::IDENTITY;
        body.integrate(&mut t, Vec3::ZERO, 0.5);
        let expected = Quat::from_scaled_axis(Vec3::new(0.5, 0.5, 0.0));
        assert!(t.rotation().abs_diff_eq(expected, 1e-5));
    }

    #[test]
    fn test_force_at_point_produces_torque() {
        let mut body = unit_body();
        body.add_force_at_point(Vec3::Y, Vec3::X);
        assert_eq!(body.torque(), Vec3::Z);
    }
}
