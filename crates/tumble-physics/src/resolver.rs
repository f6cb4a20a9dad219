//! Impulse-based contact response
//!
//! Each contact point becomes a [`ContactConstraint`] that accumulates a
//! normal impulse and a friction impulse over several sweeps. Every sweep
//! drives the normal approach speed toward the restitution target, keeping
//! the accumulated normal impulse non-negative, then pushes against the
//! remaining sliding inside the Coulomb cone of that normal impulse. Both
//! use a reduced mass that folds in rotational resistance about
//! `offset x direction`.
//!
//! Positional correction is only computed here. The world records the
//! offsets and applies them after every contact has been resolved.

use glam::{Quat, Vec3};

use crate::body::RigidBody;
use crate::contact::Contact;

/// Reduced masses below this are treated as infinite mass
const MIN_REDUCED_MASS: f32 = 1e-9;

/// One side of a contact as seen by the resolver
#[derive(Debug)]
pub struct ContactSide<'a> {
    /// The body, `None` for static colliders
    pub body: Option<&'a mut RigidBody>,
    /// Center of mass in world space
    pub center: Vec3,
    /// World rotation of the body
    pub rotation: Quat,
    /// Collider elasticity
    pub elasticity: f32,
    /// Collider friction coefficient
    pub friction: f32,
}

impl ContactSide<'_> {
    fn velocity_at(&self, offset: Vec3) -> Vec3 {
        self.body
            .as_ref()
            .map_or(Vec3::ZERO, |body| body.velocity_at(offset))
    }

    fn inverse_mass(&self) -> f32 {
        self.body.as_ref().map_or(0.0, |body| body.inverse_mass())
    }

    /// Resistance to an impulse along `direction` applied at `offset`
    fn effective_inverse_mass(&self, offset: Vec3, direction: Vec3) -> f32 {
        let Some(body) = self.body.as_ref() else {
            return 0.0;
        };
        if body.is_kinematic() {
            return 0.0;
        }
        let axis = offset.cross(direction);
        body.inverse_mass() + axis.length_squared() * body.inverse_moment_about(axis, self.rotation)
    }

    fn apply(&mut self, offset: Vec3, impulse: Vec3) {
        if let Some(body) = self.body.as_mut() {
            body.impulse(offset, impulse, self.rotation);
        }
    }
}

/// Impulse magnitudes applied for one contact
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ContactImpulse {
    /// Along the contact normal, never negative
    pub normal: f32,
    /// Along the sliding direction, never negative
    pub tangent: f32,
}

impl ContactImpulse {
    /// Whether any impulse was applied
    pub fn is_applied(&self) -> bool {
        self.normal > 0.0 || self.tangent > 0.0
    }
}

/// Impulse a contact has built up, as carried from one step to the next
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AccumulatedImpulse {
    /// Along the contact normal, never negative
    pub normal: f32,
    /// World-space friction impulse, inside the cone of `normal`
    pub friction: Vec3,
}

/// One contact point being solved over several sweeps
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactConstraint {
    contact: Contact,
    /// Normal separation speed the solver drives toward
    target: f32,
    accumulated: AccumulatedImpulse,
}

impl ContactConstraint {
    /// Capture the approach speed before any impulse is applied.
    ///
    /// Contacts closing faster than `restitution_threshold` aim to bounce
    /// back at `elasticity_a * elasticity_b` times that speed. Slower ones
    /// only stop.
    pub fn new(
        contact: Contact,
        a: &ContactSide<'_>,
        b: &ContactSide<'_>,
        restitution_threshold: f32,
    ) -> Self {
        let ra = contact.position - a.center;
        let rb = contact.position - b.center;
        let approach = (b.velocity_at(rb) - a.velocity_at(ra)).dot(contact.normal);
        let target = if approach < -restitution_threshold {
            -a.elasticity * b.elasticity * approach
        } else {
            0.0
        };
        Self {
            contact,
            target,
            accumulated: AccumulatedImpulse::default(),
        }
    }

    /// The contact being solved
    pub fn contact(&self) -> &Contact {
        &self.contact
    }

    /// Impulse accumulated so far
    pub fn accumulated(&self) -> AccumulatedImpulse {
        self.accumulated
    }

    /// Magnitudes of the accumulated impulse
    pub fn impulse(&self) -> ContactImpulse {
        ContactImpulse {
            normal: self.accumulated.normal,
            tangent: self.accumulated.friction.length(),
        }
    }

    /// Start from an impulse carried over from the previous step and apply
    /// it right away. Friction is flattened onto the current contact plane.
    pub fn warm_start(
        &mut self,
        previous: AccumulatedImpulse,
        a: &mut ContactSide<'_>,
        b: &mut ContactSide<'_>,
    ) {
        let normal = self.contact.normal;
        let impulse = AccumulatedImpulse {
            normal: previous.normal.max(0.0),
            friction: previous.friction - normal * previous.friction.dot(normal),
        };
        let total = normal * impulse.normal + impulse.friction;
        if total == Vec3::ZERO {
            return;
        }
        a.apply(self.contact.position - a.center, -total);
        b.apply(self.contact.position - b.center, total);
        self.accumulated = impulse;
    }

    /// One sweep: correct the normal impulse, then the friction impulse.
    ///
    /// Contacts between two immovable sides are left alone.
    pub fn solve(&mut self, a: &mut ContactSide<'_>, b: &mut ContactSide<'_>) {
        let normal = self.contact.normal;
        let ra = self.contact.position - a.center;
        let rb = self.contact.position - b.center;

        let reduced = a.effective_inverse_mass(ra, normal) + b.effective_inverse_mass(rb, normal);
        if reduced <= MIN_REDUCED_MASS {
            return;
        }
        let approach = (b.velocity_at(rb) - a.velocity_at(ra)).dot(normal);
        let total = (self.accumulated.normal + (self.target - approach) / reduced).max(0.0);
        let jn = total - self.accumulated.normal;
        debug_assert!(jn.is_finite(), "non-finite normal impulse {jn}");
        self.accumulated.normal = total;
        a.apply(ra, -normal * jn);
        b.apply(rb, normal * jn);

        // Friction acts on the sliding left over after the normal impulse
        let relative = b.velocity_at(rb) - a.velocity_at(ra);
        let sliding = relative - normal * relative.dot(normal);
        let Some(tangent) = sliding.try_normalize() else {
            return;
        };
        let reduced = a.effective_inverse_mass(ra, tangent) + b.effective_inverse_mass(rb, tangent);
        if reduced <= MIN_REDUCED_MASS {
            return;
        }

        let limit = a.friction * b.friction * self.accumulated.normal;
        let total = (self.accumulated.friction - tangent * (sliding.length() / reduced)).clamp_length_max(limit);
        let jt = total - self.accumulated.friction;
        debug_assert!(jt.is_finite(), "non-finite friction impulse {jt}");
        self.accumulated.friction = total;
        a.apply(ra, -jt);
        b.apply(rb, jt);
    }
}

/// Resolve one contact between `a` and `b`, whose normal points from A toward B,
/// with a single sweep and restitution at any approach speed.
///
/// Separating contacts and contacts between two immovable sides are left alone.
pub fn resolve_contact(
    contact: &Contact,
    a: &mut ContactSide<'_>,
    b: &mut ContactSide<'_>,
) -> ContactImpulse {
    let mut constraint = ContactConstraint::new(*contact, a, b, 0.0);
    constraint.solve(a, b);
    constraint.impulse()
}

/// Positional correction for a contact, split between the sides by inverse mass.
///
/// Removes `percent` of the penetration beyond `slop`. Returns the offsets
/// for A and B, or `None` when nothing needs to move.
pub fn correction_offsets(
    contact: &Contact,
    a: &ContactSide<'_>,
    b: &ContactSide<'_>,
    slop: f32,
    percent: f32,
) -> Option<(Vec3, Vec3)> {
    // Kinematic bodies report zero inverse mass
    let (inv_a, inv_b) = (a.inverse_mass(), b.inverse_mass());
    let total = inv_a + inv_b;
    if total <= 0.0 {
        return None;
    }

    let depth = (contact.penetration - slop).max(0.0) * percent;
    if depth <= 0.0 {
        return None;
    }
    let per_mass = contact.normal * (depth / total);
    Some((-per_mass * inv_a, per_mass * inv_b))
}
