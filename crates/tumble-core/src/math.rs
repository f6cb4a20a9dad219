//! Math utilities
//!
//! Re-exports from glam plus the bounding-volume primitives used by the
//! physics broad phase and raycasts.

pub use glam::{Mat3, Mat4, Quat, Vec2, Vec3};

use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box
///
/// A non-empty box satisfies `min[i] <= max[i]` on every axis. [`Aabb::EMPTY`]
/// is inverted on purpose so that growing it by any box yields that box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Aabb {
    /// The empty box, identity element of [`Aabb::grow`]
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    /// Create an AABB from min and max corners
    pub fn new(min: Vec3, max: Vec3) -> Self {
        debug_assert!(
            min.cmple(max).all(),
            "invalid AABB: min {min} exceeds max {max}"
        );
        Self { min, max }
    }

    /// Create an AABB from center and half-extents
    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        Self::new(center - half_extents, center + half_extents)
    }

    /// Smallest box containing every point, or [`Aabb::EMPTY`] for no points
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        let mut result = Self::EMPTY;
        for point in points {
            result.grow_point(point);
        }
        result
    }

    /// Get the center of the AABB
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the half-extents of the AABB
    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Get the full size of the AABB
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Volume of the box; zero for empty boxes
    pub fn volume(&self) -> f32 {
        if self.is_empty() {
            0.0
        } else {
            let size = self.size();
            size.x * size.y * size.z
        }
    }

    /// Check if the AABB is empty
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Check if a point is inside the AABB
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// True if `other` lies entirely inside this box (faces may touch).
    ///
    /// Every box envelops the empty box.
    pub fn envelops(&self, other: &Aabb) -> bool {
        if other.is_empty() {
            return true;
        }
        self.min.cmple(other.min).all() && self.max.cmpge(other.max).all()
    }

    /// Check if this AABB intersects another (inclusive on faces)
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Expand the AABB to include a point
    pub fn grow_point(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Expand the AABB to include another box
    pub fn grow(&mut self, other: &Aabb) {
        if other.is_empty() {
            return;
        }
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Union of two boxes
    pub fn merged(&self, other: &Aabb) -> Aabb {
        let mut result = *self;
        result.grow(other);
        result
    }

    /// Scale the box about its center. Empty boxes stay empty.
    pub fn scaled_about_center(&self, factor: f32) -> Aabb {
        if self.is_empty() {
            return *self;
        }
        Aabb::from_center_half_extents(self.center(), self.half_extents() * factor)
    }

    /// Entry/exit parameters of the half-infinite ray `origin + t * direction`, `t >= 0`.
    ///
    /// `direction` does not need to be normalized; the returned parameters are in
    /// units of `direction`. Axis-parallel rays are handled without dividing by zero.
    pub fn ray_interval(&self, origin: Vec3, direction: Vec3) -> Option<(f32, f32)> {
        if self.is_empty() {
            return None;
        }

        let mut t_enter = 0.0_f32;
        let mut t_exit = f32::INFINITY;

        for axis in 0..3 {
            let o = origin[axis];
            let d = direction[axis];
            let (lo, hi) = (self.min[axis], self.max[axis]);

            if d.abs() <= f32::MIN_POSITIVE {
                // Parallel to this slab: either always inside it or never
                if o < lo || o > hi {
                    return None;
                }
                continue;
            }

            let inv = 1.0 / d;
            let mut t0 = (lo - o) * inv;
            let mut t1 = (hi - o) * inv;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }

            t_enter = t_enter.max(t0);
            t_exit = t_exit.min(t1);
            if t_enter > t_exit {
                return None;
            }
        }

        Some((t_enter, t_exit))
    }

    /// True if the half-infinite ray touches the box
    pub fn intersects_ray(&self, origin: Vec3, direction: Vec3) -> bool {
        self.ray_interval(origin, direction).is_some()
    }

    /// Transform the AABB by a matrix
    pub fn transform(&self, matrix: Mat4) -> Aabb {
        if self.is_empty() {
            return *self;
        }

        let corners = [
            Vec3::new(self.min.x, self.min.y, self.min.z),
            Vec3::new(self.max.x, self.min.y, self.min.z),
            Vec3::new(self.min.x, self.max.y, self.min.z),
            Vec3::new(self.max.x, self.max.y, self.min.z),
            Vec3::new(self.min.x, self.min.y, self.max.z),
            Vec3::new(self.max.x, self.min.y, self.max.z),
            Vec3::new(self.min.x, self.max.y, self.max.z),
            Vec3::new(self.max.x, self.max.y, self.max.z),
        ];

        Aabb::from_points(corners.into_iter().map(|c| matrix.transform_point3(c)))
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Bounding sphere
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingSphere {
    /// Center of the sphere
    pub center: Vec3,
    /// Radius of the sphere
    pub radius: f32,
}

impl BoundingSphere {
    /// Create a new bounding sphere
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Check if a point is inside the sphere
    pub fn contains_point(&self, point: Vec3) -> bool {
        (point - self.center).length_squared() <= self.radius * self.radius
    }

    /// The cube that bounds this sphere; unchanged by any rotation about the center
    pub fn to_aabb(&self) -> Aabb {
        Aabb::from_center_half_extents(self.center, Vec3::splat(self.radius))
    }
}

/// Ray for raycasting
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    /// Ray origin
    pub origin: Vec3,
    /// Ray direction (normalized)
    pub direction: Vec3,
}

impl Ray {
    /// Create a new ray. Returns `None` for a zero-length direction.
    pub fn new(origin: Vec3, direction: Vec3) -> Option<Self> {
        let direction = direction.try_normalize()?;
        Some(Self { origin, direction })
    }

    /// Get a point along the ray at distance t
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Intersect with an AABB, returns (t_min, t_max) if hit
    pub fn intersect_aabb(&self, aabb: &Aabb) -> Option<(f32, f32)> {
        aabb.ray_interval(self.origin, self.direction)
    }
}
