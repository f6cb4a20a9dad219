//! Ray casts against collider hulls
//!
//! The SAS narrows the candidates to colliders whose AABB the ray crosses,
//! then every outward-facing triangle of their hulls is tested exactly.

use glam::Vec3;
use tumble_core::{Entity, Ray};

use crate::layers::{mask_contains, LayerMask, ALL_LAYERS};
use crate::objects::ObjectHandle;
use crate::world::PhysicsWorld;

/// Determinants below this mean the ray is parallel to the triangle or hits its back
const PARALLEL_EPSILON: f32 = 1e-7;

/// Closest surface point a ray hit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaycastHit {
    /// World-space hit point
    pub point: Vec3,
    /// Outward unit normal of the triangle that was hit
    pub normal: Vec3,
    /// Distance from the ray origin along the normalized direction
    pub distance: f32,
    /// Owner of the collider that was hit
    pub entity: Entity,
    /// Physics object that was hit
    pub object: ObjectHandle,
}

/// Distance along `direction` at which the ray enters the front of the
/// triangle `[a, b, c]` (counter-clockwise when seen from outside).
///
/// Back faces and rays parallel to the plane are never hit.
pub fn ray_triangle(origin: Vec3, direction: Vec3, [a, b, c]: [Vec3; 3]) -> Option<f32> {
    let edge1 = b - a;
    let edge2 = c - a;
    let p = direction.cross(edge2);
    let det = edge1.dot(p);
    if det < PARALLEL_EPSILON {
        return None;
    }

    let inv_det = 1.0 / det;
    let s = origin - a;
    let u = s.dot(p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(edge1);
    let v = direction.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = edge2.dot(q) * inv_det;
    (t >= 0.0).then_some(t)
}

impl PhysicsWorld {
    /// Closest collider surface along the ray within `max_distance`
    pub fn raycast(&mut self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<RaycastHit> {
        self.raycast_masked(origin, direction, max_distance, ALL_LAYERS)
    }

    /// Like [`raycast`](Self::raycast), ignoring colliders whose layer is not in `layer_mask`
    pub fn raycast_masked(
        &mut self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        layer_mask: LayerMask,
    ) -> Option<RaycastHit> {
        let ray = Ray::new(origin, direction)?;
        let mut candidates = Vec::new();
        self.sas.query_ray(ray.origin, ray.direction, &mut candidates);

        let mut best: Option<RaycastHit> = None;
        for handle in candidates {
            let Some(object) = self.objects.get(handle) else {
                continue;
            };
            let Some(collider) = &object.collider else {
                continue;
            };
            if !mask_contains(layer_mask, collider.layer()) {
                continue;
            }
            // The cached AABB encloses every hull, so nothing inside starts closer than its entry
            let limit = best.map_or(max_distance, |hit| hit.distance.min(max_distance));
            if ray.intersect_aabb(&collider.aabb()).is_none_or(|(enter, _)| enter > limit) {
                continue;
            }

            for index in 0..collider.meshes().len() {
                let hull = collider.world_hull(index, &object.transform);
                for triangle in hull.world_triangles() {
                    let Some(t) = ray_triangle(ray.origin, ray.direction, triangle) else {
                        continue;
                    };
                    let closer = best.is_none_or(|hit| t < hit.distance);
                    if t > max_distance || !closer {
                        continue;
                    }
                    let [a, b, c] = triangle;
                    best = Some(RaycastHit {
                        point: ray.at(t),
                        normal: (b - a).cross(c - a).normalize_or_zero(),
                        distance: t,
                        entity: object.owner,
                        object: handle,
                    });
                }
            }
        }

        if let Some(hit) = &best {
            log::trace!("Ray from {origin} hit {} at {}", hit.object, hit.distance);
        }
        best
    }
}
