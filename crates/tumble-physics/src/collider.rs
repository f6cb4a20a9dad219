//! Colliders
//!
//! A collider is the physics view of an object's shape: one or more convex
//! hulls, surface material, a collision layer and a cached world-space AABB.
//! Which SAS node stores a collider is tracked by the SAS itself, keyed by
//! the collider's object handle.

use std::sync::Arc;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tumble_core::{Aabb, BoundingSphere, Entity, Transform};

use crate::error::{PhysicsError, PhysicsResult};
use crate::layers::{check_layer, CollisionLayer, MAX_LAYERS};
use crate::shape::ConvexMesh;

/// How a collider derives its world AABB from its hulls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AabbPolicy {
    /// Bounds of every transformed hull point. Exact, linear in point count.
    #[default]
    Tight,
    /// Bounds of the transformed local AABB corners. Eight points per hull.
    Rotated,
    /// Cube around the bounding sphere. Does not change when the object only rotates.
    Sphere,
}

/// Collider component
#[derive(Debug, Clone)]
pub struct Collider {
    owner: Entity,
    meshes: SmallVec<[Arc<ConvexMesh>; 1]>,
    /// Fraction of approach speed kept after impact, combined multiplicatively
    pub elasticity: f32,
    /// Coulomb friction coefficient, combined multiplicatively
    pub friction: f32,
    /// Mass per unit volume, used by [`RigidBody::from_collider`](crate::RigidBody::from_collider)
    pub density: f32,
    /// AABB derivation
    pub aabb_policy: AabbPolicy,
    layer: CollisionLayer,
    aabb: Aabb,
}

impl Collider {
    /// Collider with a single hull
    pub fn new(owner: Entity, mesh: Arc<ConvexMesh>) -> Self {
        Self::with_meshes(owner, vec![mesh])
    }

    /// Collider made of several convex hulls
    ///
    /// # Panics
    /// If `meshes` is empty.
    pub fn with_meshes(owner: Entity, meshes: Vec<Arc<ConvexMesh>>) -> Self {
        match Self::try_with_meshes(owner, meshes) {
            Ok(collider) => collider,
            Err(err) => panic!("invalid collider for {owner}: {err}"),
        }
    }

    /// Collider made of several convex hulls, reporting an empty hull list
    pub fn try_with_meshes(owner: Entity, meshes: Vec<Arc<ConvexMesh>>) -> PhysicsResult<Self> {
        if meshes.is_empty() {
            return Err(PhysicsError::NoMeshes);
        }
        Ok(Self {
            owner,
            meshes: meshes.into_iter().collect(),
            elasticity: 0.3,
            friction: 0.5,
            density: 1.0,
            aabb_policy: AabbPolicy::Tight,
            layer: 0,
            aabb: Aabb::EMPTY,
        })
    }

    /// Set the elasticity
    pub fn with_elasticity(mut self, elasticity: f32) -> Self {
        self.elasticity = elasticity;
        self
    }

    /// Set the friction coefficient
    pub fn with_friction(mut self, friction: f32) -> Self {
        self.friction = friction;
        self
    }

    /// Set the density
    pub fn with_density(mut self, density: f32) -> Self {
        self.density = density;
        self
    }

    /// Set the AABB policy
    pub fn with_aabb_policy(mut self, policy: AabbPolicy) -> Self {
        self.aabb_policy = policy;
        self
    }

    /// Set the collision layer
    ///
    /// # Panics
    /// If `layer >= MAX_LAYERS`.
    pub fn with_layer(mut self, layer: CollisionLayer) -> Self {
        assert!(
            usize::from(layer) < MAX_LAYERS,
            "collision layer {layer} out of range"
        );
        self.layer = layer;
        self
    }

    /// Set the collision layer, reporting an out-of-range index
    pub fn try_with_layer(self, layer: CollisionLayer) -> PhysicsResult<Self> {
        check_layer(layer).map(|layer| self.with_layer(layer))
    }

    /// Owning game object
    pub fn owner(&self) -> Entity {
        self.owner
    }

    /// Convex hulls
    pub fn meshes(&self) -> &[Arc<ConvexMesh>] {
        &self.meshes
    }

    /// Collision layer
    pub fn layer(&self) -> CollisionLayer {
        self.layer
    }

    /// Cached world AABB, as of the last refresh
    pub fn aabb(&self) -> Aabb {
        self.aabb
    }

    /// Total enclosed volume of all hulls
    pub fn volume(&self) -> f32 {
        self.meshes.iter().map(|m| m.volume()).sum()
    }

    /// Local-space bounds of all hulls
    pub fn local_aabb(&self) -> Aabb {
        self.meshes
            .iter()
            .fold(Aabb::EMPTY, |acc, m| acc.merged(&m.local_aabb()))
    }

    /// World AABB for `transform` under this collider's policy, scaled by `fat_factor`
    pub fn compute_aabb(&self, transform: &Transform, fat_factor: f32) -> Aabb {
        let mut aabb = Aabb::EMPTY;
        for mesh in &self.meshes {
            let bounds = match self.aabb_policy {
                AabbPolicy::Tight => {
                    Aabb::from_points(mesh.points().iter().map(|&p| transform.transform_point(p)))
                }
                AabbPolicy::Rotated => mesh.local_aabb().transform(transform.matrix()),
                AabbPolicy::Sphere => {
                    let scale = transform.scale().abs().max_element();
                    BoundingSphere::new(transform.position(), mesh.bounding_radius() * scale)
                        .to_aabb()
                }
            };
            aabb.grow(&bounds);
        }
        aabb.scaled_about_center(fat_factor)
    }

    /// Recompute and cache the world AABB
    pub fn refresh_aabb(&mut self, transform: &Transform, fat_factor: f32) -> Aabb {
        self.aabb = self.compute_aabb(transform, fat_factor);
        self.aabb
    }

    /// World-space view of hull `index` under `transform`
    pub fn world_hull<'a>(&'a self, index: usize, transform: &'a Transform) -> WorldHull<'a> {
        WorldHull {
            mesh: &self.meshes[index],
            transform,
        }
    }
}

/// A convex hull placed in the world by a transform
#[derive(Debug, Clone, Copy)]
pub struct WorldHull<'a> {
    mesh: &'a ConvexMesh,
    transform: &'a Transform,
}

impl<'a> WorldHull<'a> {
    /// Wrap a mesh and its transform
    pub fn new(mesh: &'a ConvexMesh, transform: &'a Transform) -> Self {
        Self { mesh, transform }
    }

    /// The local-space mesh
    pub fn mesh(&self) -> &'a ConvexMesh {
        self.mesh
    }

    /// Farthest world-space point along a world-space direction.
    ///
    /// The direction is taken into local space with the inverse rotation (and
    /// scale, so non-uniform scaling stays correct), the hull is scanned there,
    /// and the winner is mapped back to world space.
    pub fn support(&self, direction: Vec3) -> Vec3 {
        let local_direction = self.transform.inverse_rotate(direction) * self.transform.scale();
        self.transform
            .transform_point(self.mesh.support_local(local_direction))
    }

    /// Hull points in world space
    pub fn world_points(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.mesh
            .points()
            .iter()
            .map(|&p| self.transform.transform_point(p))
    }

    /// Triangles in world space, still wound outward (assuming positive scale)
    pub fn world_triangles(&self) -> impl Iterator<Item = [Vec3; 3]> + '_ {
        self.mesh
            .triangles()
            .map(|tri| tri.map(|v| self.transform.transform_point(v)))
    }

    /// Number of hull points scanned per support query
    pub fn point_count(&self) -> usize {
        self.mesh.points().len()
    }

    /// World position of the hull's local origin
    pub fn center(&self) -> Vec3 {
        self.transform.position()
    }
}
