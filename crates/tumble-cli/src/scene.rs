//! JSON scene files
//!
//! A scene is a [`PhysicsConfig`], a list of layer pairs that must not
//! collide, and the objects to simulate. Every field except the object
//! shapes has a default, so small scenes stay small:
//!
//! ```json
//! {
//!   "config": { "gravity": [0.0, -9.81, 0.0] },
//!   "disabled_layer_pairs": [[0, 2]],
//!   "objects": [
//!     { "name": "floor", "shapes": [{ "cuboid": { "half_extents": [10, 0.5, 10] } }],
//!       "position": [0, -0.5, 0], "kind": "static" },
//!     { "name": "box", "shapes": [{ "cuboid": { "half_extents": [0.5, 0.5, 0.5] } }],
//!       "position": [0, 3, 0] }
//!   ]
//! }
//! ```

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use tumble_core::{Entity, Transform};
use tumble_physics::{
    AabbPolicy, Collider, ConvexMesh, ObjectHandle, PhysicsConfig, PhysicsObject, PhysicsWorld,
    RigidBody,
};

/// Hull description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeDesc {
    /// Box centered on the object origin
    Cuboid { half_extents: Vec3 },
    /// Octahedron with its tips on the local axes
    Octahedron { radius: f32 },
    /// Closed triangle list, wound counter-clockwise seen from outside
    Mesh { vertices: Vec<Vec3> },
}

impl ShapeDesc {
    fn build(&self) -> Result<ConvexMesh> {
        let vertices = match self {
            Self::Cuboid { half_extents } => {
                anyhow::ensure!(
                    half_extents.cmpgt(Vec3::ZERO).all() && half_extents.is_finite(),
                    "cuboid half extents must be positive, got {half_extents}"
                );
                return Ok(ConvexMesh::cuboid(*half_extents));
            }
            Self::Octahedron { radius } => {
                anyhow::ensure!(
                    radius.is_finite() && *radius > 0.0,
                    "octahedron radius must be positive, got {radius}"
                );
                return Ok(ConvexMesh::octahedron(*radius));
            }
            Self::Mesh { vertices } => vertices.clone(),
        };
        Ok(ConvexMesh::try_new(vertices)?)
    }
}

/// How the solver treats an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyKind {
    /// Moved by gravity and contacts
    #[default]
    Dynamic,
    /// Never integrated or pushed; its velocity still feeds contact response
    Kinematic,
    /// Never moves
    Static,
}

/// One object in a scene file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneObject {
    pub name: String,
    pub shapes: Vec<ShapeDesc>,
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub kind: BodyKind,
    pub velocity: Vec3,
    pub angular_velocity: Vec3,
    pub elasticity: f32,
    pub friction: f32,
    pub density: f32,
    pub layer: u8,
    pub aabb_policy: AabbPolicy,
    /// Overrides the density-derived mass of dynamic bodies
    pub mass: Option<f32>,
}

impl Default for SceneObject {
    fn default() -> Self {
        Self {
            name: String::new(),
            shapes: Vec::new(),
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            kind: BodyKind::Dynamic,
            velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            elasticity: 0.3,
            friction: 0.5,
            density: 1.0,
            layer: 0,
            aabb_policy: AabbPolicy::Tight,
            mass: None,
        }
    }
}

impl SceneObject {
    /// Convenience for the single-shape case
    pub fn with_shape(name: impl Into<String>, shape: ShapeDesc, position: Vec3) -> Self {
        Self {
            name: name.into(),
            shapes: vec![shape],
            position,
            ..Self::default()
        }
    }

    fn build(&self, owner: Entity) -> Result<PhysicsObject> {
        let meshes = self
            .shapes
            .iter()
            .enumerate()
            .map(|(i, shape)| shape.build().map(Arc::new).with_context(|| format!("shape {i}")))
            .collect::<Result<Vec<_>>>()?;

        let collider = Collider::try_with_meshes(owner, meshes)?
            .try_with_layer(self.layer)?
            .with_elasticity(self.elasticity)
            .with_friction(self.friction)
            .with_density(self.density)
            .with_aabb_policy(self.aabb_policy);

        anyhow::ensure!(
            self.rotation.is_finite() && self.rotation.length_squared() > 1e-6,
            "rotation must be a non-zero quaternion, got {}",
            self.rotation
        );

        let body = match self.kind {
            BodyKind::Static => None,
            BodyKind::Kinematic => Some(RigidBody::kinematic()),
            BodyKind::Dynamic => {
                anyhow::ensure!(
                    self.density.is_finite() && self.density > 0.0,
                    "density must be positive, got {}",
                    self.density
                );
                let derived = RigidBody::from_collider(&collider);
                Some(match self.mass {
                    // Same inertia shape, scaled to the requested mass
                    Some(mass) => {
                        let ratio = (mass / derived.mass()).max(0.0);
                        RigidBody::try_new(mass, derived.local_inertia() * ratio)?
                    }
                    None => derived,
                })
            }
        };

        let transform = Transform::new(self.position, self.rotation.normalize(), self.scale);
        let mut object = PhysicsObject::new(owner, transform).with_collider(collider);
        if let Some(mut body) = body {
            body.velocity = self.velocity;
            body.angular_velocity = self.angular_velocity;
            object = object.with_body(body);
        }
        Ok(object)
    }
}

/// A complete scene file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scene {
    pub config: PhysicsConfig,
    pub disabled_layer_pairs: Vec<(u8, u8)>,
    pub objects: Vec<SceneObject>,
}

/// A built scene: the world plus the name of each object
pub struct LoadedScene {
    pub world: PhysicsWorld,
    pub objects: Vec<(String, ObjectHandle)>,
}

impl Scene {
    /// Parse a scene file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scene {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("Invalid scene {}", path.display()))
    }

    /// Parse scene JSON
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Create the world and insert every object
    pub fn build(&self) -> Result<LoadedScene> {
        let mut world = PhysicsWorld::try_new(self.config.clone())?;

        for &(a, b) in &self.disabled_layer_pairs {
            tumble_physics::layers::check_layer(a)?;
            tumble_physics::layers::check_layer(b)?;
            world.set_collision_layers(a, b, false);
        }

        let mut objects = Vec::with_capacity(self.objects.len());
        for (index, desc) in self.objects.iter().enumerate() {
            let name = if desc.name.is_empty() {
                format!("object{index}")
            } else {
                desc.name.clone()
            };
            let object = desc
                .build(Entity::new(index as u32, 0))
                .with_context(|| format!("Failed to build object '{name}'"))?;
            objects.push((name, world.insert(object)));
        }

        log::info!(
            "Loaded scene: {} objects, {} disabled layer pairs",
            objects.len(),
            self.disabled_layer_pairs.len()
        );
        Ok(LoadedScene { world, objects })
    }

    /// Floor plus a grid of `boxes` unit cubes dropped onto it
    pub fn demo(boxes: u32) -> Self {
        let mut objects = vec![SceneObject {
            kind: BodyKind::Static,
            ..SceneObject::with_shape(
                "floor",
                ShapeDesc::Cuboid {
                    half_extents: Vec3::new(50.0, 0.5, 50.0),
                },
                Vec3::new(0.0, -0.5, 0.0),
            )
        }];

        let side = (boxes as f32).cbrt().ceil().max(1.0) as u32;
        objects.extend((0..boxes).map(|i| {
            let (x, y, z) = (i % side, i / (side * side), (i / side) % side);
            let jitter = (i % 5) as f32 * 0.01;
            SceneObject::with_shape(
                format!("box{i}"),
                ShapeDesc::Cuboid {
                    half_extents: Vec3::splat(0.5),
                },
                Vec3::new(
                    x as f32 * 1.5 - side as f32 * 0.75 + jitter,
                    1.0 + y as f32 * 1.5,
                    z as f32 * 1.5 - side as f32 * 0.75,
                ),
            )
        }));

        Self {
            config: PhysicsConfig::default(),
            disabled_layer_pairs: Vec::new(),
            objects,
        }
    }
}
