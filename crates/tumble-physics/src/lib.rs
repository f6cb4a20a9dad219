//! # Tumble Physics
//!
//! Rigid-body physics for the Tumble engine.
//!
//! ## Features
//! - **SAS**: a lazily split 27-way spatial tree over collider AABBs (broad phase)
//! - **GJK + EPA**: exact overlap tests and penetration depth for convex hulls
//! - **Contacts**: up to four points per touching hull pair, clipped from the touching faces
//! - **Resolver**: iterated, warm-started impulses with restitution, Coulomb friction and angular response
//! - **World**: a three-pass fixed step, catch-up loop, raycasts and collision layers
//!
//! ```
//! use std::sync::Arc;
//! use glam::Vec3;
//! use tumble_core::{Entity, Transform};
//! use tumble_physics::{Collider, ConvexMesh, PhysicsObject, PhysicsWorld, RigidBody};
//!
//! let mut world = PhysicsWorld::default();
//! let owner = Entity::new(0, 0);
//! let collider = Collider::new(owner, Arc::new(ConvexMesh::cuboid(Vec3::splat(0.5))));
//! let body = RigidBody::from_collider(&collider);
//! let cube = world.insert(
//!     PhysicsObject::new(owner, Transform::from_position(Vec3::Y * 5.0))
//!         .with_collider(collider)
//!         .with_body(body),
//! );
//!
//! world.advance(0.1);
//! assert!(world.transform(cube).unwrap().position().y < 5.0);
//! ```

pub mod body;
pub mod collider;
pub mod config;
pub mod contact;
pub mod context;
pub mod epa;
pub mod error;
pub mod gjk;
pub mod layers;
pub mod objects;
pub mod raycast;
pub mod resolver;
pub mod sas;
pub mod shape;
pub mod world;

pub use body::RigidBody;
pub use collider::{AabbPolicy, Collider, WorldHull};
pub use config::{PhysicsConfig, SasConfig};
pub use contact::{Contact, Manifold, MAX_MANIFOLD_POINTS};
pub use context::PhysicsContext;
pub use epa::Penetration;
pub use error::{PhysicsError, PhysicsResult};
pub use gjk::SupportMap;
pub use layers::{CollisionLayer, CollisionLayers, LayerMask, ALL_LAYERS, MAX_LAYERS};
pub use objects::{ObjectHandle, ObjectSet, PhysicsObject};
pub use raycast::RaycastHit;
pub use resolver::{AccumulatedImpulse, ContactConstraint, ContactImpulse, ContactSide};
pub use sas::{NodeId, Sas, SasNode, SasStats};
pub use shape::ConvexMesh;
pub use world::{PhysicsWorld, StepStats};
