//! # Tumble Core
//!
//! Value types shared by every Tumble subsystem.
//!
//! This crate is deliberately small:
//! - **Entity**: generation-checked ids for game objects
//! - **Math**: glam re-exports, axis-aligned boxes, rays and bounding spheres
//! - **Transform**: position/rotation/scale with a `moved` flag for change tracking
//! - **Time**: fixed-step accumulator for the simulation catch-up loop

pub mod entity;
pub mod math;
pub mod time;
pub mod transform;

pub use entity::Entity;
pub use math::{Aabb, BoundingSphere, Ray};
pub use time::{FixedStepAccumulator, FixedTimeStep, Stopwatch};
pub use transform::Transform;
