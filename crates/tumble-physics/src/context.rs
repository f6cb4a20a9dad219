//! Shared handle to a physics world
//!
//! The world itself is single-threaded. When game code on several threads
//! needs it, the top-level owner wraps it in a [`PhysicsContext`] and hands
//! out clones; the lock keeps steps and game-side mutation apart.

use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::PhysicsConfig;
use crate::error::PhysicsResult;
use crate::world::{PhysicsWorld, StepStats};

/// Cloneable, lock-protected physics world
#[derive(Debug, Clone)]
pub struct PhysicsContext {
    world: Arc<RwLock<PhysicsWorld>>,
}

impl PhysicsContext {
    /// Wrap an existing world
    pub fn new(world: PhysicsWorld) -> Self {
        Self {
            world: Arc::new(RwLock::new(world)),
        }
    }

    /// Create a world from a configuration
    pub fn from_config(config: PhysicsConfig) -> PhysicsResult<Self> {
        PhysicsWorld::try_new(config).map(Self::new)
    }

    /// Run one step of `dt` seconds under the write lock
    pub fn step(&self, dt: f32) -> StepStats {
        self.world.write().step(dt)
    }

    /// Run the fixed-step catch-up loop under the write lock
    pub fn advance(&self, frame_time: f32) -> u32 {
        self.world.write().advance(frame_time)
    }

    /// Shared access
    pub fn read(&self) -> RwLockReadGuard<'_, PhysicsWorld> {
        self.world.read()
    }

    /// Exclusive access, for inserting objects or applying forces between steps
    pub fn write(&self) -> RwLockWriteGuard<'_, PhysicsWorld> {
        self.world.write()
    }
}
