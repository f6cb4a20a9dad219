//! Collision layers
//!
//! A symmetric `MAX_LAYERS x MAX_LAYERS` matrix of which layer pairs may
//! collide, stored as one row bitmask per layer. Everything collides with
//! everything until told otherwise.

use crate::error::{PhysicsError, PhysicsResult};

/// Number of collision layers
pub const MAX_LAYERS: usize = 32;

/// Collision layer index, `0..MAX_LAYERS`
pub type CollisionLayer = u8;

/// Bitmask of layers, bit `n` set means layer `n` is included
pub type LayerMask = u32;

/// Mask with every layer set
pub const ALL_LAYERS: LayerMask = u32::MAX;

/// Which layer pairs may collide
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollisionLayers {
    rows: [LayerMask; MAX_LAYERS],
}

impl CollisionLayers {
    /// Matrix with every pair enabled
    pub fn new() -> Self {
        Self {
            rows: [ALL_LAYERS; MAX_LAYERS],
        }
    }

    /// Enable or disable collisions between `a` and `b` (both directions)
    ///
    /// # Panics
    /// If either layer is `>= MAX_LAYERS`.
    pub fn set(&mut self, a: CollisionLayer, b: CollisionLayer, enabled: bool) {
        assert_layer(a);
        assert_layer(b);
        let (a, b) = (usize::from(a), usize::from(b));
        if enabled {
            self.rows[a] |= 1 << b;
            self.rows[b] |= 1 << a;
        } else {
            self.rows[a] &= !(1 << b);
            self.rows[b] &= !(1 << a);
        }
    }

    /// Whether `a` and `b` may collide
    ///
    /// # Panics
    /// If either layer is `>= MAX_LAYERS`.
    pub fn can_collide(&self, a: CollisionLayer, b: CollisionLayer) -> bool {
        assert_layer(a);
        assert_layer(b);
        self.rows[usize::from(a)] & (1 << b) != 0
    }

    /// Layers that `layer` collides with
    pub fn mask(&self, layer: CollisionLayer) -> LayerMask {
        assert_layer(layer);
        self.rows[usize::from(layer)]
    }

    /// Full boolean matrix, `matrix()[a][b]` true when `a` and `b` collide
    pub fn matrix(&self) -> [[bool; MAX_LAYERS]; MAX_LAYERS] {
        let mut matrix = [[false; MAX_LAYERS]; MAX_LAYERS];
        for (a, row) in matrix.iter_mut().enumerate() {
            for (b, cell) in row.iter_mut().enumerate() {
                *cell = self.rows[a] & (1 << b) != 0;
            }
        }
        matrix
    }
}

impl Default for CollisionLayers {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether `layer` is part of `mask`
pub fn mask_contains(mask: LayerMask, layer: CollisionLayer) -> bool {
    assert_layer(layer);
    mask & (1 << layer) != 0
}

/// Validate a layer index that came from outside the program
pub fn check_layer(layer: u8) -> PhysicsResult<CollisionLayer> {
    if usize::from(layer) < MAX_LAYERS {
        Ok(layer)
    } else {
        Err(PhysicsError::LayerOutOfRange(layer))
    }
}

fn assert_layer(layer: CollisionLayer) {
    assert!(
        usize::from(layer) < MAX_LAYERS,
        "collision layer {layer} out of range (max {})",
        MAX_LAYERS - 1
    );
}
