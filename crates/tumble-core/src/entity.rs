//! Entity identifiers
//!
//! Game objects are owned by the (out of tree) entity store. Subsystems such as
//! physics only ever hold an [`Entity`] to refer back to the owning object.

use serde::{Deserialize, Serialize};

/// Entity identifier with generation counter for stable IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entity {
    /// Entity index
    index: u32,
    /// Generation counter to detect stale references
    generation: u32,
}

impl Entity {
    /// Create a new entity with the given index and generation
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Get the entity index
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Get the entity generation
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Create a null entity (invalid reference)
    pub const fn null() -> Self {
        Self {
            index: u32::MAX,
            generation: 0,
        }
    }

    /// Check if this is a null entity
    pub fn is_null(&self) -> bool {
        self.index == u32::MAX
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::null()
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_null() {
            write!(f, "Entity(null)")
        } else {
            write!(f, "Entity({}v{})", self.index, self.generation)
        }
    }
}
