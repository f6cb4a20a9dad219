//! Physics errors
//!
//! Only setup from external content is fallible. Invariant violations inside
//! the step loop are assertions, never `Err`s.

use thiserror::Error;

/// Physics setup errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PhysicsError {
    #[error("Invalid physics configuration: {0}")]
    InvalidConfig(String),

    #[error("Convex mesh has no vertices")]
    EmptyMesh,

    #[error("Convex mesh vertex count {0} is not a multiple of 3")]
    MalformedMesh(usize),

    #[error("Convex mesh contains a non-finite vertex")]
    NonFiniteVertex,

    #[error("Convex mesh encloses no volume ({0}); triangles must be closed and wound outward")]
    DegenerateMesh(f32),

    #[error("Collider needs at least one convex mesh")]
    NoMeshes,

    #[error("Invalid mass {0}: must be finite and positive")]
    InvalidMass(f32),

    #[error("Collision layer {0} out of range (max {max})", max = crate::layers::MAX_LAYERS - 1)]
    LayerOutOfRange(u8),
}

/// Result type for physics setup operations
pub type PhysicsResult<T> = Result<T, PhysicsError>;
