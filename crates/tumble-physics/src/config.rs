//! Physics world configuration

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::{PhysicsError, PhysicsResult};

/// Spatial acceleration structure tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SasConfig {
    /// A node holding more objects than this splits on the next query that visits it
    pub split_threshold: usize,
    /// Nodes at this depth never split
    pub max_depth: u32,
}

impl Default for SasConfig {
    fn default() -> Self {
        Self {
            split_threshold: 16,
            max_depth: 12,
        }
    }
}

/// Physics world configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Gravitational acceleration applied to every non-kinematic body
    pub gravity: Vec3,
    /// Step size used by [`PhysicsWorld::advance`](crate::PhysicsWorld::advance)
    pub fixed_timestep: f32,
    /// Catch-up cap for `advance`
    pub max_substeps: u32,
    /// Penetration depth left uncorrected to avoid jitter
    pub penetration_slop: f32,
    /// Fraction of the remaining penetration removed per step
    pub correction_percent: f32,
    /// Collider AABBs are scaled about their center by this factor
    pub aabb_fat_factor: f32,
    /// Impulse sweeps over all contacts per step
    pub solver_iterations: u32,
    /// Contacts closing slower than this (m/s) do not bounce
    pub restitution_threshold: f32,
    /// Seed each contact with the impulse it ended the previous step with
    pub warm_starting: bool,
    /// Broad phase tuning
    pub sas: SasConfig,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
            fixed_timestep: 1.0 / 60.0,
            max_substeps: 4,
            penetration_slop: 0.005,
            correction_percent: 0.8,
            aabb_fat_factor: 1.0,
            solver_iterations: 10,
            restitution_threshold: 0.5,
            warm_starting: true,
            sas: SasConfig::default(),
        }
    }
}

impl PhysicsConfig {
    /// Reject configurations the solver cannot run with
    pub fn validate(&self) -> PhysicsResult<()> {
        let invalid = |msg: String| Err(PhysicsError::InvalidConfig(msg));

        if !self.gravity.is_finite() {
            return invalid(format!("gravity must be finite, got {}", self.gravity));
        }
        if !(self.fixed_timestep.is_finite() && self.fixed_timestep > 0.0) {
            return invalid(format!(
                "fixed_timestep must be positive, got {}",
                self.fixed_timestep
            ));
        }
        if self.max_substeps == 0 {
            return invalid("max_substeps must be at least 1".into());
        }
        if !(self.penetration_slop >= 0.0 && self.penetration_slop.is_finite()) {
            return invalid(format!(
                "penetration_slop must be non-negative, got {}",
                self.penetration_slop
            ));
        }
        if !(0.0..=1.0).contains(&self.correction_percent) {
            return invalid(format!(
                "correction_percent must be within [0, 1], got {}",
                self.correction_percent
            ));
        }
        if !(self.aabb_fat_factor >= 1.0 && self.aabb_fat_factor.is_finite()) {
            return invalid(format!(
                "aabb_fat_factor must be at least 1, got {}",
                self.aabb_fat_factor
            ));
        }
        if self.solver_iterations == 0 {
            return invalid("solver_iterations must be at least 1".into());
        }
        if !(self.restitution_threshold >= 0.0 && self.restitution_threshold.is_finite()) {
            return invalid(format!(
                "restitution_threshold must be non-negative, got {}",
                self.restitution_threshold
            ));
        }
        if self.sas.split_threshold == 0 {
            return invalid("sas.split_threshold must be at least 1".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PhysicsConfig::default();
        assert_eq!(config.gravity.y, -9.81);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = PhysicsConfig::default();
        config.fixed_timestep = 0.0;
        assert!(matches!(config.validate(), Err(PhysicsError::InvalidConfig(_))));

        let mut config = PhysicsConfig::default();
        config.correction_percent = 1.5;
        assert!(config.validate().is_err());

        let mut config = PhysicsConfig::default();
        config.aabb_fat_factor = 0.5;
        assert!(config.validate().is_err());

        let mut config = PhysicsConfig::default();
        config.gravity = Vec3::new(0.0, f32::NAN, 0.0);
        assert!(config.validate().is_err());

        let mut config = PhysicsConfig::default();
        config.solver_iterations = 0;
        assert!(config.validate().is_err());

        let mut config = PhysicsConfig::default();
        config.restitution_threshold = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_keeps_solver_defaults() {
        let config: PhysicsConfig =
            serde_json::from_str(r#"{ "solver_iterations": 4 }"#).expect("valid json");
        assert_eq!(config.solver_iterations, 4);
        assert!(config.warm_starting);
        assert_eq!(config.restitution_threshold, 0.5);
    }
}
