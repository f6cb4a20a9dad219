//! Simulation summaries written by `tumble run --report`

use std::path::Path;

use anyhow::{Context, Result};
use glam::{Quat, Vec3};
use serde::Serialize;
use tumble_core::Stopwatch;
use tumble_physics::{SasStats, StepStats};

use crate::scene::LoadedScene;

/// Final state of one object
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectReport {
    pub name: String,
    pub position: Vec3,
    pub rotation: Quat,
    pub velocity: Option<Vec3>,
    pub angular_velocity: Option<Vec3>,
}

/// Result of running a scene
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationReport {
    pub steps: u32,
    pub simulated_seconds: f32,
    pub wall_seconds: f64,
    /// Per-pass counters summed over every step
    pub totals: StepStats,
    pub sas: SasStats,
    pub momentum: Vec3,
    pub objects: Vec<ObjectReport>,
}

impl SimulationReport {
    /// Write as pretty JSON
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report {}", path.display()))
    }
}

/// Step a loaded scene `steps` times at its fixed timestep and summarize it
pub fn simulate(scene: &mut LoadedScene, steps: u32) -> SimulationReport {
    let dt = scene.world.config().fixed_timestep;
    let mut totals = StepStats::default();
    let mut stopwatch = Stopwatch::new();

    for step in 0..steps {
        let stats = scene.world.step(dt);
        totals += stats;
        if step % 60 == 0 {
            log::debug!("Step {step}: {stats:?}");
        }
    }
    stopwatch.stop();

    let world = &scene.world;
    let objects = scene
        .objects
        .iter()
        .filter_map(|(name, handle)| {
            let object = world.get(*handle)?;
            Some(ObjectReport {
                name: name.clone(),
                position: object.transform.position(),
                rotation: object.transform.rotation(),
                velocity: object.body.as_ref().map(|b| b.velocity),
                angular_velocity: object.body.as_ref().map(|b| b.angular_velocity),
            })
        })
        .collect();

    SimulationReport {
        steps,
        simulated_seconds: dt * steps as f32,
        wall_seconds: stopwatch.elapsed_secs(),
        totals,
        sas: world.sas().stats(),
        momentum: world.total_momentum(),
        objects,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Scene;

    #[test]
    fn test_simulate_demo() {
        let mut loaded = Scene::demo(8).build().expect("demo");
        let report = simulate(&mut loaded, 30);
        assert_eq!(report.steps, 30);
        assert_eq!(report.objects.len(), 9);
        assert_eq!(report.totals.bodies_integrated, 8 * 30);
        assert!(report.objects[0].velocity.is_none());
        assert!(report.objects[1].position.y < 1.0);
        assert_eq!(report.sas.objects, 9);

        let json = serde_json::to_value(&report).expect("json");
        assert_eq!(json["steps"], 30);
        assert_eq!(json["objects"][0]["name"], "floor");
    }
}
