//! # Tumble CLI
//!
//! Command-line driver for the Tumble physics world.
//!
//! ## Commands
//! - `run` - Simulate a JSON scene file and optionally write a report
//! - `demo` - Drop a grid of boxes onto a floor

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

pub mod report;
pub mod scene;

use report::{simulate, SimulationReport};
use scene::Scene;

/// Tumble physics CLI
#[derive(Parser)]
#[command(name = "tumble")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Simulate a scene file
    Run {
        /// Scene JSON file
        #[arg(short, long)]
        scene: PathBuf,

        /// Number of fixed steps to run
        #[arg(short = 'n', long, default_value = "600")]
        steps: u32,

        /// Write a JSON report here
        #[arg(short, long)]
        report: Option<PathBuf>,
    },

    /// Drop a grid of boxes onto a floor
    Demo {
        /// Number of boxes
        #[arg(short, long, default_value = "27")]
        boxes: u32,

        /// Number of fixed steps to run
        #[arg(short = 'n', long, default_value = "300")]
        steps: u32,
    },
}

/// Execute the CLI command
pub fn execute(cli: Cli) -> Result<()> {
    if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    match cli.command {
        Commands::Run { scene, steps, report } => {
            log::info!("Running {} for {} steps...", scene.display(), steps);
            let mut loaded = Scene::load(&scene)?
                .build()
                .with_context(|| format!("Failed to build scene {}", scene.display()))?;
            let summary = simulate(&mut loaded, steps);
            log_summary(&summary);

            if let Some(path) = report {
                summary.write(&path)?;
                log::info!("Report written to {}", path.display());
            }
        }

        Commands::Demo { boxes, steps } => {
            log::info!("Dropping {} boxes for {} steps...", boxes, steps);
            let mut loaded = Scene::demo(boxes).build().context("Failed to build demo scene")?;
            let summary = simulate(&mut loaded, steps);
            log_summary(&summary);

            let resting = summary
                .objects
                .iter()
                .filter(|o| o.velocity.is_some_and(|v| v.length() < 0.1))
                .count();
            log::info!("  Resting bodies: {}/{}", resting, boxes);
        }
    }

    Ok(())
}

fn log_summary(summary: &SimulationReport) {
    log::info!(
        "Simulated {:.2}s in {} steps ({:.1} ms wall)",
        summary.simulated_seconds,
        summary.steps,
        summary.wall_seconds * 1000.0
    );
    log::info!(
        "  Candidate pairs: {}, contacts: {}, impulses: {}",
        summary.totals.candidate_pairs,
        summary.totals.contacts,
        summary.totals.impulses
    );
    log::info!(
        "  SAS: {} nodes ({} split), deepest object at depth {}",
        summary.sas.nodes,
        summary.sas.split_nodes,
        summary.sas.deepest_object
    );
}
