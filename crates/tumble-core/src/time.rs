//! Time Management
//!
//! Fixed-step simulation support:
//! - [`FixedTimeStep`] describes the step size and per-frame catch-up cap
//! - [`FixedStepAccumulator`] converts variable frame times into whole steps
//! - [`Stopwatch`] for wall-clock measurements in tools

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Fixed time step configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FixedTimeStep {
    /// Fixed timestep in seconds
    pub step: f64,
    /// Maximum number of fixed updates per frame (to prevent spiral of death)
    pub max_updates: u32,
}

impl Default for FixedTimeStep {
    fn default() -> Self {
        Self {
            step: 1.0 / 60.0, // 60 Hz
            max_updates: 8,
        }
    }
}

impl FixedTimeStep {
    /// Create a new fixed time step with the given frequency
    pub fn from_hz(hz: f64) -> Self {
        Self {
            step: 1.0 / hz,
            max_updates: 8,
        }
    }

    /// Create a new fixed time step with the given step size
    pub fn from_step(step: f64) -> Self {
        Self {
            step,
            max_updates: 8,
        }
    }

    /// Set the maximum number of updates per frame
    pub fn with_max_updates(mut self, max: u32) -> Self {
        self.max_updates = max;
        self
    }
}

/// Accumulates frame time and hands it out in fixed-size steps.
///
/// The outer loop feeds each rendered frame's duration to [`accumulate`] and
/// then runs the simulation [`steps_due`] times. A frame shorter than one step
/// yields zero steps; the leftover carries over to the next frame.
///
/// [`accumulate`]: FixedStepAccumulator::accumulate
/// [`steps_due`]: FixedStepAccumulator::steps_due
#[derive(Debug, Clone)]
pub struct FixedStepAccumulator {
    config: FixedTimeStep,
    accumulator: f64,
    total_steps: u64,
    dropped_time: f64,
}

impl FixedStepAccumulator {
    /// Create an empty accumulator
    pub fn new(config: FixedTimeStep) -> Self {
        Self {
            config,
            accumulator: 0.0,
            total_steps: 0,
            dropped_time: 0.0,
        }
    }

    /// Step configuration
    pub fn config(&self) -> &FixedTimeStep {
        &self.config
    }

    /// Add a frame's worth of time; negative and non-finite inputs are ignored
    pub fn accumulate(&mut self, frame_time: f64) {
        if frame_time.is_finite() && frame_time > 0.0 {
            self.accumulator += frame_time;
        }
    }

    /// Consume and return the number of whole steps to run this frame.
    ///
    /// At most `max_updates` steps are returned; time beyond that is dropped
    /// (recorded in [`dropped_time`](Self::dropped_time)) rather than replayed
    /// on later frames.
    pub fn steps_due(&mut self) -> u32 {
        let step = self.config.step;
        if step <= 0.0 {
            return 0;
        }

        let available = (self.accumulator / step).floor();
        let steps = if available >= f64::from(self.config.max_updates) {
            self.config.max_updates
        } else {
            available as u32
        };

        self.accumulator -= f64::from(steps) * step;
        if steps == self.config.max_updates && self.accumulator >= step {
            self.dropped_time += self.accumulator - self.accumulator % step;
            self.accumulator %= step;
        }

        self.total_steps += u64::from(steps);
        steps
    }

    /// Time accumulated but not yet consumed by a step
    pub fn remainder(&self) -> f64 {
        self.accumulator
    }

    /// Interpolation factor between the last two steps, for rendering
    pub fn alpha(&self) -> f64 {
        if self.config.step <= 0.0 {
            0.0
        } else {
            (self.accumulator / self.config.step).clamp(0.0, 1.0)
        }
    }

    /// Total steps handed out so far
    pub fn total_steps(&self) -> u64 {
        self.total_steps
    }

    /// Simulation time discarded because a frame exceeded the catch-up cap
    pub fn dropped_time(&self) -> f64 {
        self.dropped_time
    }
}

impl Default for FixedStepAccumulator {
    fn default() -> Self {
        Self::new(FixedTimeStep::default())
    }
}

/// Stopwatch for measuring elapsed time
#[derive(Debug, Clone)]
pub struct Stopwatch {
    start: Instant,
    elapsed: Duration,
    running: bool,
}

impl Stopwatch {
    /// Create and start a new stopwatch
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            elapsed: Duration::ZERO,
            running: true,
        }
    }

    /// Stop the stopwatch
    pub fn stop(&mut self) {
        if self.running {
            self.elapsed += self.start.elapsed();
            self.running = false;
        }
    }

    /// Get the elapsed time
    pub fn elapsed(&self) -> Duration {
        if self.running {
            self.elapsed + self.start.elapsed()
        } else {
            self.elapsed
        }
    }

    /// Get the elapsed time in seconds
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed().as_secs_f64()
    }

    /// Check if the stopwatch is running
    pub fn is_running(&self) -> bool {
        self.running
    }
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_time_step() {
        let fts = FixedTimeStep::from_hz(60.0);
        assert!((fts.step - 1.0 / 60.0).abs() < 0.0001);
        assert_eq!(fts.with_max_updates(3).max_updates, 3);
    }

    #[test]
    fn test_short_frame_runs_no_steps() {
        let mut acc = FixedStepAccumulator::new(FixedTimeStep::from_step(0.01));
        acc.accumulate(0.004);
        assert_eq!(acc.steps_due(), 0);
        acc.accumulate(0.004);
        assert_eq!(acc.steps_due(), 0);
        acc.accumulate(0.004);
        assert_eq!(acc.steps_due(), 1);
        assert!((acc.remainder() - 0.002).abs() < 1e-9);
    }

    #[test]
    fn test_catch_up_steps() {
        let mut acc = FixedStepAccumulator::new(FixedTimeStep::from_step(0.01));
        acc.accumulate(0.035);
        assert_eq!(acc.steps_due(), 3);
        assert_eq!(acc.total_steps(), 3);
        assert!(acc.alpha() > 0.4 && acc.alpha() < 0.6);
    }

    #[test]
    fn test_catch_up_cap_drops_time() {
        let mut acc =
            FixedStepAccumulator::new(FixedTimeStep::from_step(0.01).with_max_updates(4));
        acc.accumulate(0.105);
        assert_eq!(acc.steps_due(), 4);
        assert!(acc.remainder() < 0.01);
        assert!((acc.dropped_time() - 0.06).abs() < 1e-9);
    }

    #[test]
    fn test_ignores_bad_input() {
        let mut acc = FixedStepAccumulator::default();
        acc.accumulate(-1.0);
        acc.accumulate(f64::NAN);
        assert_eq!(acc.remainder(), 0.0);
    }

    #[test]
    fn test_stopwatch() {
        let mut sw = Stopwatch::new();
        assert!(sw.is_running());

        std::thread::sleep(Duration::from_millis(10));
        sw.stop();

        assert!(!sw.is_running());
        assert!(sw.elapsed() >= Duration::from_millis(10));
    }
}
