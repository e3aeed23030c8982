//! anima_bench: trajectory simulation tests for the limbic dynamics.
//!
//! Validates emergent behavior over long simulated time spans:
//! - 72h of silence (homeostatic recovery, growing loneliness)
//! - stress imprinting (spike, cortisol residue, slow recovery)
//! - persona differentiation (different configs give different trajectories)
//!
//! Time is simulated: ticks are fed directly and `IdleTimeout` is raised the
//! way the heartbeat would, with no tokio runtime involved.

use anima_core::{AnimaConfig, Event, Result, StateVector};
use anima_limbic::{HeartbeatConfig, IdleTracker, LimbicSnapshot, LimbicSystem};

pub struct Simulation {
    limbic: LimbicSystem,
    idle: IdleTracker,
    elapsed: f64,
}

impl Simulation {
    pub fn new(config: &AnimaConfig) -> Result<Self> {
        let heartbeat = HeartbeatConfig::from_config(&config.organism);
        Ok(Self {
            limbic: LimbicSystem::new(config)?,
            idle: IdleTracker::new(heartbeat.idle_timeout),
            elapsed: 0.0,
        })
    }

    /// Start from an arbitrary (possibly disturbed) state.
    pub fn from_state(config: &AnimaConfig, state: StateVector) -> Result<Self> {
        let sim = Self::new(config)?;
        sim.limbic.restore(LimbicSnapshot {
            state,
            ..LimbicSnapshot::default()
        });
        Ok(sim)
    }

    pub fn limbic(&self) -> &LimbicSystem {
        &self.limbic
    }

    pub fn state(&self) -> StateVector {
        self.limbic.snapshot()
    }

    /// Simulated seconds so far.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn apply(&self, event: &Event) -> Result<()> {
        self.limbic.apply_event(event)
    }

    /// Simulate `total_secs` in `step_secs` increments, raising `IdleTimeout`
    /// whenever an idle period elapses.
    pub fn run(&mut self, total_secs: f64, step_secs: f32) -> Result<()> {
        let steps = (total_secs / step_secs as f64).round() as usize;
        for _ in 0..steps {
            self.limbic.tick(step_secs)?;
            self.elapsed += step_secs as f64;
            if self.idle.observe(self.limbic.seconds_since_interaction()) {
                self.limbic.apply_event(&Event::IdleTimeout)?;
            }
        }
        Ok(())
    }

    /// Run second by second for `secs`, applying `events` every `every` seconds.
    pub fn barrage(&mut self, secs: u32, every: u32, events: &[Event]) -> Result<()> {
        for second in 0..secs {
            if second % every.max(1) == 0 {
                for event in events {
                    self.apply(event)?;
                }
            }
            self.run(1.0, 1.0)?;
        }
        Ok(())
    }
}
