//! Drive / biorhythm engine.
//!
//! Advances the existence fields (energy, entropy) and the drives (social
//! hunger, curiosity, rapport) once per tick and on discrete events. Every
//! event-driven change goes through [`marginal_delta`], so repeated pushes in
//! one direction give diminishing returns near the bound.
//!
//! Couplings:
//! - entropy is regulated toward 0 by its own PID controller
//! - low energy slows social-hunger growth (fatigue) and speeds curiosity decay
//! - exhaustion lets entropy creep upward
//! - conversation intensity (how many recent messages, how closely spaced)
//!   makes messages more tiring, rest less restoring, curiosity fade faster
//!   and social hunger grow slower

use crate::error::{ensure_non_negative, ensure_range, AnimaError, Result};
use crate::event::Event;
use crate::pid::{PidAccumulators, PidConfig, PidController};
use crate::state::{marginal_delta, StateVector};
use crate::Dynamics;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Entropy perturbation applied by each event kind before regulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StressWeights {
    pub rest: f32,
    pub message: f32,
    /// Multiplied by the absolute stimulus magnitude.
    pub stimulus: f32,
    pub idle: f32,
    pub departed: f32,
    pub positive: f32,
    pub negative: f32,
    pub novel: f32,
}

impl Default for StressWeights {
    fn default() -> Self {
        Self {
            rest: 0.0,
            message: 0.05,
            stimulus: 0.1,
            idle: 0.0,
            departed: 0.05,
            positive: 0.01,
            negative: 0.15,
            novel: 0.03,
        }
    }
}

impl StressWeights {
    pub fn weight_for(&self, event: &Event) -> f32 {
        match event {
            Event::Rest => self.rest,
            Event::MessageReceived => self.message,
            Event::Stimulus { magnitude, .. } => self.stimulus * magnitude.abs(),
            Event::IdleTimeout => self.idle,
            Event::UserDeparted => self.departed,
            Event::PositiveInteraction => self.positive,
            Event::NegativeInteraction => self.negative,
            Event::NovelTopic => self.novel,
        }
    }

    fn validate(&self) -> Result<()> {
        for (name, v) in [
            ("stress.rest", self.rest),
            ("stress.message", self.message),
            ("stress.stimulus", self.stimulus),
            ("stress.idle", self.idle),
            ("stress.departed", self.departed),
            ("stress.positive", self.positive),
            ("stress.negative", self.negative),
            ("stress.novel", self.novel),
        ] {
            ensure_range(name, v, 0.0, 1.0)?;
        }
        Ok(())
    }
}

/// Conversation intensity in `[0, 1]` is
/// `0.4 * frequency + 0.4 * spacing + 0.2 * duration` over the messages of
/// the last `window_secs`:
/// - frequency: message count relative to `full_count`
/// - spacing: `1 - mean gap / full_interval_secs`, or 0.5 for a lone message
/// - duration: length of the current exchange (trailing messages no further
///   apart than `full_interval_secs`) relative to `full_duration_secs`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntensityConfig {
    pub window_secs: f32,
    pub full_count: f32,
    pub full_interval_secs: f32,
    pub full_duration_secs: f32,
    /// Message times older than this are dropped.
    pub retention_secs: f32,
    /// Most message times kept, whatever their age.
    pub capacity: usize,
    /// Message energy cost is multiplied by `1 + energy_cost_gain * intensity`.
    pub energy_cost_gain: f32,
    /// Rest and idle recovery are multiplied by `1 - recovery_damping * intensity`.
    pub recovery_damping: f32,
    pub social_threshold: f32,
    /// Above `social_threshold`, social growth is multiplied by
    /// `1 - social_damping * intensity`.
    pub social_damping: f32,
    pub curiosity_threshold: f32,
    /// Above `curiosity_threshold`, curiosity decay is multiplied by
    /// `1 + curiosity_gain * intensity`.
    pub curiosity_gain: f32,
}

impl Default for IntensityConfig {
    fn default() -> Self {
        Self {
            window_secs: 3600.0,
            full_count: 10.0,
            full_interval_secs: 300.0,
            full_duration_secs: 60.0,
            retention_secs: 86400.0,
            capacity: 64,
            energy_cost_gain: 0.5,
            recovery_damping: 0.9,
            social_threshold: 0.5,
            social_damping: 0.3,
            curiosity_threshold: 0.3,
            curiosity_gain: 0.5,
        }
    }
}

impl IntensityConfig {
    fn validate(&self) -> Result<()> {
        for (name, v) in [
            ("intensity.window_secs", self.window_secs),
            ("intensity.full_count", self.full_count),
            ("intensity.full_interval_secs", self.full_interval_secs),
            ("intensity.full_duration_secs", self.full_duration_secs),
        ] {
            if !(v.is_finite() && v > 0.0) {
                return Err(AnimaError::config(format!("drives.{} must be positive, got {}", name, v)));
            }
        }
        if !(self.retention_secs.is_finite() && self.retention_secs >= self.window_secs) {
            return Err(AnimaError::config(
                "drives.intensity.retention_secs must be at least window_secs",
            ));
        }
        if self.capacity == 0 {
            return Err(AnimaError::config("drives.intensity.capacity must be at least 1"));
        }
        ensure_non_negative("drives.intensity.energy_cost_gain", self.energy_cost_gain)?;
        ensure_range("drives.intensity.recovery_damping", self.recovery_damping, 0.0, 1.0)?;
        ensure_range("drives.intensity.social_threshold", self.social_threshold, 0.0, 1.0)?;
        ensure_range("drives.intensity.social_damping", self.social_damping, 0.0, 1.0)?;
        ensure_range("drives.intensity.curiosity_threshold", self.curiosity_threshold, 0.0, 1.0)?;
        ensure_non_negative("drives.intensity.curiosity_gain", self.curiosity_gain)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    /// Exponential energy decay per second.
    pub metabolic_rate: f32,
    pub rest_boost: f32,
    pub idle_recovery: f32,
    pub message_energy_cost: f32,
    pub entropy_pid: PidConfig,
    pub stress: StressWeights,
    /// Seconds after an interaction before social hunger starts growing.
    pub social_grace_secs: f32,
    pub social_growth_rate: f32,
    pub social_reset_strength: f32,
    pub curiosity_decay_rate: f32,
    pub novelty_boost: f32,
    pub rapport_step: f32,
    pub tired_threshold: f32,
    pub tired_curiosity_multiplier: f32,
    pub exhaustion_threshold: f32,
    pub exhaustion_entropy_rate: f32,
    pub intensity: IntensityConfig,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            metabolic_rate: 2.0e-5,
            rest_boost: 0.5,
            idle_recovery: 0.15,
            message_energy_cost: 0.04,
            entropy_pid: PidConfig {
                kp: 0.2,
                ki: 0.05,
                kd: 0.01,
                setpoint: 0.0,
                output_min: -0.1,
                output_max: 0.1,
            },
            stress: StressWeights::default(),
            social_grace_secs: 300.0,
            social_growth_rate: 1.0e-4,
            social_reset_strength: 0.6,
            curiosity_decay_rate: 4.0e-5,
            novelty_boost: 0.3,
            rapport_step: 0.02,
            tired_threshold: 0.3,
            tired_curiosity_multiplier: 5.0,
            exhaustion_threshold: 0.05,
            exhaustion_entropy_rate: 5.0e-4,
            intensity: IntensityConfig::default(),
        }
    }
}

impl DriveConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_non_negative("drives.metabolic_rate", self.metabolic_rate)?;
        ensure_range("drives.rest_boost", self.rest_boost, 0.0, 1.0)?;
        ensure_range("drives.idle_recovery", self.idle_recovery, 0.0, 1.0)?;
        ensure_range("drives.message_energy_cost", self.message_energy_cost, 0.0, 1.0)?;
        ensure_range("drives.entropy_pid.setpoint", self.entropy_pid.setpoint, 0.0, 1.0)?;
        self.entropy_pid.validate()?;
        self.stress.validate()?;
        ensure_non_negative("drives.social_grace_secs", self.social_grace_secs)?;
        ensure_non_negative("drives.social_growth_rate", self.social_growth_rate)?;
        ensure_range("drives.social_reset_strength", self.social_reset_strength, 0.0, 1.0)?;
        ensure_non_negative("drives.curiosity_decay_rate", self.curiosity_decay_rate)?;
        ensure_range("drives.novelty_boost", self.novelty_boost, 0.0, 1.0)?;
        ensure_range("drives.rapport_step", self.rapport_step, 0.0, 1.0)?;
        ensure_range("drives.tired_threshold", self.tired_threshold, 0.0, 1.0)?;
        ensure_range(
            "drives.tired_curiosity_multiplier",
            self.tired_curiosity_multiplier,
            1.0,
            100.0,
        )?;
        ensure_range("drives.exhaustion_threshold", self.exhaustion_threshold, 0.0, 1.0)?;
        ensure_non_negative("drives.exhaustion_entropy_rate", self.exhaustion_entropy_rate)?;
        self.intensity.validate()?;
        Ok(())
    }
}

/// Persisted engine memory beyond the state vector itself.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveMemory {
    pub entropy_pid: PidAccumulators,
    pub seconds_since_interaction: f64,
    /// Simulated seconds the engine has been ticked.
    pub elapsed: f64,
    /// Times of recent messages on the `elapsed` timeline, oldest first.
    pub recent_messages: Vec<f64>,
}

/// Scales drive activity by available energy: 0 below 10% energy, 1 at full.
pub fn fatigue_factor(energy: f32) -> f32 {
    ((energy - 0.1) / 0.9).clamp(0.0, 1.0)
}

#[derive(Debug, Clone)]
pub struct DriveEngine {
    config: DriveConfig,
    entropy_pid: PidController,
    seconds_since_interaction: f64,
    elapsed: f64,
    recent_messages: VecDeque<f64>,
}

impl DriveEngine {
    pub fn new(config: DriveConfig) -> Result<Self> {
        config.validate()?;
        let entropy_pid = PidController::new(config.entropy_pid)?;
        Ok(Self {
            config,
            entropy_pid,
            seconds_since_interaction: 0.0,
            elapsed: 0.0,
            recent_messages: VecDeque::new(),
        })
    }

    pub fn config(&self) -> &DriveConfig {
        &self.config
    }

    pub fn seconds_since_interaction(&self) -> f64 {
        self.seconds_since_interaction
    }

    /// Current conversation intensity in `[0, 1]`.
    pub fn conversation_intensity(&self) -> f32 {
        let c = &self.config.intensity;
        let window = c.window_secs as f64;
        let recent: Vec<f64> = self
            .recent_messages
            .iter()
            .copied()
            .filter(|t| self.elapsed - t <= window)
            .collect();
        let (Some(&first), Some(&last)) = (recent.first(), recent.last()) else {
            return 0.0;
        };

        let full_interval = c.full_interval_secs as f64;
        let frequency = (recent.len() as f32 / c.full_count).min(1.0);
        let spacing = if recent.len() > 1 {
            let mean_gap = (last - first) / (recent.len() - 1) as f64;
            (1.0 - mean_gap / full_interval).max(0.0) as f32
        } else {
            0.5
        };

        let mut start = last;
        for pair in recent.windows(2).rev() {
            if pair[1] - pair[0] > full_interval {
                break;
            }
            start = pair[0];
        }
        let duration = ((last - start) / c.full_duration_secs as f64).min(1.0) as f32;

        (0.4 * frequency + 0.4 * spacing + 0.2 * duration).clamp(0.0, 1.0)
    }

    fn record_message(&mut self) {
        self.recent_messages.push_back(self.elapsed);
        while self.recent_messages.len() > self.config.intensity.capacity {
            self.recent_messages.pop_front();
        }
    }

    fn forget_old_messages(&mut self) {
        let cutoff = self.elapsed - self.config.intensity.retention_secs as f64;
        while self.recent_messages.front().is_some_and(|t| *t < cutoff) {
            self.recent_messages.pop_front();
        }
    }

    pub fn memory(&self) -> DriveMemory {
        DriveMemory {
            entropy_pid: self.entropy_pid.accumulators(),
            seconds_since_interaction: self.seconds_since_interaction,
            elapsed: self.elapsed,
            recent_messages: self.recent_messages.iter().copied().collect(),
        }
    }

    pub fn restore(&mut self, memory: DriveMemory) {
        self.entropy_pid.restore(memory.entropy_pid);
        self.seconds_since_interaction = if memory.seconds_since_interaction.is_finite() {
            memory.seconds_since_interaction.max(0.0)
        } else {
            0.0
        };
        self.elapsed = if memory.elapsed.is_finite() {
            memory.elapsed.max(0.0)
        } else {
            0.0
        };
        let elapsed = self.elapsed;
        let mut recent: Vec<f64> = memory
            .recent_messages
            .into_iter()
            .filter(|t| t.is_finite() && *t <= elapsed)
            .collect();
        recent.sort_by(f64::total_cmp);
        let excess = recent.len().saturating_sub(self.config.intensity.capacity);
        self.recent_messages = recent.into_iter().skip(excess).collect();
        self.forget_old_messages();
    }
}

impl Dynamics for DriveEngine {
    fn tick(&mut self, state: &mut StateVector, dt: f32) {
        if !(dt.is_finite() && dt > 0.0) {
            tracing::debug!("Skipping drive tick with dt={}", dt);
            return;
        }
        state.normalize();
        self.elapsed += dt as f64;
        self.forget_old_messages();
        let intensity = self.conversation_intensity();
        let c = &self.config;

        // === Energy dynamics ===
        state.energy *= (-c.metabolic_rate * dt).exp();
        let fatigue = fatigue_factor(state.energy);

        // === Entropy dynamics ===
        let correction = self.entropy_pid.step(state.entropy, dt);
        state.entropy += marginal_delta(state.entropy, correction);
        if state.energy < c.exhaustion_threshold {
            state.entropy += marginal_delta(state.entropy, c.exhaustion_entropy_rate * dt);
        }

        // === Social hunger dynamics ===
        // Grows only after the grace period, slowed by fatigue.
        self.seconds_since_interaction += dt as f64;
        if self.seconds_since_interaction > c.social_grace_secs as f64 {
            let mut rate = c.social_growth_rate;
            if intensity > c.intensity.social_threshold {
                rate *= 1.0 - c.intensity.social_damping * intensity;
            }
            let growth = 1.0 - (-rate * dt * fatigue * fatigue).exp();
            state.social_hunger += marginal_delta(state.social_hunger, growth);
        }

        // === Curiosity dynamics ===
        let mut decay = c.curiosity_decay_rate;
        if state.energy < c.tired_threshold {
            decay *= c.tired_curiosity_multiplier;
        }
        if intensity > c.intensity.curiosity_threshold {
            decay *= 1.0 + c.intensity.curiosity_gain * intensity;
        }
        state.curiosity *= (-decay * dt).exp();

        state.normalize();
        tracing::trace!(
            "Drive tick dt={:.3}: energy={:.3} entropy={:.3} social={:.3} curiosity={:.3}",
            dt,
            state.energy,
            state.entropy,
            state.social_hunger,
            state.curiosity
        );
    }

    fn apply_event(&mut self, state: &mut StateVector, event: &Event) -> Result<()> {
        event.validate()?;
        state.normalize();
        if *event == Event::MessageReceived {
            self.record_message();
        }
        let intensity = self.conversation_intensity();
        let c = &self.config;

        let stress = c.stress.weight_for(event);
        state.entropy += marginal_delta(state.entropy, stress);

        let recovery = 1.0 - c.intensity.recovery_damping * intensity;
        match event {
            Event::Rest => {
                state.energy += marginal_delta(state.energy, c.rest_boost * recovery);
            }
            Event::IdleTimeout => {
                state.energy += marginal_delta(state.energy, c.idle_recovery * recovery);
            }
            Event::MessageReceived => {
                let cost = (c.message_energy_cost * (1.0 + c.intensity.energy_cost_gain * intensity))
                    .min(1.0);
                state.energy += marginal_delta(state.energy, -cost);
                state.social_hunger +=
                    marginal_delta(state.social_hunger, -c.social_reset_strength);
                self.seconds_since_interaction = 0.0;
            }
            Event::UserDeparted => {
                self.seconds_since_interaction = 0.0;
            }
            Event::NovelTopic => {
                state.curiosity += marginal_delta(state.curiosity, c.novelty_boost);
            }
            Event::PositiveInteraction => {
                state.rapport += marginal_delta(state.rapport, c.rapport_step);
            }
            Event::NegativeInteraction => {
                state.rapport += marginal_delta(state.rapport, -c.rapport_step);
            }
            Event::Stimulus { .. } => {}
        }

        state.normalize();
        tracing::debug!(
            "Drive event {}: stress={:.3} intensity={:.2} energy={:.3} entropy={:.3}",
            event.kind(),
            stress,
            intensity,
            state.energy,
            state.entropy
        );
        Ok(())
    }
}
