//! Emotion dynamics engine.
//!
//! Eight Plutchik channels coupled through an interaction matrix. Stimuli are
//! queued by `apply_event` and consumed on the next tick, which runs in a fixed
//! order:
//!
//! 1. queued stimuli through the interaction matrix
//! 2. per-channel PID regression toward baseline
//! 3. endocrine modulation (floors and multipliers, see [`crate::endocrine`])
//! 4. clamp every channel into `[0, 1]`
//!
//! Given the same configuration, stimulus sequence and `dt` sequence the
//! output is bit-for-bit reproducible.

use crate::endocrine::{EndocrineConfig, Neurochemistry};
use crate::error::{AnimaError, Result};
use crate::event::Event;
use crate::pid::{PidAccumulators, PidConfig, PidController};
use crate::state::{Emotion, EmotionVector, StateVector};
use crate::Dynamics;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

// ============================================================================
// Interaction matrix
// ============================================================================

/// `matrix[i][j]`: change of channel `j` per unit stimulus on channel `i`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InteractionMatrix(pub [[f32; 8]; 8]);

impl Default for InteractionMatrix {
    /// Coefficients by distance on the wheel: self-reinforcing, neighbours
    /// mildly synergistic, everything further away increasingly antagonistic,
    /// opposites strongly so (joy suppresses sadness, trust suppresses disgust).
    fn default() -> Self {
        const BY_DISTANCE: [f32; 5] = [1.0, 0.2, -0.1, -0.2, -0.5];
        let mut m = [[0.0; 8]; 8];
        for (i, row) in m.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                let d = (i as isize - j as isize).unsigned_abs();
                *cell = BY_DISTANCE[d.min(8 - d)];
            }
        }
        Self(m)
    }
}

impl InteractionMatrix {
    pub fn coefficient(&self, from: Emotion, to: Emotion) -> f32 {
        self.0[from.index()][to.index()]
    }

    pub fn validate(&self) -> Result<()> {
        for (i, row) in self.0.iter().enumerate() {
            for (j, v) in row.iter().enumerate() {
                if !v.is_finite() || v.abs() > 2.0 {
                    return Err(AnimaError::config(format!(
                        "interaction matrix [{}][{}] = {} (must be finite, |v| <= 2)",
                        Emotion::ALL[i],
                        Emotion::ALL[j],
                        v
                    )));
                }
            }
        }
        Ok(())
    }

    /// Spread a stimulus on `channel` across every channel. No clamping.
    pub fn apply(&self, emotion: &mut EmotionVector, channel: Emotion, magnitude: f32) {
        let row = &self.0[channel.index()];
        for target in Emotion::ALL {
            *emotion.get_mut(target) += magnitude * row[target.index()];
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmotionConfig {
    /// Regression target per channel.
    pub baseline: EmotionVector,
    /// Gains and output bounds shared by all channels. The setpoint field is
    /// ignored; each channel regresses toward its baseline.
    pub regression: PidConfig,
    /// Per-channel gain overrides keyed by channel name.
    pub channel_gains: BTreeMap<String, PidConfig>,
    pub matrix: InteractionMatrix,
    /// Stimuli waiting beyond this are dropped oldest-first.
    pub max_pending: usize,
}

impl Default for EmotionConfig {
    fn default() -> Self {
        Self {
            baseline: EmotionVector::default(),
            regression: PidConfig::default(),
            channel_gains: BTreeMap::new(),
            matrix: InteractionMatrix::default(),
            max_pending: 64,
        }
    }
}

impl EmotionConfig {
    pub fn validate(&self) -> Result<()> {
        for (e, v) in self.baseline.iter() {
            crate::error::ensure_range(&format!("emotion.baseline.{}", e), v, 0.0, 1.0)?;
        }
        self.regression.validate()?;
        for name in self.channel_gains.keys() {
            name.parse::<Emotion>()
                .map_err(|_| AnimaError::config(format!("unknown emotion channel '{}'", name)))?;
        }
        self.matrix.validate()?;
        if self.max_pending == 0 {
            return Err(AnimaError::config("emotion.max_pending must be at least 1"));
        }
        Ok(())
    }

    /// Controller configuration for one channel, setpoint = baseline.
    fn controller_config(&self, emotion: Emotion) -> PidConfig {
        let gains = self
            .channel_gains
            .iter()
            .find(|(name, _)| name.parse::<Emotion>().ok() == Some(emotion))
            .map(|(_, g)| *g)
            .unwrap_or(self.regression);
        gains.with_setpoint(self.baseline.get(emotion))
    }
}

// ============================================================================
// Engine
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stimulus {
    pub channel: Emotion,
    pub magnitude: f32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EmotionMemory {
    /// One entry per channel in wheel order.
    pub controllers: Vec<PidAccumulators>,
    pub pending: Vec<Stimulus>,
    pub neurochemistry: Neurochemistry,
}

#[derive(Debug, Clone)]
pub struct EmotionEngine {
    config: EmotionConfig,
    endocrine: EndocrineConfig,
    controllers: Vec<PidController>,
    pending: VecDeque<Stimulus>,
    neurochemistry: Neurochemistry,
}

impl EmotionEngine {
    pub fn new(config: EmotionConfig, endocrine: EndocrineConfig) -> Result<Self> {
        config.validate()?;
        endocrine.validate()?;
        let controllers = Emotion::ALL
            .into_iter()
            .map(|e| PidController::new(config.controller_config(e)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            config,
            endocrine,
            controllers,
            pending: VecDeque::new(),
            neurochemistry: Neurochemistry::default(),
        })
    }

    pub fn config(&self) -> &EmotionConfig {
        &self.config
    }

    pub fn baseline(&self) -> &EmotionVector {
        &self.config.baseline
    }

    pub fn neurochemistry(&self) -> Neurochemistry {
        self.neurochemistry
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Queue a stimulus for the next tick.
    pub fn queue(&mut self, stimulus: Stimulus) -> Result<()> {
        Event::stimulus(stimulus.channel, stimulus.magnitude).validate()?;
        if self.pending.len() >= self.config.max_pending {
            if let Some(dropped) = self.pending.pop_front() {
                tracing::warn!(
                    "Stimulus queue full, dropping {} ({:.2})",
                    dropped.channel,
                    dropped.magnitude
                );
            }
        }
        self.pending.push_back(stimulus);
        Ok(())
    }

    pub fn memory(&self) -> EmotionMemory {
        EmotionMemory {
            controllers: self.controllers.iter().map(|c| c.accumulators()).collect(),
            pending: self.pending.iter().copied().collect(),
            neurochemistry: self.neurochemistry,
        }
    }

    pub fn restore(&mut self, memory: EmotionMemory) {
        for (controller, acc) in self.controllers.iter_mut().zip(memory.controllers) {
            controller.restore(acc);
        }
        self.pending = memory
            .pending
            .into_iter()
            .filter(|s| s.magnitude.is_finite() && s.magnitude.abs() <= 1.0)
            .collect();
        while self.pending.len() > self.config.max_pending {
            self.pending.pop_front();
        }
        let mut chem = memory.neurochemistry;
        for level in [&mut chem.cortisol, &mut chem.dopamine, &mut chem.oxytocin] {
            *level = if level.is_finite() { (*level).clamp(0.0, 1.0) } else { 0.0 };
        }
        self.neurochemistry = chem;
    }
}

impl Dynamics for EmotionEngine {
    fn tick(&mut self, state: &mut StateVector, dt: f32) {
        if !(dt.is_finite() && dt > 0.0) {
            tracing::debug!("Skipping emotion tick with dt={}", dt);
            return;
        }
        let baseline = self.config.baseline;
        state.emotion.normalize(&baseline);

        while let Some(stimulus) = self.pending.pop_front() {
            self.config
                .matrix
                .apply(&mut state.emotion, stimulus.channel, stimulus.magnitude);
        }

        for emotion in Emotion::ALL {
            let value = state.emotion.get(emotion);
            let correction = self.controllers[emotion.index()].step(value, dt);
            *state.emotion.get_mut(emotion) += correction;
        }

        self.neurochemistry
            .regulate(&mut state.emotion, &self.endocrine, dt);

        state.emotion.normalize(&baseline);
        tracing::trace!("Emotion tick dt={:.3}: {:?}", dt, state.emotion.to_array());
    }

    fn apply_event(&mut self, _state: &mut StateVector, event: &Event) -> Result<()> {
        event.validate()?;
        if let Event::Stimulus { channel, magnitude } = *event {
            self.queue(Stimulus { channel, magnitude })?;
            tracing::debug!("Queued stimulus {} ({:.2})", channel, magnitude);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> EmotionEngine {
        EmotionEngine::new(EmotionConfig::default(), EndocrineConfig::default()).unwrap()
    }

    fn quiet_engine() -> EmotionEngine {
        let endocrine = EndocrineConfig {
            enabled: false,
            ..EndocrineConfig::default()
        };
        EmotionEngine::new(EmotionConfig::default(), endocrine).unwrap()
    }

    #[test]
    fn test_default_matrix_shape() {
        let m = InteractionMatrix::default();
        for e in Emotion::ALL {
            assert_eq!(m.coefficient(e, e), 1.0);
            assert_eq!(m.coefficient(e, e.opposite()), -0.5);
        }
        assert!(m.coefficient(Emotion::Joy, Emotion::Sadness) < 0.0);
        assert!(m.coefficient(Emotion::Joy, Emotion::Anger) < 0.0);
        assert!(m.coefficient(Emotion::Joy, Emotion::Trust) > 0.0);
        // symmetric by construction
        for i in Emotion::ALL {
            for j in Emotion::ALL {
                assert_eq!(m.coefficient(i, j), m.coefficient(j, i));
            }
        }
    }

    #[test]
    fn test_stimulus_is_deferred_to_next_tick() {
        let mut engine = quiet_engine();
        let mut state = StateVector::default();
        engine
            .apply_event(&mut state, &Event::stimulus(Emotion::Fear, 0.6))
            .unwrap();
        assert_eq!(state.emotion.fear, 0.0, "stimulus must not apply before the tick");
        assert_eq!(engine.pending(), 1);

        engine.tick(&mut state, 1.0);
        assert_eq!(engine.pending(), 0);
        assert!(state.emotion.fear > 0.4, "got {}", state.emotion.fear);
        // fear antagonizes its opposite and the far side of the wheel
        assert!(state.emotion.joy < 0.5);
    }

    #[test]
    fn test_joy_suppresses_sadness() {
        let mut engine = quiet_engine();
        let mut state = StateVector::default();
        state.emotion.sadness = 0.6;
        engine.queue(Stimulus { channel: Emotion::Joy, magnitude: 0.4 }).unwrap();
        engine.tick(&mut state, 1.0);
        assert!(state.emotion.sadness < 0.45, "got {}", state.emotion.sadness);
    }

    #[test]
    fn test_regression_toward_baseline() {
        let mut engine = quiet_engine();
        let mut state = StateVector::default();
        state.emotion.anger = 0.9;
        state.emotion.joy = 0.1;
        for _ in 0..600 {
            engine.tick(&mut state, 1.0);
        }
        assert!(state.emotion.anger < 0.05, "anger should settle, got {}", state.emotion.anger);
        assert!(
            (state.emotion.joy - 0.5).abs() < 0.05,
            "joy should settle near 0.5, got {}",
            state.emotion.joy
        );
    }

    #[test]
    fn test_per_tick_change_bounded_without_stimuli() {
        let mut engine = quiet_engine();
        let mut state = StateVector::default();
        state.emotion = EmotionVector::from_array([1.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0]);
        for _ in 0..50 {
            let before = state.emotion.to_array();
            engine.tick(&mut state, 1.0);
            for (a, b) in before.iter().zip(state.emotion.to_array()) {
                assert!((a - b).abs() <= 0.1 + 1e-6, "jump {} -> {}", a, b);
            }
        }
    }

    #[test]
    fn test_deterministic_replay() {
        let run = || {
            let mut engine = engine();
            let mut state = StateVector::default();
            for i in 0..300 {
                if i % 17 == 0 {
                    let channel = Emotion::ALL[i % 8];
                    let magnitude = ((i as f32) * 0.37).sin();
                    engine
                        .apply_event(&mut state, &Event::stimulus(channel, magnitude))
                        .unwrap();
                }
                engine.tick(&mut state, 0.5 + (i % 3) as f32 * 0.25);
            }
            (state, engine.memory())
        };
        let (a, ma) = run();
        let (b, mb) = run();
        assert_eq!(a, b);
        assert_eq!(ma, mb);
    }

    #[test]
    fn test_invalid_stimulus_rejected_without_side_effects() {
        let mut engine = engine();
        let mut state = StateVector::default();
        let err = engine
            .apply_event(&mut state, &Event::stimulus(Emotion::Joy, f32::NAN))
            .unwrap_err();
        assert!(matches!(err, AnimaError::InvalidInput(_)));
        assert_eq!(engine.pending(), 0);
    }

    #[test]
    fn test_queue_drops_oldest_when_full() {
        let config = EmotionConfig {
            max_pending: 2,
            ..EmotionConfig::default()
        };
        let mut engine = EmotionEngine::new(config, EndocrineConfig::default()).unwrap();
        for m in [0.1, 0.2, 0.3] {
            engine.queue(Stimulus { channel: Emotion::Joy, magnitude: m }).unwrap();
        }
        let pending = engine.memory().pending;
        assert_eq!(pending.len(), 2);
        assert!((pending[0].magnitude - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_channel_override_and_validation() {
        let mut config = EmotionConfig::default();
        config.channel_gains.insert(
            "anger".to_string(),
            PidConfig {
                kp: 0.3,
                ..PidConfig::default()
            },
        );
        assert!((config.controller_config(Emotion::Anger).kp - 0.3).abs() < 1e-6);
        assert!((config.controller_config(Emotion::Joy).kp - 0.1).abs() < 1e-6);
        assert!((config.controller_config(Emotion::Joy).setpoint - 0.5).abs() < 1e-6);

        config.channel_gains.insert("ennui".to_string(), PidConfig::default());
        assert!(config.validate().is_err());

        let mut bad = EmotionConfig::default();
        bad.matrix.0[2][3] = f32::NAN;
        assert!(matches!(bad.validate(), Err(AnimaError::OutOfRangeConfig(_))));
    }

    #[test]
    fn test_memory_roundtrip_preserves_pending() {
        let mut engine = engine();
        let mut state = StateVector::default();
        engine.tick(&mut state, 1.0);
        engine.queue(Stimulus { channel: Emotion::Trust, magnitude: 0.3 }).unwrap();
        let memory = engine.memory();

        let mut restored = EmotionEngine::new(EmotionConfig::default(), EndocrineConfig::default())
            .unwrap();
        restored.restore(memory.clone());
        assert_eq!(restored.memory(), memory);
    }
}
