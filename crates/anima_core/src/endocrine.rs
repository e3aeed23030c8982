//! Slow neurochemical layer under the emotion channels.
//!
//! Three hormones are secreted from the current emotions and metabolized over
//! time. They feed back as floors and multipliers rather than direct pushes:
//! - cortisol (anger + fear + disgust) keeps negative channels from dropping
//!   below a stress floor and, above a threshold, suppresses joy and trust
//! - dopamine (joy + anticipation) speeds sadness decay
//! - oxytocin (trust) accelerates cortisol clearance

use crate::error::{ensure_non_negative, ensure_range, Result};
use crate::state::EmotionVector;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndocrineConfig {
    pub enabled: bool,
    /// Secretion per second per unit of summed source emotion.
    pub secretion_rate: f32,
    pub cortisol_clearance: f32,
    pub dopamine_clearance: f32,
    pub oxytocin_clearance: f32,
    /// Cortisol clearance multiplier per unit oxytocin.
    pub oxytocin_calming: f32,
    pub stress_floor_ratio: f32,
    pub suppression_threshold: f32,
    pub reward_threshold: f32,
    /// Fraction of sadness shed per second while dopamine is high.
    pub reward_sadness_decay: f32,
}

impl Default for EndocrineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            secretion_rate: 0.003,
            cortisol_clearance: 0.0005,
            dopamine_clearance: 0.001,
            oxytocin_clearance: 0.001,
            oxytocin_calming: 2.0,
            stress_floor_ratio: 0.5,
            suppression_threshold: 0.5,
            reward_threshold: 0.5,
            reward_sadness_decay: 0.05,
        }
    }
}

impl EndocrineConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_non_negative("endocrine.secretion_rate", self.secretion_rate)?;
        ensure_non_negative("endocrine.cortisol_clearance", self.cortisol_clearance)?;
        ensure_non_negative("endocrine.dopamine_clearance", self.dopamine_clearance)?;
        ensure_non_negative("endocrine.oxytocin_clearance", self.oxytocin_clearance)?;
        ensure_non_negative("endocrine.oxytocin_calming", self.oxytocin_calming)?;
        ensure_range("endocrine.stress_floor_ratio", self.stress_floor_ratio, 0.0, 1.0)?;
        ensure_range("endocrine.suppression_threshold", self.suppression_threshold, 0.0, 1.0)?;
        ensure_range("endocrine.reward_threshold", self.reward_threshold, 0.0, 1.0)?;
        ensure_range("endocrine.reward_sadness_decay", self.reward_sadness_decay, 0.0, 1.0)?;
        Ok(())
    }
}

/// Hormone levels, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Neurochemistry {
    pub cortisol: f32,
    pub dopamine: f32,
    pub oxytocin: f32,
}

impl Neurochemistry {
    /// Secrete, metabolize, then modulate `emotion` in place over `dt` seconds.
    pub fn regulate(&mut self, emotion: &mut EmotionVector, config: &EndocrineConfig, dt: f32) {
        if !config.enabled || !(dt.is_finite() && dt > 0.0) {
            return;
        }

        // === Secretion ===
        // Only stress above the current floor counts; the floor is residue,
        // and feeding it back would latch cortisol at saturation.
        let residue = self.cortisol * config.stress_floor_ratio;
        let stress_input = [emotion.anger, emotion.fear, emotion.disgust]
            .iter()
            .map(|v| (v - residue).max(0.0))
            .sum::<f32>();
        let reward_input = emotion.joy + emotion.anticipation;
        let bond_input = emotion.trust;
        self.cortisol += stress_input * config.secretion_rate * dt;
        self.dopamine += reward_input * config.secretion_rate * dt;
        self.oxytocin += bond_input * config.secretion_rate * dt;
        self.clamp();

        // === Metabolism ===
        let cortisol_clearance =
            config.cortisol_clearance * (1.0 + self.oxytocin * config.oxytocin_calming);
        self.cortisol -= cortisol_clearance * dt;
        self.dopamine -= config.dopamine_clearance * dt;
        self.oxytocin -= config.oxytocin_clearance * dt;
        self.clamp();

        // === Feedback onto emotions ===
        let floor = self.cortisol * config.stress_floor_ratio;
        for channel in [&mut emotion.anger, &mut emotion.fear, &mut emotion.disgust] {
            *channel = (*channel).max(floor);
        }

        if self.cortisol > config.suppression_threshold {
            let suppression = 1.0 + (self.cortisol - config.suppression_threshold) * 2.0;
            let keep = (1.0 - 0.01 * suppression).clamp(0.0, 1.0).powf(dt);
            emotion.joy *= keep;
            emotion.trust *= keep;
        }

        if self.dopamine > config.reward_threshold {
            emotion.sadness *= (1.0 - config.reward_sadness_decay).powf(dt);
        }
    }

    fn clamp(&mut self) {
        for level in [&mut self.cortisol, &mut self.dopamine, &mut self.oxytocin] {
            *level = if level.is_finite() { (*level).clamp(0.0, 1.0) } else { 0.0 };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_emotions_raise_cortisol_and_floor() {
        let config = EndocrineConfig::default();
        let mut chem = Neurochemistry::default();
        let mut emotion = EmotionVector {
            anger: 0.9,
            fear: 0.8,
            ..EmotionVector::default()
        };
        for _ in 0..100 {
            chem.regulate(&mut emotion, &config, 1.0);
        }
        assert!(chem.cortisol > 0.3, "got {}", chem.cortisol);

        // The floor holds even when the channels are forced down.
        emotion.anger = 0.0;
        emotion.disgust = 0.0;
        chem.regulate(&mut emotion, &config, 1.0);
        assert!(emotion.anger >= chem.cortisol * 0.5 - 1e-6);
        assert!(emotion.disgust > 0.0);
    }

    #[test]
    fn test_floor_alone_does_not_sustain_cortisol() {
        let config = EndocrineConfig::default();
        let mut chem = Neurochemistry {
            cortisol: 0.8,
            ..Neurochemistry::default()
        };
        let mut emotion = EmotionVector::zero();
        for _ in 0..2_000 {
            // Channels regress to zero between steps; only the floor holds them up.
            emotion = EmotionVector::zero();
            chem.regulate(&mut emotion, &config, 1.0);
        }
        assert!(chem.cortisol < 0.05, "got {}", chem.cortisol);
        assert!(emotion.fear < 0.03);
    }

    #[test]
    fn test_high_cortisol_suppresses_joy() {
        let config = EndocrineConfig::default();
        let mut chem = Neurochemistry {
            cortisol: 0.9,
            ..Neurochemistry::default()
        };
        let mut emotion = EmotionVector::default();
        chem.regulate(&mut emotion, &config, 1.0);
        assert!(emotion.joy < 0.5);
        assert!(emotion.trust < 0.5);
    }

    #[test]
    fn test_dopamine_accelerates_sadness_decay() {
        let config = EndocrineConfig::default();
        let mut chem = Neurochemistry {
            dopamine: 0.9,
            ..Neurochemistry::default()
        };
        let mut emotion = EmotionVector {
            sadness: 0.6,
            ..EmotionVector::default()
        };
        chem.regulate(&mut emotion, &config, 1.0);
        assert!((emotion.sadness - 0.6 * 0.95).abs() < 1e-5);
    }

    #[test]
    fn test_disabled_layer_is_inert() {
        let config = EndocrineConfig {
            enabled: false,
            ..EndocrineConfig::default()
        };
        let mut chem = Neurochemistry {
            cortisol: 1.0,
            ..Neurochemistry::default()
        };
        let mut emotion = EmotionVector::default();
        let before = emotion;
        chem.regulate(&mut emotion, &config, 1.0);
        assert_eq!(emotion, before);
        assert_eq!(chem.cortisol, 1.0);
    }

    #[test]
    fn test_levels_stay_bounded_under_large_dt() {
        let config = EndocrineConfig::default();
        let mut chem = Neurochemistry::default();
        let mut emotion = EmotionVector::from_array([1.0; 8]);
        chem.regulate(&mut emotion, &config, 10_000.0);
        for level in [chem.cortisol, chem.dopamine, chem.oxytocin] {
            assert!((0.0..=1.0).contains(&level));
        }
    }
}
