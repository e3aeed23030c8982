//! Semantic field: drift correction toward the persona core.
//!
//! The mutable part of the state is projected into a fixed-order vector and
//! compared with a reference "persona core" vector. The potential is a
//! weighted squared distance, so its gradient is linear and a gradient step is
//! a contraction toward the core:
//!
//! ```text
//! U(v)      = w * |v - core|^2
//! grad U(v) = 2w * (v - core)
//! v'        = v - lr * grad U(v) = core + (1 - 2*lr*w) * (v - core)
//! ```
//!
//! With `0 < 2*lr*w < 1` every step shrinks the distance without overshooting,
//! which is what the constructor enforces.

use crate::error::{ensure_range, AnimaError, Result};
use crate::state::{Emotion, StateVector};
use serde::{Deserialize, Serialize};

/// Projected fields in vector order when existence fields are excluded.
pub const FIELD_ORDER: [&str; 10] = [
    "social_hunger",
    "curiosity",
    "joy",
    "trust",
    "fear",
    "surprise",
    "sadness",
    "disgust",
    "anger",
    "anticipation",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticFieldConfig {
    /// Reference vector. Empty means "the default state's projection".
    pub persona_core: Vec<f32>,
    pub learning_rate: f32,
    pub potential_weight: f32,
    /// Prepend energy and entropy to the projection.
    pub include_existence: bool,
}

impl Default for SemanticFieldConfig {
    fn default() -> Self {
        Self {
            persona_core: Vec::new(),
            learning_rate: 0.05,
            potential_weight: 1.0,
            include_existence: false,
        }
    }
}

impl SemanticFieldConfig {
    pub fn dimension(&self) -> usize {
        FIELD_ORDER.len() + if self.include_existence { 2 } else { 0 }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(AnimaError::config(format!(
                "field.learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(self.potential_weight.is_finite() && self.potential_weight > 0.0) {
            return Err(AnimaError::config(format!(
                "field.potential_weight must be positive, got {}",
                self.potential_weight
            )));
        }
        let contraction = 2.0 * self.learning_rate * self.potential_weight;
        if contraction >= 1.0 {
            return Err(AnimaError::config(format!(
                "2 * learning_rate * potential_weight = {} leaves the monotone range (< 1)",
                contraction
            )));
        }
        if !self.persona_core.is_empty() {
            if self.persona_core.len() != self.dimension() {
                return Err(AnimaError::config(format!(
                    "field.persona_core has {} values, expected {}",
                    self.persona_core.len(),
                    self.dimension()
                )));
            }
            for (i, v) in self.persona_core.iter().enumerate() {
                ensure_range(&format!("field.persona_core[{}]", i), *v, 0.0, 1.0)?;
            }
        }
        Ok(())
    }
}

/// Potential before and after one correction step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub potential_before: f32,
    pub potential_after: f32,
}

/// Gradient-descent step: `v - learning_rate * gradient`.
pub fn evolve(vector: &[f32], gradient: &[f32], learning_rate: f32) -> Vec<f32> {
    vector
        .iter()
        .zip(gradient)
        .map(|(v, g)| v - learning_rate * g)
        .collect()
}

#[derive(Debug, Clone)]
pub struct SemanticField {
    config: SemanticFieldConfig,
    core: Vec<f32>,
}

impl SemanticField {
    pub fn new(config: SemanticFieldConfig) -> Result<Self> {
        Self::anchored_at(config, &StateVector::default())
    }

    /// Field whose core, unless configured explicitly, is the projection of
    /// `resting` (typically the default state carrying the persona's emotion
    /// baseline).
    pub fn anchored_at(config: SemanticFieldConfig, resting: &StateVector) -> Result<Self> {
        config.validate()?;
        let core = if config.persona_core.is_empty() {
            project(resting, config.include_existence)
        } else {
            config.persona_core.clone()
        };
        Ok(Self { config, core })
    }

    pub fn persona_core(&self) -> &[f32] {
        &self.core
    }

    pub fn dimension(&self) -> usize {
        self.core.len()
    }

    pub fn learning_rate(&self) -> f32 {
        self.config.learning_rate
    }

    pub fn vectorize(&self, state: &StateVector) -> Vec<f32> {
        project(state, self.config.include_existence)
    }

    pub fn potential_energy(&self, vector: &[f32]) -> Result<f32> {
        self.check_dimension(vector)?;
        let dist2: f32 = vector
            .iter()
            .zip(&self.core)
            .map(|(v, c)| (v - c) * (v - c))
            .sum();
        Ok(self.config.potential_weight * dist2)
    }

    pub fn gradient(&self, vector: &[f32]) -> Result<Vec<f32>> {
        self.check_dimension(vector)?;
        let scale = 2.0 * self.config.potential_weight;
        Ok(vector
            .iter()
            .zip(&self.core)
            .map(|(v, c)| scale * (v - c))
            .collect())
    }

    /// Overwrite the projected fields of `state` with `vector`; everything
    /// else (rapport, and existence fields unless included) is untouched.
    pub fn project_back(&self, state: &mut StateVector, vector: &[f32]) -> Result<()> {
        self.check_dimension(vector)?;
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(AnimaError::invalid_input("projected vector contains non-finite values"));
        }
        let mut values = vector.iter().map(|v| v.clamp(0.0, 1.0));
        let mut next = || values.next().unwrap_or_default();
        if self.config.include_existence {
            state.energy = next();
            state.entropy = next();
        }
        state.social_hunger = next();
        state.curiosity = next();
        for e in Emotion::ALL {
            *state.emotion.get_mut(e) = next();
        }
        Ok(())
    }

    /// One vectorize / gradient / evolve / project-back pass.
    pub fn correct_drift(&self, state: &mut StateVector) -> DriftReport {
        state.normalize();
        let v = self.vectorize(state);
        // Dimensions match by construction.
        let potential_before = self.potential_energy(&v).unwrap_or(0.0);
        let evolved = match self.gradient(&v) {
            Ok(grad) => evolve(&v, &grad, self.config.learning_rate),
            Err(_) => v,
        };
        let potential_after = self.potential_energy(&evolved).unwrap_or(potential_before);
        if let Err(e) = self.project_back(state, &evolved) {
            tracing::warn!("Drift correction skipped: {}", e);
        }
        tracing::debug!(
            "Drift correction: potential {:.4} -> {:.4}",
            potential_before,
            potential_after
        );
        DriftReport {
            potential_before,
            potential_after,
        }
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.core.len() {
            return Err(AnimaError::invalid_input(format!(
                "vector has {} dimensions, field expects {}",
                vector.len(),
                self.core.len()
            )));
        }
        Ok(())
    }
}

fn project(state: &StateVector, include_existence: bool) -> Vec<f32> {
    let mut v = Vec::with_capacity(FIELD_ORDER.len() + 2);
    if include_existence {
        v.push(state.energy);
        v.push(state.entropy);
    }
    v.push(state.social_hunger);
    v.push(state.curiosity);
    v.extend(state.emotion.to_array());
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field() -> SemanticField {
        SemanticField::new(SemanticFieldConfig::default()).unwrap()
    }

    fn drifted() -> StateVector {
        let mut s = StateVector::default();
        s.social_hunger = 0.9;
        s.curiosity = 0.1;
        s.emotion.anger = 0.8;
        s.emotion.joy = 0.05;
        s
    }

    #[test]
    fn test_vectorize_fixed_order() {
        let f = field();
        let s = drifted();
        let v = f.vectorize(&s);
        assert_eq!(v.len(), FIELD_ORDER.len());
        assert_eq!(v[0], 0.9);
        assert_eq!(v[1], 0.1);
        assert_eq!(v[2], 0.05);
        assert_eq!(v[2 + Emotion::Anger.index()], 0.8);
    }

    #[test]
    fn test_potential_zero_only_at_core() {
        let f = field();
        let core = f.persona_core().to_vec();
        assert_eq!(f.potential_energy(&core).unwrap(), 0.0);
        let v = f.vectorize(&drifted());
        assert!(f.potential_energy(&v).unwrap() > 0.0);
    }

    #[test]
    fn test_gradient_points_away_from_core() {
        let f = field();
        let v = f.vectorize(&drifted());
        let g = f.gradient(&v).unwrap();
        for ((vi, ci), gi) in v.iter().zip(f.persona_core()).zip(&g) {
            assert!((gi - 2.0 * (vi - ci)).abs() < 1e-6);
        }
    }

    #[test]
    fn test_repeated_correction_contracts_monotonically() {
        let f = field();
        let mut s = drifted();
        let mut last = f.potential_energy(&f.vectorize(&s)).unwrap();
        for _ in 0..100 {
            let report = f.correct_drift(&mut s);
            assert!(report.potential_after < report.potential_before);
            assert!(report.potential_after <= last);
            last = report.potential_after;
        }
        assert!(last < 1e-4, "potential should approach 0, got {}", last);
        assert!(s.is_bounded());
    }

    #[test]
    fn test_project_back_leaves_rapport_and_existence() {
        let f = field();
        let mut s = drifted();
        s.rapport = 0.77;
        s.energy = 0.3;
        s.entropy = 0.6;
        f.correct_drift(&mut s);
        assert_eq!(s.rapport, 0.77);
        assert_eq!(s.energy, 0.3);
        assert_eq!(s.entropy, 0.6);
    }

    #[test]
    fn test_existence_fields_optional() {
        let config = SemanticFieldConfig {
            include_existence: true,
            ..SemanticFieldConfig::default()
        };
        let f = SemanticField::new(config).unwrap();
        let mut s = drifted();
        s.energy = 0.2;
        assert_eq!(f.dimension(), 12);
        f.correct_drift(&mut s);
        assert!(s.energy > 0.2, "energy pulled toward core, got {}", s.energy);
    }

    #[test]
    fn test_unstable_or_malformed_config_rejected() {
        let unstable = SemanticFieldConfig {
            learning_rate: 0.6,
            potential_weight: 1.0,
            ..SemanticFieldConfig::default()
        };
        assert!(matches!(
            SemanticField::new(unstable),
            Err(AnimaError::OutOfRangeConfig(_))
        ));
        let wrong_dim = SemanticFieldConfig {
            persona_core: vec![0.5; 3],
            ..SemanticFieldConfig::default()
        };
        assert!(SemanticField::new(wrong_dim).is_err());
        let out_of_range = SemanticFieldConfig {
            persona_core: vec![1.5; 10],
            ..SemanticFieldConfig::default()
        };
        assert!(SemanticField::new(out_of_range).is_err());
    }

    #[test]
    fn test_dimension_mismatch_is_invalid_input() {
        let f = field();
        assert!(matches!(
            f.potential_energy(&[0.1, 0.2]),
            Err(AnimaError::InvalidInput(_))
        ));
        let mut s = StateVector::default();
        assert!(f.project_back(&mut s, &[f32::NAN; 10]).is_err());
    }

    #[test]
    fn test_anchored_core_follows_resting_state() {
        let mut resting = StateVector::default();
        resting.emotion.fear = 0.2;
        let f = SemanticField::anchored_at(SemanticFieldConfig::default(), &resting).unwrap();
        assert_eq!(f.persona_core()[2 + Emotion::Fear.index()], 0.2);
        assert_eq!(f.potential_energy(&f.vectorize(&resting)).unwrap(), 0.0);
    }

    #[test]
    fn test_evolve_is_plain_gradient_step() {
        let v = evolve(&[1.0, 0.0], &[2.0, -2.0], 0.25);
        assert_eq!(v, vec![0.5, 0.5]);
    }
}
