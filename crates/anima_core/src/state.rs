//! The agent's bounded 13-dimensional state.
//!
//! Layout: 2 existence dimensions (energy, entropy), 3 drives (social hunger,
//! curiosity, rapport) and 8 emotion channels in Plutchik wheel order. Every
//! scalar lives in `[0, 1]`.

use crate::error::AnimaError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Replace a non-finite value with `fallback`, logging the substitution.
pub(crate) fn sanitize_f32(v: f32, fallback: f32) -> f32 {
    if v.is_finite() {
        v
    } else {
        tracing::warn!("Non-finite state value detected ({}), resetting to {}", v, fallback);
        fallback
    }
}

/// Scale a signed delta by the remaining headroom toward the bound it moves to.
///
/// Positive deltas shrink as `value` approaches 1, negative deltas as it
/// approaches 0, so a fixed nominal push yields diminishing returns near
/// saturation and exactly zero at the bound.
pub fn marginal_delta(value: f32, delta: f32) -> f32 {
    let value = value.clamp(0.0, 1.0);
    if delta >= 0.0 {
        delta * (1.0 - value)
    } else {
        delta * value
    }
}

// ============================================================================
// Emotion channels
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    Joy,
    Trust,
    Fear,
    Surprise,
    Sadness,
    Disgust,
    Anger,
    Anticipation,
}

impl Emotion {
    pub const COUNT: usize = 8;

    /// Wheel order. Opposites sit four positions apart.
    pub const ALL: [Emotion; 8] = [
        Emotion::Joy,
        Emotion::Trust,
        Emotion::Fear,
        Emotion::Surprise,
        Emotion::Sadness,
        Emotion::Disgust,
        Emotion::Anger,
        Emotion::Anticipation,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Emotion::Joy => "joy",
            Emotion::Trust => "trust",
            Emotion::Fear => "fear",
            Emotion::Surprise => "surprise",
            Emotion::Sadness => "sadness",
            Emotion::Disgust => "disgust",
            Emotion::Anger => "anger",
            Emotion::Anticipation => "anticipation",
        }
    }

    pub fn opposite(self) -> Emotion {
        Emotion::ALL[(self.index() + 4) % Emotion::COUNT]
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Emotion {
    type Err = AnimaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Emotion::ALL
            .into_iter()
            .find(|e| e.name() == lower)
            .ok_or_else(|| AnimaError::invalid_input(format!("unknown emotion channel '{}'", s)))
    }
}

/// Intensity per emotion channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmotionVector {
    pub joy: f32,
    pub trust: f32,
    pub fear: f32,
    pub surprise: f32,
    pub sadness: f32,
    pub disgust: f32,
    pub anger: f32,
    pub anticipation: f32,
}

impl Default for EmotionVector {
    /// Resting baseline: mild contentment and trust, nothing else.
    fn default() -> Self {
        Self::from_array([0.5, 0.5, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0])
    }
}

impl EmotionVector {
    pub fn zero() -> Self {
        Self::from_array([0.0; 8])
    }

    pub fn from_array(v: [f32; 8]) -> Self {
        Self {
            joy: v[0],
            trust: v[1],
            fear: v[2],
            surprise: v[3],
            sadness: v[4],
            disgust: v[5],
            anger: v[6],
            anticipation: v[7],
        }
    }

    pub fn to_array(&self) -> [f32; 8] {
        [
            self.joy,
            self.trust,
            self.fear,
            self.surprise,
            self.sadness,
            self.disgust,
            self.anger,
            self.anticipation,
        ]
    }

    pub fn get(&self, emotion: Emotion) -> f32 {
        match emotion {
            Emotion::Joy => self.joy,
            Emotion::Trust => self.trust,
            Emotion::Fear => self.fear,
            Emotion::Surprise => self.surprise,
            Emotion::Sadness => self.sadness,
            Emotion::Disgust => self.disgust,
            Emotion::Anger => self.anger,
            Emotion::Anticipation => self.anticipation,
        }
    }

    pub fn get_mut(&mut self, emotion: Emotion) -> &mut f32 {
        match emotion {
            Emotion::Joy => &mut self.joy,
            Emotion::Trust => &mut self.trust,
            Emotion::Fear => &mut self.fear,
            Emotion::Surprise => &mut self.surprise,
            Emotion::Sadness => &mut self.sadness,
            Emotion::Disgust => &mut self.disgust,
            Emotion::Anger => &mut self.anger,
            Emotion::Anticipation => &mut self.anticipation,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Emotion, f32)> + '_ {
        Emotion::ALL.into_iter().map(move |e| (e, self.get(e)))
    }

    /// Strongest channel, ties resolved in wheel order.
    pub fn dominant(&self) -> (Emotion, f32) {
        self.iter()
            .fold((Emotion::Joy, f32::MIN), |best, (e, v)| if v > best.1 { (e, v) } else { best })
    }

    /// Sanitize non-finite channels back to `baseline` and clamp to `[0, 1]`.
    pub fn normalize(&mut self, baseline: &EmotionVector) {
        for e in Emotion::ALL {
            let slot = self.get_mut(e);
            *slot = sanitize_f32(*slot, baseline.get(e)).clamp(0.0, 1.0);
        }
    }
}

// ============================================================================
// State vector
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateVector {
    /// Capacity to act. Decays with time, restored by rest.
    pub energy: f32,
    /// Internal disorder. Rises with stimulation, regulated toward 0.
    pub entropy: f32,
    pub social_hunger: f32,
    pub curiosity: f32,
    /// Accumulated relationship quality. Never regresses on its own.
    pub rapport: f32,
    pub emotion: EmotionVector,
}

impl Default for StateVector {
    fn default() -> Self {
        Self {
            energy: 1.0,
            entropy: 0.0,
            social_hunger: 0.0,
            curiosity: 0.5,
            rapport: 0.1,
            emotion: EmotionVector::default(),
        }
    }
}

impl StateVector {
    pub const DIMENSIONS: usize = 13;

    /// Sanitize NaN/Inf to defaults and clamp every field into `[0, 1]`.
    pub fn normalize(&mut self) {
        let d = StateVector::default();
        self.energy = sanitize_f32(self.energy, d.energy).clamp(0.0, 1.0);
        self.entropy = sanitize_f32(self.entropy, d.entropy).clamp(0.0, 1.0);
        self.social_hunger = sanitize_f32(self.social_hunger, d.social_hunger).clamp(0.0, 1.0);
        self.curiosity = sanitize_f32(self.curiosity, d.curiosity).clamp(0.0, 1.0);
        self.rapport = sanitize_f32(self.rapport, d.rapport).clamp(0.0, 1.0);
        self.emotion.normalize(&d.emotion);
    }

    /// All 13 dimensions in declaration order.
    pub fn to_array(&self) -> [f32; 13] {
        let e = self.emotion.to_array();
        [
            self.energy,
            self.entropy,
            self.social_hunger,
            self.curiosity,
            self.rapport,
            e[0],
            e[1],
            e[2],
            e[3],
            e[4],
            e[5],
            e[6],
            e[7],
        ]
    }

    pub fn is_bounded(&self) -> bool {
        self.to_array()
            .iter()
            .all(|v| v.is_finite() && (0.0..=1.0).contains(v))
    }

    /// Short natural-language summary for prompt assembly.
    pub fn describe_for_context(&self) -> String {
        let energy = match self.energy {
            e if e < 0.2 => "exhausted",
            e if e < 0.5 => "tired",
            e if e < 0.8 => "steady",
            _ => "energetic",
        };
        let composure = if self.entropy > 0.6 {
            "overwhelmed"
        } else if self.entropy > 0.3 {
            "unsettled"
        } else {
            "composed"
        };
        let (dominant, intensity) = self.emotion.dominant();
        let mut parts = vec![
            format!("Feeling {} and {}", energy, composure),
            format!("dominant emotion: {} ({:.2})", dominant, intensity),
        ];
        if self.social_hunger > 0.6 {
            parts.push("longing for conversation".to_string());
        }
        if self.curiosity > 0.7 {
            parts.push("eager to explore new topics".to_string());
        }
        parts.push(format!("rapport {:.2}", self.rapport));
        parts.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_bounded() {
        let s = StateVector::default();
        assert!(s.is_bounded());
        assert_eq!(s.to_array().len(), StateVector::DIMENSIONS);
        assert!((s.emotion.joy - 0.5).abs() < 1e-6);
        assert!((s.emotion.trust - 0.5).abs() < 1e-6);
        assert_eq!(s.emotion.fear, 0.0);
    }

    #[test]
    fn test_normalize_sanitizes_and_clamps() {
        let mut s = StateVector {
            energy: f32::NAN,
            entropy: 3.0,
            social_hunger: -1.0,
            curiosity: f32::INFINITY,
            rapport: 0.4,
            emotion: EmotionVector {
                anger: f32::NEG_INFINITY,
                joy: 1.7,
                ..EmotionVector::default()
            },
        };
        s.normalize();
        assert!(s.is_bounded());
        assert_eq!(s.energy, 1.0, "NaN energy should fall back to default");
        assert_eq!(s.entropy, 1.0);
        assert_eq!(s.social_hunger, 0.0);
        assert_eq!(s.curiosity, 0.5);
        assert_eq!(s.emotion.anger, 0.0);
        assert_eq!(s.emotion.joy, 1.0);
        assert!((s.rapport - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_marginal_delta_shrinks_near_bounds() {
        assert!((marginal_delta(0.0, 0.5) - 0.5).abs() < 1e-6);
        assert!((marginal_delta(0.5, 0.5) - 0.25).abs() < 1e-6);
        assert_eq!(marginal_delta(1.0, 0.5), 0.0);
        assert_eq!(marginal_delta(0.0, -0.5), 0.0);
        assert!((marginal_delta(0.8, -0.5) - (-0.4)).abs() < 1e-6);
    }

    #[test]
    fn test_emotion_parsing_and_indexing() {
        assert_eq!("Joy".parse::<Emotion>().unwrap(), Emotion::Joy);
        assert_eq!(" anger ".parse::<Emotion>().unwrap(), Emotion::Anger);
        assert!(matches!(
            "smugness".parse::<Emotion>(),
            Err(AnimaError::InvalidInput(_))
        ));
        for (i, e) in Emotion::ALL.into_iter().enumerate() {
            assert_eq!(e.index(), i);
        }
        assert_eq!(Emotion::Joy.opposite(), Emotion::Sadness);
        assert_eq!(Emotion::Trust.opposite(), Emotion::Disgust);
        assert_eq!(Emotion::Anticipation.opposite(), Emotion::Surprise);
    }

    #[test]
    fn test_emotion_vector_get_set_roundtrip() {
        let mut v = EmotionVector::zero();
        *v.get_mut(Emotion::Fear) = 0.7;
        assert_eq!(v.get(Emotion::Fear), 0.7);
        assert_eq!(v.to_array()[Emotion::Fear.index()], 0.7);
        assert_eq!(v.dominant(), (Emotion::Fear, 0.7));
    }

    #[test]
    fn test_describe_for_context() {
        let mut s = StateVector::default();
        s.energy = 0.1;
        s.social_hunger = 0.9;
        s.emotion.sadness = 0.8;
        let text = s.describe_for_context();
        assert!(text.contains("exhausted"), "got {}", text);
        assert!(text.contains("sadness"), "got {}", text);
        assert!(text.contains("longing"), "got {}", text);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let s: StateVector = serde_json::from_str(r#"{"energy": 0.3, "emotion": {"fear": 0.2}}"#).unwrap();
        assert!((s.energy - 0.3).abs() < 1e-6);
        assert!((s.curiosity - 0.5).abs() < 1e-6);
        assert!((s.emotion.fear - 0.2).abs() < 1e-6);
        assert!((s.emotion.joy - 0.5).abs() < 1e-6);
    }
}
