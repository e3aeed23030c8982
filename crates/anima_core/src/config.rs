use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::drives::DriveConfig;
use crate::emotion::EmotionConfig;
use crate::endocrine::EndocrineConfig;
use crate::error::{ensure_range, AnimaError};
use crate::field::SemanticFieldConfig;

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimaConfig {
    pub drives: DriveConfig,
    pub emotion: EmotionConfig,
    pub endocrine: EndocrineConfig,
    pub field: SemanticFieldConfig,
    pub memory: MemoryConfig,
    pub organism: OrganismConfig,
}

impl AnimaConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    /// After loading, env var overrides are applied and the result validated.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config = Self::from_toml(&content)?;
        config.apply_env_overrides();
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Failed to parse TOML config")
    }

    /// Try to load from path; if the file is missing or invalid, return
    /// defaults with env overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({:#}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                if let Err(e) = cfg.validate() {
                    tracing::warn!("Environment overrides rejected ({}), using pure defaults", e);
                    cfg = Self::default();
                }
                cfg
            }
        }
    }

    /// Check every section. Engines validate their own section again at
    /// construction.
    pub fn validate(&self) -> std::result::Result<(), AnimaError> {
        self.drives.validate()?;
        self.emotion.validate()?;
        self.endocrine.validate()?;
        self.field.validate()?;
        self.memory.validate()?;
        self.organism.validate()?;
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("ANIMA_DB_PATH") {
            self.organism.db_path = v;
        }
        if let Ok(v) = std::env::var("ANIMA_HEARTBEAT_MS") {
            if let Ok(n) = v.parse() {
                self.organism.heartbeat_ms = n;
            }
        }
        if let Ok(v) = std::env::var("ANIMA_TIMEZONE_OFFSET_MINUTES") {
            if let Ok(n) = v.parse() {
                self.memory.timezone_offset_minutes = n;
            }
        }
        if let Ok(v) = std::env::var("ANIMA_RECALL_TOP_K") {
            if let Ok(n) = v.parse() {
                self.memory.recall_top_k = n;
            }
        }
    }
}

// ============================================================================
// Sub-configs
// ============================================================================

/// Retrieval weights and retention policy for the memory index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Relevance = similarity_weight * cosine + recency_weight * 2^(-dt/half_life)
    ///           + importance_weight * importance. The three must sum to 1.
    pub similarity_weight: f32,
    pub recency_weight: f32,
    pub importance_weight: f32,
    /// Half-life of an importance-0 memory.
    pub min_half_life_secs: f32,
    /// Half-life of an importance-1 memory.
    pub max_half_life_secs: f32,
    pub recall_top_k: usize,
    /// UTC offset used for the `[YYYY-MM-DD HH:MM:SS]` prefix.
    pub timezone_offset_minutes: i32,
    /// Entries scoring below this during consolidation are forgotten.
    pub prune_threshold: f32,
    /// Entries younger than this are never pruned.
    pub prune_min_age_secs: i64,
    pub max_entries: usize,
    /// Query similarity (character bigram Jaccard) above which a recall
    /// counts as a repeat of the previous one.
    pub repeat_similarity: f32,
    /// Importance boost (marginal) given to every recalled entry.
    pub recall_boost: f32,
    /// Share of the similarity term taken by mood congruence: how closely
    /// the emotions an entry was stored with match the current ones. Zero
    /// leaves retrieval purely semantic.
    pub emotion_weight: f32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            similarity_weight: 0.6,
            recency_weight: 0.25,
            importance_weight: 0.15,
            min_half_life_secs: 12.0 * 3600.0,
            max_half_life_secs: 30.0 * 86400.0,
            recall_top_k: 5,
            timezone_offset_minutes: 0,
            prune_threshold: 0.05,
            prune_min_age_secs: 86400,
            max_entries: 1000,
            repeat_similarity: 0.75,
            recall_boost: 0.02,
            emotion_weight: 0.0,
        }
    }
}

impl MemoryConfig {
    pub fn validate(&self) -> std::result::Result<(), AnimaError> {
        ensure_range("memory.similarity_weight", self.similarity_weight, 0.0, 1.0)?;
        ensure_range("memory.recency_weight", self.recency_weight, 0.0, 1.0)?;
        ensure_range("memory.importance_weight", self.importance_weight, 0.0, 1.0)?;
        let sum = self.similarity_weight + self.recency_weight + self.importance_weight;
        if (sum - 1.0).abs() > 1e-4 {
            return Err(AnimaError::config(format!(
                "memory relevance weights must sum to 1, got {}",
                sum
            )));
        }
        if !(self.min_half_life_secs.is_finite() && self.min_half_life_secs > 0.0) {
            return Err(AnimaError::config("memory.min_half_life_secs must be positive"));
        }
        if !self.max_half_life_secs.is_finite() || self.max_half_life_secs < self.min_half_life_secs
        {
            return Err(AnimaError::config(
                "memory.max_half_life_secs must be at least min_half_life_secs",
            ));
        }
        if self.recall_top_k == 0 {
            return Err(AnimaError::config("memory.recall_top_k must be at least 1"));
        }
        if self.timezone_offset_minutes.abs() >= 24 * 60 {
            return Err(AnimaError::config(format!(
                "memory.timezone_offset_minutes out of range: {}",
                self.timezone_offset_minutes
            )));
        }
        ensure_range("memory.prune_threshold", self.prune_threshold, 0.0, 1.0)?;
        if self.prune_min_age_secs < 0 {
            return Err(AnimaError::config("memory.prune_min_age_secs must be >= 0"));
        }
        if self.max_entries == 0 {
            return Err(AnimaError::config("memory.max_entries must be at least 1"));
        }
        ensure_range("memory.repeat_similarity", self.repeat_similarity, 0.0, 1.0)?;
        ensure_range("memory.recall_boost", self.recall_boost, 0.0, 1.0)?;
        ensure_range("memory.emotion_weight", self.emotion_weight, 0.0, 1.0)?;
        Ok(())
    }

    /// Importance-dependent half-life, linear between the configured bounds.
    pub fn half_life_for(&self, importance: f32) -> f32 {
        let i = importance.clamp(0.0, 1.0);
        self.min_half_life_secs + i * (self.max_half_life_secs - self.min_half_life_secs)
    }
}

/// Scheduling and lifecycle settings for a running organism.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganismConfig {
    pub db_path: String,
    pub heartbeat_ms: u64,
    /// Seconds without a message before each `IdleTimeout`.
    pub idle_timeout_secs: f64,
    pub autosave_secs: u64,
    pub social_threshold: f32,
    pub tired_threshold: f32,
    pub stressed_threshold: f32,
    /// Apply one drift-correction step per conversational turn.
    pub correct_drift_per_turn: bool,
}

impl Default for OrganismConfig {
    fn default() -> Self {
        Self {
            db_path: "anima.db".to_string(),
            heartbeat_ms: 1000,
            idle_timeout_secs: 600.0,
            autosave_secs: 60,
            social_threshold: 0.6,
            tired_threshold: 0.2,
            stressed_threshold: 0.6,
            correct_drift_per_turn: true,
        }
    }
}

impl OrganismConfig {
    pub fn validate(&self) -> std::result::Result<(), AnimaError> {
        if self.heartbeat_ms == 0 {
            return Err(AnimaError::config("organism.heartbeat_ms must be at least 1"));
        }
        if !(self.idle_timeout_secs.is_finite() && self.idle_timeout_secs > 0.0) {
            return Err(AnimaError::config("organism.idle_timeout_secs must be positive"));
        }
        ensure_range("organism.social_threshold", self.social_threshold, 0.0, 1.0)?;
        ensure_range("organism.tired_threshold", self.tired_threshold, 0.0, 1.0)?;
        ensure_range("organism.stressed_threshold", self.stressed_threshold, 0.0, 1.0)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AnimaConfig::default();
        config.validate().unwrap();
        let m = &config.memory;
        assert!((m.similarity_weight + m.recency_weight + m.importance_weight - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let toml_str = r#"
[drives]
rest_boost = 0.7

[memory]
similarity_weight = 0.5
recency_weight = 0.3
importance_weight = 0.2
timezone_offset_minutes = 480

[emotion.baseline]
joy = 0.6
"#;
        let config = AnimaConfig::from_toml(toml_str).unwrap();
        config.validate().unwrap();
        assert!((config.drives.rest_boost - 0.7).abs() < 1e-6);
        assert!((config.drives.metabolic_rate - 2.0e-5).abs() < 1e-9);
        assert_eq!(config.memory.timezone_offset_minutes, 480);
        assert!((config.emotion.baseline.joy - 0.6).abs() < 1e-6);
        assert!((config.emotion.baseline.trust - 0.5).abs() < 1e-6);
        assert_eq!(config.organism.db_path, "anima.db");
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let toml_str = r#"
[memory]
similarity_weight = 0.7
recency_weight = 0.3
importance_weight = 0.2
"#;
        let config = AnimaConfig::from_toml(toml_str).unwrap();
        assert!(matches!(
            config.validate(),
            Err(AnimaError::OutOfRangeConfig(_))
        ));
    }

    #[test]
    fn test_matrix_and_channel_gains_from_toml() {
        let toml_str = r#"
[emotion.channel_gains.fear]
kp = 0.2
ki = 0.0
kd = 0.0
output_min = -0.05
output_max = 0.05
"#;
        let config = AnimaConfig::from_toml(toml_str).unwrap();
        config.validate().unwrap();
        let fear = &config.emotion.channel_gains["fear"];
        assert!((fear.kp - 0.2).abs() < 1e-6);
        assert_eq!(config.emotion.matrix, crate::emotion::InteractionMatrix::default());
    }

    #[test]
    fn test_half_life_grows_with_importance() {
        let m = MemoryConfig::default();
        assert!(m.half_life_for(0.9) > m.half_life_for(0.2));
        assert_eq!(m.half_life_for(0.0), m.min_half_life_secs);
        assert_eq!(m.half_life_for(5.0), m.max_half_life_secs);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = AnimaConfig::load_or_default("/definitely/not/here/anima.toml");
        assert_eq!(config.drives, DriveConfig::default());
    }
}
