use anima_core::{format_timestamp, EmotionVector, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One remembered piece of text. Immutable once indexed, except for
/// importance reinforcement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: u64,
    /// Unix seconds.
    pub timestamp: i64,
    pub text: String,
    pub embedding: Vec<f32>,
    pub importance: f32,
    /// Seconds for recency to halve.
    pub half_life: f32,
    /// Emotions at the moment of storing, if known.
    #[serde(default)]
    pub emotion: Option<EmotionVector>,
    /// Times this entry has surfaced in a recall.
    #[serde(default)]
    pub access_count: u32,
}

impl MemoryEntry {
    /// `2^(-dt / half_life)`, with `dt` floored at zero so entries from the
    /// future count as fresh.
    pub fn recency(&self, now: i64) -> f32 {
        let age = now.saturating_sub(self.timestamp).max(0) as f64;
        let half_life = (self.half_life as f64).max(1.0);
        (-age / half_life).exp2() as f32
    }

    /// `[YYYY-MM-DD HH:MM:SS] text` in the given UTC offset.
    pub fn render(&self, offset_minutes: i32) -> Result<String> {
        Ok(format!(
            "{} {}",
            format_timestamp(self.timestamp, offset_minutes)?,
            self.text
        ))
    }
}

/// A retrieval hit with its score breakdown.
#[derive(Debug, Clone)]
pub struct ScoredMemory {
    pub entry: Arc<MemoryEntry>,
    pub relevance: f32,
    pub similarity: f32,
    pub recency: f32,
    /// Congruence between the stored and the current emotions, when both
    /// were available.
    pub mood: Option<f32>,
}
