//! Memory consolidation ("dreaming"): deciding what to forget.
//!
//! Retention mirrors retrieval without the query term: an entry is worth
//! keeping in proportion to its importance, discounted by its own half-life.
//! Consolidation removes entries that have faded below a threshold and then
//! enforces a hard capacity by dropping the weakest.

use crate::entry::MemoryEntry;
use anima_core::MemoryConfig;
use std::sync::Arc;

/// `importance * 2^(-age / half_life)`
pub fn retention_score(entry: &MemoryEntry, now: i64) -> f32 {
    entry.importance * entry.recency(now)
}

/// Configuration for a consolidation pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrunePolicy {
    pub threshold: f32,
    /// Entries younger than this are kept regardless of score.
    pub min_age_secs: i64,
    pub max_entries: usize,
}

impl From<&MemoryConfig> for PrunePolicy {
    fn from(config: &MemoryConfig) -> Self {
        Self {
            threshold: config.prune_threshold,
            min_age_secs: config.prune_min_age_secs,
            max_entries: config.max_entries,
        }
    }
}

/// Outcome of one consolidation run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsolidationReport {
    pub examined: usize,
    pub pruned: Vec<u64>,
    pub kept: usize,
}

/// Ids to forget, weakest first.
pub fn select_prunable(entries: &[Arc<MemoryEntry>], now: i64, policy: &PrunePolicy) -> Vec<u64> {
    let mut scored: Vec<(f32, &MemoryEntry)> = entries
        .iter()
        .map(|e| (retention_score(e, now), e.as_ref()))
        .collect();
    // Weakest first; among equals the older entry goes first.
    scored.sort_by(|a, b| {
        a.0.total_cmp(&b.0)
            .then(a.1.timestamp.cmp(&b.1.timestamp))
            .then(a.1.id.cmp(&b.1.id))
    });

    let mut pruned = Vec::new();
    let mut remaining = entries.len();
    for (score, entry) in &scored {
        let old_enough = now.saturating_sub(entry.timestamp) >= policy.min_age_secs;
        if old_enough && *score < policy.threshold {
            pruned.push(entry.id);
            remaining -= 1;
        }
    }

    // Capacity applies to everything, young entries included.
    if remaining > policy.max_entries {
        for (_, entry) in &scored {
            if remaining <= policy.max_entries {
                break;
            }
            if !pruned.contains(&entry.id) {
                pruned.push(entry.id);
                remaining -= 1;
            }
        }
    }

    pruned
}
