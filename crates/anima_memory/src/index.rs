//! Memory index with time-weighted retrieval.
//!
//! ```text
//! half_life = min_half_life + importance * (max_half_life - min_half_life)
//! recency   = 2^(-max(now - t, 0) / half_life)
//! relevance = ws * similarity + wr * recency + wi * importance
//! ```
//!
//! With a nonzero `emotion_weight` and a current mood, the similarity term
//! blends in mood congruence for entries stored with an emotion snapshot:
//! `(1 - ew) * cosine + ew * cosine(mood, stored emotion)`. An entry whose
//! text is exactly the query ranks ahead of everything else, so a memory is
//! always retrievable by its own words.
//!
//! Readers iterate an immutable `Arc<Vec<Arc<MemoryEntry>>>` loaded from an
//! `ArcSwap`; writers serialize on a mutex, build the next list and swap it
//! in. A retrieval that overlaps an append sees either the old or the new
//! list, never a partial one.

use crate::consolidation::{select_prunable, PrunePolicy};
use crate::embedding::{cosine_similarity, Embedder};
use crate::entry::{MemoryEntry, ScoredMemory};
use anima_core::clock::to_datetime;
use anima_core::{marginal_delta, AnimaError, EmotionVector, MemoryConfig, Result};
use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

pub struct MemoryIndex {
    config: MemoryConfig,
    embedder: Arc<dyn Embedder>,
    entries: ArcSwap<Vec<Arc<MemoryEntry>>>,
    writer: Mutex<()>,
    next_id: AtomicU64,
}

impl MemoryIndex {
    pub fn new(config: MemoryConfig, embedder: Arc<dyn Embedder>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            embedder,
            entries: ArcSwap::from_pointee(Vec::new()),
            writer: Mutex::new(()),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.load().is_empty()
    }

    /// Consistent view of every entry, oldest first.
    pub fn entries(&self) -> Arc<Vec<Arc<MemoryEntry>>> {
        self.entries.load_full()
    }

    pub fn get(&self, id: u64) -> Option<Arc<MemoryEntry>> {
        self.entries.load().iter().find(|e| e.id == id).cloned()
    }

    /// Validate, embed and assign an id without indexing yet, so a caller
    /// can persist first and only index what was durably written.
    pub fn prepare(&self, text: &str, timestamp: i64, importance: f32) -> Result<MemoryEntry> {
        if text.trim().is_empty() {
            return Err(AnimaError::invalid_input("memory text is empty"));
        }
        if !importance.is_finite() {
            return Err(AnimaError::invalid_input(format!(
                "memory importance must be finite, got {}",
                importance
            )));
        }
        to_datetime(timestamp, self.config.timezone_offset_minutes)?;

        let embedding = self.embed(text)?;
        let importance = importance.clamp(0.0, 1.0);
        Ok(MemoryEntry {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            timestamp,
            text: text.to_string(),
            embedding,
            importance,
            half_life: self.config.half_life_for(importance),
            emotion: None,
            access_count: 0,
        })
    }

    /// Insert a prepared entry in timestamp order.
    pub fn insert(&self, entry: MemoryEntry) -> Arc<MemoryEntry> {
        let entry = Arc::new(entry);
        let _guard = self.lock_writer();
        self.next_id.fetch_max(entry.id + 1, Ordering::SeqCst);

        let current = self.entries.load_full();
        let mut next: Vec<Arc<MemoryEntry>> = Vec::with_capacity(current.len() + 1);
        let key = (entry.timestamp, entry.id);
        let at = current.partition_point(|e| (e.timestamp, e.id) <= key);
        next.extend(current[..at].iter().cloned());
        next.push(Arc::clone(&entry));
        next.extend(current[at..].iter().cloned());
        self.entries.store(Arc::new(next));

        tracing::debug!(
            "Indexed memory {} (importance {:.2}, {} total)",
            entry.id,
            entry.importance,
            current.len() + 1
        );
        entry
    }

    /// Embed and index in one step.
    pub fn store(&self, text: &str, timestamp: i64, importance: f32) -> Result<Arc<MemoryEntry>> {
        let entry = self.prepare(text, timestamp, importance)?;
        Ok(self.insert(entry))
    }

    /// Replace the whole index with persisted entries.
    pub fn hydrate(&self, mut entries: Vec<MemoryEntry>) {
        let _guard = self.lock_writer();
        entries.sort_by_key(|e| (e.timestamp, e.id));
        let max_id = entries.iter().map(|e| e.id).max().unwrap_or(0);
        self.next_id.fetch_max(max_id + 1, Ordering::SeqCst);
        let count = entries.len();
        self.entries
            .store(Arc::new(entries.into_iter().map(Arc::new).collect()));
        tracing::info!("Memory index hydrated with {} entries", count);
    }

    pub fn retrieve(
        &self,
        query_text: &str,
        query_timestamp: i64,
        top_k: usize,
    ) -> Result<Vec<ScoredMemory>> {
        self.retrieve_with(query_text, query_timestamp, top_k, None, |_| 1.0)
    }

    /// Retrieval colored by the current mood, with a per-entry multiplier
    /// on the similarity term.
    pub fn retrieve_with<F>(
        &self,
        query_text: &str,
        query_timestamp: i64,
        top_k: usize,
        mood: Option<&EmotionVector>,
        penalty: F,
    ) -> Result<Vec<ScoredMemory>>
    where
        F: Fn(&MemoryEntry) -> f32,
    {
        to_datetime(query_timestamp, self.config.timezone_offset_minutes)?;

        let snapshot = self.entries.load_full();
        if snapshot.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let query = self.embed(query_text)?;
        let query_text = query_text.trim();
        let mood = mood
            .filter(|_| self.config.emotion_weight > 0.0)
            .map(EmotionVector::to_array);
        let c = &self.config;

        let mut scored: Vec<(bool, ScoredMemory)> = snapshot
            .iter()
            .map(|entry| {
                let factor = penalty(entry).clamp(0.0, 1.0);
                let semantic = cosine_similarity(&query, &entry.embedding).max(0.0);
                let congruence = mood.as_ref().and_then(|now| {
                    let stored = entry.emotion?.to_array();
                    Some(cosine_similarity(now, &stored).max(0.0))
                });
                let similarity = match congruence {
                    Some(m) => (1.0 - c.emotion_weight) * semantic + c.emotion_weight * m,
                    None => semantic,
                } * factor;
                let recency = entry.recency(query_timestamp);
                let relevance = c.similarity_weight * similarity
                    + c.recency_weight * recency
                    + c.importance_weight * entry.importance;
                // A damped entry is not promoted, even on an exact match.
                let exact = factor >= 1.0 && entry.text.trim() == query_text;
                let hit = ScoredMemory {
                    entry: Arc::clone(entry),
                    relevance,
                    similarity,
                    recency,
                    mood: congruence,
                };
                (exact, hit)
            })
            .collect();

        scored.sort_by(|(exact_a, a), (exact_b, b)| {
            exact_b
                .cmp(exact_a)
                .then(b.relevance.total_cmp(&a.relevance))
                .then(b.entry.timestamp.cmp(&a.entry.timestamp))
                .then(b.entry.id.cmp(&a.entry.id))
        });
        let scored: Vec<ScoredMemory> = scored
            .into_iter()
            .take(top_k)
            .map(|(_, hit)| hit)
            .collect();

        tracing::debug!(
            "Retrieved {} of {} memories (best relevance {:.3})",
            scored.len(),
            snapshot.len(),
            scored.first().map(|s| s.relevance).unwrap_or(0.0)
        );
        Ok(scored)
    }

    /// Count an access and raise the entry's importance by `boost` with
    /// marginal scaling. The half-life follows the new importance.
    pub fn reinforce(&self, id: u64, boost: f32) -> Option<Arc<MemoryEntry>> {
        if !boost.is_finite() {
            return None;
        }
        let _guard = self.lock_writer();
        let current = self.entries.load_full();
        let pos = current.iter().position(|e| e.id == id)?;

        let mut updated = MemoryEntry::clone(&current[pos]);
        updated.importance =
            (updated.importance + marginal_delta(updated.importance, boost)).clamp(0.0, 1.0);
        updated.half_life = self.config.half_life_for(updated.importance);
        updated.access_count = updated.access_count.saturating_add(1);
        let updated = Arc::new(updated);

        let mut next = current.as_ref().clone();
        next[pos] = Arc::clone(&updated);
        self.entries.store(Arc::new(next));
        Some(updated)
    }

    /// Drop the given ids. Returns how many were present.
    pub fn remove(&self, ids: &[u64]) -> usize {
        if ids.is_empty() {
            return 0;
        }
        let _guard = self.lock_writer();
        let current = self.entries.load_full();
        let next: Vec<Arc<MemoryEntry>> = current
            .iter()
            .filter(|e| !ids.contains(&e.id))
            .cloned()
            .collect();
        let removed = current.len() - next.len();
        self.entries.store(Arc::new(next));
        removed
    }

    /// Ids a consolidation pass at `now` would forget, without removing them.
    pub fn prunable(&self, now: i64, policy: &PrunePolicy) -> Vec<u64> {
        select_prunable(&self.entries.load_full(), now, policy)
    }

    /// Forget faded entries and enforce capacity. Returns the removed ids.
    pub fn prune(&self, now: i64, policy: &PrunePolicy) -> Vec<u64> {
        let pruned = self.prunable(now, policy);
        let removed = self.remove(&pruned);
        if removed > 0 {
            tracing::debug!("Pruned {} memories", removed);
        }
        pruned
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embedding = self.embedder.embed(text).map_err(|e| match e {
            AnimaError::EmbeddingFailure(_) => e,
            other => AnimaError::embedding(other.to_string()),
        })?;
        if embedding.is_empty() || embedding.iter().any(|v| !v.is_finite()) {
            return Err(AnimaError::embedding("embedder returned an empty or non-finite vector"));
        }
        Ok(embedding)
    }

    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
