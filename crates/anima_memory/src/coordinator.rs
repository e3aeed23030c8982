//! Organism - the facade the kernel talks to.
//!
//! Ties the limbic system to the memory index and its persistent store:
//! - `tick` / `apply_event` / `snapshot` delegate to the limbic system
//! - `remember` persists first and indexes only what was written
//! - `recall` degrades to "no memories" when the store is down
//! - `respond` runs one conversational turn end to end
//!
//! The organism never owns a timer. Whoever drives it (a `Heartbeat`, a
//! test, a simulation loop) decides when time passes.

use anima_core::{
    AnimaConfig, AnimaError, Clock, DriftReport, Event, Result, StateVector,
};
use anima_limbic::{text_similarity, LimbicSystem, SurpriseDetector};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::consolidation::{ConsolidationReport, PrunePolicy};
use crate::embedding::Embedder;
use crate::entry::{MemoryEntry, ScoredMemory};
use crate::index::MemoryIndex;
use crate::sqlite::SqliteMemory;
use crate::store::{MemoryStore, OrganismSnapshot, SNAPSHOT_VERSION};

/// The LLM collaborator. Opaque to the organism.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate_reply(
        &self,
        prompt: &str,
        memories: &[String],
        snapshot: &StateVector,
    ) -> anyhow::Result<String>;
}

/// Result of one conversational turn
#[derive(Debug, Clone)]
pub struct Turn {
    pub reply: String,
    /// Rendered memories handed to the generator.
    pub memories: Vec<String>,
    pub novel: bool,
    /// State after the turn, drift correction included.
    pub state: StateVector,
    pub drift: Option<DriftReport>,
    /// Id of the stored exchange, if it could be persisted.
    pub remembered: Option<u64>,
}

/// The previous recall, for repeated-query dampening.
#[derive(Debug, Clone)]
struct RecallTrace {
    query: String,
    ids: Vec<u64>,
}

pub struct Organism {
    config: AnimaConfig,
    limbic: Arc<LimbicSystem>,
    index: MemoryIndex,
    clock: Arc<dyn Clock>,
    store: Option<Arc<dyn MemoryStore>>,
    hydrated: AtomicBool,
    hydrate_lock: tokio::sync::Mutex<()>,
    last_recall: Mutex<Option<RecallTrace>>,
    surprise: Mutex<SurpriseDetector>,
}

impl Organism {
    /// In-memory organism with no persistence.
    pub fn new(
        config: AnimaConfig,
        embedder: Arc<dyn Embedder>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let limbic = Arc::new(LimbicSystem::new(&config)?);
        let index = MemoryIndex::new(config.memory.clone(), embedder)?;
        Ok(Self {
            config,
            limbic,
            index,
            clock,
            store: None,
            hydrated: AtomicBool::new(true),
            hydrate_lock: tokio::sync::Mutex::new(()),
            last_recall: Mutex::new(None),
            surprise: Mutex::new(SurpriseDetector::new()),
        })
    }

    /// Attach a persistence backend. Entries are loaded lazily on first use.
    pub fn with_store(mut self, store: Arc<dyn MemoryStore>) -> Self {
        self.store = Some(store);
        self.hydrated = AtomicBool::new(false);
        self
    }

    /// Open the SQLite database named in the config and restore from it.
    pub async fn open(
        config: AnimaConfig,
        embedder: Arc<dyn Embedder>,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let db = SqliteMemory::new(&config.organism.db_path).await?;
        let organism = Self::new(config, embedder, clock)?.with_store(Arc::new(db));
        organism.restore().await?;
        Ok(organism)
    }

    /// Reload the snapshot and every memory from the store. Returns whether
    /// a snapshot was found.
    pub async fn restore(&self) -> Result<bool> {
        let Some(store) = &self.store else {
            return Ok(false);
        };
        let snapshot = store.load_snapshot().await?;
        let found = snapshot.is_some();
        if let Some(snapshot) = snapshot {
            self.limbic.restore(snapshot.limbic);
            tracing::info!(
                "Restored organism saved at {} from {}",
                snapshot.saved_at,
                snapshot.store_location
            );
        } else {
            tracing::info!("No saved organism state, starting fresh");
        }

        let _guard = self.hydrate_lock.lock().await;
        let entries = store.load_entries().await?;
        self.index.hydrate(entries);
        self.hydrated.store(true, Ordering::SeqCst);
        Ok(found)
    }

    pub fn config(&self) -> &AnimaConfig {
        &self.config
    }

    pub fn limbic(&self) -> &Arc<LimbicSystem> {
        &self.limbic
    }

    pub fn index(&self) -> &MemoryIndex {
        &self.index
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    // =========================================================================
    // Simulation
    // =========================================================================

    pub fn tick(&self, dt: f32) -> Result<()> {
        self.limbic.tick(dt)
    }

    pub fn apply_event(&self, event: &Event) -> Result<()> {
        self.limbic.apply_event(event)
    }

    pub fn snapshot(&self) -> StateVector {
        self.limbic.snapshot()
    }

    // =========================================================================
    // Memory
    // =========================================================================

    /// Store `text` at the current time. With a store attached the entry is
    /// written first; a store failure propagates and the index is untouched.
    pub async fn remember(&self, text: &str, importance: f32) -> Result<Arc<MemoryEntry>> {
        self.ensure_hydrated().await?;
        let mut entry = self.index.prepare(text, self.clock.now(), importance)?;
        entry.emotion = Some(self.limbic.snapshot().emotion);
        if let Some(store) = &self.store {
            store.append(&entry).await?;
        }
        Ok(self.index.insert(entry))
    }

    /// Time-weighted retrieval at the current time.
    ///
    /// A query nearly identical to the previous one has the similarity of
    /// the previously returned entries damped, so the same memories do not
    /// keep resurfacing. Every surfaced entry is reinforced slightly. The
    /// current mood takes part when `emotion_weight` is nonzero.
    pub async fn recall(&self, query_text: &str, top_k: usize) -> Result<Vec<ScoredMemory>> {
        if let Err(e) = self.ensure_hydrated().await {
            if let AnimaError::StoreUnavailable(_) = e {
                tracing::warn!("Recall degraded to no memories: {}", e);
                return Ok(Vec::new());
            }
            return Err(e);
        }

        let damping = self.repeat_damping(query_text);
        let mood = self.limbic.snapshot().emotion;
        let results = self.index.retrieve_with(
            query_text,
            self.clock.now(),
            top_k,
            Some(&mood),
            |entry| match &damping {
                Some((factor, ids)) if ids.contains(&entry.id) => *factor,
                _ => 1.0,
            },
        )?;

        if let Ok(mut last) = self.last_recall.lock() {
            *last = Some(RecallTrace {
                query: query_text.to_string(),
                ids: results.iter().map(|s| s.entry.id).collect(),
            });
        }
        self.reinforce(&results).await;
        Ok(results)
    }

    /// `recall`, rendered as `[YYYY-MM-DD HH:MM:SS] text` lines.
    pub async fn recall_rendered(&self, query_text: &str, top_k: usize) -> Result<Vec<String>> {
        let offset = self.config.memory.timezone_offset_minutes;
        self.recall(query_text, top_k)
            .await?
            .iter()
            .map(|s| s.entry.render(offset))
            .collect()
    }

    /// Forget faded memories and enforce capacity. The store is pruned
    /// first; if that fails the index keeps every entry.
    pub async fn consolidate(&self) -> Result<ConsolidationReport> {
        self.ensure_hydrated().await?;
        let examined = self.index.len();
        let policy = PrunePolicy::from(&self.config.memory);
        let pruned = self.index.prunable(self.clock.now(), &policy);
        if let Some(store) = &self.store {
            store.delete(&pruned).await?;
        }
        self.index.remove(&pruned);
        let report = ConsolidationReport {
            examined,
            kept: self.index.len(),
            pruned,
        };
        tracing::info!(
            "Consolidation: examined {}, pruned {}, kept {}",
            report.examined,
            report.pruned.len(),
            report.kept
        );
        Ok(report)
    }

    // =========================================================================
    // Conversation
    // =========================================================================

    /// Run one turn: perceive, recall, generate, remember, settle.
    pub async fn respond(
        &self,
        user_text: &str,
        generator: &dyn ReplyGenerator,
    ) -> anyhow::Result<Turn> {
        if user_text.trim().is_empty() {
            return Err(AnimaError::invalid_input("message is empty").into());
        }

        self.limbic.apply_event(&Event::MessageReceived)?;
        let novel = self
            .surprise
            .lock()
            .map(|mut detector| detector.is_novel(user_text))
            .unwrap_or(false);
        if novel {
            self.limbic.apply_event(&Event::NovelTopic)?;
        }

        let memories = self
            .recall_rendered(user_text, self.config.memory.recall_top_k)
            .await?;
        let snapshot = self.limbic.snapshot();
        let prompt = build_prompt(&snapshot, &memories, user_text);

        let reply = generator
            .generate_reply(&prompt, &memories, &snapshot)
            .await?;

        let importance = snapshot.rapport.clamp(0.1, 1.0);
        let exchange = format!("User: {}\nMe: {}", user_text, reply);
        let remembered = match self.remember(&exchange, importance).await {
            Ok(entry) => Some(entry.id),
            Err(e) => {
                tracing::warn!("Turn not remembered: {}", e);
                None
            }
        };

        let drift = self
            .config
            .organism
            .correct_drift_per_turn
            .then(|| self.limbic.correct_drift());

        Ok(Turn {
            reply,
            memories,
            novel,
            state: self.limbic.snapshot(),
            drift,
            remembered,
        })
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    pub fn export_snapshot(&self) -> OrganismSnapshot {
        OrganismSnapshot {
            version: SNAPSHOT_VERSION,
            limbic: self.limbic.export(),
            store_location: self
                .store
                .as_ref()
                .map(|s| s.location())
                .unwrap_or_default(),
            saved_at: self.clock.now(),
        }
    }

    /// Save the snapshot document. Without a store this is a no-op.
    pub async fn persist(&self) -> Result<()> {
        let Some(store) = &self.store else {
            tracing::debug!("No store attached, skipping persist");
            return Ok(());
        };
        store.save_snapshot(&self.export_snapshot()).await
    }

    async fn ensure_hydrated(&self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        if self.hydrated.load(Ordering::SeqCst) {
            return Ok(());
        }
        let _guard = self.hydrate_lock.lock().await;
        if self.hydrated.load(Ordering::SeqCst) {
            return Ok(());
        }
        let entries = store.load_entries().await?;
        self.index.hydrate(entries);
        self.hydrated.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn repeat_damping(&self, query_text: &str) -> Option<(f32, Vec<u64>)> {
        let last = self.last_recall.lock().ok()?.clone()?;
        let jaccard = text_similarity(query_text, &last.query);
        if jaccard < self.config.memory.repeat_similarity {
            return None;
        }
        let factor = (1.0 - jaccard).max(0.05);
        tracing::debug!(
            "Repeated query (similarity {:.2}), damping {} previous hits by {:.2}",
            jaccard,
            last.ids.len(),
            factor
        );
        Some((factor, last.ids))
    }

    async fn reinforce(&self, results: &[ScoredMemory]) {
        let boost = self.config.memory.recall_boost;
        for hit in results {
            let Some(updated) = self.index.reinforce(hit.entry.id, boost) else {
                continue;
            };
            if let Some(store) = &self.store {
                if let Err(e) = store.record_access(&updated).await {
                    tracing::warn!("Reinforcement of memory {} not persisted: {}", updated.id, e);
                }
            }
        }
    }
}

/// Prompt handed to the reply generator.
pub fn build_prompt(state: &StateVector, memories: &[String], user_text: &str) -> String {
    let mut prompt = format!("[Internal state]\n{}\n", state.describe_for_context());
    if !memories.is_empty() {
        prompt.push_str("\n[Relevant memories]\n");
        for memory in memories {
            prompt.push_str("- ");
            prompt.push_str(memory);
            prompt.push('\n');
        }
    }
    prompt.push_str("\n[User]\n");
    prompt.push_str(user_text);
    prompt
}
