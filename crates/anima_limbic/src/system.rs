//! The limbic system: single writer over the agent's affect state.
//!
//! Every tick and event is serialized under one mutex, run through the drive
//! engine and then the emotion engine, and the resulting `StateVector` is
//! published twice:
//! - an `ArcSwap` for lock-free `snapshot()` reads
//! - a `watch` channel for subscribers that want change notification

use anima_core::{
    AnimaConfig, AnimaError, DriftReport, DriveEngine, DriveMemory, Dynamics, EmotionEngine,
    EmotionMemory, Event, Neurochemistry, OrganismConfig, Result, SemanticField, StateVector,
};
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

/// Everything needed to resume the simulation where it left off.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LimbicSnapshot {
    pub state: StateVector,
    pub drives: DriveMemory,
    pub emotions: EmotionMemory,
}

/// Proactive-trigger thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BehaviorThresholds {
    pub social: f32,
    pub tired: f32,
    pub stressed: f32,
}

impl From<&OrganismConfig> for BehaviorThresholds {
    fn from(config: &OrganismConfig) -> Self {
        Self {
            social: config.social_threshold,
            tired: config.tired_threshold,
            stressed: config.stressed_threshold,
        }
    }
}

struct LimbicCore {
    state: StateVector,
    drives: DriveEngine,
    emotions: EmotionEngine,
}

pub struct LimbicSystem {
    core: Mutex<LimbicCore>,
    field: SemanticField,
    published: ArcSwap<StateVector>,
    state_watch_tx: watch::Sender<StateVector>,
    thresholds: BehaviorThresholds,
}

impl LimbicSystem {
    /// Build from a full configuration. Every section the limbic system uses
    /// is validated here; nothing is checked again at runtime.
    pub fn new(config: &AnimaConfig) -> Result<Self> {
        config.organism.validate()?;
        let drives = DriveEngine::new(config.drives.clone())?;
        let emotions = EmotionEngine::new(config.emotion.clone(), config.endocrine.clone())?;
        let mut state = StateVector::default();
        state.emotion = *emotions.baseline();
        let field = SemanticField::anchored_at(config.field.clone(), &state)?;
        let (state_watch_tx, _) = watch::channel(state);

        Ok(Self {
            core: Mutex::new(LimbicCore {
                state,
                drives,
                emotions,
            }),
            field,
            published: ArcSwap::from_pointee(state),
            state_watch_tx,
            thresholds: BehaviorThresholds::from(&config.organism),
        })
    }

    /// Advance both engines by `dt` seconds.
    pub fn tick(&self, dt: f32) -> Result<()> {
        if !dt.is_finite() {
            return Err(AnimaError::invalid_input(format!("tick dt must be finite, got {}", dt)));
        }
        if dt <= 0.0 {
            tracing::debug!("Ignoring tick with dt={}", dt);
            return Ok(());
        }
        let mut core = self.lock();
        let LimbicCore {
            state,
            drives,
            emotions,
        } = &mut *core;
        drives.tick(state, dt);
        emotions.tick(state, dt);
        self.publish(*state);
        Ok(())
    }

    /// Apply one event. Validation happens before either engine sees it, so
    /// a rejected event changes nothing.
    pub fn apply_event(&self, event: &Event) -> Result<()> {
        event.validate()?;
        let mut core = self.lock();
        let LimbicCore {
            state,
            drives,
            emotions,
        } = &mut *core;
        drives.apply_event(state, event)?;
        emotions.apply_event(state, event)?;
        self.publish(*state);
        tracing::debug!("Applied event {}", event.kind());
        Ok(())
    }

    /// Latest published state. Never blocks on the writer.
    pub fn snapshot(&self) -> StateVector {
        **self.published.load()
    }

    pub fn subscribe(&self) -> watch::Receiver<StateVector> {
        self.state_watch_tx.subscribe()
    }

    /// One semantic-field correction step on the live state.
    pub fn correct_drift(&self) -> DriftReport {
        let mut core = self.lock();
        let report = self.field.correct_drift(&mut core.state);
        self.publish(core.state);
        report
    }

    pub fn field(&self) -> &SemanticField {
        &self.field
    }

    pub fn export(&self) -> LimbicSnapshot {
        let core = self.lock();
        LimbicSnapshot {
            state: core.state,
            drives: core.drives.memory(),
            emotions: core.emotions.memory(),
        }
    }

    /// Replace state and engine memory with a persisted snapshot. The state
    /// is sanitized on the way in.
    pub fn restore(&self, snapshot: LimbicSnapshot) {
        let mut core = self.lock();
        let mut state = snapshot.state;
        state.normalize();
        core.state = state;
        core.drives.restore(snapshot.drives);
        core.emotions.restore(snapshot.emotions);
        self.publish(state);
        tracing::info!(
            "Limbic state restored (energy={:.2}, rapport={:.2})",
            state.energy,
            state.rapport
        );
    }

    pub fn seconds_since_interaction(&self) -> f64 {
        self.lock().drives.seconds_since_interaction()
    }

    pub fn conversation_intensity(&self) -> f32 {
        self.lock().drives.conversation_intensity()
    }

    pub fn neurochemistry(&self) -> Neurochemistry {
        self.lock().emotions.neurochemistry()
    }

    pub fn thresholds(&self) -> BehaviorThresholds {
        self.thresholds
    }

    /// Check if the system wants company (proactivity trigger)
    pub fn needs_social_interaction(&self) -> bool {
        self.snapshot().social_hunger > self.thresholds.social
    }

    /// Check if energy is low (may need rest)
    pub fn is_tired(&self) -> bool {
        self.snapshot().energy < self.thresholds.tired
    }

    /// Check if internal disorder is high (may need calming)
    pub fn is_stressed(&self) -> bool {
        self.snapshot().entropy > self.thresholds.stressed
    }

    fn publish(&self, state: StateVector) {
        self.published.store(Arc::new(state));
        self.state_watch_tx.send_replace(state);
    }

    fn lock(&self) -> MutexGuard<'_, LimbicCore> {
        // A panic inside an engine leaves plain numbers behind; the next
        // tick normalizes them.
        self.core.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
