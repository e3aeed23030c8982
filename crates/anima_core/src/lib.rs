//! Numeric core of the anima affect engine.
//!
//! Everything in this crate is synchronous and free of I/O: a bounded
//! [`StateVector`], the engines that evolve it, and the semantic field that
//! pulls it back toward the persona core. Scheduling, publication and
//! persistence live in `anima_limbic` and `anima_memory`.

pub mod clock;
pub mod config;
pub mod drives;
pub mod emotion;
pub mod endocrine;
pub mod error;
pub mod event;
pub mod field;
pub mod pid;
pub mod state;

pub use clock::{format_timestamp, Clock, ManualClock, SystemClock};
pub use config::{AnimaConfig, MemoryConfig, OrganismConfig};
pub use drives::{DriveConfig, DriveEngine, DriveMemory};
pub use emotion::{EmotionConfig, EmotionEngine, EmotionMemory, InteractionMatrix, Stimulus};
pub use endocrine::{EndocrineConfig, Neurochemistry};
pub use error::{AnimaError, Result};
pub use event::Event;
pub use field::{DriftReport, SemanticField, SemanticFieldConfig};
pub use pid::{PidAccumulators, PidConfig, PidController};
pub use state::{marginal_delta, Emotion, EmotionVector, StateVector};

/// A component that evolves part of the [`StateVector`].
///
/// `tick` is called on a fixed schedule with the elapsed seconds; a
/// non-positive or non-finite `dt` must leave state and engine untouched.
/// `apply_event` reacts to one discrete event. An invalid event returns
/// `InvalidInput` and changes nothing.
pub trait Dynamics {
    fn tick(&mut self, state: &mut StateVector, dt: f32);

    fn apply_event(&mut self, state: &mut StateVector, event: &Event) -> Result<()>;
}
