//! # Anima limbic system
//!
//! The kernel-owned context around the numeric core:
//!
//! - [`LimbicSystem`] owns the state vector and both engines, applies ticks
//!   and events under a single writer and publishes every result atomically.
//! - [`Heartbeat`] is the explicit scheduler that feeds it elapsed time.
//! - [`SurpriseDetector`] flags messages that change the topic.

mod heartbeat;
mod surprise;
mod system;

pub use heartbeat::{Heartbeat, HeartbeatConfig, IdleTracker};
pub use surprise::{text_similarity, SurpriseDetector};
pub use system::{BehaviorThresholds, LimbicSnapshot, LimbicSystem};
