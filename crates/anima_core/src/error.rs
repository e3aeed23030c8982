//! Error taxonomy shared by every anima crate.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnimaError {
    /// Malformed event payload, non-finite number or unusable timestamp.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A gain, weight or bound that is non-finite or destabilizes the system.
    #[error("Configuration out of range: {0}")]
    OutOfRangeConfig(String),

    #[error("Memory store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Embedding failed: {0}")]
    EmbeddingFailure(String),
}

pub type Result<T> = std::result::Result<T, AnimaError>;

impl AnimaError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::OutOfRangeConfig(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::EmbeddingFailure(msg.into())
    }

    /// Boundary failures the kernel may choose to degrade around.
    pub fn is_boundary(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::EmbeddingFailure(_))
    }
}

/// Reject non-finite values or values outside `[lo, hi]` as a configuration error.
pub(crate) fn ensure_range(name: &str, value: f32, lo: f32, hi: f32) -> Result<()> {
    if !value.is_finite() || value < lo || value > hi {
        return Err(AnimaError::config(format!(
            "{} must be within [{}, {}], got {}",
            name, lo, hi, value
        )));
    }
    Ok(())
}

pub(crate) fn ensure_non_negative(name: &str, value: f32) -> Result<()> {
    ensure_range(name, value, 0.0, f32::MAX)
}
