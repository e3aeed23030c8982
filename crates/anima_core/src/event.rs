//! Discrete events the kernel feeds into the simulation.

use crate::error::{AnimaError, Result};
use crate::state::Emotion;
use serde::{Deserialize, Serialize};

/// Closed set of event kinds. Each variant carries only what it needs.
///
/// On the wire events are tagged by `kind`, e.g.
/// `{"kind": "stimulus", "channel": "joy", "magnitude": 0.4}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    Rest,
    MessageReceived,
    Stimulus { channel: Emotion, magnitude: f32 },
    IdleTimeout,
    UserDeparted,
    PositiveInteraction,
    NegativeInteraction,
    NovelTopic,
}

impl Event {
    /// Parse a tagged JSON event. Unknown kinds and malformed payloads are
    /// rejected rather than guessed at.
    pub fn from_json(raw: &str) -> Result<Self> {
        let event: Event = serde_json::from_str(raw)
            .map_err(|e| AnimaError::invalid_input(format!("malformed event: {}", e)))?;
        event.validate()?;
        Ok(event)
    }

    pub fn stimulus(channel: Emotion, magnitude: f32) -> Self {
        Event::Stimulus { channel, magnitude }
    }

    pub fn validate(&self) -> Result<()> {
        if let Event::Stimulus { channel, magnitude } = self {
            if !magnitude.is_finite() || magnitude.abs() > 1.0 {
                return Err(AnimaError::invalid_input(format!(
                    "stimulus magnitude for {} must be finite and within [-1, 1], got {}",
                    channel, magnitude
                )));
            }
        }
        Ok(())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Event::Rest => "rest",
            Event::MessageReceived => "message_received",
            Event::Stimulus { .. } => "stimulus",
            Event::IdleTimeout => "idle_timeout",
            Event::UserDeparted => "user_departed",
            Event::PositiveInteraction => "positive_interaction",
            Event::NegativeInteraction => "negative_interaction",
            Event::NovelTopic => "novel_topic",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tagged_events() {
        assert_eq!(Event::from_json(r#"{"kind":"rest"}"#).unwrap(), Event::Rest);
        assert_eq!(
            Event::from_json(r#"{"kind":"stimulus","channel":"fear","magnitude":0.4}"#).unwrap(),
            Event::stimulus(Emotion::Fear, 0.4)
        );
        assert_eq!(
            Event::from_json(r#"{"kind":"novel_topic"}"#).unwrap().kind(),
            "novel_topic"
        );
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let err = Event::from_json(r#"{"kind":"telepathy"}"#).unwrap_err();
        assert!(matches!(err, AnimaError::InvalidInput(_)));
    }

    #[test]
    fn test_malformed_stimulus_rejected() {
        assert!(Event::from_json(r#"{"kind":"stimulus","channel":"joy"}"#).is_err());
        assert!(Event::from_json(r#"{"kind":"stimulus","channel":"glee","magnitude":0.1}"#).is_err());
        assert!(Event::from_json(r#"{"kind":"stimulus","channel":"joy","magnitude":3.0}"#).is_err());
        assert!(Event::stimulus(Emotion::Joy, f32::NAN).validate().is_err());
        assert!(Event::stimulus(Emotion::Joy, -1.0).validate().is_ok());
    }

    #[test]
    fn test_serialization_uses_kind_tag() {
        let json = serde_json::to_string(&Event::stimulus(Emotion::Anger, 0.5)).unwrap();
        assert!(json.contains(r#""kind":"stimulus""#), "got {}", json);
        assert!(json.contains(r#""channel":"anger""#), "got {}", json);
    }
}
