//! Novelty detection over the recent conversation.
//!
//! Each message is compared with the last few messages using character-bigram
//! Jaccard similarity. A message unlike everything recent is novel; the
//! running baseline tracks how surprising the conversation usually is.

use std::collections::{HashSet, VecDeque};

/// Character-bigram Jaccard similarity in `[0, 1]`.
///
/// Text is lowercased and whitespace runs collapse to a single space, so
/// spacing and case do not matter. Strings shorter than two characters
/// compare by their single character.
pub fn text_similarity(a: &str, b: &str) -> f32 {
    let a = bigrams(a);
    let b = bigrams(b);
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(&b).count() as f32;
    let union = a.union(&b).count() as f32;
    if union == 0.0 {
        return 0.0;
    }
    intersection / union
}

fn bigrams(text: &str) -> HashSet<(char, char)> {
    let normalized: Vec<char> = text
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .collect();
    match normalized.len() {
        0 => HashSet::new(),
        1 => std::iter::once((normalized[0], normalized[0])).collect(),
        _ => normalized.windows(2).map(|w| (w[0], w[1])).collect(),
    }
}

/// Surprise detector using a simple prediction-error model
#[derive(Debug, Clone)]
pub struct SurpriseDetector {
    /// Last N messages for context
    history: VecDeque<String>,
    max_history: usize,
    /// How many recent messages a new one is compared against.
    window: usize,
    /// Running average of surprise scores
    baseline: f32,
    smoothing_factor: f32,
    novelty_threshold: f32,
}

impl SurpriseDetector {
    pub fn new() -> Self {
        Self::with_threshold(0.8)
    }

    pub fn with_threshold(novelty_threshold: f32) -> Self {
        Self {
            history: VecDeque::with_capacity(10),
            max_history: 10,
            window: 3,
            baseline: 0.3,
            smoothing_factor: 0.2,
            novelty_threshold: novelty_threshold.clamp(0.0, 1.0),
        }
    }

    /// Surprise of `content` against recent history, in `[0, 1]`
    /// (0 = repeats something just said, 1 = shares nothing with it).
    /// The message is then added to history.
    pub fn compute_surprise(&mut self, content: &str) -> f32 {
        let surprise = if self.history.is_empty() {
            // Default mild surprise for the first message
            0.3
        } else {
            let closest = self
                .history
                .iter()
                .rev()
                .take(self.window)
                .map(|past| text_similarity(content, past))
                .fold(0.0f32, f32::max);
            1.0 - closest
        };

        self.baseline =
            self.baseline * (1.0 - self.smoothing_factor) + surprise * self.smoothing_factor;

        if self.history.len() >= self.max_history {
            self.history.pop_front();
        }
        self.history.push_back(content.to_string());

        surprise
    }

    /// Score `content` and report whether it counts as a new topic.
    pub fn is_novel(&mut self, content: &str) -> bool {
        let surprise = self.compute_surprise(content);
        let novel = surprise >= self.novelty_threshold;
        tracing::trace!(
            "Surprise {:.2} (baseline {:.2}), novel={}",
            surprise,
            self.baseline,
            novel
        );
        novel
    }

    pub fn baseline(&self) -> f32 {
        self.baseline
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}

impl Default for SurpriseDetector {
    fn default() -> Self {
        Self::new()
    }
}
