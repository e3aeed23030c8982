use anima_core::{AnimaError, Result};

pub type Embedding = Vec<f32>;

/// Turns text into a fixed-length vector. Implementations must be
/// deterministic for a given model.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Embedding>;
}

/// Deterministic feature-hashing embedder.
///
/// Lowercased ASCII words hash into signed buckets; every non-ASCII
/// alphabetic character (CJK and the like) is its own token, since those
/// scripts do not separate words with spaces. The result is L2-normalized,
/// or all zeros when the text has no tokens.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(AnimaError::config("embedding dimension must be at least 1"));
        }
        Ok(Self { dimension })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self { dimension: 256 }
    }
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding> {
        let mut v = vec![0.0f32; self.dimension];
        for token in tokenize(text) {
            let h = fnv1a(token.as_bytes());
            let bucket = (h % self.dimension as u64) as usize;
            let sign = if (h >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(v)
    }
}

fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            word.push(c);
            continue;
        }
        if !word.is_empty() {
            tokens.push(std::mem::take(&mut word));
        }
        if c.is_alphanumeric() {
            tokens.push(c.to_string());
        }
    }
    if !word.is_empty() {
        tokens.push(word);
    }
    tokens
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

#[cfg(feature = "fastembed")]
pub use fast::FastEmbedder;

#[cfg(feature = "fastembed")]
mod fast {
    use super::{Embedder, Embedding};
    use anima_core::{AnimaError, Result};
    use fastembed::{EmbeddingModel as FastEmbedModel, InitOptions, TextEmbedding};
    use std::sync::Arc;

    /// Local ONNX sentence embeddings via fastembed.
    #[derive(Clone)]
    pub struct FastEmbedder {
        model: Arc<TextEmbedding>,
    }

    impl FastEmbedder {
        pub fn new() -> anyhow::Result<Self> {
            // Multilingual so mixed Chinese/English conversations embed sensibly.
            let mut options = InitOptions::default();
            options.model_name = FastEmbedModel::MultilingualE5Small;
            options.show_download_progress = true;

            let model = TextEmbedding::try_new(options)?;
            Ok(Self {
                model: Arc::new(model),
            })
        }
    }

    impl Embedder for FastEmbedder {
        fn embed(&self, text: &str) -> Result<Embedding> {
            let embeddings = self
                .model
                .embed(vec![text], None)
                .map_err(|e| AnimaError::embedding(e.to_string()))?;
            embeddings
                .into_iter()
                .next()
                .ok_or_else(|| AnimaError::embedding("model returned no embedding"))
        }
    }
}

/// Calculate cosine similarity between two vectors
/// Returns a value between -1.0 and 1.0 (1.0 = identical direction)
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot_product / (norm_a * norm_b)).clamp(-1.0, 1.0)
}
