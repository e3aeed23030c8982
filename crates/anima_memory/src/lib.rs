pub mod consolidation;
pub mod coordinator;
pub mod embedding;
pub mod entry;
pub mod index;
pub mod sqlite;
pub mod store;

pub use consolidation::{retention_score, ConsolidationReport, PrunePolicy};
pub use coordinator::{build_prompt, Organism, ReplyGenerator, Turn};
#[cfg(feature = "fastembed")]
pub use embedding::FastEmbedder;
pub use embedding::{cosine_similarity, Embedder, Embedding, HashingEmbedder};
pub use entry::{MemoryEntry, ScoredMemory};
pub use index::MemoryIndex;
pub use sqlite::SqliteMemory;
pub use store::{MemoryStore, OrganismSnapshot};
