use crate::entry::MemoryEntry;
use anima_core::Result;
use anima_limbic::LimbicSnapshot;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const SNAPSHOT_VERSION: u32 = 1;

/// Everything persisted about a running organism except the memories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganismSnapshot {
    #[serde(default)]
    pub version: u32,
    pub limbic: LimbicSnapshot,
    /// Where the memory entries live, for diagnostics.
    #[serde(default)]
    pub store_location: String,
    /// Unix seconds.
    pub saved_at: i64,
}

/// Durable backend for memories and the organism snapshot.
///
/// Every failure surfaces as `StoreUnavailable`; callers decide whether to
/// degrade or propagate.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn append(&self, entry: &MemoryEntry) -> Result<()>;

    /// All entries, oldest first.
    async fn load_entries(&self) -> Result<Vec<MemoryEntry>>;

    /// Persist a recall's effect on an entry: importance, half-life and
    /// access count.
    async fn record_access(&self, entry: &MemoryEntry) -> Result<()>;

    /// Returns how many rows were removed.
    async fn delete(&self, ids: &[u64]) -> Result<u64>;

    async fn save_snapshot(&self, snapshot: &OrganismSnapshot) -> Result<()>;

    async fn load_snapshot(&self) -> Result<Option<OrganismSnapshot>>;

    fn location(&self) -> String;
}
