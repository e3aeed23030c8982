use crate::entry::MemoryEntry;
use crate::store::{MemoryStore, OrganismSnapshot};
use anima_core::{AnimaError, EmotionVector, Result};
use anyhow::Context;
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;

/// Map a sqlx failure into the store error, keeping what was attempted.
fn unavailable(action: &'static str) -> impl FnOnce(sqlx::Error) -> AnimaError {
    move |e| AnimaError::store(format!("{}: {}", action, e))
}

#[derive(Clone)]
pub struct SqliteMemory {
    pool: Pool<Sqlite>,
    location: String,
}

impl SqliteMemory {
    /// Open (creating if needed) a database file. `":memory:"` opens a
    /// private in-memory database that lives as long as this handle.
    pub async fn new<P: AsRef<Path>>(db_path: P) -> anyhow::Result<Self> {
        let location = db_path.as_ref().display().to_string();
        let pool = if location == ":memory:" {
            // One connection that never idles out: each new connection
            // would be a fresh, empty database.
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect("sqlite::memory:")
                .await
                .context("Failed to open in-memory SQLite database")?
        } else {
            let db_url = format!("sqlite://{}?mode=rwc", location);
            SqlitePoolOptions::new()
                .connect(&db_url)
                .await
                .with_context(|| format!("Failed to connect to SQLite database at {}", location))?
        };

        let memory = Self { pool, location };
        memory.migrate().await?;
        tracing::debug!("SQLite memory opened at {}", memory.location);
        Ok(memory)
    }

    async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS memories (
                id INTEGER PRIMARY KEY,
                timestamp INTEGER NOT NULL,
                text TEXT NOT NULL,
                embedding BLOB NOT NULL,
                importance REAL NOT NULL,
                half_life REAL NOT NULL,
                emotion BLOB,
                access_count INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create memories table")?;

        // Databases created before emotion snapshots lack these columns.
        if let Err(e) = sqlx::query("ALTER TABLE memories ADD COLUMN emotion BLOB")
            .execute(&self.pool)
            .await
        {
            tracing::debug!("Column 'emotion' likely exists or migration skipped: {}", e);
        }
        if let Err(e) =
            sqlx::query("ALTER TABLE memories ADD COLUMN access_count INTEGER NOT NULL DEFAULT 0")
                .execute(&self.pool)
                .await
        {
            tracing::debug!("Column 'access_count' likely exists or migration skipped: {}", e);
        }

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_memories_timestamp ON memories(timestamp)")
            .execute(&self.pool)
            .await
            .context("Failed to create memories timestamp index")?;

        // Organism snapshot (singleton - only one row)
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS organism_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                state_json TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create organism_state table")?;

        Ok(())
    }

    /// Number of stored memories (for diagnostics / tests).
    pub async fn count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM memories")
            .fetch_one(&self.pool)
            .await
            .map_err(unavailable("Failed to count memories"))?;
        Ok(row.get("n"))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl MemoryStore for SqliteMemory {
    async fn append(&self, entry: &MemoryEntry) -> Result<()> {
        let blob = bincode::serialize(&entry.embedding)
            .map_err(|e| AnimaError::store(format!("Failed to serialize embedding: {}", e)))?;
        let emotion = entry
            .emotion
            .map(|emotion| bincode::serialize(&emotion.to_array()))
            .transpose()
            .map_err(|e| AnimaError::store(format!("Failed to serialize emotion: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO memories (id, timestamp, text, embedding, importance, half_life, emotion, access_count)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.id as i64)
        .bind(entry.timestamp)
        .bind(&entry.text)
        .bind(blob)
        .bind(entry.importance as f64)
        .bind(entry.half_life as f64)
        .bind(emotion)
        .bind(entry.access_count as i64)
        .execute(&self.pool)
        .await
        .map_err(unavailable("Failed to insert memory"))?;

        tracing::debug!("Memory {} persisted", entry.id);
        Ok(())
    }

    async fn load_entries(&self) -> Result<Vec<MemoryEntry>> {
        let rows = sqlx::query(
            "SELECT id, timestamp, text, embedding, importance, half_life, emotion, access_count \
             FROM memories ORDER BY timestamp ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable("Failed to load memories"))?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.get("id");
            let blob: Vec<u8> = row.get("embedding");
            let embedding = match bincode::deserialize::<Vec<f32>>(&blob) {
                Ok(embedding) => embedding,
                Err(e) => {
                    tracing::warn!("Skipping memory {} with unreadable embedding: {}", id, e);
                    continue;
                }
            };
            // An unreadable emotion only loses the mood, not the memory.
            let emotion_blob: Option<Vec<u8>> = row.get("emotion");
            let emotion = emotion_blob.and_then(|blob| {
                match bincode::deserialize::<[f32; 8]>(&blob) {
                    Ok(values) => Some(EmotionVector::from_array(values)),
                    Err(e) => {
                        tracing::warn!("Memory {} has an unreadable emotion: {}", id, e);
                        None
                    }
                }
            });
            let importance: f64 = row.get("importance");
            let half_life: f64 = row.get("half_life");
            let access_count: i64 = row.get("access_count");
            entries.push(MemoryEntry {
                id: id as u64,
                timestamp: row.get("timestamp"),
                text: row.get("text"),
                embedding,
                importance: importance as f32,
                half_life: half_life as f32,
                emotion,
                access_count: access_count.clamp(0, u32::MAX as i64) as u32,
            });
        }
        Ok(entries)
    }

    async fn record_access(&self, entry: &MemoryEntry) -> Result<()> {
        sqlx::query(
            "UPDATE memories SET importance = ?, half_life = ?, access_count = ? WHERE id = ?",
        )
        .bind(entry.importance.clamp(0.0, 1.0) as f64)
        .bind(entry.half_life as f64)
        .bind(entry.access_count as i64)
        .bind(entry.id as i64)
        .execute(&self.pool)
        .await
        .map_err(unavailable("Failed to record memory access"))?;
        Ok(())
    }

    async fn delete(&self, ids: &[u64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(unavailable("Failed to begin delete transaction"))?;
        let mut removed = 0;
        for id in ids {
            let result = sqlx::query("DELETE FROM memories WHERE id = ?")
                .bind(*id as i64)
                .execute(&mut *tx)
                .await
                .map_err(unavailable("Failed to delete memory"))?;
            removed += result.rows_affected();
        }
        tx.commit()
            .await
            .map_err(unavailable("Failed to commit delete transaction"))?;
        tracing::debug!("Deleted {} memories", removed);
        Ok(removed)
    }

    async fn save_snapshot(&self, snapshot: &OrganismSnapshot) -> Result<()> {
        let json = serde_json::to_string(snapshot)
            .map_err(|e| AnimaError::store(format!("Failed to serialize snapshot: {}", e)))?;

        sqlx::query(
            "INSERT INTO organism_state (id, state_json, updated_at) VALUES (1, ?, ?)
             ON CONFLICT(id) DO UPDATE SET state_json = excluded.state_json, updated_at = excluded.updated_at",
        )
        .bind(&json)
        .bind(snapshot.saved_at)
        .execute(&self.pool)
        .await
        .map_err(unavailable("Failed to save organism state"))?;

        tracing::debug!("Organism state saved");
        Ok(())
    }

    async fn load_snapshot(&self) -> Result<Option<OrganismSnapshot>> {
        let row = sqlx::query("SELECT state_json FROM organism_state WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable("Failed to query organism_state"))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let json: String = row.get("state_json");
        match serde_json::from_str::<OrganismSnapshot>(&json) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                // A snapshot from an incompatible build is not worth refusing to start over.
                tracing::warn!("Discarding unreadable organism snapshot: {}", e);
                Ok(None)
            }
        }
    }

    fn location(&self) -> String {
        self.location.clone()
    }
}
