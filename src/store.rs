//! SQLite persistence for built school indexes.
//!
//! An index is saved together with the embedding model that produced it so
//! it can be reloaded later without re-embedding. Saving replaces the
//! school's previous rows inside a single transaction: a concurrent reader
//! of the database sees the old index or the new one, never a mix.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use thiserror::Error;

use philosophy_rag_core::chunk::ChunkConfig;
use philosophy_rag_core::embedding::{blob_to_vec, vec_to_blob};
use philosophy_rag_core::index::{IndexedChunk, KnowledgeIndex, Metric};
use philosophy_rag_core::models::Chunk;

use crate::config::Config;
use crate::db;
use crate::migrate;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("stored index for school '{school}' is corrupt: {reason}")]
    Corrupt { school: String, reason: String },
}

/// Summary row describing one persisted index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexRecord {
    pub school_id: String,
    pub model: String,
    pub dims: usize,
    pub metric: String,
    pub chunk_count: usize,
    pub corpus_hash: String,
    /// Chunking window the index was built with; zero when unknown.
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub built_at: DateTime<Utc>,
}

impl IndexRecord {
    /// Whether chunks in this index were cut with `chunking`.
    pub fn chunked_with(&self, chunking: ChunkConfig) -> bool {
        self.chunk_size == chunking.chunk_size() && self.chunk_overlap == chunking.overlap()
    }
}

#[derive(Clone)]
pub struct IndexStore {
    pool: SqlitePool,
}

impl IndexStore {
    /// Connect to the configured database and ensure the schema exists.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::create_schema(&pool).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Replace the persisted index of `index.school_id()`.
    pub async fn save(&self, index: &KnowledgeIndex, corpus_hash: &str, chunking: ChunkConfig) -> Result<()> {
        let school_id = index.school_id();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM index_chunks WHERE school_id = ?")
            .bind(school_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM school_indexes WHERE school_id = ?")
            .bind(school_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO school_indexes
                (school_id, model, dims, metric, chunk_count, corpus_hash, chunk_size, chunk_overlap, built_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(school_id)
        .bind(index.model())
        .bind(index.dims() as i64)
        .bind(index.metric().as_str())
        .bind(index.len() as i64)
        .bind(corpus_hash)
        .bind(chunking.chunk_size() as i64)
        .bind(chunking.overlap() as i64)
        .bind(index.built_at().timestamp_millis())
        .execute(&mut *tx)
        .await?;

        for (position, entry) in index.entries().iter().enumerate() {
            let c = &entry.chunk;
            sqlx::query(
                r#"
                INSERT INTO index_chunks
                    (school_id, position, id, source, ordinal, start_offset, end_offset, text, hash, vector)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(school_id)
            .bind(position as i64)
            .bind(&c.id)
            .bind(&c.source)
            .bind(c.ordinal as i64)
            .bind(c.start as i64)
            .bind(c.end as i64)
            .bind(&c.text)
            .bind(&c.hash)
            .bind(vec_to_blob(&entry.vector))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Load a school's persisted index, or `None` if it was never built.
    pub async fn load(&self, school_id: &str) -> Result<Option<KnowledgeIndex>> {
        let Some(record) = self.record(school_id).await? else {
            return Ok(None);
        };

        let rows = sqlx::query(
            r#"
            SELECT id, source, ordinal, start_offset, end_offset, text, hash, vector
            FROM index_chunks
            WHERE school_id = ?
            ORDER BY position ASC
            "#,
        )
        .bind(school_id)
        .fetch_all(&self.pool)
        .await?;

        if rows.len() != record.chunk_count {
            return Err(StoreError::Corrupt {
                school: school_id.to_string(),
                reason: format!("expected {} chunks, found {}", record.chunk_count, rows.len()),
            }
            .into());
        }

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let blob: Vec<u8> = row.get("vector");
            let vector = blob_to_vec(&blob);
            if vector.len() != record.dims {
                return Err(StoreError::Corrupt {
                    school: school_id.to_string(),
                    reason: format!("vector has {} dims, index declares {}", vector.len(), record.dims),
                }
                .into());
            }
            let ordinal: i64 = row.get("ordinal");
            let start: i64 = row.get("start_offset");
            let end: i64 = row.get("end_offset");
            entries.push(IndexedChunk {
                chunk: Chunk {
                    id: row.get("id"),
                    school_id: school_id.to_string(),
                    source: row.get("source"),
                    ordinal: ordinal as usize,
                    start: start as usize,
                    end: end as usize,
                    text: row.get("text"),
                    hash: row.get("hash"),
                },
                vector,
            });
        }

        let metric: Metric = record.metric.parse()?;
        let index = KnowledgeIndex::from_parts(school_id, &record.model, metric, entries, record.built_at)?;
        Ok(Some(index))
    }

    pub async fn record(&self, school_id: &str) -> Result<Option<IndexRecord>> {
        let row = sqlx::query(
            "SELECT school_id, model, dims, metric, chunk_count, corpus_hash, chunk_size, chunk_overlap, built_at \
             FROM school_indexes WHERE school_id = ?",
        )
        .bind(school_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| record_from_row(&r)))
    }

    /// Every persisted index, ordered by school id.
    pub async fn list(&self) -> Result<Vec<IndexRecord>> {
        let rows = sqlx::query(
            "SELECT school_id, model, dims, metric, chunk_count, corpus_hash, chunk_size, chunk_overlap, built_at \
             FROM school_indexes ORDER BY school_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(record_from_row).collect())
    }
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> IndexRecord {
    let dims: i64 = row.get("dims");
    let chunk_count: i64 = row.get("chunk_count");
    let chunk_size: i64 = row.get("chunk_size");
    let chunk_overlap: i64 = row.get("chunk_overlap");
    let built_at: i64 = row.get("built_at");
    IndexRecord {
        school_id: row.get("school_id"),
        model: row.get("model"),
        dims: dims as usize,
        metric: row.get("metric"),
        chunk_count: chunk_count as usize,
        corpus_hash: row.get("corpus_hash"),
        chunk_size: chunk_size as usize,
        chunk_overlap: chunk_overlap as usize,
        built_at: DateTime::<Utc>::from_timestamp_millis(built_at).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use philosophy_rag_core::chunk::{ChunkConfig, Chunker};
    use philosophy_rag_core::embedding::HashingEmbedder;
    use tempfile::TempDir;

    async fn store(tmp: &TempDir) -> IndexStore {
        let pool = db::connect_path(&tmp.path().join("philo.sqlite")).await.unwrap();
        migrate::create_schema(&pool).await.unwrap();
        IndexStore::from_pool(pool)
    }

    fn window() -> ChunkConfig {
        ChunkConfig::new(20, 5).unwrap()
    }

    async fn index(school: &str, text: &str) -> KnowledgeIndex {
        let chunks: Vec<Chunk> = Chunker::new(window())
            .chunk_document(school, "a.txt", text)
            .collect();
        KnowledgeIndex::build(school, chunks, &HashingEmbedder::new(32), Metric::Cosine)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_save_then_load_preserves_order_and_vectors() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp).await;
        let built = index("stoicism", "Memento mori. Amor fati. Premeditatio malorum.").await;
        store.save(&built, "abc", window()).await.unwrap();

        let loaded = store.load("stoicism").await.unwrap().unwrap();
        assert_eq!(loaded.len(), built.len());
        assert_eq!(loaded.model(), "hashing-32");
        assert_eq!(loaded.entries(), built.entries());
        assert!(store.load("nihilism").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_replaces_previous_index() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp).await;
        store
            .save(&index("stoicism", &"long text about virtue ".repeat(10)).await, "v1", window())
            .await
            .unwrap();
        store.save(&index("stoicism", "short").await, "v2", window()).await.unwrap();
        store
            .save(&index("nihilism", "God is dead").await, "n1", ChunkConfig::new(200, 0).unwrap())
            .await
            .unwrap();

        let records = store.list().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].school_id, "stoicism");
        assert_eq!(records[1].chunk_count, 1);
        assert_eq!(records[1].corpus_hash, "v2");
        assert!(records[1].chunked_with(window()));
        assert_eq!((records[0].chunk_size, records[0].chunk_overlap), (200, 0));
        assert!(!records[0].chunked_with(window()));
        assert_eq!(store.load("stoicism").await.unwrap().unwrap().len(), 1);
    }
}
