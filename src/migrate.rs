//! Schema for persisted school indexes.
//!
//! One row per school in `school_indexes` describes the live index (model,
//! dimensionality, metric, chunking window); `index_chunks` holds its chunks
//! and vectors. Rebuilds replace a school's rows wholesale inside one
//! transaction, so there is no incremental update path. Columns added after
//! the first release are back-filled by [`add_column_if_missing`].

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    create_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Idempotently create every table and index.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS school_indexes (
            school_id TEXT PRIMARY KEY,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            metric TEXT NOT NULL,
            chunk_count INTEGER NOT NULL,
            corpus_hash TEXT NOT NULL,
            chunk_size INTEGER NOT NULL DEFAULT 0,
            chunk_overlap INTEGER NOT NULL DEFAULT 0,
            built_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_chunks (
            school_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            id TEXT NOT NULL,
            source TEXT NOT NULL,
            ordinal INTEGER NOT NULL,
            start_offset INTEGER NOT NULL,
            end_offset INTEGER NOT NULL,
            text TEXT NOT NULL,
            hash TEXT NOT NULL,
            vector BLOB NOT NULL,
            PRIMARY KEY (school_id, position),
            FOREIGN KEY (school_id) REFERENCES school_indexes(school_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_index_chunks_id ON index_chunks(id)")
        .execute(pool)
        .await?;

    // Databases created before the chunking window was recorded. A zero
    // window never matches a valid config, so those indexes are rebuilt.
    add_column_if_missing(pool, "school_indexes", "chunk_size", "INTEGER NOT NULL DEFAULT 0").await?;
    add_column_if_missing(pool, "school_indexes", "chunk_overlap", "INTEGER NOT NULL DEFAULT 0").await?;

    Ok(())
}

async fn add_column_if_missing(pool: &SqlitePool, table: &str, column: &str, decl: &str) -> Result<()> {
    let columns: Vec<String> = sqlx::query_scalar(&format!("SELECT name FROM pragma_table_info('{}')", table))
        .fetch_all(pool)
        .await?;
    if !columns.iter().any(|c| c == column) {
        sqlx::query(&format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, decl))
            .execute(pool)
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_schema_upgrades_older_database() {
        let tmp = TempDir::new().unwrap();
        let pool = db::connect_path(&tmp.path().join("philo.sqlite")).await.unwrap();
        sqlx::query(
            "CREATE TABLE school_indexes (school_id TEXT PRIMARY KEY, model TEXT NOT NULL, \
             dims INTEGER NOT NULL, metric TEXT NOT NULL, chunk_count INTEGER NOT NULL, \
             corpus_hash TEXT NOT NULL, built_at INTEGER NOT NULL)",
        )
        .execute(&pool)
        .await
        .unwrap();

        create_schema(&pool).await.unwrap();
        create_schema(&pool).await.unwrap();

        let columns: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info('school_indexes')")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert!(columns.iter().any(|c| c == "chunk_size"));
        assert!(columns.iter().any(|c| c == "chunk_overlap"));
    }
}
