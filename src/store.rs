//! Durable nearest-neighbor index over commit embeddings.
//!
//! One row per commit hash in `commit_embeddings`, holding the embedding as
//! a packed little-endian `f32` BLOB. Vectors arrive as `f64` and are
//! downcast on the way in; the full-precision copy lives only in the note
//! cache.
//!
//! Queries scan every row and rank by cosine distance in Rust. Rows are read
//! in `rowid` order and sorted stably, so equal distances keep storage order.

use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use crate::db;
use crate::embedding::{blob_to_vec, cosine_distance, vec_to_blob};
use crate::error::{Error, Result};
use crate::models::Match;

/// Path of the index file for one repository identity.
pub fn index_path(dir: &Path, repo_id: &Uuid) -> PathBuf {
    dir.join(format!("{}.sqlite", repo_id))
}

pub struct VectorIndex {
    pool: SqlitePool,
}

impl VectorIndex {
    /// Open the index for `repo_id` under `dir`, creating it if needed.
    pub async fn open(dir: &Path, repo_id: &Uuid) -> Result<Self> {
        let path = index_path(dir, repo_id);
        debug!(path = %path.display(), "opening vector index");
        let pool = db::connect(&path).await?;
        Self::with_pool(pool).await
    }

    /// A throwaway index that lives only as long as this value.
    pub async fn open_in_memory() -> Result<Self> {
        Self::with_pool(db::connect_in_memory().await?).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        let index = Self { pool };
        index.init().await?;
        Ok(index)
    }

    /// Create the schema. Safe to run any number of times.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS commit_embeddings (
                commit_hash TEXT PRIMARY KEY,
                embedding BLOB NOT NULL,
                indexed_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert or fully replace the vector stored under `key`.
    pub async fn upsert(&self, key: &str, vector: &[f64]) -> Result<()> {
        let blob = vec_to_blob(vector);
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO commit_embeddings (commit_hash, embedding, indexed_at)
            VALUES (?, ?, ?)
            ON CONFLICT(commit_hash) DO UPDATE SET
                embedding = excluded.embedding,
                indexed_at = excluded.indexed_at
            "#,
        )
        .bind(key)
        .bind(&blob)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// The `n` keys closest to `probe`, nearest first.
    ///
    /// The probe is downcast to `f32` like the stored rows. Returns fewer
    /// than `n` matches when the index is smaller, and an empty list for an
    /// empty index.
    pub async fn query(&self, probe: &[f64], n: usize) -> Result<Vec<Match>> {
        if n == 0 {
            return Ok(Vec::new());
        }

        let probe: Vec<f32> = probe.iter().map(|&v| v as f32).collect();

        let rows = sqlx::query("SELECT commit_hash, embedding FROM commit_embeddings ORDER BY rowid")
            .fetch_all(&self.pool)
            .await?;

        let mut matches = Vec::with_capacity(rows.len());
        for row in &rows {
            let key: String = row.get("commit_hash");
            let blob: Vec<u8> = row.get("embedding");
            let stored = decode_blob(&key, &blob)?;
            matches.push(Match {
                distance: cosine_distance(&probe, &stored),
                key,
            });
        }

        // `sort_by` is stable: ties stay in rowid order.
        matches.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(n);

        Ok(matches)
    }

    /// The stored (single-precision) vector for `key`, if any.
    pub async fn get(&self, key: &str) -> Result<Option<Vec<f32>>> {
        let row = sqlx::query("SELECT embedding FROM commit_embeddings WHERE commit_hash = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let blob: Vec<u8> = row.get("embedding");
                Ok(Some(decode_blob(key, &blob)?))
            }
            None => Ok(None),
        }
    }

    /// Number of indexed keys.
    pub async fn len(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM commit_embeddings")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

fn decode_blob(key: &str, blob: &[u8]) -> Result<Vec<f32>> {
    blob_to_vec(blob).ok_or_else(|| {
        Error::Store(format!(
            "corrupt embedding for {}: {} bytes is not a multiple of 4",
            key,
            blob.len()
        ))
    })
}
