//! SQLite-backed vector store.
//!
//! Metadata lives in a single table; embeddings are f32 little-endian
//! blobs scored by brute-force cosine similarity in process. Rebuilds
//! run wipe-and-reinsert inside one transaction so a failure rolls back
//! to the previous collection.

use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::store::{ChunkRecord, SearchHit, VectorStore};
use crate::core::errors::ApiError;

pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    pub async fn open(db_path: PathBuf) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::internal)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                source TEXT NOT NULL DEFAULT '',
                page INTEGER,
                parent_content TEXT NOT NULL DEFAULT '',
                embedding BLOB,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        let denom = norm_a * norm_b;

        if denom <= f32::EPSILON {
            0.0
        } else {
            dot / denom
        }
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> ChunkRecord {
        ChunkRecord {
            id: row.get("id"),
            content: row.get("content"),
            source: row.get("source"),
            page: row.get::<Option<i64>, _>("page").map(|p| p as u32),
            parent_content: row.get("parent_content"),
        }
    }

    async fn insert_items(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        items: &[(ChunkRecord, Vec<f32>)],
    ) -> Result<(), sqlx::Error> {
        for (record, embedding) in items {
            let blob = Self::serialize_embedding(embedding);
            sqlx::query(
                "INSERT OR REPLACE INTO chunks (id, content, source, page, parent_content, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .bind(&record.id)
            .bind(&record.content)
            .bind(&record.source)
            .bind(record.page.map(|p| p as i64))
            .bind(&record.parent_content)
            .bind(&blob)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert_batch(&self, items: Vec<(ChunkRecord, Vec<f32>)>) -> Result<(), ApiError> {
        if items.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;
        Self::insert_items(&mut tx, &items)
            .await
            .map_err(ApiError::internal)?;
        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }

    async fn search(&self, query_embedding: &[f32], k: usize) -> Result<Vec<SearchHit>, ApiError> {
        let rows = sqlx::query(
            "SELECT id, content, source, page, parent_content, embedding FROM chunks",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let mut scored: Vec<SearchHit> = rows
            .iter()
            .filter_map(|row| {
                // The column is nullable; rows without a vector cannot
                // be scored and are left out.
                let embedding_bytes: Vec<u8> =
                    row.get::<Option<Vec<u8>>, _>("embedding")?;
                if embedding_bytes.is_empty() {
                    return None;
                }
                let stored = Self::deserialize_embedding(&embedding_bytes);
                Some(SearchHit {
                    record: Self::row_to_record(row),
                    score: Self::cosine_similarity(query_embedding, &stored),
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);

        Ok(scored)
    }

    async fn replace_all(&self, items: Vec<(ChunkRecord, Vec<f32>)>) -> Result<(), ApiError> {
        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        sqlx::query("DELETE FROM chunks")
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        Self::insert_items(&mut tx, &items)
            .await
            .map_err(ApiError::internal)?;

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }

    async fn delete_collection(&self) -> Result<(), ApiError> {
        sqlx::query("DELETE FROM chunks")
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        Ok(())
    }

    async fn count(&self) -> Result<usize, ApiError> {
        let count: i64 = sqlx::query("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await
            .map(|row| row.get(0))
            .map_err(ApiError::internal)?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, content: &str) -> ChunkRecord {
        ChunkRecord {
            id: id.to_string(),
            content: content.to_string(),
            source: "test.txt".to_string(),
            page: None,
            parent_content: format!("parent of {}", content),
        }
    }

    async fn open_temp() -> (tempfile::TempDir, SqliteVectorStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteVectorStore::open(dir.path().join("index.db"))
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn search_orders_by_similarity() {
        let (_dir, store) = open_temp().await;
        store
            .upsert_batch(vec![
                (record("a", "alpha"), vec![1.0, 0.0, 0.0]),
                (record("b", "bravo"), vec![0.0, 1.0, 0.0]),
                (record("c", "charlie"), vec![0.7, 0.7, 0.0]),
            ])
            .await
            .unwrap();

        let hits = store.search(&[1.0, 0.0, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].record.id, "a");
        assert_eq!(hits[1].record.id, "c");
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn empty_collection_searches_to_empty() {
        let (_dir, store) = open_temp().await;
        let hits = store.search(&[1.0, 0.0], 5).await.unwrap();
        assert!(hits.is_empty());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn replace_all_swaps_the_collection() {
        let (_dir, store) = open_temp().await;
        store
            .upsert_batch(vec![(record("old", "stale"), vec![1.0, 0.0])])
            .await
            .unwrap();

        store
            .replace_all(vec![
                (record("n1", "fresh one"), vec![1.0, 0.0]),
                (record("n2", "fresh two"), vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 2);
        let hits = store.search(&[1.0, 0.0], 10).await.unwrap();
        assert!(hits.iter().all(|h| h.record.id != "old"));
    }

    #[tokio::test]
    async fn delete_collection_empties_everything() {
        let (_dir, store) = open_temp().await;
        store
            .upsert_batch(vec![(record("a", "alpha"), vec![1.0])])
            .await
            .unwrap();

        store.delete_collection().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn rows_without_embeddings_are_skipped_not_fatal() {
        let (_dir, store) = open_temp().await;
        store
            .upsert_batch(vec![(record("scored", "has a vector"), vec![1.0, 0.0])])
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO chunks (id, content, source, parent_content, embedding) \
             VALUES ('bare', 'no vector', 'test.txt', '', NULL)",
        )
        .execute(&store.pool)
        .await
        .unwrap();

        assert_eq!(store.count().await.unwrap(), 2);
        let hits = store.search(&[1.0, 0.0], 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.id, "scored");
    }

    #[tokio::test]
    async fn round_trips_parent_lineage_and_page() {
        let (_dir, store) = open_temp().await;
        let mut rec = record("p", "child text");
        rec.page = Some(7);
        store
            .upsert_batch(vec![(rec, vec![0.5, 0.5])])
            .await
            .unwrap();

        let hits = store.search(&[0.5, 0.5], 1).await.unwrap();
        assert_eq!(hits[0].record.page, Some(7));
        assert_eq!(hits[0].record.parent_content, "parent of child text");
    }
}
