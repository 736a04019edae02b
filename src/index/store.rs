//! VectorStore trait — abstract interface over the vector collection.
//!
//! The pipeline only needs dense similarity search, wholesale
//! replacement for rebuilds, and a count for startup checks. There is
//! deliberately no partial-delete API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;

/// A persisted child chunk with its parent lineage attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    /// The child span text (the unit of embedding and search).
    pub content: String,
    /// Source file name for citations.
    pub source: String,
    pub page: Option<u32>,
    /// Verbatim text of the parent span. Empty on legacy records.
    pub parent_content: String,
}

/// One scored match from a similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub record: ChunkRecord,
    /// Similarity or rerank score; higher is better.
    pub score: f32,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or overwrite records with their embeddings.
    async fn upsert_batch(&self, items: Vec<(ChunkRecord, Vec<f32>)>) -> Result<(), ApiError>;

    /// Top-k records by cosine similarity to the query embedding,
    /// ordered best first. An empty collection returns an empty list.
    async fn search(&self, query_embedding: &[f32], k: usize) -> Result<Vec<SearchHit>, ApiError>;

    /// Atomically replace the whole collection: either every record in
    /// `items` is visible afterwards or the previous contents survive.
    async fn replace_all(&self, items: Vec<(ChunkRecord, Vec<f32>)>) -> Result<(), ApiError>;

    /// Logical wipe of the collection.
    async fn delete_collection(&self) -> Result<(), ApiError>;

    async fn count(&self) -> Result<usize, ApiError>;
}
