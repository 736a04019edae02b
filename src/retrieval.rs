//! Two-tier dense retrieval with optional cross-encoder reranking.
//!
//! Flash is a single similarity search. Pro widens the candidate pool
//! and re-scores every (question, chunk) pair; if the reranker is
//! missing or failing, pro degrades to flash's behavior and the caller
//! cannot tell the difference structurally.

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::errors::ApiError;
use crate::embedding::Embedder;
use crate::index::store::{SearchHit, VectorStore};

/// Results returned to the assembler per query.
pub const RETRIEVAL_TOP_K: usize = 5;
/// Candidate pool handed to the reranker in pro mode.
pub const RERANK_CANDIDATES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalMode {
    /// Single dense search, k = 5.
    Flash,
    /// Dense search k = 20, rerank, keep the top 5.
    Pro,
}

impl RetrievalMode {
    pub fn parse(value: &str) -> Option<RetrievalMode> {
        match value {
            "flash" => Some(RetrievalMode::Flash),
            "pro" => Some(RetrievalMode::Pro),
            _ => None,
        }
    }
}

/// Joint relevance scoring of a query against a candidate batch, one
/// score per document in input order. Higher is better. Optional
/// capability: retrieval works without it.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn score_batch(
        &self,
        query: &str,
        documents: &[String],
    ) -> Result<Vec<f32>, ApiError>;
}

/// Reranker backed by the embedding capability: one embedding call per
/// pass (query plus every candidate), scored by cosine similarity.
/// Cheaper than a true cross-encoder but the same shape of capability.
pub struct EmbeddingReranker {
    embedder: Arc<dyn Embedder>,
}

impl EmbeddingReranker {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }
}

#[async_trait]
impl Reranker for EmbeddingReranker {
    async fn score_batch(
        &self,
        query: &str,
        documents: &[String],
    ) -> Result<Vec<f32>, ApiError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let mut inputs = Vec::with_capacity(documents.len() + 1);
        inputs.push(query.to_string());
        inputs.extend_from_slice(documents);

        let mut vectors = self.embedder.embed(&inputs).await?;
        if vectors.len() != documents.len() + 1 {
            return Err(ApiError::Internal(format!(
                "reranker expected {} embeddings, got {}",
                documents.len() + 1,
                vectors.len()
            )));
        }

        let query_vector = vectors.remove(0);
        Ok(vectors
            .iter()
            .map(|doc_vector| cosine(&query_vector, doc_vector))
            .collect())
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
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

pub struct Retriever {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    reranker: Option<Arc<dyn Reranker>>,
}

impl Retriever {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        reranker: Option<Arc<dyn Reranker>>,
    ) -> Self {
        Self {
            store,
            embedder,
            reranker,
        }
    }

    /// Ordered matches for a question; an empty index yields an empty
    /// list, never an error.
    pub async fn retrieve(
        &self,
        question: &str,
        mode: RetrievalMode,
    ) -> Result<Vec<SearchHit>, ApiError> {
        let query_embedding = self
            .embedder
            .embed(&[question.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::Internal("embedder returned no vector".to_string()))?;

        match (mode, &self.reranker) {
            (RetrievalMode::Pro, Some(reranker)) => {
                let candidates = self
                    .store
                    .search(&query_embedding, RERANK_CANDIDATES)
                    .await?;
                self.rerank(question, candidates, reranker.clone()).await
            }
            _ => self.store.search(&query_embedding, RETRIEVAL_TOP_K).await,
        }
    }

    /// Scores every candidate against the question and keeps the best
    /// five. A reranker failure degrades to the similarity order
    /// instead of failing the request.
    async fn rerank(
        &self,
        question: &str,
        candidates: Vec<SearchHit>,
        reranker: Arc<dyn Reranker>,
    ) -> Result<Vec<SearchHit>, ApiError> {
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let contents: Vec<String> = candidates
            .iter()
            .map(|hit| hit.record.content.clone())
            .collect();
        let scores = match reranker.score_batch(question, &contents).await {
            Ok(scores) if scores.len() == candidates.len() => scores,
            Ok(scores) => {
                tracing::debug!(
                    "Reranker returned {} scores for {} candidates, falling back to similarity",
                    scores.len(),
                    candidates.len()
                );
                let mut fallback = candidates;
                fallback.truncate(RETRIEVAL_TOP_K);
                return Ok(fallback);
            }
            Err(err) => {
                tracing::debug!("Rerank unavailable, falling back to similarity: {}", err);
                let mut fallback = candidates;
                fallback.truncate(RETRIEVAL_TOP_K);
                return Ok(fallback);
            }
        };

        let mut rescored: Vec<SearchHit> = candidates
            .into_iter()
            .zip(scores)
            .map(|(hit, score)| SearchHit {
                record: hit.record,
                score,
            })
            .collect();

        // Stable sort: ties keep their dense-retrieval order.
        rescored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        rescored.truncate(RETRIEVAL_TOP_K);
        Ok(rescored)
    }
}
