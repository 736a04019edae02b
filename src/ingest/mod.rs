//! Document loading and index building.
//!
//! Walks the docs directory, extracts text per file, splits into
//! parent/child chunks, embeds the children and atomically replaces the
//! vector collection. A file that fails to load is logged and skipped;
//! the run continues over the rest.

pub mod chunk;
pub mod extract;

use std::path::Path;
use std::sync::Arc;

use walkdir::WalkDir;

use crate::core::errors::ApiError;
use crate::embedding::Embedder;
use crate::index::store::{ChunkRecord, VectorStore};

/// One loaded source file. Discarded after chunking.
#[derive(Debug, Clone)]
pub struct Document {
    /// File name (not the full path), used as the citation source.
    pub source: String,
    pub ext: String,
    pub text: String,
}

impl Document {
    /// Page-attributed views of the text. PDF extraction keeps form-feed
    /// page breaks; anything without them is a single unnumbered page.
    pub fn pages(&self) -> Vec<(Option<u32>, &str)> {
        if self.text.contains('\u{c}') {
            self.text
                .split('\u{c}')
                .enumerate()
                .map(|(i, page)| (Some(i as u32 + 1), page))
                .collect()
        } else {
            vec![(None, self.text.as_str())]
        }
    }
}

/// Scans `docs_dir` and loads every supported file. Unsupported
/// extensions are ignored without error; load failures are warned and
/// skipped.
pub fn load_documents(docs_dir: &Path) -> Vec<Document> {
    let mut documents = Vec::new();

    for entry in WalkDir::new(docs_dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        if !extract::is_supported(&ext) {
            continue;
        }

        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        match extract::extract_text(path, &ext) {
            Ok(text) => {
                tracing::info!("Loaded {}", source);
                documents.push(Document { source, ext, text });
            }
            Err(err) => {
                tracing::warn!("Skipping {}: {}", source, err);
            }
        }
    }

    documents
}

/// Chunk sizes and batch width for one ingestion run.
#[derive(Debug, Clone)]
pub struct IngestPipeline {
    embed_batch: usize,
}

impl IngestPipeline {
    pub fn new() -> Self {
        Self { embed_batch: 32 }
    }

    /// Full rebuild: chunk and embed every current document, then swap
    /// the collection in one shot. Returns the indexed child count.
    ///
    /// Embeddings are computed before any write so a mid-run failure
    /// leaves the previous collection untouched.
    pub async fn ingest(
        &self,
        docs_dir: &Path,
        store: &Arc<dyn VectorStore>,
        embedder: &Arc<dyn Embedder>,
    ) -> Result<usize, ApiError> {
        let documents = load_documents(docs_dir);
        if documents.is_empty() {
            tracing::warn!("No loadable documents under {}", docs_dir.display());
        }

        let mut children = Vec::new();
        for doc in &documents {
            for parent in chunk::split_document(doc) {
                children.extend(chunk::split_parent(&parent));
            }
        }
        tracing::info!(
            "Chunked {} documents into {} child chunks",
            documents.len(),
            children.len()
        );

        let mut items: Vec<(ChunkRecord, Vec<f32>)> = Vec::with_capacity(children.len());
        for batch in children.chunks(self.embed_batch.max(1)) {
            let inputs: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = embedder
                .embed(&inputs)
                .await
                .map_err(|e| ApiError::Rebuild(format!("embedding failed: {}", e)))?;
            if vectors.len() != batch.len() {
                return Err(ApiError::Rebuild(format!(
                    "embedding count mismatch: {} != {}",
                    vectors.len(),
                    batch.len()
                )));
            }
            for (child, vector) in batch.iter().zip(vectors) {
                items.push((
                    ChunkRecord {
                        id: child.id.clone(),
                        content: child.text.clone(),
                        source: child.source.clone(),
                        page: child.page,
                        parent_content: child.parent_content.clone(),
                    },
                    vector,
                ));
            }
        }

        let count = items.len();
        store
            .replace_all(items)
            .await
            .map_err(|e| ApiError::Rebuild(e.to_string()))?;

        tracing::info!("Indexed {} child chunks", count);
        Ok(count)
    }
}

impl Default for IngestPipeline {
    fn default() -> Self {
        Self::new()
    }
}
