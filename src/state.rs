use std::sync::Arc;
use std::time::Duration;

use crate::core::config::{AppPaths, Config};
use crate::core::errors::ApiError;
use crate::embedding::LmStudioEmbedder;
use crate::history::HistoryStore;
use crate::index::sqlite::SqliteVectorStore;
use crate::llm::LmStudioProvider;
use crate::retrieval::{EmbeddingReranker, Reranker};
use crate::service::RagService;

/// Shared application state, built once at startup.
pub struct AppState {
    pub config: Config,
    pub paths: AppPaths,
    pub service: RagService,
}

impl AppState {
    pub async fn initialize(config: Config, paths: AppPaths) -> Result<Arc<AppState>, ApiError> {
        std::fs::create_dir_all(&paths.data_dir)
            .map_err(|err| ApiError::internal(format!("failed to create data dir: {}", err)))?;
        std::fs::create_dir_all(&paths.docs_dir)
            .map_err(|err| ApiError::internal(format!("failed to create docs dir: {}", err)))?;

        let store = Arc::new(SqliteVectorStore::open(paths.index_db_path.clone()).await?);
        let history = HistoryStore::open(paths.history_db_path.clone()).await?;

        let embedder = Arc::new(LmStudioEmbedder::new(
            &config.llm.base_url,
            &config.llm.embedding_model,
        )?);
        let provider = Arc::new(LmStudioProvider::new(
            &config.llm.base_url,
            &config.llm.model,
            Duration::from_secs(config.llm.route_timeout_secs),
            Duration::from_secs(config.llm.generate_timeout_secs),
        )?);

        let reranker: Option<Arc<dyn Reranker>> = if config.retrieval.rerank {
            Some(Arc::new(EmbeddingReranker::new(embedder.clone())))
        } else {
            None
        };

        let service = RagService::open(
            &config,
            paths.docs_dir.clone(),
            store,
            embedder,
            provider,
            reranker,
            history,
        );

        Ok(Arc::new(AppState {
            config,
            paths,
            service,
        }))
    }
}
