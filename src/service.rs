//! Request pipeline: route → retrieve → assemble → generate → decode.
//!
//! `RagService` is constructed once with its collaborators and passed
//! by reference to handlers; it owns the rebuild gate that keeps
//! queries from observing a half-built collection. Only an exchange
//! whose stream reaches the termination sentinel is committed to
//! history, and only the answer segment — never the thought.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

use crate::context::{ContextAssembler, HISTORY_WINDOW};
use crate::core::config::Config;
use crate::core::errors::ApiError;
use crate::embedding::Embedder;
use crate::history::HistoryStore;
use crate::index::store::VectorStore;
use crate::ingest::IngestPipeline;
use crate::llm::provider::StreamChunk;
use crate::llm::{ChatRequest, LlmProvider, Role};
use crate::retrieval::{Reranker, RetrievalMode, Retriever};
use crate::routing::{Intent, IntentRouter};
use crate::stream::StreamDecoder;

/// One decoder-visible event on the outgoing stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// Incremental reasoning text, display-only.
    Thought(String),
    /// Incremental answer text.
    Answer(String),
    /// Terminal event carrying the full answer that was persisted.
    Done { answer: String },
    /// Terminal failure; nothing was persisted.
    Error(String),
}

pub struct RagService {
    provider: Arc<dyn LlmProvider>,
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    router: IntentRouter,
    retriever: Retriever,
    assembler: ContextAssembler,
    history: HistoryStore,
    docs_dir: PathBuf,
    temperature: f64,
    default_mode: RetrievalMode,
    /// Rebuild takes the write half; queries retrieve under the read
    /// half, so no query observes a mid-rebuild collection.
    rebuild_gate: RwLock<()>,
}

impl RagService {
    pub fn open(
        config: &Config,
        docs_dir: PathBuf,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        provider: Arc<dyn LlmProvider>,
        reranker: Option<Arc<dyn Reranker>>,
        history: HistoryStore,
    ) -> Self {
        let router = IntentRouter::new(provider.clone());
        let retriever = Retriever::new(store.clone(), embedder.clone(), reranker);
        let default_mode =
            RetrievalMode::parse(&config.retrieval.mode).unwrap_or(RetrievalMode::Flash);

        Self {
            provider,
            store,
            embedder,
            router,
            retriever,
            assembler: ContextAssembler::new(),
            history,
            docs_dir,
            temperature: config.llm.temperature,
            default_mode,
            rebuild_gate: RwLock::new(()),
        }
    }

    pub fn default_mode(&self) -> RetrievalMode {
        self.default_mode
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Startup check: an absent index is fatal for the session.
    pub async fn ensure_ready(&self) -> Result<(), ApiError> {
        let count = self.store.count().await?;
        if count == 0 {
            return Err(ApiError::Configuration(
                "the document index is empty; run `docent-backend ingest` first".to_string(),
            ));
        }
        tracing::info!("Index ready with {} chunks", count);
        Ok(())
    }

    /// Full rebuild, serialized against queries. All-or-nothing: on
    /// failure the previous collection is untouched and the error is
    /// authoritative.
    pub async fn rebuild(&self) -> Result<usize, ApiError> {
        let _gate = self.rebuild_gate.write().await;
        IngestPipeline::new()
            .ingest(&self.docs_dir, &self.store, &self.embedder)
            .await
    }

    /// Runs one user turn and returns the event stream. The exchange is
    /// committed to history only when the generation stream reaches its
    /// sentinel; dropping the receiver cancels without committing.
    pub async fn query(
        &self,
        session_id: &str,
        question: &str,
        mode: RetrievalMode,
    ) -> Result<mpsc::Receiver<ChatEvent>, ApiError> {
        let intent = self.router.classify(question).await;
        let history = self.history.recent(session_id, HISTORY_WINDOW).await?;

        let messages = match intent {
            Intent::Search => {
                let _gate = self.rebuild_gate.read().await;
                let hits = self.retriever.retrieve(question, mode).await?;
                tracing::info!(
                    "Retrieved {} chunks for session {} ({:?})",
                    hits.len(),
                    session_id,
                    mode
                );
                self.assembler.assemble(&hits, &history, question)
            }
            Intent::Chat => {
                tracing::info!("Routing session {} turn as chat-only", session_id);
                self.assembler.assemble_chat(&history, question)
            }
        };

        let request = ChatRequest::new(messages, self.temperature);
        let mut provider_rx = self.provider.stream_chat(request).await?;

        let (tx, rx) = mpsc::channel::<ChatEvent>(32);
        let history = self.history.clone();
        let session_id = session_id.to_string();
        let question = question.to_string();

        tokio::spawn(async move {
            let mut decoder = StreamDecoder::new();

            while let Some(item) = provider_rx.recv().await {
                match item {
                    Ok(StreamChunk::Delta(text)) => {
                        let delta = decoder.push(&text);
                        if !delta.thought.is_empty()
                            && tx.send(ChatEvent::Thought(delta.thought)).await.is_err()
                        {
                            return; // cancelled: do not commit
                        }
                        if !delta.answer.is_empty()
                            && tx.send(ChatEvent::Answer(delta.answer)).await.is_err()
                        {
                            return;
                        }
                    }
                    Ok(StreamChunk::Done) => {
                        let tail = decoder.flush();
                        if !tail.thought.is_empty()
                            && tx.send(ChatEvent::Thought(tail.thought)).await.is_err()
                        {
                            return;
                        }
                        if !tail.answer.is_empty()
                            && tx.send(ChatEvent::Answer(tail.answer)).await.is_err()
                        {
                            return;
                        }

                        let answer = decoder.answer();
                        if let Err(err) =
                            commit_exchange(&history, &session_id, &question, &answer).await
                        {
                            tracing::error!("Failed to persist exchange: {}", err);
                        }
                        let _ = tx.send(ChatEvent::Done { answer }).await;
                        return;
                    }
                    Err(err) => {
                        tracing::warn!("Generation stream failed: {}", err);
                        let _ = tx.send(ChatEvent::Error(err.to_string())).await;
                        return;
                    }
                }
            }

            // Source closed without the sentinel: surface, do not commit.
            let _ = tx
                .send(ChatEvent::Error(
                    "generation stream ended without completing".to_string(),
                ))
                .await;
        });

        Ok(rx)
    }

    /// Explicit shutdown hook; pools close when the service drops.
    pub async fn close(self) {
        tracing::info!("RAG service shut down");
    }
}

async fn commit_exchange(
    history: &HistoryStore,
    session_id: &str,
    question: &str,
    answer: &str,
) -> Result<(), ApiError> {
    history.append(session_id, Role::User, question).await?;
    history.append(session_id, Role::Assistant, answer).await?;
    Ok(())
}
