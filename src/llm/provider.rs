use async_trait::async_trait;
use tokio::sync::mpsc;

use super::types::ChatRequest;
use crate::core::errors::ApiError;

/// One incremental unit from a streaming completion.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// A `choices[0].delta.content` fragment, arbitrary size.
    Delta(String),
    /// The `[DONE]` sentinel. Guaranteed to be the last event on a
    /// stream that terminates normally.
    Done,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Non-streaming completion. Used by intent classification with a
    /// short timeout.
    async fn chat(&self, request: ChatRequest) -> Result<String, ApiError>;

    /// Streaming completion; the receiver yields deltas in arrival
    /// order and ends with `Done` on normal termination. A non-success
    /// HTTP status fails the call itself, not the stream.
    async fn stream_chat(
        &self,
        request: ChatRequest,
    ) -> Result<mpsc::Receiver<Result<StreamChunk, ApiError>>, ApiError>;
}
