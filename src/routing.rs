//! Intent classification: does this question need retrieval at all.
//!
//! One deterministic, non-streaming call with a single-token persona.
//! Retrieval is the fail-safe path: any transport error, timeout or
//! unparseable output routes to Search.

use std::sync::Arc;

use crate::llm::{ChatMessage, ChatRequest, LlmProvider};
use crate::stream::strip_reasoning;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// The question references the document collection; retrieve.
    Search,
    /// Small talk or general knowledge; answer directly.
    Chat,
}

const ROUTER_PERSONA: &str = "You are a routing classifier for a document question-answering \
system. Decide whether the user's message requires searching the private document collection. \
Reply with exactly one word: SEARCH if the documents must be consulted, CHAT if the message is \
small talk or can be answered without them. Output nothing else.";

pub struct IntentRouter {
    provider: Arc<dyn LlmProvider>,
}

impl IntentRouter {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    pub async fn classify(&self, question: &str) -> Intent {
        let request = ChatRequest::new(
            vec![
                ChatMessage::system(ROUTER_PERSONA),
                ChatMessage::user(question),
            ],
            0.0,
        );

        match self.provider.chat(request).await {
            Ok(raw) => Self::parse(&raw),
            Err(err) => {
                tracing::warn!("Intent classification failed, defaulting to search: {}", err);
                Intent::Search
            }
        }
    }

    /// Strips any reasoning block, case-folds, and looks for the CHAT
    /// marker. Everything else is Search.
    fn parse(raw: &str) -> Intent {
        let residual = strip_reasoning(raw);
        if residual.trim().to_lowercase().contains("chat") {
            Intent::Chat
        } else {
            Intent::Search
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use crate::core::errors::ApiError;
    use crate::llm::provider::StreamChunk;

    /// Deterministic classifier stub: flags obvious small talk as CHAT,
    /// everything else as SEARCH, mimicking the temperature-0 call.
    struct StubClassifier;

    #[async_trait]
    impl LlmProvider for StubClassifier {
        fn name(&self) -> &str {
            "stub"
        }

        async fn chat(&self, request: ChatRequest) -> Result<String, ApiError> {
            let question = request
                .messages
                .last()
                .map(|m| m.content.to_lowercase())
                .unwrap_or_default();
            let greeting = ["hi", "hello", "how are you", "thanks"]
                .iter()
                .any(|g| question.contains(g));
            if greeting {
                Ok("<think>This is just a greeting.</think>CHAT".to_string())
            } else {
                Ok("SEARCH".to_string())
            }
        }

        async fn stream_chat(
            &self,
            _request: ChatRequest,
        ) -> Result<mpsc::Receiver<Result<StreamChunk, ApiError>>, ApiError> {
            unimplemented!("router never streams")
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl LlmProvider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        async fn chat(&self, _request: ChatRequest) -> Result<String, ApiError> {
            Err(ApiError::Generation("connection refused".to_string()))
        }

        async fn stream_chat(
            &self,
            _request: ChatRequest,
        ) -> Result<mpsc::Receiver<Result<StreamChunk, ApiError>>, ApiError> {
            unimplemented!("router never streams")
        }
    }

    #[tokio::test]
    async fn greeting_routes_to_chat() {
        let router = IntentRouter::new(Arc::new(StubClassifier));
        let intent = router.classify("Hi there, how are you?").await;
        assert_eq!(intent, Intent::Chat);
    }

    #[tokio::test]
    async fn document_question_routes_to_search() {
        let router = IntentRouter::new(Arc::new(StubClassifier));
        let intent = router
            .classify("What does section 3 of the contract say about termination?")
            .await;
        assert_eq!(intent, Intent::Search);
    }

    #[tokio::test]
    async fn classifier_failure_fails_open_to_search() {
        let router = IntentRouter::new(Arc::new(FailingProvider));
        let intent = router.classify("Hi there!").await;
        assert_eq!(intent, Intent::Search);
    }

    #[test]
    fn parse_handles_reasoning_and_case() {
        assert_eq!(IntentRouter::parse("<think>hm</think> Chat"), Intent::Chat);
        assert_eq!(IntentRouter::parse("CHAT."), Intent::Chat);
        assert_eq!(IntentRouter::parse("SEARCH"), Intent::Search);
        assert_eq!(IntentRouter::parse("garbage output"), Intent::Search);
        assert_eq!(IntentRouter::parse(""), Intent::Search);
    }
}
