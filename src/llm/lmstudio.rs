//! OpenAI-compatible chat client (LM Studio).
//!
//! Two clients with different timeout classes: routing calls are
//! non-streaming with a short deadline, generation streams under a
//! long one. A non-success status is fatal for that call; there is no
//! automatic retry.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::provider::{LlmProvider, StreamChunk};
use super::sse::{SseEvent, SseParser};
use super::types::ChatRequest;
use crate::core::errors::ApiError;

#[derive(Clone)]
pub struct LmStudioProvider {
    base_url: String,
    model: String,
    short_client: Client,
    long_client: Client,
}

impl LmStudioProvider {
    pub fn new(
        base_url: &str,
        model: &str,
        route_timeout: Duration,
        generate_timeout: Duration,
    ) -> Result<Self, ApiError> {
        // A client without its timeout would wedge the whole pipeline
        // on a stalled endpoint, so a builder failure is fatal here.
        let short_client = Client::builder()
            .timeout(route_timeout)
            .build()
            .map_err(ApiError::internal)?;
        let long_client = Client::builder()
            .timeout(generate_timeout)
            .build()
            .map_err(ApiError::internal)?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            short_client,
            long_client,
        })
    }

    fn body(&self, request: &ChatRequest, stream: bool) -> Value {
        json!({
            "model": self.model,
            "messages": request.messages,
            "temperature": request.temperature,
            "stream": stream,
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }
}

#[async_trait]
impl LlmProvider for LmStudioProvider {
    fn name(&self) -> &str {
        "lmstudio"
    }

    async fn chat(&self, request: ChatRequest) -> Result<String, ApiError> {
        let res = self
            .short_client
            .post(self.completions_url())
            .json(&self.body(&request, false))
            .send()
            .await
            .map_err(ApiError::generation)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Generation(format!(
                "chat endpoint returned {}: {}",
                status, text
            )));
        }

        let payload: Value = res.json().await.map_err(ApiError::generation)?;
        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        Ok(content)
    }

    async fn stream_chat(
        &self,
        request: ChatRequest,
    ) -> Result<mpsc::Receiver<Result<StreamChunk, ApiError>>, ApiError> {
        let res = self
            .long_client
            .post(self.completions_url())
            .json(&self.body(&request, true))
            .send()
            .await
            .map_err(ApiError::generation)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Generation(format!(
                "stream endpoint returned {}: {}",
                status, text
            )));
        }

        let (tx, rx) = mpsc::channel(32);
        let mut byte_stream = res.bytes_stream();

        tokio::spawn(async move {
            let mut parser = SseParser::new();

            while let Some(item) = byte_stream.next().await {
                match item {
                    Ok(bytes) => {
                        for event in parser.push(&bytes) {
                            let chunk = match event {
                                SseEvent::Delta(text) => StreamChunk::Delta(text),
                                SseEvent::Done => StreamChunk::Done,
                            };
                            let stop = chunk == StreamChunk::Done;
                            if tx.send(Ok(chunk)).await.is_err() {
                                return;
                            }
                            if stop {
                                return;
                            }
                        }
                    }
                    Err(err) => {
                        let _ = tx.send(Err(ApiError::generation(err))).await;
                        return;
                    }
                }
            }

            // Connection closed without the sentinel: flush any tail
            // but do not fabricate a Done.
            if let Some(SseEvent::Delta(text)) = parser.finish() {
                let _ = tx.send(Ok(StreamChunk::Delta(text))).await;
            }
            if parser.is_done() {
                let _ = tx.send(Ok(StreamChunk::Done)).await;
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_keeps_both_timeout_classes() {
        let provider = LmStudioProvider::new(
            "http://127.0.0.1:1234/",
            "local-model",
            Duration::from_secs(8),
            Duration::from_secs(120),
        )
        .unwrap();
        assert_eq!(provider.base_url, "http://127.0.0.1:1234");
        assert_eq!(provider.name(), "lmstudio");
    }
}
