use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::stream::{self, Stream};
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::retrieval::RetrievalMode;
use crate::service::ChatEvent;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequestBody {
    pub question: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
}

/// Streams one exchange as server-sent events: `thought` and `answer`
/// deltas, then exactly one of `done` or `error`.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ChatRequestBody>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let question = body.question.trim().to_string();
    if question.is_empty() {
        return Err(ApiError::BadRequest(
            "question must not be empty".to_string(),
        ));
    }

    let session_id = body
        .session_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| "default".to_string());

    let mode = match body.mode.as_deref() {
        Some(raw) => RetrievalMode::parse(raw)
            .ok_or_else(|| ApiError::BadRequest(format!("unknown retrieval mode: {}", raw)))?,
        None => state.service.default_mode(),
    };

    state.service.ensure_ready().await?;
    let rx = state.service.query(&session_id, &question, mode).await?;

    let events = stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        Some((Ok(to_sse_event(event)), rx))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn to_sse_event(event: ChatEvent) -> Event {
    match event {
        ChatEvent::Thought(text) => Event::default().event("thought").data(text),
        ChatEvent::Answer(text) => Event::default().event("answer").data(text),
        ChatEvent::Done { answer } => Event::default()
            .event("done")
            .data(json!({ "answer": answer }).to_string()),
        ChatEvent::Error(message) => Event::default()
            .event("error")
            .data(json!({ "error": message }).to_string()),
    }
}
