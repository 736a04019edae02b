use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let ready = state.service.ensure_ready().await.is_ok();
    Json(json!({
        "status": "ok",
        "index_ready": ready
    }))
}
