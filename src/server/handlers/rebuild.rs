use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

/// Drops the current index and re-ingests the document directory.
/// Queries in flight finish against the old collection first.
pub async fn rebuild(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let chunks = state.service.rebuild().await?;
    tracing::info!("Index rebuilt with {} chunks", chunks);
    Ok(Json(json!({
        "status": "ok",
        "indexed": chunks
    })))
}
