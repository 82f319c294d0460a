use crate::error::AppError;
use crate::state::AppState;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use snapshot_agent::storage::StoreClient;
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}

/// Healthy while the default bucket exists.
async fn health(State(state): State<Arc<AppState>>) -> Result<Json<Value>, AppError> {
    let store = state.store(None)?;
    store
        .health_check()
        .await
        .map_err(|e| AppError::ServiceUnavailable(e.to_string()))?;
    Ok(Json(json!({ "status": "ok", "bucket": store.bucket() })))
}
