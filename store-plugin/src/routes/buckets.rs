use crate::error::AppError;
use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use snapshot_agent::storage::StoreClient;
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/buckets", get(list_buckets).post(create_bucket))
}

async fn list_buckets(State(state): State<Arc<AppState>>) -> Result<Json<Vec<String>>, AppError> {
    let buckets = state.store(None)?.list_bucket().await?;
    Ok(Json(buckets))
}

#[derive(Deserialize)]
struct CreateBucketBody {
    name: String,
}

async fn create_bucket(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateBucketBody>,
) -> Result<StatusCode, AppError> {
    state.store(Some(&body.name))?.create_bucket(&body.name).await?;
    tracing::info!(bucket = %body.name, "Bucket created");
    Ok(StatusCode::CREATED)
}
