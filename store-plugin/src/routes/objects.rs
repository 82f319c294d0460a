use crate::error::AppError;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::TryStreamExt;
use serde::Deserialize;
use snapshot_agent::storage::StoreClient;
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/objects", get(list_objects))
        .route("/objects/{*key}", get(get_object).put(put_object))
        .route("/prefixes", get(list_prefixes))
}

#[derive(Deserialize)]
struct BucketQuery {
    bucket: Option<String>,
}

#[derive(Deserialize)]
struct ListQuery {
    bucket: Option<String>,
    #[serde(default)]
    prefix: String,
}

#[derive(Deserialize)]
struct PrefixQuery {
    bucket: Option<String>,
    #[serde(default)]
    prefix: String,
    #[serde(default = "default_delimiter")]
    delimiter: String,
}

fn default_delimiter() -> String {
    "/".to_string()
}

async fn list_objects(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<String>>, AppError> {
    let keys = state.store(query.bucket.as_deref())?.list_objects(&query.prefix).await?;
    Ok(Json(keys))
}

async fn list_prefixes(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PrefixQuery>,
) -> Result<Json<Vec<String>>, AppError> {
    if query.delimiter.is_empty() {
        return Err(AppError::BadRequest("delimiter must not be empty".into()));
    }
    let prefixes = state
        .store(query.bucket.as_deref())?
        .list_common_prefix(&query.prefix, &query.delimiter)
        .await?;
    Ok(Json(prefixes))
}

async fn get_object(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(query): Query<BucketQuery>,
) -> Result<Response, AppError> {
    let body = state.store(query.bucket.as_deref())?.get_object(&key).await?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], Body::from_stream(body)).into_response())
}

async fn put_object(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(query): Query<BucketQuery>,
    body: Body,
) -> Result<StatusCode, AppError> {
    let stream = body.into_data_stream().map_err(std::io::Error::other);
    state
        .store(query.bucket.as_deref())?
        .put_stream(&key, Box::pin(stream))
        .await?;
    tracing::debug!(key = %key, "Object stored");
    Ok(StatusCode::CREATED)
}
