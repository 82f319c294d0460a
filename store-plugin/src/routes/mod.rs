pub mod buckets;
pub mod health;
pub mod objects;

use crate::error::AppError;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .merge(buckets::router())
        .merge(objects::router())
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .merge(health::router())
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn require_token(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Result<Response, AppError> {
    if let Some(expected) = &state.config.token {
        let provided = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if provided != Some(expected.as_str()) {
            return Err(AppError::Unauthorized);
        }
    }
    Ok(next.run(request).await)
}


#[cfg(test)]
mod tests {
    use super::test_support::{app, empty};
    use axum::http::{Request, StatusCode};
    use bytes::Bytes;
    use futures_util::TryStreamExt;
    use snapshot_agent::storage::{ByteStream, HttpStoreClient, StoreAgent, StoreClient};
    use snapshot_agent::tree::TreeKind;
    use snapshot_agent::AgentError;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_token_guards_object_routes_but_not_health() {
        let temp_dir = TempDir::new().unwrap();
        let app = app(&temp_dir, Some("s3cret"));

        let denied = app
            .clone()
            .oneshot(Request::get("/objects?prefix=").body(empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

        let allowed = app
            .clone()
            .oneshot(
                Request::get("/objects?prefix=")
                    .header("authorization", "Bearer s3cret")
                    .body(empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);

        let health = app.oneshot(Request::get("/health").body(empty()).unwrap()).await.unwrap();
        assert_eq!(health.status(), StatusCode::OK);
    }

    async fn serve(temp_dir: &TempDir, token: &str) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = app(temp_dir, Some(token));
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_http_store_client_against_plugin() {
        let temp_dir = TempDir::new().unwrap();
        let url = serve(&temp_dir, "s3cret").await;
        let client = HttpStoreClient::new(&url, "snapshots", Some("s3cret".to_string()));

        client.health_check().await.unwrap();
        let body: ByteStream = Box::pin(futures_util::stream::iter(vec![
            Ok(Bytes::from_static(b"json ")),
            Ok(Bytes::from_static(b"archive")),
        ]));
        client.put_stream("prod-eu/backup/nightly/json.archive", body).await.unwrap();

        let stream = client.get_object("prod-eu/backup/nightly/json.archive").await.unwrap();
        let chunks: Vec<Bytes> = stream.try_collect().await.unwrap();
        assert_eq!(chunks.concat(), b"json archive");

        assert_eq!(
            client.list_objects("prod-eu/").await.unwrap(),
            vec!["prod-eu/backup/nightly/json.archive"]
        );
        assert_eq!(
            client.list_common_prefix("prod-eu/backup/", "/").await.unwrap(),
            vec!["prod-eu/backup/nightly/"]
        );
        assert_eq!(client.list_bucket().await.unwrap(), vec!["snapshots"]);

        let missing = client.get_object("prod-eu/backup/weekly/json.archive").await.err().unwrap();
        assert!(matches!(missing, AgentError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_store_agent_round_trip_over_http() {
        let temp_dir = TempDir::new().unwrap();
        let url = serve(&temp_dir, "s3cret").await;
        let store = StoreAgent::new(Arc::new(HttpStoreClient::new(&url, "snapshots", Some("s3cret".to_string()))));

        let local = temp_dir.path().join("upload.archive");
        std::fs::write(&local, b"yaml archive").unwrap();
        store.upload(&local, "prod-eu/backup/weekly/yaml.archive").await.unwrap();

        let fetched = temp_dir.path().join("fetched.archive");
        store.download("prod-eu/backup/weekly/yaml.archive", &fetched).await.unwrap();
        assert_eq!(std::fs::read(&fetched).unwrap(), b"yaml archive");
        assert_eq!(store.list_runs("prod-eu", TreeKind::Backup).await.unwrap(), vec!["weekly"]);
    }

    #[tokio::test]
    async fn test_http_store_client_with_wrong_token() {
        let temp_dir = TempDir::new().unwrap();
        let url = serve(&temp_dir, "s3cret").await;
        let client = HttpStoreClient::new(&url, "snapshots", Some("guess".to_string()));

        let err = client.list_objects("").await.err().unwrap();
        assert!(matches!(err, AgentError::Config(_)));
        client.health_check().await.unwrap();
    }
}
