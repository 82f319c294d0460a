use async_trait::async_trait;
use futures_util::TryStreamExt;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::debug;

use super::{validate_key, ByteStream, StoreClient};
use crate::transfer::ProgressStream;
use crate::utils::{AgentError, Result};

/// Client for the `store-plugin` HTTP API.
#[derive(Debug, Clone)]
pub struct HttpStoreClient {
    client: Client,
    base_url: String,
    bucket: String,
    token: Option<String>,
}

#[derive(serde::Serialize)]
struct CreateBucket<'a> {
    name: &'a str,
}

impl HttpStoreClient {
    pub fn new(base_url: impl Into<String>, bucket: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            token: token.filter(|t| !t.is_empty()),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        let response = self.authorized(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::NOT_FOUND => Err(AgentError::NotFound(what.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(AgentError::Config(format!("storage plugin refused {what}: {status}")))
            }
            _ => Err(AgentError::Transfer(format!("{what} failed with {status}: {body}"))),
        }
    }
}

#[async_trait]
impl StoreClient for HttpStoreClient {
    async fn list_bucket(&self) -> Result<Vec<String>> {
        let response = self.send(self.client.get(self.url("/buckets")), "list buckets").await?;
        Ok(response.json().await?)
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>> {
        let request = self
            .client
            .get(self.url("/objects"))
            .query(&[("bucket", self.bucket.as_str()), ("prefix", prefix)]);
        let response = self.send(request, "list objects").await?;
        Ok(response.json().await?)
    }

    async fn list_common_prefix(&self, prefix: &str, delimiter: &str) -> Result<Vec<String>> {
        let request = self.client.get(self.url("/prefixes")).query(&[
            ("bucket", self.bucket.as_str()),
            ("prefix", prefix),
            ("delimiter", delimiter),
        ]);
        let response = self.send(request, "list prefixes").await?;
        Ok(response.json().await?)
    }

    async fn create_bucket(&self, name: &str) -> Result<()> {
        let request = self.client.post(self.url("/buckets")).json(&CreateBucket { name });
        self.send(request, "create bucket").await?;
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<ByteStream> {
        validate_key(key)?;
        let request = self
            .client
            .get(self.url(&format!("/objects/{key}")))
            .query(&[("bucket", self.bucket.as_str())]);
        let response = self.send(request, &format!("object {key}")).await?;
        Ok(Box::pin(response.bytes_stream().map_err(std::io::Error::other)))
    }

    async fn put_stream(&self, key: &str, body: ByteStream) -> Result<()> {
        validate_key(key)?;
        let log_key = key.to_string();
        let progress = ProgressStream::new(
            body,
            Arc::new(move |bytes: u64| debug!(key = %log_key, bytes, "Uploading")),
        );
        let counter = progress.counter();

        let request = self
            .client
            .put(self.url(&format!("/objects/{key}")))
            .query(&[("bucket", self.bucket.as_str())])
            .header("content-type", "application/octet-stream")
            .body(reqwest::Body::wrap_stream(progress));
        self.send(request, &format!("upload {key}")).await?;

        debug!(key = %key, bytes = counter.load(Ordering::Relaxed), "Upload finished");
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        self.send(self.client.get(self.url("/health")), "health check")
            .await
            .map_err(|e| AgentError::Config(format!("storage plugin unhealthy: {e}")))?;
        Ok(())
    }
}
