//! Storage backends for snapshot archives.
//!
//! [`StoreClient`] is the object-store capability set every backend offers:
//! buckets, flat keys with `/` separators, prefix listing and streamed
//! reads/writes. [`StoreAgent`] layers run bookkeeping on top and
//! [`layout`] maps trees onto archives.

pub mod agent;
pub mod archive;
pub mod http;
pub mod layout;
pub mod local;

pub use agent::StoreAgent;
pub use http::HttpStoreClient;
pub use local::LocalStoreClient;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use std::pin::Pin;
use tokio_util::io::ReaderStream;

use crate::utils::{AgentError, Result};

/// Streamed object body.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

#[async_trait]
pub trait StoreClient: Send + Sync {
    async fn list_bucket(&self) -> Result<Vec<String>>;

    /// Every key of the bucket starting with `prefix`, sorted.
    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>>;

    /// Distinct key prefixes up to the first `delimiter` after `prefix`,
    /// each including the delimiter.
    async fn list_common_prefix(&self, prefix: &str, delimiter: &str) -> Result<Vec<String>>;

    async fn create_bucket(&self, name: &str) -> Result<()>;

    /// Fails with [`AgentError::NotFound`] for an unknown key.
    async fn get_object(&self, key: &str) -> Result<ByteStream>;

    /// Store `body` under `key`, replacing any previous object.
    async fn put_stream(&self, key: &str, body: ByteStream) -> Result<()>;

    async fn upload_object(&self, key: &str, file: tokio::fs::File) -> Result<()> {
        self.put_stream(key, Box::pin(ReaderStream::new(file))).await
    }

    async fn health_check(&self) -> Result<()>;
}

/// Reject keys that could escape the bucket.
pub fn validate_key(key: &str) -> Result<()> {
    // Keys travel unencoded in plugin URL paths.
    let invalid = key.is_empty()
        || key.starts_with('/')
        || key.contains(['?', '#', '%'])
        || key.chars().any(char::is_control)
        || key.split('/').any(|part| part.is_empty() || part == "." || part == "..");
    if invalid {
        return Err(AgentError::Transfer(format!("invalid object key: {key:?}")));
    }
    Ok(())
}

/// Common prefixes of `keys` below `prefix`, S3 style.
pub fn common_prefixes<'a>(keys: impl IntoIterator<Item = &'a str>, prefix: &str, delimiter: &str) -> Vec<String> {
    let mut prefixes: Vec<String> = keys
        .into_iter()
        .filter_map(|key| {
            let rest = key.strip_prefix(prefix)?;
            let end = rest.find(delimiter)?;
            Some(format!("{prefix}{}", &rest[..end + delimiter.len()]))
        })
        .collect();
    prefixes.sort();
    prefixes.dedup();
    prefixes
}
