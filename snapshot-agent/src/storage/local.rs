use async_trait::async_trait;
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::debug;

use super::{common_prefixes, validate_key, ByteStream, StoreClient};
use crate::fs::walker::{walk_directory, WalkOptions};
use crate::utils::{AgentError, Result};

const PARTIAL_SUFFIX: &str = ".partial";

/// Object store on the local filesystem: one directory per bucket, keys
/// mapped onto relative paths.
#[derive(Debug, Clone)]
pub struct LocalStoreClient {
    root: PathBuf,
    bucket: String,
}

impl LocalStoreClient {
    pub fn new(root: impl Into<PathBuf>, bucket: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn bucket_dir(&self) -> PathBuf {
        self.root.join(&self.bucket)
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.bucket_dir().join(key))
    }
}

fn key_of(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[async_trait]
impl StoreClient for LocalStoreClient {
    async fn list_bucket(&self) -> Result<Vec<String>> {
        let mut buckets = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(buckets),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                buckets.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        buckets.sort();
        Ok(buckets)
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>> {
        let dir = self.bucket_dir();
        if !tokio::fs::try_exists(&dir).await? {
            return Err(AgentError::NotFound(format!("bucket {}", self.bucket)));
        }

        let files = tokio::task::spawn_blocking(move || walk_directory(&dir, &WalkOptions::default()))
            .await
            .map_err(|e| AgentError::Transfer(format!("listing task failed: {e}")))??;

        let mut keys: Vec<String> = files
            .iter()
            .map(|file| key_of(&file.relative_path))
            .filter(|key| key.starts_with(prefix) && !key.ends_with(PARTIAL_SUFFIX))
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn list_common_prefix(&self, prefix: &str, delimiter: &str) -> Result<Vec<String>> {
        let keys = self.list_objects(prefix).await?;
        Ok(common_prefixes(keys.iter().map(String::as_str), prefix, delimiter))
    }

    async fn create_bucket(&self, name: &str) -> Result<()> {
        validate_key(name)?;
        if name.contains('/') {
            return Err(AgentError::Config(format!("invalid bucket name: {name:?}")));
        }
        tokio::fs::create_dir_all(self.root.join(name)).await?;
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<ByteStream> {
        let path = self.object_path(key)?;
        match tokio::fs::File::open(&path).await {
            Ok(file) => Ok(Box::pin(ReaderStream::new(file))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AgentError::NotFound(format!("object {key}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn put_stream(&self, key: &str, mut body: ByteStream) -> Result<()> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Readers never observe a half-written object.
        let mut partial_name = path.file_name().unwrap_or_default().to_os_string();
        partial_name.push(PARTIAL_SUFFIX);
        let partial = path.with_file_name(partial_name);
        let mut file = tokio::fs::File::create(&partial).await?;
        let mut written = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            written += chunk.len() as u64;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);
        tokio::fs::rename(&partial, &path).await?;

        debug!(key = %key, bytes = written, "Object stored");
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        match tokio::fs::metadata(self.bucket_dir()).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            _ => Err(AgentError::Config(format!(
                "bucket {} does not exist under {}",
                self.bucket,
                self.root.display()
            ))),
        }
    }
}
