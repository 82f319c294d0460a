use futures_util::StreamExt;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::layout::{kind_prefix, run_prefix};
use super::StoreClient;
use crate::tree::{ClusterRoot, TreeKind};
use crate::utils::{AgentError, Result};

/// Run bookkeeping over a [`StoreClient`].
#[derive(Clone)]
pub struct StoreAgent {
    client: Arc<dyn StoreClient>,
}

fn transfer_error(action: &str, key: &str, err: AgentError) -> AgentError {
    match err {
        AgentError::NotFound(_) | AgentError::Transfer(_) | AgentError::Config(_) => err,
        other => AgentError::Transfer(format!("{action} {key}: {other}")),
    }
}

impl StoreAgent {
    pub fn new(client: Arc<dyn StoreClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &dyn StoreClient {
        self.client.as_ref()
    }

    pub async fn health_check(&self) -> Result<()> {
        self.client.health_check().await.map_err(|e| match e {
            AgentError::Config(_) => e,
            other => AgentError::Config(format!("storage backend unavailable: {other}")),
        })
    }

    /// Names of every stored run of `kind` for `cluster`.
    pub async fn list_runs(&self, cluster: &str, kind: TreeKind) -> Result<Vec<String>> {
        let prefix = kind_prefix(cluster, kind);
        let prefixes = self.client.list_common_prefix(&prefix, "/").await?;
        Ok(prefixes
            .iter()
            .filter_map(|p| p.strip_prefix(&prefix))
            .map(|name| name.trim_end_matches('/').to_string())
            .filter(|name| !name.is_empty())
            .collect())
    }

    /// Whether the run `root` names already has stored artifacts.
    pub async fn run_exists(&self, root: &ClusterRoot) -> Result<bool> {
        let objects = self.client.list_objects(&run_prefix(root)).await?;
        Ok(!objects.is_empty())
    }

    pub async fn download(&self, key: &str, local: &Path) -> Result<()> {
        let mut body = self
            .client
            .get_object(key)
            .await
            .map_err(|e| transfer_error("download", key, e))?;

        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(local).await?;
        let mut bytes = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| AgentError::Transfer(format!("download {key}: {e}")))?;
            bytes += chunk.len() as u64;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        debug!(key = %key, bytes, "Downloaded");
        Ok(())
    }

    pub async fn upload(&self, local: &Path, key: &str) -> Result<()> {
        let file = tokio::fs::File::open(local).await?;
        self.client
            .upload_object(key, file)
            .await
            .map_err(|e| transfer_error("upload", key, e))?;
        info!(key = %key, "Uploaded");
        Ok(())
    }
}
