//! Configuration management for the snapshot agent.
//!
//! Built-in defaults, overlaid by an optional TOML file, overlaid by
//! `SNAPSHOT_`-prefixed environment variables (`__` separates sections, e.g.
//! `SNAPSHOT_STORAGE__BACKEND=plugin`).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cluster::ClusterAccess;
use crate::filter::{Filter, Filters};
use crate::storage::{HttpStoreClient, LocalStoreClient, StoreClient};
use crate::utils::{AgentError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub agent: AgentConfig,
    pub cluster: ClusterConfig,
    pub storage: StorageConfig,
    pub log: LogConfig,
    /// Filters applied to every run, before CLI flags.
    #[serde(default)]
    pub filters: Vec<Filter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Cluster name; first segment of every stored key
    #[serde(default = "default_cluster_name")]
    pub cluster_name: String,

    /// Parent directory of per-run scratch directories
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessKind {
    Kubeconfig,
    Token,
    InCluster,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    #[serde(default = "default_access")]
    pub access: AccessKind,

    /// API server URL; required for token access, optional override otherwise
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub kubeconfig: Option<PathBuf>,

    /// Service-account bearer token
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Local,
    Plugin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: BackendKind,

    /// Root directory of the local backend
    #[serde(default = "default_local_dir")]
    pub local_dir: PathBuf,

    /// Base URL of the storage plugin
    #[serde(default)]
    pub url: Option<String>,

    /// Bearer token for the storage plugin
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default = "default_bucket")]
    pub bucket: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_cluster_name() -> String {
    "default".to_string()
}

fn default_work_dir() -> PathBuf {
    std::env::temp_dir().join("snapshot-agent")
}

fn default_access() -> AccessKind {
    AccessKind::Kubeconfig
}

fn default_backend() -> BackendKind {
    BackendKind::Local
}

fn default_local_dir() -> PathBuf {
    PathBuf::from("/var/lib/snapshot-agent/store")
}

fn default_bucket() -> String {
    "snapshots".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            agent: AgentConfig {
                cluster_name: default_cluster_name(),
                work_dir: default_work_dir(),
            },
            cluster: ClusterConfig {
                access: default_access(),
                url: None,
                kubeconfig: None,
                token: None,
            },
            storage: StorageConfig {
                backend: default_backend(),
                local_dir: default_local_dir(),
                url: None,
                token: None,
                bucket: default_bucket(),
            },
            log: LogConfig {
                level: default_log_level(),
            },
            filters: Vec::new(),
        }
    }
}

impl Config {
    /// Layer defaults, the optional TOML file and the environment.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder().add_source(config::Config::try_from(&Config::default())?);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).format(config::FileFormat::Toml));
        }
        let config = builder
            .add_source(config::Environment::with_prefix("SNAPSHOT").separator("__"))
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Configured filters keyed by kind. A kind may appear once.
    pub fn filters(&self) -> Result<Filters> {
        let mut filters = Filters::new();
        for filter in &self.filters {
            if filters.insert(filter.kind, filter.clone()).is_some() {
                return Err(AgentError::Config(format!("duplicate {} filter", filter.kind)));
            }
        }
        Ok(filters)
    }
}

impl ClusterConfig {
    pub fn access(&self) -> Result<ClusterAccess> {
        match self.access {
            AccessKind::Kubeconfig => Ok(ClusterAccess::Kubeconfig {
                path: self.kubeconfig.clone(),
                url: self.url.clone(),
            }),
            AccessKind::Token => {
                let url = self
                    .url
                    .clone()
                    .ok_or_else(|| AgentError::Config("token access needs cluster.url".into()))?;
                let token = self
                    .token
                    .clone()
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| AgentError::Config("token access needs cluster.token".into()))?;
                Ok(ClusterAccess::Token { url, token })
            }
            AccessKind::InCluster => Ok(ClusterAccess::InCluster),
        }
    }
}

impl StorageConfig {
    /// Backend client for the configured bucket.
    pub fn client(&self) -> Result<Arc<dyn StoreClient>> {
        match self.backend {
            BackendKind::Local => Ok(Arc::new(LocalStoreClient::new(&self.local_dir, &self.bucket))),
            BackendKind::Plugin => {
                let url = self
                    .url
                    .as_deref()
                    .filter(|u| !u.is_empty())
                    .ok_or_else(|| AgentError::Config("plugin backend needs storage.url".into()))?;
                Ok(Arc::new(HttpStoreClient::new(url, &self.bucket, self.token.clone())))
            }
        }
    }
}
