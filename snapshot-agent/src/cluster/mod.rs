//! Cluster access and the engines that talk to it.
//!
//! Everything above this module only sees [`ClusterClient`]; the kube-rs
//! implementation lives in [`kube_client`].

pub mod builder;
pub mod kube_client;
pub mod restore;

pub use builder::build_tree;
pub use kube_client::{ClusterAccess, KubeClusterClient};
pub use restore::restore_tree;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::tree::Gvr;

/// Failure of a single cluster call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClusterError {
    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("api error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("cluster unavailable: {0}")]
    Unavailable(String),
}

impl ClusterError {
    pub fn is_already_exists(&self) -> bool {
        matches!(self, ClusterError::AlreadyExists(_))
    }
}

/// One resource of a discovery catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResourceInfo {
    /// Plural name, e.g. `deployments`.
    pub name: String,
    pub kind: String,
    pub namespaced: bool,
}

impl ApiResourceInfo {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, namespaced: bool) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            namespaced,
        }
    }
}

/// Listable resources of one group/version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResourceList {
    pub group: String,
    pub version: String,
    pub resources: Vec<ApiResourceInfo>,
}

/// The cluster operations the snapshot engine needs.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Preferred group/versions with their listable resources.
    async fn discover(&self) -> Result<Vec<ApiResourceList>, ClusterError>;

    async fn list_namespaces(&self) -> Result<Vec<String>, ClusterError>;

    /// Every live object of `gvr`, across all namespaces.
    async fn list_objects(&self, gvr: &Gvr) -> Result<Vec<Value>, ClusterError>;

    /// Create or update a namespace by name.
    async fn apply_namespace(&self, name: &str) -> Result<(), ClusterError>;

    /// Create a namespaced object. Fails with `AlreadyExists` on collision.
    async fn create_object(&self, gvr: &Gvr, namespace: &str, definition: &Value) -> Result<(), ClusterError>;

    /// Create or update a cluster-scoped object.
    async fn apply_cluster_object(&self, gvr: &Gvr, definition: &Value) -> Result<(), ClusterError>;

    /// Cheap reachability check.
    async fn health_check(&self) -> Result<(), ClusterError> {
        self.list_namespaces().await.map(|_| ())
    }
}

/// `metadata.name` of a raw definition.
pub fn object_name(definition: &Value) -> Option<&str> {
    definition.pointer("/metadata/name").and_then(Value::as_str)
}

/// `metadata.namespace` of a raw definition.
pub fn object_namespace(definition: &Value) -> Option<&str> {
    definition.pointer("/metadata/namespace").and_then(Value::as_str)
}
