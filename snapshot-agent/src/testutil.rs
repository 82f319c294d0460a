//! In-memory cluster used by engine and orchestrator tests.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use crate::cluster::{object_name, object_namespace, ApiResourceInfo, ApiResourceList, ClusterClient, ClusterError};
use crate::tree::Gvr;

#[derive(Default)]
pub(crate) struct MemoryCluster {
    catalog: Vec<ApiResourceList>,
    namespaces: Mutex<BTreeSet<String>>,
    objects: Mutex<BTreeMap<Gvr, Vec<Value>>>,
    failing_lists: BTreeSet<String>,
    rejected: BTreeMap<String, ClusterError>,
    rejected_namespaces: BTreeSet<String>,
    /// `create ns/name`, `apply name` and `namespace name` entries, in call order.
    pub calls: Mutex<Vec<String>>,
    down: bool,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cluster that refuses every discovery call.
    pub fn unreachable() -> Self {
        Self {
            down: true,
            ..Self::default()
        }
    }

    pub fn with_resource(mut self, group: &str, version: &str, resource: &str, kind: &str, namespaced: bool) -> Self {
        let info = ApiResourceInfo::new(resource, kind, namespaced);
        match self
            .catalog
            .iter_mut()
            .find(|list| list.group == group && list.version == version)
        {
            Some(list) => list.resources.push(info),
            None => self.catalog.push(ApiResourceList {
                group: group.to_string(),
                version: version.to_string(),
                resources: vec![info],
            }),
        }
        self
    }

    pub fn with_namespace(self, name: &str) -> Self {
        self.namespaces.lock().unwrap().insert(name.to_string());
        self
    }

    pub fn with_object(self, gvr: Gvr, definition: Value) -> Self {
        self.objects.lock().unwrap().entry(gvr).or_default().push(definition);
        self
    }

    pub fn fail_listing(mut self, resource: &str) -> Self {
        self.failing_lists.insert(resource.to_string());
        self
    }

    pub fn reject(mut self, name: &str, error: ClusterError) -> Self {
        self.rejected.insert(name.to_string(), error);
        self
    }

    pub fn reject_namespace(mut self, name: &str) -> Self {
        self.rejected_namespaces.insert(name.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn has_object(&self, gvr: &Gvr, namespace: Option<&str>, name: &str) -> bool {
        self.objects
            .lock()
            .unwrap()
            .get(gvr)
            .is_some_and(|items| items.iter().any(|item| same_object(item, namespace, name)))
    }

    fn store(&self, gvr: &Gvr, definition: &Value) {
        self.objects
            .lock()
            .unwrap()
            .entry(gvr.clone())
            .or_default()
            .push(definition.clone());
    }
}

fn same_object(item: &Value, namespace: Option<&str>, name: &str) -> bool {
    object_name(item) == Some(name) && (namespace.is_none() || object_namespace(item) == namespace)
}

/// Minimal live-looking definition.
pub(crate) fn definition(kind: &str, namespace: Option<&str>, name: &str) -> Value {
    let mut metadata = json!({
        "name": name,
        "uid": format!("uid-{name}"),
        "resourceVersion": "101",
        "creationTimestamp": "2024-05-01T10:00:00Z",
        "managedFields": [{"manager": "kubectl"}],
    });
    if let Some(namespace) = namespace {
        metadata["namespace"] = json!(namespace);
    }
    json!({
        "apiVersion": "v1",
        "kind": kind,
        "metadata": metadata,
        "status": {"phase": "Active"},
    })
}

#[async_trait]
impl ClusterClient for MemoryCluster {
    async fn discover(&self) -> Result<Vec<ApiResourceList>, ClusterError> {
        if self.down {
            return Err(ClusterError::Unavailable("connection refused".into()));
        }
        Ok(self.catalog.clone())
    }

    async fn list_namespaces(&self) -> Result<Vec<String>, ClusterError> {
        if self.down {
            return Err(ClusterError::Unavailable("connection refused".into()));
        }
        Ok(self.namespaces.lock().unwrap().iter().cloned().collect())
    }

    async fn list_objects(&self, gvr: &Gvr) -> Result<Vec<Value>, ClusterError> {
        if self.failing_lists.contains(&gvr.resource) {
            return Err(ClusterError::Api {
                code: 403,
                message: format!("{} is forbidden", gvr.resource),
            });
        }
        Ok(self.objects.lock().unwrap().get(gvr).cloned().unwrap_or_default())
    }

    async fn apply_namespace(&self, name: &str) -> Result<(), ClusterError> {
        self.calls.lock().unwrap().push(format!("namespace {name}"));
        if self.rejected_namespaces.contains(name) {
            return Err(ClusterError::Api {
                code: 403,
                message: format!("namespace {name} is forbidden"),
            });
        }
        self.namespaces.lock().unwrap().insert(name.to_string());
        Ok(())
    }

    async fn create_object(&self, gvr: &Gvr, namespace: &str, definition: &Value) -> Result<(), ClusterError> {
        let name = object_name(definition).unwrap_or_default().to_string();
        self.calls.lock().unwrap().push(format!("create {namespace}/{name}"));
        if let Some(error) = self.rejected.get(&name) {
            return Err(error.clone());
        }
        if self.has_object(gvr, Some(namespace), &name) {
            return Err(ClusterError::AlreadyExists(name));
        }
        self.store(gvr, definition);
        Ok(())
    }

    async fn apply_cluster_object(&self, gvr: &Gvr, definition: &Value) -> Result<(), ClusterError> {
        let name = object_name(definition).unwrap_or_default().to_string();
        self.calls.lock().unwrap().push(format!("apply {name}"));
        if let Some(error) = self.rejected.get(&name) {
            return Err(error.clone());
        }
        if !self.has_object(gvr, None, &name) {
            self.store(gvr, definition);
        }
        Ok(())
    }
}

/// A small cluster: two app namespaces plus the system one, a deployment,
/// a pod, two secrets, a volume and a cluster role.
pub(crate) fn sample_cluster() -> MemoryCluster {
    let deployments = Gvr::new("apps", "v1", "deployments");
    let pods = Gvr::new("", "v1", "pods");
    let secrets = Gvr::new("", "v1", "secrets");
    let volumes = Gvr::new("", "v1", "persistentvolumes");
    let roles = Gvr::new("rbac.authorization.k8s.io", "v1", "clusterroles");

    MemoryCluster::new()
        .with_resource("apps", "v1", "deployments", "Deployment", true)
        .with_resource("", "v1", "pods", "Pod", true)
        .with_resource("", "v1", "secrets", "Secret", true)
        .with_resource("", "v1", "namespaces", "Namespace", false)
        .with_resource("", "v1", "persistentvolumes", "PersistentVolume", false)
        .with_resource("rbac.authorization.k8s.io", "v1", "clusterroles", "ClusterRole", false)
        .with_namespace("shop")
        .with_namespace("billing")
        .with_namespace("kube-system")
        .with_object(deployments.clone(), definition("Deployment", Some("shop"), "web"))
        .with_object(deployments, definition("Deployment", Some("kube-system"), "coredns"))
        .with_object(pods, definition("Pod", Some("shop"), "web-7d9f"))
        .with_object(secrets.clone(), definition("Secret", Some("shop"), "default-token-abc"))
        .with_object(secrets, definition("Secret", Some("shop"), "app-secret"))
        .with_object(volumes, definition("PersistentVolume", None, "pv-data"))
        .with_object(roles, definition("ClusterRole", None, "admin"))
}
