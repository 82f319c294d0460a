//! Diff a backup tree against the live cluster and recreate what is missing.
//!
//! Only presence is compared. Objects that already exist, or that are
//! created successfully, are removed from the backup tree; whatever is left
//! afterwards is the residue persisted as the restore record.

use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, error, info, warn};

use super::ClusterClient;
use crate::executor::status::MissionStatus;
use crate::tree::{ClusterRoot, Namespace, Resource, CLUSTER_NAMESPACE};
use crate::utils::AgentError;

/// Top-level fields assigned by the server.
const SERVER_FIELDS: [&str; 1] = ["status"];

/// `metadata` fields assigned by the server.
const SERVER_METADATA_FIELDS: [&str; 7] = [
    "managedFields",
    "uid",
    "resourceVersion",
    "creationTimestamp",
    "selfLink",
    "generation",
    "ownerReferences",
];

/// Remove server-assigned fields so the definition can be created again.
pub fn strip_server_fields(definition: &mut Value) {
    let Some(fields) = definition.as_object_mut() else {
        return;
    };
    for key in SERVER_FIELDS {
        fields.remove(key);
    }
    if let Some(metadata) = fields.get_mut("metadata").and_then(Value::as_object_mut) {
        for key in SERVER_METADATA_FIELDS {
            metadata.remove(key);
        }
    }
    // Bound volumes would otherwise point at a claim that no longer exists.
    if let Some(spec) = fields.get_mut("spec").and_then(Value::as_object_mut) {
        spec.remove("claimRef");
    }
}

struct Restorer<'a> {
    client: &'a dyn ClusterClient,
    status: &'a mut MissionStatus,
    /// Namespaces already created during this run.
    created: BTreeSet<String>,
    /// Namespaces whose creation failed.
    failed: BTreeSet<String>,
}

/// Create every object of `backup` that is absent from `current`.
///
/// Per-object failures are recorded in `status` and never stop the walk.
pub async fn restore_tree(
    client: &dyn ClusterClient,
    backup: &mut ClusterRoot,
    current: &ClusterRoot,
    status: &mut MissionStatus,
) {
    let before = backup.object_count();
    let mut restorer = Restorer {
        client,
        status,
        created: BTreeSet::new(),
        failed: BTreeSet::new(),
    };

    for (group_name, group) in backup.groups.iter_mut() {
        let live_group = current.groups.get(group_name);
        for (version_name, version) in group.versions.iter_mut() {
            let live_version = live_group.and_then(|g| g.versions.get(version_name));
            for (resource_name, resource) in version.resources.iter_mut() {
                let live_resource = live_version.and_then(|v| v.resources.get(resource_name));
                restorer.restore_resource(resource, live_resource).await;
            }
        }
    }

    backup.prune();
    info!(
        objects = before,
        residual = backup.object_count(),
        status = %restorer.status.status(),
        "Restore pass finished"
    );
}

impl Restorer<'_> {
    async fn restore_resource(&mut self, resource: &mut Resource, live: Option<&Resource>) {
        let is_cluster = resource.is_cluster;
        for (namespace_name, namespace) in resource.namespaces.iter_mut() {
            let live_namespace = live.and_then(|r| r.namespaces.get(namespace_name));
            if live_namespace.is_none()
                && namespace_name != CLUSTER_NAMESPACE
                && !self.ensure_namespace(namespace_name).await
            {
                continue;
            }
            self.restore_namespace(namespace, live_namespace, is_cluster).await;
        }
    }

    /// Returns false when the namespace could not be created.
    async fn ensure_namespace(&mut self, name: &str) -> bool {
        if self.created.contains(name) {
            return true;
        }
        if self.failed.contains(name) {
            return false;
        }
        match self.client.apply_namespace(name).await {
            Ok(()) => {
                info!(namespace = %name, "Namespace created");
                self.created.insert(name.to_string());
                true
            }
            Err(e) => {
                error!(namespace = %name, error = %e, "Cannot create namespace, leaving its objects");
                self.failed.insert(name.to_string());
                false
            }
        }
    }

    async fn restore_namespace(&mut self, namespace: &mut Namespace, live: Option<&Namespace>, is_cluster: bool) {
        let mut satisfied = Vec::new();

        for (name, object) in namespace.objects.iter_mut() {
            if live.is_some_and(|ns| ns.objects.contains_key(name)) {
                debug!(path = %object.storage_path(), "Already present");
                satisfied.push(name.clone());
                continue;
            }

            let path = object.storage_path();
            let Some(definition) = object.definition.as_mut() else {
                let err = AgentError::Apply("object has no definition".into());
                self.status.add_failed_object(path, err.to_string());
                continue;
            };
            strip_server_fields(definition);

            let result = if is_cluster {
                self.client.apply_cluster_object(&object.gvr, definition).await
            } else {
                self.client.create_object(&object.gvr, &namespace.name, definition).await
            };

            match result {
                Ok(()) => {
                    info!(path = %path, "Created");
                    satisfied.push(name.clone());
                }
                Err(e) if e.is_already_exists() => {
                    debug!(path = %path, "Created concurrently, treated as present");
                    satisfied.push(name.clone());
                }
                Err(e) => {
                    let err = AgentError::Apply(e.to_string());
                    warn!(path = %path, error = %err, "Create failed");
                    self.status.add_failed_object(path, err.to_string());
                }
            }
        }

        for name in satisfied {
            namespace.objects.remove(&name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{build_tree, ClusterError};
    use crate::executor::status::RunStatus;
    use crate::filter::{Filter, FilterKind, Filters};
    use crate::testutil::{definition, sample_cluster, MemoryCluster};
    use crate::tree::{Gvr, TreeKind};
    use serde_json::json;

    fn backup_of(objects: &[(Gvr, Option<&str>, &str)]) -> ClusterRoot {
        let mut root = ClusterRoot::new("prod-eu", TreeKind::Backup, "nightly");
        for (gvr, namespace, name) in objects {
            let is_cluster = namespace.is_none();
            let ns = namespace.unwrap_or(CLUSTER_NAMESPACE);
            root.add_children(&gvr.group)
                .add_children(&gvr.version)
                .add_children(&gvr.resource, is_cluster)
                .add_children(ns)
                .add_children(name)
                .populate(gvr.clone(), ns, is_cluster, definition("Thing", *namespace, name));
        }
        root
    }

    async fn current_of(cluster: &MemoryCluster) -> ClusterRoot {
        let mut current = ClusterRoot::new("prod-eu", TreeKind::Backup, "current");
        let mut filters = Filters::new();
        filters.insert(FilterKind::Cluster, Filter::new(FilterKind::Cluster, true, Vec::<String>::new()));
        build_tree(cluster, &mut current, &filters).await.unwrap();
        current
    }

    #[test]
    fn test_strip_server_fields() {
        let mut value = definition("PersistentVolume", None, "pv-data");
        value["metadata"]["labels"] = json!({"tier": "db"});
        value["spec"] = json!({"capacity": {"storage": "1Gi"}, "claimRef": {"name": "data"}});

        strip_server_fields(&mut value);

        assert!(value.get("status").is_none());
        assert_eq!(value["metadata"], json!({"name": "pv-data", "labels": {"tier": "db"}}));
        assert_eq!(value["spec"], json!({"capacity": {"storage": "1Gi"}}));
    }

    #[tokio::test]
    async fn test_present_objects_are_not_recreated() {
        let cluster = sample_cluster();
        let current = current_of(&cluster).await;
        let mut backup = backup_of(&[(Gvr::new("apps", "v1", "deployments"), Some("shop"), "web")]);
        let mut status = MissionStatus::new(TreeKind::Restore);

        restore_tree(&cluster, &mut backup, &current, &mut status).await;

        assert!(backup.is_empty());
        assert!(cluster.calls().is_empty());
        assert!(status.is_success());
    }

    #[tokio::test]
    async fn test_absent_objects_are_created() {
        let cluster = sample_cluster();
        let current = current_of(&cluster).await;
        let configmaps = Gvr::new("", "v1", "configmaps");
        let mut backup = backup_of(&[
            (configmaps.clone(), Some("shop"), "settings"),
            (Gvr::new("", "v1", "persistentvolumes"), None, "pv-logs"),
        ]);
        let mut status = MissionStatus::new(TreeKind::Restore);

        restore_tree(&cluster, &mut backup, &current, &mut status).await;

        assert!(backup.is_empty());
        assert!(status.is_success());
        assert!(cluster.has_object(&configmaps, Some("shop"), "settings"));
        // configmaps were never listed live, so their namespace is applied first.
        assert_eq!(
            cluster.calls(),
            vec!["namespace shop", "create shop/settings", "apply pv-logs"]
        );
    }

    #[tokio::test]
    async fn test_missing_namespace_is_created_once() {
        let cluster = sample_cluster();
        let current = current_of(&cluster).await;
        let mut backup = backup_of(&[
            (Gvr::new("", "v1", "configmaps"), Some("archive"), "settings"),
            (Gvr::new("", "v1", "services"), Some("archive"), "frontend"),
        ]);
        let mut status = MissionStatus::new(TreeKind::Restore);

        restore_tree(&cluster, &mut backup, &current, &mut status).await;

        assert!(backup.is_empty());
        let calls = cluster.calls();
        assert_eq!(calls.iter().filter(|c| *c == "namespace archive").count(), 1);
        assert_eq!(calls[0], "namespace archive");
    }

    #[tokio::test]
    async fn test_failed_namespace_keeps_branch() {
        let cluster = sample_cluster().reject_namespace("archive");
        let current = current_of(&cluster).await;
        let mut backup = backup_of(&[
            (Gvr::new("", "v1", "configmaps"), Some("archive"), "settings"),
            (Gvr::new("", "v1", "configmaps"), Some("shop"), "flags"),
        ]);
        let mut status = MissionStatus::new(TreeKind::Restore);

        restore_tree(&cluster, &mut backup, &current, &mut status).await;

        let configmaps = &backup.groups[""].versions["v1"].resources["configmaps"];
        assert_eq!(configmaps.namespaces.keys().collect::<Vec<_>>(), vec!["archive"]);
        assert_eq!(backup.object_count(), 1);
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_failed_object() {
        let cluster = sample_cluster().reject(
            "quota-hog",
            ClusterError::Api {
                code: 403,
                message: "exceeded quota".into(),
            },
        );
        let current = current_of(&cluster).await;
        let configmaps = Gvr::new("", "v1", "configmaps");
        let mut backup = backup_of(&[
            (configmaps.clone(), Some("shop"), "quota-hog"),
            (configmaps, Some("shop"), "settings"),
        ]);
        let mut status = MissionStatus::new(TreeKind::Restore);

        restore_tree(&cluster, &mut backup, &current, &mut status).await;

        assert_eq!(status.status(), RunStatus::PartialFailed);
        let ledger = &status.failed_objects["v1/configmaps/shop/quota-hog"];
        assert!(ledger.starts_with("Apply error:"));
        assert!(ledger.contains("exceeded quota"));
        let residual = &backup.groups[""].versions["v1"].resources["configmaps"].namespaces["shop"];
        assert_eq!(residual.objects.keys().collect::<Vec<_>>(), vec!["quota-hog"]);
    }

    #[tokio::test]
    async fn test_already_exists_counts_as_satisfied() {
        let cluster = sample_cluster().reject("raced", ClusterError::AlreadyExists("raced".into()));
        let current = current_of(&cluster).await;
        let mut backup = backup_of(&[(Gvr::new("", "v1", "configmaps"), Some("shop"), "raced")]);
        let mut status = MissionStatus::new(TreeKind::Restore);

        restore_tree(&cluster, &mut backup, &current, &mut status).await;

        assert!(backup.is_empty());
        assert!(status.is_success());
    }
}
