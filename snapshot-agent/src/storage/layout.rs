//! Directory and archive layout of a snapshot tree.
//!
//! ```text
//! {kind}/{group}_/{version}/{resource}/{namespace}/{object}/{object}.{json|yaml}
//! {kind}/{group}_/{version}/{resource}/{namespace}/{object}/metadata.json
//! ```
//!
//! The `_` suffix keeps the core group (empty name) addressable. Each kind
//! directory is packed into its own archive and stored under
//! `{cluster}/{treeKind}/{treeName}/{kind}.archive`.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::archive::{blocking, pack_dir, unpack};
use super::StoreAgent;
use crate::fs::walker::{group_by_directory, walk_directory, FileInfo, WalkOptions};
use crate::tree::{ClusterRoot, Object, ObjectMetadata, TreeKind};
use crate::utils::{AgentError, Result};

pub const METADATA_FILE: &str = "metadata.json";
const ARCHIVE_SUFFIX: &str = ".archive";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Json,
    Yaml,
}

impl StorageKind {
    pub const ALL: [StorageKind; 2] = [StorageKind::Json, StorageKind::Yaml];

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::Json => "json",
            StorageKind::Yaml => "yaml",
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{cluster}/{treeKind}/`, parent of every run of that kind.
pub fn kind_prefix(cluster: &str, kind: TreeKind) -> String {
    format!("{cluster}/{kind}/")
}

/// `{cluster}/{treeKind}/{treeName}/`
pub fn run_prefix(root: &ClusterRoot) -> String {
    format!("{}{}/", kind_prefix(&root.name, root.tree_kind), root.tree_name)
}

pub fn archive_key(root: &ClusterRoot, kind: StorageKind) -> String {
    format!("{}{kind}{ARCHIVE_SUFFIX}", run_prefix(root))
}

pub fn log_key(root: &ClusterRoot) -> String {
    format!("{}{}.log{ARCHIVE_SUFFIX}", run_prefix(root), root.tree_name)
}

pub fn status_key(root: &ClusterRoot) -> String {
    format!("{}{}-status.log{ARCHIVE_SUFFIX}", run_prefix(root), root.tree_name)
}

/// Relative directory holding one object.
pub fn object_dir(object: &Object) -> PathBuf {
    let metadata = &object.metadata;
    PathBuf::from(format!("{}_", metadata.group))
        .join(&metadata.version)
        .join(&metadata.resource)
        .join(&metadata.namespace)
        .join(&metadata.name)
}

fn objects(root: &ClusterRoot) -> impl Iterator<Item = &Object> {
    root.groups
        .values()
        .flat_map(|g| g.versions.values())
        .flat_map(|v| v.resources.values())
        .flat_map(|r| r.namespaces.values())
        .flat_map(|n| n.objects.values())
}

/// Outcome of writing or reading a tree. Skipped entries carry the object
/// path (write) or object directory (read) and the reason.
#[derive(Debug, Default)]
pub struct TreeReport {
    pub objects: usize,
    pub skipped: Vec<(String, AgentError)>,
}

impl TreeReport {
    fn record(&mut self, entry: String, result: Result<()>) -> Result<()> {
        match result {
            Ok(()) => self.objects += 1,
            Err(e) if !e.is_fatal() => self.skipped.push((entry, e)),
            Err(e) => return Err(e),
        }
        Ok(())
    }
}

/// An object whose json definition file would be the metadata sidecar.
fn collides_with_metadata(name: &str) -> bool {
    format!("{name}.{}", StorageKind::Json) == METADATA_FILE
}

fn write_object(object: &Object, base: &Path, kind: StorageKind) -> Result<()> {
    if collides_with_metadata(&object.name) {
        return Err(AgentError::Serialization(format!(
            "object {} collides with {METADATA_FILE}",
            object.storage_path()
        )));
    }
    let body = match kind {
        StorageKind::Json => object.to_json()?,
        StorageKind::Yaml => object.to_yaml()?,
    };

    let dir = base.join(object_dir(object));
    fs::create_dir_all(&dir)?;
    fs::write(dir.join(format!("{}.{kind}", object.name)), body)?;
    fs::write(dir.join(METADATA_FILE), object.metadata.to_json()?)?;
    Ok(())
}

/// Render every object of `root` under `base`. Objects that cannot be
/// serialized are skipped and reported.
pub fn write_tree(root: &ClusterRoot, base: &Path, kind: StorageKind) -> Result<TreeReport> {
    let mut report = TreeReport::default();
    for object in objects(root) {
        report.record(object.storage_path(), write_object(object, base, kind))?;
    }
    Ok(report)
}

fn read_object(root: &mut ClusterRoot, dir: &Path, files: &[FileInfo]) -> Result<()> {
    let metadata_file = files
        .iter()
        .find(|f| f.file_name() == Some(METADATA_FILE))
        .ok_or_else(|| AgentError::Serialization(format!("{} has no {METADATA_FILE}", dir.display())))?;
    let metadata = ObjectMetadata::from_json(&fs::read(&metadata_file.path)?)?;

    if collides_with_metadata(&metadata.name) {
        return Err(AgentError::Serialization(format!(
            "{} has no definition apart from {METADATA_FILE}",
            dir.display()
        )));
    }
    let definition_name = format!("{}.{}", metadata.name, StorageKind::Json);
    let definition_file = files
        .iter()
        .find(|f| f.file_name() == Some(definition_name.as_str()))
        .ok_or_else(|| AgentError::Serialization(format!("{} has no {definition_name}", dir.display())))?;

    let mut scratch = Object::new(&metadata.name, &metadata.namespace);
    scratch.from_json(&fs::read(&definition_file.path)?)?;
    let definition = scratch
        .definition
        .ok_or_else(|| AgentError::Serialization(format!("{} has an empty definition", dir.display())))?;

    root.add_children(&metadata.group)
        .add_children(&metadata.version)
        .add_children(&metadata.resource, metadata.is_cluster)
        .add_children(&metadata.namespace)
        .add_children(&metadata.name)
        .populate(metadata.gvr(), &metadata.namespace, metadata.is_cluster, definition);
    Ok(())
}

/// Rebuild objects from an unpacked json tree under `base`.
///
/// Malformed object directories are skipped and reported.
pub fn read_tree(root: &mut ClusterRoot, base: &Path) -> Result<TreeReport> {
    let files = walk_directory(base, &WalkOptions::default())?;
    let mut report = TreeReport::default();
    for (dir, files) in group_by_directory(files) {
        let result = read_object(root, &dir, &files);
        report.record(dir.display().to_string(), result)?;
    }
    Ok(report)
}

/// Serialize `root` into both archives and upload them.
///
/// Returns the objects left out of the archives, keyed by storage path.
pub async fn save(root: &ClusterRoot, store: &StoreAgent, scratch: &Path) -> Result<BTreeMap<String, String>> {
    let mut skipped = BTreeMap::new();
    for kind in StorageKind::ALL {
        let dir = scratch.join(kind.as_str());
        let archive = scratch.join(format!("{kind}{ARCHIVE_SUFFIX}"));

        let tree = root.clone();
        let (src, dest) = (dir.clone(), archive.clone());
        let report = blocking(move || {
            fs::create_dir_all(&src)?;
            let report = write_tree(&tree, &src, kind)?;
            pack_dir(&src, &dest)?;
            Ok(report)
        })
        .await?;

        store.upload(&archive, &archive_key(root, kind)).await?;
        info!(kind = %kind, objects = report.objects, key = %archive_key(root, kind), "Archive saved");
        for (path, e) in report.skipped {
            skipped.entry(path).or_insert_with(|| e.to_string());
        }
    }

    for (path, error) in &skipped {
        warn!(path = %path, error = %error, "Object left out of the archives");
    }
    Ok(skipped)
}

/// Download the json archive of `root`'s run and load it into `root`.
pub async fn load(root: &mut ClusterRoot, store: &StoreAgent, scratch: &Path) -> Result<()> {
    let kind = StorageKind::Json;
    let archive = scratch.join(format!("{kind}{ARCHIVE_SUFFIX}"));
    store.download(&archive_key(root, kind), &archive).await?;

    let mut tree = root.empty_copy();
    let dir = scratch.join(kind.as_str());
    let (report, tree) = blocking(move || {
        unpack(&archive, &dir)?;
        let report = read_tree(&mut tree, &dir)?;
        Ok((report, tree))
    })
    .await?;

    // Logged here, not on the blocking pool, so the run's subscriber sees it.
    for (dir, e) in &report.skipped {
        warn!(dir = %dir, error = %e, "Skipping malformed object");
    }
    root.groups = tree.groups;
    info!(objects = report.objects, run = %root.tree_name, "Archive loaded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStoreClient;
    use crate::tree::{Gvr, CLUSTER_NAMESPACE};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn sample_root() -> ClusterRoot {
        let mut root = ClusterRoot::new("prod-eu", TreeKind::Backup, "nightly");
        root.add_children("apps")
            .add_children("v1")
            .add_children("deployments", false)
            .add_children("shop")
            .add_children("web")
            .populate(
                Gvr::new("apps", "v1", "deployments"),
                "shop",
                false,
                json!({"apiVersion": "apps/v1", "kind": "Deployment", "metadata": {"name": "web", "namespace": "shop"}}),
            );
        root.add_children("")
            .add_children("v1")
            .add_children("persistentvolumes", true)
            .add_children(CLUSTER_NAMESPACE)
            .add_children("pv-data")
            .populate(
                Gvr::new("", "v1", "persistentvolumes"),
                CLUSTER_NAMESPACE,
                true,
                json!({"apiVersion": "v1", "kind": "PersistentVolume", "metadata": {"name": "pv-data"}}),
            );
        root
    }

    fn with_metadata_secret(mut root: ClusterRoot) -> ClusterRoot {
        root.add_children("")
            .add_children("v1")
            .add_children("secrets", false)
            .add_children("shop")
            .add_children("metadata")
            .populate(
                Gvr::new("", "v1", "secrets"),
                "shop",
                false,
                json!({"apiVersion": "v1", "kind": "Secret", "metadata": {"name": "metadata", "namespace": "shop"}}),
            );
        root
    }

    async fn local_store(temp_dir: &TempDir) -> Result<StoreAgent> {
        let client = LocalStoreClient::new(temp_dir.path().join("store"), "snapshots");
        crate::storage::StoreClient::create_bucket(&client, "snapshots").await?;
        Ok(StoreAgent::new(Arc::new(client)))
    }

    #[test]
    fn test_keys() {
        let root = sample_root();
        assert_eq!(archive_key(&root, StorageKind::Json), "prod-eu/backup/nightly/json.archive");
        assert_eq!(archive_key(&root, StorageKind::Yaml), "prod-eu/backup/nightly/yaml.archive");
        assert_eq!(log_key(&root), "prod-eu/backup/nightly/nightly.log.archive");
        assert_eq!(status_key(&root), "prod-eu/backup/nightly/nightly-status.log.archive");
    }

    #[test]
    fn test_write_tree_layout() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let root = sample_root();

        let report = write_tree(&root, temp_dir.path(), StorageKind::Yaml)?;
        assert_eq!(report.objects, 2);
        assert!(report.skipped.is_empty());

        let web = temp_dir.path().join("apps_/v1/deployments/shop/web");
        assert!(web.join("web.yaml").is_file());
        assert!(web.join(METADATA_FILE).is_file());
        assert!(temp_dir.path().join("_/v1/persistentvolumes/cluster/pv-data/pv-data.yaml").is_file());
        Ok(())
    }

    #[test]
    fn test_read_tree_skips_malformed_objects() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let root = sample_root();
        write_tree(&root, temp_dir.path(), StorageKind::Json)?;

        let broken = temp_dir.path().join("apps_/v1/deployments/shop/api");
        fs::create_dir_all(&broken)?;
        fs::write(broken.join(METADATA_FILE), b"not json")?;
        fs::write(broken.join("api.json"), b"{}")?;

        let mut loaded = root.empty_copy();
        let report = read_tree(&mut loaded, temp_dir.path())?;
        assert_eq!(report.objects, 2);
        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].0.ends_with("apps_/v1/deployments/shop/api"));
        assert_eq!(loaded, root);
        Ok(())
    }

    #[test]
    fn test_write_tree_skips_object_named_like_the_sidecar() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let root = with_metadata_secret(sample_root());

        let report = write_tree(&root, temp_dir.path(), StorageKind::Json)?;
        assert_eq!(report.objects, 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].0, "v1/secrets/shop/metadata");
        assert!(matches!(report.skipped[0].1, AgentError::Serialization(_)));
        assert!(!temp_dir.path().join("_/v1/secrets/shop/metadata").exists());
        Ok(())
    }

    #[test]
    fn test_read_tree_skips_sidecar_only_directory() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let root = sample_root();
        write_tree(&root, temp_dir.path(), StorageKind::Json)?;

        let dir = temp_dir.path().join("_/v1/secrets/shop/metadata");
        fs::create_dir_all(&dir)?;
        let metadata = ObjectMetadata {
            name: "metadata".into(),
            namespace: "shop".into(),
            group: String::new(),
            version: "v1".into(),
            resource: "secrets".into(),
            is_cluster: false,
            ..Default::default()
        };
        fs::write(dir.join(METADATA_FILE), metadata.to_json()?)?;

        let mut loaded = root.empty_copy();
        let report = read_tree(&mut loaded, temp_dir.path())?;
        assert_eq!(report.objects, 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(loaded, root);
        Ok(())
    }

    #[tokio::test]
    async fn test_save_reports_skipped_objects_once() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = local_store(&temp_dir).await?;

        let root = with_metadata_secret(sample_root());
        let scratch = TempDir::new()?;
        let skipped = save(&root, &store, scratch.path()).await?;
        assert_eq!(skipped.len(), 1);
        assert!(skipped["v1/secrets/shop/metadata"].contains("collides with metadata.json"));

        let mut loaded = root.empty_copy();
        let scratch = TempDir::new()?;
        load(&mut loaded, &store, scratch.path()).await?;
        assert_eq!(loaded, sample_root());
        Ok(())
    }

    #[tokio::test]
    async fn test_load_logs_skipped_objects_to_the_run_log() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = local_store(&temp_dir).await?;
        let root = sample_root();

        let tree_dir = temp_dir.path().join("tree");
        write_tree(&root, &tree_dir, StorageKind::Json)?;
        let broken = tree_dir.join("apps_/v1/deployments/shop/api");
        fs::create_dir_all(&broken)?;
        fs::write(broken.join(METADATA_FILE), b"not json")?;
        let archive = temp_dir.path().join("json.archive");
        pack_dir(&tree_dir, &archive)?;
        store.upload(&archive, &archive_key(&root, StorageKind::Json)).await?;

        let log_path = temp_dir.path().join("run.log");
        let dispatch = crate::utils::logger::run_dispatch(&log_path, "info")?;
        let mut loaded = root.empty_copy();
        let scratch = TempDir::new()?;
        {
            use tracing::instrument::WithSubscriber;
            load(&mut loaded, &store, scratch.path()).with_subscriber(dispatch).await?;
        }

        let log = fs::read_to_string(&log_path)?;
        assert!(log.contains("Skipping malformed object"));
        assert!(log.contains("apps_/v1/deployments/shop/api"));
        assert_eq!(loaded, root);
        Ok(())
    }

    #[tokio::test]
    async fn test_save_then_load_round_trip() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = local_store(&temp_dir).await?;

        let root = sample_root();
        let scratch = TempDir::new()?;
        assert!(save(&root, &store, scratch.path()).await?.is_empty());

        let mut loaded = root.empty_copy();
        let scratch = TempDir::new()?;
        load(&mut loaded, &store, scratch.path()).await?;

        assert_eq!(loaded, root);
        Ok(())
    }
}
