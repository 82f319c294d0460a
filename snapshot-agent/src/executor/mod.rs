//! Snapshot executor - orchestrates backup and restore runs.
//!
//! A run is one sequential flow:
//! - health checks against the cluster and the storage backend
//! - a [`RunContext`] holding the scratch directory, the run log and the
//!   mission status
//! - the tree work itself (build and save, or load, diff and apply)
//! - upload of the run log and mission status next to the run's archives

pub mod status;

use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::instrument::WithSubscriber;
use tracing::{error, info, Dispatch};

use crate::cluster::{build_tree, restore_tree, ClusterClient};
use crate::filter::{filtrate_tree, Filter, FilterKind, Filters};
use crate::storage::archive::{blocking, pack_file};
use crate::storage::layout::{self, log_key, status_key};
use crate::storage::StoreAgent;
use crate::tree::{ClusterRoot, TreeKind};
use crate::utils::{logger, AgentError, Result};
use status::MissionStatus;

const LOG_FILE: &str = "run.log";
const STATUS_FILE: &str = "status.json";

/// Per-run state, dropped (with its scratch directory) when the run ends.
pub struct RunContext {
    scratch: TempDir,
    log_path: PathBuf,
    dispatch: Dispatch,
    pub status: MissionStatus,
    /// Set once the run name is known not to collide with a stored run.
    claimed: bool,
}

impl RunContext {
    pub fn new(work_dir: &Path, kind: TreeKind, log_level: &str) -> Result<Self> {
        std::fs::create_dir_all(work_dir)?;
        let scratch = tempfile::Builder::new()
            .prefix(&format!("{kind}-"))
            .tempdir_in(work_dir)?;
        let log_path = scratch.path().join(LOG_FILE);
        let dispatch = logger::run_dispatch(&log_path, log_level)?;

        Ok(Self {
            scratch,
            log_path,
            dispatch,
            status: MissionStatus::new(kind),
            claimed: false,
        })
    }

    pub fn scratch(&self) -> &Path {
        self.scratch.path()
    }

    fn data_dir(&self, stage: &str) -> PathBuf {
        self.scratch.path().join(stage)
    }
}

/// `YYYYmmddHHMMSS`, used to name runs.
fn timestamp() -> String {
    Local::now().format("%Y%m%d%H%M%S").to_string()
}

/// Main snapshot executor
pub struct SnapshotExecutor {
    cluster: Arc<dyn ClusterClient>,
    store: StoreAgent,
    work_dir: PathBuf,
    log_level: String,
}

impl SnapshotExecutor {
    pub fn new(cluster: Arc<dyn ClusterClient>, store: StoreAgent, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            cluster,
            store,
            work_dir: work_dir.into(),
            log_level: "info".to_string(),
        }
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Both ends must be reachable before any tree work starts.
    pub async fn health_check(&self) -> Result<()> {
        self.store.health_check().await?;
        self.cluster
            .health_check()
            .await
            .map_err(|e| AgentError::Config(format!("cluster unreachable: {e}")))?;
        Ok(())
    }

    pub async fn list_runs(&self, cluster: &str, kind: TreeKind) -> Result<Vec<String>> {
        self.store.list_runs(cluster, kind).await
    }

    /// Capture the cluster into a new backup run named `root.tree_name`
    /// (`backup<timestamp>` when empty).
    pub async fn backup(&self, root: &mut ClusterRoot, filters: &Filters) -> Result<MissionStatus> {
        self.health_check().await?;
        let mut ctx = RunContext::new(&self.work_dir, TreeKind::Backup, &self.log_level)?;

        let dispatch = ctx.dispatch.clone();
        let result = self
            .run_backup(root, filters, &mut ctx)
            .with_subscriber(dispatch.clone())
            .await;
        self.finish(root, ctx, result).with_subscriber(dispatch).await
    }

    /// Recreate missing objects from the backup run `root.tree_name`.
    ///
    /// On return `root` holds the residue, renamed to the restore run.
    pub async fn restore(&self, root: &mut ClusterRoot, filters: &Filters) -> Result<MissionStatus> {
        self.health_check().await?;
        let mut ctx = RunContext::new(&self.work_dir, TreeKind::Restore, &self.log_level)?;

        let dispatch = ctx.dispatch.clone();
        let result = self
            .run_restore(root, filters, &mut ctx)
            .with_subscriber(dispatch.clone())
            .await;
        self.finish(root, ctx, result).with_subscriber(dispatch).await
    }

    async fn run_backup(&self, root: &mut ClusterRoot, filters: &Filters, ctx: &mut RunContext) -> Result<()> {
        root.tree_kind = TreeKind::Backup;
        if root.tree_name.is_empty() {
            root.tree_name = format!("backup{}", timestamp());
        }
        info!(cluster = %root.name, run = %root.tree_name, "Backup started");

        if self.store.run_exists(root).await? {
            return Err(AgentError::Conflict(format!("backup {} already exists", root.tree_name)));
        }
        ctx.claimed = true;

        build_tree(self.cluster.as_ref(), root, filters).await?;
        let skipped = layout::save(root, &self.store, &ctx.data_dir("save")).await?;
        for (path, error) in skipped {
            ctx.status.add_failed_object(path, error);
        }

        info!(run = %root.tree_name, objects = root.object_count(), "Backup finished");
        Ok(())
    }

    async fn run_restore(&self, root: &mut ClusterRoot, filters: &Filters, ctx: &mut RunContext) -> Result<()> {
        root.tree_kind = TreeKind::Backup;
        if root.tree_name.is_empty() {
            return Err(AgentError::Config("restore needs the name of a backup".into()));
        }
        info!(cluster = %root.name, backup = %root.tree_name, "Restore started");

        if !self.store.run_exists(root).await? {
            return Err(AgentError::NotFound(format!("backup {}", root.tree_name)));
        }
        layout::load(root, &self.store, &ctx.data_dir("load")).await?;
        filtrate_tree(root, filters.values());

        let mut current = ClusterRoot::new(root.name.clone(), TreeKind::Backup, "current");
        let mut live_filters = Filters::new();
        live_filters.insert(
            FilterKind::Cluster,
            Filter::new(FilterKind::Cluster, true, Vec::<String>::new()),
        );
        build_tree(self.cluster.as_ref(), &mut current, &live_filters).await?;

        restore_tree(self.cluster.as_ref(), root, &current, &mut ctx.status).await;

        root.tree_name = format!("restore{}-{}", timestamp(), root.tree_name);
        root.tree_kind = TreeKind::Restore;

        if !root.is_empty() && self.store.run_exists(root).await? {
            return Err(AgentError::Conflict(format!("restore {} already exists", root.tree_name)));
        }
        ctx.claimed = true;
        if !root.is_empty() {
            let skipped = layout::save(root, &self.store, &ctx.data_dir("save")).await?;
            for (path, error) in skipped {
                ctx.status.add_failed_object(path, error);
            }
        }

        info!(
            run = %root.tree_name,
            status = %ctx.status.status(),
            residual = root.object_count(),
            "Restore finished"
        );
        Ok(())
    }

    async fn finish(&self, root: &ClusterRoot, ctx: RunContext, result: Result<()>) -> Result<MissionStatus> {
        if let Err(e) = &result {
            error!(run = %root.tree_name, error = %e, "Run failed");
        }

        let uploaded = if ctx.claimed {
            self.upload_run_artifacts(root, &ctx).await
        } else {
            Ok(())
        };

        result?;
        uploaded?;
        Ok(ctx.status)
    }

    async fn upload_run_artifacts(&self, root: &ClusterRoot, ctx: &RunContext) -> Result<()> {
        let status_path = ctx.scratch().join(STATUS_FILE);
        let log_archive = ctx.scratch().join("log.archive");
        let status_archive = ctx.scratch().join("status.archive");

        let status = ctx.status.to_json()?;
        let log_path = ctx.log_path.clone();
        let log_name = format!("{}.log", root.tree_name);
        let status_name = format!("{}-status.log", root.tree_name);
        let (log_dest, status_dest) = (log_archive.clone(), status_archive.clone());
        blocking(move || {
            std::fs::write(&status_path, status)?;
            pack_file(&log_path, &log_name, &log_dest)?;
            pack_file(&status_path, &status_name, &status_dest)
        })
        .await?;

        self.store.upload(&log_archive, &log_key(root)).await?;
        self.store.upload(&status_archive, &status_key(root)).await?;
        Ok(())
    }
}
