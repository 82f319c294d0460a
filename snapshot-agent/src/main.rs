//! Snapshot Agent - Main entry point
//!
//! One-shot CLI: back up a cluster, restore from a stored backup, list runs
//! or check that the cluster and the storage backend are reachable.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use snapshot_agent::cluster::KubeClusterClient;
use snapshot_agent::config::{BackendKind, Config};
use snapshot_agent::filter::{Filter, FilterKind, Filters};
use snapshot_agent::storage::{StoreAgent, StoreClient};
use snapshot_agent::tree::{ClusterRoot, TreeKind};
use snapshot_agent::{utils, MissionStatus, SnapshotExecutor};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Capture the cluster into a new backup run
    Backup(RunArgs),
    /// Recreate objects missing from the cluster out of a backup run
    Restore(RunArgs),
    /// List stored runs
    List {
        #[arg(long, default_value = "backup")]
        kind: String,
    },
    /// Check the cluster and the storage backend
    Health,
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Run name; for restore, the backup to restore from
    #[arg(short, long, default_value = "")]
    name: String,

    /// Keep only these namespaces
    #[arg(long, value_delimiter = ',', conflicts_with = "exclude_namespaces")]
    include_namespaces: Vec<String>,

    /// Drop these namespaces
    #[arg(long, value_delimiter = ',')]
    exclude_namespaces: Vec<String>,

    /// Keep only these resources
    #[arg(long, value_delimiter = ',', conflicts_with = "exclude_resources")]
    include_resources: Vec<String>,

    /// Drop these resources
    #[arg(long, value_delimiter = ',')]
    exclude_resources: Vec<String>,

    /// Drop objects of RESOURCE whose name contains SUBSTR
    #[arg(long, value_name = "RESOURCE=SUBSTR")]
    exclude_objects: Vec<String>,

    /// Capture every cluster-scoped resource
    #[arg(long)]
    include_cluster_resources: bool,
}

impl RunArgs {
    /// Flag filters layered over the configured ones, kind by kind.
    fn filters(&self, mut filters: Filters) -> Result<Filters> {
        let lists = [
            (FilterKind::Namespace, &self.include_namespaces, &self.exclude_namespaces),
            (FilterKind::Resource, &self.include_resources, &self.exclude_resources),
        ];
        for (kind, include, exclude) in lists {
            if !include.is_empty() {
                filters.insert(kind, Filter::new(kind, true, include));
            } else if !exclude.is_empty() {
                filters.insert(kind, Filter::new(kind, false, exclude));
            }
        }

        if let Some(filter) = object_exclusions(&self.exclude_objects)? {
            filters.insert(FilterKind::Object, filter);
        }
        if self.include_cluster_resources {
            filters.insert(FilterKind::Cluster, Filter::new(FilterKind::Cluster, true, Vec::<String>::new()));
        }
        Ok(filters)
    }
}

/// `RESOURCE=SUBSTR` pairs folded into one scoped object filter.
fn object_exclusions(pairs: &[String]) -> Result<Option<Filter>> {
    let mut scope: Option<&str> = None;
    let mut fragments = Vec::new();
    for pair in pairs {
        let (resource, fragment) = pair
            .split_once('=')
            .filter(|(r, f)| !r.is_empty() && !f.is_empty())
            .with_context(|| format!("expected RESOURCE=SUBSTR, got {pair:?}"))?;
        match scope {
            Some(existing) if existing != resource => {
                bail!("object exclusions must target one resource, got {existing} and {resource}")
            }
            _ => scope = Some(resource),
        }
        fragments.push(fragment);
    }

    Ok(scope.map(|resource| Filter::new(FilterKind::Object, false, fragments).scoped(resource)))
}

fn print_status(status: &MissionStatus, run: &str) {
    println!("{} {run}: {}", status.mission_kind, status.status());
    for (path, error) in &status.failed_objects {
        println!("  failed {path}: {error}");
    }
}

async fn executor(config: &Config, log_level: &str) -> Result<SnapshotExecutor> {
    let client = config.storage.client()?;
    if config.storage.backend == BackendKind::Local {
        client.create_bucket(&config.storage.bucket).await?;
    }
    let store = StoreAgent::new(client);

    let access = config.cluster.access()?;
    let cluster = KubeClusterClient::connect(&access)
        .await
        .context("failed to connect to the cluster")?;

    Ok(SnapshotExecutor::new(Arc::new(cluster), store, &config.agent.work_dir).with_log_level(log_level))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_deref())?;

    // Initialize logging
    let log_level = cli.log_level.as_deref().unwrap_or(&config.log.level).to_string();
    utils::logger::init(&log_level)?;

    tracing::info!(
        "Starting snapshot-agent v{} (cluster: {})",
        env!("CARGO_PKG_VERSION"),
        config.agent.cluster_name
    );

    let executor = executor(&config, &log_level).await?;
    let cluster_name = config.agent.cluster_name.clone();

    match cli.command {
        Command::Backup(args) => {
            let filters = args.filters(config.filters()?)?;
            let mut root = ClusterRoot::new(&cluster_name, TreeKind::Backup, &args.name);
            let status = executor.backup(&mut root, &filters).await?;
            print_status(&status, &root.tree_name);
        }
        Command::Restore(args) => {
            let filters = args.filters(config.filters()?)?;
            let mut root = ClusterRoot::new(&cluster_name, TreeKind::Backup, &args.name);
            let status = executor.restore(&mut root, &filters).await?;
            print_status(&status, &root.tree_name);
        }
        Command::List { kind } => {
            let kind = match kind.as_str() {
                "backup" => TreeKind::Backup,
                "restore" => TreeKind::Restore,
                other => bail!("unknown run kind {other:?}, expected backup or restore"),
            };
            for run in executor.list_runs(&cluster_name, kind).await? {
                println!("{run}");
            }
        }
        Command::Health => {
            executor.health_check().await?;
            println!("cluster and storage backend reachable");
        }
    }

    Ok(())
}
