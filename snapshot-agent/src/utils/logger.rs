//! Logging configuration using tracing.
//!
//! The process-wide subscriber prints to stdout. Each backup or restore run
//! additionally executes under its own dispatcher that also writes into the
//! run's log file, which is uploaded next to the mission status.

use std::fs::File;
use std::path::Path;
use std::sync::Mutex;

use tracing::Dispatch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging with the specified level
pub fn init(level: &str) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(env_filter(level))
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}

/// Build a dispatcher that mirrors events to stdout and to `log_path`.
pub fn run_dispatch(log_path: &Path, level: &str) -> std::io::Result<Dispatch> {
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(log_path)?;

    let subscriber = tracing_subscriber::registry()
        .with(env_filter(level))
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        );

    Ok(Dispatch::new(subscriber))
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_run_dispatch_writes_log_file() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let log_path = temp_dir.path().join("runs").join("nightly.log");

        let dispatch = run_dispatch(&log_path, "info")?;
        tracing::dispatcher::with_default(&dispatch, || {
            tracing::info!(run = "nightly", "captured by the run log");
        });

        let content = std::fs::read_to_string(&log_path)?;
        assert!(content.contains("captured by the run log"));
        Ok(())
    }
}
