//! Snapshot Agent Library
//!
//! Captures the objects of a cluster into a filtered snapshot tree, stores it
//! as json and yaml archives on a storage backend, and restores the objects
//! a later cluster state is missing.

pub mod cluster;
pub mod config;
pub mod executor;
pub mod filter;
pub mod fs;
pub mod storage;
pub mod transfer;
pub mod tree;
pub mod utils;

#[cfg(test)]
pub(crate) mod testutil;

// Re-export commonly used types
pub use config::Config;
pub use executor::status::{MissionStatus, RunStatus};
pub use executor::SnapshotExecutor;
pub use utils::{AgentError, Result};
