//! Error taxonomy for snapshot runs.
//!
//! `Config`, `Discovery`, `Transfer`, `Conflict` and `NotFound` abort a run.
//! `Apply` and `Serialization` are recorded or logged by the component that
//! hit them and never stop sibling processing.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Discovery error: {0}")]
    Discovery(String),

    #[error("Transfer error: {0}")]
    Transfer(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Apply error: {0}")]
    Apply(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl AgentError {
    /// Whether this error must stop the orchestrator.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, AgentError::Apply(_) | AgentError::Serialization(_))
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
