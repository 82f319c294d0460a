//! Mission status for a single backup or restore run.
//!
//! Uploaded next to the run log as `{treeName}-status.log.archive`, so an
//! operator can see which objects a restore could not recreate.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::tree::TreeKind;
use crate::utils::{AgentError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Success,
    PartialFailed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Success => f.write_str("Success"),
            RunStatus::PartialFailed => f.write_str("PartialFailed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissionStatus {
    pub mission_kind: TreeKind,
    status: RunStatus,
    /// Storage path (`group/version/resource/namespace/name`) → error text.
    #[serde(default)]
    pub failed_objects: BTreeMap<String, String>,
}

impl MissionStatus {
    pub fn new(mission_kind: TreeKind) -> Self {
        Self {
            mission_kind,
            status: RunStatus::Success,
            failed_objects: BTreeMap::new(),
        }
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// Only ever moves towards `PartialFailed`.
    pub fn set_status(&mut self, status: RunStatus) {
        if self.status == RunStatus::Success {
            self.status = status;
        }
    }

    pub fn add_failed_object(&mut self, path: impl Into<String>, error: impl Into<String>) {
        self.failed_objects.insert(path.into(), error.into());
        self.set_status(RunStatus::PartialFailed);
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| AgentError::Serialization(format!("invalid mission status: {e}")))
    }
}
