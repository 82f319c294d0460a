use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::{NodeKind, TreeNode};
use crate::utils::{AgentError, Result};

/// Group/Version/Resource tuple identifying a resource kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Gvr {
    pub group: String,
    pub version: String,
    pub resource: String,
}

impl Gvr {
    pub fn new(group: impl Into<String>, version: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            resource: resource.into(),
        }
    }

    /// `apiVersion` string: `v1` for the core group, `group/version` otherwise.
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for Gvr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.group, self.version, self.resource)
    }
}

/// Sidecar record stored next to every object definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMetadata {
    pub kind: NodeKind,
    pub name: String,
    pub group: String,
    pub version: String,
    pub resource: String,
    pub namespace: String,
    pub is_cluster: bool,
}

impl Default for ObjectMetadata {
    fn default() -> Self {
        Self {
            kind: NodeKind::Object,
            name: String::new(),
            group: String::new(),
            version: String::new(),
            resource: String::new(),
            namespace: String::new(),
            is_cluster: false,
        }
    }
}

impl ObjectMetadata {
    pub fn gvr(&self) -> Gvr {
        Gvr::new(&self.group, &self.version, &self.resource)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| AgentError::Serialization(format!("invalid object metadata: {e}")))
    }
}

/// A single cluster object. Leaf of the tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub name: String,
    pub parent: String,
    pub gvr: Gvr,
    /// Raw, schema-less definition as returned by the cluster.
    pub definition: Option<Value>,
    pub metadata: ObjectMetadata,
}

impl Object {
    pub fn new(name: impl Into<String>, parent: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            metadata: ObjectMetadata {
                name: name.clone(),
                ..ObjectMetadata::default()
            },
            name,
            parent: parent.into(),
            gvr: Gvr::default(),
            definition: None,
        }
    }

    /// Attach identity and metadata derived from the owning branch.
    pub fn populate(&mut self, gvr: Gvr, namespace: &str, is_cluster: bool, definition: Value) {
        self.metadata = ObjectMetadata {
            kind: NodeKind::Object,
            name: self.name.clone(),
            group: gvr.group.clone(),
            version: gvr.version.clone(),
            resource: gvr.resource.clone(),
            namespace: namespace.to_string(),
            is_cluster,
        };
        self.gvr = gvr;
        self.definition = Some(definition);
    }

    /// Path used in mission status ledgers: `group/version/resource/namespace/name`.
    /// The core group's empty name contributes no segment.
    pub fn storage_path(&self) -> String {
        let metadata = &self.metadata;
        [
            metadata.group.as_str(),
            metadata.version.as_str(),
            metadata.resource.as_str(),
            metadata.namespace.as_str(),
            metadata.name.as_str(),
        ]
        .iter()
        .filter(|segment| !segment.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("/")
    }

    pub fn definition_mut(&mut self) -> Option<&mut serde_json::Map<String, Value>> {
        self.definition.as_mut().and_then(Value::as_object_mut)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        let definition = self.definition.as_ref().ok_or_else(|| {
            AgentError::Serialization(format!("object {} has no definition", self.storage_path()))
        })?;
        Ok(serde_json::to_vec_pretty(definition)?)
    }

    pub fn from_json(&mut self, bytes: &[u8]) -> Result<()> {
        let definition: Value = serde_json::from_slice(bytes)
            .map_err(|e| AgentError::Serialization(format!("invalid definition of {}: {e}", self.name)))?;
        if !definition.is_object() {
            return Err(AgentError::Serialization(format!(
                "definition of {} is not a document",
                self.name
            )));
        }
        self.definition = Some(definition);
        Ok(())
    }

    pub fn to_yaml(&self) -> Result<Vec<u8>> {
        let definition = self.definition.as_ref().ok_or_else(|| {
            AgentError::Serialization(format!("object {} has no definition", self.storage_path()))
        })?;
        Ok(serde_yaml::to_string(definition)?.into_bytes())
    }
}

impl TreeNode for Object {
    fn kind(&self) -> NodeKind {
        NodeKind::Object
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn parent(&self) -> Option<&str> {
        Some(&self.parent)
    }

    fn get_children(&self, _name: &str) -> Option<&dyn TreeNode> {
        None
    }

    fn get_children_mut(&mut self, _name: &str) -> Option<&mut dyn TreeNode> {
        None
    }

    fn contains_children(&self, key: &str) -> bool {
        self.definition
            .as_ref()
            .and_then(Value::as_object)
            .is_some_and(|fields| fields.contains_key(key))
    }

    fn delete_children(&mut self, key: &str) -> bool {
        self.definition_mut()
            .is_some_and(|fields| fields.remove(key).is_some())
    }

    fn list_children(&self) -> Vec<String> {
        Vec::new()
    }

    fn is_leaf(&self) -> bool {
        true
    }

    fn is_cluster_scoped(&self) -> bool {
        self.metadata.is_cluster
    }

    fn scope(&self) -> Option<&str> {
        Some(&self.gvr.resource)
    }
}
