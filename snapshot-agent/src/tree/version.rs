use std::collections::BTreeMap;

use super::{branch_node, NodeKind, Resource};

#[derive(Debug, Clone, PartialEq)]
pub struct Version {
    pub name: String,
    pub parent: String,
    pub resources: BTreeMap<String, Resource>,
}

impl Version {
    pub fn new(name: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: parent.into(),
            resources: BTreeMap::new(),
        }
    }

    /// Find or create a resource. The scope flag only applies on creation.
    pub fn add_children(&mut self, name: &str, is_cluster: bool) -> &mut Resource {
        let parent = self.name.clone();
        self.resources
            .entry(name.to_string())
            .or_insert_with(|| Resource::new(name, parent, is_cluster))
    }
}

branch_node!(Version, resources, NodeKind::Version);
