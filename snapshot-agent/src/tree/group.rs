use std::collections::BTreeMap;

use super::{branch_node, NodeKind, Version};

/// API group. The core group is the empty string.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub name: String,
    pub parent: String,
    pub versions: BTreeMap<String, Version>,
}

impl Group {
    pub fn new(name: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: parent.into(),
            versions: BTreeMap::new(),
        }
    }

    pub fn add_children(&mut self, name: &str) -> &mut Version {
        let parent = self.name.clone();
        self.versions
            .entry(name.to_string())
            .or_insert_with(|| Version::new(name, parent))
    }
}

branch_node!(Group, versions, NodeKind::Group);
