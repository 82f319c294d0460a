use std::collections::BTreeMap;

use super::{Group, NodeKind, TreeKind, TreeNode};

/// Top of a snapshot tree: one per backup or restore run.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterRoot {
    /// Cluster name; also the first segment of every remote key.
    pub name: String,
    pub tree_kind: TreeKind,
    /// Caller-chosen run name.
    pub tree_name: String,
    pub groups: BTreeMap<String, Group>,
}

impl ClusterRoot {
    pub fn new(name: impl Into<String>, tree_kind: TreeKind, tree_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tree_kind,
            tree_name: tree_name.into(),
            groups: BTreeMap::new(),
        }
    }

    pub fn add_children(&mut self, name: &str) -> &mut Group {
        let parent = self.name.clone();
        self.groups
            .entry(name.to_string())
            .or_insert_with(|| Group::new(name, parent))
    }

    /// A fresh root with the same identity and no groups.
    pub fn empty_copy(&self) -> Self {
        Self::new(self.name.clone(), self.tree_kind, self.tree_name.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Drop empty Namespace, Resource, Version and Group nodes, bottom-up.
    pub fn prune(&mut self) {
        for group in self.groups.values_mut() {
            for version in group.versions.values_mut() {
                for resource in version.resources.values_mut() {
                    resource.namespaces.retain(|_, ns| !ns.objects.is_empty());
                }
                version.resources.retain(|_, r| !r.namespaces.is_empty());
            }
            group.versions.retain(|_, v| !v.resources.is_empty());
        }
        self.groups.retain(|_, g| !g.versions.is_empty());
    }

    /// Number of object leaves under this root.
    pub fn object_count(&self) -> usize {
        self.groups
            .values()
            .flat_map(|g| g.versions.values())
            .flat_map(|v| v.resources.values())
            .flat_map(|r| r.namespaces.values())
            .map(|n| n.objects.len())
            .sum()
    }
}

impl TreeNode for ClusterRoot {
    fn kind(&self) -> NodeKind {
        NodeKind::Root
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn parent(&self) -> Option<&str> {
        None
    }

    fn get_children(&self, name: &str) -> Option<&dyn TreeNode> {
        self.groups.get(name).map(|g| g as &dyn TreeNode)
    }

    fn get_children_mut(&mut self, name: &str) -> Option<&mut dyn TreeNode> {
        self.groups.get_mut(name).map(|g| g as &mut dyn TreeNode)
    }

    fn contains_children(&self, name: &str) -> bool {
        self.groups.contains_key(name)
    }

    fn delete_children(&mut self, name: &str) -> bool {
        self.groups.remove(name).is_some()
    }

    fn list_children(&self) -> Vec<String> {
        self.groups.keys().cloned().collect()
    }
}
