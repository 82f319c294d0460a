use std::collections::BTreeMap;

use super::{branch_node, Namespace, NodeKind};

/// A resource kind (plural name) within one group/version.
///
/// Cluster-scoped resources hold a single child, the
/// [`CLUSTER_NAMESPACE`](super::CLUSTER_NAMESPACE) pseudo-namespace.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub name: String,
    pub parent: String,
    pub is_cluster: bool,
    pub namespaces: BTreeMap<String, Namespace>,
}

impl Resource {
    pub fn new(name: impl Into<String>, parent: impl Into<String>, is_cluster: bool) -> Self {
        Self {
            name: name.into(),
            parent: parent.into(),
            is_cluster,
            namespaces: BTreeMap::new(),
        }
    }

    pub fn add_children(&mut self, name: &str) -> &mut Namespace {
        let parent = self.name.clone();
        self.namespaces
            .entry(name.to_string())
            .or_insert_with(|| Namespace::new(name, parent))
    }
}

branch_node!(Resource, namespaces, NodeKind::Resource, {
    fn is_cluster_scoped(&self) -> bool {
        self.is_cluster
    }
});
