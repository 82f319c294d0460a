//! Resource tree model.
//!
//! A snapshot is a strict ownership tree:
//!
//! ```text
//! ClusterRoot ─► Group ─► Version ─► Resource ─► Namespace ─► Object
//! ```
//!
//! Children live in `BTreeMap`s owned by their parent; a child only records
//! its parent's name so it can be reported and looked up, never to keep the
//! parent alive. Every level implements [`TreeNode`], which lets the filter
//! pipeline, the serializer and the diff engine walk the tree without
//! branching per level. Creation stays typed per level (`add_children`).

mod group;
mod namespace;
mod object;
mod resource;
mod root;
mod version;

pub use group::Group;
pub use namespace::Namespace;
pub use object::{Gvr, Object, ObjectMetadata};
pub use resource::Resource;
pub use root::ClusterRoot;
pub use version::Version;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Synthetic namespace that holds cluster-scoped objects.
pub const CLUSTER_NAMESPACE: &str = "cluster";

/// Level of a node in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Root,
    Group,
    Version,
    Resource,
    Namespace,
    Object,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Root => "root",
            NodeKind::Group => "group",
            NodeKind::Version => "version",
            NodeKind::Resource => "resource",
            NodeKind::Namespace => "namespace",
            NodeKind::Object => "object",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a tree was captured from the cluster or is the residue of a restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeKind {
    Backup,
    Restore,
}

impl TreeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TreeKind::Backup => "backup",
            TreeKind::Restore => "restore",
        }
    }
}

impl fmt::Display for TreeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capabilities shared by every node of the tree.
///
/// On [`Object`] leaves the "children" are the top-level keys of the raw
/// definition, which is how server-managed fields get stripped.
pub trait TreeNode {
    fn kind(&self) -> NodeKind;

    fn name(&self) -> &str;

    /// Name of the owning node, `None` for the root.
    fn parent(&self) -> Option<&str>;

    fn get_children(&self, name: &str) -> Option<&dyn TreeNode>;

    fn get_children_mut(&mut self, name: &str) -> Option<&mut dyn TreeNode>;

    fn contains_children(&self, name: &str) -> bool;

    /// Detach the named child. Returns false when there is no such child.
    fn delete_children(&mut self, name: &str) -> bool;

    fn list_children(&self) -> Vec<String>;

    fn is_leaf(&self) -> bool {
        false
    }

    /// True for Resource and Object nodes of cluster-scoped kinds.
    fn is_cluster_scoped(&self) -> bool {
        false
    }

    /// Resource name an object belongs to; `None` above the leaves.
    fn scope(&self) -> Option<&str> {
        None
    }

    fn equals(&self, other: &dyn TreeNode) -> bool {
        self.kind() == other.kind() && self.name() == other.name()
    }
}

/// Implements [`TreeNode`] for a non-root level whose children sit in `$field`.
macro_rules! branch_node {
    ($node:ty, $field:ident, $kind:expr) => {
        branch_node!($node, $field, $kind, {});
    };
    ($node:ty, $field:ident, $kind:expr, { $($extra:tt)* }) => {
        impl $crate::tree::TreeNode for $node {
            $($extra)*

            fn kind(&self) -> $crate::tree::NodeKind {
                $kind
            }

            fn name(&self) -> &str {
                &self.name
            }

            fn parent(&self) -> Option<&str> {
                Some(&self.parent)
            }

            fn get_children(&self, name: &str) -> Option<&dyn $crate::tree::TreeNode> {
                self.$field
                    .get(name)
                    .map(|child| child as &dyn $crate::tree::TreeNode)
            }

            fn get_children_mut(&mut self, name: &str) -> Option<&mut dyn $crate::tree::TreeNode> {
                self.$field
                    .get_mut(name)
                    .map(|child| child as &mut dyn $crate::tree::TreeNode)
            }

            fn contains_children(&self, name: &str) -> bool {
                self.$field.contains_key(name)
            }

            fn delete_children(&mut self, name: &str) -> bool {
                self.$field.remove(name).is_some()
            }

            fn list_children(&self) -> Vec<String> {
                self.$field.keys().cloned().collect()
            }
        }
    };
}

pub(crate) use branch_node;
