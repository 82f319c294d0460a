//! Include/exclude filters over tree levels.
//!
//! A filter is an allow-list (`include = true`) or a deny-list
//! (`include = false`) of names for one tree level. System defaults keep
//! control-plane namespaces, noisy resources and service-account tokens out
//! of every snapshot; they are merged into caller filters so that a
//! system-excluded name can never be allowed back in.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

use crate::cluster::ApiResourceList;
use crate::tree::{ClusterRoot, NodeKind, TreeNode};

/// Namespaces never captured.
pub const DEFAULT_EXCLUDED_NAMESPACES: [&str; 3] = ["kube-system", "kube-public", "kube-node-lease"];

/// Resources never captured.
pub const DEFAULT_EXCLUDED_RESOURCES: [&str; 3] = ["events", "pods", "endpointslices"];

/// Secret name fragments never captured.
pub const DEFAULT_EXCLUDED_SECRETS: [&str; 1] = ["default-token"];

/// Cluster-scoped resources captured even when cluster scope is excluded.
pub const ALWAYS_CLUSTER_RESOURCES: [&str; 2] = ["namespaces", "persistentvolumes"];

const SECRETS: &str = "secrets";

/// Level a filter applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    Root,
    /// Cluster-scoped resources as a whole.
    Cluster,
    Group,
    Version,
    Resource,
    Namespace,
    Object,
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FilterKind::Root => "root",
            FilterKind::Cluster => "cluster",
            FilterKind::Group => "group",
            FilterKind::Version => "version",
            FilterKind::Resource => "resource",
            FilterKind::Namespace => "namespace",
            FilterKind::Object => "object",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub kind: FilterKind,
    /// `true`: keep only listed names. `false`: drop listed names.
    pub include: bool,
    #[serde(default)]
    pub names: BTreeSet<String>,
    /// Restricts an object filter to one resource, e.g. `secrets`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Caller filters keyed by kind.
pub type Filters = BTreeMap<FilterKind, Filter>;

/// Outcome of filtering a node, acted on by its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Keep,
    Detach,
}

impl Filter {
    pub fn new<I, S>(kind: FilterKind, include: bool, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind,
            include,
            names: names.into_iter().map(Into::into).collect(),
            scope: None,
        }
    }

    pub fn scoped(mut self, resource: impl Into<String>) -> Self {
        self.scope = Some(resource.into());
        self
    }

    /// Object filters match name fragments; every other kind matches whole names.
    fn lists(&self, name: &str) -> bool {
        match self.kind {
            FilterKind::Object => self.names.iter().any(|fragment| name.contains(fragment.as_str())),
            _ => self.names.contains(name),
        }
    }

    /// Include/exclude membership for a candidate name.
    pub fn admits(&self, name: &str) -> bool {
        self.include == self.lists(name)
    }

    /// Whether an object of `resource` falls under this filter.
    pub fn applies_to_resource(&self, resource: &str) -> bool {
        self.kind == FilterKind::Object && self.scope.as_deref().is_none_or(|scope| scope == resource)
    }

    /// Whether this filter decides the fate of `node`.
    pub fn targets(&self, node: &dyn TreeNode) -> bool {
        match self.kind {
            FilterKind::Root => node.kind() == NodeKind::Root,
            FilterKind::Cluster => node.kind() == NodeKind::Resource && node.is_cluster_scoped(),
            FilterKind::Group => node.kind() == NodeKind::Group,
            FilterKind::Version => node.kind() == NodeKind::Version,
            FilterKind::Resource => node.kind() == NodeKind::Resource,
            FilterKind::Namespace => node.kind() == NodeKind::Namespace,
            FilterKind::Object => {
                node.kind() == NodeKind::Object
                    && self.applies_to_resource(node.scope().unwrap_or_default())
            }
        }
    }

    fn admits_node(&self, node: &dyn TreeNode) -> bool {
        match self.kind {
            FilterKind::Cluster => admits_cluster_resource(Some(self), node.name()),
            _ => self.admits(node.name()),
        }
    }

    /// Fold a system default of the same kind into this filter.
    ///
    /// Deny-lists gain the default names; allow-lists lose them.
    pub fn merge_default(&mut self, default: &Filter) {
        if self.include {
            for name in &default.names {
                self.names.remove(name);
            }
        } else {
            self.names.extend(default.names.iter().cloned());
        }
    }
}

/// System default for namespace and resource kinds.
pub fn default_filter(kind: FilterKind) -> Option<Filter> {
    match kind {
        FilterKind::Namespace => Some(Filter::new(kind, false, DEFAULT_EXCLUDED_NAMESPACES)),
        FilterKind::Resource => Some(Filter::new(kind, false, DEFAULT_EXCLUDED_RESOURCES)),
        _ => None,
    }
}

/// System default object filters, each scoped to one resource.
pub fn default_object_filters() -> Vec<Filter> {
    vec![Filter::new(FilterKind::Object, false, DEFAULT_EXCLUDED_SECRETS).scoped(SECRETS)]
}

/// Merge namespace and resource defaults into `filters`, inserting the
/// default verbatim where the caller supplied none.
pub fn merge_defaults(filters: &mut Filters) {
    for kind in [FilterKind::Namespace, FilterKind::Resource] {
        let Some(default) = default_filter(kind) else {
            continue;
        };
        match filters.get_mut(&kind) {
            Some(filter) => filter.merge_default(&default),
            None => {
                filters.insert(kind, default);
            }
        }
    }
}

/// Object filters in effect: defaults merged into a caller filter with the
/// same scope, otherwise applied alongside it.
pub fn object_filters(filters: &Filters) -> Vec<Filter> {
    let caller = filters.get(&FilterKind::Object);
    let mut effective = Vec::new();

    for default in default_object_filters() {
        match caller {
            Some(filter) if filter.scope == default.scope => {}
            _ => effective.push(default),
        }
    }

    if let Some(filter) = caller {
        let mut filter = filter.clone();
        for default in default_object_filters() {
            if filter.scope == default.scope {
                filter.merge_default(&default);
            }
        }
        effective.push(filter);
    }

    effective
}

/// Cluster-scope rule. A filter without names admits every cluster-scoped
/// resource when `include` and none otherwise; listed names follow the usual
/// allow/deny membership. [`ALWAYS_CLUSTER_RESOURCES`] always pass.
pub fn admits_cluster_resource(filter: Option<&Filter>, resource: &str) -> bool {
    if ALWAYS_CLUSTER_RESOURCES.contains(&resource) {
        return true;
    }
    match filter {
        Some(filter) if filter.names.is_empty() => filter.include,
        Some(filter) => filter.admits(resource),
        None => false,
    }
}

/// Post-order filtering walk. Emptied branches below `node` are pruned; the
/// returned verdict tells the caller whether to detach `node` itself.
pub fn deep_filtrate(node: &mut dyn TreeNode, filter: &Filter) -> Verdict {
    if filter.targets(node) {
        if filter.admits_node(node) {
            return Verdict::Keep;
        }
        debug!(filter = %filter.kind, kind = %node.kind(), name = node.name(), "excluded from tree");
        return Verdict::Detach;
    }

    if node.is_leaf() {
        return Verdict::Keep;
    }

    for name in node.list_children() {
        let verdict = match node.get_children_mut(&name) {
            Some(child) => deep_filtrate(child, filter),
            None => continue,
        };
        if verdict == Verdict::Detach {
            node.delete_children(&name);
        }
    }

    if node.kind() != NodeKind::Root && node.list_children().is_empty() {
        Verdict::Detach
    } else {
        Verdict::Keep
    }
}

/// Apply every filter to an already built tree.
pub fn filtrate_tree<'a>(root: &mut ClusterRoot, filters: impl IntoIterator<Item = &'a Filter>) {
    for filter in filters {
        if deep_filtrate(root, filter) == Verdict::Detach {
            root.groups.clear();
        }
    }
}

/// Pre-filter a raw namespace listing.
pub fn filtrate_namespaces(namespaces: &mut Vec<String>, filter: &Filter) {
    namespaces.retain(|namespace| {
        let keep = filter.admits(namespace);
        debug!(kind = "namespace", name = %namespace, included = keep, "pre-filter");
        keep
    });
}

/// Pre-filter a discovery catalog; versions left without resources are removed.
pub fn filtrate_resources(catalog: &mut Vec<ApiResourceList>, filter: &Filter) {
    for list in catalog.iter_mut() {
        list.resources.retain(|resource| {
            let keep = filter.admits(&resource.name);
            debug!(kind = "resource", name = %resource.name, included = keep, "pre-filter");
            keep
        });
    }
    catalog.retain(|list| !list.resources.is_empty());
}
