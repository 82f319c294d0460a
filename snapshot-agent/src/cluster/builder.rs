//! Builds a snapshot tree from the live cluster.

use tracing::{debug, info, warn};

use super::{object_name, object_namespace, ClusterClient};
use crate::filter::{
    admits_cluster_resource, filtrate_namespaces, filtrate_resources, filtrate_tree, merge_defaults, object_filters,
    Filter, FilterKind, Filters,
};
use crate::tree::{ClusterRoot, Gvr, CLUSTER_NAMESPACE};
use crate::utils::{AgentError, Result};

/// Populate `root` with every admitted live object.
///
/// Discovery failures abort the build. A resource whose listing fails is
/// skipped and the build continues.
pub async fn build_tree(client: &dyn ClusterClient, root: &mut ClusterRoot, filters: &Filters) -> Result<()> {
    let mut catalog = client
        .discover()
        .await
        .map_err(|e| AgentError::Discovery(format!("cannot discover api resources: {e}")))?;
    let mut namespaces = client
        .list_namespaces()
        .await
        .map_err(|e| AgentError::Discovery(format!("cannot list namespaces: {e}")))?;

    let mut filters = filters.clone();
    merge_defaults(&mut filters);
    if let Some(filter) = filters.get(&FilterKind::Resource) {
        filtrate_resources(&mut catalog, filter);
    }
    if let Some(filter) = filters.get(&FilterKind::Namespace) {
        filtrate_namespaces(&mut namespaces, filter);
    }
    let cluster_filter = filters.get(&FilterKind::Cluster);
    let object_filters = object_filters(&filters);

    let mut dropped = 0usize;
    for list in &catalog {
        for info in &list.resources {
            let is_cluster = !info.namespaced;
            if is_cluster && !admits_cluster_resource(cluster_filter, &info.name) {
                debug!(resource = %info.name, "Cluster-scoped resource excluded");
                continue;
            }

            let gvr = Gvr::new(&list.group, &list.version, &info.name);
            let objects = match client.list_objects(&gvr).await {
                Ok(objects) => objects,
                Err(e) => {
                    warn!(gvr = %gvr, error = %e, "Listing failed, skipping resource");
                    continue;
                }
            };

            let resource = root
                .add_children(&list.group)
                .add_children(&list.version)
                .add_children(&info.name, is_cluster);
            if is_cluster {
                resource.add_children(CLUSTER_NAMESPACE);
            } else {
                for namespace in &namespaces {
                    resource.add_children(namespace);
                }
            }

            let scoped: Vec<&Filter> = object_filters
                .iter()
                .filter(|f| f.applies_to_resource(&info.name))
                .collect();

            for definition in objects {
                let Some(name) = object_name(&definition).map(str::to_string) else {
                    warn!(gvr = %gvr, "Object without a name, skipping");
                    continue;
                };
                if !scoped.iter().all(|f| f.admits(&name)) {
                    debug!(gvr = %gvr, name = %name, "Object excluded");
                    continue;
                }

                let namespace = if is_cluster {
                    CLUSTER_NAMESPACE.to_string()
                } else {
                    object_namespace(&definition).unwrap_or_default().to_string()
                };
                match resource.namespaces.get_mut(&namespace) {
                    Some(node) => node
                        .add_children(&name)
                        .populate(gvr.clone(), &namespace, is_cluster, definition),
                    None => {
                        dropped += 1;
                        debug!(gvr = %gvr, namespace = %namespace, name = %name, "Namespace filtered out, object dropped");
                    }
                }
            }
        }
    }

    root.prune();

    let post_hoc = filters
        .values()
        .filter(|f| !matches!(f.kind, FilterKind::Namespace | FilterKind::Resource));
    filtrate_tree(root, post_hoc);

    info!(
        cluster = %root.name,
        objects = root.object_count(),
        dropped,
        "Tree built"
    );
    Ok(())
}
