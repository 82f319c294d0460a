use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::{
    api::{Api, DynamicObject, ListParams, Patch, PatchParams, PostParams},
    config::{KubeConfigOptions, Kubeconfig},
    core::{ApiResource, TypeMeta},
    discovery::{verbs, Discovery, Scope},
    Client, Config,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::{debug, info};

use super::{object_name, ApiResourceInfo, ApiResourceList, ClusterClient, ClusterError};
use crate::tree::Gvr;

const FIELD_MANAGER: &str = "snapshot-agent";

/// How to reach the cluster API.
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterAccess {
    /// Kubeconfig file (default location when `path` is unset), optionally
    /// pointed at a different API server.
    Kubeconfig {
        path: Option<PathBuf>,
        url: Option<String>,
    },
    /// Service-account bearer token against `url`; TLS is not verified.
    Token { url: String, token: String },
    /// Ambient pod credentials.
    InCluster,
}

pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn connect(access: &ClusterAccess) -> Result<Self, ClusterError> {
        let config = match access {
            ClusterAccess::Kubeconfig { path, url } => {
                let kubeconfig = match path {
                    Some(path) => Kubeconfig::read_from(path),
                    None => Kubeconfig::read(),
                }
                .map_err(|e| ClusterError::Unavailable(format!("cannot read kubeconfig: {e}")))?;
                let mut config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .map_err(|e| ClusterError::Unavailable(format!("invalid kubeconfig: {e}")))?;
                if let Some(url) = url {
                    config.cluster_url = parse_url(url)?;
                }
                config
            }
            ClusterAccess::Token { url, token } => {
                let mut config = Config::new(parse_url(url)?);
                config.accept_invalid_certs = true;
                config.auth_info.token = Some(token.clone().into());
                config
            }
            ClusterAccess::InCluster => Config::incluster()
                .map_err(|e| ClusterError::Unavailable(format!("no in-cluster credentials: {e}")))?,
        };

        info!(url = %config.cluster_url, "Connecting to cluster");
        let client = Client::try_from(config).map_err(classify)?;
        Ok(Self::new(client))
    }
}

fn parse_url(url: &str) -> Result<http::Uri, ClusterError> {
    url.parse::<http::Uri>()
        .map_err(|e| ClusterError::Unavailable(format!("invalid cluster url {url}: {e}")))
}

fn api_resource(gvr: &Gvr, kind: &str) -> ApiResource {
    ApiResource {
        group: gvr.group.clone(),
        version: gvr.version.clone(),
        api_version: gvr.api_version(),
        kind: kind.to_string(),
        plural: gvr.resource.clone(),
    }
}

fn definition_kind(definition: &Value) -> &str {
    definition.get("kind").and_then(Value::as_str).unwrap_or_default()
}

fn decode(definition: &Value) -> Result<DynamicObject, ClusterError> {
    serde_json::from_value(definition.clone()).map_err(|e| ClusterError::Api {
        code: 422,
        message: format!("invalid object definition: {e}"),
    })
}

/// Map a kube error onto [`ClusterError`]. Only called on a failed call.
fn classify(err: kube::Error) -> ClusterError {
    match err {
        kube::Error::Api(response) if response.reason == "AlreadyExists" => {
            ClusterError::AlreadyExists(response.message)
        }
        kube::Error::Api(response) => ClusterError::Api {
            code: response.code,
            message: response.message,
        },
        other => ClusterError::Unavailable(other.to_string()),
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn discover(&self) -> Result<Vec<ApiResourceList>, ClusterError> {
        let discovery = Discovery::new(self.client.clone()).run().await.map_err(classify)?;

        let mut catalog = Vec::new();
        for group in discovery.groups() {
            let version = group.preferred_version_or_latest();
            let resources: Vec<ApiResourceInfo> = group
                .versioned_resources(version)
                .into_iter()
                .filter(|(_, caps)| caps.supports_operation(verbs::LIST))
                .map(|(ar, caps)| ApiResourceInfo::new(ar.plural, ar.kind, matches!(caps.scope, Scope::Namespaced)))
                .collect();
            if resources.is_empty() {
                continue;
            }
            catalog.push(ApiResourceList {
                group: group.name().to_string(),
                version: version.to_string(),
                resources,
            });
        }

        debug!(groups = catalog.len(), "Discovery finished");
        Ok(catalog)
    }

    async fn list_namespaces(&self) -> Result<Vec<String>, ClusterError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default()).await.map_err(classify)?;
        Ok(list.items.into_iter().filter_map(|ns| ns.metadata.name).collect())
    }

    async fn list_objects(&self, gvr: &Gvr) -> Result<Vec<Value>, ClusterError> {
        let ar = api_resource(gvr, "");
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &ar);
        let list = api.list(&ListParams::default()).await.map_err(classify)?;

        // List items come back without their own type meta.
        let kind = list.types.kind.strip_suffix("List").unwrap_or_default().to_string();
        list.items
            .into_iter()
            .map(|mut obj| {
                if obj.types.is_none() {
                    obj.types = Some(TypeMeta {
                        api_version: gvr.api_version(),
                        kind: kind.clone(),
                    });
                }
                serde_json::to_value(&obj).map_err(|e| ClusterError::Api {
                    code: 500,
                    message: format!("cannot encode {gvr} object: {e}"),
                })
            })
            .collect()
    }

    async fn apply_namespace(&self, name: &str) -> Result<(), ClusterError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let namespace = json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": {"name": name},
        });
        api.patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Apply(&namespace))
            .await
            .map(|_| ())
            .map_err(classify)
    }

    async fn create_object(&self, gvr: &Gvr, namespace: &str, definition: &Value) -> Result<(), ClusterError> {
        let ar = api_resource(gvr, definition_kind(definition));
        let obj = decode(definition)?;
        let api: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), namespace, &ar);
        api.create(&PostParams::default(), &obj)
            .await
            .map(|_| ())
            .map_err(classify)
    }

    async fn apply_cluster_object(&self, gvr: &Gvr, definition: &Value) -> Result<(), ClusterError> {
        let name = object_name(definition).ok_or_else(|| ClusterError::Api {
            code: 422,
            message: format!("{gvr} object without metadata.name"),
        })?;
        let ar = api_resource(gvr, definition_kind(definition));
        let obj = decode(definition)?;
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &ar);
        api.patch(name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Apply(&obj))
            .await
            .map(|_| ())
            .map_err(classify)
    }
}
