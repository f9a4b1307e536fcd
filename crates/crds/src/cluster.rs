//! OpenSearchCluster Custom Resource Definition
//!
//! The root declaration of an OpenSearch cluster: node pools, dashboards,
//! TLS and security configuration. The operator projects it onto services,
//! config maps, stateful sets and secrets, and coordinates upgrades and
//! scale-downs through the OpenSearch admin API.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::common::Condition;
use crate::constants::{DEFAULT_DASHBOARDS_IMAGE_REPOSITORY, DEFAULT_HTTP_PORT, DEFAULT_IMAGE_REPOSITORY};
use crate::references::LocalObjectReference;

/// OpenSearchClusterSpec defines the desired state of an OpenSearch cluster
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "opensearch.org",
    version = "v1",
    kind = "OpenSearchCluster",
    plural = "opensearchclusters",
    shortname = "os",
    namespaced,
    status = "OpenSearchClusterStatus",
    printcolumn = r#"{"name":"Health","type":"string","jsonPath":".status.health"}"#,
    printcolumn = r#"{"name":"Nodes","type":"integer","jsonPath":".status.availableNodes"}"#,
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".status.version"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct OpenSearchClusterSpec {
    /// Cluster wide settings
    pub general: GeneralConfig,

    /// Node pools; must be non-empty and `component` must be unique
    pub node_pools: Vec<NodePool>,

    /// OpenSearch Dashboards deployment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dashboards: Option<DashboardsConfig>,

    /// TLS and security plugin configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<SecurityConfig>,

    /// Feature toggles
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conf_mgmt: Option<ConfMgmt>,
}

/// Cluster wide settings
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct GeneralConfig {
    /// `cluster.name` of the OpenSearch cluster (defaults to the resource name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,

    /// HTTP port (default 9200)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_port: Option<i32>,

    /// Distribution vendor, informational
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,

    /// OpenSearch version; changing it triggers a rolling upgrade
    pub version: String,

    /// Name of the client service
    pub service_name: String,

    /// Service account the OpenSearch pods run as
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,

    /// Extra `opensearch.yml` settings
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional_config: BTreeMap<String, String>,

    /// Full image reference overriding the default repository and version tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Image pull policy for OpenSearch containers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,

    /// Drain data nodes (move all shards away) before removing them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drain_data_nodes: Option<bool>,

    /// Snapshot repositories registered once the cluster is running
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub snapshot_repositories: Vec<SnapshotRepository>,
}

/// Snapshot repository registered through `PUT /_snapshot/<name>`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRepository {
    /// Repository name
    pub name: String,

    /// Repository type, e.g. `s3` or `fs`
    #[serde(rename = "type")]
    pub type_: String,

    /// Repository settings
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub settings: BTreeMap<String, String>,
}

/// A homogeneous group of OpenSearch nodes
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct NodePool {
    /// Pool identifier, unique within the cluster
    pub component: String,

    /// Number of nodes
    pub replicas: i32,

    /// Size of the data volume, e.g. `30Gi`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_size: Option<String>,

    /// OpenSearch node roles (`cluster_manager`, `data`, `ingest`, ...)
    pub roles: Vec<String>,

    /// CPU and memory requests and limits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<NodeResources>,

    /// JVM options, e.g. `-Xmx1g -Xms1g`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jvm: Option<String>,

    /// Node selector for the pool's pods
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,

    /// Extra labels applied to the pool's pods
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Data volume source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistence: Option<PersistenceConfig>,
}

impl NodePool {
    /// True when the pool carries the cluster manager role.
    pub fn is_master(&self) -> bool {
        self.roles.iter().any(|r| is_master_role(r))
    }

    /// True when the pool holds shards.
    pub fn is_data(&self) -> bool {
        self.roles.iter().any(|r| r == "data")
    }
}

/// True for both spellings of the cluster manager role.
pub fn is_master_role(role: &str) -> bool {
    role == "master" || role == "cluster_manager"
}

/// Resource quantities keyed by resource name (`cpu`, `memory`)
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct NodeResources {
    /// Requested quantities
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, String>,

    /// Limits
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, String>,
}

/// Where node data lives
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PersistenceConfig {
    /// Persistent volume claim template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pvc: Option<PvcSource>,

    /// Ephemeral storage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub empty_dir: Option<EmptyDirSource>,
}

/// Persistent volume claim settings
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PvcSource {
    /// Storage class; immutable after create
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,

    /// Access modes (default `ReadWriteOnce`)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_modes: Vec<String>,
}

/// Ephemeral volume settings
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct EmptyDirSource {
    /// Optional size limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_limit: Option<String>,
}

/// OpenSearch Dashboards
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct DashboardsConfig {
    /// Deploy dashboards
    pub enable: bool,

    /// Dashboards version (defaults to the cluster version)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Number of dashboards replicas
    #[serde(default = "default_dashboards_replicas")]
    pub replicas: i32,

    /// Full image reference override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// CPU and memory requests and limits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<NodeResources>,
}

fn default_dashboards_replicas() -> i32 {
    1
}

/// Security plugin and TLS configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SecurityConfig {
    /// TLS for transport and HTTP layers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,

    /// Security plugin configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<SecurityPluginConfig>,
}

/// Security plugin configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SecurityPluginConfig {
    /// Secret with `username` and `password` used by the operator for admin calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_credentials_secret: Option<LocalObjectReference>,

    /// Secret holding the security plugin yaml files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_config_secret: Option<LocalObjectReference>,
}

/// TLS profiles
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TlsConfig {
    /// Node to node transport TLS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<TlsProfile>,

    /// REST layer TLS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<TlsProfile>,
}

/// One TLS profile.
///
/// `enabled` and `generate` are tri-state: absent is distinct from `false`
/// on the wire. When enabled, exactly one of `generate=true` or a non-empty
/// `secret` must be set.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TlsProfile {
    /// Enable TLS for this layer; absent means enabled when the profile is present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Let the operator generate certificates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate: Option<bool>,

    /// Secret with `tls.crt`, `tls.key` and `ca.crt`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<LocalObjectReference>,
}

impl TlsProfile {
    /// Effective enabled flag.
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    /// Effective generate flag.
    pub fn generates(&self) -> bool {
        self.generate.unwrap_or(false)
    }

    /// Name of the referenced secret, when non-empty.
    pub fn secret_name(&self) -> Option<&str> {
        self.secret.as_ref().map(|s| s.name.as_str()).filter(|n| !n.is_empty())
    }
}

/// Feature toggles
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConfMgmt {
    /// Autoscaler integration
    #[serde(default)]
    pub auto_scaler: bool,

    /// Monitoring integration
    #[serde(default)]
    pub monitoring: bool,

    /// Allow version updates
    #[serde(default)]
    pub version_update: bool,
}

/// Cluster lifecycle phase
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterPhase {
    /// Children are being created
    #[default]
    #[serde(alias = "Pending", alias = "pending")]
    Pending,

    /// At least one data node is ready
    #[serde(alias = "Running", alias = "running")]
    Running,

    /// Terminal success state, kept for compatibility
    #[serde(alias = "Done", alias = "done")]
    Done,

    /// Persistent failure
    #[serde(alias = "Error", alias = "error")]
    Error,
}

/// One entry of the coordination ledger, e.g. `Scaler / Running / data`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    /// Operation, `Upgrade` or `Scaler`
    pub component: String,

    /// Operation state
    pub status: String,

    /// Target of the operation (node pool component)
    pub description: String,
}

impl ComponentStatus {
    /// Create a ledger entry
    pub fn new(
        component: impl Into<String>,
        status: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            component: component.into(),
            status: status.into(),
            description: description.into(),
        }
    }
}

/// OpenSearchClusterStatus defines the observed state of an OpenSearch cluster
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OpenSearchClusterStatus {
    /// Lifecycle phase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<ClusterPhase>,

    /// Operations in flight
    #[serde(default)]
    pub components_status: Vec<ComponentStatus>,

    /// `Ready` and `Reconciling` conditions
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Generation this status reflects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Version rolled out to every node pool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Last observed health colour
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<String>,

    /// Ready OpenSearch nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_nodes: Option<i32>,
}

impl OpenSearchCluster {
    /// `cluster.name` of the OpenSearch cluster.
    pub fn opensearch_cluster_name(&self) -> String {
        self.spec
            .general
            .cluster_name
            .clone()
            .filter(|n| !n.is_empty())
            .or_else(|| self.metadata.name.clone())
            .unwrap_or_default()
    }

    /// Image for OpenSearch nodes at the declared version.
    pub fn image(&self) -> String {
        self.spec.general.image.clone().filter(|i| !i.is_empty()).unwrap_or_else(|| {
            format!("{}:{}", DEFAULT_IMAGE_REPOSITORY, self.spec.general.version)
        })
    }

    /// Image for the dashboards deployment.
    pub fn dashboards_image(&self) -> String {
        let dashboards = self.spec.dashboards.as_ref();
        if let Some(image) = dashboards.and_then(|d| d.image.clone()).filter(|i| !i.is_empty()) {
            return image;
        }
        let version = dashboards
            .and_then(|d| d.version.clone())
            .unwrap_or_else(|| self.spec.general.version.clone());
        format!("{}:{}", DEFAULT_DASHBOARDS_IMAGE_REPOSITORY, version)
    }

    /// HTTP port of the nodes.
    pub fn http_port(&self) -> i32 {
        self.spec.general.http_port.unwrap_or(DEFAULT_HTTP_PORT)
    }

    /// Whether data nodes are drained before removal.
    pub fn drain_data_nodes(&self) -> bool {
        self.spec.general.drain_data_nodes.unwrap_or(false)
    }

    /// HTTP TLS profile when enabled.
    pub fn http_tls(&self) -> Option<&TlsProfile> {
        self.tls_profile(|t| t.http.as_ref())
    }

    /// Transport TLS profile when enabled.
    pub fn transport_tls(&self) -> Option<&TlsProfile> {
        self.tls_profile(|t| t.transport.as_ref())
    }

    fn tls_profile<'a>(
        &'a self,
        pick: impl Fn(&'a TlsConfig) -> Option<&'a TlsProfile>,
    ) -> Option<&'a TlsProfile> {
        self.spec
            .security
            .as_ref()
            .and_then(|s| s.tls.as_ref())
            .and_then(pick)
            .filter(|p| p.is_enabled())
    }

    /// URL scheme of the REST layer.
    pub fn http_scheme(&self) -> &'static str {
        if self.http_tls().is_some() { "https" } else { "http" }
    }

    /// Current phase, defaulting to pending.
    pub fn phase(&self) -> ClusterPhase {
        self.status.as_ref().and_then(|s| s.phase).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::ObjectMeta;

    fn cluster(version: &str) -> OpenSearchCluster {
        OpenSearchCluster {
            metadata: ObjectMeta {
                name: Some("logs".to_string()),
                namespace: Some("search".to_string()),
                ..Default::default()
            },
            spec: OpenSearchClusterSpec {
                general: GeneralConfig {
                    version: version.to_string(),
                    service_name: "logs".to_string(),
                    ..Default::default()
                },
                node_pools: vec![],
                dashboards: None,
                security: None,
                conf_mgmt: None,
            },
            status: None,
        }
    }

    #[test]
    fn test_default_image_uses_version_tag() {
        assert_eq!(
            cluster("3.4.0").image(),
            "docker.io/opensearchproject/opensearch:3.4.0"
        );
    }

    #[test]
    fn test_image_override_wins() {
        let mut c = cluster("3.4.0");
        c.spec.general.image = Some("registry.local/opensearch:custom".to_string());
        assert_eq!(c.image(), "registry.local/opensearch:custom");
    }

    #[test]
    fn test_cluster_name_falls_back_to_resource_name() {
        let mut c = cluster("2.19.4");
        assert_eq!(c.opensearch_cluster_name(), "logs");
        c.spec.general.cluster_name = Some("prod-logs".to_string());
        assert_eq!(c.opensearch_cluster_name(), "prod-logs");
    }

    #[test]
    fn test_http_tls_absent_enabled_means_enabled() {
        let mut c = cluster("2.19.4");
        assert_eq!(c.http_scheme(), "http");
        c.spec.security = Some(SecurityConfig {
            tls: Some(TlsConfig {
                transport: None,
                http: Some(TlsProfile {
                    enabled: None,
                    generate: Some(true),
                    secret: None,
                }),
            }),
            config: None,
        });
        assert_eq!(c.http_scheme(), "https");

        if let Some(tls) = c.spec.security.as_mut().and_then(|s| s.tls.as_mut()) {
            if let Some(http) = tls.http.as_mut() {
                http.enabled = Some(false);
            }
        }
        assert_eq!(c.http_scheme(), "http");
    }

    #[test]
    fn test_pool_roles() {
        let pool = NodePool {
            component: "masters".to_string(),
            replicas: 3,
            roles: vec!["cluster_manager".to_string()],
            ..Default::default()
        };
        assert!(pool.is_master());
        assert!(!pool.is_data());
    }

    #[test]
    fn test_tri_state_round_trips() {
        let profile: TlsProfile = serde_json::from_str(r#"{"generate":false}"#).unwrap();
        assert_eq!(profile.enabled, None);
        assert_eq!(profile.generate, Some(false));
        let back = serde_json::to_value(&profile).unwrap();
        assert_eq!(back, serde_json::json!({"generate": false}));
    }
}
