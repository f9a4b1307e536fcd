//! OpenSearch admin API models
//!
//! These models match the JSON returned by the OpenSearch REST API
//! (`_cluster`, `_cat` with `format=json`, `_nodes`, and the security, ISM,
//! snapshot management and template plugins). Unknown fields are ignored so
//! responses from newer OpenSearch versions still decode.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Response of `GET /`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ClusterInfo {
    /// Node name that answered
    #[serde(default)]
    pub name: String,
    /// `cluster.name`
    #[serde(default)]
    pub cluster_name: String,
    /// Version block
    #[serde(default)]
    pub version: VersionInfo,
}

/// Version block of `GET /`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct VersionInfo {
    /// Distribution, `opensearch`
    #[serde(default)]
    pub distribution: Option<String>,
    /// Version number, e.g. `2.19.4`
    #[serde(default)]
    pub number: String,
}

/// Cluster health colour
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All shards allocated
    Green,
    /// All primaries allocated, some replicas missing
    Yellow,
    /// Some primaries missing
    #[default]
    Red,
}

impl HealthStatus {
    /// Lower case colour name
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Green => "green",
            HealthStatus::Yellow => "yellow",
            HealthStatus::Red => "red",
        }
    }
}

/// Response of `GET /_cluster/health?level=indices`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ClusterHealth {
    /// `cluster.name`
    #[serde(default)]
    pub cluster_name: String,
    /// Health colour
    pub status: HealthStatus,
    /// Nodes in the cluster
    #[serde(default)]
    pub number_of_nodes: i64,
    /// Data nodes in the cluster
    #[serde(default)]
    pub number_of_data_nodes: i64,
    /// Active primary shards
    #[serde(default)]
    pub active_primary_shards: i64,
    /// Active shards
    #[serde(default)]
    pub active_shards: i64,
    /// Shards moving between nodes
    #[serde(default)]
    pub relocating_shards: i64,
    /// Shards being initialized
    #[serde(default)]
    pub initializing_shards: i64,
    /// Shards not assigned to any node
    #[serde(default)]
    pub unassigned_shards: i64,
    /// Per-index health, present with `level=indices`
    #[serde(default)]
    pub indices: BTreeMap<String, IndexHealth>,
}

/// Health of one index
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct IndexHealth {
    /// Health colour
    pub status: HealthStatus,
    /// Primary shard count
    #[serde(default)]
    pub number_of_shards: i64,
    /// Replica count
    #[serde(default)]
    pub number_of_replicas: i64,
    /// Unassigned shards of this index
    #[serde(default)]
    pub unassigned_shards: i64,
}

/// Row of `GET /_cat/nodes?format=json`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CatNode {
    /// Node IP
    #[serde(default)]
    pub ip: Option<String>,
    /// Node name
    #[serde(default)]
    pub name: String,
    /// Abbreviated roles, e.g. `dimr`
    #[serde(default, rename = "node.role")]
    pub node_role: Option<String>,
    /// Heap usage percent
    #[serde(default, rename = "heap.percent")]
    pub heap_percent: Option<String>,
    /// RAM usage percent
    #[serde(default, rename = "ram.percent")]
    pub ram_percent: Option<String>,
    /// CPU usage percent
    #[serde(default)]
    pub cpu: Option<String>,
    /// One minute load average
    #[serde(default)]
    pub load_1m: Option<String>,
    /// `*` on the elected cluster manager
    #[serde(default, alias = "master")]
    pub cluster_manager: Option<String>,
}

/// Response of `GET /_nodes/stats`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct NodesStats {
    /// Stats keyed by node id
    #[serde(default)]
    pub nodes: BTreeMap<String, NodeStats>,
}

/// Stats of one node
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct NodeStats {
    /// Node name
    #[serde(default)]
    pub name: String,
    /// Host
    #[serde(default)]
    pub host: Option<String>,
    /// IP
    #[serde(default)]
    pub ip: Option<String>,
    /// Node roles
    #[serde(default)]
    pub roles: Vec<String>,
    /// OS telemetry
    #[serde(default)]
    pub os: Option<serde_json::Value>,
    /// JVM telemetry
    #[serde(default)]
    pub jvm: Option<serde_json::Value>,
    /// Filesystem telemetry
    #[serde(default)]
    pub fs: Option<serde_json::Value>,
}

/// Row of `GET /_cat/indices?format=json`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CatIndex {
    /// Health colour
    #[serde(default)]
    pub health: Option<String>,
    /// `open` or `close`
    #[serde(default)]
    pub status: Option<String>,
    /// Index name
    pub index: String,
    /// Index uuid
    #[serde(default)]
    pub uuid: Option<String>,
    /// Primary shard count
    #[serde(default)]
    pub pri: Option<String>,
    /// Replica count
    #[serde(default)]
    pub rep: Option<String>,
    /// Document count
    #[serde(default, rename = "docs.count")]
    pub docs_count: Option<String>,
    /// Store size
    #[serde(default, rename = "store.size")]
    pub store_size: Option<String>,
}

impl CatIndex {
    /// Replica count, `None` when absent or unparsable.
    pub fn replicas(&self) -> Option<u32> {
        self.rep.as_deref().and_then(|r| r.parse().ok())
    }
}

/// Row of `GET /_cat/shards?format=json`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CatShard {
    /// Index name
    pub index: String,
    /// Shard number
    #[serde(default)]
    pub shard: String,
    /// `p` for primaries, `r` for replicas
    #[serde(default)]
    pub prirep: String,
    /// `STARTED`, `RELOCATING`, `INITIALIZING` or `UNASSIGNED`
    #[serde(default)]
    pub state: String,
    /// Document count
    #[serde(default)]
    pub docs: Option<String>,
    /// Store size
    #[serde(default)]
    pub store: Option<String>,
    /// IP of the holding node
    #[serde(default)]
    pub ip: Option<String>,
    /// Holding node name; for relocating shards `source -> ip id target`
    #[serde(default)]
    pub node: Option<String>,
    /// Reason a shard is unassigned
    #[serde(default, rename = "unassigned.reason")]
    pub unassigned_reason: Option<String>,
}

impl CatShard {
    /// True for primaries.
    pub fn is_primary(&self) -> bool {
        self.prirep == "p"
    }

    /// True once the shard is started.
    pub fn is_started(&self) -> bool {
        self.state == "STARTED"
    }

    /// True when the shard currently lives on `node`.
    ///
    /// Relocating shards report `source -> ip id target`; the shard still
    /// counts as being on both ends until the relocation finishes.
    pub fn is_on_node(&self, node: &str) -> bool {
        match self.node.as_deref() {
            Some(holder) => {
                holder == node
                    || holder.split_whitespace().next() == Some(node)
                    || holder.split_whitespace().last() == Some(node)
            }
            None => false,
        }
    }
}

/// Cluster-wide shard allocation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardAllocation {
    /// Allocate every shard
    All,
    /// Allocate primaries only
    Primaries,
    /// Allocate nothing
    None,
}

impl ShardAllocation {
    /// Setting value
    pub fn as_str(&self) -> &'static str {
        match self {
            ShardAllocation::All => "all",
            ShardAllocation::Primaries => "primaries",
            ShardAllocation::None => "none",
        }
    }

    /// Parse a setting value; unknown values are `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "all" => Some(ShardAllocation::All),
            "primaries" => Some(ShardAllocation::Primaries),
            "none" => Some(ShardAllocation::None),
            _ => None,
        }
    }
}

/// `cluster.routing.allocation.enable`
pub const ALLOCATION_ENABLE_SETTING: &str = "cluster.routing.allocation.enable";

/// `cluster.routing.allocation.exclude._name`
pub const EXCLUDE_NAME_SETTING: &str = "cluster.routing.allocation.exclude._name";

/// Response of `GET /_cluster/settings`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ClusterSettings {
    /// Persistent settings
    #[serde(default)]
    pub persistent: serde_json::Map<String, serde_json::Value>,
    /// Transient settings
    #[serde(default)]
    pub transient: serde_json::Map<String, serde_json::Value>,
}

impl ClusterSettings {
    /// Look up a flat setting, transient first.
    ///
    /// Works on `flat_settings=true` responses; nested responses are walked
    /// by dotted path as a fallback.
    pub fn get(&self, key: &str) -> Option<&str> {
        lookup(&self.transient, key).or_else(|| lookup(&self.persistent, key))
    }

    /// Effective shard allocation; OpenSearch defaults to `all`.
    pub fn shard_allocation(&self) -> ShardAllocation {
        self.get(ALLOCATION_ENABLE_SETTING)
            .and_then(ShardAllocation::parse)
            .unwrap_or(ShardAllocation::All)
    }

    /// Current exclude-by-name list, empty when unset.
    pub fn exclude_names(&self) -> &str {
        self.get(EXCLUDE_NAME_SETTING).unwrap_or("")
    }
}

fn lookup<'a>(map: &'a serde_json::Map<String, serde_json::Value>, key: &str) -> Option<&'a str> {
    if let Some(v) = map.get(key) {
        return v.as_str();
    }
    let mut current: Option<&serde_json::Value> = None;
    for (i, part) in key.split('.').enumerate() {
        current = if i == 0 { map.get(part) } else { current.and_then(|c| c.get(part)) };
    }
    current.and_then(|v| v.as_str())
}

/// Response of `POST /_cluster/reroute`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RerouteResponse {
    /// Whether the command was acknowledged
    #[serde(default)]
    pub acknowledged: bool,
    /// Resulting cluster state (routing table)
    #[serde(default)]
    pub state: serde_json::Value,
}

/// Internal user of the security plugin
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct InternalUser {
    /// Clear text password; only sent, never returned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Password hash as returned by OpenSearch
    #[serde(default, skip_serializing)]
    pub hash: Option<String>,
    /// Roles assigned directly
    #[serde(default)]
    pub opendistro_security_roles: Vec<String>,
    /// Backend roles
    #[serde(default)]
    pub backend_roles: Vec<String>,
    /// Attributes; carries the `k8s-uid` ownership marker
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

/// Security role
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Role {
    /// Cluster permissions
    #[serde(default)]
    pub cluster_permissions: Vec<String>,
    /// Index permissions
    #[serde(default)]
    pub index_permissions: Vec<IndexPermission>,
    /// Tenant permissions
    #[serde(default)]
    pub tenant_permissions: Vec<TenantPermission>,
}

/// Index permission block of a role
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct IndexPermission {
    /// Index patterns
    #[serde(default)]
    pub index_patterns: Vec<String>,
    /// Document level security
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dls: Option<String>,
    /// Field level security
    #[serde(default)]
    pub fls: Vec<String>,
    /// Masked fields
    #[serde(default)]
    pub masked_fields: Vec<String>,
    /// Allowed actions
    #[serde(default)]
    pub allowed_actions: Vec<String>,
}

/// Tenant permission block of a role
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TenantPermission {
    /// Tenant patterns
    #[serde(default)]
    pub tenant_patterns: Vec<String>,
    /// Allowed actions
    #[serde(default)]
    pub allowed_actions: Vec<String>,
}

/// Role mapping
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RoleMapping {
    /// Backend roles mapped to the role
    #[serde(default)]
    pub backend_roles: Vec<String>,
    /// Hosts mapped to the role
    #[serde(default)]
    pub hosts: Vec<String>,
    /// Users mapped to the role
    #[serde(default)]
    pub users: Vec<String>,
}

/// Tenant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Tenant {
    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Action group
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ActionGroup {
    /// Included actions
    #[serde(default)]
    pub allowed_actions: Vec<String>,
    /// `cluster`, `index` or `kibana`
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A versioned document returned by the ISM and snapshot management plugins
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct VersionedPolicy {
    /// Policy id
    #[serde(default, rename = "_id")]
    pub id: String,
    /// Sequence number for optimistic concurrency
    #[serde(default, rename = "_seq_no")]
    pub seq_no: i64,
    /// Primary term for optimistic concurrency
    #[serde(default, rename = "_primary_term")]
    pub primary_term: i64,
    /// Policy body (`policy` for ISM, `sm_policy` for snapshot management)
    #[serde(default, alias = "sm_policy")]
    pub policy: serde_json::Value,
}

/// Stored script body used for search templates
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StoredScript {
    /// Script language
    pub lang: String,
    /// Script source
    pub source: String,
}

/// Snapshot repository definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SnapshotRepository {
    /// Repository type
    #[serde(rename = "type")]
    pub type_: String,
    /// Repository settings
    #[serde(default)]
    pub settings: BTreeMap<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_settings_lookup_prefers_transient() {
        let settings: ClusterSettings = serde_json::from_value(serde_json::json!({
            "persistent": {"cluster.routing.allocation.enable": "none"},
            "transient": {"cluster.routing.allocation.enable": "primaries"}
        }))
        .unwrap();
        assert_eq!(settings.shard_allocation(), ShardAllocation::Primaries);
    }

    #[test]
    fn test_nested_settings_lookup() {
        let settings: ClusterSettings = serde_json::from_value(serde_json::json!({
            "transient": {"cluster": {"routing": {"allocation": {"exclude": {"_name": "n1,n2"}}}}}
        }))
        .unwrap();
        assert_eq!(settings.exclude_names(), "n1,n2");
        assert_eq!(settings.shard_allocation(), ShardAllocation::All);
    }

    #[test]
    fn test_relocating_shard_counts_on_both_nodes() {
        let shard = CatShard {
            index: "logs".into(),
            prirep: "p".into(),
            state: "RELOCATING".into(),
            node: Some("node-a -> 10.0.0.2 Xyz node-b".into()),
            ..Default::default()
        };
        assert!(shard.is_on_node("node-a"));
        assert!(shard.is_on_node("node-b"));
        assert!(!shard.is_on_node("node-c"));
    }

    #[test]
    fn test_health_decodes_indices_level() {
        let health: ClusterHealth = serde_json::from_value(serde_json::json!({
            "cluster_name": "logs",
            "status": "yellow",
            "relocating_shards": 0,
            "initializing_shards": 0,
            "unassigned_shards": 1,
            "indices": {
                ".opensearch-observability": {"status": "yellow", "number_of_shards": 1, "number_of_replicas": 1}
            }
        }))
        .unwrap();
        assert_eq!(health.status, HealthStatus::Yellow);
        assert_eq!(health.indices.len(), 1);
    }

    #[test]
    fn test_user_password_never_decoded_from_hash() {
        let user: InternalUser = serde_json::from_value(serde_json::json!({
            "hash": "",
            "backend_roles": ["admin"],
            "attributes": {"k8s-uid": "abc"}
        }))
        .unwrap();
        assert!(user.password.is_none());
        let out = serde_json::to_value(&user).unwrap();
        assert!(out.get("hash").is_none());
    }
}
