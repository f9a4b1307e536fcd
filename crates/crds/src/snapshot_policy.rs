//! OpensearchSnapshotPolicy Custom Resource Definition
//!
//! Snapshot management policies (`_plugins/_sm`).

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::common::ManagedResourceStatus;
use crate::references::OpenSearchClusterRef;
use crate::schema::{optional_preserve_unknown_object, preserve_unknown_object};

/// OpensearchSnapshotPolicySpec defines the desired state of a snapshot policy
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "opensearch.org",
    version = "v1",
    kind = "OpensearchSnapshotPolicy",
    plural = "opensearchsnapshotpolicies",
    shortname = "snapshotpolicy",
    namespaced,
    status = "ManagedResourceStatus",
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"PolicyName","type":"string","jsonPath":".status.externalName"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct OpensearchSnapshotPolicySpec {
    /// Cluster the policy is created in
    pub opensearch_cluster: OpenSearchClusterRef,

    /// Policy name in OpenSearch (defaults to the resource name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_name: Option<String>,

    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Whether the policy is active
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Snapshot configuration (repository, indices, ...)
    pub snapshot_config: SnapshotConfig,

    /// Creation schedule
    #[schemars(schema_with = "preserve_unknown_object")]
    pub creation: serde_json::Value,

    /// Deletion schedule and conditions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "optional_preserve_unknown_object")]
    pub deletion: Option<serde_json::Value>,

    /// Notification settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "optional_preserve_unknown_object")]
    pub notification: Option<serde_json::Value>,
}

/// Snapshot configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotConfig {
    /// Repository snapshots are written to
    pub repository: String,

    /// Index pattern, e.g. `logs-*`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indices: Option<String>,

    /// Date format used in snapshot names
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_format: Option<String>,

    /// Ignore unavailable indices
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_unavailable: Option<bool>,

    /// Include global cluster state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_global_state: Option<bool>,

    /// Allow partial snapshots
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial: Option<bool>,
}
