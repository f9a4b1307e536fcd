//! OpenSearchISMPolicy Custom Resource Definition
//!
//! Index State Management policies. Updates use optimistic concurrency on
//! the OpenSearch side (`if_seq_no` / `if_primary_term`).

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::common::ManagedResourceStatus;
use crate::references::OpenSearchClusterRef;
use crate::schema::{optional_preserve_unknown_object, preserve_unknown_array};

/// OpenSearchISMPolicySpec defines the desired state of an ISM policy
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "opensearch.org",
    version = "v1",
    kind = "OpenSearchISMPolicy",
    plural = "opensearchismpolicies",
    shortname = "ismp",
    shortname = "ismpolicy",
    namespaced,
    status = "ManagedResourceStatus",
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"ExistingPolicy","type":"boolean","jsonPath":".status.existingObject"}"#,
    printcolumn = r#"{"name":"PolicyName","type":"string","jsonPath":".status.externalName"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct OpenSearchISMPolicySpec {
    /// Cluster the policy is created in
    pub opensearch_cluster: OpenSearchClusterRef,

    /// Policy id in OpenSearch (defaults to the resource name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<String>,

    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Name of the state new indices start in
    #[serde(default)]
    pub default_state: String,

    /// Policy states
    #[serde(default)]
    pub states: Vec<IsmState>,

    /// Template automatically attaching the policy to new indices
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "optional_preserve_unknown_object")]
    pub ism_template: Option<serde_json::Value>,

    /// Error notification channel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "optional_preserve_unknown_object")]
    pub error_notification: Option<serde_json::Value>,
}

/// One ISM state
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct IsmState {
    /// State name
    pub name: String,

    /// Actions executed when entering the state
    #[serde(default)]
    #[schemars(schema_with = "preserve_unknown_array")]
    pub actions: Vec<serde_json::Value>,

    /// Transitions to other states
    #[serde(default)]
    pub transitions: Vec<IsmTransition>,
}

/// Transition between two ISM states
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct IsmTransition {
    /// Destination state
    pub state_name: String,

    /// Transition conditions (`min_index_age`, `min_doc_count`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "optional_preserve_unknown_object")]
    pub conditions: Option<serde_json::Value>,
}
