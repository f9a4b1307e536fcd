//! OpensearchUserRoleBinding Custom Resource Definition
//!
//! Binds users and backend roles to security roles. Role mappings in
//! OpenSearch are shared between bindings, so the status records exactly
//! what this binding added in order to remove only that on deletion.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::common::ResourceState;
use crate::references::OpenSearchClusterRef;

/// OpensearchUserRoleBindingSpec defines the desired role mappings
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "opensearch.org",
    version = "v1",
    kind = "OpensearchUserRoleBinding",
    plural = "opensearchuserrolebindings",
    shortname = "opensearchuserrolebinding",
    status = "UserRoleBindingStatus",
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct OpensearchUserRoleBindingSpec {
    /// Cluster the mappings are applied to
    pub opensearch_cluster: OpenSearchClusterRef,

    /// Roles to map
    #[serde(default)]
    pub roles: Vec<String>,

    /// Users mapped to every role
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<String>,

    /// Backend roles mapped to every role
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub backend_roles: Vec<String>,
}

/// Observed state of a user-role binding
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserRoleBindingStatus {
    /// Lifecycle state
    #[serde(default)]
    pub state: ResourceState,

    /// Human readable explanation of the current state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// UID of the cluster the mappings were written to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed_cluster: Option<String>,

    /// Roles this binding has added entries to
    #[serde(default)]
    pub provisioned_roles: Vec<String>,

    /// Users this binding has added
    #[serde(default)]
    pub provisioned_users: Vec<String>,

    /// Backend roles this binding has added
    #[serde(default)]
    pub provisioned_backend_roles: Vec<String>,
}
