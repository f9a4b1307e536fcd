//! OpensearchRole Custom Resource Definition

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::common::ManagedResourceStatus;
use crate::references::OpenSearchClusterRef;

/// OpensearchRoleSpec defines the desired state of a security role
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "opensearch.org",
    version = "v1",
    kind = "OpensearchRole",
    plural = "opensearchroles",
    shortname = "opensearchrole",
    status = "ManagedResourceStatus",
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct OpensearchRoleSpec {
    /// Cluster the role is created in
    pub opensearch_cluster: OpenSearchClusterRef,

    /// Cluster level permissions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cluster_permissions: Vec<String>,

    /// Index level permissions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub index_permissions: Vec<IndexPermissionSpec>,

    /// Tenant permissions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tenant_permissions: Vec<TenantPermissionsSpec>,
}

/// Permissions on a set of indices
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct IndexPermissionSpec {
    /// Index patterns
    #[serde(default)]
    pub index_patterns: Vec<String>,

    /// Document level security query
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dls: Option<String>,

    /// Field level security
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fls: Vec<String>,

    /// Masked fields
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub masked_fields: Vec<String>,

    /// Allowed actions
    #[serde(default)]
    pub allowed_actions: Vec<String>,
}

/// Permissions on a set of tenants
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TenantPermissionsSpec {
    /// Tenant patterns
    #[serde(default)]
    pub tenant_patterns: Vec<String>,

    /// Allowed actions
    #[serde(default)]
    pub allowed_actions: Vec<String>,
}
