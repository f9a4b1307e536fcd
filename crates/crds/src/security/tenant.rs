//! OpensearchTenant Custom Resource Definition

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::common::ManagedResourceStatus;
use crate::references::OpenSearchClusterRef;

/// OpensearchTenantSpec defines the desired state of a tenant
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "opensearch.org",
    version = "v1",
    kind = "OpensearchTenant",
    plural = "opensearchtenants",
    shortname = "opensearchtenant",
    namespaced,
    status = "ManagedResourceStatus",
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct OpensearchTenantSpec {
    /// Cluster the tenant is created in
    pub opensearch_cluster: OpenSearchClusterRef,

    /// Tenant description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
