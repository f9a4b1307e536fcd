//! OpensearchActionGroup Custom Resource Definition

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::common::ManagedResourceStatus;
use crate::references::OpenSearchClusterRef;

/// OpensearchActionGroupSpec defines the desired state of an action group
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "opensearch.org",
    version = "v1",
    kind = "OpensearchActionGroup",
    plural = "opensearchactiongroups",
    shortname = "opensearchactiongroup",
    namespaced,
    status = "ManagedResourceStatus",
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct OpensearchActionGroupSpec {
    /// Cluster the action group is created in
    pub opensearch_cluster: OpenSearchClusterRef,

    /// Actions or other action groups included in this group
    #[serde(default)]
    pub allowed_actions: Vec<String>,

    /// `cluster`, `index` or `kibana`
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,

    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
