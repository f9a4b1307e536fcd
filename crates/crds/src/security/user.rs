//! OpensearchUser Custom Resource Definition
//!
//! Declares an internal user of the OpenSearch security plugin. The password
//! is read from a secret and never stored in the resource itself.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::common::ManagedResourceStatus;
use crate::references::{OpenSearchClusterRef, SecretKeySelector};

/// OpensearchUserSpec defines the desired state of an internal user
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "opensearch.org",
    version = "v1",
    kind = "OpensearchUser",
    plural = "opensearchusers",
    shortname = "opensearchuser",
    status = "ManagedResourceStatus",
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct OpensearchUserSpec {
    /// Cluster the user is created in
    pub opensearch_cluster: OpenSearchClusterRef,

    /// Secret key holding the password
    pub password_from: SecretKeySelector,

    /// Roles assigned directly to the user
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub opendistro_security_roles: Vec<String>,

    /// Backend roles
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub backend_roles: Vec<String>,

    /// Free-form attributes
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}
