//! OpensearchSearchTemplate Custom Resource Definition
//!
//! Stored mustache search templates (`PUT _scripts/<id>`).

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::common::ManagedResourceStatus;
use crate::references::OpenSearchClusterRef;

/// OpensearchSearchTemplateSpec defines the desired state of a stored search template
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "opensearch.org",
    version = "v1",
    kind = "OpensearchSearchTemplate",
    plural = "opensearchsearchtemplates",
    shortname = "opensearchsearchtemplate",
    namespaced,
    status = "ManagedResourceStatus",
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct OpensearchSearchTemplateSpec {
    /// Cluster the template is stored in
    pub opensearch_cluster: OpenSearchClusterRef,

    /// Script id in OpenSearch (defaults to the resource name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Template source (mustache)
    pub source: String,

    /// Script language
    #[serde(default = "default_lang")]
    pub lang: String,
}

fn default_lang() -> String {
    "mustache".to_string()
}
