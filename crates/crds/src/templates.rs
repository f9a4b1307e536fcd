//! Index and component template Custom Resource Definitions

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::common::ManagedResourceStatus;
use crate::references::OpenSearchClusterRef;
use crate::schema::optional_preserve_unknown_object;

/// OpensearchIndexTemplateSpec defines the desired state of a composable index template
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "opensearch.org",
    version = "v1",
    kind = "OpensearchIndexTemplate",
    plural = "opensearchindextemplates",
    shortname = "opensearchindextemplate",
    namespaced,
    status = "ManagedResourceStatus",
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Template","type":"string","jsonPath":".status.externalName"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct OpensearchIndexTemplateSpec {
    /// Cluster the template is created in
    pub opensearch_cluster: OpenSearchClusterRef,

    /// Template name in OpenSearch (defaults to the resource name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Index patterns the template applies to
    #[serde(default)]
    pub index_patterns: Vec<String>,

    /// Settings, mappings and aliases
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "optional_preserve_unknown_object")]
    pub template: Option<serde_json::Value>,

    /// Component templates composed into this template, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub composed_of: Vec<String>,

    /// Priority among matching templates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,

    /// User supplied version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,

    /// Free-form metadata
    #[serde(default, rename = "_meta", skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "optional_preserve_unknown_object")]
    pub meta: Option<serde_json::Value>,

    /// Data stream settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "optional_preserve_unknown_object")]
    pub data_stream: Option<serde_json::Value>,
}

/// OpensearchComponentTemplateSpec defines the desired state of a component template
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "opensearch.org",
    version = "v1",
    kind = "OpensearchComponentTemplate",
    plural = "opensearchcomponenttemplates",
    shortname = "opensearchcomponenttemplate",
    namespaced,
    status = "ManagedResourceStatus",
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Template","type":"string","jsonPath":".status.externalName"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct OpensearchComponentTemplateSpec {
    /// Cluster the template is created in
    pub opensearch_cluster: OpenSearchClusterRef,

    /// Template name in OpenSearch (defaults to the resource name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Settings, mappings and aliases
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "optional_preserve_unknown_object")]
    pub template: Option<serde_json::Value>,

    /// User supplied version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,

    /// Free-form metadata
    #[serde(default, rename = "_meta", skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "optional_preserve_unknown_object")]
    pub meta: Option<serde_json::Value>,

    /// Allow indices matching this template to be auto-created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_auto_create: Option<bool>,
}
