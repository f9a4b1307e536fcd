//! Kubernetes object references for OpenSearch CRDs
//!
//! Every sub-resource points at the `OpenSearchCluster` it is applied to.
//! The reference is immutable once the resource has been created; the
//! admission webhook enforces that.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to the `OpenSearchCluster` a sub-resource is applied to.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct OpenSearchClusterRef {
    /// Name of the OpenSearchCluster
    pub name: String,

    /// Namespace of the cluster (defaults to the namespace of the referencing resource)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl OpenSearchClusterRef {
    /// Create a reference to a cluster in the referencing resource's namespace
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
        }
    }

    /// Create a reference with an explicit namespace
    pub fn with_namespace(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: Some(namespace.into()),
        }
    }

    /// Namespace the cluster lives in.
    ///
    /// Cluster-scoped sub-resources have no namespace of their own, so the
    /// fallback is `default` when neither side provides one.
    pub fn resolve_namespace<'a>(&'a self, own_namespace: Option<&'a str>) -> &'a str {
        self.namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
            .or(own_namespace)
            .unwrap_or("default")
    }
}

/// Reference to a secret in the same namespace.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct LocalObjectReference {
    /// Name of the referenced object
    pub name: String,
}

/// Selects a key of a secret.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeySelector {
    /// Name of the secret
    pub name: String,

    /// Key within the secret
    pub key: String,

    /// Namespace of the secret (defaults to the cluster's namespace)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_namespace_prefers_explicit() {
        let r = OpenSearchClusterRef::with_namespace("logs", "search");
        assert_eq!(r.resolve_namespace(Some("apps")), "search");
    }

    #[test]
    fn test_resolve_namespace_falls_back() {
        let r = OpenSearchClusterRef::new("logs");
        assert_eq!(r.resolve_namespace(Some("apps")), "apps");
        assert_eq!(r.resolve_namespace(None), "default");

        let empty = OpenSearchClusterRef::with_namespace("logs", "");
        assert_eq!(empty.resolve_namespace(Some("apps")), "apps");
    }
}
