//! Status types shared by every OpenSearch sub-resource CRD.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a sub-resource.
///
/// Serializes as upper case ("CREATED", "IGNORED", ...) but deserializes
/// PascalCase and lowercase as well, so status written by older operator
/// versions still parses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceState {
    /// Waiting for the referenced cluster or for the first reconcile
    #[default]
    #[serde(alias = "Pending", alias = "pending")]
    Pending,

    /// The OpenSearch-side object was created (or is owned) by this resource
    #[serde(alias = "Created", alias = "created")]
    Created,

    /// A pre-existing OpenSearch-side object was found and is left untouched
    #[serde(alias = "Ignored", alias = "ignored")]
    Ignored,

    /// Reconciliation failed; see `reason`
    #[serde(alias = "Error", alias = "error")]
    Error,
}

impl std::fmt::Display for ResourceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResourceState::Pending => "PENDING",
            ResourceState::Created => "CREATED",
            ResourceState::Ignored => "IGNORED",
            ResourceState::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Observed state of a sub-resource (user, role, template, policy, ...).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ManagedResourceStatus {
    /// Lifecycle state
    #[serde(default)]
    pub state: ResourceState,

    /// Human readable explanation of the current state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// UID of the OpenSearchCluster that created the OpenSearch-side object.
    /// Once set it only changes through delete and recreate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed_cluster: Option<String>,

    /// True when the OpenSearch-side object existed before this resource
    #[serde(default)]
    pub existing_object: bool,

    /// Name of the object as seen by OpenSearch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_name: Option<String>,
}

impl ManagedResourceStatus {
    /// Status for a resource waiting on something outside its control.
    pub fn pending(reason: impl Into<String>) -> Self {
        Self {
            state: ResourceState::Pending,
            reason: Some(reason.into()),
            ..Default::default()
        }
    }

    /// True once the managed cluster has been recorded.
    pub fn has_managed_cluster(&self) -> bool {
        self.managed_cluster.as_deref().is_some_and(|uid| !uid.is_empty())
    }
}

/// A standard Kubernetes-style condition.
///
/// Defined locally rather than reusing `meta/v1.Condition` so timestamps
/// stay `chrono` values like the rest of the status types.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type, e.g. `Ready`
    #[serde(rename = "type")]
    pub type_: String,

    /// `True`, `False` or `Unknown`
    pub status: String,

    /// Machine readable reason in CamelCase
    #[serde(default)]
    pub reason: String,

    /// One line human readable message
    #[serde(default)]
    pub message: String,

    /// Last time the status flipped
    pub last_transition_time: chrono::DateTime<chrono::Utc>,

    /// Generation the condition was computed from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}
