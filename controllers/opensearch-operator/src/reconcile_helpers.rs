//! Helper functions for common reconciliation patterns
//!
//! Every OpenSearch sub-resource (user, role, tenant, ISM policy, template,
//! ...) goes through the same lifecycle:
//!
//! - the referenced cluster is missing: `ERROR`, requeue
//! - the remote object is absent: create it, `CREATED`
//! - the remote object was created by us: update it when it drifted
//! - the remote object existed before us: `IGNORED`, never written or deleted
//!
//! The per-kind code only describes how to read, write and compare one
//! remote object ([`RemoteSync`]); the lifecycle lives here and works on any
//! [`OpenSearchClientTrait`], so it is tested against the mock gateway.

use async_trait::async_trait;
use crds::{ManagedResourceStatus, ResourceState};
use opensearch_client::{OpenSearchClientTrait, OpenSearchError};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::ControllerError;

/// Reason recorded when a pre-existing remote object is left alone
pub const REASON_EXISTING: &str = "object already exists in OpenSearch and is not managed by this resource";

/// Reason recorded when the cluster reference was changed after creation
pub const REASON_CLUSTER_CHANGED: &str = "cannot change the cluster a resource refers to";

/// What the remote side looks like for one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteState {
    /// No object with that name
    Absent,
    /// An object exists and carries no proof of ownership
    Foreign,
    /// An object exists and is marked as ours (users carry a `k8s-uid` attribute)
    Owned,
}

/// Next step of the sub-resource state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Status names another cluster; refuse to touch anything
    ClusterMismatch,
    /// Pre-existing object; keep the IGNORED status
    Ignore,
    /// Create the remote object
    Create,
    /// Bring the remote object in line with the spec
    Update,
}

/// Decide what to do with a remote object.
///
/// Status-only rules come first so that a mismatched or adopted resource
/// never causes a remote call.
pub fn decide(status: Option<&ManagedResourceStatus>, cluster_uid: &str, remote: RemoteState) -> Decision {
    if let Some(decision) = decide_from_status(status, cluster_uid) {
        return decision;
    }
    let managed_here = status
        .and_then(|s| s.managed_cluster.as_deref())
        .is_some_and(|uid| uid == cluster_uid);

    match remote {
        RemoteState::Absent => Decision::Create,
        RemoteState::Owned => Decision::Update,
        RemoteState::Foreign if managed_here => Decision::Update,
        RemoteState::Foreign => Decision::Ignore,
    }
}

/// Decisions that need no remote lookup.
pub fn decide_from_status(status: Option<&ManagedResourceStatus>, cluster_uid: &str) -> Option<Decision> {
    let status = status?;
    if status.has_managed_cluster() && status.managed_cluster.as_deref() != Some(cluster_uid) {
        return Some(Decision::ClusterMismatch);
    }
    if status.existing_object {
        return Some(Decision::Ignore);
    }
    None
}

/// One remote OpenSearch object and how to converge it.
#[async_trait]
pub trait RemoteSync: Send + Sync {
    /// Kind used in logs, e.g. `user`
    fn kind(&self) -> &'static str;

    /// Name of the object in OpenSearch
    fn external_name(&self) -> &str;

    /// Look the object up.
    async fn remote_state(&self, client: &dyn OpenSearchClientTrait) -> Result<RemoteState, OpenSearchError>;

    /// Create the object.
    async fn create(&self, client: &dyn OpenSearchClientTrait) -> Result<(), OpenSearchError>;

    /// Update the object if it differs; returns true when something was written.
    async fn update(&self, client: &dyn OpenSearchClientTrait) -> Result<bool, OpenSearchError>;

    /// Delete the object.
    async fn delete(&self, client: &dyn OpenSearchClientTrait) -> Result<(), OpenSearchError>;
}

/// Persists the status of the resource being reconciled.
#[async_trait]
pub trait StatusWriter: Send + Sync {
    /// Write `status` to the resource.
    async fn write(&self, status: &ManagedResourceStatus) -> Result<(), ControllerError>;
}

/// Reason recorded while the remote object is being created
pub const REASON_CREATING: &str = "creating object in OpenSearch";

/// PENDING status recording ownership ahead of a create.
pub fn claimed_status(cluster_uid: &str, external_name: &str) -> ManagedResourceStatus {
    ManagedResourceStatus {
        state: ResourceState::Pending,
        reason: Some(REASON_CREATING.to_string()),
        managed_cluster: Some(cluster_uid.to_string()),
        existing_object: false,
        external_name: Some(external_name.to_string()),
    }
}

/// True when `status` already records the remote object as created by us.
pub fn claims_ownership(status: Option<&ManagedResourceStatus>, cluster_uid: &str) -> bool {
    status.is_some_and(|s| !s.existing_object && s.managed_cluster.as_deref() == Some(cluster_uid))
}

/// Status after a successful create or update.
pub fn created_status(cluster_uid: &str, external_name: &str) -> ManagedResourceStatus {
    ManagedResourceStatus {
        state: ResourceState::Created,
        reason: None,
        managed_cluster: Some(cluster_uid.to_string()),
        existing_object: false,
        external_name: Some(external_name.to_string()),
    }
}

/// Status for a pre-existing remote object.
pub fn ignored_status(cluster_uid: &str, external_name: &str, reason: impl Into<String>) -> ManagedResourceStatus {
    ManagedResourceStatus {
        state: ResourceState::Ignored,
        reason: Some(reason.into()),
        managed_cluster: Some(cluster_uid.to_string()),
        existing_object: true,
        external_name: Some(external_name.to_string()),
    }
}

/// ERROR status that keeps the ownership fields of `current`.
pub fn error_status(current: Option<&ManagedResourceStatus>, reason: impl Into<String>) -> ManagedResourceStatus {
    let mut status = current.cloned().unwrap_or_default();
    status.state = ResourceState::Error;
    status.reason = Some(reason.into());
    status
}

/// PENDING status that keeps the ownership fields of `current`.
pub fn pending_status(current: Option<&ManagedResourceStatus>, reason: impl Into<String>) -> ManagedResourceStatus {
    let mut status = current.cloned().unwrap_or_default();
    status.state = ResourceState::Pending;
    status.reason = Some(reason.into());
    status
}

/// Drive one remote object through the lifecycle.
///
/// Returns the status to persist. Gateway failures other than ownership
/// conflicts are returned as errors so the caller can record them and
/// requeue with backoff.
///
/// Ownership is written through `status_writer` before a create, so an
/// object created by a pass whose final status write is lost is still
/// recognised as ours on the next pass.
pub async fn sync_remote(
    client: &dyn OpenSearchClientTrait,
    sync: &dyn RemoteSync,
    current: Option<&ManagedResourceStatus>,
    cluster_uid: &str,
    status_writer: &dyn StatusWriter,
) -> Result<ManagedResourceStatus, ControllerError> {
    let name = sync.external_name();

    match decide_from_status(current, cluster_uid) {
        Some(Decision::ClusterMismatch) => {
            warn!(
                "{} {} belongs to cluster {:?}, not {}; leaving it untouched",
                sync.kind(),
                name,
                current.and_then(|s| s.managed_cluster.as_deref()),
                cluster_uid
            );
            return Ok(error_status(current, REASON_CLUSTER_CHANGED));
        }
        Some(_) => {
            debug!("{} {} existed before this resource, ignoring", sync.kind(), name);
            return Ok(current.cloned().unwrap_or_default());
        }
        None => {}
    }

    let remote = sync.remote_state(client).await?;
    match decide(current, cluster_uid, remote) {
        Decision::Create => {
            if current.is_some_and(ManagedResourceStatus::has_managed_cluster) {
                warn!("{} {} was removed from OpenSearch, recreating", sync.kind(), name);
            }
            if !claims_ownership(current, cluster_uid) {
                status_writer.write(&claimed_status(cluster_uid, name)).await?;
            }
            sync.create(client).await?;
            info!("Created {} {} in OpenSearch", sync.kind(), name);
            Ok(created_status(cluster_uid, name))
        }
        Decision::Update => match sync.update(client).await {
            Ok(true) => {
                info!("Updated {} {} in OpenSearch", sync.kind(), name);
                Ok(created_status(cluster_uid, name))
            }
            Ok(false) => {
                debug!("{} {} already up-to-date in OpenSearch", sync.kind(), name);
                Ok(created_status(cluster_uid, name))
            }
            Err(OpenSearchError::Ownership(reason)) => {
                warn!("{} {} is owned by another resource: {}", sync.kind(), name, reason);
                Ok(ignored_status(cluster_uid, name, reason))
            }
            Err(e) => Err(e.into()),
        },
        Decision::Ignore => {
            info!("{} {} already exists in OpenSearch, marking as ignored", sync.kind(), name);
            Ok(ignored_status(cluster_uid, name, REASON_EXISTING))
        }
        // Handled by decide_from_status above
        Decision::ClusterMismatch => Ok(error_status(current, REASON_CLUSTER_CHANGED)),
    }
}

/// True when deleting the resource must also delete the remote object.
pub fn owns_remote(status: Option<&ManagedResourceStatus>, cluster_uid: &str) -> bool {
    status.is_some_and(|s| {
        !s.existing_object && s.state != ResourceState::Ignored && s.managed_cluster.as_deref() == Some(cluster_uid)
    })
}

/// Remove the remote object on resource deletion.
///
/// Returns true when a delete was issued. Objects that existed before the
/// resource, were never created, or belong to another cluster are left alone.
pub async fn delete_remote(
    client: &dyn OpenSearchClientTrait,
    sync: &dyn RemoteSync,
    status: Option<&ManagedResourceStatus>,
    cluster_uid: &str,
) -> Result<bool, ControllerError> {
    if !owns_remote(status, cluster_uid) {
        debug!("{} {} is not owned by this resource, keeping it", sync.kind(), sync.external_name());
        return Ok(false);
    }
    match sync.delete(client).await {
        Ok(()) => {
            info!("Deleted {} {} from OpenSearch", sync.kind(), sync.external_name());
            Ok(true)
        }
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Merge patch writing `status`, with explicit nulls so stale fields are cleared.
pub fn status_patch(status: &ManagedResourceStatus) -> Value {
    serde_json::json!({
        "status": {
            "state": status.state,
            "reason": status.reason,
            "managedCluster": status.managed_cluster,
            "existingObject": status.existing_object,
            "externalName": status.external_name,
        }
    })
}

/// Check if status needs updating.
///
/// Skipping identical writes keeps status patches from re-triggering the watch.
pub fn status_needs_update(current: Option<&ManagedResourceStatus>, desired: &ManagedResourceStatus) -> bool {
    current != Some(desired)
}

/// True when every field of `desired` is present in `existing` with the same value.
///
/// OpenSearch decorates stored objects (policy ids, timestamps, schema
/// versions) and returns some numbers as strings, so a plain equality check
/// would report drift on every pass.
pub fn json_contains(existing: &Value, desired: &Value) -> bool {
    match (existing, desired) {
        (_, Value::Null) => true,
        (Value::Object(e), Value::Object(d)) => d.iter().all(|(key, dv)| match e.get(key) {
            Some(ev) => json_contains(ev, dv),
            None => dv.is_null(),
        }),
        (Value::Array(e), Value::Array(d)) => {
            e.len() == d.len() && e.iter().zip(d).all(|(ev, dv)| json_contains(ev, dv))
        }
        (Value::String(e), Value::Number(d)) => e == &d.to_string(),
        (Value::String(e), Value::Bool(d)) => e == &d.to_string(),
        (Value::Number(e), Value::Number(d)) => e.as_f64() == d.as_f64(),
        (e, d) => e == d,
    }
}

/// Drop top-level null fields from a request body.
///
/// Only the first level is touched: nested empty objects such as
/// `{"delete": {}}` are meaningful to OpenSearch.
pub fn without_null_fields(mut value: Value) -> Value {
    if let Value::Object(map) = &mut value {
        map.retain(|_, v| !v.is_null());
    }
    value
}
