//! Generic create / update / delete driver for Kubernetes objects.
//!
//! Objects are handled as [`DynamicObject`]s so one code path serves
//! services, stateful sets, secrets and CRDs alike. Updates are sent as the
//! patch computed by [`object_patch::calculate_patch`], carrying the new
//! last-applied annotation and the observed `resourceVersion`.
//!
//! When an update is rejected because it touches an immutable field, the
//! object can be recreated, either immediately or by deleting it in the
//! foreground and waiting for the next pass.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use crds::FIELD_MANAGER;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, Patch, PatchParams, PostParams, PropagationPolicy,
};
use kube::{Client, Resource};
use object_patch::{
    LAST_APPLIED_ANNOTATION, PatchOptions, PatchType, calculate_patch, get_original_configuration,
    set_original_configuration,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{ControllerError, ErrorKind};

/// Requeue delay while an object is being deleted
const DELETING_REQUEUE: Duration = Duration::from_secs(2);

/// Requeue delay after a foreground delete in deferred recreate mode
const RECREATE_REQUEUE: Duration = Duration::from_secs(10);

/// Upper bound for waiting on a new CRD to be established
const CRD_ESTABLISHED_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll interval while waiting on a new CRD
const CRD_ESTABLISHED_TICK: Duration = Duration::from_secs(1);

/// What the caller wants for an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DesiredState {
    /// Create or update to match
    #[default]
    Present,
    /// Delete if it exists
    Absent,
    /// Create if missing, never update
    Created,
}

/// What a reconcile call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Live object already matched
    Unchanged,
    /// Object was created
    Created,
    /// Object was patched
    Updated,
    /// Object was deleted
    Deleted,
    /// Object was deleted and created again
    Recreated,
    /// Nothing could be done now; try again after the delay
    Requeue(Duration),
}

impl ReconcileOutcome {
    /// Requeue delay, if any.
    pub fn requeue_after(&self) -> Option<Duration> {
        match self {
            ReconcileOutcome::Requeue(after) => Some(*after),
            _ => None,
        }
    }

    /// True when the live object was written.
    pub fn changed(&self) -> bool {
        !matches!(self, ReconcileOutcome::Unchanged | ReconcileOutcome::Requeue(_))
    }
}

/// Recreate-on-immutable-field behaviour
#[derive(Debug, Clone)]
pub struct RecreateOptions {
    /// Recreate at all
    pub enabled: bool,
    /// Delete and create in the same pass instead of requeueing
    pub immediate: bool,
    /// Propagation for the immediate delete
    pub propagation: PropagationPolicy,
    /// Kinds that may be recreated
    pub allowed_kinds: Vec<String>,
    /// Substrings of the API error message that mark an immutable-field rejection
    pub error_markers: Vec<String>,
}

impl Default for RecreateOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            immediate: true,
            propagation: PropagationPolicy::Background,
            allowed_kinds: ["Service", "StatefulSet", "DaemonSet", "Deployment"]
                .iter()
                .map(ToString::to_string)
                .collect(),
            error_markers: [
                "immutable",
                "may not change once set",
                "updates to statefulset spec for fields other than",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
        }
    }
}

impl RecreateOptions {
    /// True when a 422 message denotes an immutable-field rejection.
    pub fn matches_error(&self, message: &str) -> bool {
        self.error_markers.iter().any(|m| message.contains(m.as_str()))
    }

    /// True when `kind` may be recreated.
    pub fn allows_kind(&self, kind: &str) -> bool {
        self.enabled && self.allowed_kinds.iter().any(|k| k == kind)
    }
}

/// Drives one object towards its desired state.
#[derive(Clone)]
pub struct ResourceReconciler {
    client: Client,
    recreate: RecreateOptions,
}

impl std::fmt::Debug for ResourceReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceReconciler").field("recreate", &self.recreate).finish()
    }
}

impl ResourceReconciler {
    /// Create a reconciler with default recreate behaviour.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            recreate: RecreateOptions::default(),
        }
    }

    /// Override recreate behaviour.
    pub fn with_recreate(mut self, recreate: RecreateOptions) -> Self {
        self.recreate = recreate;
        self
    }

    /// Reconcile a typed object.
    pub async fn reconcile<K>(&self, desired: &K, state: DesiredState) -> Result<ReconcileOutcome, ControllerError>
    where
        K: Resource<DynamicType = ()> + Serialize,
    {
        let resource = ApiResource::erase::<K>(&());
        let mut value = serde_json::to_value(desired)?;
        if let Some(map) = value.as_object_mut() {
            map.insert("apiVersion".to_string(), Value::String(resource.api_version.clone()));
            map.insert("kind".to_string(), Value::String(resource.kind.clone()));
        }
        self.reconcile_value(&resource, value, state).await
    }

    /// Reconcile an object given as JSON.
    pub async fn reconcile_value(
        &self,
        resource: &ApiResource,
        desired: Value,
        state: DesiredState,
    ) -> Result<ReconcileOutcome, ControllerError> {
        let name = desired
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .ok_or_else(|| ControllerError::InvalidConfig(format!("{} without a name", resource.kind)))?
            .to_string();
        let api = self.api_for(resource, &desired);
        let current = api.get_opt(&name).await?;

        match state {
            DesiredState::Absent => self.ensure_absent(&api, resource, &name, current).await,
            DesiredState::Created => match current {
                Some(_) => Ok(ReconcileOutcome::Unchanged),
                None => self.create(&api, resource, &name, desired).await,
            },
            DesiredState::Present => match current {
                None => self.create(&api, resource, &name, desired).await,
                Some(current) => match self.update(&api, resource, &name, current, desired.clone()).await {
                    // Someone wrote in between; one more try against a fresh copy
                    Err(e) if e.kind() == ErrorKind::Conflict => {
                        debug!("{} {} changed while updating, retrying: {}", resource.kind, name, e);
                        match api.get_opt(&name).await? {
                            Some(current) => self.update(&api, resource, &name, current, desired).await,
                            None => self.create(&api, resource, &name, desired).await,
                        }
                    }
                    other => other,
                },
            },
        }
    }

    fn api_for(&self, resource: &ApiResource, desired: &Value) -> Api<DynamicObject> {
        match desired.pointer("/metadata/namespace").and_then(Value::as_str) {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, resource),
            None => Api::all_with(self.client.clone(), resource),
        }
    }

    async fn ensure_absent(
        &self,
        api: &Api<DynamicObject>,
        resource: &ApiResource,
        name: &str,
        current: Option<DynamicObject>,
    ) -> Result<ReconcileOutcome, ControllerError> {
        let Some(current) = current else {
            return Ok(ReconcileOutcome::Unchanged);
        };
        if current.metadata.deletion_timestamp.is_some() {
            debug!("{} {} is already being deleted", resource.kind, name);
            return Ok(ReconcileOutcome::Unchanged);
        }
        info!("Deleting {} {}", resource.kind, name);
        api.delete(name, &DeleteParams::default()).await?;
        Ok(ReconcileOutcome::Deleted)
    }

    async fn create(
        &self,
        api: &Api<DynamicObject>,
        resource: &ApiResource,
        name: &str,
        mut desired: Value,
    ) -> Result<ReconcileOutcome, ControllerError> {
        strip_server_fields(&mut desired);
        set_original_configuration(&mut desired)?;
        let object: DynamicObject = serde_json::from_value(desired)?;

        info!("Creating {} {}", resource.kind, name);
        api.create(&post_params(), &object).await?;

        if resource.kind == "CustomResourceDefinition" {
            self.wait_for_crd_established(name).await?;
        }
        Ok(ReconcileOutcome::Created)
    }

    async fn update(
        &self,
        api: &Api<DynamicObject>,
        resource: &ApiResource,
        name: &str,
        current: DynamicObject,
        mut desired: Value,
    ) -> Result<ReconcileOutcome, ControllerError> {
        if current.metadata.deletion_timestamp.is_some() {
            debug!("{} {} is being deleted, retrying later", resource.kind, name);
            return Ok(ReconcileOutcome::Requeue(DELETING_REQUEUE));
        }

        let current_value = serde_json::to_value(&current)?;
        let mut recorded = desired.clone();
        merge_user_metadata(&current_value, &mut desired);

        let result = calculate_patch(&current_value, &desired, &PatchOptions::default())?;
        if result.is_empty() {
            debug!("{} {} is up to date", resource.kind, name);
            return Ok(ReconcileOutcome::Unchanged);
        }
        debug!("{} {} differs: {}", resource.kind, name, result.patch);

        set_original_configuration(&mut recorded)?;
        let mut patch = result.patch;
        patch["metadata"]["annotations"][LAST_APPLIED_ANNOTATION] = recorded
            .pointer("/metadata/annotations")
            .and_then(|a| a.get(LAST_APPLIED_ANNOTATION))
            .cloned()
            .unwrap_or(Value::Null);
        if let Some(rv) = &current.metadata.resource_version {
            patch["metadata"]["resourceVersion"] = Value::String(rv.clone());
        }

        let params = PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        let sent = match result.patch_type {
            PatchType::StrategicMerge => api.patch(name, &params, &Patch::Strategic(&patch)).await,
            PatchType::JsonMerge => api.patch(name, &params, &Patch::Merge(&patch)).await,
        };

        match sent {
            Ok(_) => {
                info!("Updated {} {}", resource.kind, name);
                Ok(ReconcileOutcome::Updated)
            }
            Err(kube::Error::Api(ae))
                if ae.code == 422
                    && self.recreate.matches_error(&ae.message)
                    && self.recreate.allows_kind(&resource.kind) =>
            {
                warn!("{} {} has immutable field changes: {}", resource.kind, name, ae.message);
                self.recreate(api, resource, name, desired).await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn recreate(
        &self,
        api: &Api<DynamicObject>,
        resource: &ApiResource,
        name: &str,
        desired: Value,
    ) -> Result<ReconcileOutcome, ControllerError> {
        if !self.recreate.immediate {
            info!("Deleting {} {} in the foreground to recreate it", resource.kind, name);
            api.delete(name, &DeleteParams::foreground()).await?;
            return Ok(ReconcileOutcome::Requeue(RECREATE_REQUEUE));
        }

        info!("Recreating {} {}", resource.kind, name);
        let params = DeleteParams {
            propagation_policy: Some(self.recreate.propagation.clone()),
            ..Default::default()
        };
        api.delete(name, &params).await?;
        self.create(api, resource, name, desired).await?;
        Ok(ReconcileOutcome::Recreated)
    }

    async fn wait_for_crd_established(&self, name: &str) -> Result<(), ControllerError> {
        let crds: Api<CustomResourceDefinition> = Api::all(self.client.clone());
        let mut tick = tokio::time::interval(CRD_ESTABLISHED_TICK);
        let deadline = tokio::time::Instant::now() + CRD_ESTABLISHED_TIMEOUT;

        while tokio::time::Instant::now() < deadline {
            tick.tick().await;
            let crd = crds.get(name).await?;
            if is_crd_established(&crd) {
                debug!("CRD {} is established", name);
                return Ok(());
            }
        }
        warn!("CRD {} not established after {:?}", name, CRD_ESTABLISHED_TIMEOUT);
        Ok(())
    }
}

fn post_params() -> PostParams {
    PostParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..Default::default()
    }
}

/// True once the `Established` condition is `True`.
pub fn is_crd_established(crd: &CustomResourceDefinition) -> bool {
    crd.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Established" && c.status == "True")
        })
}

/// Clear fields that must not be sent on create.
fn strip_server_fields(object: &mut Value) {
    if let Some(metadata) = object.get_mut("metadata").and_then(Value::as_object_mut) {
        metadata.remove("resourceVersion");
        metadata.remove("uid");
        metadata.remove("creationTimestamp");
    }
}

/// Keep labels and annotations added by others on the object sent as update.
///
/// Desired values win on key collisions. Keys the last-applied configuration
/// recorded as ours are not carried over, so dropping one from the desired
/// object removes it. The last-applied annotation itself never is.
pub fn merge_user_metadata(current: &Value, desired: &mut Value) {
    let applied = get_original_configuration(current).ok().flatten();
    for field in ["labels", "annotations"] {
        let Some(live) = current
            .pointer(&format!("/metadata/{field}"))
            .and_then(Value::as_object)
        else {
            continue;
        };
        let ours: BTreeSet<&str> = applied
            .as_ref()
            .and_then(|a| a.pointer(&format!("/metadata/{field}")))
            .and_then(Value::as_object)
            .map(|m| m.keys().map(String::as_str).collect())
            .unwrap_or_default();
        let mut merged: BTreeMap<String, Value> = live
            .iter()
            .filter(|(k, _)| k.as_str() != LAST_APPLIED_ANNOTATION && !ours.contains(k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(wanted) = desired.pointer(&format!("/metadata/{field}")).and_then(Value::as_object) {
            for (k, v) in wanted {
                merged.insert(k.clone(), v.clone());
            }
        }
        if merged.is_empty() {
            continue;
        }
        desired["metadata"][field] = Value::Object(merged.into_iter().collect());
    }
}
