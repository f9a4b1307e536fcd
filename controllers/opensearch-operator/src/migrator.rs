//! Migration of resources out of the legacy `opensearch.opster.io` group.
//!
//! For every legacy object a twin with the same name, namespace and spec is
//! created in `opensearch.org`. The legacy object gets the
//! `opensearch.org/migrated-to` annotation and the migration finalizer.
//!
//! Status flows legacy to twin once, when the twin is created, and twin to
//! legacy on every pass after that. Deleting the twin deletes the legacy
//! object. Deleting the legacy object while it has no twin is held back by
//! the finalizer until the twin has been created.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crds::{API_GROUP, API_VERSION, LEGACY_API_GROUP, MIGRATED_FROM_ANNOTATION, MIGRATED_TO_ANNOTATION, MIGRATION_FINALIZER};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, ApiResource, DeleteParams, DynamicObject, Patch, PatchParams, PostParams};
use kube::core::GroupVersionKind;
use kube::{Client, ResourceExt};
use kube_runtime::controller::Action;
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{Controller, watcher};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::error::{ControllerError, is_kube_conflict, is_kube_not_found};

/// Re-check interval for status sync
const STATUS_SYNC_REQUEUE: Duration = Duration::from_secs(30);

/// Annotation written by `kubectl apply`, meaningless on the twin
const KUBECTL_LAST_APPLIED: &str = "kubectl.kubernetes.io/last-applied-configuration";

/// A kind served in both groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigratedKind {
    /// Kind name, identical in both groups
    pub kind: String,
    /// Plural resource name
    pub plural: String,
    /// Namespaced or cluster scoped
    pub namespaced: bool,
}

impl MigratedKind {
    /// Resource in the legacy group.
    pub fn legacy(&self) -> ApiResource {
        self.resource(LEGACY_API_GROUP)
    }

    /// Resource in the current group.
    pub fn twin(&self) -> ApiResource {
        self.resource(API_GROUP)
    }

    fn resource(&self, group: &str) -> ApiResource {
        ApiResource::from_gvk_with_plural(&GroupVersionKind::gvk(group, API_VERSION, &self.kind), &self.plural)
    }

    /// Name of the legacy CRD.
    pub fn legacy_crd_name(&self) -> String {
        format!("{}.{}", self.plural, LEGACY_API_GROUP)
    }

    /// Controller name used in logs and metrics.
    pub fn controller_name(&self) -> String {
        format!("migrate-{}", self.kind.to_lowercase())
    }
}

/// Every kind the operator serves, as declared by its CRDs.
pub fn migrated_kinds() -> Vec<MigratedKind> {
    crds::all_crds()
        .into_iter()
        .map(|crd| MigratedKind {
            kind: crd.spec.names.kind.clone(),
            plural: crd.spec.names.plural.clone(),
            namespaced: crd.spec.scope == "Namespaced",
        })
        .collect()
}

/// Value of the annotations pointing between the two groups.
fn group_version(group: &str) -> String {
    format!("{group}/{API_VERSION}")
}

/// Build the twin of a legacy object.
pub fn twin_from_legacy(legacy: &DynamicObject, twin: &ApiResource) -> DynamicObject {
    let mut annotations = legacy.metadata.annotations.clone().unwrap_or_default();
    annotations.remove(MIGRATED_TO_ANNOTATION);
    annotations.remove(KUBECTL_LAST_APPLIED);
    annotations.insert(MIGRATED_FROM_ANNOTATION.to_string(), group_version(LEGACY_API_GROUP));

    let spec = legacy.data.get("spec").cloned().unwrap_or_else(|| json!({}));
    let mut object = DynamicObject::new(&legacy.name_any(), twin).data(json!({ "spec": spec }));
    object.metadata.namespace = legacy.namespace();
    object.metadata.labels = legacy.metadata.labels.clone();
    object.metadata.annotations = Some(annotations);
    object
}

/// Status to copy onto `target`, when `source` has one that differs.
pub fn status_to_sync(source: &DynamicObject, target: &DynamicObject) -> Option<Value> {
    let status = source.data.get("status").filter(|s| !s.is_null())?;
    (target.data.get("status") != Some(status)).then(|| status.clone())
}

/// Metadata patch marking a legacy object as migrated, `None` when it
/// already carries the annotation and finalizer.
pub fn migration_marks_patch(legacy: &DynamicObject) -> Option<Value> {
    let annotated = legacy.annotations().contains_key(MIGRATED_TO_ANNOTATION);
    let finalized = legacy.finalizers().iter().any(|f| f == MIGRATION_FINALIZER);
    if annotated && finalized {
        return None;
    }
    let mut finalizers = legacy.finalizers().to_vec();
    if !finalized {
        finalizers.push(MIGRATION_FINALIZER.to_string());
    }
    Some(json!({
        "metadata": {
            "resourceVersion": legacy.resource_version(),
            "annotations": BTreeMap::from([(MIGRATED_TO_ANNOTATION, group_version(API_GROUP))]),
            "finalizers": finalizers,
        }
    }))
}

/// Metadata patch dropping the migration finalizer, `None` when absent.
pub fn release_patch(legacy: &DynamicObject) -> Option<Value> {
    if !legacy.finalizers().iter().any(|f| f == MIGRATION_FINALIZER) {
        return None;
    }
    let finalizers: Vec<&String> = legacy.finalizers().iter().filter(|f| *f != MIGRATION_FINALIZER).collect();
    Some(json!({
        "metadata": {
            "resourceVersion": legacy.resource_version(),
            "finalizers": finalizers,
        }
    }))
}

/// Migration state of one kind.
#[derive(Clone)]
pub struct Migration {
    client: Client,
    kind: MigratedKind,
    legacy: ApiResource,
    twin: ApiResource,
}

impl std::fmt::Debug for Migration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration").field("kind", &self.kind).finish_non_exhaustive()
    }
}

impl Migration {
    /// Migration for `kind`.
    pub fn new(client: Client, kind: MigratedKind) -> Self {
        Self {
            legacy: kind.legacy(),
            twin: kind.twin(),
            client,
            kind,
        }
    }

    /// Kind being migrated.
    pub fn kind(&self) -> &MigratedKind {
        &self.kind
    }

    /// True when the legacy CRD for this kind is installed.
    pub async fn legacy_installed(&self) -> Result<bool, ControllerError> {
        let crds: Api<CustomResourceDefinition> = Api::all(self.client.clone());
        Ok(crds.get_opt(&self.kind.legacy_crd_name()).await?.is_some())
    }

    fn api(&self, resource: &ApiResource, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace.filter(|_| self.kind.namespaced) {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, resource),
            None => Api::all_with(self.client.clone(), resource),
        }
    }

    /// Controller over legacy objects that is also woken by twin changes.
    pub fn controller(&self, watch_namespace: Option<&str>) -> Controller<DynamicObject> {
        let legacy = self.legacy.clone();
        Controller::new_with(
            self.api(&self.legacy, watch_namespace),
            watcher::Config::default(),
            self.legacy.clone(),
        )
        .watches_with(
            self.api(&self.twin, watch_namespace),
            self.twin.clone(),
            watcher::Config::default(),
            move |twin: DynamicObject| {
                let mut legacy_ref = ObjectRef::new_with(&twin.name_any(), legacy.clone());
                if let Some(ns) = twin.namespace() {
                    legacy_ref = legacy_ref.within(&ns);
                }
                Some(legacy_ref)
            },
        )
    }

    /// One migration pass for a legacy object.
    pub async fn migrate(&self, legacy: Arc<DynamicObject>) -> Result<Action, ControllerError> {
        let name = legacy.name_any();
        let namespace = legacy.namespace();
        let legacy_api = self.api(&self.legacy, namespace.as_deref());
        let twin_api = self.api(&self.twin, namespace.as_deref());
        let deleting = legacy.metadata.deletion_timestamp.is_some();
        let migrated = legacy.annotations().contains_key(MIGRATED_TO_ANNOTATION);

        match twin_api.get_opt(&name).await? {
            None if migrated => {
                info!("Twin of {} {} was deleted, deleting the legacy object", self.kind.kind, name);
                self.release(&legacy_api, &legacy).await?;
                if !deleting {
                    match legacy_api.delete(&name, &DeleteParams::default()).await {
                        Ok(_) => {}
                        Err(e) if is_kube_not_found(&e) => {}
                        Err(e) => return Err(e.into()),
                    }
                }
                Ok(Action::await_change())
            }
            None => {
                self.create_twin(&twin_api, &legacy).await?;
                if let Some(patch) = migration_marks_patch(&legacy) {
                    legacy_api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch)).await?;
                }
                Ok(Action::requeue(Duration::from_secs(1)))
            }
            Some(_) if deleting => {
                debug!("Legacy {} {} is being deleted, releasing it", self.kind.kind, name);
                self.release(&legacy_api, &legacy).await?;
                Ok(Action::await_change())
            }
            Some(twin) => {
                if let Some(patch) = migration_marks_patch(&legacy) {
                    legacy_api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch)).await?;
                }
                if let Some(status) = status_to_sync(&twin, &legacy) {
                    debug!("Copying status of {} {} to the legacy object", self.kind.kind, name);
                    legacy_api
                        .patch_status(&name, &PatchParams::default(), &Patch::Merge(&json!({ "status": status })))
                        .await?;
                }
                Ok(Action::requeue(STATUS_SYNC_REQUEUE))
            }
        }
    }

    async fn create_twin(&self, twin_api: &Api<DynamicObject>, legacy: &DynamicObject) -> Result<(), ControllerError> {
        let name = legacy.name_any();
        info!("Migrating {} {} to {}", self.kind.kind, name, API_GROUP);
        let twin = twin_from_legacy(legacy, &self.twin);
        let created = match twin_api.create(&PostParams::default(), &twin).await {
            Ok(created) => created,
            Err(e) if is_kube_conflict(&e) => {
                debug!("Twin of {} {} already exists", self.kind.kind, name);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        if let Some(status) = status_to_sync(legacy, &created) {
            if let Err(e) = twin_api
                .patch_status(&name, &PatchParams::default(), &Patch::Merge(&json!({ "status": status })))
                .await
            {
                warn!("Failed to copy status of {} {} to its twin: {}", self.kind.kind, name, e);
            }
        }
        Ok(())
    }

    async fn release(&self, legacy_api: &Api<DynamicObject>, legacy: &DynamicObject) -> Result<(), ControllerError> {
        let Some(patch) = release_patch(legacy) else {
            return Ok(());
        };
        match legacy_api
            .patch(&legacy.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_kube_not_found(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
