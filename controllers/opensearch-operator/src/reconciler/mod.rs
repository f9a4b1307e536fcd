//! Reconciliation logic for OpenSearch CRDs.
//!
//! - `cluster`: the `OpenSearchCluster` hub (children, health, upgrades, scaling)
//! - security plugin objects: users, roles, user-role bindings, tenants, action groups
//! - index management: ISM and snapshot policies, index/component/search templates
//!
//! Every sub-resource goes through [`Reconciler::reconcile_sub_resource`],
//! which resolves the referenced cluster, opens an admin gateway and runs
//! the lifecycle in [`crate::reconcile_helpers`] under a finalizer.

pub mod action_group;
pub mod cluster;
pub mod component_template;
pub mod index_template;
pub mod ism_policy;
pub mod role;
pub mod search_template;
pub mod snapshot_policy;
pub mod tenant;
pub mod user;
pub mod user_role_binding;

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use crds::{ManagedResourceStatus, OpenSearchCluster, OpenSearchClusterRef, ClusterPhase, RESOURCE_FINALIZER};
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, Resource, ResourceExt};
use kube_runtime::controller::Action;
use kube_runtime::finalizer::{finalizer, Error as FinalizerError, Event as Finalizer};
use opensearch_client::OpenSearchClient;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};

use crate::backoff::BackoffRegistry;
use self::cluster::tls::CertificateAuthority;
use crate::error::ControllerError;
use crate::gateway;
use crate::reconcile_helpers::{self, RemoteSync, StatusWriter};
use crate::resource_reconciler::{RecreateOptions, ResourceReconciler};

/// Requeue delay while the referenced cluster does not exist
const CLUSTER_MISSING_REQUEUE: Duration = Duration::from_secs(30);

/// Requeue delay while the referenced cluster is not running yet
const CLUSTER_PENDING_REQUEUE: Duration = Duration::from_secs(10);

/// Periodic re-check of managed remote objects, catches out-of-band deletes
const DRIFT_REQUEUE: Duration = Duration::from_secs(30);

/// A sub-resource CRD managed through the shared lifecycle.
#[async_trait]
pub(crate) trait SubResource:
    Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Api for the resource's scope.
    fn api(client: Client, namespace: Option<&str>) -> Api<Self>;

    /// Cluster the resource is applied to
    fn cluster_ref(&self) -> &OpenSearchClusterRef;

    /// Current lifecycle status
    fn managed_status(&self) -> Option<&ManagedResourceStatus>;

    /// Remote object described by the spec.
    async fn remote(
        &self,
        reconciler: &Reconciler,
        cluster: &OpenSearchCluster,
    ) -> Result<Box<dyn RemoteSync>, ControllerError>;
}

/// Reconciles OpenSearch clusters and their sub-resources.
pub struct Reconciler {
    pub(crate) client: Client,
    pub(crate) resources: ResourceReconciler,
    pub(crate) certificate_authority: Arc<dyn CertificateAuthority>,
    pub(crate) accept_invalid_certs: bool,
    /// Error count tracking per resource (kind/namespace/name)
    backoff: BackoffRegistry,
}

impl Reconciler {
    /// Creates a new reconciler instance.
    pub fn new(
        client: Client,
        certificate_authority: Arc<dyn CertificateAuthority>,
        accept_invalid_certs: bool,
    ) -> Self {
        Self {
            // stateful set pods must be gone before a recreated set claims their volumes
            resources: ResourceReconciler::new(client.clone()).with_recreate(RecreateOptions {
                immediate: false,
                ..RecreateOptions::default()
            }),
            client,
            certificate_authority,
            accept_invalid_certs,
            backoff: BackoffRegistry::default(),
        }
    }

    /// Look up the cluster a sub-resource refers to.
    pub async fn find_cluster(
        &self,
        cluster_ref: &OpenSearchClusterRef,
        own_namespace: Option<&str>,
    ) -> Result<Option<OpenSearchCluster>, ControllerError> {
        let namespace = cluster_ref.resolve_namespace(own_namespace);
        let api: Api<OpenSearchCluster> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(&cluster_ref.name).await?)
    }

    /// Open an admin gateway to `cluster`.
    pub async fn gateway(&self, cluster: &OpenSearchCluster) -> Result<OpenSearchClient, ControllerError> {
        gateway::connect(&self.client, cluster, self.accept_invalid_certs).await
    }

    /// Get the next backoff delay for a resource and count the error.
    ///
    /// Returns (delay, error_count)
    pub fn next_backoff(&self, resource_key: &str) -> (Duration, u32) {
        self.backoff.next(resource_key)
    }

    /// Drop the error count of a resource (on successful reconciliation)
    pub fn reset_backoff(&self, resource_key: &str) {
        self.backoff.reset(resource_key);
    }

    /// Run the shared lifecycle for one sub-resource, under its finalizer.
    pub(crate) async fn reconcile_sub_resource<K: SubResource>(&self, obj: Arc<K>) -> Result<Action, ControllerError> {
        let namespace = obj.namespace();
        let api = K::api(self.client.clone(), namespace.as_deref());

        finalizer(&api, RESOURCE_FINALIZER, obj, |event| async {
            match event {
                Finalizer::Apply(obj) => self.apply_sub_resource(&api, &obj).await,
                Finalizer::Cleanup(obj) => self.cleanup_sub_resource::<K>(&obj).await,
            }
        })
        .await
        .map_err(from_finalizer_error)
    }

    async fn apply_sub_resource<K: SubResource>(&self, api: &Api<K>, obj: &K) -> Result<Action, ControllerError> {
        let kind = K::kind(&());
        let name = obj.name_any();
        let namespace = obj.namespace();
        let current = obj.managed_status();
        info!("Reconciling {} {}/{}", kind, namespace.as_deref().unwrap_or("-"), name);

        let cluster_ref = obj.cluster_ref();
        let Some(cluster) = self.find_cluster(cluster_ref, namespace.as_deref()).await? else {
            let reason = format!(
                "cluster not found: {}/{}",
                cluster_ref.resolve_namespace(namespace.as_deref()),
                cluster_ref.name
            );
            warn!("{} {}: {}", kind, name, reason);
            let status = reconcile_helpers::error_status(current, reason);
            write_status(api, &name, current, &status).await?;
            return Ok(Action::requeue(CLUSTER_MISSING_REQUEUE));
        };

        if cluster.phase() != ClusterPhase::Running {
            debug!("{} {} waits for cluster {} to be running", kind, name, cluster.name_any());
            let status = reconcile_helpers::pending_status(current, "waiting for cluster to be running");
            write_status(api, &name, current, &status).await?;
            return Ok(Action::requeue(CLUSTER_PENDING_REQUEUE));
        }

        let cluster_uid = cluster.uid().unwrap_or_default();
        let result = async {
            let remote = obj.remote(self, &cluster).await?;
            let client = self.gateway(&cluster).await?;
            let status_writer = StatusSubresource { api, name: &name };
            reconcile_helpers::sync_remote(&client, remote.as_ref(), current, &cluster_uid, &status_writer).await
        }
        .await;

        match result {
            Ok(status) => {
                write_status(api, &name, current, &status).await?;
                if status.state == crds::ResourceState::Created {
                    Ok(Action::requeue(DRIFT_REQUEUE))
                } else {
                    Ok(Action::await_change())
                }
            }
            Err(e) => {
                error!("Failed to reconcile {} {}: {}", kind, name, e);
                let status = reconcile_helpers::error_status(current, e.one_line());
                if let Err(write_err) = write_status(api, &name, current, &status).await {
                    error!("Failed to update {} {} error status: {}", kind, name, write_err);
                }
                Err(e)
            }
        }
    }

    async fn cleanup_sub_resource<K: SubResource>(&self, obj: &K) -> Result<Action, ControllerError> {
        let kind = K::kind(&());
        let name = obj.name_any();
        let namespace = obj.namespace();
        info!("Cleaning up {} {}/{}", kind, namespace.as_deref().unwrap_or("-"), name);

        let Some(cluster) = self.find_cluster(obj.cluster_ref(), namespace.as_deref()).await? else {
            debug!("Cluster of {} {} is gone, nothing to remove", kind, name);
            return Ok(Action::await_change());
        };
        if cluster.metadata.deletion_timestamp.is_some() {
            debug!("Cluster of {} {} is being deleted, skipping remote delete", kind, name);
            return Ok(Action::await_change());
        }

        let cluster_uid = cluster.uid().unwrap_or_default();
        if !reconcile_helpers::owns_remote(obj.managed_status(), &cluster_uid) {
            return Ok(Action::await_change());
        }
        let remote = obj.remote(self, &cluster).await?;
        let client = self.gateway(&cluster).await?;
        reconcile_helpers::delete_remote(&client, remote.as_ref(), obj.managed_status(), &cluster_uid).await?;
        Ok(Action::await_change())
    }
}

/// Writes sub-resource status through the status subresource.
struct StatusSubresource<'a, K> {
    api: &'a Api<K>,
    name: &'a str,
}

#[async_trait]
impl<K: SubResource> StatusWriter for StatusSubresource<'_, K> {
    async fn write(&self, status: &ManagedResourceStatus) -> Result<(), ControllerError> {
        let patch = reconcile_helpers::status_patch(status);
        self.api
            .patch_status(self.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        debug!("Recorded {} {} status: {}", K::kind(&()), self.name, status.state);
        Ok(())
    }
}

/// Patch the status subresource when it changed.
async fn write_status<K: SubResource>(
    api: &Api<K>,
    name: &str,
    current: Option<&ManagedResourceStatus>,
    desired: &ManagedResourceStatus,
) -> Result<(), ControllerError> {
    if !reconcile_helpers::status_needs_update(current, desired) {
        debug!("{} {} already has correct status, skipping update", K::kind(&()), name);
        return Ok(());
    }
    let patch = reconcile_helpers::status_patch(desired);
    api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch)).await?;
    debug!("Updated {} {} status: {}", K::kind(&()), name, desired.state);
    Ok(())
}

/// Unwrap the reconcile error out of a finalizer error.
pub(crate) fn from_finalizer_error(err: FinalizerError<ControllerError>) -> ControllerError {
    match err {
        FinalizerError::ApplyFailed(e) | FinalizerError::CleanupFailed(e) => e,
        FinalizerError::AddFinalizer(e) | FinalizerError::RemoveFinalizer(e) => ControllerError::Kube(e),
        other => ControllerError::Finalizer(other.to_string()),
    }
}

/// Api for a namespaced kind, defaulting the namespace.
pub(crate) fn namespaced_api<K>(client: Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope>,
{
    Api::namespaced(client, namespace.unwrap_or("default"))
}
