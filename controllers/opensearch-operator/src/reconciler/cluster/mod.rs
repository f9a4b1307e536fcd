//! OpenSearchCluster reconciler
//!
//! One pass runs, in order:
//! 1. certificates for generated TLS profiles
//! 2. observe the node pool stateful sets
//! 3. upgrade and scale coordinators pick images and replica counts
//! 4. children (services, config map, stateful sets, dashboards) are reconciled
//! 5. health, phase, snapshot repositories and conditions
//!
//! Sub-step results are folded into a [`CombinedResult`]; the status is
//! always written before an error is returned.

pub mod builders;
pub mod ledger;
pub mod pools;
pub mod scaler;
pub mod snapshot_repos;
pub mod tls;
pub mod upgrade;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crds::{
    CLUSTER_FINALIZER, CLUSTER_LABEL, ClusterPhase, NodePool, OpenSearchCluster, OpenSearchClusterStatus,
};
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::Service;
use kube::api::{Api, ListParams, ObjectMeta, Patch, PatchParams};
use kube::{Resource, ResourceExt};
use kube_runtime::controller::Action;
use kube_runtime::finalizer::{Event as Finalizer, finalizer};
use opensearch_client::services::is_observability_yellow;
use opensearch_client::{ClusterHealth, HealthStatus, OpenSearchClient, OpenSearchClientTrait};
use serde_json::json;
use tracing::{debug, error, info, warn};

use self::pools::PoolObservation;
use self::scaler::ScalePlan;
use self::upgrade::UpgradePlan;
use super::{Reconciler, from_finalizer_error};
use crate::conditions;
use crate::error::{ControllerError, ErrorKind};
use crate::resource_reconciler::{DesiredState, ReconcileOutcome};

/// Re-check interval while the cluster is coming up
const PENDING_REQUEUE: Duration = Duration::from_secs(10);

/// Periodic health refresh of a ready cluster
const RESYNC_REQUEUE: Duration = Duration::from_secs(60);

/// Merged outcome of the sub-steps of one pass.
#[derive(Debug, Default)]
pub struct CombinedResult {
    pub requeue: bool,
    pub requeue_after: Option<Duration>,
    pub errors: Vec<ControllerError>,
}

impl CombinedResult {
    /// Ask for a requeue; the shortest non-zero delay wins.
    pub fn requeue_after(&mut self, after: Duration) {
        self.requeue = true;
        if after.is_zero() {
            return;
        }
        self.requeue_after = Some(match self.requeue_after {
            Some(current) => current.min(after),
            None => after,
        });
    }

    /// Fold in an optional requeue.
    pub fn maybe_requeue(&mut self, after: Option<Duration>) {
        if let Some(after) = after {
            self.requeue_after(after);
        }
    }

    /// Fold in the result of a child reconcile.
    pub fn child(&mut self, what: &str, result: Result<ReconcileOutcome, ControllerError>) {
        match result {
            Ok(outcome) => {
                if outcome.changed() {
                    debug!("{}: {:?}", what, outcome);
                }
                self.maybe_requeue(outcome.requeue_after());
            }
            Err(e) => {
                warn!("Failed to reconcile {}: {}", what, e);
                self.errors.push(e);
            }
        }
    }

    /// Record a failed sub-step.
    pub fn error(&mut self, error: ControllerError) {
        self.errors.push(error);
    }

    /// Merge another result into this one.
    pub fn merge(&mut self, other: CombinedResult) {
        self.requeue |= other.requeue;
        self.maybe_requeue(other.requeue_after);
        self.errors.extend(other.errors);
    }

    /// True when nothing asked for attention.
    pub fn is_empty(&self) -> bool {
        !self.requeue && self.errors.is_empty()
    }
}

/// Phase after this pass.
///
/// A cluster turns RUNNING once any data pool has a ready node and stays
/// there; invalid configuration moves it to ERROR until fixed.
pub fn next_phase(
    current: ClusterPhase,
    cluster: &OpenSearchCluster,
    observations: &BTreeMap<String, PoolObservation>,
    errors: &[ControllerError],
) -> ClusterPhase {
    if errors.iter().any(|e| e.kind() == ErrorKind::Invalid) {
        return ClusterPhase::Error;
    }
    let data_ready = cluster
        .spec
        .node_pools
        .iter()
        .filter(|p| p.is_data())
        .any(|p| observations.get(&p.component).is_some_and(|o| o.ready >= 1));
    match current {
        ClusterPhase::Running | ClusterPhase::Done => current,
        _ if data_ready => ClusterPhase::Running,
        _ => ClusterPhase::Pending,
    }
}

/// `Ready` condition: status, reason and message.
pub fn readiness(
    phase: ClusterPhase,
    health: Option<&ClusterHealth>,
    errors: &[ControllerError],
) -> (bool, String, String) {
    if let Some(e) = errors.first() {
        return (false, e.kind().as_str().to_string(), e.one_line());
    }
    if phase != ClusterPhase::Running {
        return (false, "Pending".to_string(), "waiting for a data node to become ready".to_string());
    }
    match health {
        None => (false, "Unreachable".to_string(), "cluster health unavailable".to_string()),
        Some(h) if h.status == HealthStatus::Green => (true, "Green".to_string(), "cluster is green".to_string()),
        Some(h) if is_observability_yellow(h) => (
            true,
            "ObservabilityYellow".to_string(),
            "only the observability index lacks replicas".to_string(),
        ),
        Some(h) => (
            false,
            "Unhealthy".to_string(),
            format!("cluster health is {}", h.status.as_str()),
        ),
    }
}

/// True when every declared pool runs the desired image.
pub fn version_rolled_out(cluster: &OpenSearchCluster, observations: &BTreeMap<String, PoolObservation>) -> bool {
    let image = cluster.image();
    cluster
        .spec
        .node_pools
        .iter()
        .all(|p| observations.get(&p.component).is_some_and(|o| o.rolled_out(&image)))
}

/// Fold the outcome of a pass into `status` and return the `Ready` state.
///
/// `observations` is `None` when the stateful sets could not be listed. Node
/// count, health and rolled out version then keep their last known values.
pub fn record_outcome(
    status: &mut OpenSearchClusterStatus,
    cluster: &OpenSearchCluster,
    observations: Option<&BTreeMap<String, PoolObservation>>,
    health: Option<&ClusterHealth>,
    errors: &[ControllerError],
) -> bool {
    let unobserved = BTreeMap::new();
    let phase = next_phase(cluster.phase(), cluster, observations.unwrap_or(&unobserved), errors);
    status.phase = Some(phase);
    if let Some(observations) = observations {
        status.health = health.map(|h| h.status.as_str().to_string());
        status.available_nodes = Some(observations.values().map(|o| o.ready).sum());
        if version_rolled_out(cluster, observations) {
            status.version = Some(cluster.spec.general.version.clone());
        }
    }

    let generation = cluster.metadata.generation;
    let (ready, reason, message) = readiness(phase, health, errors);
    conditions::set_ready(status, ready, &reason, &message, generation);
    match status.components_status.first() {
        Some(entry) => {
            let message = format!("{} {} on {}", entry.component, entry.status, entry.description);
            let component = entry.component.clone();
            conditions::set_reconciling(status, true, &component, &message, generation);
        }
        None => {
            conditions::set_reconciling(status, false, "Idle", "no operation in progress", generation);
        }
    }
    ready
}

/// Metadata-only object used to delete a child by name.
fn named<K: Resource<DynamicType = ()> + Default>(cluster: &OpenSearchCluster, name: String) -> K {
    let mut object = K::default();
    *object.meta_mut() = ObjectMeta {
        name: Some(name),
        namespace: cluster.namespace(),
        ..Default::default()
    };
    object
}

impl Reconciler {
    /// Reconciles an OpenSearchCluster under its finalizer.
    pub async fn reconcile_cluster(&self, cluster: Arc<OpenSearchCluster>) -> Result<Action, ControllerError> {
        let namespace = cluster.namespace().unwrap_or_else(|| "default".to_string());
        let api: Api<OpenSearchCluster> = Api::namespaced(self.client.clone(), &namespace);

        finalizer(&api, CLUSTER_FINALIZER, cluster, |event| async {
            match event {
                Finalizer::Apply(cluster) => self.apply_cluster(&api, &cluster).await,
                Finalizer::Cleanup(cluster) => self.cleanup_cluster(&cluster).await,
            }
        })
        .await
        .map_err(from_finalizer_error)
    }

    async fn apply_cluster(
        &self,
        api: &Api<OpenSearchCluster>,
        cluster: &OpenSearchCluster,
    ) -> Result<Action, ControllerError> {
        let name = cluster.name_any();
        let namespace = cluster.namespace().unwrap_or_else(|| "default".to_string());
        info!("Reconciling OpenSearchCluster {}/{}", namespace, name);

        let original = cluster.status.clone().unwrap_or_default();
        let mut status = original.clone();
        let mut result = CombinedResult::default();

        if let Err(e) =
            tls::ensure_certificates(&self.client, &self.resources, self.certificate_authority.as_ref(), cluster).await
        {
            result.error(e);
        }

        let stateful_sets: Api<StatefulSet> = Api::namespaced(self.client.clone(), &namespace);
        let selector = format!("{}={}", CLUSTER_LABEL, name);
        // Without the live pools no plan is safe; only the status is refreshed
        let observations = match stateful_sets.list(&ListParams::default().labels(&selector)).await {
            Ok(live) => Some(pools::observe_all(&live.items)),
            Err(e) => {
                warn!("Failed to list stateful sets of cluster {}: {}", name, e);
                result.error(e.into());
                None
            }
        };

        let health = match observations.as_ref() {
            Some(observations) => self.converge(cluster, observations, &mut status, &mut result).await,
            None => None,
        };
        let ready = record_outcome(
            &mut status,
            cluster,
            observations.as_ref(),
            health.as_ref(),
            &result.errors,
        );

        if status != original {
            write_cluster_status(api, &name, &status).await?;
        }

        if let Some(first) = result.errors.into_iter().next() {
            error!("Reconcile of cluster {} failed: {}", name, first);
            return Err(first);
        }
        let after = result
            .requeue_after
            .unwrap_or(if ready { RESYNC_REQUEUE } else { PENDING_REQUEUE });
        Ok(Action::requeue(after))
    }

    /// Drive the children towards the declaration and return the health seen.
    async fn converge(
        &self,
        cluster: &OpenSearchCluster,
        observations: &BTreeMap<String, PoolObservation>,
        status: &mut OpenSearchClusterStatus,
        result: &mut CombinedResult,
    ) -> Option<ClusterHealth> {
        let gateway = match self.gateway(cluster).await {
            Ok(gateway) => Some(gateway),
            Err(e) => {
                result.error(e);
                None
            }
        };

        let (upgrade, scale) = self.coordinate(gateway.as_ref(), cluster, observations, status, result).await;
        result.merge(self.reconcile_children(cluster, &upgrade, &scale).await);

        let gateway = gateway?;
        let health = match gateway.health().await {
            Ok(health) => health,
            Err(e) => {
                debug!("Health of cluster {} unavailable: {}", cluster.name_any(), e);
                return None;
            }
        };

        if next_phase(cluster.phase(), cluster, observations, &result.errors) == ClusterPhase::Running {
            if let Err(e) =
                snapshot_repos::ensure_repositories(&gateway, &cluster.spec.general.snapshot_repositories).await
            {
                result.error(e.into());
            }
        }
        Some(health)
    }

    /// Run the upgrade and scale coordinators, falling back to a plan that
    /// changes nothing when the gateway is unavailable.
    async fn coordinate(
        &self,
        gateway: Option<&OpenSearchClient>,
        cluster: &OpenSearchCluster,
        observations: &BTreeMap<String, PoolObservation>,
        status: &mut OpenSearchClusterStatus,
        result: &mut CombinedResult,
    ) -> (UpgradePlan, ScalePlan) {
        let held_upgrade = || UpgradePlan {
            images: upgrade::held_images(cluster, observations),
            ..Default::default()
        };
        let held_scale = || ScalePlan {
            replicas: scaler::held_replicas(cluster, observations),
            ..Default::default()
        };
        let Some(gateway) = gateway else {
            return (held_upgrade(), held_scale());
        };

        let upgrade = match upgrade::coordinate_upgrade(gateway, cluster, observations, &mut status.components_status).await
        {
            Ok(plan) => plan,
            Err(e) => {
                result.error(e.into());
                held_upgrade()
            }
        };
        result.maybe_requeue(upgrade.requeue);

        let scale = match scaler::coordinate_scale(gateway, cluster, observations, &mut status.components_status).await {
            Ok(plan) => plan,
            Err(e) => {
                result.error(e.into());
                held_scale()
            }
        };
        result.maybe_requeue(scale.requeue);
        for reason in upgrade.waiting.iter().chain(scale.waiting.iter()) {
            info!("Cluster {}: {}", cluster.name_any(), reason);
        }
        (upgrade, scale)
    }

    async fn reconcile_children(
        &self,
        cluster: &OpenSearchCluster,
        upgrade: &UpgradePlan,
        scale: &ScalePlan,
    ) -> CombinedResult {
        let mut result = CombinedResult::default();
        let present = DesiredState::Present;

        result.child(
            "client service",
            self.resources.reconcile(&builders::client_service(cluster), present).await,
        );
        result.child(
            "discovery service",
            self.resources.reconcile(&builders::discovery_service(cluster), present).await,
        );
        result.child(
            "config map",
            self.resources.reconcile(&builders::config_map(cluster), present).await,
        );

        let desired_image = cluster.image();
        for pool in &cluster.spec.node_pools {
            let image = upgrade.images.get(&pool.component).unwrap_or(&desired_image);
            let replicas = scale.replicas.get(&pool.component).copied().unwrap_or(pool.replicas);
            self.reconcile_pool(cluster, pool, image, replicas, &mut result).await;
        }

        // Pools dropped from the declaration drain through the scaler first
        for (component, replicas) in &scale.replicas {
            if cluster.spec.node_pools.iter().any(|p| &p.component == component) {
                continue;
            }
            let name = builders::stateful_set_name(cluster, component);
            if scale.remove.contains(component) {
                info!("Removing node pool {} of cluster {}", component, cluster.name_any());
                let sts: StatefulSet = named(cluster, name.clone());
                let service: Service = named(cluster, name);
                result.child("stateful set", self.resources.reconcile(&sts, DesiredState::Absent).await);
                result.child("pool service", self.resources.reconcile(&service, DesiredState::Absent).await);
            } else {
                let patch = json!({"spec": {"replicas": replicas}});
                let api: Api<StatefulSet> =
                    Api::namespaced(self.client.clone(), &cluster.namespace().unwrap_or_default());
                if let Err(e) = api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch)).await {
                    result.error(e.into());
                }
            }
        }

        match (builders::dashboards_deployment(cluster), builders::dashboards_service(cluster)) {
            (Some(deployment), Some(service)) => {
                result.child("dashboards", self.resources.reconcile(&deployment, present).await);
                result.child("dashboards service", self.resources.reconcile(&service, present).await);
            }
            _ => {
                let name = builders::dashboards_name(cluster);
                let deployment: Deployment = named(cluster, name.clone());
                let service: Service = named(cluster, name);
                result.child("dashboards", self.resources.reconcile(&deployment, DesiredState::Absent).await);
                result.child(
                    "dashboards service",
                    self.resources.reconcile(&service, DesiredState::Absent).await,
                );
            }
        }
        result
    }

    async fn reconcile_pool(
        &self,
        cluster: &OpenSearchCluster,
        pool: &NodePool,
        image: &str,
        replicas: i32,
        result: &mut CombinedResult,
    ) {
        let service = builders::pool_service(cluster, pool);
        result.child("pool service", self.resources.reconcile(&service, DesiredState::Present).await);
        let sts = builders::stateful_set(cluster, pool, image, replicas);
        result.child("stateful set", self.resources.reconcile(&sts, DesiredState::Present).await);
    }

    /// Quiesce the cluster before the children are collected.
    async fn cleanup_cluster(&self, cluster: &OpenSearchCluster) -> Result<Action, ControllerError> {
        let name = cluster.name_any();
        info!("Cleaning up OpenSearchCluster {}", name);
        let gateway = match self.gateway(cluster).await {
            Ok(gateway) => gateway,
            Err(e) => {
                warn!("Skipping cleanup of cluster {}: {}", name, e);
                return Ok(Action::await_change());
            }
        };
        if let Err(e) = scaler::quiesce_for_deletion(&gateway).await {
            // A cluster that is already gone has nothing left to quiesce
            warn!("Could not quiesce cluster {}: {}", name, e);
        }
        Ok(Action::await_change())
    }
}

/// Patch the cluster status subresource.
async fn write_cluster_status(
    api: &Api<OpenSearchCluster>,
    name: &str,
    status: &OpenSearchClusterStatus,
) -> Result<(), ControllerError> {
    let patch = json!({ "status": status });
    api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch)).await?;
    debug!("Updated OpenSearchCluster {} status", name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_cluster;
    use opensearch_client::{IndexHealth, OpenSearchError};

    fn ready_pool(component: &str, ready: i32) -> PoolObservation {
        PoolObservation {
            component: component.to_string(),
            image: Some("docker.io/opensearchproject/opensearch:2.19.4".to_string()),
            data: component == "data",
            master: component == "masters",
            replicas: 3,
            current: 3,
            ready,
            updated: 3,
            observed: true,
        }
    }

    #[test]
    fn test_combined_result_keeps_shortest_delay() {
        let mut result = CombinedResult::default();
        assert!(result.is_empty());
        result.requeue_after(Duration::from_secs(30));
        result.requeue_after(Duration::ZERO);
        result.requeue_after(Duration::from_secs(10));

        let mut other = CombinedResult::default();
        other.requeue_after(Duration::from_secs(20));
        other.error(ControllerError::InvalidConfig("bad".to_string()));
        result.merge(other);

        assert!(result.requeue);
        assert_eq!(result.requeue_after, Some(Duration::from_secs(10)));
        assert_eq!(result.errors.len(), 1);
        assert!(!result.is_empty());
    }

    #[test]
    fn test_phase_turns_running_with_a_ready_data_node() {
        let cluster = create_test_cluster("logs", "search", "2.19.4");
        let mut observations = BTreeMap::from([
            ("masters".to_string(), ready_pool("masters", 3)),
            ("data".to_string(), ready_pool("data", 0)),
        ]);
        assert_eq!(
            next_phase(ClusterPhase::Pending, &cluster, &observations, &[]),
            ClusterPhase::Pending
        );

        if let Some(data) = observations.get_mut("data") {
            data.ready = 1;
        }
        assert_eq!(
            next_phase(ClusterPhase::Pending, &cluster, &observations, &[]),
            ClusterPhase::Running
        );

        let invalid = [ControllerError::InvalidConfig("secret lacks ca.key".to_string())];
        assert_eq!(
            next_phase(ClusterPhase::Running, &cluster, &observations, &invalid),
            ClusterPhase::Error
        );
    }

    #[test]
    fn test_readiness_accepts_observability_yellow() {
        let mut health = ClusterHealth {
            status: HealthStatus::Yellow,
            ..Default::default()
        };
        health.indices.insert(
            ".opensearch-observability".to_string(),
            IndexHealth {
                status: HealthStatus::Yellow,
                ..Default::default()
            },
        );
        let (ready, reason, _) = readiness(ClusterPhase::Running, Some(&health), &[]);
        assert!(ready);
        assert_eq!(reason, "ObservabilityYellow");

        health.relocating_shards = 2;
        let (ready, reason, message) = readiness(ClusterPhase::Running, Some(&health), &[]);
        assert!(!ready);
        assert_eq!(reason, "Unhealthy");
        assert_eq!(message, "cluster health is yellow");
    }

    #[test]
    fn test_readiness_reports_error_kind() {
        let errors = [ControllerError::OpenSearch(OpenSearchError::Transient(
            "connection refused".to_string(),
        ))];
        let health = ClusterHealth {
            status: HealthStatus::Green,
            ..Default::default()
        };
        let (ready, reason, _) = readiness(ClusterPhase::Running, Some(&health), &errors);
        assert!(!ready);
        assert_eq!(reason, "Transient");

        let (ready, reason, _) = readiness(ClusterPhase::Pending, Some(&health), &[]);
        assert!(!ready);
        assert_eq!(reason, "Pending");
    }

    #[test]
    fn test_version_rolled_out_needs_every_pool() {
        let cluster = create_test_cluster("logs", "search", "2.19.4");
        let mut observations = BTreeMap::from([("masters".to_string(), ready_pool("masters", 3))]);
        assert!(!version_rolled_out(&cluster, &observations));
        observations.insert("data".to_string(), ready_pool("data", 3));
        assert!(version_rolled_out(&cluster, &observations));
    }

    #[test]
    fn test_unlisted_pools_still_record_the_failure() {
        let mut cluster = create_test_cluster("logs", "search", "2.19.4");
        let last_known = OpenSearchClusterStatus {
            phase: Some(ClusterPhase::Running),
            health: Some("green".to_string()),
            available_nodes: Some(6),
            version: Some("2.19.4".to_string()),
            ..Default::default()
        };
        cluster.status = Some(last_known.clone());
        let errors = [ControllerError::OpenSearch(OpenSearchError::Transient(
            "stateful sets unavailable".to_string(),
        ))];

        let mut status = last_known.clone();
        let ready = record_outcome(&mut status, &cluster, None, None, &errors);

        assert!(!ready);
        assert_ne!(status, last_known);
        assert_eq!(status.phase, Some(ClusterPhase::Running));
        assert_eq!(status.available_nodes, Some(6));
        assert_eq!(status.health.as_deref(), Some("green"));
        let condition = conditions::find(&status.conditions, conditions::READY).unwrap();
        assert_eq!(condition.status, "False");
        assert_eq!(condition.reason, "Transient");
    }

    #[test]
    fn test_observed_pools_refresh_counts() {
        let cluster = create_test_cluster("logs", "search", "2.19.4");
        let observations = BTreeMap::from([
            ("masters".to_string(), ready_pool("masters", 3)),
            ("data".to_string(), ready_pool("data", 2)),
        ]);
        let health = ClusterHealth {
            status: HealthStatus::Green,
            ..Default::default()
        };

        let mut status = OpenSearchClusterStatus::default();
        let ready = record_outcome(&mut status, &cluster, Some(&observations), Some(&health), &[]);

        assert!(ready);
        assert_eq!(status.phase, Some(ClusterPhase::Running));
        assert_eq!(status.available_nodes, Some(5));
        assert_eq!(status.health.as_deref(), Some("green"));
        assert_eq!(status.version.as_deref(), Some("2.19.4"));
    }

    #[test]
    fn test_named_object_only_carries_identity() {
        let cluster = create_test_cluster("logs", "search", "2.19.4");
        let sts: StatefulSet = named(&cluster, "logs-data".to_string());
        assert_eq!(sts.metadata.name.as_deref(), Some("logs-data"));
        assert_eq!(sts.metadata.namespace.as_deref(), Some("search"));
        assert!(sts.spec.is_none());
    }
}
