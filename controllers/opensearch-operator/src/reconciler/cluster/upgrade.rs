//! Rolling version upgrades, one node pool at a time, cluster managers last.
//!
//! The coordinator only decides which image each stateful set should carry;
//! the stateful set controller rolls the pods. A pool is done once every pod
//! is updated and ready, then the next pool may start.

use std::collections::BTreeMap;
use std::time::Duration;

use crds::{ComponentStatus, OpenSearchCluster};
use opensearch_client::services::check_cluster_status_for_restart;
use opensearch_client::{OpenSearchClientTrait, OpenSearchError, RestartDecision};
use tracing::{debug, info};

use super::ledger::{self, SCALER, UPGRADE};
use super::pools::PoolObservation;

/// Re-check interval while pods roll
const ROLLING_REQUEUE: Duration = Duration::from_secs(15);

/// Re-check interval after shard allocation was switched back on
const ALLOCATION_REQUEUE: Duration = Duration::from_secs(5);

/// Re-check interval while the cluster is not healthy enough to restart nodes
const HEALTH_REQUEUE: Duration = Duration::from_secs(30);

/// Images chosen for every pool of the declaration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpgradePlan {
    pub images: BTreeMap<String, String>,
    pub requeue: Option<Duration>,
    /// Why the upgrade is waiting, if it is
    pub waiting: Option<String>,
}

/// Pools still on an old image, in upgrade order.
pub fn pending_pools<'a>(
    cluster: &'a OpenSearchCluster,
    observations: &BTreeMap<String, PoolObservation>,
    image: &str,
) -> Vec<&'a str> {
    let outdated = |component: &str| {
        observations
            .get(component)
            .is_some_and(|o| o.image.as_deref() != Some(image))
    };
    let pools = &cluster.spec.node_pools;
    pools
        .iter()
        .filter(|p| !p.is_master())
        .chain(pools.iter().filter(|p| p.is_master()))
        .map(|p| p.component.as_str())
        .filter(|c| outdated(c))
        .collect()
}

/// Images that change nothing: existing pools keep theirs, new pools start at the desired one.
pub fn held_images(
    cluster: &OpenSearchCluster,
    observations: &BTreeMap<String, PoolObservation>,
) -> BTreeMap<String, String> {
    let desired = cluster.image();
    cluster
        .spec
        .node_pools
        .iter()
        .map(|pool| {
            let image = observations
                .get(&pool.component)
                .and_then(|o| o.image.clone())
                .unwrap_or_else(|| desired.clone());
            (pool.component.clone(), image)
        })
        .collect()
}

/// Decide the image of every pool and advance the upgrade ledger.
pub async fn coordinate_upgrade(
    client: &dyn OpenSearchClientTrait,
    cluster: &OpenSearchCluster,
    observations: &BTreeMap<String, PoolObservation>,
    status_ledger: &mut Vec<ComponentStatus>,
) -> Result<UpgradePlan, OpenSearchError> {
    let desired = cluster.image();
    let mut plan = UpgradePlan {
        images: held_images(cluster, observations),
        ..Default::default()
    };

    if let Some(pool) = ledger::in_flight(status_ledger, UPGRADE).map(str::to_string) {
        match observations.get(&pool) {
            Some(observation) if plan.images.contains_key(&pool) => {
                plan.images.insert(pool.clone(), desired.clone());
                if !observation.rolled_out(&desired) {
                    debug!(
                        "Upgrade of pool {}: {}/{} updated, {} ready",
                        pool, observation.updated, observation.replicas, observation.ready
                    );
                    plan.requeue = Some(ROLLING_REQUEUE);
                    return Ok(plan);
                }
                info!("Pool {} upgraded to {}", pool, desired);
                ledger::finish(status_ledger, UPGRADE, &pool);
            }
            _ => {
                // Pool removed mid-upgrade
                ledger::finish(status_ledger, UPGRADE, &pool);
            }
        }
    }

    let pending = pending_pools(cluster, observations, &desired);
    let Some(next) = pending.first().map(|p| p.to_string()) else {
        return Ok(plan);
    };
    if ledger::in_flight(status_ledger, SCALER).is_some() {
        plan.waiting = Some("waiting for scaling to finish".to_string());
        plan.requeue = Some(ROLLING_REQUEUE);
        return Ok(plan);
    }

    match check_cluster_status_for_restart(client, false).await? {
        RestartDecision::Proceed => {
            info!("Upgrading pool {} of cluster to {}", next, desired);
            ledger::begin(status_ledger, UPGRADE, &next);
            plan.images.insert(next, desired);
            plan.requeue = Some(ROLLING_REQUEUE);
        }
        RestartDecision::AllocationReactivated => {
            plan.waiting = Some("shard allocation re-enabled".to_string());
            plan.requeue = Some(ALLOCATION_REQUEUE);
        }
        RestartDecision::Wait(reason) => {
            debug!("Upgrade of pool {} waits: {}", next, reason);
            plan.waiting = Some(reason);
            plan.requeue = Some(HEALTH_REQUEUE);
        }
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_cluster;
    use opensearch_client::{HealthStatus, MockOpenSearchClient};

    const OLD: &str = "docker.io/opensearchproject/opensearch:2.19.4";
    const NEW: &str = "docker.io/opensearchproject/opensearch:3.4.0";

    fn settled(component: &str, image: &str, master: bool) -> PoolObservation {
        PoolObservation {
            component: component.to_string(),
            image: Some(image.to_string()),
            data: !master,
            master,
            replicas: 3,
            current: 3,
            ready: 3,
            updated: 3,
            observed: true,
        }
    }

    fn observations(masters: &str, data: &str) -> BTreeMap<String, PoolObservation> {
        BTreeMap::from([
            ("masters".to_string(), settled("masters", masters, true)),
            ("data".to_string(), settled("data", data, false)),
        ])
    }

    #[test]
    fn test_masters_are_upgraded_last() {
        let cluster = create_test_cluster("logs", "search", "3.4.0");
        assert_eq!(pending_pools(&cluster, &observations(OLD, OLD), NEW), vec!["data", "masters"]);
        assert_eq!(pending_pools(&cluster, &observations(OLD, NEW), NEW), vec!["masters"]);
        assert!(pending_pools(&cluster, &observations(NEW, NEW), NEW).is_empty());
    }

    #[tokio::test]
    async fn test_upgrade_walks_pools_one_at_a_time() {
        let client = MockOpenSearchClient::new("http://localhost:9200");
        let cluster = create_test_cluster("logs", "search", "3.4.0");
        let mut status_ledger = Vec::new();

        // First pass starts the data pool, masters keep the old image
        let plan = coordinate_upgrade(&client, &cluster, &observations(OLD, OLD), &mut status_ledger)
            .await
            .unwrap();
        assert_eq!(plan.images["data"], NEW);
        assert_eq!(plan.images["masters"], OLD);
        assert_eq!(status_ledger, vec![ComponentStatus::new(UPGRADE, "Running", "data")]);

        // Pods still rolling: nothing else moves
        let mut rolling = observations(OLD, NEW);
        if let Some(data) = rolling.get_mut("data") {
            data.updated = 1;
        }
        let plan = coordinate_upgrade(&client, &cluster, &rolling, &mut status_ledger).await.unwrap();
        assert_eq!(plan.images["masters"], OLD);
        assert_eq!(plan.requeue, Some(ROLLING_REQUEUE));
        assert_eq!(ledger::in_flight(&status_ledger, UPGRADE), Some("data"));

        // Data rolled out: masters start
        let plan = coordinate_upgrade(&client, &cluster, &observations(OLD, NEW), &mut status_ledger)
            .await
            .unwrap();
        assert_eq!(plan.images["masters"], NEW);
        assert_eq!(ledger::in_flight(&status_ledger, UPGRADE), Some("masters"));

        // Masters rolled out: ledger cleared
        let plan = coordinate_upgrade(&client, &cluster, &observations(NEW, NEW), &mut status_ledger)
            .await
            .unwrap();
        assert!(status_ledger.is_empty());
        assert_eq!(plan.requeue, None);
    }

    #[tokio::test]
    async fn test_unhealthy_cluster_blocks_upgrade() {
        let client = MockOpenSearchClient::new("http://localhost:9200");
        client.set_health_status(HealthStatus::Red);
        let cluster = create_test_cluster("logs", "search", "3.4.0");
        let mut status_ledger = Vec::new();

        let plan = coordinate_upgrade(&client, &cluster, &observations(OLD, OLD), &mut status_ledger)
            .await
            .unwrap();
        assert_eq!(plan.images["data"], OLD);
        assert_eq!(plan.requeue, Some(HEALTH_REQUEUE));
        assert!(plan.waiting.is_some());
        assert!(status_ledger.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_allocation_is_reactivated_first() {
        let client = MockOpenSearchClient::new("http://localhost:9200");
        client.set_health_status(HealthStatus::Yellow);
        client.set_transient_setting("cluster.routing.allocation.enable", "primaries");
        let cluster = create_test_cluster("logs", "search", "3.4.0");
        let mut status_ledger = Vec::new();

        let plan = coordinate_upgrade(&client, &cluster, &observations(OLD, OLD), &mut status_ledger)
            .await
            .unwrap();
        assert_eq!(plan.requeue, Some(ALLOCATION_REQUEUE));
        assert!(status_ledger.is_empty());
        assert_eq!(client.settings().shard_allocation().as_str(), "all");
    }

    #[tokio::test]
    async fn test_new_pool_starts_at_desired_image() {
        let client = MockOpenSearchClient::new("http://localhost:9200");
        client.set_unavailable(true);
        let mut cluster = create_test_cluster("logs", "search", "2.19.4");
        cluster
            .spec
            .node_pools
            .push(crate::test_utils::create_test_pool("data-nodes-new", 2, &["data"]));
        let mut status_ledger = Vec::new();

        let plan = coordinate_upgrade(&client, &cluster, &observations(OLD, OLD), &mut status_ledger)
            .await
            .unwrap();
        assert_eq!(plan.images["data-nodes-new"], OLD);
        assert!(status_ledger.is_empty());
    }

    #[tokio::test]
    async fn test_scaling_defers_upgrade() {
        let client = MockOpenSearchClient::new("http://localhost:9200");
        let cluster = create_test_cluster("logs", "search", "3.4.0");
        let mut status_ledger = vec![ComponentStatus::new(SCALER, "Running", "data")];

        let plan = coordinate_upgrade(&client, &cluster, &observations(OLD, OLD), &mut status_ledger)
            .await
            .unwrap();
        assert_eq!(plan.images["data"], OLD);
        assert_eq!(ledger::in_flight(&status_ledger, UPGRADE), None);
    }
}
