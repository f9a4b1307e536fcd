//! Replica changes of node pools, including removal of whole pools.
//!
//! Scaling up needs no coordination. Scaling a data pool down removes one
//! pod per step, with a single step in flight across the cluster, recorded
//! in the ledger. Each step asks the gateway whether the highest ordinal pod
//! may go; once it is gone its exclusion is lifted and shard allocation is
//! restored before the next step.

use std::collections::BTreeMap;
use std::time::Duration;

use crds::{ComponentStatus, OpenSearchCluster};
use opensearch_client::services::{
    clear_exclude_list, prepare_pod_for_delete, reactivate_shard_allocation, remove_exclude_node_host,
    set_cluster_shard_allocation,
};
use opensearch_client::{OpenSearchClientTrait, OpenSearchError, ShardAllocation};
use tracing::{debug, info};

use super::builders::pod_name;
use super::ledger::{self, SCALER, UPGRADE};
use super::pools::PoolObservation;

/// Re-check interval while a scale step is in flight
const STEP_REQUEUE: Duration = Duration::from_secs(10);

/// Replica counts and removals for the node pools.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScalePlan {
    pub replicas: BTreeMap<String, i32>,
    /// Pools no longer declared whose stateful set can be deleted
    pub remove: Vec<String>,
    pub requeue: Option<Duration>,
    pub waiting: Option<String>,
}

impl ScalePlan {
    fn wait(&mut self, reason: String) {
        debug!("Scaling waits: {}", reason);
        self.waiting.get_or_insert(reason);
        self.requeue = Some(STEP_REQUEUE);
    }
}

struct Target {
    component: String,
    desired: i32,
    data: bool,
    removed: bool,
}

fn targets(cluster: &OpenSearchCluster, observations: &BTreeMap<String, PoolObservation>) -> Vec<Target> {
    let declared = cluster.spec.node_pools.iter().map(|p| Target {
        component: p.component.clone(),
        desired: p.replicas,
        data: p.is_data(),
        removed: false,
    });
    let removed = observations
        .values()
        .filter(|o| !cluster.spec.node_pools.iter().any(|p| p.component == o.component))
        .map(|o| Target {
            component: o.component.clone(),
            desired: 0,
            data: o.data,
            removed: true,
        });
    declared.chain(removed).collect()
}

/// Replica counts that never remove a pod: growth is applied, shrinking is held.
pub fn held_replicas(
    cluster: &OpenSearchCluster,
    observations: &BTreeMap<String, PoolObservation>,
) -> BTreeMap<String, i32> {
    targets(cluster, observations)
        .into_iter()
        .map(|t| {
            let current = observations.get(&t.component).map_or(0, |o| o.replicas);
            let replicas = if t.data { t.desired.max(current) } else { t.desired };
            (t.component, replicas)
        })
        .collect()
}

/// Decide replica counts and advance the scaler ledger.
pub async fn coordinate_scale(
    client: &dyn OpenSearchClientTrait,
    cluster: &OpenSearchCluster,
    observations: &BTreeMap<String, PoolObservation>,
    status_ledger: &mut Vec<ComponentStatus>,
) -> Result<ScalePlan, OpenSearchError> {
    let drain = cluster.drain_data_nodes();
    let data_nodes: i32 = observations.values().filter(|o| o.data).map(|o| o.current).sum();
    let mut plan = ScalePlan::default();

    for target in targets(cluster, observations) {
        let component = target.component.as_str();
        let Some(observation) = observations.get(component) else {
            plan.replicas.insert(target.component.clone(), target.desired);
            continue;
        };
        let current = observation.replicas;
        let stepping = ledger::is_running(status_ledger, SCALER, component);

        if !target.data && !stepping {
            plan.replicas.insert(target.component.clone(), target.desired);
        } else if stepping {
            if !observation.settled() {
                plan.replicas.insert(target.component.clone(), current);
                plan.wait(format!("waiting for pool {} to settle at {} nodes", component, current));
                continue;
            }
            // The pod above the current count is gone
            let removed_pod = pod_name(cluster, component, current);
            remove_exclude_node_host(client, &removed_pod).await?;
            reactivate_shard_allocation(client).await?;

            if target.desired >= current {
                info!("Pool {} scaled to {} nodes", component, current);
                ledger::finish(status_ledger, SCALER, component);
                plan.replicas.insert(target.component.clone(), target.desired);
            } else {
                let replicas = step_down(client, cluster, component, current, drain, data_nodes, &mut plan).await?;
                plan.replicas.insert(target.component.clone(), replicas);
            }
        } else if target.desired >= current {
            plan.replicas.insert(target.component.clone(), target.desired);
        } else {
            plan.replicas.insert(target.component.clone(), current);
            if let Some(other) = ledger::in_flight(status_ledger, SCALER) {
                plan.wait(format!("pool {} is scaling", other));
                continue;
            }
            if let Some(other) = ledger::in_flight(status_ledger, UPGRADE) {
                plan.wait(format!("pool {} is upgrading", other));
                continue;
            }
            if !observation.settled() {
                plan.wait(format!("waiting for pool {} to settle before scaling down", component));
                continue;
            }
            info!("Scaling pool {} down from {} to {}", component, current, target.desired);
            ledger::begin(status_ledger, SCALER, component);
            let replicas = step_down(client, cluster, component, current, drain, data_nodes, &mut plan).await?;
            plan.replicas.insert(target.component.clone(), replicas);
        }

        if target.removed
            && plan.replicas.get(component) == Some(&0)
            && observation.current == 0
            && !ledger::is_running(status_ledger, SCALER, component)
        {
            plan.remove.push(target.component.clone());
        }
    }
    Ok(plan)
}

/// Try to remove the highest ordinal pod. Returns the replica count to apply.
async fn step_down(
    client: &dyn OpenSearchClientTrait,
    cluster: &OpenSearchCluster,
    component: &str,
    current: i32,
    drain: bool,
    data_nodes: i32,
    plan: &mut ScalePlan,
) -> Result<i32, OpenSearchError> {
    let pod = pod_name(cluster, component, current - 1);
    if prepare_pod_for_delete(client, &pod, drain, data_nodes).await? {
        info!("Removing pod {}", pod);
        plan.requeue = Some(STEP_REQUEUE);
        Ok(current - 1)
    } else {
        plan.wait(format!("draining shards from {}", pod));
        Ok(current)
    }
}

/// Quiesce a cluster whose declaration is being deleted.
///
/// Exclusions left behind by an interrupted drain are dropped first, then
/// allocation is restricted to primaries so data nodes stopping together do
/// not start replica recoveries onto each other. Both settings are transient
/// and go away with the cluster.
pub async fn quiesce_for_deletion<C>(client: &C) -> Result<(), OpenSearchError>
where
    C: OpenSearchClientTrait + ?Sized,
{
    clear_exclude_list(client).await?;
    set_cluster_shard_allocation(client, ShardAllocation::Primaries).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_cluster, create_test_pool};
    use opensearch_client::{CatShard, EXCLUDE_NAME_SETTING, MockOpenSearchClient};

    fn observed(component: &str, data: bool, replicas: i32) -> PoolObservation {
        PoolObservation {
            component: component.to_string(),
            image: Some("img".to_string()),
            data,
            master: !data,
            replicas,
            current: replicas,
            ready: replicas,
            updated: replicas,
            observed: true,
        }
    }

    fn cluster_with_data(replicas: i32, drain: bool) -> OpenSearchCluster {
        let mut cluster = create_test_cluster("logs", "search", "2.19.4");
        cluster.spec.node_pools[1].replicas = replicas;
        cluster.spec.general.drain_data_nodes = Some(drain);
        cluster
    }

    fn live(data_replicas: i32) -> BTreeMap<String, PoolObservation> {
        BTreeMap::from([
            ("masters".to_string(), observed("masters", false, 3)),
            ("data".to_string(), observed("data", true, data_replicas)),
        ])
    }

    #[tokio::test]
    async fn test_scale_up_needs_no_gateway() {
        let client = MockOpenSearchClient::new("http://localhost:9200");
        client.set_unavailable(true);
        let cluster = cluster_with_data(4, false);
        let mut status_ledger = Vec::new();

        let plan = coordinate_scale(&client, &cluster, &live(3), &mut status_ledger).await.unwrap();
        assert_eq!(plan.replicas["data"], 4);
        assert_eq!(plan.replicas["masters"], 3);
        assert!(status_ledger.is_empty());
        assert_eq!(plan.requeue, None);
    }

    #[tokio::test]
    async fn test_scale_down_without_drain_restricts_allocation() {
        let client = MockOpenSearchClient::new("http://localhost:9200");
        let cluster = cluster_with_data(2, false);
        let mut status_ledger = Vec::new();

        let plan = coordinate_scale(&client, &cluster, &live(3), &mut status_ledger).await.unwrap();
        assert_eq!(plan.replicas["data"], 2);
        assert_eq!(client.settings().shard_allocation(), ShardAllocation::Primaries);
        assert_eq!(status_ledger, vec![ComponentStatus::new(SCALER, "Running", "data")]);

        // Pod gone: allocation restored and the ledger entry cleared
        let plan = coordinate_scale(&client, &cluster, &live(2), &mut status_ledger).await.unwrap();
        assert_eq!(plan.replicas["data"], 2);
        assert_eq!(client.settings().shard_allocation(), ShardAllocation::All);
        assert!(status_ledger.is_empty());
    }

    #[tokio::test]
    async fn test_drain_blocks_until_shards_moved() {
        let client = MockOpenSearchClient::new("http://localhost:9200");
        client.set_shards(vec![CatShard {
            index: "logs-000001".to_string(),
            shard: "0".to_string(),
            prirep: "r".to_string(),
            state: "STARTED".to_string(),
            node: Some("logs-data-2".to_string()),
            ..Default::default()
        }]);
        let cluster = cluster_with_data(2, true);
        let mut status_ledger = Vec::new();

        let plan = coordinate_scale(&client, &cluster, &live(3), &mut status_ledger).await.unwrap();
        assert_eq!(plan.replicas["data"], 3);
        assert!(plan.waiting.is_some());
        assert_eq!(client.settings().exclude_names(), "logs-data-2");

        client.set_shards(vec![]);
        let plan = coordinate_scale(&client, &cluster, &live(3), &mut status_ledger).await.unwrap();
        assert_eq!(plan.replicas["data"], 2);

        let plan = coordinate_scale(&client, &cluster, &live(2), &mut status_ledger).await.unwrap();
        assert_eq!(plan.replicas["data"], 2);
        assert_eq!(client.settings().exclude_names(), "");
        assert!(status_ledger.is_empty());
    }

    #[tokio::test]
    async fn test_one_data_pool_scales_down_at_a_time() {
        let client = MockOpenSearchClient::new("http://localhost:9200");
        let mut cluster = cluster_with_data(2, false);
        cluster.spec.node_pools.push(create_test_pool("warm", 1, &["data"]));
        let mut observations = live(3);
        observations.insert("warm".to_string(), observed("warm", true, 2));
        let mut status_ledger = Vec::new();

        let plan = coordinate_scale(&client, &cluster, &observations, &mut status_ledger).await.unwrap();
        assert_eq!(plan.replicas["data"], 2);
        assert_eq!(plan.replicas["warm"], 2);
        assert_eq!(status_ledger.len(), 1);
    }

    #[test]
    fn test_held_replicas_never_shrink_data_pools() {
        let cluster = cluster_with_data(2, false);
        let held = held_replicas(&cluster, &live(3));
        assert_eq!(held["data"], 3);
        assert_eq!(held["masters"], 3);

        let cluster = cluster_with_data(5, false);
        assert_eq!(held_replicas(&cluster, &live(3))["data"], 5);
    }

    #[tokio::test]
    async fn test_removed_pool_is_deleted_once_empty() {
        let client = MockOpenSearchClient::new("http://localhost:9200");
        let mut cluster = create_test_cluster("logs", "search", "2.19.4");
        cluster.spec.node_pools[1] = create_test_pool("data-nodes-new", 2, &["data"]);
        let mut observations = live(0);
        observations.insert("data-nodes-new".to_string(), observed("data-nodes-new", true, 2));
        observations.insert("coordinators".to_string(), observed("coordinators", false, 2));
        let mut status_ledger = Vec::new();

        let plan = coordinate_scale(&client, &cluster, &observations, &mut status_ledger).await.unwrap();
        assert_eq!(plan.replicas["data"], 0);
        assert_eq!(plan.replicas["coordinators"], 0);
        assert_eq!(plan.remove, vec!["data".to_string()]);
    }

    #[tokio::test]
    async fn test_deletion_quiesce_drops_drain_and_holds_replicas() {
        let client = MockOpenSearchClient::new("http://localhost:9200");
        client.set_transient_setting(EXCLUDE_NAME_SETTING, "logs-data-2");

        quiesce_for_deletion(&client).await.unwrap();

        let settings = client.settings();
        assert!(settings.exclude_names().is_empty());
        assert_eq!(settings.shard_allocation(), ShardAllocation::Primaries);
        let writes = client.writes_for("cluster_settings");
        assert_eq!(writes.len(), 2);
        assert_eq!(
            writes[0].body,
            Some(serde_json::json!({"transient": {EXCLUDE_NAME_SETTING: null}}))
        );
        assert_eq!(
            writes[1].body,
            Some(serde_json::json!({"transient": {"cluster.routing.allocation.enable": "primaries"}}))
        );
    }

    #[tokio::test]
    async fn test_deletion_quiesce_without_drain_only_restricts_allocation() {
        let client = MockOpenSearchClient::new("http://localhost:9200");

        quiesce_for_deletion(&client).await.unwrap();

        let writes = client.writes_for("cluster_settings");
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].op, "settings");
        assert_eq!(client.settings().shard_allocation(), ShardAllocation::Primaries);
    }
}
