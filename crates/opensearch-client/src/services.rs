//! Semantic cluster operations built on the raw admin API.
//!
//! These are the predicates and mutations the operator uses to change a
//! running cluster safely: drain checks before a pod is removed, shard
//! allocation gating around restarts, and maintenance of the allocation
//! exclude list. They are generic over [`OpenSearchClientTrait`] so they run
//! unchanged against [`crate::OpenSearchClient`] and the mock.

use tracing::{debug, info};

use crate::error::OpenSearchError;
use crate::models::*;
use crate::opensearch_trait::OpenSearchClientTrait;

/// System indices checked instead of every index once a cluster is down to
/// its last two data nodes.
pub const SYSTEM_INDICES: &[&str] = &[
    ".opendistro-alerting-config",
    ".opendistro-alerting-alert*",
    ".opendistro-anomaly-results*",
    ".opendistro-anomaly-detector*",
    ".opendistro-anomaly-checkpoints",
    ".opendistro-anomaly-detection-state",
    ".opendistro-reports-*",
    ".opendistro-notifications-*",
    ".opendistro-notebooks",
    ".opendistro-asynchronous-search-response*",
    ".opendistro-ism-config",
    ".opendistro-job-scheduler-lock",
    ".opensearch-observability",
    ".opensearch-notifications-*",
    ".kibana_1",
    ".opendistro_security",
];

/// Index allowed to be yellow while a restart proceeds.
pub const OBSERVABILITY_INDEX: &str = ".opensearch-observability";

/// Outcome of [`check_cluster_status_for_restart`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartDecision {
    /// Safe to restart a node
    Proceed,
    /// Shard allocation was re-enabled; check again later
    AllocationReactivated,
    /// Not safe yet
    Wait(String),
}

impl RestartDecision {
    /// True for [`RestartDecision::Proceed`].
    pub fn may_proceed(&self) -> bool {
        matches!(self, RestartDecision::Proceed)
    }
}

/// Match an index name against a pattern with an optional trailing `*`.
pub fn index_matches(pattern: &str, index: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => index.starts_with(prefix),
        None => pattern == index,
    }
}

/// True if any index is configured without replicas.
pub async fn has_indices_with_no_replica<C>(client: &C) -> Result<bool, OpenSearchError>
where
    C: OpenSearchClientTrait + ?Sized,
{
    let indices = client.cat_indices().await?;
    Ok(indices.iter().any(|i| i.replicas() == Some(0)))
}

/// True if any listed index has a primary that is not started anywhere, or a
/// started primary on `node`.
///
/// An empty `indices` list checks every index.
pub async fn has_index_primaries_on_node<C>(
    client: &C,
    node: &str,
    indices: &[&str],
) -> Result<bool, OpenSearchError>
where
    C: OpenSearchClientTrait + ?Sized,
{
    let shards = client.cat_shards(&[]).await?;
    let blocking = shards
        .iter()
        .filter(|s| s.is_primary())
        .filter(|s| indices.is_empty() || indices.iter().any(|p| index_matches(p, &s.index)))
        .find(|s| !s.is_started() || s.is_on_node(node));
    if let Some(shard) = blocking {
        debug!(
            "Primary {}[{}] in state {} blocks drain of {}",
            shard.index, shard.shard, shard.state, node
        );
    }
    Ok(blocking.is_some())
}

/// True if any shard still lives on `node`.
pub async fn has_shards_on_node<C>(client: &C, node: &str) -> Result<bool, OpenSearchError>
where
    C: OpenSearchClientTrait + ?Sized,
{
    let shards = client.cat_shards(&[]).await?;
    Ok(shards.iter().any(|s| s.is_on_node(node)))
}

/// Decide whether a node may be restarted.
///
/// Green proceeds. With `drain_nodes` anything but green waits. A disabled
/// allocation is switched back to `all` first. A yellow cluster proceeds only
/// when the sole non-green index is `.opensearch-observability` and nothing
/// is relocating, initializing, or unassigned beyond one shard.
pub async fn check_cluster_status_for_restart<C>(
    client: &C,
    drain_nodes: bool,
) -> Result<RestartDecision, OpenSearchError>
where
    C: OpenSearchClientTrait + ?Sized,
{
    let health = client.health().await?;
    if health.status == HealthStatus::Green {
        return Ok(RestartDecision::Proceed);
    }
    if drain_nodes {
        return Ok(RestartDecision::Wait(format!(
            "cluster is {} and node draining is enabled",
            health.status.as_str()
        )));
    }

    let settings = client.get_cluster_settings(true).await?;
    if settings.shard_allocation() != ShardAllocation::All {
        set_cluster_shard_allocation(client, ShardAllocation::All).await?;
        return Ok(RestartDecision::AllocationReactivated);
    }

    if is_observability_yellow(&health) {
        return Ok(RestartDecision::Proceed);
    }

    Ok(RestartDecision::Wait(format!(
        "waiting for cluster health to turn green (currently {})",
        health.status.as_str()
    )))
}

/// Yellow caused only by a fresh `.opensearch-observability` index.
pub fn is_observability_yellow(health: &ClusterHealth) -> bool {
    if health.status != HealthStatus::Yellow {
        return false;
    }
    let offending: Vec<&String> = health
        .indices
        .iter()
        .filter(|(_, h)| h.status != HealthStatus::Green)
        .map(|(name, _)| name)
        .collect();
    offending.len() == 1
        && offending[0] == OBSERVABILITY_INDEX
        && health.relocating_shards == 0
        && health.initializing_shards == 0
        && health.unassigned_shards <= 1
}

/// Set `cluster.routing.allocation.enable`.
pub async fn set_cluster_shard_allocation<C>(
    client: &C,
    allocation: ShardAllocation,
) -> Result<(), OpenSearchError>
where
    C: OpenSearchClientTrait + ?Sized,
{
    info!("Setting shard allocation to {}", allocation.as_str());
    let body = serde_json::json!({
        "transient": { ALLOCATION_ENABLE_SETTING: allocation.as_str() }
    });
    client.put_cluster_settings(&body).await?;
    Ok(())
}

/// Restore shard allocation to `all` if it is anything else.
pub async fn reactivate_shard_allocation<C>(client: &C) -> Result<(), OpenSearchError>
where
    C: OpenSearchClientTrait + ?Sized,
{
    let settings = client.get_cluster_settings(true).await?;
    if settings.shard_allocation() == ShardAllocation::All {
        return Ok(());
    }
    set_cluster_shard_allocation(client, ShardAllocation::All).await
}

/// Add `node` to a comma separated exclude list; duplicates and blanks are dropped.
pub fn append_to_exclude_list(list: &str, node: &str) -> String {
    let mut names = split_exclude_list(list);
    if !node.is_empty() && !names.iter().any(|n| n == node) {
        names.push(node.to_string());
    }
    names.join(",")
}

/// Remove exact matches of `node` from a comma separated exclude list.
pub fn remove_from_exclude_list(list: &str, node: &str) -> String {
    split_exclude_list(list)
        .into_iter()
        .filter(|n| n != node)
        .collect::<Vec<_>>()
        .join(",")
}

fn split_exclude_list(list: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Exclude `node` from shard allocation. Returns true when the setting changed.
pub async fn append_exclude_node_host<C>(client: &C, node: &str) -> Result<bool, OpenSearchError>
where
    C: OpenSearchClientTrait + ?Sized,
{
    let settings = client.get_cluster_settings(true).await?;
    let current = settings.exclude_names();
    let updated = append_to_exclude_list(current, node);
    if updated == current {
        return Ok(false);
    }
    put_exclude_list(client, &updated).await?;
    Ok(true)
}

/// Allow `node` to receive shards again. Returns true when the setting changed.
pub async fn remove_exclude_node_host<C>(client: &C, node: &str) -> Result<bool, OpenSearchError>
where
    C: OpenSearchClientTrait + ?Sized,
{
    let settings = client.get_cluster_settings(true).await?;
    let current = settings.exclude_names();
    let updated = remove_from_exclude_list(current, node);
    if updated == current {
        return Ok(false);
    }
    put_exclude_list(client, &updated).await?;
    Ok(true)
}

/// Clear the exclude list entirely.
pub async fn clear_exclude_list<C>(client: &C) -> Result<(), OpenSearchError>
where
    C: OpenSearchClientTrait + ?Sized,
{
    let settings = client.get_cluster_settings(true).await?;
    if settings.exclude_names().is_empty() {
        return Ok(());
    }
    put_exclude_list(client, "").await
}

async fn put_exclude_list<C>(client: &C, list: &str) -> Result<(), OpenSearchError>
where
    C: OpenSearchClientTrait + ?Sized,
{
    debug!("Setting allocation exclude list to '{}'", list);
    let value = if list.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::Value::String(list.to_string())
    };
    let body = serde_json::json!({ "transient": { EXCLUDE_NAME_SETTING: value } });
    client.put_cluster_settings(&body).await?;
    Ok(())
}

/// Prepare a pod for removal.
///
/// Without draining, shard allocation is restricted to primaries and the pod
/// may go immediately. With draining, the pod's node is excluded and removal
/// is allowed only once its shards have moved; with two data nodes left only
/// system index primaries are checked.
pub async fn prepare_pod_for_delete<C>(
    client: &C,
    pod_name: &str,
    drain_node: bool,
    node_count: i32,
) -> Result<bool, OpenSearchError>
where
    C: OpenSearchClientTrait + ?Sized,
{
    if !drain_node {
        set_cluster_shard_allocation(client, ShardAllocation::Primaries).await?;
        return Ok(true);
    }

    append_exclude_node_host(client, pod_name).await?;
    let blocked = if node_count == 2 {
        has_index_primaries_on_node(client, pod_name, SYSTEM_INDICES).await?
    } else {
        has_shards_on_node(client, pod_name).await?
    };
    if blocked {
        info!("Waiting for shards to move off {}", pod_name);
    }
    Ok(!blocked)
}

/// Decide whether an internal user must be written.
///
/// The password is blanked on both sides before comparing. An existing user
/// whose `k8s-uid` attribute differs from the desired one belongs to another
/// resource and yields [`OpenSearchError::Ownership`].
pub fn should_update_user(existing: &InternalUser, desired: &InternalUser, uid_key: &str) -> Result<bool, OpenSearchError> {
    let existing_uid = existing.attributes.get(uid_key);
    let desired_uid = desired.attributes.get(uid_key);
    if existing_uid != desired_uid {
        return Err(OpenSearchError::Ownership(format!(
            "user is owned by uid {}",
            existing_uid.map(String::as_str).unwrap_or("<none>")
        )));
    }
    let mut a = existing.clone();
    let mut b = desired.clone();
    a.password = None;
    a.hash = None;
    b.password = None;
    b.hash = None;
    Ok(a != b)
}

/// Decide whether a role must be written.
pub fn should_update_role(existing: &Role, desired: &Role) -> bool {
    existing != desired
}

/// Decide whether a role mapping must be written.
pub fn should_update_role_mapping(existing: &RoleMapping, desired: &RoleMapping) -> bool {
    existing != desired
}

/// Decide whether a tenant must be written.
pub fn should_update_tenant(existing: &Tenant, desired: &Tenant) -> bool {
    existing != desired
}

/// Decide whether an action group must be written.
pub fn should_update_action_group(existing: &ActionGroup, desired: &ActionGroup) -> bool {
    existing != desired
}
