//! Observed state of the node pool stateful sets.

use std::collections::BTreeMap;

use crds::{NODE_POOL_LABEL, is_master_role};
use k8s_openapi::api::apps::v1::StatefulSet;

use super::builders::stateful_set_image;

/// What the coordinators need to know about one live stateful set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PoolObservation {
    pub component: String,
    pub image: Option<String>,
    /// Pool holds shards
    pub data: bool,
    /// Pool is cluster manager eligible
    pub master: bool,
    /// `spec.replicas`
    pub replicas: i32,
    /// Pods that exist
    pub current: i32,
    pub ready: i32,
    /// Pods at the latest template revision
    pub updated: i32,
    /// Status reflects the latest spec
    pub observed: bool,
}

impl PoolObservation {
    /// Every pod exists, is ready, and the controller caught up with the spec.
    pub fn settled(&self) -> bool {
        self.observed && self.current == self.replicas && self.ready == self.replicas
    }

    /// Every pod runs `image`.
    pub fn rolled_out(&self, image: &str) -> bool {
        self.image.as_deref() == Some(image) && self.settled() && self.updated == self.replicas
    }
}

/// Observe a stateful set labelled with a node pool.
pub fn observe(sts: &StatefulSet) -> Option<PoolObservation> {
    let component = sts.metadata.labels.as_ref()?.get(NODE_POOL_LABEL)?.clone();
    let spec = sts.spec.as_ref()?;
    let status = sts.status.as_ref();
    let roles = node_roles(sts);

    let observed = match (sts.metadata.generation, status.and_then(|s| s.observed_generation)) {
        (Some(generation), Some(seen)) => seen >= generation,
        _ => false,
    };
    Some(PoolObservation {
        component,
        image: stateful_set_image(sts).map(str::to_string),
        data: roles.iter().any(|r| r == "data"),
        master: roles.iter().any(|r| is_master_role(r)),
        replicas: spec.replicas.unwrap_or(1),
        current: status.map(|s| s.replicas).unwrap_or(0),
        ready: status.and_then(|s| s.ready_replicas).unwrap_or(0),
        updated: status.and_then(|s| s.updated_replicas).unwrap_or(0),
        observed,
    })
}

/// Roles from the `node.roles` env var of the pod template.
fn node_roles(sts: &StatefulSet) -> Vec<String> {
    sts.spec
        .as_ref()
        .and_then(|s| s.template.spec.as_ref())
        .and_then(|p| p.containers.first())
        .and_then(|c| c.env.as_ref())
        .and_then(|env| env.iter().find(|e| e.name == "node.roles"))
        .and_then(|e| e.value.as_deref())
        .map(|v| v.split(',').map(|r| r.trim().to_string()).filter(|r| !r.is_empty()).collect())
        .unwrap_or_default()
}

/// Observations keyed by pool component.
pub fn observe_all(stateful_sets: &[StatefulSet]) -> BTreeMap<String, PoolObservation> {
    stateful_sets
        .iter()
        .filter_map(observe)
        .map(|o| (o.component.clone(), o))
        .collect()
}
