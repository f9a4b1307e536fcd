//! Lease based leader election.
//!
//! The holder renews a `coordination.k8s.io/v1` Lease every five seconds.
//! Another instance takes over once the last renewal is older than the
//! lease duration. Renewals are recorded in an annotation as epoch seconds.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Client;
use kube::api::{Api, PostParams};
use tracing::{debug, error, info, warn};

use crate::error::{ControllerError, is_kube_conflict, is_kube_not_found};
use crate::metrics::Metrics;

/// Name of the Lease object
pub const LEASE_NAME: &str = "opensearch-operator-leader";

/// Annotation holding the last renewal as epoch seconds
const RENEW_EPOCH_ANNOTATION: &str = "opensearch.org/renew-epoch";

/// Lease settings.
#[derive(Debug, Clone)]
pub struct LeaderElectionConfig {
    /// Name of the Lease object
    pub lease_name: String,
    /// Namespace of the Lease
    pub namespace: String,
    /// Identity of this instance, usually the pod name
    pub holder_id: String,
    /// Seconds a renewal stays valid
    pub lease_duration_secs: i32,
    /// Renewal period
    pub renew_interval: Duration,
}

impl LeaderElectionConfig {
    /// Settings from `POD_NAME` / `POD_NAMESPACE`, with a random identity
    /// when the pod name is unknown.
    pub fn from_env() -> Self {
        let holder_id = std::env::var("POD_NAME")
            .unwrap_or_else(|_| format!("opensearch-operator-{}", uuid::Uuid::new_v4()));
        let namespace = std::env::var("POD_NAMESPACE").unwrap_or_else(|_| "default".to_string());
        Self {
            lease_name: LEASE_NAME.to_string(),
            namespace,
            holder_id,
            lease_duration_secs: 15,
            renew_interval: Duration::from_secs(5),
        }
    }
}

/// Shared view of whether this instance leads.
#[derive(Debug, Clone, Default)]
pub struct LeaderStatus {
    is_leader: Arc<AtomicBool>,
}

impl LeaderStatus {
    /// Status starting as follower.
    pub fn new() -> Self {
        Self::default()
    }

    /// True while this instance holds the lease.
    pub fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::Relaxed)
    }

    /// Lead unconditionally, used without `--leader-elect`.
    pub fn force_leader(&self) {
        self.is_leader.store(true, Ordering::Relaxed);
    }

    fn set_leader(&self, leader: bool) {
        self.is_leader.store(leader, Ordering::Relaxed);
    }

    /// Resolve once leadership is held.
    pub async fn acquired(&self) {
        while !self.is_leader() {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    /// Resolve once leadership is lost.
    pub async fn lost(&self) {
        while self.is_leader() {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }
}

/// Acquire and renew the lease forever.
pub async fn run(client: Client, config: LeaderElectionConfig, status: LeaderStatus, metrics: Metrics) {
    let api: Api<Lease> = Api::namespaced(client, &config.namespace);
    loop {
        match try_acquire_or_renew(&api, &config).await {
            Ok(acquired) => {
                if acquired && !status.is_leader() {
                    info!(holder = %config.holder_id, lease = %config.lease_name, "Acquired leadership");
                } else if !acquired && status.is_leader() {
                    warn!(holder = %config.holder_id, "Lost leadership");
                }
                status.set_leader(acquired);
            }
            Err(e) => {
                error!("Leader election failed: {}", e);
                status.set_leader(false);
            }
        }
        metrics.set_leader(status.is_leader());
        tokio::time::sleep(config.renew_interval).await;
    }
}

/// Release the lease on shutdown so a standby takes over quickly.
pub async fn step_down(client: &Client, config: &LeaderElectionConfig) {
    let api: Api<Lease> = Api::namespaced(client.clone(), &config.namespace);
    let existing = match api.get(&config.lease_name).await {
        Ok(lease) => lease,
        Err(e) => {
            debug!("Could not read lease for step-down: {}", e);
            return;
        }
    };
    if holder(&existing) != Some(config.holder_id.as_str()) {
        return;
    }
    let mut released = existing;
    if let Some(spec) = released.spec.as_mut() {
        spec.holder_identity = None;
        spec.lease_duration_seconds = Some(1);
    }
    match api.replace(&config.lease_name, &PostParams::default(), &released).await {
        Ok(_) => info!("Stepped down from leadership"),
        Err(e) => warn!("Failed to step down: {}", e),
    }
}

fn holder(lease: &Lease) -> Option<&str> {
    lease.spec.as_ref().and_then(|s| s.holder_identity.as_deref())
}

fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// True when the lease's last renewal is older than its duration.
fn expired(lease: &Lease, now: u64, default_duration: i32) -> bool {
    let renewed: Option<u64> = lease
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(RENEW_EPOCH_ANNOTATION))
        .and_then(|v| v.parse().ok());
    let duration = lease
        .spec
        .as_ref()
        .and_then(|s| s.lease_duration_seconds)
        .unwrap_or(default_duration);
    let duration = u64::try_from(duration).unwrap_or_default();
    renewed.is_none_or(|at| now > at + duration)
}

fn stamp(lease: &mut Lease, now: u64) {
    lease
        .metadata
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(RENEW_EPOCH_ANNOTATION.to_string(), now.to_string());
}

async fn try_acquire_or_renew(api: &Api<Lease>, config: &LeaderElectionConfig) -> Result<bool, ControllerError> {
    let now = epoch_secs();
    let existing = match api.get(&config.lease_name).await {
        Ok(lease) => lease,
        Err(e) if is_kube_not_found(&e) => return create_lease(api, config, now).await,
        Err(e) => return Err(e.into()),
    };

    let ours = holder(&existing) == Some(config.holder_id.as_str());
    if !ours && !expired(&existing, now, config.lease_duration_secs) {
        debug!(holder = ?holder(&existing), "Lease held by another instance");
        return Ok(false);
    }

    let mut updated = existing;
    if !ours {
        if let Some(spec) = updated.spec.as_mut() {
            spec.holder_identity = Some(config.holder_id.clone());
            spec.lease_duration_seconds = Some(config.lease_duration_secs);
            spec.lease_transitions = Some(spec.lease_transitions.unwrap_or(0) + 1);
        }
    }
    stamp(&mut updated, now);

    match api.replace(&config.lease_name, &PostParams::default(), &updated).await {
        Ok(_) => Ok(true),
        Err(e) if is_kube_conflict(&e) => {
            debug!("Conflict writing lease, will retry");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

async fn create_lease(api: &Api<Lease>, config: &LeaderElectionConfig, now: u64) -> Result<bool, ControllerError> {
    let mut lease = Lease {
        metadata: ObjectMeta {
            name: Some(config.lease_name.clone()),
            namespace: Some(config.namespace.clone()),
            ..Default::default()
        },
        spec: Some(LeaseSpec {
            holder_identity: Some(config.holder_id.clone()),
            lease_duration_seconds: Some(config.lease_duration_secs),
            lease_transitions: Some(0),
            ..Default::default()
        }),
    };
    stamp(&mut lease, now);

    match api.create(&PostParams::default(), &lease).await {
        Ok(_) => Ok(true),
        Err(e) if is_kube_conflict(&e) => {
            debug!("Lease created by another instance");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lease(renewed: Option<u64>, duration: Option<i32>) -> Lease {
        let mut lease = Lease {
            metadata: ObjectMeta::default(),
            spec: Some(LeaseSpec {
                holder_identity: Some("operator-0".to_string()),
                lease_duration_seconds: duration,
                ..Default::default()
            }),
        };
        if let Some(at) = renewed {
            stamp(&mut lease, at);
        }
        lease
    }

    #[test]
    fn test_status_clone_shares_state() {
        let status = LeaderStatus::new();
        let clone = status.clone();
        assert!(!clone.is_leader());
        status.force_leader();
        assert!(clone.is_leader());
    }

    #[test]
    fn test_expiry_uses_lease_duration() {
        let fresh = lease(Some(1_000), Some(15));
        assert!(!expired(&fresh, 1_010, 15));
        assert!(expired(&fresh, 1_016, 15));

        let defaulted = lease(Some(1_000), None);
        assert!(!expired(&defaulted, 1_030, 60));
    }

    #[test]
    fn test_unstamped_lease_is_expired() {
        assert!(expired(&lease(None, Some(15)), 0, 15));
    }

    #[test]
    fn test_holder() {
        assert_eq!(holder(&lease(None, None)), Some("operator-0"));
    }

    #[tokio::test]
    async fn test_acquired_resolves_for_leader() {
        let status = LeaderStatus::new();
        status.force_leader();
        tokio::time::timeout(Duration::from_secs(1), status.acquired())
            .await
            .unwrap();
    }
}
