//! Snapshot management policy reconciler
//!
//! Handles: OpensearchSnapshotPolicy

use std::sync::Arc;

use async_trait::async_trait;
use crds::{ManagedResourceStatus, OpenSearchCluster, OpenSearchClusterRef, OpensearchSnapshotPolicy};
use kube::{Api, Client, ResourceExt};
use kube_runtime::controller::Action;
use opensearch_client::{OpenSearchClientTrait, OpenSearchError};
use serde_json::{Value, json};
use tracing::warn;

use super::{Reconciler, SubResource, namespaced_api};
use crate::error::ControllerError;
use crate::reconcile_helpers::{RemoteState, RemoteSync, json_contains, without_null_fields};

/// Update attempts before a version conflict is surfaced
const UPDATE_ATTEMPTS: u32 = 2;

/// A snapshot management policy.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotPolicySync {
    pub name: String,
    pub policy: Value,
}

impl SnapshotPolicySync {
    pub fn from_resource(resource: &OpensearchSnapshotPolicy) -> Self {
        let spec = &resource.spec;
        let config = &spec.snapshot_config;
        let snapshot_config = without_null_fields(json!({
            "repository": config.repository,
            "indices": config.indices,
            "date_format": config.date_format,
            "ignore_unavailable": config.ignore_unavailable,
            "include_global_state": config.include_global_state,
            "partial": config.partial,
        }));
        let policy = without_null_fields(json!({
            "description": spec.description,
            "enabled": spec.enabled,
            "snapshot_config": snapshot_config,
            "creation": spec.creation,
            "deletion": spec.deletion,
            "notification": spec.notification,
        }));
        Self {
            name: spec.policy_name.clone().unwrap_or_else(|| resource.name_any()),
            policy,
        }
    }
}

#[async_trait]
impl RemoteSync for SnapshotPolicySync {
    fn kind(&self) -> &'static str {
        "snapshot policy"
    }

    fn external_name(&self) -> &str {
        &self.name
    }

    async fn remote_state(&self, client: &dyn OpenSearchClientTrait) -> Result<RemoteState, OpenSearchError> {
        Ok(match client.get_snapshot_policy(&self.name).await? {
            Some(_) => RemoteState::Foreign,
            None => RemoteState::Absent,
        })
    }

    async fn create(&self, client: &dyn OpenSearchClientTrait) -> Result<(), OpenSearchError> {
        client.create_snapshot_policy(&self.name, &self.policy).await
    }

    async fn update(&self, client: &dyn OpenSearchClientTrait) -> Result<bool, OpenSearchError> {
        let mut attempt = 1;
        loop {
            let Some(existing) = client.get_snapshot_policy(&self.name).await? else {
                client.create_snapshot_policy(&self.name, &self.policy).await?;
                return Ok(true);
            };
            if json_contains(&existing.policy, &self.policy) {
                return Ok(false);
            }
            match client
                .update_snapshot_policy(&self.name, existing.seq_no, existing.primary_term, &self.policy)
                .await
            {
                Ok(()) => return Ok(true),
                Err(OpenSearchError::Conflict(reason)) if attempt < UPDATE_ATTEMPTS => {
                    warn!("Snapshot policy {} changed concurrently, retrying: {}", self.name, reason);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn delete(&self, client: &dyn OpenSearchClientTrait) -> Result<(), OpenSearchError> {
        client.delete_snapshot_policy(&self.name).await
    }
}

#[async_trait]
impl SubResource for OpensearchSnapshotPolicy {
    fn api(client: Client, namespace: Option<&str>) -> Api<Self> {
        namespaced_api(client, namespace)
    }

    fn cluster_ref(&self) -> &OpenSearchClusterRef {
        &self.spec.opensearch_cluster
    }

    fn managed_status(&self) -> Option<&ManagedResourceStatus> {
        self.status.as_ref()
    }

    async fn remote(
        &self,
        _reconciler: &Reconciler,
        _cluster: &OpenSearchCluster,
    ) -> Result<Box<dyn RemoteSync>, ControllerError> {
        Ok(Box::new(SnapshotPolicySync::from_resource(self)))
    }
}

impl Reconciler {
    /// Reconciles an OpensearchSnapshotPolicy resource.
    pub async fn reconcile_snapshot_policy(
        &self,
        policy: Arc<OpensearchSnapshotPolicy>,
    ) -> Result<Action, ControllerError> {
        self.reconcile_sub_resource(policy).await
    }
}
