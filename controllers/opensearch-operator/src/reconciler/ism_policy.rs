//! ISM policy reconciler
//!
//! Handles: OpenSearchISMPolicy
//!
//! Policies are versioned by OpenSearch; updates carry the sequence number
//! and primary term of the stored copy and are retried once on a conflict.

use std::sync::Arc;

use async_trait::async_trait;
use crds::{IsmState, ManagedResourceStatus, OpenSearchCluster, OpenSearchClusterRef, OpenSearchISMPolicy};
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

/// An ISM policy as written to the index state management plugin.
#[derive(Debug, Clone, PartialEq)]
pub struct IsmPolicySync {
    pub policy_id: String,
    pub policy: Value,
}

impl IsmPolicySync {
    pub fn from_resource(resource: &OpenSearchISMPolicy) -> Self {
        let spec = &resource.spec;
        let policy_id = spec.policy_id.clone().unwrap_or_else(|| resource.name_any());
        let policy = without_null_fields(json!({
            "description": spec.description,
            "default_state": spec.default_state,
            "states": spec.states.iter().map(state_body).collect::<Vec<_>>(),
            "ism_template": spec.ism_template,
            "error_notification": spec.error_notification,
        }));
        Self { policy_id, policy }
    }
}

fn state_body(state: &IsmState) -> Value {
    let transitions: Vec<Value> = state
        .transitions
        .iter()
        .map(|t| {
            without_null_fields(json!({
                "state_name": t.state_name,
                "conditions": t.conditions,
            }))
        })
        .collect();
    json!({
        "name": state.name,
        "actions": state.actions,
        "transitions": transitions,
    })
}

#[async_trait]
impl RemoteSync for IsmPolicySync {
    fn kind(&self) -> &'static str {
        "ISM policy"
    }

    fn external_name(&self) -> &str {
        &self.policy_id
    }

    async fn remote_state(&self, client: &dyn OpenSearchClientTrait) -> Result<RemoteState, OpenSearchError> {
        Ok(match client.get_ism_policy(&self.policy_id).await? {
            Some(_) => RemoteState::Foreign,
            None => RemoteState::Absent,
        })
    }

    async fn create(&self, client: &dyn OpenSearchClientTrait) -> Result<(), OpenSearchError> {
        client.create_ism_policy(&self.policy_id, &self.policy).await
    }

    async fn update(&self, client: &dyn OpenSearchClientTrait) -> Result<bool, OpenSearchError> {
        let mut attempt = 1;
        loop {
            let Some(existing) = client.get_ism_policy(&self.policy_id).await? else {
                client.create_ism_policy(&self.policy_id, &self.policy).await?;
                return Ok(true);
            };
            if json_contains(&existing.policy, &self.policy) {
                return Ok(false);
            }
            match client
                .update_ism_policy(&self.policy_id, existing.seq_no, existing.primary_term, &self.policy)
                .await
            {
                Ok(()) => return Ok(true),
                Err(OpenSearchError::Conflict(reason)) if attempt < UPDATE_ATTEMPTS => {
                    warn!("ISM policy {} changed concurrently, retrying: {}", self.policy_id, reason);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn delete(&self, client: &dyn OpenSearchClientTrait) -> Result<(), OpenSearchError> {
        client.delete_ism_policy(&self.policy_id).await
    }
}

#[async_trait]
impl SubResource for OpenSearchISMPolicy {
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
        Ok(Box::new(IsmPolicySync::from_resource(self)))
    }
}

impl Reconciler {
    /// Reconciles an OpenSearchISMPolicy resource.
    pub async fn reconcile_ism_policy(&self, policy: Arc<OpenSearchISMPolicy>) -> Result<Action, ControllerError> {
        self.reconcile_sub_resource(policy).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_ism_policy;

    #[test]
    fn test_policy_body_uses_opensearch_field_names() {
        let resource = create_test_ism_policy("logs-rollover", "logs");
        let sync = IsmPolicySync::from_resource(&resource);

        assert_eq!(sync.policy_id, "logs-rollover");
        assert_eq!(sync.policy["default_state"], "hot");
        assert_eq!(sync.policy["states"][0]["transitions"][0]["state_name"], "delete");
        assert_eq!(sync.policy["states"][0]["transitions"][0]["conditions"]["min_index_age"], "30d");
        // Empty action bodies survive, unset optional fields do not
        assert_eq!(sync.policy["states"][1]["actions"][0], json!({"delete": {}}));
        assert!(sync.policy.get("ism_template").is_none());
        assert!(sync.policy["states"][1]["transitions"].as_array().is_some_and(|t| t.is_empty()));
    }

    #[test]
    fn test_policy_id_overrides_resource_name() {
        let mut resource = create_test_ism_policy("logs-rollover", "logs");
        resource.spec.policy_id = Some("custom".to_string());
        assert_eq!(IsmPolicySync::from_resource(&resource).policy_id, "custom");
    }
}
