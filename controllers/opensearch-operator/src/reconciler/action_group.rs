//! Action group reconciler
//!
//! Handles: OpensearchActionGroup

use std::sync::Arc;

use async_trait::async_trait;
use crds::{ManagedResourceStatus, OpenSearchCluster, OpenSearchClusterRef, OpensearchActionGroup};
use kube::{Api, Client, ResourceExt};
use kube_runtime::controller::Action;
use opensearch_client::{ActionGroup, OpenSearchClientTrait, OpenSearchError, services};

use super::{Reconciler, SubResource, namespaced_api};
use crate::error::ControllerError;
use crate::reconcile_helpers::{RemoteState, RemoteSync};

/// An action group as written to the security plugin.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionGroupSync {
    pub name: String,
    pub group: ActionGroup,
}

impl ActionGroupSync {
    pub fn from_resource(resource: &OpensearchActionGroup) -> Self {
        Self {
            name: resource.name_any(),
            group: ActionGroup {
                allowed_actions: resource.spec.allowed_actions.clone(),
                type_: resource.spec.type_.clone(),
                description: resource.spec.description.clone(),
            },
        }
    }
}

#[async_trait]
impl RemoteSync for ActionGroupSync {
    fn kind(&self) -> &'static str {
        "action group"
    }

    fn external_name(&self) -> &str {
        &self.name
    }

    async fn remote_state(&self, client: &dyn OpenSearchClientTrait) -> Result<RemoteState, OpenSearchError> {
        Ok(match client.get_action_group(&self.name).await? {
            Some(_) => RemoteState::Foreign,
            None => RemoteState::Absent,
        })
    }

    async fn create(&self, client: &dyn OpenSearchClientTrait) -> Result<(), OpenSearchError> {
        client.put_action_group(&self.name, &self.group).await
    }

    async fn update(&self, client: &dyn OpenSearchClientTrait) -> Result<bool, OpenSearchError> {
        let needs_update = match client.get_action_group(&self.name).await? {
            Some(existing) => services::should_update_action_group(&existing, &self.group),
            None => true,
        };
        if needs_update {
            client.put_action_group(&self.name, &self.group).await?;
        }
        Ok(needs_update)
    }

    async fn delete(&self, client: &dyn OpenSearchClientTrait) -> Result<(), OpenSearchError> {
        client.delete_action_group(&self.name).await
    }
}

#[async_trait]
impl SubResource for OpensearchActionGroup {
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
        Ok(Box::new(ActionGroupSync::from_resource(self)))
    }
}

impl Reconciler {
    /// Reconciles an OpensearchActionGroup resource.
    pub async fn reconcile_action_group(&self, group: Arc<OpensearchActionGroup>) -> Result<Action, ControllerError> {
        self.reconcile_sub_resource(group).await
    }
}
