//! Tenant reconciler
//!
//! Handles: OpensearchTenant

use std::sync::Arc;

use async_trait::async_trait;
use crds::{ManagedResourceStatus, OpenSearchCluster, OpenSearchClusterRef, OpensearchTenant};
use kube::{Api, Client, ResourceExt};
use kube_runtime::controller::Action;
use opensearch_client::{OpenSearchClientTrait, OpenSearchError, Tenant, services};

use super::{Reconciler, SubResource, namespaced_api};
use crate::error::ControllerError;
use crate::reconcile_helpers::{RemoteState, RemoteSync};

/// A tenant as written to the security plugin.
#[derive(Debug, Clone, PartialEq)]
pub struct TenantSync {
    pub name: String,
    pub tenant: Tenant,
}

impl TenantSync {
    pub fn from_resource(resource: &OpensearchTenant) -> Self {
        Self {
            name: resource.name_any(),
            tenant: Tenant {
                description: resource.spec.description.clone(),
            },
        }
    }
}

#[async_trait]
impl RemoteSync for TenantSync {
    fn kind(&self) -> &'static str {
        "tenant"
    }

    fn external_name(&self) -> &str {
        &self.name
    }

    async fn remote_state(&self, client: &dyn OpenSearchClientTrait) -> Result<RemoteState, OpenSearchError> {
        Ok(match client.get_tenant(&self.name).await? {
            Some(_) => RemoteState::Foreign,
            None => RemoteState::Absent,
        })
    }

    async fn create(&self, client: &dyn OpenSearchClientTrait) -> Result<(), OpenSearchError> {
        client.put_tenant(&self.name, &self.tenant).await
    }

    async fn update(&self, client: &dyn OpenSearchClientTrait) -> Result<bool, OpenSearchError> {
        let needs_update = match client.get_tenant(&self.name).await? {
            Some(existing) => services::should_update_tenant(&existing, &self.tenant),
            None => true,
        };
        if needs_update {
            client.put_tenant(&self.name, &self.tenant).await?;
        }
        Ok(needs_update)
    }

    async fn delete(&self, client: &dyn OpenSearchClientTrait) -> Result<(), OpenSearchError> {
        client.delete_tenant(&self.name).await
    }
}

#[async_trait]
impl SubResource for OpensearchTenant {
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
        Ok(Box::new(TenantSync::from_resource(self)))
    }
}

impl Reconciler {
    /// Reconciles an OpensearchTenant resource.
    pub async fn reconcile_tenant(&self, tenant: Arc<OpensearchTenant>) -> Result<Action, ControllerError> {
        self.reconcile_sub_resource(tenant).await
    }
}
