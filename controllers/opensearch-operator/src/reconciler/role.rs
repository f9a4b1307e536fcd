//! Role reconciler
//!
//! Handles: OpensearchRole (cluster-scoped)

use std::sync::Arc;

use async_trait::async_trait;
use crds::{ManagedResourceStatus, OpenSearchCluster, OpenSearchClusterRef, OpensearchRole};
use kube::{Api, Client, ResourceExt};
use kube_runtime::controller::Action;
use opensearch_client::{
    IndexPermission, OpenSearchClientTrait, OpenSearchError, Role, TenantPermission, services,
};

use super::{Reconciler, SubResource};
use crate::error::ControllerError;
use crate::reconcile_helpers::{RemoteState, RemoteSync};

/// A role as written to the security plugin.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleSync {
    pub name: String,
    pub role: Role,
}

impl RoleSync {
    pub fn from_resource(resource: &OpensearchRole) -> Self {
        let spec = &resource.spec;
        Self {
            name: resource.name_any(),
            role: Role {
                cluster_permissions: spec.cluster_permissions.clone(),
                index_permissions: spec
                    .index_permissions
                    .iter()
                    .map(|p| IndexPermission {
                        index_patterns: p.index_patterns.clone(),
                        dls: p.dls.clone(),
                        fls: p.fls.clone(),
                        masked_fields: p.masked_fields.clone(),
                        allowed_actions: p.allowed_actions.clone(),
                    })
                    .collect(),
                tenant_permissions: spec
                    .tenant_permissions
                    .iter()
                    .map(|p| TenantPermission {
                        tenant_patterns: p.tenant_patterns.clone(),
                        allowed_actions: p.allowed_actions.clone(),
                    })
                    .collect(),
            },
        }
    }
}

#[async_trait]
impl RemoteSync for RoleSync {
    fn kind(&self) -> &'static str {
        "role"
    }

    fn external_name(&self) -> &str {
        &self.name
    }

    async fn remote_state(&self, client: &dyn OpenSearchClientTrait) -> Result<RemoteState, OpenSearchError> {
        Ok(match client.get_role(&self.name).await? {
            Some(_) => RemoteState::Foreign,
            None => RemoteState::Absent,
        })
    }

    async fn create(&self, client: &dyn OpenSearchClientTrait) -> Result<(), OpenSearchError> {
        client.put_role(&self.name, &self.role).await
    }

    async fn update(&self, client: &dyn OpenSearchClientTrait) -> Result<bool, OpenSearchError> {
        let needs_update = match client.get_role(&self.name).await? {
            Some(existing) => services::should_update_role(&existing, &self.role),
            None => true,
        };
        if needs_update {
            client.put_role(&self.name, &self.role).await?;
        }
        Ok(needs_update)
    }

    async fn delete(&self, client: &dyn OpenSearchClientTrait) -> Result<(), OpenSearchError> {
        client.delete_role(&self.name).await
    }
}

#[async_trait]
impl SubResource for OpensearchRole {
    fn api(client: Client, _namespace: Option<&str>) -> Api<Self> {
        Api::all(client)
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
        Ok(Box::new(RoleSync::from_resource(self)))
    }
}

impl Reconciler {
    /// Reconciles an OpensearchRole resource.
    pub async fn reconcile_role(&self, role: Arc<OpensearchRole>) -> Result<Action, ControllerError> {
        self.reconcile_sub_resource(role).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_role;
    use crds::IndexPermissionSpec;

    #[test]
    fn test_role_maps_every_permission_kind() {
        let mut resource = create_test_role("logs-reader", "logs", &["cluster_composite_ops_ro"]);
        resource.spec.index_permissions.push(IndexPermissionSpec {
            index_patterns: vec!["logs-*".to_string()],
            dls: Some(r#"{"term": {"team": "search"}}"#.to_string()),
            allowed_actions: vec!["read".to_string()],
            ..Default::default()
        });

        let sync = RoleSync::from_resource(&resource);
        assert_eq!(sync.name, "logs-reader");
        assert_eq!(sync.role.cluster_permissions, vec!["cluster_composite_ops_ro"]);
        assert_eq!(sync.role.index_permissions.len(), 1);
        assert_eq!(sync.role.index_permissions[0].index_patterns, vec!["logs-*"]);
        assert!(sync.role.index_permissions[0].dls.is_some());
        assert!(sync.role.tenant_permissions.is_empty());
    }
}
