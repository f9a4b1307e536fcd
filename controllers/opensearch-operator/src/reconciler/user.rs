//! User reconciler
//!
//! Handles: OpensearchUser (cluster-scoped)
//!
//! Users are the only security object with an ownership marker: the
//! resource UID is written to the `k8s-uid` attribute, so a user created by
//! this resource is recognised again even when its status was lost.

use std::sync::Arc;

use async_trait::async_trait;
use crds::{K8S_UID_ATTRIBUTE, ManagedResourceStatus, OpenSearchCluster, OpenSearchClusterRef, OpensearchUser};
use kube::{Api, Client, ResourceExt};
use kube_runtime::controller::Action;
use opensearch_client::{InternalUser, OpenSearchClientTrait, OpenSearchError, services};

use super::{Reconciler, SubResource};
use crate::error::ControllerError;
use crate::gateway;
use crate::reconcile_helpers::{RemoteState, RemoteSync};

/// An internal user as written to the security plugin.
#[derive(Debug, Clone, PartialEq)]
pub struct UserSync {
    pub name: String,
    pub uid: String,
    pub user: InternalUser,
}

impl UserSync {
    /// Build the remote user, tagging it with the resource UID.
    pub fn from_resource(resource: &OpensearchUser, password: String) -> Self {
        let uid = resource.uid().unwrap_or_default();
        let mut attributes = resource.spec.attributes.clone();
        attributes.insert(K8S_UID_ATTRIBUTE.to_string(), uid.clone());

        Self {
            name: resource.name_any(),
            uid,
            user: InternalUser {
                password: Some(password),
                hash: None,
                opendistro_security_roles: resource.spec.opendistro_security_roles.clone(),
                backend_roles: resource.spec.backend_roles.clone(),
                attributes,
            },
        }
    }
}

#[async_trait]
impl RemoteSync for UserSync {
    fn kind(&self) -> &'static str {
        "user"
    }

    fn external_name(&self) -> &str {
        &self.name
    }

    async fn remote_state(&self, client: &dyn OpenSearchClientTrait) -> Result<RemoteState, OpenSearchError> {
        Ok(match client.get_user(&self.name).await? {
            None => RemoteState::Absent,
            Some(existing) if existing.attributes.get(K8S_UID_ATTRIBUTE) == Some(&self.uid) => RemoteState::Owned,
            Some(_) => RemoteState::Foreign,
        })
    }

    async fn create(&self, client: &dyn OpenSearchClientTrait) -> Result<(), OpenSearchError> {
        client.put_user(&self.name, &self.user).await
    }

    async fn update(&self, client: &dyn OpenSearchClientTrait) -> Result<bool, OpenSearchError> {
        let needs_update = match client.get_user(&self.name).await? {
            Some(existing) => services::should_update_user(&existing, &self.user, K8S_UID_ATTRIBUTE)?,
            None => true,
        };
        if needs_update {
            client.put_user(&self.name, &self.user).await?;
        }
        Ok(needs_update)
    }

    async fn delete(&self, client: &dyn OpenSearchClientTrait) -> Result<(), OpenSearchError> {
        client.delete_user(&self.name).await
    }
}

#[async_trait]
impl SubResource for OpensearchUser {
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
        reconciler: &Reconciler,
        cluster: &OpenSearchCluster,
    ) -> Result<Box<dyn RemoteSync>, ControllerError> {
        let selector = &self.spec.password_from;
        let cluster_namespace = cluster.namespace().unwrap_or_else(|| "default".to_string());
        let namespace = selector.namespace.as_deref().unwrap_or(&cluster_namespace);
        let password = gateway::read_secret_key(&reconciler.client, namespace, &selector.name, &selector.key).await?;
        Ok(Box::new(UserSync::from_resource(self, password)))
    }
}

impl Reconciler {
    /// Reconciles an OpensearchUser resource.
    pub async fn reconcile_user(&self, user: Arc<OpensearchUser>) -> Result<Action, ControllerError> {
        self.reconcile_sub_resource(user).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_user;

    #[test]
    fn test_user_carries_uid_attribute() {
        let mut resource = create_test_user("alice", "logs");
        resource.spec.attributes.insert("team".to_string(), "search".to_string());

        let sync = UserSync::from_resource(&resource, "s3cret".to_string());
        assert_eq!(sync.uid, "uid-alice");
        assert_eq!(sync.user.password.as_deref(), Some("s3cret"));
        assert_eq!(sync.user.attributes.get(K8S_UID_ATTRIBUTE).map(String::as_str), Some("uid-alice"));
        assert_eq!(sync.user.attributes.get("team").map(String::as_str), Some("search"));
        assert_eq!(sync.user.opendistro_security_roles, vec!["readall"]);
    }
}
