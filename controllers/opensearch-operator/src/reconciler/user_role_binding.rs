//! User-role binding reconciler
//!
//! Handles: OpensearchUserRoleBinding (cluster-scoped)
//!
//! Role mappings are shared: several bindings (and manual edits) can add
//! users to the same role. A binding only ever adds its own users and
//! backend roles, records them in its status, and on change or deletion
//! removes exactly what it recorded.

use std::sync::Arc;

use crds::{
    ClusterPhase, OpensearchUserRoleBinding, OpensearchUserRoleBindingSpec, RESOURCE_FINALIZER, ResourceState,
    UserRoleBindingStatus,
};
use kube::api::{Api, Patch, PatchParams};
use kube::ResourceExt;
use kube_runtime::controller::Action;
use kube_runtime::finalizer::{Event as Finalizer, finalizer};
use opensearch_client::{OpenSearchClientTrait, RoleMapping};
use serde_json::json;
use tracing::{debug, error, info, warn};

use super::{CLUSTER_MISSING_REQUEUE, CLUSTER_PENDING_REQUEUE, DRIFT_REQUEUE, Reconciler, from_finalizer_error};
use crate::error::ControllerError;
use crate::reconcile_helpers::REASON_CLUSTER_CHANGED;

/// Add `users` and `backend_roles` to a mapping, keeping existing entries.
pub fn merge_mapping(existing: Option<&RoleMapping>, users: &[String], backend_roles: &[String]) -> RoleMapping {
    let mut mapping = existing.cloned().unwrap_or_default();
    for user in users {
        if !mapping.users.contains(user) {
            mapping.users.push(user.clone());
        }
    }
    for backend_role in backend_roles {
        if !mapping.backend_roles.contains(backend_role) {
            mapping.backend_roles.push(backend_role.clone());
        }
    }
    mapping
}

/// Remove `users` and `backend_roles` from a mapping.
pub fn strip_mapping(existing: &RoleMapping, users: &[String], backend_roles: &[String]) -> RoleMapping {
    let mut mapping = existing.clone();
    mapping.users.retain(|u| !users.contains(u));
    mapping.backend_roles.retain(|b| !backend_roles.contains(b));
    mapping
}

fn is_empty_mapping(mapping: &RoleMapping) -> bool {
    mapping.users.is_empty() && mapping.backend_roles.is_empty() && mapping.hosts.is_empty()
}

fn difference(provisioned: &[String], desired: &[String]) -> Vec<String> {
    provisioned.iter().filter(|p| !desired.contains(p)).cloned().collect()
}

/// Write `desired` for `role`, deleting the mapping when nothing is left.
async fn write_mapping(
    client: &dyn OpenSearchClientTrait,
    role: &str,
    existing: Option<&RoleMapping>,
    desired: RoleMapping,
) -> Result<(), ControllerError> {
    if existing == Some(&desired) {
        debug!("Role mapping {} already up-to-date", role);
        return Ok(());
    }
    if is_empty_mapping(&desired) {
        if existing.is_some() {
            client.delete_role_mapping(role).await?;
            info!("Deleted empty role mapping {}", role);
        }
        return Ok(());
    }
    client.put_role_mapping(role, &desired).await?;
    info!("Updated role mapping {}", role);
    Ok(())
}

/// Bring the role mappings in line with the binding.
///
/// Entries this binding provisioned earlier but no longer lists are
/// removed; entries added by anyone else are kept.
pub async fn sync_binding(
    client: &dyn OpenSearchClientTrait,
    spec: &OpensearchUserRoleBindingSpec,
    current: Option<&UserRoleBindingStatus>,
    cluster_uid: &str,
) -> Result<UserRoleBindingStatus, ControllerError> {
    if let Some(status) = current {
        if status.managed_cluster.as_deref().is_some_and(|uid| uid != cluster_uid) {
            warn!("User-role binding was written to another cluster, leaving it untouched");
            let mut status = status.clone();
            status.state = ResourceState::Error;
            status.reason = Some(REASON_CLUSTER_CHANGED.to_string());
            return Ok(status);
        }
    }

    let provisioned = current.cloned().unwrap_or_default();
    let stale_users = difference(&provisioned.provisioned_users, &spec.users);
    let stale_backend_roles = difference(&provisioned.provisioned_backend_roles, &spec.backend_roles);

    for role in &spec.roles {
        let existing = client.get_role_mapping(role).await?;
        let base = existing
            .as_ref()
            .map(|m| strip_mapping(m, &stale_users, &stale_backend_roles));
        let desired = merge_mapping(base.as_ref(), &spec.users, &spec.backend_roles);
        write_mapping(client, role, existing.as_ref(), desired).await?;
    }

    for role in difference(&provisioned.provisioned_roles, &spec.roles) {
        remove_from_role(
            client,
            &role,
            &provisioned.provisioned_users,
            &provisioned.provisioned_backend_roles,
        )
        .await?;
    }

    Ok(UserRoleBindingStatus {
        state: ResourceState::Created,
        reason: None,
        managed_cluster: Some(cluster_uid.to_string()),
        provisioned_roles: spec.roles.clone(),
        provisioned_users: spec.users.clone(),
        provisioned_backend_roles: spec.backend_roles.clone(),
    })
}

async fn remove_from_role(
    client: &dyn OpenSearchClientTrait,
    role: &str,
    users: &[String],
    backend_roles: &[String],
) -> Result<(), ControllerError> {
    let Some(existing) = client.get_role_mapping(role).await? else {
        return Ok(());
    };
    let desired = strip_mapping(&existing, users, backend_roles);
    write_mapping(client, role, Some(&existing), desired).await
}

/// Remove everything the binding provisioned.
pub async fn remove_binding(
    client: &dyn OpenSearchClientTrait,
    status: &UserRoleBindingStatus,
) -> Result<(), ControllerError> {
    for role in &status.provisioned_roles {
        remove_from_role(client, role, &status.provisioned_users, &status.provisioned_backend_roles).await?;
    }
    Ok(())
}

fn binding_status_patch(status: &UserRoleBindingStatus) -> serde_json::Value {
    json!({
        "status": {
            "state": status.state,
            "reason": status.reason,
            "managedCluster": status.managed_cluster,
            "provisionedRoles": status.provisioned_roles,
            "provisionedUsers": status.provisioned_users,
            "provisionedBackendRoles": status.provisioned_backend_roles,
        }
    })
}

async fn write_binding_status(
    api: &Api<OpensearchUserRoleBinding>,
    name: &str,
    current: Option<&UserRoleBindingStatus>,
    desired: &UserRoleBindingStatus,
) -> Result<(), ControllerError> {
    if current == Some(desired) {
        return Ok(());
    }
    api.patch_status(name, &PatchParams::default(), &Patch::Merge(&binding_status_patch(desired)))
        .await?;
    debug!("Updated OpensearchUserRoleBinding {} status: {}", name, desired.state);
    Ok(())
}

impl Reconciler {
    /// Reconciles an OpensearchUserRoleBinding resource.
    pub async fn reconcile_user_role_binding(
        &self,
        binding: Arc<OpensearchUserRoleBinding>,
    ) -> Result<Action, ControllerError> {
        let api: Api<OpensearchUserRoleBinding> = Api::all(self.client.clone());

        finalizer(&api, RESOURCE_FINALIZER, binding, |event| async {
            match event {
                Finalizer::Apply(binding) => self.apply_binding(&api, &binding).await,
                Finalizer::Cleanup(binding) => self.cleanup_binding(&binding).await,
            }
        })
        .await
        .map_err(from_finalizer_error)
    }

    async fn apply_binding(
        &self,
        api: &Api<OpensearchUserRoleBinding>,
        binding: &OpensearchUserRoleBinding,
    ) -> Result<Action, ControllerError> {
        let name = binding.name_any();
        let current = binding.status.as_ref();
        info!("Reconciling OpensearchUserRoleBinding {}", name);

        let cluster_ref = &binding.spec.opensearch_cluster;
        let Some(cluster) = self.find_cluster(cluster_ref, None).await? else {
            let mut status = current.cloned().unwrap_or_default();
            status.state = ResourceState::Error;
            status.reason = Some(format!(
                "cluster not found: {}/{}",
                cluster_ref.resolve_namespace(None),
                cluster_ref.name
            ));
            write_binding_status(api, &name, current, &status).await?;
            return Ok(Action::requeue(CLUSTER_MISSING_REQUEUE));
        };
        if cluster.phase() != ClusterPhase::Running {
            let mut status = current.cloned().unwrap_or_default();
            status.state = ResourceState::Pending;
            status.reason = Some("waiting for cluster to be running".to_string());
            write_binding_status(api, &name, current, &status).await?;
            return Ok(Action::requeue(CLUSTER_PENDING_REQUEUE));
        }

        let cluster_uid = cluster.uid().unwrap_or_default();
        let result = async {
            let client = self.gateway(&cluster).await?;
            sync_binding(&client, &binding.spec, current, &cluster_uid).await
        }
        .await;

        match result {
            Ok(status) => {
                write_binding_status(api, &name, current, &status).await?;
                Ok(Action::requeue(DRIFT_REQUEUE))
            }
            Err(e) => {
                error!("Failed to reconcile OpensearchUserRoleBinding {}: {}", name, e);
                let mut status = current.cloned().unwrap_or_default();
                status.state = ResourceState::Error;
                status.reason = Some(e.one_line());
                if let Err(write_err) = write_binding_status(api, &name, current, &status).await {
                    error!("Failed to update OpensearchUserRoleBinding {} error status: {}", name, write_err);
                }
                Err(e)
            }
        }
    }

    async fn cleanup_binding(&self, binding: &OpensearchUserRoleBinding) -> Result<Action, ControllerError> {
        let name = binding.name_any();
        info!("Cleaning up OpensearchUserRoleBinding {}", name);

        let Some(status) = binding.status.as_ref() else {
            return Ok(Action::await_change());
        };
        let Some(cluster) = self.find_cluster(&binding.spec.opensearch_cluster, None).await? else {
            debug!("Cluster of OpensearchUserRoleBinding {} is gone, nothing to remove", name);
            return Ok(Action::await_change());
        };
        if cluster.metadata.deletion_timestamp.is_some()
            || status.managed_cluster.as_deref() != cluster.uid().as_deref()
        {
            return Ok(Action::await_change());
        }

        let client = self.gateway(&cluster).await?;
        remove_binding(&client, status).await?;
        Ok(Action::await_change())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opensearch_client::MockOpenSearchClient;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn spec(roles: &[&str], users: &[&str]) -> OpensearchUserRoleBindingSpec {
        OpensearchUserRoleBindingSpec {
            opensearch_cluster: crds::OpenSearchClusterRef::with_namespace("logs", "search"),
            roles: strings(roles),
            users: strings(users),
            backend_roles: vec![],
        }
    }

    #[test]
    fn test_merge_keeps_foreign_entries() {
        let existing = RoleMapping {
            users: strings(&["bob"]),
            ..Default::default()
        };
        let merged = merge_mapping(Some(&existing), &strings(&["alice", "bob"]), &strings(&["ops"]));
        assert_eq!(merged.users, strings(&["bob", "alice"]));
        assert_eq!(merged.backend_roles, strings(&["ops"]));
    }

    #[test]
    fn test_strip_removes_only_listed_entries() {
        let existing = RoleMapping {
            users: strings(&["alice", "bob"]),
            backend_roles: strings(&["ops"]),
            hosts: vec![],
        };
        let stripped = strip_mapping(&existing, &strings(&["alice"]), &[]);
        assert_eq!(stripped.users, strings(&["bob"]));
        assert_eq!(stripped.backend_roles, strings(&["ops"]));
    }

    #[tokio::test]
    async fn test_sync_binding_adds_users_to_every_role() {
        let client = MockOpenSearchClient::new("https://logs.search.svc:9200");
        client.add_role_mapping(
            "readall",
            RoleMapping {
                users: strings(&["bob"]),
                ..Default::default()
            },
        );

        let status = sync_binding(&client, &spec(&["readall", "kibana_user"], &["alice"]), None, "uid-logs")
            .await
            .unwrap();

        assert_eq!(status.state, ResourceState::Created);
        assert_eq!(status.provisioned_roles, strings(&["readall", "kibana_user"]));
        assert_eq!(client.role_mapping("readall").unwrap().users, strings(&["bob", "alice"]));
        assert_eq!(client.role_mapping("kibana_user").unwrap().users, strings(&["alice"]));
    }

    #[tokio::test]
    async fn test_sync_binding_is_idempotent() {
        let client = MockOpenSearchClient::new("https://logs.search.svc:9200");
        let spec = spec(&["readall"], &["alice"]);
        let status = sync_binding(&client, &spec, None, "uid-logs").await.unwrap();
        client.clear_journal();

        let again = sync_binding(&client, &spec, Some(&status), "uid-logs").await.unwrap();
        assert_eq!(again, status);
        assert!(client.writes_for("role_mapping").is_empty());
    }

    #[tokio::test]
    async fn test_dropped_role_loses_only_provisioned_entries() {
        let client = MockOpenSearchClient::new("https://logs.search.svc:9200");
        let status = sync_binding(&client, &spec(&["readall", "kibana_user"], &["alice"]), None, "uid-logs")
            .await
            .unwrap();
        let mut mapping = client.role_mapping("readall").unwrap();
        mapping.users.push("bob".to_string());
        client.add_role_mapping("readall", mapping);

        sync_binding(&client, &spec(&["kibana_user"], &["alice"]), Some(&status), "uid-logs")
            .await
            .unwrap();

        assert_eq!(client.role_mapping("readall").unwrap().users, strings(&["bob"]));
        assert_eq!(client.role_mapping("kibana_user").unwrap().users, strings(&["alice"]));
    }

    #[tokio::test]
    async fn test_remove_binding_deletes_mappings_left_empty() {
        let client = MockOpenSearchClient::new("https://logs.search.svc:9200");
        let status = sync_binding(&client, &spec(&["kibana_user"], &["alice"]), None, "uid-logs")
            .await
            .unwrap();

        remove_binding(&client, &status).await.unwrap();

        assert!(client.role_mapping("kibana_user").is_none());
        let writes = client.writes_for("role_mapping");
        assert_eq!(writes.last().map(|w| w.op), Some("delete"));
    }

    #[tokio::test]
    async fn test_binding_for_other_cluster_is_not_written() {
        let client = MockOpenSearchClient::new("https://logs.search.svc:9200");
        let current = UserRoleBindingStatus {
            state: ResourceState::Created,
            managed_cluster: Some("uid-old".to_string()),
            ..Default::default()
        };

        let status = sync_binding(&client, &spec(&["readall"], &["alice"]), Some(&current), "uid-logs")
            .await
            .unwrap();

        assert_eq!(status.state, ResourceState::Error);
        assert!(client.journal().is_empty());
    }
}
