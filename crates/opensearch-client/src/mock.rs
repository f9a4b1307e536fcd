//! Mock OpenSearchClient for unit testing
//!
//! This module provides an in-memory implementation of
//! [`OpenSearchClientTrait`] that can be used in unit tests without a running
//! OpenSearch cluster. Every mutating call is appended to a journal so tests
//! can assert on what was written, and on what was not.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::OpenSearchError;
use crate::models::*;
use crate::opensearch_trait::OpenSearchClientTrait;

/// One mutating call recorded by the mock
#[derive(Debug, Clone, PartialEq)]
pub struct Write {
    /// `put`, `create`, `update`, `delete`, `settings` or `reroute`
    pub op: &'static str,
    /// Object kind, e.g. `user` or `ism_policy`
    pub kind: &'static str,
    /// Object name, empty for cluster-wide calls
    pub name: String,
    /// Request body, if any
    pub body: Option<serde_json::Value>,
}

#[derive(Default)]
struct MockState {
    unavailable: bool,
    health: ClusterHealth,
    nodes: Vec<CatNode>,
    indices: Vec<CatIndex>,
    shards: Vec<CatShard>,
    settings: ClusterSettings,
    users: HashMap<String, InternalUser>,
    roles: HashMap<String, Role>,
    role_mappings: HashMap<String, RoleMapping>,
    tenants: HashMap<String, Tenant>,
    action_groups: HashMap<String, ActionGroup>,
    ism_policies: HashMap<String, VersionedPolicy>,
    ism_conflicts: u32,
    snapshot_policies: HashMap<String, VersionedPolicy>,
    snapshot_conflicts: u32,
    repositories: HashMap<String, SnapshotRepository>,
    index_templates: HashMap<String, serde_json::Value>,
    component_templates: HashMap<String, serde_json::Value>,
    scripts: HashMap<String, StoredScript>,
    journal: Vec<Write>,
}

/// Mock OpenSearchClient for testing
///
/// Starts as an empty green cluster. Clones share state.
#[derive(Clone)]
pub struct MockOpenSearchClient {
    base_url: String,
    state: Arc<Mutex<MockState>>,
}

impl MockOpenSearchClient {
    /// Create a new mock client
    pub fn new(base_url: impl Into<String>) -> Self {
        let state = MockState {
            health: ClusterHealth {
                status: HealthStatus::Green,
                ..Default::default()
            },
            ..Default::default()
        };
        Self {
            base_url: base_url.into(),
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn available(&self) -> Result<MutexGuard<'_, MockState>, OpenSearchError> {
        let state = self.state();
        if state.unavailable {
            return Err(OpenSearchError::Transient("connection refused".to_string()));
        }
        Ok(state)
    }

    /// Make every call fail with a transient error
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    /// Replace the cluster health
    pub fn set_health(&self, health: ClusterHealth) {
        self.state().health = health;
    }

    /// Set only the health colour
    pub fn set_health_status(&self, status: HealthStatus) {
        self.state().health.status = status;
    }

    /// Replace the `_cat/nodes` rows
    pub fn set_nodes(&self, nodes: Vec<CatNode>) {
        self.state().nodes = nodes;
    }

    /// Replace the `_cat/indices` rows
    pub fn set_indices(&self, indices: Vec<CatIndex>) {
        self.state().indices = indices;
    }

    /// Replace the `_cat/shards` rows
    pub fn set_shards(&self, shards: Vec<CatShard>) {
        self.state().shards = shards;
    }

    /// Set a transient flat cluster setting
    pub fn set_transient_setting(&self, key: &str, value: &str) {
        self.state()
            .settings
            .transient
            .insert(key.to_string(), serde_json::Value::String(value.to_string()));
    }

    /// Current cluster settings
    pub fn settings(&self) -> ClusterSettings {
        self.state().settings.clone()
    }

    /// Add an internal user (for test setup)
    pub fn add_user(&self, name: &str, user: InternalUser) {
        self.state().users.insert(name.to_string(), user);
    }

    /// Stored internal user
    pub fn user(&self, name: &str) -> Option<InternalUser> {
        self.state().users.get(name).cloned()
    }

    /// Add a role (for test setup)
    pub fn add_role(&self, name: &str, role: Role) {
        self.state().roles.insert(name.to_string(), role);
    }

    /// Stored role
    pub fn role(&self, name: &str) -> Option<Role> {
        self.state().roles.get(name).cloned()
    }

    /// Add a role mapping (for test setup)
    pub fn add_role_mapping(&self, role: &str, mapping: RoleMapping) {
        self.state().role_mappings.insert(role.to_string(), mapping);
    }

    /// Stored role mapping
    pub fn role_mapping(&self, role: &str) -> Option<RoleMapping> {
        self.state().role_mappings.get(role).cloned()
    }

    /// Add a tenant (for test setup)
    pub fn add_tenant(&self, name: &str, tenant: Tenant) {
        self.state().tenants.insert(name.to_string(), tenant);
    }

    /// Stored tenant
    pub fn tenant(&self, name: &str) -> Option<Tenant> {
        self.state().tenants.get(name).cloned()
    }

    /// Stored action group
    pub fn action_group(&self, name: &str) -> Option<ActionGroup> {
        self.state().action_groups.get(name).cloned()
    }

    /// Add an ISM policy (for test setup)
    pub fn add_ism_policy(&self, id: &str, policy: serde_json::Value) {
        self.state().ism_policies.insert(
            id.to_string(),
            VersionedPolicy {
                id: id.to_string(),
                seq_no: 0,
                primary_term: 1,
                policy,
            },
        );
    }

    /// Stored ISM policy
    pub fn ism_policy(&self, id: &str) -> Option<VersionedPolicy> {
        self.state().ism_policies.get(id).cloned()
    }

    /// Bump the sequence number of a stored ISM policy, as a concurrent writer would
    pub fn touch_ism_policy(&self, id: &str) {
        if let Some(p) = self.state().ism_policies.get_mut(id) {
            p.seq_no += 1;
        }
    }

    /// Fail the next `count` ISM updates with a conflict
    pub fn fail_ism_updates_with_conflict(&self, count: u32) {
        self.state().ism_conflicts = count;
    }

    /// Stored snapshot policy
    pub fn snapshot_policy(&self, name: &str) -> Option<VersionedPolicy> {
        self.state().snapshot_policies.get(name).cloned()
    }

    /// Fail the next `count` snapshot policy updates with a conflict
    pub fn fail_snapshot_updates_with_conflict(&self, count: u32) {
        self.state().snapshot_conflicts = count;
    }

    /// Stored snapshot repository
    pub fn repository(&self, name: &str) -> Option<SnapshotRepository> {
        self.state().repositories.get(name).cloned()
    }

    /// Stored index template
    pub fn index_template(&self, name: &str) -> Option<serde_json::Value> {
        self.state().index_templates.get(name).cloned()
    }

    /// Add an index template (for test setup)
    pub fn add_index_template(&self, name: &str, template: serde_json::Value) {
        self.state().index_templates.insert(name.to_string(), template);
    }

    /// Stored component template
    pub fn component_template(&self, name: &str) -> Option<serde_json::Value> {
        self.state().component_templates.get(name).cloned()
    }

    /// Stored search template
    pub fn search_template(&self, id: &str) -> Option<StoredScript> {
        self.state().scripts.get(id).cloned()
    }

    /// All recorded writes, oldest first
    pub fn journal(&self) -> Vec<Write> {
        self.state().journal.clone()
    }

    /// Recorded writes for one kind
    pub fn writes_for(&self, kind: &str) -> Vec<Write> {
        self.state().journal.iter().filter(|w| w.kind == kind).cloned().collect()
    }

    /// Forget recorded writes
    pub fn clear_journal(&self) {
        self.state().journal.clear();
    }
}

fn record(state: &mut MockState, op: &'static str, kind: &'static str, name: &str, body: Option<serde_json::Value>) {
    state.journal.push(Write {
        op,
        kind,
        name: name.to_string(),
        body,
    });
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, OpenSearchError> {
    Ok(serde_json::to_value(value)?)
}

fn apply_settings(target: &mut serde_json::Map<String, serde_json::Value>, updates: Option<&serde_json::Value>) {
    let Some(serde_json::Value::Object(updates)) = updates else {
        return;
    };
    for (key, value) in updates {
        if value.is_null() {
            target.remove(key);
        } else {
            target.insert(key.clone(), value.clone());
        }
    }
}

#[async_trait::async_trait]
impl OpenSearchClientTrait for MockOpenSearchClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn info(&self) -> Result<ClusterInfo, OpenSearchError> {
        let state = self.available()?;
        Ok(ClusterInfo {
            name: "mock-node".to_string(),
            cluster_name: state.health.cluster_name.clone(),
            version: VersionInfo {
                distribution: Some("opensearch".to_string()),
                number: "2.19.4".to_string(),
            },
        })
    }

    async fn health(&self) -> Result<ClusterHealth, OpenSearchError> {
        Ok(self.available()?.health.clone())
    }

    async fn cat_nodes(&self) -> Result<Vec<CatNode>, OpenSearchError> {
        Ok(self.available()?.nodes.clone())
    }

    async fn nodes_stats(&self) -> Result<NodesStats, OpenSearchError> {
        let state = self.available()?;
        let nodes = state
            .nodes
            .iter()
            .map(|n| {
                (
                    n.name.clone(),
                    NodeStats {
                        name: n.name.clone(),
                        ip: n.ip.clone(),
                        ..Default::default()
                    },
                )
            })
            .collect();
        Ok(NodesStats { nodes })
    }

    async fn cat_indices(&self) -> Result<Vec<CatIndex>, OpenSearchError> {
        Ok(self.available()?.indices.clone())
    }

    async fn cat_shards(&self, indices: &[String]) -> Result<Vec<CatShard>, OpenSearchError> {
        let state = self.available()?;
        Ok(state
            .shards
            .iter()
            .filter(|s| indices.is_empty() || indices.iter().any(|i| i == &s.index))
            .cloned()
            .collect())
    }

    async fn get_cluster_settings(&self, _flat: bool) -> Result<ClusterSettings, OpenSearchError> {
        Ok(self.available()?.settings.clone())
    }

    async fn put_cluster_settings(&self, settings: &serde_json::Value) -> Result<ClusterSettings, OpenSearchError> {
        let mut state = self.available()?;
        apply_settings(&mut state.settings.transient, settings.get("transient"));
        apply_settings(&mut state.settings.persistent, settings.get("persistent"));
        record(&mut state, "settings", "cluster_settings", "", Some(settings.clone()));
        Ok(state.settings.clone())
    }

    async fn reroute(&self, command: &serde_json::Value) -> Result<RerouteResponse, OpenSearchError> {
        let mut state = self.available()?;
        record(&mut state, "reroute", "cluster", "", Some(command.clone()));
        Ok(RerouteResponse {
            acknowledged: true,
            state: serde_json::Value::Null,
        })
    }

    async fn index_exists(&self, name: &str) -> Result<bool, OpenSearchError> {
        let state = self.available()?;
        Ok(state.indices.iter().any(|i| i.index == name))
    }

    async fn get_user(&self, name: &str) -> Result<Option<InternalUser>, OpenSearchError> {
        let state = self.available()?;
        // The security API never returns the clear text password
        Ok(state.users.get(name).cloned().map(|mut u| {
            u.password = None;
            u.hash = Some(String::new());
            u
        }))
    }

    async fn put_user(&self, name: &str, user: &InternalUser) -> Result<(), OpenSearchError> {
        let mut state = self.available()?;
        let body = to_value(user)?;
        state.users.insert(name.to_string(), user.clone());
        record(&mut state, "put", "user", name, Some(body));
        Ok(())
    }

    async fn delete_user(&self, name: &str) -> Result<(), OpenSearchError> {
        let mut state = self.available()?;
        state.users.remove(name);
        record(&mut state, "delete", "user", name, None);
        Ok(())
    }

    async fn get_role(&self, name: &str) -> Result<Option<Role>, OpenSearchError> {
        Ok(self.available()?.roles.get(name).cloned())
    }

    async fn put_role(&self, name: &str, role: &Role) -> Result<(), OpenSearchError> {
        let mut state = self.available()?;
        let body = to_value(role)?;
        state.roles.insert(name.to_string(), role.clone());
        record(&mut state, "put", "role", name, Some(body));
        Ok(())
    }

    async fn delete_role(&self, name: &str) -> Result<(), OpenSearchError> {
        let mut state = self.available()?;
        state.roles.remove(name);
        record(&mut state, "delete", "role", name, None);
        Ok(())
    }

    async fn get_role_mapping(&self, role: &str) -> Result<Option<RoleMapping>, OpenSearchError> {
        Ok(self.available()?.role_mappings.get(role).cloned())
    }

    async fn put_role_mapping(&self, role: &str, mapping: &RoleMapping) -> Result<(), OpenSearchError> {
        let mut state = self.available()?;
        let body = to_value(mapping)?;
        state.role_mappings.insert(role.to_string(), mapping.clone());
        record(&mut state, "put", "role_mapping", role, Some(body));
        Ok(())
    }

    async fn delete_role_mapping(&self, role: &str) -> Result<(), OpenSearchError> {
        let mut state = self.available()?;
        state.role_mappings.remove(role);
        record(&mut state, "delete", "role_mapping", role, None);
        Ok(())
    }

    async fn get_tenant(&self, name: &str) -> Result<Option<Tenant>, OpenSearchError> {
        Ok(self.available()?.tenants.get(name).cloned())
    }

    async fn put_tenant(&self, name: &str, tenant: &Tenant) -> Result<(), OpenSearchError> {
        let mut state = self.available()?;
        let body = to_value(tenant)?;
        state.tenants.insert(name.to_string(), tenant.clone());
        record(&mut state, "put", "tenant", name, Some(body));
        Ok(())
    }

    async fn delete_tenant(&self, name: &str) -> Result<(), OpenSearchError> {
        let mut state = self.available()?;
        state.tenants.remove(name);
        record(&mut state, "delete", "tenant", name, None);
        Ok(())
    }

    async fn get_action_group(&self, name: &str) -> Result<Option<ActionGroup>, OpenSearchError> {
        Ok(self.available()?.action_groups.get(name).cloned())
    }

    async fn put_action_group(&self, name: &str, group: &ActionGroup) -> Result<(), OpenSearchError> {
        let mut state = self.available()?;
        let body = to_value(group)?;
        state.action_groups.insert(name.to_string(), group.clone());
        record(&mut state, "put", "action_group", name, Some(body));
        Ok(())
    }

    async fn delete_action_group(&self, name: &str) -> Result<(), OpenSearchError> {
        let mut state = self.available()?;
        state.action_groups.remove(name);
        record(&mut state, "delete", "action_group", name, None);
        Ok(())
    }

    async fn get_ism_policy(&self, id: &str) -> Result<Option<VersionedPolicy>, OpenSearchError> {
        Ok(self.available()?.ism_policies.get(id).cloned())
    }

    async fn create_ism_policy(&self, id: &str, policy: &serde_json::Value) -> Result<(), OpenSearchError> {
        let mut state = self.available()?;
        if state.ism_policies.contains_key(id) {
            return Err(OpenSearchError::Conflict(format!("policy {} already exists", id)));
        }
        state.ism_policies.insert(
            id.to_string(),
            VersionedPolicy {
                id: id.to_string(),
                seq_no: 0,
                primary_term: 1,
                policy: policy.clone(),
            },
        );
        record(&mut state, "create", "ism_policy", id, Some(policy.clone()));
        Ok(())
    }

    async fn update_ism_policy(
        &self,
        id: &str,
        seq_no: i64,
        primary_term: i64,
        policy: &serde_json::Value,
    ) -> Result<(), OpenSearchError> {
        let mut state = self.available()?;
        if state.ism_conflicts > 0 {
            state.ism_conflicts -= 1;
            return Err(OpenSearchError::Conflict(format!("version conflict on policy {}", id)));
        }
        let stored = state
            .ism_policies
            .get_mut(id)
            .ok_or_else(|| OpenSearchError::NotFound(format!("policy {}", id)))?;
        if stored.seq_no != seq_no || stored.primary_term != primary_term {
            return Err(OpenSearchError::Conflict(format!("version conflict on policy {}", id)));
        }
        stored.seq_no += 1;
        stored.policy = policy.clone();
        record(&mut state, "update", "ism_policy", id, Some(policy.clone()));
        Ok(())
    }

    async fn delete_ism_policy(&self, id: &str) -> Result<(), OpenSearchError> {
        let mut state = self.available()?;
        state.ism_policies.remove(id);
        record(&mut state, "delete", "ism_policy", id, None);
        Ok(())
    }

    async fn get_snapshot_policy(&self, name: &str) -> Result<Option<VersionedPolicy>, OpenSearchError> {
        Ok(self.available()?.snapshot_policies.get(name).cloned())
    }

    async fn create_snapshot_policy(&self, name: &str, policy: &serde_json::Value) -> Result<(), OpenSearchError> {
        let mut state = self.available()?;
        if state.snapshot_policies.contains_key(name) {
            return Err(OpenSearchError::Conflict(format!("snapshot policy {} already exists", name)));
        }
        state.snapshot_policies.insert(
            name.to_string(),
            VersionedPolicy {
                id: name.to_string(),
                seq_no: 0,
                primary_term: 1,
                policy: policy.clone(),
            },
        );
        record(&mut state, "create", "snapshot_policy", name, Some(policy.clone()));
        Ok(())
    }

    async fn update_snapshot_policy(
        &self,
        name: &str,
        seq_no: i64,
        primary_term: i64,
        policy: &serde_json::Value,
    ) -> Result<(), OpenSearchError> {
        let mut state = self.available()?;
        if state.snapshot_conflicts > 0 {
            state.snapshot_conflicts -= 1;
            return Err(OpenSearchError::Conflict(format!("version conflict on snapshot policy {}", name)));
        }
        let stored = state
            .snapshot_policies
            .get_mut(name)
            .ok_or_else(|| OpenSearchError::NotFound(format!("snapshot policy {}", name)))?;
        if stored.seq_no != seq_no || stored.primary_term != primary_term {
            return Err(OpenSearchError::Conflict(format!("version conflict on snapshot policy {}", name)));
        }
        stored.seq_no += 1;
        stored.policy = policy.clone();
        record(&mut state, "update", "snapshot_policy", name, Some(policy.clone()));
        Ok(())
    }

    async fn delete_snapshot_policy(&self, name: &str) -> Result<(), OpenSearchError> {
        let mut state = self.available()?;
        state.snapshot_policies.remove(name);
        record(&mut state, "delete", "snapshot_policy", name, None);
        Ok(())
    }

    async fn get_snapshot_repository(&self, name: &str) -> Result<Option<SnapshotRepository>, OpenSearchError> {
        Ok(self.available()?.repositories.get(name).cloned())
    }

    async fn put_snapshot_repository(&self, name: &str, repository: &SnapshotRepository) -> Result<(), OpenSearchError> {
        let mut state = self.available()?;
        let body = to_value(repository)?;
        state.repositories.insert(name.to_string(), repository.clone());
        record(&mut state, "put", "snapshot_repository", name, Some(body));
        Ok(())
    }

    async fn delete_snapshot_repository(&self, name: &str) -> Result<(), OpenSearchError> {
        let mut state = self.available()?;
        state.repositories.remove(name);
        record(&mut state, "delete", "snapshot_repository", name, None);
        Ok(())
    }

    async fn get_index_template(&self, name: &str) -> Result<Option<serde_json::Value>, OpenSearchError> {
        Ok(self.available()?.index_templates.get(name).cloned())
    }

    async fn put_index_template(&self, name: &str, template: &serde_json::Value) -> Result<(), OpenSearchError> {
        let mut state = self.available()?;
        state.index_templates.insert(name.to_string(), template.clone());
        record(&mut state, "put", "index_template", name, Some(template.clone()));
        Ok(())
    }

    async fn delete_index_template(&self, name: &str) -> Result<(), OpenSearchError> {
        let mut state = self.available()?;
        state.index_templates.remove(name);
        record(&mut state, "delete", "index_template", name, None);
        Ok(())
    }

    async fn get_component_template(&self, name: &str) -> Result<Option<serde_json::Value>, OpenSearchError> {
        Ok(self.available()?.component_templates.get(name).cloned())
    }

    async fn put_component_template(&self, name: &str, template: &serde_json::Value) -> Result<(), OpenSearchError> {
        let mut state = self.available()?;
        state.component_templates.insert(name.to_string(), template.clone());
        record(&mut state, "put", "component_template", name, Some(template.clone()));
        Ok(())
    }

    async fn delete_component_template(&self, name: &str) -> Result<(), OpenSearchError> {
        let mut state = self.available()?;
        state.component_templates.remove(name);
        record(&mut state, "delete", "component_template", name, None);
        Ok(())
    }

    async fn get_search_template(&self, id: &str) -> Result<Option<StoredScript>, OpenSearchError> {
        Ok(self.available()?.scripts.get(id).cloned())
    }

    async fn put_search_template(&self, id: &str, script: &StoredScript) -> Result<(), OpenSearchError> {
        let mut state = self.available()?;
        let body = to_value(script)?;
        state.scripts.insert(id.to_string(), script.clone());
        record(&mut state, "put", "search_template", id, Some(body));
        Ok(())
    }

    async fn delete_search_template(&self, id: &str) -> Result<(), OpenSearchError> {
        let mut state = self.available()?;
        state.scripts.remove(id);
        record(&mut state, "delete", "search_template", id, None);
        Ok(())
    }
}
