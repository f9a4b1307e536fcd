//! OpenSearchClient trait for mocking
//!
//! This trait abstracts the OpenSearchClient to enable mocking in unit tests.
//! The concrete OpenSearchClient implements this trait, and tests can use
//! `MockOpenSearchClient` behind the `test-util` feature.
//!
//! Lookups of named objects return `Ok(None)` when the object is absent;
//! deletes of absent objects succeed.

use crate::error::OpenSearchError;
use crate::models::*;

/// Trait for OpenSearch admin API operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait OpenSearchClientTrait: Send + Sync {
    /// Get the base URL
    fn base_url(&self) -> &str;

    // Cluster state
    async fn info(&self) -> Result<ClusterInfo, OpenSearchError>;
    async fn health(&self) -> Result<ClusterHealth, OpenSearchError>;
    async fn cat_nodes(&self) -> Result<Vec<CatNode>, OpenSearchError>;
    async fn nodes_stats(&self) -> Result<NodesStats, OpenSearchError>;
    async fn cat_indices(&self) -> Result<Vec<CatIndex>, OpenSearchError>;
    async fn cat_shards(&self, indices: &[String]) -> Result<Vec<CatShard>, OpenSearchError>;
    async fn get_cluster_settings(&self, flat: bool) -> Result<ClusterSettings, OpenSearchError>;
    async fn put_cluster_settings(&self, settings: &serde_json::Value) -> Result<ClusterSettings, OpenSearchError>;
    async fn reroute(&self, command: &serde_json::Value) -> Result<RerouteResponse, OpenSearchError>;
    async fn index_exists(&self, name: &str) -> Result<bool, OpenSearchError>;

    // Security plugin
    async fn get_user(&self, name: &str) -> Result<Option<InternalUser>, OpenSearchError>;
    async fn put_user(&self, name: &str, user: &InternalUser) -> Result<(), OpenSearchError>;
    async fn delete_user(&self, name: &str) -> Result<(), OpenSearchError>;
    async fn get_role(&self, name: &str) -> Result<Option<Role>, OpenSearchError>;
    async fn put_role(&self, name: &str, role: &Role) -> Result<(), OpenSearchError>;
    async fn delete_role(&self, name: &str) -> Result<(), OpenSearchError>;
    async fn get_role_mapping(&self, role: &str) -> Result<Option<RoleMapping>, OpenSearchError>;
    async fn put_role_mapping(&self, role: &str, mapping: &RoleMapping) -> Result<(), OpenSearchError>;
    async fn delete_role_mapping(&self, role: &str) -> Result<(), OpenSearchError>;
    async fn get_tenant(&self, name: &str) -> Result<Option<Tenant>, OpenSearchError>;
    async fn put_tenant(&self, name: &str, tenant: &Tenant) -> Result<(), OpenSearchError>;
    async fn delete_tenant(&self, name: &str) -> Result<(), OpenSearchError>;
    async fn get_action_group(&self, name: &str) -> Result<Option<ActionGroup>, OpenSearchError>;
    async fn put_action_group(&self, name: &str, group: &ActionGroup) -> Result<(), OpenSearchError>;
    async fn delete_action_group(&self, name: &str) -> Result<(), OpenSearchError>;

    // Index state management
    async fn get_ism_policy(&self, id: &str) -> Result<Option<VersionedPolicy>, OpenSearchError>;
    async fn create_ism_policy(&self, id: &str, policy: &serde_json::Value) -> Result<(), OpenSearchError>;
    async fn update_ism_policy(&self, id: &str, seq_no: i64, primary_term: i64, policy: &serde_json::Value) -> Result<(), OpenSearchError>;
    async fn delete_ism_policy(&self, id: &str) -> Result<(), OpenSearchError>;

    // Snapshot management
    async fn get_snapshot_policy(&self, name: &str) -> Result<Option<VersionedPolicy>, OpenSearchError>;
    async fn create_snapshot_policy(&self, name: &str, policy: &serde_json::Value) -> Result<(), OpenSearchError>;
    async fn update_snapshot_policy(&self, name: &str, seq_no: i64, primary_term: i64, policy: &serde_json::Value) -> Result<(), OpenSearchError>;
    async fn delete_snapshot_policy(&self, name: &str) -> Result<(), OpenSearchError>;
    async fn get_snapshot_repository(&self, name: &str) -> Result<Option<SnapshotRepository>, OpenSearchError>;
    async fn put_snapshot_repository(&self, name: &str, repository: &SnapshotRepository) -> Result<(), OpenSearchError>;
    async fn delete_snapshot_repository(&self, name: &str) -> Result<(), OpenSearchError>;

    // Templates
    async fn get_index_template(&self, name: &str) -> Result<Option<serde_json::Value>, OpenSearchError>;
    async fn put_index_template(&self, name: &str, template: &serde_json::Value) -> Result<(), OpenSearchError>;
    async fn delete_index_template(&self, name: &str) -> Result<(), OpenSearchError>;
    async fn get_component_template(&self, name: &str) -> Result<Option<serde_json::Value>, OpenSearchError>;
    async fn put_component_template(&self, name: &str, template: &serde_json::Value) -> Result<(), OpenSearchError>;
    async fn delete_component_template(&self, name: &str) -> Result<(), OpenSearchError>;
    async fn get_search_template(&self, id: &str) -> Result<Option<StoredScript>, OpenSearchError>;
    async fn put_search_template(&self, id: &str, script: &StoredScript) -> Result<(), OpenSearchError>;
    async fn delete_search_template(&self, id: &str) -> Result<(), OpenSearchError>;
}
