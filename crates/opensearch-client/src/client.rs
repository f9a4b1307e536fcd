//! OpenSearch admin API client
//!
//! Implements the admin calls used by the operator against one cluster:
//! cluster state (`_cluster`, `_cat`, `_nodes`), the security plugin
//! (`_plugins/_security/api`), ISM (`_plugins/_ism`), snapshot management
//! (`_plugins/_sm`, `_snapshot`), templates and stored scripts.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::common::{segment, Credentials, HttpClient, HEALTH_TIMEOUT, MUTATION_TIMEOUT};
use crate::error::OpenSearchError;
use crate::models::*;
use crate::opensearch_trait::OpenSearchClientTrait;

const SECURITY_API: &str = "/_plugins/_security/api";
const ISM_API: &str = "/_plugins/_ism/policies";
const SM_API: &str = "/_plugins/_sm/policies";

/// OpenSearch admin API client
#[derive(Debug, Clone)]
pub struct OpenSearchClient {
    http: HttpClient,
}

impl OpenSearchClient {
    /// Create a new OpenSearch client
    ///
    /// # Arguments
    /// * `base_url` - Cluster URL (e.g., "https://logs.search.svc.cluster.local:9200")
    /// * `username` / `password` - Basic auth credentials of an admin user
    /// * `accept_invalid_certs` - Accept self-signed certificates
    pub fn new(
        base_url: String,
        username: String,
        password: String,
        accept_invalid_certs: bool,
    ) -> Result<Self, OpenSearchError> {
        let client = Client::builder()
            .timeout(MUTATION_TIMEOUT)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .map_err(OpenSearchError::Http)?;

        Ok(Self {
            http: HttpClient::new(client, base_url, Credentials { username, password }),
        })
    }

    async fn put_security<T: serde::Serialize + Sync>(
        &self,
        kind: &str,
        name: &str,
        body: &T,
    ) -> Result<(), OpenSearchError> {
        let path = format!("{}/{}/{}", SECURITY_API, kind, segment(name));
        let body = serde_json::to_value(body)?;
        let _: serde_json::Value = self.http.put(&path, &body).await?;
        Ok(())
    }

    async fn get_security<T: for<'de> Deserialize<'de>>(
        &self,
        kind: &str,
        name: &str,
    ) -> Result<Option<T>, OpenSearchError> {
        let path = format!("{}/{}/{}", SECURITY_API, kind, segment(name));
        let found: Option<BTreeMap<String, T>> = self.http.get_optional(&path).await?;
        Ok(found.and_then(|mut m| m.remove(name)))
    }

    async fn delete_security(&self, kind: &str, name: &str) -> Result<(), OpenSearchError> {
        let path = format!("{}/{}/{}", SECURITY_API, kind, segment(name));
        self.http.delete(&path).await
    }
}

#[derive(Deserialize)]
struct IndexTemplatesResponse {
    #[serde(default)]
    index_templates: Vec<NamedIndexTemplate>,
}

#[derive(Deserialize)]
struct NamedIndexTemplate {
    name: String,
    index_template: serde_json::Value,
}

#[derive(Deserialize)]
struct ComponentTemplatesResponse {
    #[serde(default)]
    component_templates: Vec<NamedComponentTemplate>,
}

#[derive(Deserialize)]
struct NamedComponentTemplate {
    name: String,
    component_template: serde_json::Value,
}

#[derive(Deserialize)]
struct StoredScriptResponse {
    #[serde(default)]
    found: bool,
    #[serde(default)]
    script: Option<StoredScript>,
}

#[async_trait]
impl OpenSearchClientTrait for OpenSearchClient {
    fn base_url(&self) -> &str {
        self.http.base_url()
    }

    async fn info(&self) -> Result<ClusterInfo, OpenSearchError> {
        self.http.get("/", HEALTH_TIMEOUT).await
    }

    async fn health(&self) -> Result<ClusterHealth, OpenSearchError> {
        self.http.get("/_cluster/health?level=indices", HEALTH_TIMEOUT).await
    }

    async fn cat_nodes(&self) -> Result<Vec<CatNode>, OpenSearchError> {
        self.http.get("/_cat/nodes?format=json", MUTATION_TIMEOUT).await
    }

    async fn nodes_stats(&self) -> Result<NodesStats, OpenSearchError> {
        self.http.get("/_nodes/stats", MUTATION_TIMEOUT).await
    }

    async fn cat_indices(&self) -> Result<Vec<CatIndex>, OpenSearchError> {
        self.http.get("/_cat/indices?format=json", MUTATION_TIMEOUT).await
    }

    async fn cat_shards(&self, indices: &[String]) -> Result<Vec<CatShard>, OpenSearchError> {
        let path = if indices.is_empty() {
            "/_cat/shards?format=json".to_string()
        } else {
            let list = indices.iter().map(|i| segment(i)).collect::<Vec<_>>().join(",");
            format!("/_cat/shards/{}?format=json", list)
        };
        self.http.get(&path, MUTATION_TIMEOUT).await
    }

    async fn get_cluster_settings(&self, flat: bool) -> Result<ClusterSettings, OpenSearchError> {
        let path = format!("/_cluster/settings?flat_settings={}", flat);
        self.http.get(&path, MUTATION_TIMEOUT).await
    }

    async fn put_cluster_settings(&self, settings: &serde_json::Value) -> Result<ClusterSettings, OpenSearchError> {
        debug!("Updating cluster settings: {}", settings);
        self.http.put("/_cluster/settings?flat_settings=true", settings).await
    }

    async fn reroute(&self, command: &serde_json::Value) -> Result<RerouteResponse, OpenSearchError> {
        self.http.post("/_cluster/reroute", command).await
    }

    async fn index_exists(&self, name: &str) -> Result<bool, OpenSearchError> {
        self.http.head(&format!("/{}", segment(name))).await
    }

    async fn get_user(&self, name: &str) -> Result<Option<InternalUser>, OpenSearchError> {
        self.get_security("internalusers", name).await
    }

    async fn put_user(&self, name: &str, user: &InternalUser) -> Result<(), OpenSearchError> {
        self.put_security("internalusers", name, user).await
    }

    async fn delete_user(&self, name: &str) -> Result<(), OpenSearchError> {
        self.delete_security("internalusers", name).await
    }

    async fn get_role(&self, name: &str) -> Result<Option<Role>, OpenSearchError> {
        self.get_security("roles", name).await
    }

    async fn put_role(&self, name: &str, role: &Role) -> Result<(), OpenSearchError> {
        self.put_security("roles", name, role).await
    }

    async fn delete_role(&self, name: &str) -> Result<(), OpenSearchError> {
        self.delete_security("roles", name).await
    }

    async fn get_role_mapping(&self, role: &str) -> Result<Option<RoleMapping>, OpenSearchError> {
        self.get_security("rolesmapping", role).await
    }

    async fn put_role_mapping(&self, role: &str, mapping: &RoleMapping) -> Result<(), OpenSearchError> {
        self.put_security("rolesmapping", role, mapping).await
    }

    async fn delete_role_mapping(&self, role: &str) -> Result<(), OpenSearchError> {
        self.delete_security("rolesmapping", role).await
    }

    async fn get_tenant(&self, name: &str) -> Result<Option<Tenant>, OpenSearchError> {
        self.get_security("tenants", name).await
    }

    async fn put_tenant(&self, name: &str, tenant: &Tenant) -> Result<(), OpenSearchError> {
        self.put_security("tenants", name, tenant).await
    }

    async fn delete_tenant(&self, name: &str) -> Result<(), OpenSearchError> {
        self.delete_security("tenants", name).await
    }

    async fn get_action_group(&self, name: &str) -> Result<Option<ActionGroup>, OpenSearchError> {
        self.get_security("actiongroups", name).await
    }

    async fn put_action_group(&self, name: &str, group: &ActionGroup) -> Result<(), OpenSearchError> {
        self.put_security("actiongroups", name, group).await
    }

    async fn delete_action_group(&self, name: &str) -> Result<(), OpenSearchError> {
        self.delete_security("actiongroups", name).await
    }

    async fn get_ism_policy(&self, id: &str) -> Result<Option<VersionedPolicy>, OpenSearchError> {
        self.http.get_optional(&format!("{}/{}", ISM_API, segment(id))).await
    }

    async fn create_ism_policy(&self, id: &str, policy: &serde_json::Value) -> Result<(), OpenSearchError> {
        let body = serde_json::json!({ "policy": policy });
        let _: serde_json::Value = self.http.put(&format!("{}/{}", ISM_API, segment(id)), &body).await?;
        Ok(())
    }

    async fn update_ism_policy(
        &self,
        id: &str,
        seq_no: i64,
        primary_term: i64,
        policy: &serde_json::Value,
    ) -> Result<(), OpenSearchError> {
        let path = format!(
            "{}/{}?if_seq_no={}&if_primary_term={}",
            ISM_API,
            segment(id),
            seq_no,
            primary_term
        );
        let body = serde_json::json!({ "policy": policy });
        let _: serde_json::Value = self.http.put(&path, &body).await?;
        Ok(())
    }

    async fn delete_ism_policy(&self, id: &str) -> Result<(), OpenSearchError> {
        self.http.delete(&format!("{}/{}", ISM_API, segment(id))).await
    }

    async fn get_snapshot_policy(&self, name: &str) -> Result<Option<VersionedPolicy>, OpenSearchError> {
        self.http.get_optional(&format!("{}/{}", SM_API, segment(name))).await
    }

    async fn create_snapshot_policy(&self, name: &str, policy: &serde_json::Value) -> Result<(), OpenSearchError> {
        let _: serde_json::Value = self.http.post(&format!("{}/{}", SM_API, segment(name)), policy).await?;
        Ok(())
    }

    async fn update_snapshot_policy(
        &self,
        name: &str,
        seq_no: i64,
        primary_term: i64,
        policy: &serde_json::Value,
    ) -> Result<(), OpenSearchError> {
        let path = format!(
            "{}/{}?if_seq_no={}&if_primary_term={}",
            SM_API,
            segment(name),
            seq_no,
            primary_term
        );
        let _: serde_json::Value = self.http.put(&path, policy).await?;
        Ok(())
    }

    async fn delete_snapshot_policy(&self, name: &str) -> Result<(), OpenSearchError> {
        self.http.delete(&format!("{}/{}", SM_API, segment(name))).await
    }

    async fn get_snapshot_repository(&self, name: &str) -> Result<Option<SnapshotRepository>, OpenSearchError> {
        let found: Option<BTreeMap<String, SnapshotRepository>> =
            self.http.get_optional(&format!("/_snapshot/{}", segment(name))).await?;
        Ok(found.and_then(|mut m| m.remove(name)))
    }

    async fn put_snapshot_repository(&self, name: &str, repository: &SnapshotRepository) -> Result<(), OpenSearchError> {
        let body = serde_json::to_value(repository)?;
        let _: serde_json::Value = self.http.put(&format!("/_snapshot/{}", segment(name)), &body).await?;
        Ok(())
    }

    async fn delete_snapshot_repository(&self, name: &str) -> Result<(), OpenSearchError> {
        self.http.delete(&format!("/_snapshot/{}", segment(name))).await
    }

    async fn get_index_template(&self, name: &str) -> Result<Option<serde_json::Value>, OpenSearchError> {
        let found: Option<IndexTemplatesResponse> =
            self.http.get_optional(&format!("/_index_template/{}", segment(name))).await?;
        Ok(found.and_then(|r| {
            r.index_templates
                .into_iter()
                .find(|t| t.name == name)
                .map(|t| t.index_template)
        }))
    }

    async fn put_index_template(&self, name: &str, template: &serde_json::Value) -> Result<(), OpenSearchError> {
        let _: serde_json::Value = self.http.put(&format!("/_index_template/{}", segment(name)), template).await?;
        Ok(())
    }

    async fn delete_index_template(&self, name: &str) -> Result<(), OpenSearchError> {
        self.http.delete(&format!("/_index_template/{}", segment(name))).await
    }

    async fn get_component_template(&self, name: &str) -> Result<Option<serde_json::Value>, OpenSearchError> {
        let found: Option<ComponentTemplatesResponse> =
            self.http.get_optional(&format!("/_component_template/{}", segment(name))).await?;
        Ok(found.and_then(|r| {
            r.component_templates
                .into_iter()
                .find(|t| t.name == name)
                .map(|t| t.component_template)
        }))
    }

    async fn put_component_template(&self, name: &str, template: &serde_json::Value) -> Result<(), OpenSearchError> {
        let _: serde_json::Value = self
            .http
            .put(&format!("/_component_template/{}", segment(name)), template)
            .await?;
        Ok(())
    }

    async fn delete_component_template(&self, name: &str) -> Result<(), OpenSearchError> {
        self.http.delete(&format!("/_component_template/{}", segment(name))).await
    }

    async fn get_search_template(&self, id: &str) -> Result<Option<StoredScript>, OpenSearchError> {
        let found: Option<StoredScriptResponse> =
            self.http.get_optional(&format!("/_scripts/{}", segment(id))).await?;
        Ok(found.filter(|r| r.found).and_then(|r| r.script))
    }

    async fn put_search_template(&self, id: &str, script: &StoredScript) -> Result<(), OpenSearchError> {
        let body = serde_json::json!({ "script": script });
        let _: serde_json::Value = self.http.put(&format!("/_scripts/{}", segment(id)), &body).await?;
        Ok(())
    }

    async fn delete_search_template(&self, id: &str) -> Result<(), OpenSearchError> {
        self.http.delete(&format!("/_scripts/{}", segment(id))).await
    }
}
