//! Index template reconciler
//!
//! Handles: OpensearchIndexTemplate

use std::sync::Arc;

use async_trait::async_trait;
use crds::{ManagedResourceStatus, OpenSearchCluster, OpenSearchClusterRef, OpensearchIndexTemplate};
use kube::{Api, Client, ResourceExt};
use kube_runtime::controller::Action;
use opensearch_client::{OpenSearchClientTrait, OpenSearchError};
use serde_json::{Value, json};

use super::{Reconciler, SubResource, namespaced_api};
use crate::error::ControllerError;
use crate::reconcile_helpers::{RemoteState, RemoteSync, json_contains, without_null_fields};

/// A composable index template.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexTemplateSync {
    pub name: String,
    pub body: Value,
}

impl IndexTemplateSync {
    pub fn from_resource(resource: &OpensearchIndexTemplate) -> Self {
        let spec = &resource.spec;
        let composed_of = (!spec.composed_of.is_empty()).then(|| spec.composed_of.clone());
        let body = without_null_fields(json!({
            "index_patterns": spec.index_patterns,
            "template": spec.template,
            "composed_of": composed_of,
            "priority": spec.priority,
            "version": spec.version,
            "_meta": spec.meta,
            "data_stream": spec.data_stream,
        }));
        Self {
            name: spec.name.clone().unwrap_or_else(|| resource.name_any()),
            body,
        }
    }
}

#[async_trait]
impl RemoteSync for IndexTemplateSync {
    fn kind(&self) -> &'static str {
        "index template"
    }

    fn external_name(&self) -> &str {
        &self.name
    }

    async fn remote_state(&self, client: &dyn OpenSearchClientTrait) -> Result<RemoteState, OpenSearchError> {
        Ok(match client.get_index_template(&self.name).await? {
            Some(_) => RemoteState::Foreign,
            None => RemoteState::Absent,
        })
    }

    async fn create(&self, client: &dyn OpenSearchClientTrait) -> Result<(), OpenSearchError> {
        client.put_index_template(&self.name, &self.body).await
    }

    async fn update(&self, client: &dyn OpenSearchClientTrait) -> Result<bool, OpenSearchError> {
        let needs_update = match client.get_index_template(&self.name).await? {
            Some(existing) => !json_contains(&existing, &self.body),
            None => true,
        };
        if needs_update {
            client.put_index_template(&self.name, &self.body).await?;
        }
        Ok(needs_update)
    }

    async fn delete(&self, client: &dyn OpenSearchClientTrait) -> Result<(), OpenSearchError> {
        client.delete_index_template(&self.name).await
    }
}

#[async_trait]
impl SubResource for OpensearchIndexTemplate {
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
        Ok(Box::new(IndexTemplateSync::from_resource(self)))
    }
}

impl Reconciler {
    /// Reconciles an OpensearchIndexTemplate resource.
    pub async fn reconcile_index_template(
        &self,
        template: Arc<OpensearchIndexTemplate>,
    ) -> Result<Action, ControllerError> {
        self.reconcile_sub_resource(template).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crds::OpensearchIndexTemplateSpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn template(spec_name: Option<&str>) -> OpensearchIndexTemplate {
        OpensearchIndexTemplate {
            metadata: ObjectMeta {
                name: Some("logs".to_string()),
                namespace: Some("search".to_string()),
                ..Default::default()
            },
            spec: OpensearchIndexTemplateSpec {
                opensearch_cluster: OpenSearchClusterRef::new("logs"),
                name: spec_name.map(str::to_string),
                index_patterns: vec!["logs-*".to_string()],
                template: Some(json!({"settings": {"number_of_shards": 2}})),
                composed_of: vec![],
                priority: Some(100),
                version: None,
                meta: Some(json!({"owner": "search"})),
                data_stream: None,
            },
            status: None,
        }
    }

    #[test]
    fn test_body_skips_unset_fields() {
        let sync = IndexTemplateSync::from_resource(&template(None));
        assert_eq!(sync.name, "logs");
        assert_eq!(sync.body["index_patterns"], json!(["logs-*"]));
        assert_eq!(sync.body["_meta"]["owner"], "search");
        assert_eq!(sync.body["priority"], 100);
        assert!(sync.body.get("composed_of").is_none());
        assert!(sync.body.get("version").is_none());
        assert!(sync.body.get("data_stream").is_none());
    }

    #[test]
    fn test_stored_template_with_string_settings_is_up_to_date() {
        let sync = IndexTemplateSync::from_resource(&template(Some("logs-v2")));
        assert_eq!(sync.name, "logs-v2");

        // OpenSearch returns index settings as strings
        let stored = json!({
            "index_patterns": ["logs-*"],
            "template": {"settings": {"number_of_shards": "2"}},
            "priority": 100,
            "_meta": {"owner": "search"},
            "composed_of": []
        });
        assert!(json_contains(&stored, &sync.body));
    }
}
