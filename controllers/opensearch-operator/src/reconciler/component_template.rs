//! Component template reconciler
//!
//! Handles: OpensearchComponentTemplate

use std::sync::Arc;

use async_trait::async_trait;
use crds::{ManagedResourceStatus, OpenSearchCluster, OpenSearchClusterRef, OpensearchComponentTemplate};
use kube::{Api, Client, ResourceExt};
use kube_runtime::controller::Action;
use opensearch_client::{OpenSearchClientTrait, OpenSearchError};
use serde_json::{Value, json};

use super::{Reconciler, SubResource, namespaced_api};
use crate::error::ControllerError;
use crate::reconcile_helpers::{RemoteState, RemoteSync, json_contains, without_null_fields};

/// A component template.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentTemplateSync {
    pub name: String,
    pub body: Value,
}

impl ComponentTemplateSync {
    pub fn from_resource(resource: &OpensearchComponentTemplate) -> Self {
        let spec = &resource.spec;
        let body = without_null_fields(json!({
            // OpenSearch rejects a component template without a template block
            "template": spec.template.clone().unwrap_or_else(|| json!({})),
            "version": spec.version,
            "_meta": spec.meta,
            "allow_auto_create": spec.allow_auto_create,
        }));
        Self {
            name: spec.name.clone().unwrap_or_else(|| resource.name_any()),
            body,
        }
    }
}

#[async_trait]
impl RemoteSync for ComponentTemplateSync {
    fn kind(&self) -> &'static str {
        "component template"
    }

    fn external_name(&self) -> &str {
        &self.name
    }

    async fn remote_state(&self, client: &dyn OpenSearchClientTrait) -> Result<RemoteState, OpenSearchError> {
        Ok(match client.get_component_template(&self.name).await? {
            Some(_) => RemoteState::Foreign,
            None => RemoteState::Absent,
        })
    }

    async fn create(&self, client: &dyn OpenSearchClientTrait) -> Result<(), OpenSearchError> {
        client.put_component_template(&self.name, &self.body).await
    }

    async fn update(&self, client: &dyn OpenSearchClientTrait) -> Result<bool, OpenSearchError> {
        let needs_update = match client.get_component_template(&self.name).await? {
            Some(existing) => !json_contains(&existing, &self.body),
            None => true,
        };
        if needs_update {
            client.put_component_template(&self.name, &self.body).await?;
        }
        Ok(needs_update)
    }

    async fn delete(&self, client: &dyn OpenSearchClientTrait) -> Result<(), OpenSearchError> {
        client.delete_component_template(&self.name).await
    }
}

#[async_trait]
impl SubResource for OpensearchComponentTemplate {
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
        Ok(Box::new(ComponentTemplateSync::from_resource(self)))
    }
}

impl Reconciler {
    /// Reconciles an OpensearchComponentTemplate resource.
    pub async fn reconcile_component_template(
        &self,
        template: Arc<OpensearchComponentTemplate>,
    ) -> Result<Action, ControllerError> {
        self.reconcile_sub_resource(template).await
    }
}
