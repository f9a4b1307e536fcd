//! Search template reconciler
//!
//! Handles: OpensearchSearchTemplate

use std::sync::Arc;

use async_trait::async_trait;
use crds::{ManagedResourceStatus, OpenSearchCluster, OpenSearchClusterRef, OpensearchSearchTemplate};
use kube::{Api, Client, ResourceExt};
use kube_runtime::controller::Action;
use opensearch_client::{OpenSearchClientTrait, OpenSearchError, StoredScript};

use super::{Reconciler, SubResource, namespaced_api};
use crate::error::ControllerError;
use crate::reconcile_helpers::{RemoteState, RemoteSync};

/// A stored search template script.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchTemplateSync {
    pub id: String,
    pub script: StoredScript,
}

impl SearchTemplateSync {
    pub fn from_resource(resource: &OpensearchSearchTemplate) -> Self {
        Self {
            id: resource.spec.name.clone().unwrap_or_else(|| resource.name_any()),
            script: StoredScript {
                lang: resource.spec.lang.clone(),
                source: resource.spec.source.clone(),
            },
        }
    }
}

#[async_trait]
impl RemoteSync for SearchTemplateSync {
    fn kind(&self) -> &'static str {
        "search template"
    }

    fn external_name(&self) -> &str {
        &self.id
    }

    async fn remote_state(&self, client: &dyn OpenSearchClientTrait) -> Result<RemoteState, OpenSearchError> {
        Ok(match client.get_search_template(&self.id).await? {
            Some(_) => RemoteState::Foreign,
            None => RemoteState::Absent,
        })
    }

    async fn create(&self, client: &dyn OpenSearchClientTrait) -> Result<(), OpenSearchError> {
        client.put_search_template(&self.id, &self.script).await
    }

    async fn update(&self, client: &dyn OpenSearchClientTrait) -> Result<bool, OpenSearchError> {
        let existing = client.get_search_template(&self.id).await?;
        if existing.as_ref() == Some(&self.script) {
            return Ok(false);
        }
        client.put_search_template(&self.id, &self.script).await?;
        Ok(true)
    }

    async fn delete(&self, client: &dyn OpenSearchClientTrait) -> Result<(), OpenSearchError> {
        client.delete_search_template(&self.id).await
    }
}

#[async_trait]
impl SubResource for OpensearchSearchTemplate {
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
        Ok(Box::new(SearchTemplateSync::from_resource(self)))
    }
}

impl Reconciler {
    /// Reconciles an OpensearchSearchTemplate resource.
    pub async fn reconcile_search_template(
        &self,
        template: Arc<OpensearchSearchTemplate>,
    ) -> Result<Action, ControllerError> {
        self.reconcile_sub_resource(template).await
    }
}
