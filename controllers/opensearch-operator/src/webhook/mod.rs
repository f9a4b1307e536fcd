//! Validating admission webhooks.
//!
//! One route per kind and group. `opensearch.org` objects go through the
//! rules in [`validators`]; every `opensearch.opster.io` object goes
//! through the lockdown in [`legacy`].
//!
//! Paths follow `/validate-<group with dashes>-v1-<lowercase kind>`, e.g.
//! `/validate-opensearch-org-v1-opensearchrole`.

pub mod legacy;
pub mod server;
pub mod validators;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use crds::{
    API_GROUP, API_VERSION, LEGACY_API_GROUP, OpenSearchCluster, OpenSearchISMPolicy, OpensearchActionGroup,
    OpensearchComponentTemplate, OpensearchIndexTemplate, OpensearchRole, OpensearchSearchTemplate,
    OpensearchSnapshotPolicy, OpensearchTenant, OpensearchUser, OpensearchUserRoleBinding,
};
use kube::api::{Api, DynamicObject};
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::error::is_kube_not_found;
use crate::migrator::MigratedKind;

use self::validators::Validate;

/// Shared handler state.
#[derive(Clone)]
pub struct WebhookState {
    client: Client,
}

impl std::fmt::Debug for WebhookState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookState").finish_non_exhaustive()
    }
}

impl WebhookState {
    /// State backed by `client` for cluster lookups.
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Webhook path for `kind` in `group`.
pub fn webhook_path(group: &str, kind: &str) -> String {
    format!("/validate-{}-{}-{}", group.replace('.', "-"), API_VERSION, kind.to_lowercase())
}

fn typed_path<K: Resource<DynamicType = ()>>() -> String {
    webhook_path(API_GROUP, &K::kind(&()))
}

/// Router with every validation and lockdown route.
pub fn router(state: WebhookState, legacy_kinds: &[MigratedKind]) -> Router {
    let mut router = Router::new()
        .route(&typed_path::<OpenSearchCluster>(), post(validate::<OpenSearchCluster>))
        .route(&typed_path::<OpensearchUser>(), post(validate::<OpensearchUser>))
        .route(&typed_path::<OpensearchRole>(), post(validate::<OpensearchRole>))
        .route(
            &typed_path::<OpensearchUserRoleBinding>(),
            post(validate::<OpensearchUserRoleBinding>),
        )
        .route(&typed_path::<OpensearchTenant>(), post(validate::<OpensearchTenant>))
        .route(&typed_path::<OpensearchActionGroup>(), post(validate::<OpensearchActionGroup>))
        .route(&typed_path::<OpenSearchISMPolicy>(), post(validate::<OpenSearchISMPolicy>))
        .route(&typed_path::<OpensearchSnapshotPolicy>(), post(validate::<OpensearchSnapshotPolicy>))
        .route(&typed_path::<OpensearchIndexTemplate>(), post(validate::<OpensearchIndexTemplate>))
        .route(
            &typed_path::<OpensearchComponentTemplate>(),
            post(validate::<OpensearchComponentTemplate>),
        )
        .route(&typed_path::<OpensearchSearchTemplate>(), post(validate::<OpensearchSearchTemplate>));

    for kind in legacy_kinds {
        router = router.route(&webhook_path(LEGACY_API_GROUP, &kind.kind), post(lockdown));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

async fn validate<K>(
    State(state): State<WebhookState>,
    Json(review): Json<AdmissionReview<K>>,
) -> Json<AdmissionReview<DynamicObject>>
where
    K: Validate + Resource + DeserializeOwned + Clone + Send + Sync + 'static,
{
    let request: AdmissionRequest<K> = match review.try_into() {
        Ok(request) => request,
        Err(e) => {
            warn!("Malformed admission review: {}", e);
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };

    let response = AdmissionResponse::from(&request);
    let response = match admit(&state, &request).await {
        Ok(()) => response,
        Err(reason) => {
            info!(
                "Denied {:?} of {} {}: {}",
                request.operation, request.kind.kind, request.name, reason
            );
            response.deny(reason)
        }
    };
    Json(response.into_review())
}

async fn admit<K: Validate + Resource>(state: &WebhookState, request: &AdmissionRequest<K>) -> Result<(), String> {
    let Some(object) = request.object.as_ref() else {
        return Ok(());
    };
    match request.operation {
        Operation::Create => {
            object.validate()?;
            let Some(cluster_ref) = object.cluster_ref() else {
                return Ok(());
            };
            let namespace = cluster_ref.resolve_namespace(request.namespace.as_deref());
            match cluster_exists(&state.client, &cluster_ref.name, namespace).await {
                Ok(true) => Ok(()),
                Ok(false) => Err(format!("cluster {}/{} not found", namespace, cluster_ref.name)),
                Err(e) => Err(format!("could not look up cluster {}/{}: {}", namespace, cluster_ref.name, e)),
            }
        }
        Operation::Update => match request.old_object.as_ref() {
            Some(old) => object.validate_update(old),
            None => object.validate(),
        },
        Operation::Delete | Operation::Connect => Ok(()),
    }
}

/// True when a cluster of that name exists in either API group.
pub async fn cluster_exists(client: &Client, name: &str, namespace: &str) -> Result<bool, kube::Error> {
    let current: Api<OpenSearchCluster> = Api::namespaced(client.clone(), namespace);
    if current.get_opt(name).await?.is_some() {
        return Ok(true);
    }

    let legacy_resource = MigratedKind {
        kind: OpenSearchCluster::kind(&()).to_string(),
        plural: OpenSearchCluster::plural(&()).to_string(),
        namespaced: true,
    }
    .legacy();
    let legacy: Api<DynamicObject> = Api::namespaced_with(client.clone(), namespace, &legacy_resource);
    match legacy.get_opt(name).await {
        Ok(found) => Ok(found.is_some()),
        // legacy CRD not installed
        Err(e) if is_kube_not_found(&e) => {
            debug!("Legacy cluster kind is not served");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

async fn lockdown(Json(review): Json<AdmissionReview<DynamicObject>>) -> Json<AdmissionReview<DynamicObject>> {
    let request: AdmissionRequest<DynamicObject> = match review.try_into() {
        Ok(request) => request,
        Err(e) => {
            warn!("Malformed admission review: {}", e);
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };
    let response = AdmissionResponse::from(&request);
    let response = match legacy::review(&request) {
        Ok(()) => response,
        Err(reason) => {
            info!("Denied {:?} of legacy {} {}: {}", request.operation, request.kind.kind, request.name, reason);
            response.deny(reason)
        }
    };
    Json(response.into_review())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_paths() {
        assert_eq!(
            typed_path::<OpensearchRole>(),
            "/validate-opensearch-org-v1-opensearchrole"
        );
        assert_eq!(
            webhook_path(LEGACY_API_GROUP, "OpenSearchCluster"),
            "/validate-opensearch-opster-io-v1-opensearchcluster"
        );
    }

    #[tokio::test]
    async fn test_lockdown_denies_legacy_create() {
        let review: AdmissionReview<DynamicObject> = serde_json::from_value(serde_json::json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "3f1c2a60-0000-4000-8000-000000000001",
                "kind": {"group": "opensearch.opster.io", "version": "v1", "kind": "OpensearchRole"},
                "resource": {"group": "opensearch.opster.io", "version": "v1", "resource": "opensearchroles"},
                "name": "reader",
                "operation": "CREATE",
                "userInfo": {"username": "admin"},
                "object": {
                    "apiVersion": "opensearch.opster.io/v1",
                    "kind": "OpensearchRole",
                    "metadata": {"name": "reader"},
                    "spec": {"clusterPermissions": ["cluster_monitor"]}
                },
                "oldObject": null,
                "dryRun": false
            }
        }))
        .unwrap();

        let Json(answer) = lockdown(Json(review)).await;
        let response = answer.response.unwrap();
        assert!(!response.allowed);
        assert_eq!(response.uid, "3f1c2a60-0000-4000-8000-000000000001");
    }
}
