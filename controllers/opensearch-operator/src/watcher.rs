//! Kubernetes resource watchers.
//!
//! Every kind runs on a `kube_runtime::Controller` through
//! [`run_controller`], which adds the shared pieces: per-object exponential
//! backoff on errors, reconcile metrics and logging.

use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use futures::future::BoxFuture;
use kube::{Api, Client, Resource, ResourceExt};
use kube_runtime::controller::{Action, Config as ControllerConfig};
use kube_runtime::{Controller, watcher};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::ControllerError;
use crate::metrics::Metrics;
use crate::reconciler::Reconciler;

/// Quiet period after an event before reconciling, batches bursts of updates
const DEBOUNCE: Duration = Duration::from_secs(1);

/// State shared by all controllers.
pub struct Context {
    /// Reconcile logic and per-object backoff
    pub reconciler: Arc<Reconciler>,
    /// Reconcile metrics
    pub metrics: Metrics,
}

/// A reconcile entry point of [`Reconciler`] for one kind.
pub type ReconcileFn<K> =
    Arc<dyn Fn(Arc<Reconciler>, Arc<K>) -> BoxFuture<'static, Result<Action, ControllerError>> + Send + Sync>;

/// Box an async reconcile function.
pub fn reconcile_fn<K, F, Fut>(f: F) -> ReconcileFn<K>
where
    F: Fn(Arc<Reconciler>, Arc<K>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Action, ControllerError>> + Send + 'static,
{
    Arc::new(move |reconciler: Arc<Reconciler>, obj: Arc<K>| -> BoxFuture<'static, Result<Action, ControllerError>> {
        Box::pin(f(reconciler, obj))
    })
}

/// Backoff key of an object.
pub fn backoff_key<K: Resource>(controller: &str, obj: &K) -> String {
    format!(
        "{}/{}/{}",
        controller,
        obj.namespace().unwrap_or_default(),
        obj.name_any()
    )
}

/// Watch every namespace, or only `namespace` when set.
pub fn watch_api<K>(client: Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope>,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// Drive `controller` until its watch streams end.
pub async fn run_controller<K>(
    controller: Controller<K>,
    context: Arc<Context>,
    name: String,
    concurrency: u16,
    reconcile_fn: ReconcileFn<K>,
) -> Result<(), ControllerError>
where
    K: Resource + Clone + Debug + DeserializeOwned + Send + Sync + 'static,
    K::DynamicType: Debug + Eq + Hash + Clone + Unpin + Send + Sync,
{
    info!("Starting {} controller", name);

    let reconcile_name = name.clone();
    let reconcile = move |obj: Arc<K>, ctx: Arc<Context>| {
        let reconcile_fn = Arc::clone(&reconcile_fn);
        let name = reconcile_name.clone();
        async move {
            let key = backoff_key(&name, obj.as_ref());
            debug!("Reconciling {}", key);
            let started = Instant::now();
            let result = reconcile_fn(Arc::clone(&ctx.reconciler), obj).await;
            ctx.metrics
                .record_reconcile(&name, result.is_ok(), started.elapsed().as_secs_f64());
            if result.is_ok() {
                ctx.reconciler.reset_backoff(&key);
            }
            result
        }
    };

    let policy_name = name.clone();
    let error_policy = move |obj: Arc<K>, error: &ControllerError, ctx: Arc<Context>| {
        let key = backoff_key(&policy_name, obj.as_ref());
        let (delay, count) = ctx.reconciler.next_backoff(&key);
        ctx.metrics.record_error(&policy_name, error.kind().as_str());
        warn!(
            "Reconcile of {} failed ({} consecutive, {}): {}; retrying in {:?}",
            key,
            count,
            error.kind(),
            error,
            delay
        );
        Action::requeue(delay)
    };

    let config = ControllerConfig::default().debounce(DEBOUNCE).concurrency(concurrency);
    controller
        .with_config(config)
        .run(reconcile, error_policy, context)
        .for_each(|res| {
            let name = name.as_str();
            async move {
                match res {
                    Ok((obj, _)) => debug!("Reconciled {} {}", name, obj.name),
                    Err(e) => debug!("{} controller event: {}", name, e),
                }
            }
        })
        .await;

    Err(ControllerError::Watch(format!("{name} controller stream ended")))
}

/// A controller over `api` with default watch settings.
pub fn controller_for<K>(api: Api<K>) -> Controller<K>
where
    K: Resource<DynamicType = ()> + Clone + Debug + DeserializeOwned + Send + Sync + 'static,
{
    Controller::new(api, watcher::Config::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crds::{OpenSearchClusterRef, OpensearchTenant, OpensearchTenantSpec};

    #[test]
    fn test_backoff_key_includes_namespace() {
        let mut tenant = OpensearchTenant::new(
            "analysts",
            OpensearchTenantSpec {
                opensearch_cluster: OpenSearchClusterRef::new("logs"),
                description: None,
            },
        );
        assert_eq!(backoff_key("tenant", &tenant), "tenant//analysts");

        tenant.metadata.namespace = Some("search".to_string());
        assert_eq!(backoff_key("tenant", &tenant), "tenant/search/analysts");
    }
}
