//! Main controller implementation.
//!
//! Starts one `kube_runtime::Controller` per kind:
//! - `OpenSearchCluster`, also woken by its stateful sets, services and
//!   the dashboards deployment
//! - the ten sub-resource kinds
//! - one migrator per kind whose legacy CRD is installed

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use crds::{
    CLUSTER_LABEL, OpenSearchCluster, OpenSearchISMPolicy, OpensearchActionGroup, OpensearchComponentTemplate,
    OpensearchIndexTemplate, OpensearchRole, OpensearchSearchTemplate, OpensearchSnapshotPolicy, OpensearchTenant,
    OpensearchUser, OpensearchUserRoleBinding,
};
use futures::future::select_all;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::Service;
use kube::{Api, Client, Resource};
use kube_runtime::{Controller as KubeController, watcher};
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::ControllerError;
use crate::migrator::{Migration, migrated_kinds};
use crate::watcher::{Context, ReconcileFn, controller_for, reconcile_fn, run_controller, watch_api};

/// Running controllers of the operator.
pub struct Controller {
    watchers: Vec<(String, JoinHandle<Result<(), ControllerError>>)>,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.watchers.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("Controller").field("watchers", &names).finish()
    }
}

impl Controller {
    /// Start every controller.
    pub async fn start(client: Client, config: &Config, context: Arc<Context>) -> Result<Self, ControllerError> {
        let ns = config.watch_namespace.as_deref();
        let concurrency = config.max_concurrent_reconciles;
        let mut this = Self { watchers: Vec::new() };

        info!("Watching {}", ns.unwrap_or("all namespaces"));

        let children = watcher::Config::default().labels(CLUSTER_LABEL);
        let clusters = controller_for(watch_api::<OpenSearchCluster>(client.clone(), ns))
            .owns(watch_api::<StatefulSet>(client.clone(), ns), children.clone())
            .owns(watch_api::<Service>(client.clone(), ns), children.clone())
            .owns(watch_api::<Deployment>(client.clone(), ns), children);
        this.spawn(
            "opensearchcluster",
            clusters,
            &context,
            concurrency,
            reconcile_fn(|r, obj| async move { r.reconcile_cluster(obj).await }),
        );

        // Security plugin objects
        this.spawn(
            "opensearchuser",
            controller_for(Api::<OpensearchUser>::all(client.clone())),
            &context,
            concurrency,
            reconcile_fn(|r, obj| async move { r.reconcile_user(obj).await }),
        );
        this.spawn(
            "opensearchrole",
            controller_for(Api::<OpensearchRole>::all(client.clone())),
            &context,
            concurrency,
            reconcile_fn(|r, obj| async move { r.reconcile_role(obj).await }),
        );
        this.spawn(
            "opensearchuserrolebinding",
            controller_for(Api::<OpensearchUserRoleBinding>::all(client.clone())),
            &context,
            concurrency,
            reconcile_fn(|r, obj| async move { r.reconcile_user_role_binding(obj).await }),
        );
        this.spawn(
            "opensearchtenant",
            controller_for(watch_api::<OpensearchTenant>(client.clone(), ns)),
            &context,
            concurrency,
            reconcile_fn(|r, obj| async move { r.reconcile_tenant(obj).await }),
        );
        this.spawn(
            "opensearchactiongroup",
            controller_for(watch_api::<OpensearchActionGroup>(client.clone(), ns)),
            &context,
            concurrency,
            reconcile_fn(|r, obj| async move { r.reconcile_action_group(obj).await }),
        );

        // Index management
        this.spawn(
            "opensearchismpolicy",
            controller_for(watch_api::<OpenSearchISMPolicy>(client.clone(), ns)),
            &context,
            concurrency,
            reconcile_fn(|r, obj| async move { r.reconcile_ism_policy(obj).await }),
        );
        this.spawn(
            "opensearchsnapshotpolicy",
            controller_for(watch_api::<OpensearchSnapshotPolicy>(client.clone(), ns)),
            &context,
            concurrency,
            reconcile_fn(|r, obj| async move { r.reconcile_snapshot_policy(obj).await }),
        );
        this.spawn(
            "opensearchindextemplate",
            controller_for(watch_api::<OpensearchIndexTemplate>(client.clone(), ns)),
            &context,
            concurrency,
            reconcile_fn(|r, obj| async move { r.reconcile_index_template(obj).await }),
        );
        this.spawn(
            "opensearchcomponenttemplate",
            controller_for(watch_api::<OpensearchComponentTemplate>(client.clone(), ns)),
            &context,
            concurrency,
            reconcile_fn(|r, obj| async move { r.reconcile_component_template(obj).await }),
        );
        this.spawn(
            "opensearchsearchtemplate",
            controller_for(watch_api::<OpensearchSearchTemplate>(client.clone(), ns)),
            &context,
            concurrency,
            reconcile_fn(|r, obj| async move { r.reconcile_search_template(obj).await }),
        );

        if config.disable_migration {
            info!("API group migration disabled");
        } else {
            this.start_migrators(&client, ns, &context, concurrency).await;
        }

        Ok(this)
    }

    async fn start_migrators(&mut self, client: &Client, ns: Option<&str>, context: &Arc<Context>, concurrency: u16) {
        for kind in migrated_kinds() {
            let migration = Arc::new(Migration::new(client.clone(), kind));
            match migration.legacy_installed().await {
                Ok(true) => {}
                Ok(false) => {
                    info!("No legacy {} CRD installed, nothing to migrate", migration.kind().kind);
                    continue;
                }
                Err(e) => {
                    warn!("Could not check legacy {} CRD: {}", migration.kind().kind, e);
                    continue;
                }
            }
            let name = migration.kind().controller_name();
            let controller = migration.controller(ns);
            let migrate = reconcile_fn(move |_, obj| {
                let migration = Arc::clone(&migration);
                async move { migration.migrate(obj).await }
            });
            self.spawn(name, controller, context, concurrency, migrate);
        }
    }

    fn spawn<K>(
        &mut self,
        name: impl Into<String>,
        controller: KubeController<K>,
        context: &Arc<Context>,
        concurrency: u16,
        reconcile_fn: ReconcileFn<K>,
    ) where
        K: Resource + Clone + Debug + DeserializeOwned + Send + Sync + 'static,
        K::DynamicType: Debug + Eq + Hash + Clone + Unpin + Send + Sync,
    {
        let name = name.into();
        let context = Arc::clone(context);
        let handle = tokio::spawn(run_controller(controller, context, name.clone(), concurrency, reconcile_fn));
        self.watchers.push((name, handle));
    }

    /// Runs until the first controller stops.
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("OpenSearch operator running {} controllers", self.watchers.len());
        if self.watchers.is_empty() {
            return Ok(());
        }

        let (names, handles): (Vec<String>, Vec<_>) = self.watchers.into_iter().unzip();
        let (result, index, _remaining) = select_all(handles).await;
        let name = &names[index];
        result
            .map_err(|e| ControllerError::Watch(format!("{name} controller panicked: {e}")))?
            .map_err(|e| ControllerError::Watch(format!("{name} controller error: {e}")))
    }
}
