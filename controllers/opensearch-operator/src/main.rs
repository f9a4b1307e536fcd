//! OpenSearch Operator
//!
//! Kubernetes operator for OpenSearch:
//! - OpenSearchCluster: node pools, dashboards, TLS, rolling upgrades and scaling
//! - Security plugin objects: users, roles, user-role bindings, tenants, action groups
//! - Index management: ISM and snapshot policies, index/component/search templates
//! - Admission webhooks and the `opensearch.opster.io` to `opensearch.org` migration

mod backoff;
mod conditions;
mod config;
mod controller;
mod crd_install;
mod error;
mod gateway;
mod leader_election;
mod metrics;
mod migrator;
mod probes;
mod reconcile_helpers;
mod reconciler;
mod resource_reconciler;
mod watcher;
mod webhook;

#[cfg(test)]
mod reconcile_helpers_test;
#[cfg(test)]
mod test_utils;

use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use kube::Client;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::controller::Controller;
use crate::leader_election::{LeaderElectionConfig, LeaderStatus};
use crate::metrics::Metrics;
use crate::probes::Probes;
use crate::reconciler::Reconciler;
use crate::reconciler::cluster::tls::RcgenAuthority;
use crate::resource_reconciler::ResourceReconciler;
use crate::watcher::Context;
use crate::webhook::WebhookState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    config.init_logging();

    // kube and the webhook server share the ring provider
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("A rustls crypto provider was already installed");
    }

    info!("Starting OpenSearch Operator {}", env!("CARGO_PKG_VERSION"));
    info!("  Watch namespace: {}", config.watch_namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Leader election: {}", config.leader_elect);
    info!("  Max concurrent reconciles: {}", config.max_concurrent_reconciles);

    let client = Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;

    let metrics = Metrics::new().context("failed to register metrics")?;
    let probes = Probes::new();
    spawn_server("Health probes", config.health_probe_bind_address.clone(), probes.router());
    spawn_server("Metrics", config.metrics_bind_address.clone(), metrics.router());

    if config.install_crds {
        crd_install::install_crds(&ResourceReconciler::new(client.clone()))
            .await
            .context("failed to install CRDs")?;
    }

    start_webhooks(&config, client.clone())?;

    let status = LeaderStatus::new();
    let election = LeaderElectionConfig::from_env();
    if config.leader_elect {
        tokio::spawn(leader_election::run(
            client.clone(),
            election.clone(),
            status.clone(),
            metrics.clone(),
        ));
        info!("Waiting for leadership of lease {}/{}", election.namespace, election.lease_name);
        status.acquired().await;
    } else {
        status.force_leader();
        metrics.set_leader(true);
    }

    let reconciler = Reconciler::new(
        client.clone(),
        Arc::new(RcgenAuthority),
        config.insecure_skip_tls_verify,
    );
    let context = Arc::new(Context {
        reconciler: Arc::new(reconciler),
        metrics,
    });
    let controller = Controller::start(client.clone(), &config, context).await?;
    probes.set_ready(true);

    let mut sigterm = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    let result = tokio::select! {
        result = controller.run() => result.map_err(anyhow::Error::from),
        () = status.lost(), if config.leader_elect => {
            Err(anyhow::anyhow!("lost leadership of lease {}", election.lease_name))
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            Ok(())
        }
        _ = sigterm.recv() => {
            info!("Terminated, shutting down");
            Ok(())
        }
    };

    probes.set_ready(false);
    if config.leader_elect {
        leader_election::step_down(&client, &election).await;
    }
    result
}

fn spawn_server(what: &'static str, addr: String, router: axum::Router) {
    tokio::spawn(async move {
        if let Err(e) = probes::serve(&addr, router, what).await {
            error!("{} server on {} failed: {:#}", what, addr, e);
        }
    });
}

/// Serve the admission webhooks when a serving certificate is mounted.
fn start_webhooks(config: &Config, client: Client) -> anyhow::Result<()> {
    let Some((cert, key)) = webhook::server::serving_files(&config.webhook_cert_dir) else {
        warn!(
            "No webhook certificate in {}, admission webhooks disabled",
            config.webhook_cert_dir.display()
        );
        return Ok(());
    };

    let acceptor = webhook::server::build_acceptor(&cert, &key)?;
    let router = webhook::router(WebhookState::new(client), &migrator::migrated_kinds());
    let addr = config.webhook_bind_address.clone();
    tokio::spawn(async move {
        if let Err(e) = webhook::server::serve(&addr, router, acceptor).await {
            error!("Webhook server on {} failed: {:#}", addr, e);
        }
    });
    Ok(())
}
