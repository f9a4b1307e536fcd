//! Liveness and readiness endpoints, plus the plain HTTP listener shared
//! with the metrics endpoint.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Readiness flag, flipped once the controllers are running.
#[derive(Debug, Clone, Default)]
pub struct Probes {
    ready: Arc<AtomicBool>,
}

impl Probes {
    /// Probes reporting not ready.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the operator ready (or not).
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }

    /// Current readiness.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    /// Router serving `GET /healthz` and `GET /readyz`.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/healthz", get(healthz))
            .route("/readyz", get(readyz))
            .layer(TraceLayer::new_for_http())
            .with_state(self.clone())
    }
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

async fn readyz(State(probes): State<Probes>) -> (StatusCode, &'static str) {
    if probes.is_ready() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "controllers not running")
    }
}

/// Serve `router` over plain HTTP until the task is cancelled.
pub async fn serve(addr: &str, router: Router, what: &str) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("{} listening on {}", what, addr);
    axum::serve(listener, router).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_readyz_follows_flag() {
        let probes = Probes::new();
        let (status, _) = readyz(State(probes.clone())).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        probes.set_ready(true);
        let (status, _) = readyz(State(probes.clone())).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_healthz_always_ok() {
        assert_eq!(healthz().await.0, StatusCode::OK);
    }
}
