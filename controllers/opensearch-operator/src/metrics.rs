//! Prometheus metrics for the controllers.
//!
//! Metrics live in an operator-owned [`Registry`] and are served as text
//! on `GET /metrics` of the metrics bind address.

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use tower_http::trace::TraceLayer;

/// Reconcile counters, error counters and durations per controller.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    reconciliations: IntCounterVec,
    failures: IntCounterVec,
    duration: HistogramVec,
    leader: IntGauge,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create and register all metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("opensearch_operator".to_string()), None)?;

        let reconciliations = IntCounterVec::new(
            Opts::new("reconciliations_total", "Reconcile passes by controller and result"),
            &["controller", "result"],
        )?;
        let failures = IntCounterVec::new(
            Opts::new("reconcile_errors_total", "Reconcile errors by controller and error kind"),
            &["controller", "kind"],
        )?;
        let duration = HistogramVec::new(
            HistogramOpts::new("reconcile_duration_seconds", "Duration of a reconcile pass")
                .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["controller"],
        )?;
        let leader = IntGauge::new("leader", "1 while this instance holds the leader lease")?;

        registry.register(Box::new(reconciliations.clone()))?;
        registry.register(Box::new(failures.clone()))?;
        registry.register(Box::new(duration.clone()))?;
        registry.register(Box::new(leader.clone()))?;

        Ok(Self {
            registry,
            reconciliations,
            failures,
            duration,
            leader,
        })
    }

    /// Count a finished reconcile pass and record its duration.
    pub fn record_reconcile(&self, controller: &str, success: bool, seconds: f64) {
        let result = if success { "success" } else { "error" };
        self.reconciliations.with_label_values(&[controller, result]).inc();
        self.duration.with_label_values(&[controller]).observe(seconds);
    }

    /// Count a reconcile error by its kind.
    pub fn record_error(&self, controller: &str, kind: &str) {
        self.failures.with_label_values(&[controller, kind]).inc();
    }

    /// Update the leader gauge.
    pub fn set_leader(&self, is_leader: bool) {
        self.leader.set(i64::from(is_leader));
    }

    /// Prometheus text exposition of every registered metric.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    /// Router serving `GET /metrics`.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/metrics", get(serve_metrics))
            .layer(TraceLayer::new_for_http())
            .with_state(self.clone())
    }
}

async fn serve_metrics(State(metrics): State<Metrics>) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            format!("failed to encode metrics: {e}"),
        ),
    }
}
