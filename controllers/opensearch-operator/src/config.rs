//! Command line and environment configuration of the operator binary.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Environment variable switching to the human-readable development logger
pub const DEV_LOGGING_ENV: &str = "OPERATOR_DEV_LOGGING";

/// OpenSearch Kubernetes operator
#[derive(Parser, Debug, Clone)]
#[command(name = "opensearch-operator")]
#[command(version)]
#[command(about = "Manages OpenSearch clusters and their security, ISM, snapshot and template objects", long_about = None)]
pub struct Config {
    /// Address the Prometheus metrics endpoint binds to
    #[arg(long, env = "METRICS_BIND_ADDRESS", default_value = "0.0.0.0:8080")]
    pub metrics_bind_address: String,

    /// Address the liveness and readiness probes bind to
    #[arg(long, env = "HEALTH_PROBE_BIND_ADDRESS", default_value = "0.0.0.0:8081")]
    pub health_probe_bind_address: String,

    /// Only run controllers while holding the leader lease
    #[arg(long, env = "LEADER_ELECT", default_value_t = false)]
    pub leader_elect: bool,

    /// Namespace to watch (all namespaces when unset)
    #[arg(long, env = "WATCH_NAMESPACE")]
    pub watch_namespace: Option<String>,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", value_enum, default_value = "info")]
    pub loglevel: LogLevel,

    /// Address the admission webhook server binds to
    #[arg(long, env = "WEBHOOK_BIND_ADDRESS", default_value = "0.0.0.0:9443")]
    pub webhook_bind_address: String,

    /// Directory holding `tls.crt` and `tls.key` for the webhook server
    #[arg(long, env = "WEBHOOK_CERT_DIR", default_value = "/tmp/k8s-webhook-server/serving-certs")]
    pub webhook_cert_dir: PathBuf,

    /// Concurrent reconciles per controller
    #[arg(long, env = "MAX_CONCURRENT_RECONCILES", default_value_t = 3)]
    pub max_concurrent_reconciles: u16,

    /// Accept self-signed certificates from OpenSearch
    #[arg(
        long,
        env = "OPENSEARCH_INSECURE_TLS",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub insecure_skip_tls_verify: bool,

    /// Install or update the CRDs on startup
    #[arg(long, env = "INSTALL_CRDS", default_value_t = false)]
    pub install_crds: bool,

    /// Do not run the legacy API group migrator
    #[arg(long, env = "DISABLE_MIGRATION", default_value_t = false)]
    pub disable_migration: bool,
}

/// `--loglevel` values
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// Debug
    Debug,
    /// Info
    Info,
    /// Warnings
    Warn,
    /// Errors only
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

impl Config {
    /// True when `OPERATOR_DEV_LOGGING=true`.
    pub fn dev_logging() -> bool {
        std::env::var(DEV_LOGGING_ENV).is_ok_and(|v| v.eq_ignore_ascii_case("true"))
    }

    /// Default level directive; `RUST_LOG` still overrides it.
    pub fn default_level(&self, dev_logging: bool) -> LevelFilter {
        if dev_logging && self.loglevel == LogLevel::Info {
            LevelFilter::DEBUG
        } else {
            self.loglevel.into()
        }
    }

    /// Install the global tracing subscriber.
    ///
    /// JSON lines by default, the human-readable formatter in development mode.
    pub fn init_logging(&self) {
        let dev_logging = Self::dev_logging();
        let filter = EnvFilter::builder()
            .with_default_directive(self.default_level(dev_logging).into())
            .from_env_lossy();

        if dev_logging {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        } else {
            tracing_subscriber::fmt()
                .json()
                .with_current_span(false)
                .with_env_filter(filter)
                .init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::parse_from(["opensearch-operator"]);
        assert_eq!(config.metrics_bind_address, "0.0.0.0:8080");
        assert_eq!(config.health_probe_bind_address, "0.0.0.0:8081");
        assert!(!config.leader_elect);
        assert!(config.watch_namespace.is_none());
        assert_eq!(config.loglevel, LogLevel::Info);
        assert_eq!(config.max_concurrent_reconciles, 3);
        assert!(config.insecure_skip_tls_verify);
        assert!(!config.install_crds);
    }

    #[test]
    fn test_flags() {
        let config = Config::parse_from([
            "opensearch-operator",
            "--leader-elect",
            "--watch-namespace",
            "search",
            "--loglevel",
            "warn",
            "--insecure-skip-tls-verify",
            "false",
        ]);
        assert!(config.leader_elect);
        assert_eq!(config.watch_namespace.as_deref(), Some("search"));
        assert_eq!(config.default_level(false), LevelFilter::WARN);
        assert!(!config.insecure_skip_tls_verify);
    }

    #[test]
    fn test_dev_logging_lowers_default_level() {
        let config = Config::parse_from(["opensearch-operator"]);
        assert_eq!(config.default_level(true), LevelFilter::DEBUG);
        assert_eq!(config.default_level(false), LevelFilter::INFO);
    }
}
