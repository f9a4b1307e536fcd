//! HTTPS listener for the admission webhooks.
//!
//! The serving certificate is read once from `tls.crt` / `tls.key` in the
//! webhook certificate directory.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::Router;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use rustls::ServerConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tower::ServiceExt;
use tracing::{debug, info, warn};

use crate::error::ControllerError;

/// Serving certificate file name
pub const CERT_FILE: &str = "tls.crt";

/// Serving key file name
pub const KEY_FILE: &str = "tls.key";

/// Certificate and key paths inside `cert_dir`, when both exist.
pub fn serving_files(cert_dir: &Path) -> Option<(PathBuf, PathBuf)> {
    let cert = cert_dir.join(CERT_FILE);
    let key = cert_dir.join(KEY_FILE);
    (cert.is_file() && key.is_file()).then_some((cert, key))
}

/// Build the rustls acceptor from PEM files.
pub fn build_acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor, ControllerError> {
    let certs = load_certs(cert_path)?;
    let key = load_key(key_path)?;
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ControllerError::Certificate(format!("unsupported TLS versions: {e}")))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ControllerError::Certificate(format!("invalid webhook certificate: {e}")))?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ControllerError> {
    let file = File::open(path)
        .map_err(|e| ControllerError::Certificate(format!("failed to open {}: {e}", path.display())))?;
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<_, _>>()
        .map_err(|e| ControllerError::Certificate(format!("failed to parse {}: {e}", path.display())))?;
    if certs.is_empty() {
        return Err(ControllerError::Certificate(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, ControllerError> {
    let file = File::open(path)
        .map_err(|e| ControllerError::Certificate(format!("failed to open {}: {e}", path.display())))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| ControllerError::Certificate(format!("failed to parse {}: {e}", path.display())))?
        .ok_or_else(|| ControllerError::Certificate(format!("no private key found in {}", path.display())))
}

/// Serve `router` over TLS until the task is cancelled.
pub async fn serve(addr: &str, router: Router, acceptor: TlsAcceptor) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Admission webhooks listening on {}", addr);

    loop {
        let (stream, remote_addr) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Failed to accept webhook connection: {}", e);
                continue;
            }
        };
        let acceptor = acceptor.clone();
        let router = router.clone();

        tokio::spawn(async move {
            let tls = match acceptor.accept(stream).await {
                Ok(tls) => tls,
                Err(e) => {
                    debug!("TLS handshake with {} failed: {}", remote_addr, e);
                    return;
                }
            };
            let service = service_fn(move |req: Request<Incoming>| router.clone().oneshot(req));
            if let Err(e) = http1::Builder::new().serve_connection(TokioIo::new(tls), service).await {
                debug!("Webhook connection from {} closed: {}", remote_addr, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("opensearch-operator-{name}-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_serving_files_require_both() {
        let dir = temp_dir("webhook-missing");
        assert!(serving_files(&dir).is_none());

        File::create(dir.join(CERT_FILE)).unwrap();
        assert!(serving_files(&dir).is_none());

        File::create(dir.join(KEY_FILE)).unwrap();
        assert!(serving_files(&dir).is_some());
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_acceptor_from_generated_pair() {
        let key = rcgen::KeyPair::generate().unwrap();
        let cert = rcgen::CertificateParams::new(vec!["opensearch-operator-webhook.default.svc".to_string()])
            .unwrap()
            .self_signed(&key)
            .unwrap();

        let dir = temp_dir("webhook-certs");
        File::create(dir.join(CERT_FILE))
            .unwrap()
            .write_all(cert.pem().as_bytes())
            .unwrap();
        File::create(dir.join(KEY_FILE))
            .unwrap()
            .write_all(key.serialize_pem().as_bytes())
            .unwrap();

        let (cert_path, key_path) = serving_files(&dir).unwrap();
        assert!(build_acceptor(&cert_path, &key_path).is_ok());
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_empty_certificate_rejected() {
        let dir = temp_dir("webhook-empty");
        File::create(dir.join(CERT_FILE)).unwrap();
        File::create(dir.join(KEY_FILE)).unwrap();
        assert!(build_acceptor(&dir.join(CERT_FILE), &dir.join(KEY_FILE)).is_err());
        std::fs::remove_dir_all(dir).unwrap();
    }
}
