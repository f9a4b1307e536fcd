//! Node certificates for the transport and HTTP layers.
//!
//! When a TLS profile asks for `generate`, a per-cluster CA is created once
//! and stored in `<cluster>-ca`; leaf certificates are signed by it and
//! stored in `<cluster>-transport-cert` / `<cluster>-http-cert`. Existing
//! secrets are never rewritten, so certificates stay stable across passes.

use std::collections::BTreeMap;

use crds::{CLUSTER_LABEL, OpenSearchCluster, TlsProfile};
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, ObjectMeta};
use kube::{Client, Resource, ResourceExt};
use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair};
use tracing::info;

use crate::error::ControllerError;
use crate::gateway::secret_value;
use crate::resource_reconciler::{DesiredState, ResourceReconciler};

/// Certificate key in TLS secrets
pub const CERT_KEY: &str = "tls.crt";

/// Private key key in TLS secrets
pub const PRIVATE_KEY_KEY: &str = "tls.key";

/// CA certificate key in TLS secrets
pub const CA_CERT_KEY: &str = "ca.crt";

/// CA private key key, only present in the CA secret
pub const CA_KEY_KEY: &str = "ca.key";

/// A PEM encoded certificate with its private key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PemPair {
    pub cert: String,
    pub key: String,
}

/// Issues certificates for generated TLS profiles.
pub trait CertificateAuthority: Send + Sync {
    /// Create a self-signed CA.
    fn create_ca(&self, common_name: &str) -> Result<PemPair, ControllerError>;

    /// Issue a leaf certificate signed by `ca`.
    fn issue(&self, ca: &PemPair, common_name: &str, sans: &[String]) -> Result<PemPair, ControllerError>;
}

/// [`CertificateAuthority`] backed by rcgen.
#[derive(Debug, Clone, Copy, Default)]
pub struct RcgenAuthority;

fn cert_error(e: rcgen::Error) -> ControllerError {
    ControllerError::Certificate(e.to_string())
}

impl CertificateAuthority for RcgenAuthority {
    fn create_ca(&self, common_name: &str) -> Result<PemPair, ControllerError> {
        let mut params = CertificateParams::new(Vec::<String>::new()).map_err(cert_error)?;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.distinguished_name.push(DnType::CommonName, common_name);
        let key = KeyPair::generate().map_err(cert_error)?;
        let cert = params.self_signed(&key).map_err(cert_error)?;
        Ok(PemPair {
            cert: cert.pem(),
            key: key.serialize_pem(),
        })
    }

    fn issue(&self, ca: &PemPair, common_name: &str, sans: &[String]) -> Result<PemPair, ControllerError> {
        let ca_key = KeyPair::from_pem(&ca.key).map_err(cert_error)?;
        // Re-sign the stored CA params with its own key to get an issuer handle
        let ca_params = CertificateParams::from_ca_cert_pem(&ca.cert).map_err(cert_error)?;
        let issuer = ca_params.self_signed(&ca_key).map_err(cert_error)?;

        let mut params = CertificateParams::new(sans.to_vec()).map_err(cert_error)?;
        params.distinguished_name.push(DnType::CommonName, common_name);
        let key = KeyPair::generate().map_err(cert_error)?;
        let cert = params.signed_by(&key, &issuer, &ca_key).map_err(cert_error)?;
        Ok(PemPair {
            cert: cert.pem(),
            key: key.serialize_pem(),
        })
    }
}

/// Which layer a certificate serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsLayer {
    Transport,
    Http,
}

impl TlsLayer {
    fn suffix(&self) -> &'static str {
        match self {
            TlsLayer::Transport => "transport",
            TlsLayer::Http => "http",
        }
    }

    /// Directory below the OpenSearch config dir the secret is mounted at.
    pub fn mount_dir(&self) -> &'static str {
        match self {
            TlsLayer::Transport => "tls-transport",
            TlsLayer::Http => "tls-http",
        }
    }

    fn profile<'a>(&self, cluster: &'a OpenSearchCluster) -> Option<&'a TlsProfile> {
        match self {
            TlsLayer::Transport => cluster.transport_tls(),
            TlsLayer::Http => cluster.http_tls(),
        }
    }
}

/// Name of the CA secret.
pub fn ca_secret_name(cluster: &OpenSearchCluster) -> String {
    format!("{}-ca", cluster.name_any())
}

/// Secret holding the certificate of `layer`, or None when the layer has no TLS.
pub fn tls_secret_name(cluster: &OpenSearchCluster, layer: TlsLayer) -> Option<String> {
    let profile = layer.profile(cluster)?;
    if profile.generates() {
        return Some(format!("{}-{}-cert", cluster.name_any(), layer.suffix()));
    }
    profile.secret_name().map(str::to_string)
}

/// DNS names covered by generated certificates.
pub fn subject_alt_names(cluster: &OpenSearchCluster) -> Vec<String> {
    let name = cluster.name_any();
    let namespace = cluster.namespace().unwrap_or_else(|| "default".to_string());
    let service = &cluster.spec.general.service_name;

    let mut sans = vec![
        name.clone(),
        service.clone(),
        format!("{service}.{namespace}"),
        format!("{service}.{namespace}.svc"),
        format!("{service}.{namespace}.svc.cluster.local"),
        format!("*.{name}-discovery.{namespace}.svc.cluster.local"),
    ];
    for pool in &cluster.spec.node_pools {
        sans.push(format!("*.{name}-{}.{namespace}.svc.cluster.local", pool.component));
    }
    sans.push("localhost".to_string());
    sans.dedup();
    sans
}

/// Secret object for a certificate.
pub fn tls_secret(cluster: &OpenSearchCluster, name: &str, data: BTreeMap<&str, &str>) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: cluster.namespace(),
            labels: Some(BTreeMap::from([(CLUSTER_LABEL.to_string(), cluster.name_any())])),
            owner_references: cluster.controller_owner_ref(&()).map(|r| vec![r]),
            ..Default::default()
        },
        type_: Some("Opaque".to_string()),
        data: Some(
            data.into_iter()
                .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
                .collect(),
        ),
        ..Default::default()
    }
}

/// Generate the CA and the leaf certificates that are missing.
///
/// Profiles referencing an existing secret are left alone.
pub async fn ensure_certificates(
    client: &Client,
    resources: &ResourceReconciler,
    authority: &dyn CertificateAuthority,
    cluster: &OpenSearchCluster,
) -> Result<(), ControllerError> {
    let layers: Vec<TlsLayer> = [TlsLayer::Transport, TlsLayer::Http]
        .into_iter()
        .filter(|l| l.profile(cluster).is_some_and(TlsProfile::generates))
        .collect();
    if layers.is_empty() {
        return Ok(());
    }

    let namespace = cluster.namespace().unwrap_or_else(|| "default".to_string());
    let secrets: Api<Secret> = Api::namespaced(client.clone(), &namespace);
    let ca = load_or_create_ca(&secrets, resources, authority, cluster).await?;

    for layer in layers {
        let Some(name) = tls_secret_name(cluster, layer) else {
            continue;
        };
        if secrets.get_opt(&name).await?.is_some() {
            continue;
        }
        info!("Issuing {} certificate for cluster {}", layer.suffix(), cluster.name_any());
        let leaf = authority.issue(&ca, &cluster.opensearch_cluster_name(), &subject_alt_names(cluster))?;
        let secret = tls_secret(
            cluster,
            &name,
            BTreeMap::from([
                (CERT_KEY, leaf.cert.as_str()),
                (PRIVATE_KEY_KEY, leaf.key.as_str()),
                (CA_CERT_KEY, ca.cert.as_str()),
            ]),
        );
        resources.reconcile(&secret, DesiredState::Created).await?;
    }
    Ok(())
}

async fn load_or_create_ca(
    secrets: &Api<Secret>,
    resources: &ResourceReconciler,
    authority: &dyn CertificateAuthority,
    cluster: &OpenSearchCluster,
) -> Result<PemPair, ControllerError> {
    let name = ca_secret_name(cluster);
    if let Some(existing) = secrets.get_opt(&name).await? {
        if let (Some(cert), Some(key)) = (secret_value(&existing, CA_CERT_KEY), secret_value(&existing, CA_KEY_KEY)) {
            return Ok(PemPair { cert, key });
        }
        return Err(ControllerError::InvalidConfig(format!(
            "secret {} lacks {} or {}",
            name, CA_CERT_KEY, CA_KEY_KEY
        )));
    }

    info!("Creating certificate authority for cluster {}", cluster.name_any());
    let ca = authority.create_ca(&format!("{}-ca", cluster.opensearch_cluster_name()))?;
    let secret = tls_secret(
        cluster,
        &name,
        BTreeMap::from([(CA_CERT_KEY, ca.cert.as_str()), (CA_KEY_KEY, ca.key.as_str())]),
    );
    resources.reconcile(&secret, DesiredState::Created).await?;
    Ok(ca)
}
