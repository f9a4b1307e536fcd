//! Builds admin gateway clients for an `OpenSearchCluster`.

use crds::OpenSearchCluster;
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client, ResourceExt};
use opensearch_client::OpenSearchClient;
use tracing::debug;

use crate::error::ControllerError;

/// Username used when no admin credentials secret is configured
pub const DEFAULT_ADMIN_USERNAME: &str = "admin";

/// Password used when no admin credentials secret is configured
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin";

/// In-cluster URL of the client service.
pub fn cluster_url(cluster: &OpenSearchCluster) -> String {
    let namespace = cluster.namespace().unwrap_or_else(|| "default".to_string());
    format!(
        "{}://{}.{}.svc.cluster.local:{}",
        cluster.http_scheme(),
        cluster.spec.general.service_name,
        namespace,
        cluster.http_port()
    )
}

/// Read one key of a secret as UTF-8.
pub async fn read_secret_key(
    client: &Client,
    namespace: &str,
    name: &str,
    key: &str,
) -> Result<String, ControllerError> {
    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
    let secret = secrets
        .get_opt(name)
        .await?
        .ok_or_else(|| ControllerError::InvalidConfig(format!("secret {}/{} not found", namespace, name)))?;
    secret_value(&secret, key)
        .ok_or_else(|| ControllerError::InvalidConfig(format!("secret {}/{} has no key {}", namespace, name, key)))
}

/// Value of `key` in `data` or `stringData`.
pub fn secret_value(secret: &Secret, key: &str) -> Option<String> {
    if let Some(bytes) = secret.data.as_ref().and_then(|d| d.get(key)) {
        return String::from_utf8(bytes.0.clone()).ok();
    }
    secret.string_data.as_ref().and_then(|d| d.get(key)).cloned()
}

/// Admin username and password for the cluster.
pub async fn admin_credentials(
    client: &Client,
    cluster: &OpenSearchCluster,
) -> Result<(String, String), ControllerError> {
    let secret = cluster
        .spec
        .security
        .as_ref()
        .and_then(|s| s.config.as_ref())
        .and_then(|c| c.admin_credentials_secret.as_ref())
        .filter(|s| !s.name.is_empty());

    let Some(secret) = secret else {
        return Ok((DEFAULT_ADMIN_USERNAME.to_string(), DEFAULT_ADMIN_PASSWORD.to_string()));
    };
    let namespace = cluster.namespace().unwrap_or_else(|| "default".to_string());
    let username = read_secret_key(client, &namespace, &secret.name, "username").await?;
    let password = read_secret_key(client, &namespace, &secret.name, "password").await?;
    Ok((username, password))
}

/// Open an admin client for `cluster`.
pub async fn connect(
    client: &Client,
    cluster: &OpenSearchCluster,
    accept_invalid_certs: bool,
) -> Result<OpenSearchClient, ControllerError> {
    let (username, password) = admin_credentials(client, cluster).await?;
    let url = cluster_url(cluster);
    debug!("Connecting to OpenSearch at {} as {}", url, username);
    Ok(OpenSearchClient::new(url, username, password, accept_invalid_certs)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_cluster;
    use k8s_openapi::ByteString;
    use std::collections::BTreeMap;

    #[test]
    fn test_cluster_url() {
        let cluster = create_test_cluster("logs", "search", "2.19.4");
        assert_eq!(cluster_url(&cluster), "http://logs.search.svc.cluster.local:9200");
    }

    #[test]
    fn test_secret_value_prefers_data() {
        let mut secret = Secret::default();
        assert!(secret_value(&secret, "password").is_none());

        secret.string_data = Some(BTreeMap::from([("password".to_string(), "plain".to_string())]));
        assert_eq!(secret_value(&secret, "password").as_deref(), Some("plain"));

        secret.data = Some(BTreeMap::from([(
            "password".to_string(),
            ByteString(b"from-data".to_vec()),
        )]));
        assert_eq!(secret_value(&secret, "password").as_deref(), Some("from-data"));
    }
}
