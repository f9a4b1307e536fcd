//! Snapshot repositories declared in `spec.general.snapshotRepositories`.

use opensearch_client::{OpenSearchClientTrait, OpenSearchError, SnapshotRepository};
use serde_json::Value;
use tracing::info;

/// Repository body as sent to `PUT /_snapshot/<name>`.
pub fn repository_body(repository: &crds::SnapshotRepository) -> SnapshotRepository {
    SnapshotRepository {
        type_: repository.type_.clone(),
        settings: repository
            .settings
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    }
}

/// Register every repository that is missing or differs. Returns how many were written.
pub async fn ensure_repositories(
    client: &dyn OpenSearchClientTrait,
    repositories: &[crds::SnapshotRepository],
) -> Result<usize, OpenSearchError> {
    let mut written = 0;
    for repository in repositories {
        let desired = repository_body(repository);
        let existing = client.get_snapshot_repository(&repository.name).await?;
        if existing.as_ref() == Some(&desired) {
            continue;
        }
        info!("Registering snapshot repository {} ({})", repository.name, repository.type_);
        client.put_snapshot_repository(&repository.name, &desired).await?;
        written += 1;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opensearch_client::MockOpenSearchClient;
    use std::collections::BTreeMap;

    fn s3(bucket: &str) -> crds::SnapshotRepository {
        crds::SnapshotRepository {
            name: "backups".to_string(),
            type_: "s3".to_string(),
            settings: BTreeMap::from([("bucket".to_string(), bucket.to_string())]),
        }
    }

    #[tokio::test]
    async fn test_repository_written_once() {
        let client = MockOpenSearchClient::new("http://localhost:9200");
        let repositories = vec![s3("logs-backups")];

        assert_eq!(ensure_repositories(&client, &repositories).await.unwrap(), 1);
        assert_eq!(client.repository("backups").unwrap().settings["bucket"], "logs-backups");

        assert_eq!(ensure_repositories(&client, &repositories).await.unwrap(), 0);
        assert_eq!(client.writes_for("snapshot_repository").len(), 1);
    }

    #[tokio::test]
    async fn test_changed_settings_are_rewritten() {
        let client = MockOpenSearchClient::new("http://localhost:9200");
        ensure_repositories(&client, &[s3("old")]).await.unwrap();
        assert_eq!(ensure_repositories(&client, &[s3("new")]).await.unwrap(), 1);
        assert_eq!(client.repository("backups").unwrap().settings["bucket"], "new");
    }
}
