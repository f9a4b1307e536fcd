//! Integration tests for the OpenSearch admin client
//!
//! These tests require a running OpenSearch cluster with the security plugin.
//! Set OPENSEARCH_URL, OPENSEARCH_USERNAME and OPENSEARCH_PASSWORD to run.

use opensearch_client::{InternalUser, OpenSearchClient, OpenSearchClientTrait, StoredScript};

fn client() -> OpenSearchClient {
    let url = std::env::var("OPENSEARCH_URL").unwrap_or_else(|_| "https://localhost:9200".to_string());
    let username = std::env::var("OPENSEARCH_USERNAME").unwrap_or_else(|_| "admin".to_string());
    let password = std::env::var("OPENSEARCH_PASSWORD")
        .expect("OPENSEARCH_PASSWORD environment variable must be set");
    OpenSearchClient::new(url, username, password, true).expect("Failed to create client")
}

#[tokio::test]
#[ignore] // Requires running OpenSearch instance
async fn test_cluster_health() {
    let client = client();
    let health = client.health().await.expect("Failed to query health");
    println!("Cluster {} is {}", health.cluster_name, health.status.as_str());
}

#[tokio::test]
#[ignore]
async fn test_cat_nodes_and_settings() {
    let client = client();
    let nodes = client.cat_nodes().await.expect("Failed to list nodes");
    assert!(!nodes.is_empty());
    let settings = client.get_cluster_settings(true).await.expect("Failed to read settings");
    println!("Allocation: {}", settings.shard_allocation().as_str());
}

#[tokio::test]
#[ignore]
async fn test_user_lifecycle() {
    let client = client();
    let mut user = InternalUser {
        password: Some("Integration-Test-Passw0rd!".to_string()),
        backend_roles: vec!["readers".to_string()],
        ..Default::default()
    };
    user.attributes.insert("k8s-uid".to_string(), "integration".to_string());

    client.put_user("it-user", &user).await.expect("Failed to create user");
    let stored = client
        .get_user("it-user")
        .await
        .expect("Failed to read user")
        .expect("User should exist");
    assert_eq!(stored.backend_roles, vec!["readers".to_string()]);
    assert!(stored.password.is_none());

    client.delete_user("it-user").await.expect("Failed to delete user");
    assert!(client.get_user("it-user").await.expect("Failed to read user").is_none());
    // Deleting twice is not an error
    client.delete_user("it-user").await.expect("Second delete should succeed");
}

#[tokio::test]
#[ignore]
async fn test_ism_policy_version_conflict() {
    let client = client();
    let policy = serde_json::json!({
        "description": "integration",
        "default_state": "hot",
        "states": [{"name": "hot", "actions": [], "transitions": []}]
    });
    let _ = client.delete_ism_policy("it-policy").await;
    client.create_ism_policy("it-policy", &policy).await.expect("Failed to create policy");

    let current = client
        .get_ism_policy("it-policy")
        .await
        .expect("Failed to read policy")
        .expect("Policy should exist");
    let stale = client
        .update_ism_policy("it-policy", current.seq_no + 100, current.primary_term, &policy)
        .await;
    assert!(stale.is_err_and(|e| e.is_conflict()));

    client.delete_ism_policy("it-policy").await.expect("Failed to delete policy");
}

#[tokio::test]
#[ignore]
async fn test_search_template_round_trip() {
    let client = client();
    let script = StoredScript {
        lang: "mustache".to_string(),
        source: r#"{"query":{"match":{"message":"{{q}}"}}}"#.to_string(),
    };
    client.put_search_template("it-template", &script).await.expect("Failed to store template");
    assert!(client.get_search_template("it-template").await.expect("Failed to read").is_some());
    client.delete_search_template("it-template").await.expect("Failed to delete template");
}
