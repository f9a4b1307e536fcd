//! Unit tests for reconcile_helpers module

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::error::ControllerError;
    use crate::reconcile_helpers::*;
    use crate::reconciler::ism_policy::IsmPolicySync;
    use crate::reconciler::tenant::TenantSync;
    use crate::reconciler::user::UserSync;
    use crate::test_utils::*;
    use crds::{K8S_UID_ATTRIBUTE, ManagedResourceStatus, ResourceState};
    use opensearch_client::{InternalUser, MockOpenSearchClient, Tenant};
    use serde_json::json;

    const CLUSTER_UID: &str = "uid-logs";

    /// Records status writes, optionally failing them.
    #[derive(Default)]
    struct StatusLog {
        written: Mutex<Vec<ManagedResourceStatus>>,
        fail: bool,
    }

    impl StatusLog {
        fn failing() -> Self {
            Self {
                written: Mutex::default(),
                fail: true,
            }
        }

        fn written(&self) -> Vec<ManagedResourceStatus> {
            self.written.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StatusWriter for StatusLog {
        async fn write(&self, status: &ManagedResourceStatus) -> Result<(), ControllerError> {
            if self.fail {
                return Err(ControllerError::InvalidConfig("status write rejected".to_string()));
            }
            self.written.lock().unwrap().push(status.clone());
            Ok(())
        }
    }

    fn mock() -> MockOpenSearchClient {
        MockOpenSearchClient::new("https://logs.search.svc:9200")
    }

    fn tenant_sync(description: &str) -> TenantSync {
        TenantSync {
            name: "analytics".to_string(),
            tenant: Tenant {
                description: Some(description.to_string()),
            },
        }
    }

    fn user_sync() -> UserSync {
        UserSync::from_resource(&create_test_user("alice", "logs"), "s3cret".to_string())
    }

    #[test]
    fn test_decide_without_status() {
        assert_eq!(decide(None, CLUSTER_UID, RemoteState::Absent), Decision::Create);
        assert_eq!(decide(None, CLUSTER_UID, RemoteState::Foreign), Decision::Ignore);
        assert_eq!(decide(None, CLUSTER_UID, RemoteState::Owned), Decision::Update);
    }

    #[test]
    fn test_decide_with_created_status() {
        let status = created_status(CLUSTER_UID, "analytics");
        assert_eq!(decide(Some(&status), CLUSTER_UID, RemoteState::Foreign), Decision::Update);
        // Deleted out-of-band
        assert_eq!(decide(Some(&status), CLUSTER_UID, RemoteState::Absent), Decision::Create);
        assert_eq!(
            decide(Some(&status), "uid-other", RemoteState::Absent),
            Decision::ClusterMismatch
        );
    }

    #[test]
    fn test_decide_keeps_existing_objects_ignored() {
        let status = ignored_status(CLUSTER_UID, "analytics", REASON_EXISTING);
        assert_eq!(decide(Some(&status), CLUSTER_UID, RemoteState::Absent), Decision::Ignore);
        assert_eq!(decide_from_status(Some(&status), CLUSTER_UID), Some(Decision::Ignore));
    }

    #[tokio::test]
    async fn test_sync_creates_absent_object() {
        let client = mock();
        let status = sync_remote(&client, &tenant_sync("team space"), None, CLUSTER_UID, &StatusLog::default())
            .await
            .unwrap();

        assert_eq!(status.state, ResourceState::Created);
        assert_eq!(status.managed_cluster.as_deref(), Some(CLUSTER_UID));
        assert!(!status.existing_object);
        assert_eq!(
            client.tenant("analytics").and_then(|t| t.description),
            Some("team space".to_string())
        );
    }

    #[tokio::test]
    async fn test_sync_ignores_pre_existing_object() {
        let client = mock();
        client.add_tenant(
            "analytics",
            Tenant {
                description: Some("hand made".to_string()),
            },
        );

        let status = sync_remote(&client, &tenant_sync("team space"), None, CLUSTER_UID, &StatusLog::default())
            .await
            .unwrap();

        assert_eq!(status.state, ResourceState::Ignored);
        assert!(status.existing_object);
        assert_eq!(status.managed_cluster.as_deref(), Some(CLUSTER_UID));
        assert!(client.journal().is_empty());
        assert_eq!(
            client.tenant("analytics").and_then(|t| t.description),
            Some("hand made".to_string())
        );
    }

    #[tokio::test]
    async fn test_ignored_resource_makes_no_remote_calls() {
        let client = mock();
        client.set_unavailable(true);
        let current = ignored_status(CLUSTER_UID, "analytics", REASON_EXISTING);

        let status = sync_remote(&client, &tenant_sync("team space"), Some(&current), CLUSTER_UID, &StatusLog::default())
            .await
            .unwrap();

        assert_eq!(status, current);
    }

    #[tokio::test]
    async fn test_cluster_mismatch_is_an_error_without_writes() {
        let client = mock();
        let current = created_status("uid-old", "analytics");

        let status = sync_remote(&client, &tenant_sync("team space"), Some(&current), CLUSTER_UID, &StatusLog::default())
            .await
            .unwrap();

        assert_eq!(status.state, ResourceState::Error);
        assert_eq!(status.reason.as_deref(), Some(REASON_CLUSTER_CHANGED));
        assert_eq!(status.managed_cluster.as_deref(), Some("uid-old"));
        assert!(client.journal().is_empty());
    }

    #[tokio::test]
    async fn test_managed_object_deleted_out_of_band_is_recreated() {
        let client = mock();
        let current = created_status(CLUSTER_UID, "analytics");

        let status = sync_remote(&client, &tenant_sync("team space"), Some(&current), CLUSTER_UID, &StatusLog::default())
            .await
            .unwrap();

        assert_eq!(status, current);
        let writes = client.writes_for("tenant");
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].op, "put");
    }

    #[tokio::test]
    async fn test_up_to_date_object_is_not_rewritten() {
        let client = mock();
        let sync = tenant_sync("team space");
        client.add_tenant("analytics", sync.tenant.clone());
        let current = created_status(CLUSTER_UID, "analytics");

        sync_remote(&client, &sync, Some(&current), CLUSTER_UID, &StatusLog::default()).await.unwrap();
        assert!(client.writes_for("tenant").is_empty());

        sync_remote(&client, &tenant_sync("renamed"), Some(&current), CLUSTER_UID, &StatusLog::default())
            .await
            .unwrap();
        assert_eq!(client.writes_for("tenant").len(), 1);
    }

    #[tokio::test]
    async fn test_gateway_failure_is_returned() {
        let client = mock();
        client.set_unavailable(true);

        let result = sync_remote(&client, &tenant_sync("team space"), None, CLUSTER_UID, &StatusLog::default()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_user_with_matching_uid_is_adopted() {
        let client = mock();
        let sync = user_sync();
        client.add_user("alice", sync.user.clone());

        let status = sync_remote(&client, &sync, None, CLUSTER_UID, &StatusLog::default()).await.unwrap();

        assert_eq!(status.state, ResourceState::Created);
        assert!(!status.existing_object);
        // Password and hash are never compared
        assert!(client.writes_for("user").is_empty());
    }

    #[tokio::test]
    async fn test_user_owned_by_other_resource_is_ignored() {
        let client = mock();
        let mut attributes = std::collections::BTreeMap::new();
        attributes.insert(K8S_UID_ATTRIBUTE.to_string(), "uid-someone-else".to_string());
        client.add_user(
            "alice",
            InternalUser {
                attributes,
                ..Default::default()
            },
        );
        let current = created_status(CLUSTER_UID, "alice");

        let status = sync_remote(&client, &user_sync(), Some(&current), CLUSTER_UID, &StatusLog::default())
            .await
            .unwrap();

        assert_eq!(status.state, ResourceState::Ignored);
        assert!(status.existing_object);
        assert!(client.writes_for("user").is_empty());
    }

    #[tokio::test]
    async fn test_ism_update_retries_once_on_conflict() {
        let client = mock();
        let sync = IsmPolicySync::from_resource(&create_test_ism_policy("logs-rollover", "logs"));
        client.add_ism_policy("logs-rollover", json!({"description": "old", "default_state": "hot"}));
        client.fail_ism_updates_with_conflict(1);
        let current = created_status(CLUSTER_UID, "logs-rollover");

        let status = sync_remote(&client, &sync, Some(&current), CLUSTER_UID, &StatusLog::default()).await.unwrap();

        assert_eq!(status.state, ResourceState::Created);
        let stored = client.ism_policy("logs-rollover").unwrap();
        assert_eq!(stored.policy, sync.policy);
        let updates: Vec<_> = client
            .writes_for("ism_policy")
            .into_iter()
            .filter(|w| w.op == "update")
            .collect();
        assert_eq!(updates.len(), 1);
    }

    #[tokio::test]
    async fn test_ism_update_gives_up_after_repeated_conflicts() {
        let client = mock();
        let sync = IsmPolicySync::from_resource(&create_test_ism_policy("logs-rollover", "logs"));
        client.add_ism_policy("logs-rollover", json!({"description": "old"}));
        client.fail_ism_updates_with_conflict(2);
        let current = created_status(CLUSTER_UID, "logs-rollover");

        let result = sync_remote(&client, &sync, Some(&current), CLUSTER_UID, &StatusLog::default()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_ism_policy_with_server_fields_is_up_to_date() {
        let client = mock();
        let sync = IsmPolicySync::from_resource(&create_test_ism_policy("logs-rollover", "logs"));
        let mut stored = sync.policy.clone();
        stored["policy_id"] = json!("logs-rollover");
        stored["last_updated_time"] = json!(1718000000000_i64);
        stored["schema_version"] = json!(19);
        client.add_ism_policy("logs-rollover", stored);
        let current = created_status(CLUSTER_UID, "logs-rollover");

        sync_remote(&client, &sync, Some(&current), CLUSTER_UID, &StatusLog::default()).await.unwrap();
        assert!(client.writes_for("ism_policy").is_empty());
    }

    #[tokio::test]
    async fn test_ownership_is_written_before_create() {
        let client = mock();
        let log = StatusLog::default();

        sync_remote(&client, &tenant_sync("team space"), None, CLUSTER_UID, &log)
            .await
            .unwrap();

        assert_eq!(log.written(), vec![claimed_status(CLUSTER_UID, "analytics")]);
        assert!(client.tenant("analytics").is_some());
    }

    #[tokio::test]
    async fn test_failed_ownership_write_creates_nothing() {
        let client = mock();

        let result = sync_remote(&client, &tenant_sync("team space"), None, CLUSTER_UID, &StatusLog::failing()).await;

        assert!(result.is_err());
        assert!(client.tenant("analytics").is_none());
    }

    #[tokio::test]
    async fn test_created_object_stays_managed_when_final_status_is_lost() {
        let client = mock();
        let sync = tenant_sync("team space");
        let log = StatusLog::default();

        // First pass: only the ownership write lands, the final status is dropped
        sync_remote(&client, &sync, None, CLUSTER_UID, &log).await.unwrap();
        let persisted = log.written().pop().unwrap();

        let status = sync_remote(&client, &sync, Some(&persisted), CLUSTER_UID, &log)
            .await
            .unwrap();

        assert_eq!(status.state, ResourceState::Created);
        assert!(!status.existing_object);
        assert_eq!(log.written().len(), 1);
        assert!(owns_remote(Some(&persisted), CLUSTER_UID));
        assert!(delete_remote(&client, &sync, Some(&status), CLUSTER_UID).await.unwrap());
        assert!(client.tenant("analytics").is_none());
    }

    #[tokio::test]
    async fn test_recreate_after_out_of_band_delete_needs_no_claim() {
        let client = mock();
        let log = StatusLog::failing();
        let current = created_status(CLUSTER_UID, "analytics");

        let status = sync_remote(&client, &tenant_sync("team space"), Some(&current), CLUSTER_UID, &log)
            .await
            .unwrap();

        assert_eq!(status, current);
    }

    #[tokio::test]
    async fn test_delete_only_owned_objects() {
        let client = mock();
        let sync = tenant_sync("team space");
        client.add_tenant("analytics", sync.tenant.clone());

        let ignored = ignored_status(CLUSTER_UID, "analytics", REASON_EXISTING);
        assert!(!delete_remote(&client, &sync, Some(&ignored), CLUSTER_UID).await.unwrap());
        let foreign_cluster = created_status("uid-old", "analytics");
        assert!(!delete_remote(&client, &sync, Some(&foreign_cluster), CLUSTER_UID).await.unwrap());
        assert!(!delete_remote(&client, &sync, None, CLUSTER_UID).await.unwrap());
        assert!(client.writes_for("tenant").is_empty());

        let created = created_status(CLUSTER_UID, "analytics");
        assert!(delete_remote(&client, &sync, Some(&created), CLUSTER_UID).await.unwrap());
        assert!(client.tenant("analytics").is_none());
    }

    #[test]
    fn test_error_status_keeps_ownership() {
        let created = created_status(CLUSTER_UID, "analytics");
        let status = error_status(Some(&created), "boom");
        assert_eq!(status.state, ResourceState::Error);
        assert_eq!(status.reason.as_deref(), Some("boom"));
        assert_eq!(status.managed_cluster.as_deref(), Some(CLUSTER_UID));

        let pending = pending_status(None, "waiting");
        assert_eq!(pending.state, ResourceState::Pending);
        assert!(pending.managed_cluster.is_none());
    }

    #[test]
    fn test_status_patch_clears_stale_reason() {
        let patch = status_patch(&created_status(CLUSTER_UID, "analytics"));
        assert_eq!(patch["status"]["state"], "CREATED");
        assert!(patch["status"]["reason"].is_null());
        assert!(patch["status"].as_object().is_some_and(|s| s.contains_key("reason")));
        assert_eq!(patch["status"]["managedCluster"], CLUSTER_UID);
    }

    #[test]
    fn test_status_needs_update() {
        let status = created_status(CLUSTER_UID, "analytics");
        assert!(status_needs_update(None, &status));
        assert!(!status_needs_update(Some(&status), &status));
        let other = ManagedResourceStatus {
            reason: Some("changed".to_string()),
            ..status.clone()
        };
        assert!(status_needs_update(Some(&other), &status));
    }

    #[test]
    fn test_json_contains() {
        let stored = json!({
            "index_patterns": ["logs-*"],
            "template": {"settings": {"index": {"number_of_shards": "2", "uuid": "x"}}},
            "priority": 100.0
        });
        assert!(json_contains(
            &stored,
            &json!({"template": {"settings": {"index": {"number_of_shards": 2}}}, "priority": 100})
        ));
        assert!(!json_contains(&stored, &json!({"index_patterns": ["logs-*", "metrics-*"]})));
        assert!(!json_contains(&stored, &json!({"template": {"mappings": {"dynamic": false}}})));
        assert!(json_contains(&stored, &json!({"composed_of": null})));
    }

    #[test]
    fn test_without_null_fields_is_shallow() {
        let body = without_null_fields(json!({"a": null, "b": {"delete": {}}, "c": {"d": null}}));
        assert_eq!(body, json!({"b": {"delete": {}}, "c": {"d": null}}));
    }
}
