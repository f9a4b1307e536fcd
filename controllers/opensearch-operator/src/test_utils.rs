//! Test utilities for unit testing reconcilers
//!
//! This module provides helpers for creating test data and setting up test scenarios.

#[cfg(test)]
use crds::*;
#[cfg(test)]
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Helper to create a node pool
#[cfg(test)]
pub fn create_test_pool(component: &str, replicas: i32, roles: &[&str]) -> NodePool {
    NodePool {
        component: component.to_string(),
        replicas,
        disk_size: Some("30Gi".to_string()),
        roles: roles.iter().map(|r| r.to_string()).collect(),
        ..Default::default()
    }
}

/// Helper to create a test OpenSearchCluster with 3 masters and 3 data nodes
#[cfg(test)]
pub fn create_test_cluster(name: &str, namespace: &str, version: &str) -> OpenSearchCluster {
    OpenSearchCluster {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some(format!("uid-{}", name)),
            generation: Some(1),
            ..Default::default()
        },
        spec: OpenSearchClusterSpec {
            general: GeneralConfig {
                version: version.to_string(),
                service_name: name.to_string(),
                ..Default::default()
            },
            node_pools: vec![
                create_test_pool("masters", 3, &["cluster_manager"]),
                create_test_pool("data", 3, &["data", "ingest"]),
            ],
            dashboards: None,
            security: None,
            conf_mgmt: None,
        },
        status: None,
    }
}

/// Helper to create a test OpensearchRole
#[cfg(test)]
pub fn create_test_role(name: &str, cluster: &str, cluster_permissions: &[&str]) -> OpensearchRole {
    OpensearchRole {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: OpensearchRoleSpec {
            opensearch_cluster: OpenSearchClusterRef::with_namespace(cluster, "search"),
            cluster_permissions: cluster_permissions.iter().map(|p| p.to_string()).collect(),
            index_permissions: vec![],
            tenant_permissions: vec![],
        },
        status: None,
    }
}

/// Helper to create a test OpensearchUser
#[cfg(test)]
pub fn create_test_user(name: &str, cluster: &str) -> OpensearchUser {
    OpensearchUser {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            uid: Some(format!("uid-{}", name)),
            ..Default::default()
        },
        spec: OpensearchUserSpec {
            opensearch_cluster: OpenSearchClusterRef::with_namespace(cluster, "search"),
            password_from: SecretKeySelector {
                name: format!("{}-password", name),
                key: "password".to_string(),
                namespace: Some("search".to_string()),
            },
            opendistro_security_roles: vec!["readall".to_string()],
            backend_roles: vec![],
            attributes: Default::default(),
        },
        status: None,
    }
}

/// Helper to create a test OpenSearchISMPolicy
#[cfg(test)]
pub fn create_test_ism_policy(name: &str, cluster: &str) -> OpenSearchISMPolicy {
    OpenSearchISMPolicy {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("search".to_string()),
            ..Default::default()
        },
        spec: OpenSearchISMPolicySpec {
            opensearch_cluster: OpenSearchClusterRef::new(cluster),
            policy_id: None,
            description: Some("rollover logs".to_string()),
            default_state: "hot".to_string(),
            states: vec![
                IsmState {
                    name: "hot".to_string(),
                    actions: vec![serde_json::json!({"rollover": {"min_size": "50gb"}})],
                    transitions: vec![IsmTransition {
                        state_name: "delete".to_string(),
                        conditions: Some(serde_json::json!({"min_index_age": "30d"})),
                    }],
                },
                IsmState {
                    name: "delete".to_string(),
                    actions: vec![serde_json::json!({"delete": {}})],
                    transitions: vec![],
                },
            ],
            ism_template: None,
            error_notification: None,
        },
        status: None,
    }
}
