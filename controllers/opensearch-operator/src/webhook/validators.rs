//! Admission rules per kind.
//!
//! Every rule here is a pure function of the submitted object (and the old
//! object on update). The only check that needs the API server, cluster
//! reference existence, lives in [`super::cluster_exists`].

use std::collections::BTreeSet;

use crds::{
    NodePool, OpenSearchCluster, OpenSearchClusterRef, OpenSearchISMPolicy, OpensearchActionGroup,
    OpensearchComponentTemplate, OpensearchIndexTemplate, OpensearchRole, OpensearchSearchTemplate,
    OpensearchSnapshotPolicy, OpensearchTenant, OpensearchUser, OpensearchUserRoleBinding, TlsProfile,
};

/// A kind accepted by the validating webhook.
pub trait Validate {
    /// Cluster the object is applied to; `None` for the cluster itself.
    fn cluster_ref(&self) -> Option<&OpenSearchClusterRef>;

    /// Rules checked on create and update.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }

    /// Rules checked on update only, comparing against the stored object.
    fn validate_update(&self, old: &Self) -> Result<(), String> {
        cluster_ref_unchanged(old.cluster_ref(), self.cluster_ref())?;
        self.validate()
    }
}

/// Reject a change of the referenced cluster.
pub fn cluster_ref_unchanged(
    old: Option<&OpenSearchClusterRef>,
    new: Option<&OpenSearchClusterRef>,
) -> Result<(), String> {
    match (old, new) {
        (Some(old), Some(new)) if old.name != new.name || old.namespace != new.namespace => Err(format!(
            "cannot change the cluster a resource refers to (was {}, now {})",
            old.name, new.name
        )),
        _ => Ok(()),
    }
}

impl Validate for OpensearchUser {
    fn cluster_ref(&self) -> Option<&OpenSearchClusterRef> {
        Some(&self.spec.opensearch_cluster)
    }

    fn validate(&self) -> Result<(), String> {
        let password = &self.spec.password_from;
        if password.name.is_empty() || password.key.is_empty() {
            return Err("passwordFrom requires both name and key".to_string());
        }
        Ok(())
    }
}

impl Validate for OpensearchRole {
    fn cluster_ref(&self) -> Option<&OpenSearchClusterRef> {
        Some(&self.spec.opensearch_cluster)
    }

    fn validate(&self) -> Result<(), String> {
        let spec = &self.spec;
        if spec.cluster_permissions.is_empty() && spec.index_permissions.is_empty() && spec.tenant_permissions.is_empty()
        {
            return Err(
                "role must grant at least one of clusterPermissions, indexPermissions or tenantPermissions".to_string(),
            );
        }
        Ok(())
    }
}

impl Validate for OpensearchActionGroup {
    fn cluster_ref(&self) -> Option<&OpenSearchClusterRef> {
        Some(&self.spec.opensearch_cluster)
    }

    fn validate(&self) -> Result<(), String> {
        if self.spec.allowed_actions.is_empty() {
            return Err("action group must list at least one allowed action".to_string());
        }
        Ok(())
    }
}

impl Validate for OpensearchUserRoleBinding {
    fn cluster_ref(&self) -> Option<&OpenSearchClusterRef> {
        Some(&self.spec.opensearch_cluster)
    }

    fn validate(&self) -> Result<(), String> {
        let spec = &self.spec;
        if spec.roles.is_empty() {
            return Err("binding must reference at least one role".to_string());
        }
        if spec.users.is_empty() && spec.backend_roles.is_empty() {
            return Err("binding must name at least one user or backend role".to_string());
        }
        Ok(())
    }
}

impl Validate for OpensearchTenant {
    fn cluster_ref(&self) -> Option<&OpenSearchClusterRef> {
        Some(&self.spec.opensearch_cluster)
    }
}

impl Validate for OpenSearchISMPolicy {
    fn cluster_ref(&self) -> Option<&OpenSearchClusterRef> {
        Some(&self.spec.opensearch_cluster)
    }

    fn validate(&self) -> Result<(), String> {
        let spec = &self.spec;
        if spec.states.is_empty() {
            return Err("policy must define at least one state".to_string());
        }
        if spec.default_state.is_empty() {
            return Err("defaultState must be set".to_string());
        }
        if !spec.states.iter().any(|s| s.name == spec.default_state) {
            return Err(format!("defaultState {} is not one of the states", spec.default_state));
        }
        Ok(())
    }
}

impl Validate for OpensearchSnapshotPolicy {
    fn cluster_ref(&self) -> Option<&OpenSearchClusterRef> {
        Some(&self.spec.opensearch_cluster)
    }

    fn validate(&self) -> Result<(), String> {
        if self.spec.snapshot_config.repository.is_empty() {
            return Err("snapshotConfig.repository must be set".to_string());
        }
        Ok(())
    }
}

impl Validate for OpensearchIndexTemplate {
    fn cluster_ref(&self) -> Option<&OpenSearchClusterRef> {
        Some(&self.spec.opensearch_cluster)
    }

    fn validate(&self) -> Result<(), String> {
        if self.spec.index_patterns.is_empty() {
            return Err("index template must list at least one index pattern".to_string());
        }
        Ok(())
    }
}

impl Validate for OpensearchComponentTemplate {
    fn cluster_ref(&self) -> Option<&OpenSearchClusterRef> {
        Some(&self.spec.opensearch_cluster)
    }
}

impl Validate for OpensearchSearchTemplate {
    fn cluster_ref(&self) -> Option<&OpenSearchClusterRef> {
        Some(&self.spec.opensearch_cluster)
    }
}

impl Validate for OpenSearchCluster {
    fn cluster_ref(&self) -> Option<&OpenSearchClusterRef> {
        None
    }

    fn validate(&self) -> Result<(), String> {
        let spec = &self.spec;
        if spec.node_pools.is_empty() {
            return Err("at least one node pool is required".to_string());
        }
        let mut seen = BTreeSet::new();
        for pool in &spec.node_pools {
            if !seen.insert(pool.component.as_str()) {
                return Err(format!("duplicate node pool component {}", pool.component));
            }
            if pool.replicas < 0 {
                return Err(format!("node pool {} has negative replicas", pool.component));
            }
        }
        if let Some(tls) = self.spec.security.as_ref().and_then(|s| s.tls.as_ref()) {
            tls_profile_coherent("transport", tls.transport.as_ref())?;
            tls_profile_coherent("http", tls.http.as_ref())?;
        }
        Ok(())
    }

    fn validate_update(&self, old: &Self) -> Result<(), String> {
        for pool in &self.spec.node_pools {
            let Some(previous) = old.spec.node_pools.iter().find(|p| p.component == pool.component) else {
                continue;
            };
            if storage_class(previous) != storage_class(pool) {
                return Err(format!(
                    "storageClassName of node pool {} cannot be changed",
                    pool.component
                ));
            }
        }
        self.validate()
    }
}

/// Enabled profiles need exactly one certificate source.
fn tls_profile_coherent(layer: &str, profile: Option<&TlsProfile>) -> Result<(), String> {
    let Some(profile) = profile.filter(|p| p.is_enabled()) else {
        return Ok(());
    };
    match (profile.generates(), profile.secret_name().is_some()) {
        (true, true) => Err(format!("{layer} TLS sets both generate and secret, choose one")),
        (false, false) => Err(format!("{layer} TLS requires generate=true or a secret")),
        _ => Ok(()),
    }
}

fn storage_class(pool: &NodePool) -> Option<&str> {
    pool.persistence
        .as_ref()
        .and_then(|p| p.pvc.as_ref())
        .and_then(|pvc| pvc.storage_class_name.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crds::{
        IsmState, LocalObjectReference, OpenSearchClusterSpec, OpenSearchISMPolicySpec, OpensearchRoleSpec,
        OpensearchUserRoleBindingSpec, PersistenceConfig, PvcSource, SecurityConfig, TlsConfig,
    };

    fn role(cluster_permissions: Vec<String>) -> OpensearchRole {
        OpensearchRole::new(
            "reader",
            OpensearchRoleSpec {
                opensearch_cluster: OpenSearchClusterRef::new("logs"),
                cluster_permissions,
                index_permissions: vec![],
                tenant_permissions: vec![],
            },
        )
    }

    fn cluster(pools: Vec<NodePool>, tls: Option<TlsConfig>) -> OpenSearchCluster {
        OpenSearchCluster::new(
            "logs",
            OpenSearchClusterSpec {
                general: Default::default(),
                node_pools: pools,
                dashboards: None,
                security: tls.map(|tls| SecurityConfig {
                    tls: Some(tls),
                    config: None,
                }),
                conf_mgmt: None,
            },
        )
    }

    fn pool(component: &str, storage_class: Option<&str>) -> NodePool {
        NodePool {
            component: component.to_string(),
            replicas: 3,
            roles: vec!["data".to_string()],
            persistence: Some(PersistenceConfig {
                pvc: Some(PvcSource {
                    storage_class_name: storage_class.map(str::to_string),
                    access_modes: vec![],
                }),
                empty_dir: None,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_role_needs_a_permission() {
        assert!(role(vec![]).validate().is_err());
        assert!(role(vec!["cluster_monitor".to_string()]).validate().is_ok());
    }

    #[test]
    fn test_cluster_ref_is_immutable() {
        let old = role(vec!["cluster_monitor".to_string()]);
        let mut new = old.clone();
        assert!(new.validate_update(&old).is_ok());

        new.spec.opensearch_cluster = OpenSearchClusterRef::new("metrics");
        let err = new.validate_update(&old).unwrap_err();
        assert!(err.contains("logs"));
    }

    #[test]
    fn test_binding_needs_role_and_subject() {
        let mut binding = OpensearchUserRoleBinding::new(
            "readers",
            OpensearchUserRoleBindingSpec {
                opensearch_cluster: OpenSearchClusterRef::new("logs"),
                roles: vec!["reader".to_string()],
                users: vec![],
                backend_roles: vec![],
            },
        );
        assert!(binding.validate().is_err());

        binding.spec.backend_roles = vec!["ops".to_string()];
        assert!(binding.validate().is_ok());

        binding.spec.roles.clear();
        assert!(binding.validate().is_err());
    }

    #[test]
    fn test_ism_default_state_must_exist() {
        let state = |name: &str| IsmState {
            name: name.to_string(),
            actions: vec![],
            transitions: vec![],
        };
        let mut policy = OpenSearchISMPolicy::new(
            "rollover",
            OpenSearchISMPolicySpec {
                opensearch_cluster: OpenSearchClusterRef::new("logs"),
                policy_id: None,
                description: None,
                default_state: "hot".to_string(),
                states: vec![state("warm")],
                ism_template: None,
                error_notification: None,
            },
        );
        assert!(policy.validate().unwrap_err().contains("hot"));

        policy.spec.states.push(state("hot"));
        assert!(policy.validate().is_ok());

        policy.spec.default_state.clear();
        assert!(policy.validate().is_err());

        policy.spec.states.clear();
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_tls_profile_requires_exactly_one_source() {
        let secret = Some(LocalObjectReference {
            name: "node-certs".to_string(),
        });
        let both = TlsConfig {
            transport: Some(TlsProfile {
                enabled: None,
                generate: Some(true),
                secret: secret.clone(),
            }),
            http: None,
        };
        assert!(cluster(vec![pool("nodes", None)], Some(both)).validate().is_err());

        let neither = TlsConfig {
            transport: None,
            http: Some(TlsProfile::default()),
        };
        assert!(cluster(vec![pool("nodes", None)], Some(neither)).validate().is_err());

        let disabled = TlsConfig {
            transport: None,
            http: Some(TlsProfile {
                enabled: Some(false),
                ..Default::default()
            }),
        };
        assert!(cluster(vec![pool("nodes", None)], Some(disabled)).validate().is_ok());

        let referenced = TlsConfig {
            transport: Some(TlsProfile {
                enabled: Some(true),
                generate: Some(false),
                secret,
            }),
            http: None,
        };
        assert!(cluster(vec![pool("nodes", None)], Some(referenced)).validate().is_ok());
    }

    #[test]
    fn test_cluster_pools_unique_and_present() {
        assert!(cluster(vec![], None).validate().is_err());
        assert!(cluster(vec![pool("nodes", None), pool("nodes", None)], None).validate().is_err());
    }

    #[test]
    fn test_storage_class_is_immutable() {
        let old = cluster(vec![pool("nodes", Some("fast"))], None);
        let changed = cluster(vec![pool("nodes", Some("slow"))], None);
        assert!(changed.validate_update(&old).unwrap_err().contains("nodes"));

        let added_pool = cluster(vec![pool("nodes", Some("fast")), pool("hot", Some("slow"))], None);
        assert!(added_pool.validate_update(&old).is_ok());
    }
}
