//! Child objects derived from an `OpenSearchCluster`.
//!
//! Everything here is a pure function of the cluster declaration (plus the
//! image and replica count the coordinators chose for each pool), so the
//! desired state can be unit tested without an API server.

use std::collections::BTreeMap;

use crds::{
    CLUSTER_LABEL, DASHBOARDS_PORT, NODE_POOL_LABEL, NodePool, NodeResources, OpenSearchCluster, TRANSPORT_PORT,
};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, EmptyDirVolumeSource, EnvVar, EnvVarSource,
    ObjectFieldSelector, PersistentVolumeClaim, PersistentVolumeClaimSpec, PodSecurityContext, PodSpec,
    PodTemplateSpec, Probe, ResourceRequirements, SecretVolumeSource, Service, ServicePort, ServiceSpec,
    TCPSocketAction, Volume, VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{Resource, ResourceExt};

use super::tls::{TlsLayer, tls_secret_name};

/// Label set on pods of pools carrying the cluster manager role
pub const CLUSTER_MANAGER_LABEL: &str = "opster.io/opensearch-cluster-manager";

/// Label carrying the dashboards deployment name
pub const DASHBOARDS_LABEL: &str = "opster.io/opensearch-dashboards";

const CONFIG_DIR: &str = "/usr/share/opensearch/config";
const DATA_DIR: &str = "/usr/share/opensearch/data";
const SECURITY_CONFIG_DIR: &str = "/usr/share/opensearch/config/opensearch-security";
const CONFIG_FILE: &str = "opensearch.yml";
const DEFAULT_DISK_SIZE: &str = "30Gi";
const DEFAULT_JVM: &str = "-Xmx512M -Xms512M";
const DATA_VOLUME: &str = "data";
const CONFIG_VOLUME: &str = "config";

/// Labels carried by every child of the cluster.
pub fn cluster_labels(cluster: &OpenSearchCluster) -> BTreeMap<String, String> {
    BTreeMap::from([(CLUSTER_LABEL.to_string(), cluster.name_any())])
}

/// Labels selecting the pods of one node pool.
pub fn pool_selector(cluster: &OpenSearchCluster, pool: &NodePool) -> BTreeMap<String, String> {
    let mut labels = cluster_labels(cluster);
    labels.insert(NODE_POOL_LABEL.to_string(), pool.component.clone());
    labels
}

/// Metadata of a child object: namespace, cluster label and controller owner reference.
fn child_meta(cluster: &OpenSearchCluster, name: String, labels: BTreeMap<String, String>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: cluster.namespace(),
        labels: Some(labels),
        owner_references: cluster.controller_owner_ref(&()).map(|r| vec![r]),
        ..Default::default()
    }
}

/// Name of the stateful set backing `pool`.
pub fn stateful_set_name(cluster: &OpenSearchCluster, pool: &str) -> String {
    format!("{}-{}", cluster.name_any(), pool)
}

/// Name of the pod with `ordinal` in `pool`; also its OpenSearch node name.
pub fn pod_name(cluster: &OpenSearchCluster, pool: &str, ordinal: i32) -> String {
    format!("{}-{}", stateful_set_name(cluster, pool), ordinal)
}

/// Name of the headless service used for discovery.
pub fn discovery_service_name(cluster: &OpenSearchCluster) -> String {
    format!("{}-discovery", cluster.name_any())
}

/// Name of the config map holding `opensearch.yml`.
pub fn config_map_name(cluster: &OpenSearchCluster) -> String {
    format!("{}-config", cluster.name_any())
}

/// Name of the dashboards deployment and service.
pub fn dashboards_name(cluster: &OpenSearchCluster) -> String {
    format!("{}-dashboards", cluster.name_any())
}

fn service_port(name: &str, port: i32) -> ServicePort {
    ServicePort {
        name: Some(name.to_string()),
        port,
        target_port: Some(IntOrString::Int(port)),
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}

/// Client service exposing HTTP and transport on every node.
pub fn client_service(cluster: &OpenSearchCluster) -> Service {
    Service {
        metadata: child_meta(cluster, cluster.spec.general.service_name.clone(), cluster_labels(cluster)),
        spec: Some(ServiceSpec {
            selector: Some(cluster_labels(cluster)),
            ports: Some(vec![
                service_port("http", cluster.http_port()),
                service_port("transport", TRANSPORT_PORT),
            ]),
            type_: Some("ClusterIP".to_string()),
            ..Default::default()
        }),
        status: None,
    }
}

/// Headless service resolving to the cluster manager eligible pods.
pub fn discovery_service(cluster: &OpenSearchCluster) -> Service {
    let mut selector = cluster_labels(cluster);
    selector.insert(CLUSTER_MANAGER_LABEL.to_string(), "true".to_string());
    Service {
        metadata: child_meta(cluster, discovery_service_name(cluster), cluster_labels(cluster)),
        spec: Some(ServiceSpec {
            cluster_ip: Some("None".to_string()),
            selector: Some(selector),
            ports: Some(vec![service_port("transport", TRANSPORT_PORT)]),
            // Nodes must find each other before they are ready
            publish_not_ready_addresses: Some(true),
            ..Default::default()
        }),
        status: None,
    }
}

/// Headless service governing the pods of one pool.
pub fn pool_service(cluster: &OpenSearchCluster, pool: &NodePool) -> Service {
    Service {
        metadata: child_meta(cluster, stateful_set_name(cluster, &pool.component), pool_selector(cluster, pool)),
        spec: Some(ServiceSpec {
            cluster_ip: Some("None".to_string()),
            selector: Some(pool_selector(cluster, pool)),
            ports: Some(vec![
                service_port("http", cluster.http_port()),
                service_port("transport", TRANSPORT_PORT),
            ]),
            publish_not_ready_addresses: Some(true),
            ..Default::default()
        }),
        status: None,
    }
}

/// Cluster wide `opensearch.yml` settings.
///
/// Node specific settings (name, roles, bootstrap nodes) are passed as
/// environment variables instead.
pub fn opensearch_settings(cluster: &OpenSearchCluster) -> BTreeMap<String, String> {
    let mut settings = BTreeMap::new();
    settings.insert("cluster.name".to_string(), cluster.opensearch_cluster_name());
    settings.insert("network.host".to_string(), "0.0.0.0".to_string());
    settings.insert("http.port".to_string(), cluster.http_port().to_string());

    match tls_secret_name(cluster, TlsLayer::Transport) {
        Some(_) => {
            let dir = TlsLayer::Transport.mount_dir();
            settings.insert(
                "plugins.security.ssl.transport.pemcert_filepath".to_string(),
                format!("{dir}/tls.crt"),
            );
            settings.insert(
                "plugins.security.ssl.transport.pemkey_filepath".to_string(),
                format!("{dir}/tls.key"),
            );
            settings.insert(
                "plugins.security.ssl.transport.pemtrustedcas_filepath".to_string(),
                format!("{dir}/ca.crt"),
            );
            settings.insert(
                "plugins.security.ssl.transport.enforce_hostname_verification".to_string(),
                "false".to_string(),
            );
            settings.insert(
                "plugins.security.nodes_dn".to_string(),
                format!("[\"CN={}\"]", cluster.opensearch_cluster_name()),
            );
            settings.insert(
                "plugins.security.allow_default_init_securityindex".to_string(),
                "true".to_string(),
            );
        }
        None => {
            settings.insert("plugins.security.disabled".to_string(), "true".to_string());
        }
    }

    match tls_secret_name(cluster, TlsLayer::Http) {
        Some(_) => {
            let dir = TlsLayer::Http.mount_dir();
            settings.insert("plugins.security.ssl.http.enabled".to_string(), "true".to_string());
            settings.insert("plugins.security.ssl.http.pemcert_filepath".to_string(), format!("{dir}/tls.crt"));
            settings.insert("plugins.security.ssl.http.pemkey_filepath".to_string(), format!("{dir}/tls.key"));
            settings.insert(
                "plugins.security.ssl.http.pemtrustedcas_filepath".to_string(),
                format!("{dir}/ca.crt"),
            );
        }
        None => {
            settings.insert("plugins.security.ssl.http.enabled".to_string(), "false".to_string());
        }
    }

    // User supplied settings win
    for (key, value) in &cluster.spec.general.additional_config {
        settings.insert(key.clone(), value.clone());
    }
    settings
}

/// Render settings as `key: value` lines.
pub fn render_settings(settings: &BTreeMap<String, String>) -> String {
    settings
        .iter()
        .map(|(k, v)| format!("{k}: {v}\n"))
        .collect()
}

/// Config map holding `opensearch.yml`.
pub fn config_map(cluster: &OpenSearchCluster) -> ConfigMap {
    ConfigMap {
        metadata: child_meta(cluster, config_map_name(cluster), cluster_labels(cluster)),
        data: Some(BTreeMap::from([(
            CONFIG_FILE.to_string(),
            render_settings(&opensearch_settings(cluster)),
        )])),
        ..Default::default()
    }
}

/// Pod names of every cluster manager eligible node, used to bootstrap the cluster.
pub fn initial_cluster_managers(cluster: &OpenSearchCluster) -> Vec<String> {
    cluster
        .spec
        .node_pools
        .iter()
        .filter(|p| p.is_master())
        .flat_map(|p| (0..p.replicas).map(move |i| pod_name(cluster, &p.component, i)))
        .collect()
}

fn quantities(values: &BTreeMap<String, String>) -> Option<BTreeMap<String, Quantity>> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().map(|(k, v)| (k.clone(), Quantity(v.clone()))).collect())
}

fn resource_requirements(resources: Option<&NodeResources>) -> Option<ResourceRequirements> {
    let resources = resources?;
    Some(ResourceRequirements {
        requests: quantities(&resources.requests),
        limits: quantities(&resources.limits),
        ..Default::default()
    })
}

fn env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..Default::default()
    }
}

fn node_env(cluster: &OpenSearchCluster, pool: &NodePool) -> Vec<EnvVar> {
    let mut vars = vec![
        EnvVar {
            name: "node.name".to_string(),
            value_from: Some(EnvVarSource {
                field_ref: Some(ObjectFieldSelector {
                    field_path: "metadata.name".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        },
        env("node.roles", pool.roles.join(",")),
        env("discovery.seed_hosts", discovery_service_name(cluster)),
        env(
            "OPENSEARCH_JAVA_OPTS",
            pool.jvm.clone().filter(|j| !j.is_empty()).unwrap_or_else(|| DEFAULT_JVM.to_string()),
        ),
        env("DISABLE_INSTALL_DEMO_CONFIG", "true"),
    ];
    // Only electable nodes take part in bootstrapping, so other pools keep a
    // template that does not follow the cluster manager replica count
    if pool.is_master() {
        vars.push(env(
            "cluster.initial_cluster_manager_nodes",
            initial_cluster_managers(cluster).join(","),
        ));
    }
    vars
}

fn volumes_and_mounts(cluster: &OpenSearchCluster, pool: &NodePool) -> (Vec<Volume>, Vec<VolumeMount>) {
    let mut volumes = vec![Volume {
        name: CONFIG_VOLUME.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: config_map_name(cluster).into(),
            ..Default::default()
        }),
        ..Default::default()
    }];
    let mut mounts = vec![
        VolumeMount {
            name: DATA_VOLUME.to_string(),
            mount_path: DATA_DIR.to_string(),
            ..Default::default()
        },
        VolumeMount {
            name: CONFIG_VOLUME.to_string(),
            mount_path: format!("{CONFIG_DIR}/{CONFIG_FILE}"),
            sub_path: Some(CONFIG_FILE.to_string()),
            ..Default::default()
        },
    ];

    if let Some(empty_dir) = pool.persistence.as_ref().and_then(|p| p.empty_dir.as_ref()) {
        volumes.push(Volume {
            name: DATA_VOLUME.to_string(),
            empty_dir: Some(EmptyDirVolumeSource {
                size_limit: empty_dir.size_limit.clone().map(Quantity),
                ..Default::default()
            }),
            ..Default::default()
        });
    }

    for layer in [TlsLayer::Transport, TlsLayer::Http] {
        if let Some(secret) = tls_secret_name(cluster, layer) {
            let name = layer.mount_dir().to_string();
            volumes.push(secret_volume(&name, &secret));
            mounts.push(VolumeMount {
                name: name.clone(),
                mount_path: format!("{CONFIG_DIR}/{name}"),
                read_only: Some(true),
                ..Default::default()
            });
        }
    }

    let security_config = cluster
        .spec
        .security
        .as_ref()
        .and_then(|s| s.config.as_ref())
        .and_then(|c| c.security_config_secret.as_ref())
        .filter(|s| !s.name.is_empty());
    if let Some(secret) = security_config {
        volumes.push(secret_volume("security-config", &secret.name));
        mounts.push(VolumeMount {
            name: "security-config".to_string(),
            mount_path: SECURITY_CONFIG_DIR.to_string(),
            read_only: Some(true),
            ..Default::default()
        });
    }

    (volumes, mounts)
}

fn secret_volume(name: &str, secret: &str) -> Volume {
    Volume {
        name: name.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(secret.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn volume_claim_templates(pool: &NodePool) -> Option<Vec<PersistentVolumeClaim>> {
    let persistence = pool.persistence.as_ref();
    if persistence.is_some_and(|p| p.empty_dir.is_some()) {
        return None;
    }
    let pvc = persistence.and_then(|p| p.pvc.as_ref());
    let access_modes = pvc
        .map(|p| p.access_modes.clone())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| vec!["ReadWriteOnce".to_string()]);
    let size = pool.disk_size.clone().filter(|s| !s.is_empty()).unwrap_or_else(|| DEFAULT_DISK_SIZE.to_string());

    Some(vec![PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(DATA_VOLUME.to_string()),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(access_modes),
            storage_class_name: pvc.and_then(|p| p.storage_class_name.clone()),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([("storage".to_string(), Quantity(size))])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        status: None,
    }])
}

/// Stateful set running one node pool.
pub fn stateful_set(cluster: &OpenSearchCluster, pool: &NodePool, image: &str, replicas: i32) -> StatefulSet {
    let selector = pool_selector(cluster, pool);
    let mut pod_labels = pool.labels.clone();
    pod_labels.extend(selector.clone());
    if pool.is_master() {
        pod_labels.insert(CLUSTER_MANAGER_LABEL.to_string(), "true".to_string());
    }

    let (volumes, mounts) = volumes_and_mounts(cluster, pool);
    let http_port = cluster.http_port();
    let container = Container {
        name: "opensearch".to_string(),
        image: Some(image.to_string()),
        image_pull_policy: cluster.spec.general.image_pull_policy.clone(),
        env: Some(node_env(cluster, pool)),
        ports: Some(vec![
            ContainerPort {
                name: Some("http".to_string()),
                container_port: http_port,
                ..Default::default()
            },
            ContainerPort {
                name: Some("transport".to_string()),
                container_port: TRANSPORT_PORT,
                ..Default::default()
            },
        ]),
        resources: resource_requirements(pool.resources.as_ref()),
        volume_mounts: Some(mounts),
        readiness_probe: Some(Probe {
            tcp_socket: Some(TCPSocketAction {
                port: IntOrString::Int(http_port),
                ..Default::default()
            }),
            initial_delay_seconds: Some(10),
            period_seconds: Some(5),
            ..Default::default()
        }),
        ..Default::default()
    };

    StatefulSet {
        metadata: child_meta(cluster, stateful_set_name(cluster, &pool.component), selector.clone()),
        spec: Some(StatefulSetSpec {
            replicas: Some(replicas),
            service_name: stateful_set_name(cluster, &pool.component).into(),
            selector: LabelSelector {
                match_labels: Some(selector),
                ..Default::default()
            },
            pod_management_policy: Some("Parallel".to_string()),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    volumes: Some(volumes),
                    node_selector: (!pool.node_selector.is_empty()).then(|| pool.node_selector.clone()),
                    service_account_name: cluster.spec.general.service_account.clone(),
                    security_context: Some(PodSecurityContext {
                        fs_group: Some(1000),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
            },
            volume_claim_templates: volume_claim_templates(pool),
            ..Default::default()
        }),
        status: None,
    }
}

/// Image of the first container of a stateful set's pod template.
pub fn stateful_set_image(sts: &StatefulSet) -> Option<&str> {
    sts.spec
        .as_ref()?
        .template
        .spec
        .as_ref()?
        .containers
        .first()?
        .image
        .as_deref()
}

fn dashboards_labels(cluster: &OpenSearchCluster) -> BTreeMap<String, String> {
    let mut labels = cluster_labels(cluster);
    labels.insert(DASHBOARDS_LABEL.to_string(), dashboards_name(cluster));
    labels
}

/// Dashboards deployment, when enabled.
pub fn dashboards_deployment(cluster: &OpenSearchCluster) -> Option<Deployment> {
    let dashboards = cluster.spec.dashboards.as_ref().filter(|d| d.enable)?;
    let labels = dashboards_labels(cluster);
    let namespace = cluster.namespace().unwrap_or_else(|| "default".to_string());
    let hosts = format!(
        "[\"{}://{}.{}.svc.cluster.local:{}\"]",
        cluster.http_scheme(),
        cluster.spec.general.service_name,
        namespace,
        cluster.http_port()
    );
    let mut env_vars = vec![env("OPENSEARCH_HOSTS", hosts)];
    if cluster.transport_tls().is_none() {
        env_vars.push(env("DISABLE_SECURITY_DASHBOARDS_PLUGIN", "true"));
    }

    Some(Deployment {
        metadata: child_meta(cluster, dashboards_name(cluster), labels.clone()),
        spec: Some(DeploymentSpec {
            replicas: Some(dashboards.replicas),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: "dashboards".to_string(),
                        image: Some(cluster.dashboards_image()),
                        env: Some(env_vars),
                        ports: Some(vec![ContainerPort {
                            name: Some("http".to_string()),
                            container_port: DASHBOARDS_PORT,
                            ..Default::default()
                        }]),
                        resources: resource_requirements(dashboards.resources.as_ref()),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    })
}

/// Dashboards service, when enabled.
pub fn dashboards_service(cluster: &OpenSearchCluster) -> Option<Service> {
    cluster.spec.dashboards.as_ref().filter(|d| d.enable)?;
    Some(Service {
        metadata: child_meta(cluster, dashboards_name(cluster), dashboards_labels(cluster)),
        spec: Some(ServiceSpec {
            selector: Some(dashboards_labels(cluster)),
            ports: Some(vec![service_port("http", DASHBOARDS_PORT)]),
            type_: Some("ClusterIP".to_string()),
            ..Default::default()
        }),
        status: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_cluster, create_test_pool};
    use crds::{DashboardsConfig, EmptyDirSource, PersistenceConfig, PvcSource};

    fn env_value<'a>(sts: &'a StatefulSet, name: &str) -> Option<&'a str> {
        sts.spec.as_ref()?.template.spec.as_ref()?.containers[0]
            .env
            .as_ref()?
            .iter()
            .find(|e| e.name == name)?
            .value
            .as_deref()
    }

    #[test]
    fn test_child_names() {
        let cluster = create_test_cluster("logs", "search", "2.19.4");
        assert_eq!(stateful_set_name(&cluster, "data"), "logs-data");
        assert_eq!(pod_name(&cluster, "data", 2), "logs-data-2");
        assert_eq!(discovery_service_name(&cluster), "logs-discovery");
        assert_eq!(config_map_name(&cluster), "logs-config");
    }

    #[test]
    fn test_initial_cluster_managers_lists_master_pods() {
        let cluster = create_test_cluster("logs", "search", "2.19.4");
        assert_eq!(
            initial_cluster_managers(&cluster),
            vec!["logs-masters-0", "logs-masters-1", "logs-masters-2"]
        );
    }

    #[test]
    fn test_stateful_set_carries_pool_settings() {
        let cluster = create_test_cluster("logs", "search", "2.19.4");
        let pool = &cluster.spec.node_pools[1];
        let sts = stateful_set(&cluster, pool, &cluster.image(), 3);

        assert_eq!(sts.metadata.name.as_deref(), Some("logs-data"));
        assert_eq!(sts.metadata.namespace.as_deref(), Some("search"));
        assert_eq!(stateful_set_image(&sts), Some("docker.io/opensearchproject/opensearch:2.19.4"));
        assert_eq!(env_value(&sts, "node.roles"), Some("data,ingest"));
        assert_eq!(env_value(&sts, "discovery.seed_hosts"), Some("logs-discovery"));
        assert_eq!(env_value(&sts, "OPENSEARCH_JAVA_OPTS"), Some(DEFAULT_JVM));

        let spec = sts.spec.unwrap();
        assert_eq!(spec.replicas, Some(3));
        let claims = spec.volume_claim_templates.unwrap();
        let storage = &claims[0].spec.as_ref().unwrap().resources.as_ref().unwrap().requests.as_ref().unwrap()
            ["storage"];
        assert_eq!(storage.0, "30Gi");

        let labels = spec.template.metadata.unwrap().labels.unwrap();
        assert_eq!(labels.get(NODE_POOL_LABEL).map(String::as_str), Some("data"));
        assert!(!labels.contains_key(CLUSTER_MANAGER_LABEL));
    }

    #[test]
    fn test_bootstrap_list_only_on_cluster_manager_pools() {
        let mut cluster = create_test_cluster("logs", "search", "2.19.4");
        let data_before = stateful_set(&cluster, &cluster.spec.node_pools[1], &cluster.image(), 3);
        let masters = stateful_set(&cluster, &cluster.spec.node_pools[0], &cluster.image(), 3);
        assert_eq!(
            env_value(&masters, "cluster.initial_cluster_manager_nodes"),
            Some("logs-masters-0,logs-masters-1,logs-masters-2")
        );
        assert_eq!(env_value(&data_before, "cluster.initial_cluster_manager_nodes"), None);

        cluster.spec.node_pools[0].replicas = 5;
        let data_after = stateful_set(&cluster, &cluster.spec.node_pools[1], &cluster.image(), 3);
        assert_eq!(data_after.spec, data_before.spec);
    }

    #[test]
    fn test_master_pods_are_selected_by_discovery() {
        let cluster = create_test_cluster("logs", "search", "2.19.4");
        let sts = stateful_set(&cluster, &cluster.spec.node_pools[0], &cluster.image(), 3);
        let labels = sts.spec.unwrap().template.metadata.unwrap().labels.unwrap();

        let service = discovery_service(&cluster);
        let selector = service.spec.as_ref().unwrap().selector.as_ref().unwrap();
        assert!(selector.iter().all(|(k, v)| labels.get(k) == Some(v)));
        assert_eq!(service.spec.unwrap().cluster_ip.as_deref(), Some("None"));
    }

    #[test]
    fn test_empty_dir_replaces_claim_template() {
        let cluster = create_test_cluster("logs", "search", "2.19.4");
        let mut pool = create_test_pool("scratch", 1, &["data"]);
        pool.persistence = Some(PersistenceConfig {
            pvc: None,
            empty_dir: Some(EmptyDirSource {
                size_limit: Some("5Gi".to_string()),
            }),
        });
        let sts = stateful_set(&cluster, &pool, "img", 1);
        let spec = sts.spec.unwrap();
        assert!(spec.volume_claim_templates.is_none());
        let volumes = spec.template.spec.unwrap().volumes.unwrap();
        assert!(volumes.iter().any(|v| v.name == DATA_VOLUME && v.empty_dir.is_some()));
    }

    #[test]
    fn test_storage_class_is_passed_through() {
        let cluster = create_test_cluster("logs", "search", "2.19.4");
        let mut pool = create_test_pool("data", 3, &["data"]);
        pool.persistence = Some(PersistenceConfig {
            pvc: Some(PvcSource {
                storage_class_name: Some("fast".to_string()),
                access_modes: vec![],
            }),
            empty_dir: None,
        });
        let claims = volume_claim_templates(&pool).unwrap();
        let spec = claims[0].spec.as_ref().unwrap();
        assert_eq!(spec.storage_class_name.as_deref(), Some("fast"));
        assert_eq!(spec.access_modes.as_deref(), Some(&["ReadWriteOnce".to_string()][..]));
    }

    #[test]
    fn test_settings_without_tls_disable_security() {
        let mut cluster = create_test_cluster("logs", "search", "2.19.4");
        cluster
            .spec
            .general
            .additional_config
            .insert("cluster.routing.allocation.awareness.attributes".to_string(), "zone".to_string());
        let settings = opensearch_settings(&cluster);
        assert_eq!(settings["cluster.name"], "logs");
        assert_eq!(settings["plugins.security.disabled"], "true");
        assert_eq!(settings["cluster.routing.allocation.awareness.attributes"], "zone");

        let rendered = render_settings(&settings);
        assert!(rendered.contains("cluster.name: logs\n"));
    }

    #[test]
    fn test_dashboards_only_when_enabled() {
        let mut cluster = create_test_cluster("logs", "search", "2.19.4");
        assert!(dashboards_deployment(&cluster).is_none());
        assert!(dashboards_service(&cluster).is_none());

        cluster.spec.dashboards = Some(DashboardsConfig {
            enable: true,
            replicas: 2,
            ..Default::default()
        });
        let deployment = dashboards_deployment(&cluster).unwrap();
        let spec = deployment.spec.unwrap();
        assert_eq!(spec.replicas, Some(2));
        let container = &spec.template.spec.unwrap().containers[0];
        assert_eq!(
            container.image.as_deref(),
            Some("docker.io/opensearchproject/opensearch-dashboards:2.19.4")
        );
        assert!(dashboards_service(&cluster).is_some());
    }
}
