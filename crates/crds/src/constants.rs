//! API groups, annotations, labels and finalizers shared by the operator.

/// API group served by this operator.
pub const API_GROUP: &str = "opensearch.org";

/// Deprecated API group kept for migration only.
pub const LEGACY_API_GROUP: &str = "opensearch.opster.io";

/// Version served in both groups.
pub const API_VERSION: &str = "v1";

/// Set on twin resources; value is the legacy `group/version`.
pub const MIGRATED_FROM_ANNOTATION: &str = "opensearch.org/migrated-from";

/// Set on legacy resources once their twin exists; value is the new `group/version`.
pub const MIGRATED_TO_ANNOTATION: &str = "opensearch.org/migrated-to";

/// Finalizer that quiesces the OpenSearch cluster before children are collected.
pub const CLUSTER_FINALIZER: &str = "opensearch.org/cluster-finalizer";

/// Finalizer that lets sub-resources remove their OpenSearch-side object.
pub const RESOURCE_FINALIZER: &str = "opensearch.org/resource-finalizer";

/// Finalizer on legacy resources that gates deletion behind twin existence.
pub const MIGRATION_FINALIZER: &str = "opensearch.org/migration";

/// Label carrying the owning cluster name on every child object.
pub const CLUSTER_LABEL: &str = "opster.io/opensearch-cluster";

/// Label carrying the node pool component on stateful sets and pods.
pub const NODE_POOL_LABEL: &str = "opster.io/opensearch-nodepool";

/// Field manager used for every write issued by the operator.
pub const FIELD_MANAGER: &str = "opensearch-operator";

/// Attribute stamped on OpenSearch internal users to record the owning CR uid.
pub const K8S_UID_ATTRIBUTE: &str = "k8s-uid";

/// Default OpenSearch image repository.
pub const DEFAULT_IMAGE_REPOSITORY: &str = "docker.io/opensearchproject/opensearch";

/// Default OpenSearch Dashboards image repository.
pub const DEFAULT_DASHBOARDS_IMAGE_REPOSITORY: &str =
    "docker.io/opensearchproject/opensearch-dashboards";

/// Default HTTP port of an OpenSearch node.
pub const DEFAULT_HTTP_PORT: i32 = 9200;

/// Transport port of an OpenSearch node.
pub const TRANSPORT_PORT: i32 = 9300;

/// Dashboards HTTP port.
pub const DASHBOARDS_PORT: i32 = 5601;
