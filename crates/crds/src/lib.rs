//! OpenSearch Operator CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the OpenSearch operator.
//!
//! - `OpenSearchCluster`: the cluster declaration (node pools, dashboards, security)
//! - Security objects: users, roles, user-role bindings, tenants, action groups
//! - Index lifecycle and templates: ISM policies, snapshot policies,
//!   index/component templates and stored search templates
//!
//! Every sub-resource carries an [`OpenSearchClusterRef`] and a
//! [`ManagedResourceStatus`] so the controllers can drive them through the
//! same PENDING / CREATED / IGNORED / ERROR lifecycle.

pub mod cluster;
pub mod common;
pub mod constants;
pub mod ism_policy;
pub mod references;
pub mod schema;
pub mod search_template;
pub mod security;
pub mod snapshot_policy;
pub mod templates;

pub use cluster::*;
pub use common::*;
pub use constants::*;
pub use ism_policy::*;
pub use references::*;
pub use search_template::*;
pub use security::*;
pub use snapshot_policy::*;
pub use templates::*;

use kube::CustomResourceExt;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;

/// Every CRD served by the operator, in install order.
pub fn all_crds() -> Vec<CustomResourceDefinition> {
    vec![
        OpenSearchCluster::crd(),
        OpensearchUser::crd(),
        OpensearchRole::crd(),
        OpensearchUserRoleBinding::crd(),
        OpensearchTenant::crd(),
        OpensearchActionGroup::crd(),
        OpenSearchISMPolicy::crd(),
        OpensearchSnapshotPolicy::crd(),
        OpensearchIndexTemplate::crd(),
        OpensearchComponentTemplate::crd(),
        OpensearchSearchTemplate::crd(),
    ]
}
