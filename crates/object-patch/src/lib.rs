//! Object Patch Engine
//!
//! Decides whether a live Kubernetes object already matches its desired
//! state, and if not, which fields must change. Objects are handled as
//! `serde_json::Value` so the same engine serves typed workloads and
//! custom resources.
//!
//! # Example
//!
//! ```
//! use object_patch::{calculate_patch, set_original_configuration, PatchOptions};
//! use serde_json::json;
//!
//! # fn example() -> Result<(), object_patch::PatchError> {
//! let mut desired = json!({
//!     "apiVersion": "v1",
//!     "kind": "ConfigMap",
//!     "metadata": {"name": "logs-config"},
//!     "data": {"opensearch.yml": "cluster.name: logs"}
//! });
//! let current = json!({
//!     "apiVersion": "v1",
//!     "kind": "ConfigMap",
//!     "metadata": {"name": "logs-config", "uid": "1234", "resourceVersion": "7"},
//!     "data": {"opensearch.yml": "cluster.name: old"}
//! });
//!
//! let result = calculate_patch(&current, &desired, &PatchOptions::default())?;
//! assert!(!result.is_empty());
//!
//! // Record what is about to be applied
//! set_original_configuration(&mut desired)?;
//! # Ok(())
//! # }
//! ```

pub mod annotation;
pub mod diff;
pub mod error;
pub mod prune;

pub use annotation::{
    LAST_APPLIED_ANNOTATION, MAX_ANNOTATION_SIZE, get_original_configuration, set_original_configuration,
};
pub use diff::{PatchType, apply_patch, create_three_way_merge_patch, is_empty_patch};
pub use error::PatchError;
pub use prune::prune_nulls;

use serde_json::Value;
use tracing::warn;

/// Fields ignored while diffing
#[derive(Debug, Clone)]
pub struct PatchOptions {
    /// Ignore the `status` subtree
    pub ignore_status: bool,
    /// Ignore server-populated fields of `spec.volumeClaimTemplates[]`
    pub ignore_pvc_fields: bool,
}

impl Default for PatchOptions {
    fn default() -> Self {
        Self {
            ignore_status: true,
            ignore_pvc_fields: true,
        }
    }
}

/// Outcome of [`calculate_patch`]
#[derive(Debug, Clone)]
pub struct PatchResult {
    /// The patch that would turn the live object into the desired one
    pub patch: Value,
    /// Dialect the patch is expressed in
    pub patch_type: PatchType,
    /// Whether a last-applied configuration took part in the diff
    pub three_way: bool,
}

impl PatchResult {
    /// True when live and desired state are equivalent.
    pub fn is_empty(&self) -> bool {
        is_empty_patch(&self.patch)
    }
}

/// Compute the patch from `current` (live) to `modified` (desired).
///
/// The last applied configuration is read from `current`. When it is absent
/// or unreadable the diff is two-way and never deletes fields. The patch is
/// applied locally and diffed again so directives that change nothing
/// collapse to an empty patch.
pub fn calculate_patch(current: &Value, modified: &Value, options: &PatchOptions) -> Result<PatchResult, PatchError> {
    let original = match get_original_configuration(current) {
        Ok(original) => original,
        Err(e) => {
            warn!("Ignoring unreadable last-applied annotation: {}", e);
            None
        }
    };

    let patch_type = PatchType::for_value(modified);
    let current = normalize(current, options);
    let modified = normalize(modified, options);
    let original = original.map(|o| normalize(&o, options));

    let first = create_three_way_merge_patch(original.as_ref(), &modified, &current, patch_type);
    if is_empty_patch(&first) {
        return Ok(PatchResult {
            patch: first,
            patch_type,
            three_way: original.is_some(),
        });
    }

    let patched = apply_patch(&current, &first, patch_type);
    let patch = create_three_way_merge_patch(Some(&current), &patched, &current, patch_type);

    Ok(PatchResult {
        patch,
        patch_type,
        three_way: original.is_some(),
    })
}

/// Strip fields that must never show up as differences.
fn normalize(object: &Value, options: &PatchOptions) -> Value {
    let mut object = object.clone();
    annotation::remove_annotation(&mut object);

    if let Some(map) = object.as_object_mut() {
        if options.ignore_status {
            map.remove("status");
        }
        if options.ignore_pvc_fields {
            if let Some(templates) = map
                .get_mut("spec")
                .and_then(|s| s.get_mut("volumeClaimTemplates"))
                .and_then(Value::as_array_mut)
            {
                for template in templates.iter_mut().filter_map(Value::as_object_mut) {
                    template.remove("kind");
                    template.remove("apiVersion");
                    template.remove("status");
                }
            }
        }
    }

    prune_nulls(&mut object);
    object
}
