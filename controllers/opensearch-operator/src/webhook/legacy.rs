//! Lockdown of the deprecated `opensearch.opster.io` API group.
//!
//! Legacy objects may still be deleted, and their metadata and status may
//! change (the migrator adds finalizers and syncs status), but nothing may
//! create them or edit their spec.

use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, Operation};
use serde_json::Value;

use crds::LEGACY_API_GROUP;

/// Decide a request for a legacy-group object.
pub fn review(request: &AdmissionRequest<DynamicObject>) -> Result<(), String> {
    match request.operation {
        Operation::Create => Err(format!(
            "the {LEGACY_API_GROUP} API group is deprecated, create {} resources in opensearch.org instead",
            request.kind.kind
        )),
        Operation::Update => update_allowed(request.old_object.as_ref(), request.object.as_ref()),
        Operation::Delete | Operation::Connect => Ok(()),
    }
}

fn update_allowed(old: Option<&DynamicObject>, new: Option<&DynamicObject>) -> Result<(), String> {
    let (Some(old), Some(new)) = (old, new) else {
        return Ok(());
    };
    if old.metadata.deletion_timestamp.is_some() || new.metadata.deletion_timestamp.is_some() {
        return Ok(());
    }
    if spec_of(old) == spec_of(new) {
        return Ok(());
    }
    Err(format!(
        "the {LEGACY_API_GROUP} API group is read-only, edit the opensearch.org twin instead"
    ))
}

fn spec_of(obj: &DynamicObject) -> &Value {
    obj.data.get("spec").unwrap_or(&Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::admission::AdmissionReview;
    use serde_json::json;

    fn request(operation: &str, old: Option<Value>, new: Option<Value>) -> AdmissionRequest<DynamicObject> {
        let review: AdmissionReview<DynamicObject> = serde_json::from_value(json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
                "kind": {"group": "opensearch.opster.io", "version": "v1", "kind": "OpenSearchCluster"},
                "resource": {"group": "opensearch.opster.io", "version": "v1", "resource": "opensearchclusters"},
                "name": "logs",
                "namespace": "search",
                "operation": operation,
                "userInfo": {"username": "admin"},
                "object": new,
                "oldObject": old,
                "dryRun": false
            }
        }))
        .unwrap();
        review.try_into().unwrap()
    }

    fn legacy(spec: Value) -> Value {
        json!({
            "apiVersion": "opensearch.opster.io/v1",
            "kind": "OpenSearchCluster",
            "metadata": {"name": "logs", "namespace": "search"},
            "spec": spec
        })
    }

    #[test]
    fn test_create_rejected() {
        let req = request("CREATE", None, Some(legacy(json!({"general": {"version": "2.11.0"}}))));
        assert!(review(&req).unwrap_err().contains("deprecated"));
    }

    #[test]
    fn test_metadata_only_update_allowed() {
        let old = legacy(json!({"general": {"version": "2.11.0"}}));
        let mut new = old.clone();
        new["metadata"]["finalizers"] = json!(["opensearch.org/migration"]);
        assert!(review(&request("UPDATE", Some(old), Some(new))).is_ok());
    }

    #[test]
    fn test_spec_update_rejected() {
        let old = legacy(json!({"general": {"version": "2.11.0"}}));
        let new = legacy(json!({"general": {"version": "2.12.0"}}));
        assert!(review(&request("UPDATE", Some(old), Some(new))).is_err());
    }

    #[test]
    fn test_update_while_deleting_allowed() {
        let old = legacy(json!({"general": {"version": "2.11.0"}}));
        let mut new = legacy(json!({"general": {"version": "2.12.0"}}));
        new["metadata"]["deletionTimestamp"] = json!("2024-05-01T10:00:00Z");
        assert!(review(&request("UPDATE", Some(old), Some(new))).is_ok());
    }

    #[test]
    fn test_delete_allowed() {
        let old = legacy(json!({"general": {"version": "2.11.0"}}));
        assert!(review(&request("DELETE", Some(old), None)).is_ok());
    }
}
