//! Three-way merge patches (RFC 7396 and strategic merge)
//!
//! A three-way patch takes the last applied configuration (`original`), the
//! desired object (`modified`) and the live object (`current`). Fields set
//! in `modified` that differ from `current` are patched, fields dropped
//! from `original` to `modified` are deleted, and anything else present in
//! `current` is left alone so third-party mutations survive.
//!
//! Strategic merge additionally merges lists of objects element by element
//! using a merge key (`name` for containers, `mountPath` for volume mounts,
//! and so on). Element deletion uses `{"$patch": "delete", <key>: <value>}`
//! directives. Lists without a known merge key are replaced wholesale, as in
//! a JSON merge patch.

use serde_json::{Map, Value};

/// Directive key used inside strategic list patches.
pub const PATCH_DIRECTIVE: &str = "$patch";

/// Patch dialect used for an object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchType {
    /// RFC 7396 JSON merge patch
    JsonMerge,
    /// Kubernetes strategic merge patch
    StrategicMerge,
}

impl PatchType {
    /// Pick the dialect from `apiVersion` and `kind`.
    ///
    /// Built-in API groups support strategic merge. Custom resources and
    /// CRD objects themselves use JSON merge.
    pub fn for_object(api_version: &str, kind: &str) -> Self {
        if kind == "CustomResourceDefinition" {
            return PatchType::JsonMerge;
        }
        match api_version.split_once('/') {
            None => PatchType::StrategicMerge,
            Some((group, _)) if !group.contains('.') || group.ends_with(".k8s.io") => PatchType::StrategicMerge,
            Some(_) => PatchType::JsonMerge,
        }
    }

    /// Dialect of a serialized object.
    pub fn for_value(object: &Value) -> Self {
        let api_version = object.get("apiVersion").and_then(Value::as_str).unwrap_or("");
        let kind = object.get("kind").and_then(Value::as_str).unwrap_or("");
        Self::for_object(api_version, kind)
    }
}

/// Merge key for a list field, if the list is merged element-wise.
///
/// Every element seen must be an object carrying the key; otherwise the
/// list is treated as atomic.
fn merge_key<'a>(field: &str, lists: impl IntoIterator<Item = &'a [Value]> + Clone) -> Option<&'static str> {
    let key = match field {
        "containers" | "initContainers" | "ephemeralContainers" | "env" | "volumes" | "imagePullSecrets" => "name",
        "volumeMounts" => "mountPath",
        "ownerReferences" => "uid",
        "conditions" => "type",
        "ports" => {
            let container_ports = lists
                .clone()
                .into_iter()
                .flatten()
                .any(|v| v.get("containerPort").is_some());
            if container_ports { "containerPort" } else { "port" }
        }
        _ => return None,
    };
    let keyed = lists
        .into_iter()
        .flatten()
        .all(|v| v.is_object() && v.get(key).is_some());
    keyed.then_some(key)
}

fn find_by_key<'a>(list: &'a [Value], key: &str, id: &Value) -> Option<&'a Value> {
    list.iter().find(|v| v.get(key) == Some(id))
}

/// Compute a three-way patch turning `current` into `modified`.
///
/// With `original = None` no deletions are generated. Passing `current` as
/// the original yields a two-way patch that also removes every field of
/// `current` missing from `modified`.
pub fn create_three_way_merge_patch(
    original: Option<&Value>,
    modified: &Value,
    current: &Value,
    patch_type: PatchType,
) -> Value {
    match (modified, current) {
        (Value::Object(m), Value::Object(c)) => {
            Value::Object(diff_maps(original.and_then(Value::as_object), m, c, patch_type))
        }
        _ if modified == current => Value::Object(Map::new()),
        _ => modified.clone(),
    }
}

fn diff_maps(original: Option<&Map<String, Value>>, modified: &Map<String, Value>, current: &Map<String, Value>, patch_type: PatchType) -> Map<String, Value> {
    let mut patch = Map::new();

    for (key, m) in modified {
        let Some(c) = current.get(key) else {
            patch.insert(key.clone(), m.clone());
            continue;
        };
        if c == m {
            continue;
        }
        let o = original.and_then(|o| o.get(key));
        match (m, c) {
            (Value::Object(mm), Value::Object(cm)) => {
                let sub = diff_maps(o.and_then(Value::as_object), mm, cm, patch_type);
                if !sub.is_empty() {
                    patch.insert(key.clone(), Value::Object(sub));
                }
            }
            (Value::Array(ma), Value::Array(ca)) if patch_type == PatchType::StrategicMerge => {
                let oa = o.and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[]);
                match merge_key(key, [ma.as_slice(), ca.as_slice(), oa]) {
                    Some(merge_key) => {
                        let list = diff_lists(merge_key, o.and_then(Value::as_array), ma, ca, patch_type);
                        if !list.is_empty() {
                            patch.insert(key.clone(), Value::Array(list));
                        }
                    }
                    None => {
                        patch.insert(key.clone(), m.clone());
                    }
                }
            }
            _ => {
                patch.insert(key.clone(), m.clone());
            }
        }
    }

    if let Some(original) = original {
        for key in original.keys() {
            if !modified.contains_key(key) && current.contains_key(key) {
                patch.insert(key.clone(), Value::Null);
            }
        }
    }

    patch
}

fn diff_lists(key: &str, original: Option<&Vec<Value>>, modified: &[Value], current: &[Value], patch_type: PatchType) -> Vec<Value> {
    let mut patch = Vec::new();

    for m in modified {
        let Some(id) = m.get(key) else { continue };
        match find_by_key(current, key, id) {
            None => patch.push(m.clone()),
            Some(c) if c == m => {}
            Some(c) => {
                let o = original.and_then(|o| find_by_key(o, key, id));
                if let (Value::Object(mm), Value::Object(cm)) = (m, c) {
                    let mut sub = diff_maps(o.and_then(Value::as_object), mm, cm, patch_type);
                    if !sub.is_empty() {
                        sub.insert(key.to_string(), id.clone());
                        patch.push(Value::Object(sub));
                    }
                }
            }
        }
    }

    if let Some(original) = original {
        for o in original {
            let Some(id) = o.get(key) else { continue };
            if find_by_key(modified, key, id).is_none() && find_by_key(current, key, id).is_some() {
                let mut directive = Map::new();
                directive.insert(PATCH_DIRECTIVE.to_string(), Value::String("delete".to_string()));
                directive.insert(key.to_string(), id.clone());
                patch.push(Value::Object(directive));
            }
        }
    }

    patch
}

/// Apply a patch to `doc` locally and return the result.
pub fn apply_patch(doc: &Value, patch: &Value, patch_type: PatchType) -> Value {
    let Value::Object(patch_map) = patch else {
        return patch.clone();
    };
    let mut target = doc.as_object().cloned().unwrap_or_default();

    for (key, p) in patch_map {
        if p.is_null() {
            target.remove(key);
            continue;
        }
        let merged = match (target.get(key), p) {
            (Some(Value::Array(existing)), Value::Array(items)) if patch_type == PatchType::StrategicMerge => {
                match merge_key(key, [existing.as_slice(), items.as_slice()]) {
                    Some(merge_key) => Value::Array(merge_lists(merge_key, existing, items, patch_type)),
                    None => p.clone(),
                }
            }
            (Some(existing), Value::Object(_)) => apply_patch(existing, p, patch_type),
            (None, Value::Object(_)) => apply_patch(&Value::Null, p, patch_type),
            _ => p.clone(),
        };
        target.insert(key.clone(), merged);
    }

    Value::Object(target)
}

fn merge_lists(key: &str, existing: &[Value], items: &[Value], patch_type: PatchType) -> Vec<Value> {
    let mut merged = existing.to_vec();
    for item in items {
        let Some(id) = item.get(key) else {
            merged.push(item.clone());
            continue;
        };
        let delete = item.get(PATCH_DIRECTIVE).and_then(Value::as_str) == Some("delete");
        let position = merged.iter().position(|v| v.get(key) == Some(id));
        match (delete, position) {
            (true, Some(i)) => {
                merged.remove(i);
            }
            (true, None) => {}
            (false, Some(i)) => merged[i] = apply_patch(&merged[i], item, patch_type),
            (false, None) => merged.push(apply_patch(&Value::Null, item, patch_type)),
        }
    }
    merged
}

/// True when a patch changes nothing.
pub fn is_empty_patch(patch: &Value) -> bool {
    match patch {
        Value::Object(map) => map.is_empty(),
        Value::Null => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_patch_type_selection() {
        assert_eq!(PatchType::for_object("v1", "Service"), PatchType::StrategicMerge);
        assert_eq!(PatchType::for_object("apps/v1", "StatefulSet"), PatchType::StrategicMerge);
        assert_eq!(
            PatchType::for_object("networking.k8s.io/v1", "Ingress"),
            PatchType::StrategicMerge
        );
        assert_eq!(
            PatchType::for_object("apiextensions.k8s.io/v1", "CustomResourceDefinition"),
            PatchType::JsonMerge
        );
        assert_eq!(
            PatchType::for_object("opensearch.org/v1", "OpenSearchCluster"),
            PatchType::JsonMerge
        );
    }

    #[test]
    fn test_three_way_keeps_third_party_fields() {
        let original = json!({"metadata": {"labels": {"a": "1"}}});
        let modified = json!({"metadata": {"labels": {"a": "2"}}});
        let current = json!({"metadata": {"labels": {"a": "1", "injected": "yes"}}});
        let patch = create_three_way_merge_patch(Some(&original), &modified, &current, PatchType::JsonMerge);
        assert_eq!(patch, json!({"metadata": {"labels": {"a": "2"}}}));
    }

    #[test]
    fn test_three_way_deletes_dropped_fields() {
        let original = json!({"data": {"a": "1", "b": "2"}});
        let modified = json!({"data": {"a": "1"}});
        let current = json!({"data": {"a": "1", "b": "2", "c": "3"}});
        let patch = create_three_way_merge_patch(Some(&original), &modified, &current, PatchType::JsonMerge);
        assert_eq!(patch, json!({"data": {"b": null}}));
        let applied = apply_patch(&current, &patch, PatchType::JsonMerge);
        assert_eq!(applied, json!({"data": {"a": "1", "c": "3"}}));
    }

    #[test]
    fn test_strategic_container_merge_by_name() {
        let current = json!({"spec": {"containers": [
            {"name": "opensearch", "image": "os:2.19.4", "terminationMessagePath": "/dev/termination-log"},
            {"name": "sidecar", "image": "sidecar:1"}
        ]}});
        let modified = json!({"spec": {"containers": [
            {"name": "opensearch", "image": "os:3.4.0"}
        ]}});
        let original = json!({"spec": {"containers": [
            {"name": "opensearch", "image": "os:2.19.4"},
            {"name": "sidecar", "image": "sidecar:1"}
        ]}});
        let patch = create_three_way_merge_patch(Some(&original), &modified, &current, PatchType::StrategicMerge);
        assert_eq!(
            patch,
            json!({"spec": {"containers": [
                {"name": "opensearch", "image": "os:3.4.0"},
                {"$patch": "delete", "name": "sidecar"}
            ]}})
        );
        let applied = apply_patch(&current, &patch, PatchType::StrategicMerge);
        assert_eq!(
            applied,
            json!({"spec": {"containers": [
                {"name": "opensearch", "image": "os:3.4.0", "terminationMessagePath": "/dev/termination-log"}
            ]}})
        );
    }

    #[test]
    fn test_lists_without_merge_key_are_replaced() {
        let current = json!({"spec": {"args": ["a", "b"]}});
        let modified = json!({"spec": {"args": ["a"]}});
        let patch = create_three_way_merge_patch(None, &modified, &current, PatchType::StrategicMerge);
        assert_eq!(patch, json!({"spec": {"args": ["a"]}}));
    }

    #[test]
    fn test_service_ports_merge_on_port() {
        let current = json!({"spec": {"ports": [{"name": "http", "port": 9200, "protocol": "TCP"}]}});
        let modified = json!({"spec": {"ports": [{"name": "http", "port": 9200}, {"name": "transport", "port": 9300}]}});
        let patch = create_three_way_merge_patch(None, &modified, &current, PatchType::StrategicMerge);
        assert_eq!(patch, json!({"spec": {"ports": [{"name": "transport", "port": 9300}]}}));
    }
}
