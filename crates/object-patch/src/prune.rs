//! Null pruning applied to every object before it is diffed.

use serde_json::Value;

/// Recursively remove null leaves and empty maps from objects.
///
/// Empty arrays are kept, and array elements are never removed, only
/// pruned in place.
pub fn prune_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for v in map.values_mut() {
                prune_nulls(v);
            }
            map.retain(|_, v| !(v.is_null() || v.as_object().is_some_and(serde_json::Map::is_empty)));
        }
        Value::Array(items) => {
            for v in items {
                prune_nulls(v);
            }
        }
        _ => {}
    }
}

/// Return a pruned copy.
pub fn pruned(value: &Value) -> Value {
    let mut copy = value.clone();
    prune_nulls(&mut copy);
    copy
}
