//! Last-applied configuration annotation
//!
//! The desired object is stored on the live object as gzip-compressed,
//! base64-encoded JSON. Payloads above [`MAX_ANNOTATION_SIZE`] are not
//! stored at all; diffs then fall back to two-way.

use std::io::{Read, Write};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::PatchError;
use crate::prune::prune_nulls;

/// Annotation holding the last applied configuration.
pub const LAST_APPLIED_ANNOTATION: &str = "opster.io/last-applied";

/// Largest encoded annotation that will be stored.
pub const MAX_ANNOTATION_SIZE: usize = 256 * 1024;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Store the last applied configuration of `object` on itself.
///
/// Returns `false` when the encoded payload exceeds [`MAX_ANNOTATION_SIZE`];
/// any stale annotation is removed in that case.
pub fn set_original_configuration(object: &mut Value) -> Result<bool, PatchError> {
    let snapshot = snapshot_for_annotation(object);
    let encoded = encode_configuration(&snapshot)?;

    if encoded.len() > MAX_ANNOTATION_SIZE {
        debug!(
            "Last-applied annotation is {} bytes, above the {} byte limit; skipping",
            encoded.len(),
            MAX_ANNOTATION_SIZE
        );
        remove_annotation(object);
        return Ok(false);
    }

    let Some(annotations) = object
        .as_object_mut()
        .and_then(|o| {
            o.entry("metadata")
                .or_insert_with(|| Value::Object(Map::new()))
                .as_object_mut()
        })
        .and_then(|m| {
            m.entry("annotations")
                .or_insert_with(|| Value::Object(Map::new()))
                .as_object_mut()
        })
    else {
        return Ok(false);
    };
    annotations.insert(LAST_APPLIED_ANNOTATION.to_string(), Value::String(encoded));
    Ok(true)
}

/// Read the last applied configuration stored on `object`, if any.
pub fn get_original_configuration(object: &Value) -> Result<Option<Value>, PatchError> {
    let raw = object
        .pointer("/metadata/annotations")
        .and_then(|a| a.get(LAST_APPLIED_ANNOTATION))
        .and_then(Value::as_str);
    match raw {
        Some(raw) if !raw.is_empty() => decode_configuration(raw).map(Some),
        _ => Ok(None),
    }
}

/// Encode a configuration as gzip + base64 JSON.
pub fn encode_configuration(value: &Value) -> Result<String, PatchError> {
    let json = serde_json::to_vec(value)?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    let compressed = encoder.finish()?;
    Ok(STANDARD.encode(compressed))
}

/// Decode an annotation value.
///
/// Accepts base64 gzip, base64 plain JSON, and raw JSON strings written by
/// older releases.
pub fn decode_configuration(raw: &str) -> Result<Value, PatchError> {
    if let Ok(bytes) = STANDARD.decode(raw.trim()) {
        if bytes.starts_with(&GZIP_MAGIC) {
            let mut json = Vec::new();
            GzDecoder::new(bytes.as_slice()).read_to_end(&mut json)?;
            return Ok(serde_json::from_slice(&json)?);
        }
        if let Ok(value) = serde_json::from_slice(&bytes) {
            return Ok(value);
        }
    }
    serde_json::from_str(raw).map_err(|e| PatchError::InvalidAnnotation(e.to_string()))
}

/// The part of an object recorded as its last applied configuration.
fn snapshot_for_annotation(object: &Value) -> Value {
    let mut snapshot = object.clone();
    remove_annotation(&mut snapshot);
    if let Some(map) = snapshot.as_object_mut() {
        map.remove("status");
        if let Some(metadata) = map.get_mut("metadata").and_then(Value::as_object_mut) {
            metadata.remove("resourceVersion");
        }
    }
    prune_nulls(&mut snapshot);
    snapshot
}

/// Drop the last-applied annotation from `object`.
pub fn remove_annotation(object: &mut Value) {
    if let Some(annotations) = object
        .pointer_mut("/metadata/annotations")
        .and_then(Value::as_object_mut)
    {
        annotations.remove(LAST_APPLIED_ANNOTATION);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_and_get_round_trip() {
        let mut obj = json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "logs-config", "resourceVersion": "42"},
            "data": {"opensearch.yml": "cluster.name: logs"},
            "status": {"ignored": true}
        });
        assert!(set_original_configuration(&mut obj).unwrap());
        let original = get_original_configuration(&obj).unwrap().unwrap();
        assert_eq!(
            original,
            json!({
                "apiVersion": "v1",
                "kind": "ConfigMap",
                "metadata": {"name": "logs-config"},
                "data": {"opensearch.yml": "cluster.name: logs"}
            })
        );
    }

    #[test]
    fn test_reads_legacy_encodings() {
        let plain = STANDARD.encode(br#"{"a":1}"#);
        assert_eq!(decode_configuration(&plain).unwrap(), json!({"a": 1}));
        assert_eq!(decode_configuration(r#"{"b":2}"#).unwrap(), json!({"b": 2}));
        assert!(decode_configuration("not json at all").is_err());
    }

    #[test]
    fn test_missing_annotation_is_none() {
        let obj = json!({"metadata": {"name": "x"}});
        assert!(get_original_configuration(&obj).unwrap().is_none());
    }
}
