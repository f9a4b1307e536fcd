//! Schema helpers for free-form fields.
//!
//! OpenSearch request bodies (ISM states, template mappings, snapshot
//! schedules) are passed through verbatim, so their CRD schema only states
//! that they are objects whose unknown fields must be preserved.

use schemars::{Schema, SchemaGenerator, json_schema};

/// Object whose fields are opaque to the API server.
pub fn preserve_unknown_object(_: &mut SchemaGenerator) -> Schema {
    json_schema!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true
    })
}

/// Optional opaque object.
pub fn optional_preserve_unknown_object(_: &mut SchemaGenerator) -> Schema {
    json_schema!({
        "type": "object",
        "nullable": true,
        "x-kubernetes-preserve-unknown-fields": true
    })
}

/// List of opaque objects.
pub fn preserve_unknown_array(_: &mut SchemaGenerator) -> Schema {
    json_schema!({
        "type": "array",
        "items": {
            "type": "object",
            "x-kubernetes-preserve-unknown-fields": true
        }
    })
}
