//! Schema helpers for free-form fields

use schemars::{Schema, SchemaGenerator, json_schema};

/// Object whose content is not validated by the API server
pub(crate) fn preserve_unknown_object(_generator: &mut SchemaGenerator) -> Schema {
    json_schema!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true
    })
}
