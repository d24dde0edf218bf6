pub mod blob;
pub mod inbound;
pub mod settings;
pub mod user;

use serde_json::Value;

/// Drops `null` members so they fall back to the field default on deserialize.
pub(crate) fn without_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(map.into_iter().filter(|(_, v)| !v.is_null()).collect()),
        other => other,
    }
}
