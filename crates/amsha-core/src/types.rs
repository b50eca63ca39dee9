//! Shared value types.

use serde_json::Value;
use std::collections::HashMap;

/// Key-value map used for execution inputs, outputs and metadata.
pub type JsonMap = HashMap<String, Value>;

/// Merge `delta` into `target`, overwriting existing keys.
pub fn merge_map(target: &mut JsonMap, delta: &JsonMap) {
    for (key, value) in delta {
        target.insert(key.clone(), value.clone());
    }
}

/// Convert a serde_json object into a [`JsonMap`].
///
/// Non-object values yield an empty map.
pub fn object_to_map(value: &Value) -> JsonMap {
    match value {
        Value::Object(obj) => obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        _ => JsonMap::new(),
    }
}

/// Convert a [`JsonMap`] into a serde_json object value.
pub fn map_to_object(map: &JsonMap) -> Value {
    Value::Object(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
}
