use serde_json::Value;

/// Deep merge `desired` onto `live`, overwriting only the fields that
/// `desired` sets. Objects are merged key by key so fields populated by
/// the server (`metadata.resourceVersion`, `spec.clusterIP`, extra
/// ConfigMap keys) survive; any other value, arrays included, replaces
/// the live value wholesale.
/// Source: https://stackoverflow.com/questions/47070876/how-can-i-merge-two-json-objects-with-rust
pub fn merge(live: &mut Value, desired: &Value) {
    if let Value::Object(live) = live {
        if let Value::Object(desired) = desired {
            for (k, v) in desired {
                merge(live.entry(k.clone()).or_insert(Value::Null), v);
            }
            return;
        }
    }
    *live = desired.clone();
}
