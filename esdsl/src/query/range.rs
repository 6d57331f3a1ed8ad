//! Dashboard time range filter

use serde_json::{json, Map, Value};

/// Placeholder for the lower time bound
pub const TIME_FROM: &str = "$timeFrom";
/// Placeholder for the upper time bound
pub const TIME_TO: &str = "$timeTo";

/// Date format emitted for clusters on the 2.x+ dialect
pub const EPOCH_MILLIS: &str = "epoch_millis";

/// True when the cluster speaks the 2.x+ dialect
pub fn uses_epoch_millis(es_version: u32) -> bool {
    es_version >= 2
}

/// Build `{<time_field>: {gte, lte, format?}}` for a `range` clause
pub fn range_filter(time_field: &str, es_version: u32) -> Value {
    let mut bounds = Map::new();
    bounds.insert("gte".to_string(), json!(TIME_FROM));
    bounds.insert("lte".to_string(), json!(TIME_TO));
    if uses_epoch_millis(es_version) {
        bounds.insert("format".to_string(), json!(EPOCH_MILLIS));
    }

    let mut filter = Map::new();
    filter.insert(time_field.to_string(), Value::Object(bounds));
    Value::Object(filter)
}
