//! Dashboard ad-hoc filters

use super::types::AdhocFilter;
use serde_json::{json, Value};

/// JSON pointer to the boolean `must` list of the query skeleton
pub const MUST_POINTER: &str = "/query/filtered/filter/bool/must";

/// Append `{"term": {key: value}}` clauses to the skeleton's `must` list,
/// after the range filter and in input order.
pub fn add_adhoc_filters(query: &mut Value, filters: Option<&[AdhocFilter]>) {
    let Some(filters) = filters.filter(|f| !f.is_empty()) else {
        return;
    };
    let Some(Value::Array(must)) = query.pointer_mut(MUST_POINTER) else {
        tracing::debug!("Query has no bool must list, ad-hoc filters not applied");
        return;
    };

    for filter in filters {
        let mut condition = serde_json::Map::new();
        condition.insert(filter.key.clone(), json!(filter.value));
        must.push(json!({ "term": condition }));
    }
}
