//! Raw document query, used when a target has no bucket aggregations

use serde_json::{json, Value};

/// Number of documents fetched for raw document panels
pub const RAW_DOCUMENT_SIZE: u64 = 500;

/// Turn the skeleton into a newest-first document fetch
pub fn document_query(query: &mut Value, time_field: &str) {
    let Some(root) = query.as_object_mut() else {
        return;
    };

    let mut sort = serde_json::Map::new();
    sort.insert(
        time_field.to_string(),
        json!({"order": "desc", "unmapped_type": "boolean"}),
    );

    root.insert("size".to_string(), json!(RAW_DOCUMENT_SIZE));
    root.insert("sort".to_string(), Value::Object(sort));
    root.insert("fields".to_string(), json!(["*", "_source"]));
    root.insert("script_fields".to_string(), json!({}));
    root.insert("fielddata_fields".to_string(), json!([time_field]));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_query_shape() {
        let mut query = json!({"size": 0, "query": {"match_all": {}}});
        document_query(&mut query, "@timestamp");
        assert_eq!(
            query,
            json!({
                "size": 500,
                "query": {"match_all": {}},
                "sort": {"@timestamp": {"order": "desc", "unmapped_type": "boolean"}},
                "fields": ["*", "_source"],
                "script_fields": {},
                "fielddata_fields": ["@timestamp"]
            })
        );
        assert!(query.get("aggs").is_none());
    }
}
