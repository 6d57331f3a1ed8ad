//! Distinct field values for template variables

use super::range::range_filter;
use super::types::TermsLookup;
use serde_json::{json, Value};

/// Build `{size: 0, query, aggs: {"1": {terms}}}` listing every value of
/// `lookup.field` within the dashboard time range, sorted by term.
pub fn terms_lookup_query(time_field: &str, es_version: u32, lookup: &TermsLookup) -> Value {
    let mut filtered = serde_json::Map::new();
    filtered.insert(
        "filter".to_string(),
        json!({"bool": {"must": [{"range": range_filter(time_field, es_version)}]}}),
    );
    if let Some(query) = lookup.query.as_deref().filter(|q| !q.is_empty()) {
        filtered.insert(
            "query".to_string(),
            json!({"query_string": {"analyze_wildcard": true, "query": query}}),
        );
    }

    json!({
        "size": 0,
        "query": {"filtered": filtered},
        "aggs": {
            "1": {
                "terms": {
                    "field": lookup.field,
                    "size": 0,
                    "order": {"_term": "asc"}
                }
            }
        }
    })
}
