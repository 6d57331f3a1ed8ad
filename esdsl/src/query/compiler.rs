//! Query compiler: dashboard target to Elasticsearch search body

use super::adhoc::add_adhoc_filters;
use super::buckets::{compile_bucket, BucketContext};
use super::document::document_query;
use super::metrics::compile_metrics;
use super::range::range_filter;
use super::terms_lookup::terms_lookup_query;
use super::types::{AdhocFilter, BucketSpec, QuerySpec, TermsLookup, TimeZone};
use crate::config::Config;
use crate::error::QueryError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

/// Placeholder for the panel's Lucene query string
pub const LUCENE_QUERY: &str = "$lucene_query";

/// A compiled search body, still containing template placeholders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompiledQuery(Value);

impl CompiledQuery {
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    pub fn to_json(&self) -> String {
        self.0.to_string()
    }

    pub fn to_json_pretty(&self) -> String {
        format!("{:#}", self.0)
    }

    /// Number of nested bucket levels under the root `aggs`
    pub fn bucket_depth(&self) -> usize {
        self.walk_levels().0
    }

    /// The `aggs` map of the innermost bucket level, holding the metrics
    pub fn innermost_aggs(&self) -> Option<&Map<String, Value>> {
        self.walk_levels().1
    }

    fn walk_levels(&self) -> (usize, Option<&Map<String, Value>>) {
        let mut depth = 0;
        let mut current = self.0.get("aggs").and_then(Value::as_object);
        let mut innermost = None;
        while let Some(aggs) = current {
            // Metric leaves never carry `aggs`; the bucket level always does
            match aggs.values().find_map(|level| level.get("aggs")) {
                Some(child) => {
                    depth += 1;
                    innermost = child.as_object();
                    current = innermost;
                }
                None => break,
            }
        }
        (depth, innermost)
    }
}

impl From<CompiledQuery> for Value {
    fn from(query: CompiledQuery) -> Self {
        query.0
    }
}

impl fmt::Display for CompiledQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            write!(f, "{:#}", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Compiles dashboard targets for one datasource.
///
/// Holds only the time field and the cluster major version, so a single
/// instance can be shared freely between callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryCompiler {
    time_field: String,
    es_version: u32,
}

impl QueryCompiler {
    pub fn new(time_field: impl Into<String>, es_version: u32) -> Self {
        Self {
            time_field: time_field.into(),
            es_version,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.datasource.time_field.clone(), config.datasource.es_version)
    }

    pub fn time_field(&self) -> &str {
        &self.time_field
    }

    pub fn es_version(&self) -> u32 {
        self.es_version
    }

    /// The `range` clause restricting hits to the dashboard time range
    pub fn range_filter(&self) -> Value {
        range_filter(&self.time_field, self.es_version)
    }

    /// Compile a target with the default timezone handling
    pub fn build(
        &self,
        target: &QuerySpec,
        adhoc_filters: Option<&[AdhocFilter]>,
    ) -> Result<CompiledQuery, QueryError> {
        self.build_with_timezone(target, adhoc_filters, &TimeZone::default())
    }

    /// Compile a target, bucketing date histograms per `time_zone`
    pub fn build_with_timezone(
        &self,
        target: &QuerySpec,
        adhoc_filters: Option<&[AdhocFilter]>,
        time_zone: &TimeZone,
    ) -> Result<CompiledQuery, QueryError> {
        let metrics = target.metrics();
        let bucket_aggs = target.bucket_aggs();
        tracing::debug!(
            time_field = %self.time_field,
            es_version = self.es_version,
            metrics = metrics.len(),
            bucket_aggs = bucket_aggs.len(),
            "Compiling query"
        );

        let mut query = self.skeleton();
        add_adhoc_filters(&mut query, adhoc_filters);

        if bucket_aggs.is_empty() {
            if let Some(metric) = metrics.first().filter(|m| !m.is_raw_document()) {
                return Err(QueryError::InvalidQuery(format!(
                    "metric '{}' of type '{}' needs at least one bucket aggregation; \
                     only raw_document can be queried without one",
                    metric.id, metric.kind
                )));
            }
            document_query(&mut query, &self.time_field);
            return Ok(CompiledQuery(query));
        }

        let ctx = BucketContext {
            time_field: &self.time_field,
            es_version: self.es_version,
            time_zone,
            metrics: &metrics,
        };
        let aggs = nest_levels(&bucket_aggs, &ctx);
        if let Some(root) = query.as_object_mut() {
            root.insert("aggs".to_string(), Value::Object(aggs));
        }

        Ok(CompiledQuery(query))
    }

    /// Build the query listing distinct values of a field
    pub fn terms_query(&self, lookup: &TermsLookup) -> CompiledQuery {
        CompiledQuery(terms_lookup_query(&self.time_field, self.es_version, lookup))
    }

    fn skeleton(&self) -> Value {
        json!({
            "size": 0,
            "query": {
                "filtered": {
                    "query": {
                        "query_string": {
                            "analyze_wildcard": true,
                            "query": LUCENE_QUERY
                        }
                    },
                    "filter": {
                        "bool": {
                            "must": [{"range": self.range_filter()}]
                        }
                    }
                }
            }
        })
    }
}

/// Compile `buckets` into a single chain of levels, outermost first.
///
/// Returns the `aggs` map holding the first level. The innermost level's
/// `aggs` is replaced by the metric leaves; outer levels keep any
/// order-support metric next to the nested level.
fn nest_levels(buckets: &[BucketSpec], ctx: &BucketContext<'_>) -> Map<String, Value> {
    let mut aggs = Map::new();
    let Some((bucket, rest)) = buckets.split_first() else {
        return aggs;
    };

    tracing::trace!(id = %bucket.id, kind = bucket.kind.as_str(), depth = rest.len(), "Compiling bucket level");
    let mut level = compile_bucket(bucket, ctx);
    let children = if rest.is_empty() {
        let mut leaves = Map::new();
        compile_metrics(ctx.metrics, &mut leaves);
        leaves
    } else {
        let mut children = match level.remove("aggs") {
            Some(Value::Object(existing)) => existing,
            _ => Map::new(),
        };
        children.extend(nest_levels(rest, ctx));
        children
    };
    level.insert("aggs".to_string(), Value::Object(children));
    aggs.insert(bucket.id.clone(), Value::Object(level));
    aggs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::types::{BucketKind, BucketSettings, MetricSpec};

    fn spec(value: Value) -> QuerySpec {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_default_target() {
        let compiler = QueryCompiler::new("@timestamp", 2);
        let query = compiler.build(&QuerySpec::default(), None).unwrap();
        let value = query.as_value();

        assert_eq!(value["size"], 0);
        assert_eq!(
            value["query"]["filtered"]["query"],
            json!({"query_string": {"analyze_wildcard": true, "query": "$lucene_query"}})
        );
        assert_eq!(
            value["aggs"]["2"]["date_histogram"],
            json!({
                "interval": "$interval",
                "field": "@timestamp",
                "min_doc_count": 0,
                "format": "epoch_millis"
            })
        );
        assert_eq!(value["aggs"]["2"]["aggs"], json!({}));
    }

    #[test]
    fn test_utc_timezone_uses_extended_bounds() {
        let compiler = QueryCompiler::new("@timestamp", 1);
        let query = compiler
            .build_with_timezone(&QuerySpec::default(), None, &TimeZone::Utc)
            .unwrap();
        assert_eq!(
            query.as_value()["aggs"]["2"]["date_histogram"]["extended_bounds"],
            json!({"min": "$timeFrom", "max": "$timeTo"})
        );
        assert!(query.as_value()["aggs"]["2"]["date_histogram"].get("format").is_none());
    }

    #[test]
    fn test_nested_levels_and_metrics() {
        let compiler = QueryCompiler::new("@timestamp", 2);
        let target = spec(json!({
            "metrics": [
                {"id": "1", "type": "count"},
                {"id": "3", "type": "avg", "field": "load"}
            ],
            "bucketAggs": [
                {"id": "2", "type": "terms", "field": "host", "settings": {"size": "0", "orderBy": "_count", "order": "desc"}},
                {"id": "4", "type": "date_histogram", "settings": {"interval": "1m"}}
            ]
        }));
        let query = compiler.build(&target, None).unwrap();
        let value = query.as_value();

        assert_eq!(value["aggs"]["2"]["terms"]["field"], "host");
        assert_eq!(value["aggs"]["2"]["terms"]["size"], 0);
        assert_eq!(value["aggs"]["2"]["aggs"]["4"]["date_histogram"]["interval"], "1m");
        assert_eq!(
            value["aggs"]["2"]["aggs"]["4"]["aggs"],
            json!({"3": {"avg": {"field": "load"}}})
        );
        assert_eq!(query.bucket_depth(), 2);
        let leaves = query.innermost_aggs().unwrap();
        assert_eq!(leaves.keys().collect::<Vec<_>>(), vec!["3"]);
    }

    #[test]
    fn test_order_support_kept_at_outer_level() {
        let compiler = QueryCompiler::new("@timestamp", 2);
        let target = spec(json!({
            "metrics": [{"id": "1", "type": "max", "field": "cpu"}],
            "bucketAggs": [
                {"id": "2", "type": "terms", "field": "host", "settings": {"size": "5", "orderBy": "1", "order": "desc"}},
                {"id": "3", "type": "date_histogram", "settings": {"interval": "auto"}}
            ]
        }));
        let query = compiler.build(&target, None).unwrap();
        let outer = query.as_value()["aggs"]["2"]["aggs"].as_object().unwrap();
        assert_eq!(outer.keys().collect::<Vec<_>>(), vec!["1", "3"]);
        assert_eq!(outer["1"], json!({"max": {"field": "cpu"}}));
        assert_eq!(query.bucket_depth(), 2);
    }

    #[test]
    fn test_order_support_replaced_at_innermost_level() {
        let compiler = QueryCompiler::new("@timestamp", 2);
        let target = spec(json!({
            "metrics": [{"id": "1", "type": "max", "field": "cpu", "settings": {"missing": 0}}],
            "bucketAggs": [
                {"id": "2", "type": "terms", "field": "host", "settings": {"orderBy": "1", "order": "desc"}}
            ]
        }));
        let query = compiler.build(&target, None).unwrap();
        assert_eq!(
            query.as_value()["aggs"]["2"]["aggs"],
            json!({"1": {"max": {"field": "cpu", "missing": 0}}})
        );
    }

    #[test]
    fn test_raw_document_query() {
        let compiler = QueryCompiler::new("@timestamp", 2);
        let target = QuerySpec {
            metrics: Some(vec![MetricSpec::new("1", "raw_document")]),
            bucket_aggs: Some(vec![]),
            ..Default::default()
        };
        let query = compiler.build(&target, None).unwrap();
        let value = query.as_value();
        assert!(value.get("aggs").is_none());
        assert_eq!(value["size"], 500);
        assert_eq!(value["sort"]["@timestamp"]["order"], "desc");
        assert_eq!(value["fielddata_fields"], json!(["@timestamp"]));
        assert_eq!(query.bucket_depth(), 0);
    }

    #[test]
    fn test_metric_without_buckets_is_invalid() {
        let compiler = QueryCompiler::new("@timestamp", 2);
        let target = QuerySpec {
            metrics: Some(vec![MetricSpec::new("1", "avg").with_field("x")]),
            bucket_aggs: Some(vec![]),
            ..Default::default()
        };
        let err = compiler.build(&target, None).unwrap_err();
        assert!(matches!(err, QueryError::InvalidQuery(_)));
        assert!(err.to_string().starts_with("Invalid query"));
    }

    #[test]
    fn test_empty_metrics_without_buckets_is_document_query() {
        let compiler = QueryCompiler::new("@timestamp", 2);
        let target = QuerySpec {
            metrics: Some(vec![]),
            bucket_aggs: Some(vec![]),
            ..Default::default()
        };
        let query = compiler.build(&target, None).unwrap();
        assert_eq!(query.as_value()["size"], 500);
    }

    #[test]
    fn test_adhoc_filters_before_document_query() {
        let compiler = QueryCompiler::new("ts", 1);
        let target = QuerySpec {
            metrics: Some(vec![MetricSpec::new("1", "raw_document")]),
            bucket_aggs: Some(vec![]),
            ..Default::default()
        };
        let filters = vec![AdhocFilter::new("host", "a")];
        let query = compiler.build(&target, Some(&filters)).unwrap();
        assert_eq!(
            query.as_value()["query"]["filtered"]["filter"]["bool"]["must"],
            json!([
                {"range": {"ts": {"gte": "$timeFrom", "lte": "$timeTo"}}},
                {"term": {"host": "a"}}
            ])
        );
    }

    #[test]
    fn test_input_not_mutated_and_compiler_reusable() {
        let compiler = QueryCompiler::new("@timestamp", 2);
        let target = QuerySpec {
            bucket_aggs: Some(vec![BucketSpec::new("2", BucketKind::Histogram)
                .with_field("bytes")
                .with_settings(BucketSettings::default())]),
            ..Default::default()
        };
        let before = target.clone();
        let first = compiler.build(&target, None).unwrap();
        let second = compiler.build(&target, None).unwrap();
        assert_eq!(target, before);
        assert_eq!(first, second);
        assert!(target.metrics.is_none());
    }

    #[test]
    fn test_display_and_json() {
        let compiler = QueryCompiler::new("@timestamp", 2);
        let query = compiler.build(&QuerySpec::default(), None).unwrap();
        assert_eq!(query.to_string(), query.to_json());
        assert_eq!(format!("{:#}", query), query.to_json_pretty());
        let reparsed: Value = serde_json::from_str(&query.to_json()).unwrap();
        assert_eq!(&reparsed, query.as_value());
    }

    #[test]
    fn test_terms_query() {
        let compiler = QueryCompiler::new("@timestamp", 2);
        let query = compiler.terms_query(&TermsLookup::new("host"));
        assert_eq!(query.as_value()["aggs"]["1"]["terms"]["field"], "host");
    }
}
