//! Dashboard query specification types
//!
//! These mirror the JSON the query editor persists for a panel target.
//! Loosely typed editor values (intervals, sizes, doc counts) are kept as
//! raw JSON so they reach the output exactly as the user entered them.

use crate::error::QueryError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;

/// One panel target as authored in the query editor
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySpec {
    /// Time field the editor was configured with (informational)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_field: Option<String>,

    /// Cluster major version the editor was configured with (informational)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub es_version: Option<u32>,

    /// Metric aggregations, in declared order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Vec<MetricSpec>>,

    /// Bucket aggregations, outermost first
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket_aggs: Option<Vec<BucketSpec>>,
}

impl QuerySpec {
    /// Parse a target from the editor's JSON
    pub fn from_json(json: &str) -> Result<Self, QueryError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Metrics with the single-count default applied
    pub fn metrics(&self) -> Cow<'_, [MetricSpec]> {
        match &self.metrics {
            Some(metrics) => Cow::Borrowed(metrics.as_slice()),
            None => Cow::Owned(default_metrics()),
        }
    }

    /// Bucket aggregations with the auto date histogram default applied.
    ///
    /// Only an absent list is defaulted; an explicitly empty list selects
    /// the raw document query.
    pub fn bucket_aggs(&self) -> Cow<'_, [BucketSpec]> {
        match &self.bucket_aggs {
            Some(aggs) => Cow::Borrowed(aggs.as_slice()),
            None => Cow::Owned(default_bucket_aggs()),
        }
    }

    /// Copy of this spec with all defaults filled in
    pub fn with_defaults(&self) -> QuerySpec {
        QuerySpec {
            time_field: self.time_field.clone(),
            es_version: self.es_version,
            metrics: Some(self.metrics().into_owned()),
            bucket_aggs: Some(self.bucket_aggs().into_owned()),
        }
    }
}

fn default_metrics() -> Vec<MetricSpec> {
    vec![MetricSpec::new("1", "count")]
}

fn default_bucket_aggs() -> Vec<BucketSpec> {
    vec![BucketSpec::new("2", BucketKind::DateHistogram).with_settings(BucketSettings {
        interval: Some(Value::from("auto")),
        ..Default::default()
    })]
}

/// Bucket aggregation kinds the editor offers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketKind {
    DateHistogram,
    Histogram,
    Filters,
    Terms,
    TermsHistogram,
    GeohashGrid,
    /// Kinds from newer editors; compiled to an empty node
    #[serde(other)]
    Unknown,
}

impl BucketKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BucketKind::DateHistogram => "date_histogram",
            BucketKind::Histogram => "histogram",
            BucketKind::Filters => "filters",
            BucketKind::Terms => "terms",
            BucketKind::TermsHistogram => "terms_histogram",
            BucketKind::GeohashGrid => "geohash_grid",
            BucketKind::Unknown => "unknown",
        }
    }
}

/// A single bucket aggregation level
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BucketSpec {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: BucketKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<BucketSettings>,
}

impl BucketSpec {
    pub fn new(id: impl Into<String>, kind: BucketKind) -> Self {
        Self {
            id: id.into(),
            kind,
            field: None,
            settings: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_settings(mut self, settings: BucketSettings) -> Self {
        self.settings = Some(settings);
        self
    }
}

/// Per-kind bucket options. Which keys matter depends on the kind.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct BucketSettings {
    /// date_histogram interval, `auto` or an ES interval expression
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_doc_count: Option<Value>,

    /// histogram bucket width
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub histogram_interval: Option<Value>,

    /// terms size; parsed as an integer prefix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Value>,

    /// terms ordering key, either `_term`, `_count` or a metric id
    #[serde(default, rename = "orderBy", skip_serializing_if = "Option::is_none")]
    pub order_by: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<Value>,

    /// `Expression`, `Groovy` or anything else for a plain field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<FilterSpec>,

    /// geohash_grid precision
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<Value>,
}

impl BucketSettings {
    pub fn field_type(&self) -> FieldType {
        FieldType::parse(self.field_type.as_deref())
    }
}

/// How a bucket aggregation reads its input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldType {
    /// Inline Lucene expression script
    Expression,
    /// Inline Groovy script
    Groovy,
    /// Plain document field
    #[default]
    Default,
}

impl FieldType {
    pub fn parse(s: Option<&str>) -> Self {
        match s {
            Some("Expression") => FieldType::Expression,
            Some("Groovy") => FieldType::Groovy,
            _ => FieldType::Default,
        }
    }
}

/// One entry of a `filters` bucket aggregation
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FilterSpec {
    pub query: String,
}

/// A metric aggregation, or one of the `count` / `raw_document` pseudo-kinds
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSpec {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,

    /// Sibling metric id feeding a single-input pipeline aggregation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_agg: Option<String>,

    /// Sibling metric id for the first input of a dual-input pipeline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<String>,

    /// Sibling metric id for the second input of a dual-input pipeline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<String>,

    /// Extra aggregation options; null values mean "unset"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Map<String, Value>>,
}

impl MetricSpec {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            field: None,
            pipeline_agg: None,
            values: None,
            weights: None,
            settings: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_pipeline_agg(mut self, reference: impl Into<String>) -> Self {
        self.pipeline_agg = Some(reference.into());
        self
    }

    pub fn with_inputs(mut self, values: impl Into<String>, weights: impl Into<String>) -> Self {
        self.values = Some(values.into());
        self.weights = Some(weights.into());
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: Value) -> Self {
        self.settings
            .get_or_insert_with(Map::new)
            .insert(key.into(), value);
        self
    }

    pub fn is_count(&self) -> bool {
        self.kind == "count"
    }

    pub fn is_raw_document(&self) -> bool {
        self.kind == "raw_document"
    }
}

/// Dashboard-level key/value constraint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AdhocFilter {
    pub key: String,
    pub value: String,
}

impl AdhocFilter {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Parse a JSON array of filters
    pub fn list_from_json(json: &str) -> Result<Vec<Self>, QueryError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Request for the distinct values of one field (template variables)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct TermsLookup {
    pub field: String,

    /// Lucene query narrowing the candidate documents
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

impl TermsLookup {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            query: None,
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }
}

/// Timezone handling for date histograms, as resolved by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeZone {
    /// Bucket in the viewer's zone. `None` means the zone could not be detected.
    Browser { name: Option<String> },
    /// Bucket in UTC, padded to the dashboard time range
    Utc,
}

/// The editor's default preference is the viewer's zone, unresolved
impl Default for TimeZone {
    fn default() -> Self {
        TimeZone::Browser { name: None }
    }
}

impl TimeZone {
    pub fn browser(name: impl Into<String>) -> Self {
        TimeZone::Browser {
            name: Some(name.into()),
        }
    }

    pub fn is_browser(&self) -> bool {
        matches!(self, TimeZone::Browser { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_full_target() {
        let spec: QuerySpec = serde_json::from_value(json!({
            "refId": "A",
            "timeField": "@timestamp",
            "esVersion": 2,
            "metrics": [
                {"id": "1", "type": "avg", "field": "load", "settings": {"missing": null}},
                {"id": "3", "type": "derivative", "pipelineAgg": "1"}
            ],
            "bucketAggs": [
                {"id": "2", "type": "terms", "field": "host", "settings": {"size": "10", "orderBy": "_term", "order": "asc"}},
                {"id": "4", "type": "date_histogram", "field": "@timestamp", "settings": {"interval": "auto"}}
            ]
        }))
        .unwrap();

        assert_eq!(spec.time_field.as_deref(), Some("@timestamp"));
        assert_eq!(spec.es_version, Some(2));
        let metrics = spec.metrics();
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[1].pipeline_agg.as_deref(), Some("1"));
        let aggs = spec.bucket_aggs();
        assert_eq!(aggs[0].kind, BucketKind::Terms);
        let settings = aggs[0].settings.as_ref().unwrap();
        assert_eq!(settings.order_by, Some(json!("_term")));
        assert_eq!(aggs[1].kind, BucketKind::DateHistogram);
    }

    #[test]
    fn test_defaults_when_absent() {
        let spec = QuerySpec::default();
        let metrics = spec.metrics();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].id, "1");
        assert!(metrics[0].is_count());

        let aggs = spec.bucket_aggs();
        assert_eq!(aggs.len(), 1);
        assert_eq!(aggs[0].id, "2");
        assert_eq!(aggs[0].kind, BucketKind::DateHistogram);
        assert_eq!(
            aggs[0].settings.as_ref().unwrap().interval,
            Some(json!("auto"))
        );
    }

    #[test]
    fn test_null_lists_are_defaulted() {
        let spec: QuerySpec =
            serde_json::from_value(json!({"metrics": null, "bucketAggs": null})).unwrap();
        assert_eq!(spec.metrics().len(), 1);
        assert_eq!(spec.bucket_aggs().len(), 1);
    }

    #[test]
    fn test_empty_bucket_aggs_not_defaulted() {
        let spec: QuerySpec = serde_json::from_value(json!({"bucketAggs": []})).unwrap();
        assert!(spec.bucket_aggs().is_empty());
    }

    #[test]
    fn test_with_defaults_fills_lists() {
        let spec = QuerySpec::default().with_defaults();
        assert!(spec.metrics.is_some());
        assert!(spec.bucket_aggs.is_some());
    }

    #[test]
    fn test_unknown_bucket_kind() {
        let spec: BucketSpec =
            serde_json::from_value(json!({"id": "5", "type": "date_range"})).unwrap();
        assert_eq!(spec.kind, BucketKind::Unknown);
    }

    #[test]
    fn test_field_type_parse() {
        assert_eq!(FieldType::parse(Some("Expression")), FieldType::Expression);
        assert_eq!(FieldType::parse(Some("Groovy")), FieldType::Groovy);
        assert_eq!(FieldType::parse(Some("default")), FieldType::Default);
        assert_eq!(FieldType::parse(Some("expression")), FieldType::Default);
        assert_eq!(FieldType::parse(None), FieldType::Default);
    }

    #[test]
    fn test_metric_builders() {
        let m = MetricSpec::new("4", "moving_avg")
            .with_pipeline_agg("1")
            .with_setting("window", json!(5));
        assert_eq!(m.pipeline_agg.as_deref(), Some("1"));
        assert_eq!(m.settings.unwrap()["window"], json!(5));
    }

    #[test]
    fn test_adhoc_list_from_json() {
        let filters =
            AdhocFilter::list_from_json(r#"[{"key":"host","value":"a","operator":"="}]"#).unwrap();
        assert_eq!(filters, vec![AdhocFilter::new("host", "a")]);
        assert!(AdhocFilter::list_from_json("{").is_err());
    }

    #[test]
    fn test_time_zone() {
        assert!(TimeZone::browser("Europe/Oslo").is_browser());
        assert_eq!(TimeZone::default(), TimeZone::Browser { name: None });
        assert!(!TimeZone::Utc.is_browser());
    }
}
