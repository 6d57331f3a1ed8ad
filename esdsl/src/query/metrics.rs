//! Metric aggregation compiler
//!
//! Metrics become leaf aggregations at the innermost bucket level:
//! `{<id>: {<type>: {...}}}`. Pipeline metrics reference sibling metrics
//! by id through `buckets_path` instead of reading a document field.

use super::coerce::is_metric_ref;
use super::types::MetricSpec;
use serde_json::{json, Map, Value};

/// How a metric kind gets its input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricInput {
    /// Reads a document field
    Field,
    /// Reads one sibling metric via `pipelineAgg`
    Pipeline,
    /// Reads two sibling metrics via `values` and `weights`
    DualPipeline,
}

/// Static description of a metric kind the editor offers
#[derive(Debug, Clone, Copy)]
pub struct MetricKind {
    pub name: &'static str,
    pub input: MetricInput,
    /// Settings copied into the aggregation body
    pub options: &'static [&'static str],
}

const FIELD_OPTIONS: &[&str] = &["missing", "script", "format"];
const BUCKET_PIPELINE_OPTIONS: &[&str] = &["gap_policy", "format"];

const CATALOGUE: &[MetricKind] = &[
    MetricKind { name: "avg", input: MetricInput::Field, options: FIELD_OPTIONS },
    MetricKind { name: "sum", input: MetricInput::Field, options: FIELD_OPTIONS },
    MetricKind { name: "min", input: MetricInput::Field, options: FIELD_OPTIONS },
    MetricKind { name: "max", input: MetricInput::Field, options: FIELD_OPTIONS },
    MetricKind { name: "value_count", input: MetricInput::Field, options: &["script"] },
    MetricKind {
        name: "cardinality",
        input: MetricInput::Field,
        options: &["precision_threshold", "missing", "script"],
    },
    MetricKind {
        name: "extended_stats",
        input: MetricInput::Field,
        options: &["sigma", "missing", "script"],
    },
    MetricKind {
        name: "percentiles",
        input: MetricInput::Field,
        options: &["percents", "missing", "script"],
    },
    MetricKind { name: "raw_document", input: MetricInput::Field, options: &["size"] },
    MetricKind {
        name: "moving_avg",
        input: MetricInput::Pipeline,
        options: &["model", "window", "predict", "minimize", "settings", "gap_policy"],
    },
    MetricKind {
        name: "derivative",
        input: MetricInput::Pipeline,
        options: &["unit", "gap_policy", "format"],
    },
    MetricKind { name: "cumulative_sum", input: MetricInput::Pipeline, options: &["format"] },
    MetricKind {
        name: "serial_diff",
        input: MetricInput::Pipeline,
        options: &["lag", "gap_policy", "format"],
    },
    MetricKind { name: "avg_bucket", input: MetricInput::Pipeline, options: BUCKET_PIPELINE_OPTIONS },
    MetricKind { name: "sum_bucket", input: MetricInput::Pipeline, options: BUCKET_PIPELINE_OPTIONS },
    MetricKind { name: "min_bucket", input: MetricInput::Pipeline, options: BUCKET_PIPELINE_OPTIONS },
    MetricKind { name: "max_bucket", input: MetricInput::Pipeline, options: BUCKET_PIPELINE_OPTIONS },
    MetricKind { name: "stats_bucket", input: MetricInput::Pipeline, options: BUCKET_PIPELINE_OPTIONS },
    MetricKind {
        name: "extended_stats_bucket",
        input: MetricInput::Pipeline,
        options: &["sigma", "gap_policy", "format"],
    },
    MetricKind {
        name: "percentiles_bucket",
        input: MetricInput::Pipeline,
        options: &["percents", "gap_policy", "format"],
    },
    MetricKind {
        name: "bucket_script",
        input: MetricInput::DualPipeline,
        options: &["script", "gap_policy", "format"],
    },
    MetricKind {
        name: "bucket_selector",
        input: MetricInput::DualPipeline,
        options: &["script", "gap_policy"],
    },
];

/// Look up a known metric kind
pub fn metric_kind(name: &str) -> Option<&'static MetricKind> {
    CATALOGUE.iter().find(|k| k.name == name)
}

pub fn is_pipeline_agg(name: &str) -> bool {
    metric_kind(name).is_some_and(|k| k.input == MetricInput::Pipeline)
}

pub fn is_complex_pipeline_agg(name: &str) -> bool {
    metric_kind(name).is_some_and(|k| k.input == MetricInput::DualPipeline)
}

/// Copy the non-null `settings` named in `allowed` onto `base`.
///
/// `allowed = None` copies every non-null setting; used for kinds outside
/// the catalogue.
pub fn merge_non_null(
    base: &mut Map<String, Value>,
    settings: Option<&Map<String, Value>>,
    allowed: Option<&[&str]>,
) {
    let Some(settings) = settings else {
        return;
    };
    for (key, value) in settings {
        if value.is_null() {
            continue;
        }
        if allowed.is_some_and(|allowed| !allowed.contains(&key.as_str())) {
            tracing::trace!(setting = %key, "Dropping setting not valid for metric");
            continue;
        }
        base.insert(key.clone(), value.clone());
    }
}

/// Compile one metric into its `{<type>: {...}}` node.
///
/// Returns `None` for `count` (implicit in every bucket) and for pipeline
/// metrics whose references are not plain metric ids.
pub fn compile_metric(metric: &MetricSpec) -> Option<Value> {
    if metric.is_count() {
        return None;
    }

    let kind = metric_kind(&metric.kind);
    let input = kind.map_or(MetricInput::Field, |k| k.input);

    let mut body = Map::new();
    match input {
        MetricInput::Pipeline => {
            if !is_metric_ref(metric.pipeline_agg.as_deref()) {
                tracing::debug!(id = %metric.id, kind = %metric.kind, "Skipping pipeline metric without a valid reference");
                return None;
            }
            body.insert("buckets_path".to_string(), json!(metric.pipeline_agg));
        }
        MetricInput::DualPipeline => {
            if !is_metric_ref(metric.values.as_deref()) || !is_metric_ref(metric.weights.as_deref())
            {
                tracing::debug!(id = %metric.id, kind = %metric.kind, "Skipping pipeline metric without valid inputs");
                return None;
            }
            body.insert(
                "buckets_path".to_string(),
                json!({"_1": metric.values, "_2": metric.weights}),
            );
        }
        MetricInput::Field => {
            if let Some(field) = &metric.field {
                body.insert("field".to_string(), json!(field));
            }
        }
    }

    merge_non_null(&mut body, metric.settings.as_ref(), kind.map(|k| k.options));

    let mut node = Map::new();
    node.insert(metric.kind.clone(), Value::Object(body));
    Some(Value::Object(node))
}

/// Add every surviving metric to `aggs`, keyed by metric id, in order
pub fn compile_metrics(metrics: &[MetricSpec], aggs: &mut Map<String, Value>) {
    for metric in metrics {
        if let Some(node) = compile_metric(metric) {
            aggs.insert(metric.id.clone(), node);
        }
    }
}
