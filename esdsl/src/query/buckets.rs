//! Bucket aggregation compilers
//!
//! Each compiler turns one [`BucketSpec`] into the body of a single
//! aggregation level, e.g. `{"terms": {...}}`. Nesting of levels is the
//! compiler's job; see [`super::compiler`].

use super::coerce::{key_string, or_default, parse_int};
use super::range::{uses_epoch_millis, EPOCH_MILLIS, TIME_FROM, TIME_TO};
use super::types::{BucketKind, BucketSettings, BucketSpec, FieldType, MetricSpec, TimeZone};
use serde_json::{json, Map, Value};

/// Placeholder for the auto-calculated histogram interval
pub const AUTO_INTERVAL: &str = "$interval";

/// Date format used when bucketing in the viewer's timezone
const BROWSER_DATE_FORMAT: &str = "strict_date_time_no_millis";

/// Everything a bucket compiler may consult besides the bucket itself
#[derive(Debug, Clone, Copy)]
pub struct BucketContext<'a> {
    pub time_field: &'a str,
    pub es_version: u32,
    pub time_zone: &'a TimeZone,
    /// All metrics of the target, for terms ordering by metric
    pub metrics: &'a [MetricSpec],
}

/// Where an aggregation reads its values from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSource<'a> {
    Script {
        lang: &'static str,
        expr: Option<&'a str>,
    },
    Field(Option<&'a str>),
}

impl<'a> FieldSource<'a> {
    pub fn resolve(field_type: FieldType, field: Option<&'a str>) -> Self {
        match field_type {
            FieldType::Expression => FieldSource::Script {
                lang: "expression",
                expr: field,
            },
            FieldType::Groovy => FieldSource::Script {
                lang: "groovy",
                expr: field,
            },
            FieldType::Default => FieldSource::Field(field),
        }
    }

    /// Write `script` (optionally with `lang`) or `field` into `node`
    fn render(&self, node: &mut Map<String, Value>, with_lang: bool) {
        match self {
            FieldSource::Script { lang, expr } => {
                insert_opt(node, "script", *expr);
                if with_lang {
                    node.insert("lang".to_string(), json!(lang));
                }
            }
            FieldSource::Field(field) => insert_opt(node, "field", *field),
        }
    }
}

fn insert_opt(node: &mut Map<String, Value>, key: &str, value: Option<&str>) {
    if let Some(v) = value {
        node.insert(key.to_string(), json!(v));
    }
}

/// Compile one bucket level into `{<kind>: {...}}`.
///
/// A terms level ordered by a metric also carries an `aggs` entry holding
/// that metric, so the engine can compute the ordering value.
pub fn compile_bucket(spec: &BucketSpec, ctx: &BucketContext<'_>) -> Map<String, Value> {
    let empty = BucketSettings::default();
    let settings = spec.settings.as_ref().unwrap_or(&empty);

    let mut level = Map::new();
    match spec.kind {
        BucketKind::DateHistogram => {
            level.insert("date_histogram".to_string(), date_histogram(settings, ctx));
        }
        BucketKind::Histogram => {
            level.insert("histogram".to_string(), histogram(spec, settings));
        }
        BucketKind::Filters => {
            level.insert("filters".to_string(), json!({ "filters": filters(settings) }));
        }
        BucketKind::Terms | BucketKind::TermsHistogram => {
            terms(spec, ctx, &mut level);
        }
        BucketKind::GeohashGrid => {
            level.insert("geohash_grid".to_string(), geohash_grid(spec));
        }
        BucketKind::Unknown => {
            tracing::debug!(id = %spec.id, "Unknown bucket aggregation type, emitting empty level");
        }
    }
    level
}

fn date_histogram(settings: &BucketSettings, ctx: &BucketContext<'_>) -> Value {
    let mut agg = Map::new();
    if let Some(interval) = &settings.interval {
        agg.insert("interval".to_string(), interval.clone());
    }
    agg.insert("field".to_string(), json!(ctx.time_field));
    agg.insert(
        "min_doc_count".to_string(),
        or_default(settings.min_doc_count.as_ref(), json!(0)),
    );

    match ctx.time_zone {
        TimeZone::Browser { name } => {
            agg.insert("format".to_string(), json!(BROWSER_DATE_FORMAT));
            if let Some(name) = name {
                agg.insert("time_zone".to_string(), json!(name));
            }
        }
        TimeZone::Utc => {
            agg.insert(
                "extended_bounds".to_string(),
                json!({"min": TIME_FROM, "max": TIME_TO}),
            );
        }
    }

    if settings.interval.as_ref().and_then(Value::as_str) == Some("auto") {
        agg.insert("interval".to_string(), json!(AUTO_INTERVAL));
    }

    if uses_epoch_millis(ctx.es_version) {
        agg.insert("format".to_string(), json!(EPOCH_MILLIS));
    }

    Value::Object(agg)
}

fn histogram(spec: &BucketSpec, settings: &BucketSettings) -> Value {
    let mut agg = Map::new();
    agg.insert(
        "interval".to_string(),
        or_default(settings.histogram_interval.as_ref(), json!(1)),
    );
    FieldSource::resolve(settings.field_type(), spec.field.as_deref()).render(&mut agg, true);
    agg.insert(
        "min_doc_count".to_string(),
        or_default(settings.min_doc_count.as_ref(), json!(0)),
    );
    Value::Object(agg)
}

/// Keyed by the literal query string; a repeated query overwrites the
/// earlier entry.
fn filters(settings: &BucketSettings) -> Value {
    let mut keyed = Map::new();
    for filter in &settings.filters {
        keyed.insert(
            filter.query.clone(),
            json!({
                "query": {
                    "query_string": {
                        "query": filter.query,
                        "analyze_wildcard": true
                    }
                }
            }),
        );
    }
    Value::Object(keyed)
}

fn terms(spec: &BucketSpec, ctx: &BucketContext<'_>, level: &mut Map<String, Value>) {
    let mut agg = Map::new();
    let field_type = spec
        .settings
        .as_ref()
        .map(BucketSettings::field_type)
        .unwrap_or_default();
    FieldSource::resolve(field_type, spec.field.as_deref()).render(&mut agg, false);

    let Some(settings) = &spec.settings else {
        level.insert("terms".to_string(), Value::Object(agg));
        return;
    };

    // An unparseable size stays unset (null) rather than falling back to a default
    let size = settings
        .size
        .as_ref()
        .and_then(parse_int)
        .map_or(Value::Null, Value::from);
    agg.insert("size".to_string(), size);

    let mut order_support = None;
    if let Some(order_by) = &settings.order_by {
        let key = key_string(order_by);
        let mut order = Map::new();
        if let Some(direction) = &settings.order {
            order.insert(key.clone(), direction.clone());
        }
        agg.insert("order".to_string(), Value::Object(order));

        if parse_int(order_by).is_some_and(|n| n >= 0) {
            order_support = ctx.metrics.iter().find(|m| m.id == key).map(|metric| {
                tracing::debug!(bucket = %spec.id, metric = %metric.id, "Ordering terms by metric");
                let mut body = Map::new();
                insert_opt(&mut body, "field", metric.field.as_deref());
                let mut node = Map::new();
                node.insert(metric.kind.clone(), Value::Object(body));
                let mut aggs = Map::new();
                aggs.insert(metric.id.clone(), Value::Object(node));
                aggs
            });
        }
    }

    level.insert("terms".to_string(), Value::Object(agg));
    if let Some(aggs) = order_support {
        level.insert("aggs".to_string(), Value::Object(aggs));
    }
}

fn geohash_grid(spec: &BucketSpec) -> Value {
    let mut agg = Map::new();
    insert_opt(&mut agg, "field", spec.field.as_deref());
    if let Some(precision) = spec.settings.as_ref().and_then(|s| s.precision.as_ref()) {
        agg.insert("precision".to_string(), precision.clone());
    }
    Value::Object(agg)
}
