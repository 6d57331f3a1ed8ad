//! Query DSL compilation

pub mod adhoc;
pub mod buckets;
pub mod coerce;
pub mod compiler;
pub mod document;
pub mod metrics;
pub mod range;
pub mod terms_lookup;
pub mod types;

pub use compiler::{CompiledQuery, QueryCompiler, LUCENE_QUERY};
pub use types::{
    AdhocFilter, BucketKind, BucketSettings, BucketSpec, FieldType, FilterSpec, MetricSpec,
    QuerySpec, TermsLookup, TimeZone,
};
