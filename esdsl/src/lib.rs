//! Elasticsearch query DSL compiler for dashboard panels
//!
//! Translates the declarative query a dashboard editor produces (nested
//! bucket aggregations, metric aggregations and ad-hoc key/value filters)
//! into an Elasticsearch search body. Two DSL dialects are supported,
//! selected by the major version of the target cluster.
//!
//! # Output
//!
//! The compiled document contains placeholder tokens that a templating
//! stage substitutes before the request is sent:
//!
//! - `$timeFrom` / `$timeTo` - dashboard time range bounds
//! - `$lucene_query` - the panel's query string
//! - `$interval` - auto-calculated histogram interval
//!
//! # Bucket aggregations
//!
//! - `date_histogram`
//! - `histogram`
//! - `filters`
//! - `terms` / `terms_histogram`
//! - `geohash_grid`
//!
//! # Example
//!
//! ```
//! use esdsl::{QueryCompiler, QuerySpec};
//!
//! let compiler = QueryCompiler::new("@timestamp", 2);
//! let query = compiler.build(&QuerySpec::default(), None).unwrap();
//! assert_eq!(query.as_value()["aggs"]["2"]["date_histogram"]["interval"], "$interval");
//! ```

pub mod config;
pub mod error;
pub mod query;

pub use config::Config;
pub use error::QueryError;
pub use query::{
    AdhocFilter, BucketKind, BucketSpec, CompiledQuery, MetricSpec, QueryCompiler, QuerySpec,
    TermsLookup, TimeZone,
};

/// Result type for query compilation
pub type Result<T> = std::result::Result<T, QueryError>;
