//! Error types for query compilation

/// Query compilation errors
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueryError {
    /// Short machine-readable error kind, mirroring ES error `type` strings
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::InvalidQuery(_) => "invalid_query",
            Self::Json(_) => "parse_exception",
        }
    }
}
