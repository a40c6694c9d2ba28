use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Query execution error: {0}")]
    QueryExecution(String),

    #[error("Query execution error: {0}")]
    Query(#[from] crate::query::QueryError),

    #[error("Task cancelled: {reason}")]
    Cancelled { reason: String },

    #[error(
        "Circuit breaker [{label}] tripped: wanted {wanted} bytes with {used} bytes in use, limit is {limit} bytes"
    )]
    CircuitBreaking {
        label: String,
        wanted: u64,
        used: u64,
        limit: u64,
    },

    #[error("Trying to query {requested} shards, which is over the limit of {limit}")]
    TooManyShards { limit: usize, requested: usize },

    #[error("Shard not found: {0}")]
    ShardNotFound(String),

    #[error("Mapping error: {0}")]
    Mapping(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Error::Cancelled {
            reason: reason.into(),
        }
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled { .. })
    }

    /// Error type label used for metrics and failure reports
    pub fn error_type(&self) -> &'static str {
        match self {
            Error::QueryExecution(_) | Error::Query(_) => "query_execution",
            Error::Cancelled { .. } => "cancelled",
            Error::CircuitBreaking { .. } => "circuit_breaking",
            Error::TooManyShards { .. } => "too_many_shards",
            Error::ShardNotFound(_) => "shard_not_found",
            Error::Mapping(_) => "mapping",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::Internal(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
