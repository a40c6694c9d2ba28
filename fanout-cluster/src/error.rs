//! Coordinator-side error types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while fanning a search out and reducing it
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClusterError {
    #[error("Query execution error: {0}")]
    QueryExecution(String),

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

    #[error("Shard [{cluster}]{shard} failed: {reason}")]
    ShardFailure {
        cluster: String,
        shard: String,
        reason: String,
    },

    #[error("All {total} shards failed: {reason}")]
    AllShardsFailed { total: usize, reason: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Cluster unavailable: {0}")]
    ClusterUnavailable(String),

    #[error("Point in time not found: {0}")]
    PointInTimeNotFound(String),

    #[error("Invalid point in time id: {0}")]
    InvalidPointInTime(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClusterError {
    /// Get the error type as a string for metrics labeling
    pub fn error_type(&self) -> &'static str {
        match self {
            ClusterError::QueryExecution(_) => "query_execution",
            ClusterError::Cancelled { .. } => "cancelled",
            ClusterError::CircuitBreaking { .. } => "circuit_breaking",
            ClusterError::TooManyShards { .. } => "too_many_shards",
            ClusterError::ShardNotFound(_) => "shard_not_found",
            ClusterError::ShardFailure { .. } => "shard_failure",
            ClusterError::AllShardsFailed { .. } => "all_shards_failed",
            ClusterError::Transport(_) => "transport",
            ClusterError::ClusterUnavailable(_) => "cluster_unavailable",
            ClusterError::PointInTimeNotFound(_) => "point_in_time_not_found",
            ClusterError::InvalidPointInTime(_) => "invalid_point_in_time",
            ClusterError::Timeout(_) => "timeout",
            ClusterError::Config(_) => "config",
            ClusterError::Internal(_) => "internal",
        }
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, ClusterError::Cancelled { .. })
    }
}

impl From<fanout::Error> for ClusterError {
    fn from(err: fanout::Error) -> Self {
        match err {
            fanout::Error::QueryExecution(msg) => ClusterError::QueryExecution(msg),
            fanout::Error::Query(e) => ClusterError::QueryExecution(e.to_string()),
            fanout::Error::Cancelled { reason } => ClusterError::Cancelled { reason },
            fanout::Error::CircuitBreaking {
                label,
                wanted,
                used,
                limit,
            } => ClusterError::CircuitBreaking {
                label,
                wanted,
                used,
                limit,
            },
            fanout::Error::TooManyShards { limit, requested } => {
                ClusterError::TooManyShards { limit, requested }
            }
            fanout::Error::ShardNotFound(shard) => ClusterError::ShardNotFound(shard),
            fanout::Error::Config(msg) => ClusterError::Config(msg),
            other => ClusterError::Internal(other.to_string()),
        }
    }
}

impl From<fanout::query::QueryError> for ClusterError {
    fn from(err: fanout::query::QueryError) -> Self {
        ClusterError::QueryExecution(err.to_string())
    }
}

impl From<serde_json::Error> for ClusterError {
    fn from(err: serde_json::Error) -> Self {
        ClusterError::Internal(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClusterError>;
