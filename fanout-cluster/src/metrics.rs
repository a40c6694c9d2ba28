//! Coordinator observability metrics
//!
//! Prometheus-compatible metrics for fan-out and reduction:
//! - search duration and outcome
//! - shard failures by error type
//! - reduce phases per search
//! - cluster status in cross-cluster searches
//! - point-in-time contexts

use crate::response::ClusterStatus;
use std::time::Duration;

/// Record a finished search
pub fn record_search(duration: Duration, outcome: &str) {
    metrics::counter!(
        "fanout_searches_total",
        "outcome" => outcome.to_string(),
    )
    .increment(1);

    metrics::histogram!("fanout_search_duration_seconds").record(duration.as_secs_f64());
}

/// Record a failed shard request
pub fn record_shard_failure(cluster: &str, error_type: &str) {
    metrics::counter!(
        "fanout_shard_failures_total",
        "cluster" => cluster.to_string(),
        "error_type" => error_type.to_string(),
    )
    .increment(1);
}

/// Record the number of reduce phases a search needed
pub fn record_reduce_phases(phases: usize) {
    metrics::histogram!("fanout_reduce_phases").record(phases as f64);
}

/// Record a partial reduce of a full buffer
pub fn record_partial_reduce(buffered: usize) {
    metrics::counter!("fanout_partial_reduces_total").increment(1);
    metrics::histogram!("fanout_partial_reduce_size").record(buffered as f64);
}

/// Record the final status of one cluster in a search
pub fn record_cluster_status(alias: &str, status: ClusterStatus) {
    metrics::counter!(
        "fanout_cluster_searches_total",
        "cluster" => alias.to_string(),
        "status" => status.as_str().to_string(),
    )
    .increment(1);
}

/// Record reader contexts opened for a point in time
pub fn record_pit_opened(contexts: usize) {
    metrics::counter!("fanout_pit_opened_total").increment(1);
    metrics::gauge!("fanout_pit_contexts").increment(contexts as f64);
}

/// Record reader contexts freed when a point in time is closed
pub fn record_pit_closed(freed: usize) {
    metrics::counter!("fanout_pit_closed_total").increment(1);
    metrics::gauge!("fanout_pit_contexts").decrement(freed as f64);
}
