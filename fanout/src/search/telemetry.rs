//! Shard query phase telemetry and metrics

use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

/// Metrics collected while executing one shard's query phase
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShardQueryMetrics {
    pub shard: String,
    pub query_type: String,
    pub strategy: String,
    pub rewrite_ms: f64,
    pub collect_ms: f64,
    pub total_ms: f64,
    pub hits: usize,
    pub total_hits: u64,
    pub terminated_early: bool,
    pub count_shortcut_leaves: usize,
    pub skipped_docs: bool,
}

/// Helper for tracking query execution stages
pub struct QueryTelemetry {
    start: Instant,
    last_mark: Instant,
    stages: Vec<(&'static str, f64)>,
}

impl QueryTelemetry {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_mark: now,
            stages: Vec::new(),
        }
    }

    /// Mark the completion of a stage and record its duration
    pub fn mark_stage(&mut self, stage_name: &'static str) {
        let now = Instant::now();
        let duration_ms = (now - self.last_mark).as_secs_f64() * 1000.0;
        self.stages.push((stage_name, duration_ms));
        self.last_mark = now;
    }

    pub fn stage_duration(&self, stage_name: &str) -> f64 {
        self.stages
            .iter()
            .find(|(name, _)| *name == stage_name)
            .map(|(_, duration)| *duration)
            .unwrap_or(0.0)
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for QueryTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

/// Log and record a completed shard query phase
pub fn record_shard_query_success(metrics: &ShardQueryMetrics) {
    debug!(
        shard = %metrics.shard,
        query_type = %metrics.query_type,
        strategy = %metrics.strategy,
        hits = metrics.hits,
        total_hits = metrics.total_hits,
        terminated_early = metrics.terminated_early,
        count_shortcut_leaves = metrics.count_shortcut_leaves,
        rewrite_ms = metrics.rewrite_ms,
        collect_ms = metrics.collect_ms,
        total_ms = metrics.total_ms,
        "Shard query phase completed"
    );

    metrics::histogram!(
        "fanout_shard_query_duration_seconds",
        "strategy" => metrics.strategy.clone()
    )
    .record(metrics.total_ms / 1000.0);
    if metrics.terminated_early {
        metrics::counter!("fanout_shard_early_terminations_total").increment(1);
    }
    if metrics.count_shortcut_leaves > 0 {
        metrics::counter!("fanout_count_shortcut_leaves_total")
            .increment(metrics.count_shortcut_leaves as u64);
    }
    if metrics.skipped_docs {
        metrics::counter!("fanout_numeric_sort_skips_total").increment(1);
    }

    // Warn on slow shard queries
    if metrics.total_ms > 500.0 {
        warn!(
            shard = %metrics.shard,
            total_ms = metrics.total_ms,
            collect_ms = metrics.collect_ms,
            "Slow shard query detected"
        );
    }
}

/// Log and record a failed shard query phase
pub fn record_shard_query_failure(shard: &str, error_type: &str, error: &str) {
    if error_type == "cancelled" {
        debug!(shard = %shard, error = %error, "Shard query phase cancelled");
    } else {
        warn!(shard = %shard, error_type = %error_type, error = %error, "Shard query phase failed");
    }
    metrics::counter!("fanout_shard_query_failures_total", "error_type" => error_type.to_string())
        .increment(1);
}
