//! Search response shapes and per-cluster bookkeeping

use fanout::aggregations::AggregationResult;
use fanout::query::SortValue;
use fanout::search::TotalHits;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One hit of the final response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub cluster: String,
    pub index: String,
    pub shard: u32,
    pub id: String,
    /// Absent when hits are sorted by field
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<SortValue>,
}

/// Why one shard did not contribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardFailureInfo {
    pub cluster: String,
    pub index: String,
    pub shard: u32,
    pub error_type: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardsSummary {
    pub total: usize,
    pub successful: usize,
    pub skipped: usize,
    pub failed: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ShardFailureInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterStatus {
    Running,
    Successful,
    Partial,
    Skipped,
    Failed,
}

impl ClusterStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ClusterStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterStatus::Running => "running",
            ClusterStatus::Successful => "successful",
            ClusterStatus::Partial => "partial",
            ClusterStatus::Skipped => "skipped",
            ClusterStatus::Failed => "failed",
        }
    }
}

/// Outcome of one cluster's part of a search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterResult {
    pub alias: String,
    pub status: ClusterStatus,
    pub total_shards: usize,
    pub successful_shards: usize,
    pub skipped_shards: usize,
    pub failed_shards: usize,
    pub took_ms: u64,
    pub timed_out: bool,
    /// Deduplicated by reason
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ShardFailureInfo>,
}

impl ClusterResult {
    pub fn running(alias: impl Into<String>, total_shards: usize) -> Self {
        Self {
            alias: alias.into(),
            status: ClusterStatus::Running,
            total_shards,
            successful_shards: 0,
            skipped_shards: 0,
            failed_shards: 0,
            took_ms: 0,
            timed_out: false,
            failures: Vec::new(),
        }
    }

    /// A cluster left out of the search before anything was dispatched
    pub fn skipped(alias: impl Into<String>, reason: impl Into<String>) -> Self {
        let alias = alias.into();
        let mut result = Self::running(alias.clone(), 0);
        result.failures.push(ShardFailureInfo {
            cluster: alias,
            index: String::new(),
            shard: 0,
            error_type: "cluster_unavailable".to_string(),
            reason: reason.into(),
        });
        result.status = ClusterStatus::Skipped;
        result
    }

    /// Record a shard failure. Failures with an already seen reason only
    /// bump the count.
    pub fn record_failure(&mut self, failure: ShardFailureInfo) {
        self.failed_shards += 1;
        if !self.failures.iter().any(|f| f.reason == failure.reason) {
            self.failures.push(failure);
        }
    }

    /// Derive the terminal status. Has no effect once a status was set.
    pub fn finish(&mut self, allow_partial_results: bool) {
        if self.status.is_terminal() {
            return;
        }
        self.status = if self.failed_shards == 0 {
            ClusterStatus::Successful
        } else if self.successful_shards > 0 && allow_partial_results {
            ClusterStatus::Partial
        } else {
            ClusterStatus::Failed
        };
    }
}

/// Per-cluster summary of a cross-cluster search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClustersSummary {
    pub total: usize,
    pub successful: usize,
    pub skipped: usize,
    pub partial: usize,
    pub running: usize,
    pub failed: usize,
    pub details: BTreeMap<String, ClusterResult>,
}

impl ClustersSummary {
    pub fn from_results(results: impl IntoIterator<Item = ClusterResult>) -> Self {
        let mut summary = Self::default();
        for result in results {
            summary.total += 1;
            match result.status {
                ClusterStatus::Running => summary.running += 1,
                ClusterStatus::Successful => summary.successful += 1,
                ClusterStatus::Partial => summary.partial += 1,
                ClusterStatus::Skipped => summary.skipped += 1,
                ClusterStatus::Failed => summary.failed += 1,
            }
            summary.details.insert(result.alias.clone(), result);
        }
        summary
    }

    pub fn get(&self, alias: &str) -> Option<&ClusterResult> {
        self.details.get(alias)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub took_ms: u64,
    pub timed_out: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminated_early: Option<bool>,
    pub num_reduce_phases: usize,
    pub shards: ShardsSummary,
    /// Present when a remote cluster took part
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clusters: Option<ClustersSummary>,
    /// Absent when hit counting was disabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_hits: Option<TotalHits>,
    pub max_score: Option<f32>,
    pub hits: Vec<SearchHit>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aggregations: Vec<AggregationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pit_id: Option<String>,
}

/// Outcome of closing a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosePointInTimeResponse {
    /// False when some cluster could not be reached
    pub succeeded: bool,
    pub num_freed: usize,
}
