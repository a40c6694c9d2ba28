//! Shard fan-out for one cluster.
//!
//! ```text
//! targets → [ensure search active → query phase] × N → reducer → ReductionOutput
//!                 ↑ bounded by max_concurrent_shard_requests
//!                 ↑ every shard shares the search's CancellableTask
//! ```
//!
//! A failing shard either aborts the search (partial results disallowed,
//! remaining shards are cancelled) or is recorded against the cluster.

use crate::config::CoordinatorConfig;
use crate::error::{ClusterError, Result};
use crate::metrics;
use crate::reduce::{QueryPhaseReducer, ReductionOutput};
use crate::response::{ClusterResult, ShardFailureInfo};
use crate::routing::ShardTarget;
use crate::transport::ShardTransport;
use fanout::config::BreakerConfig;
use fanout::query::{SearchRequest, TrackTotalHits};
use fanout::search::{CancellableTask, CircuitBreaker, PartialResult, ShardRequest};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// What one cluster contributed to a search
#[derive(Debug, Clone)]
pub struct ClusterSearchOutcome {
    pub output: ReductionOutput,
    pub result: ClusterResult,
}

pub struct SearchCoordinator {
    config: CoordinatorConfig,
    breaker_config: BreakerConfig,
    breaker: Arc<CircuitBreaker>,
}

impl SearchCoordinator {
    pub fn new(
        config: CoordinatorConfig,
        breaker_config: BreakerConfig,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            config,
            breaker_config,
            breaker,
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// A reducer sized for `request`, charged to this coordinator's breaker
    pub fn reducer(
        &self,
        request: &SearchRequest,
        track: TrackTotalHits,
    ) -> Result<QueryPhaseReducer> {
        QueryPhaseReducer::new(
            &request.sort,
            request.top_n(),
            request.batched_reduce_size,
            track,
            &self.breaker,
            &self.breaker_config,
        )
    }

    /// Run the query phase on every target of one cluster and reduce the
    /// results as they arrive
    pub async fn execute(
        &self,
        alias: &str,
        transport: &Arc<dyn ShardTransport>,
        request: &SearchRequest,
        track: TrackTotalHits,
        targets: Vec<ShardTarget>,
        task: &Arc<CancellableTask>,
    ) -> Result<ClusterSearchOutcome> {
        task.ensure_not_cancelled()?;
        let started = Instant::now();
        let mut reducer = self.reducer(request, track)?;
        let mut cluster = ClusterResult::running(alias, targets.len());

        debug!(cluster = %alias, shards = targets.len(), "Dispatching query phase");

        let shard_requests = targets.into_iter().map(|target| {
            let mut shard_request = ShardRequest::from_search(
                request,
                target.shard_id.clone(),
                target.shard_index,
                track,
            );
            if let Some(context) = &target.reader_context {
                shard_request = shard_request.with_reader_context(context.clone());
            }
            let transport = Arc::clone(transport);
            let task = Arc::clone(task);
            async move {
                let outcome = tokio::select! {
                    biased;
                    _ = task.cancelled() => Err(ClusterError::Cancelled {
                        reason: task.reason().unwrap_or_else(|| "cancelled".to_string()),
                    }),
                    result = query_shard(transport.as_ref(), shard_request, Arc::clone(&task)) => {
                        result
                    }
                };
                (target, outcome)
            }
        });
        let concurrency = self.config.max_concurrent_shard_requests.max(1);
        let mut in_flight = stream::iter(shard_requests).buffer_unordered(concurrency);

        while let Some((target, outcome)) = in_flight.next().await {
            match outcome {
                Ok(partial) => {
                    debug!(
                        cluster = %alias,
                        shard = %target.shard_id,
                        hits = partial.hits.len(),
                        "Shard query phase succeeded"
                    );
                    cluster.successful_shards += 1;
                    if let Err(e) = reducer.consume(partial) {
                        task.cancel(format!("reduce failed: {e}"));
                        return Err(e);
                    }
                }
                Err(e) if e.is_cancellation() && !task.timed_out() => {
                    return Err(e);
                }
                Err(e) => {
                    metrics::record_shard_failure(alias, e.error_type());
                    if e.is_cancellation() {
                        cluster.timed_out = true;
                    }
                    if !request.allow_partial_results {
                        task.cancel(format!("shard {} failed", target.shard_id));
                        return Err(ClusterError::ShardFailure {
                            cluster: alias.to_string(),
                            shard: target.shard_id.to_string(),
                            reason: e.to_string(),
                        });
                    }
                    warn!(
                        cluster = %alias,
                        shard = %target.shard_id,
                        error = %e,
                        "Shard query phase failed"
                    );
                    cluster.record_failure(ShardFailureInfo {
                        cluster: alias.to_string(),
                        index: target.shard_id.index.clone(),
                        shard: target.shard_id.shard,
                        error_type: e.error_type().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let output = reducer.finish()?;
        cluster.took_ms = started.elapsed().as_millis() as u64;
        cluster.finish(request.allow_partial_results);
        Ok(ClusterSearchOutcome {
            output,
            result: cluster,
        })
    }
}

async fn query_shard(
    transport: &dyn ShardTransport,
    request: ShardRequest,
    task: Arc<CancellableTask>,
) -> Result<PartialResult> {
    if request.reader_context.is_none() {
        transport.ensure_search_active(&request.shard_id).await?;
    }
    transport.execute_query(request, task).await
}
