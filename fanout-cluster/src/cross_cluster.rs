//! Cross-cluster search.
//!
//! Every search goes through [`CrossClusterSearch`], a local-only search
//! being the case of a single participating cluster. Each cluster is fanned
//! out and reduced by the [`SearchCoordinator`]; cluster outputs are then
//! reduced once more into the global top hits.
//!
//! # Example
//!
//! ```ignore
//! let mut search = CrossClusterSearch::new(local, CoordinatorConfig::default(), &Config::default());
//! search.add_remote("eu", remote)?;
//!
//! let response = search.search(SearchRequest::new(vec!["logs".into(), "eu:logs".into()])).await?;
//! if let Some(clusters) = &response.clusters {
//!     info!("{} of {} clusters succeeded", clusters.successful, clusters.total);
//! }
//! ```

use crate::config::CoordinatorConfig;
use crate::coordinator::{ClusterSearchOutcome, SearchCoordinator};
use crate::error::{ClusterError, Result};
use crate::metrics;
use crate::pit::{PitEntry, PointInTimeId};
use crate::reduce::ReductionOutput;
use crate::response::{
    ClosePointInTimeResponse, ClusterResult, ClustersSummary, SearchHit, SearchResponse,
    ShardsSummary,
};
use crate::routing::{
    check_shard_limit, group_by_cluster, ShardIndexAllocator, ShardTarget, LOCAL_CLUSTER_ALIAS,
};
use crate::transport::ShardTransport;
use fanout::aggregations::AggregationPartials;
use fanout::query::{SearchRequest, TrackTotalHits};
use fanout::search::{CancellableTask, CircuitBreaker, TaskRegistry, TotalHits};
use fanout::Config;
use futures::future::{join_all, try_join_all};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

struct ClusterHandle {
    transport: Arc<dyn ShardTransport>,
    skip_unavailable: bool,
}

/// Shards a search resolved to, grouped by cluster in alias order
#[derive(Debug, Default)]
struct SearchPlan {
    clusters: Vec<(String, Vec<ShardTarget>)>,
    skipped: Vec<ClusterResult>,
}

impl SearchPlan {
    fn shard_count(&self) -> usize {
        self.clusters.iter().map(|(_, targets)| targets.len()).sum()
    }

    fn has_remote(&self) -> bool {
        self.clusters
            .iter()
            .any(|(alias, _)| alias != LOCAL_CLUSTER_ALIAS)
            || !self.skipped.is_empty()
    }

    fn targets(&self) -> impl Iterator<Item = &ShardTarget> {
        self.clusters.iter().flat_map(|(_, targets)| targets.iter())
    }
}

pub struct CrossClusterSearch {
    clusters: BTreeMap<String, ClusterHandle>,
    coordinator: SearchCoordinator,
    tasks: Arc<TaskRegistry>,
    track_total_hits_up_to: u64,
}

impl CrossClusterSearch {
    pub fn new(local: Arc<dyn ShardTransport>, config: CoordinatorConfig, core: &Config) -> Self {
        let breaker = Arc::new(CircuitBreaker::from_config(&core.breaker));
        Self::with_breaker(local, config, core, breaker)
    }

    /// Charge reductions to a breaker shared with the rest of the node
    pub fn with_breaker(
        local: Arc<dyn ShardTransport>,
        config: CoordinatorConfig,
        core: &Config,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        let mut clusters = BTreeMap::new();
        clusters.insert(
            LOCAL_CLUSTER_ALIAS.to_string(),
            ClusterHandle {
                transport: local,
                skip_unavailable: false,
            },
        );
        Self {
            clusters,
            coordinator: SearchCoordinator::new(config, core.breaker.clone(), breaker),
            tasks: Arc::new(TaskRegistry::new()),
            track_total_hits_up_to: core.search.track_total_hits_up_to,
        }
    }

    /// Register a remote cluster. Its `skip_unavailable` setting comes from
    /// the matching `remote_clusters` entry, defaulting to false.
    pub fn add_remote(
        &mut self,
        alias: impl Into<String>,
        transport: Arc<dyn ShardTransport>,
    ) -> Result<()> {
        let alias = alias.into();
        if alias == LOCAL_CLUSTER_ALIAS || alias.is_empty() || alias.contains(':') {
            return Err(ClusterError::Config(format!("invalid remote cluster alias [{alias}]")));
        }
        let skip_unavailable = self
            .coordinator
            .config()
            .remote(&alias)
            .is_some_and(|r| r.skip_unavailable);
        self.clusters.insert(
            alias,
            ClusterHandle {
                transport,
                skip_unavailable,
            },
        );
        Ok(())
    }

    pub fn cluster_aliases(&self) -> Vec<&str> {
        self.clusters.keys().map(String::as_str).collect()
    }

    pub fn tasks(&self) -> &Arc<TaskRegistry> {
        &self.tasks
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        self.coordinator.breaker()
    }

    /// Run a search under a freshly registered task
    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
        let timeout = request
            .timeout_ms
            .map(Duration::from_millis)
            .or_else(|| self.coordinator.config().default_timeout());
        let guard = self.tasks.register("search", timeout);
        let started = Instant::now();
        let result = self.search_with_task(&request, guard.task()).await;
        metrics::record_search(started.elapsed(), if result.is_ok() { "ok" } else { "error" });
        result
    }

    /// Run a search under a caller-owned task
    pub async fn search_with_task(
        &self,
        request: &SearchRequest,
        task: &Arc<CancellableTask>,
    ) -> Result<SearchResponse> {
        request.validate()?;
        task.ensure_not_cancelled()?;
        let started = Instant::now();
        let track = request.track_total_hits_or(self.track_total_hits_up_to);

        let plan = match &request.pit {
            Some(pit) => self.resolve_pit(&pit.id)?,
            None => self.resolve_indices(&request.indices).await?,
        };
        check_shard_limit(plan.shard_count(), self.coordinator.config().max_shards_per_request)?;
        let targets: Vec<ShardTarget> = plan.targets().cloned().collect();

        debug!(
            task = task.id(),
            clusters = plan.clusters.len(),
            shards = targets.len(),
            "Resolved search targets"
        );

        let searches = plan.clusters.iter().map(|(alias, cluster_targets)| async move {
            let handle = self.cluster(alias)?;
            self.coordinator
                .execute(alias, &handle.transport, request, track, cluster_targets.clone(), task)
                .await
        });
        let outcomes = try_join_all(searches).await?;

        let output = self.reduce_clusters(request, track, &outcomes)?;
        let mut cluster_results: Vec<ClusterResult> =
            outcomes.into_iter().map(|o| o.result).collect();
        cluster_results.extend(plan.skipped.iter().cloned());

        let shards = summarize_shards(&cluster_results);
        if shards.total > 0 && shards.successful == 0 {
            let reason = shards
                .failures
                .first()
                .map(|f| f.reason.clone())
                .unwrap_or_else(|| "no shard produced a result".to_string());
            return Err(ClusterError::AllShardsFailed {
                total: shards.total,
                reason,
            });
        }
        if shards.failed > 0 {
            warn!(
                failed = shards.failed,
                total = shards.total,
                "Search returned partial results"
            );
        }
        for result in &cluster_results {
            metrics::record_cluster_status(&result.alias, result.status);
        }

        let timed_out = task.timed_out() || cluster_results.iter().any(|c| c.timed_out);
        let clusters = plan
            .has_remote()
            .then(|| ClustersSummary::from_results(cluster_results));

        let response = assemble_response(
            request,
            track,
            output,
            &targets,
            shards,
            clusters,
            timed_out,
            started.elapsed(),
        )?;
        metrics::record_reduce_phases(response.num_reduce_phases);
        Ok(response)
    }

    /// Pin a reader on every shard the index expressions resolve to. If any
    /// shard fails to open, contexts opened so far are closed again.
    pub async fn open_point_in_time(
        &self,
        indices: &[String],
        keep_alive: Option<Duration>,
    ) -> Result<String> {
        let keep_alive =
            keep_alive.unwrap_or_else(|| self.coordinator.config().default_pit_keep_alive());
        let plan = self.resolve_indices(indices).await?;
        check_shard_limit(plan.shard_count(), self.coordinator.config().max_shards_per_request)?;

        let opens = plan.targets().map(|target| async move {
            let handle = self.cluster(&target.cluster)?;
            let context = handle
                .transport
                .open_reader_context(&target.shard_id, keep_alive)
                .await?;
            Ok::<_, ClusterError>(PitEntry {
                cluster: target.cluster.clone(),
                index: target.shard_id.index.clone(),
                shard: target.shard_id.shard,
                context,
            })
        });

        let mut entries = Vec::new();
        let mut first_error = None;
        for outcome in join_all(opens).await {
            match outcome {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            warn!(
                opened = entries.len(),
                error = %e,
                "Opening point in time failed, releasing contexts"
            );
            self.release_contexts(&entries).await;
            return Err(e);
        }
        if entries.is_empty() {
            return Err(ClusterError::InvalidPointInTime(
                "index expressions matched no shards".to_string(),
            ));
        }

        metrics::record_pit_opened(entries.len());
        info!(contexts = entries.len(), "Opened point in time");
        PointInTimeId::new(entries).encode()
    }

    /// Release every reader context of a point in time, on every cluster
    pub async fn close_point_in_time(&self, id: &str) -> Result<ClosePointInTimeResponse> {
        let pit = PointInTimeId::decode(id)?;
        let response = self.release_contexts(&pit.entries).await;
        metrics::record_pit_closed(response.num_freed);
        Ok(response)
    }

    async fn release_contexts(&self, entries: &[PitEntry]) -> ClosePointInTimeResponse {
        let closes = entries.iter().map(|entry| async move {
            let handle = self.cluster(&entry.cluster)?;
            handle
                .transport
                .close_reader_context(&entry.shard_id(), &entry.context)
                .await
        });
        let mut response = ClosePointInTimeResponse {
            succeeded: true,
            num_freed: 0,
        };
        for outcome in join_all(closes).await {
            match outcome {
                Ok(true) => response.num_freed += 1,
                Ok(false) => {}
                Err(e) => {
                    debug!(error = %e, "Failed to release reader context");
                    response.succeeded = false;
                }
            }
        }
        response
    }

    fn cluster(&self, alias: &str) -> Result<&ClusterHandle> {
        self.clusters
            .get(alias)
            .ok_or_else(|| ClusterError::Config(format!("no such remote cluster: [{alias}]")))
    }

    async fn resolve_indices(&self, indices: &[String]) -> Result<SearchPlan> {
        let expressions = if indices.is_empty() {
            vec!["*".to_string()]
        } else {
            indices.to_vec()
        };
        let mut plan = SearchPlan::default();
        let mut allocator = ShardIndexAllocator::new();
        for (alias, patterns) in group_by_cluster(&expressions)? {
            let handle = self.cluster(&alias)?;
            match handle.transport.list_shards(&patterns).await {
                Ok(shards) => {
                    let targets = shards
                        .into_iter()
                        .map(|shard| allocator.target(&alias, shard, None))
                        .collect();
                    plan.clusters.push((alias, targets));
                }
                Err(e) if handle.skip_unavailable => {
                    warn!(cluster = %alias, error = %e, "Skipping unavailable cluster");
                    plan.skipped.push(ClusterResult::skipped(alias, e.to_string()));
                }
                Err(e) => {
                    return Err(ClusterError::ClusterUnavailable(format!("[{alias}]: {e}")));
                }
            }
        }
        Ok(plan)
    }

    fn resolve_pit(&self, id: &str) -> Result<SearchPlan> {
        let pit = PointInTimeId::decode(id)?;
        let mut plan = SearchPlan::default();
        let mut allocator = ShardIndexAllocator::new();
        for (alias, entries) in pit.by_cluster() {
            if !self.clusters.contains_key(alias) {
                return Err(ClusterError::InvalidPointInTime(format!(
                    "point in time references unknown cluster [{alias}]"
                )));
            }
            let targets = entries
                .into_iter()
                .map(|e| allocator.target(alias, e.shard_id(), Some(e.context.clone())))
                .collect();
            plan.clusters.push((alias.to_string(), targets));
        }
        Ok(plan)
    }

    fn reduce_clusters(
        &self,
        request: &SearchRequest,
        track: TrackTotalHits,
        outcomes: &[ClusterSearchOutcome],
    ) -> Result<ReductionOutput> {
        if let [single] = outcomes {
            return Ok(single.output.clone());
        }
        let mut reducer = self.coordinator.reducer(request, track)?;
        for outcome in outcomes {
            reducer.consume_reduced(outcome.output.clone())?;
        }
        reducer.finish()
    }
}

fn summarize_shards(clusters: &[ClusterResult]) -> ShardsSummary {
    let mut summary = ShardsSummary::default();
    for cluster in clusters {
        summary.total += cluster.total_shards;
        summary.successful += cluster.successful_shards;
        summary.skipped += cluster.skipped_shards;
        summary.failed += cluster.failed_shards;
        summary.failures.extend(
            cluster
                .failures
                .iter()
                .filter(|f| f.error_type != "cluster_unavailable")
                .cloned(),
        );
    }
    summary
}

#[allow(clippy::too_many_arguments)]
fn assemble_response(
    request: &SearchRequest,
    track: TrackTotalHits,
    output: ReductionOutput,
    targets: &[ShardTarget],
    shards: ShardsSummary,
    clusters: Option<ClustersSummary>,
    timed_out: bool,
    took: Duration,
) -> Result<SearchResponse> {
    let total_hits = output.total_hits.map(|total| match track {
        TrackTotalHits::UpTo(limit) if total.value > limit => TotalHits::lower_bound(limit),
        _ => total,
    });

    let with_scores = request.sort.needs_scores();
    let mut hits = Vec::new();
    for doc in output.hits.into_iter().skip(request.from).take(request.size) {
        let target = targets.get(doc.shard_index as usize).ok_or_else(|| {
            ClusterError::Internal(format!("hit from unknown shard index {}", doc.shard_index))
        })?;
        hits.push(SearchHit {
            cluster: target.cluster.clone(),
            index: target.shard_id.index.clone(),
            shard: target.shard_id.shard,
            id: doc.id,
            score: with_scores.then_some(doc.score),
            sort: doc.sort_values,
        });
    }

    let aggregations = if request.aggregations.is_empty() {
        Vec::new()
    } else {
        output
            .aggregations
            .unwrap_or_else(|| AggregationPartials::empty(&request.aggregations))
            .finalize()
    };

    Ok(SearchResponse {
        took_ms: took.as_millis() as u64,
        timed_out,
        terminated_early: output.terminated_early,
        num_reduce_phases: output.num_reduce_phases,
        shards,
        clusters,
        total_hits,
        max_score: output.max_score,
        hits,
        aggregations,
        pit_id: request.pit.as_ref().map(|p| p.id.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemoteClusterConfig;
    use crate::response::ClusterStatus;
    use crate::transport::LocalTransport;
    use fanout::index::{Document, IndexShard, Mapping, ShardId};
    use fanout::search::TotalHitsRelation;

    fn cluster(name: &str, docs: &[u32]) -> Arc<LocalTransport> {
        let transport = LocalTransport::new(name, &Config::default());
        let shards = docs
            .iter()
            .enumerate()
            .map(|(s, n)| {
                let shard =
                    IndexShard::new(ShardId::new("logs", s as u32), Mapping::new().with_long("n"));
                for d in 0..*n {
                    shard
                        .index(Document::new(format!("{name}-{s}-{d}")).with_long("n", d as i64))
                        .unwrap();
                }
                shard.refresh();
                Arc::new(shard)
            })
            .collect();
        transport.add_index("logs", shards);
        Arc::new(transport)
    }

    fn local_search(docs: &[u32]) -> CrossClusterSearch {
        CrossClusterSearch::new(
            cluster("local", docs),
            CoordinatorConfig::default(),
            &Config::default(),
        )
    }

    fn search_with_remote(docs: &[u32], skip_unavailable: bool) -> CrossClusterSearch {
        CrossClusterSearch::new(
            cluster("local", docs),
            config_with_remote(skip_unavailable),
            &Config::default(),
        )
    }

    fn config_with_remote(skip_unavailable: bool) -> CoordinatorConfig {
        CoordinatorConfig {
            remote_clusters: vec![RemoteClusterConfig {
                alias: "eu".into(),
                skip_unavailable,
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_local_search_has_no_clusters_section() {
        let search = local_search(&[3, 4]);
        let response = search
            .search(SearchRequest::new(vec!["logs".into()]))
            .await
            .unwrap();
        assert_eq!(response.total_hits, Some(TotalHits::exact(7)));
        assert_eq!(response.shards.total, 2);
        assert!(response.clusters.is_none());
        assert!(response.hits.iter().all(|h| h.cluster == LOCAL_CLUSTER_ALIAS));
        assert!(search.tasks().is_empty());
    }

    #[tokio::test]
    async fn test_remote_hits_are_merged() {
        let mut search = search_with_remote(&[2], false);
        search.add_remote("eu", cluster("eu", &[3, 3])).unwrap();

        let response = search
            .search(SearchRequest::new(vec!["logs".into(), "eu:logs".into()]).with_size(20))
            .await
            .unwrap();
        assert_eq!(response.total_hits, Some(TotalHits::exact(8)));
        assert_eq!(response.hits.len(), 8);
        let clusters = response.clusters.unwrap();
        assert_eq!(clusters.total, 2);
        assert_eq!(clusters.successful, 2);
        assert_eq!(clusters.get("eu").unwrap().total_shards, 2);
    }

    #[tokio::test]
    async fn test_unavailable_remote() {
        let remote = cluster("eu", &[1]);
        remote.set_available(false);

        let mut strict = search_with_remote(&[1], false);
        strict.add_remote("eu", remote.clone()).unwrap();
        let err = strict
            .search(SearchRequest::new(vec!["logs".into(), "eu:logs".into()]))
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), "cluster_unavailable");

        let mut lenient = search_with_remote(&[1], true);
        lenient.add_remote("eu", remote).unwrap();
        let response = lenient
            .search(SearchRequest::new(vec!["logs".into(), "eu:logs".into()]))
            .await
            .unwrap();
        let clusters = response.clusters.unwrap();
        assert_eq!(clusters.skipped, 1);
        assert_eq!(clusters.get("eu").unwrap().status, ClusterStatus::Skipped);
        assert_eq!(response.total_hits.unwrap().value, 1);
    }

    #[tokio::test]
    async fn test_total_clamped_to_tracking_threshold() {
        let search = local_search(&[30, 30]);
        let request =
            SearchRequest::new(vec!["logs".into()]).with_track_total_hits(TrackTotalHits::UpTo(10));
        let response = search.search(request).await.unwrap();
        let total = response.total_hits.unwrap();
        assert_eq!(total.value, 10);
        assert_eq!(total.relation, TotalHitsRelation::GreaterThanOrEqualTo);

        let request =
            SearchRequest::new(vec!["logs".into()]).with_track_total_hits(TrackTotalHits::Disabled);
        assert_eq!(search.search(request).await.unwrap().total_hits, None);
    }

    #[tokio::test]
    async fn test_unknown_remote_alias() {
        let search = local_search(&[1]);
        let err = search
            .search(SearchRequest::new(vec!["nowhere:logs".into()]))
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), "config");
    }
}
