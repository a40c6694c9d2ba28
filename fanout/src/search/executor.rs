//! Shard query phase.
//!
//! Rewrites the query, selects a collection plan and drives collection over
//! the reader's segments. Cancellation is polled at every rewrite node, at
//! every segment boundary and every `cancellation_check_interval` visited
//! documents.

use super::collector::{Collector, DocHit};
use super::context::ShardSearchContext;
use super::result::{PartialResult, TotalHits};
use super::strategy::{leaf_count, CollectionPlan, CollectionState, NumericSortPlan};
use super::task::CancellableTask;
use super::telemetry::{
    record_shard_query_failure, record_shard_query_success, QueryTelemetry, ShardQueryMetrics,
};
use crate::config::{BreakerConfig, Config, SearchConfig};
use crate::error::Result;
use crate::query::{rewrite, QueryNode, SortValue};

#[derive(Debug, Clone, Default)]
pub struct ShardExecutor {
    search: SearchConfig,
    breaker: BreakerConfig,
}

/// Mutable bookkeeping of one collection pass
struct CollectionRun {
    state: CollectionState,
    /// Query matches seen, before min score and post filter
    counter: u64,
    terminated_early: bool,
    skipped: bool,
    shortcut_leaves: usize,
    since_check: usize,
    check_interval: usize,
}

impl CollectionRun {
    fn new(state: CollectionState, check_interval: usize) -> Self {
        Self {
            state,
            counter: 0,
            terminated_early: false,
            skipped: false,
            shortcut_leaves: 0,
            since_check: 0,
            check_interval: check_interval.max(1),
        }
    }

    fn tick(&mut self, task: &CancellableTask) -> Result<()> {
        self.since_check += 1;
        if self.since_check >= self.check_interval {
            self.since_check = 0;
            task.ensure_not_cancelled()?;
        }
        Ok(())
    }

    fn limit_reached(&self, terminate_after: Option<u64>) -> bool {
        terminate_after.is_some_and(|t| self.counter >= t)
    }

    fn terminate(&mut self) {
        if self.state.terminate_early() {
            self.terminated_early = true;
        }
    }
}

impl ShardExecutor {
    pub fn new(config: &Config) -> Self {
        Self::with_settings(config.search.clone(), config.breaker.clone())
    }

    pub fn with_settings(search: SearchConfig, breaker: BreakerConfig) -> Self {
        Self { search, breaker }
    }

    pub fn search_config(&self) -> &SearchConfig {
        &self.search
    }

    /// Run the query phase for one shard
    pub fn execute(&self, ctx: &ShardSearchContext) -> Result<PartialResult> {
        let mut telemetry = QueryTelemetry::new();
        match self.run(ctx, &mut telemetry) {
            Ok((result, metrics)) => {
                record_shard_query_success(&metrics);
                Ok(result)
            }
            Err(e) => {
                record_shard_query_failure(
                    &ctx.request.shard_id.to_string(),
                    e.error_type(),
                    &e.to_string(),
                );
                Err(e)
            }
        }
    }

    fn run(
        &self,
        ctx: &ShardSearchContext,
        telemetry: &mut QueryTelemetry,
    ) -> Result<(PartialResult, ShardQueryMetrics)> {
        let req = &ctx.request;
        ctx.task.ensure_not_cancelled()?;
        req.sort.validate(ctx.reader.mapping())?;

        let query = rewrite(&req.query, &ctx.task)?;
        let post_filter = req
            .post_filter
            .as_ref()
            .map(|f| rewrite(f, &ctx.task))
            .transpose()?;
        telemetry.mark_stage("rewrite");

        let plan = CollectionPlan::select(ctx, &query, &self.search);
        let mut collector = plan.build_collector(ctx, post_filter, &self.breaker)?;
        let mut run = CollectionRun::new(plan.state, self.search.cancellation_check_interval);
        let strategy = if plan.numeric_sort.is_some() {
            "numeric_sort"
        } else {
            plan.state.as_str()
        };

        match &plan.numeric_sort {
            Some(numeric) => {
                self.collect_by_points(ctx, &query, &plan, numeric, &mut collector, &mut run)?
            }
            None => self.collect_leaves(ctx, &query, &plan, &mut collector, &mut run)?,
        }
        run.state.finish();
        telemetry.mark_stage("collect");

        let output = collector.finish();
        let total_hits = if req.track_total_hits.is_disabled() {
            None
        } else if run.terminated_early || run.skipped {
            Some(TotalHits::lower_bound(output.total))
        } else {
            Some(TotalHits::exact(output.total))
        };

        let metrics = ShardQueryMetrics {
            shard: req.shard_id.to_string(),
            query_type: query.query_type().to_string(),
            strategy: strategy.to_string(),
            rewrite_ms: telemetry.stage_duration("rewrite"),
            collect_ms: telemetry.stage_duration("collect"),
            total_ms: telemetry.elapsed_ms(),
            hits: output.hits.len(),
            total_hits: output.total,
            terminated_early: run.terminated_early,
            count_shortcut_leaves: run.shortcut_leaves,
            skipped_docs: run.skipped,
        };

        let result = PartialResult {
            shard_id: req.shard_id.clone(),
            shard_index: req.shard_index,
            hits: output.hits,
            total_hits,
            terminated_early: req.terminate_after.map(|_| run.terminated_early),
            max_score: output.max_score,
            aggregations: output.aggregations,
        };
        Ok((result, metrics))
    }

    /// Visit segments in order, counting whole segments from statistics
    /// where the plan allows it
    fn collect_leaves(
        &self,
        ctx: &ShardSearchContext,
        query: &QueryNode,
        plan: &CollectionPlan,
        collector: &mut Collector,
        run: &mut CollectionRun,
    ) -> Result<()> {
        let mapping = ctx.reader.mapping();
        let terminate_after = ctx.request.terminate_after;

        'leaves: for leaf in ctx.reader.leaves() {
            ctx.task.ensure_not_cancelled()?;
            if leaf.segment.num_live() == 0 {
                continue;
            }

            if plan.count_shortcut {
                if let Some(matches) = leaf_count(query, leaf, mapping) {
                    if matches == 0 {
                        continue;
                    }
                    if run.limit_reached(terminate_after) {
                        run.terminate();
                        break;
                    }
                    collector.count_leaf(matches)?;
                    run.counter += matches;
                    run.shortcut_leaves += 1;
                    if terminate_after.is_some_and(|t| run.counter > t) {
                        run.terminate();
                        break;
                    }
                    continue;
                }
            }

            for ord in leaf.segment.live_docs() {
                run.tick(&ctx.task)?;
                let document = leaf.segment.doc(ord);
                let Some(score) = query.score(document) else {
                    continue;
                };
                if run.limit_reached(terminate_after) {
                    run.terminate();
                    break 'leaves;
                }
                run.counter += 1;
                collector.collect(&DocHit {
                    document,
                    doc_id: leaf.doc_id(ord),
                    score,
                })?;
            }
        }
        Ok(())
    }

    /// Numeric sort fast path: walk each segment's point blocks in value
    /// order and stop once no remaining value can enter the top hits
    fn collect_by_points(
        &self,
        ctx: &ShardSearchContext,
        query: &QueryNode,
        plan: &CollectionPlan,
        numeric: &NumericSortPlan,
        collector: &mut Collector,
        run: &mut CollectionRun,
    ) -> Result<()> {
        let after_primary = ctx
            .request
            .search_after
            .as_ref()
            .and_then(|after| after.first())
            .and_then(SortValue::as_long);

        for leaf in ctx.reader.leaves() {
            ctx.task.ensure_not_cancelled()?;
            let Some(points) = leaf.segment.points(&numeric.field) else {
                continue;
            };

            'blocks: for block in points.blocks() {
                if block.max < numeric.lower {
                    continue;
                }
                if block.min > numeric.upper {
                    break;
                }
                if collector.total() >= plan.skip_threshold {
                    if after_primary.is_some_and(|after| block.max < after) {
                        run.skipped = true;
                        continue;
                    }
                    if competitive_bound(collector).is_some_and(|bottom| block.min > bottom) {
                        run.skipped = true;
                        break;
                    }
                }

                for &(value, ord) in &block.entries {
                    if value < numeric.lower {
                        continue;
                    }
                    if value > numeric.upper {
                        break 'blocks;
                    }
                    if !leaf.segment.is_live(ord) {
                        continue;
                    }
                    if collector.total() >= plan.skip_threshold
                        && competitive_bound(collector).is_some_and(|bottom| value > bottom)
                    {
                        run.skipped = true;
                        break 'blocks;
                    }
                    run.tick(&ctx.task)?;
                    let document = leaf.segment.doc(ord);
                    let Some(score) = query.score(document) else {
                        continue;
                    };
                    run.counter += 1;
                    collector.collect(&DocHit {
                        document,
                        doc_id: leaf.doc_id(ord),
                        score,
                    })?;
                }
            }
        }
        Ok(())
    }
}

/// Leading sort value of the worst retained hit once the top hits are full
fn competitive_bound(collector: &Collector) -> Option<i64> {
    collector
        .top_docs()?
        .bottom()?
        .sort_values
        .first()?
        .as_long()
}
