//! Incremental reduction of shard results.
//!
//! Results are buffered as they arrive. Once `batch_size` results are
//! buffered they are merged into a single entry, so memory stays bounded by
//! the batch size rather than the shard count. The buffer is charged to the
//! request circuit breaker before anything is stored in it.

use crate::error::Result;
use crate::metrics;
use fanout::aggregations::AggregationPartials;
use fanout::config::BreakerConfig;
use fanout::query::{SortComparator, SortSpec, TrackTotalHits};
use fanout::search::{CircuitBreaker, PartialResult, Reservation, ShardDoc, TotalHits};
use std::sync::Arc;

/// Merged but not yet finalized output of a reduction. Hits are the top
/// `from + size` in rank order; aggregations are still mergeable.
#[derive(Debug, Clone, PartialEq)]
pub struct ReductionOutput {
    pub hits: Vec<ShardDoc>,
    pub total_hits: Option<TotalHits>,
    pub max_score: Option<f32>,
    pub terminated_early: Option<bool>,
    pub aggregations: Option<AggregationPartials>,
    pub num_reduce_phases: usize,
}

struct Pending {
    hits: Vec<ShardDoc>,
    aggregations: Option<AggregationPartials>,
}

pub struct QueryPhaseReducer {
    comparator: SortComparator,
    top_n: usize,
    batch_size: usize,
    buffer: Vec<Pending>,
    total_hits: Option<TotalHits>,
    max_score: Option<f32>,
    terminated_early: Option<bool>,
    num_reduce_phases: usize,
    nested_reduce_phases: usize,
    consumed: usize,
    reservation: Reservation,
    hit_bytes: u64,
    bucket_bytes: u64,
}

impl QueryPhaseReducer {
    pub fn new(
        sort: &SortSpec,
        top_n: usize,
        batch_size: usize,
        track_total_hits: TrackTotalHits,
        breaker: &Arc<CircuitBreaker>,
        breaker_config: &BreakerConfig,
    ) -> Result<Self> {
        Ok(Self {
            comparator: SortComparator::new(sort),
            top_n,
            batch_size: batch_size.max(2),
            buffer: Vec::new(),
            total_hits: (!track_total_hits.is_disabled()).then(|| TotalHits::exact(0)),
            max_score: None,
            terminated_early: None,
            num_reduce_phases: 0,
            nested_reduce_phases: 0,
            consumed: 0,
            reservation: breaker.reserve(0, "reduce")?,
            hit_bytes: breaker_config.hit_bytes,
            bucket_bytes: breaker_config.bucket_bytes,
        })
    }

    /// Add one shard's result
    pub fn consume(&mut self, result: PartialResult) -> Result<()> {
        self.merge_scalars(result.total_hits, result.max_score, result.terminated_early);
        self.push(Pending {
            hits: result.hits,
            aggregations: result.aggregations,
        })
    }

    /// Add the output of another reducer, e.g. one cluster of a
    /// cross-cluster search
    pub fn consume_reduced(&mut self, output: ReductionOutput) -> Result<()> {
        self.merge_scalars(output.total_hits, output.max_score, output.terminated_early);
        self.nested_reduce_phases += output.num_reduce_phases;
        self.push(Pending {
            hits: output.hits,
            aggregations: output.aggregations,
        })
    }

    pub fn consumed(&self) -> usize {
        self.consumed
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn reserved_bytes(&self) -> u64 {
        self.reservation.bytes()
    }

    /// Reduce whatever is still buffered and hand out the merged result
    pub fn finish(mut self) -> Result<ReductionOutput> {
        let merged = self.reduce_buffer()?;
        self.num_reduce_phases += 1;
        Ok(ReductionOutput {
            hits: merged.hits,
            total_hits: self.total_hits,
            max_score: self.max_score,
            terminated_early: self.terminated_early,
            aggregations: merged.aggregations,
            num_reduce_phases: self.num_reduce_phases + self.nested_reduce_phases,
        })
    }

    fn merge_scalars(
        &mut self,
        total_hits: Option<TotalHits>,
        max_score: Option<f32>,
        terminated_early: Option<bool>,
    ) {
        if let (Some(acc), Some(total)) = (self.total_hits, total_hits) {
            self.total_hits = Some(acc.merge(total));
        }
        if let Some(score) = max_score {
            self.max_score = Some(self.max_score.map_or(score, |m| m.max(score)));
        }
        if let Some(terminated) = terminated_early {
            self.terminated_early = Some(self.terminated_early.unwrap_or(false) || terminated);
        }
    }

    fn estimate(&self, pending: &Pending) -> u64 {
        pending.hits.len() as u64 * self.hit_bytes
            + pending
                .aggregations
                .as_ref()
                .map_or(0, |a| a.estimated_bytes(self.bucket_bytes))
    }

    fn push(&mut self, pending: Pending) -> Result<()> {
        self.reservation.grow(self.estimate(&pending))?;
        self.buffer.push(pending);
        self.consumed += 1;
        if self.buffer.len() >= self.batch_size {
            self.partial_reduce()?;
        }
        Ok(())
    }

    fn partial_reduce(&mut self) -> Result<()> {
        let buffered = self.buffer.len();
        let merged = self.reduce_buffer()?;
        let bytes = self.estimate(&merged);
        self.buffer.push(merged);
        self.num_reduce_phases += 1;
        self.reservation.resize(bytes)?;
        metrics::record_partial_reduce(buffered);
        Ok(())
    }

    fn reduce_buffer(&mut self) -> Result<Pending> {
        let mut hits = Vec::new();
        let mut aggregations: Option<AggregationPartials> = None;
        for pending in self.buffer.drain(..) {
            hits.extend(pending.hits);
            if let Some(partials) = pending.aggregations {
                aggregations = Some(match aggregations.take() {
                    Some(mut acc) => {
                        acc.merge(partials)?;
                        acc
                    }
                    None => partials,
                });
            }
        }
        hits.sort_by(|a, b| self.comparator.compare(a, b));
        hits.truncate(self.top_n);
        Ok(Pending { hits, aggregations })
    }
}
