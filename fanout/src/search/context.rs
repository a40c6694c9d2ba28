use super::breaker::CircuitBreaker;
use super::task::CancellableTask;
use crate::aggregations::AggregationRequest;
use crate::index::{ShardId, ShardReader};
use crate::query::{QueryNode, SearchRequest, SortSpec, SortValue, TrackTotalHits};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Per-shard slice of a search request, as sent over the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardRequest {
    pub shard_id: ShardId,
    /// Position of this shard in the coordinator's shard list, used for tie-breaks
    pub shard_index: u32,
    pub query: QueryNode,
    pub post_filter: Option<QueryNode>,
    pub sort: SortSpec,
    pub from: usize,
    pub size: usize,
    pub terminate_after: Option<u64>,
    pub min_score: Option<f32>,
    pub track_total_hits: TrackTotalHits,
    pub search_after: Option<Vec<SortValue>>,
    pub aggregations: Vec<AggregationRequest>,
    /// Search this pinned reader instead of the shard's current one
    pub reader_context: Option<String>,
    pub keep_alive_ms: Option<u64>,
}

impl ShardRequest {
    pub fn from_search(
        request: &SearchRequest,
        shard_id: ShardId,
        shard_index: u32,
        track_total_hits: TrackTotalHits,
    ) -> Self {
        Self {
            shard_id,
            shard_index,
            query: request.query.clone(),
            post_filter: request.post_filter.clone(),
            sort: request.sort.clone(),
            from: request.from,
            size: request.size,
            terminate_after: request.terminate_after,
            min_score: request.min_score,
            track_total_hits,
            search_after: request.search_after.clone(),
            aggregations: request.aggregations.clone(),
            reader_context: None,
            keep_alive_ms: request.pit.as_ref().and_then(|p| p.keep_alive_ms),
        }
    }

    pub fn with_reader_context(mut self, context_id: impl Into<String>) -> Self {
        self.reader_context = Some(context_id.into());
        self
    }

    /// Hits this shard keeps: `from + size`, never more than `terminate_after`.
    /// A zero size keeps nothing whatever `from` says.
    pub fn top_n(&self) -> usize {
        if self.size == 0 {
            return 0;
        }
        let top_n = self.from.saturating_add(self.size);
        match self.terminate_after {
            Some(t) => top_n.min(usize::try_from(t).unwrap_or(usize::MAX)),
            None => top_n,
        }
    }
}

/// Everything the query phase needs for one shard, passed explicitly
/// through the executor, strategy and collectors
#[derive(Debug, Clone)]
pub struct ShardSearchContext {
    pub request: ShardRequest,
    pub reader: ShardReader,
    pub task: Arc<CancellableTask>,
    pub breaker: Arc<CircuitBreaker>,
}

impl ShardSearchContext {
    pub fn new(
        request: ShardRequest,
        reader: ShardReader,
        task: Arc<CancellableTask>,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            request,
            reader,
            task,
            breaker,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::PointInTimeRef;

    #[test]
    fn test_top_n_capped_by_terminate_after() {
        let request = SearchRequest::default().with_from(5).with_size(10);
        let shard =
            ShardRequest::from_search(&request, ShardId::new("i", 0), 0, TrackTotalHits::Accurate);
        assert_eq!(shard.top_n(), 15);

        let request = request.with_terminate_after(3);
        let shard =
            ShardRequest::from_search(&request, ShardId::new("i", 0), 0, TrackTotalHits::Accurate);
        assert_eq!(shard.top_n(), 3);
    }

    #[test]
    fn test_pit_keep_alive_carried() {
        let mut request = SearchRequest::default();
        request.pit = Some(PointInTimeRef {
            id: "abc".into(),
            keep_alive_ms: Some(60_000),
        });
        let shard =
            ShardRequest::from_search(&request, ShardId::new("i", 1), 4, TrackTotalHits::Disabled)
                .with_reader_context("ctx-1");
        assert_eq!(shard.keep_alive_ms, Some(60_000));
        assert_eq!(shard.reader_context.as_deref(), Some("ctx-1"));
        assert_eq!(shard.shard_index, 4);
    }
}
