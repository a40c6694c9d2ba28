//! Collection strategy selection.
//!
//! Selection is a pure function of the shard context and the rewritten
//! query. It picks the collector chain, whether whole segments may be
//! counted from index statistics, and whether the numeric sort fast path
//! applies.

use super::collector::Collector;
use super::context::ShardSearchContext;
use super::top_docs::TopDocs;
use crate::aggregations::AggregationCollector;
use crate::config::{BreakerConfig, SearchConfig};
use crate::error::Result;
use crate::index::{LeafReader, Mapping};
use crate::query::sort::{MissingValue, SortOrder};
use crate::query::{QueryNode, SortValue};

/// Lifecycle of a shard's collection. `EarlyTerminated` and `Done` are
/// terminal; collection never resumes once terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionState {
    UnsortedTopN,
    SortedTopN,
    CountOnly,
    EarlyTerminated,
    Done,
}

impl CollectionState {
    pub fn is_collecting(&self) -> bool {
        matches!(
            self,
            CollectionState::UnsortedTopN | CollectionState::SortedTopN | CollectionState::CountOnly
        )
    }

    /// Returns false if the state was already terminal
    pub fn terminate_early(&mut self) -> bool {
        if !self.is_collecting() {
            return false;
        }
        *self = CollectionState::EarlyTerminated;
        true
    }

    pub fn finish(&mut self) {
        if self.is_collecting() {
            *self = CollectionState::Done;
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionState::UnsortedTopN => "unsorted_top_n",
            CollectionState::SortedTopN => "sorted_top_n",
            CollectionState::CountOnly => "count_only",
            CollectionState::EarlyTerminated => "early_terminated",
            CollectionState::Done => "done",
        }
    }
}

/// Bounds of a range over the leading ascending sort field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumericSortPlan {
    pub field: String,
    pub lower: i64,
    pub upper: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionPlan {
    pub state: CollectionState,
    /// Segments may be counted from statistics instead of visited
    pub count_shortcut: bool,
    pub numeric_sort: Option<NumericSortPlan>,
    pub top_n: usize,
    /// Matches that must be counted before any document may be skipped
    pub skip_threshold: u64,
}

impl CollectionPlan {
    pub fn select(ctx: &ShardSearchContext, query: &QueryNode, config: &SearchConfig) -> Self {
        let req = &ctx.request;
        let top_n = req.top_n();
        let state = if top_n == 0 {
            CollectionState::CountOnly
        } else if req.sort.is_field_sort() {
            CollectionState::SortedTopN
        } else {
            CollectionState::UnsortedTopN
        };

        let plain =
            req.post_filter.is_none() && req.min_score.is_none() && req.aggregations.is_empty();
        let mapping = ctx.reader.mapping();

        let count_shortcut =
            state == CollectionState::CountOnly && plain && supports_count(query, mapping);

        let numeric_sort = if config.numeric_sort_optimization
            && state == CollectionState::SortedTopN
            && plain
            && req.terminate_after.is_none()
        {
            numeric_sort_plan(ctx, query)
        } else {
            None
        };

        Self {
            state,
            count_shortcut,
            numeric_sort,
            top_n,
            skip_threshold: req.track_total_hits.threshold(),
        }
    }

    /// Build the collector chain: min score, then aggregations, then post
    /// filter, then the ranking or counting collector
    pub fn build_collector(
        &self,
        ctx: &ShardSearchContext,
        post_filter: Option<QueryNode>,
        breaker_config: &BreakerConfig,
    ) -> Result<Collector> {
        let req = &ctx.request;
        let mut collector = match self.state {
            CollectionState::SortedTopN => Collector::TopNSorted(TopDocs::new(
                req.sort.clone(),
                self.top_n,
                req.search_after.clone(),
                req.shard_index,
            )),
            CollectionState::UnsortedTopN => Collector::TopNScored(TopDocs::new(
                req.sort.clone(),
                self.top_n,
                None,
                req.shard_index,
            )),
            _ => Collector::CountOnly { total: 0 },
        };
        if let Some(filter) = post_filter {
            collector = Collector::Filtered {
                filter,
                inner: Box::new(collector),
            };
        }
        if !req.aggregations.is_empty() {
            collector = Collector::Aggregating {
                aggs: AggregationCollector::new(
                    &req.aggregations,
                    &ctx.breaker,
                    breaker_config.bucket_bytes,
                )?,
                inner: Box::new(collector),
            };
        }
        if let Some(min_score) = req.min_score {
            collector = Collector::MinScoreWrapped {
                min_score,
                inner: Box::new(collector),
            };
        }
        Ok(collector)
    }
}

fn numeric_sort_plan(ctx: &ShardSearchContext, query: &QueryNode) -> Option<NumericSortPlan> {
    let req = &ctx.request;
    let leading = req.sort.leading()?;
    if leading.order != SortOrder::Asc || leading.missing != MissingValue::Last {
        return None;
    }
    if !ctx.reader.mapping().is_indexed_long(&leading.field) {
        return None;
    }
    if let Some(after) = &req.search_after {
        if after.len() != req.sort.len() || !matches!(after.first(), Some(SortValue::Long(_))) {
            return None;
        }
    }
    let inner = match query {
        QueryNode::ConstantScore { filter, .. } => filter.as_ref(),
        other => other,
    };
    let (lower, upper) = match inner {
        QueryNode::Range(r) if r.field == leading.field => r.bounds()?,
        QueryNode::Exists { field } if *field == leading.field => (i64::MIN, i64::MAX),
        _ => return None,
    };
    Some(NumericSortPlan {
        field: leading.field.clone(),
        lower,
        upper,
    })
}

/// Whether `query` could be answered from segment statistics at all
pub fn supports_count(query: &QueryNode, mapping: &Mapping) -> bool {
    match query {
        QueryNode::MatchAll | QueryNode::MatchNone => true,
        QueryNode::Term(t) => mapping.is_indexed(&t.field),
        QueryNode::Range(r) => mapping.is_indexed_long(&r.field),
        QueryNode::Exists { field } => mapping.is_indexed(field),
        QueryNode::ConstantScore { filter, .. } => supports_count(filter, mapping),
        QueryNode::Bool(_) => false,
    }
}

/// Exact match count of `query` in one segment from statistics, or `None`
/// when the segment must be visited. Only match-all survives deletions,
/// because field statistics still include deleted documents.
pub fn leaf_count(query: &QueryNode, leaf: &LeafReader, mapping: &Mapping) -> Option<u64> {
    let segment = &leaf.segment;
    match query {
        QueryNode::MatchAll => return Some(segment.num_live()),
        QueryNode::MatchNone => return Some(0),
        _ => {}
    }
    if segment.has_deletions() {
        return None;
    }
    match query {
        QueryNode::Term(t) if mapping.is_indexed_long(&t.field) => {
            let Ok(value) = t.value.parse::<i64>() else {
                return Some(0);
            };
            Some(
                segment
                    .points(&t.field)
                    .map_or(0, |p| p.count_in_range(value, value)),
            )
        }
        QueryNode::Term(t) if mapping.is_indexed(&t.field) => {
            Some(segment.term_doc_freq(&t.field, &t.value) as u64)
        }
        QueryNode::Range(r) if mapping.is_indexed_long(&r.field) => {
            let Some((lower, upper)) = r.bounds() else {
                return Some(0);
            };
            Some(
                segment
                    .points(&r.field)
                    .map_or(0, |p| p.count_in_range(lower, upper)),
            )
        }
        QueryNode::Exists { field } if mapping.is_indexed(field) => {
            Some(segment.docs_with_value(field) as u64)
        }
        QueryNode::ConstantScore { filter, .. } => leaf_count(filter, leaf, mapping),
        _ => None,
    }
}
