//! Shard collectors.
//!
//! Collectors are a closed set composed by wrapping. A wrapper decides
//! whether a hit reaches its inner collector; the innermost collector counts
//! and ranks what arrives. The executor builds the chain as
//! `MinScoreWrapped -> Aggregating -> Filtered -> TopN*/CountOnly` so that
//! aggregations see min-score filtering but not the post filter.

use super::result::ShardDoc;
use super::top_docs::TopDocs;
use crate::aggregations::{AggregationCollector, AggregationPartials};
use crate::error::{Error, Result};
use crate::index::Document;
use crate::query::QueryNode;

/// A matching document on its way through the collector chain
#[derive(Debug, Clone, Copy)]
pub struct DocHit<'a> {
    pub document: &'a Document,
    pub doc_id: u32,
    pub score: f32,
}

#[derive(Debug)]
pub enum Collector {
    TopNScored(TopDocs),
    TopNSorted(TopDocs),
    CountOnly {
        total: u64,
    },
    Filtered {
        filter: QueryNode,
        inner: Box<Collector>,
    },
    MinScoreWrapped {
        min_score: f32,
        inner: Box<Collector>,
    },
    Aggregating {
        aggs: AggregationCollector,
        inner: Box<Collector>,
    },
}

/// What a finished collector chain produced
#[derive(Debug, Default)]
pub struct CollectorOutput {
    pub hits: Vec<ShardDoc>,
    pub total: u64,
    pub max_score: Option<f32>,
    pub aggregations: Option<AggregationPartials>,
}

impl Collector {
    pub fn collect(&mut self, hit: &DocHit<'_>) -> Result<()> {
        match self {
            Collector::TopNScored(top) | Collector::TopNSorted(top) => {
                top.offer(hit.document, hit.doc_id, hit.score);
                Ok(())
            }
            Collector::CountOnly { total } => {
                *total += 1;
                Ok(())
            }
            Collector::Filtered { filter, inner } => {
                if filter.matches(hit.document) {
                    inner.collect(hit)
                } else {
                    Ok(())
                }
            }
            Collector::MinScoreWrapped { min_score, inner } => {
                if hit.score >= *min_score {
                    inner.collect(hit)
                } else {
                    Ok(())
                }
            }
            Collector::Aggregating { aggs, inner } => {
                aggs.collect(hit.document)?;
                inner.collect(hit)
            }
        }
    }

    /// Add a whole segment's matches without visiting them. Only a bare
    /// count collector can take counts it did not see.
    pub fn count_leaf(&mut self, matches: u64) -> Result<()> {
        match self {
            Collector::CountOnly { total } => {
                *total += matches;
                Ok(())
            }
            other => Err(Error::Internal(format!(
                "collector {} cannot accept leaf counts",
                other.name()
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Collector::TopNScored(_) => "top_n_scored",
            Collector::TopNSorted(_) => "top_n_sorted",
            Collector::CountOnly { .. } => "count_only",
            Collector::Filtered { .. } => "filtered",
            Collector::MinScoreWrapped { .. } => "min_score",
            Collector::Aggregating { .. } => "aggregating",
        }
    }

    /// The ranking buffer at the end of the chain, if any
    pub fn top_docs(&self) -> Option<&TopDocs> {
        match self {
            Collector::TopNScored(top) | Collector::TopNSorted(top) => Some(top),
            Collector::CountOnly { .. } => None,
            Collector::Filtered { inner, .. }
            | Collector::MinScoreWrapped { inner, .. }
            | Collector::Aggregating { inner, .. } => inner.top_docs(),
        }
    }

    /// Hits counted by the innermost collector
    pub fn total(&self) -> u64 {
        match self {
            Collector::TopNScored(top) | Collector::TopNSorted(top) => top.total(),
            Collector::CountOnly { total } => *total,
            Collector::Filtered { inner, .. }
            | Collector::MinScoreWrapped { inner, .. }
            | Collector::Aggregating { inner, .. } => inner.total(),
        }
    }

    pub fn finish(self) -> CollectorOutput {
        match self {
            Collector::TopNScored(top) | Collector::TopNSorted(top) => {
                let (hits, total, max_score) = top.into_parts();
                CollectorOutput {
                    hits,
                    total,
                    max_score,
                    aggregations: None,
                }
            }
            Collector::CountOnly { total } => CollectorOutput {
                total,
                ..Default::default()
            },
            Collector::Filtered { inner, .. } | Collector::MinScoreWrapped { inner, .. } => {
                inner.finish()
            }
            Collector::Aggregating { aggs, inner } => {
                let mut output = inner.finish();
                output.aggregations = Some(aggs.finish());
                output
            }
        }
    }
}
