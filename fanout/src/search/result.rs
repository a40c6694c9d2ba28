use crate::aggregations::AggregationPartials;
use crate::index::ShardId;
use crate::query::sort::{Ranked, SortValue};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TotalHitsRelation {
    #[serde(rename = "eq")]
    EqualTo,
    #[serde(rename = "gte")]
    GreaterThanOrEqualTo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalHits {
    pub value: u64,
    pub relation: TotalHitsRelation,
}

impl TotalHits {
    pub fn exact(value: u64) -> Self {
        Self {
            value,
            relation: TotalHitsRelation::EqualTo,
        }
    }

    pub fn lower_bound(value: u64) -> Self {
        Self {
            value,
            relation: TotalHitsRelation::GreaterThanOrEqualTo,
        }
    }

    pub fn is_exact(&self) -> bool {
        self.relation == TotalHitsRelation::EqualTo
    }

    /// Sum of two counts; a lower bound on either side makes the sum one
    pub fn merge(self, other: TotalHits) -> TotalHits {
        TotalHits {
            value: self.value + other.value,
            relation: if self.is_exact() && other.is_exact() {
                TotalHitsRelation::EqualTo
            } else {
                TotalHitsRelation::GreaterThanOrEqualTo
            },
        }
    }
}

/// One ranked hit as produced by a shard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardDoc {
    /// Position of the originating shard in the request's shard list
    pub shard_index: u32,
    /// Shard-level doc id, stable within one reader
    pub doc: u32,
    pub id: String,
    pub score: f32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort_values: Vec<SortValue>,
}

impl Ranked for ShardDoc {
    fn shard_index(&self) -> u32 {
        self.shard_index
    }

    fn doc(&self) -> u32 {
        self.doc
    }

    fn score(&self) -> f32 {
        self.score
    }

    fn sort_values(&self) -> &[SortValue] {
        &self.sort_values
    }
}

/// Query phase outcome of one shard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialResult {
    pub shard_id: ShardId,
    pub shard_index: u32,
    /// Top `from + size` hits in rank order
    pub hits: Vec<ShardDoc>,
    /// `None` when hit counting was disabled
    pub total_hits: Option<TotalHits>,
    /// Set only when the request carried `terminate_after`
    pub terminated_early: Option<bool>,
    pub max_score: Option<f32>,
    pub aggregations: Option<AggregationPartials>,
}

impl PartialResult {
    pub fn empty(shard_id: ShardId, shard_index: u32) -> Self {
        Self {
            shard_id,
            shard_index,
            hits: Vec::new(),
            total_hits: Some(TotalHits::exact(0)),
            terminated_early: None,
            max_score: None,
            aggregations: None,
        }
    }
}
