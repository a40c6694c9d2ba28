use super::ast::QueryNode;
use super::sort::{SortSpec, SortValue};
use super::QueryError;
use crate::aggregations::AggregationRequest;
use serde::{Deserialize, Serialize};

/// How precisely to count matching documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TrackTotalHitsRepr", into = "TrackTotalHitsRepr")]
pub enum TrackTotalHits {
    /// Do not report a total
    Disabled,
    /// Count every match
    Accurate,
    /// Count exactly up to the threshold, then report a lower bound
    UpTo(u64),
}

impl TrackTotalHits {
    /// Hits that must be counted before documents may be skipped
    pub fn threshold(&self) -> u64 {
        match self {
            TrackTotalHits::Disabled => 0,
            TrackTotalHits::Accurate => u64::MAX,
            TrackTotalHits::UpTo(n) => *n,
        }
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self, TrackTotalHits::Disabled)
    }
}

/// JSON form: `true`, `false` or a threshold
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum TrackTotalHitsRepr {
    Flag(bool),
    UpTo(u64),
}

impl From<TrackTotalHitsRepr> for TrackTotalHits {
    fn from(repr: TrackTotalHitsRepr) -> Self {
        match repr {
            TrackTotalHitsRepr::Flag(true) => TrackTotalHits::Accurate,
            TrackTotalHitsRepr::Flag(false) => TrackTotalHits::Disabled,
            TrackTotalHitsRepr::UpTo(n) => TrackTotalHits::UpTo(n),
        }
    }
}

impl From<TrackTotalHits> for TrackTotalHitsRepr {
    fn from(track: TrackTotalHits) -> Self {
        match track {
            TrackTotalHits::Accurate => TrackTotalHitsRepr::Flag(true),
            TrackTotalHits::Disabled => TrackTotalHitsRepr::Flag(false),
            TrackTotalHits::UpTo(n) => TrackTotalHitsRepr::UpTo(n),
        }
    }
}

/// Reference to an open point-in-time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointInTimeRef {
    pub id: String,
    /// Extends the keep-alive of every reader context the id references
    #[serde(default)]
    pub keep_alive_ms: Option<u64>,
}

/// A logical search request as received by the coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Index expressions, optionally prefixed with a cluster alias (`remote:logs-*`)
    #[serde(default)]
    pub indices: Vec<String>,
    #[serde(default = "default_query")]
    pub query: QueryNode,
    /// Filters hits after aggregation
    #[serde(default)]
    pub post_filter: Option<QueryNode>,
    #[serde(default)]
    pub sort: SortSpec,
    #[serde(default)]
    pub from: usize,
    #[serde(default = "default_size")]
    pub size: usize,
    #[serde(default)]
    pub terminate_after: Option<u64>,
    #[serde(default)]
    pub min_score: Option<f32>,
    /// Falls back to the configured threshold when unset
    #[serde(default)]
    pub track_total_hits: Option<TrackTotalHits>,
    #[serde(default)]
    pub search_after: Option<Vec<SortValue>>,
    #[serde(default)]
    pub aggregations: Vec<AggregationRequest>,
    #[serde(default = "default_batched_reduce_size")]
    pub batched_reduce_size: usize,
    #[serde(default = "default_true")]
    pub allow_partial_results: bool,
    #[serde(default)]
    pub pit: Option<PointInTimeRef>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn default_query() -> QueryNode {
    QueryNode::MatchAll
}

fn default_size() -> usize {
    10
}

fn default_batched_reduce_size() -> usize {
    512
}

fn default_true() -> bool {
    true
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            indices: Vec::new(),
            query: default_query(),
            post_filter: None,
            sort: SortSpec::default(),
            from: 0,
            size: default_size(),
            terminate_after: None,
            min_score: None,
            track_total_hits: None,
            search_after: None,
            aggregations: Vec::new(),
            batched_reduce_size: default_batched_reduce_size(),
            allow_partial_results: true,
            pit: None,
            timeout_ms: None,
        }
    }
}

impl SearchRequest {
    pub fn new(indices: Vec<String>) -> Self {
        Self {
            indices,
            ..Default::default()
        }
    }

    pub fn with_query(mut self, query: QueryNode) -> Self {
        self.query = query;
        self
    }

    pub fn with_sort(mut self, sort: SortSpec) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn with_from(mut self, from: usize) -> Self {
        self.from = from;
        self
    }

    pub fn with_terminate_after(mut self, terminate_after: u64) -> Self {
        self.terminate_after = Some(terminate_after);
        self
    }

    pub fn with_track_total_hits(mut self, track: TrackTotalHits) -> Self {
        self.track_total_hits = Some(track);
        self
    }

    pub fn with_aggregation(mut self, agg: AggregationRequest) -> Self {
        self.aggregations.push(agg);
        self
    }

    /// Number of hits every shard must return
    pub fn top_n(&self) -> usize {
        if self.size == 0 {
            return 0;
        }
        self.from.saturating_add(self.size)
    }

    pub fn track_total_hits_or(&self, default_up_to: u64) -> TrackTotalHits {
        self.track_total_hits
            .unwrap_or(TrackTotalHits::UpTo(default_up_to))
    }

    pub fn validate(&self) -> Result<(), QueryError> {
        if self.batched_reduce_size < 2 {
            return Err(QueryError::InvalidRequest(format!(
                "batched_reduce_size must be >= 2, got {}",
                self.batched_reduce_size
            )));
        }
        if self.terminate_after == Some(0) {
            return Err(QueryError::InvalidRequest(
                "terminate_after must be greater than 0".to_string(),
            ));
        }
        if let Some(min_score) = self.min_score {
            if min_score.is_nan() {
                return Err(QueryError::InvalidRequest("min_score must be a number".to_string()));
            }
        }
        if let Some(after) = &self.search_after {
            if self.sort.is_empty() {
                return Err(QueryError::InvalidRequest(
                    "search_after requires an explicit sort".to_string(),
                ));
            }
            if after.len() != self.sort.len() {
                return Err(QueryError::InvalidRequest(format!(
                    "search_after has {} values but the sort has {} fields",
                    after.len(),
                    self.sort.len()
                )));
            }
            if self.from > 0 {
                return Err(QueryError::InvalidRequest(
                    "from must be 0 when search_after is used".to_string(),
                ));
            }
        }
        if self.pit.is_some() && !self.indices.is_empty() {
            return Err(QueryError::InvalidRequest(
                "indices cannot be combined with a point in time".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::sort::SortField;

    #[test]
    fn test_request_defaults() {
        let req: SearchRequest = serde_json::from_str(r#"{"indices": ["logs"]}"#).unwrap();
        assert_eq!(req.query, QueryNode::MatchAll);
        assert_eq!(req.size, 10);
        assert_eq!(req.batched_reduce_size, 512);
        assert!(req.allow_partial_results);
        assert_eq!(req.track_total_hits_or(10_000), TrackTotalHits::UpTo(10_000));
    }

    #[test]
    fn test_track_total_hits_json() {
        let parse = |s: &str| serde_json::from_str::<TrackTotalHits>(s).unwrap();
        assert_eq!(parse("true"), TrackTotalHits::Accurate);
        assert_eq!(parse("false"), TrackTotalHits::Disabled);
        assert_eq!(parse("100"), TrackTotalHits::UpTo(100));
        assert_eq!(serde_json::to_string(&TrackTotalHits::UpTo(5)).unwrap(), "5");
        assert_eq!(TrackTotalHits::Accurate.threshold(), u64::MAX);
        assert_eq!(TrackTotalHits::Disabled.threshold(), 0);
    }

    #[test]
    fn test_validate() {
        let ok = SearchRequest::new(vec!["a".into()]);
        assert!(ok.validate().is_ok());

        let mut bad = ok.clone();
        bad.batched_reduce_size = 1;
        assert!(bad.validate().is_err());

        let bad = ok.clone().with_terminate_after(0);
        assert!(bad.validate().is_err());

        let mut bad = ok.clone();
        bad.search_after = Some(vec![SortValue::Long(1)]);
        assert!(bad.validate().is_err());

        let mut good = ok.clone().with_sort(SortSpec::by(SortField::asc("price")));
        good.search_after = Some(vec![SortValue::Long(1)]);
        assert!(good.validate().is_ok());

        let mut bad = ok.clone();
        bad.pit = Some(PointInTimeRef {
            id: "x".into(),
            keep_alive_ms: None,
        });
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_top_n_saturates() {
        let req = SearchRequest::default().with_from(usize::MAX).with_size(10);
        assert_eq!(req.top_n(), usize::MAX);
    }
}
