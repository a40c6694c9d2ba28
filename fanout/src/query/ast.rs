use crate::index::Document;
use serde::{Deserialize, Serialize};

/// Query tree evaluated per document by the shard executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryNode {
    /// Every live document, score 1.0
    MatchAll,

    /// No documents
    MatchNone,

    /// Exact keyword match, or numeric equality on long fields
    Term(TermQuery),

    /// Numeric range over a long field
    Range(RangeQuery),

    /// Documents with any value for the field
    Exists { field: String },

    /// Boolean combination of clauses
    Bool(BoolQuery),

    /// Wraps a filter and replaces its score with `boost`
    ConstantScore {
        filter: Box<QueryNode>,
        #[serde(default = "default_boost")]
        boost: f32,
    },
}

fn default_boost() -> f32 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermQuery {
    pub field: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeQuery {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gt: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gte: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lt: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lte: Option<i64>,
}

impl RangeQuery {
    /// Inclusive `(lower, upper)` bounds, or `None` when the range is empty
    pub fn bounds(&self) -> Option<(i64, i64)> {
        let mut lower = i64::MIN;
        let mut upper = i64::MAX;
        if let Some(gt) = self.gt {
            lower = lower.max(gt.checked_add(1)?);
        }
        if let Some(gte) = self.gte {
            lower = lower.max(gte);
        }
        if let Some(lt) = self.lt {
            upper = upper.min(lt.checked_sub(1)?);
        }
        if let Some(lte) = self.lte {
            upper = upper.min(lte);
        }
        (lower <= upper).then_some((lower, upper))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoolQuery {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must: Vec<QueryNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub should: Vec<QueryNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must_not: Vec<QueryNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filter: Vec<QueryNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_should_match: Option<usize>,
}

impl BoolQuery {
    /// Should clauses that must match: explicit setting, else one when the
    /// bool has no required clauses
    pub fn effective_minimum_should_match(&self) -> usize {
        match self.minimum_should_match {
            Some(n) => n,
            None if self.must.is_empty() && self.filter.is_empty() && !self.should.is_empty() => 1,
            None => 0,
        }
    }
}

impl QueryNode {
    pub fn term(field: impl Into<String>, value: impl Into<String>) -> Self {
        QueryNode::Term(TermQuery {
            field: field.into(),
            value: value.into(),
        })
    }

    /// Inclusive range `[gte, lte]`; `None` leaves a side open
    pub fn range(field: impl Into<String>, gte: Option<i64>, lte: Option<i64>) -> Self {
        QueryNode::Range(RangeQuery {
            field: field.into(),
            gte,
            lte,
            ..Default::default()
        })
    }

    pub fn exists(field: impl Into<String>) -> Self {
        QueryNode::Exists {
            field: field.into(),
        }
    }

    pub fn constant_score(self, boost: f32) -> Self {
        QueryNode::ConstantScore {
            filter: Box::new(self),
            boost,
        }
    }

    pub fn must(clauses: Vec<QueryNode>) -> Self {
        QueryNode::Bool(BoolQuery {
            must: clauses,
            ..Default::default()
        })
    }

    pub fn filter(clauses: Vec<QueryNode>) -> Self {
        QueryNode::Bool(BoolQuery {
            filter: clauses,
            ..Default::default()
        })
    }

    pub fn should(clauses: Vec<QueryNode>) -> Self {
        QueryNode::Bool(BoolQuery {
            should: clauses,
            ..Default::default()
        })
    }

    pub fn negate(self) -> Self {
        QueryNode::Bool(BoolQuery {
            must_not: vec![self],
            filter: vec![QueryNode::MatchAll],
            ..Default::default()
        })
    }

    /// Query type label for logging
    pub fn query_type(&self) -> &'static str {
        match self {
            QueryNode::MatchAll => "match_all",
            QueryNode::MatchNone => "match_none",
            QueryNode::Term(_) => "term",
            QueryNode::Range(_) => "range",
            QueryNode::Exists { .. } => "exists",
            QueryNode::Bool(_) => "bool",
            QueryNode::ConstantScore { .. } => "constant_score",
        }
    }

    /// Score of `doc`, or `None` when it does not match
    pub fn score(&self, doc: &Document) -> Option<f32> {
        match self {
            QueryNode::MatchAll => Some(1.0),
            QueryNode::MatchNone => None,
            QueryNode::Term(t) => doc
                .get(&t.field)
                .filter(|v| v.matches_term(&t.value))
                .map(|_| 1.0),
            QueryNode::Range(r) => {
                let (lower, upper) = r.bounds()?;
                doc.long(&r.field)
                    .filter(|v| *v >= lower && *v <= upper)
                    .map(|_| 1.0)
            }
            QueryNode::Exists { field } => doc
                .get(field)
                .filter(|v| !v.keywords().is_empty())
                .map(|_| 1.0),
            QueryNode::Bool(b) => {
                let mut score = 0.0;
                for clause in &b.must {
                    score += clause.score(doc)?;
                }
                for clause in &b.filter {
                    clause.score(doc)?;
                }
                if b.must_not.iter().any(|c| c.score(doc).is_some()) {
                    return None;
                }
                let mut matched_should = 0;
                for clause in &b.should {
                    if let Some(s) = clause.score(doc) {
                        matched_should += 1;
                        score += s;
                    }
                }
                (matched_should >= b.effective_minimum_should_match()).then_some(score)
            }
            QueryNode::ConstantScore { filter, boost } => filter.score(doc).map(|_| *boost),
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.score(doc).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> Document {
        Document::new("1")
            .with_long("price", 50)
            .with_keyword("color", "red")
    }

    #[test]
    fn test_leaf_queries() {
        let d = doc();
        assert_eq!(QueryNode::MatchAll.score(&d), Some(1.0));
        assert_eq!(QueryNode::MatchNone.score(&d), None);
        assert!(QueryNode::term("color", "red").matches(&d));
        assert!(QueryNode::term("price", "50").matches(&d));
        assert!(!QueryNode::term("color", "blue").matches(&d));
        assert!(QueryNode::exists("price").matches(&d));
        assert!(!QueryNode::exists("size").matches(&d));
    }

    #[test]
    fn test_range_bounds() {
        let exclusive = RangeQuery {
            field: "price".into(),
            gt: Some(10),
            lt: Some(20),
            ..Default::default()
        };
        assert_eq!(exclusive.bounds(), Some((11, 19)));

        let empty = RangeQuery {
            field: "price".into(),
            gt: Some(i64::MAX),
            ..Default::default()
        };
        assert_eq!(empty.bounds(), None);

        assert!(QueryNode::range("price", Some(50), Some(50)).matches(&doc()));
        assert!(!QueryNode::range("price", Some(51), None).matches(&doc()));
    }

    #[test]
    fn test_bool_scoring_sums_must_and_should() {
        let q = QueryNode::Bool(BoolQuery {
            must: vec![QueryNode::term("color", "red")],
            should: vec![QueryNode::exists("price"), QueryNode::exists("size")],
            ..Default::default()
        });
        assert_eq!(q.score(&doc()), Some(2.0));
    }

    #[test]
    fn test_bool_filter_and_must_not() {
        let q = QueryNode::Bool(BoolQuery {
            filter: vec![QueryNode::exists("price")],
            must_not: vec![QueryNode::term("color", "blue")],
            ..Default::default()
        });
        assert_eq!(q.score(&doc()), Some(0.0));
        assert!(!QueryNode::term("color", "red").negate().matches(&doc()));
    }

    #[test]
    fn test_should_only_requires_one_match() {
        let q = QueryNode::should(vec![QueryNode::exists("size"), QueryNode::exists("weight")]);
        assert!(!q.matches(&doc()));

        let q = QueryNode::Bool(BoolQuery {
            should: vec![QueryNode::exists("price"), QueryNode::exists("color")],
            minimum_should_match: Some(2),
            ..Default::default()
        });
        assert!(q.matches(&doc()));
    }

    #[test]
    fn test_constant_score_replaces_score() {
        let q = QueryNode::term("color", "red").constant_score(3.5);
        assert_eq!(q.score(&doc()), Some(3.5));
        assert_eq!(q.query_type(), "constant_score");
    }

    #[test]
    fn test_json_shape() {
        let q: QueryNode = serde_json::from_str(
            r#"{"bool": {"must": [{"term": {"field": "color", "value": "red"}}],
                         "filter": [{"range": {"field": "price", "gte": 10}}]}}"#,
        )
        .unwrap();
        assert!(q.matches(&doc()));

        let all: QueryNode = serde_json::from_str(r#""match_all""#).unwrap();
        assert_eq!(all, QueryNode::MatchAll);
    }
}
