//! Query rewriting: validation plus simplification into a canonical tree.
//!
//! Rewriting checks for cancellation at every node so that huge generated
//! queries can be aborted before collection starts. Rewrites preserve both
//! the matching set and the scores of every document.

use super::ast::{BoolQuery, QueryNode};
use super::QueryError;
use crate::error::Result;
use crate::search::task::CancellableTask;

pub fn rewrite(query: &QueryNode, task: &CancellableTask) -> Result<QueryNode> {
    task.ensure_not_cancelled()?;
    match query {
        QueryNode::MatchAll | QueryNode::MatchNone => Ok(query.clone()),
        QueryNode::Term(t) => {
            require_field(&t.field, "term")?;
            Ok(query.clone())
        }
        QueryNode::Exists { field } => {
            require_field(field, "exists")?;
            Ok(query.clone())
        }
        QueryNode::Range(r) => {
            require_field(&r.field, "range")?;
            Ok(match r.bounds() {
                None => QueryNode::MatchNone,
                Some((lower, upper)) => QueryNode::range(
                    r.field.clone(),
                    (lower != i64::MIN).then_some(lower),
                    (upper != i64::MAX).then_some(upper),
                ),
            })
        }
        QueryNode::ConstantScore { filter, boost } => {
            if !boost.is_finite() || *boost < 0.0 {
                return Err(QueryError::InvalidQuery(format!(
                    "[constant_score] boost must be a non-negative number, got {boost}"
                ))
                .into());
            }
            Ok(match rewrite(filter, task)? {
                QueryNode::MatchNone => QueryNode::MatchNone,
                inner => QueryNode::ConstantScore {
                    filter: Box::new(inner),
                    boost: *boost,
                },
            })
        }
        QueryNode::Bool(b) => rewrite_bool(b, task),
    }
}

fn require_field(field: &str, query_type: &str) -> Result<()> {
    if field.is_empty() {
        return Err(
            QueryError::InvalidField(format!("[{query_type}] query requires a field")).into(),
        );
    }
    Ok(())
}

fn is_pure_must(b: &BoolQuery) -> bool {
    b.should.is_empty() && b.must_not.is_empty() && b.filter.is_empty()
}

fn is_pure_filter(b: &BoolQuery) -> bool {
    b.must.is_empty() && b.should.is_empty() && b.must_not.is_empty()
}

fn rewrite_bool(b: &BoolQuery, task: &CancellableTask) -> Result<QueryNode> {
    if let Some(msm) = b.minimum_should_match {
        if msm > b.should.len() {
            return Err(QueryError::InvalidQuery(format!(
                "minimum_should_match [{}] exceeds the number of should clauses [{}]",
                msm,
                b.should.len()
            ))
            .into());
        }
    }
    let required_should = b.effective_minimum_should_match();

    let mut out = BoolQuery::default();
    for clause in &b.must {
        match rewrite(clause, task)? {
            QueryNode::MatchNone => return Ok(QueryNode::MatchNone),
            QueryNode::Bool(inner) if is_pure_must(&inner) => out.must.extend(inner.must),
            other => out.must.push(other),
        }
    }

    let mut had_filter = false;
    for clause in &b.filter {
        had_filter = true;
        match rewrite(clause, task)? {
            QueryNode::MatchNone => return Ok(QueryNode::MatchNone),
            QueryNode::MatchAll => {}
            QueryNode::Bool(inner) if is_pure_filter(&inner) => out.filter.extend(inner.filter),
            other => out.filter.push(other),
        }
    }

    for clause in &b.must_not {
        match rewrite(clause, task)? {
            QueryNode::MatchAll => return Ok(QueryNode::MatchNone),
            QueryNode::MatchNone => {}
            other => out.must_not.push(other),
        }
    }

    // never-matching should clauses cannot contribute to the match count
    for clause in &b.should {
        match rewrite(clause, task)? {
            QueryNode::MatchNone => {}
            other => out.should.push(other),
        }
    }
    if required_should > out.should.len() {
        return Ok(QueryNode::MatchNone);
    }
    if !out.should.is_empty() {
        out.minimum_should_match = Some(required_should);
    }

    let only_must = out.should.is_empty() && out.must_not.is_empty() && out.filter.is_empty();
    let only_filter = out.must.is_empty() && out.should.is_empty() && out.must_not.is_empty();
    let only_should = out.must.is_empty() && out.must_not.is_empty() && out.filter.is_empty();

    if only_must && out.must.is_empty() {
        return Ok(if had_filter {
            QueryNode::MatchAll.constant_score(0.0)
        } else {
            QueryNode::MatchAll
        });
    }
    if only_must && out.must.len() == 1 {
        return Ok(out.must.remove(0));
    }
    if only_filter && out.filter.len() == 1 {
        return Ok(out.filter.remove(0).constant_score(0.0));
    }
    if only_should && out.should.len() == 1 && required_should == 1 {
        return Ok(out.should.remove(0));
    }
    Ok(QueryNode::Bool(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::index::Document;

    fn task() -> CancellableTask {
        CancellableTask::new(1, "test")
    }

    #[test]
    fn test_empty_bool_becomes_match_all() {
        let q = rewrite(&QueryNode::Bool(BoolQuery::default()), &task()).unwrap();
        assert_eq!(q, QueryNode::MatchAll);
    }

    #[test]
    fn test_single_must_unwraps() {
        let q = rewrite(&QueryNode::must(vec![QueryNode::term("a", "b")]), &task()).unwrap();
        assert_eq!(q, QueryNode::term("a", "b"));
    }

    #[test]
    fn test_single_filter_keeps_zero_score() {
        let q = rewrite(&QueryNode::filter(vec![QueryNode::exists("price")]), &task()).unwrap();
        assert_eq!(q, QueryNode::exists("price").constant_score(0.0));
    }

    #[test]
    fn test_match_none_propagates() {
        let q = QueryNode::must(vec![
            QueryNode::term("a", "b"),
            QueryNode::range("price", Some(10), Some(5)),
        ]);
        assert_eq!(rewrite(&q, &task()).unwrap(), QueryNode::MatchNone);

        let q = QueryNode::MatchAll.negate();
        assert_eq!(rewrite(&q, &task()).unwrap(), QueryNode::MatchNone);

        let q = QueryNode::should(vec![QueryNode::MatchNone]);
        assert_eq!(rewrite(&q, &task()).unwrap(), QueryNode::MatchNone);
    }

    #[test]
    fn test_nested_pure_must_is_flattened() {
        let q = QueryNode::must(vec![
            QueryNode::must(vec![QueryNode::term("a", "1"), QueryNode::term("b", "2")]),
            QueryNode::term("c", "3"),
        ]);
        match rewrite(&q, &task()).unwrap() {
            QueryNode::Bool(b) => assert_eq!(b.must.len(), 3),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_rewrite_preserves_scores() {
        let doc = Document::new("1").with_long("price", 7).with_keyword("color", "red");
        let queries = vec![
            QueryNode::filter(vec![QueryNode::MatchAll, QueryNode::exists("price")]),
            QueryNode::term("color", "blue").negate(),
            QueryNode::Bool(BoolQuery {
                must: vec![QueryNode::MatchAll],
                should: vec![QueryNode::MatchNone, QueryNode::term("color", "red")],
                ..Default::default()
            }),
            QueryNode::Bool(BoolQuery {
                filter: vec![QueryNode::MatchAll],
                should: vec![QueryNode::exists("size")],
                ..Default::default()
            }),
        ];
        for q in queries {
            let rewritten = rewrite(&q, &task()).unwrap();
            assert_eq!(q.score(&doc), rewritten.score(&doc), "{q:?} -> {rewritten:?}");
        }
    }

    #[test]
    fn test_invalid_queries_rejected() {
        assert!(rewrite(&QueryNode::term("", "x"), &task()).is_err());
        assert!(rewrite(&QueryNode::MatchAll.constant_score(f32::NAN), &task()).is_err());

        let q = QueryNode::Bool(BoolQuery {
            should: vec![QueryNode::exists("a")],
            minimum_should_match: Some(2),
            ..Default::default()
        });
        let err = rewrite(&q, &task()).unwrap_err();
        assert!(err.to_string().contains("minimum_should_match"));
    }

    #[test]
    fn test_cancelled_task_aborts_rewrite() {
        let t = task();
        t.cancel("simulated");
        let err = rewrite(&QueryNode::MatchAll, &t).unwrap_err();
        assert!(matches!(err, Error::Cancelled { .. }));
    }
}
