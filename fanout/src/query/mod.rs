//! Query model for Fanout
//!
//! The query tree, its rewrite rules, sort specifications and the search
//! request that carries them.

pub mod ast;
pub mod request;
pub mod rewrite;
pub mod sort;

pub use ast::{BoolQuery, QueryNode, RangeQuery, TermQuery};
pub use request::{PointInTimeRef, SearchRequest, TrackTotalHits};
pub use rewrite::rewrite;
pub use sort::{MissingValue, SortComparator, SortField, SortOrder, SortSpec, SortValue};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid field: {0}")]
    InvalidField(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unsupported sort: {0}")]
    UnsupportedSort(String),
}

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn test_invalid_field_error() {
        let err = QueryError::InvalidField("unknown_field".to_string());
        assert!(err.to_string().contains("unknown_field"));
    }

    #[test]
    fn test_query_error_converts_to_execution_error() {
        let err: crate::Error = QueryError::UnsupportedSort("color".to_string()).into();
        assert_eq!(err.error_type(), "query_execution");
        assert!(err.to_string().contains("color"));
    }
}
