//! Index expression resolution
//!
//! Splits a request's index expressions by cluster and turns `*` wildcards
//! into patterns matched against index names.

use crate::error::{ClusterError, Result};
use fanout::index::ShardId;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Alias under which the coordinating cluster's own shards are reported
pub const LOCAL_CLUSTER_ALIAS: &str = "(local)";

/// An index name pattern with `*` wildcards
#[derive(Debug, Clone)]
pub struct IndexPattern {
    raw: String,
    regex: Regex,
}

impl IndexPattern {
    pub fn new(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(ClusterError::QueryExecution(
                "index expression must not be empty".to_string(),
            ));
        }
        let source = format!("^{}$", regex::escape(raw).replace(r"\*", ".*"));
        let regex = Regex::new(&source).map_err(|e| {
            ClusterError::QueryExecution(format!("bad index expression [{raw}]: {e}"))
        })?;
        Ok(Self {
            raw: raw.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_wildcard(&self) -> bool {
        self.raw.contains('*')
    }

    pub fn matches(&self, index: &str) -> bool {
        self.regex.is_match(index)
    }
}

/// Group index expressions by cluster alias. Expressions without an
/// `alias:` prefix belong to the local cluster.
pub fn group_by_cluster(expressions: &[String]) -> Result<BTreeMap<String, Vec<IndexPattern>>> {
    let mut grouped: BTreeMap<String, Vec<IndexPattern>> = BTreeMap::new();
    for expression in expressions {
        let (alias, pattern) = match expression.split_once(':') {
            Some((alias, pattern)) if !alias.is_empty() => (alias.to_string(), pattern),
            Some(_) => {
                return Err(ClusterError::QueryExecution(format!(
                    "index expression [{expression}] has an empty cluster alias"
                )))
            }
            None => (LOCAL_CLUSTER_ALIAS.to_string(), expression.as_str()),
        };
        grouped.entry(alias).or_default().push(IndexPattern::new(pattern)?);
    }
    Ok(grouped)
}

/// One shard a search is dispatched to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardTarget {
    pub cluster: String,
    pub shard_id: ShardId,
    /// Unique across every cluster of the search
    pub shard_index: u32,
    /// Pinned reader of a point in time
    pub reader_context: Option<String>,
}

/// Hands out shard indices in resolution order across clusters
#[derive(Debug, Default)]
pub struct ShardIndexAllocator {
    next: u32,
}

impl ShardIndexAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target(
        &mut self,
        cluster: &str,
        shard_id: ShardId,
        reader_context: Option<String>,
    ) -> ShardTarget {
        let shard_index = self.next;
        self.next += 1;
        ShardTarget {
            cluster: cluster.to_string(),
            shard_id,
            shard_index,
            reader_context,
        }
    }

    pub fn allocated(&self) -> usize {
        self.next as usize
    }
}

/// Reject a fan-out over `limit` shards before anything is dispatched
pub fn check_shard_limit(requested: usize, limit: usize) -> Result<()> {
    if requested > limit {
        return Err(ClusterError::TooManyShards { limit, requested });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_patterns() {
        let pattern = IndexPattern::new("logs-*").unwrap();
        assert!(pattern.is_wildcard());
        assert!(pattern.matches("logs-2024"));
        assert!(pattern.matches("logs-"));
        assert!(!pattern.matches("metrics-2024"));
        assert!(!pattern.matches("old-logs-2024"));

        let exact = IndexPattern::new("a.b").unwrap();
        assert!(exact.matches("a.b"));
        assert!(!exact.matches("axb"));
        assert!(IndexPattern::new("").is_err());
    }

    #[test]
    fn test_group_by_cluster() {
        let grouped = group_by_cluster(&[
            "products".to_string(),
            "eu:products".to_string(),
            "eu:logs-*".to_string(),
        ])
        .unwrap();
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[LOCAL_CLUSTER_ALIAS][0].as_str(), "products");
        assert_eq!(grouped["eu"].len(), 2);
        // local sorts ahead of every alias made of name characters
        assert_eq!(grouped.keys().next().unwrap(), LOCAL_CLUSTER_ALIAS);

        assert!(group_by_cluster(&[":products".to_string()]).is_err());
    }

    #[test]
    fn test_shard_indices_unique_across_clusters() {
        let mut alloc = ShardIndexAllocator::new();
        let a = alloc.target(LOCAL_CLUSTER_ALIAS, ShardId::new("i", 0), None);
        let b = alloc.target("eu", ShardId::new("i", 0), Some("ctx".into()));
        assert_eq!(a.shard_index, 0);
        assert_eq!(b.shard_index, 1);
        assert_eq!(alloc.allocated(), 2);
    }

    #[test]
    fn test_shard_limit() {
        assert!(check_shard_limit(3, 3).is_ok());
        assert_eq!(
            check_shard_limit(4, 3).unwrap_err(),
            ClusterError::TooManyShards {
                limit: 3,
                requested: 4
            }
        );
    }
}
