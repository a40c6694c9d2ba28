//! Coordinator configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings of the node that fans a search out and reduces it
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CoordinatorConfig {
    /// Searches resolving to more shards than this are rejected before dispatch
    #[serde(default = "default_max_shards_per_request")]
    pub max_shards_per_request: usize,

    /// Shard requests in flight per cluster
    #[serde(default = "default_max_concurrent_shard_requests")]
    pub max_concurrent_shard_requests: usize,

    /// Time budget applied when a request carries no timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_timeout_ms: Option<u64>,

    /// Keep-alive of reader contexts opened for a point in time
    #[serde(default = "default_pit_keep_alive_ms")]
    pub default_pit_keep_alive_ms: u64,

    #[serde(default)]
    pub remote_clusters: Vec<RemoteClusterConfig>,
}

fn default_max_shards_per_request() -> usize {
    1000
}

fn default_max_concurrent_shard_requests() -> usize {
    5
}

fn default_pit_keep_alive_ms() -> u64 {
    5 * 60 * 1000
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_shards_per_request: default_max_shards_per_request(),
            max_concurrent_shard_requests: default_max_concurrent_shard_requests(),
            default_timeout_ms: None,
            default_pit_keep_alive_ms: default_pit_keep_alive_ms(),
            remote_clusters: Vec::new(),
        }
    }
}

impl CoordinatorConfig {
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }

    pub fn default_pit_keep_alive(&self) -> Duration {
        Duration::from_millis(self.default_pit_keep_alive_ms)
    }

    pub fn remote(&self, alias: &str) -> Option<&RemoteClusterConfig> {
        self.remote_clusters.iter().find(|r| r.alias == alias)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_shards_per_request == 0 {
            return Err("max_shards_per_request must be greater than 0".to_string());
        }
        if self.max_concurrent_shard_requests == 0 {
            return Err("max_concurrent_shard_requests must be greater than 0".to_string());
        }
        for remote in &self.remote_clusters {
            if remote.alias.is_empty() || remote.alias.contains(':') {
                return Err(format!("invalid remote cluster alias [{}]", remote.alias));
            }
            if remote.alias == crate::routing::LOCAL_CLUSTER_ALIAS {
                return Err(format!(
                    "remote cluster alias [{}] is reserved",
                    remote.alias
                ));
            }
        }
        Ok(())
    }
}

/// A remote cluster searchable through `alias:index` expressions
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RemoteClusterConfig {
    pub alias: String,
    /// Leave the cluster out of the search instead of failing it when it
    /// cannot be reached
    #[serde(default)]
    pub skip_unavailable: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinator_config_defaults() {
        let config: CoordinatorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.max_shards_per_request, 1000);
        assert_eq!(config.max_concurrent_shard_requests, 5);
        assert_eq!(config.default_timeout(), None);
        assert!(config.remote_clusters.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_remote_lookup_and_validation() {
        let mut config = CoordinatorConfig {
            remote_clusters: vec![RemoteClusterConfig {
                alias: "eu".into(),
                skip_unavailable: true,
            }],
            ..Default::default()
        };
        assert!(config.remote("eu").unwrap().skip_unavailable);
        assert!(config.remote("us").is_none());

        config.remote_clusters.push(RemoteClusterConfig {
            alias: "(local)".into(),
            skip_unavailable: false,
        });
        assert!(config.validate().is_err());

        let zero = CoordinatorConfig {
            max_concurrent_shard_requests: 0,
            ..Default::default()
        };
        assert!(zero.validate().is_err());
    }
}
