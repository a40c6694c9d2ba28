//! Configuration management for fanout
//!
//! Loaded from a TOML file; every field has a serde default so partial
//! files are valid.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Main configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Shard-level query phase settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    /// Default hit-count tracking threshold when the request does not set one
    #[serde(default = "default_track_total_hits_up_to")]
    pub track_total_hits_up_to: u64,

    /// Number of documents collected between two cancellation checks
    #[serde(default = "default_cancellation_check_interval")]
    pub cancellation_check_interval: usize,

    /// Enable the numeric sort fast path over indexed long fields
    #[serde(default = "default_true")]
    pub numeric_sort_optimization: bool,

    /// A shard without searcher access for this long is search-idle
    #[serde(default = "default_search_idle_after_ms")]
    pub search_idle_after_ms: u64,

    /// Number of point values per block in a segment's point index
    #[serde(default = "default_points_block_size")]
    pub points_block_size: usize,
}

fn default_track_total_hits_up_to() -> u64 {
    10_000
}

fn default_cancellation_check_interval() -> usize {
    1024
}

fn default_true() -> bool {
    true
}

fn default_search_idle_after_ms() -> u64 {
    30_000
}

fn default_points_block_size() -> usize {
    512
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            track_total_hits_up_to: default_track_total_hits_up_to(),
            cancellation_check_interval: default_cancellation_check_interval(),
            numeric_sort_optimization: true,
            search_idle_after_ms: default_search_idle_after_ms(),
            points_block_size: default_points_block_size(),
        }
    }
}

impl SearchConfig {
    pub fn search_idle_after(&self) -> Duration {
        Duration::from_millis(self.search_idle_after_ms)
    }
}

/// Request circuit breaker settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BreakerConfig {
    /// Byte budget shared by all in-flight reductions and aggregations
    #[serde(default = "default_request_limit_bytes")]
    pub request_limit_bytes: u64,

    /// Estimated size of one buffered hit
    #[serde(default = "default_hit_bytes")]
    pub hit_bytes: u64,

    /// Estimated size of one aggregation bucket
    #[serde(default = "default_bucket_bytes")]
    pub bucket_bytes: u64,
}

fn default_request_limit_bytes() -> u64 {
    64 * 1024 * 1024 // 64MB
}

fn default_hit_bytes() -> u64 {
    128
}

fn default_bucket_bytes() -> u64 {
    64
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            request_limit_bytes: default_request_limit_bytes(),
            hit_bytes: default_hit_bytes(),
            bucket_bytes: default_bucket_bytes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    /// "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load config from an existing file
    pub fn load(config_path: &Path) -> Result<Self> {
        let content = fs::read_to_string(config_path)
            .map_err(|e| anyhow!("Failed to read {}: {}", config_path.display(), e))?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from file path, or create default
    pub fn load_or_create(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            Self::load(config_path)
        } else {
            let config = Config::default();
            // Try to save default config
            if let Some(parent) = config_path.parent() {
                let _ = fs::create_dir_all(parent);
            }
            let _ = config.save(config_path);
            Ok(config)
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.search.cancellation_check_interval == 0 {
            return Err(anyhow!("search.cancellation_check_interval must be at least 1"));
        }
        if self.search.points_block_size == 0 {
            return Err(anyhow!("search.points_block_size must be at least 1"));
        }
        match self.logging.format.as_str() {
            "pretty" | "json" => {}
            other => {
                return Err(anyhow!(
                    "logging.format must be 'pretty' or 'json', got '{}'",
                    other
                ))
            }
        }
        Ok(())
    }
}
