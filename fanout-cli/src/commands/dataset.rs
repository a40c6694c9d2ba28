//! JSON data sets loaded into in-process clusters.
//!
//! ```json
//! {
//!   "clusters": {
//!     "(local)": {
//!       "indices": {
//!         "logs": {
//!           "shards": 2,
//!           "mapping": { "fields": { "status": { "type": "long" } } },
//!           "documents": [ { "id": "1", "fields": { "status": 200 } } ]
//!         }
//!       }
//!     },
//!     "eu": { "indices": {} }
//!   }
//! }
//! ```

use super::config::CliConfig;
use anyhow::{bail, Context, Result};
use fanout::index::{Document, IndexShard, Mapping, ShardId};
use fanout::search::CircuitBreaker;
use fanout_cluster::{CrossClusterSearch, LocalTransport, LOCAL_CLUSTER_ALIAS};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub clusters: BTreeMap<String, ClusterData>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClusterData {
    #[serde(default)]
    pub indices: BTreeMap<String, IndexData>,
}

#[derive(Debug, Deserialize)]
pub struct IndexData {
    #[serde(default = "default_shards")]
    pub shards: u32,
    #[serde(default)]
    pub mapping: Mapping,
    #[serde(default)]
    pub documents: Vec<Document>,
}

fn default_shards() -> u32 {
    1
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Shard a document is routed to. FNV-1a over the id bytes, so placement
/// does not depend on the toolchain.
fn route(id: &str, shards: u32) -> usize {
    let hash = id
        .bytes()
        .fold(FNV_OFFSET, |hash, byte| (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME));
    (hash % u64::from(shards)) as usize
}

impl Dataset {
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Build a searcher over every cluster of the data set. Clusters other
    /// than the local one become remotes. The local shards and the
    /// coordinator charge one request breaker; each remote keeps its own.
    pub fn into_search(self, config: &CliConfig) -> Result<CrossClusterSearch> {
        let mut clusters = self.clusters;
        let breaker = Arc::new(CircuitBreaker::from_config(&config.core.breaker));
        let local_data = clusters.remove(LOCAL_CLUSTER_ALIAS).unwrap_or_default();
        let local = build_cluster(
            LOCAL_CLUSTER_ALIAS,
            local_data,
            &config.core,
            Arc::clone(&breaker),
        )?;

        let mut search = CrossClusterSearch::with_breaker(
            local,
            config.coordinator.clone(),
            &config.core,
            breaker,
        );
        for (alias, data) in clusters {
            let remote_breaker = Arc::new(CircuitBreaker::from_config(&config.core.breaker));
            let remote = build_cluster(&alias, data, &config.core, remote_breaker)?;
            search.add_remote(alias.clone(), remote)?;
        }
        Ok(search)
    }
}

fn build_cluster(
    alias: &str,
    data: ClusterData,
    core: &fanout::Config,
    breaker: Arc<CircuitBreaker>,
) -> Result<Arc<LocalTransport>> {
    let transport = LocalTransport::with_breaker(alias, core, breaker);
    for (name, index) in data.indices {
        if index.shards == 0 {
            bail!("index [{}] in cluster [{}] must have at least one shard", name, alias);
        }
        let shards: Vec<IndexShard> = (0..index.shards)
            .map(|s| {
                let shard_id = ShardId::new(name.clone(), s);
                IndexShard::with_config(shard_id, index.mapping.clone(), &core.search)
            })
            .collect();
        let documents = index.documents.len();
        for doc in index.documents {
            let target = route(&doc.id, index.shards);
            shards[target]
                .index(doc)
                .with_context(|| format!("Failed to index into [{}][{}]", alias, name))?;
        }
        for shard in &shards {
            shard.refresh();
        }
        debug!(cluster = %alias, index = %name, shards = index.shards, documents, "Loaded index");
        transport.add_index(name, shards.into_iter().map(Arc::new).collect());
    }
    info!(cluster = %alias, "Cluster ready");
    Ok(Arc::new(transport))
}
