//! Shared fixtures for coordinator tests
#![allow(dead_code)]

use async_trait::async_trait;
use fanout::index::{Document, IndexShard, Mapping, ShardId};
use fanout::search::{CancellableTask, PartialResult, ShardRequest};
use fanout::Config;
use fanout_cluster::{ClusterError, IndexPattern, LocalTransport, Result, ShardTransport};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Build a cluster holding one index whose shards carry `docs[s]` documents.
/// Document `d` of shard `s` gets `rank = d * shards + s`, so ranks are
/// unique across the index.
pub fn cluster(name: &str, index: &str, docs: &[u32]) -> Arc<LocalTransport> {
    let transport = LocalTransport::new(name, &Config::default());
    add_index(&transport, index, docs);
    Arc::new(transport)
}

pub fn add_index(transport: &LocalTransport, index: &str, docs: &[u32]) {
    let shard_count = docs.len() as i64;
    let shards = docs
        .iter()
        .enumerate()
        .map(|(s, n)| {
            let shard = IndexShard::new(
                ShardId::new(index, s as u32),
                Mapping::new().with_long("rank").with_keyword("tag"),
            );
            for d in 0..*n {
                let rank = i64::from(d) * shard_count + s as i64;
                let tag = if rank % 2 == 0 { "even" } else { "odd" };
                shard
                    .index(
                        Document::new(format!("{}-{index}-{s}-{d}", transport.name()))
                            .with_long("rank", rank)
                            .with_keyword("tag", tag),
                    )
                    .expect("document matches mapping");
            }
            shard.refresh();
            Arc::new(shard)
        })
        .collect();
    transport.add_index(index, shards);
}

/// Wraps a [`LocalTransport`], failing or stalling chosen shards
pub struct FaultyTransport {
    inner: Arc<LocalTransport>,
    failing: Mutex<HashSet<ShardId>>,
    refusing: Mutex<HashSet<ShardId>>,
    slow: Mutex<HashSet<ShardId>>,
    delay: Duration,
}

impl FaultyTransport {
    pub fn new(inner: Arc<LocalTransport>) -> Self {
        Self {
            inner,
            failing: Mutex::new(HashSet::new()),
            refusing: Mutex::new(HashSet::new()),
            slow: Mutex::new(HashSet::new()),
            delay: Duration::from_secs(5),
        }
    }

    pub fn fail(self, shard: ShardId) -> Self {
        self.failing.lock().insert(shard);
        self
    }

    /// Refuse to open reader contexts on `shard`
    pub fn refuse_contexts(self, shard: ShardId) -> Self {
        self.refusing.lock().insert(shard);
        self
    }

    pub fn stall(self, shard: ShardId) -> Self {
        self.slow.lock().insert(shard);
        self
    }

    pub fn inner(&self) -> &Arc<LocalTransport> {
        &self.inner
    }
}

#[async_trait]
impl ShardTransport for FaultyTransport {
    async fn list_shards(&self, patterns: &[IndexPattern]) -> Result<Vec<ShardId>> {
        self.inner.list_shards(patterns).await
    }

    async fn ensure_search_active(&self, shard: &ShardId) -> Result<()> {
        self.inner.ensure_search_active(shard).await
    }

    async fn execute_query(
        &self,
        request: ShardRequest,
        task: Arc<CancellableTask>,
    ) -> Result<PartialResult> {
        if self.failing.lock().contains(&request.shard_id) {
            return Err(ClusterError::Transport(format!(
                "connection reset while querying {}",
                request.shard_id
            )));
        }
        let stalled = self.slow.lock().contains(&request.shard_id);
        if stalled {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.execute_query(request, task).await
    }

    async fn open_reader_context(&self, shard: &ShardId, keep_alive: Duration) -> Result<String> {
        if self.refusing.lock().contains(shard) {
            return Err(ClusterError::Transport(format!("cannot open context on {shard}")));
        }
        self.inner.open_reader_context(shard, keep_alive).await
    }

    async fn close_reader_context(&self, shard: &ShardId, context_id: &str) -> Result<bool> {
        self.inner.close_reader_context(shard, context_id).await
    }
}
