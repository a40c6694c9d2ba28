//! Shard transport seam.
//!
//! The coordinator reaches shards only through [`ShardTransport`]. Any error
//! a transport returns is treated as a failure of that shard; nothing is
//! retried. [`LocalTransport`] serves shards held in this process.

use crate::error::{ClusterError, Result};
use crate::routing::IndexPattern;
use async_trait::async_trait;
use fanout::index::{IndexShard, ShardId, ShardReader};
use fanout::search::{
    CancellableTask, CircuitBreaker, PartialResult, ShardExecutor, ShardRequest, ShardSearchContext,
};
use fanout::Config;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Access to the shards of one cluster
#[async_trait]
pub trait ShardTransport: Send + Sync {
    /// Shards of every index matching one of `patterns`. Fails when the
    /// cluster cannot be reached.
    async fn list_shards(&self, patterns: &[IndexPattern]) -> Result<Vec<ShardId>>;

    /// Wait until the shard is search-active, refreshing it if it went idle
    async fn ensure_search_active(&self, shard: &ShardId) -> Result<()>;

    /// Run the query phase on one shard
    async fn execute_query(
        &self,
        request: ShardRequest,
        task: Arc<CancellableTask>,
    ) -> Result<PartialResult>;

    /// Pin the shard's current reader and return the context id
    async fn open_reader_context(&self, shard: &ShardId, keep_alive: Duration) -> Result<String>;

    /// Release a pinned reader. Returns false if the context was already gone.
    async fn close_reader_context(&self, shard: &ShardId, context_id: &str) -> Result<bool>;
}

struct ReaderContext {
    shard_id: ShardId,
    reader: ShardReader,
    keep_alive: Duration,
    expires_at: Instant,
}

impl ReaderContext {
    fn touch(&mut self, keep_alive: Option<Duration>) {
        if let Some(keep_alive) = keep_alive {
            self.keep_alive = keep_alive;
        }
        self.expires_at = Instant::now() + self.keep_alive;
    }
}

/// In-process transport over [`IndexShard`]s
pub struct LocalTransport {
    name: String,
    indices: RwLock<BTreeMap<String, Vec<Arc<IndexShard>>>>,
    executor: ShardExecutor,
    breaker: Arc<CircuitBreaker>,
    contexts: Mutex<HashMap<String, ReaderContext>>,
    available: AtomicBool,
}

impl LocalTransport {
    pub fn new(name: impl Into<String>, config: &Config) -> Self {
        Self::with_breaker(
            name,
            config,
            Arc::new(CircuitBreaker::from_config(&config.breaker)),
        )
    }

    /// Share a breaker with other components of the same node
    pub fn with_breaker(
        name: impl Into<String>,
        config: &Config,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            name: name.into(),
            indices: RwLock::new(BTreeMap::new()),
            executor: ShardExecutor::new(config),
            breaker,
            contexts: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_index(&self, index: impl Into<String>, shards: Vec<Arc<IndexShard>>) {
        self.indices.write().insert(index.into(), shards);
    }

    pub fn shard(&self, shard_id: &ShardId) -> Option<Arc<IndexShard>> {
        self.indices
            .read()
            .get(&shard_id.index)
            .and_then(|shards| shards.get(shard_id.shard as usize))
            .cloned()
    }

    /// Simulate the cluster dropping off the network
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Relaxed);
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn open_contexts(&self) -> usize {
        self.contexts.lock().len()
    }

    /// Drop reader contexts whose keep-alive ran out. Returns how many went.
    /// Runs on every shard operation, so an abandoned point in time releases
    /// its readers the next time this cluster is used.
    pub fn reap_expired_contexts(&self) -> usize {
        let now = Instant::now();
        let mut contexts = self.contexts.lock();
        let before = contexts.len();
        contexts.retain(|_, ctx| ctx.expires_at > now);
        let reaped = before - contexts.len();
        if reaped > 0 {
            debug!(cluster = %self.name, reaped, "Released expired reader contexts");
        }
        reaped
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(ClusterError::Transport(format!(
                "cluster [{}] is not reachable",
                self.name
            )))
        }
    }

    fn resolve_shard(&self, shard_id: &ShardId) -> Result<Arc<IndexShard>> {
        self.shard(shard_id)
            .ok_or_else(|| ClusterError::ShardNotFound(shard_id.to_string()))
    }

    /// Reader for a request: the pinned one of its context, or a fresh one
    fn reader_for(&self, request: &ShardRequest) -> Result<ShardReader> {
        let Some(context_id) = &request.reader_context else {
            return Ok(self.resolve_shard(&request.shard_id)?.open_reader());
        };
        let mut contexts = self.contexts.lock();
        match contexts.get_mut(context_id) {
            Some(ctx) if ctx.shard_id == request.shard_id => {
                ctx.touch(request.keep_alive_ms.map(Duration::from_millis));
                Ok(ctx.reader.clone())
            }
            _ => Err(ClusterError::PointInTimeNotFound(format!(
                "no reader context [{context_id}] for shard {}, it may have expired",
                request.shard_id
            ))),
        }
    }
}

#[async_trait]
impl ShardTransport for LocalTransport {
    async fn list_shards(&self, patterns: &[IndexPattern]) -> Result<Vec<ShardId>> {
        if !self.available.load(Ordering::Relaxed) {
            return Err(ClusterError::ClusterUnavailable(self.name.clone()));
        }
        let indices = self.indices.read();
        let mut shards = Vec::new();
        for (index, index_shards) in indices.iter() {
            if patterns.iter().any(|p| p.matches(index)) {
                shards.extend(index_shards.iter().map(|s| s.shard_id().clone()));
            }
        }
        Ok(shards)
    }

    async fn ensure_search_active(&self, shard: &ShardId) -> Result<()> {
        self.ensure_available()?;
        let shard = self.resolve_shard(shard)?;
        tokio::task::spawn_blocking(move || shard.await_search_active())
            .await
            .map_err(|e| ClusterError::Internal(format!("refresh task failed: {e}")))?;
        Ok(())
    }

    async fn execute_query(
        &self,
        request: ShardRequest,
        task: Arc<CancellableTask>,
    ) -> Result<PartialResult> {
        self.ensure_available()?;
        self.reap_expired_contexts();
        let reader = self.reader_for(&request)?;
        let ctx = ShardSearchContext::new(request, reader, task, self.breaker.clone());
        let executor = self.executor.clone();
        let result = tokio::task::spawn_blocking(move || executor.execute(&ctx))
            .await
            .map_err(|e| ClusterError::Internal(format!("shard task failed: {e}")))??;
        Ok(result)
    }

    async fn open_reader_context(&self, shard: &ShardId, keep_alive: Duration) -> Result<String> {
        self.ensure_available()?;
        self.reap_expired_contexts();
        let index_shard = self.resolve_shard(shard)?;
        let reader = tokio::task::spawn_blocking(move || {
            index_shard.await_search_active();
            index_shard.open_reader()
        })
        .await
        .map_err(|e| ClusterError::Internal(format!("refresh task failed: {e}")))?;
        let context_id = uuid::Uuid::new_v4().to_string();
        let context = ReaderContext {
            shard_id: shard.clone(),
            reader,
            keep_alive,
            expires_at: Instant::now() + keep_alive,
        };
        self.contexts.lock().insert(context_id.clone(), context);
        debug!(
            cluster = %self.name,
            shard = %shard,
            context = %context_id,
            "Opened reader context"
        );
        Ok(context_id)
    }

    async fn close_reader_context(&self, shard: &ShardId, context_id: &str) -> Result<bool> {
        self.ensure_available()?;
        self.reap_expired_contexts();
        let mut contexts = self.contexts.lock();
        let owned = contexts
            .get(context_id)
            .is_some_and(|ctx| &ctx.shard_id == shard);
        Ok(owned && contexts.remove(context_id).is_some())
    }
}
