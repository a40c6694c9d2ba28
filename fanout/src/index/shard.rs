//! In-memory index shard.
//!
//! Writes are buffered until a refresh publishes them as a new segment.
//! Searchers open [`ShardReader`] snapshots. A shard that has not been
//! accessed by a searcher for `search_idle_after` is search-idle: scheduled
//! refreshes skip it, and the next search refreshes it on demand through
//! [`IndexShard::await_search_active`].

use super::document::{Document, Mapping};
use super::reader::ShardReader;
use super::segment::Segment;
use crate::config::SearchConfig;
use crate::error::Result;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Identity of a shard: index name plus shard number
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShardId {
    pub index: String,
    pub shard: u32,
}

impl ShardId {
    pub fn new(index: impl Into<String>, shard: u32) -> Self {
        Self {
            index: index.into(),
            shard,
        }
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}][{}]", self.index, self.shard)
    }
}

enum PendingOp {
    Index(Document),
    Delete(String),
}

#[derive(Default)]
struct Segments {
    list: Vec<Arc<Segment>>,
    /// doc id -> (segment id, ord) of its live copy
    ids: HashMap<String, (u64, u32)>,
}

pub struct IndexShard {
    shard_id: ShardId,
    mapping: Arc<Mapping>,
    points_block_size: usize,
    search_idle_after: Duration,
    segments: RwLock<Segments>,
    pending: Mutex<Vec<PendingOp>>,
    next_segment_id: AtomicU64,
    created: Instant,
    last_searcher_access_ms: AtomicU64,
}

impl IndexShard {
    pub fn new(shard_id: ShardId, mapping: Mapping) -> Self {
        Self::with_config(shard_id, mapping, &SearchConfig::default())
    }

    pub fn with_config(shard_id: ShardId, mapping: Mapping, config: &SearchConfig) -> Self {
        Self {
            shard_id,
            mapping: Arc::new(mapping),
            points_block_size: config.points_block_size,
            search_idle_after: config.search_idle_after(),
            segments: RwLock::new(Segments::default()),
            pending: Mutex::new(Vec::new()),
            next_segment_id: AtomicU64::new(1),
            created: Instant::now(),
            last_searcher_access_ms: AtomicU64::new(0),
        }
    }

    pub fn with_search_idle_after(mut self, idle_after: Duration) -> Self {
        self.search_idle_after = idle_after;
        self
    }

    pub fn shard_id(&self) -> &ShardId {
        &self.shard_id
    }

    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    /// Buffer a document. Replaces any earlier document with the same id on refresh.
    pub fn index(&self, doc: Document) -> Result<()> {
        self.mapping.validate(&doc)?;
        self.pending.lock().push(PendingOp::Index(doc));
        Ok(())
    }

    pub fn delete(&self, id: impl Into<String>) {
        self.pending.lock().push(PendingOp::Delete(id.into()));
    }

    pub fn refresh_needed(&self) -> bool {
        !self.pending.lock().is_empty()
    }

    /// Publish buffered writes. Returns true when the visible state changed.
    pub fn refresh(&self) -> bool {
        let ops = std::mem::take(&mut *self.pending.lock());
        if ops.is_empty() {
            return false;
        }

        // last write per id wins, first-seen order is kept for new docs
        let mut order: Vec<String> = Vec::new();
        let mut latest: HashMap<String, Option<Document>> = HashMap::new();
        for op in ops {
            let (id, doc) = match op {
                PendingOp::Index(doc) => (doc.id.clone(), Some(doc)),
                PendingOp::Delete(id) => (id, None),
            };
            if !latest.contains_key(&id) {
                order.push(id.clone());
            }
            latest.insert(id, doc);
        }

        let mut segments = self.segments.write();

        let mut deletions: HashMap<u64, Vec<u32>> = HashMap::new();
        for id in &order {
            if let Some((segment_id, ord)) = segments.ids.remove(id) {
                deletions.entry(segment_id).or_default().push(ord);
            }
        }
        let deleted: usize = deletions.values().map(Vec::len).sum();
        if !deletions.is_empty() {
            segments.list = segments
                .list
                .iter()
                .filter_map(|segment| match deletions.get(&segment.id()) {
                    Some(ords) => {
                        let updated = segment.with_deleted(ords);
                        (updated.num_live() > 0).then(|| Arc::new(updated))
                    }
                    None => Some(segment.clone()),
                })
                .collect();
        }

        let new_docs: Vec<Document> = order
            .into_iter()
            .filter_map(|id| latest.remove(&id).flatten())
            .collect();
        let added = new_docs.len();
        if !new_docs.is_empty() {
            let segment_id = self.next_segment_id.fetch_add(1, Ordering::Relaxed);
            for (ord, doc) in new_docs.iter().enumerate() {
                segments.ids.insert(doc.id.clone(), (segment_id, ord as u32));
            }
            let segment =
                Segment::build(segment_id, new_docs, &self.mapping, self.points_block_size);
            segments.list.push(Arc::new(segment));
        }

        let changed = added > 0 || deleted > 0;
        if changed {
            metrics::counter!(
                "fanout_shard_refreshes_total",
                "index" => self.shard_id.index.clone()
            )
            .increment(1);
            debug!(
                shard = %self.shard_id,
                added,
                deleted,
                segments = segments.list.len(),
                "Refreshed shard"
            );
        }
        changed
    }

    /// Periodic refresh entry point. Search-idle shards are skipped so that
    /// their pending writes are published lazily by the next search.
    pub fn scheduled_refresh(&self) -> bool {
        if self.is_search_idle() {
            return false;
        }
        self.refresh()
    }

    pub fn mark_searcher_access(&self) {
        let now = self.created.elapsed().as_millis() as u64;
        self.last_searcher_access_ms.fetch_max(now, Ordering::Relaxed);
    }

    pub fn last_searcher_access(&self) -> Instant {
        self.created + Duration::from_millis(self.last_searcher_access_ms.load(Ordering::Relaxed))
    }

    pub fn is_search_idle(&self) -> bool {
        self.last_searcher_access().elapsed() >= self.search_idle_after
    }

    /// Make the shard search-active, refreshing if it was idle with pending
    /// writes. Returns whether a refresh ran.
    pub fn await_search_active(&self) -> bool {
        let was_idle = self.is_search_idle();
        self.mark_searcher_access();
        if was_idle && self.refresh_needed() {
            debug!(shard = %self.shard_id, "Refreshing search-idle shard before search");
            return self.refresh();
        }
        false
    }

    pub fn open_reader(&self) -> ShardReader {
        self.mark_searcher_access();
        let segments = self.segments.read();
        ShardReader::new(self.shard_id.clone(), self.mapping.clone(), &segments.list)
    }

    /// Live documents visible to searchers
    pub fn num_docs(&self) -> u64 {
        self.segments.read().list.iter().map(|s| s.num_live()).sum()
    }

    pub fn num_segments(&self) -> usize {
        self.segments.read().list.len()
    }
}
