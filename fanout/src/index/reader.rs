use super::document::{Document, Mapping};
use super::segment::Segment;
use super::shard::ShardId;
use std::sync::Arc;

/// One segment as seen by a reader, with its shard-level doc id base
#[derive(Debug, Clone)]
pub struct LeafReader {
    pub ord: usize,
    pub doc_base: u32,
    pub segment: Arc<Segment>,
}

impl LeafReader {
    pub fn doc_id(&self, ord: u32) -> u32 {
        self.doc_base + ord
    }
}

/// Point-in-time snapshot of a shard. Cheap to clone; later refreshes and
/// deletions on the shard are invisible to it.
#[derive(Debug, Clone)]
pub struct ShardReader {
    shard_id: ShardId,
    mapping: Arc<Mapping>,
    leaves: Arc<[LeafReader]>,
}

impl ShardReader {
    pub(crate) fn new(shard_id: ShardId, mapping: Arc<Mapping>, segments: &[Arc<Segment>]) -> Self {
        let mut doc_base = 0u32;
        let leaves: Vec<LeafReader> = segments
            .iter()
            .enumerate()
            .map(|(ord, segment)| {
                let leaf = LeafReader {
                    ord,
                    doc_base,
                    segment: segment.clone(),
                };
                doc_base += segment.max_doc();
                leaf
            })
            .collect();
        Self {
            shard_id,
            mapping,
            leaves: leaves.into(),
        }
    }

    pub fn shard_id(&self) -> &ShardId {
        &self.shard_id
    }

    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    pub fn leaves(&self) -> &[LeafReader] {
        &self.leaves
    }

    /// Live documents
    pub fn num_docs(&self) -> u64 {
        self.leaves.iter().map(|l| l.segment.num_live()).sum()
    }

    pub fn max_doc(&self) -> u32 {
        self.leaves.iter().map(|l| l.segment.max_doc()).sum()
    }

    /// Resolve a shard-level doc id
    pub fn document(&self, doc_id: u32) -> Option<&Document> {
        self.leaves
            .iter()
            .find(|l| doc_id >= l.doc_base && doc_id < l.doc_base + l.segment.max_doc())
            .map(|l| l.segment.doc(doc_id - l.doc_base))
    }
}
