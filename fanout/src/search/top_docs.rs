use super::result::ShardDoc;
use crate::index::Document;
use crate::query::sort::{SortComparator, SortSpec, SortValue};
use std::cmp::Ordering;

/// Bounded, rank-ordered buffer of the best hits seen so far
#[derive(Debug)]
pub struct TopDocs {
    sort: SortSpec,
    comparator: SortComparator,
    capacity: usize,
    search_after: Option<Vec<SortValue>>,
    shard_index: u32,
    docs: Vec<ShardDoc>,
    total: u64,
    max_score: Option<f32>,
}

impl TopDocs {
    pub fn new(
        sort: SortSpec,
        capacity: usize,
        search_after: Option<Vec<SortValue>>,
        shard_index: u32,
    ) -> Self {
        let comparator = SortComparator::new(&sort);
        Self {
            sort,
            comparator,
            capacity,
            search_after,
            shard_index,
            docs: Vec::new(),
            total: 0,
            max_score: None,
        }
    }

    /// Count a matching document and keep it if it ranks in the top `capacity`
    pub fn offer(&mut self, doc: &Document, doc_id: u32, score: f32) {
        self.total += 1;
        if self.comparator.is_relevance() {
            self.max_score = Some(self.max_score.map_or(score, |m| m.max(score)));
        }
        if self.capacity == 0 {
            return;
        }

        let sort_values = if self.sort.is_field_sort() {
            self.sort.values_for(doc, doc_id, score)
        } else {
            Vec::new()
        };
        if let Some(after) = &self.search_after {
            if self.comparator.compare_values(&sort_values, after) != Ordering::Greater {
                return;
            }
        }

        let mut candidate = ShardDoc {
            shard_index: self.shard_index,
            doc: doc_id,
            id: String::new(),
            score,
            sort_values,
        };
        let pos = self
            .docs
            .partition_point(|d| self.comparator.compare(d, &candidate) == Ordering::Less);
        if pos >= self.capacity {
            return;
        }
        candidate.id = doc.id.clone();
        self.docs.insert(pos, candidate);
        self.docs.truncate(self.capacity);
    }

    pub fn is_full(&self) -> bool {
        self.capacity > 0 && self.docs.len() >= self.capacity
    }

    /// Worst retained hit, once the buffer is full
    pub fn bottom(&self) -> Option<&ShardDoc> {
        if self.is_full() {
            self.docs.last()
        } else {
            None
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn into_parts(self) -> (Vec<ShardDoc>, u64, Option<f32>) {
        (self.docs, self.total, self.max_score)
    }
}
