//! Immutable segments.
//!
//! A segment holds its documents plus per-field statistics computed at build
//! time: docs-with-value counts, keyword doc frequencies, and a block-ordered
//! point index over long values. Statistics describe every document in the
//! segment, deleted or not, so they only answer counts exactly while
//! [`Segment::has_deletions`] is false.

use super::document::{Document, FieldType, FieldValue, Mapping};
use roaring::RoaringBitmap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A run of point values in ascending `(value, ord)` order
#[derive(Debug, Clone)]
pub struct PointBlock {
    pub min: i64,
    pub max: i64,
    pub entries: Vec<(i64, u32)>,
}

#[derive(Debug, Clone, Default)]
pub struct PointValues {
    blocks: Vec<PointBlock>,
}

impl PointValues {
    fn build(mut entries: Vec<(i64, u32)>, block_size: usize) -> Self {
        entries.sort_unstable();
        let blocks = entries
            .chunks(block_size.max(1))
            .map(|chunk| PointBlock {
                min: chunk[0].0,
                max: chunk[chunk.len() - 1].0,
                entries: chunk.to_vec(),
            })
            .collect();
        Self { blocks }
    }

    pub fn blocks(&self) -> &[PointBlock] {
        &self.blocks
    }

    pub fn min(&self) -> Option<i64> {
        self.blocks.first().map(|b| b.min)
    }

    pub fn max(&self) -> Option<i64> {
        self.blocks.last().map(|b| b.max)
    }

    /// Number of points with `lower <= value <= upper`, using block bounds
    /// to skip or fully accept blocks
    pub fn count_in_range(&self, lower: i64, upper: i64) -> u64 {
        let mut count = 0u64;
        for block in &self.blocks {
            if block.max < lower {
                continue;
            }
            if block.min > upper {
                break;
            }
            if block.min >= lower && block.max <= upper {
                count += block.entries.len() as u64;
            } else {
                count += block
                    .entries
                    .iter()
                    .filter(|(v, _)| *v >= lower && *v <= upper)
                    .count() as u64;
            }
        }
        count
    }
}

#[derive(Debug, Default)]
struct SegmentStats {
    docs_with_value: HashMap<String, u32>,
    term_doc_freq: HashMap<String, HashMap<String, u32>>,
    points: HashMap<String, PointValues>,
}

#[derive(Debug, Clone)]
pub struct Segment {
    id: u64,
    docs: Arc<[Document]>,
    live: RoaringBitmap,
    stats: Arc<SegmentStats>,
}

impl Segment {
    pub fn build(
        id: u64,
        docs: Vec<Document>,
        mapping: &Mapping,
        points_block_size: usize,
    ) -> Self {
        let mut stats = SegmentStats::default();
        let mut points: HashMap<String, Vec<(i64, u32)>> = HashMap::new();

        for (ord, doc) in docs.iter().enumerate() {
            let ord = ord as u32;
            for (name, value) in &doc.fields {
                let Some(field) = mapping.get(name) else {
                    continue;
                };
                if !field.indexed {
                    continue;
                }
                match (field.field_type, value) {
                    (FieldType::Long, FieldValue::Long(v)) => {
                        points.entry(name.clone()).or_default().push((*v, ord));
                    }
                    (FieldType::Keyword, FieldValue::Keywords(values)) if values.is_empty() => {
                        continue
                    }
                    (FieldType::Keyword, _) => {
                        let freqs = stats.term_doc_freq.entry(name.clone()).or_default();
                        let unique: HashSet<String> = value.keywords().into_iter().collect();
                        for term in unique {
                            *freqs.entry(term).or_insert(0) += 1;
                        }
                    }
                    _ => continue,
                }
                *stats.docs_with_value.entry(name.clone()).or_insert(0) += 1;
            }
        }

        stats.points = points
            .into_iter()
            .map(|(field, entries)| (field, PointValues::build(entries, points_block_size)))
            .collect();

        let mut live = RoaringBitmap::new();
        live.insert_range(0..docs.len() as u32);

        Self {
            id,
            docs: docs.into(),
            live,
            stats: Arc::new(stats),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn max_doc(&self) -> u32 {
        self.docs.len() as u32
    }

    pub fn num_live(&self) -> u64 {
        self.live.len()
    }

    pub fn has_deletions(&self) -> bool {
        self.live.len() < self.docs.len() as u64
    }

    pub fn is_live(&self, ord: u32) -> bool {
        self.live.contains(ord)
    }

    pub fn live_docs(&self) -> impl Iterator<Item = u32> + '_ {
        self.live.iter()
    }

    pub fn doc(&self, ord: u32) -> &Document {
        &self.docs[ord as usize]
    }

    /// Ordinal of the live document with `id`
    pub fn find(&self, id: &str) -> Option<u32> {
        self.live.iter().find(|ord| self.docs[*ord as usize].id == id)
    }

    /// Documents with an indexed value for `field`
    pub fn docs_with_value(&self, field: &str) -> u32 {
        self.stats.docs_with_value.get(field).copied().unwrap_or(0)
    }

    pub fn term_doc_freq(&self, field: &str, term: &str) -> u32 {
        self.stats
            .term_doc_freq
            .get(field)
            .and_then(|t| t.get(term))
            .copied()
            .unwrap_or(0)
    }

    pub fn points(&self, field: &str) -> Option<&PointValues> {
        self.stats.points.get(field)
    }

    /// Copy of this segment with `ords` marked deleted. Statistics are shared.
    pub fn with_deleted(&self, ords: &[u32]) -> Segment {
        let mut live = self.live.clone();
        for ord in ords {
            live.remove(*ord);
        }
        Segment {
            id: self.id,
            docs: self.docs.clone(),
            live,
            stats: self.stats.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping() -> Mapping {
        Mapping::new()
            .with_long("price")
            .with_keyword("color")
            .with_field("rank", FieldType::Long, false)
    }

    fn docs() -> Vec<Document> {
        (0..10)
            .map(|i| {
                Document::new(format!("d{i}"))
                    .with_long("price", 100 - i)
                    .with_long("rank", i)
                    .with_keyword("color", if i % 2 == 0 { "red" } else { "blue" })
            })
            .collect()
    }

    #[test]
    fn test_build_collects_stats() {
        let seg = Segment::build(1, docs(), &mapping(), 3);
        assert_eq!(seg.max_doc(), 10);
        assert_eq!(seg.docs_with_value("price"), 10);
        assert_eq!(seg.docs_with_value("rank"), 0);
        assert_eq!(seg.term_doc_freq("color", "red"), 5);
        assert!(seg.points("rank").is_none());

        let points = seg.points("price").unwrap();
        assert_eq!(points.blocks().len(), 4);
        assert_eq!(points.min(), Some(91));
        assert_eq!(points.max(), Some(100));
        assert!(points.blocks().windows(2).all(|w| w[0].max <= w[1].min));
    }

    #[test]
    fn test_count_in_range() {
        let seg = Segment::build(1, docs(), &mapping(), 4);
        let points = seg.points("price").unwrap();
        assert_eq!(points.count_in_range(95, 100), 6);
        assert_eq!(points.count_in_range(i64::MIN, i64::MAX), 10);
        assert_eq!(points.count_in_range(200, 300), 0);
    }

    #[test]
    fn test_with_deleted_keeps_original() {
        let seg = Segment::build(1, docs(), &mapping(), 4);
        let ord = seg.find("d3").unwrap();
        let deleted = seg.with_deleted(&[ord]);

        assert!(!seg.has_deletions());
        assert!(deleted.has_deletions());
        assert_eq!(deleted.num_live(), 9);
        assert!(deleted.find("d3").is_none());
        // stats still describe the deleted document
        assert_eq!(deleted.docs_with_value("price"), 10);
    }
}
