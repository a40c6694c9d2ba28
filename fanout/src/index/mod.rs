//! In-memory segment store: documents, mappings, segments and shards.

pub mod document;
pub mod reader;
pub mod segment;
pub mod shard;

pub use document::{Document, FieldMapping, FieldType, FieldValue, Mapping};
pub use reader::{LeafReader, ShardReader};
pub use segment::{PointBlock, PointValues, Segment};
pub use shard::{IndexShard, ShardId};
