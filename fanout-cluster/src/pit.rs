//! Point-in-time ids.
//!
//! An id lists the reader context pinned on every shard of every cluster
//! that took part when the point in time was opened. It is opaque to
//! callers: URL-safe base64 over JSON.

use crate::error::{ClusterError, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use fanout::index::ShardId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PitEntry {
    pub cluster: String,
    pub index: String,
    pub shard: u32,
    pub context: String,
}

impl PitEntry {
    pub fn shard_id(&self) -> ShardId {
        ShardId::new(self.index.clone(), self.shard)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointInTimeId {
    pub entries: Vec<PitEntry>,
}

impl PointInTimeId {
    pub fn new(entries: Vec<PitEntry>) -> Self {
        Self { entries }
    }

    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(self)?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    pub fn decode(id: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(id.trim())
            .map_err(|e| ClusterError::InvalidPointInTime(e.to_string()))?;
        let pit: PointInTimeId = serde_json::from_slice(&bytes)
            .map_err(|e| ClusterError::InvalidPointInTime(e.to_string()))?;
        if pit.entries.is_empty() {
            return Err(ClusterError::InvalidPointInTime(
                "point in time references no shards".to_string(),
            ));
        }
        Ok(pit)
    }

    /// Entries grouped by cluster alias, in alias order
    pub fn by_cluster(&self) -> BTreeMap<&str, Vec<&PitEntry>> {
        let mut grouped: BTreeMap<&str, Vec<&PitEntry>> = BTreeMap::new();
        for entry in &self.entries {
            grouped.entry(entry.cluster.as_str()).or_default().push(entry);
        }
        grouped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(cluster: &str, shard: u32) -> PitEntry {
        PitEntry {
            cluster: cluster.into(),
            index: "logs".into(),
            shard,
            context: format!("ctx-{cluster}-{shard}"),
        }
    }

    #[test]
    fn test_encode_decode() {
        let pit = PointInTimeId::new(vec![entry("(local)", 0), entry("eu", 1)]);
        let id = pit.encode().unwrap();
        assert!(!id.contains('='));
        assert_eq!(PointInTimeId::decode(&id).unwrap(), pit);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = PointInTimeId::decode("not base64!").unwrap_err();
        assert_eq!(err.error_type(), "invalid_point_in_time");

        let empty = PointInTimeId::new(Vec::new()).encode().unwrap();
        assert!(PointInTimeId::decode(&empty).is_err());
    }

    #[test]
    fn test_group_by_cluster() {
        let pit = PointInTimeId::new(vec![entry("eu", 0), entry("(local)", 0), entry("eu", 1)]);
        let grouped = pit.by_cluster();
        assert_eq!(grouped.keys().copied().collect::<Vec<_>>(), vec!["(local)", "eu"]);
        assert_eq!(grouped["eu"].len(), 2);
        assert_eq!(grouped["eu"][1].shard_id(), ShardId::new("logs", 1));
    }
}
