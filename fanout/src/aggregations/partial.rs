//! Mergeable per-shard aggregation state.
//!
//! Partials merge associatively and commutatively, so the coordinator can
//! fold them in any grouping during batched reduction and finalize once.

use crate::aggregations::types::{
    AggregationRequest, AggregationResult, AggregationType, AggregationValue, Bucket, StatsResult,
};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const DEFAULT_TERMS_SIZE: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PartialValue {
    Count {
        count: u64,
    },
    Stats {
        count: u64,
        sum: f64,
        min: Option<i64>,
        max: Option<i64>,
    },
    Terms {
        buckets: BTreeMap<String, u64>,
    },
}

impl PartialValue {
    pub fn empty_for(agg_type: &AggregationType) -> Self {
        match agg_type {
            AggregationType::Count => PartialValue::Count { count: 0 },
            AggregationType::Terms { .. } => PartialValue::Terms {
                buckets: BTreeMap::new(),
            },
            _ => PartialValue::Stats {
                count: 0,
                sum: 0.0,
                min: None,
                max: None,
            },
        }
    }

    pub fn bucket_count(&self) -> usize {
        match self {
            PartialValue::Terms { buckets } => buckets.len(),
            _ => 1,
        }
    }

    fn merge(&mut self, other: PartialValue) -> Result<()> {
        match (self, other) {
            (PartialValue::Count { count }, PartialValue::Count { count: other }) => {
                *count += other;
            }
            (
                PartialValue::Stats {
                    count,
                    sum,
                    min,
                    max,
                },
                PartialValue::Stats {
                    count: other_count,
                    sum: other_sum,
                    min: other_min,
                    max: other_max,
                },
            ) => {
                *count += other_count;
                *sum += other_sum;
                *min = merge_opt(*min, other_min, i64::min);
                *max = merge_opt(*max, other_max, i64::max);
            }
            (PartialValue::Terms { buckets }, PartialValue::Terms { buckets: other }) => {
                for (key, doc_count) in other {
                    *buckets.entry(key).or_insert(0) += doc_count;
                }
            }
            (mine, theirs) => {
                return Err(Error::Internal(format!(
                    "cannot merge aggregation partials of different kinds: {:?} and {:?}",
                    mine, theirs
                )))
            }
        }
        Ok(())
    }
}

fn merge_opt(a: Option<i64>, b: Option<i64>, f: fn(i64, i64) -> i64) -> Option<i64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(f(x, y)),
        (x, None) => x,
        (None, y) => y,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialAggregation {
    pub name: String,
    pub agg_type: AggregationType,
    pub value: PartialValue,
}

/// Partial results for every aggregation of a request, in request order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationPartials {
    pub entries: Vec<PartialAggregation>,
}

impl AggregationPartials {
    pub fn empty(requests: &[AggregationRequest]) -> Self {
        Self {
            entries: requests
                .iter()
                .map(|r| PartialAggregation {
                    name: r.name.clone(),
                    agg_type: r.agg_type.clone(),
                    value: PartialValue::empty_for(&r.agg_type),
                })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn bucket_count(&self) -> usize {
        self.entries.iter().map(|e| e.value.bucket_count()).sum()
    }

    pub fn estimated_bytes(&self, bucket_bytes: u64) -> u64 {
        self.bucket_count() as u64 * bucket_bytes
    }

    /// Fold `other` into `self`. Both must come from the same request.
    pub fn merge(&mut self, other: AggregationPartials) -> Result<()> {
        if self.entries.is_empty() {
            *self = other;
            return Ok(());
        }
        if other.entries.len() != self.entries.len() {
            return Err(Error::Internal(format!(
                "aggregation count mismatch: {} vs {}",
                self.entries.len(),
                other.entries.len()
            )));
        }
        for (mine, theirs) in self.entries.iter_mut().zip(other.entries) {
            if mine.name != theirs.name {
                return Err(Error::Internal(format!(
                    "aggregation name mismatch: [{}] vs [{}]",
                    mine.name, theirs.name
                )));
            }
            mine.value.merge(theirs.value)?;
        }
        Ok(())
    }

    pub fn finalize(self) -> Vec<AggregationResult> {
        self.entries.into_iter().map(finalize_one).collect()
    }
}

fn finalize_one(entry: PartialAggregation) -> AggregationResult {
    let value = match (&entry.agg_type, entry.value) {
        (_, PartialValue::Count { count }) => AggregationValue::Single {
            value: Some(count as f64),
        },
        (agg_type, PartialValue::Stats {
            count,
            sum,
            min,
            max,
        }) => {
            let avg = (count > 0).then(|| sum / count as f64);
            let sum = (count > 0).then_some(sum);
            let min = min.map(|v| v as f64);
            let max = max.map(|v| v as f64);
            match agg_type {
                AggregationType::Min { .. } => AggregationValue::Single { value: min },
                AggregationType::Max { .. } => AggregationValue::Single { value: max },
                AggregationType::Sum { .. } => AggregationValue::Single {
                    value: Some(sum.unwrap_or(0.0)),
                },
                AggregationType::Avg { .. } => AggregationValue::Single { value: avg },
                _ => AggregationValue::Stats(StatsResult {
                    count,
                    min,
                    max,
                    sum,
                    avg,
                }),
            }
        }
        (agg_type, PartialValue::Terms { buckets }) => {
            let size = match agg_type {
                AggregationType::Terms { size, .. } => size.unwrap_or(DEFAULT_TERMS_SIZE),
                _ => DEFAULT_TERMS_SIZE,
            };
            let total: u64 = buckets.values().sum();
            let mut sorted: Vec<Bucket> = buckets
                .into_iter()
                .map(|(key, doc_count)| Bucket { key, doc_count })
                .collect();
            sorted.sort_by(|a, b| b.doc_count.cmp(&a.doc_count).then_with(|| a.key.cmp(&b.key)));
            sorted.truncate(size);
            let kept: u64 = sorted.iter().map(|b| b.doc_count).sum();
            AggregationValue::Buckets {
                buckets: sorted,
                sum_other_doc_count: total - kept,
            }
        }
    };
    AggregationResult {
        name: entry.name,
        value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(pairs: &[(&str, u64)]) -> AggregationPartials {
        AggregationPartials {
            entries: vec![PartialAggregation {
                name: "colors".into(),
                agg_type: AggregationType::terms_with_size("color", 2),
                value: PartialValue::Terms {
                    buckets: pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
                },
            }],
        }
    }

    #[test]
    fn test_terms_merge_and_finalize() {
        let mut a = terms(&[("red", 3), ("blue", 1)]);
        a.merge(terms(&[("blue", 3), ("green", 2)])).unwrap();
        let results = a.finalize();
        match &results[0].value {
            AggregationValue::Buckets {
                buckets,
                sum_other_doc_count,
            } => {
                assert_eq!(buckets[0].key, "blue");
                assert_eq!(buckets[0].doc_count, 4);
                assert_eq!(buckets[1].key, "red");
                assert_eq!(*sum_other_doc_count, 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_stats_finalize_variants() {
        let requests = vec![
            AggregationRequest::new("min", AggregationType::min("p")),
            AggregationRequest::new("avg", AggregationType::avg("p")),
            AggregationRequest::new("stats", AggregationType::stats("p")),
        ];
        let mut partials = AggregationPartials::empty(&requests);
        for entry in &mut partials.entries {
            entry.value = PartialValue::Stats {
                count: 2,
                sum: 10.0,
                min: Some(4),
                max: Some(6),
            };
        }
        let results = partials.finalize();
        assert_eq!(results[0].value, AggregationValue::Single { value: Some(4.0) });
        assert_eq!(results[1].value, AggregationValue::Single { value: Some(5.0) });
        match &results[2].value {
            AggregationValue::Stats(s) => assert_eq!(s.max, Some(6.0)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_empty_stats_finalize_to_null() {
        let requests = vec![AggregationRequest::new("max", AggregationType::max("p"))];
        let results = AggregationPartials::empty(&requests).finalize();
        assert_eq!(results[0].value, AggregationValue::Single { value: None });
        let json = serde_json::to_value(&results[0]).unwrap();
        assert_eq!(json["name"], "max");
        assert!(json["value"].is_null());
    }

    #[test]
    fn test_merge_into_empty_adopts_other() {
        let mut acc = AggregationPartials::default();
        acc.merge(terms(&[("red", 1)])).unwrap();
        assert_eq!(acc.bucket_count(), 1);
        assert_eq!(acc.estimated_bytes(64), 64);
    }

    #[test]
    fn test_mismatched_merge_is_error() {
        let mut a = terms(&[("red", 1)]);
        let b = AggregationPartials::empty(&[AggregationRequest::new(
            "colors",
            AggregationType::count(),
        )]);
        assert!(a.merge(b).is_err());
    }
}
