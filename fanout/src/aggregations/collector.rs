use crate::aggregations::partial::{AggregationPartials, PartialValue};
use crate::aggregations::types::AggregationRequest;
use crate::error::Result;
use crate::index::Document;
use crate::search::breaker::{CircuitBreaker, Reservation};
use std::sync::Arc;

/// Shard-level aggregation collection. New buckets are charged to the
/// request breaker before they are created.
#[derive(Debug)]
pub struct AggregationCollector {
    partials: AggregationPartials,
    reservation: Reservation,
    bucket_bytes: u64,
}

impl AggregationCollector {
    pub fn new(
        requests: &[AggregationRequest],
        breaker: &Arc<CircuitBreaker>,
        bucket_bytes: u64,
    ) -> Result<Self> {
        let partials = AggregationPartials::empty(requests);
        let reservation = breaker.reserve(partials.estimated_bytes(bucket_bytes), "aggregations")?;
        Ok(Self {
            partials,
            reservation,
            bucket_bytes,
        })
    }

    pub fn collect(&mut self, doc: &Document) -> Result<()> {
        let Self {
            partials,
            reservation,
            bucket_bytes,
        } = self;
        for entry in &mut partials.entries {
            let field_value = entry.agg_type.field().and_then(|f| doc.get(f));
            match &mut entry.value {
                PartialValue::Count { count } => *count += 1,
                PartialValue::Stats {
                    count,
                    sum,
                    min,
                    max,
                } => {
                    if let Some(v) = field_value.and_then(|v| v.as_long()) {
                        *count += 1;
                        *sum += v as f64;
                        *min = Some(min.map_or(v, |m| m.min(v)));
                        *max = Some(max.map_or(v, |m| m.max(v)));
                    }
                }
                PartialValue::Terms { buckets } => {
                    let Some(value) = field_value else {
                        continue;
                    };
                    let mut keys = value.keywords();
                    keys.sort();
                    keys.dedup();
                    for key in keys {
                        match buckets.get_mut(&key) {
                            Some(doc_count) => *doc_count += 1,
                            None => {
                                reservation.grow(*bucket_bytes)?;
                                buckets.insert(key, 1);
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    pub fn reserved_bytes(&self) -> u64 {
        self.reservation.bytes()
    }

    /// Hand the partials over; the reservation is released
    pub fn finish(self) -> AggregationPartials {
        self.partials
    }
}
