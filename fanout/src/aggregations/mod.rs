mod builder;
pub mod collector;
pub mod partial;
pub mod types;

pub use collector::AggregationCollector;
pub use partial::{AggregationPartials, PartialAggregation, PartialValue};
pub use types::{
    AggregationRequest, AggregationResult, AggregationType, AggregationValue, Bucket, StatsResult,
};
