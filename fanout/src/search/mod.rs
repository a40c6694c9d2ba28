//! Shard-level search: cancellable tasks, the request circuit breaker,
//! collection strategy and the query phase executor.

pub mod breaker;
pub mod collector;
pub mod context;
pub mod executor;
pub mod result;
pub mod strategy;
pub mod task;
pub mod telemetry;
pub mod top_docs;

pub use breaker::{CircuitBreaker, Reservation};
pub use collector::{Collector, CollectorOutput, DocHit};
pub use context::{ShardRequest, ShardSearchContext};
pub use executor::ShardExecutor;
pub use result::{PartialResult, ShardDoc, TotalHits, TotalHitsRelation};
pub use strategy::{CollectionPlan, CollectionState, NumericSortPlan};
pub use task::{CancellableTask, TaskGuard, TaskId, TaskRegistry};
pub use top_docs::TopDocs;
