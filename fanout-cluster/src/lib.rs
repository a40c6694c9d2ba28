//! Fanout Cluster - query fan-out, batched reduction and cross-cluster search
//!
//! This crate coordinates a search across the shards of one or more
//! clusters. Shards are reached through the [`ShardTransport`] seam; the
//! shard-level query phase itself lives in the `fanout` crate.
//!
//! # Architecture
//!
//! - **Routing**: `cluster:index` expressions, shard index allocation, shard limits
//! - **Coordinator**: bounded concurrent dispatch over one cluster, fail-fast or partial results
//! - **Reduce**: incremental top-hits and aggregation merging, charged to the circuit breaker
//! - **Cross-cluster**: per-cluster status, skip-unavailable remotes, global reduction
//! - **Point in time**: pinned reader contexts encoded into an opaque id
//!
//! # Key Operations
//!
//! - search: resolve, dispatch, reduce and assemble a [`SearchResponse`]
//! - open_point_in_time / close_point_in_time
//! - task cancellation and timeouts through the shared task registry

pub mod config;
pub mod coordinator;
pub mod cross_cluster;
pub mod error;
pub mod metrics;
pub mod pit;
pub mod reduce;
pub mod response;
pub mod routing;
pub mod transport;

pub use config::{CoordinatorConfig, RemoteClusterConfig};
pub use coordinator::{ClusterSearchOutcome, SearchCoordinator};
pub use cross_cluster::CrossClusterSearch;
pub use error::{ClusterError, Result};
pub use pit::{PitEntry, PointInTimeId};
pub use reduce::{QueryPhaseReducer, ReductionOutput};
pub use response::{
    ClosePointInTimeResponse, ClusterResult, ClusterStatus, ClustersSummary, SearchHit,
    SearchResponse, ShardFailureInfo, ShardsSummary,
};
pub use routing::{IndexPattern, ShardIndexAllocator, ShardTarget, LOCAL_CLUSTER_ALIAS};
pub use transport::{LocalTransport, ShardTransport};
