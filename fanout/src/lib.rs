//! # Fanout
//!
//! Shard-local query execution for a distributed search engine.
//!
//! # Architecture
//!
//! - [`index`] holds documents in immutable segments. A refresh turns
//!   buffered operations into a new segment; readers are point-in-time
//!   views over the segment list.
//! - [`query`] defines the query tree, sort specifications and the search
//!   request, plus the rewrite pass that normalizes a query before
//!   execution.
//! - [`search`] runs the query phase on one shard: it picks a collection
//!   plan (count shortcut, numeric sort fast path or plain collection),
//!   drives the collector chain and produces a [`search::PartialResult`].
//! - [`aggregations`] collects mergeable partial aggregations that the
//!   coordinator reduces and finalizes.
//!
//! Fan-out across shards and clusters lives in the `fanout-cluster` crate.

pub mod aggregations;
pub mod config;
pub mod error;
pub mod index;
pub mod query;
pub mod search;

pub use config::Config;
pub use error::{Error, Result};
