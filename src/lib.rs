//! statferry - Bulk metrics export for vRealize-style monitoring platforms
//!
//! This library pulls time series, properties and relationships from the
//! platform's REST API and streams them out as flat rows:
//! - Streaming JSON decode, one resource's rowset in memory at a time
//! - Parent/child splicing with LRU-cached relationship lookups
//! - Chunked fetching sized by window geometry, bisected on dead chunks
//! - Bounded worker pool with run-on-submitter backpressure
//! - Pluggable row sinks (CSV, graphite-style line protocol)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod decode;
pub mod error;
pub mod model;
pub mod types;

/// REST client, response spooling, and the scripted in-memory stub
pub mod client;

/// Collection orchestration: chunk planning, the worker pool, splicing,
/// compaction and progress reporting
pub mod collect;

/// Row sinks and output formatting
pub mod sink;

// Re-export main types
pub use collect::Collector;
pub use config::ExportConfig;
pub use error::{Error, Result};
pub use model::{Field, Row, Rowset, Schema};
