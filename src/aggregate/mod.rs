//! Statistical aggregator library
//!
//! Small, independent accumulators used in two places: compacting a window
//! of rows into one, and rolling the values of several related resources up
//! into a single value per timestamp. Each aggregator is per-(timestamp,
//! metric) state; nothing here is shared, so instances are created freely
//! and discarded after one read.
//!
//! # Contract
//!
//! - `apply(value)` feeds one sample.
//! - `has_result()` is false until at least one `apply` call. Sum is the
//!   one deliberate exception: an empty Sum reads as 0 while still
//!   reporting `has_result() == false`.
//! - `result()` reads the current value; meaningful once `has_result()`.
//!
//! # Example
//!
//! ```rust
//! use statferry::aggregate::AggregationKind;
//!
//! let mut agg = AggregationKind::Median.new_aggregator();
//! for v in [3.0, 1.0, 2.0] {
//!     agg.apply(v);
//! }
//! assert!(agg.has_result());
//! assert_eq!(agg.result(), 2.0);
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::SchemaError;

pub mod stats;

pub use stats::{Average, First, Last, Max, Median, Min, StdDev, Sum, Variance};

/// One incremental accumulator
pub trait Aggregator: Send {
    /// Feed one sample
    fn apply(&mut self, value: f64);

    /// True once the accumulator has something to report
    fn has_result(&self) -> bool;

    /// Current value of the accumulator
    fn result(&self) -> f64;
}

/// The closed set of aggregation kinds a field may declare
///
/// Parsing an unknown name is a configuration error surfaced before any
/// network activity, never a silent fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregationKind {
    /// Running total
    Sum,
    /// Arithmetic mean
    Average,
    /// Minimum
    Min,
    /// Maximum
    Max,
    /// Streaming median over two heaps
    Median,
    /// Sample variance (Welford)
    Variance,
    /// Square root of the sample variance
    StdDev,
    /// First value seen wins
    First,
    /// Last value seen wins
    Last,
}

impl AggregationKind {
    /// Construct a fresh accumulator of this kind
    pub fn new_aggregator(&self) -> Box<dyn Aggregator> {
        match self {
            AggregationKind::Sum => Box::new(Sum::new()),
            AggregationKind::Average => Box::new(Average::new()),
            AggregationKind::Min => Box::new(Min::new()),
            AggregationKind::Max => Box::new(Max::new()),
            AggregationKind::Median => Box::new(Median::new()),
            AggregationKind::Variance => Box::new(Variance::new()),
            AggregationKind::StdDev => Box::new(StdDev::new()),
            AggregationKind::First => Box::new(First::new()),
            AggregationKind::Last => Box::new(Last::new()),
        }
    }

    /// Canonical configuration name
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationKind::Sum => "sum",
            AggregationKind::Average => "avg",
            AggregationKind::Min => "min",
            AggregationKind::Max => "max",
            AggregationKind::Median => "median",
            AggregationKind::Variance => "variance",
            AggregationKind::StdDev => "stddev",
            AggregationKind::First => "first",
            AggregationKind::Last => "last",
        }
    }
}

impl FromStr for AggregationKind {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sum" => Ok(AggregationKind::Sum),
            "avg" | "average" => Ok(AggregationKind::Average),
            "min" => Ok(AggregationKind::Min),
            "max" => Ok(AggregationKind::Max),
            "median" => Ok(AggregationKind::Median),
            "variance" => Ok(AggregationKind::Variance),
            "stddev" => Ok(AggregationKind::StdDev),
            "first" => Ok(AggregationKind::First),
            "last" => Ok(AggregationKind::Last),
            other => Err(SchemaError::UnknownAggregation(other.to_string())),
        }
    }
}

impl fmt::Display for AggregationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_round_trip() {
        for kind in [
            AggregationKind::Sum,
            AggregationKind::Average,
            AggregationKind::Min,
            AggregationKind::Max,
            AggregationKind::Median,
            AggregationKind::Variance,
            AggregationKind::StdDev,
            AggregationKind::First,
            AggregationKind::Last,
        ] {
            let parsed: AggregationKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err = "p95".parse::<AggregationKind>().unwrap_err();
        assert!(matches!(err, SchemaError::UnknownAggregation(name) if name == "p95"));
    }

    #[test]
    fn constructor_dispatch_matches_kind() {
        let mut agg = AggregationKind::Sum.new_aggregator();
        agg.apply(2.0);
        agg.apply(3.0);
        assert_eq!(agg.result(), 5.0);
    }
}
