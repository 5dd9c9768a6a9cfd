//! Core data types used throughout the exporter
//!
//! # Key Types
//!
//! - **`ResourceId`**: Opaque identifier the monitoring platform assigns to
//!   a monitored entity
//! - **`Resource`**: One catalog entry (id, name, resource kind, adapter kind)
//! - **`TimeWindow`**: Inclusive collection window in epoch milliseconds
//! - **`RollupType`**: Server-side time-bucketing mode requested at fetch time
//!
//! # Example
//!
//! ```rust
//! use statferry::types::{ResourceId, TimeWindow};
//!
//! let id = ResourceId::from("c7d4d1f8-0b3f-4a5e-9c2d-1f0a8e7b6d5c");
//! let window = TimeWindow::new(1_000, 2_000).unwrap();
//! assert!(window.contains(1_500));
//! assert_eq!(window.duration_ms(), 1_000);
//! assert_eq!(id.as_str().len(), 36);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Opaque identifier for a monitored resource
///
/// The platform hands these out as UUID-shaped strings, but nothing in the
/// pipeline depends on that shape, so no validation is applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    /// Borrow the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        ResourceId(s.to_string())
    }
}

impl From<String> for ResourceId {
    fn from(s: String) -> Self {
        ResourceId(s)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One entry of the resource catalog
///
/// Listing pages, relationship lookups and parent resolution all produce
/// this descriptor shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// Platform-assigned identifier
    pub id: ResourceId,
    /// Display name
    pub name: String,
    /// Resource kind (e.g. `VirtualMachine`, `HostSystem`)
    pub resource_kind: String,
    /// Adapter kind the resource belongs to
    pub adapter_kind: String,
}

impl Resource {
    /// True when the descriptor matches the requested kind and, if given,
    /// the requested adapter kind. Relationship listings can return
    /// relatives of other kinds, which callers filter with this.
    pub fn matches(&self, resource_kind: &str, adapter_kind: Option<&str>) -> bool {
        if self.resource_kind != resource_kind {
            return false;
        }
        match adapter_kind {
            Some(ak) => self.adapter_kind == ak,
            None => true,
        }
    }
}

/// Inclusive collection window in epoch milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Window begin (inclusive)
    pub begin: i64,
    /// Window end (inclusive)
    pub end: i64,
}

impl TimeWindow {
    /// Create a new window, validating begin <= end
    pub fn new(begin: i64, end: i64) -> Result<Self> {
        if begin > end {
            return Err(Error::Configuration(format!(
                "invalid time window: begin {} > end {}",
                begin, end
            )));
        }
        Ok(TimeWindow { begin, end })
    }

    /// True when the timestamp lies inside the window
    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.begin && timestamp <= self.end
    }

    /// Window length in milliseconds
    pub fn duration_ms(&self) -> i64 {
        self.end - self.begin
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.begin, self.end)
    }
}

/// Server-side rollup requested at fetch time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RollupType {
    /// Bucket average (the platform default)
    Avg,
    /// Bucket minimum
    Min,
    /// Bucket maximum
    Max,
    /// Bucket sum
    Sum,
    /// Most recent raw sample in the bucket
    Latest,
    /// Sample count per bucket
    Count,
}

impl RollupType {
    /// Wire name the stats endpoint expects
    pub fn as_str(&self) -> &'static str {
        match self {
            RollupType::Avg => "AVG",
            RollupType::Min => "MIN",
            RollupType::Max => "MAX",
            RollupType::Sum => "SUM",
            RollupType::Latest => "LATEST",
            RollupType::Count => "COUNT",
        }
    }
}

impl FromStr for RollupType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "AVG" => Ok(RollupType::Avg),
            "MIN" => Ok(RollupType::Min),
            "MAX" => Ok(RollupType::Max),
            "SUM" => Ok(RollupType::Sum),
            "LATEST" => Ok(RollupType::Latest),
            "COUNT" => Ok(RollupType::Count),
            other => Err(Error::Configuration(format!(
                "unknown rollup type: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for RollupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_rejects_inverted_bounds() {
        assert!(TimeWindow::new(2_000, 1_000).is_err());
        assert!(TimeWindow::new(1_000, 1_000).is_ok());
    }

    #[test]
    fn window_contains_is_inclusive() {
        let w = TimeWindow::new(100, 200).unwrap();
        assert!(w.contains(100));
        assert!(w.contains(200));
        assert!(!w.contains(99));
        assert!(!w.contains(201));
    }

    #[test]
    fn resource_matching_filters_adapter_kind() {
        let r = Resource {
            id: ResourceId::from("a"),
            name: "vm-01".to_string(),
            resource_kind: "VirtualMachine".to_string(),
            adapter_kind: "VMWARE".to_string(),
        };
        assert!(r.matches("VirtualMachine", None));
        assert!(r.matches("VirtualMachine", Some("VMWARE")));
        assert!(!r.matches("VirtualMachine", Some("NSX")));
        assert!(!r.matches("HostSystem", None));
    }

    #[test]
    fn rollup_round_trips_wire_names() {
        for name in ["AVG", "MIN", "MAX", "SUM", "LATEST", "COUNT"] {
            let parsed: RollupType = name.parse().unwrap();
            assert_eq!(parsed.as_str(), name);
        }
        assert!("P99".parse::<RollupType>().is_err());
    }
}
