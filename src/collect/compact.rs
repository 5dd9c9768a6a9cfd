//! Rowset compaction
//!
//! Optionally collapses a resource's time series into one representative
//! row. The policy picks a window one rollup period long and the merged
//! row's timestamp; every row inside the window folds into the target via
//! [`Row::merge`], oldest first, so the newest sample wins each slot while
//! older rows fill slots the newest never reported.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::model::{Row, Rowset, Schema};

/// How the representative window and timestamp are chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionPolicy {
    /// Window ends at the last sample, row keeps its timestamp
    Latest,
    /// Window centered on the positional median timestamp
    Median,
    /// Window ends at wall-clock now
    Local,
}

impl CompactionPolicy {
    /// Configuration name
    pub fn as_str(&self) -> &'static str {
        match self {
            CompactionPolicy::Latest => "LATEST",
            CompactionPolicy::Median => "MEDIAN",
            CompactionPolicy::Local => "LOCAL",
        }
    }
}

impl FromStr for CompactionPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "LATEST" => Ok(CompactionPolicy::Latest),
            "MEDIAN" => Ok(CompactionPolicy::Median),
            "LOCAL" => Ok(CompactionPolicy::Local),
            other => Err(Error::Configuration(format!(
                "unknown compaction policy: {} (expected LATEST, MEDIAN or LOCAL)",
                other
            ))),
        }
    }
}

impl fmt::Display for CompactionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collapse `rowset` to at most one row under the given policy
///
/// `rollup_ms` is the window length; `now_ms` anchors the `LOCAL` policy.
/// An empty rowset, or a `LOCAL` window that no sample falls into, yields
/// an empty rowset.
pub fn compact(
    rowset: &Rowset,
    schema: &Schema,
    policy: CompactionPolicy,
    rollup_ms: i64,
    now_ms: i64,
) -> Rowset {
    let mut out = Rowset::new(rowset.resource_id().clone());
    if let Some(name) = rowset.resource_name() {
        out.set_resource_name(name);
    }
    let Some(last) = rowset.last_timestamp() else {
        return out;
    };
    let span = rollup_ms.max(1);
    let (begin, end, target) = match policy {
        CompactionPolicy::Latest => (last - span, last, last),
        CompactionPolicy::Median => {
            let stamps = rowset.timestamps();
            let mid = stamps[(stamps.len() - 1) / 2];
            (mid - span / 2, mid + span / 2, mid)
        }
        CompactionPolicy::Local => (now_ms - span, now_ms, now_ms),
    };

    let mut merged = Row::new(schema);
    let mut any = false;
    for (ts, row) in rowset.rows() {
        if ts >= begin && ts <= end {
            merged.merge(row);
            any = true;
        }
    }
    if any {
        out.insert(target, merged);
    }
    out
}
