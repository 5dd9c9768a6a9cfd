//! Rows and rowsets
//!
//! A [`Row`] is one timestamp's sample for one resource, laid out against a
//! [`Schema`](crate::model::Schema): a fixed metric slot array with a
//! presence bitmask (absent is distinct from zero) and a fixed array of
//! nullable property slots. A [`Rowset`] keys a resource's rows by
//! timestamp in a `BTreeMap`, which is what guarantees the sorted iteration
//! that compaction and splicing rely on.

use std::collections::BTreeMap;

use crate::model::Schema;
use crate::types::ResourceId;

/// One timestamp's values for one resource
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    metrics: Vec<f64>,
    present: Vec<u64>,
    props: Vec<Option<String>>,
}

impl Row {
    /// An empty row sized for the schema's slot counts
    pub fn new(schema: &Schema) -> Self {
        Row::with_slots(schema.num_metrics(), schema.num_props())
    }

    /// An empty row with explicit slot counts
    pub fn with_slots(num_metrics: usize, num_props: usize) -> Self {
        Row {
            metrics: vec![0.0; num_metrics],
            present: vec![0u64; num_metrics.div_ceil(64)],
            props: vec![None; num_props],
        }
    }

    /// Write a metric slot and mark it present
    pub fn set_metric(&mut self, index: usize, value: f64) {
        self.metrics[index] = value;
        self.present[index / 64] |= 1u64 << (index % 64);
    }

    /// True when the slot has been written
    pub fn has_metric(&self, index: usize) -> bool {
        self.present[index / 64] & (1u64 << (index % 64)) != 0
    }

    /// Read a metric slot; `None` when absent
    pub fn metric(&self, index: usize) -> Option<f64> {
        if self.has_metric(index) {
            Some(self.metrics[index])
        } else {
            None
        }
    }

    /// Write a property slot
    pub fn set_prop(&mut self, index: usize, value: impl Into<String>) {
        self.props[index] = Some(value.into());
    }

    /// Read a property slot; `None` when absent
    pub fn prop(&self, index: usize) -> Option<&str> {
        self.props[index].as_deref()
    }

    /// Number of metric slots
    pub fn metric_count(&self) -> usize {
        self.metrics.len()
    }

    /// Number of property slots
    pub fn prop_count(&self) -> usize {
        self.props.len()
    }

    /// True when no slot of either kind is set
    pub fn is_empty(&self) -> bool {
        self.present.iter().all(|w| *w == 0) && self.props.iter().all(|p| p.is_none())
    }

    /// Copy `other`'s set slots over this row, leaving every slot `other`
    /// does not have untouched. This is the contract partial data from
    /// related-resource passes is combined under.
    pub fn merge(&mut self, other: &Row) {
        for index in 0..other.metrics.len().min(self.metrics.len()) {
            if other.has_metric(index) {
                self.set_metric(index, other.metrics[index]);
            }
        }
        for index in 0..other.props.len().min(self.props.len()) {
            if let Some(value) = &other.props[index] {
                self.props[index] = Some(value.clone());
            }
        }
    }
}

/// A resource's rows, keyed and iterated by timestamp
#[derive(Debug, Clone)]
pub struct Rowset {
    resource_id: ResourceId,
    resource_name: Option<String>,
    rows: BTreeMap<i64, Row>,
}

impl Rowset {
    /// An empty rowset for the given resource
    pub fn new(resource_id: ResourceId) -> Self {
        Rowset {
            resource_id,
            resource_name: None,
            rows: BTreeMap::new(),
        }
    }

    /// The owning resource's id
    pub fn resource_id(&self) -> &ResourceId {
        &self.resource_id
    }

    /// Display name, once the orchestrator has resolved it
    pub fn resource_name(&self) -> Option<&str> {
        self.resource_name.as_deref()
    }

    /// Attach the resolved display name
    pub fn set_resource_name(&mut self, name: impl Into<String>) {
        self.resource_name = Some(name.into());
    }

    /// Fetch or create the row at a timestamp
    pub fn row_mut(&mut self, timestamp: i64, schema: &Schema) -> &mut Row {
        self.rows
            .entry(timestamp)
            .or_insert_with(|| Row::new(schema))
    }

    /// Insert a finished row, replacing any existing row at that timestamp
    pub fn insert(&mut self, timestamp: i64, row: Row) {
        self.rows.insert(timestamp, row);
    }

    /// Row at an exact timestamp
    pub fn row_at(&self, timestamp: i64) -> Option<&Row> {
        self.rows.get(&timestamp)
    }

    /// Rows in ascending timestamp order
    pub fn rows(&self) -> impl Iterator<Item = (i64, &Row)> {
        self.rows.iter().map(|(ts, row)| (*ts, row))
    }

    /// Mutable rows in ascending timestamp order
    pub fn rows_mut(&mut self) -> impl Iterator<Item = (i64, &mut Row)> {
        self.rows.iter_mut().map(|(ts, row)| (*ts, row))
    }

    /// All timestamps in ascending order
    pub fn timestamps(&self) -> Vec<i64> {
        self.rows.keys().copied().collect()
    }

    /// Earliest timestamp
    pub fn first_timestamp(&self) -> Option<i64> {
        self.rows.keys().next().copied()
    }

    /// Latest timestamp
    pub fn last_timestamp(&self) -> Option<i64> {
        self.rows.keys().next_back().copied()
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when no rows exist
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Drop all rows; compaction rebuilds the set around the merged row
    pub fn clear(&mut self) {
        self.rows.clear();
    }
}
