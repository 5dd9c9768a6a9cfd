//! In-memory platform stub
//!
//! [`StubApi`] is a scripted [`MetricsApi`] for tests and local dry runs:
//! a fixed catalog, canned samples rendered into the real wire document,
//! per-resource failure injection, and a log of every stats call so tests
//! can assert how chunks were split. Not suitable for anything else; it
//! holds everything in memory and ignores hierarchy depth.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::json;

use crate::client::{MetricsApi, ResourcePage, ResourceQuery, StatsSpec};
use crate::decode::{ByteFeed, SliceFeed};
use crate::error::{ApiError, Result};
use crate::model::RelationKind;
use crate::types::{Resource, ResourceId};

/// Scripted in-memory platform
#[derive(Default)]
pub struct StubApi {
    catalog: RwLock<Vec<Resource>>,
    series: RwLock<HashMap<ResourceId, Vec<(String, Vec<(i64, f64)>)>>>,
    properties: RwLock<HashMap<ResourceId, HashMap<String, String>>>,
    parents: RwLock<HashMap<ResourceId, Vec<Resource>>>,
    children: RwLock<HashMap<ResourceId, Vec<Resource>>>,
    failing: RwLock<HashSet<ResourceId>>,
    garbled: RwLock<HashSet<ResourceId>>,
    stats_calls: AtomicU64,
    call_log: Mutex<Vec<Vec<ResourceId>>>,
}

impl StubApi {
    /// Create an empty stub
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a catalog entry
    pub fn add_resource(&self, resource: Resource) {
        self.catalog.write().push(resource);
    }

    /// Add samples for one metric key of one resource
    pub fn add_series(&self, id: &ResourceId, key: &str, samples: &[(i64, f64)]) {
        self.series
            .write()
            .entry(id.clone())
            .or_default()
            .push((key.to_string(), samples.to_vec()));
    }

    /// Set the property bag of a resource
    pub fn set_properties(&self, id: &ResourceId, props: HashMap<String, String>) {
        self.properties.write().insert(id.clone(), props);
    }

    /// Register a parent of `id`
    pub fn add_parent(&self, id: &ResourceId, parent: Resource) {
        self.parents.write().entry(id.clone()).or_default().push(parent);
    }

    /// Register a child of `id`
    pub fn add_child(&self, id: &ResourceId, child: Resource) {
        self.children.write().entry(id.clone()).or_default().push(child);
    }

    /// Make every stats call that includes `id` fail with "no response"
    pub fn fail_resource(&self, id: &ResourceId) {
        self.failing.write().insert(id.clone());
    }

    /// Make every stats call that includes `id` answer with a body that is
    /// not a stats document
    pub fn garble_stats(&self, id: &ResourceId) {
        self.garbled.write().insert(id.clone());
    }

    /// Number of stats calls made so far
    pub fn stats_call_count(&self) -> u64 {
        self.stats_calls.load(Ordering::Relaxed)
    }

    /// The id groups of every stats call, in order
    pub fn stats_call_groups(&self) -> Vec<Vec<ResourceId>> {
        self.call_log.lock().clone()
    }

    fn render_stats(&self, ids: &[ResourceId], keys: &[String], spec: &StatsSpec) -> Vec<u8> {
        let series = self.series.read();
        let mut values = Vec::new();
        for id in ids {
            let mut stats = Vec::new();
            for (key, samples) in series.get(id).map(Vec::as_slice).unwrap_or(&[]) {
                if !keys.iter().any(|k| k == key) {
                    continue;
                }
                let picked: Vec<(i64, f64)> = match spec.window {
                    Some(window) => samples
                        .iter()
                        .filter(|(ts, _)| window.contains(*ts))
                        .copied()
                        .collect(),
                    // No window means "latest": the most recent sample only.
                    None => samples.last().copied().into_iter().collect(),
                };
                if picked.is_empty() {
                    continue;
                }
                stats.push(json!({
                    "timestamps": picked.iter().map(|(ts, _)| *ts).collect::<Vec<i64>>(),
                    "statKey": { "key": key },
                    "data": picked.iter().map(|(_, v)| *v).collect::<Vec<f64>>(),
                }));
            }
            values.push(json!({
                "resourceId": id.as_str(),
                "stat-list": { "stat": stats },
            }));
        }
        json!({ "values": values }).to_string().into_bytes()
    }
}

#[async_trait]
impl MetricsApi for StubApi {
    async fn resource_page(&self, query: &ResourceQuery, page: usize) -> Result<ResourcePage> {
        let scoped: Option<HashSet<ResourceId>> = query.parent_scope.as_ref().map(|parent| {
            self.children
                .read()
                .get(parent)
                .map(|kids| kids.iter().map(|r| r.id.clone()).collect())
                .unwrap_or_default()
        });
        let matched: Vec<Resource> = self
            .catalog
            .read()
            .iter()
            .filter(|r| r.matches(&query.resource_kind, query.adapter_kind.as_deref()))
            .filter(|r| match &query.name_filter {
                Some(name) => &r.name == name,
                None => true,
            })
            .filter(|r| match &scoped {
                Some(ids) => ids.contains(&r.id),
                None => true,
            })
            .cloned()
            .collect();
        let start = page * query.page_size;
        let slice = if start >= matched.len() {
            Vec::new()
        } else {
            matched[start..(start + query.page_size).min(matched.len())].to_vec()
        };
        Ok(ResourcePage {
            total: matched.len(),
            resources: slice,
        })
    }

    async fn stats_feed(
        &self,
        ids: &[ResourceId],
        keys: &[String],
        spec: &StatsSpec,
    ) -> Result<Box<dyn ByteFeed>> {
        self.stats_calls.fetch_add(1, Ordering::Relaxed);
        self.call_log.lock().push(ids.to_vec());
        {
            let failing = self.failing.read();
            if let Some(bad) = ids.iter().find(|id| failing.contains(id)) {
                return Err(ApiError::NoResponse(format!("stub: {} not answering", bad)).into());
            }
        }
        {
            let garbled = self.garbled.read();
            if ids.iter().any(|id| garbled.contains(id)) {
                return Ok(Box::new(SliceFeed::new(
                    b"<html>502 bad gateway</html>".to_vec(),
                )));
            }
        }
        Ok(Box::new(SliceFeed::new(self.render_stats(ids, keys, spec))))
    }

    async fn properties(&self, id: &ResourceId) -> Result<HashMap<String, String>> {
        Ok(self.properties.read().get(id).cloned().unwrap_or_default())
    }

    async fn relatives_of(
        &self,
        id: &ResourceId,
        relation: RelationKind,
        target_kind: &str,
        _depth: u32,
    ) -> Result<Vec<Resource>> {
        let map = match relation {
            RelationKind::Parent => self.parents.read(),
            RelationKind::Child => self.children.read(),
        };
        Ok(map
            .get(id)
            .map(|rs| {
                rs.iter()
                    .filter(|r| r.resource_kind == target_kind)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
