//! Bounded metadata caches
//!
//! Four LRU maps shared by every worker of an export job, each behind its
//! own lock (contention is negligible next to network latency):
//!
//! - **names**: resource id → display name. Populated opportunistically
//!   from every listing page, which turns most lookups into zero network
//!   calls.
//! - **properties**: resource id → flat name→value map.
//! - **parents**: (resource id, related kind) → the relative, including the
//!   negative answer, so "has no such parent" is also remembered.
//! - **rowsets**: (parent id, window begin, window end) → the parent's
//!   fully assembled rowset, shared by all children spliced in one job.
//!
//! Composite keys are structs deriving `Hash`/`Eq`, never concatenated
//! strings, so unrelated entries cannot collide.

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use crate::model::Rowset;
use crate::types::{Resource, ResourceId};

/// Resource names seen on listing pages; large because ids are small
pub const NAME_CACHE_CAPACITY: usize = 100_000;
/// Property maps are bulky, keep fewer
pub const PROP_CACHE_CAPACITY: usize = 1_000;
/// Parent descriptors
pub const PARENT_CACHE_CAPACITY: usize = 1_000;
/// Assembled parent rowsets
pub const ROWSET_CACHE_CAPACITY: usize = 2_000;

/// Key of the parent-lookup cache
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParentKey {
    /// The resource whose relative was looked up
    pub id: ResourceId,
    /// Resource kind of the relative
    pub kind: String,
}

/// Key of the rowset cache
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowsetKey {
    /// The parent resource
    pub id: ResourceId,
    /// Collection window begin (ms)
    pub begin: i64,
    /// Collection window end (ms)
    pub end: i64,
}

/// Hit/miss counters, one pair per cache
#[derive(Debug, Default)]
pub struct CacheStats {
    name_hits: AtomicU64,
    name_misses: AtomicU64,
    prop_hits: AtomicU64,
    prop_misses: AtomicU64,
    parent_hits: AtomicU64,
    parent_misses: AtomicU64,
    rowset_hits: AtomicU64,
    rowset_misses: AtomicU64,
}

impl CacheStats {
    fn record(hit: &AtomicU64, miss: &AtomicU64, was_hit: bool) {
        if was_hit {
            hit.fetch_add(1, Ordering::Relaxed);
        } else {
            miss.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Name-cache hits so far
    pub fn name_hits(&self) -> u64 {
        self.name_hits.load(Ordering::Relaxed)
    }

    /// Name-cache misses so far
    pub fn name_misses(&self) -> u64 {
        self.name_misses.load(Ordering::Relaxed)
    }

    /// Rowset-cache hits so far
    pub fn rowset_hits(&self) -> u64 {
        self.rowset_hits.load(Ordering::Relaxed)
    }

    /// Rowset-cache misses so far
    pub fn rowset_misses(&self) -> u64 {
        self.rowset_misses.load(Ordering::Relaxed)
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "names {}/{} props {}/{} parents {}/{} rowsets {}/{} (hits/misses)",
            self.name_hits.load(Ordering::Relaxed),
            self.name_misses.load(Ordering::Relaxed),
            self.prop_hits.load(Ordering::Relaxed),
            self.prop_misses.load(Ordering::Relaxed),
            self.parent_hits.load(Ordering::Relaxed),
            self.parent_misses.load(Ordering::Relaxed),
            self.rowset_hits.load(Ordering::Relaxed),
            self.rowset_misses.load(Ordering::Relaxed),
        )
    }
}

/// The four caches of one export job
pub struct MetaCache {
    names: Mutex<LruCache<ResourceId, String>>,
    props: Mutex<LruCache<ResourceId, HashMap<String, String>>>,
    parents: Mutex<LruCache<ParentKey, Option<Resource>>>,
    rowsets: Mutex<LruCache<RowsetKey, Arc<Rowset>>>,
    stats: CacheStats,
}

impl MetaCache {
    /// Caches at the default capacities
    pub fn new() -> Self {
        MetaCache::with_capacities(
            NAME_CACHE_CAPACITY,
            PROP_CACHE_CAPACITY,
            PARENT_CACHE_CAPACITY,
            ROWSET_CACHE_CAPACITY,
        )
    }

    /// Caches at explicit capacities; capacities are clamped to >= 1
    pub fn with_capacities(names: usize, props: usize, parents: usize, rowsets: usize) -> Self {
        let cap = |n: usize| NonZeroUsize::new(n.max(1)).unwrap_or(NonZeroUsize::MIN);
        MetaCache {
            names: Mutex::new(LruCache::new(cap(names))),
            props: Mutex::new(LruCache::new(cap(props))),
            parents: Mutex::new(LruCache::new(cap(parents))),
            rowsets: Mutex::new(LruCache::new(cap(rowsets))),
            stats: CacheStats::default(),
        }
    }

    /// Cached display name
    pub fn name(&self, id: &ResourceId) -> Option<String> {
        let found = self.names.lock().get(id).cloned();
        CacheStats::record(&self.stats.name_hits, &self.stats.name_misses, found.is_some());
        found
    }

    /// Remember a display name (listing pages call this for every entry)
    pub fn store_name(&self, id: ResourceId, name: String) {
        self.names.lock().put(id, name);
    }

    /// Cached property map
    pub fn props(&self, id: &ResourceId) -> Option<HashMap<String, String>> {
        let found = self.props.lock().get(id).cloned();
        CacheStats::record(&self.stats.prop_hits, &self.stats.prop_misses, found.is_some());
        found
    }

    /// Remember a property map
    pub fn store_props(&self, id: ResourceId, props: HashMap<String, String>) {
        self.props.lock().put(id, props);
    }

    /// Cached parent lookup; the outer `None` means "never looked up",
    /// the inner `None` means "looked up, has no such relative"
    pub fn parent(&self, key: &ParentKey) -> Option<Option<Resource>> {
        let found = self.parents.lock().get(key).cloned();
        CacheStats::record(
            &self.stats.parent_hits,
            &self.stats.parent_misses,
            found.is_some(),
        );
        found
    }

    /// Remember a parent lookup result, including the negative one
    pub fn store_parent(&self, key: ParentKey, parent: Option<Resource>) {
        self.parents.lock().put(key, parent);
    }

    /// Cached assembled parent rowset for a window
    pub fn rowset(&self, key: &RowsetKey) -> Option<Arc<Rowset>> {
        let found = self.rowsets.lock().get(key).cloned();
        CacheStats::record(
            &self.stats.rowset_hits,
            &self.stats.rowset_misses,
            found.is_some(),
        );
        found
    }

    /// Remember an assembled parent rowset
    pub fn store_rowset(&self, key: RowsetKey, rowset: Arc<Rowset>) {
        self.rowsets.lock().put(key, rowset);
    }

    /// Counter block for end-of-job logging
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

impl Default for MetaCache {
    fn default() -> Self {
        MetaCache::new()
    }
}
