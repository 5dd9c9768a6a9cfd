//! Monitoring-platform API client
//!
//! One async trait, [`MetricsApi`], is the seam between the collection
//! pipeline and the platform: a REST implementation backs it in
//! production, a scripted stub backs it in tests. The stats stream comes
//! back as a [`ByteFeed`](crate::decode::ByteFeed) so the decoder neither
//! knows nor cares whether it reads a live response body, a spooled temp
//! file or a test fixture.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::decode::ByteFeed;
use crate::error::Result;
use crate::model::RelationKind;
use crate::types::{Resource, ResourceId, RollupType, TimeWindow};

pub mod rest;
pub mod spool;
pub mod stubs;

pub use rest::RestClient;

/// Catalog paging request
#[derive(Debug, Clone)]
pub struct ResourceQuery {
    /// Resource kind to list
    pub resource_kind: String,
    /// Restrict to one adapter kind
    pub adapter_kind: Option<String>,
    /// Server-side name filter
    pub name_filter: Option<String>,
    /// List only descendants of this resource
    pub parent_scope: Option<ResourceId>,
    /// Page size for the listing
    pub page_size: usize,
}

/// One page of the resource catalog
#[derive(Debug, Clone)]
pub struct ResourcePage {
    /// Total matching resources as reported by the server
    pub total: usize,
    /// The page's descriptors
    pub resources: Vec<Resource>,
}

/// What to ask the stats endpoint for
#[derive(Debug, Clone)]
pub struct StatsSpec {
    /// Collection window; `None` requests latest-only samples
    pub window: Option<TimeWindow>,
    /// Server-side rollup mode
    pub rollup: RollupType,
    /// Rollup bucket width in minutes
    pub interval_minutes: u32,
}

impl StatsSpec {
    /// True in latest-only mode
    pub fn latest_only(&self) -> bool {
        self.window.is_none()
    }
}

/// The platform API surface the pipeline consumes
#[async_trait]
pub trait MetricsApi: Send + Sync + 'static {
    /// Fetch one page of the resource catalog. Pages are zero-based; an
    /// empty page terminates pagination.
    async fn resource_page(&self, query: &ResourceQuery, page: usize) -> Result<ResourcePage>;

    /// Open the stats stream for a chunk of resources. The feed delivers
    /// the raw response document; decoding happens upstream.
    async fn stats_feed(
        &self,
        ids: &[ResourceId],
        keys: &[String],
        spec: &StatsSpec,
    ) -> Result<Box<dyn ByteFeed>>;

    /// Flat property (and tag) map of one resource
    async fn properties(&self, id: &ResourceId) -> Result<HashMap<String, String>>;

    /// First relative of the given kind, or `None` when the resource has
    /// no such relative
    async fn relative_of(
        &self,
        id: &ResourceId,
        relation: RelationKind,
        target_kind: &str,
        depth: u32,
    ) -> Result<Option<Resource>> {
        Ok(self
            .relatives_of(id, relation, target_kind, depth)
            .await?
            .into_iter()
            .next())
    }

    /// All relatives of the given kind
    async fn relatives_of(
        &self,
        id: &ResourceId,
        relation: RelationKind,
        target_kind: &str,
        depth: u32,
    ) -> Result<Vec<Resource>>;
}
