//! Collection orchestration
//!
//! [`Collector`] drives one export end to end: page the catalog, plan
//! resource chunks, fan the chunks out over a bounded worker pool, decode
//! each response into rowsets, splice in related data, optionally compact,
//! and hand the rows to the sink. A chunk whose stats call gets no
//! response is split in half and retried, down to single resources, so one
//! dead resource costs one resource and not the whole chunk.
//!
//! Submodules:
//!
//! - [`chunk`]: chunk size planning from window geometry
//! - [`pool`]: bounded task pool with run-on-submitter overflow
//! - [`splice`]: parent/child/property enrichment of decoded rowsets
//! - [`compact`]: many-rows-to-one reduction policies
//! - [`progress`]: decile progress logging

pub mod chunk;
pub mod compact;
pub mod pool;
pub mod progress;
pub mod splice;

pub use compact::CompactionPolicy;
pub use pool::WorkerPool;
pub use progress::Progress;
pub use splice::Splicer;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::cache::MetaCache;
use crate::client::{spool, MetricsApi, ResourceQuery, StatsSpec};
use crate::config::ExportConfig;
use crate::decode::{ByteFeed, StatsDecoder};
use crate::error::{Error, Result};
use crate::model::{Rowset, Schema};
use crate::sink::RowSink;
use crate::types::ResourceId;

use pool::Job;

/// How long to wait for in-flight chunks after the last page
const DRAIN_TIMEOUT: Duration = Duration::from_secs(600);

// ===== Counters =====

/// Monotonic counters for one collection run
#[derive(Debug, Default)]
pub struct CollectStats {
    resources_listed: AtomicU64,
    chunks_fetched: AtomicU64,
    bisections: AtomicU64,
    rowsets_delivered: AtomicU64,
    rows_written: AtomicU64,
    resources_failed: AtomicU64,
}

impl CollectStats {
    fn record_listed(&self, n: usize) {
        self.resources_listed.fetch_add(n as u64, Ordering::Relaxed);
    }

    fn record_chunk(&self) {
        self.chunks_fetched.fetch_add(1, Ordering::Relaxed);
    }

    fn record_bisection(&self) {
        self.bisections.fetch_add(1, Ordering::Relaxed);
    }

    fn record_rowset(&self, rows: usize) {
        self.rowsets_delivered.fetch_add(1, Ordering::Relaxed);
        self.rows_written.fetch_add(rows as u64, Ordering::Relaxed);
    }

    fn record_failed(&self, n: usize) {
        self.resources_failed.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Resources returned by catalog paging
    pub fn resources_listed(&self) -> u64 {
        self.resources_listed.load(Ordering::Relaxed)
    }

    /// Stats calls issued, splits included
    pub fn chunks_fetched(&self) -> u64 {
        self.chunks_fetched.load(Ordering::Relaxed)
    }

    /// Chunks that were split after getting no response
    pub fn bisections(&self) -> u64 {
        self.bisections.load(Ordering::Relaxed)
    }

    /// Rowsets handed to the sink
    pub fn rowsets_delivered(&self) -> u64 {
        self.rowsets_delivered.load(Ordering::Relaxed)
    }

    /// Rows the sink reported written
    pub fn rows_written(&self) -> u64 {
        self.rows_written.load(Ordering::Relaxed)
    }

    /// Resources dropped after their terminal fetch failed
    pub fn resources_failed(&self) -> u64 {
        self.resources_failed.load(Ordering::Relaxed)
    }
}

impl fmt::Display for CollectStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "resources={} chunks={} bisections={} rowsets={} rows={} failed={}",
            self.resources_listed(),
            self.chunks_fetched(),
            self.bisections(),
            self.rowsets_delivered(),
            self.rows_written(),
            self.resources_failed(),
        )
    }
}

// ===== Collector =====

/// Everything a chunk job needs, shared across workers
struct JobContext {
    api: Arc<dyn MetricsApi>,
    sink: Arc<dyn RowSink>,
    cache: Arc<MetaCache>,
    splicer: Splicer,
    schema: Schema,
    spec: StatsSpec,
    spool: bool,
    compaction: Option<(CompactionPolicy, i64)>,
    progress: Progress,
    stats: CollectStats,
    fatal: Mutex<Option<Error>>,
}

impl JobContext {
    /// Latch the first fatal error; later ones only get their log line
    fn abort(&self, error: Error) {
        let mut slot = self.fatal.lock();
        if slot.is_none() {
            *slot = Some(error);
        }
    }

    fn aborted(&self) -> bool {
        self.fatal.lock().is_some()
    }
}

/// One export run: catalog paging, chunked fetching, splicing, delivery
pub struct Collector {
    ctx: Arc<JobContext>,
    pool: WorkerPool,
    query: ResourceQuery,
    max_rows: usize,
    workers: usize,
}

impl Collector {
    /// Wire a collector from a validated config
    ///
    /// Compiles the schema and parses every enumerated setting, so a config
    /// that passed [`ExportConfig::validate`] cannot fail here.
    pub fn new(
        api: Arc<dyn MetricsApi>,
        sink: Box<dyn RowSink>,
        config: &ExportConfig,
    ) -> Result<Self> {
        let schema = config.compile_schema()?;
        let spec = StatsSpec {
            window: config.window(Utc::now().timestamp_millis())?,
            rollup: config.query.rollup.parse()?,
            interval_minutes: config.query.rollup_minutes,
        };
        let compaction = if config.collect.compact {
            let policy: CompactionPolicy = config.collect.compact_policy.parse()?;
            Some((policy, config.query.rollup_minutes as i64 * 60_000))
        } else {
            None
        };
        let cache = Arc::new(MetaCache::new());
        let ctx = Arc::new(JobContext {
            splicer: Splicer::new(Arc::clone(&api), Arc::clone(&cache)),
            api,
            sink: Arc::from(sink),
            cache,
            schema,
            spec,
            spool: config.collect.spool_responses,
            compaction,
            progress: Progress::new(),
            stats: CollectStats::default(),
            fatal: Mutex::new(None),
        });
        Ok(Collector {
            ctx,
            pool: WorkerPool::new(config.collect.workers, config.collect.queue),
            query: ResourceQuery {
                resource_kind: config.query.resource_kind.clone(),
                adapter_kind: config.query.adapter_kind.clone(),
                name_filter: config.query.name.clone(),
                parent_scope: None,
                page_size: config.collect.page_size,
            },
            max_rows: config.collect.max_rows,
            workers: config.collect.workers,
        })
    }

    /// Run the export to completion
    ///
    /// Fetch failures inside chunks are contained (bisected, then counted
    /// and logged per resource). A malformed stats response is fatal: the
    /// first one stops further submission and is returned here once the
    /// in-flight chunks drain, alongside the other fatal cases of catalog
    /// paging and sink setup or teardown.
    pub async fn run(&self) -> Result<()> {
        let ctx = &self.ctx;
        ctx.sink.preamble(&ctx.schema).await?;

        let rows_each = chunk::rows_per_resource(ctx.spec.window.as_ref(), ctx.spec.interval_minutes);
        let mut page = 0usize;
        while !ctx.aborted() {
            let listing = self.ctx.api.resource_page(&self.query, page).await?;
            if listing.resources.is_empty() {
                break;
            }
            if page == 0 {
                ctx.progress.set_total(listing.total);
                info!(
                    total = listing.total,
                    kind = %self.query.resource_kind,
                    "listed resources"
                );
            }
            for resource in &listing.resources {
                ctx.cache.store_name(resource.id.clone(), resource.name.clone());
            }
            ctx.stats.record_listed(listing.resources.len());

            let chunks = chunk::plan_chunks(
                &listing.resources,
                &self.query.resource_kind,
                self.query.adapter_kind.as_deref(),
                rows_each,
                self.max_rows,
                self.workers,
            );
            for ids in chunks {
                if ctx.aborted() {
                    break;
                }
                self.pool.submit(process_chunk(Arc::clone(ctx), ids)).await;
            }
            page += 1;
        }

        self.pool.drain(DRAIN_TIMEOUT).await;
        let closed = ctx.sink.close().await;
        if let Some(error) = ctx.fatal.lock().take() {
            return Err(error);
        }
        closed?;
        info!(stats = %ctx.stats, "collection finished");
        Ok(())
    }

    /// Counters for the run
    pub fn stats(&self) -> &CollectStats {
        &self.ctx.stats
    }

    /// Completion progress for the run
    pub fn progress(&self) -> &Progress {
        &self.ctx.progress
    }
}

/// Fetch one chunk, splitting it in half on "no response" until single
/// resources remain. Boxed so the recursion has a sized future type.
///
/// Transport failures stay contained to their chunk; a response that does
/// not decode latches the run's fatal error instead.
fn process_chunk(ctx: Arc<JobContext>, ids: Vec<ResourceId>) -> Job {
    Box::pin(async move {
        if let Err(e) = fetch_and_deliver(&ctx, &ids).await {
            if e.is_no_response() && ids.len() > 1 {
                ctx.stats.record_bisection();
                debug!(size = ids.len(), "no response for chunk, splitting");
                let (left, right) = ids.split_at(ids.len() / 2);
                process_chunk(Arc::clone(&ctx), left.to_vec()).await;
                process_chunk(ctx, right.to_vec()).await;
            } else if matches!(e, Error::Decode(_)) {
                error!(error = %e, resources = ids.len(), "malformed stats response, aborting export");
                ctx.stats.record_failed(ids.len());
                ctx.progress.record_failed(ids.len());
                ctx.abort(e);
            } else {
                warn!(error = %e, resources = ids.len(), "chunk failed");
                ctx.stats.record_failed(ids.len());
                ctx.progress.record_failed(ids.len());
            }
        }
    })
}

/// One stats call for a chunk of resources, decoded and delivered
async fn fetch_and_deliver(ctx: &JobContext, ids: &[ResourceId]) -> Result<()> {
    ctx.stats.record_chunk();
    let feed = ctx
        .api
        .stats_feed(ids, ctx.schema.metric_keys(), &ctx.spec)
        .await?;
    // Spooling moves the whole body to disk before decoding, freeing the
    // server-side connection early at the cost of a temp file.
    let feed: Box<dyn ByteFeed> = if ctx.spool {
        let mut feed = feed;
        Box::new(spool::capture(&mut *feed).await?)
    } else {
        feed
    };
    let mut decoder = StatsDecoder::new(feed, &ctx.schema);
    while let Some(rowset) = decoder.next_rowset().await? {
        deliver_rowset(ctx, rowset).await?;
    }
    ctx.progress.record_completed(ids.len());
    Ok(())
}

/// Name, splice, compact, sink: the per-rowset pipeline tail
async fn deliver_rowset(ctx: &JobContext, mut rowset: Rowset) -> Result<()> {
    if rowset.resource_name().is_none() {
        if let Some(name) = ctx.cache.name(rowset.resource_id()) {
            rowset.set_resource_name(name);
        }
    }
    ctx.splicer.enrich(&mut rowset, &ctx.schema, &ctx.spec).await?;
    let rowset = match ctx.compaction {
        Some((policy, rollup_ms)) => compact::compact(
            &rowset,
            &ctx.schema,
            policy,
            rollup_ms,
            Utc::now().timestamp_millis(),
        ),
        None => rowset,
    };
    let rows = ctx.sink.process(&rowset, &ctx.schema).await?;
    ctx.stats.record_rowset(rows);
    Ok(())
}
