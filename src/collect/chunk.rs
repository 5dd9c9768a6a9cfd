//! Chunk planning
//!
//! A chunk is the batch of resource ids that one stats request and one
//! worker job cover. Sizing balances two ceilings: the decoded response
//! must stay under the configured row budget, and a page should produce at
//! least one chunk per worker so small result sets still use the pool.

use crate::types::{Resource, ResourceId, TimeWindow};

/// Worst-case decoded rows for one resource over the window
///
/// One row per rollup bucket plus one for the window edges; latest-mode
/// pulls exactly one sample.
pub fn rows_per_resource(window: Option<&TimeWindow>, rollup_minutes: u32) -> usize {
    match window {
        Some(w) => {
            let rollup_ms = (rollup_minutes as i64 * 60_000).max(1);
            (w.duration_ms() / rollup_ms) as usize + 1
        }
        None => 1,
    }
}

/// Split a listing page into chunks
///
/// Resources of the wrong kind or adapter are dropped first; relationship
/// listings can hand back relatives the query never asked for.
pub fn plan_chunks(
    resources: &[Resource],
    resource_kind: &str,
    adapter_kind: Option<&str>,
    rows_each: usize,
    max_rows: usize,
    workers: usize,
) -> Vec<Vec<ResourceId>> {
    let ids: Vec<ResourceId> = resources
        .iter()
        .filter(|r| r.matches(resource_kind, adapter_kind))
        .map(|r| r.id.clone())
        .collect();
    if ids.is_empty() {
        return Vec::new();
    }
    let by_rows = max_rows / rows_each.max(1);
    let per_worker = ids.len().div_ceil(workers.max(1));
    let size = by_rows.min(per_worker).max(1);
    ids.chunks(size).map(|c| c.to_vec()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vm(id: &str) -> Resource {
        Resource {
            id: ResourceId::from(id),
            name: id.to_string(),
            resource_kind: "VirtualMachine".to_string(),
            adapter_kind: "VMWARE".to_string(),
        }
    }

    fn fleet(n: usize) -> Vec<Resource> {
        (0..n).map(|i| vm(&format!("vm-{}", i))).collect()
    }

    #[test]
    fn day_window_row_estimate() {
        let w = TimeWindow::new(0, 86_400_000).unwrap();
        assert_eq!(rows_per_resource(Some(&w), 5), 289);
        assert_eq!(rows_per_resource(None, 5), 1);
    }

    #[test]
    fn worker_spread_caps_chunk_size() {
        // 10 resources, row budget would allow 34 per chunk, but 4 workers
        // want at least 4 chunks.
        let chunks = plan_chunks(&fleet(10), "VirtualMachine", None, 289, 10_000, 4);
        let sizes: Vec<usize> = chunks.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![3, 3, 3, 1]);
    }

    #[test]
    fn row_budget_caps_chunk_size() {
        let chunks = plan_chunks(&fleet(100), "VirtualMachine", None, 289, 1_000, 2);
        // 1000 / 289 = 3 resources per chunk.
        assert!(chunks.iter().all(|c| c.len() <= 3));
        let total: usize = chunks.iter().map(Vec::len).sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn oversized_resource_still_gets_a_chunk() {
        // A single resource's rows exceed the budget; chunks of one.
        let chunks = plan_chunks(&fleet(4), "VirtualMachine", None, 50_000, 10_000, 2);
        assert_eq!(chunks.len(), 4);
        assert!(chunks.iter().all(|c| c.len() == 1));
    }

    #[test]
    fn wrong_kind_is_filtered_before_sizing() {
        let mut resources = fleet(3);
        resources.push(Resource {
            id: ResourceId::from("host-1"),
            name: "host-1".to_string(),
            resource_kind: "HostSystem".to_string(),
            adapter_kind: "VMWARE".to_string(),
        });
        let chunks = plan_chunks(&resources, "VirtualMachine", Some("VMWARE"), 1, 10_000, 1);
        let total: usize = chunks.iter().map(Vec::len).sum();
        assert_eq!(total, 3);
    }

    #[test]
    fn empty_listing_plans_nothing() {
        assert!(plan_chunks(&[], "VirtualMachine", None, 1, 10_000, 4).is_empty());
    }
}
