//! End-to-end export tests over the scripted platform stub
//!
//! Each test wires a real `Collector` against a `StubApi` catalog and a
//! recording sink, then asserts on what reached the sink and on the call
//! pattern the stub observed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use statferry::client::stubs::StubApi;
use statferry::client::MetricsApi;
use statferry::collect::Collector;
use statferry::config::ExportConfig;
use statferry::error::{Error, Result};
use statferry::model::{Rowset, Schema};
use statferry::sink::RowSink;
use statferry::types::{Resource, ResourceId};

#[derive(Default)]
struct Recorded {
    rowsets: Mutex<Vec<Rowset>>,
    preambles: AtomicUsize,
    closed: AtomicBool,
}

impl Recorded {
    fn rowset_for(&self, id: &str) -> Option<Rowset> {
        self.rowsets
            .lock()
            .iter()
            .find(|rs| rs.resource_id().as_str() == id)
            .cloned()
    }
}

struct RecordingSink(Arc<Recorded>);

#[async_trait]
impl RowSink for RecordingSink {
    async fn preamble(&self, _schema: &Schema) -> Result<()> {
        self.0.preambles.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn process(&self, rowset: &Rowset, _schema: &Schema) -> Result<usize> {
        let rows = rowset.len();
        self.0.rowsets.lock().push(rowset.clone());
        Ok(rows)
    }

    async fn close(&self) -> Result<()> {
        self.0.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

fn vm(i: usize) -> Resource {
    Resource {
        id: ResourceId::from(format!("vm-{i}")),
        name: format!("vm{i}"),
        resource_kind: "VirtualMachine".to_string(),
        adapter_kind: "VMWARE".to_string(),
    }
}

fn host(id: &str) -> Resource {
    Resource {
        id: ResourceId::from(id),
        name: format!("{id}-name"),
        resource_kind: "HostSystem".to_string(),
        adapter_kind: "VMWARE".to_string(),
    }
}

async fn run_export(stub: Arc<StubApi>, yaml: &str) -> (Collector, Arc<Recorded>) {
    let config = ExportConfig::from_yaml(yaml).unwrap();
    let recorded = Arc::new(Recorded::default());
    let sink = Box::new(RecordingSink(Arc::clone(&recorded)));
    let collector = Collector::new(stub, sink, &config).unwrap();
    collector.run().await.unwrap();
    (collector, recorded)
}

const PLAIN_EXPORT: &str = r#"
connection:
  host: https://vrops.example.com
  token: secret
query:
  resource_kind: VirtualMachine
  begin: 0
  end: 300000
fields:
  - alias: cpu
    metric: cpu|usage
collect:
  workers: 1
  max_rows: 4
  page_size: 100
"#;

#[tokio::test]
async fn export_delivers_every_resource() {
    let stub = Arc::new(StubApi::new());
    for i in 0..3 {
        let r = vm(i);
        stub.add_series(&r.id, "cpu|usage", &[(60_000, i as f64), (120_000, 10.0 + i as f64)]);
        stub.add_resource(r);
    }

    let (collector, recorded) = run_export(Arc::clone(&stub), PLAIN_EXPORT).await;

    assert_eq!(recorded.preambles.load(Ordering::Relaxed), 1);
    assert!(recorded.closed.load(Ordering::Relaxed));
    assert_eq!(recorded.rowsets.lock().len(), 3);
    assert_eq!(collector.stats().rows_written(), 6);
    assert_eq!(collector.stats().resources_failed(), 0);
    assert_eq!(collector.progress().total(), 3);
    assert_eq!(collector.progress().completed(), 3);

    let first = recorded.rowset_for("vm-0").unwrap();
    assert_eq!(first.resource_name(), Some("vm0"));
    assert_eq!(first.row_at(60_000).unwrap().metric(0), Some(0.0));
    assert_eq!(first.row_at(120_000).unwrap().metric(0), Some(10.0));
}

#[tokio::test]
async fn dead_resource_is_isolated_by_bisection() {
    let stub = Arc::new(StubApi::new());
    for i in 0..4 {
        let r = vm(i);
        stub.add_series(&r.id, "cpu|usage", &[(60_000, 1.0), (120_000, 2.0)]);
        stub.add_resource(r);
    }
    stub.fail_resource(&ResourceId::from("vm-2"));

    let (collector, recorded) = run_export(Arc::clone(&stub), PLAIN_EXPORT).await;

    // Chunks of two: the healthy one passes, the poisoned one splits into
    // singles and only vm-2 is lost.
    let groups = stub.stats_call_groups();
    assert_eq!(
        groups,
        vec![
            vec![ResourceId::from("vm-0"), ResourceId::from("vm-1")],
            vec![ResourceId::from("vm-2"), ResourceId::from("vm-3")],
            vec![ResourceId::from("vm-2")],
            vec![ResourceId::from("vm-3")],
        ]
    );
    assert_eq!(collector.stats().bisections(), 1);
    assert_eq!(collector.stats().resources_failed(), 1);
    assert_eq!(collector.progress().completed(), 4);
    assert_eq!(collector.progress().failed(), 1);

    assert!(recorded.rowset_for("vm-2").is_none());
    let survivor = recorded.rowset_for("vm-3").unwrap();
    assert_eq!(survivor.len(), 2);
}

#[tokio::test]
async fn malformed_stats_body_aborts_the_run() {
    let stub = Arc::new(StubApi::new());
    for i in 0..4 {
        let r = vm(i);
        stub.add_series(&r.id, "cpu|usage", &[(60_000, 1.0), (120_000, 2.0)]);
        stub.add_resource(r);
    }
    stub.garble_stats(&ResourceId::from("vm-2"));

    let config = ExportConfig::from_yaml(PLAIN_EXPORT).unwrap();
    let recorded = Arc::new(Recorded::default());
    let sink = Box::new(RecordingSink(Arc::clone(&recorded)));
    let collector = Collector::new(Arc::clone(&stub) as Arc<dyn MetricsApi>, sink, &config).unwrap();
    let err = collector.run().await.unwrap_err();
    assert!(matches!(err, Error::Decode(_)), "got {err}");

    // A body that is not a stats document is not an overload signal;
    // nothing gets split, and chunks already in flight still land.
    assert_eq!(collector.stats().bisections(), 0);
    assert_eq!(collector.stats().resources_failed(), 2);
    assert!(recorded.rowset_for("vm-0").is_some());
    assert!(recorded.rowset_for("vm-2").is_none());
    assert!(recorded.closed.load(Ordering::Relaxed));
}

#[tokio::test]
async fn parent_data_reaches_the_sink() {
    let stub = Arc::new(StubApi::new());
    let r = vm(1);
    stub.add_series(&r.id, "cpu|usage", &[(60_000, 1.0), (120_000, 2.0)]);
    stub.add_resource(r);

    let h = host("host-1");
    stub.add_parent(&ResourceId::from("vm-1"), h.clone());
    // The parent reported at 60s but not at 120s.
    stub.add_series(&h.id, "cpu|usage", &[(60_000, 800.0)]);
    stub.set_properties(
        &h.id,
        HashMap::from([("config|name".to_string(), "esx-42".to_string())]),
    );

    let yaml = r#"
connection:
  host: https://vrops.example.com
  token: secret
query:
  resource_kind: VirtualMachine
  begin: 0
  end: 300000
fields:
  - alias: cpu
    metric: cpu|usage
  - alias: hostCpu
    metric: "$parent:HostSystem.cpu|usage"
  - alias: hostName
    prop: "$parent:HostSystem.config|name"
collect:
  workers: 1
  page_size: 100
"#;
    let (_collector, recorded) = run_export(Arc::clone(&stub), yaml).await;

    let rowset = recorded.rowset_for("vm-1").unwrap();
    let at_60 = rowset.row_at(60_000).unwrap();
    assert_eq!(at_60.metric(0), Some(1.0));
    assert_eq!(at_60.metric(1), Some(800.0));
    assert_eq!(at_60.prop(0), Some("esx-42"));

    let at_120 = rowset.row_at(120_000).unwrap();
    assert_eq!(at_120.metric(0), Some(2.0));
    assert_eq!(at_120.metric(1), None);
    assert_eq!(at_120.prop(0), Some("esx-42"));
}

#[tokio::test]
async fn latest_mode_exports_one_row_per_resource() {
    let stub = Arc::new(StubApi::new());
    for i in 0..2 {
        let r = vm(i);
        stub.add_series(&r.id, "cpu|usage", &[(60_000, 1.0), (240_000, 9.0)]);
        stub.add_resource(r);
    }

    let yaml = r#"
connection:
  host: https://vrops.example.com
  token: secret
query:
  resource_kind: VirtualMachine
  latest: true
fields:
  - alias: cpu
    metric: cpu|usage
collect:
  workers: 1
  page_size: 100
"#;
    let (collector, recorded) = run_export(Arc::clone(&stub), yaml).await;

    assert_eq!(collector.stats().rows_written(), 2);
    let rowset = recorded.rowset_for("vm-0").unwrap();
    assert_eq!(rowset.len(), 1);
    assert_eq!(rowset.row_at(240_000).unwrap().metric(0), Some(9.0));
}

#[tokio::test]
async fn compaction_folds_each_rowset_to_one_row() {
    let stub = Arc::new(StubApi::new());
    let r = vm(1);
    stub.add_series(&r.id, "cpu|usage", &[(60_000, 1.0), (120_000, 2.0)]);
    stub.add_series(&r.id, "mem|usage", &[(60_000, 70.0)]);
    stub.add_resource(r);

    let yaml = r#"
connection:
  host: https://vrops.example.com
  token: secret
query:
  resource_kind: VirtualMachine
  begin: 0
  end: 300000
fields:
  - alias: cpu
    metric: cpu|usage
  - alias: mem
    metric: mem|usage
collect:
  workers: 1
  page_size: 100
  compact: true
  compact_policy: LATEST
"#;
    let (collector, recorded) = run_export(Arc::clone(&stub), yaml).await;

    // One merged row at the newest timestamp; the 60s-only memory sample
    // survives the merge because the window reaches one rollup period back.
    assert_eq!(collector.stats().rows_written(), 1);
    let rowset = recorded.rowset_for("vm-1").unwrap();
    assert_eq!(rowset.len(), 1);
    let row = rowset.row_at(120_000).unwrap();
    assert_eq!(row.metric(0), Some(2.0));
    assert_eq!(row.metric(1), Some(70.0));
}

#[tokio::test]
async fn spooled_export_matches_direct_decode() {
    let stub = Arc::new(StubApi::new());
    for i in 0..3 {
        let r = vm(i);
        stub.add_series(&r.id, "cpu|usage", &[(60_000, 1.5), (120_000, 2.5)]);
        stub.add_resource(r);
    }

    let yaml = r#"
connection:
  host: https://vrops.example.com
  token: secret
query:
  resource_kind: VirtualMachine
  begin: 0
  end: 300000
fields:
  - alias: cpu
    metric: cpu|usage
collect:
  workers: 1
  page_size: 100
  spool_responses: true
"#;
    let (collector, recorded) = run_export(Arc::clone(&stub), yaml).await;

    assert_eq!(collector.stats().rows_written(), 6);
    assert_eq!(recorded.rowsets.lock().len(), 3);
    let rowset = recorded.rowset_for("vm-2").unwrap();
    assert_eq!(rowset.row_at(60_000).unwrap().metric(0), Some(1.5));
    assert_eq!(rowset.row_at(120_000).unwrap().metric(0), Some(2.5));
}

#[tokio::test]
async fn shared_parent_stream_is_fetched_once() {
    let stub = Arc::new(StubApi::new());
    let h = host("host-1");
    for i in 0..3 {
        let r = vm(i);
        stub.add_series(&r.id, "cpu|usage", &[(60_000, i as f64)]);
        stub.add_parent(&r.id, h.clone());
        stub.add_resource(r);
    }
    stub.add_series(&h.id, "cpu|usage", &[(60_000, 800.0)]);

    let yaml = r#"
connection:
  host: https://vrops.example.com
  token: secret
query:
  resource_kind: VirtualMachine
  begin: 0
  end: 300000
fields:
  - alias: cpu
    metric: cpu|usage
  - alias: hostCpu
    metric: "$parent:HostSystem.cpu|usage"
collect:
  workers: 1
  max_rows: 2
  page_size: 100
"#;
    let (collector, recorded) = run_export(Arc::clone(&stub), yaml).await;

    assert_eq!(collector.stats().resources_failed(), 0);
    for i in 0..3 {
        let rowset = recorded.rowset_for(&format!("vm-{i}")).unwrap();
        assert_eq!(rowset.row_at(60_000).unwrap().metric(1), Some(800.0));
    }
    // Three VM chunks plus exactly one parent fetch.
    let parent_calls = stub
        .stats_call_groups()
        .iter()
        .filter(|g| g.as_slice() == [ResourceId::from("host-1")])
        .count();
    assert_eq!(parent_calls, 1);
}
