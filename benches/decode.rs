use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;

use statferry::decode::{SliceFeed, StatsDecoder};
use statferry::model::{Field, Schema};

const KEYS: [&str; 2] = ["cpu|usage_average", "mem|usage_average"];
const SAMPLES: usize = 288; // 24h at 5-minute rollup

fn stats_schema() -> Schema {
    Schema::build(vec![
        Field::metric("cpu", KEYS[0]).unwrap(),
        Field::metric("mem", KEYS[1]).unwrap(),
    ])
    .unwrap()
}

fn stats_document(resources: usize) -> Bytes {
    let timestamps: Vec<i64> = (0..SAMPLES)
        .map(|i| 1_700_000_000_000 + i as i64 * 300_000)
        .collect();
    let values: Vec<_> = (0..resources)
        .map(|r| {
            let stats: Vec<_> = KEYS
                .iter()
                .map(|key| {
                    let data: Vec<f64> = (0..SAMPLES)
                        .map(|i| 100.0 + (r * SAMPLES + i) as f64 * 0.25)
                        .collect();
                    json!({
                        "timestamps": timestamps,
                        "statKey": { "key": key },
                        "data": data,
                    })
                })
                .collect();
            json!({
                "resourceId": format!("resource-{r}"),
                "stat-list": { "stat": stats },
            })
        })
        .collect();
    Bytes::from(json!({ "values": values }).to_string())
}

async fn decode_all(doc: Bytes, schema: &Schema, chunk: Option<usize>) -> usize {
    let feed = match chunk {
        Some(size) => SliceFeed::chunked(doc, size),
        None => SliceFeed::new(doc),
    };
    let mut decoder = StatsDecoder::new(feed, schema);
    let mut rows = 0usize;
    while let Some(rowset) = decoder.next_rowset().await.unwrap() {
        rows += rowset.len();
    }
    rows
}

fn bench_decode(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let schema = stats_schema();

    let mut group = c.benchmark_group("decode");
    for resources in [10usize, 100, 500].iter() {
        let doc = stats_document(*resources);
        group.bench_with_input(
            BenchmarkId::from_parameter(resources),
            resources,
            |b, _| {
                b.iter(|| {
                    rt.block_on(async {
                        black_box(decode_all(doc.clone(), &schema, None).await)
                    })
                });
            },
        );
    }
    group.finish();
}

fn bench_decode_chunked(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let schema = stats_schema();
    let doc = stats_document(100);

    let mut group = c.benchmark_group("decode_chunked");
    for chunk in [512usize, 4096, 65536].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(chunk), chunk, |b, size| {
            b.iter(|| {
                rt.block_on(async {
                    black_box(decode_all(doc.clone(), &schema, Some(*size)).await)
                })
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_decode, bench_decode_chunked);
criterion_main!(benches);
