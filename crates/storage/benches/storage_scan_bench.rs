//! Benchmarks for MemoryStorage prefix scans.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rill_core::Value;
use rill_storage::{storage_key, MemoryStorage, ScanOptions, Storage};
use serde_json::json;

fn populate(storage: &mut MemoryStorage, parents: i64, per_parent: i64) {
    for p in 0..parents {
        for c in 0..per_parent {
            storage.set(
                &storage_key("pKeySet", &[Value::from(p), Value::from(c)]),
                json!(true),
            );
        }
    }
}

fn storage_scan_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("storage_prefix_scan");

    for per_parent in [1i64, 10, 100].iter() {
        let mut storage = MemoryStorage::new();
        populate(&mut storage, 1000, *per_parent);

        group.bench_with_input(
            BenchmarkId::new("first_match", per_parent),
            per_parent,
            |b, _| {
                b.iter(|| {
                    let prefix = storage_key("pKeySet", &[Value::from(500)]);
                    black_box(storage.scan(ScanOptions::prefix(prefix).limit(1)))
                })
            },
        );

        group.bench_with_input(BenchmarkId::new("all_matches", per_parent), per_parent, |b, _| {
            b.iter(|| {
                let prefix = storage_key("pKeySet", &[Value::from(500)]);
                black_box(storage.scan(ScanOptions::prefix(prefix)))
            })
        });
    }

    group.finish();
}

criterion_group!(benches, storage_scan_benchmark);
criterion_main!(benches);
