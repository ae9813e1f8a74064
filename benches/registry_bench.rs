// SPDX-License-Identifier: MIT OR Apache-2.0
//! Benchmarks for the tap registry hot paths: checkpoint writes (once per
//! runner iteration), listing pages over growing registries, and the raw
//! store's ordered child iteration.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use etap_core::{LIST_PAGE_SIZE, TapOptions};
use etap_runtime::{TapRegistry, TapStore};
use etap_store::{DbPath, Store};

// ── Helpers ─────────────────────────────────────────────────────────────

fn options() -> TapOptions {
    TapOptions {
        name: "bench".into(),
        code: "function mapEvents(batch) { return batch.map(p => p[1]); }".into(),
        webhook_url: "http://localhost:9/hook".into(),
        batch_limit: 100,
    }
}

fn registry_with(n: usize) -> TapRegistry {
    let reg = TapRegistry::new(Store::open_in_memory().unwrap());
    reg.init().unwrap();
    let opts = options();
    for i in 0..n {
        reg.create(&format!("tap-{i:06}"), &opts).unwrap();
    }
    reg
}

// ── Checkpoint writes ───────────────────────────────────────────────────

fn bench_checkpoint_writes(c: &mut Criterion) {
    let reg = registry_with(1);
    let mut seq = 0u64;
    c.bench_function("registry/set_checkpoint", |b| {
        b.iter(|| {
            seq += 1;
            reg.set_checkpoint("tap-000000", &format!("{seq:020}"))
                .unwrap();
        })
    });
    c.bench_function("registry/checkpoint", |b| {
        b.iter(|| black_box(reg.checkpoint("tap-000000").unwrap()))
    });
}

// ── Listing ─────────────────────────────────────────────────────────────

fn bench_list_pages(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry/list_page");
    for count in [100, 1_000, 10_000] {
        let reg = registry_with(count);
        let middle = format!("tap-{:06}", count / 2);
        group.throughput(Throughput::Elements(LIST_PAGE_SIZE.min(count) as u64));
        group.bench_with_input(BenchmarkId::new("first", count), &reg, |b, reg| {
            b.iter(|| black_box(reg.list_page(None, LIST_PAGE_SIZE).unwrap()))
        });
        group.bench_with_input(BenchmarkId::new("from_cursor", count), &reg, |b, reg| {
            b.iter(|| black_box(reg.list_page(Some(&middle), LIST_PAGE_SIZE).unwrap()))
        });
    }
    group.finish();
}

// ── Store iteration ─────────────────────────────────────────────────────

fn bench_store_iteration(c: &mut Criterion) {
    let mut group = c.benchmark_group("store/iter");
    for count in [1_000, 10_000] {
        let store = Store::open_in_memory().unwrap();
        let root = DbPath::root("bench");
        store
            .write(|tx| {
                tx.create_map(&root)?;
                for i in 0..count {
                    tx.put(&root.append(format!("k{i:06}")), b"v")?;
                }
                Ok::<_, etap_store::StoreError>(())
            })
            .unwrap();
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &store, |b, store| {
            b.iter(|| {
                store
                    .read(|tx| {
                        let mut n = 0usize;
                        for key in tx.iter(&root)? {
                            black_box(key?);
                            n += 1;
                        }
                        Ok::<_, etap_store::StoreError>(n)
                    })
                    .unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_checkpoint_writes,
    bench_list_pages,
    bench_store_iteration
);
criterion_main!(benches);
