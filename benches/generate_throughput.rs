//! Benchmarks for number generation.
//!
//! Run with: cargo bench
//! View results in: target/criterion/report/index.html

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::TempDir;

use seqmint::contracts::{CounterKey, PeriodType, SequenceType};
use seqmint::generator::{format_number, SequenceNumberGenerator};
use seqmint::storage::{MemoryStore, RocksDbStore};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap()
}

// =============================================================================
// Formatting
// =============================================================================

fn bench_format(c: &mut Criterion) {
    let now = chrono::Utc::now();

    c.bench_function("format_number", |b| {
        b.iter(|| {
            let key = CounterKey::for_instant(
                black_box(SequenceType::Order),
                black_box(PeriodType::Daily),
                now,
            );
            format_number(SequenceType::Order.prefix(), &key.date_part(), black_box(42))
        });
    });
}

// =============================================================================
// Single caller
// =============================================================================

fn bench_issue_memory(c: &mut Criterion) {
    let rt = runtime();
    let store = Arc::new(MemoryStore::new());
    let generator = SequenceNumberGenerator::new(Arc::clone(&store), store);

    c.bench_function("issue_memory", |b| {
        b.to_async(&rt)
            .iter(|| generator.issue(SequenceType::Sale, PeriodType::Daily));
    });
}

fn bench_issue_rocksdb(c: &mut Criterion) {
    let rt = runtime();
    let dir = TempDir::new().unwrap();
    let store = Arc::new(RocksDbStore::open(dir.path()).unwrap());
    let generator = SequenceNumberGenerator::new(Arc::clone(&store), store);

    c.bench_function("issue_rocksdb", |b| {
        b.to_async(&rt)
            .iter(|| generator.issue(SequenceType::Order, PeriodType::Daily));
    });
}

// =============================================================================
// Contended counter
// =============================================================================

/// `callers` tasks race for the same counter row; each retries on conflict.
fn bench_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("issue_contended");
    let rt = runtime();

    for callers in [2usize, 8, 32] {
        let store = Arc::new(MemoryStore::new());
        let generator = Arc::new(SequenceNumberGenerator::new(Arc::clone(&store), store));

        group.throughput(Throughput::Elements(callers as u64));
        group.bench_with_input(BenchmarkId::from_parameter(callers), &callers, |b, &n| {
            b.to_async(&rt).iter(|| {
                let generator = Arc::clone(&generator);
                async move {
                    let handles: Vec<_> = (0..n)
                        .map(|_| {
                            let g = Arc::clone(&generator);
                            tokio::spawn(async move {
                                loop {
                                    match g.issue(SequenceType::Sale, PeriodType::Daily).await {
                                        Err(e) if e.is_conflict() => continue,
                                        other => break other,
                                    }
                                }
                            })
                        })
                        .collect();
                    for handle in futures::future::join_all(handles).await {
                        black_box(handle.unwrap().unwrap());
                    }
                }
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_format,
    bench_issue_memory,
    bench_issue_rocksdb,
    bench_contended,
);
criterion_main!(benches);
