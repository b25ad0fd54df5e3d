//! Benchmarks for the dictionary and the eviction pool.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kvcore::{evict::EvictionPool, Dict};

fn filled(size: u64) -> Dict<u64, u64> {
    let mut dict = Dict::new();
    for i in 0..size {
        dict.add(i, i).unwrap();
    }
    while dict.rehash(100) {}
    dict
}

/// Inserts into an empty dictionary, paying for every incremental rehash on
/// the way up.
fn add_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("add");

    for size in [100u64, 1000, 10000].iter() {
        group.throughput(Throughput::Elements(*size));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let mut dict = Dict::new();
                for i in 0..size {
                    dict.add(black_box(i), black_box(i)).unwrap();
                }
                dict
            });
        });
    }
    group.finish();
}

fn find_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("find");

    for size in [100u64, 1000, 10000].iter() {
        let dict = filled(*size);
        group.throughput(Throughput::Elements(*size));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                for i in 0..size {
                    black_box(dict.get(&black_box(i)));
                }
            });
        });
    }
    group.finish();
}

fn delete_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("delete");

    for size in [100u64, 1000, 10000].iter() {
        group.throughput(Throughput::Elements(*size));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter_batched(
                || filled(size),
                |mut dict| {
                    for i in 0..size {
                        dict.delete(&black_box(i)).unwrap();
                    }
                    dict
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

/// A full scan, cursor to cursor.
fn scan_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan");

    for size in [1000u64, 10000].iter() {
        let dict = filled(*size);
        group.throughput(Throughput::Elements(*size));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let mut visited = 0;
                let mut cursor = 0;
                loop {
                    cursor = dict.scan(cursor, |_| visited += 1);
                    if cursor == 0 {
                        break;
                    }
                }
                visited
            });
        });
    }
    group.finish();
}

/// Sampling and ranking candidates, the inner loop of every eviction.
fn sample_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("sample");

    for count in [5usize, 10, 16].iter() {
        let mut dict = filled(10000);
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter(|| {
                let mut pool = EvictionPool::new();
                for entry in dict.sample_keys(count) {
                    pool.insert(*entry.value(), &entry.key().to_le_bytes(), 0);
                }
                pool
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    add_benchmark,
    find_benchmark,
    delete_benchmark,
    scan_benchmark,
    sample_benchmark
);
criterion_main!(benches);
