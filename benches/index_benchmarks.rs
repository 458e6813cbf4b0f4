//! Index performance benchmarks: insert, hinted insert, range and partition.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;
use strata::{BoundPattern, IndexSpec, Relation, RelationSpec, StorageMode, DEFAULT_CHUNK_SIZE};

fn make_relation(storage: StorageMode) -> Relation {
    Relation::new(
        RelationSpec::new("r", 3)
            .index(IndexSpec::new(vec![0, 1, 2]).serving("100"))
            .index(IndexSpec::new(vec![2, 0, 1]).serving("001"))
            .storage(storage),
    )
    .expect("relation")
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");
    for storage in [StorageMode::Direct, StorageMode::Indirect] {
        for size in [1_000i32, 10_000] {
            let id = BenchmarkId::new(storage.to_string(), size);
            group.bench_with_input(id, &size, |b, &n| {
                b.iter(|| {
                    let rel = make_relation(storage);
                    for i in 0..n {
                        rel.try_insert(&[i % 97, i, i % 13]).unwrap();
                    }
                    rel
                });
            });
        }
    }
    group.finish();
}

fn bench_hinted_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("hinted_insert_sorted");
    for size in [1_000i32, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &n| {
            b.iter(|| {
                let rel = make_relation(StorageMode::Direct);
                let mut ctx = rel.create_context();
                for i in 0..n {
                    // every tuple twice: the second insert is a hint hit
                    rel.try_insert_with(&[i, i, i], &mut ctx).unwrap();
                    rel.try_insert_with(&[i, i, i], &mut ctx).unwrap();
                }
                rel
            });
        });
    }
    group.finish();
}

fn bench_range(c: &mut Criterion) {
    let rel = make_relation(StorageMode::Direct);
    for i in 0..50_000 {
        rel.try_insert(&[i % 500, i, i % 7]).unwrap();
    }
    let pattern = BoundPattern::parse("100").expect("pattern");
    let last = BoundPattern::parse("001").expect("pattern");

    let mut group = c.benchmark_group("range");
    group.bench_function("prefix_100", |b| {
        let mut k = 0;
        b.iter(|| {
            k = (k + 1) % 500;
            rel.range(pattern, &[k, 0, 0]).expect("range").iter().count()
        });
    });
    group.bench_function("secondary_001", |b| {
        let mut k = 0;
        b.iter(|| {
            k = (k + 1) % 7;
            rel.range(last, &[0, 0, k]).expect("range").iter().count()
        });
    });
    group.bench_function("exact", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % 50_000;
            rel.try_contains(&[i % 500, i, i % 7]).unwrap()
        });
    });
    group.finish();
}

fn bench_partition(c: &mut Criterion) {
    let rel = make_relation(StorageMode::Direct);
    for i in 0..100_000 {
        rel.try_insert(&[i, i, i]).unwrap();
    }
    c.bench_function("partition_100k", |b| {
        b.iter(|| rel.partition(DEFAULT_CHUNK_SIZE).len());
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(5))
        .warm_up_time(Duration::from_secs(1));
    targets = bench_insert, bench_hinted_insert, bench_range, bench_partition
}
criterion_main!(benches);
