//! Benchmark for top-K scan throughput.

use bayou_core::{ColumnDatabase, ProgramRecord, QueryBatch, QueryEntry, Scanner};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

const DIMENSION: usize = 256;

fn vector(seed: usize) -> Vec<f32> {
    (0..DIMENSION)
        .map(|i| ((seed * 31 + i * 17) % 97) as f32 / 97.0)
        .collect()
}

fn database(rows: usize) -> ColumnDatabase {
    let mut db = ColumnDatabase::new(DIMENSION);
    let records = (0..rows).map(|i| (ProgramRecord::new("Bench.java", format!("m{}", i), ""), vector(i)));
    db.add_records(records, 1_000).expect("bench database");
    db
}

fn bench_scan(c: &mut Criterion) {
    let db = database(20_000);
    let queries: Vec<_> = (0..10).map(|i| QueryEntry::new(vector(i * 7 + 3))).collect();
    let batch = QueryBatch::single(queries, DIMENSION).expect("bench batch");

    let mut group = c.benchmark_group("scan_20k_x10");
    for threads in [1, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            b.iter(|| {
                let scanner = Scanner::new(&db, 10);
                black_box(scanner.search_and_top_k_parallel(&batch, threads).expect("scan"))
            })
        });
    }
    group.finish();
}

fn bench_single_query(c: &mut Criterion) {
    let db = database(20_000);
    let query = vector(5);
    c.bench_function("search_one_20k", |b| {
        b.iter(|| black_box(Scanner::new(&db, 5).search_one(&query).expect("search")))
    });
}

criterion_group!(benches, bench_scan, bench_single_query);
criterion_main!(benches);
