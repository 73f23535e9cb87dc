use std::{hint::black_box, io::Cursor};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ipd_core::{record::write_records, CancelToken, Counters};
use ipd_dedup::{sort_and_dedup, DeduplicatorBuilder, TwoWayMerge};
use ipd_parser::TextAddressReader;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tempfile::TempDir;

fn random_values(n: usize, seed: u64) -> Vec<u32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| rng.gen_range(0..(n as u32 * 2))).collect()
}

fn bench_sort_and_dedup(c: &mut Criterion) {
    let values = random_values(100_000, 1);
    c.bench_function("sort_and_dedup_100k", |b| {
        b.iter(|| {
            let mut v = values.clone();
            black_box(sort_and_dedup(&mut v))
        });
    });
}

fn bench_two_way_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("two_way_merge");
    for n in [10_000usize, 100_000] {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.tmp");
        let b = dir.path().join("b.tmp");
        let out = dir.path().join("out.tmp");
        for (path, seed) in [(&a, 2), (&b, 3)] {
            let mut values = random_values(n, seed);
            sort_and_dedup(&mut values);
            write_records(path, &values).unwrap();
        }

        group.bench_with_input(BenchmarkId::new("values", n), &n, |bench, _| {
            let counters = Counters::new();
            let cancel = CancelToken::new();
            let engine = TwoWayMerge::new(&counters, &cancel).clean_up(false);
            bench.iter(|| black_box(engine.merge(&a, &b, &out).unwrap()));
        });
    }
    group.finish();
}

fn bench_full_run(c: &mut Criterion) {
    let text: String = random_values(50_000, 4)
        .into_iter()
        .map(|v| format!("{}\n", ipd_core::format_address(v)))
        .collect();
    let mut group = c.benchmark_group("full_run");
    for workers in [1usize, 4] {
        group.bench_with_input(BenchmarkId::new("workers", workers), &workers, |b, &workers| {
            b.iter(|| {
                let dir = TempDir::new().unwrap();
                let dedup = DeduplicatorBuilder::new(dir.path())
                    .chunk_size(64 * 1024)
                    .workers(workers)
                    .build()
                    .unwrap();
                let mut reader = TextAddressReader::new("bench", Cursor::new(text.as_bytes()));
                black_box(dedup.run_reader(&mut reader).unwrap().unique_count())
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_sort_and_dedup, bench_two_way_merge, bench_full_run);
criterion_main!(benches);
