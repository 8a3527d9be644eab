//! Benchmarks for superposition and normalization.
//!
//! Superposing into the bit-plane voting record is the hot path when
//! building semantic vectors from many elemental ones.

use bitlsh::BinaryVector;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::prelude::*;

// === Generators ===

fn random_vectors(n: usize, dim: usize) -> Vec<BinaryVector> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..n)
        .map(|_| BinaryVector::random(dim, dim / 2, &mut rng).unwrap())
        .collect()
}

// === Benchmarks ===

fn bench_superpose_votes(c: &mut Criterion) {
    let mut group = c.benchmark_group("superpose");
    let dim = 4096;
    let vectors = random_vectors(256, dim);

    for n in [16, 64, 256].iter() {
        group.throughput(Throughput::Elements(*n as u64));
        group.bench_with_input(BenchmarkId::new("unit_weight", n), n, |bencher, &n| {
            bencher.iter(|| {
                let mut sum = BinaryVector::zero(dim).unwrap();
                for v in &vectors[..n] {
                    sum.superpose(black_box(v), 1.0, None).unwrap();
                }
                sum
            })
        });
        group.bench_with_input(BenchmarkId::new("fractional_weight", n), n, |bencher, &n| {
            bencher.iter(|| {
                let mut sum = BinaryVector::zero(dim).unwrap();
                for (i, v) in vectors[..n].iter().enumerate() {
                    sum.superpose(black_box(v), 0.25 + (i % 7) as f64 * 0.5, None)
                        .unwrap();
                }
                sum
            })
        });
    }
    group.finish();
}

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize");
    let dim = 4096;
    let vectors = random_vectors(101, dim);
    let mut sum = BinaryVector::zero(dim).unwrap();
    for v in &vectors {
        sum.superpose(v, 1.0, None).unwrap();
    }

    group.bench_function("probabilistic", |bencher| {
        bencher.iter(|| {
            let mut v = sum.clone();
            v.normalize();
            v
        })
    });
    group.bench_function("exact_majority", |bencher| {
        bencher.iter(|| {
            let mut v = sum.clone();
            v.normalize_exact_majority();
            v
        })
    });
    group.finish();
}

fn bench_overlap(c: &mut Criterion) {
    let mut group = c.benchmark_group("overlap");
    for dim in [1024, 4096, 16384].iter() {
        let vectors = random_vectors(2, *dim);
        group.throughput(Throughput::Elements(*dim as u64));
        group.bench_with_input(BenchmarkId::from_parameter(dim), dim, |bencher, _| {
            bencher.iter(|| black_box(&vectors[0]).measure_overlap(black_box(&vectors[1])))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_superpose_votes, bench_normalize, bench_overlap);
criterion_main!(benches);
