//! Benchmarks for hashing, candidate expansion and store queries.

use bitlsh::hash::candidates::codes_within;
use bitlsh::{
    BinaryVector, FileVectorStore, InMemoryLshStore, LocalitySensitiveHash, LshConfig, LshStore,
    PersistedLshStore,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::*;

const DIM: usize = 4096;

fn random_vectors(n: usize, seed: u64) -> Vec<BinaryVector> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| BinaryVector::random(DIM, DIM / 2, &mut rng).unwrap())
        .collect()
}

fn bench_hash(c: &mut Criterion) {
    let mut group = c.benchmark_group("lsh_hash");
    let query = random_vectors(1, 1).pop().unwrap();
    for k in [4, 8, 15].iter() {
        let config = LshConfig::new(*k, 0).unwrap().with_seed(7);
        let lsh = LocalitySensitiveHash::<BinaryVector>::new(config, DIM).unwrap();
        group.bench_with_input(BenchmarkId::new("k", k), k, |bencher, _| {
            bencher.iter(|| lsh.hash(black_box(&query)).unwrap())
        });
    }
    group.finish();
}

fn bench_candidate_codes(c: &mut Criterion) {
    let mut group = c.benchmark_group("candidate_codes");
    for (k, d) in [(8, 2), (12, 3), (15, 5)].iter() {
        group.bench_with_input(
            BenchmarkId::new("k_d", format!("{k}_{d}")),
            &(*k, *d),
            |bencher, &(k, d)| bencher.iter(|| codes_within(black_box(0x2A), k, d)),
        );
    }
    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("lsh_query");
    group.sample_size(20);

    let dir = tempfile::tempdir().unwrap();
    let vectors = random_vectors(2000, 2);
    let store = FileVectorStore::create(
        dir.path().join("vectors.bin"),
        DIM,
        vectors.iter().enumerate().map(|(i, v)| (format!("v{i}"), v)),
    )
    .unwrap();
    let config = LshConfig::new(8, 2).unwrap().with_seed(3);
    let memory = InMemoryLshStore::build(store.clone(), config).unwrap();
    let persisted = PersistedLshStore::build(store, config).unwrap();
    let query = &vectors[17];

    group.bench_function("in_memory_search", |bencher| {
        bencher.iter(|| memory.search(black_box(query), 10).unwrap())
    });
    group.bench_function("persisted_search", |bencher| {
        bencher.iter(|| persisted.search(black_box(query), 10).unwrap())
    });
    group.bench_function("persisted_candidate_offsets", |bencher| {
        bencher.iter(|| persisted.candidate_offsets(black_box(query)).unwrap())
    });
    group.finish();
}

criterion_group!(benches, bench_hash, bench_candidate_codes, bench_query);
criterion_main!(benches);
