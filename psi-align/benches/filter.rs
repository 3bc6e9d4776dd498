use criterion::{criterion_group, criterion_main, Criterion};
use rand::prelude::*;

use psi_align::{BitFilter, BlindingKey, Ristretto255};

fn random_items(count: usize) -> Vec<[u8; 32]> {
    let mut rng = thread_rng();
    (0..count).map(|_| rng.gen()).collect()
}

pub fn bench_build(c: &mut Criterion) {
    let items = random_items(100_000);

    c.bench_function("filter build 100k", |b| {
        b.iter(|| {
            BitFilter::build(&items, 40, 64).unwrap();
        })
    });
}

pub fn bench_probe(c: &mut Criterion) {
    let items = random_items(100_000);
    let filter = BitFilter::build(&items, 40, 64).unwrap();
    let probes = random_items(1_000);

    c.bench_function("filter probe 1k", |b| {
        b.iter(|| probes.iter().filter(|probe| filter.contains(*probe)).count())
    });
}

pub fn bench_blind(c: &mut Criterion) {
    let key = BlindingKey::<Ristretto255>::generate();
    let ids: Vec<Vec<u8>> = (0..1_000).map(|i: u32| i.to_be_bytes().to_vec()).collect();

    c.bench_function("ristretto blind 1k", |b| {
        b.iter(|| {
            key.blind_items(&ids, 64).unwrap();
        })
    });
}

criterion_group!(benches, bench_build, bench_probe, bench_blind);
criterion_main!(benches);
