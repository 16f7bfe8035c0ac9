use criterion::{black_box, criterion_group, criterion_main, Criterion};
use neuromatch_core::source::{BatchOptions, BatchSource, OtfConfig, OtfSource};
use neuromatch_core::{sample_connected, Graph, SubgraphMatcher};
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;

fn ring_with_chords(n: usize) -> Graph {
    let mut edges: Vec<(usize, usize)> = (0..n).map(|i| (i, (i + 1) % n)).collect();
    edges.extend((0..n).step_by(7).map(|i| (i, (i * 13 + 5) % n)));
    Graph::from_edges(n, &edges)
}

fn bench_sample_connected(c: &mut Criterion) {
    // Ring of 1000 nodes with sparse chords
    let graph = ring_with_chords(1000);
    let mut rng = XorShiftRng::seed_from_u64(42);

    c.bench_function("sample_connected_20_of_1000", |b| {
        b.iter(|| sample_connected(black_box(&graph), black_box(20), 1000, &mut rng))
    });
}

fn bench_oracle(c: &mut Criterion) {
    let target = ring_with_chords(30);
    let mut rng = XorShiftRng::seed_from_u64(7);
    let nodes = sample_connected(&target, 8, 1000, &mut rng).unwrap();
    let query = target.induced_subgraph(&nodes);

    c.bench_function("oracle_8_in_30", |b| {
        b.iter(|| SubgraphMatcher::new(black_box(&target), black_box(&query)).is_subgraph())
    });
}

fn bench_otf_batch(c: &mut Criterion) {
    let mut source = OtfSource::new(OtfConfig::default().with_seed(1)).unwrap();
    let options = BatchOptions::default();

    c.bench_function("otf_batch_64", |b| {
        b.iter(|| {
            let planned = source.prepare(64, 64, true).unwrap().into_iter().next().unwrap();
            source.generate_batch(planned, true, &options).unwrap()
        })
    });
}

criterion_group!(benches, bench_sample_connected, bench_oracle, bench_otf_batch);
criterion_main!(benches);
