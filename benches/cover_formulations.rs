use std::hint::black_box;
use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};
use kidney_exchange::cover::{CoverBounds, Formulation, solve_cover};
use kidney_exchange::pipeline::SubgraphExtractor;
use kidney_exchange::{DenseGraph, ExchangeGraph, SaidmanGenerator};

fn saidman_snapshot(entry_rate: f64, time_length: u32, seed: u64) -> Arc<DenseGraph> {
    let generator = SaidmanGenerator::new(entry_rate, 0.1, 0.1).expect("generator");
    let graph = ExchangeGraph::generate(generator, time_length, seed).expect("pool");
    let living = graph.living(time_length / 2, time_length / 2).expect("living");
    SubgraphExtractor::extract(&graph, &living)
        .expect("snapshot")
        .shared_graph()
}

fn bench_cover_formulations(c: &mut Criterion) {
    let small = saidman_snapshot(3.0, 20, 42);
    let medium = saidman_snapshot(5.0, 40, 7);
    let bounds = CoverBounds::new(3, 3);

    let mut group = c.benchmark_group("cover_formulations");
    group.sample_size(10);

    for formulation in Formulation::ALL {
        group.bench_function(format!("{formulation}_small"), |b| {
            b.iter(|| {
                let cover = solve_cover(Arc::clone(&small), bounds, formulation, None)
                    .expect("cover");
                black_box(cover);
            });
        });
        group.bench_function(format!("{formulation}_medium"), |b| {
            b.iter(|| {
                let cover = solve_cover(Arc::clone(&medium), bounds, formulation, None)
                    .expect("cover");
                black_box(cover);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_cover_formulations);
criterion_main!(benches);
