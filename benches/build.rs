//! Build cost: PCA fit and forest construction.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lookalike::eval::clustered_unit_dataset;
use lookalike::{ForestBuilder, ForestParams, ReducerModel};

fn bench_pca_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("pca_fit");
    group.sample_size(10);
    let data = clustered_unit_dataset(2_000, 0, 512, 20, 0.2, 7);

    for target in [16, 64, 100] {
        group.bench_with_input(BenchmarkId::from_parameter(target), &target, |bench, &target| {
            bench.iter(|| ReducerModel::fit(black_box(&data.train), target).expect("fit"))
        });
    }
    group.finish();
}

fn bench_forest_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("forest_build");
    group.sample_size(10);

    for n in [1_000, 10_000, 50_000] {
        let corpus = clustered_unit_dataset(n, 0, 100, 32, 0.15, 3).corpus();
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &corpus, |bench, corpus| {
            let builder = ForestBuilder::new(ForestParams {
                num_trees: 20,
                ..ForestParams::default()
            });
            bench.iter(|| builder.build_pairs(corpus.clone()).expect("build"))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_pca_fit, bench_forest_build);
criterion_main!(benches);
