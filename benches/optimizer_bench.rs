//! Criterion benchmarks for the optimizer hot path

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use oryx::prelude::*;

fn mbb_optimizer(nelx: usize, nely: usize) -> Optimizer {
    let mesh = Mesh::new(nelx, nely);
    let mut forces = vec![0.0; mesh.num_dofs()];
    forces[2 * mesh.node_index(0, nely) + 1] = -1.0;

    let mut fixed: Vec<usize> = (0..=nely).map(|j| 2 * mesh.node_index(0, j)).collect();
    fixed.push(2 * mesh.node_index(nelx, 0) + 1);

    Optimizer::new(OptimizerConfig::new(nelx, nely, 0.5), forces, fixed).unwrap()
}

fn bench_first_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("step");

    for &(nelx, nely) in &[(30, 10), (60, 20), (120, 40)] {
        group.bench_function(format!("mbb_{}x{}", nelx, nely), |b| {
            b.iter_batched_ref(
                || mbb_optimizer(nelx, nely),
                |optimizer| optimizer.step().unwrap(),
                BatchSize::LargeInput,
            )
        });
    }
    group.finish();
}

fn bench_filter_preparation(c: &mut Criterion) {
    c.bench_function("filter_prepare_120x40", |b| {
        b.iter(|| Filter::new(120, 40, 1.5))
    });
}

criterion_group!(benches, bench_first_step, bench_filter_preparation);
criterion_main!(benches);
