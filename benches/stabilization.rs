/* benches/stabilization.rs */
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lumistab::{
    balance::penalty_gradient, boundary::MetricsSource, penalty, synthetic::SyntheticMetricsSource,
    DistributedStabilizer, MagicSumTarget, StabilizationEngine, StabilizerConfig, SymmetryEvaluator, SystemMatrix,
    TopologySpec, ZeroObjective,
};
use rand::{rngs::StdRng, SeedableRng};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

fn permutation(dimension: usize) -> SystemMatrix {
    let mut rng = StdRng::seed_from_u64(dimension as u64);
    SystemMatrix::random_permutation(dimension, &mut rng).unwrap()
}

/// Balance penalty and its gradient across matrix sizes
fn bench_balance(c: &mut Criterion) {
    let mut group = c.benchmark_group("balance");

    for &dimension in &[3usize, 8, 16, 32, 64] {
        let matrix = permutation(dimension);
        let target = MagicSumTarget::for_dimension(dimension);
        group.throughput(Throughput::Elements((dimension * dimension) as u64));

        group.bench_with_input(BenchmarkId::new("penalty", dimension), &matrix, |b, m| {
            b.iter(|| black_box(penalty(black_box(m), target)))
        });
        group.bench_with_input(BenchmarkId::new("gradient", dimension), &matrix, |b, m| {
            b.iter(|| black_box(penalty_gradient(black_box(m), target)))
        });
    }

    group.finish();
}

/// Symmetry scoring of synthetic snapshots
fn bench_symmetry(c: &mut Criterion) {
    let evaluator = SymmetryEvaluator::default();
    let mut source = SyntheticMetricsSource::new(7);
    let Some(snapshot) = source.next_snapshot() else {
        return;
    };

    c.bench_function("symmetry_evaluate", |b| b.iter(|| black_box(evaluator.evaluate(black_box(&snapshot)))));
}

/// One distributed stabilization pass per topology
fn bench_distributed(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let mut group = c.benchmark_group("distributed_stabilize");
    group.measurement_time(Duration::from_secs(10));

    let topologies = [
        ("whole", TopologySpec::Whole),
        ("row_bands_4", TopologySpec::RowBands { count: 4 }),
        ("blocks_2x2", TopologySpec::Blocks { rows: 2, cols: 2 }),
    ];
    for (name, topology) in topologies {
        let config = StabilizerConfig { dimension: 8, topology, ..StabilizerConfig::default() };
        let stabilizer = DistributedStabilizer::new(&config).unwrap();
        let input = permutation(8);
        let cancel = CancellationToken::new();

        group.bench_function(name, |b| {
            b.iter(|| {
                runtime
                    .block_on(stabilizer.stabilize(black_box(&input), Arc::new(ZeroObjective), 1, &cancel))
                    .unwrap()
            })
        });
    }

    group.finish();
}

/// Full engine cycles against the synthetic source
fn bench_engine_cycle(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();

    c.bench_function("engine_cycle", |b| {
        b.iter_batched(
            || {
                let engine = StabilizationEngine::new(StabilizerConfig::default(), Arc::new(ZeroObjective)).unwrap();
                let snapshot = SyntheticMetricsSource::new(3).next_snapshot().unwrap();
                (engine, snapshot)
            },
            |(mut engine, snapshot)| runtime.block_on(engine.run_cycle(&snapshot)).unwrap(),
            criterion::BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_balance, bench_symmetry, bench_distributed, bench_engine_cycle);
criterion_main!(benches);
