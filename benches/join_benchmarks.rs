//! Criterion benchmarks for the join strategies.
//!
//! Run with: `cargo bench`
//!
//! Each strategy joins the same generated relations; budgets and key
//! distributions vary so block size and partition fan-out can be compared.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use join_engine::categories::execution::{JoinSpec, SequentialScan};
use join_engine::categories::storage::StorageContext;
use join_engine::core::operator::{drain, ExecutionContext, Operator};
use join_engine::core::registry::{JoinStrategy, OperatorRegistry};
use join_engine::runtime::{DataGenerator, Distribution, RelationConfig};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn setup(rows: usize, distribution: Distribution) -> anyhow::Result<(ExecutionContext, StorageContext)> {
    let storage = StorageContext::with_page_size(4096);
    for (name, seed) in [("left", 1), ("right", 2)] {
        let config = RelationConfig {
            rows,
            key_space: rows / 4 + 1,
            distribution,
            payload_width: 16,
            seed,
        };
        DataGenerator::load(&storage, name, &config)?;
    }
    Ok((ExecutionContext::new(storage.clone()), storage))
}

fn run_join(
    registry: &OperatorRegistry,
    strategy: JoinStrategy,
    ctx: &ExecutionContext,
    storage: &StorageContext,
    budget: usize,
) -> anyhow::Result<usize> {
    let scan = |name: &str| -> anyhow::Result<Box<dyn Operator>> {
        Ok(Box::new(SequentialScan::new(storage, storage.table(name)?)?))
    };
    let join = registry.build(strategy, JoinSpec::new(scan("left")?, scan("right")?, "key", "key", budget))?;
    Ok(drain(join.iter(ctx)?)?.len())
}

// ---------------------------------------------------------------------------
// Strategy comparison
// ---------------------------------------------------------------------------

fn bench_strategies(c: &mut Criterion) {
    let registry = OperatorRegistry::with_builtin_joins();
    let mut group = c.benchmark_group("join_strategy");
    group.sample_size(20);

    for rows in [200, 1_000] {
        let (ctx, storage) = setup(rows, Distribution::Uniform).expect("setup");
        for strategy in JoinStrategy::ALL {
            group.bench_with_input(BenchmarkId::new(strategy.as_str(), rows), &rows, |b, _| {
                b.iter(|| black_box(run_join(&registry, strategy, &ctx, &storage, 8).expect("join")));
            });
        }
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Buffer budget
// ---------------------------------------------------------------------------

fn bench_block_budget(c: &mut Criterion) {
    let registry = OperatorRegistry::with_builtin_joins();
    let (ctx, storage) = setup(1_000, Distribution::Uniform).expect("setup");
    let mut group = c.benchmark_group("block_nested_loop_budget");
    group.sample_size(20);

    for budget in [3, 6, 12, 24] {
        group.bench_with_input(BenchmarkId::from_parameter(budget), &budget, |b, &budget| {
            b.iter(|| {
                black_box(
                    run_join(&registry, JoinStrategy::BlockNestedLoop, &ctx, &storage, budget).expect("join"),
                )
            });
        });
    }
    group.finish();
}

fn bench_grace_hash_skew(c: &mut Criterion) {
    let registry = OperatorRegistry::with_builtin_joins();
    let mut group = c.benchmark_group("grace_hash_skew");
    group.sample_size(20);

    for distribution in [Distribution::Uniform, Distribution::Zipfian] {
        let (ctx, storage) = setup(1_000, distribution).expect("setup");
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{:?}", distribution)),
            &distribution,
            |b, _| {
                b.iter(|| black_box(run_join(&registry, JoinStrategy::GraceHash, &ctx, &storage, 6).expect("join")));
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_strategies, bench_block_budget, bench_grace_hash_skew);
criterion_main!(benches);
