//! Benchmarks for the schedule optimizer.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use schedopt::prelude::*;
use schedopt::transform::optimize_scop;

fn gemm(n: i64) -> Scop {
    let stmt = StatementBuilder::new(StmtId(0), "gemm")
        .iterators(&["i", "j", "k"])
        .domain(IntegerSet::rectangular(&[n, n, n]))
        .read("C", AffineMap::projection(3, 0, &[0, 1]))
        .read("A", AffineMap::projection(3, 0, &[0, 2]))
        .read("B", AffineMap::projection(3, 0, &[2, 1]))
        .write("C", AffineMap::projection(3, 0, &[0, 1]))
        .build()
        .unwrap();
    let builder = ScopBuilder::new("gemm").statement(stmt);
    let tree = ScheduleTree::single_band(builder.domains(), vec![BandMember::permutable(false); 3]);
    builder.build(tree).unwrap()
}

fn jacobi() -> Scop {
    let stmt = StatementBuilder::new(StmtId(0), "jacobi")
        .iterators(&["i", "j"])
        .domain(IntegerSet::parametric_box(&[0, 0], 1))
        .read("A", AffineMap::identity(2, 1))
        .write("B", AffineMap::identity(2, 1))
        .build()
        .unwrap();
    let builder = ScopBuilder::new("jacobi").parameters(&["N"]).statement(stmt);
    let tree = ScheduleTree::single_band(builder.domains(), vec![BandMember::permutable(true); 2]);
    builder.build(tree).unwrap()
}

/// Benchmark the driver on a matrix multiplication.
fn bench_matmul(c: &mut Criterion) {
    let scop = gemm(64);
    let config = PipelineConfig::default();
    let target = TargetInfo::avx2();

    c.bench_function("optimize_gemm", |b| {
        b.iter(|| optimize_scop(black_box(&scop), &config, Some(&target)).unwrap())
    });
}

/// Benchmark the standard path: two-level tiling and prevectorization.
fn bench_standard(c: &mut Criterion) {
    let scop = jacobi();
    let config = PipelineConfig::for_locality();

    c.bench_function("optimize_jacobi", |b| {
        b.iter(|| optimize_scop(black_box(&scop), &config, None).unwrap())
    });
}

/// Benchmark evaluation of a tiled and isolated tree.
fn bench_execution_order(c: &mut Criterion) {
    let scop = jacobi();
    let result = optimize_scop(&scop, &PipelineConfig::default(), None).unwrap();

    c.bench_function("execution_order_jacobi_64", |b| {
        b.iter(|| result.schedule.execution_order(black_box(&[64])).unwrap())
    });
}

criterion_group!(benches, bench_matmul, bench_standard, bench_execution_order);
criterion_main!(benches);
