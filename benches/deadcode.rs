//! Benchmarks for the cleanup and duplication transformations.
//!
//! Tests throughput on generated methods:
//! - Dead code elimination over long chains of diamonds
//! - Loop peeling and unrolling of a counting loop
//! - Safe-point tracking with interior pointers live across a loop

extern crate midend;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use midend::prelude::*;
use std::hint::black_box;

/// A chain of `diamonds` diamonds. Every arm computes one live value fed
/// into the join's phi and one dead value.
fn diamond_chain(diamonds: usize) -> ControlFlowGraph {
    CfgBuilder::new().build_with(|f| {
        let mut value = None;
        let mut cond = None;
        f.block(0, |b| {
            value = Some(b.arg(0, SemType::I64));
            cond = Some(b.arg(1, SemType::I64));
            b.jump(1);
        });
        let cond = cond.unwrap();
        for d in 0..diamonds {
            let head = 1 + 3 * d;
            let (left, right, join) = (head + 1, head + 2, head + 3);
            let current = value.unwrap();
            f.block(head, |b| b.branch(cond, left, right));
            let mut arms = Vec::new();
            for arm in [left, right] {
                f.block(arm, |b| {
                    let k = b.const_i64(arm as i64);
                    arms.push(b.add(current, k));
                    let _dead = b.mul(current, k);
                    b.jump(join);
                });
            }
            if d + 1 == diamonds {
                f.block(join, |b| {
                    let m = b.phi(SemType::I64, &[(left, arms[0]), (right, arms[1])]);
                    b.ret(Some(m));
                });
            } else {
                // The join is also the next diamond's head.
                let mut merged = None;
                f.block(join, |b| {
                    merged = Some(b.phi(SemType::I64, &[(left, arms[0]), (right, arms[1])]));
                });
                value = merged;
            }
        }
    })
}

/// `i = 0; while i < n { p = obj + 8 * i; safepoint; *p = i; i += 1 }`
fn pointer_loop() -> ControlFlowGraph {
    CfgBuilder::new().build_with(|f| {
        let i = f.temp(SemType::I64);
        let next = f.temp(SemType::I64);
        let zero = f.temp(SemType::I64);
        let mut obj = None;
        f.block(0, |b| {
            obj = Some(b.new_object(1));
            b.define(Opcode::Const(0), zero, &[]);
            b.jump(1);
        });
        let obj = obj.unwrap();
        f.block(1, |b| {
            b.phi_into(i, &[(0, zero), (2, next)]);
            let n = b.arg(0, SemType::I64);
            let c = b.cmp_lt(i, n);
            b.branch(c, 2, 3);
        });
        f.block(2, |b| {
            let p = b.lea(obj, Some(i), 8, 16);
            b.safepoint();
            b.st_ind(p, i);
            let one = b.const_i64(1);
            b.define(Opcode::Add, next, &[i, one]);
            b.jump(1);
        });
        f.block(3, |b| b.ret(Some(i)));
    })
}

/// Benchmark dead code elimination on diamond chains of growing length.
fn bench_dce_diamond_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("dce_diamond_chain");
    for diamonds in [16, 128, 512] {
        let cfg = diamond_chain(diamonds);
        group.throughput(Throughput::Elements(cfg.instructions().count() as u64));
        group.bench_function(format!("{diamonds}"), |b| {
            b.iter_batched(
                || {
                    let cfg = cfg.clone();
                    let du = DefUseIndex::build(&cfg);
                    (cfg, du)
                },
                |(mut cfg, mut du)| {
                    let stats = DeadCodeEliminator::new(&mut cfg, &mut du, DceOptions::default())
                        .run()
                        .unwrap();
                    black_box(stats)
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

/// Benchmark peeling and unrolling the pointer loop.
fn bench_loop_duplication(c: &mut Criterion) {
    let cfg = pointer_loop();
    let header = cfg.block_node(1).unwrap();

    let mut group = c.benchmark_group("loop_duplication");
    group.bench_function("peel", |b| {
        b.iter_batched(
            || cfg.clone(),
            |mut cfg| {
                let loops = LoopTree::compute(&cfg);
                let mut du = DefUseIndex::build(&cfg);
                black_box(peel_loop(&mut cfg, &mut du, &loops, header).unwrap())
            },
            BatchSize::SmallInput,
        );
    });
    group.bench_function("unroll_4", |b| {
        b.iter_batched(
            || cfg.clone(),
            |mut cfg| {
                let loops = LoopTree::compute(&cfg);
                let mut du = DefUseIndex::build(&cfg);
                black_box(unroll_loop(&mut cfg, &mut du, &loops, header, 4).unwrap())
            },
            BatchSize::SmallInput,
        );
    });
    group.finish();
}

/// Benchmark the safe-point tracker on the pointer loop.
fn bench_safe_point_tracker(c: &mut Criterion) {
    let cfg = pointer_loop();
    c.bench_function("safe_point_tracker", |b| {
        b.iter_batched(
            || cfg.clone(),
            |mut cfg| {
                let stats = SafePointTracker::new(&mut cfg, TrackerMode::Full)
                    .run()
                    .unwrap();
                black_box(stats)
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    bench_dce_diamond_chain,
    bench_loop_duplication,
    bench_safe_point_tracker
);
criterion_main!(benches);
