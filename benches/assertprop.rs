//! Benchmarks for assertion propagation.
//!
//! Measures the phases of the optimizer on synthetic methods:
//! - Fact generation over every node
//! - The available-facts dataflow
//! - The complete global and local passes
//! - The scheduler over many methods in parallel

extern crate assertprop;

use assertprop::prelude::*;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use std::hint::black_box;

/// A chain of `blocks` blocks; each indexes an array and compares `x`
/// against its own constant, leaving for a shared exit on a match.
fn branch_chain(blocks: usize) -> MethodIr {
    MethodBuilder::new(format!("chain_{blocks}")).build_with(|f| {
        let x = f.param(VarType::Int);
        let arr = f.param(VarType::Ref);
        let i = f.param(VarType::Int);
        for idx in 0..blocks {
            f.block(idx, |b| {
                let idx_read = b.lcl(i, 1);
                let elem = b.index(arr, 1, idx_read, VarType::Int);
                b.eval(elem);
                if idx + 1 == blocks {
                    let v = b.lcl(x, 1);
                    b.ret_val(v);
                } else {
                    let v = b.lcl(x, 1);
                    let k = b.int(idx as i32);
                    let cond = b.eq(v, k);
                    b.branch(cond, blocks);
                }
            });
        }
        f.block(blocks, |b| b.ret());
    })
}

/// A straight-line block of copies and reads for the local pass.
fn copy_block(copies: usize) -> MethodIr {
    MethodBuilder::new(format!("copies_{copies}"))
        .ssa(false)
        .build_with(|f| {
            let locals: Vec<LclNum> = (0..copies).map(|_| f.local(VarType::Int)).collect();
            let src = f.param(VarType::Int);
            f.block(0, |b| {
                for &lcl in &locals {
                    let s = b.lcl(src, 0);
                    b.def(lcl, 0, s);
                }
                for &lcl in &locals {
                    let v = b.lcl(lcl, 0);
                    let one = b.int(1);
                    let sum = b.add(v, one);
                    b.eval(sum);
                }
                b.ret();
            });
        })
}

fn numbered(blocks: usize) -> (MethodIr, ValueNumStore) {
    let mut method = branch_chain(blocks);
    let values = ValueNumbering::new().run(&mut method).unwrap();
    (method, values)
}

/// Benchmark generating facts for every node of a 32-block chain.
fn bench_generate(c: &mut Criterion) {
    let (method, values) = numbered(32);

    c.bench_function("assertprop_generate_32", |b| {
        b.iter(|| {
            let mut engine =
                AssertionEngine::new(PropagationMode::Global, MAX_ASSERTION_COUNT, &values);
            for block in &method.blocks {
                for stmt in &block.statements {
                    for node in method.execution_order(stmt.root) {
                        engine.generate(&method, node);
                    }
                }
            }
            black_box(engine.store().len())
        });
    });
}

/// Benchmark solving the dataflow over a 32-block chain.
fn bench_dataflow(c: &mut Criterion) {
    let (method, values) = numbered(32);
    let mut engine = AssertionEngine::new(PropagationMode::Global, MAX_ASSERTION_COUNT, &values);
    for block in &method.blocks {
        for stmt in &block.statements {
            for node in method.execution_order(stmt.root) {
                engine.generate(&method, node);
            }
        }
    }

    c.bench_function("assertprop_dataflow_32", |b| {
        b.iter(|| {
            let flow = AssertionDataflow::run(black_box(&engine), &method);
            black_box(flow.iterations())
        });
    });
}

/// Benchmark the full global pass; each iteration gets a fresh method.
fn bench_global_pass(c: &mut Criterion) {
    let (method, values) = numbered(32);
    let pass = AssertionPropPass::new(AssertionPropConfig::new());

    c.bench_function("assertprop_global_pass_32", |b| {
        b.iter_batched(
            || (method.clone(), CompilerContext::new()),
            |(mut method, ctx)| {
                let changed = pass.run_on_method(&mut method, &values, &ctx).unwrap();
                black_box(changed)
            },
            BatchSize::SmallInput,
        );
    });
}

/// Benchmark the local pass over a block of 48 copies.
fn bench_local_pass(c: &mut Criterion) {
    let method = copy_block(48);
    let values = ValueNumStore::new();
    let pass = AssertionPropPass::new(AssertionPropConfig::local());

    c.bench_function("assertprop_local_pass_48", |b| {
        b.iter_batched(
            || (method.clone(), CompilerContext::new()),
            |(mut method, ctx)| {
                let changed = pass.run_on_method(&mut method, &values, &ctx).unwrap();
                black_box(changed)
            },
            BatchSize::SmallInput,
        );
    });
}

/// Benchmark the scheduler over 64 methods.
fn bench_scheduler(c: &mut Criterion) {
    let units: Vec<CompilationUnit> = (0..64u32)
        .map(|id| {
            let (mut method, values) = numbered(16);
            method.id = MethodId(id);
            CompilationUnit::new(method, values)
        })
        .collect();
    let scheduler = PassScheduler::from_config(&AssertionPropConfig::new()).unwrap();

    c.bench_function("assertprop_scheduler_64x16", |b| {
        b.iter_batched(
            || (units.clone(), CompilerContext::new()),
            |(mut units, ctx)| black_box(scheduler.run(&mut units, &ctx)),
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(
    benches,
    bench_generate,
    bench_dataflow,
    bench_global_pass,
    bench_local_pass,
    bench_scheduler,
);
criterion_main!(benches);
