//! End-to-end propagation scenarios.
//!
//! Each test builds a small method with [`MethodBuilder`], numbers its
//! values, runs the standard pipeline through the [`PassScheduler`] and then
//! checks the rewritten IR together with the events the run recorded.

use assertprop::prelude::*;

/// Numbers `method` and runs the pipeline for `config` over it.
fn optimize(mut method: MethodIr, config: &AssertionPropConfig) -> (MethodIr, CompilerContext) {
    if method.ssa_built {
        // Local mode does without value numbers.
        let values = ValueNumbering::new()
            .run(&mut method)
            .expect("value numbering failed");
        return run_units(CompilationUnit::new(method, values), config);
    }
    run_units(CompilationUnit::new(method, ValueNumStore::new()), config)
}

fn run_units(unit: CompilationUnit, config: &AssertionPropConfig) -> (MethodIr, CompilerContext) {
    let scheduler = PassScheduler::from_config(config).expect("invalid configuration");
    let ctx = CompilerContext::new();
    let mut units = vec![unit];
    scheduler.run(&mut units, &ctx);
    assert_eq!(ctx.events.count_kind(EventKind::MethodAborted), 0);
    let unit = units.pop().expect("unit vanished");
    (unit.method, ctx)
}

/// The value a block's final `RETURN` produces.
fn returned(method: &MethodIr, block: usize) -> NodeId {
    let root = method.blocks[block]
        .last_root()
        .expect("block has no statements");
    assert_eq!(method.node(root).oper, Oper::Return);
    method.node(root).op1().expect("return without value")
}

/// `if (x == 5) { return x + 1; }`: the use folds to 6.
#[test]
fn test_branch_constant_folds_into_use() {
    let method = MethodBuilder::new("branch_constant").build_with(|f| {
        let x = f.param(VarType::Int);
        f.block(0, |b| {
            let v = b.lcl(x, 1);
            let five = b.int(5);
            let cond = b.eq(v, five);
            b.branch(cond, 2);
        });
        f.block(1, |b| b.ret());
        f.block(2, |b| {
            let v = b.lcl(x, 1);
            let one = b.int(1);
            let sum = b.add(v, one);
            b.ret_val(sum);
        });
    });

    let (method, ctx) = optimize(method, &AssertionPropConfig::new());

    let value = returned(&method, 2);
    assert_eq!(method.node(value).int_con().map(|c| c.value), Some(6));
    assert_eq!(method.node(value).ty, VarType::Int);
    assert_eq!(ctx.events.count_kind(EventKind::ConstantPropagated), 1);

    let stats = ctx.statistics_for(method.id).expect("no statistics recorded");
    assert_eq!(stats.rewrites, 1);
    assert!(stats.assertions >= 2);
}

/// `a[i]; a[i];`: the second bounds check is already proven.
#[test]
fn test_repeated_bounds_check_removed() {
    let method = MethodBuilder::new("repeated_index").build_with(|f| {
        let a = f.param(VarType::Ref);
        let i = f.param(VarType::Int);
        f.block(0, |b| {
            for _ in 0..2 {
                let idx = b.lcl(i, 1);
                let elem = b.index(a, 1, idx, VarType::Int);
                b.eval(elem);
            }
            b.ret();
        });
    });

    let (method, ctx) = optimize(method, &AssertionPropConfig::new());

    let bounds_checks: Vec<usize> = method.blocks[0]
        .statements
        .iter()
        .map(|stmt| {
            method
                .execution_order(stmt.root)
                .into_iter()
                .filter(|&n| method.node(n).oper == Oper::BoundsCheck)
                .count()
        })
        .collect();
    assert_eq!(bounds_checks[0], 1);
    assert_eq!(bounds_checks[1], 0);
    assert_eq!(ctx.events.count_kind(EventKind::BoundsCheckRemoved), 1);
}

/// `if (c == 0) { a[i]; } else { a[i]; }`: neither arm's check dominates
/// the other, so both stay.
#[test]
fn test_bounds_checks_on_both_arms_kept() {
    let method = MethodBuilder::new("both_arms").build_with(|f| {
        let c = f.param(VarType::Int);
        let a = f.param(VarType::Ref);
        let i = f.param(VarType::Int);
        f.block(0, |b| {
            let v = b.lcl(c, 1);
            let zero = b.int(0);
            let cond = b.eq(v, zero);
            b.branch(cond, 2);
        });
        for arm in [1, 2] {
            f.block(arm, |b| {
                let idx = b.lcl(i, 1);
                let elem = b.index(a, 1, idx, VarType::Int);
                b.eval(elem);
                if arm == 1 {
                    b.jump(3);
                }
            });
        }
        f.block(3, |b| b.ret());
    });

    let (method, ctx) = optimize(method, &AssertionPropConfig::new());

    for arm in [1, 2] {
        let checks = method
            .execution_order(method.blocks[arm].statements[0].root)
            .into_iter()
            .filter(|&n| method.node(n).oper == Oper::BoundsCheck)
            .count();
        assert_eq!(checks, 1, "BB{arm:02} lost its bounds check");
    }
    assert_eq!(ctx.events.count_kind(EventKind::BoundsCheckRemoved), 0);
}

/// `b = a; if (a != null) { return b.f; }`: the load through `b` cannot
/// fault because `b` and `a` share a value number.
#[test]
fn test_null_guard_covers_copy() {
    let mut load = None;
    let method = MethodBuilder::new("guarded_copy").build_with(|f| {
        let a = f.param(VarType::Ref);
        let copy = f.local(VarType::Ref);
        f.block(0, |b| {
            let src = b.lcl(a, 1);
            b.def(copy, 1, src);
            let v = b.lcl(a, 1);
            let null = b.null();
            let cond = b.ne(v, null);
            b.branch(cond, 2);
        });
        f.block(1, |b| b.ret());
        f.block(2, |b| {
            let o = b.lcl(copy, 1);
            let value = b.field(o, 8, VarType::Int);
            load = Some(value);
            b.ret_val(value);
        });
    });
    let load = load.expect("load not built");
    assert!(method.node(load).flags.contains(NodeFlags::EXCEPT));

    let (method, ctx) = optimize(method, &AssertionPropConfig::new());

    let flags = method.node(load).flags;
    assert!(!flags.contains(NodeFlags::EXCEPT));
    assert!(flags.contains(NodeFlags::IND_NONFAULTING));
    assert_eq!(ctx.events.count_kind(EventKind::NullCheckRemoved), 1);
}

/// `x = (sbyte)y; return (short)x;`: the range of `x` already fits, so the
/// narrowing cast goes away.
#[test]
fn test_narrowing_cast_removed_under_range() {
    let method = MethodBuilder::new("narrowing")
        .ssa(false)
        .build_with(|f| {
            let y = f.param(VarType::Int);
            let x = f.local(VarType::Int);
            f.block(0, |b| {
                let v = b.lcl(y, 0);
                let narrow = b.cast(v, VarType::Byte);
                b.def(x, 0, narrow);
                let v = b.lcl(x, 0);
                let cast = b.cast(v, VarType::Short);
                b.ret_val(cast);
            });
        });

    let (method, ctx) = optimize(method, &AssertionPropConfig::local());

    let value = returned(&method, 0);
    assert_eq!(method.node(value).oper, Oper::LclVar);
    assert_eq!(method.node(value).local().map(|l| l.lcl), Some(LclNum(1)));
    assert_eq!(ctx.events.count_kind(EventKind::CastRemoved), 1);
}

/// A cast whose target is narrower than the proven range stays.
#[test]
fn test_cast_kept_when_range_too_wide() {
    let method = MethodBuilder::new("too_wide")
        .ssa(false)
        .build_with(|f| {
            let y = f.param(VarType::Int);
            let x = f.local(VarType::Int);
            f.block(0, |b| {
                let v = b.lcl(y, 0);
                let wide = b.cast(v, VarType::Short);
                b.def(x, 0, wide);
                let v = b.lcl(x, 0);
                let cast = b.cast(v, VarType::Byte);
                b.ret_val(cast);
            });
        });

    let (method, ctx) = optimize(method, &AssertionPropConfig::local());

    assert_eq!(method.node(returned(&method, 0)).oper, Oper::Cast);
    assert_eq!(ctx.events.count_kind(EventKind::CastRemoved), 0);
}

/// `x == 5` on one edge and `x == 6` on the other: the merge knows neither.
#[test]
fn test_conflicting_facts_cancel_at_merge() {
    let method = MethodBuilder::new("merge").build_with(|f| {
        let x = f.param(VarType::Int);
        f.block(0, |b| {
            let v = b.lcl(x, 1);
            let five = b.int(5);
            let cond = b.eq(v, five);
            b.branch(cond, 3);
        });
        f.block(1, |b| {
            let v = b.lcl(x, 1);
            let six = b.int(6);
            let cond = b.eq(v, six);
            b.branch(cond, 3);
        });
        f.block(2, |b| b.ret());
        f.block(3, |b| {
            let v = b.lcl(x, 1);
            let one = b.int(1);
            let sum = b.add(v, one);
            b.ret_val(sum);
        });
    });

    let (method, ctx) = optimize(method, &AssertionPropConfig::new());

    let value = returned(&method, 3);
    assert_eq!(method.node(value).oper, Oper::Add);
    let operand = method.node(value).op1().expect("add without operand");
    assert_eq!(method.node(operand).oper, Oper::LclVar);
    assert_eq!(ctx.events.count_kind(EventKind::ConstantPropagated), 0);
}

/// `if (x == NaN)` proves nothing, so nothing is stored.
#[test]
fn test_nan_comparison_stores_nothing() {
    let method = MethodBuilder::new("nan").build_with(|f| {
        let x = f.param(VarType::Double);
        f.block(0, |b| {
            let v = b.lcl(x, 1);
            let nan = b.double(f64::NAN);
            let cond = b.eq(v, nan);
            b.branch(cond, 2);
        });
        f.block(1, |b| b.ret());
        f.block(2, |b| {
            let v = b.lcl(x, 1);
            b.ret_val(v);
        });
    });

    let (method, ctx) = optimize(method, &AssertionPropConfig::new());

    let stats = ctx.statistics_for(method.id).expect("no statistics recorded");
    assert_eq!(stats.assertions, 0);
    assert!(!ctx.events.has(EventKind::AssertionCreated));
    assert_eq!(ctx.events.transformation_count(), 0);
    assert_eq!(method.node(returned(&method, 2)).oper, Oper::LclVar);
}

/// The pipeline processes many methods at once and keeps per-method totals.
#[test]
fn test_pipeline_over_many_methods() {
    let config = AssertionPropConfig::new();
    let scheduler = PassScheduler::from_config(&config).expect("invalid configuration");
    let ctx = CompilerContext::new();

    let mut units: Vec<CompilationUnit> = (0..8u32)
        .map(|i| {
            let mut method = MethodBuilder::new(format!("method_{i}"))
                .id(MethodId(i))
                .build_with(|f| {
                    let x = f.param(VarType::Int);
                    f.block(0, |b| {
                        let v = b.lcl(x, 1);
                        let k = b.int(i as i32);
                        let cond = b.eq(v, k);
                        b.branch(cond, 2);
                    });
                    f.block(1, |b| b.ret());
                    f.block(2, |b| {
                        let v = b.lcl(x, 1);
                        b.ret_val(v);
                    });
                });
            let values = ValueNumbering::new()
                .run(&mut method)
                .expect("value numbering failed");
            CompilationUnit::new(method, values)
        })
        .collect();

    assert!(scheduler.run(&mut units, &ctx));
    for (i, unit) in units.iter().enumerate() {
        let value = returned(&unit.method, 2);
        assert_eq!(
            unit.method.node(value).int_con().map(|c| c.value),
            Some(i as i64)
        );
    }
    assert_eq!(ctx.statistics.len(), 8);
    assert_eq!(ctx.total_statistics().rewrites, 8);
}
