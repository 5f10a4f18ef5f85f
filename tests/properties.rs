//! Properties of the assertion table, the dataflow and the rewrites.
//!
//! These drive the [`AssertionEngine`] and [`AssertionDataflow`] directly
//! where the property is about facts, and the full pass where it is about the
//! rewritten IR.

use assertprop::prelude::*;

/// Generates the facts of every node of every statement, in execution order.
fn generate_all(engine: &mut AssertionEngine<'_>, method: &MethodIr) {
    for block in &method.blocks {
        for stmt in &block.statements {
            for node in method.execution_order(stmt.root) {
                engine.generate(method, node);
            }
        }
    }
}

/// The stored `x == value` / `x != value` fact over a local.
fn int_fact(engine: &AssertionEngine<'_>, kind: AssertionKind, value: i64) -> AssertionIndex {
    engine
        .store()
        .iter()
        .find(|(_, a)| {
            a.kind == kind
                && matches!(a.op1, Op1::LocalVar(_))
                && matches!(a.op2, Some(Op2::ConstInt(lit)) if lit.value == value)
        })
        .map(|(index, _)| index)
        .unwrap_or_else(|| panic!("no {kind:?} fact for {value}"))
}

/// `if (x == 5) goto BB03; if (x == 6) goto BB03; return; BB03: return x;`
fn two_edges_into_merge() -> MethodIr {
    MethodBuilder::new("merge").build_with(|f| {
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
            b.ret_val(v);
        });
    })
}

#[test]
fn test_merge_keeps_only_common_facts() {
    let mut method = two_edges_into_merge();
    let vns = ValueNumbering::new().run(&mut method).unwrap();
    let mut engine = AssertionEngine::new(PropagationMode::Global, MAX_ASSERTION_COUNT, &vns);
    generate_all(&mut engine, &method);

    let eq5 = int_fact(&engine, AssertionKind::Equal, 5);
    let ne5 = int_fact(&engine, AssertionKind::NotEqual, 5);
    let eq6 = int_fact(&engine, AssertionKind::Equal, 6);
    let ne6 = int_fact(&engine, AssertionKind::NotEqual, 6);

    let flow = AssertionDataflow::run(&engine, &method);
    let known = engine.store().all();

    assert!(flow.value_in(BlockId::new(0)).intersect(known).is_empty());

    let fallthrough = flow.value_in(BlockId::new(1)) & known;
    assert!(fallthrough.contains(ne5));
    assert!(!fallthrough.contains(eq5));

    let exit = flow.value_in(BlockId::new(2)) & known;
    assert!(exit.contains(ne5));
    assert!(exit.contains(ne6));

    let merge = flow.value_in(BlockId::new(3)) & known;
    assert!(!merge.contains(eq5));
    assert!(!merge.contains(eq6));
}

#[test]
fn test_dataflow_in_is_subset_of_every_predecessor_out() {
    let mut method = two_edges_into_merge();
    let vns = ValueNumbering::new().run(&mut method).unwrap();
    let mut engine = AssertionEngine::new(PropagationMode::Global, MAX_ASSERTION_COUNT, &vns);
    generate_all(&mut engine, &method);
    let flow = AssertionDataflow::run(&engine, &method);
    let known = engine.store().all();

    // Both predecessors reach the merge through their taken edge.
    let merge = flow.value_in(BlockId::new(3)) & known;
    for pred in [0, 1] {
        let edge = flow.block(BlockId::new(pred)).unwrap().jump_dest_out & known;
        assert!((merge - edge).is_empty());
    }
    assert!(flow.iterations() >= method.block_count());
}

#[test]
fn test_duplicate_facts_share_a_slot() {
    let mut checks = Vec::new();
    let mut method = MethodBuilder::new("dedup").build_with(|f| {
        let p = f.param(VarType::Ref);
        f.block(0, |b| {
            for _ in 0..3 {
                let o = b.lcl(p, 1);
                checks.push(b.null_check(o));
            }
            b.ret();
        });
    });
    let vns = ValueNumbering::new().run(&mut method).unwrap();
    let mut engine = AssertionEngine::new(PropagationMode::Global, MAX_ASSERTION_COUNT, &vns);

    let indices: Vec<AssertionIndex> = checks
        .iter()
        .map(|&check| engine.generate(&method, check))
        .collect();

    assert!(indices[0].is_some());
    assert!(indices.iter().all(|&i| i == indices[0]));
    assert_eq!(engine.store().len(), 1);
}

#[test]
fn test_capacity_bounds_the_table() {
    let mut method = MethodBuilder::new("capacity").build_with(|f| {
        let params: Vec<LclNum> = (0..6).map(|_| f.param(VarType::Ref)).collect();
        f.block(0, |b| {
            for &p in &params {
                let o = b.lcl(p, 1);
                b.null_check(o);
            }
            b.ret();
        });
    });
    let vns = ValueNumbering::new().run(&mut method).unwrap();
    let mut engine = AssertionEngine::new(PropagationMode::Global, 4, &vns);
    generate_all(&mut engine, &method);

    assert_eq!(engine.store().len(), 4);
    assert!(engine.store().overflowed());
    assert_eq!(engine.store().all().len(), 4);
}

#[test]
fn test_complements_are_mutual() {
    let mut method = two_edges_into_merge();
    let vns = ValueNumbering::new().run(&mut method).unwrap();
    let mut engine = AssertionEngine::new(PropagationMode::Global, MAX_ASSERTION_COUNT, &vns);
    generate_all(&mut engine, &method);

    for value in [5, 6] {
        let eq = int_fact(&engine, AssertionKind::Equal, value);
        let ne = int_fact(&engine, AssertionKind::NotEqual, value);
        assert_eq!(engine.store().find_complementary(eq), ne);
        assert_eq!(engine.store().find_complementary(ne), eq);
    }
}

#[test]
fn test_local_mode_keeps_facts_per_local() {
    let method = MethodBuilder::new("local").ssa(false).build_with(|f| {
        let x = f.local(VarType::Int);
        let y = f.local(VarType::Int);
        f.block(0, |b| {
            let three = b.int(3);
            b.def(x, 0, three);
            let src = b.lcl(x, 0);
            b.def(y, 0, src);
            b.ret();
        });
    });
    let store = ValueNumStore::new();
    let mut engine = AssertionEngine::new(PropagationMode::Local, MAX_ASSERTION_COUNT, &store);
    generate_all(&mut engine, &method);

    assert_eq!(engine.store().len(), 2);
    // The copy depends on both its destination and its source.
    assert_eq!(engine.store().dependents_of_local(LclNum(0)).len(), 2);
    assert_eq!(engine.store().dependents_of_local(LclNum(1)).len(), 1);
}

/// Runs the global pass once, renumbering first.
fn run_global(method: &mut MethodIr) -> (bool, CompilerContext) {
    let vns = ValueNumbering::new().run(method).unwrap();
    let ctx = CompilerContext::new();
    let pass = AssertionPropPass::new(AssertionPropConfig::new());
    let changed = pass.run_on_method(method, &vns, &ctx).unwrap();
    (changed, ctx)
}

#[test]
fn test_second_run_finds_nothing() {
    let mut method = MethodBuilder::new("again").build_with(|f| {
        let x = f.param(VarType::Int);
        let obj = f.param(VarType::Ref);
        f.block(0, |b| {
            let v = b.lcl(x, 1);
            let five = b.int(5);
            let cond = b.eq(v, five);
            b.branch(cond, 2);
        });
        f.block(1, |b| b.ret());
        f.block(2, |b| {
            let o = b.lcl(obj, 1);
            b.null_check(o);
            let o = b.lcl(obj, 1);
            let load = b.field(o, 8, VarType::Int);
            let v = b.lcl(x, 1);
            let sum = b.add(load, v);
            b.ret_val(sum);
        });
    });

    let (changed, first) = run_global(&mut method);
    assert!(changed);
    assert!(first.events.transformation_count() >= 2);

    let (changed, second) = run_global(&mut method);
    assert!(!changed);
    assert_eq!(second.events.transformation_count(), 0);
}

#[test]
fn test_rewrites_preserve_types() {
    let mut method = MethodBuilder::new("long").build_with(|f| {
        let x = f.param(VarType::Long);
        f.block(0, |b| {
            let v = b.lcl(x, 1);
            let five = b.long(5);
            let cond = b.eq(v, five);
            b.branch(cond, 2);
        });
        f.block(1, |b| b.ret());
        f.block(2, |b| {
            let v = b.lcl(x, 1);
            b.ret_val(v);
        });
    });
    let ret = method.blocks[2].last_root().unwrap();
    let before = method.node(method.node(ret).op1().unwrap()).ty;

    let (changed, _) = run_global(&mut method);

    assert!(changed);
    let value = method.node(ret).op1().unwrap();
    assert_eq!(method.node(value).oper, Oper::CnsLng);
    assert_eq!(method.node(value).ty, before);
    assert_eq!(method.node(ret).ty, VarType::Long);
}
