//! Which node produces which fact.
//!
//! Generation inspects one node and, if it establishes something, creates the
//! fact and (global mode) attaches it to the node so the dataflow and the
//! propagation walk can find it again. Conditional branches attach the fact
//! that holds on the taken edge; its complement is created alongside.

use crate::{
    assertion::{
        Assertion, AssertionEngine, AssertionIndex, AssertionKind, IntLiteral, Op1, Op2, Operands,
    },
    ir::{MethodIr, NodeData, NodeFlags, NodeId, Oper, VarType},
};

impl AssertionEngine<'_> {
    /// Generates the fact `node` establishes, if any.
    ///
    /// Returns the index of a proven fact; facts created only for later
    /// range checks (casts) are stored but neither attached nor returned.
    pub fn generate(&mut self, method: &MethodIr, node: NodeId) -> AssertionIndex {
        self.clear_node_assertion(node);

        let tree = method.node(node);
        if tree.flags.contains(NodeFlags::COLON_COND) {
            return AssertionIndex::NONE;
        }

        let index = match (&tree.data, tree.oper) {
            (NodeData::Binary(dst, value), Oper::Asg) => {
                if self.is_global() {
                    self.generate_phi_non_null(method, *dst, *value)
                } else {
                    self.create(method, Operands::Trees(*dst, Some(*value)), AssertionKind::Equal)
                }
            }
            (NodeData::Unary(op), Oper::Ind | Oper::NullCheck | Oper::ArrLength) => {
                self.create(method, Operands::Trees(*op, None), AssertionKind::NotEqual)
            }
            (NodeData::BoundsCheck { .. }, Oper::BoundsCheck) if self.is_global() => {
                self.create(method, Operands::Trees(node, None), AssertionKind::NoThrow)
            }
            (NodeData::ArrElem { array, .. }, Oper::ArrElem) => {
                self.create(method, Operands::Trees(*array, None), AssertionKind::NotEqual)
            }
            (NodeData::Call(call), Oper::Call) => {
                let needs_this =
                    tree.flags.contains(NodeFlags::CALL_NULLCHECK) || call.is_virtual;
                match call.this_arg {
                    Some(this) if needs_this => {
                        self.create(method, Operands::Trees(this, None), AssertionKind::NotEqual)
                    }
                    _ => AssertionIndex::NONE,
                }
            }
            (NodeData::Cast { op, .. }, Oper::Cast) if self.is_global() => {
                // The range is what the cast would produce, not what it proves.
                self.create(method, Operands::Trees(*op, Some(node)), AssertionKind::Subrange);
                return AssertionIndex::NONE;
            }
            (NodeData::Unary(_), Oper::Jtrue) if self.is_global() => {
                self.generate_jtrue(method, node)
            }
            _ => AssertionIndex::NONE,
        };

        if self.is_global() {
            self.set_node_assertion(node, index);
        }
        index
    }

    /// `lcl = PHI(...)` where every incoming value is known non-null.
    fn generate_phi_non_null(
        &mut self,
        method: &MethodIr,
        dst: NodeId,
        value: NodeId,
    ) -> AssertionIndex {
        let NodeData::Phi(args) = &method.node(value).data else {
            return AssertionIndex::NONE;
        };
        if args.is_empty() {
            return AssertionIndex::NONE;
        }
        let all_non_null = args
            .iter()
            .all(|&arg| self.vns.is_known_non_null(method.node(arg).vn.conservative()));
        if !all_non_null {
            return AssertionIndex::NONE;
        }
        self.create(method, Operands::Trees(dst, None), AssertionKind::NotEqual)
    }

    /// Facts for the taken edge of `JTRUE(relop)`.
    fn generate_jtrue(&mut self, method: &MethodIr, jtrue: NodeId) -> AssertionIndex {
        let Some(relop) = method.node(jtrue).op1() else {
            return AssertionIndex::NONE;
        };
        let cond = method.node(relop);
        if !cond.oper.is_relop() {
            return AssertionIndex::NONE;
        }

        let index = self.generate_array_len_bound(method, relop);
        if index.is_some() {
            return index;
        }

        let kind = match cond.oper {
            Oper::Eq => AssertionKind::Equal,
            Oper::Ne => AssertionKind::NotEqual,
            _ => return AssertionIndex::NONE,
        };
        let (Some(mut op1), Some(mut op2)) = (cond.op1(), cond.op2()) else {
            return AssertionIndex::NONE;
        };

        // Local on the left.
        if method.node(op1).oper != Oper::LclVar && method.node(op2).oper == Oper::LclVar {
            std::mem::swap(&mut op1, &mut op2);
        }
        let op2_oper = method.node(op2).oper;
        if method.node(op1).oper == Oper::LclVar
            && (op2_oper.is_const() || op2_oper == Oper::LclVar)
        {
            return self.create_with_complement(method, Operands::Trees(op1, Some(op2)), kind);
        }

        // Method table load on the left.
        if !is_ind_of_local(method, op1) && is_ind_of_local(method, op2) {
            std::mem::swap(&mut op1, &mut op2);
        }
        if is_ind_of_local(method, op1) {
            return self.create_with_complement(method, Operands::Trees(op1, Some(op2)), kind);
        }

        // `isinst(obj, cls) ==/!= null`.
        if method.node(op1).oper == Oper::CnsInt && method.node(op2).oper != Oper::CnsInt {
            std::mem::swap(&mut op1, &mut op2);
        }
        let call = method.node(op1);
        let Some(helper) = call.call().and_then(|c| c.helper()) else {
            return AssertionIndex::NONE;
        };
        if call.ty != VarType::Ref
            || !helper.is_type_test()
            || method.node(op2).int_con().map(|c| c.value) != Some(0)
        {
            return AssertionIndex::NONE;
        }
        let Some(args) = call.call().map(|c| c.args.clone()) else {
            return AssertionIndex::NONE;
        };
        let (Some(&method_table), Some(&object)) = (args.first(), args.get(1)) else {
            return AssertionIndex::NONE;
        };
        if method.node(object).oper != Oper::LclVar {
            return AssertionIndex::NONE;
        }

        // The helper returns null when the test fails.
        let kind = match kind {
            AssertionKind::Equal => AssertionKind::NotEqual,
            _ => AssertionKind::Equal,
        };
        self.create_with_complement(
            method,
            Operands::HelperArgs {
                object,
                method_table,
            },
            kind,
        )
    }

    /// `(i < a.Length +/- k) ==/!= 0`, `(i < a.Length) ==/!= 0` and bare
    /// `i < a.Length` conditions.
    fn generate_array_len_bound(&mut self, method: &MethodIr, relop: NodeId) -> AssertionIndex {
        let cond = method.node(relop);
        if let (Some(op1), Some(op2)) = (cond.op1(), cond.op2()) {
            let op1_vn = method.node(op1).vn.conservative();
            let op2_node = method.node(op2);
            let zero = self.vns.zero_for_type(op2_node.ty);
            let kind = match cond.oper {
                Oper::Eq => Some(AssertionKind::Equal),
                Oper::Ne => Some(AssertionKind::NotEqual),
                _ => None,
            };
            let compares_zero = zero.is_known() && op2_node.vn.conservative() == zero;
            if let Some(kind) = kind.filter(|_| compares_zero) {
                let op1 = if self.vns.is_array_len_arith_bound(op1_vn) {
                    Some(Op1::ArrayLenOperBound(op1_vn))
                } else if self.vns.is_array_len_bound(op1_vn) {
                    Some(Op1::ArrayLenLoopBound(op1_vn))
                } else {
                    None
                };
                if let Some(op1) = op1 {
                    return self.add_with_complement(Assertion::new(
                        kind,
                        op1,
                        Some(Op2::ConstInt(IntLiteral {
                            value: 0,
                            handle: None,
                            is_long: false,
                            vn: zero,
                        })),
                    ));
                }
            }
        }

        let relop_vn = cond.vn.conservative();
        if self.vns.is_array_len_bound(relop_vn) {
            return self.add_with_complement(Assertion::new(
                AssertionKind::NotEqual,
                Op1::ArrayLenLoopBound(relop_vn),
                Some(Op2::ConstInt(IntLiteral {
                    value: 0,
                    handle: None,
                    is_long: false,
                    vn: self.vns.zero_for_type(VarType::Int),
                })),
            ));
        }
        AssertionIndex::NONE
    }
}

fn is_ind_of_local(method: &MethodIr, node: NodeId) -> bool {
    let tree = method.node(node);
    tree.oper == Oper::Ind
        && tree
            .op1()
            .is_some_and(|addr| method.node(addr).oper == Oper::LclVar)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assertion::{Op1Kind, PropagationMode},
        ir::{HandleKind, HelperFunc, LclNum, MethodBuilder},
        vn::{ValueNumStore, ValueNumbering},
    };

    fn last_root(method: &MethodIr, block: usize) -> NodeId {
        method.blocks[block].last_root().unwrap()
    }

    #[test]
    fn test_jtrue_local_equals_constant() {
        let mut method = MethodBuilder::new("jtrue").build_with(|f| {
            let x = f.param(VarType::Int);
            f.block(0, |b| {
                let v = b.lcl(x, 1);
                let k = b.int(7);
                let cond = b.eq(v, k);
                b.branch(cond, 2);
            });
            f.block(1, |b| b.ret());
            f.block(2, |b| b.ret());
        });
        let vns = ValueNumbering::new().run(&mut method).unwrap();
        let mut engine = AssertionEngine::new(PropagationMode::Global, 64, &vns);
        let jtrue = last_root(&method, 0);

        let index = engine.generate(&method, jtrue);
        assert_eq!(engine.node_assertion(jtrue), index);
        let fact = engine.store().get(index).unwrap();
        assert!(fact.is_local_const_int());
        assert_eq!(engine.store().find_complementary(index).get(), 2);
    }

    #[test]
    fn test_jtrue_constant_on_left_is_swapped() {
        let mut method = MethodBuilder::new("jtrue").build_with(|f| {
            let x = f.param(VarType::Int);
            f.block(0, |b| {
                let k = b.int(7);
                let v = b.lcl(x, 1);
                let cond = b.ne(k, v);
                b.branch(cond, 2);
            });
            f.block(1, |b| b.ret());
            f.block(2, |b| b.ret());
        });
        let vns = ValueNumbering::new().run(&mut method).unwrap();
        let mut engine = AssertionEngine::new(PropagationMode::Global, 64, &vns);
        let index = engine.generate(&method, last_root(&method, 0));
        let fact = engine.store().get(index).unwrap();
        assert_eq!(fact.kind, AssertionKind::NotEqual);
        assert_eq!(fact.op1.kind(), Op1Kind::LocalVar);
    }

    #[test]
    fn test_jtrue_two_locals_keep_their_order() {
        let mut method = MethodBuilder::new("jtrue").build_with(|f| {
            let a = f.param(VarType::Int);
            let b_lcl = f.param(VarType::Int);
            f.block(0, |b| {
                let lhs = b.lcl(a, 1);
                let rhs = b.lcl(b_lcl, 1);
                let cond = b.eq(lhs, rhs);
                b.branch(cond, 2);
            });
            f.block(1, |b| b.ret());
            f.block(2, |b| b.ret());
        });
        let vns = ValueNumbering::new().run(&mut method).unwrap();
        let mut engine = AssertionEngine::new(PropagationMode::Global, 64, &vns);
        let index = engine.generate(&method, last_root(&method, 0));
        let fact = engine.store().get(index).unwrap();

        assert_eq!(fact.kind, AssertionKind::Equal);
        match (fact.op1, fact.op2) {
            (Op1::LocalVar(dst), Some(Op2::LocalVarCopy(src))) => {
                assert_eq!(dst.lcl, LclNum(0));
                assert_eq!(src.lcl, LclNum(1));
            }
            other => panic!("expected a copy fact, got {other:?}"),
        }
    }

    #[test]
    fn test_jtrue_array_len_loop_bound() {
        let mut method = MethodBuilder::new("loop").build_with(|f| {
            let a = f.param(VarType::Ref);
            let i = f.param(VarType::Int);
            f.block(0, |b| {
                let idx = b.lcl(i, 1);
                let arr = b.lcl(a, 1);
                let len = b.arr_length(arr);
                let cond = b.lt(idx, len);
                b.branch(cond, 2);
            });
            f.block(1, |b| b.ret());
            f.block(2, |b| b.ret());
        });
        let vns = ValueNumbering::new().run(&mut method).unwrap();
        let mut engine = AssertionEngine::new(PropagationMode::Global, 64, &vns);
        let index = engine.generate(&method, last_root(&method, 0));
        let fact = engine.store().get(index).unwrap();
        assert_eq!(fact.op1.kind(), Op1Kind::ArrayLenLoopBound);
        assert_eq!(fact.kind, AssertionKind::NotEqual);
        assert_eq!(engine.store().len(), 2);
    }

    #[test]
    fn test_jtrue_isinst_null_test() {
        let mut method = MethodBuilder::new("isinst").build_with(|f| {
            let obj = f.param(VarType::Ref);
            f.block(0, |b| {
                let o = b.lcl(obj, 1);
                let cls = b.handle(0x2000, HandleKind::Class);
                let call = b.helper_call(HelperFunc::IsInstanceOfClass, o, cls);
                let null = b.null();
                let cond = b.eq(call, null);
                b.branch(cond, 2);
            });
            f.block(1, |b| b.ret());
            f.block(2, |b| b.ret());
        });
        let vns = ValueNumbering::new().run(&mut method).unwrap();
        let mut engine = AssertionEngine::new(PropagationMode::Global, 64, &vns);
        let index = engine.generate(&method, last_root(&method, 0));
        let fact = engine.store().get(index).unwrap();
        // Taken edge: the helper returned null, so the type test failed.
        assert_eq!(fact.kind, AssertionKind::NotEqual);
        assert_eq!(fact.op1.kind(), Op1Kind::Subtype);
        assert_eq!(engine.store().len(), 3);
    }

    #[test]
    fn test_cast_fact_is_not_attached() {
        let mut cast = None;
        let mut method = MethodBuilder::new("cast").build_with(|f| {
            let x = f.param(VarType::Int);
            f.block(0, |b| {
                let v = b.lcl(x, 1);
                let c = b.cast(v, VarType::Short);
                cast = Some(c);
                b.ret_val(c);
            });
        });
        let vns = ValueNumbering::new().run(&mut method).unwrap();
        let mut engine = AssertionEngine::new(PropagationMode::Global, 64, &vns);
        let cast = cast.unwrap();
        assert!(engine.generate(&method, cast).is_none());
        assert!(engine.node_assertion(cast).is_none());
        assert_eq!(engine.store().len(), 1);
    }

    #[test]
    fn test_local_mode_assignment_and_no_jtrue() {
        let method = MethodBuilder::new("local").ssa(false).build_with(|f| {
            let x = f.local(VarType::Int);
            f.block(0, |b| {
                let five = b.int(5);
                b.def(x, 0, five);
                let v = b.lcl(x, 0);
                let k = b.int(5);
                let cond = b.eq(v, k);
                b.branch(cond, 2);
            });
            f.block(1, |b| b.ret());
            f.block(2, |b| b.ret());
        });
        let vns = ValueNumStore::new();
        let mut engine = AssertionEngine::new(PropagationMode::Local, 64, &vns);
        let asg = method.blocks[0].statements[0].root;
        assert!(engine.generate(&method, asg).is_some());
        assert!(engine.generate(&method, last_root(&method, 0)).is_none());
        // Local mode never attaches.
        assert!(engine.node_assertion(asg).is_none());
    }

    #[test]
    fn test_colon_cond_generates_nothing() {
        let mut load = None;
        let mut method = MethodBuilder::new("colon").build_with(|f| {
            let obj = f.param(VarType::Ref);
            f.block(0, |b| {
                let o = b.lcl(obj, 1);
                let l = b.ind(o, VarType::Int);
                let l = b.mark(l, NodeFlags::COLON_COND);
                load = Some(l);
                b.ret_val(l);
            });
        });
        let vns = ValueNumbering::new().run(&mut method).unwrap();
        let mut engine = AssertionEngine::new(PropagationMode::Global, 64, &vns);
        assert!(engine.generate(&method, load.unwrap()).is_none());
    }
}
