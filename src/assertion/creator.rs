//! Turning IR trees into assertions.
//!
//! Creation is total: every shape the creator does not understand yields
//! [`AssertionIndex::NONE`]. A candidate that passes the structural checks is
//! then gated on its value numbers (global mode) and handed to the table,
//! which may still decline it (NaN, duplicate, full).

use crate::{
    assertion::{
        Assertion, AssertionEngine, AssertionIndex, AssertionKind, AssertionLocal, IntLiteral,
        Op1, Op2, PropagationMode,
    },
    ir::{HandleKind, MethodIr, NodeData, NodeId, Oper, VarType},
    vn::ConstValue,
};

/// What an assertion is created over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operands {
    /// A subject tree and an optional object tree.
    Trees(NodeId, Option<NodeId>),
    /// The arguments of a type-test helper call.
    HelperArgs {
        /// The object whose type is tested.
        object: NodeId,
        /// The class handle, possibly read through an indirection.
        method_table: NodeId,
    },
}

impl AssertionEngine<'_> {
    /// Creates `op1 kind op2` from IR operands and stores it.
    ///
    /// Returns [`AssertionIndex::NONE`] when the operands do not describe a
    /// supported fact or the table declines it.
    pub fn create(
        &mut self,
        method: &MethodIr,
        operands: Operands,
        kind: AssertionKind,
    ) -> AssertionIndex {
        match self.build(method, operands, kind) {
            Some(assertion) => self.insert(assertion),
            None => AssertionIndex::NONE,
        }
    }

    /// Creates a fact for a conditional branch and, when that succeeds, its
    /// complement for the other edge.
    pub(crate) fn create_with_complement(
        &mut self,
        method: &MethodIr,
        operands: Operands,
        kind: AssertionKind,
    ) -> AssertionIndex {
        let Some(candidate) = self.build(method, operands, kind) else {
            return AssertionIndex::NONE;
        };
        let index = self.insert(candidate);
        if index.is_some() {
            self.add_complement(method, &candidate, operands);
        }
        index
    }

    /// Stores an array-length relop fact together with its flipped kind.
    pub(crate) fn add_with_complement(&mut self, assertion: Assertion) -> AssertionIndex {
        let index = self.insert(assertion);
        if index.is_some() {
            if let Some(flipped) = assertion.kind.complement() {
                self.insert(Assertion {
                    kind: flipped,
                    ..assertion
                });
            }
        }
        index
    }

    fn add_complement(&mut self, method: &MethodIr, created: &Assertion, operands: Operands) {
        if created.op1.is_array_len_bound() {
            if let Some(flipped) = created.kind.complement() {
                self.insert(Assertion {
                    kind: flipped,
                    ..*created
                });
            }
            return;
        }

        if let Some(flipped) = created.kind.complement() {
            self.create(method, operands, flipped);
        }

        // A successful type test also proves the object was not null.
        if created.op1.is_type() {
            let object = match operands {
                Operands::HelperArgs { object, .. } => object,
                Operands::Trees(op1, _) => op1,
            };
            self.create(method, Operands::Trees(object, None), AssertionKind::NotEqual);
        }
    }

    fn insert(&mut self, assertion: Assertion) -> AssertionIndex {
        if self.mode() == PropagationMode::Global && !assertion.has_valid_vns() {
            return AssertionIndex::NONE;
        }
        self.store.add(assertion, self.vns)
    }

    /// Builds the candidate fact without storing it.
    pub(crate) fn build(
        &self,
        method: &MethodIr,
        operands: Operands,
        kind: AssertionKind,
    ) -> Option<Assertion> {
        match operands {
            Operands::HelperArgs {
                object,
                method_table,
            } => self.build_helper_args(method, object, method_table, kind),
            Operands::Trees(op1, None) if method.node(op1).oper == Oper::BoundsCheck => {
                self.build_bounds_check(method, op1, kind)
            }
            Operands::Trees(op1, None) => self.build_non_null(method, op1, kind),
            Operands::Trees(op1, Some(op2)) => match method.node(op1).oper {
                Oper::LclVar => self.build_local(method, op1, op2, kind),
                Oper::Ind => self.build_exact_type(method, op1, op2, kind),
                _ => None,
            },
        }
    }

    fn assertion_local(&self, method: &MethodIr, node: NodeId) -> Option<AssertionLocal> {
        let tree = method.node(node);
        let lcl = tree.local()?;
        Some(AssertionLocal {
            lcl: lcl.lcl,
            ssa: lcl.ssa,
            vn: tree.vn.conservative(),
        })
    }

    fn build_bounds_check(
        &self,
        method: &MethodIr,
        check: NodeId,
        kind: AssertionKind,
    ) -> Option<Assertion> {
        if kind != AssertionKind::NoThrow {
            return None;
        }
        let NodeData::BoundsCheck { index, length } = method.node(check).data else {
            return None;
        };
        Some(Assertion::new(
            AssertionKind::NoThrow,
            Op1::ArrayBound {
                index: method.node(index).vn.conservative(),
                length: method.node(length).vn.conservative(),
            },
            None,
        ))
    }

    fn build_helper_args(
        &self,
        method: &MethodIr,
        object: NodeId,
        method_table: NodeId,
        kind: AssertionKind,
    ) -> Option<Assertion> {
        if !matches!(kind, AssertionKind::Equal | AssertionKind::NotEqual) {
            return None;
        }
        let subject = self.assertion_local(method, object)?;
        if method.node(object).oper != Oper::LclVar
            || method.locals.dsc(subject.lcl).ok()?.addr_exposed
        {
            return None;
        }

        let (indirect, handle_node) = match method.node(method_table).oper {
            Oper::Ind => (true, method.node(method_table).op1()?),
            Oper::CnsInt => (false, method_table),
            _ => return None,
        };
        let con = method.node(handle_node).int_con()?;
        let literal = IntLiteral {
            value: con.value,
            handle: con.handle,
            is_long: false,
            vn: method.node(handle_node).vn.conservative(),
        };
        let op2 = if indirect {
            Op2::IndirectConstInt(literal)
        } else {
            Op2::ConstInt(literal)
        };
        Some(Assertion::new(kind, Op1::Subtype(subject), Some(op2)))
    }

    /// `obj != null` for an object reached directly or through up to two
    /// byref offsets.
    fn build_non_null(
        &self,
        method: &MethodIr,
        op1: NodeId,
        kind: AssertionKind,
    ) -> Option<Assertion> {
        if kind != AssertionKind::NotEqual {
            return None;
        }

        let mut node = op1;
        for _ in 0..2 {
            let tree = method.node(node);
            if tree.oper == Oper::Add && tree.ty == VarType::ByRef {
                node = tree.op1()?;
            }
        }

        if method.node(node).oper != Oper::LclVar {
            return None;
        }
        let subject = self.assertion_local(method, node)?;
        let dsc = method.locals.dsc(subject.lcl).ok()?;
        if dsc.ty != VarType::Ref || dsc.addr_exposed {
            return None;
        }

        Some(Assertion::new(
            AssertionKind::NotEqual,
            Op1::LocalVar(subject),
            Some(Op2::ConstInt(IntLiteral {
                value: 0,
                handle: None,
                is_long: method.target.is_64bit(),
                vn: self.vns.null(),
            })),
        ))
    }

    fn build_local(
        &self,
        method: &MethodIr,
        op1: NodeId,
        op2: NodeId,
        kind: AssertionKind,
    ) -> Option<Assertion> {
        let subject = self.assertion_local(method, op1)?;
        let dsc = method.locals.dsc(subject.lcl).ok()?;
        if dsc.addr_exposed {
            return None;
        }

        let op2 = method.effective_val(op2);
        let value = method.node(op2);
        let is_eq_ne = matches!(kind, AssertionKind::Equal | AssertionKind::NotEqual);
        let target = method.target;

        let object = match (&value.data, value.oper) {
            (NodeData::IntCon(con), Oper::CnsInt) => {
                if !is_eq_ne || (dsc.ty == VarType::Long && value.ty != VarType::Long) {
                    return None;
                }
                if target == crate::ir::Target::Arm32
                    && !target.is_valid_mov_immediate(con.value)
                {
                    return None;
                }
                Op2::ConstInt(IntLiteral {
                    value: con.value,
                    handle: con.handle,
                    is_long: target.is_64bit()
                        && matches!(value.ty, VarType::Long | VarType::ByRef),
                    vn: value.vn.conservative(),
                })
            }
            (NodeData::LngCon(v), Oper::CnsLng) => {
                if !is_eq_ne || (dsc.ty == VarType::Long && value.ty != VarType::Long) {
                    return None;
                }
                Op2::ConstLong {
                    value: *v,
                    vn: value.vn.conservative(),
                }
            }
            (NodeData::DblCon(v), Oper::CnsDbl) => {
                if !is_eq_ne || v.is_nan() {
                    return None;
                }
                Op2::ConstDouble {
                    value: *v,
                    vn: value.vn.conservative(),
                }
            }
            (NodeData::Local(_), Oper::LclVar) => {
                if !is_eq_ne {
                    return None;
                }
                let source = self.assertion_local(method, op2)?;
                let source_dsc = method.locals.dsc(source.lcl).ok()?;
                if source.lcl == subject.lcl
                    || source_dsc.ty != dsc.ty
                    || source_dsc.addr_exposed
                {
                    return None;
                }
                Op2::LocalVarCopy(source)
            }
            _ => {
                let to_type = match value.oper {
                    oper if oper.is_relop() => VarType::Bool,
                    Oper::ClsVar | Oper::ArrElem | Oper::LclFld | Oper::Ind => value.ty,
                    Oper::Cast => {
                        if dsc.is_struct_field && dsc.normalize_on_load() {
                            return None;
                        }
                        match value.data {
                            NodeData::Cast { to, .. } => to,
                            _ => return None,
                        }
                    }
                    _ => return None,
                };
                return self.build_subrange(method, op1, subject, to_type, kind);
            }
        };

        Some(Assertion::new(kind, Op1::LocalVar(subject), Some(object)))
    }

    fn build_subrange(
        &self,
        method: &MethodIr,
        op1: NodeId,
        subject: AssertionLocal,
        to_type: VarType,
        kind: AssertionKind,
    ) -> Option<Assertion> {
        if !matches!(kind, AssertionKind::Subrange | AssertionKind::Equal) {
            return None;
        }
        if method.node(op1).ty.is_floating() {
            return None;
        }
        let representable = to_type.is_small()
            || (method.target.is_64bit() && matches!(to_type, VarType::Int | VarType::UInt));
        if !representable {
            return None;
        }
        let lo = to_type.lower_bound()?;
        let hi = to_type.upper_bound()?;
        Some(Assertion::new(
            AssertionKind::Subrange,
            Op1::LocalVar(subject),
            Some(Op2::Subrange { lo, hi }),
        ))
    }

    /// `*(obj) == method table` facts over an object local.
    fn build_exact_type(
        &self,
        method: &MethodIr,
        op1: NodeId,
        op2: NodeId,
        kind: AssertionKind,
    ) -> Option<Assertion> {
        let object = method.node(op1).op1()?;
        if method.node(object).oper != Oper::LclVar {
            return None;
        }
        let subject = self.assertion_local(method, object)?;
        if method.locals.dsc(subject.lcl).ok()?.excluded_from_ssa()
            || method.node(object).ty != VarType::Ref
        {
            return None;
        }

        let literal_node = if method.node(op2).oper == Oper::Ind {
            method.node(op2).op1()?
        } else {
            op2
        };
        let (value, handle) = self.known_int(method, literal_node)?;
        let literal = IntLiteral {
            value,
            handle,
            is_long: method.target.is_64bit() && method.node(literal_node).ty == VarType::Long,
            vn: method.node(literal_node).vn.conservative(),
        };
        Some(Assertion::new(
            kind,
            Op1::ExactType(subject),
            Some(Op2::IndirectConstInt(literal)),
        ))
    }

    /// The integer a node is known to produce.
    ///
    /// Local mode reads literal nodes; global mode asks the value-number
    /// oracle. Long values count only on 64-bit targets.
    pub(crate) fn known_int(
        &self,
        method: &MethodIr,
        node: NodeId,
    ) -> Option<(i64, Option<HandleKind>)> {
        let tree = method.node(node);
        let is_64bit = method.target.is_64bit();
        match self.mode() {
            PropagationMode::Local => match (&tree.data, tree.oper) {
                (NodeData::IntCon(con), Oper::CnsInt) => Some((con.value, con.handle)),
                (NodeData::LngCon(v), Oper::CnsLng) if is_64bit => Some((*v, None)),
                _ => None,
            },
            PropagationMode::Global => {
                let vn = tree.vn.conservative();
                if !self.vns.is_constant(vn) {
                    return None;
                }
                let handle = self.vns.handle_kind(vn);
                match self.vns.constant_value(vn)? {
                    ConstValue::Int(v) => Some((i64::from(v), handle)),
                    ConstValue::Long(v) if is_64bit => Some((v, handle)),
                    _ => None,
                }
            }
        }
    }
}
