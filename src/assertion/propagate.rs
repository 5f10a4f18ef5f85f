//! Rewrites licensed by active assertions.
//!
//! [`AssertionEngine::propagate`] looks at one node and the set of facts
//! holding just before it executes and, if some fact proves the node can be
//! simplified, rewrites it. Rewrites happen in place where the node keeps its
//! identity (a local becoming a constant, a load losing its fault flag) and
//! by allocating new nodes otherwise; in the latter case the caller links
//! [`Rewrite::replacement`] into the statement in place of
//! [`Rewrite::original`].
//!
//! Reference counts are never touched here. Each rewrite carries a
//! [`RefCountLedger`] the caller applies with the block weight once the
//! rewrite has been linked.

use std::fmt;

use crate::{
    assertion::{
        Assertion, AssertionEngine, AssertionIndex, AssertionKind, AssertionSet, Op1, Op2,
        PropagationMode, RefCountLedger,
    },
    ir::{
        FieldSeq, LclRef, LclVarDsc, MethodIr, NodeData, NodeFlags, NodeId, Oper, Target, VarType,
    },
    vn::{ConstValue, ValueNum},
    Result,
};

/// What a rewrite did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RewriteKind {
    /// A local read became a constant.
    ConstantPropagated,
    /// A local read now reads another local.
    CopyPropagated,
    /// A load or call no longer faults on null.
    NullCheckRemoved,
    /// A bounds check proven redundant was deleted.
    BoundsCheckRemoved,
    /// A cast proven to preserve its operand was deleted.
    CastRemoved,
    /// A cast's overflow check was dropped; the cast itself remains.
    OverflowCheckRemoved,
    /// A type-test or type-cast helper call was replaced by its object.
    TypeCheckRemoved,
    /// A comparison was folded or had an operand substituted.
    RelopFolded,
}

impl fmt::Display for RewriteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ConstantPropagated => "constant propagated",
            Self::CopyPropagated => "copy propagated",
            Self::NullCheckRemoved => "null check removed",
            Self::BoundsCheckRemoved => "bounds check removed",
            Self::CastRemoved => "cast removed",
            Self::OverflowCheckRemoved => "overflow check removed",
            Self::TypeCheckRemoved => "type check removed",
            Self::RelopFolded => "relop folded",
        })
    }
}

/// Result of one successful propagation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    /// The node propagation was attempted on.
    pub original: NodeId,
    /// The node now standing in its place; equal to `original` for in-place
    /// rewrites.
    pub replacement: NodeId,
    /// Reference-count adjustments still to be applied.
    pub ref_counts: RefCountLedger,
    /// What happened.
    pub kind: RewriteKind,
    /// The fact that licensed the rewrite; `NONE` when value numbering alone
    /// sufficed.
    pub assertion: AssertionIndex,
}

impl Rewrite {
    fn in_place(node: NodeId, kind: RewriteKind) -> Self {
        Self::replaced(node, node, kind)
    }

    fn replaced(original: NodeId, replacement: NodeId, kind: RewriteKind) -> Self {
        Self {
            original,
            replacement,
            ref_counts: RefCountLedger::new(),
            kind,
            assertion: AssertionIndex::NONE,
        }
    }

    fn with_ref_counts(mut self, ref_counts: RefCountLedger) -> Self {
        self.ref_counts = ref_counts;
        self
    }

    fn by(mut self, assertion: AssertionIndex) -> Self {
        self.assertion = assertion;
        self
    }

    /// Returns `true` if the node was changed without being replaced.
    #[must_use]
    pub fn is_in_place(&self) -> bool {
        self.original == self.replacement
    }
}

impl AssertionEngine<'_> {
    /// Tries to simplify `node` using the facts in `active`.
    ///
    /// Returns `Ok(None)` when nothing applies.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Invariant`] when the IR or the table is in a
    /// state no well-formed method can reach.
    pub fn propagate(
        &self,
        active: AssertionSet,
        method: &mut MethodIr,
        node: NodeId,
    ) -> Result<Option<Rewrite>> {
        match method.node(node).oper {
            Oper::LclVar => Ok(self.propagate_local(active, method, node)),
            Oper::Ind | Oper::NullCheck => Ok(self.propagate_ind(active, method, node)),
            Oper::Comma => self.propagate_comma(active, method, node),
            Oper::Cast => Ok(self.propagate_cast(active, method, node)),
            Oper::Call => self.propagate_call(active, method, node),
            Oper::Eq | Oper::Ne => match self.mode() {
                PropagationMode::Global => self.propagate_relop_global(active, method, node),
                PropagationMode::Local => self.propagate_relop_local(active, method, node),
            },
            _ => Ok(None),
        }
    }

    fn propagate_local(
        &self,
        active: AssertionSet,
        method: &mut MethodIr,
        node: NodeId,
    ) -> Option<Rewrite> {
        let tree = method.node(node);
        if tree.flags.intersects(NodeFlags::VAR_DEF | NodeFlags::DONT_CSE) {
            return None;
        }
        let lcl = tree.local()?;
        let ty = tree.ty;
        let is_cse = method.locals.get(lcl.lcl)?.is_cse;
        let declared = method.locals.get(lcl.lcl)?.ty;

        if self.is_global() && !is_cse {
            if let Some(rewrite) = self.vn_constant_prop(method, node, lcl) {
                return Some(rewrite);
            }
        }

        for index in active {
            let Some(assertion) = self.store.get(index) else {
                continue;
            };
            let Op1::LocalVar(subject) = assertion.op1 else {
                continue;
            };
            if assertion.kind != AssertionKind::Equal {
                continue;
            }

            if assertion.is_copy() {
                // Global facts carry no kill information; copies only feed
                // implication there.
                if self.is_global() {
                    continue;
                }
                match self.copy_prop(assertion, method, node, lcl) {
                    Some(rewrite) => return Some(rewrite.by(index)),
                    None => continue,
                }
            }

            if subject.lcl != lcl.lcl || ty != declared {
                continue;
            }
            let usable = match self.mode() {
                PropagationMode::Local => true,
                PropagationMode::Global => {
                    subject.vn == method.node(node).vn.conservative() && !is_cse
                }
            };
            if usable {
                return self
                    .constant_prop(assertion, method, node, lcl)
                    .map(|rewrite| rewrite.by(index));
            }
        }
        None
    }

    /// Replaces a local read whose value number is a constant by the literal.
    pub(crate) fn vn_constant_prop(
        &self,
        method: &mut MethodIr,
        node: NodeId,
        lcl: LclRef,
    ) -> Option<Rewrite> {
        let tree = method.node(node);
        let vn = tree.vn.conservative();
        let ty = tree.ty;
        if !self.vns.is_constant(vn) || ty == VarType::Struct {
            return None;
        }
        let value = self.vns.constant_value(vn)?;
        let is_64bit = method.target.is_64bit();

        let mut ledger = RefCountLedger::new();
        ledger.decrement(lcl.lcl);

        let replacement = match self.vns.type_of(vn) {
            VarType::Float | VarType::Double => {
                method.node_mut(node).become_dbl_con(value.as_f64(), ty);
                node
            }
            VarType::Long => {
                let value = value.as_i64();
                match self.vns.handle_kind(vn) {
                    Some(kind) if is_64bit => method.new_handle_con(value, kind),
                    _ => become_typed_const(method, node, ty, value)?,
                }
            }
            VarType::Ref => {
                if ty != VarType::Ref || value != ConstValue::Null {
                    return None;
                }
                method.node_mut(node).become_int_con(0, VarType::Ref, None);
                node
            }
            VarType::Int => {
                let value = value.as_i64();
                match self.vns.handle_kind(vn) {
                    Some(kind) if !is_64bit => method.new_handle_con(value, kind),
                    _ if ty == VarType::Ref => {
                        method.node_mut(node).become_int_con(value, VarType::Ref, None);
                        node
                    }
                    _ => become_typed_const(method, node, ty, value)?,
                }
            }
            _ => return None,
        };

        method.node_mut(replacement).vn.set_both(vn);
        Some(
            Rewrite::replaced(node, replacement, RewriteKind::ConstantPropagated)
                .with_ref_counts(ledger),
        )
    }

    fn constant_prop(
        &self,
        assertion: &Assertion,
        method: &mut MethodIr,
        node: NodeId,
        lcl: LclRef,
    ) -> Option<Rewrite> {
        if method.locals.get(lcl.lcl)?.is_cse {
            return None;
        }
        let tree = method.node(node);
        let ty = tree.ty;
        let is_arr_index = tree.flags.contains(NodeFlags::ARR_INDEX);

        let replacement = match assertion.op2? {
            Op2::ConstDouble { value, .. } => {
                // Positive and negative zero compare equal.
                if value == 0.0 {
                    return None;
                }
                method.node_mut(node).become_dbl_con(value, ty);
                node
            }
            Op2::ConstLong { value, .. } => {
                if ty == VarType::Long {
                    method.node_mut(node).become_lng_con(value);
                } else {
                    method
                        .node_mut(node)
                        .become_int_con(i64::from(value as i32), VarType::Int, None);
                }
                node
            }
            Op2::ConstInt(lit) => {
                let replacement = match lit.handle {
                    Some(kind) => method.new_handle_con(lit.value, kind),
                    None => {
                        let tree = method.node_mut(node);
                        tree.become_int_con(lit.value, ty, None);
                        tree.flags.remove(NodeFlags::ARR_INDEX);
                        if is_arr_index {
                            if let NodeData::IntCon(con) = &mut tree.data {
                                con.field_seq = Some(FieldSeq::ConstantIndex);
                            }
                        }
                        node
                    }
                };
                // Integer constants are never small-typed.
                let new_ty = method.node(replacement).ty;
                if new_ty.is_integral() {
                    let wide = method.target.is_64bit() && lit.is_long;
                    method.node_mut(replacement).ty =
                        if wide { VarType::Long } else { VarType::Int };
                }
                replacement
            }
            _ => return None,
        };

        if self.is_global() {
            if let Some(vn) = assertion.op2.as_ref().and_then(Op2::vn) {
                method.node_mut(replacement).vn.set_both(vn);
            }
        }

        let mut ledger = RefCountLedger::new();
        ledger.decrement(lcl.lcl);
        Some(
            Rewrite::replaced(node, replacement, RewriteKind::ConstantPropagated)
                .with_ref_counts(ledger),
        )
    }

    fn copy_prop(
        &self,
        assertion: &Assertion,
        method: &mut MethodIr,
        node: NodeId,
        lcl: LclRef,
    ) -> Option<Rewrite> {
        let dst = assertion.op1.local()?;
        let src = assertion.copy_source()?;
        if dst.lcl == src.lcl {
            return None;
        }
        let (this_side, copy_side) = if dst.lcl == lcl.lcl {
            (dst, src)
        } else if src.lcl == lcl.lcl {
            (src, dst)
        } else {
            return None;
        };
        if self.is_global() && this_side.ssa != lcl.ssa {
            return None;
        }

        let lcl_dsc = method.locals.get(lcl.lcl)?;
        let copy_dsc = method.locals.get(copy_side.lcl)?;
        // A small struct field is stored at its exact width; reading it wider
        // would pick up its neighbours.
        if copy_dsc.is_struct_field
            && copy_dsc.ty.is_small()
            && copy_dsc.ty != method.node(node).ty
        {
            return None;
        }
        if copy_score(lcl_dsc, copy_dsc, dst.lcl == lcl.lcl, method.target) <= 0 {
            return None;
        }

        let ssa = if self.is_global() {
            copy_side.ssa
        } else {
            lcl.ssa
        };
        method.node_mut(node).data = NodeData::Local(LclRef {
            lcl: copy_side.lcl,
            ssa,
        });

        let mut ledger = RefCountLedger::new();
        ledger.decrement(lcl.lcl);
        ledger.increment(copy_side.lcl);
        Some(Rewrite::in_place(node, RewriteKind::CopyPropagated).with_ref_counts(ledger))
    }

    fn propagate_ind(
        &self,
        active: AssertionSet,
        method: &mut MethodIr,
        node: NodeId,
    ) -> Option<Rewrite> {
        let tree = method.node(node);
        if !tree.flags.contains(NodeFlags::EXCEPT) {
            return None;
        }

        let mut addr = tree.op1()?;
        let addr_tree = method.node(addr);
        if addr_tree.oper == Oper::Add {
            if let (Some(base), Some(offset)) = (addr_tree.op1(), addr_tree.op2()) {
                if method.node(offset).oper == Oper::CnsInt {
                    addr = base;
                }
            }
        }
        if method.node(addr).oper != Oper::LclVar {
            return None;
        }

        let proof = self.non_null_proof(active, method, addr)?;
        let flags = &mut method.node_mut(node).flags;
        flags.remove(NodeFlags::EXCEPT);
        flags.insert(NodeFlags::IND_NONFAULTING | NodeFlags::ORDER_SIDEEFF);
        Some(Rewrite::in_place(node, RewriteKind::NullCheckRemoved).by(proof))
    }

    /// Proof that the local read `op` is not null.
    ///
    /// `Some(NONE)` means value numbering alone proves it.
    fn non_null_proof(
        &self,
        active: AssertionSet,
        method: &MethodIr,
        op: NodeId,
    ) -> Option<AssertionIndex> {
        let tree = method.node(op);
        let vn = tree.vn.conservative();
        if self.is_global() && self.vns.is_known_non_null(vn) {
            return Some(AssertionIndex::NONE);
        }

        active.iter().find(|&index| {
            let Some(assertion) = self.store.get(index) else {
                return false;
            };
            if assertion.kind != AssertionKind::NotEqual {
                return false;
            }
            match self.mode() {
                PropagationMode::Global => {
                    assertion.op1.vn() == vn
                        && assertion.op2.as_ref().and_then(Op2::vn) == Some(self.vns.null())
                }
                PropagationMode::Local => {
                    assertion.is_local_not_equal_int(0)
                        && assertion.op1.local().map(|l| l.lcl) == tree.local().map(|l| l.lcl)
                }
            }
        })
    }

    fn propagate_cast(
        &self,
        active: AssertionSet,
        method: &mut MethodIr,
        node: NodeId,
    ) -> Option<Rewrite> {
        let tree = method.node(node);
        let NodeData::Cast { op, to } = tree.data else {
            return None;
        };
        let overflow = tree.flags.contains(NodeFlags::OVERFLOW);
        if to.is_floating() || method.node(op).ty.is_floating() {
            return None;
        }

        let lcl_node = method.effective_val(op);
        if method.node(lcl_node).oper != Oper::LclVar {
            return None;
        }
        let index = self.subrange_proof(active, method, lcl_node, to)?;

        let lcl = method.node(lcl_node).local()?;
        let dsc = method.locals.get(lcl.lcl)?;
        if dsc.normalize_on_load() || dsc.ty.is_long() {
            let target = method.target;
            if to.size(target) > dsc.ty.size(target) {
                // Widening: only the overflow check can go.
                if !overflow {
                    return None;
                }
                method.node_mut(node).flags.remove(NodeFlags::OVERFLOW);
                return Some(
                    Rewrite::in_place(node, RewriteKind::OverflowCheckRemoved).by(index),
                );
            }

            // A 32-bit unsigned load is a 32-bit load.
            let to = if to == VarType::UInt { VarType::Int } else { to };
            let mut cur = op;
            while method.node(cur).oper == Oper::Comma {
                method.node_mut(cur).ty = to;
                match method.node(cur).op2() {
                    Some(next) => cur = next,
                    None => break,
                }
            }
            method.node_mut(cur).ty = to;
        }

        Some(Rewrite::replaced(node, op, RewriteKind::CastRemoved).by(index))
    }

    /// An active range fact on the local read `lcl_node` that fits `to`.
    fn subrange_proof(
        &self,
        active: AssertionSet,
        method: &MethodIr,
        lcl_node: NodeId,
        to: VarType,
    ) -> Option<AssertionIndex> {
        let tree = method.node(lcl_node);
        let vn = tree.vn.conservative();
        let lcl = tree.local()?;

        active.iter().find(|&index| {
            let Some(assertion) = self.store.get(index) else {
                return false;
            };
            let (Op1::LocalVar(subject), Some(Op2::Subrange { lo, hi })) =
                (assertion.op1, assertion.op2)
            else {
                return false;
            };
            if assertion.kind != AssertionKind::Subrange {
                return false;
            }
            let same_subject = match self.mode() {
                PropagationMode::Global => subject.vn == vn,
                PropagationMode::Local => subject.lcl == lcl.lcl,
            };
            if !same_subject {
                return false;
            }
            match to {
                VarType::Byte
                | VarType::UByte
                | VarType::Short
                | VarType::UShort
                | VarType::Char
                | VarType::Bool => match (to.lower_bound(), to.upper_bound()) {
                    (Some(min), Some(max)) => lo >= min && hi <= max,
                    _ => false,
                },
                VarType::UInt => to.lower_bound().is_some_and(|min| lo >= min),
                VarType::Int => true,
                _ => false,
            }
        })
    }

    fn propagate_comma(
        &self,
        active: AssertionSet,
        method: &mut MethodIr,
        node: NodeId,
    ) -> Result<Option<Rewrite>> {
        if !self.is_global() {
            return Ok(None);
        }
        let Some(check) = method.node(node).op1() else {
            return Ok(None);
        };
        let NodeData::BoundsCheck { index, length } = method.node(check).data else {
            return Ok(None);
        };

        // The check is visited before its comma, so its own fact is already
        // active; it cannot justify removing itself.
        let own = self.node_assertion(check);
        let mut active = active;
        if own.is_some() && self.introducer(own) == Some(check) {
            active.remove(own);
        }

        let len_vn = method.node(length).vn.conservative();
        let idx_node = method.node(index);
        let idx_vn = idx_node.vn.conservative();
        let zero = self.vns.zero_for_type(idx_node.ty);

        for candidate in active {
            let Some(assertion) = self.store.get(candidate) else {
                continue;
            };
            let Op1::ArrayBound {
                index: seen_idx,
                length: seen_len,
            } = assertion.op1
            else {
                continue;
            };
            if assertion.kind != AssertionKind::NoThrow || seen_len != len_vn {
                continue;
            }

            let redundant = seen_idx == idx_vn
                || (zero.is_known() && idx_vn == zero)
                || self.constant_index_covered(seen_idx, idx_vn);
            if !redundant {
                continue;
            }

            let mut ledger = RefCountLedger::new();
            ledger.decrement_tree(method, check);
            let kept = method.extract_side_effects(check, NodeFlags::ASG);
            let kept = match kept {
                Some(effects) if effects != check => effects,
                _ => method.new_nop(),
            };
            ledger.increment_tree(method, kept);
            method.node_mut(node).replace_operand(check, kept);

            let mut rewrite = Rewrite::in_place(node, RewriteKind::BoundsCheckRemoved)
                .with_ref_counts(ledger)
                .by(candidate);
            if let Some(rest) = self.propagate(active.without(candidate), method, node)? {
                rewrite.replacement = rest.replacement;
                rewrite.ref_counts.merge(rest.ref_counts);
            }
            return Ok(Some(rewrite));
        }
        Ok(None)
    }

    /// `a[k1]` was checked and `0 <= k2 <= k1`.
    fn constant_index_covered(&self, seen: ValueNum, current: ValueNum) -> bool {
        if !self.vns.is_constant(seen) || !self.vns.is_constant(current) {
            return false;
        }
        match (
            self.vns.constant_value(seen),
            self.vns.constant_value(current),
        ) {
            (Some(ConstValue::Int(k1)), Some(ConstValue::Int(k2))) => k2 >= 0 && k1 >= k2,
            _ => false,
        }
    }

    fn propagate_call(
        &self,
        active: AssertionSet,
        method: &mut MethodIr,
        node: NodeId,
    ) -> Result<Option<Rewrite>> {
        let tree = method.node(node);
        let Some(call) = tree.call() else {
            return Ok(None);
        };

        if tree.flags.contains(NodeFlags::CALL_NULLCHECK) {
            let Some(this) = call.this_arg else {
                return Err(invariant_error!("call {} needs a null check but has no this", node));
            };
            if method.node(this).oper != Oper::LclVar {
                return Ok(None);
            }
            let Some(proof) = self.non_null_proof(active, method, this) else {
                return Ok(None);
            };
            method
                .node_mut(node)
                .flags
                .remove(NodeFlags::CALL_NULLCHECK | NodeFlags::EXCEPT);
            return Ok(Some(
                Rewrite::in_place(node, RewriteKind::NullCheckRemoved).by(proof),
            ));
        }

        if !self.is_global() || !call.helper().is_some_and(|h| h.is_type_check()) {
            return Ok(None);
        }
        let (Some(&method_table), Some(&object)) = (call.args.first(), call.args.get(1)) else {
            return Ok(None);
        };
        if method.node(object).oper != Oper::LclVar {
            return Ok(None);
        }
        let Some(proof) = self.subtype_proof(active, method, object, method_table) else {
            return Ok(None);
        };

        let call_ty = tree.ty;
        let mut ledger = RefCountLedger::new();
        ledger.decrement_tree(method, node);

        let mut effects: Option<NodeId> = None;
        let args = method.node(node).operands();
        for arg in args {
            if let Some(kept) = method.extract_side_effects(arg, NodeFlags::SIDE_EFFECT) {
                effects = Some(match effects {
                    None => kept,
                    Some(prev) => {
                        let comma = method.new_comma(prev, kept);
                        method.node_mut(comma).ty = VarType::Void;
                        comma
                    }
                });
            }
        }
        let replacement = match effects {
            Some(effects) => {
                let comma = method.new_comma(effects, object);
                method.node_mut(comma).ty = call_ty;
                comma
            }
            None => object,
        };
        ledger.increment_tree(method, replacement);

        Ok(Some(
            Rewrite::replaced(node, replacement, RewriteKind::TypeCheckRemoved)
                .with_ref_counts(ledger)
                .by(proof),
        ))
    }

    /// An active type fact saying `object`'s method table is `method_table`.
    fn subtype_proof(
        &self,
        active: AssertionSet,
        method: &MethodIr,
        object: NodeId,
        method_table: NodeId,
    ) -> Option<AssertionIndex> {
        let tree = method.node(object);
        let vn = tree.vn.conservative();
        let lcl = tree.local()?;

        active.iter().find(|&index| {
            let Some(assertion) = self.store.get(index) else {
                return false;
            };
            if assertion.kind != AssertionKind::Equal || !assertion.op1.is_type() {
                return false;
            }
            let Some(subject) = assertion.op1.local() else {
                return false;
            };
            let same_subject = match self.mode() {
                PropagationMode::Global => subject.vn == vn,
                PropagationMode::Local => subject.lcl == lcl.lcl,
            };
            if !same_subject {
                return false;
            }

            let (lit, arg) = match assertion.op2 {
                Some(Op2::IndirectConstInt(lit)) => {
                    let arg = method.node(method_table);
                    match (arg.oper, arg.op1()) {
                        (Oper::Ind, Some(inner)) => (lit, inner),
                        _ => return false,
                    }
                }
                Some(Op2::ConstInt(lit)) => (lit, method_table),
                _ => return false,
            };
            self.known_int(method, arg)
                .is_some_and(|(value, _)| value == lit.value)
        })
    }

    fn propagate_relop_global(
        &self,
        active: AssertionSet,
        method: &mut MethodIr,
        node: NodeId,
    ) -> Result<Option<Rewrite>> {
        let tree = method.node(node);
        let (Some(op1), Some(op2)) = (tree.op1(), tree.op2()) else {
            return Ok(None);
        };
        let vn1 = method.node(op1).vn.conservative();
        let vn2 = method.node(op2).vn.conservative();
        let null = self.vns.null();

        // `x ==/!= null` with `x` known non-null.
        for (side, other_vn, side_vn) in [(op1, vn2, vn1), (op2, vn1, vn2)] {
            if other_vn != null || !self.vns.is_known_non_null(side_vn) {
                continue;
            }
            let mut ledger = RefCountLedger::new();
            ledger.decrement_tree(method, side);
            let side_ty = method.node(side).ty;
            if method.node(side).has_side_effects() {
                // `COMMA(effects, null)` keeps whatever `x` still has to do.
                let Some(effects) = method.extract_side_effects(side, NodeFlags::SIDE_EFFECT)
                else {
                    continue;
                };
                ledger.increment_tree(method, effects);
                let zero = method.new_int_con(0, side_ty);
                method.node_mut(zero).vn.set_both(null);
                let comma = method.new_comma(effects, zero);
                method.node_mut(comma).vn.set_both(null);
                method.node_mut(node).replace_operand(side, comma);
            } else {
                let folded = method.node_mut(side);
                folded.become_int_con(0, side_ty, None);
                folded.vn.set_both(null);
            }
            reverse_relop(method, node);
            return Ok(Some(
                Rewrite::in_place(node, RewriteKind::RelopFolded).with_ref_counts(ledger),
            ));
        }

        if !method.node(op1).is_local_var() {
            return Ok(None);
        }
        let Some(lcl1) = method.node(op1).local() else {
            return Ok(None);
        };
        let Some(index) = active.iter().find(|&index| {
            self.store.get(index).is_some_and(|a| {
                matches!(a.kind, AssertionKind::Equal | AssertionKind::NotEqual)
                    && a.op1.vn() == vn1
                    && a.op2.as_ref().and_then(Op2::vn) == Some(vn2)
            })
        }) else {
            return Ok(None);
        };
        let kind = self
            .store
            .get(index)
            .map(|a| a.kind)
            .ok_or_else(|| invariant_error!("active assertion {} is not in the table", index))?;

        let mut ledger = RefCountLedger::new();
        let mut allow_reverse = true;
        let op1_ty = method.node(op1).ty;

        if self.vns.is_constant(vn2) {
            let Some(value) = self.vns.constant_value(vn2) else {
                return Ok(None);
            };
            ledger.decrement(lcl1.lcl);
            let folded = method.node_mut(op1);
            match op1_ty.actual() {
                VarType::Int => folded.become_int_con(i64::from(value.as_i64() as i32), op1_ty, None),
                VarType::Long => folded.become_lng_con(value.as_i64()),
                VarType::Float | VarType::Double => {
                    let constant = value.as_f64();
                    folded.become_dbl_con(constant, op1_ty);
                    // `x == NaN` is already false and `x != NaN` already true.
                    allow_reverse = !constant.is_nan();
                }
                VarType::Ref => {
                    if value != ConstValue::Null {
                        return Err(invariant_error!(
                            "reference constant {:?} in relop {} is not null",
                            value,
                            node
                        ));
                    }
                    folded.become_int_con(0, VarType::Ref, None);
                }
                other => {
                    return Err(invariant_error!(
                        "unexpected type {} in relop {} propagation",
                        other,
                        node
                    ));
                }
            }
            method.node_mut(op1).vn.set_both(vn2);
        } else if method.node(op2).is_local_var() {
            let Some(lcl2) = method.node(op2).local() else {
                return Ok(None);
            };
            ledger.decrement(lcl1.lcl);
            if op1_ty.is_floating() {
                // A NaN would break the fact; compare two zeros instead.
                ledger.decrement(lcl2.lcl);
                method.node_mut(op1).become_dbl_con(0.0, op1_ty);
                let op2_ty = method.node(op2).ty;
                method.node_mut(op2).become_dbl_con(0.0, op2_ty);
            } else {
                ledger.increment(lcl2.lcl);
                method.node_mut(op1).data = NodeData::Local(lcl2);
            }
        } else {
            return Ok(None);
        }

        if allow_reverse && kind == AssertionKind::NotEqual {
            reverse_relop(method, node);
        }
        Ok(Some(
            Rewrite::in_place(node, RewriteKind::RelopFolded)
                .with_ref_counts(ledger)
                .by(index),
        ))
    }

    fn propagate_relop_local(
        &self,
        active: AssertionSet,
        method: &mut MethodIr,
        node: NodeId,
    ) -> Result<Option<Rewrite>> {
        let tree = method.node(node);
        let oper = tree.oper;
        let (Some(op1), Some(op2)) = (tree.op1(), tree.op2()) else {
            return Ok(None);
        };
        let op1_tree = method.node(op1);
        if !op1_tree.is_local_var() {
            return Ok(None);
        }
        let Some(lcl) = op1_tree.local() else {
            return Ok(None);
        };
        let Some(cns) = method.node(op2).int_con() else {
            return Ok(None);
        };
        let cmp_ty = op1_tree.ty;
        if cmp_ty.is_floating() {
            return Ok(None);
        }

        let Some((index, literal, is_equal)) = active.iter().find_map(|index| {
            let assertion = self.store.get(index)?;
            let is_equal = match assertion.kind {
                AssertionKind::Equal => true,
                AssertionKind::NotEqual => false,
                _ => return None,
            };
            let (Op1::LocalVar(subject), Some(Op2::ConstInt(lit))) =
                (assertion.op1, assertion.op2)
            else {
                return None;
            };
            (subject.lcl == lcl.lcl && (lit.value == cns.value || is_equal))
                .then_some((index, lit.value, is_equal))
        }) else {
            return Ok(None);
        };

        let target = method.target;
        let size = cmp_ty.size(target);
        let constant_is_equal = if size == target.pointer_size() {
            literal == cns.value
        } else if target.is_64bit() && size == 4 {
            literal as i32 == cns.value as i32
        } else {
            return Ok(None);
        };
        if !constant_is_equal && !is_equal {
            return Err(invariant_error!(
                "assertion {} matched relop {} without proving it",
                index,
                node
            ));
        }

        let mut result = constant_is_equal == is_equal;
        if oper == Oper::Ne {
            result = !result;
        }
        method
            .node_mut(op2)
            .become_int_con(i64::from(result), VarType::Int, None);

        let mut ledger = RefCountLedger::new();
        ledger.decrement(lcl.lcl);
        Ok(Some(
            Rewrite::replaced(node, op2, RewriteKind::RelopFolded)
                .with_ref_counts(ledger)
                .by(index),
        ))
    }
}

/// Turns `node` into a constant of the node's own type category.
fn become_typed_const(method: &mut MethodIr, node: NodeId, ty: VarType, value: i64) -> Option<NodeId> {
    let tree = method.node_mut(node);
    match ty {
        VarType::Int => tree.become_int_con(i64::from(value as i32), VarType::Int, None),
        VarType::Long => tree.become_lng_con(value),
        VarType::Float | VarType::Double => tree.become_dbl_con(value as f64, ty),
        _ => return None,
    }
    Some(node)
}

/// Flips the sense of a relop, keeping unordered float compares correct.
fn reverse_relop(method: &mut MethodIr, node: NodeId) {
    let floating = method
        .node(node)
        .op1()
        .is_some_and(|op| method.node(op).ty.is_floating());
    let tree = method.node_mut(node);
    tree.oper = tree.oper.reverse();
    if floating {
        tree.flags.toggle(NodeFlags::RELOP_NAN_UN);
    }
}

/// Preference for replacing `lcl` by `copy`; positive means substitute.
fn copy_score(lcl: &LclVarDsc, copy: &LclVarDsc, prefer_copy: bool, target: Target) -> i32 {
    let mut score = 0;
    if lcl.volatile_hint {
        score += 4;
    }
    if copy.volatile_hint {
        score -= 4;
    }
    if lcl.do_not_enregister {
        score += 4;
    }
    if copy.do_not_enregister {
        score -= 4;
    }
    if target == Target::X86 && lcl.ty == VarType::Double {
        if lcl.is_param {
            score += 2;
        }
        if copy.is_param {
            score -= 2;
        }
    }
    score + if prefer_copy { 1 } else { -1 }
}
