//! SSA-based value numbering.
//!
//! Blocks are visited in reverse postorder and every statement's nodes in
//! execution order, so a use of an SSA definition is numbered after the
//! definition itself. A copy `b = a` gives `b` the value number of `a`,
//! constants are hash-consed and folded through arithmetic, and phi
//! definitions get fresh numbers. Phi arguments are filled in by a second
//! sweep once every definition has been seen.

use std::collections::HashMap;

use crate::{
    ir::{LclNum, MethodIr, NodeData, NodeFlags, NodeId, Oper, SsaNum, VarType},
    vn::{ConstValue, ValueNum, ValueNumOracle, ValueNumStore, VnFunc},
    Error, Result,
};

/// Numbers the nodes of an SSA-form method.
///
/// # Examples
///
/// ```rust,ignore
/// let store = ValueNumbering::new().run(&mut method)?;
/// assert!(store.is_constant(method.node(five).vn.conservative()));
/// ```
#[derive(Debug, Default)]
pub struct ValueNumbering {
    store: ValueNumStore,
    defs: HashMap<(LclNum, SsaNum), ValueNum>,
}

impl ValueNumbering {
    /// Creates a numberer with an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns both halves of every reachable node's [`crate::vn::VnPair`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::SsaRequired`] if the method is not in SSA form.
    pub fn run(mut self, method: &mut MethodIr) -> Result<ValueNumStore> {
        if !method.ssa_built {
            return Err(Error::SsaRequired);
        }

        let mut phi_args = Vec::new();
        for block in method.reverse_postorder() {
            let roots: Vec<NodeId> = method.block(block)?.statements.iter().map(|s| s.root).collect();
            for root in roots {
                for id in method.execution_order(root) {
                    if method.node(id).oper == Oper::PhiArg {
                        phi_args.push(id);
                        continue;
                    }
                    if let Some(vn) = self.number_node(method, id) {
                        method.node_mut(id).vn.set_both(vn);
                    }
                }
            }
        }

        for id in phi_args {
            let vn = method
                .node(id)
                .local()
                .and_then(|lcl| self.defs.get(&(lcl.lcl, lcl.ssa)).copied())
                .unwrap_or(ValueNum::NONE);
            method.node_mut(id).vn.set_both(vn);
        }

        Ok(self.store)
    }

    /// The value number of one node; `None` leaves the node untouched.
    fn number_node(&mut self, method: &mut MethodIr, id: NodeId) -> Option<ValueNum> {
        let node = method.node(id);
        let (oper, ty, flags) = (node.oper, node.ty, node.flags);

        let vn = match node.data.clone() {
            NodeData::IntCon(con) => match con.handle {
                Some(kind) => self
                    .store
                    .vn_for_handle(con.value, kind, method.target.is_64bit()),
                None if ty == VarType::Ref && con.value == 0 => ValueNum::NULL,
                None if ty.is_gc() => self.store.new_opaque(ty, false),
                None if ty.actual() == VarType::Long => self.store.vn_for_long(con.value),
                None => self.store.vn_for_int(con.value as i32),
            },
            NodeData::LngCon(value) => self.store.vn_for_long(value),
            NodeData::DblCon(value) => {
                if ty == VarType::Float {
                    self.store.vn_for_float(value as f32)
                } else {
                    self.store.vn_for_double(value)
                }
            }
            NodeData::Local(lcl) if oper == Oper::LclVar => {
                if flags.contains(NodeFlags::VAR_DEF) {
                    // Numbered by the enclosing assignment.
                    return None;
                }
                if !lcl.ssa.is_valid() {
                    self.store.new_opaque(ty, false)
                } else if let Some(&vn) = self.defs.get(&(lcl.lcl, lcl.ssa)) {
                    vn
                } else {
                    let vn = self.store.new_opaque(ty, false);
                    self.defs.insert((lcl.lcl, lcl.ssa), vn);
                    vn
                }
            }
            NodeData::Binary(dst, value) if oper == Oper::Asg => {
                let value_vn = method.node(value).vn.conservative();
                if let Some(lcl) = method.node(dst).local() {
                    if lcl.ssa.is_valid() {
                        self.defs.insert((lcl.lcl, lcl.ssa), value_vn);
                    }
                    method.node_mut(dst).vn.set_both(value_vn);
                }
                ValueNum::VOID
            }
            NodeData::Binary(_, op2) if oper == Oper::Comma => method.node(op2).vn.conservative(),
            NodeData::Binary(op1, op2) => {
                let a = method.node(op1).vn.conservative();
                let b = method.node(op2).vn.conservative();
                self.fold_binary(oper, ty, flags, a, b)
                    .unwrap_or_else(|| self.func(VnFunc::Oper(oper), ty, vec![a, b]))
            }
            NodeData::Unary(op) => {
                let a = method.node(op).vn.conservative();
                match oper {
                    Oper::ArrLength => self.func(VnFunc::ArrLength, VarType::Int, vec![a]),
                    Oper::Neg | Oper::Not => self
                        .fold_unary(oper, ty, a)
                        .unwrap_or_else(|| self.func(VnFunc::Oper(oper), ty, vec![a])),
                    Oper::Ind => self.store.new_opaque(ty, false),
                    _ => ValueNum::VOID,
                }
            }
            NodeData::Cast { op, to } => {
                let a = method.node(op).vn.conservative();
                let folded = if flags.contains(NodeFlags::OVERFLOW) {
                    None
                } else {
                    self.fold_cast(a, to)
                };
                folded.unwrap_or_else(|| self.func(VnFunc::Cast(to), ty, vec![a]))
            }
            NodeData::Phi(_) => self.store.new_opaque(ty, false),
            NodeData::BoundsCheck { .. } => ValueNum::VOID,
            NodeData::None if oper == Oper::AllocObj => self.store.new_opaque(ty, true),
            NodeData::None => ValueNum::VOID,
            NodeData::Call(_) if ty == VarType::Void => ValueNum::VOID,
            NodeData::Call(_)
            | NodeData::ArrElem { .. }
            | NodeData::ClsVar(_)
            | NodeData::Local(_) => self.store.new_opaque(ty, false),
        };
        Some(vn)
    }

    fn func(&mut self, func: VnFunc, ty: VarType, args: Vec<ValueNum>) -> ValueNum {
        self.store.vn_for_func(func, ty.actual(), args)
    }

    /// A plain (non-handle) integral constant.
    fn int_const(&self, vn: ValueNum) -> Option<i64> {
        if self.store.is_handle(vn) {
            return None;
        }
        match self.store.constant_value(vn)? {
            ConstValue::Int(v) => Some(i64::from(v)),
            ConstValue::Long(v) => Some(v),
            _ => None,
        }
    }

    fn typed_const(&mut self, ty: VarType, value: i64) -> Option<ValueNum> {
        match ty.actual() {
            VarType::Int => Some(self.store.vn_for_int(value as i32)),
            VarType::Long => Some(self.store.vn_for_long(value)),
            _ => None,
        }
    }

    fn fold_binary(
        &mut self,
        oper: Oper,
        ty: VarType,
        flags: NodeFlags,
        a: ValueNum,
        b: ValueNum,
    ) -> Option<ValueNum> {
        let (x, y) = (self.int_const(a)?, self.int_const(b)?);
        if oper.is_relop() {
            let ordering = if flags.contains(NodeFlags::UNSIGNED) {
                (x as u64).cmp(&(y as u64))
            } else {
                x.cmp(&y)
            };
            let result = match oper {
                Oper::Eq => ordering.is_eq(),
                Oper::Ne => ordering.is_ne(),
                Oper::Lt => ordering.is_lt(),
                Oper::Le => ordering.is_le(),
                Oper::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            };
            return Some(self.store.vn_for_int(i32::from(result)));
        }
        let value = match oper {
            Oper::Add => x.wrapping_add(y),
            Oper::Sub => x.wrapping_sub(y),
            Oper::Mul => x.wrapping_mul(y),
            Oper::And => x & y,
            Oper::Or => x | y,
            Oper::Xor => x ^ y,
            _ => return None,
        };
        self.typed_const(ty, value)
    }

    fn fold_unary(&mut self, oper: Oper, ty: VarType, a: ValueNum) -> Option<ValueNum> {
        let x = self.int_const(a)?;
        let value = if oper == Oper::Neg { x.wrapping_neg() } else { !x };
        self.typed_const(ty, value)
    }

    fn fold_cast(&mut self, a: ValueNum, to: VarType) -> Option<ValueNum> {
        let x = self.int_const(a)?;
        let value = match to {
            VarType::Bool | VarType::UByte => i64::from(x as u8),
            VarType::Byte => i64::from(x as i8),
            VarType::Short => i64::from(x as i16),
            VarType::UShort | VarType::Char => i64::from(x as u16),
            VarType::Int | VarType::UInt => i64::from(x as i32),
            VarType::Long | VarType::ULong => x,
            _ => return None,
        };
        self.typed_const(to, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{builder::MethodBuilder, HandleKind};

    #[test]
    fn test_copy_shares_value_number() {
        let mut copy_use = None;
        let mut method = MethodBuilder::new("copy").build_with(|f| {
            let a = f.param(VarType::Int);
            let b = f.local(VarType::Int);
            f.block(0, |bb| {
                let a_use = bb.lcl(a, 1);
                bb.def(b, 2, a_use);
                let b_use = bb.lcl(b, 2);
                copy_use = Some((a_use, b_use));
                bb.ret_val(b_use);
            });
        });
        let store = ValueNumbering::new().run(&mut method).unwrap();
        let (a_use, b_use) = copy_use.unwrap();
        let vn = method.node(a_use).vn.conservative();
        assert!(vn.is_valid());
        assert_eq!(method.node(b_use).vn.conservative(), vn);
        assert!(!store.is_constant(vn));
    }

    #[test]
    fn test_constants_fold() {
        let mut sum = None;
        let mut method = MethodBuilder::new("fold").build_with(|f| {
            f.block(0, |b| {
                let two = b.int(2);
                let three = b.int(3);
                let add = b.add(two, three);
                sum = Some(add);
                b.ret_val(add);
            });
        });
        let mut store = ValueNumbering::new().run(&mut method).unwrap();
        let vn = method.node(sum.unwrap()).vn.conservative();
        assert_eq!(vn, store.vn_for_int(5));
    }

    #[test]
    fn test_null_and_alloc() {
        let mut nodes = None;
        let mut method = MethodBuilder::new("alloc").build_with(|f| {
            f.block(0, |b| {
                let null = b.null();
                let obj = b.alloc();
                let handle = b.handle(0x40, HandleKind::Str);
                b.eval(obj);
                b.eval(null);
                b.eval(handle);
                nodes = Some((null, obj, handle));
                b.ret();
            });
        });
        let store = ValueNumbering::new().run(&mut method).unwrap();
        let (null, obj, handle) = nodes.unwrap();
        assert_eq!(method.node(null).vn.conservative(), ValueNum::NULL);
        assert!(store.is_known_non_null(method.node(obj).vn.conservative()));
        assert_eq!(
            store.handle_kind(method.node(handle).vn.conservative()),
            Some(HandleKind::Str)
        );
    }

    #[test]
    fn test_array_length_bound() {
        let mut relop = None;
        let mut method = MethodBuilder::new("bound").build_with(|f| {
            let arr = f.param(VarType::Ref);
            let i = f.param(VarType::Int);
            f.block(0, |b| {
                let idx = b.lcl(i, 1);
                let a = b.lcl(arr, 1);
                let len = b.arr_length(a);
                let lt = b.lt(idx, len);
                relop = Some(lt);
                b.branch(lt, 2);
            });
            f.block(1, |b| b.ret());
            f.block(2, |b| b.ret());
        });
        let store = ValueNumbering::new().run(&mut method).unwrap();
        let vn = method.node(relop.unwrap()).vn.conservative();
        assert!(store.is_array_len_bound(vn));
        assert!(!store.is_array_len_arith_bound(vn));
    }

    #[test]
    fn test_requires_ssa() {
        let mut method = MethodBuilder::new("nossa").ssa(false).build_with(|f| {
            f.block(0, |b| b.ret());
        });
        assert_eq!(
            ValueNumbering::new().run(&mut method).err(),
            Some(Error::SsaRequired)
        );
    }
}
