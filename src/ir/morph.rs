//! Statement re-morphing after propagation.
//!
//! Propagation leaves trees like `ADD(CNS_INT 5, CNS_INT 1)` or
//! `COMMA(NOP, x)` behind. The folder here collapses those shapes, turns a
//! conditional jump on a constant into straight-line flow, and truncates a
//! block after a bounds check that can only throw.

use crate::{
    ir::{BlockId, JumpKind, MethodIr, NodeData, NodeFlags, NodeId, Oper, VarType},
    Result,
};

/// What happened to a statement when it was re-morphed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MorphOutcome {
    /// The statement is still in place (possibly with a new root).
    Kept,
    /// The statement was deleted from its block.
    StatementRemoved,
    /// The statement always throws; the statements after it were deleted.
    RemoveRestOfBlock,
}

impl MethodIr {
    /// Folds constant subtrees bottom-up and returns the (possibly new) root.
    pub fn fold_tree(&mut self, id: NodeId) -> NodeId {
        for op in self.node(id).operands() {
            let folded = self.fold_tree(op);
            if folded != op {
                self.node_mut(id).replace_operand(op, folded);
            }
        }
        self.refresh_effects(id);
        self.fold_node(id)
    }

    fn fold_node(&mut self, id: NodeId) -> NodeId {
        let node = self.node(id);
        let (oper, flags) = (node.oper, node.flags);
        match node.data.clone() {
            NodeData::Binary(op1, op2) if oper == Oper::Comma => {
                if self.node(op1).flags.intersects(NodeFlags::SIDE_EFFECT) {
                    id
                } else {
                    op2
                }
            }
            NodeData::Binary(op1, op2) if oper.is_relop() => {
                if let Some(result) = self.fold_relop(oper, op1, op2, flags) {
                    self.node_mut(id)
                        .become_int_con(i64::from(result), VarType::Int, None);
                }
                id
            }
            NodeData::Binary(op1, op2) => {
                self.fold_arith(id, oper, op1, op2);
                id
            }
            NodeData::Unary(op) => {
                self.fold_unary(id, oper, op);
                id
            }
            NodeData::Cast { op, to } if !flags.contains(NodeFlags::OVERFLOW) => {
                self.fold_cast(id, op, to);
                id
            }
            _ => id,
        }
    }

    fn plain_int(&self, id: NodeId) -> Option<i64> {
        let node = self.node(id);
        match &node.data {
            NodeData::IntCon(con) if con.handle.is_none() => Some(con.value),
            NodeData::LngCon(value) => Some(*value),
            _ => None,
        }
    }

    fn dbl(&self, id: NodeId) -> Option<f64> {
        match self.node(id).data {
            NodeData::DblCon(value) => Some(value),
            _ => None,
        }
    }

    fn fold_relop(&self, oper: Oper, op1: NodeId, op2: NodeId, flags: NodeFlags) -> Option<bool> {
        if let (Some(a), Some(b)) = (self.plain_int(op1), self.plain_int(op2)) {
            let ordering = if flags.contains(NodeFlags::UNSIGNED) {
                (a as u64).cmp(&(b as u64))
            } else {
                a.cmp(&b)
            };
            return Some(match oper {
                Oper::Eq => ordering.is_eq(),
                Oper::Ne => ordering.is_ne(),
                Oper::Lt => ordering.is_lt(),
                Oper::Le => ordering.is_le(),
                Oper::Gt => ordering.is_gt(),
                Oper::Ge => ordering.is_ge(),
                _ => return None,
            });
        }

        let (a, b) = (self.dbl(op1)?, self.dbl(op2)?);
        if a.is_nan() || b.is_nan() {
            return Some(match oper {
                Oper::Ne => true,
                Oper::Eq => false,
                _ => flags.contains(NodeFlags::RELOP_NAN_UN),
            });
        }
        Some(match oper {
            Oper::Eq => a == b,
            Oper::Ne => a != b,
            Oper::Lt => a < b,
            Oper::Le => a <= b,
            Oper::Gt => a > b,
            Oper::Ge => a >= b,
            _ => return None,
        })
    }

    fn fold_arith(&mut self, id: NodeId, oper: Oper, op1: NodeId, op2: NodeId) {
        let (Some(a), Some(b)) = (self.plain_int(op1), self.plain_int(op2)) else {
            return;
        };
        let value = match oper {
            Oper::Add => a.wrapping_add(b),
            Oper::Sub => a.wrapping_sub(b),
            Oper::Mul => a.wrapping_mul(b),
            Oper::And => a & b,
            Oper::Or => a | b,
            Oper::Xor => a ^ b,
            _ => return,
        };
        self.become_typed_int(id, value);
    }

    fn fold_unary(&mut self, id: NodeId, oper: Oper, op: NodeId) {
        let Some(a) = self.plain_int(op) else {
            return;
        };
        let value = match oper {
            Oper::Neg => a.wrapping_neg(),
            Oper::Not => !a,
            _ => return,
        };
        self.become_typed_int(id, value);
    }

    fn fold_cast(&mut self, id: NodeId, op: NodeId, to: VarType) {
        let Some(a) = self.plain_int(op) else {
            return;
        };
        let value = match to {
            VarType::Bool | VarType::UByte => i64::from(a as u8),
            VarType::Byte => i64::from(a as i8),
            VarType::Short => i64::from(a as i16),
            VarType::UShort | VarType::Char => i64::from(a as u16),
            VarType::Int | VarType::UInt => i64::from(a as i32),
            VarType::Long | VarType::ULong => a,
            VarType::Float | VarType::Double => {
                let value = if self.node(op).ty.is_unsigned() {
                    a as u64 as f64
                } else {
                    a as f64
                };
                self.node_mut(id).become_dbl_con(value, to);
                return;
            }
            _ => return,
        };
        self.become_typed_int(id, value);
    }

    fn become_typed_int(&mut self, id: NodeId, value: i64) {
        let ty = self.node(id).ty;
        if ty.actual() == VarType::Long {
            self.node_mut(id).become_lng_con(value);
        } else if ty.actual() == VarType::Int {
            self.node_mut(id).become_int_con(i64::from(value as i32), ty.actual(), None);
        }
    }

    /// Folds a statement and applies control-flow consequences.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::BlockNotFound`] if `block` does not exist.
    pub fn morph_statement(&mut self, block: BlockId, stmt: usize) -> Result<MorphOutcome> {
        let Some(root) = self.block(block)?.statements.get(stmt).map(|s| s.root) else {
            return Ok(MorphOutcome::Kept);
        };

        let new_root = self.fold_tree(root);
        self.update_side_effects(new_root);
        if let Some(statement) = self.block_mut(block)?.statements.get_mut(stmt) {
            statement.root = new_root;
        }

        if self.always_throws(new_root) {
            let blk = self.block_mut(block)?;
            blk.statements.truncate(stmt + 1);
            blk.jump = JumpKind::Throw;
            self.compute_predecessors();
            return Ok(MorphOutcome::RemoveRestOfBlock);
        }

        let node = self.node(new_root);
        match node.oper {
            Oper::Jtrue => {
                let Some(cond) = node.op1().and_then(|op| self.plain_int(op)) else {
                    return Ok(MorphOutcome::Kept);
                };
                let blk = self.block_mut(block)?;
                if let JumpKind::Cond(dest) = blk.jump {
                    blk.jump = if cond != 0 {
                        JumpKind::Always(dest)
                    } else {
                        JumpKind::None
                    };
                }
                blk.statements.remove(stmt);
                self.compute_predecessors();
                Ok(MorphOutcome::StatementRemoved)
            }
            Oper::Nop | Oper::CnsInt | Oper::CnsLng | Oper::CnsDbl | Oper::LclVar => {
                self.block_mut(block)?.statements.remove(stmt);
                Ok(MorphOutcome::StatementRemoved)
            }
            _ => Ok(MorphOutcome::Kept),
        }
    }

    fn always_throws(&self, root: NodeId) -> bool {
        self.execution_order(root).into_iter().any(|id| {
            match self.node(id).data {
                NodeData::BoundsCheck { index, length } => {
                    match (self.plain_int(index), self.plain_int(length)) {
                        (Some(index), Some(length)) => index < 0 || index >= length,
                        _ => false,
                    }
                }
                _ => false,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::ir::{
        BlockId, JumpKind, LclVarDsc, MethodId, MethodIr, MorphOutcome, Oper, SsaNum, Target,
        VarType,
    };

    fn method() -> MethodIr {
        MethodIr::new(MethodId(0), "morph", Target::X64)
    }

    #[test]
    fn test_fold_arithmetic() {
        let mut m = method();
        let five = m.new_int_con(5, VarType::Int);
        let one = m.new_int_con(1, VarType::Int);
        let add = m.new_binop(Oper::Add, VarType::Int, five, one);
        let folded = m.fold_tree(add);
        assert_eq!(m.node(folded).int_con().map(|c| c.value), Some(6));
    }

    #[test]
    fn test_fold_int_wraps() {
        let mut m = method();
        let max = m.new_int_con(i64::from(i32::MAX), VarType::Int);
        let one = m.new_int_con(1, VarType::Int);
        let add = m.new_binop(Oper::Add, VarType::Int, max, one);
        let folded = m.fold_tree(add);
        assert_eq!(
            m.node(folded).int_con().map(|c| c.value),
            Some(i64::from(i32::MIN))
        );
    }

    #[test]
    fn test_fold_comma_with_nop() {
        let mut m = method();
        let x = m.locals.push(LclVarDsc::new(VarType::Int));
        let nop = m.new_nop();
        let val = m.new_lcl_var(x, SsaNum(1)).unwrap();
        let comma = m.new_comma(nop, val);
        assert_eq!(m.fold_tree(comma), val);
    }

    #[test]
    fn test_fold_nan_compare() {
        let mut m = method();
        let nan = m.new_dbl_con(f64::NAN, VarType::Double);
        let also_nan = m.new_dbl_con(f64::NAN, VarType::Double);
        let eq = m.new_binop(Oper::Eq, VarType::Int, nan, also_nan);
        let folded = m.fold_tree(eq);
        assert_eq!(m.node(folded).int_con().map(|c| c.value), Some(0));
    }

    #[test]
    fn test_morph_constant_jtrue() {
        let mut m = method();
        let b0 = m.add_block();
        m.add_block();
        let b2 = m.add_block();
        m.blocks[0].jump = JumpKind::Cond(b2);
        let one = m.new_int_con(1, VarType::Int);
        let also_one = m.new_int_con(1, VarType::Int);
        let eq = m.new_binop(Oper::Eq, VarType::Int, one, also_one);
        let jtrue = m.new_unop(Oper::Jtrue, VarType::Void, eq);
        m.append_statement(b0, jtrue).unwrap();
        m.compute_predecessors();

        assert_eq!(m.morph_statement(b0, 0), Ok(MorphOutcome::StatementRemoved));
        assert_eq!(m.blocks[0].jump, JumpKind::Always(BlockId(2)));
        assert!(m.blocks[0].statements.is_empty());
        assert!(m.blocks[1].preds.is_empty());
    }

    #[test]
    fn test_morph_failing_bounds_check() {
        let mut m = method();
        let b0 = m.add_block();
        let idx = m.new_int_con(4, VarType::Int);
        let len = m.new_int_con(2, VarType::Int);
        let check = m.new_bounds_check(idx, len);
        m.append_statement(b0, check).unwrap();
        let nop = m.new_nop();
        m.append_statement(b0, nop).unwrap();

        assert_eq!(m.morph_statement(b0, 0), Ok(MorphOutcome::RemoveRestOfBlock));
        assert_eq!(m.blocks[0].statements.len(), 1);
        assert_eq!(m.blocks[0].jump, JumpKind::Throw);
    }
}
