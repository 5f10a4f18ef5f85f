//! Tree walking and rewriting utilities.
//!
//! These are the generic IR mutation primitives assertion propagation relies
//! on: execution-order walks, parent-link lookup and replacement, effect
//! flag maintenance and side-effect extraction.

use std::fmt::Write;

use crate::{
    ir::{BlockId, LclNum, MethodIr, NodeData, NodeFlags, NodeId, Oper},
    Error, Result,
};

impl MethodIr {
    /// Effect flags a node carries on its own, ignoring its operands.
    #[must_use]
    pub fn intrinsic_effects(&self, id: NodeId) -> NodeFlags {
        let node = self.node(id);
        let mut flags = NodeFlags::empty();
        match node.oper {
            Oper::Asg => flags |= NodeFlags::ASG,
            Oper::Call => {
                flags |= NodeFlags::CALL | NodeFlags::GLOB_REF;
                if node.flags.contains(NodeFlags::CALL_NULLCHECK) {
                    flags |= NodeFlags::EXCEPT;
                }
            }
            Oper::Ind | Oper::NullCheck | Oper::ArrLength | Oper::ArrElem => {
                flags |= NodeFlags::GLOB_REF;
                if !node.flags.contains(NodeFlags::IND_NONFAULTING) {
                    flags |= NodeFlags::EXCEPT;
                }
            }
            Oper::BoundsCheck => flags |= NodeFlags::EXCEPT,
            Oper::Cast if node.flags.contains(NodeFlags::OVERFLOW) => flags |= NodeFlags::EXCEPT,
            Oper::ClsVar => flags |= NodeFlags::GLOB_REF,
            Oper::AllocObj => flags |= NodeFlags::EXCEPT,
            _ => {}
        }
        flags
    }

    /// Recomputes one node's effect flags from its own operator and its
    /// operands' current flags.
    pub fn refresh_effects(&mut self, id: NodeId) {
        let mut effects = self.intrinsic_effects(id);
        for op in self.node(id).operands() {
            effects |= self.node(op).flags & NodeFlags::ALL_EFFECT;
        }
        let node = self.node_mut(id);
        let sticky = node.flags & NodeFlags::ORDER_SIDEEFF;
        node.flags = (node.flags & !NodeFlags::ALL_EFFECT) | effects | sticky;
    }

    /// Recomputes effect flags for a whole tree, bottom-up.
    pub fn update_side_effects(&mut self, root: NodeId) {
        for id in self.execution_order(root) {
            self.refresh_effects(id);
        }
    }

    /// Nodes of a tree in evaluation order (operands before their parent).
    #[must_use]
    pub fn execution_order(&self, root: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![(root, false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                order.push(id);
                continue;
            }
            stack.push((id, true));
            for op in self.node(id).operands().into_iter().rev() {
                stack.push((op, false));
            }
        }
        order
    }

    /// The node whose operand is `target`, searching from `root`.
    #[must_use]
    pub fn find_parent(&self, root: NodeId, target: NodeId) -> Option<NodeId> {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let operands = self.node(id).operands();
            if operands.contains(&target) {
                return Some(id);
            }
            stack.extend(operands);
        }
        None
    }

    /// Replaces `old` by `new` in the statement at `stmt` of `block`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NodeNotFound`] if `old` is not part of the statement.
    pub fn replace_node(
        &mut self,
        block: BlockId,
        stmt: usize,
        old: NodeId,
        new: NodeId,
    ) -> Result<()> {
        let root = self
            .block(block)?
            .statements
            .get(stmt)
            .map(|s| s.root)
            .ok_or(Error::NodeNotFound(old))?;

        if root == old {
            if let Some(statement) = self.block_mut(block)?.statements.get_mut(stmt) {
                statement.root = new;
            }
            return Ok(());
        }

        let parent = self.find_parent(root, old).ok_or(Error::NodeNotFound(old))?;
        if !self.node_mut(parent).replace_operand(old, new) {
            return Err(invariant_error!(
                "parent {} of {} lost its operand during replacement",
                parent,
                old
            ));
        }
        Ok(())
    }

    /// Skips `COMMA` wrappers, returning the node that produces the value.
    #[must_use]
    pub fn effective_val(&self, mut id: NodeId) -> NodeId {
        while self.node(id).oper == Oper::Comma {
            match self.node(id).op2() {
                Some(op2) => id = op2,
                None => break,
            }
        }
        id
    }

    /// Collects the parts of a tree that must still execute if its value is
    /// discarded, joined with `COMMA`s. Returns `None` if nothing remains.
    ///
    /// Only effects in `mask` are kept; pass [`NodeFlags::SIDE_EFFECT`] to keep
    /// every assignment, call and exception.
    pub fn extract_side_effects(&mut self, root: NodeId, mask: NodeFlags) -> Option<NodeId> {
        let mut kept = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = self.node(id);
            if !node.flags.intersects(mask) {
                continue;
            }
            if self.intrinsic_effects(id).intersects(mask) {
                kept.push(id);
            } else {
                stack.extend(node.operands().into_iter().rev());
            }
        }

        let mut list: Option<NodeId> = None;
        for id in kept {
            list = Some(match list {
                None => id,
                Some(prev) => {
                    let comma = self.new_comma(prev, id);
                    self.node_mut(comma).ty = crate::ir::VarType::Void;
                    comma
                }
            });
        }
        list
    }

    /// Every local referenced in a tree, one entry per reference.
    #[must_use]
    pub fn locals_referenced(&self, root: NodeId) -> Vec<LclNum> {
        self.execution_order(root)
            .into_iter()
            .filter_map(|id| {
                let node = self.node(id);
                match node.oper {
                    Oper::LclVar | Oper::LclFld => node.local().map(|l| l.lcl),
                    _ => None,
                }
            })
            .collect()
    }

    /// Single-line textual form of a tree.
    #[must_use]
    pub fn dump_tree(&self, root: NodeId) -> String {
        let mut out = String::new();
        self.dump_into(root, &mut out);
        out
    }

    fn dump_into(&self, id: NodeId, out: &mut String) {
        let node = self.node(id);
        match &node.data {
            NodeData::IntCon(con) => {
                let _ = match con.handle {
                    Some(kind) => write!(out, "CNS_INT({kind}) {:#x}", con.value),
                    None => write!(out, "CNS_INT {}", con.value),
                };
            }
            NodeData::LngCon(value) => {
                let _ = write!(out, "CNS_LNG {value}");
            }
            NodeData::DblCon(value) => {
                let _ = write!(out, "CNS_DBL {value}");
            }
            NodeData::Local(lcl) => {
                let _ = write!(out, "{} {}.{}", node.oper, lcl.lcl, lcl.ssa);
            }
            NodeData::Cast { op, to } => {
                let _ = write!(out, "CAST<{to}>(");
                self.dump_into(*op, out);
                out.push(')');
            }
            NodeData::None | NodeData::ClsVar(_) => out.push_str(node.oper.mnemonic()),
            _ => {
                out.push_str(node.oper.mnemonic());
                out.push('(');
                for (i, op) in node.operands().into_iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.dump_into(op, out);
                }
                out.push(')');
            }
        }
    }
}
