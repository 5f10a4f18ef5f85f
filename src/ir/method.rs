//! The per-method IR container.

use std::fmt;

use crate::{
    ir::{
        BasicBlock, BlockId, CallData, GenTree, HandleKind, IntCon, LclNum, LclRef, LocalTable,
        NodeData, NodeFlags, NodeId, Oper, SsaNum, Statement, Target, VarType,
    },
    Error, Result,
};

/// Identifier of a method within a compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(pub u32);

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "M{:04}", self.0)
    }
}

/// A method body: a tree arena, its blocks and its locals.
///
/// Blocks are laid out in program order; a block's fall-through successor is
/// the block with the next index.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodIr {
    /// Identity of the method.
    pub id: MethodId,
    /// Display name.
    pub name: String,
    /// Target the method is compiled for.
    pub target: Target,
    nodes: Vec<GenTree>,
    /// Blocks in program order.
    pub blocks: Vec<BasicBlock>,
    /// Local variable descriptors.
    pub locals: LocalTable,
    /// SSA numbers on local references are valid.
    pub ssa_built: bool,
    /// Local reference counts are maintained.
    pub ref_counted: bool,
    /// Locals are zero-initialized on entry.
    pub init_mem: bool,
}

impl MethodIr {
    /// Creates an empty method.
    #[must_use]
    pub fn new(id: MethodId, name: impl Into<String>, target: Target) -> Self {
        Self {
            id,
            name: name.into(),
            target,
            nodes: Vec::new(),
            blocks: Vec::new(),
            locals: LocalTable::new(),
            ssa_built: false,
            ref_counted: false,
            init_mem: false,
        }
    }

    /// A node by id.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &GenTree {
        &self.nodes[id.0]
    }

    /// A node by id, mutably.
    pub fn node_mut(&mut self, id: NodeId) -> &mut GenTree {
        &mut self.nodes[id.0]
    }

    /// Number of nodes ever allocated, including detached ones.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Adds a node to the arena and computes its effect flags.
    pub fn add_node(&mut self, node: GenTree) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        self.refresh_effects(id);
        id
    }

    /// A block by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BlockNotFound`] for an unknown id.
    pub fn block(&self, id: BlockId) -> Result<&BasicBlock> {
        self.blocks.get(id.0).ok_or(Error::BlockNotFound(id))
    }

    /// A block by id, mutably.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BlockNotFound`] for an unknown id.
    pub fn block_mut(&mut self, id: BlockId) -> Result<&mut BasicBlock> {
        self.blocks.get_mut(id.0).ok_or(Error::BlockNotFound(id))
    }

    /// Number of blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Ids of all blocks in program order.
    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> {
        (0..self.blocks.len()).map(BlockId)
    }

    /// Appends an empty block.
    pub fn add_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len());
        self.blocks.push(BasicBlock::new(id));
        id
    }

    /// Appends a statement to a block.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BlockNotFound`] for an unknown block.
    pub fn append_statement(&mut self, block: BlockId, root: NodeId) -> Result<()> {
        self.block_mut(block)?.statements.push(Statement::new(root));
        Ok(())
    }

    /// Creates an integer constant.
    pub fn new_int_con(&mut self, value: i64, ty: VarType) -> NodeId {
        self.add_node(GenTree::new(
            Oper::CnsInt,
            ty,
            NodeData::IntCon(IntCon {
                value,
                handle: None,
                field_seq: None,
            }),
        ))
    }

    /// Creates a pointer-sized handle constant.
    pub fn new_handle_con(&mut self, value: i64, kind: HandleKind) -> NodeId {
        let ty = if self.target.is_64bit() {
            VarType::Long
        } else {
            VarType::Int
        };
        self.add_node(GenTree::new(
            Oper::CnsInt,
            ty,
            NodeData::IntCon(IntCon {
                value,
                handle: Some(kind),
                field_seq: None,
            }),
        ))
    }

    /// Creates a long constant.
    pub fn new_lng_con(&mut self, value: i64) -> NodeId {
        self.add_node(GenTree::new(
            Oper::CnsLng,
            VarType::Long,
            NodeData::LngCon(value),
        ))
    }

    /// Creates a floating constant.
    pub fn new_dbl_con(&mut self, value: f64, ty: VarType) -> NodeId {
        self.add_node(GenTree::new(Oper::CnsDbl, ty, NodeData::DblCon(value)))
    }

    /// Creates a read of a local; the type is the local's declared type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LocalNotFound`] for an unknown local.
    pub fn new_lcl_var(&mut self, lcl: LclNum, ssa: SsaNum) -> Result<NodeId> {
        let ty = self.locals.dsc(lcl)?.ty;
        Ok(self.add_node(GenTree::new(
            Oper::LclVar,
            ty,
            NodeData::Local(LclRef { lcl, ssa }),
        )))
    }

    /// Creates a unary node.
    pub fn new_unop(&mut self, oper: Oper, ty: VarType, op: NodeId) -> NodeId {
        self.add_node(GenTree::new(oper, ty, NodeData::Unary(op)))
    }

    /// Creates a binary node.
    pub fn new_binop(&mut self, oper: Oper, ty: VarType, op1: NodeId, op2: NodeId) -> NodeId {
        self.add_node(GenTree::new(oper, ty, NodeData::Binary(op1, op2)))
    }

    /// Creates `COMMA(op1, op2)` typed like `op2`.
    pub fn new_comma(&mut self, op1: NodeId, op2: NodeId) -> NodeId {
        let ty = self.node(op2).ty;
        self.new_binop(Oper::Comma, ty, op1, op2)
    }

    /// Creates a conversion of `op` to `to`.
    pub fn new_cast(&mut self, op: NodeId, to: VarType, overflow: bool) -> NodeId {
        let mut node = GenTree::new(Oper::Cast, to.actual(), NodeData::Cast { op, to });
        if overflow {
            node.flags |= NodeFlags::OVERFLOW;
        }
        self.add_node(node)
    }

    /// Creates a bounds check of `index` against `length`.
    pub fn new_bounds_check(&mut self, index: NodeId, length: NodeId) -> NodeId {
        self.add_node(GenTree::new(
            Oper::BoundsCheck,
            VarType::Void,
            NodeData::BoundsCheck { index, length },
        ))
    }

    /// Creates an assignment of `value` to the local node `dst`.
    pub fn new_asg(&mut self, dst: NodeId, value: NodeId) -> NodeId {
        let ty = self.node(dst).ty;
        self.node_mut(dst).flags |= NodeFlags::VAR_DEF;
        self.new_binop(Oper::Asg, ty, dst, value)
    }

    /// Creates a call.
    pub fn new_call(&mut self, ty: VarType, call: CallData) -> NodeId {
        self.add_node(GenTree::new(Oper::Call, ty, NodeData::Call(Box::new(call))))
    }

    /// Creates a no-op.
    pub fn new_nop(&mut self) -> NodeId {
        self.add_node(GenTree::new(Oper::Nop, VarType::Void, NodeData::None))
    }

    /// Adds a new local.
    pub fn grab_temp(&mut self, ty: VarType) -> LclNum {
        let mut dsc = crate::ir::LclVarDsc::new(ty);
        dsc.is_temp = true;
        self.locals.push(dsc)
    }

    /// Recomputes every local's reference counts from the statements.
    pub fn recount_refs(&mut self) {
        let mut counts: Vec<(LclNum, u64)> = Vec::new();
        for block in &self.blocks {
            for stmt in &block.statements {
                for lcl in self.locals_referenced(stmt.root) {
                    counts.push((lcl, block.weight));
                }
            }
        }

        let slots: Vec<LclNum> = self.locals.iter().map(|(lcl, _)| lcl).collect();
        for lcl in slots {
            if let Some(dsc) = self.locals.get_mut(lcl) {
                dsc.ref_cnt = 0;
                dsc.ref_cnt_wtd = 0;
            }
        }
        for (lcl, weight) in counts {
            if let Some(dsc) = self.locals.get_mut(lcl) {
                dsc.inc_ref_cnts(weight);
            }
        }
        self.ref_counted = true;
    }
}
