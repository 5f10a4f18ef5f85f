//! Builder pattern for programmatic method construction.
//!
//! Tests, benches and examples need methods in SSA form with realistic trees.
//! The builder uses a closure-based API in which every block is defined in a
//! single expression, so the CFG shape is visible at a glance:
//!
//! ```rust,ignore
//! let method = MethodBuilder::new("max").build_with(|f| {
//!     let x = f.param(VarType::Int);
//!
//!     f.block(0, |b| {
//!         let lhs = b.lcl(x, 1);
//!         let five = b.int(5);
//!         let cond = b.eq(lhs, five);
//!         b.branch(cond, 2);
//!     });
//!     f.block(1, |b| b.ret());
//!     f.block(2, |b| b.ret());
//! });
//! ```
//!
//! SSA numbers are given explicitly; the builder does not rename. Blocks may
//! be defined in any order and gaps are filled with empty fall-through blocks.

use crate::ir::{
    BlockFlags, BlockId, BlockWeight, CallData, CallTarget, HandleKind, HelperFunc, JumpKind,
    LclNum, LclRef, LclVarDsc, MethodId, MethodIr, NodeData, NodeFlags, NodeId, Oper, SsaNum,
    Target, VarType,
};

/// Builder for [`MethodIr`].
#[derive(Debug, Clone)]
pub struct MethodBuilder {
    id: MethodId,
    name: String,
    target: Target,
    ssa: bool,
    init_mem: bool,
}

impl MethodBuilder {
    /// A builder for an SSA-form method on the default target.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: MethodId(0),
            name: name.into(),
            target: Target::default(),
            ssa: true,
            init_mem: false,
        }
    }

    /// Sets the method id.
    #[must_use]
    pub fn id(mut self, id: MethodId) -> Self {
        self.id = id;
        self
    }

    /// Sets the target.
    #[must_use]
    pub fn target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    /// Whether the built method is marked as being in SSA form.
    #[must_use]
    pub fn ssa(mut self, ssa: bool) -> Self {
        self.ssa = ssa;
        self
    }

    /// Whether locals are zero-initialized on entry.
    #[must_use]
    pub fn init_mem(mut self, init_mem: bool) -> Self {
        self.init_mem = init_mem;
        self
    }

    /// Builds the method by running `f` against a fresh [`FunctionContext`].
    ///
    /// Predecessors and reference counts are computed once `f` returns.
    pub fn build_with<F>(self, f: F) -> MethodIr
    where
        F: FnOnce(&mut FunctionContext),
    {
        let mut method = MethodIr::new(self.id, self.name, self.target);
        method.init_mem = self.init_mem;
        let mut ctx = FunctionContext { method };
        f(&mut ctx);

        let mut method = ctx.method;
        method.ssa_built = self.ssa;
        method.compute_predecessors();
        method.recount_refs();
        method
    }
}

/// Method-level context handed to [`MethodBuilder::build_with`].
#[derive(Debug)]
pub struct FunctionContext {
    method: MethodIr,
}

impl FunctionContext {
    /// Declares a local.
    pub fn local(&mut self, ty: VarType) -> LclNum {
        self.method.locals.push(LclVarDsc::new(ty))
    }

    /// Declares a parameter.
    pub fn param(&mut self, ty: VarType) -> LclNum {
        let mut dsc = LclVarDsc::new(ty);
        dsc.is_param = true;
        dsc.is_float_param = ty.is_floating();
        self.method.locals.push(dsc)
    }

    /// Declares a local from a full descriptor.
    pub fn local_with(&mut self, dsc: LclVarDsc) -> LclNum {
        self.method.locals.push(dsc)
    }

    /// Adjusts a declared local.
    pub fn configure<F: FnOnce(&mut LclVarDsc)>(&mut self, lcl: LclNum, f: F) {
        if let Some(dsc) = self.method.locals.get_mut(lcl) {
            f(dsc);
        }
    }

    /// Defines the contents of block `index`.
    pub fn block<F>(&mut self, index: usize, f: F) -> BlockId
    where
        F: FnOnce(&mut BlockBuilder<'_>),
    {
        while self.method.block_count() <= index {
            self.method.add_block();
        }
        let id = BlockId::new(index);
        let mut builder = BlockBuilder {
            method: &mut self.method,
            block: id,
        };
        f(&mut builder);
        id
    }

    /// The method built so far.
    #[must_use]
    pub fn method(&self) -> &MethodIr {
        &self.method
    }
}

/// Block-level context: creates trees and appends statements.
#[derive(Debug)]
pub struct BlockBuilder<'a> {
    method: &'a mut MethodIr,
    block: BlockId,
}

impl BlockBuilder<'_> {
    /// Id of the block being built.
    #[must_use]
    pub fn id(&self) -> BlockId {
        self.block
    }

    fn set_jump(&mut self, jump: JumpKind) {
        if let Some(block) = self.method.blocks.get_mut(self.block.index()) {
            block.jump = jump;
        }
    }

    /// Sets the block weight.
    pub fn weight(&mut self, weight: BlockWeight) {
        if let Some(block) = self.method.blocks.get_mut(self.block.index()) {
            block.weight = weight;
        }
    }

    /// Adds block flags.
    pub fn flags(&mut self, flags: BlockFlags) {
        if let Some(block) = self.method.blocks.get_mut(self.block.index()) {
            block.flags |= flags;
        }
    }

    /// Appends a statement.
    pub fn stmt(&mut self, root: NodeId) {
        let _ = self.method.append_statement(self.block, root);
    }

    /// Direct access to the method for shapes the builder does not cover.
    pub fn method(&mut self) -> &mut MethodIr {
        self.method
    }

    /// Sets flags on an already built node.
    pub fn mark(&mut self, node: NodeId, flags: NodeFlags) -> NodeId {
        self.method.node_mut(node).flags |= flags;
        self.method.refresh_effects(node);
        node
    }

    /// `int` constant.
    pub fn int(&mut self, value: i32) -> NodeId {
        self.method.new_int_con(i64::from(value), VarType::Int)
    }

    /// Integer constant of an explicit type.
    pub fn typed_int(&mut self, value: i64, ty: VarType) -> NodeId {
        self.method.new_int_con(value, ty)
    }

    /// `long` constant.
    pub fn long(&mut self, value: i64) -> NodeId {
        self.method.new_lng_con(value)
    }

    /// `double` constant.
    pub fn double(&mut self, value: f64) -> NodeId {
        self.method.new_dbl_con(value, VarType::Double)
    }

    /// The null reference.
    pub fn null(&mut self) -> NodeId {
        self.method.new_int_con(0, VarType::Ref)
    }

    /// Handle constant.
    pub fn handle(&mut self, value: i64, kind: HandleKind) -> NodeId {
        self.method.new_handle_con(value, kind)
    }

    /// Read of `lcl` at SSA version `ssa`.
    pub fn lcl(&mut self, lcl: LclNum, ssa: u32) -> NodeId {
        let ty = self
            .method
            .locals
            .get(lcl)
            .map_or(VarType::Undef, |dsc| dsc.ty);
        self.method.add_node(crate::ir::GenTree::new(
            Oper::LclVar,
            ty,
            NodeData::Local(LclRef {
                lcl,
                ssa: SsaNum(ssa),
            }),
        ))
    }

    /// Statement `lcl.ssa = value`; returns the assignment.
    pub fn def(&mut self, lcl: LclNum, ssa: u32, value: NodeId) -> NodeId {
        let dst = self.lcl(lcl, ssa);
        let asg = self.method.new_asg(dst, value);
        self.stmt(asg);
        asg
    }

    /// Statement `lcl.ssa = PHI(lcl.args...)`.
    pub fn phi(&mut self, lcl: LclNum, ssa: u32, args: &[u32]) -> NodeId {
        let ty = self
            .method
            .locals
            .get(lcl)
            .map_or(VarType::Undef, |dsc| dsc.ty);
        let phi_args: Vec<NodeId> = args
            .iter()
            .map(|&arg| {
                self.method.add_node(crate::ir::GenTree::new(
                    Oper::PhiArg,
                    ty,
                    NodeData::Local(LclRef {
                        lcl,
                        ssa: SsaNum(arg),
                    }),
                ))
            })
            .collect();
        let phi = self
            .method
            .add_node(crate::ir::GenTree::new(Oper::Phi, ty, NodeData::Phi(phi_args)));
        self.def(lcl, ssa, phi)
    }

    /// Binary operator; relops produce `int`, other operators the type of `op1`.
    pub fn binop(&mut self, oper: Oper, op1: NodeId, op2: NodeId) -> NodeId {
        let ty = if oper.is_relop() {
            VarType::Int
        } else {
            self.method.node(op1).ty.actual()
        };
        self.method.new_binop(oper, ty, op1, op2)
    }

    /// `op1 + op2`.
    pub fn add(&mut self, op1: NodeId, op2: NodeId) -> NodeId {
        self.binop(Oper::Add, op1, op2)
    }

    /// `op1 - op2`.
    pub fn sub(&mut self, op1: NodeId, op2: NodeId) -> NodeId {
        self.binop(Oper::Sub, op1, op2)
    }

    /// `op1 == op2`.
    pub fn eq(&mut self, op1: NodeId, op2: NodeId) -> NodeId {
        self.binop(Oper::Eq, op1, op2)
    }

    /// `op1 != op2`.
    pub fn ne(&mut self, op1: NodeId, op2: NodeId) -> NodeId {
        self.binop(Oper::Ne, op1, op2)
    }

    /// `op1 < op2`.
    pub fn lt(&mut self, op1: NodeId, op2: NodeId) -> NodeId {
        self.binop(Oper::Lt, op1, op2)
    }

    /// Memory load of type `ty` from `addr`.
    pub fn ind(&mut self, addr: NodeId, ty: VarType) -> NodeId {
        self.method.new_unop(Oper::Ind, ty, addr)
    }

    /// Load of the field at `offset` from object `obj`.
    pub fn field(&mut self, obj: NodeId, offset: i32, ty: VarType) -> NodeId {
        let off = self.method.new_int_con(i64::from(offset), VarType::Long);
        let addr = self.method.new_binop(Oper::Add, VarType::ByRef, obj, off);
        self.ind(addr, ty)
    }

    /// Explicit null check statement.
    pub fn null_check(&mut self, obj: NodeId) -> NodeId {
        let check = self.method.new_unop(Oper::NullCheck, VarType::Void, obj);
        self.stmt(check);
        check
    }

    /// Array length load.
    pub fn arr_length(&mut self, arr: NodeId) -> NodeId {
        self.method.new_unop(Oper::ArrLength, VarType::Int, arr)
    }

    /// `COMMA(BOUNDS_CHECK(index, ARR_LENGTH(arr)), IND(arr + index))`.
    pub fn index(&mut self, arr_lcl: LclNum, arr_ssa: u32, index: NodeId, ty: VarType) -> NodeId {
        let arr_for_len = self.lcl(arr_lcl, arr_ssa);
        let len = self.arr_length(arr_for_len);
        let idx_for_check = index;
        let check = self.method.new_bounds_check(idx_for_check, len);
        let arr_for_load = self.lcl(arr_lcl, arr_ssa);
        let idx_copy = self.clone_leaf(index);
        let addr = self
            .method
            .new_binop(Oper::Add, VarType::ByRef, arr_for_load, idx_copy);
        let load = self.ind(addr, ty);
        self.method.new_comma(check, load)
    }

    fn clone_leaf(&mut self, node: NodeId) -> NodeId {
        let copy = self.method.node(node).clone();
        self.method.add_node(copy)
    }

    /// Conversion of `op` to `to`.
    pub fn cast(&mut self, op: NodeId, to: VarType) -> NodeId {
        self.method.new_cast(op, to, false)
    }

    /// Checked conversion of `op` to `to`.
    pub fn cast_ovf(&mut self, op: NodeId, to: VarType) -> NodeId {
        self.method.new_cast(op, to, true)
    }

    /// `COMMA(op1, op2)`.
    pub fn comma(&mut self, op1: NodeId, op2: NodeId) -> NodeId {
        self.method.new_comma(op1, op2)
    }

    /// Object allocation.
    pub fn alloc(&mut self) -> NodeId {
        self.method.add_node(crate::ir::GenTree::new(
            Oper::AllocObj,
            VarType::Ref,
            NodeData::None,
        ))
    }

    /// Type check helper call on `obj` against the class handle `class`.
    pub fn helper_call(&mut self, helper: HelperFunc, obj: NodeId, class: NodeId) -> NodeId {
        self.method.new_call(
            VarType::Ref,
            CallData {
                target: CallTarget::Helper(helper),
                this_arg: None,
                args: vec![class, obj],
                is_virtual: false,
                is_tail: false,
            },
        )
    }

    /// Instance call through `this`.
    pub fn call(&mut self, ty: VarType, this: Option<NodeId>, is_virtual: bool) -> NodeId {
        self.method.new_call(
            ty,
            CallData {
                target: CallTarget::User(0x0600_0001),
                this_arg: this,
                args: Vec::new(),
                is_virtual,
                is_tail: false,
            },
        )
    }

    /// Expression statement evaluating `value` for its side effects.
    pub fn eval(&mut self, value: NodeId) -> NodeId {
        self.stmt(value);
        value
    }

    /// Ends the block with `JTRUE(cond)`, jumping to block `dest` when true.
    pub fn branch(&mut self, cond: NodeId, dest: usize) {
        let jtrue = self.method.new_unop(Oper::Jtrue, VarType::Void, cond);
        self.stmt(jtrue);
        self.set_jump(JumpKind::Cond(BlockId::new(dest)));
    }

    /// Ends the block with an unconditional jump to block `dest`.
    pub fn jump(&mut self, dest: usize) {
        self.set_jump(JumpKind::Always(BlockId::new(dest)));
    }

    /// Ends the block with a return.
    pub fn ret(&mut self) {
        self.set_jump(JumpKind::Return);
    }

    /// Ends the block returning `value`.
    pub fn ret_val(&mut self, value: NodeId) {
        let ty = self.method.node(value).ty;
        let ret = self.method.new_unop(Oper::Return, ty, value);
        self.stmt(ret);
        self.set_jump(JumpKind::Return);
    }
}
