//! IR expression tree nodes.
//!
//! Trees live in their [`crate::ir::MethodIr`] and reference their operands by
//! [`NodeId`]. A node is an operator ([`Oper`]), a static type, a set of
//! [`NodeFlags`], a value-number pair and operator-specific [`NodeData`].

use std::fmt;

use bitflags::bitflags;
use strum::{EnumCount, EnumIter};

use crate::{
    ir::{LclNum, SsaNum, VarType},
    vn::VnPair,
};

/// Index of a node within its method's tree arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Creates a node id from a raw arena index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Raw arena index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:06}]", self.0)
    }
}

/// Tree operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount)]
pub enum Oper {
    /// 32-bit (or pointer-sized handle) integer constant.
    CnsInt,
    /// 64-bit integer constant.
    CnsLng,
    /// Floating-point constant.
    CnsDbl,
    /// Read or definition of a local variable.
    LclVar,
    /// Read of a field of a local struct.
    LclFld,
    /// Read of a static field.
    ClsVar,
    /// SSA merge of several definitions.
    Phi,
    /// One incoming value of a [`Oper::Phi`].
    PhiArg,
    /// Does nothing.
    Nop,
    /// Object allocation; never yields null.
    AllocObj,
    /// Memory load.
    Ind,
    /// Explicit null check.
    NullCheck,
    /// Array length load.
    ArrLength,
    /// Arithmetic negation.
    Neg,
    /// Bitwise complement.
    Not,
    /// Type conversion.
    Cast,
    /// Conditional branch on a relational operand.
    Jtrue,
    /// Method return.
    Return,
    /// Store into a local.
    Asg,
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Bitwise and.
    And,
    /// Bitwise or.
    Or,
    /// Bitwise exclusive or.
    Xor,
    /// Equality.
    Eq,
    /// Inequality.
    Ne,
    /// Less than.
    Lt,
    /// Less or equal.
    Le,
    /// Greater than.
    Gt,
    /// Greater or equal.
    Ge,
    /// Evaluate `op1` for side effects, yield `op2`.
    Comma,
    /// Array bounds check; throws if the index is out of range.
    BoundsCheck,
    /// Multi-dimensional array element access.
    ArrElem,
    /// Method call.
    Call,
}

impl Oper {
    /// Returns `true` for the relational operators.
    #[must_use]
    pub const fn is_relop(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge
        )
    }

    /// Returns `true` for the constant operators.
    #[must_use]
    pub const fn is_const(self) -> bool {
        matches!(self, Self::CnsInt | Self::CnsLng | Self::CnsDbl)
    }

    /// The relop testing the opposite condition.
    #[must_use]
    pub const fn reverse(self) -> Self {
        match self {
            Self::Eq => Self::Ne,
            Self::Ne => Self::Eq,
            Self::Lt => Self::Ge,
            Self::Ge => Self::Lt,
            Self::Le => Self::Gt,
            Self::Gt => Self::Le,
            other => other,
        }
    }

    /// The relop with its operands swapped.
    #[must_use]
    pub const fn swap(self) -> Self {
        match self {
            Self::Lt => Self::Gt,
            Self::Gt => Self::Lt,
            Self::Le => Self::Ge,
            Self::Ge => Self::Le,
            other => other,
        }
    }

    /// Short mnemonic used in dumps.
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::CnsInt => "CNS_INT",
            Self::CnsLng => "CNS_LNG",
            Self::CnsDbl => "CNS_DBL",
            Self::LclVar => "LCL_VAR",
            Self::LclFld => "LCL_FLD",
            Self::ClsVar => "CLS_VAR",
            Self::Phi => "PHI",
            Self::PhiArg => "PHI_ARG",
            Self::Nop => "NOP",
            Self::AllocObj => "ALLOCOBJ",
            Self::Ind => "IND",
            Self::NullCheck => "NULLCHECK",
            Self::ArrLength => "ARR_LENGTH",
            Self::Neg => "NEG",
            Self::Not => "NOT",
            Self::Cast => "CAST",
            Self::Jtrue => "JTRUE",
            Self::Return => "RETURN",
            Self::Asg => "ASG",
            Self::Add => "ADD",
            Self::Sub => "SUB",
            Self::Mul => "MUL",
            Self::And => "AND",
            Self::Or => "OR",
            Self::Xor => "XOR",
            Self::Eq => "EQ",
            Self::Ne => "NE",
            Self::Lt => "LT",
            Self::Le => "LE",
            Self::Gt => "GT",
            Self::Ge => "GE",
            Self::Comma => "COMMA",
            Self::BoundsCheck => "BOUNDS_CHECK",
            Self::ArrElem => "ARR_ELEM",
            Self::Call => "CALL",
        }
    }
}

impl fmt::Display for Oper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

bitflags! {
    /// Per-node flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct NodeFlags: u32 {
        /// The subtree contains an assignment.
        const ASG = 0x0001;
        /// The subtree contains a call.
        const CALL = 0x0002;
        /// The subtree may throw.
        const EXCEPT = 0x0004;
        /// The subtree references global state.
        const GLOB_REF = 0x0008;
        /// The node must not be reordered past other side effects.
        const ORDER_SIDEEFF = 0x0010;
        /// The local node is the target of an assignment.
        const VAR_DEF = 0x0020;
        /// The node must not be replaced by a CSE.
        const DONT_CSE = 0x0040;
        /// The node is an operand of a conditional colon.
        const COLON_COND = 0x0080;
        /// The cast checks for overflow.
        const OVERFLOW = 0x0100;
        /// The constant is an array index.
        const ARR_INDEX = 0x0200;
        /// The call must null-check its `this` argument.
        const CALL_NULLCHECK = 0x0400;
        /// The comparison is unordered for NaN operands.
        const RELOP_NAN_UN = 0x0800;
        /// The operation is unsigned.
        const UNSIGNED = 0x1000;
        /// The memory access is proven not to fault.
        const IND_NONFAULTING = 0x2000;

        /// Flags that make a subtree unremovable.
        const SIDE_EFFECT = Self::ASG.bits() | Self::CALL.bits() | Self::EXCEPT.bits();
        /// Side effects plus global references.
        const GLOB_EFFECT = Self::SIDE_EFFECT.bits() | Self::GLOB_REF.bits();
        /// Flags that propagate from operands to their parents.
        const ALL_EFFECT = Self::GLOB_EFFECT.bits() | Self::ORDER_SIDEEFF.bits();
    }
}

/// Kind of opaque pointer a handle constant denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum HandleKind {
    /// Class (method table) handle.
    Class,
    /// Method handle.
    Method,
    /// Field handle.
    Field,
    /// Address of a static.
    Static,
    /// String literal handle.
    Str,
    /// Anything else.
    Other,
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Class => "class",
            Self::Method => "method",
            Self::Field => "field",
            Self::Static => "static",
            Self::Str => "str",
            Self::Other => "handle",
        };
        f.write_str(name)
    }
}

/// Runtime helpers the assertion engine knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum HelperFunc {
    /// `isinst` against an interface.
    IsInstanceOfInterface,
    /// `isinst` against an array type.
    IsInstanceOfArray,
    /// `isinst` against a class.
    IsInstanceOfClass,
    /// `isinst` against an arbitrary type.
    IsInstanceOfAny,
    /// `castclass` to an interface.
    ChkCastInterface,
    /// `castclass` to an array type.
    ChkCastArray,
    /// `castclass` to a class.
    ChkCastClass,
    /// `castclass` to an arbitrary type.
    ChkCastAny,
    /// `castclass` fast path for exact classes.
    ChkCastClassSpecial,
    /// Object allocation.
    NewObject,
    /// Any other helper.
    Other,
}

impl HelperFunc {
    /// Returns `true` for the helpers that return null when the test fails.
    #[must_use]
    pub const fn is_type_test(self) -> bool {
        matches!(
            self,
            Self::IsInstanceOfInterface
                | Self::IsInstanceOfArray
                | Self::IsInstanceOfClass
                | Self::IsInstanceOfAny
        )
    }

    /// Returns `true` for any type test or type cast helper.
    #[must_use]
    pub const fn is_type_check(self) -> bool {
        self.is_type_test()
            || matches!(
                self,
                Self::ChkCastInterface
                    | Self::ChkCastArray
                    | Self::ChkCastClass
                    | Self::ChkCastAny
                    | Self::ChkCastClassSpecial
            )
    }
}

/// What a call invokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallTarget {
    /// A user method, identified by an opaque token.
    User(u32),
    /// A runtime helper.
    Helper(HelperFunc),
}

/// Operands and properties of a call node.
///
/// Helper calls receive their arguments in `args` in reverse push order:
/// `args[0]` is the class handle, `args[1]` the object for the type
/// check helpers.
#[derive(Debug, Clone, PartialEq)]
pub struct CallData {
    /// The callee.
    pub target: CallTarget,
    /// The receiver, if any.
    pub this_arg: Option<NodeId>,
    /// Remaining arguments.
    pub args: Vec<NodeId>,
    /// Dispatched through a virtual table.
    pub is_virtual: bool,
    /// Tail call.
    pub is_tail: bool,
}

impl CallData {
    /// The helper this call invokes, if it is a helper call.
    #[must_use]
    pub fn helper(&self) -> Option<HelperFunc> {
        match self.target {
            CallTarget::Helper(helper) => Some(helper),
            CallTarget::User(_) => None,
        }
    }
}

/// Field sequence attached to an integer constant used as an array index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldSeq {
    /// The constant is the index of an array element access.
    ConstantIndex,
}

/// Integer constant payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntCon {
    /// The value, sign-extended.
    pub value: i64,
    /// Set when the constant is an opaque handle.
    pub handle: Option<HandleKind>,
    /// Set when the constant is an array index.
    pub field_seq: Option<FieldSeq>,
}

/// Local variable reference payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LclRef {
    /// The local slot.
    pub lcl: LclNum,
    /// SSA version, [`SsaNum::RESERVED`] outside SSA.
    pub ssa: SsaNum,
}

/// Operator-specific payload of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    /// No payload.
    None,
    /// Integer constant.
    IntCon(IntCon),
    /// Long constant.
    LngCon(i64),
    /// Floating constant.
    DblCon(f64),
    /// Local variable or local field reference.
    Local(LclRef),
    /// Static field reference.
    ClsVar(u32),
    /// One operand.
    Unary(NodeId),
    /// Two operands.
    Binary(NodeId, NodeId),
    /// Conversion of `op` to `to`.
    Cast {
        /// Operand.
        op: NodeId,
        /// Target type.
        to: VarType,
    },
    /// Bounds check of `index` against `length`.
    BoundsCheck {
        /// Index operand.
        index: NodeId,
        /// Length operand.
        length: NodeId,
    },
    /// Array element.
    ArrElem {
        /// Array object.
        array: NodeId,
        /// One index per dimension.
        indices: Vec<NodeId>,
    },
    /// Phi operands.
    Phi(Vec<NodeId>),
    /// Call payload.
    Call(Box<CallData>),
}

/// One IR node.
#[derive(Debug, Clone, PartialEq)]
pub struct GenTree {
    /// The operator.
    pub oper: Oper,
    /// Static type of the produced value.
    pub ty: VarType,
    /// Node flags.
    pub flags: NodeFlags,
    /// Value numbers.
    pub vn: VnPair,
    /// Operands and constants.
    pub data: NodeData,
}

impl GenTree {
    /// Creates a node with no flags and no value numbers.
    #[must_use]
    pub fn new(oper: Oper, ty: VarType, data: NodeData) -> Self {
        Self {
            oper,
            ty,
            flags: NodeFlags::empty(),
            vn: VnPair::NONE,
            data,
        }
    }

    /// Operand ids in evaluation order.
    #[must_use]
    pub fn operands(&self) -> Vec<NodeId> {
        match &self.data {
            NodeData::Unary(op) => vec![*op],
            NodeData::Binary(op1, op2) => {
                // Assignments evaluate the value before the destination.
                if self.oper == Oper::Asg {
                    vec![*op2, *op1]
                } else {
                    vec![*op1, *op2]
                }
            }
            NodeData::Cast { op, .. } => vec![*op],
            NodeData::BoundsCheck { index, length } => vec![*index, *length],
            NodeData::ArrElem { array, indices } => {
                let mut ops = Vec::with_capacity(indices.len() + 1);
                ops.push(*array);
                ops.extend(indices.iter().copied());
                ops
            }
            NodeData::Phi(args) => args.clone(),
            NodeData::Call(call) => {
                let mut ops = Vec::with_capacity(call.args.len() + 1);
                ops.extend(call.this_arg);
                ops.extend(call.args.iter().copied());
                ops
            }
            NodeData::None
            | NodeData::IntCon(_)
            | NodeData::LngCon(_)
            | NodeData::DblCon(_)
            | NodeData::Local(_)
            | NodeData::ClsVar(_) => Vec::new(),
        }
    }

    /// Replaces every operand slot equal to `old` with `new`.
    ///
    /// Returns `true` if a slot was updated.
    pub fn replace_operand(&mut self, old: NodeId, new: NodeId) -> bool {
        let mut replaced = false;
        let mut swap = |slot: &mut NodeId| {
            if *slot == old {
                *slot = new;
                replaced = true;
            }
        };
        match &mut self.data {
            NodeData::Unary(op) | NodeData::Cast { op, .. } => swap(op),
            NodeData::Binary(op1, op2) => {
                swap(op1);
                swap(op2);
            }
            NodeData::BoundsCheck { index, length } => {
                swap(index);
                swap(length);
            }
            NodeData::ArrElem { array, indices } => {
                swap(array);
                indices.iter_mut().for_each(&mut swap);
            }
            NodeData::Phi(args) => args.iter_mut().for_each(&mut swap),
            NodeData::Call(call) => {
                if let Some(this) = call.this_arg.as_mut() {
                    swap(this);
                }
                call.args.iter_mut().for_each(&mut swap);
            }
            NodeData::None
            | NodeData::IntCon(_)
            | NodeData::LngCon(_)
            | NodeData::DblCon(_)
            | NodeData::Local(_)
            | NodeData::ClsVar(_) => {}
        }
        replaced
    }

    /// First operand of a unary or binary node.
    #[must_use]
    pub fn op1(&self) -> Option<NodeId> {
        match &self.data {
            NodeData::Unary(op) | NodeData::Binary(op, _) | NodeData::Cast { op, .. } => Some(*op),
            _ => None,
        }
    }

    /// Second operand of a binary node.
    #[must_use]
    pub fn op2(&self) -> Option<NodeId> {
        match &self.data {
            NodeData::Binary(_, op) => Some(*op),
            _ => None,
        }
    }

    /// The local this node reads or writes.
    #[must_use]
    pub fn local(&self) -> Option<LclRef> {
        match &self.data {
            NodeData::Local(lcl) => Some(*lcl),
            _ => None,
        }
    }

    /// Integer constant payload.
    #[must_use]
    pub fn int_con(&self) -> Option<IntCon> {
        match &self.data {
            NodeData::IntCon(con) if self.oper == Oper::CnsInt => Some(*con),
            _ => None,
        }
    }

    /// Call payload.
    #[must_use]
    pub fn call(&self) -> Option<&CallData> {
        match &self.data {
            NodeData::Call(call) => Some(call),
            _ => None,
        }
    }

    /// Returns `true` for a plain local variable read or definition.
    #[must_use]
    pub fn is_local_var(&self) -> bool {
        self.oper == Oper::LclVar
    }

    /// Returns `true` if the node has any side effect.
    #[must_use]
    pub fn has_side_effects(&self) -> bool {
        self.flags.intersects(NodeFlags::SIDE_EFFECT)
    }

    /// Turns this node into an integer constant in place.
    pub fn become_int_con(&mut self, value: i64, ty: VarType, handle: Option<HandleKind>) {
        self.oper = Oper::CnsInt;
        self.ty = ty;
        self.data = NodeData::IntCon(IntCon {
            value,
            handle,
            field_seq: None,
        });
        self.flags &= !NodeFlags::ALL_EFFECT;
    }

    /// Turns this node into a long constant in place.
    pub fn become_lng_con(&mut self, value: i64) {
        self.oper = Oper::CnsLng;
        self.ty = VarType::Long;
        self.data = NodeData::LngCon(value);
        self.flags &= !NodeFlags::ALL_EFFECT;
    }

    /// Turns this node into a floating constant in place.
    pub fn become_dbl_con(&mut self, value: f64, ty: VarType) {
        self.oper = Oper::CnsDbl;
        self.ty = ty;
        self.data = NodeData::DblCon(value);
        self.flags &= !NodeFlags::ALL_EFFECT;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relop_reverse_and_swap() {
        assert_eq!(Oper::Eq.reverse(), Oper::Ne);
        assert_eq!(Oper::Lt.reverse(), Oper::Ge);
        assert_eq!(Oper::Lt.swap(), Oper::Gt);
        assert_eq!(Oper::Eq.swap(), Oper::Eq);
        assert!(Oper::Ge.is_relop());
        assert!(!Oper::Add.is_relop());
    }

    #[test]
    fn test_asg_operand_order() {
        let asg = GenTree::new(
            Oper::Asg,
            VarType::Int,
            NodeData::Binary(NodeId::new(1), NodeId::new(2)),
        );
        assert_eq!(asg.operands(), vec![NodeId::new(2), NodeId::new(1)]);
    }

    #[test]
    fn test_replace_operand() {
        let mut add = GenTree::new(
            Oper::Add,
            VarType::Int,
            NodeData::Binary(NodeId::new(1), NodeId::new(2)),
        );
        assert!(add.replace_operand(NodeId::new(2), NodeId::new(7)));
        assert_eq!(add.op2(), Some(NodeId::new(7)));
        assert!(!add.replace_operand(NodeId::new(9), NodeId::new(3)));
    }

    #[test]
    fn test_helper_classification() {
        assert!(HelperFunc::IsInstanceOfClass.is_type_test());
        assert!(!HelperFunc::ChkCastClass.is_type_test());
        assert!(HelperFunc::ChkCastClassSpecial.is_type_check());
        assert!(!HelperFunc::NewObject.is_type_check());
    }

    #[test]
    fn test_become_constant_clears_effects() {
        let mut node = GenTree::new(
            Oper::Ind,
            VarType::Int,
            NodeData::Unary(NodeId::new(0)),
        );
        node.flags = NodeFlags::EXCEPT | NodeFlags::GLOB_REF;
        node.become_int_con(5, VarType::Int, None);
        assert_eq!(node.oper, Oper::CnsInt);
        assert!(!node.has_side_effects());
        assert_eq!(node.int_con().map(|c| c.value), Some(5));
    }
}
