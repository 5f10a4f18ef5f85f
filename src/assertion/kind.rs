//! The assertion data model.
//!
//! An [`Assertion`] states `op1 kind op2`: a local equals a constant, a local
//! is a copy of another, a local's value lies in a range, an object has a
//! given method table, or a bounds check cannot throw. Operands carry both the
//! local slot and SSA version (used in local mode and for copy implication)
//! and the conservative value number (used for matching in global mode).

use std::fmt;

use strum::EnumIter;

use crate::{
    assertion::PropagationMode,
    ir::{HandleKind, LclNum, SsaNum},
    vn::ValueNum,
};

/// The relation an assertion states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum AssertionKind {
    /// `op1 == op2`.
    Equal,
    /// `op1 != op2`.
    NotEqual,
    /// `op1` lies within the range in `op2`.
    Subrange,
    /// The bounds check in `op1` never throws.
    NoThrow,
}

impl AssertionKind {
    /// Equal for NotEqual and vice versa; the other kinds have no complement.
    #[must_use]
    pub const fn complement(self) -> Option<Self> {
        match self {
            Self::Equal => Some(Self::NotEqual),
            Self::NotEqual => Some(Self::Equal),
            Self::Subrange | Self::NoThrow => None,
        }
    }
}

impl fmt::Display for AssertionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Subrange => "in",
            Self::NoThrow => "no-throw",
        })
    }
}

/// A local variable reference inside an assertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AssertionLocal {
    /// Slot.
    pub lcl: LclNum,
    /// SSA version; [`SsaNum::RESERVED`] in local mode.
    pub ssa: SsaNum,
    /// Conservative value number; [`ValueNum::NONE`] in local mode.
    pub vn: ValueNum,
}

impl AssertionLocal {
    /// Same slot and SSA version.
    #[must_use]
    pub fn same_def(&self, other: &AssertionLocal) -> bool {
        self.lcl == other.lcl && self.ssa == other.ssa
    }
}

impl fmt::Display for AssertionLocal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.lcl, self.ssa)
    }
}

/// Subject of an assertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op1 {
    /// The value of a local.
    LocalVar(AssertionLocal),
    /// The exact method table of the object in a local.
    ExactType(AssertionLocal),
    /// The method table of the object in a local, up to subtyping.
    Subtype(AssertionLocal),
    /// A bounds check of `index` against `length`.
    ArrayBound {
        /// Value number of the index.
        index: ValueNum,
        /// Value number of the length.
        length: ValueNum,
    },
    /// A relop comparing against `a.Length +/- k`.
    ArrayLenOperBound(ValueNum),
    /// A relop comparing against `a.Length`.
    ArrayLenLoopBound(ValueNum),
}

/// Tag of an [`Op1`] without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum Op1Kind {
    /// [`Op1::LocalVar`].
    LocalVar,
    /// [`Op1::ExactType`].
    ExactType,
    /// [`Op1::Subtype`].
    Subtype,
    /// [`Op1::ArrayBound`].
    ArrayBound,
    /// [`Op1::ArrayLenOperBound`].
    ArrayLenOperBound,
    /// [`Op1::ArrayLenLoopBound`].
    ArrayLenLoopBound,
}

impl Op1 {
    /// The tag.
    #[must_use]
    pub const fn kind(&self) -> Op1Kind {
        match self {
            Self::LocalVar(_) => Op1Kind::LocalVar,
            Self::ExactType(_) => Op1Kind::ExactType,
            Self::Subtype(_) => Op1Kind::Subtype,
            Self::ArrayBound { .. } => Op1Kind::ArrayBound,
            Self::ArrayLenOperBound(_) => Op1Kind::ArrayLenOperBound,
            Self::ArrayLenLoopBound(_) => Op1Kind::ArrayLenLoopBound,
        }
    }

    /// The local the subject refers to, if any.
    #[must_use]
    pub const fn local(&self) -> Option<AssertionLocal> {
        match self {
            Self::LocalVar(lcl) | Self::ExactType(lcl) | Self::Subtype(lcl) => Some(*lcl),
            _ => None,
        }
    }

    /// The subject's value number; the length for an array bound.
    #[must_use]
    pub const fn vn(&self) -> ValueNum {
        match self {
            Self::LocalVar(lcl) | Self::ExactType(lcl) | Self::Subtype(lcl) => lcl.vn,
            Self::ArrayBound { length, .. } => *length,
            Self::ArrayLenOperBound(vn) | Self::ArrayLenLoopBound(vn) => *vn,
        }
    }

    /// Returns `true` for the type subjects.
    #[must_use]
    pub const fn is_type(&self) -> bool {
        matches!(self, Self::ExactType(_) | Self::Subtype(_))
    }

    /// Returns `true` for the array-length relop subjects.
    #[must_use]
    pub const fn is_array_len_bound(&self) -> bool {
        matches!(self, Self::ArrayLenOperBound(_) | Self::ArrayLenLoopBound(_))
    }

    fn matches(&self, other: &Op1, mode: PropagationMode) -> bool {
        match (self, other) {
            (Self::LocalVar(a), Self::LocalVar(b))
            | (Self::ExactType(a), Self::ExactType(b))
            | (Self::Subtype(a), Self::Subtype(b)) => match mode {
                PropagationMode::Global => a.vn == b.vn,
                PropagationMode::Local => a.lcl == b.lcl,
            },
            (
                Self::ArrayBound { index, length },
                Self::ArrayBound {
                    index: other_index,
                    length: other_length,
                },
            ) => index == other_index && length == other_length,
            (Self::ArrayLenOperBound(a), Self::ArrayLenOperBound(b))
            | (Self::ArrayLenLoopBound(a), Self::ArrayLenLoopBound(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Op1 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalVar(lcl) => write!(f, "{lcl}"),
            Self::ExactType(lcl) => write!(f, "exact-type({lcl})"),
            Self::Subtype(lcl) => write!(f, "subtype({lcl})"),
            Self::ArrayBound { index, length } => write!(f, "[{index} < {length}]"),
            Self::ArrayLenOperBound(vn) => write!(f, "oper-bound({vn})"),
            Self::ArrayLenLoopBound(vn) => write!(f, "loop-bound({vn})"),
        }
    }
}

/// An integer literal inside an assertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntLiteral {
    /// Sign-extended value.
    pub value: i64,
    /// Handle kind for opaque pointer constants.
    pub handle: Option<HandleKind>,
    /// The literal is really a 64-bit value on a 64-bit target.
    pub is_long: bool,
    /// Conservative value number of the literal node.
    pub vn: ValueNum,
}

impl IntLiteral {
    fn same_value(&self, other: &IntLiteral) -> bool {
        self.value == other.value && self.handle == other.handle && self.is_long == other.is_long
    }
}

impl fmt::Display for IntLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.handle {
            Some(kind) => write!(f, "{kind} {:#x}", self.value),
            None => write!(f, "{}", self.value),
        }
    }
}

/// Object of an assertion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Op2 {
    /// Another local (copy facts).
    LocalVarCopy(AssertionLocal),
    /// A 32-bit or handle constant.
    ConstInt(IntLiteral),
    /// A 64-bit constant.
    ConstLong {
        /// The value.
        value: i64,
        /// Value number of the literal.
        vn: ValueNum,
    },
    /// A floating constant.
    ConstDouble {
        /// The value.
        value: f64,
        /// Value number of the literal.
        vn: ValueNum,
    },
    /// A constant read through one indirection (method table of an object).
    IndirectConstInt(IntLiteral),
    /// An inclusive integer range.
    Subrange {
        /// Lower bound.
        lo: i64,
        /// Upper bound.
        hi: i64,
    },
}

/// Tag of an [`Op2`] without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum Op2Kind {
    /// [`Op2::LocalVarCopy`].
    LocalVarCopy,
    /// [`Op2::ConstInt`].
    ConstInt,
    /// [`Op2::ConstLong`].
    ConstLong,
    /// [`Op2::ConstDouble`].
    ConstDouble,
    /// [`Op2::IndirectConstInt`].
    IndirectConstInt,
    /// [`Op2::Subrange`].
    Subrange,
}

impl Op2 {
    /// The tag.
    #[must_use]
    pub const fn kind(&self) -> Op2Kind {
        match self {
            Self::LocalVarCopy(_) => Op2Kind::LocalVarCopy,
            Self::ConstInt(_) => Op2Kind::ConstInt,
            Self::ConstLong { .. } => Op2Kind::ConstLong,
            Self::ConstDouble { .. } => Op2Kind::ConstDouble,
            Self::IndirectConstInt(_) => Op2Kind::IndirectConstInt,
            Self::Subrange { .. } => Op2Kind::Subrange,
        }
    }

    /// Value number of the object; ranges have none.
    #[must_use]
    pub const fn vn(&self) -> Option<ValueNum> {
        match self {
            Self::LocalVarCopy(lcl) => Some(lcl.vn),
            Self::ConstInt(lit) | Self::IndirectConstInt(lit) => Some(lit.vn),
            Self::ConstLong { vn, .. } | Self::ConstDouble { vn, .. } => Some(*vn),
            Self::Subrange { .. } => None,
        }
    }

    /// The integer literal of [`Op2::ConstInt`] and [`Op2::IndirectConstInt`].
    #[must_use]
    pub const fn int_literal(&self) -> Option<IntLiteral> {
        match self {
            Self::ConstInt(lit) | Self::IndirectConstInt(lit) => Some(*lit),
            _ => None,
        }
    }

    fn matches(&self, other: &Op2, mode: PropagationMode) -> bool {
        match (self, other) {
            (Self::ConstInt(a), Self::ConstInt(b))
            | (Self::IndirectConstInt(a), Self::IndirectConstInt(b)) => a.same_value(b),
            (Self::ConstLong { value: a, .. }, Self::ConstLong { value: b, .. }) => a == b,
            (Self::ConstDouble { value: a, .. }, Self::ConstDouble { value: b, .. }) => {
                a.to_bits() == b.to_bits()
            }
            (Self::LocalVarCopy(a), Self::LocalVarCopy(b)) => match mode {
                PropagationMode::Global => a.vn == b.vn,
                PropagationMode::Local => a.same_def(b),
            },
            (Self::Subrange { lo, hi }, Self::Subrange { lo: lo2, hi: hi2 }) => {
                lo == lo2 && hi == hi2
            }
            _ => false,
        }
    }
}

impl fmt::Display for Op2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalVarCopy(lcl) => write!(f, "{lcl}"),
            Self::ConstInt(lit) => write!(f, "{lit}"),
            Self::ConstLong { value, .. } => write!(f, "{value}L"),
            Self::ConstDouble { value, .. } => write!(f, "{value:?}"),
            Self::IndirectConstInt(lit) => write!(f, "[{lit}]"),
            Self::Subrange { lo, hi } => write!(f, "[{lo}..{hi}]"),
        }
    }
}

/// A fact: `op1 kind op2`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assertion {
    /// The relation.
    pub kind: AssertionKind,
    /// The subject.
    pub op1: Op1,
    /// The object; absent only for [`AssertionKind::NoThrow`].
    pub op2: Option<Op2>,
}

impl Assertion {
    /// Creates an assertion.
    #[must_use]
    pub const fn new(kind: AssertionKind, op1: Op1, op2: Option<Op2>) -> Self {
        Self { kind, op1, op2 }
    }

    /// Tag of the object, if present.
    #[must_use]
    pub fn op2_kind(&self) -> Option<Op2Kind> {
        self.op2.as_ref().map(Op2::kind)
    }

    /// `lcl == lcl2`.
    #[must_use]
    pub fn is_copy(&self) -> bool {
        self.kind == AssertionKind::Equal
            && matches!(self.op1, Op1::LocalVar(_))
            && matches!(self.op2, Some(Op2::LocalVarCopy(_)))
    }

    /// `lcl == int constant`.
    #[must_use]
    pub fn is_local_const_int(&self) -> bool {
        self.kind == AssertionKind::Equal
            && matches!(self.op1, Op1::LocalVar(_))
            && matches!(self.op2, Some(Op2::ConstInt(_)))
    }

    /// `lcl != null` (or any `lcl != int constant` when `value` differs).
    #[must_use]
    pub fn is_local_not_equal_int(&self, value: i64) -> bool {
        self.kind == AssertionKind::NotEqual
            && matches!(self.op1, Op1::LocalVar(_))
            && matches!(self.op2, Some(Op2::ConstInt(lit)) if lit.value == value)
    }

    /// The copy's source, when this is a copy fact.
    #[must_use]
    pub fn copy_source(&self) -> Option<AssertionLocal> {
        match self.op2 {
            Some(Op2::LocalVarCopy(lcl)) => Some(lcl),
            _ => None,
        }
    }

    /// Same relation, subject tag and object tag.
    #[must_use]
    pub fn same_kind(&self, other: &Assertion) -> bool {
        self.kind == other.kind
            && self.op1.kind() == other.op1.kind()
            && self.op2_kind() == other.op2_kind()
    }

    /// Structural equality: by value number in global mode, by slot in local mode.
    #[must_use]
    pub fn equals(&self, other: &Assertion, mode: PropagationMode) -> bool {
        if self.kind != other.kind {
            return false;
        }
        self.same_operands(other, mode)
    }

    /// Opposite Equal/NotEqual relation over the same operands.
    #[must_use]
    pub fn is_complementary(&self, other: &Assertion, mode: PropagationMode) -> bool {
        self.kind.complement() == Some(other.kind) && self.same_operands(other, mode)
    }

    fn same_operands(&self, other: &Assertion, mode: PropagationMode) -> bool {
        if !self.op1.matches(&other.op1, mode) {
            return false;
        }
        match (&self.op2, &other.op2) {
            (None, None) => true,
            (Some(a), Some(b)) => a.matches(b, mode),
            _ => false,
        }
    }

    /// Returns `true` if the stored value numbers are valid for global mode.
    ///
    /// Array bounds carry no local and are exempt.
    #[must_use]
    pub fn has_valid_vns(&self) -> bool {
        if matches!(self.op1, Op1::ArrayBound { .. }) {
            return true;
        }
        let op1_ok = self.op1.vn().is_valid()
            && self.op1.local().map_or(true, |lcl| lcl.ssa.is_valid());
        let op2_ok = self
            .op2
            .as_ref()
            .and_then(Op2::vn)
            .map_or(true, ValueNum::is_valid);
        op1_ok && op2_ok
    }
}

impl fmt::Display for Assertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.op2 {
            Some(op2) => write!(f, "{} {} {}", self.op1, self.kind, op2),
            None => write!(f, "{} {}", self.op1, self.kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(lcl: u32, ssa: u32, vn: u32) -> AssertionLocal {
        AssertionLocal {
            lcl: LclNum(lcl),
            ssa: SsaNum(ssa),
            vn: ValueNum(vn),
        }
    }

    fn int(value: i64, vn: u32) -> Op2 {
        Op2::ConstInt(IntLiteral {
            value,
            handle: None,
            is_long: false,
            vn: ValueNum(vn),
        })
    }

    #[test]
    fn test_display() {
        let a = Assertion::new(
            AssertionKind::Equal,
            Op1::LocalVar(local(3, 2, 10)),
            Some(int(5, 11)),
        );
        assert_eq!(a.to_string(), "V03.02 == 5");

        let range = Assertion::new(
            AssertionKind::Subrange,
            Op1::LocalVar(local(1, 1, 10)),
            Some(Op2::Subrange { lo: 0, hi: 255 }),
        );
        assert_eq!(range.to_string(), "V01.01 in [0..255]");
    }

    #[test]
    fn test_equality_depends_on_mode() {
        let a = Assertion::new(
            AssertionKind::Equal,
            Op1::LocalVar(local(1, 1, 10)),
            Some(int(5, 11)),
        );
        let other_slot_same_vn = Assertion::new(
            AssertionKind::Equal,
            Op1::LocalVar(local(2, 1, 10)),
            Some(int(5, 11)),
        );
        assert!(a.equals(&other_slot_same_vn, PropagationMode::Global));
        assert!(!a.equals(&other_slot_same_vn, PropagationMode::Local));

        let other_value = Assertion::new(
            AssertionKind::Equal,
            Op1::LocalVar(local(1, 1, 10)),
            Some(int(6, 12)),
        );
        assert!(!a.equals(&other_value, PropagationMode::Global));
    }

    #[test]
    fn test_double_compare_is_bitwise() {
        let pos = Assertion::new(
            AssertionKind::Equal,
            Op1::LocalVar(local(1, 1, 10)),
            Some(Op2::ConstDouble {
                value: 0.0,
                vn: ValueNum(20),
            }),
        );
        let neg = Assertion::new(
            AssertionKind::Equal,
            Op1::LocalVar(local(1, 1, 10)),
            Some(Op2::ConstDouble {
                value: -0.0,
                vn: ValueNum(21),
            }),
        );
        assert!(!pos.equals(&neg, PropagationMode::Global));
        assert!(pos.equals(&pos, PropagationMode::Global));
    }

    #[test]
    fn test_complementary() {
        let eq = Assertion::new(
            AssertionKind::Equal,
            Op1::LocalVar(local(1, 1, 10)),
            Some(int(0, 11)),
        );
        let ne = Assertion { kind: AssertionKind::NotEqual, ..eq };
        assert!(eq.is_complementary(&ne, PropagationMode::Global));
        assert!(ne.is_complementary(&eq, PropagationMode::Global));
        assert!(!eq.is_complementary(&eq, PropagationMode::Global));
        assert!(eq.is_local_const_int());
        assert!(ne.is_local_not_equal_int(0));
    }

    #[test]
    fn test_same_kind_and_copy() {
        let copy = Assertion::new(
            AssertionKind::Equal,
            Op1::LocalVar(local(1, 1, 10)),
            Some(Op2::LocalVarCopy(local(2, 1, 10))),
        );
        assert!(copy.is_copy());
        assert_eq!(copy.copy_source().map(|l| l.lcl), Some(LclNum(2)));

        let konst = Assertion::new(
            AssertionKind::Equal,
            Op1::LocalVar(local(1, 1, 10)),
            Some(int(5, 11)),
        );
        assert!(!copy.same_kind(&konst));
        assert!(konst.same_kind(&konst));
    }

    #[test]
    fn test_valid_vns() {
        let bound = Assertion::new(
            AssertionKind::NoThrow,
            Op1::ArrayBound {
                index: ValueNum::NONE,
                length: ValueNum(4),
            },
            None,
        );
        assert!(bound.has_valid_vns());

        let reserved = Assertion::new(
            AssertionKind::NotEqual,
            Op1::LocalVar(local(1, 0, 10)),
            Some(int(0, 1)),
        );
        assert!(!reserved.has_valid_vns());

        let void_op2 = Assertion::new(
            AssertionKind::Equal,
            Op1::LocalVar(local(1, 1, 10)),
            Some(int(0, 0)),
        );
        assert!(!void_op2.has_valid_vns());
    }
}
