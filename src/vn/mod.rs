//! Value numbers and the oracle interface the assertion engine consumes.
//!
//! A value number (VN) is a canonical identity for a computed value: two
//! expressions with the same VN provably produce the same runtime value.
//! Assertion propagation never computes VNs itself. It asks a
//! [`ValueNumOracle`] whether a VN is a constant, what the constant is,
//! whether it is known non-null, and whether it has the shape of an
//! array-length bound comparison.
//!
//! [`ValueNumStore`] is a map-backed oracle and [`ValueNumbering`] a small
//! SSA-based numberer that fills it for a [`crate::ir::MethodIr`].

mod numbering;
mod store;

use std::fmt;

pub use numbering::ValueNumbering;
pub use store::{VnDef, VnFunc, ValueNumStore};

use crate::ir::{HandleKind, VarType};

/// Canonical identity of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueNum(pub(crate) u32);

impl ValueNum {
    /// No value number assigned.
    pub const NONE: ValueNum = ValueNum(u32::MAX);
    /// The value of a node that produces nothing.
    pub const VOID: ValueNum = ValueNum(0);
    /// The null reference.
    pub const NULL: ValueNum = ValueNum(1);

    /// Returns `true` unless this is [`ValueNum::NONE`].
    #[must_use]
    pub const fn is_known(self) -> bool {
        self.0 != Self::NONE.0
    }

    /// Returns `true` for a known, non-void value number.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.is_known() && self.0 != Self::VOID.0
    }
}

impl fmt::Display for ValueNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::NONE => f.write_str("$none"),
            Self::VOID => f.write_str("$void"),
            Self::NULL => f.write_str("$null"),
            ValueNum(n) => write!(f, "${n:x}"),
        }
    }
}

/// Liberal and conservative value numbers of a node.
///
/// Assertion propagation only reads the conservative number but keeps both
/// in sync when it rewrites a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VnPair {
    /// Value number assuming no interference from other threads.
    pub liberal: ValueNum,
    /// Value number valid under all memory models.
    pub conservative: ValueNum,
}

impl VnPair {
    /// Both halves unknown.
    pub const NONE: VnPair = VnPair::both(ValueNum::NONE);

    /// A pair with the same number in both halves.
    #[must_use]
    pub const fn both(vn: ValueNum) -> Self {
        Self {
            liberal: vn,
            conservative: vn,
        }
    }

    /// The conservative half.
    #[must_use]
    pub const fn conservative(self) -> ValueNum {
        self.conservative
    }

    /// Sets both halves to `vn`.
    pub fn set_both(&mut self, vn: ValueNum) {
        self.liberal = vn;
        self.conservative = vn;
    }
}

impl Default for VnPair {
    fn default() -> Self {
        Self::NONE
    }
}

/// A constant value held by a value number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstValue {
    /// 32-bit integer.
    Int(i32),
    /// 64-bit integer.
    Long(i64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// The null reference.
    Null,
}

impl ConstValue {
    /// The value as a sign-extended integer; floats truncate toward zero.
    #[must_use]
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Int(v) => i64::from(v),
            Self::Long(v) => v,
            Self::Float(v) => v as i64,
            Self::Double(v) => v as i64,
            Self::Null => 0,
        }
    }

    /// The value as a double.
    #[must_use]
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(v) => f64::from(v),
            Self::Long(v) => v as f64,
            Self::Float(v) => f64::from(v),
            Self::Double(v) => v,
            Self::Null => 0.0,
        }
    }

    /// Returns `true` for a floating NaN.
    #[must_use]
    pub fn is_nan(self) -> bool {
        match self {
            Self::Float(v) => v.is_nan(),
            Self::Double(v) => v.is_nan(),
            _ => false,
        }
    }

    /// Static type of the constant.
    #[must_use]
    pub const fn ty(self) -> VarType {
        match self {
            Self::Int(_) => VarType::Int,
            Self::Long(_) => VarType::Long,
            Self::Float(_) => VarType::Float,
            Self::Double(_) => VarType::Double,
            Self::Null => VarType::Ref,
        }
    }
}

/// Facts about value numbers that assertion propagation consumes.
///
/// Equality of two value numbers implies equality of the runtime values;
/// every other question goes through this trait.
pub trait ValueNumOracle {
    /// Returns `true` if `vn` denotes a compile-time constant.
    fn is_constant(&self, vn: ValueNum) -> bool;

    /// Static type of the value, [`VarType::Undef`] if unknown.
    fn type_of(&self, vn: ValueNum) -> VarType;

    /// The constant `vn` denotes.
    fn constant_value(&self, vn: ValueNum) -> Option<ConstValue>;

    /// The handle kind of a constant handle value number.
    fn handle_kind(&self, vn: ValueNum) -> Option<HandleKind>;

    /// Returns `true` if the value can never be null.
    fn is_known_non_null(&self, vn: ValueNum) -> bool;

    /// Returns `true` for `i < a.Length` shaped comparisons.
    fn is_array_len_bound(&self, vn: ValueNum) -> bool;

    /// Returns `true` for `i < a.Length +/- k` shaped comparisons.
    fn is_array_len_arith_bound(&self, vn: ValueNum) -> bool;

    /// The value number of zero of type `ty`, or [`ValueNum::NONE`].
    fn zero_for_type(&self, ty: VarType) -> ValueNum;

    /// The null reference.
    fn null(&self) -> ValueNum {
        ValueNum::NULL
    }

    /// Returns `true` for a constant handle.
    fn is_handle(&self, vn: ValueNum) -> bool {
        self.handle_kind(vn).is_some()
    }

    /// Returns `true` for a NaN floating constant.
    fn is_nan_constant(&self, vn: ValueNum) -> bool {
        self.type_of(vn).is_floating()
            && self.constant_value(vn).is_some_and(ConstValue::is_nan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels() {
        assert!(!ValueNum::NONE.is_known());
        assert!(ValueNum::VOID.is_known());
        assert!(!ValueNum::VOID.is_valid());
        assert!(ValueNum::NULL.is_valid());
        assert_eq!(ValueNum::NULL.to_string(), "$null");
        assert_eq!(ValueNum(0x2a).to_string(), "$2a");
    }

    #[test]
    fn test_const_value_conversions() {
        assert_eq!(ConstValue::Int(-3).as_i64(), -3);
        assert_eq!(ConstValue::Double(2.9).as_i64(), 2);
        assert!(ConstValue::Float(f32::NAN).is_nan());
        assert!(!ConstValue::Long(1).is_nan());
        assert_eq!(ConstValue::Null.ty(), VarType::Ref);
    }
}
