//! Hash-consed value number storage.

use std::collections::HashMap;

use crate::{
    ir::{HandleKind, Oper, VarType},
    vn::{ConstValue, ValueNum, ValueNumOracle},
};

/// Functions applied to value numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VnFunc {
    /// A tree operator applied to its operands' value numbers.
    Oper(Oper),
    /// Length of the array value.
    ArrLength,
    /// Conversion to the given type.
    Cast(VarType),
}

/// Definition of a value number.
#[derive(Debug, Clone, PartialEq)]
pub enum VnDef {
    /// No value.
    Void,
    /// A compile-time constant.
    Constant {
        /// The constant.
        value: ConstValue,
        /// Set for opaque handles.
        handle: Option<HandleKind>,
    },
    /// A function of other value numbers.
    Func {
        /// The function.
        func: VnFunc,
        /// Result type.
        ty: VarType,
        /// Arguments.
        args: Vec<ValueNum>,
    },
    /// A value about which nothing is known except its type.
    Opaque {
        /// Static type.
        ty: VarType,
        /// Never null (allocations, `this` of instance methods).
        non_null: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ConstKey {
    ty: VarType,
    bits: u64,
    handle: Option<HandleKind>,
}

impl ConstKey {
    fn new(value: ConstValue, handle: Option<HandleKind>) -> Self {
        let bits = match value {
            ConstValue::Int(v) => v as u32 as u64,
            ConstValue::Long(v) => v as u64,
            ConstValue::Float(v) => u64::from(v.to_bits()),
            ConstValue::Double(v) => v.to_bits(),
            ConstValue::Null => 0,
        };
        Self {
            ty: value.ty(),
            bits,
            handle,
        }
    }
}

/// Map-backed [`ValueNumOracle`].
///
/// Constants and function applications are hash-consed, so equal inputs
/// always produce the same [`ValueNum`]. Opaque values are always fresh.
#[derive(Debug, Clone)]
pub struct ValueNumStore {
    defs: Vec<VnDef>,
    constants: HashMap<ConstKey, ValueNum>,
    funcs: HashMap<(VnFunc, VarType, Vec<ValueNum>), ValueNum>,
}

impl Default for ValueNumStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueNumStore {
    /// Creates a store holding the reserved numbers and the zero constants.
    #[must_use]
    pub fn new() -> Self {
        let mut store = Self {
            defs: vec![
                VnDef::Void,
                VnDef::Constant {
                    value: ConstValue::Null,
                    handle: None,
                },
            ],
            constants: HashMap::new(),
            funcs: HashMap::new(),
        };
        store
            .constants
            .insert(ConstKey::new(ConstValue::Null, None), ValueNum::NULL);
        store.vn_for_int(0);
        store.vn_for_long(0);
        store.vn_for_float(0.0);
        store.vn_for_double(0.0);
        store
    }

    /// Number of value numbers allocated, including the reserved ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.defs.len()
    }

    /// Always `false`; the reserved numbers exist from construction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Definition of a value number.
    #[must_use]
    pub fn def(&self, vn: ValueNum) -> Option<&VnDef> {
        self.defs.get(vn.0 as usize)
    }

    fn push(&mut self, def: VnDef) -> ValueNum {
        let vn = ValueNum(self.defs.len() as u32);
        self.defs.push(def);
        vn
    }

    /// Value number of a constant.
    pub fn vn_for_const(&mut self, value: ConstValue, handle: Option<HandleKind>) -> ValueNum {
        let key = ConstKey::new(value, handle);
        if let Some(&vn) = self.constants.get(&key) {
            return vn;
        }
        let vn = self.push(VnDef::Constant { value, handle });
        self.constants.insert(key, vn);
        vn
    }

    /// Value number of a 32-bit integer.
    pub fn vn_for_int(&mut self, value: i32) -> ValueNum {
        self.vn_for_const(ConstValue::Int(value), None)
    }

    /// Value number of a 64-bit integer.
    pub fn vn_for_long(&mut self, value: i64) -> ValueNum {
        self.vn_for_const(ConstValue::Long(value), None)
    }

    /// Value number of a 32-bit float.
    pub fn vn_for_float(&mut self, value: f32) -> ValueNum {
        self.vn_for_const(ConstValue::Float(value), None)
    }

    /// Value number of a 64-bit float.
    pub fn vn_for_double(&mut self, value: f64) -> ValueNum {
        self.vn_for_const(ConstValue::Double(value), None)
    }

    /// Value number of a handle constant of pointer width.
    pub fn vn_for_handle(&mut self, value: i64, kind: HandleKind, is_64bit: bool) -> ValueNum {
        let value = if is_64bit {
            ConstValue::Long(value)
        } else {
            ConstValue::Int(value as i32)
        };
        self.vn_for_const(value, Some(kind))
    }

    /// Value number of `func(args)`.
    pub fn vn_for_func(&mut self, func: VnFunc, ty: VarType, args: Vec<ValueNum>) -> ValueNum {
        let key = (func, ty, args);
        if let Some(&vn) = self.funcs.get(&key) {
            return vn;
        }
        let (func, ty, args) = key;
        let vn = self.push(VnDef::Func {
            func,
            ty,
            args: args.clone(),
        });
        self.funcs.insert((func, ty, args), vn);
        vn
    }

    /// A fresh value number equal to nothing else.
    pub fn new_opaque(&mut self, ty: VarType, non_null: bool) -> ValueNum {
        self.push(VnDef::Opaque { ty, non_null })
    }

    fn is_arr_length(&self, vn: ValueNum) -> bool {
        matches!(
            self.def(vn),
            Some(VnDef::Func {
                func: VnFunc::ArrLength,
                ..
            })
        )
    }

    fn is_arr_length_arith(&self, vn: ValueNum) -> bool {
        match self.def(vn) {
            Some(VnDef::Func {
                func: VnFunc::Oper(Oper::Add | Oper::Sub),
                args,
                ..
            }) => args.iter().any(|&arg| self.is_arr_length(arg)),
            _ => false,
        }
    }

    fn bound_relop_args(&self, vn: ValueNum) -> Option<&[ValueNum]> {
        match self.def(vn) {
            Some(VnDef::Func {
                func: VnFunc::Oper(Oper::Lt | Oper::Le | Oper::Gt | Oper::Ge),
                args,
                ..
            }) => Some(args),
            _ => None,
        }
    }
}

impl ValueNumOracle for ValueNumStore {
    fn is_constant(&self, vn: ValueNum) -> bool {
        matches!(self.def(vn), Some(VnDef::Constant { .. }))
    }

    fn type_of(&self, vn: ValueNum) -> VarType {
        match self.def(vn) {
            Some(VnDef::Void) => VarType::Void,
            Some(VnDef::Constant { value, .. }) => value.ty(),
            Some(VnDef::Func { ty, .. } | VnDef::Opaque { ty, .. }) => *ty,
            None => VarType::Undef,
        }
    }

    fn constant_value(&self, vn: ValueNum) -> Option<ConstValue> {
        match self.def(vn) {
            Some(VnDef::Constant { value, .. }) => Some(*value),
            _ => None,
        }
    }

    fn handle_kind(&self, vn: ValueNum) -> Option<HandleKind> {
        match self.def(vn) {
            Some(VnDef::Constant { handle, .. }) => *handle,
            _ => None,
        }
    }

    fn is_known_non_null(&self, vn: ValueNum) -> bool {
        match self.def(vn) {
            Some(VnDef::Opaque { non_null, .. }) => *non_null,
            Some(VnDef::Constant {
                handle: Some(HandleKind::Str),
                ..
            }) => true,
            _ => false,
        }
    }

    fn is_array_len_bound(&self, vn: ValueNum) -> bool {
        self.bound_relop_args(vn)
            .is_some_and(|args| args.iter().any(|&arg| self.is_arr_length(arg)))
    }

    fn is_array_len_arith_bound(&self, vn: ValueNum) -> bool {
        self.bound_relop_args(vn)
            .is_some_and(|args| args.iter().any(|&arg| self.is_arr_length_arith(arg)))
    }

    fn zero_for_type(&self, ty: VarType) -> ValueNum {
        let zero = match ty.actual() {
            VarType::Int => ConstValue::Int(0),
            VarType::Long => ConstValue::Long(0),
            VarType::Float => ConstValue::Float(0.0),
            VarType::Double => ConstValue::Double(0.0),
            VarType::Ref => return ValueNum::NULL,
            _ => return ValueNum::NONE,
        };
        self.constants
            .get(&ConstKey::new(zero, None))
            .copied()
            .unwrap_or(ValueNum::NONE)
    }
}
