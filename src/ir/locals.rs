//! Local variable descriptors.

use std::fmt;

use crate::{ir::VarType, Error, Result};

/// Local variable slot number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LclNum(pub u32);

impl LclNum {
    /// Slot index into the local table.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for LclNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "V{:02}", self.0)
    }
}

/// SSA version of a local definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SsaNum(pub u32);

impl SsaNum {
    /// Marks a reference that is not in SSA form.
    pub const RESERVED: SsaNum = SsaNum(0);
    /// The implicit definition on method entry.
    pub const FIRST: SsaNum = SsaNum(1);

    /// Returns `true` unless this is [`SsaNum::RESERVED`].
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != Self::RESERVED.0
    }
}

impl fmt::Display for SsaNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

/// Block execution weight; [`BB_UNITY_WEIGHT`] is a block run once per call.
pub type BlockWeight = u64;

/// Weight of a block executed once.
pub const BB_UNITY_WEIGHT: BlockWeight = 100;

/// Multiplier applied to blocks inside a loop.
pub const BB_LOOP_WEIGHT: BlockWeight = 8;

/// Descriptor of one local variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LclVarDsc {
    /// Declared type.
    pub ty: VarType,
    /// Address taken somewhere in the method.
    pub addr_exposed: bool,
    /// Incoming parameter.
    pub is_param: bool,
    /// Parameter passed in a floating register.
    pub is_float_param: bool,
    /// Compiler temporary.
    pub is_temp: bool,
    /// Field of a promoted struct.
    pub is_struct_field: bool,
    /// Temporary introduced by common subexpression elimination.
    pub is_cse: bool,
    /// Must stay on the stack frame.
    pub do_not_enregister: bool,
    /// Live across exception handling or otherwise volatile.
    pub volatile_hint: bool,
    /// Assigned exactly once.
    pub single_def: bool,
    /// Tracked by liveness and SSA.
    pub tracked: bool,
    /// Number of references.
    pub ref_cnt: u32,
    /// Number of references weighted by block weight.
    pub ref_cnt_wtd: BlockWeight,
}

impl LclVarDsc {
    /// A tracked, non-exposed local of the given type.
    #[must_use]
    pub fn new(ty: VarType) -> Self {
        Self {
            ty,
            addr_exposed: false,
            is_param: false,
            is_float_param: false,
            is_temp: false,
            is_struct_field: false,
            is_cse: false,
            do_not_enregister: false,
            volatile_hint: false,
            single_def: false,
            tracked: true,
            ref_cnt: 0,
            ref_cnt_wtd: 0,
        }
    }

    /// Small-typed locals that may hold garbage in their upper bits until loaded.
    #[must_use]
    pub fn normalize_on_load(&self) -> bool {
        self.ty.is_small() && (self.is_param || self.addr_exposed || self.is_struct_field)
    }

    /// Small-typed locals normalized when stored.
    #[must_use]
    pub fn normalize_on_store(&self) -> bool {
        self.ty.is_small() && !self.normalize_on_load()
    }

    /// Locals SSA does not rename.
    #[must_use]
    pub fn excluded_from_ssa(&self) -> bool {
        self.addr_exposed || self.ty == VarType::Struct || !self.tracked
    }

    /// Adds one reference executed with `weight`.
    pub fn inc_ref_cnts(&mut self, weight: BlockWeight) {
        self.ref_cnt = self.ref_cnt.saturating_add(1);
        self.ref_cnt_wtd = self.ref_cnt_wtd.saturating_add(weight);
    }

    /// Removes one reference executed with `weight`.
    pub fn dec_ref_cnts(&mut self, weight: BlockWeight) {
        self.ref_cnt = self.ref_cnt.saturating_sub(1);
        self.ref_cnt_wtd = self.ref_cnt_wtd.saturating_sub(weight);
    }
}

/// The method's locals, indexed by [`LclNum`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalTable {
    locals: Vec<LclVarDsc>,
}

impl LocalTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self { locals: Vec::new() }
    }

    /// Appends a local and returns its slot.
    pub fn push(&mut self, dsc: LclVarDsc) -> LclNum {
        let lcl = LclNum(self.locals.len() as u32);
        self.locals.push(dsc);
        lcl
    }

    /// Number of locals.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locals.len()
    }

    /// Returns `true` if there are no locals.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locals.is_empty()
    }

    /// Descriptor of a local.
    #[must_use]
    pub fn get(&self, lcl: LclNum) -> Option<&LclVarDsc> {
        self.locals.get(lcl.index())
    }

    /// Mutable descriptor of a local.
    pub fn get_mut(&mut self, lcl: LclNum) -> Option<&mut LclVarDsc> {
        self.locals.get_mut(lcl.index())
    }

    /// Descriptor of a local, failing for unknown slots.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LocalNotFound`] if `lcl` is out of range.
    pub fn dsc(&self, lcl: LclNum) -> Result<&LclVarDsc> {
        self.get(lcl).ok_or(Error::LocalNotFound(lcl))
    }

    /// Iterates `(slot, descriptor)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (LclNum, &LclVarDsc)> {
        self.locals
            .iter()
            .enumerate()
            .map(|(i, dsc)| (LclNum(i as u32), dsc))
    }
}
