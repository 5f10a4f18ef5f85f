//! The assertion table owned by one propagation run.
//!
//! Insertion deduplicates structurally, refuses NaN-involving facts in
//! global mode and silently declines once [`AssertionStore::capacity`] entries
//! are stored. Every stored fact is registered in a dependency index keyed by
//! its subject (slot in local mode, value number in global mode) so that
//! kills and implication lookups never scan the whole table.

use std::collections::HashMap;

use crate::{
    assertion::{
        Assertion, AssertionIndex, AssertionKind, AssertionSet, Op2, PropagationMode,
        MAX_ASSERTION_COUNT,
    },
    ir::LclNum,
    vn::{ValueNum, ValueNumOracle},
};

/// Bounded, deduplicating table of assertions.
#[derive(Debug, Clone)]
pub struct AssertionStore {
    mode: PropagationMode,
    capacity: usize,
    entries: Vec<Assertion>,
    by_local: HashMap<LclNum, AssertionSet>,
    by_vn: HashMap<ValueNum, AssertionSet>,
    overflowed: bool,
}

impl AssertionStore {
    /// Creates an empty table holding at most `capacity` facts (clamped to 64).
    #[must_use]
    pub fn new(mode: PropagationMode, capacity: usize) -> Self {
        Self {
            mode,
            capacity: capacity.min(MAX_ASSERTION_COUNT),
            entries: Vec::new(),
            by_local: HashMap::new(),
            by_vn: HashMap::new(),
            overflowed: false,
        }
    }

    /// The comparison mode.
    #[must_use]
    pub const fn mode(&self) -> PropagationMode {
        self.mode
    }

    /// Maximum number of entries.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of stored facts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if an insertion was ever declined for lack of space.
    #[must_use]
    pub const fn overflowed(&self) -> bool {
        self.overflowed
    }

    /// The fact at `index`.
    #[must_use]
    pub fn get(&self, index: AssertionIndex) -> Option<&Assertion> {
        index
            .get()
            .checked_sub(1)
            .and_then(|slot| self.entries.get(slot))
    }

    /// `(index, fact)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (AssertionIndex, &Assertion)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, a)| (AssertionIndex::new(i + 1), a))
    }

    /// Every stored index.
    #[must_use]
    pub fn all(&self) -> AssertionSet {
        (1..=self.entries.len()).map(AssertionIndex::new).collect()
    }

    /// Forgets every fact.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.by_local.clear();
        self.by_vn.clear();
        self.overflowed = false;
    }

    /// Stores `assertion`, returning its index.
    ///
    /// An existing structurally equal fact is returned instead of a new slot.
    /// Returns [`AssertionIndex::NONE`] when the fact involves a NaN constant
    /// in global mode or the table is full.
    pub fn add(&mut self, assertion: Assertion, vns: &dyn ValueNumOracle) -> AssertionIndex {
        if self.involves_nan(&assertion, vns) {
            return AssertionIndex::NONE;
        }

        if let Some((index, _)) = self
            .iter()
            .find(|(_, existing)| existing.equals(&assertion, self.mode))
        {
            return index;
        }

        if self.entries.len() >= self.capacity {
            self.overflowed = true;
            return AssertionIndex::NONE;
        }

        self.entries.push(assertion);
        let index = AssertionIndex::new(self.entries.len());
        self.register_dependents(&assertion, index);
        index
    }

    fn involves_nan(&self, assertion: &Assertion, vns: &dyn ValueNumOracle) -> bool {
        if self.mode == PropagationMode::Local {
            return false;
        }
        let op2_vn = assertion.op2.as_ref().and_then(Op2::vn);
        [Some(assertion.op1.vn()), op2_vn]
            .into_iter()
            .flatten()
            .any(|vn| vns.is_constant(vn) && vns.is_nan_constant(vn))
    }

    fn register_dependents(&mut self, assertion: &Assertion, index: AssertionIndex) {
        let bit = AssertionSet::single(index);
        match self.mode {
            PropagationMode::Local => {
                if let Some(lcl) = assertion.op1.local() {
                    *self.by_local.entry(lcl.lcl).or_default() |= bit;
                }
                if let Some(src) = assertion.copy_source() {
                    *self.by_local.entry(src.lcl).or_default() |= bit;
                }
            }
            PropagationMode::Global => {
                *self.by_vn.entry(assertion.op1.vn()).or_default() |= bit;
                if let Some(src) = assertion.copy_source() {
                    *self.by_vn.entry(src.vn).or_default() |= bit;
                }
            }
        }
    }

    /// Facts whose subject (or copy source) is `lcl`.
    #[must_use]
    pub fn dependents_of_local(&self, lcl: LclNum) -> AssertionSet {
        self.by_local.get(&lcl).copied().unwrap_or_default()
    }

    /// Facts whose subject (or copy source) has value number `vn`.
    #[must_use]
    pub fn vn_mapped(&self, vn: ValueNum) -> AssertionSet {
        self.by_vn.get(&vn).copied().unwrap_or_default()
    }

    /// The stored fact stating the opposite Equal/NotEqual relation of `index`.
    #[must_use]
    pub fn find_complementary(&self, index: AssertionIndex) -> AssertionIndex {
        let Some(input) = self.get(index) else {
            return AssertionIndex::NONE;
        };
        if !matches!(input.kind, AssertionKind::Equal | AssertionKind::NotEqual) {
            return AssertionIndex::NONE;
        }
        self.iter()
            .find(|(_, candidate)| candidate.is_complementary(input, self.mode))
            .map_or(AssertionIndex::NONE, |(i, _)| i)
    }

    /// Multi-line listing of the table.
    #[must_use]
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for (index, assertion) in self.iter() {
            out.push_str(&format!("{index} {assertion}\n"));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assertion::{AssertionLocal, IntLiteral, Op1},
        ir::SsaNum,
        vn::ValueNumStore,
    };

    fn local(lcl: u32, vn: ValueNum) -> AssertionLocal {
        AssertionLocal {
            lcl: LclNum(lcl),
            ssa: SsaNum(1),
            vn,
        }
    }

    fn eq_const(lcl: u32, subject: ValueNum, value: i64, vn: ValueNum) -> Assertion {
        Assertion::new(
            AssertionKind::Equal,
            Op1::LocalVar(local(lcl, subject)),
            Some(Op2::ConstInt(IntLiteral {
                value,
                handle: None,
                is_long: false,
                vn,
            })),
        )
    }

    #[test]
    fn test_dedup_returns_existing_index() {
        let mut vns = ValueNumStore::new();
        let x = vns.new_opaque(crate::ir::VarType::Int, false);
        let five = vns.vn_for_int(5);
        let mut store = AssertionStore::new(PropagationMode::Global, 64);

        let a = store.add(eq_const(1, x, 5, five), &vns);
        let b = store.add(eq_const(1, x, 5, five), &vns);
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
        assert!(store.vn_mapped(x).contains(a));
    }

    #[test]
    fn test_capacity_exhaustion() {
        let mut vns = ValueNumStore::new();
        let x = vns.new_opaque(crate::ir::VarType::Int, false);
        let mut store = AssertionStore::new(PropagationMode::Global, 64);

        for k in 0..64 {
            let vn = vns.vn_for_int(k);
            assert!(store.add(eq_const(1, x, i64::from(k), vn), &vns).is_some());
        }
        let vn = vns.vn_for_int(64);
        assert!(store.add(eq_const(1, x, 64, vn), &vns).is_none());
        assert!(store.overflowed());
        assert_eq!(store.len(), 64);

        // Existing facts are still found when full.
        let vn = vns.vn_for_int(3);
        assert_eq!(store.add(eq_const(1, x, 3, vn), &vns).get(), 4);
    }

    #[test]
    fn test_nan_rejected_in_global_mode() {
        let mut vns = ValueNumStore::new();
        let x = vns.new_opaque(crate::ir::VarType::Double, false);
        let nan = vns.vn_for_double(f64::NAN);
        let fact = Assertion::new(
            AssertionKind::Equal,
            Op1::LocalVar(local(1, x)),
            Some(Op2::ConstDouble {
                value: f64::NAN,
                vn: nan,
            }),
        );
        let mut global = AssertionStore::new(PropagationMode::Global, 64);
        assert!(global.add(fact, &vns).is_none());

        let mut local_store = AssertionStore::new(PropagationMode::Local, 64);
        assert!(local_store.add(fact, &vns).is_some());
    }

    #[test]
    fn test_local_dependents_include_copy_source() {
        let vns = ValueNumStore::new();
        let mut store = AssertionStore::new(PropagationMode::Local, 64);
        let copy = Assertion::new(
            AssertionKind::Equal,
            Op1::LocalVar(local(1, ValueNum::NONE)),
            Some(Op2::LocalVarCopy(local(2, ValueNum::NONE))),
        );
        let index = store.add(copy, &vns);
        assert!(store.dependents_of_local(LclNum(1)).contains(index));
        assert!(store.dependents_of_local(LclNum(2)).contains(index));
        assert!(store.dependents_of_local(LclNum(3)).is_empty());
    }

    #[test]
    fn test_find_complementary() {
        let mut vns = ValueNumStore::new();
        let x = vns.new_opaque(crate::ir::VarType::Int, false);
        let zero = vns.vn_for_int(0);
        let mut store = AssertionStore::new(PropagationMode::Global, 64);

        let eq = store.add(eq_const(1, x, 0, zero), &vns);
        assert!(store.find_complementary(eq).is_none());

        let ne = store.add(
            Assertion {
                kind: AssertionKind::NotEqual,
                ..eq_const(1, x, 0, zero)
            },
            &vns,
        );
        assert_eq!(store.find_complementary(eq), ne);
        assert_eq!(store.find_complementary(ne), eq);
        assert!(store.find_complementary(AssertionIndex::NONE).is_none());
    }

    #[test]
    fn test_reset() {
        let mut vns = ValueNumStore::new();
        let x = vns.new_opaque(crate::ir::VarType::Int, false);
        let one = vns.vn_for_int(1);
        let mut store = AssertionStore::new(PropagationMode::Global, 8);
        store.add(eq_const(1, x, 1, one), &vns);
        store.reset();
        assert!(store.is_empty());
        assert!(store.vn_mapped(x).is_empty());
        assert_eq!(store.capacity(), 8);
    }
}
