//! Facts that follow from other facts.
//!
//! Implication never inserts into the table; it only selects existing entries
//! that must also hold. Three rules are supported:
//!
//! - copy-transitive: `a == b` and a fact about `b` give the matching fact
//!   about `a` (`a == b ∧ b ∈ [0..10] ⇒ a ∈ [0..10]`, `a == b ∧ b == c ⇒ a == c`)
//! - constant-transitive: `x == k` gives every stored range containing `k`
//!   and every stored `x != j` with `j != k`
//! - type implies non-null: a successful type test on `obj` gives `obj != null`

use crate::assertion::{
    Assertion, AssertionEngine, AssertionIndex, AssertionKind, AssertionLocal, AssertionSet, Op1,
    Op2, PropagationMode,
};

impl AssertionEngine<'_> {
    /// Facts implied by the fact at `index` given the `active` set.
    ///
    /// With a non-empty active set only copy-transitive implication is tried
    /// against the active facts sharing a value number with `index`; with an
    /// empty set a constant fact yields its constant-transitive closure.
    /// Always empty in local mode.
    #[must_use]
    pub fn implied(&self, index: AssertionIndex, active: AssertionSet) -> AssertionSet {
        if self.mode() != PropagationMode::Global {
            return AssertionSet::EMPTY;
        }
        let Some(current) = self.store.get(index) else {
            return AssertionSet::EMPTY;
        };

        if !active.is_empty() {
            let mut candidates = self.store.vn_mapped(current.op1.vn());
            if let Some(source) = current.copy_source() {
                candidates |= self.store.vn_mapped(source.vn);
            }
            candidates &= active;

            let mut result = AssertionSet::EMPTY;
            for check in candidates.without(index) {
                let Some(other) = self.store.get(check) else {
                    continue;
                };
                if current.is_copy() {
                    result |= self.implied_by_copy(index, check);
                } else if other.is_copy() {
                    result |= self.implied_by_copy(check, index);
                }
            }
            return result;
        }

        if current.is_local_const_int() {
            return self.implied_by_const(index);
        }
        AssertionSet::EMPTY
    }

    /// Stored facts about `x` that follow from `x == k` at `index`.
    #[must_use]
    pub fn implied_by_const(&self, index: AssertionIndex) -> AssertionSet {
        let Some(konst) = self.store.get(index) else {
            return AssertionSet::EMPTY;
        };
        let Some(k) = const_int_value(konst) else {
            return AssertionSet::EMPTY;
        };
        let subject = konst.op1.vn();

        let mut result = AssertionSet::EMPTY;
        for check in self.store.vn_mapped(subject).without(index) {
            let Some(candidate) = self.store.get(check) else {
                continue;
            };
            if !matches!(candidate.op1, Op1::LocalVar(lcl) if lcl.vn == subject) {
                continue;
            }
            let usable = match candidate.op2 {
                Some(Op2::Subrange { lo, hi }) => (lo..=hi).contains(&k),
                Some(Op2::ConstInt(lit)) => match candidate.kind {
                    AssertionKind::Equal => lit.value == k,
                    AssertionKind::NotEqual => lit.value != k,
                    _ => false,
                },
                _ => false,
            };
            if usable {
                result.insert(check);
            }
        }
        result
    }

    /// Stored facts that follow from the copy at `copy_index` and the fact at
    /// `dep_index`, which mentions one side of the copy.
    ///
    /// Sides are matched by slot and SSA version since global facts carry no
    /// kill information.
    #[must_use]
    pub fn implied_by_copy(
        &self,
        copy_index: AssertionIndex,
        dep_index: AssertionIndex,
    ) -> AssertionSet {
        let (Some(copy), Some(dep)) = (self.store.get(copy_index), self.store.get(dep_index))
        else {
            return AssertionSet::EMPTY;
        };
        let (Some(dst), Some(src)) = (copy.op1.local(), copy.copy_source()) else {
            return AssertionSet::EMPTY;
        };
        let Some(dep_subject) = dep.op1.local() else {
            return AssertionSet::EMPTY;
        };
        let dep_source = dep.copy_source();

        let other_side = |lcl: &AssertionLocal| {
            if lcl.same_def(&dst) {
                Some(src)
            } else if lcl.same_def(&src) {
                Some(dst)
            } else {
                None
            }
        };

        // The copy side the implied fact must be about.
        let copy_side = other_side(&dep_subject)
            .or_else(|| dep_source.and_then(|source| other_side(&source)));
        let Some(copy_side) = copy_side else {
            return AssertionSet::EMPTY;
        };
        if !copy_side.ssa.is_valid() {
            return AssertionSet::EMPTY;
        }

        // For a copy dependency, the local on its far side.
        let dep_far = match dep_source {
            Some(dep_src) => {
                let far = if other_side(&dep_subject).is_some() {
                    dep_src
                } else {
                    dep_subject
                };
                if !far.ssa.is_valid() {
                    return AssertionSet::EMPTY;
                }
                Some(far)
            }
            None => None,
        };

        let dep_is_const = dep.is_local_const_int();
        let mut result = AssertionSet::EMPTY;
        for (imp_index, imp) in self.store.iter() {
            if imp_index == copy_index || imp_index == dep_index || !dep.same_kind(imp) {
                continue;
            }
            let op1_matches = imp.op1.local().is_some_and(|l| l.same_def(&copy_side));
            let usable = match (imp.op2, dep.op2) {
                (Some(Op2::Subrange { lo, hi }), Some(Op2::Subrange { lo: dlo, hi: dhi })) => {
                    op1_matches && lo <= dlo && hi >= dhi
                }
                (Some(Op2::ConstLong { value, .. }), Some(Op2::ConstLong { value: dv, .. })) => {
                    op1_matches && value == dv
                }
                (
                    Some(Op2::ConstDouble { value, .. }),
                    Some(Op2::ConstDouble { value: dv, .. }),
                ) => op1_matches && value.to_bits() == dv.to_bits(),
                (Some(Op2::ConstInt(lit)), Some(Op2::ConstInt(dlit)))
                | (Some(Op2::IndirectConstInt(lit)), Some(Op2::IndirectConstInt(dlit))) => {
                    op1_matches && lit.value == dlit.value
                }
                (Some(Op2::LocalVarCopy(imp_src)), Some(Op2::LocalVarCopy(_))) => {
                    dep_far.is_some_and(|far| {
                        let imp_dst = imp.op1.local();
                        (op1_matches && imp_src.same_def(&far))
                            || (imp_src.same_def(&copy_side)
                                && imp_dst.is_some_and(|d| d.same_def(&far)))
                    })
                }
                _ => false,
            };

            if usable {
                result.insert(imp_index);
                if dep_is_const {
                    result |= self.implied_by_const(imp_index);
                }
            }
        }
        result
    }

    /// `obj != null` facts implied by the active type facts about `obj`.
    ///
    /// At most one non-null fact is selected per type fact.
    #[must_use]
    pub fn implied_by_type_of(&self, active: AssertionSet) -> AssertionSet {
        let mut result = AssertionSet::EMPTY;
        for check in active {
            let Some(type_fact) = self.store.get(check) else {
                continue;
            };
            if type_fact.kind != AssertionKind::Equal || !type_fact.op1.is_type() {
                continue;
            }
            let subject = type_fact.op1.vn();
            let non_null = self.store.iter().find(|(index, candidate)| {
                *index != check
                    && candidate.kind == AssertionKind::NotEqual
                    && matches!(candidate.op1, Op1::LocalVar(_))
                    && matches!(candidate.op2, Some(Op2::ConstInt(_)))
                    && candidate.op1.vn() == subject
            });
            if let Some((index, _)) = non_null {
                result.insert(index);
            }
        }
        result
    }
}

fn const_int_value(assertion: &Assertion) -> Option<i64> {
    if !assertion.is_local_const_int() {
        return None;
    }
    assertion.op2.and_then(|op2| op2.int_literal()).map(|lit| lit.value)
}
