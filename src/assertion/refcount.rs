//! Deferred local reference-count adjustments.
//!
//! Rewrites record how many references to which locals they removed or added
//! instead of touching the local table directly; the ledger is applied once
//! the rewrite has been linked into its statement.

use crate::ir::{BlockWeight, LclNum, MethodIr, NodeId};

/// `(local, delta)` entries produced by one rewrite.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefCountLedger {
    entries: Vec<(LclNum, i32)>,
}

impl RefCountLedger {
    /// An empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one removed reference to `lcl`.
    pub fn decrement(&mut self, lcl: LclNum) {
        self.entries.push((lcl, -1));
    }

    /// Records one added reference to `lcl`.
    pub fn increment(&mut self, lcl: LclNum) {
        self.entries.push((lcl, 1));
    }

    /// Records the removal of every local referenced under `root`.
    pub fn decrement_tree(&mut self, method: &MethodIr, root: NodeId) {
        for lcl in method.locals_referenced(root) {
            self.decrement(lcl);
        }
    }

    /// Records the addition of every local referenced under `root`.
    pub fn increment_tree(&mut self, method: &MethodIr, root: NodeId) {
        for lcl in method.locals_referenced(root) {
            self.increment(lcl);
        }
    }

    /// Appends the entries of `other`.
    pub fn merge(&mut self, other: RefCountLedger) {
        self.entries.extend(other.entries);
    }

    /// Returns `true` if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Recorded entries in order.
    #[must_use]
    pub fn entries(&self) -> &[(LclNum, i32)] {
        &self.entries
    }

    /// Net change for `lcl`.
    #[must_use]
    pub fn net(&self, lcl: LclNum) -> i32 {
        self.entries
            .iter()
            .filter(|(l, _)| *l == lcl)
            .map(|(_, d)| d)
            .sum()
    }

    /// Applies every entry with the given block weight.
    ///
    /// Unknown locals are ignored.
    pub fn apply(&self, method: &mut MethodIr, weight: BlockWeight) {
        for &(lcl, delta) in &self.entries {
            let Some(dsc) = method.locals.get_mut(lcl) else {
                continue;
            };
            if delta < 0 {
                dsc.dec_ref_cnts(weight);
            } else {
                dsc.inc_ref_cnts(weight);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{LclVarDsc, MethodId, Oper, SsaNum, Target, VarType};

    #[test]
    fn test_apply_adjusts_weighted_counts() {
        let mut method = MethodIr::new(MethodId(0), "refs", Target::X64);
        let a = method.locals.push(LclVarDsc::new(VarType::Int));
        let b = method.locals.push(LclVarDsc::new(VarType::Int));
        if let Some(dsc) = method.locals.get_mut(a) {
            dsc.ref_cnt = 2;
            dsc.ref_cnt_wtd = 200;
        }

        let mut ledger = RefCountLedger::new();
        ledger.decrement(a);
        ledger.increment(b);
        assert_eq!(ledger.net(a), -1);
        ledger.apply(&mut method, 100);

        assert_eq!(method.locals.dsc(a).unwrap().ref_cnt, 1);
        assert_eq!(method.locals.dsc(a).unwrap().ref_cnt_wtd, 100);
        assert_eq!(method.locals.dsc(b).unwrap().ref_cnt, 1);
    }

    #[test]
    fn test_tree_entries() {
        let mut method = MethodIr::new(MethodId(0), "refs", Target::X64);
        let a = method.locals.push(LclVarDsc::new(VarType::Int));
        let x = method.new_lcl_var(a, SsaNum(1)).unwrap();
        let y = method.new_lcl_var(a, SsaNum(1)).unwrap();
        let add = method.new_binop(Oper::Add, VarType::Int, x, y);

        let mut ledger = RefCountLedger::new();
        ledger.decrement_tree(&method, add);
        assert_eq!(ledger.net(a), -2);
        assert_eq!(ledger.entries().len(), 2);
    }
}
