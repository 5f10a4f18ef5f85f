//! Copy insertion ahead of assertion propagation.
//!
//! Some locals are poor register candidates where they are defined but hot
//! where they are used: floating-point parameters on x86 arrive on the x87
//! stack, and volatile-hinted locals are spilled around exception handling.
//! Such a local gets a fresh single-definition temporary; the new assignment
//! also yields a copy fact for assertion propagation.
//!
//! # Shapes
//!
//! A parameter gets `tmp = param` in the lowest-weight block dominating all of
//! its heavier-than-average uses:
//! ```text
//! BB01 (w=1):             BB01 (w=1):  V03 = V00
//! BB02 (w=8): .. V00 ..   BB02 (w=8):  .. V00 ..
//! ```
//!
//! Any other candidate has its single definition split through the
//! temporary:
//! ```text
//! V01 = expr      =>      COMMA(V03 = expr, V01 = V03)
//! ```

use crate::{
    compiler::{context::PassStatistics, pass::MethodPass, CompilerContext, EventKind},
    ir::{
        BlockFlags, BlockId, LclNum, LclVarDsc, MethodIr, NodeId, Oper, SsaNum, Statement, Target,
        VarType, BB_LOOP_WEIGHT, BB_UNITY_WEIGHT,
    },
    vn::ValueNumOracle,
    Result,
};

/// Methods with more locals than this are left alone.
const MAX_LOCALS: usize = 512;

/// Weighted references a local needs before a copy pays off.
const MIN_WEIGHTED_REFS: u64 = BB_LOOP_WEIGHT * BB_UNITY_WEIGHT / 2;

/// Copy-insertion pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddCopiesPass;

impl AddCopiesPass {
    /// Creates the pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Filters on the local's own properties, before any CFG work.
    fn is_candidate(dsc: &LclVarDsc, init_mem: bool, is_float_param: bool) -> bool {
        if dsc.is_temp || !dsc.single_def || !can_enregister(dsc.ty) {
            return false;
        }
        if dsc.normalize_on_load() || dsc.normalize_on_store() {
            return false;
        }
        if dsc.ty.is_small() || dsc.ty == VarType::Bool {
            return false;
        }
        if !dsc.is_param && init_mem {
            return false;
        }
        if !is_float_param && !dsc.volatile_hint {
            return false;
        }
        !dsc.is_struct_field && dsc.ref_cnt_wtd > MIN_WEIGHTED_REFS
    }

    /// Tries to add a copy for one local; returns `true` if it did.
    fn add_copy(&self, method: &mut MethodIr, lcl: LclNum, ctx: &CompilerContext) -> Result<bool> {
        let dsc = method.locals.dsc(lcl)?.clone();
        let is_float_param = method.target == Target::X86 && dsc.is_param && dsc.ty.is_floating();
        if !Self::is_candidate(&dsc, method.init_mem, is_float_param) {
            return Ok(false);
        }

        let ref_blocks = referencing_blocks(method, lcl);
        if ref_blocks.is_empty() {
            return Ok(false);
        }

        let ref_cnt = u64::from(dsc.ref_cnt.max(1));
        let avg_weight_half = (dsc.ref_cnt_wtd + ref_cnt / 2) / (ref_cnt * 2);

        let entry = BlockId::new(0);
        let doms = method.dominators();
        let mut important_dom = vec![true; method.block_count()];
        let mut found_important_use = false;
        let mut dominated_by_entry = false;

        for &block in &ref_blocks {
            if doms.dominates(entry, block) {
                dominated_by_entry = true;
            }
            let weight = method.block(block)?.weight;
            if dsc.is_param && weight > avg_weight_half {
                found_important_use = true;
                for (index, keep) in important_dom.iter_mut().enumerate() {
                    *keep &= doms.dominates(BlockId::new(index), block);
                }
            }
        }

        if dsc.is_param && !found_important_use {
            return Ok(false);
        }
        let any_dominator = important_dom.iter().any(|&keep| keep);
        let do_copy = (is_float_param || (dominated_by_entry && dsc.volatile_hint)) && any_dominator;
        if !do_copy || (!dsc.is_param && find_definition(method, lcl).is_none()) {
            return Ok(false);
        }

        let tmp = method.grab_temp(dsc.ty);
        if let Some(tmp_dsc) = method.locals.get_mut(tmp) {
            tmp_dsc.single_def = true;
        }

        let block = if dsc.is_param {
            self.copy_param(method, lcl, tmp, &important_dom, &ref_blocks)?
        } else {
            match self.split_definition(method, lcl, tmp)? {
                Some(block) => block,
                None => return Ok(false),
            }
        };

        ctx.events
            .record(EventKind::CopyInserted)
            .at(method.id, block)
            .pass(self.name())
            .message(format!("{lcl} copied to {tmp}"));
        Ok(true)
    }

    /// Inserts `tmp = param` at the cheapest block dominating the important uses.
    fn copy_param(
        &self,
        method: &mut MethodIr,
        lcl: LclNum,
        tmp: LclNum,
        important_dom: &[bool],
        ref_blocks: &[BlockId],
    ) -> Result<BlockId> {
        let entry = BlockId::new(0);
        let entry_weight = method.block(entry)?.weight;
        let mut best = entry;
        let mut best_weight = entry_weight;

        for (index, _) in important_dom.iter().enumerate().filter(|(_, &keep)| keep) {
            let candidate = method.block(BlockId::new(index))?;
            if candidate.weight > best_weight {
                continue;
            }
            if candidate
                .flags
                .intersects(BlockFlags::CATCH_HANDLER | BlockFlags::KEEP_ALWAYS)
            {
                continue;
            }
            best = candidate.id;
            best_weight = candidate.weight;
        }

        let ssa = ssa_for(method);
        let src = method.new_lcl_var(lcl, ssa)?;
        let dst = method.new_lcl_var(tmp, ssa)?;
        let copy = method.new_asg(dst, src);

        let position = if ref_blocks.contains(&best) {
            0
        } else {
            let target = method.block(best)?;
            let last_oper = target.last_root().map(|root| method.node(root).oper);
            near_end(target.statements.len(), last_oper)
        };
        method
            .block_mut(best)?
            .statements
            .insert(position, Statement::new(copy));

        for slot in [lcl, tmp] {
            if let Some(dsc) = method.locals.get_mut(slot) {
                dsc.inc_ref_cnts(entry_weight);
            }
        }
        Ok(best)
    }

    /// Rewrites `lcl = rhs` into `COMMA(tmp = rhs, lcl = tmp)`.
    fn split_definition(
        &self,
        method: &mut MethodIr,
        lcl: LclNum,
        tmp: LclNum,
    ) -> Result<Option<BlockId>> {
        let Some((block, stmt, asg)) = find_definition(method, lcl) else {
            return Ok(None);
        };
        let (Some(dst), Some(rhs)) = (method.node(asg).op1(), method.node(asg).op2()) else {
            return Err(invariant_error!("assignment {} has no operands", asg));
        };

        let ssa = ssa_for(method);
        let tmp_def = method.new_lcl_var(tmp, ssa)?;
        let new_asg = method.new_asg(tmp_def, rhs);
        let tmp_use = method.new_lcl_var(tmp, ssa)?;
        let copy_asg = method.new_asg(dst, tmp_use);
        let comma = method.new_comma(new_asg, copy_asg);

        method.replace_node(block, stmt, asg, comma)?;
        if let Some(root) = method.block(block)?.statements.get(stmt).map(|s| s.root) {
            method.update_side_effects(root);
        }

        if let Some(dsc) = method.locals.get_mut(tmp) {
            dsc.inc_ref_cnts(BB_UNITY_WEIGHT);
            dsc.inc_ref_cnts(BB_UNITY_WEIGHT);
        }
        Ok(Some(block))
    }
}

impl MethodPass for AddCopiesPass {
    fn name(&self) -> &'static str {
        "add-copies"
    }

    fn description(&self) -> &'static str {
        "Introduces single-definition copies of hot parameters and volatile locals"
    }

    fn should_run(&self, method: &MethodIr, _ctx: &CompilerContext) -> bool {
        method.locals.len() < MAX_LOCALS
    }

    fn run_on_method(
        &self,
        method: &mut MethodIr,
        _values: &dyn ValueNumOracle,
        ctx: &CompilerContext,
    ) -> Result<bool> {
        if !method.ref_counted {
            method.recount_refs();
        }

        let slots: Vec<LclNum> = method.locals.iter().map(|(lcl, _)| lcl).collect();
        let mut inserted = 0;
        for lcl in slots {
            if self.add_copy(method, lcl, ctx)? {
                inserted += 1;
            }
        }

        ctx.record_statistics(
            method.id,
            PassStatistics {
                copies_inserted: inserted,
                ..PassStatistics::default()
            },
        );
        Ok(inserted > 0)
    }
}

fn can_enregister(ty: VarType) -> bool {
    !matches!(ty, VarType::Undef | VarType::Void | VarType::Struct)
}

fn ssa_for(method: &MethodIr) -> SsaNum {
    if method.ssa_built {
        SsaNum::FIRST
    } else {
        SsaNum::RESERVED
    }
}

/// Blocks with at least one reference to `lcl`, in block order.
fn referencing_blocks(method: &MethodIr, lcl: LclNum) -> Vec<BlockId> {
    method
        .blocks
        .iter()
        .filter(|block| {
            block
                .statements
                .iter()
                .any(|stmt| method.locals_referenced(stmt.root).contains(&lcl))
        })
        .map(|block| block.id)
        .collect()
}

/// The statement assigning `lcl`, as (block, statement index, assignment).
fn find_definition(method: &MethodIr, lcl: LclNum) -> Option<(BlockId, usize, NodeId)> {
    for block in &method.blocks {
        for (index, stmt) in block.statements.iter().enumerate() {
            let found = method.execution_order(stmt.root).into_iter().find(|&node| {
                let tree = method.node(node);
                tree.oper == Oper::Asg
                    && tree
                        .op1()
                        .and_then(|dst| method.node(dst).local())
                        .is_some_and(|dst| dst.lcl == lcl)
            });
            if let Some(asg) = found {
                return Some((block.id, index, asg));
            }
        }
    }
    None
}

/// Insertion index before a block-ending branch or return.
fn near_end(len: usize, last_oper: Option<Oper>) -> usize {
    match last_oper {
        Some(Oper::Jtrue | Oper::Return) if len > 0 => len - 1,
        _ => len,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ir::MethodBuilder, vn::ValueNumStore};

    const LOOP: u64 = BB_LOOP_WEIGHT * BB_UNITY_WEIGHT;

    fn hot_float_param(target: Target) -> MethodIr {
        MethodBuilder::new("fp").target(target).build_with(|f| {
            let p = f.param(VarType::Double);
            f.configure(p, |d| d.single_def = true);
            f.block(1, |b| {
                b.weight(LOOP);
                let x = b.lcl(p, 1);
                let y = b.lcl(p, 1);
                let sum = b.add(x, y);
                b.ret_val(sum);
            });
        })
    }

    #[test]
    fn test_float_param_copied_in_entry() {
        let mut method = hot_float_param(Target::X86);
        let ctx = CompilerContext::new();
        let locals_before = method.locals.len();

        assert!(AddCopiesPass::new()
            .run_on_method(&mut method, &ValueNumStore::new(), &ctx)
            .unwrap());
        assert_eq!(method.locals.len(), locals_before + 1);

        let tmp = LclNum(1);
        assert!(method.locals.dsc(tmp).unwrap().is_temp);
        let copy = method.blocks[0].statements[0].root;
        assert_eq!(method.node(copy).oper, Oper::Asg);
        let dst = method.node(copy).op1().unwrap();
        assert_eq!(method.node(dst).local().map(|l| l.lcl), Some(tmp));
        assert_eq!(method.locals.dsc(LclNum(0)).unwrap().ref_cnt, 3);
        assert_eq!(ctx.events.count_kind(EventKind::CopyInserted), 1);
        assert_eq!(
            ctx.statistics_for(method.id).map(|s| s.copies_inserted),
            Some(1)
        );
    }

    #[test]
    fn test_float_param_left_alone_off_x86() {
        let mut method = hot_float_param(Target::X64);
        let ctx = CompilerContext::new();
        assert!(!AddCopiesPass::new()
            .run_on_method(&mut method, &ValueNumStore::new(), &ctx)
            .unwrap());
        assert!(method.blocks[0].statements.is_empty());
    }

    fn volatile_local(weight: u64) -> MethodIr {
        MethodBuilder::new("volatile").build_with(|f| {
            let v = f.local(VarType::Int);
            f.configure(v, |d| {
                d.volatile_hint = true;
                d.single_def = true;
            });
            f.block(0, |b| {
                let three = b.int(3);
                b.def(v, 1, three);
            });
            f.block(1, |b| {
                b.weight(weight);
                let x = b.lcl(v, 1);
                let one = b.int(1);
                let sum = b.add(x, one);
                b.ret_val(sum);
            });
        })
    }

    #[test]
    fn test_volatile_definition_split() {
        let mut method = volatile_local(LOOP);
        let ctx = CompilerContext::new();

        assert!(AddCopiesPass::new()
            .run_on_method(&mut method, &ValueNumStore::new(), &ctx)
            .unwrap());

        let root = method.blocks[0].statements[0].root;
        assert_eq!(method.node(root).oper, Oper::Comma);
        let first = method.node(root).op1().unwrap();
        let second = method.node(root).op2().unwrap();
        assert_eq!(method.node(first).oper, Oper::Asg);
        assert_eq!(method.node(second).oper, Oper::Asg);

        let tmp = LclNum(1);
        let referenced = method.locals_referenced(root);
        assert!(referenced.contains(&tmp));
        assert!(referenced.contains(&LclNum(0)));
        assert_eq!(method.locals.dsc(tmp).unwrap().ref_cnt, 2);
    }

    #[test]
    fn test_cold_local_not_copied() {
        let mut method = volatile_local(BB_UNITY_WEIGHT);
        let ctx = CompilerContext::new();
        assert!(!AddCopiesPass::new()
            .run_on_method(&mut method, &ValueNumStore::new(), &ctx)
            .unwrap());
        assert_eq!(ctx.events.count_kind(EventKind::CopyInserted), 0);
    }

    #[test]
    fn test_init_mem_skips_locals() {
        let mut method = MethodBuilder::new("init").init_mem(true).build_with(|f| {
            let v = f.local(VarType::Int);
            f.configure(v, |d| {
                d.volatile_hint = true;
                d.single_def = true;
            });
            f.block(0, |b| {
                b.weight(LOOP);
                let three = b.int(3);
                b.def(v, 1, three);
                let x = b.lcl(v, 1);
                b.ret_val(x);
            });
        });
        let ctx = CompilerContext::new();
        assert!(!AddCopiesPass::new()
            .run_on_method(&mut method, &ValueNumStore::new(), &ctx)
            .unwrap());
    }

    #[test]
    fn test_near_end_position() {
        assert_eq!(near_end(3, Some(Oper::Jtrue)), 2);
        assert_eq!(near_end(3, Some(Oper::Asg)), 3);
        assert_eq!(near_end(0, None), 0);
    }
}
