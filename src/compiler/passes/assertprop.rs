//! Assertion propagation pass.
//!
//! Drives an [`AssertionEngine`] over one method: generate facts, flow them
//! across the CFG, and rewrite every node some active fact simplifies.
//!
//! # Example
//!
//! Before:
//! ```text
//! BB01: if (V00 == 5) goto BB03
//! BB02: return
//! BB03: return V00 + 1
//! ```
//!
//! After (the taken edge of BB01 proves `V00 == 5`):
//! ```text
//! BB01: if (V00 == 5) goto BB03
//! BB02: return
//! BB03: return 6
//! ```
//!
//! # Algorithm
//!
//! Global mode (SSA required, facts keyed by value number):
//!
//! 1. Per statement, propagate with an empty set so value numbers alone can
//!    fold constants, re-morph if that changed anything, then generate facts
//!    on every node in execution order
//! 2. Stop if no fact was generated
//! 3. Solve the forward must-dataflow over the CFG
//! 4. Per non-fault block, start from the block's input set and walk each
//!    statement in execution order: propagate, then add the node's own fact
//!    and everything it implies; re-morph statements that changed
//!
//! Local mode (facts keyed by local slot, cleared per statement or block):
//! propagate each node, kill the facts that mention a local when it is
//! assigned, then add the node's fact.
//!
//! Re-morphing can delete the statement (a branch on a constant) or the rest
//! of the block (a bounds check that always throws); the walk honours both.

use crate::{
    assertion::{
        AssertionDataflow, AssertionEngine, AssertionSet, LocalScope, PropagationMode, Rewrite,
    },
    compiler::{
        config::AssertionPropConfig, context::PassStatistics, pass::MethodPass, CompilerContext,
        EventKind,
    },
    ir::{BlockId, LclNum, MethodIr, MorphOutcome, NodeId, Oper},
    vn::ValueNumOracle,
    Error, Result,
};

/// Assertion propagation pass.
///
/// The mode, table capacity and local scope come from its
/// [`AssertionPropConfig`]. All per-method state lives in the
/// [`AssertionEngine`] created for each run, so one pass instance serves
/// every worker thread.
#[derive(Debug, Clone, Default)]
pub struct AssertionPropPass {
    config: AssertionPropConfig,
}

impl AssertionPropPass {
    /// Creates the pass.
    ///
    /// # Arguments
    ///
    /// * `config` - Mode, capacity and scope of the run.
    ///
    /// # Returns
    ///
    /// A new `AssertionPropPass` instance.
    #[must_use]
    pub fn new(config: AssertionPropConfig) -> Self {
        Self { config }
    }

    /// The pass configuration.
    #[must_use]
    pub fn config(&self) -> &AssertionPropConfig {
        &self.config
    }

    fn run_global(
        &self,
        method: &mut MethodIr,
        values: &dyn ValueNumOracle,
        ctx: &CompilerContext,
        stats: &mut PassStatistics,
    ) -> Result<bool> {
        if !method.ssa_built {
            return Err(Error::SsaRequired);
        }

        let mut engine =
            AssertionEngine::new(PropagationMode::Global, self.config.max_assertions, values);
        let blocks: Vec<BlockId> = method.block_ids().collect();
        let mut changed = false;

        // Phase 1: value-number folding and fact generation.
        for &block in &blocks {
            let skip_vn = method.block(block)?.is_fault_handler();
            let mut stmt = 0;
            while stmt < method.block(block)?.statements.len() {
                if self.config.enable_vn_constant_prop && !skip_vn {
                    let mut active = AssertionSet::EMPTY;
                    if self.propagate_statement(
                        &engine, method, block, stmt, &mut active, false, ctx, stats,
                    )? {
                        changed = true;
                        match self.morph(method, block, stmt, ctx, stats)? {
                            MorphOutcome::Kept => {}
                            MorphOutcome::StatementRemoved => continue,
                            MorphOutcome::RemoveRestOfBlock => break,
                        }
                    }
                }

                let Some(root) = method.block(block)?.statements.get(stmt).map(|s| s.root) else {
                    break;
                };
                for node in method.execution_order(root) {
                    engine.generate(method, node);
                }
                stmt += 1;
            }
        }

        stats.assertions = engine.store().len();
        self.report_table(&engine, method, ctx);
        if engine.store().is_empty() {
            return Ok(changed);
        }

        // Phase 2: dataflow.
        let flow = AssertionDataflow::run(&engine, method);
        stats.dataflow_iterations = flow.iterations();
        ctx.events
            .record(EventKind::DataflowConverged)
            .method(method.id)
            .pass(self.name())
            .message(format!(
                "{} facts over {} blocks in {} steps",
                engine.store().len(),
                blocks.len(),
                flow.iterations()
            ));

        // Phase 3: propagation.
        let known = engine.store().all();
        for &block in &blocks {
            if method.block(block)?.is_fault_handler() {
                continue;
            }
            let mut active = flow.value_in(block) & known;
            let mut stmt = 0;
            while stmt < method.block(block)?.statements.len() {
                if self.propagate_statement(
                    &engine, method, block, stmt, &mut active, true, ctx, stats,
                )? {
                    changed = true;
                    match self.morph(method, block, stmt, ctx, stats)? {
                        MorphOutcome::Kept => {}
                        MorphOutcome::StatementRemoved => continue,
                        MorphOutcome::RemoveRestOfBlock => break,
                    }
                }
                stmt += 1;
            }
        }

        Ok(changed)
    }

    fn run_local(
        &self,
        method: &mut MethodIr,
        values: &dyn ValueNumOracle,
        ctx: &CompilerContext,
        stats: &mut PassStatistics,
    ) -> Result<bool> {
        let mut engine =
            AssertionEngine::new(PropagationMode::Local, self.config.max_assertions, values);
        let blocks: Vec<BlockId> = method.block_ids().collect();
        let mut changed = false;
        let mut table_full = false;

        for &block in &blocks {
            let mut active = AssertionSet::EMPTY;
            if self.config.local_scope == LocalScope::Block {
                engine.reset();
            }

            let mut stmt = 0;
            while stmt < method.block(block)?.statements.len() {
                if self.config.local_scope == LocalScope::Statement {
                    engine.reset();
                    active = AssertionSet::EMPTY;
                }
                let Some(root) = method.block(block)?.statements.get(stmt).map(|s| s.root) else {
                    break;
                };

                let mut stmt_changed = false;
                for mut node in method.execution_order(root) {
                    if let Some(rewrite) = engine.propagate(active, method, node)? {
                        self.commit(&engine, method, block, stmt, &rewrite, ctx)?;
                        stats.rewrites += 1;
                        stmt_changed = true;
                        node = rewrite.replacement;
                    }

                    if let Some(lcl) = assigned_local(method, node) {
                        active = active - engine.store().dependents_of_local(lcl);
                    }

                    let before = engine.store().len();
                    let index = engine.generate(method, node);
                    if index.is_some() {
                        active |= AssertionSet::single(index);
                    }
                    if engine.store().len() > before {
                        stats.assertions += 1;
                        if let Some(fact) = engine.store().get(index) {
                            ctx.events
                                .record(EventKind::AssertionCreated)
                                .at(method.id, block)
                                .pass(self.name())
                                .message(format!("{index} {fact}"));
                        }
                    }
                }
                table_full |= engine.store().overflowed();

                if stmt_changed {
                    changed = true;
                    match self.morph(method, block, stmt, ctx, stats)? {
                        MorphOutcome::Kept => {}
                        MorphOutcome::StatementRemoved => continue,
                        MorphOutcome::RemoveRestOfBlock => break,
                    }
                }
                stmt += 1;
            }
        }

        if table_full {
            ctx.events
                .record(EventKind::AssertionTableFull)
                .method(method.id)
                .pass(self.name())
                .message(format!(
                    "more than {} facts in one scope",
                    self.config.max_assertions
                ));
        }
        Ok(changed)
    }

    /// Walks one statement in execution order, applying every rewrite.
    ///
    /// With `gather` set, each node's own fact (and what it implies) joins
    /// `active` once the node has been visited. Returns `true` if anything
    /// was rewritten.
    fn propagate_statement(
        &self,
        engine: &AssertionEngine<'_>,
        method: &mut MethodIr,
        block: BlockId,
        stmt: usize,
        active: &mut AssertionSet,
        gather: bool,
        ctx: &CompilerContext,
        stats: &mut PassStatistics,
    ) -> Result<bool> {
        let Some(root) = method.block(block)?.statements.get(stmt).map(|s| s.root) else {
            return Ok(false);
        };

        // Bounds-check facts this statement made active; such a fact must not
        // remove the check that produced it.
        let mut fresh_checks = AssertionSet::EMPTY;
        let mut changed = false;
        for mut node in method.execution_order(root) {
            let mut offered = *active;
            if let Some(check) = comma_bounds_check(method, node) {
                let own = engine.node_assertion(check);
                if own.is_some() && fresh_checks.contains(own) {
                    offered.remove(own);
                    // Past its own COMMA the check has run; later uses may rely on it.
                    fresh_checks.remove(own);
                }
            }

            if let Some(rewrite) = engine.propagate(offered, method, node)? {
                self.commit(engine, method, block, stmt, &rewrite, ctx)?;
                stats.rewrites += 1;
                changed = true;
                node = rewrite.replacement;
            }

            if gather {
                let index = engine.node_assertion(node);
                if index.is_some() {
                    if method.node(node).oper == Oper::BoundsCheck && !active.contains(index) {
                        fresh_checks.insert(index);
                    }
                    *active |= AssertionSet::single(index) | engine.implied(index, *active);
                }
            }
        }
        Ok(changed)
    }

    /// Links a rewrite into its statement, applies its reference counts and
    /// records it.
    fn commit(
        &self,
        engine: &AssertionEngine<'_>,
        method: &mut MethodIr,
        block: BlockId,
        stmt: usize,
        rewrite: &Rewrite,
        ctx: &CompilerContext,
    ) -> Result<()> {
        if !rewrite.is_in_place() {
            method.replace_node(block, stmt, rewrite.original, rewrite.replacement)?;
        }
        if method.ref_counted {
            let weight = method.block(block)?.weight;
            rewrite.ref_counts.apply(method, weight);
        }

        let message = match engine.store().get(rewrite.assertion) {
            Some(fact) => format!(
                "{}: {} using {}",
                rewrite.kind,
                method.dump_tree(rewrite.replacement),
                fact
            ),
            None => format!(
                "{}: {} by value number",
                rewrite.kind,
                method.dump_tree(rewrite.replacement)
            ),
        };
        ctx.events
            .record(EventKind::from(rewrite.kind))
            .at(method.id, block)
            .pass(self.name())
            .message(message);
        Ok(())
    }

    /// Re-morphs a changed statement and records deletions.
    fn morph(
        &self,
        method: &mut MethodIr,
        block: BlockId,
        stmt: usize,
        ctx: &CompilerContext,
        stats: &mut PassStatistics,
    ) -> Result<MorphOutcome> {
        let outcome = method.morph_statement(block, stmt)?;
        match outcome {
            MorphOutcome::Kept => {}
            MorphOutcome::StatementRemoved => {
                stats.statements_removed += 1;
                ctx.events
                    .record(EventKind::StatementRemoved)
                    .at(method.id, block)
                    .pass(self.name())
                    .message(format!("statement {stmt} folded away"));
            }
            MorphOutcome::RemoveRestOfBlock => {
                stats.statements_removed += 1;
                ctx.events
                    .record(EventKind::StatementRemoved)
                    .at(method.id, block)
                    .pass(self.name())
                    .message(format!("statement {stmt} always throws, rest of block removed"));
            }
        }
        Ok(outcome)
    }

    /// Records the generated table of a global run.
    fn report_table(&self, engine: &AssertionEngine<'_>, method: &MethodIr, ctx: &CompilerContext) {
        for (index, fact) in engine.store().iter() {
            let location = engine.introducer(index).and_then(|node| block_of(method, node));
            let event = ctx
                .events
                .record(EventKind::AssertionCreated)
                .method(method.id)
                .pass(self.name())
                .message(format!("{index} {fact}"));
            if let Some(block) = location {
                let _ = event.location(block);
            }
        }
        if engine.store().overflowed() {
            ctx.events
                .record(EventKind::AssertionTableFull)
                .method(method.id)
                .pass(self.name())
                .message(format!(
                    "table capped at {} facts",
                    engine.store().capacity()
                ));
        }
    }
}

impl MethodPass for AssertionPropPass {
    fn name(&self) -> &'static str {
        match self.config.mode {
            PropagationMode::Global => "assertion-prop",
            PropagationMode::Local => "local-assertion-prop",
        }
    }

    fn description(&self) -> &'static str {
        "Folds constants, substitutes copies and removes redundant checks using proven facts"
    }

    fn should_run(&self, method: &MethodIr, _ctx: &CompilerContext) -> bool {
        self.config.mode == PropagationMode::Local || method.ssa_built
    }

    fn run_on_method(
        &self,
        method: &mut MethodIr,
        values: &dyn ValueNumOracle,
        ctx: &CompilerContext,
    ) -> Result<bool> {
        self.config.validate()?;

        let mut stats = PassStatistics::default();
        let changed = match self.config.mode {
            PropagationMode::Global => self.run_global(method, values, ctx, &mut stats)?,
            PropagationMode::Local => self.run_local(method, values, ctx, &mut stats)?,
        };
        ctx.record_statistics(method.id, stats);
        Ok(changed)
    }
}

/// The local an assignment node defines.
fn assigned_local(method: &MethodIr, node: NodeId) -> Option<LclNum> {
    let tree = method.node(node);
    if tree.oper != Oper::Asg {
        return None;
    }
    let dst = method.node(tree.op1()?);
    if !dst.is_local_var() {
        return None;
    }
    dst.local().map(|lcl| lcl.lcl)
}

/// The block whose statements contain `node`.
/// The bounds check guarding `node` when it is a `COMMA(BOUNDS_CHECK, ..)`.
fn comma_bounds_check(method: &MethodIr, node: NodeId) -> Option<NodeId> {
    let comma = method.node(node);
    if comma.oper != Oper::Comma {
        return None;
    }
    let check = comma.op1()?;
    (method.node(check).oper == Oper::BoundsCheck).then_some(check)
}

fn block_of(method: &MethodIr, node: NodeId) -> Option<BlockId> {
    method.blocks.iter().find_map(|block| {
        block
            .statements
            .iter()
            .any(|stmt| method.execution_order(stmt.root).contains(&node))
            .then_some(block.id)
    })
}
