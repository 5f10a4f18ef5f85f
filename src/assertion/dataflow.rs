//! Forward must-analysis of assertions over the CFG.
//!
//! # Algorithm
//!
//! 1. Per block, collect the facts generated along the fall-through path
//!    (`value_gen`) and along the taken edge of a final conditional branch
//!    (`jump_dest_gen`), each closed under implication
//! 2. Start every set at full, the entry block's input at empty
//! 3. Process blocks from a worklist seeded with the entry:
//!    - `in &= pred.jump_dest_out` for a conditional predecessor whose taken
//!      edge leads here, `pred.value_out` otherwise
//!    - `value_out' = value_out & (value_gen | in)`
//!    - `jump_dest_out' = jump_dest_out & (jump_dest_gen | in)`
//!    - on change, queue the successors that are not already queued
//! 4. Widen every input with the non-null facts implied by type facts
//!
//! Sets only shrink, so the iteration terminates; the result is the largest
//! fixpoint, i.e. a fact is in a block's input only if it holds on every
//! path from the entry.

use std::collections::VecDeque;

use crate::{
    assertion::{AssertionEngine, AssertionIndex, AssertionSet},
    ir::{BlockId, MethodIr, Oper},
};

/// Dataflow sets of one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockAssertions {
    /// Facts generated on the fall-through path.
    pub value_gen: AssertionSet,
    /// Facts generated on the taken edge of the final conditional.
    pub jump_dest_gen: AssertionSet,
    /// Facts holding on entry.
    pub value_in: AssertionSet,
    /// Facts holding on the fall-through exit.
    pub value_out: AssertionSet,
    /// Facts holding on the taken edge.
    pub jump_dest_out: AssertionSet,
}

impl Default for BlockAssertions {
    fn default() -> Self {
        Self {
            value_gen: AssertionSet::EMPTY,
            jump_dest_gen: AssertionSet::EMPTY,
            value_in: AssertionSet::FULL,
            value_out: AssertionSet::FULL,
            jump_dest_out: AssertionSet::FULL,
        }
    }
}

/// Worklist solver for the assertion dataflow of one method.
#[derive(Debug, Clone, Default)]
pub struct AssertionDataflow {
    blocks: Vec<BlockAssertions>,
    worklist: VecDeque<usize>,
    in_worklist: Vec<bool>,
    iterations: usize,
}

impl AssertionDataflow {
    /// Computes gen sets, solves the fixpoint and applies the type-implies-
    /// non-null widening.
    ///
    /// Facts must already have been generated and attached by `engine`.
    #[must_use]
    pub fn run(engine: &AssertionEngine<'_>, method: &MethodIr) -> Self {
        let mut flow = Self::compute_gen(engine, method);
        flow.solve(method);
        flow.widen_with_type_facts(engine);
        flow
    }

    /// Collects each block's generated facts from the attached assertions.
    #[must_use]
    pub fn compute_gen(engine: &AssertionEngine<'_>, method: &MethodIr) -> Self {
        let mut blocks = vec![BlockAssertions::default(); method.block_count()];

        for (state, block) in blocks.iter_mut().zip(&method.blocks) {
            let mut value_gen = AssertionSet::EMPTY;
            let mut jump_dest_gen = AssertionSet::EMPTY;

            for stmt in &block.statements {
                for node in method.execution_order(stmt.root) {
                    let is_jtrue = method.node(node).oper == Oper::Jtrue;
                    if is_jtrue {
                        jump_dest_gen = value_gen;
                    }

                    let index = engine.node_assertion(node);
                    if index.is_none() {
                        continue;
                    }
                    let complement = if is_jtrue {
                        engine.store().find_complementary(index)
                    } else {
                        AssertionIndex::NONE
                    };

                    for (i, fact) in [index, complement].into_iter().enumerate() {
                        if fact.is_none() {
                            continue;
                        }
                        let target = if i == 0 && is_jtrue {
                            &mut jump_dest_gen
                        } else {
                            &mut value_gen
                        };
                        let implied = engine.implied(fact, *target);
                        *target |= AssertionSet::single(fact) | implied;
                    }
                }
            }

            state.value_gen = value_gen;
            state.jump_dest_gen = jump_dest_gen;
        }

        Self {
            in_worklist: vec![false; blocks.len()],
            blocks,
            worklist: VecDeque::new(),
            iterations: 0,
        }
    }

    /// Iterates the transfer functions to a fixpoint.
    pub fn solve(&mut self, method: &MethodIr) {
        if self.blocks.is_empty() {
            return;
        }
        for state in &mut self.blocks {
            state.value_in = AssertionSet::FULL;
            state.value_out = AssertionSet::FULL;
            state.jump_dest_out = AssertionSet::FULL;
        }
        self.blocks[0].value_in = AssertionSet::EMPTY;

        self.worklist.clear();
        self.in_worklist.iter_mut().for_each(|queued| *queued = false);
        self.worklist.push_back(0);
        self.in_worklist[0] = true;

        while let Some(index) = self.worklist.pop_front() {
            self.in_worklist[index] = false;
            self.iterations += 1;

            if self.process(method, index) {
                for succ in method.successors(BlockId::new(index)) {
                    let succ = succ.index();
                    if succ < self.in_worklist.len() && !self.in_worklist[succ] {
                        self.worklist.push_back(succ);
                        self.in_worklist[succ] = true;
                    }
                }
            }
        }
    }

    /// Merges predecessors into one block and applies its transfer.
    ///
    /// Returns `true` if either output changed.
    fn process(&mut self, method: &MethodIr, index: usize) -> bool {
        let Some(block) = method.blocks.get(index) else {
            return false;
        };

        let mut value_in = self.blocks[index].value_in;
        for pred in &block.preds {
            let Some(pred_block) = method.blocks.get(pred.index()) else {
                continue;
            };
            let Some(pred_state) = self.blocks.get(pred.index()) else {
                continue;
            };
            let taken_edge = pred_block.jump.is_cond()
                && pred_block.jump.jump_dest() == Some(BlockId::new(index));
            value_in &= if taken_edge {
                pred_state.jump_dest_out
            } else {
                pred_state.value_out
            };
        }

        let state = &mut self.blocks[index];
        state.value_in = value_in;
        let value_out = state.value_out & (state.value_gen | value_in);
        let jump_dest_out = state.jump_dest_out & (state.jump_dest_gen | value_in);
        let changed = value_out != state.value_out || jump_dest_out != state.jump_dest_out;
        state.value_out = value_out;
        state.jump_dest_out = jump_dest_out;
        changed
    }

    /// Adds the non-null facts implied by type facts to every block input.
    pub fn widen_with_type_facts(&mut self, engine: &AssertionEngine<'_>) {
        for state in &mut self.blocks {
            state.value_in |= engine.implied_by_type_of(state.value_in);
        }
    }

    /// Sets of a block.
    #[must_use]
    pub fn block(&self, id: BlockId) -> Option<&BlockAssertions> {
        self.blocks.get(id.index())
    }

    /// Facts holding on entry to a block; empty for unknown blocks.
    #[must_use]
    pub fn value_in(&self, id: BlockId) -> AssertionSet {
        self.block(id).map_or(AssertionSet::EMPTY, |state| state.value_in)
    }

    /// Number of blocks processed until the fixpoint.
    #[must_use]
    pub const fn iterations(&self) -> usize {
        self.iterations
    }
}
