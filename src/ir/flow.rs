//! Control-flow graph queries over a method's blocks.
//!
//! Edges are implied by each block's [`JumpKind`] and block order. The
//! dominator computation uses the iterative algorithm of Cooper, Harvey and
//! Kennedy over reverse postorder, which is simple and fast for the block
//! counts seen in single methods.

use crate::ir::{BlockId, JumpKind, MethodIr};

impl MethodIr {
    /// Successors of a block; the fall-through successor comes first.
    #[must_use]
    pub fn successors(&self, id: BlockId) -> Vec<BlockId> {
        let Some(block) = self.blocks.get(id.0) else {
            return Vec::new();
        };
        let next = (id.0 + 1 < self.blocks.len()).then_some(BlockId(id.0 + 1));

        let mut succs = match &block.jump {
            JumpKind::None => next.into_iter().collect(),
            JumpKind::Always(dest) => vec![*dest],
            JumpKind::Cond(dest) => {
                let mut succs: Vec<BlockId> = next.into_iter().collect();
                succs.push(*dest);
                succs
            }
            JumpKind::Switch(targets) => targets.clone(),
            JumpKind::Return | JumpKind::Throw => Vec::new(),
        };
        let mut seen = Vec::with_capacity(succs.len());
        succs.retain(|s| {
            if seen.contains(s) {
                false
            } else {
                seen.push(*s);
                true
            }
        });
        succs
    }

    /// Rebuilds every block's predecessor list.
    pub fn compute_predecessors(&mut self) {
        for block in &mut self.blocks {
            block.preds.clear();
        }
        for id in 0..self.blocks.len() {
            for succ in self.successors(BlockId(id)) {
                if let Some(block) = self.blocks.get_mut(succ.0) {
                    block.preds.push(BlockId(id));
                }
            }
        }
    }

    /// Blocks reachable from the entry, in reverse postorder.
    #[must_use]
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        if self.blocks.is_empty() {
            return Vec::new();
        }

        let mut visited = vec![false; self.blocks.len()];
        let mut postorder = Vec::with_capacity(self.blocks.len());
        let mut stack: Vec<(BlockId, usize)> = vec![(BlockId(0), 0)];
        visited[0] = true;

        while let Some((block, next_succ)) = stack.pop() {
            let succs = self.successors(block);
            if let Some(&succ) = succs.get(next_succ) {
                stack.push((block, next_succ + 1));
                if !visited[succ.0] {
                    visited[succ.0] = true;
                    stack.push((succ, 0));
                }
            } else {
                postorder.push(block);
            }
        }

        postorder.reverse();
        postorder
    }

    /// Computes the dominator tree of the reachable blocks.
    #[must_use]
    pub fn dominators(&self) -> Dominators {
        let rpo = self.reverse_postorder();
        let mut order = vec![usize::MAX; self.blocks.len()];
        for (i, block) in rpo.iter().enumerate() {
            order[block.0] = i;
        }

        let mut idom: Vec<Option<BlockId>> = vec![None; self.blocks.len()];
        if let Some(&entry) = rpo.first() {
            idom[entry.0] = Some(entry);
        }

        let preds = self.predecessor_lists();
        let mut changed = true;
        while changed {
            changed = false;
            for &block in rpo.iter().skip(1) {
                let mut new_idom: Option<BlockId> = None;
                for &pred in &preds[block.0] {
                    if idom[pred.0].is_none() {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(current) => intersect(&idom, &order, pred, current),
                    });
                }
                if new_idom.is_some() && idom[block.0] != new_idom {
                    idom[block.0] = new_idom;
                    changed = true;
                }
            }
        }

        Dominators { idom }
    }

    fn predecessor_lists(&self) -> Vec<Vec<BlockId>> {
        let mut preds = vec![Vec::new(); self.blocks.len()];
        for id in 0..self.blocks.len() {
            for succ in self.successors(BlockId(id)) {
                preds[succ.0].push(BlockId(id));
            }
        }
        preds
    }
}

fn intersect(idom: &[Option<BlockId>], order: &[usize], a: BlockId, b: BlockId) -> BlockId {
    let (mut a, mut b) = (a, b);
    while a != b {
        while order[a.0] > order[b.0] {
            match idom[a.0] {
                Some(up) => a = up,
                None => return b,
            }
        }
        while order[b.0] > order[a.0] {
            match idom[b.0] {
                Some(up) => b = up,
                None => return a,
            }
        }
    }
    a
}

/// Immediate dominators of a method's blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dominators {
    idom: Vec<Option<BlockId>>,
}

impl Dominators {
    /// Immediate dominator; the entry block is its own, unreachable blocks have none.
    #[must_use]
    pub fn immediate(&self, block: BlockId) -> Option<BlockId> {
        self.idom.get(block.0).copied().flatten()
    }

    /// Returns `true` if `a` dominates `b` (every block dominates itself).
    #[must_use]
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        let mut current = b;
        loop {
            if current == a {
                return true;
            }
            match self.immediate(current) {
                Some(up) if up != current => current = up,
                _ => return false,
            }
        }
    }
}
