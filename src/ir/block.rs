//! Basic blocks and statements.

use std::fmt;

use bitflags::bitflags;

use crate::ir::{BlockWeight, NodeId, BB_UNITY_WEIGHT};

/// Index of a block within its method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub(crate) usize);

impl BlockId {
    /// Creates a block id from a raw index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Raw block index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BB{:02}", self.0)
    }
}

/// How control leaves a block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum JumpKind {
    /// Falls through to the next block.
    #[default]
    None,
    /// Unconditional jump.
    Always(BlockId),
    /// Jumps to the target when the block's final `JTRUE` holds, else falls through.
    Cond(BlockId),
    /// Multi-way jump.
    Switch(Vec<BlockId>),
    /// Returns from the method.
    Return,
    /// Always throws.
    Throw,
}

impl JumpKind {
    /// The taken-edge target of a conditional block.
    #[must_use]
    pub fn jump_dest(&self) -> Option<BlockId> {
        match self {
            Self::Cond(dest) | Self::Always(dest) => Some(*dest),
            _ => None,
        }
    }

    /// Returns `true` for a two-way conditional.
    #[must_use]
    pub fn is_cond(&self) -> bool {
        matches!(self, Self::Cond(_))
    }
}

bitflags! {
    /// Block properties.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BlockFlags: u32 {
        /// First block of a fault or finally handler.
        const FAULT_HANDLER = 0x01;
        /// First block of a catch handler.
        const CATCH_HANDLER = 0x02;
        /// Inserted by the compiler.
        const INTERNAL = 0x04;
        /// Must not be removed.
        const KEEP_ALWAYS = 0x08;
    }
}

/// A top-level tree within a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Statement {
    /// Root of the statement's tree.
    pub root: NodeId,
}

impl Statement {
    /// Wraps a root node.
    #[must_use]
    pub const fn new(root: NodeId) -> Self {
        Self { root }
    }
}

/// A straight-line sequence of statements.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    /// Position in the method's block list.
    pub id: BlockId,
    /// Statements in program order.
    pub statements: Vec<Statement>,
    /// Exit kind.
    pub jump: JumpKind,
    /// Estimated execution frequency.
    pub weight: BlockWeight,
    /// Properties.
    pub flags: BlockFlags,
    /// Predecessors, filled by [`crate::ir::MethodIr::compute_predecessors`].
    pub preds: Vec<BlockId>,
}

impl BasicBlock {
    /// An empty fall-through block of unit weight.
    #[must_use]
    pub fn new(id: BlockId) -> Self {
        Self {
            id,
            statements: Vec::new(),
            jump: JumpKind::None,
            weight: BB_UNITY_WEIGHT,
            flags: BlockFlags::empty(),
            preds: Vec::new(),
        }
    }

    /// Returns `true` for fault and finally handler entry blocks.
    ///
    /// Assertions are not propagated into these; their entry state is not
    /// described by ordinary predecessor edges.
    #[must_use]
    pub fn is_fault_handler(&self) -> bool {
        self.flags.contains(BlockFlags::FAULT_HANDLER)
    }

    /// Root of the last statement.
    #[must_use]
    pub fn last_root(&self) -> Option<NodeId> {
        self.statements.last().map(|stmt| stmt.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jump_dest() {
        assert_eq!(JumpKind::Cond(BlockId(3)).jump_dest(), Some(BlockId(3)));
        assert_eq!(JumpKind::Return.jump_dest(), None);
        assert!(JumpKind::Cond(BlockId(1)).is_cond());
        assert!(!JumpKind::Always(BlockId(1)).is_cond());
    }

    #[test]
    fn test_block_defaults() {
        let block = BasicBlock::new(BlockId(2));
        assert_eq!(block.id.to_string(), "BB02");
        assert_eq!(block.weight, BB_UNITY_WEIGHT);
        assert!(!block.is_fault_handler());
        assert_eq!(block.last_root(), None);
    }
}
