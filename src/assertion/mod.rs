//! Assertion generation, dataflow and propagation.
//!
//! An assertion is a fact established at some program point (`x == 5`,
//! `obj != null`, `i < a.Length`) that can be relied on downstream to fold
//! constants, substitute copies or drop runtime checks. This module holds the
//! pieces shared by the local (per statement or block, keyed by local slot)
//! and global (whole method, keyed by value number) variants:
//!
//! - [`kind`] - the [`Assertion`] data model and its structural equality
//! - [`set`] - [`AssertionIndex`] and the 64-bit [`AssertionSet`]
//! - [`store`] - the bounded, deduplicating [`AssertionStore`]
//! - `creator` - turning IR trees into assertions
//! - `generator` - deciding which node produces which fact
//! - `implied` - facts that follow from others (copies, constants, types)
//! - [`dataflow`] - per-block gen sets and the fixpoint over the CFG
//! - [`propagate`] - the consumers that rewrite nodes using active facts
//! - [`refcount`] - deferred reference-count adjustments of a rewrite
//!
//! The drivers that walk a method and apply rewrites live in
//! [`crate::compiler::passes`].

mod creator;
pub mod dataflow;
mod engine;
mod generator;
mod implied;
pub mod kind;
pub mod propagate;
pub mod refcount;
pub mod set;
pub mod store;

pub use creator::Operands;
pub use dataflow::{AssertionDataflow, BlockAssertions};
pub use engine::AssertionEngine;
pub use kind::{Assertion, AssertionKind, AssertionLocal, IntLiteral, Op1, Op1Kind, Op2, Op2Kind};
pub use propagate::{Rewrite, RewriteKind};
pub use refcount::RefCountLedger;
pub use set::{AssertionIndex, AssertionSet, AssertionSetIter, MAX_ASSERTION_COUNT};
pub use store::AssertionStore;

/// How assertions are keyed and how far they reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PropagationMode {
    /// Facts are keyed by local slot and live within one statement or block;
    /// an assignment to a local kills the facts that mention it.
    Local,
    /// Facts are keyed by SSA value number and flow across the CFG.
    #[default]
    Global,
}

impl std::fmt::Display for PropagationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Local => "local",
            Self::Global => "global",
        })
    }
}

/// Region over which local-mode facts survive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LocalScope {
    /// The table is cleared before every statement.
    #[default]
    Statement,
    /// The table is cleared before every block.
    Block,
}
