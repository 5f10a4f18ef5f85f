//! Intermediate representation consumed and rewritten by the optimizer.
//!
//! A [`MethodIr`] owns an arena of [`GenTree`] nodes addressed by [`NodeId`],
//! a list of [`BasicBlock`]s holding [`Statement`] roots, and a [`LocalTable`].
//! The model is small: it carries the operators, flags
//! and local properties that assertion propagation reads or writes.
//!
//! # Organization
//!
//! - [`types`] - [`VarType`] and [`Target`]
//! - [`node`] - operators, flags and node payloads
//! - [`locals`] - local descriptors and SSA numbers
//! - [`block`] - blocks, jumps and statements
//! - [`method`] - the method container and node constructors
//! - `tree` - execution-order walks, replacement and side-effect helpers
//! - `flow` - successors, predecessors, reverse postorder and dominators
//! - `morph` - constant folding and statement re-morphing
//! - [`builder`] - closure-based construction of test methods

pub mod block;
pub mod builder;
mod flow;
pub mod locals;
pub mod method;
mod morph;
pub mod node;
mod tree;
pub mod types;

pub use block::{BasicBlock, BlockFlags, BlockId, JumpKind, Statement};
pub use builder::{BlockBuilder, FunctionContext, MethodBuilder};
pub use flow::Dominators;
pub use locals::{
    BlockWeight, LclNum, LclVarDsc, LocalTable, SsaNum, BB_LOOP_WEIGHT, BB_UNITY_WEIGHT,
};
pub use method::{MethodId, MethodIr};
pub use morph::MorphOutcome;
pub use node::{
    CallData, CallTarget, FieldSeq, GenTree, HandleKind, HelperFunc, IntCon, LclRef, NodeData,
    NodeFlags, NodeId, Oper,
};
pub use types::{Target, VarType};
