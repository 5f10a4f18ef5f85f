//! # assertprop Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the assertprop library. Import this module to build methods, number their values
//! and run the propagation passes.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all assertprop operations
pub use crate::Error;

/// The result type used throughout assertprop
pub use crate::Result;

// ================================================================================================
// Intermediate Representation
// ================================================================================================

/// Method container, node arena and tree constructors
pub use crate::ir::MethodIr;

/// Closure-based method construction
pub use crate::ir::{BlockBuilder, FunctionContext, MethodBuilder};

/// Identifiers for methods, blocks, nodes and locals
pub use crate::ir::{BlockId, LclNum, MethodId, NodeId, SsaNum};

/// Tree operators, flags and payloads
pub use crate::ir::{GenTree, NodeData, NodeFlags, Oper};

/// Value types and target architectures
pub use crate::ir::{Target, VarType};

/// Blocks and statements
pub use crate::ir::{BasicBlock, BlockFlags, JumpKind, Statement};

/// Local variable descriptors
pub use crate::ir::{LclVarDsc, LocalTable};

/// Result of re-morphing a statement
pub use crate::ir::MorphOutcome;

// ================================================================================================
// Value Numbering
// ================================================================================================

/// Value numbers and the queries the engine makes about them
pub use crate::vn::{ValueNum, ValueNumOracle};

/// Map-backed oracle and the numberer that fills it
pub use crate::vn::{ValueNumStore, ValueNumbering};

// ================================================================================================
// Assertions
// ================================================================================================

/// The fact data model
pub use crate::assertion::{Assertion, AssertionKind, Op1, Op2};

/// Fact indices, sets and the bounded table
pub use crate::assertion::{AssertionIndex, AssertionSet, AssertionStore, MAX_ASSERTION_COUNT};

/// Per-method engine and the dataflow solver
pub use crate::assertion::{AssertionDataflow, AssertionEngine};

/// Propagation modes and scopes
pub use crate::assertion::{LocalScope, PropagationMode};

/// Rewrites and their deferred reference-count effects
pub use crate::assertion::{RefCountLedger, Rewrite, RewriteKind};

// ================================================================================================
// Passes and Scheduling
// ================================================================================================

/// Pass interface and the built-in passes
pub use crate::compiler::{AddCopiesPass, AssertionPropPass, MethodPass};

/// Scheduling of passes over many methods
pub use crate::compiler::{CompilationUnit, PassScheduler};

/// Shared run state and configuration
pub use crate::compiler::{AssertionPropConfig, CompilerContext, PassStatistics};

/// Change tracking and diagnostics
pub use crate::compiler::{DerivedStats, Event, EventKind, EventLog};
