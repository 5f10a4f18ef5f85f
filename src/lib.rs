// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]

//! # assertprop
//!
//! Assertion propagation for a method-level compiler middle end.
//!
//! An *assertion* is a fact that holds at a program point: `x == 5` on the
//! taken edge of `if (x == 5)`, `obj != null` after `obj.field` was loaded,
//! `i < a.Length` after a bounds check succeeded. This crate infers such facts
//! from a method's trees, flows them over the control-flow graph with a
//! forward must-analysis, and rewrites nodes the active facts simplify:
//!
//! - reads of locals known to be constant or copies
//! - null checks on references known to be non-null
//! - bounds checks already performed
//! - casts and overflow checks whose operand is known to be in range
//! - type-check helper calls on objects of a known type
//! - comparisons whose outcome is already known
//!
//! ## Features
//!
//! - **Two modes** - global (SSA value numbers, whole method) and local (local
//!   slots, per statement or block)
//! - **Bounded tables** - at most 64 facts per method, held in one `u64` set
//! - **Parallel scheduling** - methods are processed in parallel with `rayon`,
//!   a failing method is restored from its snapshot
//! - **Event log** - every rewrite, created fact and dataflow run is recorded
//!
//! ## Quick Start
//!
//! ```rust
//! use assertprop::prelude::*;
//!
//! let mut method = MethodBuilder::new("is_zero").build_with(|f| {
//!     let x = f.param(VarType::Int);
//!     f.block(0, |b| {
//!         let v = b.lcl(x, 1);
//!         let zero = b.int(0);
//!         let cond = b.eq(v, zero);
//!         b.branch(cond, 2);
//!     });
//!     f.block(1, |b| b.ret());
//!     f.block(2, |b| {
//!         let v = b.lcl(x, 1);
//!         b.ret_val(v);
//!     });
//! });
//! let values = ValueNumbering::new().run(&mut method)?;
//! let mut units = vec![CompilationUnit::new(method, values)];
//!
//! let ctx = CompilerContext::new();
//! let scheduler = PassScheduler::from_config(&AssertionPropConfig::default())?;
//! scheduler.run(&mut units, &ctx);
//! println!("{}", ctx.events.summary());
//! # Ok::<(), assertprop::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`ir`] - trees, blocks, locals, flow graph utilities and the re-morpher
//! - [`vn`] - value numbers and the oracle the engine queries
//! - [`assertion`] - the fact table, generation, dataflow and propagation
//! - [`compiler`] - passes, scheduling, configuration and the event log
//!
//! ## Error Handling
//!
//! Declining to optimize is never an error. [`Error`] covers broken internal
//! invariants, misconfiguration and missing SSA; a pass that fails on a
//! method leaves that method as it was.

#[macro_use]
pub(crate) mod error;

/// Intermediate representation: trees, blocks, locals and flow graph helpers.
pub mod ir;

/// Value numbers and the oracle interface.
pub mod vn;

/// Assertion generation, dataflow and propagation.
pub mod assertion;

/// Passes, scheduling, configuration and events.
pub mod compiler;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use assertprop::prelude::*;
///
/// let config = AssertionPropConfig::new().with_mode(PropagationMode::Local);
/// assert!(config.validate().is_ok());
/// ```
pub mod prelude;

/// `assertprop` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always
/// [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `assertprop` Error type
///
/// Returned by every fallible operation in this crate.
pub use error::Error;
