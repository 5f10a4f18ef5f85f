//! Built-in method passes.
//!
//! | Pass | Description |
//! |------|-------------|
//! | [`AddCopiesPass`] | Gives hot x86 float parameters and volatile locals a single-definition copy |
//! | [`AssertionPropPass`] | Generates facts, flows them over the CFG and rewrites what they prove |
//!
//! [`crate::compiler::PassScheduler::from_config`] schedules copy insertion (when
//! enabled) ahead of propagation.

mod addcopies;
mod assertprop;

pub use addcopies::AddCopiesPass;
pub use assertprop::AssertionPropPass;
