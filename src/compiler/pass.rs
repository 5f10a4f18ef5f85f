//! The [`MethodPass`] trait implemented by every optimization pass.

use crate::{compiler::CompilerContext, ir::MethodIr, vn::ValueNumOracle, Result};

/// A transformation over one method at a time.
///
/// Passes are shared across the scheduler's worker threads, so they must be
/// `Send + Sync` and keep per-method state on the stack of
/// [`MethodPass::run_on_method`].
pub trait MethodPass: Send + Sync {
    /// Short, stable name used in events.
    fn name(&self) -> &'static str;

    /// One-line description.
    fn description(&self) -> &'static str {
        "No description available"
    }

    /// Returns `false` to skip `method` entirely.
    fn should_run(&self, _method: &MethodIr, _ctx: &CompilerContext) -> bool {
        true
    }

    /// Transforms `method`, returning `true` if anything changed.
    ///
    /// # Errors
    ///
    /// An error abandons the method; the scheduler restores the state it had
    /// before the pass started.
    fn run_on_method(
        &self,
        method: &mut MethodIr,
        values: &dyn ValueNumOracle,
        ctx: &CompilerContext,
    ) -> Result<bool>;
}
