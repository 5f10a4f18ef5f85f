//! Pass scheduler for running method passes over many methods.
//!
//! Each [`CompilationUnit`] pairs a method with the value numbers computed
//! for it. The scheduler runs its passes in order; within one pass, units are
//! processed in parallel with rayon. A unit is snapshotted before every pass
//! and restored if the pass fails on it, so a failing method leaves the run
//! with its previous IR rather than a partially rewritten one.

use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;

use crate::{
    compiler::{
        config::AssertionPropConfig,
        context::CompilerContext,
        events::EventKind,
        pass::MethodPass,
        passes::{AddCopiesPass, AssertionPropPass},
    },
    ir::MethodIr,
    vn::ValueNumStore,
};

/// A method together with its value numbers.
#[derive(Debug, Clone)]
pub struct CompilationUnit {
    /// The method.
    pub method: MethodIr,
    /// Value numbers of the method's nodes.
    pub values: ValueNumStore,
}

impl CompilationUnit {
    /// Pairs a method with its value numbers.
    #[must_use]
    pub fn new(method: MethodIr, values: ValueNumStore) -> Self {
        Self { method, values }
    }
}

/// Runs a fixed sequence of passes over a set of methods.
#[derive(Default)]
pub struct PassScheduler {
    passes: Vec<Box<dyn MethodPass>>,
}

impl PassScheduler {
    /// Creates a scheduler with no passes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard pipeline for a configuration: copy insertion when
    /// enabled, then assertion propagation.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Configuration`] if the configuration is invalid.
    pub fn from_config(config: &AssertionPropConfig) -> crate::Result<Self> {
        config.validate()?;
        let mut scheduler = Self::new();
        if config.enable_add_copies {
            scheduler.add_pass(Box::new(AddCopiesPass::new()));
        }
        scheduler.add_pass(Box::new(AssertionPropPass::new(config.clone())));
        Ok(scheduler)
    }

    /// Appends a pass.
    pub fn add_pass(&mut self, pass: Box<dyn MethodPass>) {
        self.passes.push(pass);
    }

    /// Appends a pass (builder form).
    #[must_use]
    pub fn with_pass(mut self, pass: Box<dyn MethodPass>) -> Self {
        self.add_pass(pass);
        self
    }

    /// Names of the scheduled passes in order.
    #[must_use]
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }

    /// Runs every pass once over every unit.
    ///
    /// Returns `true` if any pass changed any method. Failures are not
    /// propagated: the failing unit is restored and a
    /// [`EventKind::MethodAborted`] event is recorded.
    pub fn run(&self, units: &mut [CompilationUnit], ctx: &CompilerContext) -> bool {
        let mut any_changed = false;
        for pass in &self.passes {
            ctx.events
                .record(EventKind::PassStarted)
                .pass(pass.name())
                .message(format!("{} on {} methods", pass.name(), units.len()));

            let changed = Self::run_pass(pass.as_ref(), units, ctx);

            ctx.events
                .record(EventKind::PassCompleted)
                .pass(pass.name())
                .message(format!("{} (changed: {})", pass.name(), changed));
            any_changed |= changed;
        }
        any_changed
    }

    fn run_pass(pass: &dyn MethodPass, units: &mut [CompilationUnit], ctx: &CompilerContext) -> bool {
        let any_changed = AtomicBool::new(false);

        units.par_iter_mut().for_each(|unit| {
            if !pass.should_run(&unit.method, ctx) {
                return;
            }

            let snapshot = unit.method.clone();
            match pass.run_on_method(&mut unit.method, &unit.values, ctx) {
                Ok(true) => any_changed.store(true, Ordering::Relaxed),
                Ok(false) => {}
                Err(err) => {
                    ctx.events
                        .record(EventKind::MethodAborted)
                        .method(unit.method.id)
                        .pass(pass.name())
                        .message(err.to_string());
                    unit.method = snapshot;
                }
            }
        });

        any_changed.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for PassScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassScheduler")
            .field("passes", &self.pass_names())
            .finish()
    }
}
