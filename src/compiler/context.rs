//! Shared state of one optimizer run.
//!
//! The [`CompilerContext`] is handed to every pass invocation. All of its
//! collections are thread-safe (`boxcar` for the event log, `DashMap` for
//! statistics) so the scheduler can process methods in parallel.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::{compiler::events::EventLog, ir::MethodId};

/// Per-method counters of one pass run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStatistics {
    /// Assertions in the table after generation.
    pub assertions: usize,
    /// Rewrites applied.
    pub rewrites: usize,
    /// Statements deleted by re-morphing.
    pub statements_removed: usize,
    /// Blocks processed by the dataflow solver until its fixpoint.
    pub dataflow_iterations: usize,
    /// Copies inserted by the copy-insertion pre-pass.
    pub copies_inserted: usize,
}

impl PassStatistics {
    /// Adds another run's counters to these.
    pub fn accumulate(&mut self, other: &PassStatistics) {
        self.assertions += other.assertions;
        self.rewrites += other.rewrites;
        self.statements_removed += other.statements_removed;
        self.dataflow_iterations += other.dataflow_iterations;
        self.copies_inserted += other.copies_inserted;
    }
}

/// Context shared by all passes of a run.
pub struct CompilerContext {
    /// Accumulated events from all passes.
    pub events: EventLog,

    /// Counters per method, summed over the passes that ran on it.
    pub statistics: DashMap<MethodId, PassStatistics>,

    /// When the run started.
    start_time: Instant,
}

impl CompilerContext {
    /// Creates an empty context; the clock starts now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: EventLog::new(),
            statistics: DashMap::new(),
            start_time: Instant::now(),
        }
    }

    /// Time since the context was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Adds one pass run's counters to a method's totals.
    pub fn record_statistics(&self, method: MethodId, stats: PassStatistics) {
        self.statistics
            .entry(method)
            .or_default()
            .accumulate(&stats);
    }

    /// Totals for one method.
    #[must_use]
    pub fn statistics_for(&self, method: MethodId) -> Option<PassStatistics> {
        self.statistics.get(&method).map(|entry| *entry)
    }

    /// Totals over every method.
    #[must_use]
    pub fn total_statistics(&self) -> PassStatistics {
        let mut total = PassStatistics::default();
        for entry in &self.statistics {
            total.accumulate(entry.value());
        }
        total
    }
}

impl Default for CompilerContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CompilerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompilerContext")
            .field("events", &self.events.len())
            .field("methods", &self.statistics.len())
            .finish_non_exhaustive()
    }
}
