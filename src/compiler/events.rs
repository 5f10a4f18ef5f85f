//! Event logging for the optimizer pipeline.
//!
//! Every rewrite, every created fact worth reporting and every engine-level
//! decision is recorded as an [`Event`]. Events can be inspected for debugging
//! and testing or ignored entirely; recording never influences optimization.
//!
//! # Architecture
//!
//! - [`Event`] - A single recorded event
//! - [`EventLog`] - Append-only, thread-safe collection of events with query
//!   and summary helpers
//! - [`EventBuilder`] - Fluent API for creating events; the event is appended
//!   when the builder is dropped
//!
//! # Example
//!
//! ```rust,ignore
//! use assertprop::compiler::{EventKind, EventLog};
//! use assertprop::ir::{BlockId, MethodId};
//!
//! let log = EventLog::new();
//!
//! log.record(EventKind::BoundsCheckRemoved)
//!     .at(MethodId(3), BlockId::new(2))
//!     .message("[000017] redundant with #03");
//!
//! log.info("global assertion propagation started");
//!
//! println!("{}", log.summary());
//! ```

use std::{
    collections::{HashMap, HashSet},
    fmt,
    time::Duration,
};

use crate::{
    assertion::RewriteKind,
    ir::{BlockId, MethodId},
};

/// Categories of events that can be logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A local read was replaced by a constant.
    ConstantPropagated,
    /// A local read was replaced by a read of another local.
    CopyPropagated,
    /// An indirection or call no longer checks for null.
    NullCheckRemoved,
    /// A bounds check was removed.
    BoundsCheckRemoved,
    /// A cast, or the overflow check of a cast, was removed.
    CastRemoved,
    /// A type-test or type-cast helper call was removed.
    TypeCheckRemoved,
    /// A comparison was folded or simplified.
    RelopFolded,
    /// Re-morphing a rewritten statement deleted it.
    StatementRemoved,
    /// A copy of a local was inserted before propagation.
    CopyInserted,

    /// An assertion was added to the table.
    AssertionCreated,
    /// An assertion was dropped because the table was full.
    AssertionTableFull,
    /// The assertion dataflow reached its fixpoint.
    DataflowConverged,

    /// A pass started.
    PassStarted,
    /// A pass completed.
    PassCompleted,
    /// A pass failed on a method and the method was restored.
    MethodAborted,

    /// Informational message.
    Info,
    /// Warning (something unexpected but recoverable).
    Warning,
    /// Error (something failed).
    Error,
}

impl EventKind {
    /// Returns a human-readable description of this event kind.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            // Transformations
            Self::ConstantPropagated => "constant propagated",
            Self::CopyPropagated => "copy propagated",
            Self::NullCheckRemoved => "null check removed",
            Self::BoundsCheckRemoved => "bounds check removed",
            Self::CastRemoved => "cast removed",
            Self::TypeCheckRemoved => "type check removed",
            Self::RelopFolded => "relop folded",
            Self::StatementRemoved => "statement removed",
            Self::CopyInserted => "copy inserted",
            // Analysis
            Self::AssertionCreated => "assertion created",
            Self::AssertionTableFull => "assertion table full",
            Self::DataflowConverged => "dataflow converged",
            // Engine
            Self::PassStarted => "pass started",
            Self::PassCompleted => "pass completed",
            Self::MethodAborted => "method aborted",
            // Diagnostic
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    /// Returns true if this event represents a code transformation.
    #[must_use]
    pub fn is_transformation(&self) -> bool {
        matches!(
            self,
            Self::ConstantPropagated
                | Self::CopyPropagated
                | Self::NullCheckRemoved
                | Self::BoundsCheckRemoved
                | Self::CastRemoved
                | Self::TypeCheckRemoved
                | Self::RelopFolded
                | Self::StatementRemoved
                | Self::CopyInserted
        )
    }

    /// Returns true if this is a diagnostic event (info/warning/error).
    #[must_use]
    pub fn is_diagnostic(&self) -> bool {
        matches!(self, Self::Info | Self::Warning | Self::Error)
    }
}

impl From<RewriteKind> for EventKind {
    fn from(kind: RewriteKind) -> Self {
        match kind {
            RewriteKind::ConstantPropagated => Self::ConstantPropagated,
            RewriteKind::CopyPropagated => Self::CopyPropagated,
            RewriteKind::NullCheckRemoved => Self::NullCheckRemoved,
            RewriteKind::BoundsCheckRemoved => Self::BoundsCheckRemoved,
            RewriteKind::CastRemoved | RewriteKind::OverflowCheckRemoved => Self::CastRemoved,
            RewriteKind::TypeCheckRemoved => Self::TypeCheckRemoved,
            RewriteKind::RelopFolded => Self::RelopFolded,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A single logged event.
#[derive(Debug, Clone)]
pub struct Event {
    /// What kind of event this is.
    pub kind: EventKind,
    /// The method where this event occurred (if applicable).
    pub method: Option<MethodId>,
    /// The block within the method (if applicable).
    pub location: Option<BlockId>,
    /// Human-readable description.
    pub message: String,
    /// The pass that generated this event (if applicable).
    pub pass: Option<String>,
}

impl Event {
    fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            method: None,
            location: None,
            message: message.into(),
            pass: None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.method, self.location) {
            (Some(method), Some(block)) => {
                write!(f, "[{}] {} {}: {}", self.kind, method, block, self.message)
            }
            (Some(method), None) => write!(f, "[{}] {}: {}", self.kind, method, self.message),
            _ => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}

/// Builder for creating events with a fluent API.
///
/// The event is automatically recorded to the log when the builder is dropped.
pub struct EventBuilder<'a> {
    log: &'a EventLog,
    kind: EventKind,
    method: Option<MethodId>,
    location: Option<BlockId>,
    message: Option<String>,
    pass: Option<String>,
}

impl<'a> EventBuilder<'a> {
    fn new(log: &'a EventLog, kind: EventKind) -> Self {
        Self {
            log,
            kind,
            method: None,
            location: None,
            message: None,
            pass: None,
        }
    }

    /// Sets the method and block of the event.
    pub fn at(mut self, method: MethodId, location: BlockId) -> Self {
        self.method = Some(method);
        self.location = Some(location);
        self
    }

    /// Sets the method of the event.
    pub fn method(mut self, method: MethodId) -> Self {
        self.method = Some(method);
        self
    }

    /// Sets the block of the event.
    pub fn location(mut self, location: BlockId) -> Self {
        self.location = Some(location);
        self
    }

    /// Sets the message. Defaults to the kind's description.
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Sets the pass that produced the event.
    pub fn pass(mut self, pass_name: impl Into<String>) -> Self {
        self.pass = Some(pass_name.into());
        self
    }
}

impl Drop for EventBuilder<'_> {
    fn drop(&mut self) {
        let message = self
            .message
            .take()
            .unwrap_or_else(|| self.kind.description().to_string());

        let event = Event {
            kind: self.kind,
            method: self.method.take(),
            location: self.location.take(),
            message,
            pass: self.pass.take(),
        };

        self.log.events.push(event);
    }
}

/// Thread-safe, append-only collection of events.
///
/// Events can be recorded concurrently from multiple threads via `&self`
/// methods, which lets the scheduler share one log across parallel method
/// processing.
#[derive(Debug)]
pub struct EventLog {
    events: boxcar::Vec<Event>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EventLog {
    fn clone(&self) -> Self {
        let new_log = Self::new();
        for (_, event) in &self.events {
            new_log.events.push(event.clone());
        }
        new_log
    }
}

impl EventLog {
    /// Creates a new empty event log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: boxcar::Vec::new(),
        }
    }

    /// Returns true if no events have been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.count() == 0
    }

    /// Returns the number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.count()
    }

    /// Starts recording a new event; it is appended when the builder drops.
    pub fn record(&self, kind: EventKind) -> EventBuilder<'_> {
        EventBuilder::new(self, kind)
    }

    /// Records an informational message.
    pub fn info(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Info, message));
    }

    /// Records a warning message.
    pub fn warn(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Warning, message));
    }

    /// Records an error message.
    pub fn error(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Error, message));
    }

    /// Appends copies of all events from another log.
    pub fn merge(&self, other: &EventLog) {
        for (_, event) in &other.events {
            self.events.push(event.clone());
        }
    }

    /// Returns true if any event of the given kind was recorded.
    #[must_use]
    pub fn has(&self, kind: EventKind) -> bool {
        self.events.iter().any(|(_, e)| e.kind == kind)
    }

    /// Counts the events of one kind.
    #[must_use]
    pub fn count_kind(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|(_, e)| e.kind == kind).count()
    }

    /// Iterates over all events in recording order.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().map(|(_, e)| e)
    }

    /// Events of one kind.
    pub fn filter_kind(&self, kind: EventKind) -> impl Iterator<Item = &Event> + '_ {
        self.events
            .iter()
            .filter_map(move |(_, e)| if e.kind == kind { Some(e) } else { None })
    }

    /// Events recorded for one method.
    pub fn filter_method(&self, method: MethodId) -> impl Iterator<Item = &Event> + '_ {
        self.events.iter().filter_map(move |(_, e)| {
            if e.method == Some(method) {
                Some(e)
            } else {
                None
            }
        })
    }

    /// Transformation events only.
    pub fn transformations(&self) -> impl Iterator<Item = &Event> + '_ {
        self.events.iter().filter_map(|(_, e)| {
            if e.kind.is_transformation() {
                Some(e)
            } else {
                None
            }
        })
    }

    /// Info, warning and error events.
    pub fn diagnostics(&self) -> impl Iterator<Item = &Event> + '_ {
        self.events.iter().filter_map(|(_, e)| {
            if e.kind.is_diagnostic() {
                Some(e)
            } else {
                None
            }
        })
    }

    /// Number of events per kind.
    #[must_use]
    pub fn count_by_kind(&self) -> HashMap<EventKind, usize> {
        let mut counts = HashMap::new();
        for (_, event) in &self.events {
            *counts.entry(event.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Number of transformation events.
    #[must_use]
    pub fn transformation_count(&self) -> usize {
        self.events
            .iter()
            .filter(|(_, e)| e.kind.is_transformation())
            .count()
    }

    /// Number of distinct methods with at least one transformation.
    #[must_use]
    pub fn methods_affected(&self) -> usize {
        self.events
            .iter()
            .filter(|(_, e)| e.kind.is_transformation())
            .filter_map(|(_, e)| e.method)
            .collect::<HashSet<_>>()
            .len()
    }

    /// One-line summary of the transformations, e.g.
    /// `"1 bounds check removed, 2 constant propagated"`.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "no events".to_string();
        }

        let counts = self.count_by_kind();

        // Only show transformation counts in summary
        let mut parts: Vec<String> = counts
            .iter()
            .filter(|(k, _)| k.is_transformation())
            .map(|(kind, count)| format!("{} {}", count, kind.description()))
            .collect();

        if parts.is_empty() {
            return format!("{} events", self.len());
        }

        parts.sort();
        parts.join(", ")
    }
}

/// Iterator over the events of a log.
pub struct EventLogIter<'a> {
    inner: boxcar::Iter<'a, Event>,
}

impl<'a> Iterator for EventLogIter<'a> {
    type Item = &'a Event;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, e)| e)
    }
}

impl<'a> IntoIterator for &'a EventLog {
    type Item = &'a Event;
    type IntoIter = EventLogIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        EventLogIter {
            inner: self.events.iter(),
        }
    }
}

impl FromIterator<Event> for EventLog {
    fn from_iter<T: IntoIterator<Item = Event>>(iter: T) -> Self {
        let log = Self::new();
        for event in iter {
            log.events.push(event);
        }
        log
    }
}

/// Statistics derived from an event log.
#[derive(Debug, Clone, Default)]
pub struct DerivedStats {
    /// Methods with at least one transformation.
    pub methods_transformed: usize,
    /// Local reads replaced by constants.
    pub constants_propagated: usize,
    /// Local reads replaced by other locals.
    pub copies_propagated: usize,
    /// Null checks removed from loads and calls.
    pub null_checks_removed: usize,
    /// Bounds checks removed.
    pub bounds_checks_removed: usize,
    /// Casts or overflow checks removed.
    pub casts_removed: usize,
    /// Type check helper calls removed.
    pub type_checks_removed: usize,
    /// Comparisons folded.
    pub relops_folded: usize,
    /// Statements deleted by re-morphing.
    pub statements_removed: usize,
    /// Copies inserted before propagation.
    pub copies_inserted: usize,
    /// Assertions created.
    pub assertions_created: usize,
    /// Methods whose table overflowed.
    pub tables_full: usize,
    /// Methods a pass failed on.
    pub methods_aborted: usize,
    /// Warning events.
    pub warnings: usize,
    /// Error events.
    pub errors: usize,
    /// Wall time of the run.
    pub total_time: Duration,
}

impl DerivedStats {
    /// Computes the statistics of a log.
    #[must_use]
    pub fn from_log(log: &EventLog) -> Self {
        let counts = log.count_by_kind();
        let get = |kind: EventKind| counts.get(&kind).copied().unwrap_or(0);

        Self {
            methods_transformed: log.methods_affected(),
            constants_propagated: get(EventKind::ConstantPropagated),
            copies_propagated: get(EventKind::CopyPropagated),
            null_checks_removed: get(EventKind::NullCheckRemoved),
            bounds_checks_removed: get(EventKind::BoundsCheckRemoved),
            casts_removed: get(EventKind::CastRemoved),
            type_checks_removed: get(EventKind::TypeCheckRemoved),
            relops_folded: get(EventKind::RelopFolded),
            statements_removed: get(EventKind::StatementRemoved),
            copies_inserted: get(EventKind::CopyInserted),
            assertions_created: get(EventKind::AssertionCreated),
            tables_full: get(EventKind::AssertionTableFull),
            methods_aborted: get(EventKind::MethodAborted),
            warnings: get(EventKind::Warning),
            errors: get(EventKind::Error),
            total_time: Duration::ZERO,
        }
    }

    /// Sets the wall time.
    #[must_use]
    pub fn with_time(mut self, time: Duration) -> Self {
        self.total_time = time;
        self
    }

    /// Total number of checks (null, bounds, cast, type) removed.
    #[must_use]
    pub fn checks_removed(&self) -> usize {
        self.null_checks_removed
            + self.bounds_checks_removed
            + self.casts_removed
            + self.type_checks_removed
    }

    /// One-line summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();

        if self.methods_transformed > 0 {
            parts.push(format!("{} methods", self.methods_transformed));
        }

        let propagated = self.constants_propagated + self.copies_propagated;
        if propagated > 0 {
            parts.push(format!(
                "{} propagated ({} constants, {} copies)",
                propagated, self.constants_propagated, self.copies_propagated
            ));
        }

        if self.checks_removed() > 0 {
            parts.push(format!("{} checks removed", self.checks_removed()));
        }

        if self.relops_folded > 0 {
            parts.push(format!("{} relops folded", self.relops_folded));
        }

        if self.methods_aborted > 0 {
            parts.push(format!("{} aborted", self.methods_aborted));
        }

        if !self.total_time.is_zero() {
            parts.push(format!("{:.2?}", self.total_time));
        }

        if parts.is_empty() {
            "no changes".to_string()
        } else {
            parts.join(", ")
        }
    }
}

impl fmt::Display for DerivedStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_log_basic() {
        let log = EventLog::new();
        assert!(log.is_empty());

        log.record(EventKind::ConstantPropagated)
            .at(MethodId(1), BlockId::new(0));
        log.info("started");

        assert_eq!(log.len(), 2);
        assert!(log.has(EventKind::ConstantPropagated));
        assert!(!log.has(EventKind::CastRemoved));
    }

    #[test]
    fn test_summary() {
        let log = EventLog::new();
        let method = MethodId(1);

        log.record(EventKind::BoundsCheckRemoved)
            .at(method, BlockId::new(1));
        log.record(EventKind::BoundsCheckRemoved)
            .at(method, BlockId::new(2));
        log.record(EventKind::RelopFolded).at(method, BlockId::new(2));

        let summary = log.summary();
        assert!(summary.contains("2 bounds check removed"));
        assert!(summary.contains("1 relop folded"));
    }

    #[test]
    fn test_summary_without_transformations() {
        let log = EventLog::new();
        log.record(EventKind::DataflowConverged);
        assert_eq!(log.summary(), "1 events");
        assert_eq!(EventLog::new().summary(), "no events");
    }

    #[test]
    fn test_derived_stats() {
        let log = EventLog::new();

        log.record(EventKind::ConstantPropagated)
            .at(MethodId(1), BlockId::new(0));
        log.record(EventKind::NullCheckRemoved)
            .at(MethodId(2), BlockId::new(0));
        log.record(EventKind::CastRemoved).at(MethodId(1), BlockId::new(3));
        log.record(EventKind::AssertionCreated).method(MethodId(3));
        log.warn("a warning");

        let stats = DerivedStats::from_log(&log);
        assert_eq!(stats.methods_transformed, 2);
        assert_eq!(stats.constants_propagated, 1);
        assert_eq!(stats.checks_removed(), 2);
        assert_eq!(stats.assertions_created, 1);
        assert_eq!(stats.warnings, 1);
        assert!(stats.summary().contains("2 checks removed"));
    }

    #[test]
    fn test_filter_methods() {
        let log = EventLog::new();

        log.record(EventKind::CopyPropagated)
            .at(MethodId(1), BlockId::new(0));
        log.record(EventKind::CopyPropagated)
            .at(MethodId(2), BlockId::new(0));
        log.record(EventKind::RelopFolded).at(MethodId(1), BlockId::new(4));

        assert_eq!(log.filter_method(MethodId(1)).count(), 2);
        assert_eq!(log.filter_kind(EventKind::CopyPropagated).count(), 2);
    }

    #[test]
    fn test_transformations_filter() {
        let log = EventLog::new();

        log.record(EventKind::StatementRemoved)
            .at(MethodId(1), BlockId::new(0));
        log.info("some info");
        log.warn("some warning");
        log.record(EventKind::PassCompleted).pass("assertion-prop");

        assert_eq!(log.transformations().count(), 1);
        assert_eq!(log.diagnostics().count(), 2);
    }

    #[test]
    fn test_rewrite_kinds_map_to_transformations() {
        for kind in [
            RewriteKind::ConstantPropagated,
            RewriteKind::CopyPropagated,
            RewriteKind::NullCheckRemoved,
            RewriteKind::BoundsCheckRemoved,
            RewriteKind::CastRemoved,
            RewriteKind::OverflowCheckRemoved,
            RewriteKind::TypeCheckRemoved,
            RewriteKind::RelopFolded,
        ] {
            assert!(EventKind::from(kind).is_transformation());
        }
        assert_eq!(
            EventKind::from(RewriteKind::OverflowCheckRemoved),
            EventKind::CastRemoved
        );
    }

    #[test]
    fn test_default_message_and_display() {
        let log = EventLog::new();
        log.record(EventKind::CopyInserted)
            .at(MethodId(7), BlockId::new(1));

        let event = log.iter().next().unwrap();
        assert_eq!(event.message, "copy inserted");
        assert_eq!(event.to_string(), "[copy inserted] M0007 BB01: copy inserted");
    }

    #[test]
    fn test_thread_safe_append() {
        use std::{sync::Arc, thread};

        let log = Arc::new(EventLog::new());
        let mut handles = vec![];

        for i in 0..4u32 {
            let log_clone = Arc::clone(&log);
            handles.push(thread::spawn(move || {
                for j in 0..100usize {
                    log_clone
                        .record(EventKind::RelopFolded)
                        .at(MethodId(i), BlockId::new(j))
                        .message(format!("thread {i} event {j}"));
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(log.len(), 400);
        assert_eq!(log.methods_affected(), 4);
    }
}
