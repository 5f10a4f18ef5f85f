//! Pass infrastructure around the assertion engine.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Pass Pipeline                         │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  CompilerContext            Shared state of one run          │
//! │    ├─ EventLog              (append-only, thread-safe)       │
//! │    └─ PassStatistics        (per method, DashMap)            │
//! │                                                              │
//! │  PassScheduler              Passes in order, methods in      │
//! │    └─ CompilationUnit       parallel; failed methods are     │
//! │       (MethodIr + VNs)      restored from a snapshot         │
//! │                                                              │
//! │  MethodPass trait           Interface for all passes         │
//! │    ├─ should_run()                                           │
//! │    └─ run_on_method()                                        │
//! │                                                              │
//! │  Passes                                                      │
//! │    ├─ AddCopiesPass         copy insertion                   │
//! │    └─ AssertionPropPass     global or local propagation      │
//! │                                                              │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod context;
mod events;
mod pass;
pub mod passes;
mod scheduler;

pub use config::AssertionPropConfig;
pub use context::{CompilerContext, PassStatistics};
pub use events::{DerivedStats, Event, EventBuilder, EventKind, EventLog, EventLogIter};
pub use pass::MethodPass;
pub use passes::{AddCopiesPass, AssertionPropPass};
pub use scheduler::{CompilationUnit, PassScheduler};
