use thiserror::Error;

use crate::ir::{BlockId, LclNum, NodeId};

macro_rules! invariant_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Invariant {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Invariant {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type for everything this library can return.
///
/// Assertion propagation is an optimization over already-validated IR, so the
/// common "failure" of the pass, declining to optimize, is never an error: it
/// is expressed as `None` or [`crate::assertion::AssertionIndex::NONE`]. The
/// variants here cover internal consistency violations and misconfiguration.
///
/// # Error Categories
///
/// ## Internal Consistency
/// - [`Error::Invariant`] - An internal invariant of the IR or the assertion table was broken
/// - [`Error::NodeNotFound`] - A rewrite could not locate the node it was meant to replace
/// - [`Error::BlockNotFound`] - A block id does not exist in the method
/// - [`Error::LocalNotFound`] - A local slot does not exist in the local table
///
/// ## Setup
/// - [`Error::SsaRequired`] - A global run was requested on a method without SSA
/// - [`Error::Configuration`] - Invalid pass configuration
///
/// # Examples
///
/// ```rust,ignore
/// use assertprop::Error;
///
/// match pass.run_on_method(&mut method, &values, &ctx) {
///     Ok(changed) => println!("changed: {changed}"),
///     Err(Error::Invariant { message, file, line }) => {
///         eprintln!("internal error: {message} ({file}:{line})");
///     }
///     Err(e) => eprintln!("{e}"),
/// }
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An internal invariant was violated.
    ///
    /// The method being optimized is abandoned; the scheduler restores the
    /// snapshot taken before the pass started.
    #[error("Invariant violated - {file}:{line}: {message}")]
    Invariant {
        /// The message to be printed for the invariant violation
        message: String,
        /// The source file in which this error occurred
        file: &'static str,
        /// The source line in which this error occurred
        line: u32,
    },

    /// A node could not be located through its parent link.
    #[error("Node {0} not found in its statement")]
    NodeNotFound(NodeId),

    /// A block id is out of range for the method.
    #[error("Block {0} does not exist")]
    BlockNotFound(BlockId),

    /// A local slot is out of range for the local table.
    #[error("Local {0} does not exist")]
    LocalNotFound(LclNum),

    /// The method has not been put into SSA form.
    #[error("Global assertion propagation requires SSA form")]
    SsaRequired,

    /// The pass configuration is invalid.
    #[error("Invalid configuration - {0}")]
    Configuration(String),
}
