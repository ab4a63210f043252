use thiserror::Error;

use crate::{
    ir::{InstId, OperandId},
    utils::graph::{EdgeId, NodeId},
};

/// Builds an [`Error::ContractViolation`] carrying the source location.
macro_rules! contract_violation {
    // Single string version
    ($msg:expr) => {
        crate::Error::ContractViolation {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::ContractViolation {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

pub(crate) use contract_violation;

/// The generic Error type, which covers every failure the middle-end can report.
///
/// Optimization passes never panic on malformed input. A pass that detects a
/// broken invariant returns one of these variants, and the
/// [`PassPipeline`](crate::compiler::PassPipeline) restores the graph to its
/// pre-pass state and continues with the next pass.
///
/// # Error Categories
///
/// ## Contract errors
/// - [`Error::ContractViolation`] - A documented precondition or IR invariant does not hold
/// - [`Error::StaleLiveness`] - Liveness was computed for an older revision of the graph
/// - [`Error::IterationLimit`] - A fixed point did not converge within its bound
///
/// ## Lookup errors
/// - [`Error::InvalidNode`], [`Error::InvalidEdge`], [`Error::InvalidInstruction`],
///   [`Error::InvalidOperand`] - An id does not name a live arena entry
///
/// ## Configuration errors
/// - [`Error::InvalidOption`] - An optimizer option string could not be parsed
///
/// # Examples
///
/// ```rust
/// use midend::{Error, OptimizerFlags};
///
/// match "unroll_factor=banana".parse::<OptimizerFlags>() {
///     Err(Error::InvalidOption(message)) => assert!(message.contains("unroll_factor")),
///     other => panic!("unexpected: {other:?}"),
/// }
/// ```
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A precondition of an operation or an invariant of the IR was violated.
    ///
    /// # Fields
    ///
    /// * `message` - What was violated
    /// * `file` - Source file where the violation was detected
    /// * `line` - Source line where the violation was detected
    #[error("Contract violation - {file}:{line}: {message}")]
    ContractViolation {
        /// Description of the violated contract
        message: String,
        /// The source file in which the violation was detected
        file: &'static str,
        /// The source line in which the violation was detected
        line: u32,
    },

    /// Liveness information does not match the graph it is queried against.
    ///
    /// Every CFG mutation bumps a revision counter; liveness remembers the
    /// revision it was computed for.
    #[error("Liveness computed for revision {computed} but graph is at revision {current}")]
    StaleLiveness {
        /// Revision the liveness was computed for
        computed: u64,
        /// Current revision of the graph
        current: u64,
    },

    /// A fixed-point iteration exceeded its bound.
    #[error("{analysis} did not converge within {limit} passes")]
    IterationLimit {
        /// Name of the analysis or pass
        analysis: &'static str,
        /// The bound that was exceeded
        limit: usize,
    },

    /// The node id does not name a live node.
    #[error("Invalid node - {0}")]
    InvalidNode(NodeId),

    /// The edge id does not name a live edge.
    #[error("Invalid edge - {0}")]
    InvalidEdge(EdgeId),

    /// The instruction id does not name a live instruction.
    #[error("Invalid instruction - {0}")]
    InvalidInstruction(InstId),

    /// The operand id is out of range.
    #[error("Invalid operand - {0}")]
    InvalidOperand(OperandId),

    /// An optimizer option could not be parsed.
    #[error("Invalid optimizer option - {0}")]
    InvalidOption(String),
}
