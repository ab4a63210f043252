//! Analyses over the control flow graph.
//!
//! These are the read-side building blocks the optimization passes in
//! [`crate::compiler`] consume:
//!
//! - [`DefUseIndex`] - definition to use links, kept in sync by the passes
//! - [`LoopTree`] / [`ControlFlowQueries`] - dominance, back edges and loop nesting
//! - [`dataflow`] - the generic worklist framework and operand [`Liveness`]
//!
//! None of these mutate the graph. Analyses that summarize the graph remember
//! the revision they were computed for; consumers recompute them after a
//! mutation.

pub mod dataflow;
mod defuse;
mod loops;

pub use dataflow::Liveness;
pub use defuse::{DefUseIndex, Link};
pub use loops::{ControlFlowQueries, LoopTree, NaturalLoop};
