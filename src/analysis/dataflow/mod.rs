//! Data flow analysis framework over the control flow graph.
//!
//! The framework is built around three abstractions:
//!
//! - **Lattice**: the domain of abstract values with a meet operation
//! - **Analysis**: transfer functions and boundary conditions
//! - **Solver**: a worklist iteration to a fixpoint
//!
//! # Analyses Provided
//!
//! - [`LiveVariables`] / [`Liveness`]: which operands are live at node
//!   boundaries, stamped with the graph revision they describe

mod framework;
mod lattice;
mod liveness;
mod solver;

pub use framework::{AnalysisResults, DataFlowAnalysis, Direction};
pub use lattice::MeetSemiLattice;
pub use liveness::{LiveVariables, Liveness};
pub use solver::DataFlowSolver;
