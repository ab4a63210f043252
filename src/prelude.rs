//! # midend Prelude
//!
//! This module provides a convenient prelude for the most commonly used types
//! and traits of the middle-end. Import it to get the graph, its builder, the
//! analyses and the passes in one line.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all midend operations
pub use crate::Error;

/// The result type used throughout midend
pub use crate::Result;

/// Optimizer configuration
pub use crate::{OptimizerFlags, OptionKey};

// ================================================================================================
// Graph
// ================================================================================================

/// The graph and its building blocks
pub use crate::ir::{
    CfgBuilder, CmpKind, ControlFlowGraph, EdgeKind, InstFlags, InstId, NodeKind, Opcode,
    OperandId, OperandKind, SemType,
};

/// Safe-point facts
pub use crate::ir::{FactBase, Offset, PointerFact};

/// Graph ids
pub use crate::utils::graph::{EdgeId, NodeId};

// ================================================================================================
// Analyses
// ================================================================================================

/// Def-use links, loops and liveness
pub use crate::analysis::{ControlFlowQueries, DefUseIndex, Liveness, LoopTree};

// ================================================================================================
// Passes and Pipeline
// ================================================================================================

/// Running passes
pub use crate::compiler::{
    CompilationContext, CompilationSession, EventKind, EventLog, MethodId, OptPass, PassPipeline,
};

/// Transformations
pub use crate::compiler::{
    duplicate_region, peel_loop, redirect_edge, tail_duplicate, unroll_loop, DceOptions,
    DeadCodeEliminator, SafePointTracker, TrackerMode,
};
