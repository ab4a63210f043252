//! Optimization passes and the machinery that runs them.
//!
//! This module sits on top of [`crate::ir`] (the graph) and
//! [`crate::analysis`] (dominance, loops, liveness, def-use):
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      Compiler Pipeline                           │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  CompilationSession          Many methods, compiled in parallel  │
//! │    ├─ OptimizerFlags          (shared, read-only)                │
//! │    ├─ Outcomes                (DashMap keyed by MethodId)        │
//! │    └─ EventLog                (lock-free, shared)                │
//! │                                                                  │
//! │  PassPipeline                Ordered passes for one method       │
//! │    ├─ snapshot before each pass                                  │
//! │    ├─ verify before/after (checked builds)                       │
//! │    └─ roll back failing passes, record PassSkipped               │
//! │                                                                  │
//! │  OptPass trait               Interface for all passes            │
//! │    ├─ should_run()            Enabled by the flags?              │
//! │    └─ run()                   Transform one graph                │
//! │                                                                  │
//! │  Passes                                                          │
//! │    ├─ Cleanup: unreachable code purge, DCE + width narrowing     │
//! │    ├─ Duplication: redundant branch folding, peeling, unrolling  │
//! │    └─ GC: safe-point pointer tracking                            │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The duplicator and the other transformations behind the passes are
//! public as well, for callers that drive them directly.

mod context;
mod events;
mod pass;
mod passes;
mod scheduler;
mod session;

pub use context::{CompilationContext, MethodId};
pub use events::{Event, EventBuilder, EventCategory, EventKind, EventLog};
pub use pass::OptPass;
pub use passes::{
    bypass_empty_blocks, conversion_is_redundant, duplicate_region, fold_branch, merge_blocks,
    peel_loop, purge_unreachable, redirect_edge, required_width, tail_duplicate, unroll_loop,
    DceOptions, DceStats, DeadCodeEliminationPass, DeadCodeEliminator, LoopPeelingPass,
    LoopUnrollingPass, PurgeStats, RedundantBranchFoldingPass, RegionClone, SafePointPass,
    SafePointStats, SafePointTracker, TrackerMode, UnreachableCodePass,
};
pub use scheduler::{PassPipeline, PipelineOutcome};
pub use session::{CompilationSession, MethodOutcome};
