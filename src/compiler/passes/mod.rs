//! Optimization passes and the graph transformations they are built from.
//!
//! # Transformations
//!
//! - [`duplicate_region`] / [`redirect_edge`] - copy a single-entry region and
//!   move edges onto the copy, repairing SSA for values that escape it
//! - [`tail_duplicate`] / [`fold_branch`] - give one predecessor a private
//!   copy of a node; fold a branch with a known outcome
//! - [`peel_loop`] / [`unroll_loop`] - loop transformations on top of the
//!   duplicator
//! - [`purge_unreachable`] - remove nodes with no path from the entry
//! - [`DeadCodeEliminator`] - mark and sweep with bit-width narrowing
//! - [`merge_blocks`] / [`bypass_empty_blocks`] - block cleanup after the sweep
//! - [`SafePointTracker`] - pointer/base/offset facts for the collector
//!
//! # Passes
//!
//! Each transformation with a pipeline role has an [`OptPass`] wrapper:
//!
//! | pass | name |
//! |---|---|
//! | [`UnreachableCodePass`] | `unreachable-code` |
//! | [`DeadCodeEliminationPass`] | `dead-code-elimination` |
//! | [`RedundantBranchFoldingPass`] | `redundant-branch-folding` |
//! | [`LoopPeelingPass`] | `loop-peeling` |
//! | [`LoopUnrollingPass`] | `loop-unrolling` |
//! | [`SafePointPass`] | `safe-point-tracker` |
//!
//! [`OptPass`]: crate::compiler::OptPass

mod blockmerge;
mod deadcode;
mod duplicate;
mod peel;
mod safepoint;
mod taildup;
mod unreachable;
mod width;

pub use blockmerge::{bypass_empty_blocks, merge_blocks};
pub use deadcode::{DceOptions, DceStats, DeadCodeEliminationPass, DeadCodeEliminator};
pub use duplicate::{duplicate_region, redirect_edge, RegionClone};
pub use peel::{peel_loop, unroll_loop, LoopPeelingPass, LoopUnrollingPass};
pub use safepoint::{SafePointPass, SafePointStats, SafePointTracker, TrackerMode};
pub use taildup::{fold_branch, tail_duplicate, RedundantBranchFoldingPass};
pub use unreachable::{purge_unreachable, PurgeStats, UnreachableCodePass};
pub use width::{conversion_is_redundant, required_width};
