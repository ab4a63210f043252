//! The optimization pass trait.

use crate::{
    compiler::context::CompilationContext, ir::ControlFlowGraph, Result,
};

/// An optimization pass over one method's control flow graph.
///
/// Passes are stateless between methods and must be thread-safe
/// (`Send + Sync`) so a single pipeline can serve methods compiled in
/// parallel. Changes are reported through `ctx.events`.
pub trait OptPass: Send + Sync {
    /// Unique name for logging and debugging.
    fn name(&self) -> &'static str;

    /// Get a description of what this pass does.
    fn description(&self) -> &'static str {
        "No description available"
    }

    /// Should this pass run with the given configuration?
    ///
    /// Passes disabled by the configuration (for example unrolling with a
    /// factor of 1) return `false` and are skipped without a trace.
    fn should_run(&self, _ctx: &CompilationContext<'_>) -> bool {
        true
    }

    /// Runs the pass.
    ///
    /// Returns `true` if the graph was changed.
    ///
    /// # Arguments
    ///
    /// * `cfg` - The graph to transform.
    /// * `ctx` - The compilation context.
    ///
    /// # Errors
    ///
    /// Returns an error if the input violates a precondition of the pass. The
    /// graph may be partially transformed in that case; the
    /// [`PassPipeline`](crate::compiler::PassPipeline) restores it.
    fn run(&self, cfg: &mut ControlFlowGraph, ctx: &CompilationContext<'_>) -> Result<bool>;
}
