//! Pass pipeline for orchestrating optimization pass execution.
//!
//! The [`PassPipeline`] runs an ordered list of passes over one method's
//! graph. Before each pass it takes a snapshot; a pass that fails (or, with
//! checking on, leaves or finds a graph that does not verify) is rolled back
//! and recorded as [`EventKind::PassSkipped`], and the pipeline moves on to
//! the next pass. The pipeline itself never fails.

use crate::{
    compiler::{
        context::CompilationContext,
        pass::OptPass,
        passes::{
            DeadCodeEliminationPass, LoopPeelingPass, LoopUnrollingPass,
            RedundantBranchFoldingPass, SafePointPass, UnreachableCodePass,
        },
        EventKind,
    },
    ir::{verify, ControlFlowGraph},
    Result,
};

/// What a pipeline run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineOutcome {
    /// Names of the passes that ran to completion.
    pub completed: Vec<&'static str>,
    /// Names of the passes that failed and were rolled back.
    pub skipped: Vec<&'static str>,
    /// Whether any completed pass changed the graph.
    pub changed: bool,
}

/// Runs passes over one graph in a fixed order.
///
/// The standard pipeline is:
///
/// 1. `unreachable-code`
/// 2. `dead-code-elimination`
/// 3. `redundant-branch-folding`
/// 4. `loop-peeling`
/// 5. `loop-unrolling`
/// 6. `dead-code-elimination`
/// 7. `safe-point-tracker`
///
/// Passes disabled by the [`OptimizerFlags`](crate::OptimizerFlags) of the
/// context report so through [`OptPass::should_run`] and are left out.
///
/// # Examples
///
/// ```rust
/// use midend::compiler::{CompilationContext, EventLog, MethodId, PassPipeline};
/// use midend::ir::{CfgBuilder, SemType};
/// use midend::OptimizerFlags;
///
/// let mut cfg = CfgBuilder::new().build_with(|f| {
///     f.block(0, |b| {
///         let a = b.arg(0, SemType::I32);
///         let _unused = b.add(a, a);
///         b.ret(Some(a));
///     });
/// });
///
/// let flags = OptimizerFlags::default();
/// let events = EventLog::new();
/// let ctx = CompilationContext::new(MethodId(0), &flags, &events);
/// let outcome = PassPipeline::standard().run(&mut cfg, &ctx);
/// assert!(outcome.changed);
/// assert!(outcome.skipped.is_empty());
/// ```
pub struct PassPipeline {
    passes: Vec<Box<dyn OptPass>>,
}

impl Default for PassPipeline {
    fn default() -> Self {
        Self::standard()
    }
}

impl PassPipeline {
    /// Creates a pipeline with no passes.
    #[must_use]
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    /// Creates the standard pipeline.
    #[must_use]
    pub fn standard() -> Self {
        Self::new()
            .with_pass(UnreachableCodePass::new())
            .with_pass(DeadCodeEliminationPass::new())
            .with_pass(RedundantBranchFoldingPass::new())
            .with_pass(LoopPeelingPass::new())
            .with_pass(LoopUnrollingPass::new())
            .with_pass(DeadCodeEliminationPass::new())
            .with_pass(SafePointPass::new())
    }

    /// Appends a pass.
    #[must_use]
    pub fn with_pass(mut self, pass: impl OptPass + 'static) -> Self {
        self.passes.push(Box::new(pass));
        self
    }

    /// Appends a boxed pass.
    pub fn push(&mut self, pass: Box<dyn OptPass>) {
        self.passes.push(pass);
    }

    /// Returns the names of the passes in execution order.
    #[must_use]
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Returns the number of passes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    /// Returns `true` if the pipeline has no passes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Runs every enabled pass once, in order.
    ///
    /// # Arguments
    ///
    /// * `cfg` - The graph to optimize.
    /// * `ctx` - The compilation context; receives pass boundary events.
    ///
    /// # Returns
    ///
    /// Which passes completed, which were rolled back and whether the graph
    /// changed.
    pub fn run(&self, cfg: &mut ControlFlowGraph, ctx: &CompilationContext<'_>) -> PipelineOutcome {
        let mut outcome = PipelineOutcome::default();

        for pass in &self.passes {
            let name = pass.name();
            if !pass.should_run(ctx) {
                log::trace!("{}: {} disabled", ctx.method, name);
                continue;
            }

            ctx.events
                .record(EventKind::PassStarted)
                .method(ctx.method)
                .pass(name)
                .message(name);

            let snapshot = cfg.clone();
            match Self::run_pass(pass.as_ref(), cfg, ctx) {
                Ok(changed) => {
                    outcome.changed |= changed;
                    outcome.completed.push(name);
                    ctx.events
                        .record(EventKind::PassCompleted)
                        .method(ctx.method)
                        .pass(name)
                        .message(if changed {
                            format!("{name} changed the graph")
                        } else {
                            format!("{name} made no changes")
                        });
                }
                Err(error) => {
                    *cfg = snapshot;
                    log::warn!("{}: {} rolled back: {}", ctx.method, name, error);
                    outcome.skipped.push(name);
                    ctx.events
                        .record(EventKind::PassSkipped)
                        .method(ctx.method)
                        .pass(name)
                        .message(error.to_string());
                }
            }
        }

        outcome
    }

    fn run_pass(
        pass: &dyn OptPass,
        cfg: &mut ControlFlowGraph,
        ctx: &CompilationContext<'_>,
    ) -> Result<bool> {
        if ctx.flags.checked {
            verify(cfg)?;
        }
        let changed = pass.run(cfg, ctx)?;
        if ctx.flags.checked && changed {
            verify(cfg)?;
        }
        Ok(changed)
    }
}
