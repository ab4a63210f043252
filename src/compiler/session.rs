//! Parallel compilation of independent methods.

use dashmap::{mapref::one::Ref, DashMap};
use rayon::prelude::*;

use crate::{
    compiler::{
        context::{CompilationContext, MethodId},
        events::EventLog,
        scheduler::{PassPipeline, PipelineOutcome},
    },
    ir::ControlFlowGraph,
    OptimizerFlags,
};

/// The optimized graph of one method and what the pipeline did to it.
#[derive(Debug, Clone)]
pub struct MethodOutcome {
    /// The graph after the pipeline.
    pub cfg: ControlFlowGraph,
    /// Completed and rolled back passes.
    pub pipeline: PipelineOutcome,
}

/// Compiles many methods with one pipeline and one set of flags.
///
/// Methods share nothing but the read-only pipeline and flags, so they are
/// compiled in parallel with `rayon`. Results land in a concurrent map keyed
/// by method and events in a single shared [`EventLog`].
///
/// # Examples
///
/// ```rust
/// use midend::compiler::{CompilationSession, MethodId};
/// use midend::ir::CfgBuilder;
/// use midend::OptimizerFlags;
///
/// let methods = (0..4).map(|i| {
///     let cfg = CfgBuilder::new().build_with(|f| f.block(0, |b| b.ret(None)));
///     (MethodId(i), cfg)
/// });
///
/// let session = CompilationSession::new(OptimizerFlags::default());
/// session.compile(methods.collect());
/// assert_eq!(session.len(), 4);
/// assert!(session.outcome(MethodId(2)).is_some());
/// ```
pub struct CompilationSession {
    flags: OptimizerFlags,
    pipeline: PassPipeline,
    events: EventLog,
    results: DashMap<MethodId, MethodOutcome>,
}

impl CompilationSession {
    /// Creates a session running the standard pipeline.
    #[must_use]
    pub fn new(flags: OptimizerFlags) -> Self {
        Self::with_pipeline(flags, PassPipeline::standard())
    }

    /// Creates a session running `pipeline`.
    #[must_use]
    pub fn with_pipeline(flags: OptimizerFlags, pipeline: PassPipeline) -> Self {
        Self {
            flags,
            pipeline,
            events: EventLog::new(),
            results: DashMap::new(),
        }
    }

    /// Compiles `methods` in parallel.
    ///
    /// A method compiled earlier under the same id is replaced.
    ///
    /// # Returns
    ///
    /// The number of methods whose graph changed.
    pub fn compile(&self, methods: Vec<(MethodId, ControlFlowGraph)>) -> usize {
        log::debug!("compiling {} methods", methods.len());
        methods
            .into_par_iter()
            .map(|(method, mut cfg)| {
                let ctx = CompilationContext::new(method, &self.flags, &self.events);
                let pipeline = self.pipeline.run(&mut cfg, &ctx);
                if !pipeline.skipped.is_empty() {
                    log::warn!("{method}: {} passes rolled back", pipeline.skipped.len());
                }
                let changed = pipeline.changed;
                self.results.insert(method, MethodOutcome { cfg, pipeline });
                usize::from(changed)
            })
            .sum()
    }

    /// Returns the outcome of a compiled method.
    #[must_use]
    pub fn outcome(&self, method: MethodId) -> Option<Ref<'_, MethodId, MethodOutcome>> {
        self.results.get(&method)
    }

    /// Removes and returns the outcome of a compiled method.
    pub fn take(&self, method: MethodId) -> Option<MethodOutcome> {
        self.results.remove(&method).map(|(_, outcome)| outcome)
    }

    /// Returns the number of compiled methods held by the session.
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Returns `true` if no compiled method is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Returns the events of every compilation so far.
    #[must_use]
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Returns the flags every method is compiled with.
    #[must_use]
    pub fn flags(&self) -> &OptimizerFlags {
        &self.flags
    }
}
