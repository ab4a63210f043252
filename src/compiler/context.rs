//! Per-compilation context.

use std::fmt;

use crate::{compiler::events::EventLog, OptimizerFlags};

/// Identifier of the method being compiled, as assigned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MethodId(pub u32);

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// Everything a pass may consult besides the graph it mutates.
///
/// One context exists per method compilation. It borrows the configuration
/// and the event sink, so no state is shared between compilations except the
/// append-only event log.
#[derive(Clone, Copy)]
pub struct CompilationContext<'a> {
    /// The method being compiled.
    pub method: MethodId,
    /// Optimizer configuration.
    pub flags: &'a OptimizerFlags,
    /// Event sink.
    pub events: &'a EventLog,
}

impl<'a> CompilationContext<'a> {
    /// Creates a context for one method.
    #[must_use]
    pub fn new(method: MethodId, flags: &'a OptimizerFlags, events: &'a EventLog) -> Self {
        Self {
            method,
            flags,
            events,
        }
    }
}
