//! What the passes did, as a shared append-only log.
//!
//! Transformations record one event per change they make to a graph; the
//! [`PassPipeline`](crate::compiler::PassPipeline) records where each pass
//! started and ended and which passes it rolled back. A
//! [`CompilationSession`](crate::compiler::CompilationSession) hands the same
//! log to every worker thread, so recording only needs `&EventLog`.
//!
//! # Example
//!
//! ```rust
//! use midend::compiler::{EventCategory, EventKind, EventLog, MethodId};
//!
//! let log = EventLog::new();
//! log.record(EventKind::InstructionRemoved)
//!     .at(MethodId(3), 17)
//!     .message("i17 = add i4, i5");
//! log.note(EventKind::Info, "starting pipeline");
//!
//! assert_eq!(log.count_kind(EventKind::InstructionRemoved), 1);
//! assert_eq!(log.in_category(EventCategory::Diagnostic).count(), 1);
//! assert_eq!(log.summary(), "1 instruction removed");
//! ```

use std::{collections::BTreeMap, fmt};

use strum::{Display, EnumIter, IntoEnumIterator};

use crate::compiler::MethodId;

/// Coarse grouping of [`EventKind`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    /// The graph changed.
    Transformation,
    /// Pass boundaries recorded by the pipeline.
    Pipeline,
    /// Free-form notes.
    Diagnostic,
}

/// What happened.
///
/// The `Display` form is the lower-case phrase used in summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumIter)]
pub enum EventKind {
    /// An instruction was unlinked.
    #[strum(serialize = "instruction removed")]
    InstructionRemoved,
    /// A node was removed from the graph.
    #[strum(serialize = "block removed")]
    BlockRemoved,
    /// A block was absorbed by its only predecessor.
    #[strum(serialize = "blocks merged")]
    BlocksMerged,
    /// An edge was dropped: the dispatch edge of a removed throwing
    /// instruction, or an edge leaving unreachable code.
    #[strum(serialize = "edge removed")]
    EdgeRemoved,
    /// A use now reads the root of a copy chain.
    #[strum(serialize = "copy propagated")]
    CopyPropagated,
    /// A conversion became a copy after width tracking.
    #[strum(serialize = "conversion narrowed")]
    ConversionNarrowed,
    /// A plain variable declaration was deleted.
    #[strum(serialize = "variable removed")]
    VariableRemoved,
    /// A region was cloned.
    #[strum(serialize = "region duplicated")]
    RegionDuplicated,
    /// A loop's first iteration was split off.
    #[strum(serialize = "loop peeled")]
    LoopPeeled,
    /// A loop body was replicated.
    #[strum(serialize = "loop unrolled")]
    LoopUnrolled,
    /// A conditional branch became an unconditional edge.
    #[strum(serialize = "branch folded")]
    BranchFolded,
    /// Pointer facts were attached to a safe point.
    #[strum(serialize = "safe points recorded")]
    SafePointsRecorded,
    /// A synthetic base was created for pointers merging from different
    /// objects.
    #[strum(serialize = "base synthesized")]
    BaseSynthesized,

    /// A pass started.
    #[strum(serialize = "pass started")]
    PassStarted,
    /// A pass returned successfully.
    #[strum(serialize = "pass completed")]
    PassCompleted,
    /// A pass failed and the graph was restored.
    #[strum(serialize = "pass skipped")]
    PassSkipped,

    /// Informational note.
    #[strum(serialize = "info")]
    Info,
    /// Something unexpected but recoverable.
    #[strum(serialize = "warning")]
    Warning,
    /// Something failed.
    #[strum(serialize = "error")]
    Error,
}

impl EventKind {
    /// The category this kind belongs to.
    #[must_use]
    pub fn category(self) -> EventCategory {
        match self {
            Self::PassStarted | Self::PassCompleted | Self::PassSkipped => EventCategory::Pipeline,
            Self::Info | Self::Warning | Self::Error => EventCategory::Diagnostic,
            _ => EventCategory::Transformation,
        }
    }
}

/// One entry of an [`EventLog`].
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// What happened.
    pub kind: EventKind,
    /// The method it happened in, when known.
    pub method: Option<MethodId>,
    /// Node or instruction index inside the method.
    pub location: Option<usize>,
    /// Description; defaults to the kind's phrase.
    pub message: String,
    /// Name of the pass that recorded the event.
    pub pass: Option<&'static str>,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(method) = self.method {
            write!(f, "{method}")?;
            if let Some(location) = self.location {
                write!(f, "@{location}")?;
            }
            f.write_str(": ")?;
        }
        if let Some(pass) = self.pass {
            write!(f, "{pass}: ")?;
        }
        f.write_str(&self.message)
    }
}

/// Fills in an [`Event`]; it is appended to the log when dropped.
///
/// Created by [`EventLog::record`].
pub struct EventBuilder<'a> {
    log: &'a EventLog,
    event: Event,
}

impl EventBuilder<'_> {
    /// Sets the method and the node or instruction index.
    pub fn at(mut self, method: MethodId, location: usize) -> Self {
        self.event.method = Some(method);
        self.event.location = Some(location);
        self
    }

    /// Sets the method only.
    pub fn method(mut self, method: MethodId) -> Self {
        self.event.method = Some(method);
        self
    }

    /// Replaces the default message.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.event.message = message.into();
        self
    }

    /// Tags the event with the recording pass.
    pub fn pass(mut self, name: &'static str) -> Self {
        self.event.pass = Some(name);
        self
    }
}

impl Drop for EventBuilder<'_> {
    fn drop(&mut self) {
        let event = Event {
            kind: self.event.kind,
            method: self.event.method.take(),
            location: self.event.location.take(),
            message: std::mem::take(&mut self.event.message),
            pass: self.event.pass.take(),
        };
        self.log.events.push(event);
    }
}

/// Append-only, thread-safe collection of [`Event`]s.
#[derive(Debug, Default)]
pub struct EventLog {
    events: boxcar::Vec<Event>,
}

impl EventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.count()
    }

    /// Returns `true` if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Starts an event of `kind`. See [`EventBuilder`].
    pub fn record(&self, kind: EventKind) -> EventBuilder<'_> {
        EventBuilder {
            log: self,
            event: Event {
                kind,
                method: None,
                location: None,
                message: kind.to_string(),
                pass: None,
            },
        }
    }

    /// Records a bare event of `kind` carrying `message`.
    pub fn note(&self, kind: EventKind, message: impl Into<String>) {
        drop(self.record(kind).message(message));
    }

    /// Appends every event of `other` to this log.
    pub fn extend_from(&self, other: &EventLog) {
        for event in other.iter() {
            self.events.push(event.clone());
        }
    }

    /// Iterates over the events in recording order.
    ///
    /// Events recorded concurrently are ordered by the slot they won.
    pub fn iter(&self) -> impl Iterator<Item = &Event> + '_ {
        self.events.iter().map(|(_, event)| event)
    }

    /// Returns `true` if an event of `kind` was recorded.
    #[must_use]
    pub fn has(&self, kind: EventKind) -> bool {
        self.iter().any(|e| e.kind == kind)
    }

    /// Number of events of `kind`.
    #[must_use]
    pub fn count_kind(&self, kind: EventKind) -> usize {
        self.iter().filter(|e| e.kind == kind).count()
    }

    /// Events recorded for `method`.
    pub fn filter_method(&self, method: MethodId) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(move |e| e.method == Some(method))
    }

    /// Events whose kind belongs to `category`.
    pub fn in_category(&self, category: EventCategory) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(move |e| e.kind.category() == category)
    }

    /// Event counts per kind, in declaration order of [`EventKind`].
    #[must_use]
    pub fn counts(&self) -> BTreeMap<EventKind, usize> {
        let mut counts = BTreeMap::new();
        for event in self.iter() {
            *counts.entry(event.kind).or_insert(0) += 1;
        }
        counts
    }

    /// One line listing how often each transformation happened, e.g.
    /// `"2 instruction removed, 1 loop peeled"`.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "no events".to_string();
        }
        let counts = self.counts();
        let parts: Vec<String> = EventKind::iter()
            .filter(|k| k.category() == EventCategory::Transformation)
            .filter_map(|k| counts.get(&k).map(|n| format!("{n} {k}")))
            .collect();
        if parts.is_empty() {
            format!("{} events", self.len())
        } else {
            parts.join(", ")
        }
    }
}

impl Clone for EventLog {
    fn clone(&self) -> Self {
        self.iter().cloned().collect()
    }
}

impl FromIterator<Event> for EventLog {
    fn from_iter<T: IntoIterator<Item = Event>>(iter: T) -> Self {
        let log = Self::new();
        for event in iter {
            log.events.push(event);
        }
        log
    }
}
