//! Control flow graph edges.

use std::fmt;

use crate::utils::graph::NodeId;

/// The kind of control transfer an edge represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// Fall-through or unconditional jump.
    Unconditional,
    /// Taken when the node's branch condition holds.
    True,
    /// Taken when the node's branch condition does not hold.
    False,
    /// Exceptional transfer to a dispatch node.
    Dispatch,
    /// Switch case with the given selector value.
    Switch(u32),
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeKind::Unconditional => f.write_str(""),
            EdgeKind::True => f.write_str("T"),
            EdgeKind::False => f.write_str("F"),
            EdgeKind::Dispatch => f.write_str("dispatch"),
            EdgeKind::Switch(n) => write!(f, "case {n}"),
        }
    }
}

/// A directed edge between two nodes.
#[derive(Debug, Clone)]
pub struct Edge {
    pub(crate) source: NodeId,
    pub(crate) target: NodeId,
    pub(crate) kind: EdgeKind,
    pub(crate) prob: f64,
    pub(crate) removed: bool,
}

impl Edge {
    /// Returns the source node.
    #[must_use]
    pub fn source(&self) -> NodeId {
        self.source
    }

    /// Returns the target node.
    #[must_use]
    pub fn target(&self) -> NodeId {
        self.target
    }

    /// Returns the edge kind.
    #[must_use]
    pub fn kind(&self) -> EdgeKind {
        self.kind
    }

    /// Returns the probability of taking this edge out of its source.
    #[must_use]
    pub fn prob(&self) -> f64 {
        self.prob
    }

    /// Returns `true` once the edge was removed from the graph.
    #[must_use]
    pub fn is_removed(&self) -> bool {
        self.removed
    }
}
