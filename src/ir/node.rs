//! Control flow graph nodes.

use crate::{
    ir::InstId,
    utils::graph::EdgeId,
};

/// The role of a node in the control flow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Method entry; holds code like any block.
    Entry,
    /// Ordinary basic block.
    Block,
    /// Exception dispatch node reached through dispatch edges.
    Dispatch,
    /// Join point for all returning blocks.
    Return,
    /// Unique sink of the graph.
    Exit,
}

/// A node: an ordered instruction list plus ordered edge lists.
///
/// Incoming edge `i` corresponds to source `i` of every phi in the node.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) first: Option<InstId>,
    pub(crate) last: Option<InstId>,
    pub(crate) preds: Vec<EdgeId>,
    pub(crate) succs: Vec<EdgeId>,
    pub(crate) exec_count: f64,
    pub(crate) removed: bool,
}

impl Node {
    pub(crate) fn new(kind: NodeKind) -> Self {
        Node {
            kind,
            first: None,
            last: None,
            preds: Vec::new(),
            succs: Vec::new(),
            exec_count: 0.0,
            removed: false,
        }
    }

    /// Returns the node kind.
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Returns the label, which is always the first instruction.
    #[must_use]
    pub fn label(&self) -> Option<InstId> {
        self.first
    }

    /// Returns the last instruction.
    #[must_use]
    pub fn last(&self) -> Option<InstId> {
        self.last
    }

    /// Returns the incoming edges in phi order.
    #[must_use]
    pub fn preds(&self) -> &[EdgeId] {
        &self.preds
    }

    /// Returns the outgoing edges.
    #[must_use]
    pub fn succs(&self) -> &[EdgeId] {
        &self.succs
    }

    /// Returns the estimated execution count.
    #[must_use]
    pub fn exec_count(&self) -> f64 {
        self.exec_count
    }

    /// Returns `true` once the node was removed from the graph.
    #[must_use]
    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// Returns `true` for nodes that hold ordinary code.
    #[must_use]
    pub fn is_block(&self) -> bool {
        matches!(self.kind, NodeKind::Entry | NodeKind::Block)
    }
}
