//! Generic directed-graph infrastructure.
//!
//! The control flow graph implements the traits defined here, which lets the
//! traversal and dominator algorithms stay independent of the IR.

mod traits;

pub mod algorithms;

pub use crate::utils::id::{EdgeId, NodeId};
pub use traits::{GraphBase, Predecessors, RootedGraph, Successors};

/// Minimal edge-list graph rooted at node 0, used by the algorithm tests.
#[cfg(test)]
pub(crate) struct TestGraph {
    node_count: usize,
    edges: Vec<(NodeId, NodeId)>,
}

#[cfg(test)]
impl TestGraph {
    pub(crate) fn new(node_count: usize, edges: &[(usize, usize)]) -> Self {
        TestGraph {
            node_count,
            edges: edges
                .iter()
                .map(|&(a, b)| (NodeId::new(a), NodeId::new(b)))
                .collect(),
        }
    }
}

#[cfg(test)]
impl GraphBase for TestGraph {
    fn node_count(&self) -> usize {
        self.node_count
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.node_count).map(NodeId::new)
    }
}

#[cfg(test)]
impl Successors for TestGraph {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.edges
            .iter()
            .filter(move |(src, _)| *src == node)
            .map(|(_, dst)| *dst)
    }
}

#[cfg(test)]
impl Predecessors for TestGraph {
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.edges
            .iter()
            .filter(move |(_, dst)| *dst == node)
            .map(|(src, _)| *src)
    }
}

#[cfg(test)]
impl RootedGraph for TestGraph {
    fn entry(&self) -> NodeId {
        NodeId::new(0)
    }
}
