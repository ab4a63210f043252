//! Trait definitions for graph abstractions.
//!
//! The algorithms in [`algorithms`](super::algorithms) are written against
//! these traits rather than against [`ControlFlowGraph`](crate::ir::ControlFlowGraph)
//! directly, so they also run on the small edge-list graphs used by tests.
//!
//! - [`GraphBase`] - node capacity and node iteration
//! - [`Successors`] - forward adjacency
//! - [`Predecessors`] - backward adjacency
//! - [`RootedGraph`] - a designated entry node

use crate::utils::graph::NodeId;

/// Core graph properties.
pub trait GraphBase {
    /// Returns the size of the node index space.
    ///
    /// Per-node side tables are sized with this value. For arena-backed graphs
    /// it includes removed nodes, so it may exceed the number of nodes yielded
    /// by [`node_ids`](GraphBase::node_ids).
    fn node_count(&self) -> usize;

    /// Returns an iterator over all live node identifiers in ascending order.
    fn node_ids(&self) -> impl Iterator<Item = NodeId>;
}

/// Graphs that support forward edge traversal.
pub trait Successors: GraphBase {
    /// Returns the targets of the outgoing edges of `node`, in edge order.
    ///
    /// A target appears once per edge, so parallel edges yield duplicates.
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId>;
}

/// Graphs that support backward edge traversal.
pub trait Predecessors: GraphBase {
    /// Returns the sources of the incoming edges of `node`, in edge order.
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId>;
}

/// Graphs with a designated entry node.
pub trait RootedGraph: Successors + Predecessors {
    /// Returns the entry node.
    fn entry(&self) -> NodeId;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::graph::TestGraph;

    #[test]
    fn test_edge_list_adjacency() {
        let graph = TestGraph::new(4, &[(0, 1), (0, 2), (1, 3), (2, 3)]);
        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.node_ids().count(), 4);
        assert_eq!(
            graph.successors(NodeId::new(0)).collect::<Vec<_>>(),
            vec![NodeId::new(1), NodeId::new(2)]
        );
        assert_eq!(
            graph.predecessors(NodeId::new(3)).collect::<Vec<_>>(),
            vec![NodeId::new(1), NodeId::new(2)]
        );
        assert_eq!(graph.entry(), NodeId::new(0));
    }
}
