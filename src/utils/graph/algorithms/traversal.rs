//! Graph traversal orders.
//!
//! Every traversal here is iterative so that deeply nested or very long
//! control flow graphs cannot overflow the native stack.

use crate::utils::graph::{NodeId, Successors};

/// Depth-first pre-order iterator over the nodes reachable from a start node.
///
/// Successors are visited in edge order.
pub struct DfsIterator<'g, G: Successors> {
    graph: &'g G,
    stack: Vec<NodeId>,
    visited: Vec<bool>,
}

impl<'g, G: Successors> DfsIterator<'g, G> {
    fn new(graph: &'g G, start: NodeId) -> Self {
        let node_count = graph.node_count();
        let mut visited = vec![false; node_count];
        let stack = if start.index() < node_count {
            vec![start]
        } else {
            Vec::new()
        };
        if let Some(slot) = visited.get_mut(start.index()) {
            *slot = true;
        }
        DfsIterator {
            graph,
            stack,
            visited,
        }
    }
}

impl<G: Successors> Iterator for DfsIterator<'_, G> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;

        let successors: Vec<NodeId> = self.graph.successors(node).collect();
        for &succ in successors.iter().rev() {
            if !self.visited[succ.index()] {
                self.visited[succ.index()] = true;
                self.stack.push(succ);
            }
        }

        Some(node)
    }
}

/// Returns a depth-first pre-order iterator starting at `start`.
///
/// # Arguments
///
/// * `graph` - The graph to traverse
/// * `start` - The starting node
///
/// # Returns
///
/// An iterator yielding each node reachable from `start` exactly once. An
/// out-of-range `start` yields nothing.
pub fn dfs<G: Successors>(graph: &G, start: NodeId) -> DfsIterator<'_, G> {
    DfsIterator::new(graph, start)
}

/// Returns the set of nodes reachable from `start` as a dense flag vector.
///
/// The vector is indexed by node index and sized by
/// [`GraphBase::node_count`](crate::utils::graph::GraphBase::node_count).
#[must_use]
pub fn reachable<G: Successors>(graph: &G, start: NodeId) -> Vec<bool> {
    let mut flags = vec![false; graph.node_count()];
    for node in dfs(graph, start) {
        flags[node.index()] = true;
    }
    flags
}

/// Computes the postorder of the nodes reachable from `start`.
///
/// A node is emitted after every successor first reached through it. Children
/// are explored in edge order.
#[must_use]
pub fn postorder<G: Successors>(graph: &G, start: NodeId) -> Vec<NodeId> {
    let node_count = graph.node_count();
    if start.index() >= node_count {
        return Vec::new();
    }

    let mut visited = vec![false; node_count];
    let mut result = Vec::with_capacity(node_count);
    // Each frame holds the node and the successors still to explore.
    let mut stack: Vec<(NodeId, std::vec::IntoIter<NodeId>)> = Vec::new();

    visited[start.index()] = true;
    stack.push((start, graph.successors(start).collect::<Vec<_>>().into_iter()));

    while let Some((node, children)) = stack.last_mut() {
        match children.next() {
            Some(child) => {
                if !visited[child.index()] {
                    visited[child.index()] = true;
                    let grandchildren = graph.successors(child).collect::<Vec<_>>();
                    stack.push((child, grandchildren.into_iter()));
                }
            }
            None => {
                result.push(*node);
                stack.pop();
            }
        }
    }

    result
}

/// Computes the reverse postorder of the nodes reachable from `start`.
///
/// In reverse postorder every node precedes its successors except along back
/// edges, which makes it the iteration order for forward dataflow problems.
#[must_use]
pub fn reverse_postorder<G: Successors>(graph: &G, start: NodeId) -> Vec<NodeId> {
    let mut result = postorder(graph, start);
    result.reverse();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::graph::TestGraph;

    fn ids(raw: &[usize]) -> Vec<NodeId> {
        raw.iter().copied().map(NodeId::new).collect()
    }

    #[test]
    fn test_dfs_preorder() {
        let graph = TestGraph::new(4, &[(0, 1), (0, 2), (1, 3), (2, 3)]);
        let order: Vec<NodeId> = dfs(&graph, NodeId::new(0)).collect();
        assert_eq!(order, ids(&[0, 1, 3, 2]));
    }

    #[test]
    fn test_dfs_invalid_start() {
        let graph = TestGraph::new(2, &[(0, 1)]);
        assert_eq!(dfs(&graph, NodeId::new(9)).count(), 0);
        assert!(postorder(&graph, NodeId::new(9)).is_empty());
    }

    #[test]
    fn test_reachable_skips_disconnected() {
        let graph = TestGraph::new(4, &[(0, 1), (2, 3)]);
        assert_eq!(reachable(&graph, NodeId::new(0)), vec![true, true, false, false]);
    }

    #[test]
    fn test_postorder_diamond() {
        let graph = TestGraph::new(4, &[(0, 1), (0, 2), (1, 3), (2, 3)]);
        assert_eq!(postorder(&graph, NodeId::new(0)), ids(&[3, 1, 2, 0]));
        assert_eq!(reverse_postorder(&graph, NodeId::new(0)), ids(&[0, 2, 1, 3]));
    }

    #[test]
    fn test_reverse_postorder_loop() {
        // 0 -> 1 -> 2 -> 1, 2 -> 3
        let graph = TestGraph::new(4, &[(0, 1), (1, 2), (2, 1), (2, 3)]);
        let rpo = reverse_postorder(&graph, NodeId::new(0));
        assert_eq!(rpo, ids(&[0, 1, 2, 3]));
    }
}
