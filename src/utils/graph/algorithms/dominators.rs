//! Dominator tree computation.
//!
//! Node `a` dominates node `b` if every path from the entry to `b` passes
//! through `a`. The tree is computed with the Lengauer-Tarjan algorithm using
//! path compression, which runs in O(E log V).
//!
//! Nodes that are not reachable from the entry have no dominators. They are
//! reported by [`DominatorTree::is_reachable`] and never dominate nor are
//! dominated by anything except themselves.

use crate::utils::graph::{NodeId, Predecessors, Successors};

const UNDEFINED: NodeId = NodeId(usize::MAX);

/// Result of dominator tree computation.
///
/// # Examples
///
/// ```rust
/// use midend::ir::{CfgBuilder, SemType};
/// use midend::utils::graph::algorithms::compute_dominators;
///
/// let cfg = CfgBuilder::new().build_with(|f| {
///     f.block(0, |b| { b.jump(1); });
///     f.block(1, |b| { b.ret(None); });
/// });
/// let doms = compute_dominators(&cfg, cfg.entry());
/// let b1 = cfg.block_node(1).unwrap();
/// assert!(doms.dominates(cfg.entry(), b1));
/// ```
#[derive(Debug, Clone)]
pub struct DominatorTree {
    entry: NodeId,
    /// Immediate dominator by node index; the entry maps to itself and
    /// unreachable nodes to `UNDEFINED`.
    idom: Vec<NodeId>,
    /// Depth in the dominator tree, entry at 0.
    depth: Vec<usize>,
}

impl DominatorTree {
    /// Returns the entry (root) node of the dominator tree.
    #[inline]
    #[must_use]
    pub fn entry(&self) -> NodeId {
        self.entry
    }

    /// Returns `true` if `node` is reachable from the entry.
    #[must_use]
    pub fn is_reachable(&self, node: NodeId) -> bool {
        self.idom.get(node.index()).is_some_and(|&d| d != UNDEFINED)
    }

    /// Returns the immediate dominator of a node.
    ///
    /// `None` for the entry node, unreachable nodes and ids created after the
    /// tree was computed.
    #[must_use]
    pub fn immediate_dominator(&self, node: NodeId) -> Option<NodeId> {
        if node == self.entry || !self.is_reachable(node) {
            None
        } else {
            Some(self.idom[node.index()])
        }
    }

    /// Checks if node `a` dominates node `b`. A reachable node dominates itself.
    ///
    /// Runs in O(depth difference) by walking up from `b` to the depth of `a`.
    #[must_use]
    pub fn dominates(&self, a: NodeId, b: NodeId) -> bool {
        if a == b {
            return true;
        }
        if !self.is_reachable(a) || !self.is_reachable(b) {
            return false;
        }

        let target_depth = self.depth[a.index()];
        let mut current = b;
        while self.depth[current.index()] > target_depth {
            current = self.idom[current.index()];
        }
        current == a
    }

    /// Checks if node `a` strictly dominates node `b` (`a != b`).
    #[inline]
    #[must_use]
    pub fn strictly_dominates(&self, a: NodeId, b: NodeId) -> bool {
        a != b && self.dominates(a, b)
    }

    /// Returns the depth of a node in the dominator tree, or `None` if it is
    /// unreachable.
    #[must_use]
    pub fn depth(&self, node: NodeId) -> Option<usize> {
        self.is_reachable(node).then(|| self.depth[node.index()])
    }

    /// Returns all nodes whose immediate dominator is `node`, in index order.
    #[must_use]
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.idom
            .iter()
            .enumerate()
            .filter(|&(i, &d)| d == node && i != self.entry.index())
            .map(|(i, _)| NodeId::new(i))
            .collect()
    }
}

/// Computes the dominator tree of `graph` rooted at `entry`.
///
/// # Arguments
///
/// * `graph` - The graph to analyze
/// * `entry` - The root node; usually the graph's entry
///
/// # Returns
///
/// The [`DominatorTree`]; nodes unreachable from `entry` are marked as such.
pub fn compute_dominators<G>(graph: &G, entry: NodeId) -> DominatorTree
where
    G: Successors + Predecessors,
{
    let node_count = graph.node_count();
    if entry.index() >= node_count {
        return DominatorTree {
            entry,
            idom: vec![UNDEFINED; node_count],
            depth: vec![0; node_count],
        };
    }

    let mut lt = LengauerTarjan::new(node_count, entry);
    lt.compute(graph);

    let depth = dominator_depths(&lt.idom, &lt.vertex[..lt.dfs_counter], entry);
    DominatorTree {
        entry,
        idom: lt.idom,
        depth,
    }
}

/// Depths follow from the idom array when nodes are visited in DFS order,
/// because a node's immediate dominator always has a smaller DFS number.
fn dominator_depths(idom: &[NodeId], dfs_order: &[NodeId], entry: NodeId) -> Vec<usize> {
    let mut depth = vec![0; idom.len()];
    for &node in dfs_order {
        if node != entry {
            depth[node.index()] = depth[idom[node.index()].index()] + 1;
        }
    }
    depth
}

/// Internal state for the Lengauer-Tarjan algorithm.
struct LengauerTarjan {
    entry: NodeId,
    /// DFS number for each node (0 = not visited)
    dfnum: Vec<usize>,
    /// Node with each DFS number minus one
    vertex: Vec<NodeId>,
    /// Parent in DFS tree
    parent: Vec<NodeId>,
    semi: Vec<NodeId>,
    idom: Vec<NodeId>,
    /// Ancestor in the link-eval forest
    ancestor: Vec<NodeId>,
    /// Node with minimal semidominator on the compressed path
    best: Vec<NodeId>,
    bucket: Vec<Vec<NodeId>>,
    dfs_counter: usize,
}

impl LengauerTarjan {
    fn new(n: usize, entry: NodeId) -> Self {
        Self {
            entry,
            dfnum: vec![0; n],
            vertex: vec![UNDEFINED; n],
            parent: vec![UNDEFINED; n],
            semi: (0..n).map(NodeId::new).collect(),
            idom: vec![UNDEFINED; n],
            ancestor: vec![UNDEFINED; n],
            best: (0..n).map(NodeId::new).collect(),
            bucket: vec![Vec::new(); n],
            dfs_counter: 0,
        }
    }

    fn compute<G: Successors + Predecessors>(&mut self, graph: &G) {
        self.number(graph);

        for i in (1..self.dfs_counter).rev() {
            let w = self.vertex[i];
            let parent_w = self.parent[w.index()];

            for v in graph.predecessors(w) {
                if self.dfnum[v.index()] == 0 {
                    continue;
                }
                let u = self.eval(v);
                if self.dfnum[self.semi[u.index()].index()]
                    < self.dfnum[self.semi[w.index()].index()]
                {
                    self.semi[w.index()] = self.semi[u.index()];
                }
            }

            let semi_w = self.semi[w.index()];
            self.bucket[semi_w.index()].push(w);
            self.ancestor[w.index()] = parent_w;

            for v in std::mem::take(&mut self.bucket[parent_w.index()]) {
                let u = self.eval(v);
                self.idom[v.index()] = if self.semi[u.index()] == self.semi[v.index()] {
                    parent_w
                } else {
                    u
                };
            }
        }

        for i in 1..self.dfs_counter {
            let w = self.vertex[i];
            if self.idom[w.index()] != self.semi[w.index()] {
                self.idom[w.index()] = self.idom[self.idom[w.index()].index()];
            }
        }

        self.idom[self.entry.index()] = self.entry;
    }

    /// Assigns DFS numbers with an explicit stack. A node is numbered when it
    /// is popped, and its DFS parent is the node that pushed it last.
    fn number<G: Successors>(&mut self, graph: &G) {
        let mut stack = vec![(self.entry, UNDEFINED)];

        while let Some((node, parent)) = stack.pop() {
            if self.dfnum[node.index()] != 0 {
                continue;
            }

            self.dfs_counter += 1;
            self.dfnum[node.index()] = self.dfs_counter;
            self.vertex[self.dfs_counter - 1] = node;
            self.parent[node.index()] = parent;

            for succ in graph.successors(node) {
                if self.dfnum[succ.index()] == 0 {
                    stack.push((succ, node));
                }
            }
        }
    }

    fn eval(&mut self, v: NodeId) -> NodeId {
        if self.ancestor[v.index()] == UNDEFINED {
            return v;
        }
        self.compress(v);
        self.best[v.index()]
    }

    /// Iterative path compression towards the forest root.
    fn compress(&mut self, v: NodeId) {
        let mut path = Vec::new();
        let mut current = v;
        while self.ancestor[self.ancestor[current.index()].index()] != UNDEFINED {
            path.push(current);
            current = self.ancestor[current.index()];
        }

        while let Some(node) = path.pop() {
            let anc = self.ancestor[node.index()];
            let best_anc = self.best[anc.index()];
            let best_node = self.best[node.index()];
            if self.dfnum[self.semi[best_anc.index()].index()]
                < self.dfnum[self.semi[best_node.index()].index()]
            {
                self.best[node.index()] = best_anc;
            }
            self.ancestor[node.index()] = self.ancestor[anc.index()];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::graph::TestGraph;

    fn n(i: usize) -> NodeId {
        NodeId::new(i)
    }

    #[test]
    fn test_dominator_linear_chain() {
        let graph = TestGraph::new(4, &[(0, 1), (1, 2), (2, 3)]);
        let dom = compute_dominators(&graph, n(0));

        assert_eq!(dom.immediate_dominator(n(0)), None);
        assert_eq!(dom.immediate_dominator(n(3)), Some(n(2)));
        assert!(dom.dominates(n(1), n(3)));
        assert!(!dom.dominates(n(3), n(1)));
        assert_eq!(dom.depth(n(3)), Some(3));
    }

    #[test]
    fn test_dominator_diamond() {
        let graph = TestGraph::new(4, &[(0, 1), (0, 2), (1, 3), (2, 3)]);
        let dom = compute_dominators(&graph, n(0));

        assert_eq!(dom.immediate_dominator(n(3)), Some(n(0)));
        assert!(!dom.strictly_dominates(n(1), n(3)));
        assert!(!dom.strictly_dominates(n(2), n(3)));
        assert_eq!(dom.children(n(0)), vec![n(1), n(2), n(3)]);
    }

    #[test]
    fn test_dominator_loop() {
        // 0 -> 1 -> 2 -> 1, 2 -> 3
        let graph = TestGraph::new(4, &[(0, 1), (1, 2), (2, 1), (2, 3)]);
        let dom = compute_dominators(&graph, n(0));

        assert_eq!(dom.immediate_dominator(n(1)), Some(n(0)));
        assert_eq!(dom.immediate_dominator(n(2)), Some(n(1)));
        assert_eq!(dom.immediate_dominator(n(3)), Some(n(2)));
        assert!(dom.dominates(n(1), n(2)));
    }

    #[test]
    fn test_dominator_irreducible_entry() {
        // Two-entry cycle 1 <-> 2 entered from 0 at both nodes.
        let graph = TestGraph::new(4, &[(0, 1), (0, 2), (1, 2), (2, 1), (2, 3)]);
        let dom = compute_dominators(&graph, n(0));

        assert_eq!(dom.immediate_dominator(n(1)), Some(n(0)));
        assert_eq!(dom.immediate_dominator(n(2)), Some(n(0)));
        assert_eq!(dom.immediate_dominator(n(3)), Some(n(2)));
    }

    #[test]
    fn test_dominator_unreachable_nodes() {
        let graph = TestGraph::new(4, &[(0, 1), (2, 3), (3, 1)]);
        let dom = compute_dominators(&graph, n(0));

        assert!(dom.is_reachable(n(1)));
        assert!(!dom.is_reachable(n(2)));
        assert!(!dom.dominates(n(2), n(1)));
        assert!(!dom.dominates(n(0), n(3)));
        assert_eq!(dom.immediate_dominator(n(1)), Some(n(0)));
        assert_eq!(dom.depth(n(3)), None);
    }

    #[test]
    fn test_dominator_nested_branches() {
        //      0
        //     / \
        //    1   2
        //   / \   \
        //  3   4   |
        //   \ /    |
        //    5 ----+
        //    |
        //    6
        let graph = TestGraph::new(
            7,
            &[(0, 1), (0, 2), (1, 3), (1, 4), (3, 5), (4, 5), (2, 5), (5, 6)],
        );
        let dom = compute_dominators(&graph, n(0));

        assert_eq!(dom.immediate_dominator(n(3)), Some(n(1)));
        assert_eq!(dom.immediate_dominator(n(5)), Some(n(0)));
        assert_eq!(dom.immediate_dominator(n(6)), Some(n(5)));
        assert!(dom.dominates(n(5), n(6)));
        assert!(!dom.dominates(n(1), n(5)));
    }
}
