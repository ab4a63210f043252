//! Loop structure and the control-flow queries passes consume.
//!
//! [`ControlFlowQueries`] is the read-only interface the duplicator, the dead
//! code eliminator and the safe-point tracker use. [`LoopTree`] implements it
//! from a dominator tree: an edge is a back edge when its target dominates its
//! source, and the natural loop of a header is every node that reaches one of
//! its back edges without passing through the header.
//!
//! A `LoopTree` describes one revision of the graph; recompute it after
//! mutating the graph.

use std::collections::BTreeMap;

use crate::{
    ir::ControlFlowGraph,
    utils::{
        graph::{
            algorithms::{compute_dominators, DominatorTree},
            EdgeId, GraphBase, NodeId,
        },
        BitSet,
    },
};

/// Read-only loop and dominance queries over a control flow graph.
pub trait ControlFlowQueries {
    /// Returns `true` if `edge` closes a loop.
    fn is_back_edge(&self, edge: EdgeId) -> bool;

    /// Returns the header of the innermost loop containing `node`.
    fn loop_header_of(&self, node: NodeId) -> Option<NodeId>;

    /// Returns the number of loops containing `node`; 0 outside loops.
    fn loop_depth(&self, node: NodeId) -> usize;

    /// Returns the deepest loop nesting in the graph.
    fn max_loop_depth(&self) -> usize;

    /// Returns `true` if every path from the entry to `b` passes through `a`.
    fn dominates(&self, a: NodeId, b: NodeId) -> bool;
}

/// A natural loop.
#[derive(Debug, Clone)]
pub struct NaturalLoop {
    /// The loop header.
    pub header: NodeId,
    /// Every node of the loop, the header included.
    pub body: BitSet,
    /// The back edges into the header.
    pub back_edges: Vec<EdgeId>,
    /// The header of the immediately enclosing loop.
    pub parent: Option<NodeId>,
    /// Nesting depth; outermost loops have depth 1.
    pub depth: usize,
}

impl NaturalLoop {
    /// Returns `true` if `node` belongs to the loop.
    #[must_use]
    pub fn contains(&self, node: NodeId) -> bool {
        self.body.contains(node.index())
    }

    /// Returns the number of nodes in the loop.
    #[must_use]
    pub fn size(&self) -> usize {
        self.body.count()
    }
}

/// Loop nesting forest computed from dominators.
#[derive(Debug, Clone)]
pub struct LoopTree {
    dominators: DominatorTree,
    loops: BTreeMap<NodeId, NaturalLoop>,
    back_edges: BitSet,
    innermost: Vec<Option<NodeId>>,
    revision: u64,
}

impl LoopTree {
    /// Computes dominators, back edges and natural loops of `cfg`.
    #[must_use]
    pub fn compute(cfg: &ControlFlowGraph) -> Self {
        let dominators = compute_dominators(cfg, cfg.entry());
        let mut back_edges = BitSet::new(cfg.edge_capacity());
        let mut loops: BTreeMap<NodeId, NaturalLoop> = BTreeMap::new();

        for edge in cfg.edges() {
            let e = cfg.edge(edge);
            if dominators.dominates(e.target(), e.source()) {
                back_edges.insert(edge.index());
                loops
                    .entry(e.target())
                    .or_insert_with(|| NaturalLoop {
                        header: e.target(),
                        body: BitSet::new(cfg.node_count()),
                        back_edges: Vec::new(),
                        parent: None,
                        depth: 0,
                    })
                    .back_edges
                    .push(edge);
            }
        }

        for natural in loops.values_mut() {
            natural.body.insert(natural.header.index());
            let mut stack: Vec<NodeId> = natural
                .back_edges
                .iter()
                .map(|&e| cfg.edge(e).source())
                .collect();
            while let Some(node) = stack.pop() {
                if !natural.body.insert(node.index()) {
                    continue;
                }
                for &pred in cfg.node(node).preds() {
                    let source = cfg.edge(pred).source();
                    if dominators.is_reachable(source) {
                        stack.push(source);
                    }
                }
            }
        }

        // The parent of a loop is the smallest other loop containing its header.
        let headers: Vec<NodeId> = loops.keys().copied().collect();
        for &header in &headers {
            let parent = headers
                .iter()
                .copied()
                .filter(|&h| h != header && loops[&h].contains(header))
                .min_by_key(|h| loops[h].size());
            if let Some(natural) = loops.get_mut(&header) {
                natural.parent = parent;
            }
        }
        for &header in &headers {
            let mut depth = 1;
            let mut current = loops[&header].parent;
            while let Some(p) = current {
                depth += 1;
                current = loops[&p].parent;
            }
            if let Some(natural) = loops.get_mut(&header) {
                natural.depth = depth;
            }
        }

        let mut innermost = vec![None; cfg.node_count()];
        for node in cfg.nodes() {
            innermost[node.index()] = loops
                .values()
                .filter(|l| l.contains(node))
                .max_by_key(|l| l.depth)
                .map(|l| l.header);
        }

        LoopTree {
            dominators,
            loops,
            back_edges,
            innermost,
            revision: cfg.revision(),
        }
    }

    /// Returns the graph revision this tree describes.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Returns the dominator tree the loops were derived from.
    #[must_use]
    pub fn dominator_tree(&self) -> &DominatorTree {
        &self.dominators
    }

    /// Returns the loop headed by `header`.
    #[must_use]
    pub fn loop_of(&self, header: NodeId) -> Option<&NaturalLoop> {
        self.loops.get(&header)
    }

    /// Returns the nodes of the loop headed by `header`, in id order.
    #[must_use]
    pub fn loop_body(&self, header: NodeId) -> Vec<NodeId> {
        self.loops
            .get(&header)
            .map(|l| l.body.iter().map(NodeId::new).collect())
            .unwrap_or_default()
    }

    /// Returns every loop, outer loops before the loops they contain.
    pub fn loops(&self) -> impl Iterator<Item = &NaturalLoop> {
        let mut all: Vec<&NaturalLoop> = self.loops.values().collect();
        all.sort_by_key(|l| (l.depth, l.header));
        all.into_iter()
    }

    /// Returns the headers of loops that contain no other loop.
    #[must_use]
    pub fn innermost_loops(&self) -> Vec<NodeId> {
        self.loops
            .keys()
            .copied()
            .filter(|&h| !self.loops.values().any(|l| l.parent == Some(h)))
            .collect()
    }
}

impl ControlFlowQueries for LoopTree {
    fn is_back_edge(&self, edge: EdgeId) -> bool {
        self.back_edges.contains(edge.index())
    }

    fn loop_header_of(&self, node: NodeId) -> Option<NodeId> {
        self.innermost.get(node.index()).copied().flatten()
    }

    fn loop_depth(&self, node: NodeId) -> usize {
        self.loop_header_of(node)
            .and_then(|h| self.loops.get(&h))
            .map_or(0, |l| l.depth)
    }

    fn max_loop_depth(&self) -> usize {
        self.loops.values().map(|l| l.depth).max().unwrap_or(0)
    }

    fn dominates(&self, a: NodeId, b: NodeId) -> bool {
        self.dominators.dominates(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::CfgBuilder;

    /// 0 -> 1 -> 2 -> 3 -> 2 (inner), 3 -> 1 (outer), 1 -> 4 exit
    fn nested() -> ControlFlowGraph {
        CfgBuilder::new().build_with(|f| {
            f.block(0, |b| b.jump(1));
            f.block(1, |b| {
                let c = b.const_i32(1);
                b.branch(c, 2, 4);
            });
            f.block(2, |b| b.jump(3));
            f.block(3, |b| {
                let c = b.const_i32(0);
                b.branch(c, 2, 1);
            });
            f.block(4, |b| b.ret(None));
        })
    }

    #[test]
    fn test_nested_loops() {
        let cfg = nested();
        let loops = LoopTree::compute(&cfg);
        let [b1, b2, b3, b4] = [1, 2, 3, 4].map(|i| cfg.block_node(i).unwrap());

        assert_eq!(loops.max_loop_depth(), 2);
        assert_eq!(loops.loop_depth(b1), 1);
        assert_eq!(loops.loop_depth(b2), 2);
        assert_eq!(loops.loop_depth(b3), 2);
        assert_eq!(loops.loop_depth(b4), 0);
        assert_eq!(loops.loop_header_of(b3), Some(b2));
        assert_eq!(loops.loop_header_of(b1), Some(b1));
        assert_eq!(loops.loop_of(b2).unwrap().parent, Some(b1));
        assert_eq!(loops.loop_body(b1), vec![b1, b2, b3]);
        assert_eq!(loops.innermost_loops(), vec![b2]);
    }

    #[test]
    fn test_back_edges() {
        let cfg = nested();
        let loops = LoopTree::compute(&cfg);
        let b3 = cfg.block_node(3).unwrap();
        let back: Vec<EdgeId> = cfg
            .edges()
            .filter(|&e| loops.is_back_edge(e))
            .collect();
        assert_eq!(back.len(), 2);
        assert!(back.iter().all(|&e| cfg.edge(e).source() == b3));
    }

    #[test]
    fn test_acyclic_graph_has_no_loops() {
        let cfg = CfgBuilder::new().build_with(|f| {
            f.block(0, |b| b.jump(1));
            f.block(1, |b| b.ret(None));
        });
        let loops = LoopTree::compute(&cfg);
        assert_eq!(loops.max_loop_depth(), 0);
        assert!(loops.innermost_loops().is_empty());
        assert!(loops.dominates(cfg.entry(), cfg.block_node(1).unwrap()));
    }
}
