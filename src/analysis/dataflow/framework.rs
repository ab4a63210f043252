//! Data flow analysis framework trait and direction.
//!
//! Any node-level analysis (liveness, the safe-point pointer tracker's
//! helpers) implements [`DataFlowAnalysis`] to run on the worklist solver.

use crate::{
    analysis::dataflow::lattice::MeetSemiLattice,
    ir::ControlFlowGraph,
    utils::graph::{EdgeId, NodeId},
};

/// Direction of data flow analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Information flows from the entry node towards the exit node.
    ///
    /// At joins, the outputs of all predecessors are combined with the meet
    /// operation.
    Forward,

    /// Information flows from the exit node back towards the entry node.
    ///
    /// At splits, the inputs of all successors are combined.
    Backward,
}

/// A data flow analysis over the nodes of a [`ControlFlowGraph`].
///
/// Implementations provide the transfer function and boundary conditions;
/// the [`DataFlowSolver`](super::DataFlowSolver) iterates to a fixpoint.
///
/// For forward analyses: `out[N] = transfer(N, in[N])`.
/// For backward analyses: `in[N] = transfer(N, out[N])`.
///
/// States crossing an edge pass through [`edge_transfer`](Self::edge_transfer)
/// before they are met, which is where phi semantics live: a phi source is a
/// use on its incoming edge, not in the phi's node.
pub trait DataFlowAnalysis {
    /// The lattice type for this analysis.
    type Lattice: MeetSemiLattice;

    /// The direction of this analysis.
    const DIRECTION: Direction;

    /// Returns the value at the boundary: the entry node for forward
    /// analyses, the exit node for backward ones.
    fn boundary(&self, cfg: &ControlFlowGraph) -> Self::Lattice;

    /// Returns the initial value for every other node.
    fn initial(&self, cfg: &ControlFlowGraph) -> Self::Lattice;

    /// Computes the state on the far side of a node.
    ///
    /// # Arguments
    ///
    /// * `node` - The node being processed
    /// * `input` - The state flowing into (forward) or out of (backward) the node
    /// * `cfg` - The graph for context
    fn transfer(&self, node: NodeId, input: &Self::Lattice, cfg: &ControlFlowGraph)
        -> Self::Lattice;

    /// Adjusts a state as it crosses `edge`.
    ///
    /// The default passes the state through unchanged.
    fn edge_transfer(
        &self,
        _edge: EdgeId,
        state: &Self::Lattice,
        _cfg: &ControlFlowGraph,
    ) -> Self::Lattice {
        state.clone()
    }
}

/// Results of a data flow analysis, indexed by node index.
#[derive(Debug, Clone)]
pub struct AnalysisResults<L> {
    /// State at the top of each node.
    pub in_states: Vec<L>,
    /// State at the bottom of each node.
    pub out_states: Vec<L>,
}

impl<L: Clone> AnalysisResults<L> {
    /// Creates new analysis results with the given states.
    #[must_use]
    pub fn new(in_states: Vec<L>, out_states: Vec<L>) -> Self {
        Self {
            in_states,
            out_states,
        }
    }

    /// Returns the state at the top of a node.
    ///
    /// # Returns
    ///
    /// The state, or `None` if the node index is out of bounds.
    #[must_use]
    pub fn in_state(&self, node: NodeId) -> Option<&L> {
        self.in_states.get(node.index())
    }

    /// Returns the state at the bottom of a node.
    #[must_use]
    pub fn out_state(&self, node: NodeId) -> Option<&L> {
        self.out_states.get(node.index())
    }

    /// Returns the number of node slots.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.in_states.len()
    }
}
