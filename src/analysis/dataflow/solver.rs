//! Worklist-based data flow solver.
//!
//! # Algorithm
//!
//! 1. Initialize every node with the initial value
//! 2. Set the boundary value at the entry (forward) or exit (backward) node
//! 3. Seed the worklist in reverse postorder (forward) or postorder (backward)
//! 4. While the worklist is non-empty:
//!    a. Remove a node from the worklist
//!    b. Meet the states flowing in across its edges
//!    c. Apply the transfer function
//!    d. If the result changed, queue the nodes it feeds
//!
//! Only nodes reachable from the entry are processed; the states of other
//! nodes keep their initial value.

use std::collections::VecDeque;

use crate::{
    analysis::dataflow::{
        framework::{AnalysisResults, DataFlowAnalysis, Direction},
        lattice::MeetSemiLattice,
    },
    ir::ControlFlowGraph,
    utils::graph::{
        algorithms::{postorder, reverse_postorder},
        GraphBase, NodeId,
    },
};

/// Worklist-based data flow solver.
///
/// # Usage
///
/// ```rust
/// use midend::analysis::dataflow::{DataFlowSolver, LiveVariables};
/// use midend::ir::{CfgBuilder, SemType};
///
/// let cfg = CfgBuilder::new().build_with(|f| {
///     f.block(0, |b| {
///         let x = b.arg(0, SemType::I32);
///         b.jump(1);
///     });
///     f.block(1, |b| b.ret(None));
/// });
/// let results = DataFlowSolver::new(LiveVariables::new(&cfg)).solve(&cfg);
/// assert!(results.in_state(cfg.entry()).unwrap().is_empty());
/// ```
pub struct DataFlowSolver<A: DataFlowAnalysis> {
    analysis: A,
    in_states: Vec<A::Lattice>,
    out_states: Vec<A::Lattice>,
    worklist: VecDeque<NodeId>,
    in_worklist: Vec<bool>,
    iterations: usize,
}

impl<A: DataFlowAnalysis> DataFlowSolver<A> {
    /// Creates a new solver for the given analysis.
    #[must_use]
    pub fn new(analysis: A) -> Self {
        Self {
            analysis,
            in_states: Vec::new(),
            out_states: Vec::new(),
            worklist: VecDeque::new(),
            in_worklist: Vec::new(),
            iterations: 0,
        }
    }

    /// Solves the analysis to a fixpoint.
    pub fn solve(mut self, cfg: &ControlFlowGraph) -> AnalysisResults<A::Lattice> {
        self.initialize(cfg);
        self.iterate(cfg);
        AnalysisResults::new(self.in_states, self.out_states)
    }

    /// Returns the number of node visits performed.
    #[must_use]
    pub const fn iterations(&self) -> usize {
        self.iterations
    }

    fn initialize(&mut self, cfg: &ControlFlowGraph) {
        let node_count = cfg.node_count();
        let initial = self.analysis.initial(cfg);
        let boundary = self.analysis.boundary(cfg);

        self.in_states = vec![initial.clone(); node_count];
        self.out_states = vec![initial; node_count];
        self.in_worklist = vec![false; node_count];

        let order = match A::DIRECTION {
            Direction::Forward => {
                self.in_states[cfg.entry().index()] = boundary;
                reverse_postorder(cfg, cfg.entry())
            }
            Direction::Backward => {
                self.out_states[cfg.exit().index()] = boundary;
                postorder(cfg, cfg.entry())
            }
        };

        for node in order {
            self.push(node);
        }
    }

    fn push(&mut self, node: NodeId) {
        if !self.in_worklist[node.index()] {
            self.in_worklist[node.index()] = true;
            self.worklist.push_back(node);
        }
    }

    fn iterate(&mut self, cfg: &ControlFlowGraph) {
        while let Some(node) = self.worklist.pop_front() {
            self.in_worklist[node.index()] = false;
            self.iterations += 1;

            let changed = match A::DIRECTION {
                Direction::Forward => self.process_forward(node, cfg),
                Direction::Backward => self.process_backward(node, cfg),
            };

            if changed {
                let n = cfg.node(node);
                let affected: Vec<NodeId> = match A::DIRECTION {
                    Direction::Forward => n.succs().iter().map(|&e| cfg.edge(e).target()).collect(),
                    Direction::Backward => n.preds().iter().map(|&e| cfg.edge(e).source()).collect(),
                };
                for next in affected {
                    self.push(next);
                }
            }
        }
    }

    /// Returns `true` if the output state changed.
    fn process_forward(&mut self, node: NodeId, cfg: &ControlFlowGraph) -> bool {
        if node != cfg.entry() {
            let mut input: Option<A::Lattice> = None;
            for &edge in cfg.node(node).preds() {
                let pred = cfg.edge(edge).source();
                let state = self
                    .analysis
                    .edge_transfer(edge, &self.out_states[pred.index()], cfg);
                input = Some(match input {
                    None => state,
                    Some(acc) => acc.meet(&state),
                });
            }
            if let Some(input) = input {
                self.in_states[node.index()] = input;
            }
        }

        let output = self
            .analysis
            .transfer(node, &self.in_states[node.index()], cfg);
        let changed = output != self.out_states[node.index()];
        self.out_states[node.index()] = output;
        changed
    }

    /// Returns `true` if the input state changed.
    fn process_backward(&mut self, node: NodeId, cfg: &ControlFlowGraph) -> bool {
        if node != cfg.exit() {
            let mut output: Option<A::Lattice> = None;
            for &edge in cfg.node(node).succs() {
                let succ = cfg.edge(edge).target();
                let state = self
                    .analysis
                    .edge_transfer(edge, &self.in_states[succ.index()], cfg);
                output = Some(match output {
                    None => state,
                    Some(acc) => acc.meet(&state),
                });
            }
            if let Some(output) = output {
                self.out_states[node.index()] = output;
            }
        }

        let input = self
            .analysis
            .transfer(node, &self.out_states[node.index()], cfg);
        let changed = input != self.in_states[node.index()];
        self.in_states[node.index()] = input;
        changed
    }
}
