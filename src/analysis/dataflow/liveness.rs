//! Operand liveness.
//!
//! An operand is *live* at a program point if some path from that point reads
//! it before writing it. Every operand kind is tracked: SSA temporaries and
//! SSA variables as well as plain variables, which [`Opcode::StVar`] writes
//! and [`Opcode::LdVar`] reads.
//!
//! # Algorithm
//!
//! This is a backward data flow analysis:
//!
//! - `USE[N]` = operands read in N before any write in N
//! - `DEF[N]` = operands written in N, phi destinations included
//! - `OUT[N]` = ∪ { IN[S] ∪ PHIUSE(S, e) | e = N → S }
//! - `IN[N]` = USE[N] ∪ (OUT[N] - DEF[N])
//!
//! A phi source is a use on its incoming edge, so `PHIUSE(S, e)` holds the
//! phi sources of S that flow along `e`.
//!
//! [`Opcode::StVar`]: crate::ir::Opcode::StVar
//! [`Opcode::LdVar`]: crate::ir::Opcode::LdVar

use crate::{
    analysis::dataflow::{
        framework::{DataFlowAnalysis, Direction},
        solver::DataFlowSolver,
    },
    ir::{ControlFlowGraph, InstId, OperandId},
    utils::{
        graph::{EdgeId, GraphBase, NodeId},
        BitSet,
    },
    Error, Result,
};

/// Live operand analysis with precomputed per-node USE and DEF sets.
pub struct LiveVariables {
    operand_count: usize,
    use_sets: Vec<BitSet>,
    def_sets: Vec<BitSet>,
}

impl LiveVariables {
    /// Creates the analysis for the current state of `cfg`.
    #[must_use]
    pub fn new(cfg: &ControlFlowGraph) -> Self {
        let operand_count = cfg.operand_count();
        let node_slots = cfg.node_count();
        let mut use_sets = vec![BitSet::new(operand_count); node_slots];
        let mut def_sets = vec![BitSet::new(operand_count); node_slots];

        for node in cfg.nodes() {
            let uses = &mut use_sets[node.index()];
            let defs = &mut def_sets[node.index()];
            for id in cfg.insts_of(node) {
                let inst = cfg.inst(id);
                if !inst.is_phi() {
                    for operand in inst.srcs() {
                        if !defs.contains(operand.index()) {
                            uses.insert(operand.index());
                        }
                    }
                }
                for slot in inst.slots().iter().filter(|s| s.role.is_def()) {
                    defs.insert(slot.operand.index());
                }
            }
        }

        Self {
            operand_count,
            use_sets,
            def_sets,
        }
    }

    /// Returns the USE set of a node.
    #[must_use]
    pub fn use_set(&self, node: NodeId) -> Option<&BitSet> {
        self.use_sets.get(node.index())
    }

    /// Returns the DEF set of a node.
    #[must_use]
    pub fn def_set(&self, node: NodeId) -> Option<&BitSet> {
        self.def_sets.get(node.index())
    }
}

impl DataFlowAnalysis for LiveVariables {
    type Lattice = BitSet;
    const DIRECTION: Direction = Direction::Backward;

    fn boundary(&self, _cfg: &ControlFlowGraph) -> BitSet {
        BitSet::new(self.operand_count)
    }

    fn initial(&self, _cfg: &ControlFlowGraph) -> BitSet {
        BitSet::new(self.operand_count)
    }

    fn transfer(&self, node: NodeId, output: &BitSet, _cfg: &ControlFlowGraph) -> BitSet {
        let mut result = output.clone();
        if let (Some(defs), Some(uses)) = (self.def_set(node), self.use_set(node)) {
            result.difference_with(defs);
            result.union_with(uses);
        }
        result
    }

    fn edge_transfer(&self, edge: EdgeId, state: &BitSet, cfg: &ControlFlowGraph) -> BitSet {
        let mut result = state.clone();
        let target = cfg.edge(edge).target();
        if let Some(index) = cfg.pred_index(edge) {
            for phi in cfg.phis(target) {
                if let Some(source) = cfg.phi_source(phi, index) {
                    result.insert(source.index());
                }
            }
        }
        result
    }
}

/// Liveness of every operand at node boundaries, stamped with the graph
/// revision it was computed for.
#[derive(Debug, Clone)]
pub struct Liveness {
    revision: u64,
    operand_count: usize,
    entry: Vec<BitSet>,
    exit: Vec<BitSet>,
}

impl Liveness {
    /// Computes liveness for the current state of `cfg`.
    #[must_use]
    pub fn compute(cfg: &ControlFlowGraph) -> Self {
        let analysis = LiveVariables::new(cfg);
        let operand_count = analysis.operand_count;
        let results = DataFlowSolver::new(analysis).solve(cfg);

        let mut entry = Vec::with_capacity(results.out_states.len());
        for (index, out) in results.out_states.iter().enumerate() {
            let node = NodeId::new(index);
            let mut live = out.clone();
            if cfg.try_node(node).is_ok() {
                let body: Vec<InstId> = cfg.insts_of(node).collect();
                for &inst in body.iter().rev() {
                    if cfg.inst(inst).is_phi() || cfg.inst(inst).is_label() {
                        break;
                    }
                    Self::transfer_inst(cfg, inst, &mut live);
                }
            }
            entry.push(live);
        }

        log::trace!(
            "liveness computed for {} nodes at revision {}",
            entry.len(),
            cfg.revision()
        );
        Self {
            revision: cfg.revision(),
            operand_count,
            entry,
            exit: results.out_states,
        }
    }

    /// Returns the graph revision this liveness describes.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Checks that `cfg` has not been mutated since this was computed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StaleLiveness`] if the graph has changed.
    pub fn ensure_current(&self, cfg: &ControlFlowGraph) -> Result<()> {
        if self.revision == cfg.revision() {
            Ok(())
        } else {
            Err(Error::StaleLiveness {
                computed: self.revision,
                current: cfg.revision(),
            })
        }
    }

    /// Returns the operands live right after the label and phis of `node`.
    ///
    /// Phi destinations that are read later in the node or beyond are
    /// included; phi sources are not.
    #[must_use]
    pub fn live_at_entry(&self, node: NodeId) -> Option<&BitSet> {
        self.entry.get(node.index())
    }

    /// Returns the operands live at the bottom of `node`, phi sources of its
    /// successors included.
    #[must_use]
    pub fn live_at_exit(&self, node: NodeId) -> Option<&BitSet> {
        self.exit.get(node.index())
    }

    /// Returns `true` if `operand` is live at the entry of `node`.
    #[must_use]
    pub fn is_live_at_entry(&self, node: NodeId, operand: OperandId) -> bool {
        self.live_at_entry(node)
            .is_some_and(|set| set.contains(operand.index()))
    }

    /// Steps `live` backward over one instruction: the set live after
    /// `inst` becomes the set live before it.
    ///
    /// Operands allocated after this liveness was computed are tracked as
    /// well; the set grows as needed.
    pub fn update_liveness(&self, cfg: &ControlFlowGraph, inst: InstId, live: &mut BitSet) {
        live.grow(self.operand_count.max(cfg.operand_count()));
        Self::transfer_inst(cfg, inst, live);
    }

    fn transfer_inst(cfg: &ControlFlowGraph, inst: InstId, live: &mut BitSet) {
        let inst = cfg.inst(inst);
        for slot in inst.slots().iter().filter(|s| s.role.is_def()) {
            live.remove(slot.operand.index());
        }
        if inst.is_phi() {
            return;
        }
        for operand in inst.srcs() {
            live.grow(operand.index() + 1);
            live.insert(operand.index());
        }
    }
}
