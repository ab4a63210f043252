//! The per-method control flow graph arena.
//!
//! [`ControlFlowGraph`] owns every node, edge, instruction and operand of one
//! compilation. Entities are addressed by dense ids and are never reused:
//! removing something marks its slot dead, and the whole arena is dropped in
//! bulk at the end of the compilation.
//!
//! Every mutating method bumps [`revision`](ControlFlowGraph::revision), which
//! lets analyses such as [`Liveness`](crate::analysis::Liveness) detect that
//! they are stale.
//!
//! # Phi alignment
//!
//! The incoming edge list of a node is ordered, and source `i` of every phi in
//! the node flows along incoming edge `i`. The edge operations here keep that
//! alignment: removing an incoming edge removes the matching phi source, and
//! splitting an edge keeps the split edge's position at the target.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    error::contract_violation,
    ir::{
        Edge, EdgeKind, InstFlags, InstId, Instruction, Node, NodeKind, Opcode, Operand,
        OperandId, OperandKind, PointerFact, SemType, Slot,
    },
    utils::graph::{EdgeId, GraphBase, NodeId, Predecessors, RootedGraph, Successors},
    Error, Result,
};

/// A method body in SSA form.
#[derive(Debug, Clone)]
pub struct ControlFlowGraph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    insts: Vec<Instruction>,
    operands: Vec<Operand>,
    variables: BTreeSet<OperandId>,
    entry: NodeId,
    exit: NodeId,
    return_node: Option<NodeId>,
    return_operand: Option<OperandId>,
    block_names: BTreeMap<usize, NodeId>,
    revision: u64,
}

impl Default for ControlFlowGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlFlowGraph {
    /// Creates a graph holding only an entry node and an exit node.
    #[must_use]
    pub fn new() -> Self {
        let mut cfg = ControlFlowGraph {
            nodes: Vec::new(),
            edges: Vec::new(),
            insts: Vec::new(),
            operands: Vec::new(),
            variables: BTreeSet::new(),
            entry: NodeId::new(0),
            exit: NodeId::new(0),
            return_node: None,
            return_operand: None,
            block_names: BTreeMap::new(),
            revision: 0,
        };
        cfg.entry = cfg.new_node(NodeKind::Entry);
        cfg.exit = cfg.new_node(NodeKind::Exit);
        cfg
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    // ── Accessors ───────────────────────────────────────────────────────

    /// Returns the entry node.
    #[must_use]
    pub fn entry(&self) -> NodeId {
        self.entry
    }

    /// Returns the exit node.
    #[must_use]
    pub fn exit(&self) -> NodeId {
        self.exit
    }

    /// Returns the join node of all returning blocks, once one exists.
    #[must_use]
    pub fn return_node(&self) -> Option<NodeId> {
        self.return_node
    }

    /// Returns the return-join node, creating it (with an edge to the exit)
    /// on first use.
    pub fn ensure_return_node(&mut self) -> NodeId {
        if let Some(node) = self.return_node {
            return node;
        }
        let node = self.new_node(NodeKind::Return);
        self.add_edge(node, self.exit, EdgeKind::Unconditional, 1.0);
        self.return_node = Some(node);
        node
    }

    /// Returns the distinguished operand holding the method's return value.
    #[must_use]
    pub fn return_operand(&self) -> Option<OperandId> {
        self.return_operand
    }

    /// Sets the distinguished return-value operand.
    pub fn set_return_operand(&mut self, operand: Option<OperandId>) {
        self.return_operand = operand;
        self.touch();
    }

    /// Returns the node built for block `index` by [`CfgBuilder`](crate::ir::CfgBuilder).
    #[must_use]
    pub fn block_node(&self, index: usize) -> Option<NodeId> {
        self.block_names.get(&index).copied()
    }

    pub(crate) fn name_block(&mut self, index: usize, node: NodeId) {
        self.block_names.insert(index, node);
    }

    /// Returns the mutation counter.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Returns a node by id.
    ///
    /// # Panics
    ///
    /// Panics if the id was not allocated by this graph.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// Returns an edge by id.
    ///
    /// # Panics
    ///
    /// Panics if the id was not allocated by this graph.
    #[must_use]
    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id.index()]
    }

    /// Returns an instruction by id.
    ///
    /// # Panics
    ///
    /// Panics if the id was not allocated by this graph.
    #[must_use]
    pub fn inst(&self, id: InstId) -> &Instruction {
        &self.insts[id.index()]
    }

    /// Returns an operand by id.
    ///
    /// # Panics
    ///
    /// Panics if the id was not allocated by this graph.
    #[must_use]
    pub fn operand(&self, id: OperandId) -> &Operand {
        &self.operands[id.index()]
    }

    /// Returns a live node, or an error for unknown or removed ids.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidNode`] if the node does not exist or was removed.
    pub fn try_node(&self, id: NodeId) -> Result<&Node> {
        match self.nodes.get(id.index()) {
            Some(node) if !node.removed => Ok(node),
            _ => Err(Error::InvalidNode(id)),
        }
    }

    /// Returns a live edge, or an error for unknown or removed ids.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEdge`] if the edge does not exist or was removed.
    pub fn try_edge(&self, id: EdgeId) -> Result<&Edge> {
        match self.edges.get(id.index()) {
            Some(edge) if !edge.removed => Ok(edge),
            _ => Err(Error::InvalidEdge(id)),
        }
    }

    /// Returns a placed instruction, or an error for detached or unknown ids.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInstruction`] if the instruction does not
    /// exist or is not part of a node.
    pub fn try_inst(&self, id: InstId) -> Result<&Instruction> {
        match self.insts.get(id.index()) {
            Some(inst) if inst.node.is_some() => Ok(inst),
            _ => Err(Error::InvalidInstruction(id)),
        }
    }

    /// Returns the number of allocated instruction ids.
    #[must_use]
    pub fn inst_capacity(&self) -> usize {
        self.insts.len()
    }

    /// Returns the number of allocated operand ids.
    #[must_use]
    pub fn operand_count(&self) -> usize {
        self.operands.len()
    }

    /// Returns the number of allocated edge ids.
    #[must_use]
    pub fn edge_capacity(&self) -> usize {
        self.edges.len()
    }

    /// Returns the live nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| !n.removed)
            .map(|(i, _)| NodeId::new(i))
    }

    /// Returns the live edges in id order.
    pub fn edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.edges
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.removed)
            .map(|(i, _)| EdgeId::new(i))
    }

    /// Returns the instructions of a node in order, label first.
    pub fn insts_of(&self, node: NodeId) -> InstIter<'_> {
        InstIter {
            cfg: self,
            next: self.nodes[node.index()].first,
        }
    }

    /// Returns every instruction placed in a live node, node by node.
    pub fn instructions(&self) -> impl Iterator<Item = InstId> + '_ {
        self.nodes().flat_map(move |n| self.insts_of(n))
    }

    /// Returns the phis of a node in order.
    #[must_use]
    pub fn phis(&self, node: NodeId) -> Vec<InstId> {
        self.insts_of(node)
            .skip(1)
            .take_while(|&i| self.insts[i.index()].is_phi())
            .collect()
    }

    /// Returns the last instruction that must stay at the top of the node:
    /// the last phi, or the label if the node has no phis.
    #[must_use]
    pub fn phi_tail(&self, node: NodeId) -> Option<InstId> {
        self.insts_of(node)
            .take_while(|&i| {
                let inst = &self.insts[i.index()];
                inst.is_label() || inst.is_phi()
            })
            .last()
    }

    /// Returns the plain variables currently declared.
    pub fn variables(&self) -> impl Iterator<Item = OperandId> + '_ {
        self.variables.iter().copied()
    }

    /// Returns the position of `edge` among its target's incoming edges.
    #[must_use]
    pub fn pred_index(&self, edge: EdgeId) -> Option<usize> {
        let target = self.edges[edge.index()].target;
        self.nodes[target.index()]
            .preds
            .iter()
            .position(|&e| e == edge)
    }

    /// Returns the source of phi `phi` that flows along incoming edge `index`.
    #[must_use]
    pub fn phi_source(&self, phi: InstId, index: usize) -> Option<OperandId> {
        let inst = &self.insts[phi.index()];
        if inst.is_phi() {
            inst.slots.get(index + 1).map(|s| s.operand)
        } else {
            None
        }
    }

    /// Returns the outgoing dispatch edge of a node.
    #[must_use]
    pub fn dispatch_edge(&self, node: NodeId) -> Option<EdgeId> {
        self.nodes[node.index()]
            .succs
            .iter()
            .copied()
            .find(|&e| self.edges[e.index()].kind == EdgeKind::Dispatch)
    }

    /// Returns the last instruction of `node` if it may throw.
    #[must_use]
    pub fn throwing_tail(&self, node: NodeId) -> Option<InstId> {
        self.nodes[node.index()]
            .last
            .filter(|&i| self.insts[i.index()].can_throw())
    }

    /// Returns the outgoing edge of `node` with the given kind.
    #[must_use]
    pub fn succ_edge(&self, node: NodeId, kind: EdgeKind) -> Option<EdgeId> {
        self.nodes[node.index()]
            .succs
            .iter()
            .copied()
            .find(|&e| self.edges[e.index()].kind == kind)
    }

    // ── Allocation ──────────────────────────────────────────────────────

    /// Creates a node holding only a label.
    pub fn new_node(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(Node::new(kind));
        let label = self.new_inst(Opcode::Label, Vec::new(), InstFlags::empty());
        self.link_first(id, label);
        self.touch();
        id
    }

    /// Allocates an operand.
    pub fn new_operand(&mut self, kind: OperandKind, ty: SemType) -> OperandId {
        let id = OperandId::new(self.operands.len());
        self.operands.push(Operand {
            kind,
            ty,
            def: None,
        });
        self.touch();
        id
    }

    /// Allocates an SSA temporary.
    pub fn new_temp(&mut self, ty: SemType) -> OperandId {
        self.new_operand(OperandKind::Temp, ty)
    }

    /// Allocates and declares a plain variable.
    pub fn new_variable(&mut self, ty: SemType) -> OperandId {
        let var = self.new_operand(OperandKind::Var, ty);
        self.variables.insert(var);
        var
    }

    /// Allocates a new SSA version of the plain variable `var`.
    pub fn new_ssa_var(&mut self, var: OperandId) -> OperandId {
        let ty = self.operands[var.index()].ty;
        self.new_operand(OperandKind::SsaVar { var }, ty)
    }

    /// Allocates an operand of the same kind and type as `template`.
    ///
    /// SSA variables keep their backing variable. Plain variables are not
    /// copied: the template itself is returned.
    pub fn clone_operand(&mut self, template: OperandId) -> OperandId {
        let operand = &self.operands[template.index()];
        match operand.kind {
            OperandKind::Var => template,
            kind => {
                let ty = operand.ty;
                self.new_operand(kind, ty)
            }
        }
    }

    /// Removes a plain variable declaration.
    pub fn remove_variable(&mut self, var: OperandId) -> bool {
        let removed = self.variables.remove(&var);
        if removed {
            self.touch();
        }
        removed
    }

    /// Creates a detached instruction.
    ///
    /// SSA operands in written slots record the new instruction as their
    /// definition.
    pub fn new_inst(&mut self, opcode: Opcode, slots: Vec<Slot>, flags: InstFlags) -> InstId {
        let id = InstId::new(self.insts.len());
        for slot in &slots {
            if slot.role.is_def() {
                let operand = &mut self.operands[slot.operand.index()];
                if operand.is_ssa() {
                    operand.def = Some(id);
                }
            }
        }
        self.insts.push(Instruction::new(opcode, slots, flags));
        self.touch();
        id
    }

    /// Creates a phi with the given sources, placed after the node's
    /// existing phis.
    pub fn new_phi(&mut self, node: NodeId, dst: OperandId, sources: &[OperandId]) -> InstId {
        let mut slots = Vec::with_capacity(sources.len() + 1);
        slots.push(Slot::def_of(dst));
        slots.extend(sources.iter().map(|&s| Slot::use_of(s)));
        let phi = self.new_inst(Opcode::Phi, slots, InstFlags::empty());
        self.insert_after_phis(node, phi);
        phi
    }

    // ── Instruction placement ───────────────────────────────────────────

    fn link_first(&mut self, node: NodeId, inst: InstId) {
        let old_first = self.nodes[node.index()].first;
        {
            let i = &mut self.insts[inst.index()];
            i.node = Some(node);
            i.prev = None;
            i.next = old_first;
        }
        match old_first {
            Some(f) => self.insts[f.index()].prev = Some(inst),
            None => self.nodes[node.index()].last = Some(inst),
        }
        self.nodes[node.index()].first = Some(inst);
    }

    /// Appends a detached instruction at the end of a node.
    pub fn append(&mut self, node: NodeId, inst: InstId) {
        match self.nodes[node.index()].last {
            Some(last) => self.insert_after(last, inst),
            None => {
                self.link_first(node, inst);
                self.touch();
            }
        }
    }

    /// Inserts a detached instruction right after `anchor`.
    pub fn insert_after(&mut self, anchor: InstId, inst: InstId) {
        let Some(node) = self.insts[anchor.index()].node else {
            return;
        };
        let next = self.insts[anchor.index()].next;
        {
            let i = &mut self.insts[inst.index()];
            i.node = Some(node);
            i.prev = Some(anchor);
            i.next = next;
            i.removed = false;
        }
        self.insts[anchor.index()].next = Some(inst);
        match next {
            Some(n) => self.insts[n.index()].prev = Some(inst),
            None => self.nodes[node.index()].last = Some(inst),
        }
        self.touch();
    }

    /// Inserts a detached instruction right before `anchor`.
    ///
    /// Inserting before a label is refused; the label stays first.
    pub fn insert_before(&mut self, anchor: InstId, inst: InstId) {
        if let Some(prev) = self.insts[anchor.index()].prev {
            self.insert_after(prev, inst);
        }
    }

    /// Inserts a detached instruction after the label and phis of a node.
    pub fn insert_after_phis(&mut self, node: NodeId, inst: InstId) {
        if let Some(tail) = self.phi_tail(node) {
            self.insert_after(tail, inst);
        }
    }

    /// Inserts a detached instruction at the end of a node but before a
    /// trailing control transfer or throwing instruction.
    pub fn insert_before_control(&mut self, node: NodeId, inst: InstId) {
        match self.nodes[node.index()].last {
            Some(last) => {
                let tail = &self.insts[last.index()];
                if tail.opcode.is_control() || tail.can_throw() {
                    self.insert_before(last, inst);
                } else {
                    self.insert_after(last, inst);
                }
            }
            None => self.append(node, inst),
        }
    }

    /// Removes an instruction from its node for good.
    ///
    /// The caller is responsible for def-use bookkeeping.
    pub fn unlink(&mut self, inst: InstId) {
        let (node, prev, next) = {
            let i = &self.insts[inst.index()];
            (i.node, i.prev, i.next)
        };
        let Some(node) = node else {
            return;
        };
        match prev {
            Some(p) => self.insts[p.index()].next = next,
            None => self.nodes[node.index()].first = next,
        }
        match next {
            Some(n) => self.insts[n.index()].prev = prev,
            None => self.nodes[node.index()].last = prev,
        }
        let i = &mut self.insts[inst.index()];
        i.node = None;
        i.prev = None;
        i.next = None;
        i.removed = true;
        self.touch();
    }

    /// Replaces the operand in slot `pos`.
    pub fn set_slot(&mut self, inst: InstId, pos: usize, operand: OperandId) {
        if let Some(slot) = self.insts[inst.index()].slots.get_mut(pos) {
            slot.operand = operand;
            self.touch();
        }
    }

    /// Appends a slot.
    pub fn push_slot(&mut self, inst: InstId, slot: Slot) {
        self.insts[inst.index()].slots.push(slot);
        self.touch();
    }

    /// Removes slot `pos`, shifting later slots down.
    pub fn remove_slot(&mut self, inst: InstId, pos: usize) -> Option<Slot> {
        let slots = &mut self.insts[inst.index()].slots;
        if pos < slots.len() {
            let slot = slots.remove(pos);
            self.touch();
            Some(slot)
        } else {
            None
        }
    }

    /// Changes the opcode of an instruction, keeping its slots.
    pub fn set_opcode(&mut self, inst: InstId, opcode: Opcode) {
        self.insts[inst.index()].opcode = opcode;
        self.touch();
    }

    /// Replaces the flags of an instruction.
    pub fn set_flags(&mut self, inst: InstId, flags: InstFlags) {
        self.insts[inst.index()].flags = flags;
        self.touch();
    }

    /// Attaches the safe-point facts of an instruction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ContractViolation`] if facts were already attached.
    pub fn attach_gc_facts(&mut self, inst: InstId, facts: Vec<PointerFact>) -> Result<()> {
        let slot = &mut self.insts[inst.index()].gc_facts;
        if slot.is_some() {
            return Err(contract_violation!(
                "pointer facts of {} are write-once",
                inst
            ));
        }
        *slot = Some(facts);
        self.touch();
        Ok(())
    }

    // ── Edges ───────────────────────────────────────────────────────────

    /// Adds an edge. Phis of the target are not touched; the caller appends
    /// the matching phi sources.
    pub fn add_edge(
        &mut self,
        source: NodeId,
        target: NodeId,
        kind: EdgeKind,
        prob: f64,
    ) -> EdgeId {
        let id = EdgeId::new(self.edges.len());
        self.edges.push(Edge {
            source,
            target,
            kind,
            prob,
            removed: false,
        });
        self.nodes[source.index()].succs.push(id);
        self.nodes[target.index()].preds.push(id);
        self.touch();
        id
    }

    /// Removes the phi sources flowing along incoming edge `index` of `node`
    /// and returns them in phi order.
    fn take_phi_sources(&mut self, node: NodeId, index: usize) -> Vec<OperandId> {
        let phis = self.phis(node);
        let mut taken = Vec::with_capacity(phis.len());
        for phi in phis {
            if let Some(slot) = self.remove_slot(phi, index + 1) {
                taken.push(slot.operand);
            }
        }
        taken
    }

    /// Removes an edge together with the phi sources it carries.
    ///
    /// Returns the removed phi sources in phi order. The caller is responsible
    /// for def-use bookkeeping.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEdge`] if the edge was already removed.
    pub fn remove_edge(&mut self, edge: EdgeId) -> Result<Vec<OperandId>> {
        let (source, target) = {
            let e = self.try_edge(edge)?;
            (e.source, e.target)
        };
        let index = self.pred_index(edge).ok_or(Error::InvalidEdge(edge))?;
        let taken = self.take_phi_sources(target, index);
        self.nodes[target.index()].preds.remove(index);
        self.nodes[source.index()].succs.retain(|&e| e != edge);
        self.edges[edge.index()].removed = true;
        self.touch();
        Ok(taken)
    }

    /// Moves the target end of an edge to `new_target`.
    ///
    /// The edge is appended to the new target's incoming edges. The phi
    /// sources it carried at the old target are removed and returned in phi
    /// order; the caller appends sources to the new target's phis.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEdge`] if the edge was removed, or
    /// [`Error::InvalidNode`] if the new target was removed.
    pub fn retarget_edge(&mut self, edge: EdgeId, new_target: NodeId) -> Result<Vec<OperandId>> {
        self.try_node(new_target)?;
        let old_target = self.try_edge(edge)?.target;
        let index = self.pred_index(edge).ok_or(Error::InvalidEdge(edge))?;
        let taken = self.take_phi_sources(old_target, index);
        self.nodes[old_target.index()].preds.remove(index);
        self.nodes[new_target.index()].preds.push(edge);
        self.edges[edge.index()].target = new_target;
        self.touch();
        Ok(taken)
    }

    /// Moves the source end of an edge to `new_source`, keeping its position
    /// at the target.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEdge`] if the edge was removed.
    pub fn move_edge_source(&mut self, edge: EdgeId, new_source: NodeId) -> Result<()> {
        let old_source = self.try_edge(edge)?.source;
        self.nodes[old_source.index()].succs.retain(|&e| e != edge);
        self.nodes[new_source.index()].succs.push(edge);
        self.edges[edge.index()].source = new_source;
        self.touch();
        Ok(())
    }

    /// Splits an edge by inserting a new block.
    ///
    /// The original edge now ends at the new block, and a fresh unconditional
    /// edge from the new block takes over the original edge's position among
    /// the target's incoming edges, so phi sources stay aligned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEdge`] if the edge was removed.
    pub fn split_edge(&mut self, edge: EdgeId) -> Result<NodeId> {
        let (source, target, prob) = {
            let e = self.try_edge(edge)?;
            (e.source, e.target, e.prob)
        };
        let index = self.pred_index(edge).ok_or(Error::InvalidEdge(edge))?;

        let block = self.new_node(NodeKind::Block);
        self.nodes[block.index()].exec_count = self.nodes[source.index()].exec_count * prob;

        let tail = EdgeId::new(self.edges.len());
        self.edges.push(Edge {
            source: block,
            target,
            kind: EdgeKind::Unconditional,
            prob: 1.0,
            removed: false,
        });
        self.nodes[block.index()].succs.push(tail);
        self.nodes[target.index()].preds[index] = tail;

        self.edges[edge.index()].target = block;
        self.nodes[block.index()].preds.push(edge);
        self.touch();
        Ok(block)
    }

    /// Changes the kind and probability of an edge.
    pub fn set_edge_kind(&mut self, edge: EdgeId, kind: EdgeKind, prob: f64) {
        let e = &mut self.edges[edge.index()];
        e.kind = kind;
        e.prob = prob;
        self.touch();
    }

    // ── Nodes ───────────────────────────────────────────────────────────

    pub(crate) fn set_node_kind(&mut self, node: NodeId, kind: NodeKind) {
        self.nodes[node.index()].kind = kind;
        self.touch();
    }

    /// Sets the execution count estimate of a node.
    pub fn set_exec_count(&mut self, node: NodeId, count: f64) {
        self.nodes[node.index()].exec_count = count;
        self.touch();
    }

    /// Removes a node that has no remaining edges, unlinking its
    /// instructions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ContractViolation`] if the node still has edges or is
    /// the entry or exit node.
    pub fn remove_node(&mut self, node: NodeId) -> Result<()> {
        let n = self.try_node(node)?;
        if !n.preds.is_empty() || !n.succs.is_empty() {
            return Err(contract_violation!("{} still has edges", node));
        }
        if node == self.entry || node == self.exit {
            return Err(contract_violation!("{} cannot be removed", node));
        }
        let insts: Vec<InstId> = self.insts_of(node).collect();
        for inst in insts {
            self.unlink(inst);
        }
        self.nodes[node.index()].removed = true;
        if self.return_node == Some(node) {
            self.return_node = None;
        }
        self.touch();
        Ok(())
    }

    /// Moves every non-label instruction of `from` to the end of `to`.
    pub fn move_instructions(&mut self, from: NodeId, to: NodeId) {
        let insts: Vec<InstId> = self.insts_of(from).skip(1).collect();
        for inst in insts {
            self.unlink(inst);
            self.insts[inst.index()].removed = false;
            self.append(to, inst);
        }
    }
}

/// Iterator over the instructions of one node.
pub struct InstIter<'a> {
    cfg: &'a ControlFlowGraph,
    next: Option<InstId>,
}

impl Iterator for InstIter<'_> {
    type Item = InstId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.cfg.insts[current.index()].next;
        Some(current)
    }
}

impl GraphBase for ControlFlowGraph {
    fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        self.nodes()
    }
}

impl Successors for ControlFlowGraph {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.nodes[node.index()]
            .succs
            .iter()
            .map(|&e| self.edges[e.index()].target)
    }
}

impl Predecessors for ControlFlowGraph {
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.nodes[node.index()]
            .preds
            .iter()
            .map(|&e| self.edges[e.index()].source)
    }
}

impl RootedGraph for ControlFlowGraph {
    fn entry(&self) -> NodeId {
        self.entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_block_join() -> (ControlFlowGraph, NodeId, NodeId, NodeId, InstId) {
        let mut cfg = ControlFlowGraph::new();
        let a = cfg.new_node(NodeKind::Block);
        let b = cfg.new_node(NodeKind::Block);
        let join = cfg.new_node(NodeKind::Block);
        let entry = cfg.entry();
        cfg.add_edge(entry, a, EdgeKind::True, 0.5);
        cfg.add_edge(entry, b, EdgeKind::False, 0.5);
        cfg.add_edge(a, join, EdgeKind::Unconditional, 1.0);
        cfg.add_edge(b, join, EdgeKind::Unconditional, 1.0);
        let x = cfg.new_temp(SemType::I32);
        let y = cfg.new_temp(SemType::I32);
        let z = cfg.new_temp(SemType::I32);
        let phi = cfg.new_phi(join, z, &[x, y]);
        (cfg, a, b, join, phi)
    }

    #[test]
    fn test_new_graph_has_entry_and_exit() {
        let cfg = ControlFlowGraph::new();
        assert_eq!(cfg.nodes().count(), 2);
        assert_eq!(cfg.node(cfg.entry()).kind(), NodeKind::Entry);
        assert_eq!(cfg.node(cfg.exit()).kind(), NodeKind::Exit);
        let label = cfg.node(cfg.entry()).label().unwrap();
        assert!(cfg.inst(label).is_label());
    }

    #[test]
    fn test_instruction_list_order() {
        let mut cfg = ControlFlowGraph::new();
        let node = cfg.entry();
        let t = cfg.new_temp(SemType::I32);
        let c1 = cfg.new_inst(Opcode::Const(1), vec![Slot::def_of(t)], InstFlags::empty());
        cfg.append(node, c1);
        let u = cfg.new_temp(SemType::I32);
        let c0 = cfg.new_inst(Opcode::Const(0), vec![Slot::def_of(u)], InstFlags::empty());
        cfg.insert_before(c1, c0);

        let order: Vec<_> = cfg.insts_of(node).skip(1).collect();
        assert_eq!(order, vec![c0, c1]);
        assert_eq!(cfg.operand(t).def(), Some(c1));

        cfg.unlink(c0);
        assert!(cfg.inst(c0).is_removed());
        assert_eq!(cfg.insts_of(node).skip(1).collect::<Vec<_>>(), vec![c1]);
        assert_eq!(cfg.node(node).last(), Some(c1));
    }

    #[test]
    fn test_insert_before_label_is_refused() {
        let mut cfg = ControlFlowGraph::new();
        let label = cfg.node(cfg.entry()).label().unwrap();
        let t = cfg.new_temp(SemType::I32);
        let c = cfg.new_inst(Opcode::Const(1), vec![Slot::def_of(t)], InstFlags::empty());
        cfg.insert_before(label, c);
        assert_eq!(cfg.insts_of(cfg.entry()).count(), 1);
        assert!(cfg.inst(c).node().is_none());
    }

    #[test]
    fn test_remove_edge_trims_phi() {
        let (mut cfg, a, _b, join, phi) = two_block_join();
        let edge = cfg.node(a).succs()[0];
        let taken = cfg.remove_edge(edge).unwrap();

        assert_eq!(taken.len(), 1);
        assert_eq!(cfg.node(join).preds().len(), 1);
        assert_eq!(cfg.inst(phi).phi_sources().len(), 1);
        assert!(cfg.remove_edge(edge).is_err());
    }

    #[test]
    fn test_split_edge_keeps_phi_position() {
        let (mut cfg, a, b, join, phi) = two_block_join();
        let before = cfg.inst(phi).phi_sources();
        let edge = cfg.node(a).succs()[0];
        let mid = cfg.split_edge(edge).unwrap();

        assert_eq!(cfg.inst(phi).phi_sources(), before);
        let preds: Vec<NodeId> = cfg.predecessors(join).collect();
        assert_eq!(preds, vec![mid, b]);
        assert_eq!(cfg.predecessors(mid).collect::<Vec<_>>(), vec![a]);
    }

    #[test]
    fn test_retarget_edge_returns_sources() {
        let (mut cfg, a, _b, join, phi) = two_block_join();
        let other = cfg.new_node(NodeKind::Block);
        let edge = cfg.node(a).succs()[0];
        let first = cfg.phi_source(phi, 0).unwrap();

        let taken = cfg.retarget_edge(edge, other).unwrap();
        assert_eq!(taken, vec![first]);
        assert_eq!(cfg.node(join).preds().len(), 1);
        assert_eq!(cfg.node(other).preds(), &[edge]);
    }

    #[test]
    fn test_revision_bumps_on_mutation() {
        let mut cfg = ControlFlowGraph::new();
        let rev = cfg.revision();
        cfg.new_temp(SemType::I64);
        assert!(cfg.revision() > rev);
    }

    #[test]
    fn test_gc_facts_are_write_once() {
        let mut cfg = ControlFlowGraph::new();
        let sp = cfg.new_inst(Opcode::SafePoint, Vec::new(), InstFlags::SAFE_POINT);
        cfg.append(cfg.entry(), sp);
        cfg.attach_gc_facts(sp, Vec::new()).unwrap();
        assert!(matches!(
            cfg.attach_gc_facts(sp, Vec::new()),
            Err(Error::ContractViolation { .. })
        ));
    }

    #[test]
    fn test_remove_node_requires_no_edges() {
        let (mut cfg, a, _b, _join, _phi) = two_block_join();
        assert!(cfg.remove_node(a).is_err());
        let lonely = cfg.new_node(NodeKind::Block);
        cfg.remove_node(lonely).unwrap();
        assert!(cfg.try_node(lonely).is_err());
    }
}
