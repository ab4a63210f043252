//! Dead code elimination with bit-width narrowing.
//!
//! The eliminator is a mark and sweep over the instructions of a graph,
//! restricted to an instruction id window so it can run on an inlined region
//! without touching the code around it.
//!
//! # Phases
//!
//! 1. **Seed**: uses are copy-propagated to their ultimate source through
//!    same-type copies, degenerate phis and loads of variables with a single
//!    dominating store. Essential instructions (see [`Opcode::is_essential`]),
//!    the definition of the return operand and every instruction outside the
//!    window are marked live.
//! 2. **Propagate**: a worklist marks the definition of every source of a
//!    live instruction live; reading a plain variable makes every
//!    instruction writing it live. With width tracking a definition is revisited
//!    whenever the width its consumers need grows; widths come from
//!    [`required_width`].
//! 3. **Sweep**: instructions never marked live are unlinked. A removed
//!    throwing instruction takes its dispatch edge with it. Method markers
//!    survive but lose their references to removed values. Conversions whose
//!    used bits fit both types become copies.
//! 4. **Cleanup**: unreferenced variable declarations are deleted, trivially
//!    chained blocks are merged and empty blocks are bypassed.
//!
//! Running the eliminator twice in a row removes nothing the second time.
//!
//! # Prerequisites
//!
//! Every phi must have one source per incoming edge; run
//! [`UnreachableCodePass`](super::UnreachableCodePass) first after edge
//! removals.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::{
    analysis::DefUseIndex,
    compiler::{
        pass::OptPass,
        passes::{
            blockmerge::{bypass_empty_blocks, merge_blocks},
            unreachable::purge_unreachable,
            width::{conversion_is_redundant, required_width},
        },
        CompilationContext, EventKind, EventLog, MethodId,
    },
    ir::{verify_phi_arity, ControlFlowGraph, InstId, Opcode, OperandId},
    utils::{
        graph::algorithms::{compute_dominators, DominatorTree},
        BitSet,
    },
    OptimizerFlags, Result,
};

/// Options of one dead code elimination run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DceOptions {
    /// Track used widths and narrow conversions.
    pub narrow_widths: bool,
    /// Outermost scope: stores to and declarations of plain variables may be
    /// deleted.
    pub delete_variables: bool,
    /// Do not bypass an empty block that splits a critical edge.
    pub preserve_critical_edges: bool,
    /// Inclusive instruction id window; `None` covers the whole graph.
    pub window: Option<(InstId, InstId)>,
    /// Upper bound on cleanup rounds.
    pub max_iterations: usize,
}

impl Default for DceOptions {
    fn default() -> Self {
        Self::from_flags(&OptimizerFlags::default())
    }
}

impl DceOptions {
    /// Derives the options from the optimizer configuration.
    #[must_use]
    pub fn from_flags(flags: &OptimizerFlags) -> Self {
        Self {
            narrow_widths: flags.narrow_widths,
            delete_variables: flags.delete_variables,
            preserve_critical_edges: flags.preserve_critical_edges,
            window: None,
            max_iterations: flags.max_dce_iterations.max(1),
        }
    }

    /// Restricts the run to instructions with ids in `min..=max`.
    #[must_use]
    pub fn with_window(mut self, min: InstId, max: InstId) -> Self {
        self.window = Some((min, max));
        self
    }
}

/// What one run changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DceStats {
    /// Instructions unlinked by the sweep.
    pub instructions_removed: usize,
    /// Dispatch edges removed with throwing instructions.
    pub edges_removed: usize,
    /// Uses rewritten by copy propagation.
    pub copies_propagated: usize,
    /// Conversions rewritten to copies.
    pub conversions_narrowed: usize,
    /// Method marker references stripped.
    pub marker_refs_stripped: usize,
    /// Variable declarations deleted.
    pub variables_removed: usize,
    /// Blocks merged into their predecessor.
    pub blocks_merged: usize,
    /// Empty or unreachable blocks removed.
    pub blocks_removed: usize,
}

impl DceStats {
    /// Returns `true` if the run changed anything.
    #[must_use]
    pub fn changed(&self) -> bool {
        *self != Self::default()
    }
}

/// A single dead code elimination run over one graph.
///
/// # Usage
///
/// ```rust
/// use midend::analysis::DefUseIndex;
/// use midend::compiler::{DceOptions, DeadCodeEliminator};
/// use midend::ir::{CfgBuilder, SemType};
///
/// let mut cfg = CfgBuilder::new().build_with(|f| {
///     f.block(0, |b| {
///         let a = b.arg(0, SemType::I32);
///         let c = b.arg(1, SemType::I32);
///         b.add(a, a);
///         b.ret(Some(c));
///     });
/// });
/// let mut du = DefUseIndex::build(&cfg);
/// let stats = DeadCodeEliminator::new(&mut cfg, &mut du, DceOptions::default())
///     .run()
///     .unwrap();
/// assert_eq!(stats.instructions_removed, 2);
/// ```
pub struct DeadCodeEliminator<'a> {
    cfg: &'a mut ControlFlowGraph,
    du: &'a mut DefUseIndex,
    options: DceOptions,
    events: Option<(&'a EventLog, MethodId)>,
    live: BitSet,
    used_width: Vec<u8>,
    worklist: Vec<InstId>,
    writers: HashMap<OperandId, Vec<InstId>>,
    loaded_vars: HashSet<OperandId>,
    forwarded: HashMap<OperandId, OperandId>,
    resolving: HashSet<OperandId>,
    dominators: Option<DominatorTree>,
    stats: DceStats,
}

impl<'a> DeadCodeEliminator<'a> {
    /// Creates an eliminator; nothing happens until [`run`](Self::run).
    pub fn new(cfg: &'a mut ControlFlowGraph, du: &'a mut DefUseIndex, options: DceOptions) -> Self {
        let capacity = cfg.inst_capacity();
        Self {
            cfg,
            du,
            options,
            events: None,
            live: BitSet::new(capacity),
            used_width: vec![0; capacity],
            worklist: Vec::new(),
            writers: HashMap::new(),
            loaded_vars: HashSet::new(),
            forwarded: HashMap::new(),
            resolving: HashSet::new(),
            dominators: None,
            stats: DceStats::default(),
        }
    }

    /// Records one event per change into `events`.
    #[must_use]
    pub fn with_events(mut self, events: &'a EventLog, method: MethodId) -> Self {
        self.events = Some((events, method));
        self
    }

    /// Runs all four phases.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ContractViolation`](crate::Error::ContractViolation)
    /// if a phi's arity does not match its node's in-degree.
    pub fn run(mut self) -> Result<DceStats> {
        verify_phi_arity(self.cfg)?;
        self.seed();
        self.propagate();
        self.sweep()?;
        self.cleanup()?;
        log::debug!("dead code elimination: {:?}", self.stats);
        Ok(self.stats)
    }

    fn in_window(&self, inst: InstId) -> bool {
        match self.options.window {
            Some((min, max)) => min <= inst && inst <= max,
            None => true,
        }
    }

    fn record(&self, kind: EventKind, location: usize, message: impl Into<String>) {
        if let Some((events, method)) = self.events {
            events.record(kind).at(method, location).message(message);
        }
    }

    // ── Seed ────────────────────────────────────────────────────────────

    fn seed(&mut self) {
        self.dominators = Some(compute_dominators(&*self.cfg, self.cfg.entry()));
        let all: Vec<InstId> = self.cfg.instructions().collect();
        for &inst in &all {
            for var in self.written_vars(inst) {
                self.writers.entry(var).or_default().push(inst);
            }
        }

        for &inst in &all {
            if self.in_window(inst) {
                self.propagate_copies(inst);
            }
        }

        let return_def = self
            .cfg
            .return_operand()
            .filter(|&op| self.cfg.operand(op).is_ssa())
            .and_then(|op| self.cfg.operand(op).def());
        let return_var = self
            .cfg
            .return_operand()
            .filter(|&op| !self.cfg.operand(op).is_ssa());

        for &inst in &all {
            let opcode = self.cfg.inst(inst).opcode();
            let written = self.written_vars(inst);
            let seed = !self.in_window(inst)
                || opcode.is_essential()
                || Some(inst) == return_def
                || (!written.is_empty()
                    && (!self.options.delete_variables
                        || return_var.is_some_and(|v| written.contains(&v))));
            if seed {
                let width = self.full_width_of(inst);
                self.mark(inst, width);
            } else if matches!(opcode, Opcode::Label | Opcode::MethodMarker(_)) {
                self.live.insert(inst.index());
            }
        }
    }

    /// Rewrites every use of `user` to the ultimate source of its value.
    fn propagate_copies(&mut self, user: InstId) {
        let uses: Vec<(usize, OperandId)> = self.cfg.inst(user).uses().collect();
        for (pos, operand) in uses {
            if self.cfg.operand(operand).def() == Some(user) {
                continue;
            }
            let source = self.resolve(operand);
            if source != operand {
                self.du.set_use(self.cfg, user, pos, source);
                self.stats.copies_propagated += 1;
                self.record(
                    EventKind::CopyPropagated,
                    user.index(),
                    format!("{operand} -> {source}"),
                );
            }
        }
    }

    /// Follows forwarding definitions from `operand`, memoized and
    /// cycle-safe.
    fn resolve(&mut self, operand: OperandId) -> OperandId {
        if let Some(&source) = self.forwarded.get(&operand) {
            return source;
        }
        if !self.resolving.insert(operand) {
            return operand;
        }
        let source = match self.forward(operand) {
            Some(next) if next != operand => self.resolve(next),
            _ => operand,
        };
        self.resolving.remove(&operand);
        self.forwarded.insert(operand, source);
        source
    }

    /// Returns the operand a definition of `operand` merely forwards.
    fn forward(&self, operand: OperandId) -> Option<OperandId> {
        let op = self.cfg.operand(operand);
        let def = op.def()?;
        let inst = self.cfg.inst(def);
        if inst.node().is_none() {
            return None;
        }
        let candidate = match inst.opcode() {
            Opcode::Copy => inst.src(0)?,
            Opcode::Phi => {
                let mut others = inst.srcs().filter(|&s| s != operand);
                let first = others.next()?;
                if !others.all(|s| s == first) {
                    return None;
                }
                first
            }
            Opcode::LdVar => self.single_store_value(def, inst.src(0)?)?,
            _ => return None,
        };
        let source = self.cfg.operand(candidate);
        (source.is_ssa() && source.ty() == op.ty()).then_some(candidate)
    }

    /// Plain variables `inst` writes.
    fn written_vars(&self, inst: InstId) -> Vec<OperandId> {
        self.cfg
            .inst(inst)
            .slots()
            .iter()
            .filter(|s| s.role.is_def() && !self.cfg.operand(s.operand).is_ssa())
            .map(|s| s.operand)
            .collect()
    }

    /// Returns the value stored to `var` if its only writer is a store that
    /// dominates `load`.
    fn single_store_value(&self, load: InstId, var: OperandId) -> Option<OperandId> {
        let [store] = self.writers.get(&var)?.as_slice() else {
            return None;
        };
        if self.cfg.inst(*store).opcode() != Opcode::StVar {
            return None;
        }
        let store_node = self.cfg.inst(*store).node()?;
        let load_node = self.cfg.inst(load).node()?;
        let dominates = if store_node == load_node {
            self.cfg
                .insts_of(load_node)
                .find(|&i| i == *store || i == load)
                == Some(*store)
        } else {
            self.dominators
                .as_ref()
                .is_some_and(|d| d.dominates(store_node, load_node))
        };
        if dominates {
            self.cfg.inst(*store).src(0)
        } else {
            None
        }
    }

    fn full_width_of(&self, inst: InstId) -> u8 {
        self.cfg
            .inst(inst)
            .dst()
            .map_or(64, |d| self.cfg.operand(d).ty().full_width())
    }

    /// Marks `inst` live with at least `width` used bits, queueing it if
    /// that is new information.
    fn mark(&mut self, inst: InstId, width: u8) {
        let index = inst.index();
        let first = self.live.insert(index);
        if first || width > self.used_width[index] {
            self.used_width[index] = self.used_width[index].max(width);
            self.worklist.push(inst);
        }
    }

    // ── Propagate ───────────────────────────────────────────────────────

    fn propagate(&mut self) {
        while let Some(inst) = self.worklist.pop() {
            let (opcode, dst_ty, uses) = {
                let i = self.cfg.inst(inst);
                let dst_ty = i.dst().map(|d| self.cfg.operand(d).ty());
                (i.opcode(), dst_ty, i.uses().collect::<Vec<_>>())
            };
            let used = self.used_width[inst.index()];

            for (position, (_, operand)) in uses.into_iter().enumerate() {
                let op = self.cfg.operand(operand);
                if !op.is_ssa() {
                    // Reading a variable makes all of its writers live.
                    if self.loaded_vars.insert(operand) {
                        let writers = self.writers.get(&operand).cloned().unwrap_or_default();
                        for writer in writers {
                            let width = self.full_width_of(writer);
                            self.mark(writer, width);
                        }
                    }
                    continue;
                }
                let Some(def) = op.def() else {
                    continue;
                };
                let width = if self.options.narrow_widths {
                    required_width(opcode, dst_ty, used, position, op.ty())
                } else {
                    op.ty().full_width()
                };
                self.mark(def, width);
            }
        }
    }

    // ── Sweep ───────────────────────────────────────────────────────────

    fn sweep(&mut self) -> Result<()> {
        let window: Vec<InstId> = self
            .cfg
            .instructions()
            .filter(|&i| self.in_window(i))
            .collect();

        for &inst in &window {
            if self.live.contains(inst.index()) {
                continue;
            }
            let (node, throws, text) = {
                let i = self.cfg.inst(inst);
                (i.node(), i.can_throw(), self.cfg.display_inst(inst))
            };
            self.du.unlink(self.cfg, inst);
            self.stats.instructions_removed += 1;
            self.record(EventKind::InstructionRemoved, inst.index(), text);

            if throws {
                if let Some(edge) = node.and_then(|n| self.cfg.dispatch_edge(n)) {
                    self.du.remove_edge(self.cfg, edge)?;
                    self.stats.edges_removed += 1;
                    self.record(
                        EventKind::EdgeRemoved,
                        edge.index(),
                        format!("dispatch edge of removed {inst}"),
                    );
                }
            }
        }

        for &inst in &window {
            let i = self.cfg.inst(inst);
            if i.node().is_none() {
                continue;
            }
            match i.opcode() {
                Opcode::MethodMarker(_) => self.strip_marker(inst),
                Opcode::Conv { .. } if self.options.narrow_widths => {
                    let (Some(dst), Some(src)) = (i.dst(), i.src(0)) else {
                        continue;
                    };
                    let dst_ty = self.cfg.operand(dst).ty();
                    let src_ty = self.cfg.operand(src).ty();
                    let used = self.used_width[inst.index()];
                    if conversion_is_redundant(i.opcode(), src_ty, dst_ty, used) {
                        self.cfg.set_opcode(inst, Opcode::Copy);
                        self.stats.conversions_narrowed += 1;
                        self.record(
                            EventKind::ConversionNarrowed,
                            inst.index(),
                            format!("{src_ty} -> {dst_ty} uses {used} bits"),
                        );
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn strip_marker(&mut self, marker: InstId) {
        let stale: Vec<usize> = self
            .cfg
            .inst(marker)
            .uses()
            .filter(|&(_, op)| {
                self.cfg
                    .operand(op)
                    .def()
                    .is_some_and(|d| self.cfg.inst(d).is_removed())
            })
            .map(|(pos, _)| pos)
            .collect();
        for &pos in stale.iter().rev() {
            self.du.remove_slot(self.cfg, marker, pos);
            self.stats.marker_refs_stripped += 1;
        }
    }

    // ── Cleanup ─────────────────────────────────────────────────────────

    fn cleanup(&mut self) -> Result<()> {
        if self.options.delete_variables {
            self.remove_unreferenced_variables();
        }
        if self.stats.edges_removed > 0 {
            let (purged, dead) = purge_unreachable(self.cfg)?;
            for node in dead {
                self.record(EventKind::BlockRemoved, node.index(), "unreachable after sweep");
            }
            self.stats.blocks_removed += purged.nodes;
        }

        for round in 0.. {
            if round == self.options.max_iterations {
                log::warn!(
                    "block cleanup still changing after {} rounds",
                    self.options.max_iterations
                );
                break;
            }
            let merged = merge_blocks(self.cfg, self.du)?;
            for &(node, next) in &merged {
                self.record(EventKind::BlocksMerged, node.index(), format!("{next} into {node}"));
            }
            let bypassed =
                bypass_empty_blocks(self.cfg, self.du, self.options.preserve_critical_edges)?;
            for &(node, target) in &bypassed {
                self.record(
                    EventKind::BlockRemoved,
                    node.index(),
                    format!("empty {node} bypassed to {target}"),
                );
            }
            self.stats.blocks_merged += merged.len();
            self.stats.blocks_removed += bypassed.len();
            if merged.is_empty() && bypassed.is_empty() {
                break;
            }
        }
        Ok(())
    }

    fn remove_unreferenced_variables(&mut self) {
        let mut referenced: BTreeSet<OperandId> = self.cfg.return_operand().into_iter().collect();
        for inst in self.cfg.instructions() {
            for slot in self.cfg.inst(inst).slots() {
                let op = self.cfg.operand(slot.operand);
                referenced.insert(op.backing_var().unwrap_or(slot.operand));
            }
        }
        let unreferenced: Vec<OperandId> = self
            .cfg
            .variables()
            .filter(|v| !referenced.contains(v))
            .collect();
        for var in unreferenced {
            self.cfg.remove_variable(var);
            self.stats.variables_removed += 1;
            self.record(EventKind::VariableRemoved, var.index(), format!("{var}"));
        }
    }
}

/// Pass wrapper around [`DeadCodeEliminator`].
pub struct DeadCodeEliminationPass;

impl Default for DeadCodeEliminationPass {
    fn default() -> Self {
        Self::new()
    }
}

impl DeadCodeEliminationPass {
    /// Creates a new dead code elimination pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl OptPass for DeadCodeEliminationPass {
    fn name(&self) -> &'static str {
        "dead-code-elimination"
    }

    fn description(&self) -> &'static str {
        "Removes instructions no essential instruction depends on and narrows conversions"
    }

    fn run(&self, cfg: &mut ControlFlowGraph, ctx: &CompilationContext<'_>) -> Result<bool> {
        let mut du = DefUseIndex::build(cfg);
        let stats = DeadCodeEliminator::new(cfg, &mut du, DceOptions::from_flags(ctx.flags))
            .with_events(ctx.events, ctx.method)
            .run()?;
        Ok(stats.changed())
    }
}
