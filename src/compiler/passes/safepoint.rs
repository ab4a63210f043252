//! Safe-point pointer tracking.
//!
//! Every instruction flagged [`InstFlags::SAFE_POINT`] receives the list of
//! interior pointers live across it, each with the base object it points
//! into and its offset from that base. The collector uses these facts to
//! relocate interior pointers when it moves their base.
//!
//! The tracker is a forward fixed point over the nodes in reverse postorder.
//! Each node keeps the fact set at its exit. A node's entry state is the
//! merge of the exit sets of its already visited predecessors, restricted to
//! pointers live at the node's entry; phis map each predecessor's fact for
//! their source onto their destination.
//!
//! | instruction | effect on the destination pointer |
//! |---|---|
//! | copy, load or store of an object | base = the object, offset 0 |
//! | copy, load or store of a pointer | the source's fact |
//! | add/sub of a constant | source fact, offset adjusted |
//! | add/sub of anything else | source fact, offset unknown |
//! | `lea base, index*scale + disp` | base fact, offset + disp (+ constant index * scale) |
//! | static field address | static base, offset 0 |
//! | any other definition | no fact |
//!
//! A definition of an object operand kills the facts based on it whose
//! offset is unknown; facts with a known offset survive.
//!
//! # Merging
//!
//! Facts agreeing on base and offset are kept. Agreement on the base alone
//! gives an unknown offset. Object bases that disagree get a synthetic base:
//! a fresh object variable assigned each predecessor's base at the end of the
//! predecessor. The graph changed, so the whole fixed point restarts from an
//! empty state with fresh liveness. A static base never merges with an
//! object base.
//!
//! [`TrackerMode::OffsetsOnly`] never changes the graph: facts that would
//! need a synthetic base or end up with an unknown offset are dropped.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::{
    analysis::{ControlFlowQueries, Liveness, LoopTree},
    compiler::{pass::OptPass, CompilationContext, EventKind, EventLog, MethodId},
    error::contract_violation,
    ir::{
        ControlFlowGraph, FactBase, InstFlags, InstId, Offset, Opcode, OperandId, PointerFact,
        SemType, Slot,
    },
    utils::{
        graph::{algorithms, EdgeId, NodeId},
        BitSet,
    },
    Error, Result,
};

/// How the tracker deals with pointers whose base or offset is ambiguous.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TrackerMode {
    /// Synthesize bases for disagreeing objects and report unknown offsets.
    #[default]
    Full,
    /// Leave the graph untouched; drop every ambiguous fact.
    OffsetsOnly,
}

/// Counters of one tracker run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SafePointStats {
    /// Passes over the graph, across all restarts.
    pub passes: usize,
    /// Passes that changed some node's exit facts, across all restarts.
    /// Each fixed point ends with one more pass that only confirms them.
    pub changing_passes: usize,
    /// Restarts caused by synthetic bases.
    pub restarts: usize,
    /// Synthetic base variables created.
    pub synthetic_bases: usize,
    /// Safe points that received facts.
    pub safe_points: usize,
}

type Fact = (FactBase, Offset);
type FactMap = BTreeMap<OperandId, Fact>;

enum Merge {
    Keep(Fact),
    Drop,
    Restart,
}

/// Computes and attaches the pointer facts of every safe point of a graph.
///
/// # Examples
///
/// ```rust
/// use midend::compiler::{SafePointTracker, TrackerMode};
/// use midend::ir::{CfgBuilder, FactBase, Offset, SemType};
///
/// let mut sp = None;
/// let mut cfg = CfgBuilder::new().build_with(|f| {
///     f.block(0, |b| {
///         let obj = b.new_object(1);
///         let ptr = b.lea(obj, None, 1, 16);
///         sp = Some(b.safepoint());
///         let v = b.ld_ind(SemType::I32, ptr);
///         b.ret(Some(v));
///     });
/// });
///
/// SafePointTracker::new(&mut cfg, TrackerMode::Full).run()?;
/// let facts = cfg.inst(sp.unwrap()).gc_facts().unwrap();
/// assert_eq!(facts.len(), 1);
/// assert!(matches!(facts[0].base, FactBase::Object(_)));
/// assert_eq!(facts[0].offset, Offset::Known(16));
/// # Ok::<(), midend::Error>(())
/// ```
pub struct SafePointTracker<'a> {
    cfg: &'a mut ControlFlowGraph,
    mode: TrackerMode,
    checked: bool,
    events: Option<(&'a EventLog, MethodId)>,
    stats: SafePointStats,
    /// Synthetic base per (merge node, pointer).
    resolutions: HashMap<(NodeId, OperandId), OperandId>,
    synthetic: BTreeSet<OperandId>,
    /// (predecessor edge, synthetic base) pairs already assigned.
    assigned: BTreeSet<(EdgeId, OperandId)>,
}

impl<'a> SafePointTracker<'a> {
    /// Creates a tracker over `cfg`.
    ///
    /// Checking defaults to on in debug builds.
    #[must_use]
    pub fn new(cfg: &'a mut ControlFlowGraph, mode: TrackerMode) -> Self {
        Self {
            cfg,
            mode,
            checked: cfg!(debug_assertions),
            events: None,
            stats: SafePointStats::default(),
            resolutions: HashMap::new(),
            synthetic: BTreeSet::new(),
            assigned: BTreeSet::new(),
        }
    }

    /// Turns the pass bound into a hard error (`true`) or a warning.
    #[must_use]
    pub fn with_checked(mut self, checked: bool) -> Self {
        self.checked = checked;
        self
    }

    /// Records events for recorded safe points and synthetic bases.
    #[must_use]
    pub fn with_events(mut self, events: &'a EventLog, method: MethodId) -> Self {
        self.events = Some((events, method));
        self
    }

    /// Runs the tracker to its fixed point and attaches the facts.
    ///
    /// # Errors
    ///
    /// - [`Error::IterationLimit`] if checking is on and the fixed point
    ///   needs more than `max_loop_depth + 1` changing passes
    /// - [`Error::ContractViolation`] if a safe point already carries facts
    pub fn run(mut self) -> Result<SafePointStats> {
        let has_safe_points = self
            .cfg
            .instructions()
            .any(|inst| self.cfg.inst(inst).is_safe_point());
        if !has_safe_points {
            return Ok(self.stats);
        }

        let recorded = loop {
            if let Some(recorded) = self.fixed_point()? {
                break recorded;
            }
            self.stats.restarts += 1;
            log::debug!(
                "safe-point tracker restarting after synthetic base (restart {})",
                self.stats.restarts
            );
        };

        for (inst, facts) in recorded {
            let count = facts.len();
            self.cfg.attach_gc_facts(inst, facts)?;
            self.stats.safe_points += 1;
            if let Some((events, method)) = self.events {
                events
                    .record(EventKind::SafePointsRecorded)
                    .at(method, inst.index())
                    .message(format!("{count} pointer facts at {inst}"));
            }
        }
        Ok(self.stats)
    }

    /// One fixed point from empty state. Returns `None` when the graph was
    /// changed and the caller must start over.
    fn fixed_point(&mut self) -> Result<Option<BTreeMap<InstId, Vec<PointerFact>>>> {
        let liveness = Liveness::compute(self.cfg);
        let limit = LoopTree::compute(self.cfg).max_loop_depth() + 1;
        let order = algorithms::reverse_postorder(&*self.cfg, self.cfg.entry());

        let mut exits: HashMap<NodeId, FactMap> = HashMap::new();
        let mut recorded = BTreeMap::new();
        let mut changing = 0;
        loop {
            liveness.ensure_current(self.cfg)?;
            self.stats.passes += 1;
            let mut changed = false;
            for &node in &order {
                let Some(mut state) = self.entry_state(node, &liveness, &exits)? else {
                    return Ok(None);
                };
                self.replay_node(node, &liveness, &mut state, &mut recorded);
                if exits.get(&node) != Some(&state) {
                    exits.insert(node, state);
                    changed = true;
                }
            }
            if !changed {
                return Ok(Some(recorded));
            }

            changing += 1;
            self.stats.changing_passes += 1;
            if changing > limit {
                if self.checked {
                    return Err(Error::IterationLimit {
                        analysis: "safe-point tracker",
                        limit,
                    });
                }
                log::warn!("safe-point tracker exceeded {limit} changing passes");
                return Ok(Some(recorded));
            }
        }
    }

    /// Merges the exit sets of the visited predecessors of `node`.
    fn entry_state(
        &mut self,
        node: NodeId,
        liveness: &Liveness,
        exits: &HashMap<NodeId, FactMap>,
    ) -> Result<Option<FactMap>> {
        let incoming: Vec<(usize, EdgeId, NodeId)> = self
            .cfg
            .node(node)
            .preds()
            .iter()
            .enumerate()
            .filter_map(|(index, &edge)| {
                let source = self.cfg.edge(edge).source();
                exits.contains_key(&source).then_some((index, edge, source))
            })
            .collect();

        let mut state = FactMap::new();
        if incoming.is_empty() {
            return Ok(Some(state));
        }
        let live_in = |operand: OperandId| liveness.is_live_at_entry(node, operand);

        let phis = self.cfg.phis(node);
        let phi_dsts: BTreeSet<OperandId> = phis
            .iter()
            .filter_map(|&phi| self.cfg.inst(phi).dst())
            .collect();

        let mut pointers = BTreeSet::new();
        for (_, _, source) in &incoming {
            pointers.extend(
                exits[source]
                    .keys()
                    .copied()
                    .filter(|&p| live_in(p) && !phi_dsts.contains(&p)),
            );
        }
        for pointer in pointers {
            let inputs: Option<Vec<(EdgeId, NodeId, Fact)>> = incoming
                .iter()
                .map(|&(_, edge, source)| {
                    exits[&source]
                        .get(&pointer)
                        .map(|&fact| (edge, source, fact))
                })
                .collect();
            let Some(inputs) = inputs else {
                continue;
            };
            match self.merge(node, pointer, &inputs)? {
                Merge::Keep(fact) => {
                    state.insert(pointer, fact);
                }
                Merge::Drop => {}
                Merge::Restart => return Ok(None),
            }
        }

        for phi in phis {
            let Some(dst) = self.cfg.inst(phi).dst() else {
                continue;
            };
            if self.cfg.operand(dst).ty() != SemType::ManagedPtr || !live_in(dst) {
                continue;
            }
            let inputs: Option<Vec<(EdgeId, NodeId, Fact)>> = incoming
                .iter()
                .map(|&(index, edge, source)| {
                    let value = self.cfg.phi_source(phi, index)?;
                    self.origin(&exits[&source], value)
                        .map(|fact| (edge, source, fact))
                })
                .collect();
            let Some(inputs) = inputs else {
                continue;
            };
            match self.merge(node, dst, &inputs)? {
                Merge::Keep(fact) => {
                    state.insert(dst, fact);
                }
                Merge::Drop => {}
                Merge::Restart => return Ok(None),
            }
        }
        Ok(Some(state))
    }

    fn merge(
        &mut self,
        node: NodeId,
        pointer: OperandId,
        inputs: &[(EdgeId, NodeId, Fact)],
    ) -> Result<Merge> {
        let Some(&(_, _, (first_base, first_offset))) = inputs.first() else {
            return Ok(Merge::Drop);
        };
        let offset = if inputs.iter().all(|(_, _, (_, off))| *off == first_offset) {
            first_offset
        } else {
            Offset::Unknown
        };

        if inputs.iter().all(|(_, _, (base, _))| *base == first_base) {
            return Ok(self.admit(first_base, offset));
        }
        if self.mode == TrackerMode::OffsetsOnly
            || inputs
                .iter()
                .any(|(_, _, (base, _))| *base == FactBase::Static)
        {
            return Ok(Merge::Drop);
        }

        let var = match self.resolutions.get(&(node, pointer)) {
            Some(&var) => var,
            None => self.synthesize(node, pointer),
        };
        let mut assigned = false;
        for &(edge, source, (base, _)) in inputs {
            let FactBase::Object(object) = base else {
                return Err(contract_violation!(
                    "static base survived the merge into {}",
                    node
                ));
            };
            if object != var && self.assigned.insert((edge, var)) {
                let store = self.cfg.new_inst(
                    Opcode::StVar,
                    vec![Slot::def_of(var), Slot::use_of(object)],
                    InstFlags::empty(),
                );
                self.cfg.insert_before_control(source, store);
                assigned = true;
            }
        }
        if assigned {
            return Ok(Merge::Restart);
        }
        Ok(Merge::Keep((FactBase::Object(var), offset)))
    }

    fn synthesize(&mut self, node: NodeId, pointer: OperandId) -> OperandId {
        let var = self.cfg.new_variable(SemType::Object);
        self.resolutions.insert((node, pointer), var);
        self.synthetic.insert(var);
        self.stats.synthetic_bases += 1;
        log::trace!("synthetic base {var} for {pointer} at {node}");
        if let Some((events, method)) = self.events {
            events
                .record(EventKind::BaseSynthesized)
                .at(method, node.index())
                .message(format!("base {var} for {pointer}"));
        }
        var
    }

    /// Applies the mode's policy to a derived fact.
    fn admit(&self, base: FactBase, offset: Offset) -> Merge {
        if self.mode == TrackerMode::OffsetsOnly && offset == Offset::Unknown {
            Merge::Drop
        } else {
            Merge::Keep((base, offset))
        }
    }

    /// The fact a value carries when used as a pointer source: objects are
    /// their own base.
    fn origin(&self, facts: &FactMap, value: OperandId) -> Option<Fact> {
        if self.cfg.operand(value).ty() == SemType::Object {
            Some((FactBase::Object(value), Offset::Known(0)))
        } else {
            facts.get(&value).copied()
        }
    }

    fn constant(&self, value: OperandId) -> Option<i64> {
        let def = self.cfg.operand(value).def()?;
        match self.cfg.inst(def).opcode() {
            Opcode::Const(c) => Some(c),
            _ => None,
        }
    }

    fn replay_node(
        &self,
        node: NodeId,
        liveness: &Liveness,
        state: &mut FactMap,
        recorded: &mut BTreeMap<InstId, Vec<PointerFact>>,
    ) {
        let body: Vec<InstId> = self
            .cfg
            .insts_of(node)
            .filter(|&i| !self.cfg.inst(i).is_label() && !self.cfg.inst(i).is_phi())
            .collect();
        let live_after = self.live_after_safe_points(node, liveness, &body);

        for inst in body {
            if let Some(live) = live_after.get(&inst) {
                let dst = self.cfg.inst(inst).dst();
                let facts = state
                    .iter()
                    .filter(|(p, _)| live.contains(p.index()) && Some(**p) != dst)
                    .map(|(&pointer, &(base, offset))| PointerFact {
                        pointer,
                        base,
                        offset,
                    })
                    .collect();
                recorded.insert(inst, facts);
            }
            self.replay(inst, state);
        }
    }

    /// Operands live right after each safe point of `node`.
    fn live_after_safe_points(
        &self,
        node: NodeId,
        liveness: &Liveness,
        body: &[InstId],
    ) -> HashMap<InstId, BitSet> {
        let mut result = HashMap::new();
        if !body.iter().any(|&i| self.cfg.inst(i).is_safe_point()) {
            return result;
        }
        let Some(exit) = liveness.live_at_exit(node) else {
            return result;
        };
        let mut live = exit.clone();
        for &inst in body.iter().rev() {
            if self.cfg.inst(inst).is_safe_point() {
                result.insert(inst, live.clone());
            }
            liveness.update_liveness(self.cfg, inst, &mut live);
        }
        result
    }

    fn replay(&self, id: InstId, state: &mut FactMap) {
        let inst = self.cfg.inst(id);
        let Some(dst) = inst.dst() else {
            return;
        };

        match self.cfg.operand(dst).ty() {
            SemType::ManagedPtr => {
                let derived = match inst.opcode() {
                    Opcode::Copy | Opcode::LdVar | Opcode::StVar => {
                        inst.src(0).and_then(|src| self.origin(state, src))
                    }
                    Opcode::Add | Opcode::Sub => {
                        self.arithmetic(inst.opcode(), inst.src(0), inst.src(1), state)
                    }
                    Opcode::Lea { scale, disp } => inst.src(0).and_then(|base| {
                        let (b, off) = self.origin(state, base)?;
                        let off = match inst.src(1) {
                            None => off.adjust(disp),
                            Some(index) => match self.constant(index) {
                                Some(c) => off.adjust(disp.wrapping_add(c.wrapping_mul(scale))),
                                None => Offset::Unknown,
                            },
                        };
                        Some((b, off))
                    }),
                    Opcode::LdStaticAddr(_) => Some((FactBase::Static, Offset::Known(0))),
                    _ => None,
                };
                let admitted = derived.filter(|&(_, off)| {
                    self.mode == TrackerMode::Full || off != Offset::Unknown
                });
                match admitted {
                    Some(fact) => {
                        state.insert(dst, fact);
                    }
                    None => {
                        state.remove(&dst);
                    }
                }
            }
            SemType::Object if !self.synthetic.contains(&dst) => {
                let killed = FactBase::Object(dst);
                state.retain(|_, &mut (base, off)| base != killed || off != Offset::Unknown);
            }
            _ => {}
        }
    }

    fn arithmetic(
        &self,
        opcode: Opcode,
        lhs: Option<OperandId>,
        rhs: Option<OperandId>,
        state: &FactMap,
    ) -> Option<Fact> {
        let (lhs, rhs) = (lhs?, rhs?);
        let (pointer, delta, negate) = match self.origin(state, lhs) {
            Some(fact) => (fact, rhs, opcode == Opcode::Sub),
            None if opcode == Opcode::Add => (self.origin(state, rhs)?, lhs, false),
            None => return None,
        };
        let (base, off) = pointer;
        let off = match self.constant(delta) {
            Some(c) if negate => off.adjust(c.wrapping_neg()),
            Some(c) => off.adjust(c),
            None => Offset::Unknown,
        };
        Some((base, off))
    }
}

/// Pass wrapper around [`SafePointTracker`].
pub struct SafePointPass {
    mode: TrackerMode,
}

impl Default for SafePointPass {
    fn default() -> Self {
        Self::new()
    }
}

impl SafePointPass {
    /// Creates a tracker pass in [`TrackerMode::Full`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            mode: TrackerMode::Full,
        }
    }

    /// Sets the tracker mode.
    #[must_use]
    pub fn with_mode(mut self, mode: TrackerMode) -> Self {
        self.mode = mode;
        self
    }
}

impl OptPass for SafePointPass {
    fn name(&self) -> &'static str {
        "safe-point-tracker"
    }

    fn description(&self) -> &'static str {
        "Records the base and offset of every interior pointer live at a safe point"
    }

    fn run(&self, cfg: &mut ControlFlowGraph, ctx: &CompilationContext<'_>) -> Result<bool> {
        let stats = SafePointTracker::new(cfg, self.mode)
            .with_checked(ctx.flags.checked)
            .with_events(ctx.events, ctx.method)
            .run()?;
        if stats.safe_points > 0 {
            log::debug!(
                "{}: {} safe points in {} passes, {} synthetic bases",
                ctx.method,
                stats.safe_points,
                stats.passes,
                stats.synthetic_bases
            );
        }
        Ok(stats.safe_points > 0)
    }
}
