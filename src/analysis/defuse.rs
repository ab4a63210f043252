//! Def-Use Index for SSA operands.
//!
//! [`DefUseIndex`] maps every defining instruction to the `(user, slot)` pairs
//! that read one of its SSA results. It is built once by scanning the graph
//! and is never rebuilt afterwards: passes keep it in sync by routing operand
//! edits through the editing helpers here (or by calling [`DefUseIndex::add`]
//! and [`DefUseIndex::remove`] themselves right after each edit).
//!
//! Plain variables are not indexed; they are mutable storage without a unique
//! definition.
//!
//! # Basic Usage
//!
//! ```rust
//! use midend::analysis::DefUseIndex;
//! use midend::ir::{CfgBuilder, SemType};
//!
//! let mut x = None;
//! let cfg = CfgBuilder::new().build_with(|f| {
//!     f.block(0, |b| {
//!         let v = b.arg(0, SemType::I32);
//!         let w = b.add(v, v);
//!         x = Some(v);
//!         b.ret(Some(w));
//!     });
//! });
//! let du = DefUseIndex::build(&cfg);
//! let def = cfg.operand(x.unwrap()).def().unwrap();
//! assert_eq!(du.links_of(def).len(), 2);
//! ```

use std::collections::{HashMap, HashSet};

use crate::{
    error::contract_violation,
    ir::{ControlFlowGraph, InstId, OperandId, Slot},
    utils::graph::{EdgeId, NodeId},
    Result,
};

/// One use of a definition: the reading instruction and the slot position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Link {
    /// The instruction reading the value.
    pub user: InstId,
    /// The slot of `user` holding the value.
    pub pos: usize,
}

/// Index from defining instructions to their uses.
///
/// No `(def, user, pos)` triple is ever stored twice.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefUseIndex {
    links: HashMap<InstId, HashSet<Link>>,
}

impl DefUseIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the index by scanning every placed instruction once.
    ///
    /// # Arguments
    ///
    /// * `cfg` - The graph to index
    ///
    /// # Returns
    ///
    /// An index holding one link per SSA use.
    #[must_use]
    pub fn build(cfg: &ControlFlowGraph) -> Self {
        let mut index = Self::new();
        for inst in cfg.instructions() {
            index.add_uses_of(cfg, inst);
        }
        index
    }

    /// Records that slot `pos` of `user` reads a value defined by `def`.
    ///
    /// Returns `false` if the link was already present.
    pub fn add(&mut self, def: InstId, user: InstId, pos: usize) -> bool {
        self.links.entry(def).or_default().insert(Link { user, pos })
    }

    /// Forgets one use. Returns `false` if the link was not present.
    pub fn remove(&mut self, def: InstId, user: InstId, pos: usize) -> bool {
        let Some(set) = self.links.get_mut(&def) else {
            return false;
        };
        let removed = set.remove(&Link { user, pos });
        if set.is_empty() {
            self.links.remove(&def);
        }
        removed
    }

    /// Returns the uses of the values defined by `def`, ordered by user and
    /// slot.
    #[must_use]
    pub fn links_of(&self, def: InstId) -> Vec<Link> {
        let mut links: Vec<Link> = self
            .links
            .get(&def)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        links.sort_unstable();
        links
    }

    /// Returns `true` if some instruction reads a value defined by `def`.
    #[must_use]
    pub fn has_uses(&self, def: InstId) -> bool {
        self.links.get(&def).is_some_and(|set| !set.is_empty())
    }

    /// Returns the number of stored links.
    #[must_use]
    pub fn link_count(&self) -> usize {
        self.links.values().map(HashSet::len).sum()
    }

    /// Returns the uses of one operand, ordered by user and slot.
    #[must_use]
    pub fn uses_of_operand(&self, cfg: &ControlFlowGraph, operand: OperandId) -> Vec<Link> {
        let Some(def) = cfg.operand(operand).def() else {
            return Vec::new();
        };
        self.links_of(def)
            .into_iter()
            .filter(|l| {
                cfg.inst(l.user)
                    .slots()
                    .get(l.pos)
                    .is_some_and(|s| s.operand == operand)
            })
            .collect()
    }

    fn def_of(cfg: &ControlFlowGraph, operand: OperandId) -> Option<InstId> {
        let operand = cfg.operand(operand);
        if operand.is_ssa() {
            operand.def()
        } else {
            None
        }
    }

    /// Registers every SSA use of `inst`.
    pub fn add_uses_of(&mut self, cfg: &ControlFlowGraph, inst: InstId) {
        for (pos, operand) in cfg.inst(inst).uses() {
            if let Some(def) = Self::def_of(cfg, operand) {
                self.add(def, inst, pos);
            }
        }
    }

    /// Forgets every SSA use of `inst`.
    pub fn remove_uses_of(&mut self, cfg: &ControlFlowGraph, inst: InstId) {
        for (pos, operand) in cfg.inst(inst).uses() {
            if let Some(def) = Self::def_of(cfg, operand) {
                self.remove(def, inst, pos);
            }
        }
    }

    /// Checks the index against a fresh scan of `cfg`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ContractViolation`](crate::Error::ContractViolation)
    /// describing the first definition whose links differ.
    pub fn verify_against(&self, cfg: &ControlFlowGraph) -> Result<()> {
        let fresh = Self::build(cfg);
        let mut defs: Vec<InstId> = self.links.keys().chain(fresh.links.keys()).copied().collect();
        defs.sort_unstable();
        defs.dedup();
        for def in defs {
            let ours = self.links_of(def);
            let expected = fresh.links_of(def);
            if ours != expected {
                return Err(contract_violation!(
                    "def-use links of {} are {:?} but the graph has {:?}",
                    def,
                    ours,
                    expected
                ));
            }
        }
        Ok(())
    }

    // ── Editing helpers ─────────────────────────────────────────────────

    /// Rewrites slot `pos` of `inst` to read `operand`.
    pub fn set_use(&mut self, cfg: &mut ControlFlowGraph, inst: InstId, pos: usize, operand: OperandId) {
        if let Some(slot) = cfg.inst(inst).slots().get(pos).copied() {
            if let Some(def) = Self::def_of(cfg, slot.operand) {
                self.remove(def, inst, pos);
            }
            cfg.set_slot(inst, pos, operand);
            if slot.role.is_use() {
                if let Some(def) = Self::def_of(cfg, operand) {
                    self.add(def, inst, pos);
                }
            }
        }
    }

    /// Rewrites every use of `old` to read `new` instead.
    ///
    /// Returns the number of rewritten slots.
    pub fn replace_all_uses(
        &mut self,
        cfg: &mut ControlFlowGraph,
        old: OperandId,
        new: OperandId,
    ) -> usize {
        if old == new {
            return 0;
        }
        let links = self.uses_of_operand(cfg, old);
        for link in &links {
            self.set_use(cfg, link.user, link.pos, new);
        }
        links.len()
    }

    /// Appends a read slot to `inst`, e.g. a new phi source.
    pub fn push_use(&mut self, cfg: &mut ControlFlowGraph, inst: InstId, operand: OperandId) {
        let pos = cfg.inst(inst).slots().len();
        cfg.push_slot(inst, Slot::use_of(operand));
        if let Some(def) = Self::def_of(cfg, operand) {
            self.add(def, inst, pos);
        }
    }

    /// Removes slot `pos` of `inst`, re-indexing the slots after it.
    pub fn remove_slot(&mut self, cfg: &mut ControlFlowGraph, inst: InstId, pos: usize) -> Option<Slot> {
        self.remove_uses_of(cfg, inst);
        let slot = cfg.remove_slot(inst, pos);
        self.add_uses_of(cfg, inst);
        slot
    }

    /// Unlinks an instruction for good and forgets its uses.
    ///
    /// Uses of the instruction's own results are left in place; callers
    /// remove dead instructions only.
    pub fn unlink(&mut self, cfg: &mut ControlFlowGraph, inst: InstId) {
        self.remove_uses_of(cfg, inst);
        cfg.unlink(inst);
    }

    fn with_phis_of<T>(
        &mut self,
        cfg: &mut ControlFlowGraph,
        node: NodeId,
        edit: impl FnOnce(&mut ControlFlowGraph) -> Result<T>,
    ) -> Result<T> {
        let phis = cfg.phis(node);
        for &phi in &phis {
            self.remove_uses_of(cfg, phi);
        }
        let result = edit(cfg);
        for &phi in &phis {
            if !cfg.inst(phi).is_removed() {
                self.add_uses_of(cfg, phi);
            }
        }
        result
    }

    /// Removes an edge and the phi sources it carried.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEdge`](crate::Error::InvalidEdge) if the edge
    /// was already removed.
    pub fn remove_edge(&mut self, cfg: &mut ControlFlowGraph, edge: EdgeId) -> Result<Vec<OperandId>> {
        let target = cfg.try_edge(edge)?.target();
        self.with_phis_of(cfg, target, |cfg| cfg.remove_edge(edge))
    }

    /// Moves an edge to a new target, returning the phi sources it carried at
    /// the old target in phi order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEdge`](crate::Error::InvalidEdge) or
    /// [`Error::InvalidNode`](crate::Error::InvalidNode) for dead ids.
    pub fn retarget_edge(
        &mut self,
        cfg: &mut ControlFlowGraph,
        edge: EdgeId,
        new_target: NodeId,
    ) -> Result<Vec<OperandId>> {
        let target = cfg.try_edge(edge)?.target();
        self.with_phis_of(cfg, target, |cfg| cfg.retarget_edge(edge, new_target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{CfgBuilder, SemType};

    fn join_graph() -> (ControlFlowGraph, Vec<OperandId>) {
        let mut ops = Vec::new();
        let cfg = CfgBuilder::new().build_with(|f| {
            f.block(0, |b| {
                let c = b.arg(0, SemType::I32);
                ops.push(c);
                b.branch(c, 1, 2);
            });
            f.block(1, |b| {
                ops.push(b.const_i32(1));
                b.jump(3);
            });
            f.block(2, |b| {
                ops.push(b.const_i32(2));
                b.jump(3);
            });
            f.block(3, |b| {
                let m = b.phi(SemType::I32, &[(1, ops[1]), (2, ops[2])]);
                let s = b.add(m, ops[0]);
                ops.extend([m, s]);
                b.ret(Some(s));
            });
        });
        (cfg, ops)
    }

    #[test]
    fn test_build_index() {
        let (cfg, ops) = join_graph();
        let du = DefUseIndex::build(&cfg);
        // c: branch + add; 1 and 2: phi; m: add; s: ret
        assert_eq!(du.link_count(), 6);
        let def_c = cfg.operand(ops[0]).def().unwrap();
        assert_eq!(du.links_of(def_c).len(), 2);
        assert!(du.verify_against(&cfg).is_ok());
    }

    #[test]
    fn test_add_remove_no_duplicates() {
        let mut du = DefUseIndex::new();
        let (d, u) = (InstId::new(1), InstId::new(2));
        assert!(du.add(d, u, 1));
        assert!(!du.add(d, u, 1));
        assert_eq!(du.links_of(d), vec![Link { user: u, pos: 1 }]);
        assert!(du.remove(d, u, 1));
        assert!(!du.remove(d, u, 1));
        assert!(du.links_of(d).is_empty());
        assert!(!du.has_uses(d));
    }

    #[test]
    fn test_replace_all_uses_keeps_links() {
        let (mut cfg, ops) = join_graph();
        let mut du = DefUseIndex::build(&cfg);
        let rewritten = du.replace_all_uses(&mut cfg, ops[3], ops[1]);
        assert_eq!(rewritten, 1);
        assert!(du.verify_against(&cfg).is_ok());
        let def_m = cfg.operand(ops[3]).def().unwrap();
        assert!(!du.has_uses(def_m));
    }

    #[test]
    fn test_remove_edge_reindexes_phi_links() {
        let (mut cfg, ops) = join_graph();
        let mut du = DefUseIndex::build(&cfg);
        let b1 = cfg.block_node(1).unwrap();
        let edge = cfg.node(b1).succs()[0];
        let taken = du.remove_edge(&mut cfg, edge).unwrap();
        assert_eq!(taken, vec![ops[1]]);
        assert!(du.verify_against(&cfg).is_ok());
        let def_two = cfg.operand(ops[2]).def().unwrap();
        let phi = cfg.operand(ops[3]).def().unwrap();
        assert_eq!(du.links_of(def_two), vec![Link { user: phi, pos: 1 }]);
    }

    #[test]
    fn test_verify_against_detects_drift() {
        let (mut cfg, ops) = join_graph();
        let du = DefUseIndex::build(&cfg);
        let s = cfg.operand(ops[4]).def().unwrap();
        cfg.set_slot(s, 2, ops[1]);
        assert!(du.verify_against(&cfg).is_err());
    }
}
