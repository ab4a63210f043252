//! Region duplication with SSA repair.
//!
//! [`duplicate_region`] copies a single-entry set of nodes and leaves the
//! graph in valid SSA form: the copy reads renamed values, the exits of the
//! copy feed the same external targets as the original, and every use outside
//! the region that can now be reached from both copies reads a value merged
//! from the two.
//!
//! The copy is created detached: nothing enters it yet. Callers move edges
//! into it with [`redirect_edge`], which carries the edge's phi sources from
//! the original to the copy.
//!
//! # Escaping uses
//!
//! A use outside the region of a value defined inside is repaired depending
//! on the value's storage class:
//!
//! - SSA variables get phis at the joins where the original and the copied
//!   version meet, found by a reaching-definition walk backwards from the use.
//! - Temporaries are promoted to a fresh plain variable: both definitions
//!   store to it and every escaping use loads from it.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::{
    analysis::{DefUseIndex, Link},
    error::contract_violation,
    ir::{ControlFlowGraph, EdgeKind, InstFlags, InstId, NodeKind, Opcode, OperandId, Slot},
    utils::graph::{EdgeId, NodeId},
    Result,
};

/// The result of [`duplicate_region`]: the new entry node plus maps from
/// original ids to the ids of their copies.
#[derive(Debug, Clone)]
pub struct RegionClone {
    entry: NodeId,
    nodes: BTreeMap<NodeId, NodeId>,
    edges: BTreeMap<EdgeId, EdgeId>,
    insts: BTreeMap<InstId, InstId>,
    operands: BTreeMap<OperandId, OperandId>,
}

impl RegionClone {
    /// Returns the copy of the region's entry node.
    #[must_use]
    pub fn entry(&self) -> NodeId {
        self.entry
    }

    /// Returns the copy of an original node.
    #[must_use]
    pub fn node(&self, original: NodeId) -> Option<NodeId> {
        self.nodes.get(&original).copied()
    }

    /// Returns the copy of an original edge. External exits map to the new
    /// edge leaving the copy.
    #[must_use]
    pub fn edge(&self, original: EdgeId) -> Option<EdgeId> {
        self.edges.get(&original).copied()
    }

    /// Returns the copy of an original instruction.
    #[must_use]
    pub fn inst(&self, original: InstId) -> Option<InstId> {
        self.insts.get(&original).copied()
    }

    /// Returns the renamed version of an operand defined in the region.
    #[must_use]
    pub fn operand(&self, original: OperandId) -> Option<OperandId> {
        self.operands.get(&original).copied()
    }

    /// Returns `(original, copy)` node pairs in original id order.
    pub fn node_pairs(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.nodes.iter().map(|(&o, &c)| (o, c))
    }

    /// Returns the number of copied nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// Duplicates the region `nodes` entered only through `entry`.
///
/// # Arguments
///
/// * `cfg` - The graph to mutate
/// * `du` - Def-use index of `cfg`, kept in sync
/// * `entry` - The region's single entry node
/// * `nodes` - Every node of the region, `entry` included
/// * `split_frequency` - Execution count to move from the original to the
///   copy; the copy's entry receives exactly this count
///
/// # Returns
///
/// The id maps of the copy. The copy has no incoming edges from outside.
///
/// # Errors
///
/// Returns [`Error::ContractViolation`](crate::Error::ContractViolation) if
/// `entry` is not in `nodes`, a node other than `entry` has a predecessor
/// outside the region, a node is not an ordinary block or dispatch node, or
/// a throwing instruction is not last in its node.
pub fn duplicate_region(
    cfg: &mut ControlFlowGraph,
    du: &mut DefUseIndex,
    entry: NodeId,
    nodes: &[NodeId],
    split_frequency: Option<f64>,
) -> Result<RegionClone> {
    let region: BTreeSet<NodeId> = nodes.iter().copied().collect();
    validate(cfg, entry, &region)?;
    let order = walk_order(cfg, entry, &region);

    let mut duplicator = RegionDuplicator {
        cfg,
        du,
        region,
        copies: HashSet::new(),
        clone: RegionClone {
            entry,
            nodes: BTreeMap::new(),
            edges: BTreeMap::new(),
            insts: BTreeMap::new(),
            operands: BTreeMap::new(),
        },
        edge_origins: HashMap::new(),
    };
    duplicator.allocate_names(&order);
    duplicator.copy_nodes(&order);
    duplicator.copy_edges(&order)?;
    duplicator.fill_phis()?;
    if let Some(frequency) = split_frequency {
        duplicator.split_frequency(entry, frequency);
    }
    duplicator.repair_escaping_uses()?;

    let clone = duplicator.clone;
    log::trace!(
        "duplicated {} nodes from {} into {}",
        clone.node_count(),
        entry,
        clone.entry
    );
    Ok(clone)
}

/// Moves the target of `edge` to `new_target`, a node with the same phis as
/// the old target (a node and its copy, in either direction).
///
/// The phi sources the edge carried are removed from the old target and
/// appended to the corresponding phis of the new one.
///
/// # Errors
///
/// Returns [`Error::ContractViolation`](crate::Error::ContractViolation) if
/// the two targets have a different number of phis, and a lookup error for
/// removed ids.
pub fn redirect_edge(
    cfg: &mut ControlFlowGraph,
    du: &mut DefUseIndex,
    edge: EdgeId,
    new_target: NodeId,
) -> Result<()> {
    let old_target = cfg.try_edge(edge)?.target();
    cfg.try_node(new_target)?;
    let old_phis = cfg.phis(old_target).len();
    let new_phis = cfg.phis(new_target);
    if old_phis != new_phis.len() {
        return Err(contract_violation!(
            "cannot move {} from {} with {} phis to {} with {}",
            edge,
            old_target,
            old_phis,
            new_target,
            new_phis.len()
        ));
    }
    let carried = du.retarget_edge(cfg, edge, new_target)?;
    for (phi, value) in new_phis.into_iter().zip(carried) {
        du.push_use(cfg, phi, value);
    }
    Ok(())
}

fn validate(cfg: &ControlFlowGraph, entry: NodeId, region: &BTreeSet<NodeId>) -> Result<()> {
    if !region.contains(&entry) {
        return Err(contract_violation!(
            "region entry {} is not part of the region",
            entry
        ));
    }
    for &node in region {
        let n = cfg.try_node(node)?;
        if !matches!(n.kind(), NodeKind::Block | NodeKind::Dispatch) {
            return Err(contract_violation!("{:?} node {} cannot be duplicated", n.kind(), node));
        }
        if node != entry {
            let outside = n
                .preds()
                .iter()
                .find(|&&e| !region.contains(&cfg.edge(e).source()));
            if let Some(&edge) = outside {
                return Err(contract_violation!(
                    "{} enters the region at {} instead of {}",
                    edge,
                    node,
                    entry
                ));
            }
        }
        for inst in cfg.insts_of(node) {
            let i = cfg.inst(inst);
            if i.can_throw() && i.next().is_some() {
                return Err(contract_violation!("throwing {} is not last in {}", inst, node));
            }
        }
    }
    Ok(())
}

/// Depth-first order from `entry`, then the rest of the region in id order.
fn walk_order(cfg: &ControlFlowGraph, entry: NodeId, region: &BTreeSet<NodeId>) -> Vec<NodeId> {
    let mut order = Vec::with_capacity(region.len());
    let mut seen = HashSet::new();
    let mut stack = vec![entry];
    while let Some(node) = stack.pop() {
        if !seen.insert(node) {
            continue;
        }
        order.push(node);
        for &edge in cfg.node(node).succs().iter().rev() {
            let target = cfg.edge(edge).target();
            if region.contains(&target) && !seen.contains(&target) {
                stack.push(target);
            }
        }
    }
    order.extend(region.iter().copied().filter(|n| !seen.contains(n)));
    order
}

struct RegionDuplicator<'a> {
    cfg: &'a mut ControlFlowGraph,
    du: &'a mut DefUseIndex,
    region: BTreeSet<NodeId>,
    copies: HashSet<NodeId>,
    clone: RegionClone,
    edge_origins: HashMap<EdgeId, EdgeId>,
}

impl RegionDuplicator<'_> {
    fn rename(&self, operand: OperandId) -> OperandId {
        self.clone.operand(operand).unwrap_or(operand)
    }

    fn allocate_names(&mut self, order: &[NodeId]) {
        let cfg = &*self.cfg;
        let defined: Vec<OperandId> = order
            .iter()
            .flat_map(|&n| cfg.insts_of(n))
            .flat_map(|i| cfg.inst(i).slots())
            .filter(|s| s.role.is_def() && cfg.operand(s.operand).is_ssa())
            .map(|s| s.operand)
            .collect();
        for operand in defined {
            let renamed = self.cfg.clone_operand(operand);
            self.clone.operands.insert(operand, renamed);
        }
    }

    fn copy_nodes(&mut self, order: &[NodeId]) {
        for &node in order {
            let (kind, count) = {
                let n = self.cfg.node(node);
                (n.kind(), n.exec_count())
            };
            let copy = self.cfg.new_node(kind);
            self.cfg.set_exec_count(copy, count);
            self.clone.nodes.insert(node, copy);
            self.copies.insert(copy);
            if node == self.clone.entry {
                self.clone.entry = copy;
            }

            let insts: Vec<InstId> = self.cfg.insts_of(node).skip(1).collect();
            for inst in insts {
                let (opcode, flags, slots) = {
                    let i = self.cfg.inst(inst);
                    (i.opcode(), i.flags(), i.slots().to_vec())
                };
                // Phi sources follow the copy's edges and are filled later.
                let keep = if opcode == Opcode::Phi { 1 } else { slots.len() };
                let slots: Vec<Slot> = slots
                    .into_iter()
                    .take(keep)
                    .map(|s| Slot {
                        operand: self.rename(s.operand),
                        role: s.role,
                    })
                    .collect();
                let copied = self.cfg.new_inst(opcode, slots, flags);
                self.cfg.append(copy, copied);
                self.du.add_uses_of(self.cfg, copied);
                self.clone.insts.insert(inst, copied);
            }
        }
    }

    fn copy_edges(&mut self, order: &[NodeId]) -> Result<()> {
        for &node in order {
            let source = self.clone.nodes[&node];
            let succs = self.cfg.node(node).succs().to_vec();
            for edge in succs {
                let (target, kind, prob) = {
                    let e = self.cfg.edge(edge);
                    (e.target(), e.kind(), e.prob())
                };
                let copied = if let Some(copy) = self.clone.node(target) {
                    self.cfg.add_edge(source, copy, kind, prob)
                } else {
                    let index = self
                        .cfg
                        .pred_index(edge)
                        .ok_or(crate::Error::InvalidEdge(edge))?;
                    let phis = self.cfg.phis(target);
                    let carried: Vec<Option<OperandId>> = phis
                        .iter()
                        .map(|&phi| self.cfg.phi_source(phi, index))
                        .collect();
                    let copied = self.cfg.add_edge(source, target, kind, prob);
                    for (phi, value) in phis.into_iter().zip(carried) {
                        if let Some(value) = value {
                            let value = self.rename(value);
                            self.du.push_use(self.cfg, phi, value);
                        }
                    }
                    copied
                };
                self.clone.edges.insert(edge, copied);
                self.edge_origins.insert(copied, edge);
            }
        }
        Ok(())
    }

    fn fill_phis(&mut self) -> Result<()> {
        let pairs: Vec<(NodeId, NodeId)> = self.clone.node_pairs().collect();
        for (original, copy) in pairs {
            let original_phis = self.cfg.phis(original);
            if original_phis.is_empty() {
                continue;
            }
            let copy_phis = self.cfg.phis(copy);
            let preds = self.cfg.node(copy).preds().to_vec();
            for pred in preds {
                let origin = self.edge_origins[&pred];
                let index = self
                    .cfg
                    .pred_index(origin)
                    .ok_or(crate::Error::InvalidEdge(origin))?;
                for (&from, &to) in original_phis.iter().zip(&copy_phis) {
                    if let Some(value) = self.cfg.phi_source(from, index) {
                        let value = self.rename(value);
                        self.du.push_use(self.cfg, to, value);
                    }
                }
            }
        }
        Ok(())
    }

    fn split_frequency(&mut self, entry: NodeId, frequency: f64) {
        let total = self.cfg.node(entry).exec_count();
        let ratio = if total > 0.0 {
            (frequency / total).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let pairs: Vec<(NodeId, NodeId)> = self.clone.node_pairs().collect();
        for (original, copy) in pairs {
            let count = self.cfg.node(original).exec_count();
            if original == entry {
                self.cfg.set_exec_count(copy, frequency);
                self.cfg.set_exec_count(original, (count - frequency).max(0.0));
            } else {
                self.cfg.set_exec_count(copy, count * ratio);
                self.cfg.set_exec_count(original, count * (1.0 - ratio));
            }
        }
    }

    // ── Escaping uses ───────────────────────────────────────────────────

    fn repair_escaping_uses(&mut self) -> Result<()> {
        let renamed: Vec<(OperandId, OperandId)> =
            self.clone.operands.iter().map(|(&o, &c)| (o, c)).collect();
        for (original, copy) in renamed {
            let uses = self.escaping_uses(original);
            if uses.is_empty() {
                continue;
            }
            if self.cfg.operand(original).is_temp() {
                self.promote_temp(original, copy, &uses)?;
            } else {
                self.merge_versions(original, copy, &uses)?;
            }
        }
        Ok(())
    }

    /// Uses outside both copies that a path from the copy can reach.
    fn escaping_uses(&self, operand: OperandId) -> Vec<Link> {
        let cfg = &*self.cfg;
        self.du
            .uses_of_operand(cfg, operand)
            .into_iter()
            .filter(|link| {
                let user = cfg.inst(link.user);
                let Some(node) = user.node() else {
                    return false;
                };
                if self.region.contains(&node) || self.copies.contains(&node) {
                    return false;
                }
                if !user.is_phi() {
                    return true;
                }
                // A phi source flowing straight out of the original region
                // already names the right version.
                cfg.node(node)
                    .preds()
                    .get(link.pos - 1)
                    .is_some_and(|&e| !self.region.contains(&cfg.edge(e).source()))
            })
            .collect()
    }

    fn pred_source(&self, user: InstId, pos: usize) -> Result<(EdgeId, NodeId)> {
        let node = self.cfg.try_inst(user)?.node().ok_or(crate::Error::InvalidInstruction(user))?;
        let edge = self
            .cfg
            .node(node)
            .preds()
            .get(pos - 1)
            .copied()
            .ok_or_else(|| contract_violation!("phi {} has no incoming edge {}", user, pos - 1))?;
        Ok((edge, self.cfg.edge(edge).source()))
    }

    fn merge_versions(&mut self, original: OperandId, copy: OperandId, uses: &[Link]) -> Result<()> {
        let mut walk = ReachingWalk {
            original,
            copy,
            at_entry: HashMap::new(),
            visiting: HashSet::new(),
            replaced: HashMap::new(),
        };
        for link in uses {
            let (is_phi, node) = {
                let user = self.cfg.inst(link.user);
                (user.is_phi(), user.node())
            };
            let value = if is_phi {
                let (_, source) = self.pred_source(link.user, link.pos)?;
                self.value_at_exit(source, &mut walk)?
            } else {
                let node = node.ok_or(crate::Error::InvalidInstruction(link.user))?;
                self.value_at_entry(node, &mut walk)?
            };
            let value = walk.resolve(value);
            if value != original {
                self.du.set_use(self.cfg, link.user, link.pos, value);
            }
        }
        Ok(())
    }

    fn value_at_exit(&mut self, node: NodeId, walk: &mut ReachingWalk) -> Result<OperandId> {
        if self.region.contains(&node) {
            Ok(walk.original)
        } else if self.copies.contains(&node) {
            Ok(walk.copy)
        } else {
            self.value_at_entry(node, walk)
        }
    }

    fn value_at_entry(&mut self, node: NodeId, walk: &mut ReachingWalk) -> Result<OperandId> {
        if let Some(&value) = walk.at_entry.get(&node) {
            return Ok(walk.resolve(value));
        }
        let preds: Vec<NodeId> = self
            .cfg
            .node(node)
            .preds()
            .iter()
            .map(|&e| self.cfg.edge(e).source())
            .collect();

        match preds.as_slice() {
            [] => Ok(walk.original),
            [pred] => {
                if !walk.visiting.insert(node) {
                    return Ok(walk.original);
                }
                let value = self.value_at_exit(*pred, walk)?;
                walk.visiting.remove(&node);
                walk.at_entry.insert(node, value);
                Ok(value)
            }
            _ => {
                let placeholder = self.cfg.clone_operand(walk.original);
                let phi = self.cfg.new_phi(node, placeholder, &[]);
                walk.at_entry.insert(node, placeholder);

                let mut sources = Vec::with_capacity(preds.len());
                for pred in preds {
                    sources.push(self.value_at_exit(pred, walk)?);
                }
                let sources: Vec<OperandId> = sources.into_iter().map(|s| walk.resolve(s)).collect();
                Ok(self.settle_phi(node, phi, placeholder, sources, walk))
            }
        }
    }

    /// Completes a placeholder phi, or drops it in favor of an equivalent
    /// value.
    fn settle_phi(
        &mut self,
        node: NodeId,
        phi: InstId,
        placeholder: OperandId,
        sources: Vec<OperandId>,
        walk: &mut ReachingWalk,
    ) -> OperandId {
        let mut others = sources.iter().copied().filter(|&s| s != placeholder);
        let trivial = match others.next() {
            Some(first) if others.all(|s| s == first) => Some(first),
            _ => None,
        };
        let existing = self.cfg.phis(node).into_iter().find(|&p| {
            p != phi
                && self.cfg.inst(p).phi_sources() == sources
                && self
                    .cfg
                    .inst(p)
                    .dst()
                    .is_some_and(|d| self.cfg.operand(d).ty() == self.cfg.operand(placeholder).ty())
        });

        match trivial.or_else(|| existing.and_then(|p| self.cfg.inst(p).dst())) {
            Some(value) => {
                self.du.replace_all_uses(self.cfg, placeholder, value);
                self.du.unlink(self.cfg, phi);
                walk.replaced.insert(placeholder, value);
                value
            }
            None => {
                for source in sources {
                    self.du.push_use(self.cfg, phi, source);
                }
                placeholder
            }
        }
    }

    fn promote_temp(&mut self, original: OperandId, copy: OperandId, uses: &[Link]) -> Result<()> {
        let ty = self.cfg.operand(original).ty();
        let var = self.cfg.new_variable(ty);
        self.store_after_def(original, var)?;
        self.store_after_def(copy, var)?;

        for link in uses {
            let loaded = self.cfg.new_temp(ty);
            let load = self.cfg.new_inst(
                Opcode::LdVar,
                vec![Slot::def_of(loaded), Slot::use_of(var)],
                InstFlags::empty(),
            );
            if self.cfg.inst(link.user).is_phi() {
                let (edge, source) = self.pred_source(link.user, link.pos)?;
                let block = if self.cfg.throwing_tail(source).is_some() {
                    self.cfg.split_edge(edge)?
                } else {
                    source
                };
                self.cfg.insert_before_control(block, load);
            } else {
                self.cfg.insert_before(link.user, load);
            }
            self.du.add_uses_of(self.cfg, load);
            self.du.set_use(self.cfg, link.user, link.pos, loaded);
        }
        log::trace!("promoted {} to {} across {} uses", original, var, uses.len());
        Ok(())
    }

    fn store_after_def(&mut self, value: OperandId, var: OperandId) -> Result<()> {
        let def = self
            .cfg
            .operand(value)
            .def()
            .ok_or_else(|| contract_violation!("{} has no definition", value))?;
        let (node, is_phi, throws) = {
            let i = self.cfg.try_inst(def)?;
            (
                i.node().ok_or(crate::Error::InvalidInstruction(def))?,
                i.is_phi(),
                i.can_throw(),
            )
        };
        let store = self.cfg.new_inst(
            Opcode::StVar,
            vec![Slot::def_of(var), Slot::use_of(value)],
            InstFlags::empty(),
        );
        if is_phi {
            self.cfg.insert_after_phis(node, store);
        } else if throws {
            // The value only exists on the normal path.
            let normal = self
                .cfg
                .node(node)
                .succs()
                .iter()
                .copied()
                .find(|&e| self.cfg.edge(e).kind() != EdgeKind::Dispatch)
                .ok_or_else(|| contract_violation!("throwing {} has no normal successor", def))?;
            let block = self.cfg.split_edge(normal)?;
            self.cfg.append(block, store);
        } else {
            self.cfg.insert_after(def, store);
        }
        self.du.add_uses_of(self.cfg, store);
        Ok(())
    }
}

/// State of one reaching-definition walk for an original/copy value pair.
struct ReachingWalk {
    original: OperandId,
    copy: OperandId,
    at_entry: HashMap<NodeId, OperandId>,
    visiting: HashSet<NodeId>,
    replaced: HashMap<OperandId, OperandId>,
}

impl ReachingWalk {
    fn resolve(&self, mut value: OperandId) -> OperandId {
        while let Some(&next) = self.replaced.get(&value) {
            value = next;
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{verify, CfgBuilder, SemType};

    #[test]
    fn test_rejects_side_entry() {
        let mut cfg = CfgBuilder::new().build_with(|f| {
            f.block(0, |b| {
                let c = b.arg(0, SemType::I32);
                b.branch(c, 1, 2);
            });
            f.block(1, |b| b.jump(2));
            f.block(2, |b| b.ret(None));
        });
        let b1 = cfg.block_node(1).unwrap();
        let b2 = cfg.block_node(2).unwrap();
        let mut du = DefUseIndex::build(&cfg);
        let result = duplicate_region(&mut cfg, &mut du, b1, &[b1, b2], None);
        assert!(matches!(result, Err(crate::Error::ContractViolation { .. })));
        let result = duplicate_region(&mut cfg, &mut du, b1, &[b2], None);
        assert!(matches!(result, Err(crate::Error::ContractViolation { .. })));
    }

    #[test]
    fn test_rejects_entry_node() {
        let mut cfg = CfgBuilder::new().build_with(|f| {
            f.block(0, |b| b.ret(None));
        });
        let entry = cfg.entry();
        let mut du = DefUseIndex::build(&cfg);
        let result = duplicate_region(&mut cfg, &mut du, entry, &[entry], None);
        assert!(result.is_err());
    }

    #[test]
    fn test_copy_is_isomorphic() {
        let mut cfg = CfgBuilder::new().build_with(|f| {
            f.block(0, |b| {
                let c = b.arg(0, SemType::I32);
                b.branch_weighted(c, 1, 3, 0.25);
            });
            f.block(1, |b| {
                let x = b.arg(1, SemType::I32);
                let y = b.add(x, x);
                b.branch_weighted(y, 2, 3, 0.75);
            });
            f.block(2, |b| b.jump(3));
            f.block(3, |b| b.ret(None));
        });
        let b1 = cfg.block_node(1).unwrap();
        let b2 = cfg.block_node(2).unwrap();
        let mut du = DefUseIndex::build(&cfg);
        let clone = duplicate_region(&mut cfg, &mut du, b1, &[b1, b2], None).unwrap();

        assert_eq!(clone.node_count(), 2);
        for (original, copy) in clone.node_pairs() {
            let ops = |n: NodeId| -> Vec<Opcode> {
                cfg.insts_of(n).map(|i| cfg.inst(i).opcode()).collect()
            };
            assert_eq!(ops(original), ops(copy));
            let succ_shape = |n: NodeId| -> Vec<(EdgeKind, u64)> {
                cfg.node(n)
                    .succs()
                    .iter()
                    .map(|&e| (cfg.edge(e).kind(), cfg.edge(e).prob().to_bits()))
                    .collect()
            };
            assert_eq!(succ_shape(original), succ_shape(copy));
        }
        let copy1 = clone.entry();
        assert!(cfg.node(copy1).preds().is_empty());
        // The copy's add reads the copied argument.
        let add = cfg.insts_of(copy1).nth(2).unwrap();
        let arg = cfg.insts_of(copy1).nth(1).unwrap();
        assert_eq!(cfg.inst(add).src(0), cfg.inst(arg).dst());
        du.verify_against(&cfg).unwrap();
    }

    #[test]
    fn test_exit_edges_extend_target_phis() {
        let mut cfg = CfgBuilder::new().build_with(|f| {
            f.block(0, |b| {
                let c = b.arg(0, SemType::I32);
                b.branch(c, 1, 2);
            });
            f.block(1, |b| {
                b.const_i32(7);
                b.jump(3);
            });
            f.block(2, |b| b.jump(3));
            f.block(3, |b| {
                let p = b.phi(SemType::I32, &[]);
                b.ret(Some(p));
            });
        });
        // Give the join a phi whose source along 1 -> 3 is the constant.
        let b1 = cfg.block_node(1).unwrap();
        let b3 = cfg.block_node(3).unwrap();
        let constant = cfg.inst(cfg.insts_of(b1).nth(1).unwrap()).dst().unwrap();
        let arg = cfg.inst(cfg.insts_of(cfg.entry()).nth(1).unwrap()).dst().unwrap();
        let phi = cfg.phis(b3)[0];
        cfg.push_slot(phi, Slot::use_of(constant));
        cfg.push_slot(phi, Slot::use_of(arg));
        verify(&cfg).unwrap();

        let mut du = DefUseIndex::build(&cfg);
        let clone = duplicate_region(&mut cfg, &mut du, b1, &[b1], Some(0.5)).unwrap();
        let copied_constant = clone.operand(constant).unwrap();
        assert_eq!(cfg.inst(phi).phi_sources(), vec![constant, arg, copied_constant]);
        assert_eq!(cfg.node(b3).preds().len(), 3);

        // Route the entry's true edge through the copy.
        let true_edge = cfg.succ_edge(cfg.entry(), EdgeKind::True).unwrap();
        redirect_edge(&mut cfg, &mut du, true_edge, clone.entry()).unwrap();
        assert_eq!(cfg.node(b1).preds().len(), 0);
        assert!((cfg.node(clone.entry()).exec_count() - 0.5).abs() < f64::EPSILON);
        du.verify_against(&cfg).unwrap();
    }

    #[test]
    fn test_escaping_temp_is_promoted() {
        let mut cfg = CfgBuilder::new().build_with(|f| {
            f.block(0, |b| {
                let c = b.arg(0, SemType::I32);
                b.branch(c, 1, 2);
            });
            f.block(1, |b| {
                b.arg(1, SemType::I32);
                b.jump(2);
            });
            f.block(2, |b| b.ret(None));
        });
        let b1 = cfg.block_node(1).unwrap();
        let b2 = cfg.block_node(2).unwrap();
        let x = cfg.inst(cfg.insts_of(b1).nth(1).unwrap()).dst().unwrap();
        // Make block 2 read x; dominance does not matter for the repair.
        let ret = cfg.node(b2).last().unwrap();
        cfg.push_slot(ret, Slot::use_of(x));

        let mut du = DefUseIndex::build(&cfg);
        let before = cfg.variables().count();
        let clone = duplicate_region(&mut cfg, &mut du, b1, &[b1], None).unwrap();
        assert_eq!(cfg.variables().count(), before + 1);

        let ret_src = cfg.inst(ret).src(0).unwrap();
        let load = cfg.operand(ret_src).def().unwrap();
        assert_eq!(cfg.inst(load).opcode(), Opcode::LdVar);
        assert_eq!(cfg.inst(load).node(), Some(b2));

        let stores = |n: NodeId| {
            cfg.insts_of(n)
                .filter(|&i| cfg.inst(i).opcode() == Opcode::StVar)
                .count()
        };
        assert_eq!(stores(b1), 1);
        assert_eq!(stores(clone.entry()), 1);
        du.verify_against(&cfg).unwrap();
    }

    #[test]
    fn test_escaping_ssa_var_gets_join_phi() {
        let mut cfg = CfgBuilder::new().build_with(|f| {
            let var = f.variable(SemType::I32);
            let v1 = f.ssa_var(var);
            f.block(0, |b| {
                let c = b.arg(0, SemType::I32);
                b.branch(c, 1, 2);
            });
            f.block(2, |b| b.jump(1));
            f.block(1, |b| {
                b.define(Opcode::Arg(1), v1, &[]);
                b.jump(3);
            });
            f.block(3, |b| b.ret(Some(v1)));
        });
        let b1 = cfg.block_node(1).unwrap();
        let b2 = cfg.block_node(2).unwrap();
        let b3 = cfg.block_node(3).unwrap();
        let v1 = cfg.inst(cfg.insts_of(b1).nth(1).unwrap()).dst().unwrap();
        let mut du = DefUseIndex::build(&cfg);

        // Copy block 1 and send the path through block 2 into the copy.
        let clone = duplicate_region(&mut cfg, &mut du, b1, &[b1], None).unwrap();
        let edge = cfg.node(b2).succs()[0];
        redirect_edge(&mut cfg, &mut du, edge, clone.entry()).unwrap();

        let ret = cfg.node(b3).last().unwrap();
        let merged = cfg.inst(ret).src(0).unwrap();
        let phi = cfg.operand(merged).def().unwrap();
        assert!(cfg.inst(phi).is_phi());
        assert_eq!(cfg.inst(phi).node(), Some(b3));
        let copy = clone.operand(v1).unwrap();
        assert_eq!(cfg.inst(phi).phi_sources(), vec![v1, copy]);
        assert_eq!(
            cfg.operand(merged).backing_var(),
            cfg.operand(v1).backing_var()
        );
        verify(&cfg).unwrap();
        du.verify_against(&cfg).unwrap();
    }

    #[test]
    fn test_redirect_requires_matching_phis() {
        let mut cfg = CfgBuilder::new().build_with(|f| {
            f.block(0, |b| {
                let c = b.arg(0, SemType::I32);
                b.branch(c, 1, 2);
            });
            f.block(1, |b| b.jump(2));
            f.block(2, |b| b.ret(None));
        });
        let b1 = cfg.block_node(1).unwrap();
        let c = cfg.inst(cfg.insts_of(cfg.entry()).nth(1).unwrap()).dst().unwrap();
        let t = cfg.new_temp(SemType::I32);
        cfg.new_phi(b1, t, &[c]);

        let edge = cfg.succ_edge(cfg.entry(), EdgeKind::False).unwrap();
        let mut du = DefUseIndex::build(&cfg);
        let result = redirect_edge(&mut cfg, &mut du, edge, b1);
        assert!(matches!(result, Err(crate::Error::ContractViolation { .. })));
    }
}
