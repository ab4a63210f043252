//! Structural invariant checks for control flow graphs.
//!
//! The checks here are what checked builds run before every pass. They never
//! panic; the first violation found is reported as
//! [`Error::ContractViolation`](crate::Error::ContractViolation).

use std::collections::HashSet;

use crate::{
    error::contract_violation,
    ir::{ControlFlowGraph, InstId},
    Result,
};

/// Checks that every phi has one source per incoming edge.
///
/// # Errors
///
/// Returns [`Error::ContractViolation`](crate::Error::ContractViolation)
/// naming the first phi whose arity does not match.
pub fn verify_phi_arity(cfg: &ControlFlowGraph) -> Result<()> {
    for node in cfg.nodes() {
        let in_degree = cfg.node(node).preds().len();
        for phi in cfg.phis(node) {
            let arity = cfg.inst(phi).phi_sources().len();
            if arity != in_degree {
                return Err(contract_violation!(
                    "phi {} in {} has {} sources but {} incoming edges",
                    phi,
                    node,
                    arity,
                    in_degree
                ));
            }
        }
    }
    Ok(())
}

/// Checks every structural invariant of the graph.
///
/// - the first instruction of each node is its only label, and phis follow it
/// - instruction links agree with node membership
/// - edges are registered at both endpoints
/// - a throwing instruction is last and its node has a dispatch edge
/// - phi arity matches in-degree
/// - every SSA operand has exactly one placed definition, which its
///   back-reference names
///
/// # Errors
///
/// Returns [`Error::ContractViolation`](crate::Error::ContractViolation) for
/// the first violation found.
pub fn verify(cfg: &ControlFlowGraph) -> Result<()> {
    let mut defined = HashSet::new();

    for node in cfg.nodes() {
        let n = cfg.node(node);
        let insts: Vec<InstId> = cfg.insts_of(node).collect();

        match insts.first() {
            Some(&first) if cfg.inst(first).is_label() => {}
            _ => return Err(contract_violation!("{} does not start with a label", node)),
        }
        if n.last() != insts.last().copied() {
            return Err(contract_violation!("{} has a stale last instruction", node));
        }

        let mut in_phis = true;
        for (position, &id) in insts.iter().enumerate().skip(1) {
            let inst = cfg.inst(id);
            if inst.node() != Some(node) || inst.is_removed() {
                return Err(contract_violation!("{} is linked into {} but not placed there", id, node));
            }
            if inst.is_label() {
                return Err(contract_violation!("{} has a second label {}", node, id));
            }
            if inst.is_phi() && !in_phis {
                return Err(contract_violation!("phi {} in {} follows a non-phi", id, node));
            }
            in_phis &= inst.is_phi();

            if inst.can_throw() {
                if position + 1 != insts.len() {
                    return Err(contract_violation!("throwing {} is not last in {}", id, node));
                }
                if cfg.dispatch_edge(node).is_none() {
                    return Err(contract_violation!(
                        "{} ends in throwing {} but has no dispatch edge",
                        node,
                        id
                    ));
                }
            }

            for slot in inst.slots() {
                if slot.operand.index() >= cfg.operand_count() {
                    return Err(contract_violation!("{} refers to unknown {}", id, slot.operand));
                }
                let operand = cfg.operand(slot.operand);
                if !operand.is_ssa() {
                    continue;
                }
                if slot.role.is_def() {
                    if operand.def() != Some(id) {
                        return Err(contract_violation!(
                            "{} defines {} but the operand names {:?}",
                            id,
                            slot.operand,
                            operand.def()
                        ));
                    }
                    if !defined.insert(slot.operand) {
                        return Err(contract_violation!("{} is defined twice", slot.operand));
                    }
                }
                if slot.role.is_use() {
                    let def = operand.def().filter(|&d| cfg.try_inst(d).is_ok());
                    if def.is_none() {
                        return Err(contract_violation!(
                            "{} uses {} which has no placed definition",
                            id,
                            slot.operand
                        ));
                    }
                }
            }
        }

        for &edge in n.succs() {
            let e = cfg.try_edge(edge)?;
            if e.source() != node || !cfg.node(e.target()).preds().contains(&edge) {
                return Err(contract_violation!("{} is not registered at both ends", edge));
            }
        }
    }

    verify_phi_arity(cfg)
}
