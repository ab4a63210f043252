//! Block merging and empty block bypassing.
//!
//! Both rewrites keep the def-use index in sync. They run as the last phase
//! of dead code elimination, once the sweep has emptied blocks out.

use crate::{
    analysis::DefUseIndex,
    ir::{ControlFlowGraph, EdgeKind, NodeKind, OperandId},
    utils::graph::NodeId,
    Result,
};

/// Returns the single successor of `node` that only `node` reaches, if
/// the two can be merged.
fn merge_partner(cfg: &ControlFlowGraph, node: NodeId) -> Option<NodeId> {
    let n = cfg.node(node);
    if !n.is_block() {
        return None;
    }
    let [edge] = n.succs() else {
        return None;
    };
    let e = cfg.edge(*edge);
    let target = e.target();
    let t = cfg.node(target);
    let mergeable = e.kind() == EdgeKind::Unconditional
        && target != node
        && t.kind() == NodeKind::Block
        && t.preds().len() == 1;
    mergeable.then_some(target)
}

/// Merges every block into its predecessor where the predecessor has one
/// unconditional successor and the block has no other predecessor.
///
/// Phis of a merged block have a single source and are replaced by it.
///
/// # Returns
///
/// The merged `(survivor, absorbed)` pairs, in merge order.
///
/// # Errors
///
/// Returns an error only if the graph's edge lists are inconsistent.
pub fn merge_blocks(
    cfg: &mut ControlFlowGraph,
    du: &mut DefUseIndex,
) -> Result<Vec<(NodeId, NodeId)>> {
    let mut merged = Vec::new();
    let nodes: Vec<NodeId> = cfg.nodes().collect();
    for node in nodes {
        if cfg.node(node).is_removed() {
            continue;
        }
        while let Some(next) = merge_partner(cfg, node) {
            for phi in cfg.phis(next) {
                let (Some(dst), Some(src)) = (cfg.inst(phi).dst(), cfg.inst(phi).src(0)) else {
                    continue;
                };
                du.replace_all_uses(cfg, dst, src);
                du.unlink(cfg, phi);
            }
            let edge = cfg.node(node).succs()[0];
            cfg.remove_edge(edge)?;
            cfg.move_instructions(next, node);
            let succs = cfg.node(next).succs().to_vec();
            for succ in succs {
                cfg.move_edge_source(succ, node)?;
            }
            cfg.remove_node(next)?;
            log::trace!("merged {next} into {node}");
            merged.push((node, next));
        }
    }
    Ok(merged)
}

/// Returns the successor of an empty block that can be bypassed.
fn bypass_target(
    cfg: &ControlFlowGraph,
    node: NodeId,
    preserve_critical_edges: bool,
) -> Option<NodeId> {
    let n = cfg.node(node);
    if n.kind() != NodeKind::Block || n.preds().is_empty() || n.label() != n.last() {
        return None;
    }
    let [out] = n.succs() else {
        return None;
    };
    let out = cfg.edge(*out);
    let target = out.target();
    if out.kind() != EdgeKind::Unconditional || target == node || target == cfg.exit() {
        return None;
    }
    if n
        .preds()
        .iter()
        .any(|&p| cfg.edge(p).kind() == EdgeKind::Dispatch)
    {
        return None;
    }
    if preserve_critical_edges {
        // The block splits a critical edge if bypassing it would connect a
        // branching predecessor to a join.
        let joins = cfg.node(target).preds().len() - 1 + n.preds().len() > 1;
        let branches = n
            .preds()
            .iter()
            .any(|&p| cfg.node(cfg.edge(p).source()).succs().len() > 1);
        if joins && branches {
            return None;
        }
    }
    Some(target)
}

/// Removes blocks holding nothing but their label, moving their incoming
/// edges onto their successor.
///
/// Each moved edge carries the value the removed block passed to the
/// successor's phis. Blocks entered through dispatch edges stay, and so do
/// blocks splitting a critical edge when `preserve_critical_edges` is set.
///
/// # Returns
///
/// The `(removed, successor)` pairs.
///
/// # Errors
///
/// Returns an error only if the graph's edge lists are inconsistent.
pub fn bypass_empty_blocks(
    cfg: &mut ControlFlowGraph,
    du: &mut DefUseIndex,
    preserve_critical_edges: bool,
) -> Result<Vec<(NodeId, NodeId)>> {
    let mut bypassed = Vec::new();
    let nodes: Vec<NodeId> = cfg.nodes().collect();
    for node in nodes {
        if cfg.node(node).is_removed() {
            continue;
        }
        let Some(target) = bypass_target(cfg, node, preserve_critical_edges) else {
            continue;
        };
        let out = cfg.node(node).succs()[0];
        let index = cfg.pred_index(out).unwrap_or_default();
        let phis = cfg.phis(target);
        let carried: Vec<Option<OperandId>> = phis
            .iter()
            .map(|&phi| cfg.phi_source(phi, index))
            .collect();

        let preds = cfg.node(node).preds().to_vec();
        for pred in preds {
            du.retarget_edge(cfg, pred, target)?;
            for (&phi, value) in phis.iter().zip(&carried) {
                if let Some(value) = *value {
                    du.push_use(cfg, phi, value);
                }
            }
        }
        du.remove_edge(cfg, out)?;
        cfg.remove_node(node)?;
        log::trace!("bypassed empty {node} to {target}");
        bypassed.push((node, target));
    }
    Ok(bypassed)
}
