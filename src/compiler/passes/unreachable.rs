//! Unreachable code purge.
//!
//! Removes every node that has no path from the entry. Edges from purged
//! nodes into surviving nodes are removed together with the phi sources they
//! carried, so every surviving phi again has one source per incoming edge.
//! Dead code elimination relies on that and therefore runs after this pass.

use crate::{
    compiler::{pass::OptPass, CompilationContext, EventKind},
    ir::{ControlFlowGraph, NodeKind},
    utils::graph::{algorithms, NodeId},
    Result,
};

/// Counts of what [`purge_unreachable`] removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeStats {
    /// Nodes removed.
    pub nodes: usize,
    /// Edges removed, including edges into surviving nodes.
    pub edges: usize,
}

/// Removes the nodes of `cfg` that cannot be reached from the entry.
///
/// The exit node is kept even when unreachable (a method that never
/// returns).
///
/// # Errors
///
/// Returns an error only if the graph's edge lists are inconsistent.
pub fn purge_unreachable(cfg: &mut ControlFlowGraph) -> Result<(PurgeStats, Vec<NodeId>)> {
    let reachable = algorithms::reachable(cfg, cfg.entry());
    let dead: Vec<NodeId> = cfg
        .nodes()
        .filter(|&n| !reachable[n.index()] && cfg.node(n).kind() != NodeKind::Exit)
        .collect();

    let mut stats = PurgeStats::default();
    for &node in &dead {
        loop {
            let edge = {
                let n = cfg.node(node);
                n.succs().first().or_else(|| n.preds().first()).copied()
            };
            let Some(edge) = edge else {
                break;
            };
            cfg.remove_edge(edge)?;
            stats.edges += 1;
        }
    }
    for &node in &dead {
        cfg.remove_node(node)?;
        stats.nodes += 1;
    }
    Ok((stats, dead))
}

/// Pass wrapper around [`purge_unreachable`].
pub struct UnreachableCodePass;

impl Default for UnreachableCodePass {
    fn default() -> Self {
        Self::new()
    }
}

impl UnreachableCodePass {
    /// Creates a new unreachable code pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl OptPass for UnreachableCodePass {
    fn name(&self) -> &'static str {
        "unreachable-code"
    }

    fn description(&self) -> &'static str {
        "Removes nodes with no path from the entry and trims phis of their survivors"
    }

    fn run(&self, cfg: &mut ControlFlowGraph, ctx: &CompilationContext<'_>) -> Result<bool> {
        let (stats, dead) = purge_unreachable(cfg)?;
        for node in &dead {
            ctx.events
                .record(EventKind::BlockRemoved)
                .at(ctx.method, node.index())
                .message(format!("unreachable {node}"));
        }
        if stats.nodes > 0 {
            log::debug!(
                "{}: purged {} unreachable nodes, {} edges",
                ctx.method,
                stats.nodes,
                stats.edges
            );
        }
        Ok(stats.nodes > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{verify, CfgBuilder, EdgeKind, SemType};

    #[test]
    fn test_purge_trims_phi_of_survivor() {
        let mut cfg = CfgBuilder::new().build_with(|f| {
            f.block(0, |b| b.jump(2));
            f.block(1, |b| b.jump(2));
            f.block(2, |b| b.ret(None));
        });
        // Block 1 has no predecessor; give block 2 a phi over both edges.
        let b2 = cfg.block_node(2).unwrap();
        let a = cfg.new_temp(SemType::I32);
        let c = cfg.new_temp(SemType::I32);
        let d = cfg.new_temp(SemType::I32);
        let phi = cfg.new_phi(b2, d, &[a, c]);
        assert_eq!(cfg.node(b2).preds().len(), 2);

        let (stats, dead) = purge_unreachable(&mut cfg).unwrap();
        assert_eq!(stats.nodes, 1);
        assert_eq!(dead, vec![cfg.block_node(1).unwrap()]);
        assert_eq!(cfg.node(b2).preds().len(), 1);
        assert_eq!(cfg.inst(phi).phi_sources(), vec![a]);
    }

    #[test]
    fn test_unreachable_cycle_is_removed() {
        let mut cfg = CfgBuilder::new().build_with(|f| {
            f.block(0, |b| b.ret(None));
            f.block(1, |b| b.jump(2));
            f.block(2, |b| b.jump(1));
        });
        let (stats, _) = purge_unreachable(&mut cfg).unwrap();
        assert_eq!(stats.nodes, 2);
        assert_eq!(stats.edges, 2);
        verify(&cfg).unwrap();
        assert!(cfg.edges().all(|e| cfg.edge(e).kind() == EdgeKind::Unconditional));
    }

    #[test]
    fn test_exit_survives_infinite_loop() {
        let mut cfg = CfgBuilder::new().build_with(|f| {
            f.block(0, |b| b.jump(1));
            f.block(1, |b| b.jump(1));
        });
        let (stats, _) = purge_unreachable(&mut cfg).unwrap();
        assert_eq!(stats.nodes, 0);
        assert!(cfg.try_node(cfg.exit()).is_ok());
    }
}
