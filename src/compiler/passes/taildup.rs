//! Tail duplication and redundant branch folding.
//!
//! A comparison that repeats one made by a dominating branch has a known
//! outcome along some incoming edges:
//!
//! ```text
//! B0: c0 = x < y
//!     branch c0 -> B1, B2
//! B1: ...            // x < y holds here
//!     jump B3
//! B2: ...
//!     jump B3
//! B3: c1 = x < y
//!     branch c1 -> B4, B5
//! ```
//!
//! Along `B1 -> B3` the branch in `B3` always goes to `B4`. The pass copies
//! `B3` onto that edge with [`tail_duplicate`] and replaces the copy's branch
//! with an unconditional edge to `B4`. The original keeps serving `B2`.

use crate::{
    analysis::DefUseIndex,
    compiler::{
        pass::OptPass,
        passes::{
            duplicate::{duplicate_region, redirect_edge, RegionClone},
            unreachable::purge_unreachable,
        },
        CompilationContext, EventKind,
    },
    error::contract_violation,
    ir::{CmpKind, ControlFlowGraph, EdgeKind, NodeKind, Opcode, OperandId},
    utils::graph::{
        algorithms::{compute_dominators, DominatorTree},
        EdgeId, NodeId,
    },
    Result,
};

/// Copies `node` and moves exactly `pred_edge` into the copy.
///
/// The copy takes over the execution count flowing along `pred_edge`.
///
/// # Errors
///
/// Returns [`Error::ContractViolation`](crate::Error::ContractViolation) if
/// `pred_edge` does not end at `node` or `node` cannot be duplicated.
pub fn tail_duplicate(
    cfg: &mut ControlFlowGraph,
    du: &mut DefUseIndex,
    node: NodeId,
    pred_edge: EdgeId,
) -> Result<RegionClone> {
    let (source, target, prob) = {
        let e = cfg.try_edge(pred_edge)?;
        (e.source(), e.target(), e.prob())
    };
    if target != node {
        return Err(contract_violation!(
            "{} ends at {}, not at {}",
            pred_edge,
            target,
            node
        ));
    }
    let frequency = cfg.node(source).exec_count() * prob;
    let clone = duplicate_region(cfg, du, node, &[node], Some(frequency))?;
    redirect_edge(cfg, du, pred_edge, clone.entry())?;
    Ok(clone)
}

/// Replaces the conditional branch ending `node` with an unconditional edge
/// to its `outcome` successor.
///
/// # Errors
///
/// Returns [`Error::ContractViolation`](crate::Error::ContractViolation) if
/// `node` does not end in a two-way branch.
pub fn fold_branch(
    cfg: &mut ControlFlowGraph,
    du: &mut DefUseIndex,
    node: NodeId,
    outcome: bool,
) -> Result<()> {
    let branch = cfg
        .try_node(node)?
        .last()
        .filter(|&i| cfg.inst(i).opcode() == Opcode::Branch)
        .ok_or_else(|| contract_violation!("{} does not end in a branch", node))?;
    let (taken, dropped) = if outcome {
        (EdgeKind::True, EdgeKind::False)
    } else {
        (EdgeKind::False, EdgeKind::True)
    };
    let (Some(taken), Some(dropped)) = (cfg.succ_edge(node, taken), cfg.succ_edge(node, dropped))
    else {
        return Err(contract_violation!("{} lacks a true or false edge", node));
    };
    du.unlink(cfg, branch);
    du.remove_edge(cfg, dropped)?;
    cfg.set_edge_kind(taken, EdgeKind::Unconditional, 1.0);
    Ok(())
}

/// A comparison `lhs kind rhs` feeding a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Condition {
    kind: CmpKind,
    lhs: OperandId,
    rhs: OperandId,
}

impl Condition {
    /// Returns the condition tested by the branch ending `node`.
    fn of_branch(cfg: &ControlFlowGraph, node: NodeId) -> Option<Condition> {
        let last = cfg.node(node).last()?;
        let branch = cfg.inst(last);
        if branch.opcode() != Opcode::Branch {
            return None;
        }
        let flag = branch.src(0)?;
        let cmp = cfg.inst(cfg.operand(flag).def()?);
        let Opcode::Cmp(kind) = cmp.opcode() else {
            return None;
        };
        Some(Condition {
            kind,
            lhs: cmp.src(0)?,
            rhs: cmp.src(1)?,
        })
    }

    /// Returns the value of `self` given that `known` evaluated to
    /// `outcome`.
    fn implied_by(self, known: Condition, outcome: bool) -> Option<bool> {
        if self.lhs != known.lhs || self.rhs != known.rhs {
            return None;
        }
        if self.kind == known.kind {
            Some(outcome)
        } else if self.kind == known.kind.negate() {
            Some(!outcome)
        } else {
            None
        }
    }
}

/// Returns the outcome of `node`'s branch when entered along `edge`.
fn known_outcome(
    cfg: &ControlFlowGraph,
    dominators: &DominatorTree,
    node: NodeId,
    edge: EdgeId,
) -> Option<bool> {
    let condition = Condition::of_branch(cfg, node)?;
    let e = cfg.edge(edge);
    let source = e.source();

    // The edge itself leaves a branch on the same comparison.
    if let Some(known) = Condition::of_branch(cfg, source) {
        let outcome = match e.kind() {
            EdgeKind::True => Some(true),
            EdgeKind::False => Some(false),
            _ => None,
        };
        if let Some(implied) = outcome.and_then(|o| condition.implied_by(known, o)) {
            return Some(implied);
        }
    }

    // A dominator of the source branched on it, and only one of its
    // successors leads to the source.
    let mut current = dominators.immediate_dominator(source);
    while let Some(ancestor) = current {
        if ancestor != node {
            if let Some(known) = Condition::of_branch(cfg, ancestor) {
                for &succ in cfg.node(ancestor).succs() {
                    let s = cfg.edge(succ);
                    let outcome = match s.kind() {
                        EdgeKind::True => true,
                        EdgeKind::False => false,
                        _ => continue,
                    };
                    let arm = s.target();
                    if cfg.node(arm).preds().len() == 1 && dominators.dominates(arm, source) {
                        if let Some(implied) = condition.implied_by(known, outcome) {
                            return Some(implied);
                        }
                    }
                }
            }
        }
        current = dominators.immediate_dominator(ancestor);
    }
    None
}

/// Folds branches whose outcome is known along one incoming edge.
pub struct RedundantBranchFoldingPass {
    max_instructions: usize,
    max_folds: usize,
}

impl Default for RedundantBranchFoldingPass {
    fn default() -> Self {
        Self::new()
    }
}

impl RedundantBranchFoldingPass {
    /// Creates a new branch folding pass.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_instructions: 16,
            max_folds: 32,
        }
    }

    /// Only duplicates nodes with at most `limit` instructions.
    #[must_use]
    pub fn with_max_instructions(mut self, limit: usize) -> Self {
        self.max_instructions = limit;
        self
    }

    fn find_candidate(&self, cfg: &ControlFlowGraph) -> Option<(NodeId, EdgeId, bool)> {
        let dominators = compute_dominators(cfg, cfg.entry());
        for node in cfg.nodes() {
            let n = cfg.node(node);
            if n.kind() != NodeKind::Block || !dominators.is_reachable(node) {
                continue;
            }
            if cfg.insts_of(node).count() > self.max_instructions {
                continue;
            }
            for &edge in n.preds() {
                let e = cfg.edge(edge);
                if e.source() == node || e.kind() == EdgeKind::Dispatch {
                    continue;
                }
                if let Some(outcome) = known_outcome(cfg, &dominators, node, edge) {
                    return Some((node, edge, outcome));
                }
            }
        }
        None
    }
}

impl OptPass for RedundantBranchFoldingPass {
    fn name(&self) -> &'static str {
        "redundant-branch-folding"
    }

    fn description(&self) -> &'static str {
        "Tail-duplicates branches with a known outcome along one predecessor and folds the copy"
    }

    fn run(&self, cfg: &mut ControlFlowGraph, ctx: &CompilationContext<'_>) -> Result<bool> {
        let mut du = DefUseIndex::build(cfg);
        let mut folds = 0;
        while folds < self.max_folds {
            let Some((node, edge, outcome)) = self.find_candidate(cfg) else {
                break;
            };
            let folded = if cfg.node(node).preds().len() == 1 {
                fold_branch(cfg, &mut du, node, outcome)?;
                node
            } else {
                let clone = tail_duplicate(cfg, &mut du, node, edge)?;
                fold_branch(cfg, &mut du, clone.entry(), outcome)?;
                clone.entry()
            };
            folds += 1;
            ctx.events
                .record(EventKind::BranchFolded)
                .at(ctx.method, folded.index())
                .message(format!("{node} along {edge} always goes {outcome}"));
        }
        if folds == self.max_folds {
            log::debug!("{}: stopped after {} branch folds", ctx.method, folds);
        }
        if folds > 0 {
            let (purged, dead) = purge_unreachable(cfg)?;
            for node in dead {
                ctx.events
                    .record(EventKind::BlockRemoved)
                    .at(ctx.method, node.index())
                    .message(format!("unreachable {node} after folding"));
            }
            log::debug!(
                "{}: folded {} branches, purged {} nodes",
                ctx.method,
                folds,
                purged.nodes
            );
        }
        Ok(folds > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compiler::{EventLog, MethodId},
        ir::{verify, CfgBuilder, SemType},
        OptimizerFlags,
    };

    /// Diamond on `x < y` followed by a second branch on the same test.
    fn repeated_test() -> ControlFlowGraph {
        CfgBuilder::new().build_with(|f| {
            let x = f.temp(SemType::I32);
            let y = f.temp(SemType::I32);
            let c = f.temp(SemType::I32);
            f.block(0, |b| {
                b.define(Opcode::Arg(0), x, &[]);
                b.define(Opcode::Arg(1), y, &[]);
                b.define(Opcode::Cmp(CmpKind::Lt), c, &[x, y]);
                b.branch(c, 1, 2);
            });
            f.block(1, |b| {
                b.call(1, &[], SemType::Void);
                b.jump(3);
            });
            f.block(2, |b| {
                b.call(2, &[], SemType::Void);
                b.jump(3);
            });
            f.block(3, |b| {
                let again = b.cmp_lt(x, y);
                b.branch(again, 4, 5);
            });
            f.block(4, |b| b.ret(None));
            f.block(5, |b| b.ret(None));
        })
    }

    #[test]
    fn test_tail_duplicate_moves_one_edge() {
        let mut cfg = repeated_test();
        let b1 = cfg.block_node(1).unwrap();
        let b3 = cfg.block_node(3).unwrap();
        let edge = cfg.node(b1).succs()[0];
        let mut du = DefUseIndex::build(&cfg);
        let clone = tail_duplicate(&mut cfg, &mut du, b3, edge).unwrap();
        assert_eq!(cfg.node(b3).preds().len(), 1);
        assert_eq!(cfg.node(clone.entry()).preds(), &[edge]);
        verify(&cfg).unwrap();
        du.verify_against(&cfg).unwrap();
    }

    #[test]
    fn test_tail_duplicate_rejects_foreign_edge() {
        let mut cfg = repeated_test();
        let b3 = cfg.block_node(3).unwrap();
        let edge = cfg.succ_edge(cfg.entry(), EdgeKind::True).unwrap();
        let mut du = DefUseIndex::build(&cfg);
        assert!(tail_duplicate(&mut cfg, &mut du, b3, edge).is_err());
    }

    #[test]
    fn test_known_outcome_through_dominator() {
        let cfg = repeated_test();
        let dominators = compute_dominators(&cfg, cfg.entry());
        let b1 = cfg.block_node(1).unwrap();
        let b2 = cfg.block_node(2).unwrap();
        let b3 = cfg.block_node(3).unwrap();
        let from_b1 = cfg.node(b1).succs()[0];
        let from_b2 = cfg.node(b2).succs()[0];
        assert_eq!(known_outcome(&cfg, &dominators, b3, from_b1), Some(true));
        assert_eq!(known_outcome(&cfg, &dominators, b3, from_b2), Some(false));
    }

    #[test]
    fn test_pass_folds_both_paths() {
        let mut cfg = repeated_test();
        let flags = OptimizerFlags::default();
        let events = EventLog::new();
        let ctx = CompilationContext::new(MethodId(1), &flags, &events);
        assert!(RedundantBranchFoldingPass::new().run(&mut cfg, &ctx).unwrap());

        let b1 = cfg.block_node(1).unwrap();
        let b2 = cfg.block_node(2).unwrap();
        let b4 = cfg.block_node(4).unwrap();
        let b5 = cfg.block_node(5).unwrap();
        let next = |n: NodeId| {
            let succ = cfg.node(n).succs()[0];
            cfg.edge(succ).target()
        };
        let through = |n: NodeId| {
            let copy = next(n);
            assert_eq!(cfg.node(copy).succs().len(), 1);
            next(copy)
        };
        assert_eq!(through(b1), b4);
        assert_eq!(through(b2), b5);
        assert_eq!(events.count_kind(EventKind::BranchFolded), 2);
        verify(&cfg).unwrap();
    }

    #[test]
    fn test_unrelated_condition_is_left_alone() {
        let mut cfg = CfgBuilder::new().build_with(|f| {
            f.block(0, |b| {
                let x = b.arg(0, SemType::I32);
                let y = b.arg(1, SemType::I32);
                let c = b.cmp_lt(x, y);
                b.branch(c, 1, 2);
            });
            f.block(1, |b| b.jump(3));
            f.block(2, |b| b.jump(3));
            f.block(3, |b| {
                let z = b.arg(2, SemType::I32);
                let w = b.arg(3, SemType::I32);
                let c = b.cmp_eq(z, w);
                b.branch(c, 4, 4);
            });
            f.block(4, |b| b.ret(None));
        });
        let flags = OptimizerFlags::default();
        let events = EventLog::new();
        let ctx = CompilationContext::new(MethodId(1), &flags, &events);
        assert!(!RedundantBranchFoldingPass::new().run(&mut cfg, &ctx).unwrap());
        assert!(events.is_empty());
    }
}
