//! Loop peeling and unrolling.
//!
//! Both transformations are built on [`duplicate_region`]:
//!
//! - **Peeling** copies the loop body once, sends every edge entering the
//!   loop into the copy and the copy's back edges to the original header.
//!   The copy runs the first iteration; the original runs the rest.
//! - **Unrolling** by `factor` makes `factor - 1` copies and chains them
//!   through their back edges, so one trip around the loop executes the body
//!   `factor` times. Exits of every copy stay in place, which keeps the
//!   transformation valid for any trip count.

use crate::{
    analysis::{DefUseIndex, LoopTree},
    compiler::{
        pass::OptPass,
        passes::duplicate::{duplicate_region, redirect_edge, RegionClone},
        CompilationContext, EventKind,
    },
    error::contract_violation,
    ir::{ControlFlowGraph, NodeKind},
    utils::graph::{EdgeId, NodeId},
    Result,
};

fn check_current(cfg: &ControlFlowGraph, loops: &LoopTree) -> Result<()> {
    if loops.revision() != cfg.revision() {
        return Err(contract_violation!(
            "loop tree describes revision {} but the graph is at {}",
            loops.revision(),
            cfg.revision()
        ));
    }
    Ok(())
}

/// Returns the edges into `header` whose source is (or is not) in `body`.
fn header_edges(cfg: &ControlFlowGraph, header: NodeId, body: &[NodeId], inside: bool) -> Vec<EdgeId> {
    cfg.node(header)
        .preds()
        .iter()
        .copied()
        .filter(|&e| body.contains(&cfg.edge(e).source()) == inside)
        .collect()
}

fn entry_frequency(cfg: &ControlFlowGraph, entries: &[EdgeId], header: NodeId) -> f64 {
    let total: f64 = entries
        .iter()
        .map(|&e| {
            let edge = cfg.edge(e);
            cfg.node(edge.source()).exec_count() * edge.prob()
        })
        .sum();
    total.min(cfg.node(header).exec_count())
}

/// Peels the first iteration off the loop headed by `header`.
///
/// # Arguments
///
/// * `cfg` - The graph to transform
/// * `du` - Def-use index of `cfg`, kept in sync
/// * `loops` - Loop tree computed for the current revision of `cfg`
/// * `header` - Header of the loop to peel
///
/// # Returns
///
/// The copy, which now holds the peeled iteration.
///
/// # Errors
///
/// Returns [`Error::ContractViolation`](crate::Error::ContractViolation) if
/// `header` does not head a loop, the loop tree is stale, or the loop body
/// cannot be duplicated.
pub fn peel_loop(
    cfg: &mut ControlFlowGraph,
    du: &mut DefUseIndex,
    loops: &LoopTree,
    header: NodeId,
) -> Result<RegionClone> {
    check_current(cfg, loops)?;
    if loops.loop_of(header).is_none() {
        return Err(contract_violation!("{} is not a loop header", header));
    }
    let body = loops.loop_body(header);
    let entries = header_edges(cfg, header, &body, false);
    let frequency = entry_frequency(cfg, &entries, header);

    let clone = duplicate_region(cfg, du, header, &body, Some(frequency))?;
    // Before anything enters the copy, its header's predecessors are
    // exactly its back edges.
    let copied_back_edges = cfg.node(clone.entry()).preds().to_vec();
    for edge in entries {
        redirect_edge(cfg, du, edge, clone.entry())?;
    }
    for edge in copied_back_edges {
        redirect_edge(cfg, du, edge, header)?;
    }
    log::debug!("peeled loop at {} ({} nodes)", header, body.len());
    Ok(clone)
}

/// Unrolls the loop headed by `header` so the body runs `factor` times per
/// trip through the header.
///
/// A `factor` below 2 leaves the graph unchanged.
///
/// # Returns
///
/// The `factor - 1` copies in chain order.
///
/// # Errors
///
/// Same as [`peel_loop`].
pub fn unroll_loop(
    cfg: &mut ControlFlowGraph,
    du: &mut DefUseIndex,
    loops: &LoopTree,
    header: NodeId,
    factor: usize,
) -> Result<Vec<RegionClone>> {
    if factor < 2 {
        return Ok(Vec::new());
    }
    check_current(cfg, loops)?;
    if loops.loop_of(header).is_none() {
        return Err(contract_violation!("{} is not a loop header", header));
    }

    #[allow(clippy::cast_precision_loss)]
    let share = cfg.node(header).exec_count() / factor as f64;
    let mut body = loops.loop_body(header);
    let mut copies = Vec::with_capacity(factor - 1);
    let mut copy_back_edges = Vec::with_capacity(factor - 1);
    for _ in 1..factor {
        let clone = duplicate_region(cfg, du, header, &body, Some(share))?;
        copy_back_edges.push(cfg.node(clone.entry()).preds().to_vec());
        copies.push(clone);
        // Repairs may split edges inside the body.
        body = LoopTree::compute(cfg).loop_body(header);
    }

    let mut previous = header_edges(cfg, header, &body, true);
    for (clone, back_edges) in copies.iter().zip(copy_back_edges) {
        for edge in previous {
            redirect_edge(cfg, du, edge, clone.entry())?;
        }
        previous = back_edges;
    }
    for edge in previous {
        redirect_edge(cfg, du, edge, header)?;
    }
    log::debug!("unrolled loop at {} by {}", header, factor);
    Ok(copies)
}

/// Returns `true` if the loop headed by `header` can be duplicated.
fn is_duplicable(cfg: &ControlFlowGraph, loops: &LoopTree, header: NodeId) -> bool {
    loops.loop_body(header).iter().all(|&n| {
        matches!(cfg.node(n).kind(), NodeKind::Block | NodeKind::Dispatch)
    })
}

/// Collects innermost loops whose size is at most `max_nodes`.
fn small_innermost_loops(cfg: &ControlFlowGraph, max_nodes: usize) -> Vec<NodeId> {
    let loops = LoopTree::compute(cfg);
    loops
        .innermost_loops()
        .into_iter()
        .filter(|&h| {
            loops.dominator_tree().is_reachable(h)
                && loops.loop_of(h).is_some_and(|l| l.size() <= max_nodes)
                && is_duplicable(cfg, &loops, h)
        })
        .collect()
}

/// Peels one iteration off small innermost loops.
pub struct LoopPeelingPass;

impl Default for LoopPeelingPass {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopPeelingPass {
    /// Creates a new loop peeling pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl OptPass for LoopPeelingPass {
    fn name(&self) -> &'static str {
        "loop-peeling"
    }

    fn description(&self) -> &'static str {
        "Peels the first iteration of small innermost loops"
    }

    fn should_run(&self, ctx: &CompilationContext<'_>) -> bool {
        ctx.flags.peel_max_nodes > 0
    }

    fn run(&self, cfg: &mut ControlFlowGraph, ctx: &CompilationContext<'_>) -> Result<bool> {
        let headers = small_innermost_loops(cfg, ctx.flags.peel_max_nodes);
        let mut du = DefUseIndex::build(cfg);
        for &header in &headers {
            let loops = LoopTree::compute(cfg);
            let clone = peel_loop(cfg, &mut du, &loops, header)?;
            ctx.events
                .record(EventKind::LoopPeeled)
                .at(ctx.method, header.index())
                .message(format!(
                    "{} nodes peeled into {}",
                    clone.node_count(),
                    clone.entry()
                ));
        }
        Ok(!headers.is_empty())
    }
}

/// Unrolls small innermost loops by the configured factor.
pub struct LoopUnrollingPass;

impl Default for LoopUnrollingPass {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopUnrollingPass {
    /// Creates a new loop unrolling pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl OptPass for LoopUnrollingPass {
    fn name(&self) -> &'static str {
        "loop-unrolling"
    }

    fn description(&self) -> &'static str {
        "Chains copies of small innermost loop bodies through their back edges"
    }

    fn should_run(&self, ctx: &CompilationContext<'_>) -> bool {
        ctx.flags.unroll_factor > 1 && ctx.flags.unroll_max_nodes > 0
    }

    fn run(&self, cfg: &mut ControlFlowGraph, ctx: &CompilationContext<'_>) -> Result<bool> {
        let factor = ctx.flags.unroll_factor;
        let headers = small_innermost_loops(cfg, ctx.flags.unroll_max_nodes);
        let mut du = DefUseIndex::build(cfg);
        for &header in &headers {
            let loops = LoopTree::compute(cfg);
            unroll_loop(cfg, &mut du, &loops, header, factor)?;
            ctx.events
                .record(EventKind::LoopUnrolled)
                .at(ctx.method, header.index())
                .message(format!("unrolled by {factor}"));
        }
        Ok(!headers.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::ControlFlowQueries,
        compiler::{EventLog, MethodId},
        ir::{verify, CfgBuilder, Opcode, SemType},
        OptimizerFlags,
    };

    /// `i = 0; while (i < n) i = i + 1; return i`
    fn counting_loop() -> ControlFlowGraph {
        CfgBuilder::new().build_with(|f| {
            let zero = f.temp(SemType::I32);
            let i = f.temp(SemType::I32);
            let next = f.temp(SemType::I32);
            f.block(0, |b| {
                b.define(Opcode::Const(0), zero, &[]);
                b.jump(1);
            });
            f.block(1, |b| {
                b.exec_count(10.0);
                b.phi_into(i, &[(0, zero), (2, next)]);
                let n = b.arg(0, SemType::I32);
                let c = b.cmp_lt(i, n);
                b.branch_weighted(c, 2, 3, 0.9);
            });
            f.block(2, |b| {
                b.exec_count(9.0);
                let one = b.const_i32(1);
                b.define(Opcode::Add, next, &[i, one]);
                b.jump(1);
            });
            f.block(3, |b| b.ret(Some(i)));
        })
    }

    #[test]
    fn test_peel_routes_entry_through_copy() {
        let mut cfg = counting_loop();
        let header = cfg.block_node(1).unwrap();
        let latch = cfg.block_node(2).unwrap();
        let exit = cfg.block_node(3).unwrap();
        let loops = LoopTree::compute(&cfg);
        let mut du = DefUseIndex::build(&cfg);

        let clone = peel_loop(&mut cfg, &mut du, &loops, header).unwrap();
        let copy = clone.entry();

        // The copy is entered from outside, the original only from latches.
        assert_eq!(cfg.node(copy).preds().len(), 1);
        assert_eq!(cfg.edge(cfg.node(copy).preds()[0]).source(), cfg.entry());
        let header_sources: Vec<NodeId> = cfg
            .node(header)
            .preds()
            .iter()
            .map(|&e| cfg.edge(e).source())
            .collect();
        assert_eq!(header_sources, vec![latch, clone.node(latch).unwrap()]);
        // Both copies exit to the same block.
        assert_eq!(cfg.node(exit).preds().len(), 2);
        assert!((cfg.node(copy).exec_count() - 1.0).abs() < 1e-9);

        verify(&cfg).unwrap();
        du.verify_against(&cfg).unwrap();
        let loops = LoopTree::compute(&cfg);
        assert!(loops.loop_of(header).is_some());
        assert!(loops.loop_of(copy).is_none());
    }

    #[test]
    fn test_unroll_chains_copies() {
        let mut cfg = counting_loop();
        let header = cfg.block_node(1).unwrap();
        let latch = cfg.block_node(2).unwrap();
        let loops = LoopTree::compute(&cfg);
        let mut du = DefUseIndex::build(&cfg);

        let copies = unroll_loop(&mut cfg, &mut du, &loops, header, 3).unwrap();
        assert_eq!(copies.len(), 2);
        let next_header = |latch: NodeId| {
            let succ = cfg.node(latch).succs()[0];
            cfg.edge(succ).target()
        };
        assert_eq!(next_header(latch), copies[0].entry());
        assert_eq!(next_header(copies[0].node(latch).unwrap()), copies[1].entry());
        assert_eq!(next_header(copies[1].node(latch).unwrap()), header);

        verify(&cfg).unwrap();
        du.verify_against(&cfg).unwrap();
        let loops = LoopTree::compute(&cfg);
        assert_eq!(loops.max_loop_depth(), 1);
        assert_eq!(loops.loop_body(header).len(), 6);
    }

    #[test]
    fn test_unroll_factor_one_is_identity() {
        let mut cfg = counting_loop();
        let header = cfg.block_node(1).unwrap();
        let loops = LoopTree::compute(&cfg);
        let mut du = DefUseIndex::build(&cfg);
        let revision = cfg.revision();
        assert!(unroll_loop(&mut cfg, &mut du, &loops, header, 1)
            .unwrap()
            .is_empty());
        assert_eq!(cfg.revision(), revision);
    }

    #[test]
    fn test_stale_loop_tree_is_rejected() {
        let mut cfg = counting_loop();
        let header = cfg.block_node(1).unwrap();
        let loops = LoopTree::compute(&cfg);
        cfg.new_temp(SemType::I32);
        let mut du = DefUseIndex::build(&cfg);
        assert!(peel_loop(&mut cfg, &mut du, &loops, header).is_err());
    }

    #[test]
    fn test_pass_respects_size_limit() {
        let flags = OptimizerFlags::default().with_peel_max_nodes(1);
        let events = EventLog::new();
        let ctx = CompilationContext::new(MethodId(0), &flags, &events);
        let mut cfg = counting_loop();
        assert!(!LoopPeelingPass::new().run(&mut cfg, &ctx).unwrap());

        let flags = OptimizerFlags::default();
        let ctx = CompilationContext::new(MethodId(0), &flags, &events);
        assert!(LoopPeelingPass::new().run(&mut cfg, &ctx).unwrap());
        assert_eq!(events.count_kind(EventKind::LoopPeeled), 1);
        verify(&cfg).unwrap();
    }
}
