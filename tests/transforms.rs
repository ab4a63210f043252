//! Integration tests for the duplicator and the transformations built on it.
//!
//! Structural checks (graph verifier, def-use index against a rebuild) are
//! paired with behavioral ones: the transformed method must return the same
//! value and make the same calls as the original for every input.

mod common;

use common::{counting_loop, generated, interpret, INPUTS};
use midend::{
    compiler::{duplicate_region, redirect_edge, tail_duplicate},
    ir::{verify, verify_phi_arity},
    prelude::*,
};

/// Runs `cfg` for loop trip counts `-1..=6`.
fn loop_traces(cfg: &ControlFlowGraph) -> Vec<common::Trace> {
    (-1..=6).map(|n| interpret(cfg, &[n])).collect()
}

/// Checks the graph and the index after a mutation.
fn check(cfg: &ControlFlowGraph, du: &DefUseIndex) -> Result<()> {
    verify(cfg)?;
    verify_phi_arity(cfg)?;
    du.verify_against(cfg)?;
    let rebuilt = DefUseIndex::build(cfg);
    assert_eq!(du.link_count(), rebuilt.link_count());
    Ok(())
}

/// Two arms join in block 3, which computes `y + y` from an argument;
/// block 4 reads that sum. With `versioned` the sum is an SSA version of a
/// plain variable instead of a temporary.
fn shared_tail(versioned: bool) -> ControlFlowGraph {
    CfgBuilder::new().build_with(|f| {
        let sum = if versioned {
            let var = f.variable(SemType::I64);
            f.ssa_var(var)
        } else {
            f.temp(SemType::I64)
        };
        f.block(0, |b| {
            let c = b.arg(0, SemType::I64);
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
            let y = b.arg(1, SemType::I64);
            b.define(Opcode::Add, sum, &[y, y]);
            b.jump(4);
        });
        f.block(4, |b| {
            let one = b.const_i64(1);
            let r = b.add(sum, one);
            b.ret(Some(r));
        });
    })
}

/// Tail-duplicates block 3 along the edge from block 1.
fn duplicate_shared_tail(versioned: bool) -> Result<(ControlFlowGraph, DefUseIndex)> {
    let mut cfg = shared_tail(versioned);
    let before: Vec<_> = INPUTS.iter().map(|a| interpret(&cfg, a)).collect();
    let b1 = cfg.block_node(1).unwrap();
    let b3 = cfg.block_node(3).unwrap();
    let b4 = cfg.block_node(4).unwrap();
    let mut du = DefUseIndex::build(&cfg);

    let edge = cfg.node(b1).succs()[0];
    let clone = tail_duplicate(&mut cfg, &mut du, b3, edge)?;
    assert_eq!(cfg.node(clone.entry()).preds(), &[edge]);
    assert_eq!(cfg.node(b4).preds().len(), 2, "both copies flow into block 4");
    check(&cfg, &du)?;

    let after: Vec<_> = INPUTS.iter().map(|a| interpret(&cfg, a)).collect();
    assert_eq!(after, before);
    Ok((cfg, du))
}

#[test]
fn test_escaping_version_gets_phi() -> Result<()> {
    let (cfg, _) = duplicate_shared_tail(true)?;
    let b4 = cfg.block_node(4).unwrap();
    assert_eq!(
        cfg.phis(b4).len(),
        1,
        "the sum reaches block 4 from two definitions"
    );
    Ok(())
}

#[test]
fn test_escaping_temp_goes_through_variable() -> Result<()> {
    let (cfg, _) = duplicate_shared_tail(false)?;
    let b4 = cfg.block_node(4).unwrap();
    assert!(cfg.phis(b4).is_empty());
    let loads = cfg
        .insts_of(b4)
        .filter(|&i| cfg.inst(i).opcode() == Opcode::LdVar)
        .count();
    assert_eq!(loads, 1);
    let stores = cfg
        .instructions()
        .filter(|&i| cfg.inst(i).opcode() == Opcode::StVar)
        .count();
    assert_eq!(stores, 2, "one store after each copy of the sum");
    Ok(())
}

#[test]
fn test_duplicate_then_redirect_every_entry() -> Result<()> {
    let mut cfg = shared_tail(false);
    let before: Vec<_> = INPUTS.iter().map(|a| interpret(&cfg, a)).collect();
    let b3 = cfg.block_node(3).unwrap();
    let b4 = cfg.block_node(4).unwrap();
    let mut du = DefUseIndex::build(&cfg);

    let clone = duplicate_region(&mut cfg, &mut du, b3, &[b3, b4], None)?;
    assert_eq!(clone.node_count(), 2);
    for (original, copy) in clone.node_pairs() {
        let shape = |n: NodeId| -> Vec<Opcode> {
            cfg.insts_of(n).map(|i| cfg.inst(i).opcode()).collect()
        };
        assert_eq!(shape(original), shape(copy));
    }
    check(&cfg, &du)?;

    // Move every entry into the copy; the original becomes unreachable.
    let entries = cfg.node(b3).preds().to_vec();
    for edge in entries {
        redirect_edge(&mut cfg, &mut du, edge, clone.entry())?;
    }
    assert!(cfg.node(b3).preds().is_empty());
    check(&cfg, &du)?;

    let after: Vec<_> = INPUTS.iter().map(|a| interpret(&cfg, a)).collect();
    assert_eq!(after, before);
    Ok(())
}

#[test]
fn test_peel_preserves_behavior_and_phi_arity() -> Result<()> {
    let mut cfg = counting_loop();
    let before = loop_traces(&cfg);
    let header = cfg.block_node(1).unwrap();
    let loops = LoopTree::compute(&cfg);
    let mut du = DefUseIndex::build(&cfg);

    let clone = peel_loop(&mut cfg, &mut du, &loops, header)?;
    check(&cfg, &du)?;
    for (original, copy) in clone.node_pairs() {
        assert_eq!(
            cfg.phis(original).len(),
            cfg.phis(copy).len(),
            "{copy} keeps the phis of {original}"
        );
    }
    assert_eq!(loop_traces(&cfg), before);
    Ok(())
}

#[test]
fn test_unroll_preserves_behavior() -> Result<()> {
    for factor in 2..=4 {
        let mut cfg = counting_loop();
        let before = loop_traces(&cfg);
        let header = cfg.block_node(1).unwrap();
        let loops = LoopTree::compute(&cfg);
        let mut du = DefUseIndex::build(&cfg);

        let copies = unroll_loop(&mut cfg, &mut du, &loops, header, factor)?;
        assert_eq!(copies.len(), factor - 1);
        check(&cfg, &du)?;
        assert_eq!(loop_traces(&cfg), before, "unrolled by {factor}");
    }
    Ok(())
}

#[test]
fn test_dead_code_elimination_is_sound_and_idempotent() -> Result<()> {
    for seed in 0..24 {
        let mut cfg = generated(seed);
        let before: Vec<_> = INPUTS.iter().map(|a| interpret(&cfg, a)).collect();

        let mut du = DefUseIndex::build(&cfg);
        DeadCodeEliminator::new(&mut cfg, &mut du, DceOptions::default()).run()?;
        check(&cfg, &du)?;
        let after: Vec<_> = INPUTS.iter().map(|a| interpret(&cfg, a)).collect();
        assert_eq!(after, before, "seed {seed}");

        let again = DeadCodeEliminator::new(&mut cfg, &mut du, DceOptions::default()).run()?;
        assert!(!again.changed(), "seed {seed}: second run changed {again:?}");
    }
    Ok(())
}

#[test]
fn test_dead_code_elimination_keeps_every_call() -> Result<()> {
    let mut cfg = counting_loop();
    let before = loop_traces(&cfg);
    let mut du = DefUseIndex::build(&cfg);
    let stats = DeadCodeEliminator::new(&mut cfg, &mut du, DceOptions::default()).run()?;
    assert_eq!(stats.instructions_removed, 1, "only the product is dead");
    check(&cfg, &du)?;
    assert_eq!(loop_traces(&cfg), before);
    Ok(())
}

#[test]
fn test_pipeline_with_unrolling_preserves_behavior() -> Result<()> {
    let flags: OptimizerFlags = "unroll_factor=2,checked=true".parse()?;
    let events = EventLog::new();
    let ctx = CompilationContext::new(MethodId(1), &flags, &events);

    let mut cfg = counting_loop();
    let before = loop_traces(&cfg);
    let outcome = PassPipeline::standard().run(&mut cfg, &ctx);

    assert!(outcome.changed);
    assert!(events.has(EventKind::LoopPeeled));
    verify(&cfg)?;
    assert_eq!(loop_traces(&cfg), before);
    Ok(())
}

#[test]
fn test_session_compiles_methods_independently() {
    let flags = OptimizerFlags::default().with_checked(true);
    let session = CompilationSession::new(flags);
    let methods: Vec<(MethodId, ControlFlowGraph)> = (0..16)
        .map(|i| (MethodId(i), generated(u64::from(i))))
        .collect();
    let expected: Vec<Vec<common::Trace>> = methods
        .iter()
        .map(|(_, cfg)| INPUTS.iter().map(|a| interpret(cfg, a)).collect())
        .collect();

    session.compile(methods);
    assert_eq!(session.len(), 16);
    for (i, traces) in (0..16).zip(expected) {
        let outcome = session.take(MethodId(i)).unwrap();
        assert!(outcome.pipeline.skipped.is_empty(), "m{i}: {:?}", outcome.pipeline);
        let after: Vec<_> = INPUTS.iter().map(|a| interpret(&outcome.cfg, a)).collect();
        assert_eq!(after, traces, "m{i}");
    }
    assert!(session.is_empty());
}
