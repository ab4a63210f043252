//! Shared helpers for the integration tests.
//!
//! [`interpret`] executes the integer subset of the IR so tests can check
//! that a transformation preserved what a method computes and which calls it
//! makes, not only that the graph is well formed.

#![allow(dead_code)]

use std::collections::HashMap;

use midend::{ir::CfgBlockBuilder, prelude::*};

/// What one execution observed: the returned value and every call made,
/// with its argument values, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trace {
    pub value: Option<i64>,
    pub calls: Vec<(u32, Vec<i64>)>,
}

const STEP_LIMIT: usize = 100_000;

/// Runs `cfg` with the given arguments.
///
/// Panics on opcodes outside the integer subset and on malformed control
/// flow, which is what a test wants.
pub fn interpret(cfg: &ControlFlowGraph, args: &[i64]) -> Trace {
    let mut values: HashMap<OperandId, i64> = HashMap::new();
    let mut calls = Vec::new();
    let mut node = cfg.entry();
    let mut incoming: Option<EdgeId> = None;

    for _ in 0..STEP_LIMIT {
        // Phis read their sources before any of them is written.
        if let Some(edge) = incoming {
            let index = cfg.pred_index(edge).expect("edge is an incoming edge");
            let updates: Vec<(OperandId, i64)> = cfg
                .phis(node)
                .into_iter()
                .map(|phi| {
                    let dst = cfg.inst(phi).dst().expect("phi defines a value");
                    let src = cfg.phi_source(phi, index).expect("phi has a source per edge");
                    (dst, read(&values, src))
                })
                .collect();
            values.extend(updates);
        }

        let mut taken = None;
        for inst in cfg.insts_of(node) {
            let i = cfg.inst(inst);
            let src = |n: usize| read(&values, i.src(n).expect("source operand"));
            let result = match i.opcode() {
                Opcode::Label | Opcode::Phi | Opcode::SafePoint | Opcode::MethodMarker(_) => None,
                Opcode::Arg(n) => Some(args[n as usize]),
                Opcode::Const(v) => Some(v),
                Opcode::Copy | Opcode::LdVar | Opcode::StVar => Some(src(0)),
                Opcode::Conv { .. } => Some(src(0)),
                Opcode::Add => Some(src(0).wrapping_add(src(1))),
                Opcode::Sub => Some(src(0).wrapping_sub(src(1))),
                Opcode::Mul => Some(src(0).wrapping_mul(src(1))),
                Opcode::And => Some(src(0) & src(1)),
                Opcode::Or => Some(src(0) | src(1)),
                Opcode::Xor => Some(src(0) ^ src(1)),
                Opcode::Cmp(kind) => {
                    let (a, b) = (src(0), src(1));
                    let holds = match kind {
                        CmpKind::Eq => a == b,
                        CmpKind::Ne => a != b,
                        CmpKind::Lt => a < b,
                        CmpKind::Le => a <= b,
                        CmpKind::Gt => a > b,
                        CmpKind::Ge => a >= b,
                    };
                    Some(i64::from(holds))
                }
                Opcode::Call(method) => {
                    let args = i.srcs().map(|s| read(&values, s)).collect();
                    calls.push((method, args));
                    None
                }
                Opcode::Branch => {
                    taken = Some(if src(0) != 0 {
                        EdgeKind::True
                    } else {
                        EdgeKind::False
                    });
                    None
                }
                Opcode::Return => {
                    let value = i.src(0).map(|s| read(&values, s));
                    return Trace { value, calls };
                }
                other => panic!("interpreter does not support {other:?}"),
            };
            if let (Some(value), Some(dst)) = (result, i.dst()) {
                values.insert(dst, value);
            }
        }

        let edge = match taken {
            Some(kind) => cfg.succ_edge(node, kind).expect("branch has both edges"),
            None => {
                let succs = cfg.node(node).succs();
                assert_eq!(succs.len(), 1, "{node} falls through to one successor");
                succs[0]
            }
        };
        incoming = Some(edge);
        node = cfg.edge(edge).target();
    }
    panic!("no return after {STEP_LIMIT} steps");
}

fn read(values: &HashMap<OperandId, i64>, operand: OperandId) -> i64 {
    *values
        .get(&operand)
        .unwrap_or_else(|| panic!("{operand} read before it was written"))
}

/// `i = 0; while i < n { call 7(i); i += 1 } return i`, with an unused
/// product in the body.
pub fn counting_loop() -> ControlFlowGraph {
    CfgBuilder::new().build_with(|f| {
        let i = f.temp(SemType::I64);
        let next = f.temp(SemType::I64);
        let zero = f.temp(SemType::I64);
        f.block(0, |b| {
            b.define(Opcode::Const(0), zero, &[]);
            b.jump(1);
        });
        f.block(1, |b| {
            b.exec_count(10.0);
            b.phi_into(i, &[(0, zero), (2, next)]);
            let n = b.arg(0, SemType::I64);
            let c = b.cmp_lt(i, n);
            b.branch_weighted(c, 2, 3, 0.9);
        });
        f.block(2, |b| {
            b.exec_count(9.0);
            b.call(7, &[i], SemType::Void);
            let one = b.const_i64(1);
            b.define(Opcode::Add, next, &[i, one]);
            b.mul(next, next);
            b.jump(1);
        });
        f.block(3, |b| b.ret(Some(i)));
    })
}

/// Small deterministic generator for test graphs.
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Lcg(seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1)
    }

    pub fn next(&mut self, bound: usize) -> usize {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        ((self.0 >> 33) as usize) % bound
    }
}

/// Emits `count` random integer instructions over `pool`, pushing every
/// value they define onto it.
fn emit_ops(b: &mut CfgBlockBuilder<'_>, rng: &mut Lcg, pool: &mut Vec<OperandId>, count: usize) {
    for _ in 0..count {
        let a = pool[rng.next(pool.len())];
        let c = pool[rng.next(pool.len())];
        let value = match rng.next(7) {
            0 => b.const_i64(rng.next(100) as i64 - 50),
            1 => b.add(a, c),
            2 => b.sub(a, c),
            3 => b.mul(a, c),
            4 => b.xor(a, c),
            5 => b.copy(a),
            _ => {
                b.call(rng.next(4) as u32, &[a], SemType::Void);
                continue;
            }
        };
        pool.push(value);
    }
}

/// A diamond over two arguments filled with random arithmetic, some of it
/// dead, joined by a phi and returning one of the values.
pub fn generated(seed: u64) -> ControlFlowGraph {
    let mut rng = Lcg::new(seed);
    CfgBuilder::new().build_with(|f| {
        let mut shared = Vec::new();
        f.block(0, |b| {
            shared.push(b.arg(0, SemType::I64));
            shared.push(b.arg(1, SemType::I64));
            emit_ops(b, &mut rng, &mut shared, 6);
            let c = b.cmp_lt(shared[0], shared[1]);
            b.branch(c, 1, 2);
        });
        let mut arms = Vec::new();
        for block in [1, 2] {
            let mut pool = shared.clone();
            f.block(block, |b| {
                emit_ops(b, &mut rng, &mut pool, 5);
                b.jump(3);
            });
            arms.push(pool[rng.next(pool.len())]);
        }
        f.block(3, |b| {
            let mut pool = shared.clone();
            pool.push(b.phi(SemType::I64, &[(1, arms[0]), (2, arms[1])]));
            emit_ops(b, &mut rng, &mut pool, 6);
            let result = pool[pool.len() - 1 - rng.next(3)];
            b.ret(Some(result));
        });
    })
}

/// Argument vectors the tests run every graph with.
pub const INPUTS: [[i64; 2]; 5] = [[0, 0], [1, 2], [5, -3], [-7, 4], [3, 3]];
