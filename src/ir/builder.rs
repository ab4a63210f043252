//! Builder pattern for programmatic CFG construction.
//!
//! The builder uses a closure-based API where every block is defined within a
//! single expression, which keeps the control flow visually apparent:
//!
//! ```rust
//! use midend::ir::{CfgBuilder, SemType};
//!
//! let cfg = CfgBuilder::new().build_with(|f| {
//!     f.block(0, |b| {
//!         let x = b.arg(0, SemType::I32);
//!         let zero = b.const_i32(0);
//!         let c = b.cmp_lt(x, zero);
//!         b.branch(c, 1, 2);
//!     });
//!     f.block(1, |b| b.jump(3));
//!     f.block(2, |b| b.jump(3));
//!     f.block(3, |b| b.ret(None));
//! });
//! assert_eq!(cfg.node(cfg.block_node(3).unwrap()).preds().len(), 2);
//! ```
//!
//! Block 0 is the graph's entry node. Blocks are numbered by the caller; a
//! block referenced by an edge before it is defined is created on first
//! reference. Unconditional control flow is an edge, not an instruction.
//!
//! # Phis
//!
//! Phi sources name the predecessor block they flow from. They are aligned
//! with the target's incoming edges once every block is built, so a phi may
//! name values defined later. Pre-allocate such values with
//! [`CfgFunctionContext::temp`] and define them with
//! [`CfgBlockBuilder::define`].

use crate::{
    ir::{
        CmpKind, ControlFlowGraph, EdgeKind, InstFlags, InstId, MarkerKind, NodeKind, Opcode,
        OperandId, SemType, Slot,
    },
    utils::graph::NodeId,
};

struct PendingPhi {
    inst: InstId,
    node: NodeId,
    sources: Vec<(usize, OperandId)>,
}

/// Builder for constructing control flow graphs programmatically.
pub struct CfgBuilder {
    cfg: ControlFlowGraph,
    phis: Vec<PendingPhi>,
}

impl Default for CfgBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CfgBuilder {
    /// Creates a builder for an empty method.
    #[must_use]
    pub fn new() -> Self {
        let mut cfg = ControlFlowGraph::new();
        let entry = cfg.entry();
        cfg.name_block(0, entry);
        cfg.set_exec_count(entry, 1.0);
        CfgBuilder {
            cfg,
            phis: Vec::new(),
        }
    }

    /// Builds the graph using a closure that defines all blocks.
    ///
    /// # Arguments
    ///
    /// * `f` - A closure that receives a [`CfgFunctionContext`] for defining blocks
    ///
    /// # Returns
    ///
    /// The constructed [`ControlFlowGraph`].
    pub fn build_with<F>(mut self, f: F) -> ControlFlowGraph
    where
        F: FnOnce(&mut CfgFunctionContext<'_>),
    {
        let mut ctx = CfgFunctionContext { builder: &mut self };
        f(&mut ctx);
        self.finish()
    }

    fn node_for(&mut self, index: usize) -> NodeId {
        if let Some(node) = self.cfg.block_node(index) {
            return node;
        }
        let node = self.cfg.new_node(NodeKind::Block);
        self.cfg.set_exec_count(node, 1.0);
        self.cfg.name_block(index, node);
        node
    }

    /// Aligns every phi's sources with its node's incoming edges.
    fn finish(mut self) -> ControlFlowGraph {
        for pending in std::mem::take(&mut self.phis) {
            let mut remaining = pending.sources;
            let preds: Vec<NodeId> = self
                .cfg
                .node(pending.node)
                .preds()
                .iter()
                .map(|&e| self.cfg.edge(e).source())
                .collect();
            for pred in preds {
                let position = remaining
                    .iter()
                    .position(|&(block, _)| self.cfg.block_node(block) == Some(pred));
                if let Some(position) = position {
                    let (_, value) = remaining.remove(position);
                    self.cfg.push_slot(pending.inst, Slot::use_of(value));
                }
            }
        }
        self.cfg
    }
}

/// Context passed to the build closure for defining blocks.
pub struct CfgFunctionContext<'a> {
    builder: &'a mut CfgBuilder,
}

impl CfgFunctionContext<'_> {
    /// Defines an ordinary block with the given number.
    pub fn block<F>(&mut self, index: usize, f: F)
    where
        F: FnOnce(&mut CfgBlockBuilder<'_>),
    {
        let node = self.builder.node_for(index);
        let mut block = CfgBlockBuilder {
            builder: self.builder,
            node,
        };
        f(&mut block);
    }

    /// Defines an exception dispatch node with the given number.
    pub fn dispatch<F>(&mut self, index: usize, f: F)
    where
        F: FnOnce(&mut CfgBlockBuilder<'_>),
    {
        let node = self.builder.node_for(index);
        self.builder.cfg.set_node_kind(node, NodeKind::Dispatch);
        self.block(index, f);
    }

    /// Allocates an SSA temporary to be defined later with
    /// [`CfgBlockBuilder::define`].
    #[must_use]
    pub fn temp(&mut self, ty: SemType) -> OperandId {
        self.builder.cfg.new_temp(ty)
    }

    /// Declares a plain variable.
    #[must_use]
    pub fn variable(&mut self, ty: SemType) -> OperandId {
        self.builder.cfg.new_variable(ty)
    }

    /// Allocates a new SSA version of a plain variable.
    #[must_use]
    pub fn ssa_var(&mut self, var: OperandId) -> OperandId {
        self.builder.cfg.new_ssa_var(var)
    }

    /// Marks the operand holding the method's return value.
    pub fn return_operand(&mut self, operand: OperandId) {
        self.builder.cfg.set_return_operand(Some(operand));
    }
}

/// Builder for the contents of a single block.
///
/// Operations that produce values allocate and return a fresh temporary.
pub struct CfgBlockBuilder<'a> {
    builder: &'a mut CfgBuilder,
    node: NodeId,
}

impl CfgBlockBuilder<'_> {
    /// Returns the node being built.
    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }

    fn cfg(&mut self) -> &mut ControlFlowGraph {
        &mut self.builder.cfg
    }

    /// Appends an instruction with the given destination and sources.
    pub fn emit(
        &mut self,
        opcode: Opcode,
        dst: Option<OperandId>,
        srcs: &[OperandId],
        flags: InstFlags,
    ) -> InstId {
        let mut slots = Vec::with_capacity(srcs.len() + 1);
        slots.extend(dst.map(Slot::def_of));
        slots.extend(srcs.iter().map(|&s| Slot::use_of(s)));
        let node = self.node;
        let cfg = self.cfg();
        let inst = cfg.new_inst(opcode, slots, flags);
        cfg.append(node, inst);
        inst
    }

    /// Defines a pre-allocated operand: `dst = opcode(srcs)`.
    pub fn define(&mut self, opcode: Opcode, dst: OperandId, srcs: &[OperandId]) -> InstId {
        self.emit(opcode, Some(dst), srcs, InstFlags::empty())
    }

    fn value(&mut self, opcode: Opcode, ty: SemType, srcs: &[OperandId]) -> OperandId {
        let dst = self.cfg().new_temp(ty);
        self.define(opcode, dst, srcs);
        dst
    }

    fn ty_of(&self, operand: OperandId) -> SemType {
        self.builder.cfg.operand(operand).ty()
    }

    fn edge_to(&mut self, target: usize, kind: EdgeKind, prob: f64) {
        let node = self.node;
        let target = self.builder.node_for(target);
        self.cfg().add_edge(node, target, kind, prob);
    }

    /// Sets the execution count estimate of this block.
    pub fn exec_count(&mut self, count: f64) {
        let node = self.node;
        self.cfg().set_exec_count(node, count);
    }

    /// Adds: `dst = phi(sources)`, each source tagged with its predecessor
    /// block.
    pub fn phi(&mut self, ty: SemType, sources: &[(usize, OperandId)]) -> OperandId {
        let dst = self.cfg().new_temp(ty);
        self.phi_into(dst, sources);
        dst
    }

    /// Adds a phi defining a pre-allocated operand.
    pub fn phi_into(&mut self, dst: OperandId, sources: &[(usize, OperandId)]) -> InstId {
        let node = self.node;
        let cfg = self.cfg();
        let inst = cfg.new_phi(node, dst, &[]);
        self.builder.phis.push(PendingPhi {
            inst,
            node,
            sources: sources.to_vec(),
        });
        inst
    }

    /// Adds: `dst = arg n`
    pub fn arg(&mut self, index: u32, ty: SemType) -> OperandId {
        self.value(Opcode::Arg(index), ty, &[])
    }

    /// Adds: `dst = const` of the given type.
    pub fn iconst(&mut self, ty: SemType, value: i64) -> OperandId {
        self.value(Opcode::Const(value), ty, &[])
    }

    /// Adds: `dst = const i32`
    pub fn const_i32(&mut self, value: i32) -> OperandId {
        self.iconst(SemType::I32, i64::from(value))
    }

    /// Adds: `dst = const i64`
    pub fn const_i64(&mut self, value: i64) -> OperandId {
        self.iconst(SemType::I64, value)
    }

    /// Adds: `dst = src`
    pub fn copy(&mut self, src: OperandId) -> OperandId {
        let ty = self.ty_of(src);
        self.value(Opcode::Copy, ty, &[src])
    }

    /// Adds a copy whose destination has a different type, such as an
    /// object reference reinterpreted as an interior pointer.
    pub fn copy_as(&mut self, ty: SemType, src: OperandId) -> OperandId {
        self.value(Opcode::Copy, ty, &[src])
    }

    fn binary(&mut self, opcode: Opcode, a: OperandId, b: OperandId) -> OperandId {
        let ty = self.ty_of(a);
        self.value(opcode, ty, &[a, b])
    }

    /// Adds: `dst = a + b`
    pub fn add(&mut self, a: OperandId, b: OperandId) -> OperandId {
        self.binary(Opcode::Add, a, b)
    }

    /// Adds: `dst = a - b`
    pub fn sub(&mut self, a: OperandId, b: OperandId) -> OperandId {
        self.binary(Opcode::Sub, a, b)
    }

    /// Adds: `dst = a * b`
    pub fn mul(&mut self, a: OperandId, b: OperandId) -> OperandId {
        self.binary(Opcode::Mul, a, b)
    }

    /// Adds: `dst = a / b`
    pub fn div(&mut self, a: OperandId, b: OperandId) -> OperandId {
        self.binary(Opcode::Div, a, b)
    }

    /// Adds: `dst = a % b`
    pub fn rem(&mut self, a: OperandId, b: OperandId) -> OperandId {
        self.binary(Opcode::Rem, a, b)
    }

    /// Adds: `dst = a & b`
    pub fn and(&mut self, a: OperandId, b: OperandId) -> OperandId {
        self.binary(Opcode::And, a, b)
    }

    /// Adds: `dst = a | b`
    pub fn or(&mut self, a: OperandId, b: OperandId) -> OperandId {
        self.binary(Opcode::Or, a, b)
    }

    /// Adds: `dst = a ^ b`
    pub fn xor(&mut self, a: OperandId, b: OperandId) -> OperandId {
        self.binary(Opcode::Xor, a, b)
    }

    /// Adds: `dst = a << b`
    pub fn shl(&mut self, a: OperandId, b: OperandId) -> OperandId {
        self.binary(Opcode::Shl, a, b)
    }

    /// Adds: `dst = a >> b`
    pub fn shr(&mut self, a: OperandId, b: OperandId) -> OperandId {
        self.binary(Opcode::Shr, a, b)
    }

    /// Adds: `dst = -a`
    pub fn neg(&mut self, a: OperandId) -> OperandId {
        let ty = self.ty_of(a);
        self.value(Opcode::Neg, ty, &[a])
    }

    /// Adds: `dst = !a`
    pub fn not(&mut self, a: OperandId) -> OperandId {
        let ty = self.ty_of(a);
        self.value(Opcode::Not, ty, &[a])
    }

    /// Adds: `dst = (ty) src`
    pub fn conv(&mut self, ty: SemType, src: OperandId, overflow: bool) -> OperandId {
        self.value(Opcode::Conv { overflow }, ty, &[src])
    }

    /// Adds: `dst = a <kind> b` producing an `i32` flag.
    pub fn cmp(&mut self, kind: CmpKind, a: OperandId, b: OperandId) -> OperandId {
        self.value(Opcode::Cmp(kind), SemType::I32, &[a, b])
    }

    /// Adds: `dst = a == b`
    pub fn cmp_eq(&mut self, a: OperandId, b: OperandId) -> OperandId {
        self.cmp(CmpKind::Eq, a, b)
    }

    /// Adds: `dst = a < b`
    pub fn cmp_lt(&mut self, a: OperandId, b: OperandId) -> OperandId {
        self.cmp(CmpKind::Lt, a, b)
    }

    /// Adds: `dst = cond ? a : b`
    pub fn select(&mut self, cond: OperandId, a: OperandId, b: OperandId) -> OperandId {
        let ty = self.ty_of(a);
        self.value(Opcode::Select, ty, &[cond, a, b])
    }

    /// Adds: `dst = base + index * scale + disp` as an interior pointer.
    pub fn lea(
        &mut self,
        base: OperandId,
        index: Option<OperandId>,
        scale: i64,
        disp: i64,
    ) -> OperandId {
        let mut srcs = vec![base];
        srcs.extend(index);
        self.value(Opcode::Lea { scale, disp }, SemType::ManagedPtr, &srcs)
    }

    /// Adds: `dst = &static field`
    pub fn ld_static_addr(&mut self, field: u32) -> OperandId {
        self.value(Opcode::LdStaticAddr(field), SemType::ManagedPtr, &[])
    }

    /// Adds: `dst = new class`
    pub fn new_object(&mut self, class: u32) -> OperandId {
        self.value(Opcode::New(class), SemType::Object, &[])
    }

    /// Adds: `dst = obj.field`
    pub fn ld_field(&mut self, ty: SemType, obj: OperandId, field: u32) -> OperandId {
        self.value(Opcode::LdField(field), ty, &[obj])
    }

    /// Adds: `obj.field = value`
    pub fn st_field(&mut self, obj: OperandId, field: u32, value: OperandId) -> InstId {
        self.emit(Opcode::StField(field), None, &[obj, value], InstFlags::empty())
    }

    /// Adds: `dst = *ptr`
    pub fn ld_ind(&mut self, ty: SemType, ptr: OperandId) -> OperandId {
        self.value(Opcode::LdInd, ty, &[ptr])
    }

    /// Adds: `*ptr = value`
    pub fn st_ind(&mut self, ptr: OperandId, value: OperandId) -> InstId {
        self.emit(Opcode::StInd, None, &[ptr, value], InstFlags::empty())
    }

    /// Adds: `dst = var`
    pub fn ldvar(&mut self, var: OperandId) -> OperandId {
        let ty = self.ty_of(var);
        self.value(Opcode::LdVar, ty, &[var])
    }

    /// Adds: `var = value`
    pub fn stvar(&mut self, var: OperandId, value: OperandId) -> InstId {
        let node = self.node;
        let cfg = self.cfg();
        let inst = cfg.new_inst(
            Opcode::StVar,
            vec![Slot::def_of(var), Slot::use_of(value)],
            InstFlags::empty(),
        );
        cfg.append(node, inst);
        inst
    }

    /// Adds a call; returns the result operand for non-void calls.
    pub fn call(&mut self, method: u32, args: &[OperandId], ret: SemType) -> Option<OperandId> {
        if ret == SemType::Void {
            self.emit(Opcode::Call(method), None, args, InstFlags::empty());
            None
        } else {
            Some(self.value(Opcode::Call(method), ret, args))
        }
    }

    /// Marks the last instruction as throwing and adds a dispatch edge to
    /// `handler`. The block must end here apart from its outgoing edges.
    pub fn may_throw(&mut self, handler: usize) {
        let node = self.node;
        if let Some(last) = self.builder.cfg.node(node).last() {
            let flags = self.builder.cfg.inst(last).flags() | InstFlags::CAN_THROW;
            self.cfg().set_flags(last, flags);
        }
        self.edge_to(handler, EdgeKind::Dispatch, 0.0);
    }

    /// Adds: `throw value` with a dispatch edge to `handler`.
    pub fn throw(&mut self, value: OperandId, handler: usize) {
        self.emit(Opcode::Throw, None, &[value], InstFlags::CAN_THROW);
        self.edge_to(handler, EdgeKind::Dispatch, 1.0);
    }

    /// Adds a GC safe point.
    pub fn safepoint(&mut self) -> InstId {
        self.emit(Opcode::SafePoint, None, &[], InstFlags::SAFE_POINT)
    }

    /// Adds a method boundary marker keeping `values` visible.
    pub fn marker(&mut self, kind: MarkerKind, values: &[OperandId]) -> InstId {
        self.emit(Opcode::MethodMarker(kind), None, values, InstFlags::empty())
    }

    /// Adds: `monitor enter obj`
    pub fn monitor_enter(&mut self, obj: OperandId) -> InstId {
        self.emit(Opcode::MonitorEnter, None, &[obj], InstFlags::empty())
    }

    /// Ends the block with an unconditional edge.
    pub fn jump(&mut self, target: usize) {
        self.edge_to(target, EdgeKind::Unconditional, 1.0);
    }

    /// Ends the block with a conditional branch.
    pub fn branch(&mut self, cond: OperandId, if_true: usize, if_false: usize) {
        self.branch_weighted(cond, if_true, if_false, 0.5);
    }

    /// Ends the block with a conditional branch taken with probability
    /// `prob`.
    pub fn branch_weighted(&mut self, cond: OperandId, if_true: usize, if_false: usize, prob: f64) {
        self.emit(Opcode::Branch, None, &[cond], InstFlags::empty());
        self.edge_to(if_true, EdgeKind::True, prob);
        self.edge_to(if_false, EdgeKind::False, 1.0 - prob);
    }

    /// Ends the block with a switch over `targets`.
    pub fn switch(&mut self, selector: OperandId, targets: &[usize]) {
        self.emit(Opcode::Switch, None, &[selector], InstFlags::empty());
        #[allow(clippy::cast_precision_loss)]
        let prob = 1.0 / targets.len().max(1) as f64;
        for (case, &target) in (0u32..).zip(targets) {
            self.edge_to(target, EdgeKind::Switch(case), prob);
        }
    }

    /// Ends the block with a return to the graph's return node.
    pub fn ret(&mut self, value: Option<OperandId>) {
        let srcs: Vec<OperandId> = value.into_iter().collect();
        self.emit(Opcode::Return, None, &srcs, InstFlags::empty());
        let node = self.node;
        let cfg = self.cfg();
        let ret = cfg.ensure_return_node();
        cfg.add_edge(node, ret, EdgeKind::Unconditional, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::graph::{Predecessors, Successors};

    #[test]
    fn test_entry_is_block_zero() {
        let cfg = CfgBuilder::new().build_with(|f| {
            f.block(0, |b| b.ret(None));
        });
        assert_eq!(cfg.block_node(0), Some(cfg.entry()));
        let ret = cfg.return_node().unwrap();
        assert_eq!(cfg.successors(cfg.entry()).collect::<Vec<_>>(), vec![ret]);
        assert_eq!(cfg.successors(ret).collect::<Vec<_>>(), vec![cfg.exit()]);
    }

    #[test]
    fn test_forward_references_create_blocks() {
        let cfg = CfgBuilder::new().build_with(|f| {
            f.block(0, |b| b.jump(5));
            f.block(5, |b| b.ret(None));
        });
        let b5 = cfg.block_node(5).unwrap();
        assert_eq!(cfg.predecessors(b5).collect::<Vec<_>>(), vec![cfg.entry()]);
        assert!(cfg.block_node(3).is_none());
    }

    #[test]
    fn test_phi_sources_follow_edge_order() {
        let mut phi_dst = None;
        let mut inputs = Vec::new();
        let cfg = CfgBuilder::new().build_with(|f| {
            let late = f.temp(SemType::I32);
            f.block(0, |b| {
                let c = b.const_i32(1);
                b.branch(c, 2, 1);
            });
            f.block(1, |b| {
                b.define(Opcode::Const(7), late, &[]);
                b.jump(3);
            });
            f.block(2, |b| {
                let v = b.const_i32(9);
                inputs.push(v);
                b.jump(3);
            });
            f.block(3, |b| {
                // Listed against edge order; alignment happens at finish.
                phi_dst = Some(b.phi(SemType::I32, &[(2, inputs[0]), (1, late)]));
                b.ret(phi_dst);
            });
            inputs.push(late);
        });

        let b3 = cfg.block_node(3).unwrap();
        let phi = cfg.phis(b3)[0];
        let preds: Vec<NodeId> = cfg.predecessors(b3).collect();
        assert_eq!(preds, vec![cfg.block_node(1).unwrap(), cfg.block_node(2).unwrap()]);
        assert_eq!(cfg.inst(phi).phi_sources(), vec![inputs[1], inputs[0]]);
        assert_eq!(cfg.inst(phi).dst(), phi_dst);
    }

    #[test]
    fn test_throw_adds_dispatch_edge() {
        let cfg = CfgBuilder::new().build_with(|f| {
            f.block(0, |b| {
                let o = b.new_object(3);
                b.throw(o, 1);
            });
            f.dispatch(1, |b| b.ret(None));
        });
        let handler = cfg.block_node(1).unwrap();
        assert_eq!(cfg.node(handler).kind(), NodeKind::Dispatch);
        let edge = cfg.dispatch_edge(cfg.entry()).unwrap();
        assert_eq!(cfg.edge(edge).target(), handler);
        assert!(cfg.throwing_tail(cfg.entry()).is_some());
    }
}
