//! Instructions and their operand slots.

use bitflags::bitflags;

use crate::{
    ir::{Opcode, OperandId, PointerFact},
    utils::{graph::NodeId, id::define_id},
};

define_id!(
    /// Identifier of an instruction in the compilation arena.
    InstId,
    "i"
);

/// How an instruction accesses the operand in a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// The operand is read.
    Use,
    /// The operand is written.
    Def,
    /// The operand is read and then written.
    UseDef,
}

impl Role {
    /// Returns `true` if the slot reads its operand.
    #[must_use]
    pub const fn is_use(self) -> bool {
        matches!(self, Role::Use | Role::UseDef)
    }

    /// Returns `true` if the slot writes its operand.
    #[must_use]
    pub const fn is_def(self) -> bool {
        matches!(self, Role::Def | Role::UseDef)
    }
}

/// An operand reference tagged with its role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot {
    /// The referenced operand.
    pub operand: OperandId,
    /// How the operand is accessed.
    pub role: Role,
}

impl Slot {
    /// A read slot.
    #[must_use]
    pub const fn use_of(operand: OperandId) -> Self {
        Slot {
            operand,
            role: Role::Use,
        }
    }

    /// A write slot.
    #[must_use]
    pub const fn def_of(operand: OperandId) -> Self {
        Slot {
            operand,
            role: Role::Def,
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// Per-instruction properties
    pub struct InstFlags : u8 {
        /// The instruction may raise an exception; it must be the last of its
        /// node and the node must have a dispatch edge.
        const CAN_THROW = 0x01;
        /// The garbage collector may run at this instruction.
        const SAFE_POINT = 0x02;
    }
}

/// A single IR instruction.
///
/// Instructions of a node form a doubly linked list through `prev`/`next`.
/// Detached instructions have no node and are not part of any list.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub(crate) opcode: Opcode,
    pub(crate) slots: Vec<Slot>,
    pub(crate) flags: InstFlags,
    pub(crate) node: Option<NodeId>,
    pub(crate) prev: Option<InstId>,
    pub(crate) next: Option<InstId>,
    pub(crate) removed: bool,
    pub(crate) gc_facts: Option<Vec<PointerFact>>,
}

impl Instruction {
    pub(crate) fn new(opcode: Opcode, slots: Vec<Slot>, flags: InstFlags) -> Self {
        Instruction {
            opcode,
            slots,
            flags,
            node: None,
            prev: None,
            next: None,
            removed: false,
            gc_facts: None,
        }
    }

    /// Returns the opcode.
    #[must_use]
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// Returns all operand slots in layout order.
    #[must_use]
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Returns the instruction flags.
    #[must_use]
    pub fn flags(&self) -> InstFlags {
        self.flags
    }

    /// Returns the containing node, or `None` for detached instructions.
    #[must_use]
    pub fn node(&self) -> Option<NodeId> {
        self.node
    }

    /// Returns the previous instruction in the node.
    #[must_use]
    pub fn prev(&self) -> Option<InstId> {
        self.prev
    }

    /// Returns the next instruction in the node.
    #[must_use]
    pub fn next(&self) -> Option<InstId> {
        self.next
    }

    /// Returns `true` once the instruction was unlinked for good.
    #[must_use]
    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// Returns the first written operand.
    #[must_use]
    pub fn dst(&self) -> Option<OperandId> {
        self.slots
            .iter()
            .find(|s| s.role.is_def())
            .map(|s| s.operand)
    }

    /// Returns the read operands in slot order.
    pub fn srcs(&self) -> impl Iterator<Item = OperandId> + '_ {
        self.slots
            .iter()
            .filter(|s| s.role.is_use())
            .map(|s| s.operand)
    }

    /// Returns `(slot position, operand)` for every read slot.
    pub fn uses(&self) -> impl Iterator<Item = (usize, OperandId)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.role.is_use())
            .map(|(pos, s)| (pos, s.operand))
    }

    /// Returns the `n`-th read operand.
    #[must_use]
    pub fn src(&self, n: usize) -> Option<OperandId> {
        self.srcs().nth(n)
    }

    /// Returns `true` for phi instructions.
    #[must_use]
    pub fn is_phi(&self) -> bool {
        self.opcode == Opcode::Phi
    }

    /// Returns `true` for labels.
    #[must_use]
    pub fn is_label(&self) -> bool {
        self.opcode == Opcode::Label
    }

    /// Returns `true` if the instruction may raise an exception.
    #[must_use]
    pub fn can_throw(&self) -> bool {
        self.flags.contains(InstFlags::CAN_THROW)
    }

    /// Returns `true` if the instruction is a GC safe point.
    #[must_use]
    pub fn is_safe_point(&self) -> bool {
        self.flags.contains(InstFlags::SAFE_POINT)
    }

    /// Returns the pointer facts recorded for this safe point, if any.
    #[must_use]
    pub fn gc_facts(&self) -> Option<&[PointerFact]> {
        self.gc_facts.as_deref()
    }

    /// Returns the sources of a phi, one per incoming edge.
    #[must_use]
    pub fn phi_sources(&self) -> Vec<OperandId> {
        if self.is_phi() {
            self.srcs().collect()
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_accessors() {
        let inst = Instruction::new(
            Opcode::Add,
            vec![
                Slot::def_of(OperandId::new(3)),
                Slot::use_of(OperandId::new(1)),
                Slot::use_of(OperandId::new(2)),
            ],
            InstFlags::empty(),
        );
        assert_eq!(inst.dst(), Some(OperandId::new(3)));
        assert_eq!(
            inst.srcs().collect::<Vec<_>>(),
            vec![OperandId::new(1), OperandId::new(2)]
        );
        assert_eq!(
            inst.uses().map(|(pos, _)| pos).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(inst.src(1), Some(OperandId::new(2)));
        assert!(inst.phi_sources().is_empty());
    }

    #[test]
    fn test_use_def_slot_counts_both_ways() {
        let slot = Slot {
            operand: OperandId::new(0),
            role: Role::UseDef,
        };
        assert!(slot.role.is_use());
        assert!(slot.role.is_def());
    }

    #[test]
    fn test_flags() {
        let inst = Instruction::new(
            Opcode::Call(1),
            Vec::new(),
            InstFlags::CAN_THROW | InstFlags::SAFE_POINT,
        );
        assert!(inst.can_throw());
        assert!(inst.is_safe_point());
        assert!(inst.gc_facts().is_none());
    }
}
