//! Pointer-base-offset facts attached to safe points.

use std::fmt;

use crate::ir::OperandId;

/// What a managed pointer is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FactBase {
    /// Interior pointer into the object held by this operand.
    Object(OperandId),
    /// Pointer into static storage; never relocated.
    Static,
}

/// Byte offset of a managed pointer from its base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Offset {
    /// Statically known displacement.
    Known(i64),
    /// Displacement varies at run time; the collector must recompute it.
    Unknown,
}

impl Offset {
    /// Adds a constant, keeping `Unknown` unknown.
    #[must_use]
    pub fn adjust(self, delta: i64) -> Offset {
        match self {
            Offset::Known(off) => Offset::Known(off.wrapping_add(delta)),
            Offset::Unknown => Offset::Unknown,
        }
    }
}

/// One (pointer, base, offset) triple live at a safe point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PointerFact {
    /// The interior pointer.
    pub pointer: OperandId,
    /// Its base.
    pub base: FactBase,
    /// Its offset from the base.
    pub offset: Offset,
}

impl fmt::Display for PointerFact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.base {
            FactBase::Object(base) => write!(f, "{} = {base}", self.pointer)?,
            FactBase::Static => write!(f, "{} = static", self.pointer)?,
        }
        match self.offset {
            Offset::Known(off) => write!(f, "+{off}"),
            Offset::Unknown => write!(f, "+?"),
        }
    }
}
