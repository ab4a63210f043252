//! Operands: typed values referenced by instruction slots.

use std::fmt;

use crate::{
    ir::{InstId, SemType},
    utils::id::define_id,
};

define_id!(
    /// Identifier of an operand in the compilation arena.
    OperandId,
    "v"
);

/// The storage class of an operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandKind {
    /// SSA temporary with exactly one defining instruction.
    Temp,
    /// SSA version of a plain variable. Several versions of the same variable
    /// may be live at once and are merged by phis.
    SsaVar {
        /// The plain variable this version belongs to.
        var: OperandId,
    },
    /// Mutable storage, written by `StVar` and read by `LdVar`. Has no single
    /// definition.
    Var,
}

/// A typed value.
///
/// SSA operands ([`OperandKind::Temp`] and [`OperandKind::SsaVar`]) record
/// their defining instruction once it is created. Plain variables never do.
#[derive(Debug, Clone, PartialEq)]
pub struct Operand {
    pub(crate) kind: OperandKind,
    pub(crate) ty: SemType,
    pub(crate) def: Option<InstId>,
}

impl Operand {
    /// Returns the storage class.
    #[must_use]
    pub fn kind(&self) -> OperandKind {
        self.kind
    }

    /// Returns the semantic type.
    #[must_use]
    pub fn ty(&self) -> SemType {
        self.ty
    }

    /// Returns the defining instruction of an SSA operand.
    #[must_use]
    pub fn def(&self) -> Option<InstId> {
        self.def
    }

    /// Returns `true` for SSA temporaries and SSA variables.
    #[must_use]
    pub fn is_ssa(&self) -> bool {
        !matches!(self.kind, OperandKind::Var)
    }

    /// Returns `true` for SSA temporaries.
    #[must_use]
    pub fn is_temp(&self) -> bool {
        matches!(self.kind, OperandKind::Temp)
    }

    /// Returns the backing plain variable of an SSA variable.
    #[must_use]
    pub fn backing_var(&self) -> Option<OperandId> {
        match self.kind {
            OperandKind::SsaVar { var } => Some(var),
            _ => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            OperandKind::Temp => write!(f, "tmp:{}", self.ty),
            OperandKind::SsaVar { var } => write!(f, "ssa({var}):{}", self.ty),
            OperandKind::Var => write!(f, "var:{}", self.ty),
        }
    }
}
