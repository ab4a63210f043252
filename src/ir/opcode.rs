//! Instruction opcodes.

use std::fmt;

/// Comparison predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpKind {
    /// Equal
    Eq,
    /// Not equal
    Ne,
    /// Signed less than
    Lt,
    /// Signed less or equal
    Le,
    /// Signed greater than
    Gt,
    /// Signed greater or equal
    Ge,
}

impl CmpKind {
    /// Returns the predicate that holds exactly when `self` does not.
    #[must_use]
    pub const fn negate(self) -> CmpKind {
        match self {
            CmpKind::Eq => CmpKind::Ne,
            CmpKind::Ne => CmpKind::Eq,
            CmpKind::Lt => CmpKind::Ge,
            CmpKind::Le => CmpKind::Gt,
            CmpKind::Gt => CmpKind::Le,
            CmpKind::Ge => CmpKind::Lt,
        }
    }
}

/// Kinds of method boundary markers left behind by inlining.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    /// Start of an inlined method body
    Entry,
    /// End of an inlined method body
    Exit,
}

/// The operation performed by an instruction, with its per-kind payload.
///
/// Operand slots follow a fixed layout per opcode: the defined operand (if
/// any) comes first, followed by the sources in the order listed on each
/// variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// First instruction of every node.
    Label,
    /// `dst = phi(v0, .., vn)`, one source per incoming edge.
    Phi,
    /// `dst = argument n`
    Arg(u32),
    /// `dst = immediate`
    Const(i64),
    /// `dst = src`
    Copy,
    /// `dst = load var`
    LdVar,
    /// `var = store value`; the variable is the defined slot.
    StVar,
    /// `dst = a + b`
    Add,
    /// `dst = a - b`
    Sub,
    /// `dst = a * b`
    Mul,
    /// `dst = a / b`
    Div,
    /// `dst = a % b`
    Rem,
    /// `dst = a & b`
    And,
    /// `dst = a | b`
    Or,
    /// `dst = a ^ b`
    Xor,
    /// `dst = a << b`
    Shl,
    /// `dst = a >> b`
    Shr,
    /// `dst = -a`
    Neg,
    /// `dst = !a`
    Not,
    /// `dst = (dst type) src`, optionally overflow checked.
    Conv {
        /// Whether the conversion traps on overflow.
        overflow: bool,
    },
    /// `dst = a <kind> b`
    Cmp(CmpKind),
    /// `dst = cond ? a : b`
    Select,
    /// `dst = base + index * scale + disp`; the index source is optional.
    Lea {
        /// Element size multiplier for the index.
        scale: i64,
        /// Constant byte displacement.
        disp: i64,
    },
    /// `dst = &static field`
    LdStaticAddr(u32),
    /// `dst = obj.field`
    LdField(u32),
    /// `obj.field = value`
    StField(u32),
    /// `dst = array[index]`
    LdElem,
    /// `array[index] = value`
    StElem,
    /// `static field = value`
    StStatic(u32),
    /// `dst = *ptr`
    LdInd,
    /// `*ptr = value`
    StInd,
    /// `dst = new object of class n`
    New(u32),
    /// `dst? = call method(args..)`
    Call(u32),
    /// `throw value`
    Throw,
    /// Acquire the monitor of an object.
    MonitorEnter,
    /// Release the monitor of an object.
    MonitorExit,
    /// Conditional branch on a boolean source; targets are the node's true
    /// and false edges.
    Branch,
    /// Multi-way branch on a selector; targets are the node's switch edges.
    Switch,
    /// Return, with an optional value.
    Return,
    /// Boundary of an inlined method; sources are values kept visible to the
    /// debugger.
    MethodMarker(MarkerKind),
    /// A point where the garbage collector may run.
    SafePoint,
}

impl Opcode {
    /// Returns `true` for instructions that must survive regardless of
    /// whether their result is used: control transfers, calls, memory writes
    /// other than plain variables, monitors and safe points.
    #[must_use]
    pub const fn is_essential(self) -> bool {
        matches!(
            self,
            Opcode::Branch
                | Opcode::Switch
                | Opcode::Return
                | Opcode::Throw
                | Opcode::Call(_)
                | Opcode::MonitorEnter
                | Opcode::MonitorExit
                | Opcode::SafePoint
                | Opcode::StField(_)
                | Opcode::StElem
                | Opcode::StStatic(_)
                | Opcode::StInd
        )
    }

    /// Returns `true` for instructions that end a node's control flow.
    #[must_use]
    pub const fn is_control(self) -> bool {
        matches!(
            self,
            Opcode::Branch | Opcode::Switch | Opcode::Return | Opcode::Throw
        )
    }

    /// Returns `true` for opcodes that produce a result slot.
    #[must_use]
    pub const fn has_def(self) -> bool {
        !matches!(
            self,
            Opcode::Label
                | Opcode::StField(_)
                | Opcode::StElem
                | Opcode::StStatic(_)
                | Opcode::StInd
                | Opcode::Throw
                | Opcode::MonitorEnter
                | Opcode::MonitorExit
                | Opcode::Branch
                | Opcode::Switch
                | Opcode::Return
                | Opcode::MethodMarker(_)
                | Opcode::SafePoint
        )
    }

    /// Short mnemonic used by dumps.
    #[must_use]
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Label => "label",
            Opcode::Phi => "phi",
            Opcode::Arg(_) => "arg",
            Opcode::Const(_) => "ldc",
            Opcode::Copy => "copy",
            Opcode::LdVar => "ldvar",
            Opcode::StVar => "stvar",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Div => "div",
            Opcode::Rem => "rem",
            Opcode::And => "and",
            Opcode::Or => "or",
            Opcode::Xor => "xor",
            Opcode::Shl => "shl",
            Opcode::Shr => "shr",
            Opcode::Neg => "neg",
            Opcode::Not => "not",
            Opcode::Conv { overflow: false } => "conv",
            Opcode::Conv { overflow: true } => "conv.ovf",
            Opcode::Cmp(_) => "cmp",
            Opcode::Select => "select",
            Opcode::Lea { .. } => "lea",
            Opcode::LdStaticAddr(_) => "ldsflda",
            Opcode::LdField(_) => "ldfld",
            Opcode::StField(_) => "stfld",
            Opcode::LdElem => "ldelem",
            Opcode::StElem => "stelem",
            Opcode::StStatic(_) => "stsfld",
            Opcode::LdInd => "ldind",
            Opcode::StInd => "stind",
            Opcode::New(_) => "new",
            Opcode::Call(_) => "call",
            Opcode::Throw => "throw",
            Opcode::MonitorEnter => "monenter",
            Opcode::MonitorExit => "monexit",
            Opcode::Branch => "branch",
            Opcode::Switch => "switch",
            Opcode::Return => "ret",
            Opcode::MethodMarker(MarkerKind::Entry) => "methodentry",
            Opcode::MethodMarker(MarkerKind::Exit) => "methodexit",
            Opcode::SafePoint => "safepoint",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Opcode::Arg(n) => write!(f, "arg {n}"),
            Opcode::Const(v) => write!(f, "ldc {v}"),
            Opcode::Cmp(kind) => write!(f, "cmp.{kind:?}"),
            Opcode::Lea { scale, disp } => write!(f, "lea *{scale}+{disp}"),
            Opcode::LdStaticAddr(n)
            | Opcode::LdField(n)
            | Opcode::StField(n)
            | Opcode::StStatic(n)
            | Opcode::New(n)
            | Opcode::Call(n) => write!(f, "{} #{n}", self.mnemonic()),
            _ => f.write_str(self.mnemonic()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_essential_set() {
        assert!(Opcode::Call(0).is_essential());
        assert!(Opcode::StField(1).is_essential());
        assert!(Opcode::SafePoint.is_essential());
        assert!(!Opcode::StVar.is_essential());
        assert!(!Opcode::Add.is_essential());
        assert!(!Opcode::MethodMarker(MarkerKind::Exit).is_essential());
    }

    #[test]
    fn test_control_and_def() {
        assert!(Opcode::Branch.is_control());
        assert!(!Opcode::Call(3).is_control());
        assert!(Opcode::StVar.has_def());
        assert!(!Opcode::StField(0).has_def());
        assert!(Opcode::Phi.has_def());
    }

    #[test]
    fn test_negate_is_involution() {
        for kind in [
            CmpKind::Eq,
            CmpKind::Ne,
            CmpKind::Lt,
            CmpKind::Le,
            CmpKind::Gt,
            CmpKind::Ge,
        ] {
            assert_eq!(kind.negate().negate(), kind);
            assert_ne!(kind.negate(), kind);
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(Opcode::Const(-3).to_string(), "ldc -3");
        assert_eq!(Opcode::Call(7).to_string(), "call #7");
        assert_eq!(Opcode::Conv { overflow: true }.to_string(), "conv.ovf");
    }
}
