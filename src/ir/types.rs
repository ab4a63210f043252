//! Semantic operand types.

use std::fmt;

use strum::{EnumCount, EnumIter};

/// The semantic type of an operand.
///
/// Integer and pointer types have a bit width, which the dead code eliminator
/// uses to narrow conversions. `Object` values are GC base references and
/// `ManagedPtr` values are interior pointers derived from them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount)]
pub enum SemType {
    /// 8-bit integer
    I8,
    /// 16-bit integer
    I16,
    /// 32-bit integer
    I32,
    /// 64-bit integer
    I64,
    /// Single precision float
    F32,
    /// Double precision float
    F64,
    /// Reference to the start of a heap object
    Object,
    /// Interior pointer into a heap object, or into static storage
    ManagedPtr,
    /// Raw pointer that the collector does not track
    UnmanagedPtr,
    /// Safety witness produced by checks and consumed by guarded operations
    Tau,
    /// No value
    Void,
}

impl SemType {
    /// Returns the width in bits for integer, pointer and float types.
    ///
    /// `Tau` and `Void` have no width.
    #[must_use]
    pub const fn width(self) -> Option<u8> {
        match self {
            SemType::I8 => Some(8),
            SemType::I16 => Some(16),
            SemType::I32 | SemType::F32 => Some(32),
            SemType::I64
            | SemType::F64
            | SemType::Object
            | SemType::ManagedPtr
            | SemType::UnmanagedPtr => Some(64),
            SemType::Tau | SemType::Void => None,
        }
    }

    /// Returns the width used when a value of this type is fully consumed.
    ///
    /// Widthless types report 1 so that "used" is still distinguishable from
    /// "dead" (width 0).
    #[must_use]
    pub const fn full_width(self) -> u8 {
        match self.width() {
            Some(w) => w,
            None => 1,
        }
    }

    /// Returns `true` for the fixed-width integer types.
    #[must_use]
    pub const fn is_integer(self) -> bool {
        matches!(self, SemType::I8 | SemType::I16 | SemType::I32 | SemType::I64)
    }

    /// Returns `true` for values the garbage collector must know about.
    #[must_use]
    pub const fn is_gc_tracked(self) -> bool {
        matches!(self, SemType::Object | SemType::ManagedPtr)
    }
}

impl fmt::Display for SemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SemType::I8 => "i8",
            SemType::I16 => "i16",
            SemType::I32 => "i32",
            SemType::I64 => "i64",
            SemType::F32 => "f32",
            SemType::F64 => "f64",
            SemType::Object => "obj",
            SemType::ManagedPtr => "mptr",
            SemType::UnmanagedPtr => "uptr",
            SemType::Tau => "tau",
            SemType::Void => "void",
        };
        f.write_str(name)
    }
}
