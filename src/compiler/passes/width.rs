//! Required bit widths of instruction operands.
//!
//! Dead code elimination tracks, for every live instruction, how many low bits
//! of its result are actually consumed (its *used width*). From that, this
//! table derives how many bits each source operand must deliver. The table is
//! a pure function of the consuming instruction and has no graph access.
//!
//! | consumer | source position | required width |
//! |---|---|---|
//! | add, sub, mul, and, or, xor, neg, not, copy, phi | any | `min(dst width, used width)` |
//! | shl, shr, div, rem, cmp | any | full source width |
//! | select | condition | full condition width |
//! | select | either value | `min(dst width, used width)` |
//! | conv | value | `min(used width, source width)` |
//! | anything else | any | full source width |

use crate::ir::{Opcode, SemType};

/// Returns the number of low bits source `position` of a consumer must
/// provide.
///
/// # Arguments
///
/// * `opcode` - The consuming instruction's opcode
/// * `dst_ty` - Type of the consumer's result, if it has one
/// * `used_width` - Bits of the consumer's result that are used
/// * `position` - Index of the source among the consumer's read operands
/// * `src_ty` - Type of the source operand
///
/// # Returns
///
/// A width between 1 and the source's full width.
#[must_use]
pub fn required_width(
    opcode: Opcode,
    dst_ty: Option<SemType>,
    used_width: u8,
    position: usize,
    src_ty: SemType,
) -> u8 {
    let full = src_ty.full_width();
    let narrowed = |dst: Option<SemType>| {
        let dst_width = dst.map_or(full, SemType::full_width);
        dst_width.min(used_width).clamp(1, full)
    };

    match opcode {
        Opcode::Add
        | Opcode::Sub
        | Opcode::Mul
        | Opcode::And
        | Opcode::Or
        | Opcode::Xor
        | Opcode::Neg
        | Opcode::Not
        | Opcode::Copy
        | Opcode::Phi => narrowed(dst_ty),
        Opcode::Select if position == 0 => full,
        Opcode::Select => narrowed(dst_ty),
        Opcode::Conv { .. } => used_width.min(full).max(1),
        Opcode::Shl | Opcode::Shr | Opcode::Div | Opcode::Rem | Opcode::Cmp(_) => full,
        _ => full,
    }
}

/// Returns `true` if a conversion can be replaced by a plain copy.
///
/// Only unchecked conversions between two different integer types qualify,
/// and only when no more bits are used than both types hold: the low
/// `used_width` bits are then identical before and after the conversion.
#[must_use]
pub fn conversion_is_redundant(
    opcode: Opcode,
    src_ty: SemType,
    dst_ty: SemType,
    used_width: u8,
) -> bool {
    let Opcode::Conv { overflow: false } = opcode else {
        return false;
    };
    if !src_ty.is_integer() || !dst_ty.is_integer() || src_ty == dst_ty {
        return false;
    }
    used_width <= src_ty.full_width().min(dst_ty.full_width())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::CmpKind;

    #[test]
    fn test_additive_operands_need_used_bits() {
        assert_eq!(
            required_width(Opcode::Add, Some(SemType::I32), 8, 0, SemType::I32),
            8
        );
        assert_eq!(
            required_width(Opcode::Mul, Some(SemType::I16), 32, 1, SemType::I32),
            16
        );
        assert_eq!(
            required_width(Opcode::Phi, Some(SemType::I64), 64, 2, SemType::I64),
            64
        );
    }

    #[test]
    fn test_shift_divide_compare_need_full_width() {
        for opcode in [
            Opcode::Shl,
            Opcode::Shr,
            Opcode::Div,
            Opcode::Rem,
            Opcode::Cmp(CmpKind::Lt),
        ] {
            assert_eq!(
                required_width(opcode, Some(SemType::I32), 1, 0, SemType::I64),
                64,
                "{opcode}"
            );
        }
    }

    #[test]
    fn test_select_condition_ignores_used_width() {
        assert_eq!(
            required_width(Opcode::Select, Some(SemType::I64), 8, 0, SemType::I32),
            32
        );
        assert_eq!(
            required_width(Opcode::Select, Some(SemType::I64), 8, 1, SemType::I64),
            8
        );
    }

    #[test]
    fn test_conversion_takes_smaller_of_used_and_source() {
        let conv = Opcode::Conv { overflow: false };
        assert_eq!(required_width(conv, Some(SemType::I64), 64, 0, SemType::I16), 16);
        assert_eq!(required_width(conv, Some(SemType::I8), 8, 0, SemType::I64), 8);
    }

    #[test]
    fn test_other_consumers_need_full_width() {
        assert_eq!(
            required_width(Opcode::StField(0), None, 1, 1, SemType::I32),
            32
        );
        assert_eq!(
            required_width(Opcode::StVar, Some(SemType::I16), 16, 0, SemType::I16),
            16
        );
        assert_eq!(
            required_width(Opcode::Call(2), None, 1, 0, SemType::Tau),
            1
        );
    }

    #[test]
    fn test_redundant_conversion() {
        let conv = Opcode::Conv { overflow: false };
        assert!(conversion_is_redundant(conv, SemType::I64, SemType::I32, 8));
        assert!(conversion_is_redundant(conv, SemType::I8, SemType::I32, 8));
        assert!(!conversion_is_redundant(conv, SemType::I8, SemType::I32, 32));
        assert!(!conversion_is_redundant(conv, SemType::I32, SemType::I32, 8));
        assert!(!conversion_is_redundant(conv, SemType::I32, SemType::F32, 8));
        assert!(!conversion_is_redundant(
            Opcode::Conv { overflow: true },
            SemType::I64,
            SemType::I32,
            8
        ));
    }
}
