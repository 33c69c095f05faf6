//! Barrel shifter and effective-address helpers.

use crate::decoder::{AddressingMode, MemoryOffset, Operand2, ShiftAmount, ShiftType};
use crate::state::{ArchitecturalState, Register};

/// Shifts `value` by `amount`, returning the result and the carry out.
///
/// An amount of zero leaves both the value and `carry_in` untouched. Amounts
/// of 32 and above follow the ARM out-of-range rules: `lsl`/`lsr` produce
/// zero, `asr` fills with the sign bit and `ror` rotates by `amount % 32`.
#[must_use]
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
pub const fn barrel_shift(value: u32, shift: ShiftType, amount: u32, carry_in: bool) -> (u32, bool) {
    if amount == 0 {
        return (value, carry_in);
    }
    let sign = value & 0x8000_0000 != 0;
    match shift {
        ShiftType::Lsl => match amount {
            1..=31 => (value << amount, (value >> (32 - amount)) & 1 != 0),
            32 => (0, value & 1 != 0),
            _ => (0, false),
        },
        ShiftType::Lsr => match amount {
            1..=31 => (value >> amount, (value >> (amount - 1)) & 1 != 0),
            32 => (0, sign),
            _ => (0, false),
        },
        ShiftType::Asr => {
            if amount < 32 {
                (((value as i32) >> amount) as u32, (value >> (amount - 1)) & 1 != 0)
            } else if sign {
                (u32::MAX, true)
            } else {
                (0, false)
            }
        }
        ShiftType::Ror => {
            let rotated = value.rotate_right(amount % 32);
            (rotated, rotated & 0x8000_0000 != 0)
        }
    }
}

/// Resolves a shift amount; register amounts use only their low byte.
#[must_use]
pub const fn shift_amount(amount: ShiftAmount, state: &ArchitecturalState) -> u32 {
    match amount {
        ShiftAmount::Immediate(imm) => imm as u32,
        ShiftAmount::Register(rs) => state.gpr(rs) & 0xFF,
    }
}

/// Evaluates operand2. The carry is `Some` only when a nonzero shift ran.
#[must_use]
pub const fn operand2_value(
    operand: Operand2,
    state: &ArchitecturalState,
    carry_in: bool,
) -> (u32, Option<bool>) {
    match operand {
        Operand2::Immediate(imm) => (imm, None),
        Operand2::ShiftedRegister { rm, shift, amount } => {
            let amount = shift_amount(amount, state);
            let (value, carry) = barrel_shift(state.gpr(rm), shift, amount, carry_in);
            if amount == 0 {
                (value, None)
            } else {
                (value, Some(carry))
            }
        }
    }
}

/// Access address and optional base write-back for a memory instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveAddress {
    /// Address the access uses.
    pub address: u32,
    /// New base register value, when the mode writes back.
    pub writeback: Option<(Register, u32)>,
}

/// Computes the effective address for `[rn, ±offset]` under `mode`.
#[must_use]
pub const fn compute_effective_address(
    mode: AddressingMode,
    rn: Register,
    offset: MemoryOffset,
    add: bool,
    state: &ArchitecturalState,
) -> EffectiveAddress {
    let base = state.gpr(rn);
    let offset = match offset {
        MemoryOffset::Immediate(imm) => imm as u32,
        MemoryOffset::Register(rm) => state.gpr(rm),
    };
    let offset_address = if add {
        base.wrapping_add(offset)
    } else {
        base.wrapping_sub(offset)
    };
    match mode {
        AddressingMode::Offset => EffectiveAddress {
            address: offset_address,
            writeback: None,
        },
        AddressingMode::PreIndexed => EffectiveAddress {
            address: offset_address,
            writeback: Some((rn, offset_address)),
        },
        AddressingMode::PostIndexed => EffectiveAddress {
            address: base,
            writeback: Some((rn, offset_address)),
        },
    }
}
