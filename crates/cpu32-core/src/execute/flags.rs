//! FLAGS update behaviors for different instruction classes.

use crate::state::{FLAGS_ACTIVE_MASK, FLAG_C, FLAG_N, FLAG_V, FLAG_Z};

/// Describes how FLAGS should be updated after an instruction executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlagsUpdate {
    /// No change to FLAGS.
    #[default]
    None,
    /// Update N and Z; C and V are preserved.
    Nz {
        /// Negative flag.
        negative: bool,
        /// Zero flag.
        zero: bool,
    },
    /// Update N, Z and C; V is preserved.
    NzCarry {
        /// Negative flag.
        negative: bool,
        /// Zero flag.
        zero: bool,
        /// Carry flag.
        carry: bool,
    },
    /// Update all four flags.
    Nzcv {
        /// Negative flag.
        negative: bool,
        /// Zero flag.
        zero: bool,
        /// Carry flag.
        carry: bool,
        /// Overflow flag.
        overflow: bool,
    },
}

impl FlagsUpdate {
    /// N/Z from a result, with C taken from the shifter when it produced one.
    #[must_use]
    pub const fn logical(result: u32, shifter_carry: Option<bool>) -> Self {
        match shifter_carry {
            Some(carry) => Self::NzCarry {
                negative: result & FLAG_N != 0,
                zero: result == 0,
                carry,
            },
            None => Self::Nz {
                negative: result & FLAG_N != 0,
                zero: result == 0,
            },
        }
    }

    /// N/Z from a result plus explicit C and V.
    #[must_use]
    pub const fn arithmetic(result: u32, carry: bool, overflow: bool) -> Self {
        Self::Nzcv {
            negative: result & FLAG_N != 0,
            zero: result == 0,
            carry,
            overflow,
        }
    }

    /// Applies this update to a FLAGS value.
    #[must_use]
    pub const fn apply(self, flags: u32) -> u32 {
        let (mask, set) = match self {
            Self::None => (0, 0),
            Self::Nz { negative, zero } => (FLAG_N | FLAG_Z, bit(FLAG_N, negative) | bit(FLAG_Z, zero)),
            Self::NzCarry {
                negative,
                zero,
                carry,
            } => (
                FLAG_N | FLAG_Z | FLAG_C,
                bit(FLAG_N, negative) | bit(FLAG_Z, zero) | bit(FLAG_C, carry),
            ),
            Self::Nzcv {
                negative,
                zero,
                carry,
                overflow,
            } => (
                FLAGS_ACTIVE_MASK,
                bit(FLAG_N, negative)
                    | bit(FLAG_Z, zero)
                    | bit(FLAG_C, carry)
                    | bit(FLAG_V, overflow),
            ),
        };
        ((flags & !mask) | set) & FLAGS_ACTIVE_MASK
    }
}

const fn bit(flag: u32, enabled: bool) -> u32 {
    if enabled {
        flag
    } else {
        0
    }
}

/// `a + b + carry_in` returning `(result, carry_out, signed_overflow)`.
///
/// Subtraction is `add_with_carry(a, !b, true)`, which makes the carry
/// output NOT borrow.
#[must_use]
pub const fn add_with_carry(a: u32, b: u32, carry_in: bool) -> (u32, bool, bool) {
    let (partial, carry_a) = a.overflowing_add(b);
    let (result, carry_b) = partial.overflowing_add(carry_in as u32);
    let overflow = ((a ^ result) & (b ^ result) & FLAG_N) != 0;
    (result, carry_a || carry_b, overflow)
}
