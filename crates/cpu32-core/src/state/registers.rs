/// Number of architecturally visible general-purpose registers (`r0..r15`).
pub const GENERAL_REGISTER_COUNT: usize = 16;
/// `FLAGS` bit for negative result.
pub const FLAG_N: u32 = 1 << 31;
/// `FLAGS` bit for zero result.
pub const FLAG_Z: u32 = 1 << 30;
/// `FLAGS` bit for carry / not-borrow.
pub const FLAG_C: u32 = 1 << 29;
/// `FLAGS` bit for signed overflow.
pub const FLAG_V: u32 = 1 << 28;
/// Mask of architecturally active `FLAGS` bits.
pub const FLAGS_ACTIVE_MASK: u32 = FLAG_N | FLAG_Z | FLAG_C | FLAG_V;

/// Architecturally visible general-purpose register identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Register {
    R0 = 0,
    R1 = 1,
    R2 = 2,
    R3 = 3,
    R4 = 4,
    R5 = 5,
    R6 = 6,
    R7 = 7,
    R8 = 8,
    R9 = 9,
    R10 = 10,
    R11 = 11,
    R12 = 12,
    R13 = 13,
    R14 = 14,
    R15 = 15,
}

impl Register {
    /// Stack pointer by calling convention.
    pub const SP: Self = Self::R13;
    /// Link register written by `bl`/`blx`.
    pub const LR: Self = Self::R14;

    /// Ordered list of all general-purpose registers.
    pub const ALL: [Self; GENERAL_REGISTER_COUNT] = [
        Self::R0,
        Self::R1,
        Self::R2,
        Self::R3,
        Self::R4,
        Self::R5,
        Self::R6,
        Self::R7,
        Self::R8,
        Self::R9,
        Self::R10,
        Self::R11,
        Self::R12,
        Self::R13,
        Self::R14,
        Self::R15,
    ];

    /// Returns the array index for this register (`0..=15`).
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Decodes a 4-bit register field.
    #[must_use]
    pub const fn from_u4(bits: u8) -> Option<Self> {
        if bits < 16 {
            Some(Self::ALL[bits as usize])
        } else {
            None
        }
    }

    /// Decodes the 4-bit register field whose lowest bit sits at `shift`.
    #[must_use]
    pub const fn from_field(word: u32, shift: u32) -> Self {
        Self::ALL[((word >> shift) & 0xF) as usize]
    }

    /// Field value for encoding.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self as u32
    }
}

impl std::fmt::Display for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::R13 => f.write_str("sp"),
            Self::R14 => f.write_str("lr"),
            other => write!(f, "x{}", other.index()),
        }
    }
}

/// Full architectural register state: register file, program counter and flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ArchitecturalState {
    gpr: [u32; GENERAL_REGISTER_COUNT],
    pc: u32,
    flags: u32,
}

impl ArchitecturalState {
    /// Reads a general-purpose register.
    #[must_use]
    pub const fn gpr(&self, reg: Register) -> u32 {
        self.gpr[reg.index()]
    }

    /// Writes a general-purpose register.
    pub const fn set_gpr(&mut self, reg: Register, value: u32) {
        self.gpr[reg.index()] = value;
    }

    /// Reads the whole register file.
    #[must_use]
    pub const fn gprs(&self) -> &[u32; GENERAL_REGISTER_COUNT] {
        &self.gpr
    }

    /// Reads the `PC` register.
    #[must_use]
    pub const fn pc(&self) -> u32 {
        self.pc
    }

    /// Writes the `PC` register.
    pub const fn set_pc(&mut self, value: u32) {
        self.pc = value;
    }

    /// Reads the `FLAGS` register.
    #[must_use]
    pub const fn flags(&self) -> u32 {
        self.flags
    }

    /// Writes the `FLAGS` register; inactive bits are discarded.
    pub const fn set_flags(&mut self, value: u32) {
        self.flags = value & FLAGS_ACTIVE_MASK;
    }

    /// Returns `true` when a specific `FLAGS` bit is set.
    #[must_use]
    pub const fn flag_is_set(&self, flag: u32) -> bool {
        (self.flags & flag) != 0
    }

    /// Sets or clears a specific active `FLAGS` bit.
    pub const fn set_flag(&mut self, flag: u32, enabled: bool) {
        if enabled {
            self.flags |= flag & FLAGS_ACTIVE_MASK;
        } else {
            self.flags &= !(flag & FLAGS_ACTIVE_MASK);
        }
    }

    /// Restores every register and flag to zero.
    pub fn reset(&mut self) {
        self.gpr = [0; GENERAL_REGISTER_COUNT];
        self.pc = 0;
        self.flags = 0;
    }
}
