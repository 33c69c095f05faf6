/// Instruction formats, selected by the high nibble of the opcode byte (bits 31..28).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Format {
    Control = 0x0,
    DataProcessing = 0x1,
    SingleOperand = 0x2,
    Compare = 0x3,
    Shift = 0x4,
    Memory = 0x5,
    Atomic = 0x6,
    Branch = 0x7,
    FloatingPoint = 0x8,
}

impl Format {
    /// Converts a 4-bit group value into an assigned format.
    #[must_use]
    pub const fn from_u4(group: u8) -> Option<Self> {
        match group {
            0x0 => Some(Self::Control),
            0x1 => Some(Self::DataProcessing),
            0x2 => Some(Self::SingleOperand),
            0x3 => Some(Self::Compare),
            0x4 => Some(Self::Shift),
            0x5 => Some(Self::Memory),
            0x6 => Some(Self::Atomic),
            0x7 => Some(Self::Branch),
            0x8 => Some(Self::FloatingPoint),
            _ => None,
        }
    }
}

/// Every assigned opcode. Discriminants are dense so they can index the
/// execution handler table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Opcode {
    Nop,
    Hlt,
    Swi,
    Add,
    Adc,
    Sub,
    Sbc,
    Rsb,
    Rsc,
    And,
    Orr,
    Eor,
    Bic,
    Mul,
    Umulh,
    Smulh,
    Udiv,
    Sdiv,
    Mov,
    Mvn,
    Movt,
    Cmp,
    Cmn,
    Tst,
    Teq,
    Lsl,
    Lsr,
    Asr,
    Ror,
    Ldr,
    Ldrh,
    Ldrb,
    Ldrsh,
    Ldrsb,
    Str,
    Strh,
    Strb,
    Swp,
    Swpb,
    B,
    Bl,
    Bx,
    Blx,
    VaddF32,
    VsubF32,
    VmulF32,
    VdivF32,
    VcmpF32,
    VcvtF32S32,
    VcvtS32F32,
}

/// Number of assigned opcodes.
pub const OPCODE_COUNT: usize = 50;

/// Single source-of-truth opcode table: `(opcode byte, opcode)`.
///
/// Any opcode byte not present here is invalid by definition.
pub const OPCODE_TABLE: [(u8, Opcode); OPCODE_COUNT] = [
    (0x00, Opcode::Nop),
    (0x01, Opcode::Hlt),
    (0x02, Opcode::Swi),
    (0x10, Opcode::Add),
    (0x11, Opcode::Adc),
    (0x12, Opcode::Sub),
    (0x13, Opcode::Sbc),
    (0x14, Opcode::Rsb),
    (0x15, Opcode::Rsc),
    (0x16, Opcode::And),
    (0x17, Opcode::Orr),
    (0x18, Opcode::Eor),
    (0x19, Opcode::Bic),
    (0x1A, Opcode::Mul),
    (0x1B, Opcode::Umulh),
    (0x1C, Opcode::Smulh),
    (0x1D, Opcode::Udiv),
    (0x1E, Opcode::Sdiv),
    (0x20, Opcode::Mov),
    (0x21, Opcode::Mvn),
    (0x22, Opcode::Movt),
    (0x30, Opcode::Cmp),
    (0x31, Opcode::Cmn),
    (0x32, Opcode::Tst),
    (0x33, Opcode::Teq),
    (0x40, Opcode::Lsl),
    (0x41, Opcode::Lsr),
    (0x42, Opcode::Asr),
    (0x43, Opcode::Ror),
    (0x50, Opcode::Ldr),
    (0x51, Opcode::Ldrh),
    (0x52, Opcode::Ldrb),
    (0x53, Opcode::Ldrsh),
    (0x54, Opcode::Ldrsb),
    (0x55, Opcode::Str),
    (0x56, Opcode::Strh),
    (0x57, Opcode::Strb),
    (0x60, Opcode::Swp),
    (0x61, Opcode::Swpb),
    (0x70, Opcode::B),
    (0x71, Opcode::Bl),
    (0x72, Opcode::Bx),
    (0x73, Opcode::Blx),
    (0x80, Opcode::VaddF32),
    (0x81, Opcode::VsubF32),
    (0x82, Opcode::VmulF32),
    (0x83, Opcode::VdivF32),
    (0x84, Opcode::VcmpF32),
    (0x85, Opcode::VcvtF32S32),
    (0x86, Opcode::VcvtS32F32),
];

const fn build_opcode_lookup() -> [Option<Opcode>; 256] {
    let mut lookup = [None; 256];
    let mut index = 0;
    while index < OPCODE_TABLE.len() {
        let (byte, opcode) = OPCODE_TABLE[index];
        assert!(lookup[byte as usize].is_none(), "duplicate opcode byte");
        assert!(opcode as usize == index, "opcode table out of order");
        lookup[byte as usize] = Some(opcode);
        index += 1;
    }
    lookup
}

static OPCODE_LOOKUP: [Option<Opcode>; 256] = build_opcode_lookup();

impl Opcode {
    /// Dense index of this opcode (`0..OPCODE_COUNT`).
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Opcode byte (bits 31..24 of the instruction word).
    #[must_use]
    pub const fn byte(self) -> u8 {
        OPCODE_TABLE[self.index()].0
    }

    /// Format this opcode's operands are laid out in.
    #[must_use]
    pub const fn format(self) -> Format {
        match self {
            Self::Nop | Self::Hlt | Self::Swi => Format::Control,
            Self::Add
            | Self::Adc
            | Self::Sub
            | Self::Sbc
            | Self::Rsb
            | Self::Rsc
            | Self::And
            | Self::Orr
            | Self::Eor
            | Self::Bic
            | Self::Mul
            | Self::Umulh
            | Self::Smulh
            | Self::Udiv
            | Self::Sdiv => Format::DataProcessing,
            Self::Mov | Self::Mvn | Self::Movt => Format::SingleOperand,
            Self::Cmp | Self::Cmn | Self::Tst | Self::Teq => Format::Compare,
            Self::Lsl | Self::Lsr | Self::Asr | Self::Ror => Format::Shift,
            Self::Ldr
            | Self::Ldrh
            | Self::Ldrb
            | Self::Ldrsh
            | Self::Ldrsb
            | Self::Str
            | Self::Strh
            | Self::Strb => Format::Memory,
            Self::Swp | Self::Swpb => Format::Atomic,
            Self::B | Self::Bl | Self::Bx | Self::Blx => Format::Branch,
            Self::VaddF32
            | Self::VsubF32
            | Self::VmulF32
            | Self::VdivF32
            | Self::VcmpF32
            | Self::VcvtF32S32
            | Self::VcvtS32F32 => Format::FloatingPoint,
        }
    }

    /// Assembly mnemonic.
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Nop => "nop",
            Self::Hlt => "hlt",
            Self::Swi => "swi",
            Self::Add => "add",
            Self::Adc => "adc",
            Self::Sub => "sub",
            Self::Sbc => "sbc",
            Self::Rsb => "rsb",
            Self::Rsc => "rsc",
            Self::And => "and",
            Self::Orr => "orr",
            Self::Eor => "eor",
            Self::Bic => "bic",
            Self::Mul => "mul",
            Self::Umulh => "umulh",
            Self::Smulh => "smulh",
            Self::Udiv => "udiv",
            Self::Sdiv => "sdiv",
            Self::Mov => "mov",
            Self::Mvn => "mvn",
            Self::Movt => "movt",
            Self::Cmp => "cmp",
            Self::Cmn => "cmn",
            Self::Tst => "tst",
            Self::Teq => "teq",
            Self::Lsl => "lsl",
            Self::Lsr => "lsr",
            Self::Asr => "asr",
            Self::Ror => "ror",
            Self::Ldr => "ldr",
            Self::Ldrh => "ldrh",
            Self::Ldrb => "ldrb",
            Self::Ldrsh => "ldrsh",
            Self::Ldrsb => "ldrsb",
            Self::Str => "str",
            Self::Strh => "strh",
            Self::Strb => "strb",
            Self::Swp => "swp",
            Self::Swpb => "swpb",
            Self::B => "b",
            Self::Bl => "bl",
            Self::Bx => "bx",
            Self::Blx => "blx",
            Self::VaddF32 => "vadd_f32",
            Self::VsubF32 => "vsub_f32",
            Self::VmulF32 => "vmul_f32",
            Self::VdivF32 => "vdiv_f32",
            Self::VcmpF32 => "vcmp_f32",
            Self::VcvtF32S32 => "vcvt_f32_s32",
            Self::VcvtS32F32 => "vcvt_s32_f32",
        }
    }
}

/// Returns the assigned opcode for an opcode byte.
///
/// `None` means reserved/unassigned.
#[must_use]
pub fn classify_opcode(byte: u8) -> Option<Opcode> {
    OPCODE_LOOKUP[usize::from(byte)]
}

/// Extracts the opcode byte (bits 31..24) from an instruction word.
#[must_use]
pub const fn opcode_byte(word: u32) -> u8 {
    (word >> 24) as u8
}

/// Returns true if the format group nibble is in the reserved range (`0x9..=0xF`).
#[must_use]
pub const fn is_reserved_group(group: u8) -> bool {
    matches!(group, 0x9..=0xF)
}
