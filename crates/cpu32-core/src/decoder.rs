//! Instruction decoder for the 32-bit ISA.
//!
//! Decoding is total: every 32-bit word yields either a fully populated
//! [`DecodedInstruction`] or [`Decoded::Invalid`]. Reserved fields must be
//! zero, so every valid word has exactly one decoding and
//! [`DecodedInstruction::encode`] reproduces it bit for bit.

use crate::encoding::{classify_opcode, opcode_byte, Format, Opcode};
use crate::state::{Register, FLAG_C, FLAG_N, FLAG_V, FLAG_Z};
use crate::Fault;

const S_BIT: u32 = 1 << 23;
const I_BIT: u32 = 1 << 22;
const RD_SHIFT: u32 = 18;
const RN_SHIFT: u32 = 14;
const RM_SHIFT: u32 = 10;
const OPERAND2_MASK: u32 = 0x3FFF;
const MEM_IMM_BIT: u32 = 1 << 13;
const MEM_ADD_BIT: u32 = 1 << 12;

/// Barrel-shifter operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum ShiftType {
    Lsl,
    Lsr,
    Asr,
    Ror,
}

impl ShiftType {
    const fn from_u2(bits: u32) -> Self {
        match bits & 0x3 {
            0 => Self::Lsl,
            1 => Self::Lsr,
            2 => Self::Asr,
            _ => Self::Ror,
        }
    }

    const fn bits(self) -> u32 {
        match self {
            Self::Lsl => 0,
            Self::Lsr => 1,
            Self::Asr => 2,
            Self::Ror => 3,
        }
    }

    /// Assembly mnemonic.
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Lsl => "lsl",
            Self::Lsr => "lsr",
            Self::Asr => "asr",
            Self::Ror => "ror",
        }
    }
}

/// Shift amount source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShiftAmount {
    /// Encoded 5-bit amount (`0..=31`).
    Immediate(u8),
    /// Low 8 bits of a register.
    Register(Register),
}

/// Flexible second operand of data-processing and compare instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand2 {
    /// Zero-extended immediate.
    Immediate(u32),
    /// Register passed through the barrel shifter.
    ShiftedRegister {
        /// Source register.
        rm: Register,
        /// Shift operation.
        shift: ShiftType,
        /// Shift amount.
        amount: ShiftAmount,
    },
}

impl Operand2 {
    /// Plain register operand with no shift.
    #[must_use]
    pub const fn register(rm: Register) -> Self {
        Self::ShiftedRegister {
            rm,
            shift: ShiftType::Lsl,
            amount: ShiftAmount::Immediate(0),
        }
    }
}

/// Memory addressing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressingMode {
    /// Access `base ± offset`; base register untouched.
    Offset,
    /// Update base to `base ± offset`, then access the updated address.
    PreIndexed,
    /// Access `base`, then update base to `base ± offset`.
    PostIndexed,
}

impl AddressingMode {
    const fn from_u2(bits: u32) -> Option<Self> {
        match bits & 0x3 {
            0 => Some(Self::Offset),
            1 => Some(Self::PreIndexed),
            2 => Some(Self::PostIndexed),
            _ => None,
        }
    }

    const fn bits(self) -> u32 {
        match self {
            Self::Offset => 0,
            Self::PreIndexed => 1,
            Self::PostIndexed => 2,
        }
    }

    /// Returns true when the base register is written back.
    #[must_use]
    pub const fn writes_back(self) -> bool {
        !matches!(self, Self::Offset)
    }
}

/// Memory offset source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryOffset {
    /// 12-bit unsigned immediate.
    Immediate(u16),
    /// Register value.
    Register(Register),
}

/// Branch condition tested against `FLAGS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Condition {
    Eq,
    Ne,
    Cs,
    Cc,
    Mi,
    Pl,
    Vs,
    Vc,
    Hi,
    Ls,
    Ge,
    Lt,
    Gt,
    Le,
    Al,
}

impl Condition {
    /// Ordered list matching the 4-bit field encoding.
    pub const ALL: [Self; 15] = [
        Self::Eq,
        Self::Ne,
        Self::Cs,
        Self::Cc,
        Self::Mi,
        Self::Pl,
        Self::Vs,
        Self::Vc,
        Self::Hi,
        Self::Ls,
        Self::Ge,
        Self::Lt,
        Self::Gt,
        Self::Le,
        Self::Al,
    ];

    /// Decodes the 4-bit condition field; `0xF` is reserved.
    #[must_use]
    pub const fn from_u4(bits: u8) -> Option<Self> {
        if (bits as usize) < Self::ALL.len() {
            Some(Self::ALL[bits as usize])
        } else {
            None
        }
    }

    /// Field value for encoding.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self as u32
    }

    /// Evaluates the condition against a `FLAGS` value.
    #[must_use]
    pub const fn passes(self, flags: u32) -> bool {
        let n = flags & FLAG_N != 0;
        let z = flags & FLAG_Z != 0;
        let c = flags & FLAG_C != 0;
        let v = flags & FLAG_V != 0;
        match self {
            Self::Eq => z,
            Self::Ne => !z,
            Self::Cs => c,
            Self::Cc => !c,
            Self::Mi => n,
            Self::Pl => !n,
            Self::Vs => v,
            Self::Vc => !v,
            Self::Hi => c && !z,
            Self::Ls => !c || z,
            Self::Ge => n == v,
            Self::Lt => n != v,
            Self::Gt => !z && n == v,
            Self::Le => z || n != v,
            Self::Al => true,
        }
    }

    /// Assembly suffix (`al` renders as empty).
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Cs => "cs",
            Self::Cc => "cc",
            Self::Mi => "mi",
            Self::Pl => "pl",
            Self::Vs => "vs",
            Self::Vc => "vc",
            Self::Hi => "hi",
            Self::Ls => "ls",
            Self::Ge => "ge",
            Self::Lt => "lt",
            Self::Gt => "gt",
            Self::Le => "le",
            Self::Al => "",
        }
    }
}

/// Branch destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchTarget {
    /// Signed word offset from the branch instruction's address.
    Relative(i32),
    /// Absolute address held in a register.
    Register(Register),
}

/// Operand fields, one variant per instruction layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Operands {
    /// `nop`, `hlt` (`imm` is zero) and `swi #imm24`.
    Control { imm: u32 },
    DataProcessing {
        set_flags: bool,
        rd: Register,
        rn: Register,
        operand: Operand2,
    },
    /// `mov`/`mvn`.
    Move {
        set_flags: bool,
        rd: Register,
        operand: Operand2,
    },
    /// `movt`.
    MoveTop { rd: Register, imm: u16 },
    Compare { rn: Register, operand: Operand2 },
    Shift {
        set_flags: bool,
        rd: Register,
        rn: Register,
        amount: ShiftAmount,
    },
    Memory {
        mode: AddressingMode,
        rt: Register,
        rn: Register,
        offset: MemoryOffset,
        /// `true` adds the offset, `false` subtracts it.
        add: bool,
    },
    Atomic {
        rd: Register,
        rm: Register,
        rn: Register,
    },
    Branch {
        condition: Condition,
        target: BranchTarget,
    },
    FloatArith {
        rd: Register,
        rn: Register,
        rm: Register,
    },
    FloatCompare { rn: Register, rm: Register },
    FloatConvert { rd: Register, rn: Register },
}

/// Fully decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DecodedInstruction {
    /// Opcode.
    pub opcode: Opcode,
    /// Operand fields.
    pub operands: Operands,
}

impl DecodedInstruction {
    /// Format of this instruction.
    #[must_use]
    pub const fn format(&self) -> Format {
        self.opcode.format()
    }

    /// Re-encodes this instruction into its canonical 32-bit word.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn encode(&self) -> u32 {
        let mut word = u32::from(self.opcode.byte()) << 24;
        match self.operands {
            Operands::Control { imm } => word |= imm & 0x00FF_FFFF,
            Operands::DataProcessing {
                set_flags,
                rd,
                rn,
                operand,
            } => {
                word |= flag_bit(set_flags, S_BIT)
                    | (rd.bits() << RD_SHIFT)
                    | (rn.bits() << RN_SHIFT)
                    | encode_operand2(operand, OPERAND2_MASK);
            }
            Operands::Move {
                set_flags,
                rd,
                operand,
            } => {
                word |= flag_bit(set_flags, S_BIT)
                    | (rd.bits() << RD_SHIFT)
                    | encode_operand2(operand, 0xFFFF);
            }
            Operands::MoveTop { rd, imm } => {
                word |= (rd.bits() << RD_SHIFT) | u32::from(imm);
            }
            Operands::Compare { rn, operand } => {
                word |= (rn.bits() << RN_SHIFT) | encode_operand2(operand, OPERAND2_MASK);
            }
            Operands::Shift {
                set_flags,
                rd,
                rn,
                amount,
            } => {
                word |= flag_bit(set_flags, S_BIT) | (rd.bits() << RD_SHIFT) | (rn.bits() << RN_SHIFT);
                word |= match amount {
                    ShiftAmount::Immediate(imm) => I_BIT | (u32::from(imm) & 0x1F),
                    ShiftAmount::Register(rs) => rs.bits() << RM_SHIFT,
                };
            }
            Operands::Memory {
                mode,
                rt,
                rn,
                offset,
                add,
            } => {
                word |= (mode.bits() << 22)
                    | (rt.bits() << RD_SHIFT)
                    | (rn.bits() << RN_SHIFT)
                    | flag_bit(add, MEM_ADD_BIT);
                word |= match offset {
                    MemoryOffset::Immediate(imm) => MEM_IMM_BIT | (u32::from(imm) & 0xFFF),
                    MemoryOffset::Register(rm) => rm.bits() << 8,
                };
            }
            Operands::Atomic { rd, rm, rn } => {
                word |= (rd.bits() << RD_SHIFT) | (rm.bits() << RN_SHIFT) | (rn.bits() << RM_SHIFT);
            }
            Operands::Branch { condition, target } => {
                word |= condition.bits() << 20;
                word |= match target {
                    BranchTarget::Relative(offset) => (offset as u32) & 0x000F_FFFF,
                    BranchTarget::Register(rm) => rm.bits() << 16,
                };
            }
            Operands::FloatArith { rd, rn, rm } => {
                word |= (rd.bits() << RD_SHIFT) | (rn.bits() << RN_SHIFT) | (rm.bits() << RM_SHIFT);
            }
            Operands::FloatCompare { rn, rm } => {
                word |= (rn.bits() << RN_SHIFT) | (rm.bits() << RM_SHIFT);
            }
            Operands::FloatConvert { rd, rn } => {
                word |= (rd.bits() << RD_SHIFT) | (rn.bits() << RN_SHIFT);
            }
        }
        word
    }
}

const fn flag_bit(set: bool, bit: u32) -> u32 {
    if set {
        bit
    } else {
        0
    }
}

fn encode_operand2(operand: Operand2, immediate_mask: u32) -> u32 {
    match operand {
        Operand2::Immediate(imm) => I_BIT | (imm & immediate_mask),
        Operand2::ShiftedRegister { rm, shift, amount } => {
            let base = (rm.bits() << RM_SHIFT) | (shift.bits() << 8);
            match amount {
                ShiftAmount::Immediate(imm) => base | ((u32::from(imm) & 0x1F) << 2),
                ShiftAmount::Register(rs) => base | (1 << 7) | (rs.bits() << 3),
            }
        }
    }
}

/// Result of decoding an instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decoded {
    /// Successfully decoded instruction.
    Instruction(DecodedInstruction),
    /// Word has no valid decoding.
    Invalid {
        /// The rejected word.
        word: u32,
    },
}

impl Decoded {
    /// Returns the decoded instruction if present.
    #[must_use]
    pub const fn instruction(self) -> Option<DecodedInstruction> {
        match self {
            Self::Instruction(instruction) => Some(instruction),
            Self::Invalid { .. } => None,
        }
    }

    /// Returns true for the invalid marker.
    #[must_use]
    pub const fn is_invalid(self) -> bool {
        matches!(self, Self::Invalid { .. })
    }

    /// Converts into a result, attributing invalid words to `pc`.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::InvalidOpcode`] for the invalid marker.
    pub const fn into_result(self, pc: u32) -> Result<DecodedInstruction, Fault> {
        match self {
            Self::Instruction(instruction) => Ok(instruction),
            Self::Invalid { word } => Err(Fault::InvalidOpcode { word, pc }),
        }
    }
}

/// Stateless instruction decoder.
pub struct Decoder;

impl Decoder {
    /// Decodes a 32-bit instruction word.
    ///
    /// Performs full validation:
    /// - Opcode classification against the opcode table
    /// - Reserved field values (addressing mode `11`, condition `1111`)
    /// - Reserved bits, which must be zero
    #[must_use]
    pub fn decode(word: u32) -> Decoded {
        let invalid = Decoded::Invalid { word };
        let Some(opcode) = classify_opcode(opcode_byte(word)) else {
            return invalid;
        };

        let operands = match opcode.format() {
            Format::Control => decode_control(opcode, word),
            Format::DataProcessing => decode_data_processing(word),
            Format::SingleOperand => decode_single_operand(opcode, word),
            Format::Compare => decode_compare(word),
            Format::Shift => decode_shift(word),
            Format::Memory => decode_memory(word),
            Format::Atomic => decode_atomic(word),
            Format::Branch => decode_branch(opcode, word),
            Format::FloatingPoint => decode_float(opcode, word),
        };

        match operands {
            Some(operands) => Decoded::Instruction(DecodedInstruction { opcode, operands }),
            None => invalid,
        }
    }
}

const fn reserved_clear(word: u32, mask: u32) -> bool {
    word & mask == 0
}

fn decode_operand2(word: u32) -> Option<Operand2> {
    if word & I_BIT != 0 {
        return Some(Operand2::Immediate(word & OPERAND2_MASK));
    }
    let rm = Register::from_field(word, RM_SHIFT);
    let shift = ShiftType::from_u2(word >> 8);
    let amount = if word & (1 << 7) == 0 {
        if !reserved_clear(word, 0x3) {
            return None;
        }
        #[allow(clippy::cast_possible_truncation)]
        ShiftAmount::Immediate(((word >> 2) & 0x1F) as u8)
    } else {
        if !reserved_clear(word, 0x7) {
            return None;
        }
        ShiftAmount::Register(Register::from_field(word, 3))
    };
    Some(Operand2::ShiftedRegister { rm, shift, amount })
}

fn decode_control(opcode: Opcode, word: u32) -> Option<Operands> {
    let imm = word & 0x00FF_FFFF;
    if opcode != Opcode::Swi && imm != 0 {
        return None;
    }
    Some(Operands::Control { imm })
}

fn decode_data_processing(word: u32) -> Option<Operands> {
    Some(Operands::DataProcessing {
        set_flags: word & S_BIT != 0,
        rd: Register::from_field(word, RD_SHIFT),
        rn: Register::from_field(word, RN_SHIFT),
        operand: decode_operand2(word)?,
    })
}

fn decode_single_operand(opcode: Opcode, word: u32) -> Option<Operands> {
    let rd = Register::from_field(word, RD_SHIFT);
    #[allow(clippy::cast_possible_truncation)]
    let imm16 = (word & 0xFFFF) as u16;

    if opcode == Opcode::Movt {
        if !reserved_clear(word, 0x00C3_0000) {
            return None;
        }
        return Some(Operands::MoveTop { rd, imm: imm16 });
    }

    let operand = if word & I_BIT != 0 {
        if !reserved_clear(word, 0x0003_0000) {
            return None;
        }
        Operand2::Immediate(u32::from(imm16))
    } else {
        if !reserved_clear(word, 0x0003_C000) {
            return None;
        }
        decode_operand2(word)?
    };
    Some(Operands::Move {
        set_flags: word & S_BIT != 0,
        rd,
        operand,
    })
}

fn decode_compare(word: u32) -> Option<Operands> {
    if !reserved_clear(word, S_BIT | 0x003C_0000) {
        return None;
    }
    Some(Operands::Compare {
        rn: Register::from_field(word, RN_SHIFT),
        operand: decode_operand2(word)?,
    })
}

fn decode_shift(word: u32) -> Option<Operands> {
    let amount = if word & I_BIT != 0 {
        if !reserved_clear(word, 0x3FE0) {
            return None;
        }
        #[allow(clippy::cast_possible_truncation)]
        ShiftAmount::Immediate((word & 0x1F) as u8)
    } else {
        if !reserved_clear(word, 0x03FF) {
            return None;
        }
        ShiftAmount::Register(Register::from_field(word, RM_SHIFT))
    };
    Some(Operands::Shift {
        set_flags: word & S_BIT != 0,
        rd: Register::from_field(word, RD_SHIFT),
        rn: Register::from_field(word, RN_SHIFT),
        amount,
    })
}

fn decode_memory(word: u32) -> Option<Operands> {
    let mode = AddressingMode::from_u2(word >> 22)?;
    let offset = if word & MEM_IMM_BIT != 0 {
        #[allow(clippy::cast_possible_truncation)]
        MemoryOffset::Immediate((word & 0xFFF) as u16)
    } else {
        if !reserved_clear(word, 0xFF) {
            return None;
        }
        MemoryOffset::Register(Register::from_field(word, 8))
    };
    Some(Operands::Memory {
        mode,
        rt: Register::from_field(word, RD_SHIFT),
        rn: Register::from_field(word, RN_SHIFT),
        offset,
        add: word & MEM_ADD_BIT != 0,
    })
}

fn decode_atomic(word: u32) -> Option<Operands> {
    if !reserved_clear(word, 0x00C0_03FF) {
        return None;
    }
    Some(Operands::Atomic {
        rd: Register::from_field(word, RD_SHIFT),
        rm: Register::from_field(word, RN_SHIFT),
        rn: Register::from_field(word, RM_SHIFT),
    })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn decode_branch(opcode: Opcode, word: u32) -> Option<Operands> {
    let condition = Condition::from_u4(((word >> 20) & 0xF) as u8)?;
    let target = match opcode {
        Opcode::B | Opcode::Bl => {
            // Sign-extend the 20-bit word offset.
            BranchTarget::Relative(((word << 12) as i32) >> 12)
        }
        _ => {
            if !reserved_clear(word, 0xFFFF) {
                return None;
            }
            BranchTarget::Register(Register::from_field(word, 16))
        }
    };
    Some(Operands::Branch { condition, target })
}

fn decode_float(opcode: Opcode, word: u32) -> Option<Operands> {
    if !reserved_clear(word, 0x00C0_03FF) {
        return None;
    }
    let rd = Register::from_field(word, RD_SHIFT);
    let rn = Register::from_field(word, RN_SHIFT);
    let rm = Register::from_field(word, RM_SHIFT);
    match opcode {
        Opcode::VcmpF32 => (rd == Register::R0).then_some(Operands::FloatCompare { rn, rm }),
        Opcode::VcvtF32S32 | Opcode::VcvtS32F32 => {
            (rm == Register::R0).then_some(Operands::FloatConvert { rd, rn })
        }
        _ => Some(Operands::FloatArith { rd, rn, rm }),
    }
}
