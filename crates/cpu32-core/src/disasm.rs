//! Instruction disassembly.
//!
//! Renders decoded instructions in the assembler's syntax for trace logs and
//! test diagnostics.

use std::fmt;

use crate::decoder::{
    AddressingMode, BranchTarget, Decoded, DecodedInstruction, Decoder, MemoryOffset, Operand2,
    Operands, ShiftAmount, ShiftType,
};
use crate::encoding::Opcode;

/// A single disassembled instruction row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisassemblyRow {
    /// Address of the instruction.
    pub address: u32,
    /// Raw instruction word.
    pub word: u32,
    /// Rendered text, or `.word 0x........ ; invalid`.
    pub text: String,
    /// Whether the word failed to decode.
    pub is_invalid: bool,
}

/// Disassembles a sequence of little-endian instruction words starting at `base`.
#[must_use]
pub fn disassemble(base: u32, words: &[u32]) -> Vec<DisassemblyRow> {
    (0u32..)
        .zip(words)
        .map(|(index, &word)| disassemble_one(base.wrapping_add(index * 4), word))
        .collect()
}

/// Disassembles one instruction word.
#[must_use]
pub fn disassemble_one(address: u32, word: u32) -> DisassemblyRow {
    match Decoder::decode(word) {
        Decoded::Instruction(instruction) => DisassemblyRow {
            address,
            word,
            text: instruction.to_string(),
            is_invalid: false,
        },
        Decoded::Invalid { .. } => DisassemblyRow {
            address,
            word,
            text: format!(".word {word:#010x} ; invalid"),
            is_invalid: true,
        },
    }
}

struct Op2(Operand2);

impl fmt::Display for Op2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Operand2::Immediate(imm) => write!(f, "#{imm:#x}"),
            Operand2::ShiftedRegister {
                rm,
                shift,
                amount: ShiftAmount::Immediate(0),
            } if shift == ShiftType::Lsl => write!(f, "{rm}"),
            Operand2::ShiftedRegister { rm, shift, amount } => match amount {
                ShiftAmount::Immediate(imm) => write!(f, "{rm}, {} #{imm}", shift.mnemonic()),
                ShiftAmount::Register(rs) => write!(f, "{rm}, {} {rs}", shift.mnemonic()),
            },
        }
    }
}

fn flag_suffix(set_flags: bool) -> &'static str {
    if set_flags {
        "s"
    } else {
        ""
    }
}

impl fmt::Display for DecodedInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.opcode.mnemonic();
        match self.operands {
            Operands::Control { imm } => {
                if self.opcode == Opcode::Swi {
                    write!(f, "{name} #{imm:#x}")
                } else {
                    f.write_str(name)
                }
            }
            Operands::DataProcessing {
                set_flags,
                rd,
                rn,
                operand,
            } => write!(f, "{name}{} {rd}, {rn}, {}", flag_suffix(set_flags), Op2(operand)),
            Operands::Move {
                set_flags,
                rd,
                operand,
            } => write!(f, "{name}{} {rd}, {}", flag_suffix(set_flags), Op2(operand)),
            Operands::MoveTop { rd, imm } => write!(f, "{name} {rd}, #{imm:#x}"),
            Operands::Compare { rn, operand } => write!(f, "{name} {rn}, {}", Op2(operand)),
            Operands::Shift {
                set_flags,
                rd,
                rn,
                amount,
            } => match amount {
                ShiftAmount::Immediate(imm) => {
                    write!(f, "{name}{} {rd}, {rn}, #{imm}", flag_suffix(set_flags))
                }
                ShiftAmount::Register(rs) => {
                    write!(f, "{name}{} {rd}, {rn}, {rs}", flag_suffix(set_flags))
                }
            },
            Operands::Memory {
                mode,
                rt,
                rn,
                offset,
                add,
            } => {
                let sign = if add { "" } else { "-" };
                let offset = match offset {
                    MemoryOffset::Immediate(imm) => format!("#{sign}{imm}"),
                    MemoryOffset::Register(rm) => format!("{sign}{rm}"),
                };
                match mode {
                    AddressingMode::Offset => write!(f, "{name} {rt}, [{rn}, {offset}]"),
                    AddressingMode::PreIndexed => write!(f, "{name} {rt}, [{rn}, {offset}]!"),
                    AddressingMode::PostIndexed => write!(f, "{name} {rt}, [{rn}], {offset}"),
                }
            }
            Operands::Atomic { rd, rm, rn } => write!(f, "{name} {rd}, {rm}, [{rn}]"),
            Operands::Branch { condition, target } => {
                let suffix = condition.suffix();
                match target {
                    BranchTarget::Relative(words) => {
                        write!(f, "{name}{suffix} #{}", i64::from(words) * 4)
                    }
                    BranchTarget::Register(rm) => write!(f, "{name}{suffix} {rm}"),
                }
            }
            Operands::FloatArith { rd, rn, rm } => write!(f, "{name} {rd}, {rn}, {rm}"),
            Operands::FloatCompare { rn, rm } => write!(f, "{name} {rn}, {rm}"),
            Operands::FloatConvert { rd, rn } => write!(f, "{name} {rd}, {rn}"),
        }
    }
}
