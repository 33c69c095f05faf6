//! Boots a small ROM image that sums 1..=10, then prints the run outcome and
//! a disassembly of the program.

use cpu32_core::{
    disassemble, BranchTarget, Condition, Cpu, CpuConfig, DecodedInstruction, Disk, Opcode,
    Operand2, Operands, Ram, Register, Rom, ShiftAmount, ShiftType, PAGE_SIZE,
};
use log as _;
use proptest as _;
use rstest as _;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;

const ENTRY: u32 = 0x100;

const fn mov(rd: Register, imm: u32) -> DecodedInstruction {
    DecodedInstruction {
        opcode: Opcode::Mov,
        operands: Operands::Move {
            set_flags: false,
            rd,
            operand: Operand2::Immediate(imm),
        },
    }
}

const fn alu(
    opcode: Opcode,
    set_flags: bool,
    rd: Register,
    operand: Operand2,
) -> DecodedInstruction {
    DecodedInstruction {
        opcode,
        operands: Operands::DataProcessing {
            set_flags,
            rd,
            rn: rd,
            operand,
        },
    }
}

fn program() -> Vec<u32> {
    [
        mov(Register::R1, 10),
        mov(Register::R0, 0),
        alu(
            Opcode::Add,
            false,
            Register::R0,
            Operand2::ShiftedRegister {
                rm: Register::R1,
                shift: ShiftType::Lsl,
                amount: ShiftAmount::Immediate(0),
            },
        ),
        alu(Opcode::Sub, true, Register::R1, Operand2::Immediate(1)),
        DecodedInstruction {
            opcode: Opcode::B,
            operands: Operands::Branch {
                condition: Condition::Ne,
                target: BranchTarget::Relative(-2),
            },
        },
        DecodedInstruction {
            opcode: Opcode::Hlt,
            operands: Operands::Control { imm: 0 },
        },
    ]
    .iter()
    .map(DecodedInstruction::encode)
    .collect()
}

fn main() {
    let words = program();
    let mut image = ENTRY.to_le_bytes().to_vec();
    image.resize(ENTRY as usize, 0);
    image.extend(words.iter().flat_map(|word| word.to_le_bytes()));
    image.resize(PAGE_SIZE as usize, 0);

    let cpu = Cpu::new(
        CpuConfig::default(),
        Ram::new(0x1000_0000, PAGE_SIZE * 256),
        Rom::from_image(0, &image),
        Disk::new(16),
    );
    let mut cpu = match cpu {
        Ok(cpu) => cpu,
        Err(error) => {
            eprintln!("invalid configuration: {error}");
            std::process::exit(1);
        }
    };

    for row in disassemble(ENTRY, &words) {
        println!("{:#010x}  {:#010x}  {}", row.address, row.word, row.text);
    }

    let outcome = cpu.run(1_000);
    println!("reason={:?}", outcome.reason);
    println!("executed={}", outcome.executed);
    println!("cycles={}", outcome.cycles);
    println!("r0={}", outcome.snapshot.gpr(Register::R0));
}
