//! Instruction semantics exercised through the public run loop.

#![allow(
    clippy::pedantic,
    clippy::nursery,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]

use cpu32_core::{
    AddressingMode, BranchTarget, Condition, Cpu, CpuConfig, Decoded, DecodedInstruction, Decoder,
    Disk, Fault, MemoryOffset, Opcode, Operand2, Operands, Ram, Register, Rom, RunOutcome,
    ShiftAmount, ShiftType, StopReason, Width, FLAG_C, FLAG_N, FLAG_V, FLAG_Z, PAGE_SIZE,
};
use log as _;
use proptest::prelude::*;
use rstest::rstest;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;

const RAM_BASE: u32 = 0x1000_0000;
const DATA: u32 = RAM_BASE + 0x8000;

fn machine() -> Cpu {
    Cpu::new(
        CpuConfig::default(),
        Ram::new(RAM_BASE, PAGE_SIZE * 256),
        Rom::new(0, PAGE_SIZE),
        Disk::new(16),
    )
    .expect("default layout is valid")
}

fn encode(opcode: Opcode, operands: Operands) -> u32 {
    DecodedInstruction { opcode, operands }.encode()
}

fn hlt() -> u32 {
    encode(Opcode::Hlt, Operands::Control { imm: 0 })
}

fn dp(opcode: Opcode, set_flags: bool, rd: Register, rn: Register, operand: Operand2) -> u32 {
    encode(
        opcode,
        Operands::DataProcessing {
            set_flags,
            rd,
            rn,
            operand,
        },
    )
}

fn mov(set_flags: bool, rd: Register, operand: Operand2) -> u32 {
    encode(
        Opcode::Mov,
        Operands::Move {
            set_flags,
            rd,
            operand,
        },
    )
}

fn memory(
    opcode: Opcode,
    mode: AddressingMode,
    rt: Register,
    rn: Register,
    offset: MemoryOffset,
) -> u32 {
    encode(
        opcode,
        Operands::Memory {
            mode,
            rt,
            rn,
            offset,
            add: true,
        },
    )
}

fn run_program(cpu: &mut Cpu, program: &[u32]) -> RunOutcome {
    let mut words = program.to_vec();
    words.push(hlt());
    cpu.load_program(RAM_BASE, &words).expect("program fits in RAM");
    cpu.run(1_000)
}

#[test]
fn lsl_by_register_uses_low_byte_of_amount() {
    let lsl = encode(
        Opcode::Lsl,
        Operands::Shift {
            set_flags: false,
            rd: Register::R0,
            rn: Register::R1,
            amount: ShiftAmount::Register(Register::R2),
        },
    );
    for amount in [5, 0x105, 0xFFFF_FF05] {
        let mut cpu = machine();
        cpu.set_register(Register::R1, 1);
        cpu.set_register(Register::R2, amount);
        cpu.set_flags(FLAG_V);
        let outcome = run_program(&mut cpu, &[lsl]);
        assert_eq!(outcome.reason, StopReason::Halted);
        assert_eq!(cpu.register(Register::R0), 32, "amount {amount:#x}");
        assert_eq!(cpu.flags(), FLAG_V);
    }
}

#[test]
fn ror_rotates_across_word_boundary() {
    let ror = encode(
        Opcode::Ror,
        Operands::Shift {
            set_flags: true,
            rd: Register::R0,
            rn: Register::R1,
            amount: ShiftAmount::Immediate(16),
        },
    );
    let mut cpu = machine();
    cpu.set_register(Register::R1, 1 << 15);
    run_program(&mut cpu, &[ror]);
    assert_eq!(cpu.register(Register::R0), 1 << 31);
    assert_eq!(cpu.flags(), FLAG_N | FLAG_C);
}

#[test]
fn swap_exchanges_register_and_memory_word() {
    let mut cpu = machine();
    cpu.write_memory(DATA, Width::Word, 0x3425_1607).expect("ram");
    let bytes: Vec<u32> = (0..4)
        .map(|offset| cpu.read_memory(DATA + offset, Width::Byte).expect("ram"))
        .collect();
    assert_eq!(bytes, [0x07, 0x16, 0x25, 0x34]);

    cpu.set_register(Register::R1, 0x7654_3210);
    cpu.set_register(Register::R2, DATA);
    let swp = encode(
        Opcode::Swp,
        Operands::Atomic {
            rd: Register::R0,
            rm: Register::R1,
            rn: Register::R2,
        },
    );
    run_program(&mut cpu, &[swp]);

    assert_eq!(cpu.read_memory(DATA, Width::Word), Ok(0x7654_3210));
    assert_eq!(cpu.register(Register::R0), 0x3425_1607);
    assert_eq!(cpu.register(Register::R1), 0x7654_3210);
    assert_eq!(cpu.register(Register::R2), DATA);
}

#[test]
fn swap_byte_only_touches_low_byte() {
    let mut cpu = machine();
    cpu.write_memory(DATA, Width::Word, 0xAABB_CCDD).expect("ram");
    cpu.set_register(Register::R1, 0x1234_5611);
    cpu.set_register(Register::R2, DATA);
    let swpb = encode(
        Opcode::Swpb,
        Operands::Atomic {
            rd: Register::R0,
            rm: Register::R1,
            rn: Register::R2,
        },
    );
    run_program(&mut cpu, &[swpb]);
    assert_eq!(cpu.read_memory(DATA, Width::Word), Ok(0xAABB_CC11));
    assert_eq!(cpu.register(Register::R0), 0xDD);
}

#[test]
fn ldrh_pre_indexed_updates_base_before_access() {
    let mut cpu = machine();
    cpu.write_memory(DATA, Width::Halfword, 0xBEEF).expect("ram");
    cpu.set_register(Register::R1, DATA - 3);
    let ldrh = memory(
        Opcode::Ldrh,
        AddressingMode::PreIndexed,
        Register::R0,
        Register::R1,
        MemoryOffset::Immediate(3),
    );
    run_program(&mut cpu, &[ldrh]);
    assert_eq!(cpu.register(Register::R0), 0xBEEF);
    assert_eq!(cpu.register(Register::R1), DATA);
}

#[rstest]
#[case::offset(AddressingMode::Offset, DATA + 8, 0x2222_2222, DATA)]
#[case::pre_indexed(AddressingMode::PreIndexed, DATA + 8, 0x2222_2222, DATA + 8)]
#[case::post_indexed(AddressingMode::PostIndexed, DATA, 0x1111_1111, DATA + 8)]
fn addressing_modes_choose_address_and_writeback(
    #[case] mode: AddressingMode,
    #[case] _accessed: u32,
    #[case] loaded: u32,
    #[case] base_after: u32,
) {
    let mut cpu = machine();
    cpu.write_memory(DATA, Width::Word, 0x1111_1111).expect("ram");
    cpu.write_memory(DATA + 8, Width::Word, 0x2222_2222).expect("ram");
    cpu.set_register(Register::R1, DATA);
    let ldr = memory(
        Opcode::Ldr,
        mode,
        Register::R0,
        Register::R1,
        MemoryOffset::Immediate(8),
    );
    run_program(&mut cpu, &[ldr]);
    assert_eq!(cpu.register(Register::R0), loaded);
    assert_eq!(cpu.register(Register::R1), base_after);
}

#[test]
fn store_post_indexed_with_register_offset() {
    let mut cpu = machine();
    cpu.set_register(Register::R0, 0xA1B2_C3D4);
    cpu.set_register(Register::R1, DATA);
    cpu.set_register(Register::R2, 2);
    let strh = memory(
        Opcode::Strh,
        AddressingMode::PostIndexed,
        Register::R0,
        Register::R1,
        MemoryOffset::Register(Register::R2),
    );
    run_program(&mut cpu, &[strh, strh]);
    assert_eq!(cpu.read_memory(DATA, Width::Word), Ok(0xC3D4_C3D4));
    assert_eq!(cpu.register(Register::R1), DATA + 4);
}

#[test]
fn mov_and_mvn_of_zero_set_flags() {
    let mut cpu = machine();
    cpu.set_flags(FLAG_C | FLAG_V);
    run_program(&mut cpu, &[mov(true, Register::R0, Operand2::Immediate(0))]);
    assert_eq!(cpu.register(Register::R0), 0);
    assert_eq!(cpu.flags(), FLAG_Z | FLAG_C | FLAG_V);

    let mvn = encode(
        Opcode::Mvn,
        Operands::Move {
            set_flags: true,
            rd: Register::R0,
            operand: Operand2::Immediate(0),
        },
    );
    let mut cpu = machine();
    run_program(&mut cpu, &[mvn]);
    assert_eq!(cpu.register(Register::R0), u32::MAX);
    assert_eq!(cpu.flags(), FLAG_N);
}

#[test]
fn movt_builds_a_full_word_with_mov() {
    let movt = encode(
        Opcode::Movt,
        Operands::MoveTop {
            rd: Register::R4,
            imm: 0xDEAD,
        },
    );
    let mut cpu = machine();
    run_program(
        &mut cpu,
        &[mov(false, Register::R4, Operand2::Immediate(0xBEEF)), movt],
    );
    assert_eq!(cpu.register(Register::R4), 0xDEAD_BEEF);
    assert_eq!(cpu.flags(), 0);
}

#[rstest]
#[case::carry_only(0xFFFF_FFFF, 1, 0, FLAG_Z | FLAG_C)]
#[case::overflow_only(0x7FFF_FFFF, 1, 0x8000_0000, FLAG_N | FLAG_V)]
#[case::both(0x8000_0000, 0x8000_0000, 0, FLAG_Z | FLAG_C | FLAG_V)]
#[case::neither(2, 3, 5, 0)]
fn add_sets_carry_and_overflow_independently(
    #[case] a: u32,
    #[case] b: u32,
    #[case] result: u32,
    #[case] flags: u32,
) {
    let mut cpu = machine();
    cpu.set_register(Register::R1, a);
    cpu.set_register(Register::R2, b);
    run_program(
        &mut cpu,
        &[dp(
            Opcode::Add,
            true,
            Register::R0,
            Register::R1,
            Operand2::register(Register::R2),
        )],
    );
    assert_eq!(cpu.register(Register::R0), result);
    assert_eq!(cpu.flags(), flags);
}

#[test]
fn adc_chains_a_64_bit_add() {
    let mut cpu = machine();
    cpu.set_register(Register::R1, 0xFFFF_FFFF);
    cpu.set_register(Register::R2, 0x0000_0001);
    cpu.set_register(Register::R3, 1);
    cpu.set_register(Register::R4, 0);
    run_program(
        &mut cpu,
        &[
            dp(
                Opcode::Add,
                true,
                Register::R5,
                Register::R1,
                Operand2::register(Register::R3),
            ),
            dp(
                Opcode::Adc,
                true,
                Register::R6,
                Register::R2,
                Operand2::register(Register::R4),
            ),
        ],
    );
    assert_eq!(cpu.register(Register::R5), 0);
    assert_eq!(cpu.register(Register::R6), 2);
    assert_eq!(cpu.flags(), 0);
}

#[test]
fn logical_op_takes_carry_from_shifted_operand() {
    let mut cpu = machine();
    cpu.set_register(Register::R1, u32::MAX);
    cpu.set_register(Register::R2, 0x8000_0001);
    let operand = Operand2::ShiftedRegister {
        rm: Register::R2,
        shift: ShiftType::Lsr,
        amount: ShiftAmount::Immediate(1),
    };
    run_program(
        &mut cpu,
        &[dp(Opcode::And, true, Register::R0, Register::R1, operand)],
    );
    assert_eq!(cpu.register(Register::R0), 0x4000_0000);
    assert_eq!(cpu.flags(), FLAG_C);
}

#[test]
fn countdown_loop_uses_flags_from_subs() {
    let subs = dp(
        Opcode::Sub,
        true,
        Register::R0,
        Register::R0,
        Operand2::Immediate(1),
    );
    let bne = encode(
        Opcode::B,
        Operands::Branch {
            condition: Condition::Ne,
            target: BranchTarget::Relative(-1),
        },
    );
    let mut cpu = machine();
    let outcome = run_program(
        &mut cpu,
        &[mov(false, Register::R0, Operand2::Immediate(5)), subs, bne],
    );
    assert_eq!(outcome.reason, StopReason::Halted);
    assert_eq!(cpu.register(Register::R0), 0);
    assert_eq!(outcome.executed, 12);
    assert!(cpu.flag(FLAG_Z));
    assert!(cpu.flag(FLAG_C));
}

#[rstest]
#[case::eq_taken(Condition::Eq, FLAG_Z, true)]
#[case::eq_not_taken(Condition::Eq, 0, false)]
#[case::ne_taken(Condition::Ne, 0, true)]
#[case::cs_taken(Condition::Cs, FLAG_C, true)]
#[case::cc_not_taken(Condition::Cc, FLAG_C, false)]
#[case::mi_taken(Condition::Mi, FLAG_N, true)]
#[case::vs_not_taken(Condition::Vs, 0, false)]
#[case::hi_taken(Condition::Hi, FLAG_C, true)]
#[case::hi_not_taken(Condition::Hi, FLAG_C | FLAG_Z, false)]
#[case::ls_taken(Condition::Ls, FLAG_Z, true)]
#[case::ge_taken(Condition::Ge, FLAG_N | FLAG_V, true)]
#[case::lt_taken(Condition::Lt, FLAG_N, true)]
#[case::gt_not_taken(Condition::Gt, FLAG_Z, false)]
#[case::le_taken(Condition::Le, FLAG_V, true)]
#[case::al_taken(Condition::Al, 0, true)]
fn conditional_branches(#[case] condition: Condition, #[case] flags: u32, #[case] taken: bool) {
    let branch = encode(
        Opcode::B,
        Operands::Branch {
            condition,
            target: BranchTarget::Relative(2),
        },
    );
    let mut cpu = machine();
    cpu.load_program(RAM_BASE, &[branch, hlt(), hlt()])
        .expect("ram");
    cpu.set_flags(flags);
    let outcome = cpu.run(10);
    assert_eq!(outcome.reason, StopReason::Halted);
    let expected_pc = if taken { RAM_BASE + 12 } else { RAM_BASE + 8 };
    assert_eq!(cpu.pc(), expected_pc);
    assert_eq!(cpu.flags(), flags);
}

#[test]
fn bl_and_bx_call_and_return() {
    let bl = encode(
        Opcode::Bl,
        Operands::Branch {
            condition: Condition::Al,
            target: BranchTarget::Relative(2),
        },
    );
    let bx = encode(
        Opcode::Bx,
        Operands::Branch {
            condition: Condition::Al,
            target: BranchTarget::Register(Register::LR),
        },
    );
    let mut cpu = machine();
    cpu.load_program(
        RAM_BASE,
        &[
            bl,
            hlt(),
            mov(false, Register::R5, Operand2::Immediate(9)),
            bx,
        ],
    )
    .expect("ram");
    let outcome = cpu.run(10);
    assert_eq!(outcome.reason, StopReason::Halted);
    assert_eq!(outcome.executed, 4);
    assert_eq!(cpu.register(Register::R5), 9);
    assert_eq!(cpu.register(Register::LR), RAM_BASE + 4);
    assert_eq!(cpu.pc(), RAM_BASE + 8);
}

#[test]
fn divide_and_multiply_edge_cases() {
    let mut cpu = machine();
    cpu.set_register(Register::R1, 100);
    cpu.set_register(Register::R2, 0);
    cpu.set_register(Register::R3, 0xFFFF_FFFF);
    run_program(
        &mut cpu,
        &[
            dp(
                Opcode::Udiv,
                false,
                Register::R4,
                Register::R1,
                Operand2::register(Register::R2),
            ),
            dp(
                Opcode::Umulh,
                false,
                Register::R5,
                Register::R3,
                Operand2::register(Register::R3),
            ),
            dp(
                Opcode::Smulh,
                false,
                Register::R6,
                Register::R3,
                Operand2::register(Register::R3),
            ),
        ],
    );
    assert_eq!(cpu.register(Register::R4), 0);
    assert_eq!(cpu.register(Register::R5), 0xFFFF_FFFE);
    assert_eq!(cpu.register(Register::R6), 0);
}

#[test]
fn float_arithmetic_reinterprets_registers() {
    let vadd = encode(
        Opcode::VaddF32,
        Operands::FloatArith {
            rd: Register::R0,
            rn: Register::R1,
            rm: Register::R2,
        },
    );
    let vcmp = encode(
        Opcode::VcmpF32,
        Operands::FloatCompare {
            rn: Register::R0,
            rm: Register::R1,
        },
    );
    let mut cpu = machine();
    cpu.set_register(Register::R1, 1.5f32.to_bits());
    cpu.set_register(Register::R2, 2.25f32.to_bits());
    run_program(&mut cpu, &[vadd, vcmp]);
    assert_eq!(cpu.register(Register::R0), 3.75f32.to_bits());
    assert_eq!(cpu.flags(), FLAG_C);
}

#[test]
fn store_to_rom_faults_and_commits_nothing() {
    let mut cpu = machine();
    cpu.set_register(Register::R1, 0x100);
    let str_pre = memory(
        Opcode::Str,
        AddressingMode::PreIndexed,
        Register::R0,
        Register::R1,
        MemoryOffset::Immediate(4),
    );
    let outcome = run_program(&mut cpu, &[str_pre]);
    assert_eq!(
        outcome.reason,
        StopReason::Fault(Fault::WriteToReadOnly { address: 0x104 })
    );
    assert_eq!(outcome.executed, 0);
    assert_eq!(cpu.register(Register::R1), 0x100);
    assert_eq!(cpu.pc(), RAM_BASE);
}

#[test]
fn unowned_address_is_out_of_bounds() {
    let mut cpu = machine();
    cpu.set_register(Register::R1, 0x2000_0000);
    let ldr = memory(
        Opcode::Ldr,
        AddressingMode::Offset,
        Register::R0,
        Register::R1,
        MemoryOffset::Immediate(0),
    );
    let outcome = run_program(&mut cpu, &[ldr]);
    assert_eq!(
        outcome.reason,
        StopReason::Fault(Fault::MemoryOutOfBounds {
            address: 0x2000_0000
        })
    );
}

#[test]
fn word_straddling_device_end_is_out_of_bounds() {
    let mut cpu = machine();
    let end = RAM_BASE + PAGE_SIZE * 256;
    assert_eq!(
        cpu.read_memory(end - 2, Width::Word),
        Err(Fault::MemoryOutOfBounds { address: end - 2 })
    );
    assert_eq!(cpu.read_memory(end - 4, Width::Word), Ok(0));
}

#[test]
fn every_table_opcode_decodes_from_its_byte() {
    for (byte, opcode) in cpu32_core::OPCODE_TABLE {
        assert_eq!(cpu32_core::classify_opcode(byte), Some(opcode));
        assert_eq!(opcode.byte(), byte);
        assert_eq!(opcode.format() as u8, byte >> 4);
    }
}

proptest! {
    #[test]
    fn decode_is_total_and_canonical(word in any::<u32>()) {
        match Decoder::decode(word) {
            Decoded::Instruction(instruction) => prop_assert_eq!(instruction.encode(), word),
            Decoded::Invalid { word: invalid } => prop_assert_eq!(invalid, word),
        }
    }

    #[test]
    fn reserved_groups_never_decode(group in 0x9u32..=0xF, low in 0u32..0x1000_0000) {
        prop_assert!(Decoder::decode((group << 28) | low).is_invalid());
    }

    #[test]
    fn sub_flags_match_wide_arithmetic(a in any::<u32>(), b in any::<u32>()) {
        let mut cpu = machine();
        cpu.set_register(Register::R1, a);
        cpu.set_register(Register::R2, b);
        run_program(
            &mut cpu,
            &[dp(Opcode::Sub, true, Register::R0, Register::R1, Operand2::register(Register::R2))],
        );
        prop_assert_eq!(cpu.register(Register::R0), a.wrapping_sub(b));
        prop_assert_eq!(cpu.flag(FLAG_C), a >= b);
        let signed = i64::from(a as i32) - i64::from(b as i32);
        prop_assert_eq!(cpu.flag(FLAG_V), signed != i64::from(a.wrapping_sub(b) as i32));
        prop_assert_eq!(cpu.flag(FLAG_Z), a == b);
    }
}
