//! Instruction execution.
//!
//! Each opcode has a pure handler in [`HANDLERS`]. A handler reads operands
//! from the architectural state, performs at most one bus transaction, and
//! records every register, flag and PC effect in an [`ExecuteState`].
//! [`commit_execution`] applies that record afterwards, so a faulting
//! instruction leaves the architectural state untouched.

mod flags;
mod helpers;

pub use flags::{add_with_carry, FlagsUpdate};
pub use helpers::{
    barrel_shift, compute_effective_address, operand2_value, shift_amount, EffectiveAddress,
};

use crate::bus::SystemBus;
use crate::decoder::{BranchTarget, DecodedInstruction, Operands, ShiftType};
use crate::encoding::{Opcode, OPCODE_COUNT};
use crate::memory::Width;
use crate::state::{ArchitecturalState, Register, FLAG_C, FLAG_N, FLAG_V, FLAG_Z};
use crate::timing::{cycle_cost, CycleCostKind};
use crate::Fault;

/// Control-flow effect that ends normal sequencing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlEffect {
    /// Continue with the next instruction.
    #[default]
    None,
    /// `hlt` retired.
    Halt,
    /// `swi` retired.
    SoftwareInterrupt {
        /// Interrupt number from the instruction.
        number: u32,
    },
}

/// Side effects of one instruction, applied by [`commit_execution`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteState {
    /// Register writes in commit order; a later write to the same register wins.
    pub register_writes: [Option<(Register, u32)>; 2],
    /// FLAGS update to apply.
    pub flags_update: FlagsUpdate,
    /// PC after the instruction.
    pub next_pc: u32,
    /// Cycle cost for this instruction.
    pub cycles: u32,
    /// Halt or trap request.
    pub control: ControlEffect,
}

impl ExecuteState {
    /// Creates a state that falls through to `next_pc` with no other effects.
    #[must_use]
    pub const fn new(next_pc: u32) -> Self {
        Self {
            register_writes: [None; 2],
            flags_update: FlagsUpdate::None,
            next_pc,
            cycles: 1,
            control: ControlEffect::None,
        }
    }

    fn write(&mut self, register: Register, value: u32) {
        if let Some(slot) = self.register_writes.iter_mut().find(|slot| slot.is_none()) {
            *slot = Some((register, value));
        } else {
            debug_assert!(false, "more than two register writes in one instruction");
        }
    }

    fn charge(&mut self, kind: CycleCostKind) {
        self.cycles = cycle_cost(kind);
    }
}

/// Opcode handler signature.
pub type Handler =
    fn(&DecodedInstruction, &ArchitecturalState, &mut SystemBus, &mut ExecuteState) -> Result<(), Fault>;

/// Dispatch table indexed by [`Opcode::index`].
pub static HANDLERS: [(Opcode, Handler); OPCODE_COUNT] = [
    (Opcode::Nop, execute_control),
    (Opcode::Hlt, execute_control),
    (Opcode::Swi, execute_control),
    (Opcode::Add, execute_data_processing),
    (Opcode::Adc, execute_data_processing),
    (Opcode::Sub, execute_data_processing),
    (Opcode::Sbc, execute_data_processing),
    (Opcode::Rsb, execute_data_processing),
    (Opcode::Rsc, execute_data_processing),
    (Opcode::And, execute_data_processing),
    (Opcode::Orr, execute_data_processing),
    (Opcode::Eor, execute_data_processing),
    (Opcode::Bic, execute_data_processing),
    (Opcode::Mul, execute_multiply),
    (Opcode::Umulh, execute_multiply),
    (Opcode::Smulh, execute_multiply),
    (Opcode::Udiv, execute_divide),
    (Opcode::Sdiv, execute_divide),
    (Opcode::Mov, execute_move),
    (Opcode::Mvn, execute_move),
    (Opcode::Movt, execute_move_top),
    (Opcode::Cmp, execute_compare),
    (Opcode::Cmn, execute_compare),
    (Opcode::Tst, execute_compare),
    (Opcode::Teq, execute_compare),
    (Opcode::Lsl, execute_shift),
    (Opcode::Lsr, execute_shift),
    (Opcode::Asr, execute_shift),
    (Opcode::Ror, execute_shift),
    (Opcode::Ldr, execute_load),
    (Opcode::Ldrh, execute_load),
    (Opcode::Ldrb, execute_load),
    (Opcode::Ldrsh, execute_load),
    (Opcode::Ldrsb, execute_load),
    (Opcode::Str, execute_store),
    (Opcode::Strh, execute_store),
    (Opcode::Strb, execute_store),
    (Opcode::Swp, execute_swap),
    (Opcode::Swpb, execute_swap),
    (Opcode::B, execute_branch),
    (Opcode::Bl, execute_branch),
    (Opcode::Bx, execute_branch),
    (Opcode::Blx, execute_branch),
    (Opcode::VaddF32, execute_float_arith),
    (Opcode::VsubF32, execute_float_arith),
    (Opcode::VmulF32, execute_float_arith),
    (Opcode::VdivF32, execute_float_arith),
    (Opcode::VcmpF32, execute_float_compare),
    (Opcode::VcvtF32S32, execute_float_convert),
    (Opcode::VcvtS32F32, execute_float_convert),
];

/// Executes one decoded instruction against `state`.
///
/// Memory side effects happen on the bus during the call; everything else is
/// returned for [`commit_execution`].
///
/// # Errors
///
/// Any bus fault the instruction's memory access raises, or
/// [`Fault::InvalidOpcode`] when the operands do not belong to the opcode.
pub fn execute_instruction(
    instruction: &DecodedInstruction,
    state: &ArchitecturalState,
    bus: &mut SystemBus,
) -> Result<ExecuteState, Fault> {
    let mut exec = ExecuteState::new(state.pc().wrapping_add(4));
    let (_, handler) = HANDLERS[instruction.opcode.index()];
    handler(instruction, state, bus, &mut exec)?;
    Ok(exec)
}

/// Applies the recorded side effects to the architectural state.
pub fn commit_execution(state: &mut ArchitecturalState, exec: &ExecuteState) {
    for (register, value) in exec.register_writes.iter().flatten() {
        state.set_gpr(*register, *value);
    }
    state.set_flags(exec.flags_update.apply(state.flags()));
    state.set_pc(exec.next_pc);
}

fn mismatch(instruction: &DecodedInstruction, state: &ArchitecturalState) -> Fault {
    Fault::InvalidOpcode {
        word: instruction.encode(),
        pc: state.pc(),
    }
}

fn execute_control(
    instruction: &DecodedInstruction,
    state: &ArchitecturalState,
    _bus: &mut SystemBus,
    exec: &mut ExecuteState,
) -> Result<(), Fault> {
    let Operands::Control { imm } = instruction.operands else {
        return Err(mismatch(instruction, state));
    };
    match instruction.opcode {
        Opcode::Hlt => {
            exec.charge(CycleCostKind::Control);
            exec.control = ControlEffect::Halt;
        }
        Opcode::Swi => {
            exec.charge(CycleCostKind::SoftwareInterrupt);
            exec.control = ControlEffect::SoftwareInterrupt { number: imm };
        }
        _ => exec.charge(CycleCostKind::Control),
    }
    Ok(())
}

fn execute_data_processing(
    instruction: &DecodedInstruction,
    state: &ArchitecturalState,
    _bus: &mut SystemBus,
    exec: &mut ExecuteState,
) -> Result<(), Fault> {
    let Operands::DataProcessing {
        set_flags,
        rd,
        rn,
        operand,
    } = instruction.operands
    else {
        return Err(mismatch(instruction, state));
    };
    let carry_in = state.flag_is_set(FLAG_C);
    let a = state.gpr(rn);
    let (b, shifter_carry) = operand2_value(operand, state, carry_in);

    let (result, flags) = match instruction.opcode {
        Opcode::Add => arithmetic(a, b, false),
        Opcode::Adc => arithmetic(a, b, carry_in),
        Opcode::Sub => arithmetic(a, !b, true),
        Opcode::Sbc => arithmetic(a, !b, carry_in),
        Opcode::Rsb => arithmetic(b, !a, true),
        Opcode::Rsc => arithmetic(b, !a, carry_in),
        Opcode::And => logical(a & b, shifter_carry),
        Opcode::Orr => logical(a | b, shifter_carry),
        Opcode::Eor => logical(a ^ b, shifter_carry),
        Opcode::Bic => logical(a & !b, shifter_carry),
        _ => return Err(mismatch(instruction, state)),
    };

    exec.charge(CycleCostKind::Alu);
    exec.write(rd, result);
    if set_flags {
        exec.flags_update = flags;
    }
    Ok(())
}

fn arithmetic(a: u32, b: u32, carry_in: bool) -> (u32, FlagsUpdate) {
    let (result, carry, overflow) = add_with_carry(a, b, carry_in);
    (result, FlagsUpdate::arithmetic(result, carry, overflow))
}

fn logical(result: u32, shifter_carry: Option<bool>) -> (u32, FlagsUpdate) {
    (result, FlagsUpdate::logical(result, shifter_carry))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn execute_multiply(
    instruction: &DecodedInstruction,
    state: &ArchitecturalState,
    _bus: &mut SystemBus,
    exec: &mut ExecuteState,
) -> Result<(), Fault> {
    let Operands::DataProcessing {
        set_flags,
        rd,
        rn,
        operand,
    } = instruction.operands
    else {
        return Err(mismatch(instruction, state));
    };
    let a = state.gpr(rn);
    let (b, _) = operand2_value(operand, state, state.flag_is_set(FLAG_C));
    let unsigned = u64::from(a) * u64::from(b);
    let signed = i64::from(a as i32) * i64::from(b as i32);

    let (result, carry, overflow) = match instruction.opcode {
        Opcode::Mul => {
            let low = unsigned as u32;
            (
                low,
                unsigned > u64::from(u32::MAX),
                signed != i64::from(low as i32),
            )
        }
        Opcode::Umulh => ((unsigned >> 32) as u32, false, false),
        Opcode::Smulh => ((signed >> 32) as u32, false, false),
        _ => return Err(mismatch(instruction, state)),
    };

    exec.charge(CycleCostKind::Multiply);
    exec.write(rd, result);
    if set_flags {
        exec.flags_update = FlagsUpdate::arithmetic(result, carry, overflow);
    }
    Ok(())
}

#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn execute_divide(
    instruction: &DecodedInstruction,
    state: &ArchitecturalState,
    _bus: &mut SystemBus,
    exec: &mut ExecuteState,
) -> Result<(), Fault> {
    let Operands::DataProcessing {
        set_flags,
        rd,
        rn,
        operand,
    } = instruction.operands
    else {
        return Err(mismatch(instruction, state));
    };
    let a = state.gpr(rn);
    let (b, _) = operand2_value(operand, state, state.flag_is_set(FLAG_C));

    let (result, overflow) = match instruction.opcode {
        Opcode::Udiv => (a.checked_div(b).unwrap_or(0), false),
        Opcode::Sdiv => {
            let (dividend, divisor) = (a as i32, b as i32);
            if divisor == 0 {
                (0, false)
            } else if dividend == i32::MIN && divisor == -1 {
                (i32::MIN as u32, true)
            } else {
                ((dividend / divisor) as u32, false)
            }
        }
        _ => return Err(mismatch(instruction, state)),
    };

    exec.charge(CycleCostKind::Divide);
    exec.write(rd, result);
    if set_flags {
        exec.flags_update = FlagsUpdate::arithmetic(result, false, overflow);
    }
    Ok(())
}

fn execute_move(
    instruction: &DecodedInstruction,
    state: &ArchitecturalState,
    _bus: &mut SystemBus,
    exec: &mut ExecuteState,
) -> Result<(), Fault> {
    let Operands::Move {
        set_flags,
        rd,
        operand,
    } = instruction.operands
    else {
        return Err(mismatch(instruction, state));
    };
    let (value, shifter_carry) = operand2_value(operand, state, state.flag_is_set(FLAG_C));
    let result = match instruction.opcode {
        Opcode::Mov => value,
        Opcode::Mvn => !value,
        _ => return Err(mismatch(instruction, state)),
    };

    exec.charge(CycleCostKind::Alu);
    exec.write(rd, result);
    if set_flags {
        exec.flags_update = FlagsUpdate::logical(result, shifter_carry);
    }
    Ok(())
}

fn execute_move_top(
    instruction: &DecodedInstruction,
    state: &ArchitecturalState,
    _bus: &mut SystemBus,
    exec: &mut ExecuteState,
) -> Result<(), Fault> {
    let Operands::MoveTop { rd, imm } = instruction.operands else {
        return Err(mismatch(instruction, state));
    };
    exec.charge(CycleCostKind::Alu);
    exec.write(rd, (state.gpr(rd) & 0xFFFF) | (u32::from(imm) << 16));
    Ok(())
}

fn execute_compare(
    instruction: &DecodedInstruction,
    state: &ArchitecturalState,
    _bus: &mut SystemBus,
    exec: &mut ExecuteState,
) -> Result<(), Fault> {
    let Operands::Compare { rn, operand } = instruction.operands else {
        return Err(mismatch(instruction, state));
    };
    let a = state.gpr(rn);
    let (b, shifter_carry) = operand2_value(operand, state, state.flag_is_set(FLAG_C));
    let (_, flags) = match instruction.opcode {
        Opcode::Cmp => arithmetic(a, !b, true),
        Opcode::Cmn => arithmetic(a, b, false),
        Opcode::Tst => logical(a & b, shifter_carry),
        Opcode::Teq => logical(a ^ b, shifter_carry),
        _ => return Err(mismatch(instruction, state)),
    };
    exec.charge(CycleCostKind::Alu);
    exec.flags_update = flags;
    Ok(())
}

fn execute_shift(
    instruction: &DecodedInstruction,
    state: &ArchitecturalState,
    _bus: &mut SystemBus,
    exec: &mut ExecuteState,
) -> Result<(), Fault> {
    let Operands::Shift {
        set_flags,
        rd,
        rn,
        amount,
    } = instruction.operands
    else {
        return Err(mismatch(instruction, state));
    };
    let shift = match instruction.opcode {
        Opcode::Lsl => ShiftType::Lsl,
        Opcode::Lsr => ShiftType::Lsr,
        Opcode::Asr => ShiftType::Asr,
        Opcode::Ror => ShiftType::Ror,
        _ => return Err(mismatch(instruction, state)),
    };
    let carry_in = state.flag_is_set(FLAG_C);
    let (result, carry) = barrel_shift(state.gpr(rn), shift, shift_amount(amount, state), carry_in);

    exec.charge(CycleCostKind::Shift);
    exec.write(rd, result);
    if set_flags {
        exec.flags_update = FlagsUpdate::logical(result, Some(carry));
    }
    Ok(())
}

fn memory_operands(
    instruction: &DecodedInstruction,
    state: &ArchitecturalState,
) -> Result<(Register, EffectiveAddress), Fault> {
    let Operands::Memory {
        mode,
        rt,
        rn,
        offset,
        add,
    } = instruction.operands
    else {
        return Err(mismatch(instruction, state));
    };
    Ok((rt, compute_effective_address(mode, rn, offset, add, state)))
}

fn execute_load(
    instruction: &DecodedInstruction,
    state: &ArchitecturalState,
    bus: &mut SystemBus,
    exec: &mut ExecuteState,
) -> Result<(), Fault> {
    let (rt, effective) = memory_operands(instruction, state)?;
    let value = match instruction.opcode {
        Opcode::Ldr => bus.read(effective.address, Width::Word)?,
        Opcode::Ldrh => bus.read(effective.address, Width::Halfword)?,
        Opcode::Ldrb => bus.read(effective.address, Width::Byte)?,
        Opcode::Ldrsh => sign_extend(bus.read(effective.address, Width::Halfword)?, 16),
        Opcode::Ldrsb => sign_extend(bus.read(effective.address, Width::Byte)?, 8),
        _ => return Err(mismatch(instruction, state)),
    };

    exec.charge(CycleCostKind::Load);
    // The loaded value wins when rt is also the written-back base.
    if let Some((rn, base)) = effective.writeback {
        exec.write(rn, base);
    }
    exec.write(rt, value);
    Ok(())
}

fn execute_store(
    instruction: &DecodedInstruction,
    state: &ArchitecturalState,
    bus: &mut SystemBus,
    exec: &mut ExecuteState,
) -> Result<(), Fault> {
    let (rt, effective) = memory_operands(instruction, state)?;
    let width = match instruction.opcode {
        Opcode::Str => Width::Word,
        Opcode::Strh => Width::Halfword,
        Opcode::Strb => Width::Byte,
        _ => return Err(mismatch(instruction, state)),
    };
    bus.write(effective.address, width, state.gpr(rt))?;

    exec.charge(CycleCostKind::Store);
    if let Some((rn, base)) = effective.writeback {
        exec.write(rn, base);
    }
    Ok(())
}

fn execute_swap(
    instruction: &DecodedInstruction,
    state: &ArchitecturalState,
    bus: &mut SystemBus,
    exec: &mut ExecuteState,
) -> Result<(), Fault> {
    let Operands::Atomic { rd, rm, rn } = instruction.operands else {
        return Err(mismatch(instruction, state));
    };
    let width = match instruction.opcode {
        Opcode::Swp => Width::Word,
        Opcode::Swpb => Width::Byte,
        _ => return Err(mismatch(instruction, state)),
    };
    let old = bus.swap(state.gpr(rn), width, state.gpr(rm))?;

    exec.charge(CycleCostKind::Swap);
    exec.write(rd, old);
    Ok(())
}

#[allow(clippy::cast_sign_loss)]
fn execute_branch(
    instruction: &DecodedInstruction,
    state: &ArchitecturalState,
    _bus: &mut SystemBus,
    exec: &mut ExecuteState,
) -> Result<(), Fault> {
    let Operands::Branch { condition, target } = instruction.operands else {
        return Err(mismatch(instruction, state));
    };
    if !condition.passes(state.flags()) {
        exec.charge(CycleCostKind::BranchNotTaken);
        return Ok(());
    }

    let pc = state.pc();
    let destination = match target {
        BranchTarget::Relative(words) => pc.wrapping_add(words.wrapping_mul(4) as u32),
        BranchTarget::Register(rm) => state.gpr(rm),
    };
    if matches!(instruction.opcode, Opcode::Bl | Opcode::Blx) {
        exec.write(Register::LR, pc.wrapping_add(4));
    }
    exec.charge(CycleCostKind::BranchTaken);
    exec.next_pc = destination;
    Ok(())
}

fn execute_float_arith(
    instruction: &DecodedInstruction,
    state: &ArchitecturalState,
    _bus: &mut SystemBus,
    exec: &mut ExecuteState,
) -> Result<(), Fault> {
    let Operands::FloatArith { rd, rn, rm } = instruction.operands else {
        return Err(mismatch(instruction, state));
    };
    let a = f32::from_bits(state.gpr(rn));
    let b = f32::from_bits(state.gpr(rm));
    let result = match instruction.opcode {
        Opcode::VaddF32 => a + b,
        Opcode::VsubF32 => a - b,
        Opcode::VmulF32 => a * b,
        Opcode::VdivF32 => a / b,
        _ => return Err(mismatch(instruction, state)),
    };
    exec.charge(if instruction.opcode == Opcode::VdivF32 {
        CycleCostKind::FloatDivide
    } else {
        CycleCostKind::FloatArith
    });
    exec.write(rd, result.to_bits());
    Ok(())
}

fn execute_float_compare(
    instruction: &DecodedInstruction,
    state: &ArchitecturalState,
    _bus: &mut SystemBus,
    exec: &mut ExecuteState,
) -> Result<(), Fault> {
    let Operands::FloatCompare { rn, rm } = instruction.operands else {
        return Err(mismatch(instruction, state));
    };
    let a = f32::from_bits(state.gpr(rn));
    let b = f32::from_bits(state.gpr(rm));
    let flags = match a.partial_cmp(&b) {
        Some(std::cmp::Ordering::Equal) => FLAG_Z | FLAG_C,
        Some(std::cmp::Ordering::Less) => FLAG_N,
        Some(std::cmp::Ordering::Greater) => FLAG_C,
        None => FLAG_C | FLAG_V,
    };
    exec.charge(CycleCostKind::FloatCompare);
    exec.flags_update = FlagsUpdate::Nzcv {
        negative: flags & FLAG_N != 0,
        zero: flags & FLAG_Z != 0,
        carry: flags & FLAG_C != 0,
        overflow: flags & FLAG_V != 0,
    };
    Ok(())
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
fn execute_float_convert(
    instruction: &DecodedInstruction,
    state: &ArchitecturalState,
    _bus: &mut SystemBus,
    exec: &mut ExecuteState,
) -> Result<(), Fault> {
    let Operands::FloatConvert { rd, rn } = instruction.operands else {
        return Err(mismatch(instruction, state));
    };
    let source = state.gpr(rn);
    let result = match instruction.opcode {
        Opcode::VcvtF32S32 => ((source as i32) as f32).to_bits(),
        // `as` saturates and maps NaN to zero.
        Opcode::VcvtS32F32 => (f32::from_bits(source) as i32) as u32,
        _ => return Err(mismatch(instruction, state)),
    };
    exec.charge(CycleCostKind::FloatArith);
    exec.write(rd, result);
    Ok(())
}

const fn sign_extend(value: u32, bits: u32) -> u32 {
    let shift = 32 - bits;
    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    let extended = (((value << shift) as i32) >> shift) as u32;
    extended
}

#[cfg(test)]
mod tests {
    use super::{commit_execution, execute_instruction, sign_extend, ExecuteState, HANDLERS};
    use crate::bus::SystemBus;
    use crate::decoder::{
        BranchTarget, Condition, DecodedInstruction, Decoder, Operand2, Operands, ShiftAmount,
    };
    use crate::encoding::{Opcode, OPCODE_TABLE};
    use crate::memory::{BusLayout, Disk, Ram, Rom, Width};
    use crate::mmu::{PageRanges, PAGE_SIZE};
    use crate::state::{ArchitecturalState, Register, FLAG_C, FLAG_N, FLAG_V, FLAG_Z};
    use crate::Fault;

    const RAM_BASE: u32 = 0x1000_0000;

    fn bus() -> SystemBus {
        SystemBus::new(
            Ram::new(RAM_BASE, PAGE_SIZE * 4),
            Rom::new(0, PAGE_SIZE),
            Disk::new(0),
            &BusLayout::default(),
            PageRanges {
                user_low: 0,
                user_high: 1,
                kernel_low: 2,
                kernel_high: 3,
            },
        )
        .expect("valid layout")
    }

    fn run(instruction: DecodedInstruction, state: &mut ArchitecturalState, bus: &mut SystemBus) -> ExecuteState {
        let exec = execute_instruction(&instruction, state, bus).expect("no fault");
        commit_execution(state, &exec);
        exec
    }

    fn dp(opcode: Opcode, set_flags: bool, rn: u32, operand: u32) -> (DecodedInstruction, ArchitecturalState) {
        let mut state = ArchitecturalState::default();
        state.set_gpr(Register::R1, rn);
        state.set_gpr(Register::R2, operand);
        let instruction = DecodedInstruction {
            opcode,
            operands: Operands::DataProcessing {
                set_flags,
                rd: Register::R0,
                rn: Register::R1,
                operand: Operand2::register(Register::R2),
            },
        };
        (instruction, state)
    }

    #[test]
    fn handler_table_matches_opcode_order() {
        for (index, ((_, opcode), (handler_opcode, _))) in
            OPCODE_TABLE.iter().zip(HANDLERS.iter()).enumerate()
        {
            assert_eq!(opcode, handler_opcode);
            assert_eq!(handler_opcode.index(), index);
        }
    }

    #[test]
    fn add_sets_carry_without_overflow() {
        let mut bus = bus();
        let (instruction, mut state) = dp(Opcode::Add, true, u32::MAX, 1);
        run(instruction, &mut state, &mut bus);
        assert_eq!(state.gpr(Register::R0), 0);
        assert_eq!(state.flags(), FLAG_Z | FLAG_C);
    }

    #[test]
    fn add_sets_overflow_without_carry() {
        let mut bus = bus();
        let (instruction, mut state) = dp(Opcode::Add, true, 0x7FFF_FFFF, 1);
        run(instruction, &mut state, &mut bus);
        assert_eq!(state.flags(), FLAG_N | FLAG_V);
    }

    #[test]
    fn flags_untouched_without_s_bit() {
        let mut bus = bus();
        let (instruction, mut state) = dp(Opcode::Sub, false, 0, 1);
        state.set_flags(FLAG_V);
        run(instruction, &mut state, &mut bus);
        assert_eq!(state.gpr(Register::R0), u32::MAX);
        assert_eq!(state.flags(), FLAG_V);
    }

    #[test]
    fn sbc_and_rsc_consume_carry() {
        let mut bus = bus();
        let (instruction, mut state) = dp(Opcode::Sbc, false, 10, 3);
        run(instruction, &mut state, &mut bus);
        assert_eq!(state.gpr(Register::R0), 6);

        let (instruction, mut state) = dp(Opcode::Rsc, false, 3, 10);
        state.set_flags(FLAG_C);
        run(instruction, &mut state, &mut bus);
        assert_eq!(state.gpr(Register::R0), 7);
    }

    #[test]
    fn multiply_reports_unsigned_and_signed_overflow() {
        let mut bus = bus();
        let (instruction, mut state) = dp(Opcode::Mul, true, 0x1_0000, 0x1_0000);
        run(instruction, &mut state, &mut bus);
        assert_eq!(state.gpr(Register::R0), 0);
        assert_eq!(state.flags(), FLAG_Z | FLAG_C | FLAG_V);

        let (instruction, mut state) = dp(Opcode::Smulh, false, u32::MAX, 2);
        run(instruction, &mut state, &mut bus);
        assert_eq!(state.gpr(Register::R0), u32::MAX);
    }

    #[test]
    fn division_edge_cases() {
        let mut bus = bus();
        let (instruction, mut state) = dp(Opcode::Udiv, false, 7, 0);
        run(instruction, &mut state, &mut bus);
        assert_eq!(state.gpr(Register::R0), 0);

        let (instruction, mut state) = dp(Opcode::Sdiv, true, 0x8000_0000, u32::MAX);
        run(instruction, &mut state, &mut bus);
        assert_eq!(state.gpr(Register::R0), 0x8000_0000);
        assert_eq!(state.flags(), FLAG_N | FLAG_V);

        let (instruction, mut state) = dp(Opcode::Sdiv, false, (-7i32) as u32, 2);
        run(instruction, &mut state, &mut bus);
        assert_eq!(state.gpr(Register::R0), (-3i32) as u32);
    }

    #[test]
    fn logical_with_plain_register_preserves_carry() {
        let mut bus = bus();
        let (instruction, mut state) = dp(Opcode::And, true, 0xF0, 0x0F);
        state.set_flags(FLAG_C | FLAG_V);
        run(instruction, &mut state, &mut bus);
        assert_eq!(state.flags(), FLAG_Z | FLAG_C | FLAG_V);
    }

    #[test]
    fn compare_discards_result() {
        let mut bus = bus();
        let mut state = ArchitecturalState::default();
        state.set_gpr(Register::R1, 5);
        let instruction = DecodedInstruction {
            opcode: Opcode::Cmp,
            operands: Operands::Compare {
                rn: Register::R1,
                operand: Operand2::Immediate(5),
            },
        };
        run(instruction, &mut state, &mut bus);
        assert_eq!(state.gpr(Register::R1), 5);
        assert_eq!(state.gpr(Register::R0), 0);
        assert_eq!(state.flags(), FLAG_Z | FLAG_C);
    }

    #[test]
    fn movt_keeps_low_half() {
        let mut bus = bus();
        let mut state = ArchitecturalState::default();
        state.set_gpr(Register::R3, 0x1234_5678);
        let instruction = DecodedInstruction {
            opcode: Opcode::Movt,
            operands: Operands::MoveTop {
                rd: Register::R3,
                imm: 0xABCD,
            },
        };
        run(instruction, &mut state, &mut bus);
        assert_eq!(state.gpr(Register::R3), 0xABCD_5678);
    }

    #[test]
    fn shift_by_register_sets_carry_only_with_s_bit() {
        let mut bus = bus();
        let mut state = ArchitecturalState::default();
        state.set_gpr(Register::R1, 0x8000_0001);
        state.set_gpr(Register::R2, 1);
        let mut instruction = DecodedInstruction {
            opcode: Opcode::Lsl,
            operands: Operands::Shift {
                set_flags: false,
                rd: Register::R0,
                rn: Register::R1,
                amount: ShiftAmount::Register(Register::R2),
            },
        };
        run(instruction, &mut state, &mut bus);
        assert_eq!(state.gpr(Register::R0), 2);
        assert_eq!(state.flags(), 0);

        if let Operands::Shift { set_flags, .. } = &mut instruction.operands {
            *set_flags = true;
        }
        run(instruction, &mut state, &mut bus);
        assert_eq!(state.flags(), FLAG_C);
    }

    #[test]
    fn branch_link_and_condition() {
        let mut bus = bus();
        let mut state = ArchitecturalState::default();
        state.set_pc(0x100);
        let branch = |opcode, condition| DecodedInstruction {
            opcode,
            operands: Operands::Branch {
                condition,
                target: BranchTarget::Relative(-2),
            },
        };
        let exec = run(branch(Opcode::Bl, Condition::Eq), &mut state, &mut bus);
        assert_eq!(state.pc(), 0x104);
        assert_eq!(state.gpr(Register::LR), 0);
        assert_eq!(exec.cycles, 1);

        state.set_flags(FLAG_Z);
        let exec = run(branch(Opcode::Bl, Condition::Eq), &mut state, &mut bus);
        assert_eq!(state.pc(), 0xFC);
        assert_eq!(state.gpr(Register::LR), 0x108);
        assert_eq!(exec.cycles, 3);
    }

    #[test]
    fn bx_jumps_to_register() {
        let mut bus = bus();
        let mut state = ArchitecturalState::default();
        state.set_gpr(Register::LR, 0x2000);
        let word = 0x72E0_0000 | (Register::LR.bits() << 16);
        let instruction = Decoder::decode(word).instruction().expect("valid bx");
        run(instruction, &mut state, &mut bus);
        assert_eq!(state.pc(), 0x2000);
    }

    #[test]
    fn float_compare_orders_and_handles_nan() {
        let mut bus = bus();
        let cases = [
            (1.0f32, 1.0f32, FLAG_Z | FLAG_C),
            (1.0, 2.0, FLAG_N),
            (2.0, 1.0, FLAG_C),
            (f32::NAN, 1.0, FLAG_C | FLAG_V),
        ];
        for (a, b, expected) in cases {
            let mut state = ArchitecturalState::default();
            state.set_gpr(Register::R1, a.to_bits());
            state.set_gpr(Register::R2, b.to_bits());
            let instruction = DecodedInstruction {
                opcode: Opcode::VcmpF32,
                operands: Operands::FloatCompare {
                    rn: Register::R1,
                    rm: Register::R2,
                },
            };
            run(instruction, &mut state, &mut bus);
            assert_eq!(state.flags(), expected, "{a} vs {b}");
        }
    }

    #[test]
    fn float_conversion_saturates() {
        let mut bus = bus();
        let convert = |opcode| DecodedInstruction {
            opcode,
            operands: Operands::FloatConvert {
                rd: Register::R0,
                rn: Register::R1,
            },
        };
        let mut state = ArchitecturalState::default();
        for (input, expected) in [
            (1.0e20f32, i32::MAX),
            (-1.0e20, i32::MIN),
            (f32::NAN, 0),
            (-2.75, -2),
        ] {
            state.set_gpr(Register::R1, input.to_bits());
            run(convert(Opcode::VcvtS32F32), &mut state, &mut bus);
            assert_eq!(state.gpr(Register::R0), expected as u32);
        }
        state.set_gpr(Register::R1, (-3i32) as u32);
        run(convert(Opcode::VcvtF32S32), &mut state, &mut bus);
        assert_eq!(state.gpr(Register::R0), (-3.0f32).to_bits());
    }

    #[test]
    fn faulting_store_commits_nothing() {
        let mut bus = bus();
        let mut state = ArchitecturalState::default();
        state.set_gpr(Register::R1, 0x10);
        // str x0, [x1, #4]! into ROM
        let word = 0x5540_0000 | (1 << 14) | (1 << 13) | (1 << 12) | 4;
        let instruction = Decoder::decode(word).instruction().expect("valid str");
        assert_eq!(
            execute_instruction(&instruction, &state, &mut bus),
            Err(Fault::WriteToReadOnly { address: 0x14 })
        );
        assert_eq!(state.gpr(Register::R1), 0x10);
    }

    #[test]
    fn load_sign_extension() {
        assert_eq!(sign_extend(0x80, 8), 0xFFFF_FF80);
        assert_eq!(sign_extend(0x7FFF, 16), 0x7FFF);
        let mut bus = bus();
        bus.write(RAM_BASE, Width::Halfword, 0xFFFE).expect("ram");
        let mut state = ArchitecturalState::default();
        state.set_gpr(Register::R1, RAM_BASE);
        // ldrsh x0, [x1, #0]
        let word = 0x5300_0000 | (1 << 14) | (1 << 13) | (1 << 12);
        let instruction = Decoder::decode(word).instruction().expect("valid ldrsh");
        run(instruction, &mut state, &mut bus);
        assert_eq!(state.gpr(Register::R0), (-2i32) as u32);
    }
}
