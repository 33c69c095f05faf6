//! 32-bit register-machine emulator core with paged virtual memory.

/// Fault taxonomy and construction errors.
pub mod fault;
pub use fault::{Access, ConfigError, Fault, FaultClass, FaultKind, PagePool};

/// Architectural CPU state model primitives.
pub mod state;
pub use state::{
    ArchitecturalState, Register, RunState, FLAGS_ACTIVE_MASK, FLAG_C, FLAG_N, FLAG_V, FLAG_Z,
    GENERAL_REGISTER_COUNT,
};

/// Opcode table and format groups.
pub mod encoding;
pub use encoding::{classify_opcode, Format, Opcode, OPCODE_COUNT, OPCODE_TABLE};

/// Instruction decoder with field extraction and validation.
pub mod decoder;
pub use decoder::{
    AddressingMode, BranchTarget, Condition, Decoded, DecodedInstruction, Decoder, MemoryOffset,
    Operand2, Operands, ShiftAmount, ShiftType,
};

/// Instruction disassembly for traces and diagnostics.
pub mod disasm;
pub use disasm::{disassemble, disassemble_one, DisassemblyRow};

/// Instruction cycle-cost table.
pub mod timing;
pub use timing::{cycle_cost, CycleCostKind, CYCLE_COST_TABLE};

/// Memory devices and bus region layout.
pub mod memory;
pub use memory::{BusLayout, Disk, MemoryRegion, Ram, Rom, Width};

/// Virtual memory manager.
pub mod mmu;
pub use mmu::{
    FreePagePool, Mmu, MmuStats, PageDirectory, PageLocation, PageRanges, PageTableEntry,
    Permissions, Privilege, PAGE_SHIFT, PAGE_SIZE,
};

/// Address-range router.
pub mod bus;
pub use bus::SystemBus;

/// Instruction execution pipeline.
pub mod execute;
pub use execute::{commit_execution, execute_instruction, ControlEffect, ExecuteState, FlagsUpdate};

/// Execution counters.
pub mod diag;
pub use diag::CpuStats;

/// Host-facing configuration and run results.
pub mod api;
pub use api::{CpuConfig, RunOutcome, StepOutcome, StopReason};

/// Emulator instance and run loop.
pub mod cpu;
pub use cpu::Cpu;

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
