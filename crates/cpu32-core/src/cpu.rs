//! The emulator instance: register file, run loop and bus.

use log::{trace, warn};

use crate::api::{CpuConfig, RunOutcome, StepOutcome, StopReason};
use crate::bus::SystemBus;
use crate::decoder::Decoder;
use crate::diag::CpuStats;
use crate::execute::{commit_execution, execute_instruction, ControlEffect, ExecuteState};
use crate::memory::{Disk, Ram, Rom, Width};
use crate::mmu::{Mmu, Permissions};
use crate::state::{ArchitecturalState, Register, RunState};
use crate::{ConfigError, Fault};

/// A single emulated core together with the devices it owns.
#[derive(Debug, Clone)]
pub struct Cpu {
    config: CpuConfig,
    state: ArchitecturalState,
    run_state: RunState,
    bus: SystemBus,
    stats: CpuStats,
}

impl Cpu {
    /// Builds a core over explicit devices and resets it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the bus layout or page ranges are invalid.
    pub fn new(config: CpuConfig, ram: Ram, rom: Rom, disk: Disk) -> Result<Self, ConfigError> {
        let mut bus = SystemBus::new(ram, rom, disk, &config.layout, config.page_ranges)?;
        bus.set_privilege(config.privilege);
        if config.initial_process {
            bus.paging().0.begin_process();
        }
        let mut cpu = Self {
            config,
            state: ArchitecturalState::default(),
            run_state: RunState::Running,
            bus,
            stats: CpuStats::default(),
        };
        cpu.reset();
        Ok(cpu)
    }

    /// Restores registers, flags, run state and counters, then loads `PC` from
    /// the reset vector. Memory contents and MMU state are kept.
    pub fn reset(&mut self) {
        self.state.reset();
        self.run_state = RunState::Running;
        self.stats.reset();
        self.bus.set_privilege(self.config.privilege);
        let vector = self.config.reset_vector;
        match self.bus.read(vector, Width::Word) {
            Ok(pc) => self.state.set_pc(pc),
            Err(fault) => {
                warn!("cpu: reset vector {vector:#010x} unreadable ({fault}), starting at 0");
                self.state.set_pc(0);
            }
        }
    }

    /// Executes up to `max_instructions` instructions.
    ///
    /// Stops early on `hlt`, an untrapped `swi`, or a fault. A halted core
    /// returns at once; a faulted core retries the faulting instruction.
    pub fn run(&mut self, max_instructions: u64) -> RunOutcome {
        let start = self.stats;
        let mut executed = 0u64;
        let reason = loop {
            if self.run_state == RunState::Halted {
                break StopReason::Halted;
            }
            if executed >= max_instructions {
                break StopReason::BudgetExhausted;
            }
            executed += 1;
            match self.step() {
                StepOutcome::Retired { .. } => {}
                StepOutcome::Halted => break StopReason::Halted,
                StepOutcome::SoftwareInterrupt { number } => {
                    break StopReason::SoftwareInterrupt { number };
                }
                StepOutcome::Fault(fault) => break StopReason::Fault(fault),
            }
        };
        RunOutcome {
            reason,
            executed: self.stats.instructions - start.instructions,
            cycles: self.stats.cycles - start.cycles,
            snapshot: self.state,
        }
    }

    /// Fetches, decodes and executes one instruction.
    pub fn step(&mut self) -> StepOutcome {
        if self.run_state == RunState::Halted {
            return StepOutcome::Halted;
        }
        let pc = self.state.pc();
        let exec = match self.execute_at(pc) {
            Ok(exec) => exec,
            Err(fault) => {
                warn!("cpu: {fault}");
                self.stats.record_fault(fault);
                self.run_state = RunState::Faulted(fault);
                return StepOutcome::Fault(fault);
            }
        };

        commit_execution(&mut self.state, &exec);
        self.stats.record_retired(exec.cycles);
        self.run_state = RunState::Running;
        match exec.control {
            ControlEffect::None => StepOutcome::Retired {
                cycles: exec.cycles,
            },
            ControlEffect::Halt => {
                self.run_state = RunState::Halted;
                StepOutcome::Halted
            }
            ControlEffect::SoftwareInterrupt { number } => match self.config.trap_vector {
                Some(vector) => {
                    self.state.set_gpr(Register::LR, exec.next_pc);
                    self.state.set_pc(vector);
                    StepOutcome::Retired {
                        cycles: exec.cycles,
                    }
                }
                None => StepOutcome::SoftwareInterrupt { number },
            },
        }
    }

    fn execute_at(&mut self, pc: u32) -> Result<ExecuteState, Fault> {
        let word = self.bus.fetch(pc)?;
        let instruction = Decoder::decode(word).into_result(pc)?;
        trace!("{pc:#010x}: {word:#010x}  {instruction}");
        execute_instruction(&instruction, &self.state, &mut self.bus)
    }

    /// Copies `bytes` into memory at `base`; ROM accepts the write here.
    ///
    /// # Errors
    ///
    /// Any routing or translation fault.
    pub fn load_image(&mut self, base: u32, bytes: &[u8]) -> Result<(), Fault> {
        self.bus.load_image(base, bytes)
    }

    /// Stores little-endian `words` at `base` and points `PC` at the first one.
    ///
    /// # Errors
    ///
    /// Any routing or translation fault.
    pub fn load_program(&mut self, base: u32, words: &[u32]) -> Result<(), Fault> {
        let bytes: Vec<u8> = words.iter().flat_map(|word| word.to_le_bytes()).collect();
        self.bus.load_image(base, &bytes)?;
        self.state.set_pc(base);
        self.run_state = RunState::Running;
        Ok(())
    }

    /// Reads memory through the bus with the core's privilege.
    ///
    /// # Errors
    ///
    /// Any routing, device or translation fault.
    pub fn read_memory(&mut self, address: u32, width: Width) -> Result<u32, Fault> {
        self.bus.read(address, width)
    }

    /// Writes memory through the bus with the core's privilege.
    ///
    /// # Errors
    ///
    /// Any routing, device or translation fault.
    pub fn write_memory(&mut self, address: u32, width: Width, value: u32) -> Result<(), Fault> {
        self.bus.write(address, width, value)
    }

    /// Maps `vpage` in the current process onto a fresh frame.
    ///
    /// # Errors
    ///
    /// See [`Mmu::add_vpage`].
    pub fn map_page(
        &mut self,
        vpage: u32,
        permissions: Permissions,
        copy_on_write: bool,
    ) -> Result<u32, Fault> {
        self.bus.map_page(vpage, permissions, copy_on_write)
    }

    /// Value of a general-purpose register.
    #[must_use]
    pub const fn register(&self, register: Register) -> u32 {
        self.state.gpr(register)
    }

    /// Overwrites a general-purpose register.
    pub const fn set_register(&mut self, register: Register, value: u32) {
        self.state.set_gpr(register, value);
    }

    /// Program counter.
    #[must_use]
    pub const fn pc(&self) -> u32 {
        self.state.pc()
    }

    /// Overwrites the program counter.
    pub const fn set_pc(&mut self, value: u32) {
        self.state.set_pc(value);
    }

    /// FLAGS register.
    #[must_use]
    pub const fn flags(&self) -> u32 {
        self.state.flags()
    }

    /// Sets FLAGS; bits outside N/Z/C/V are discarded.
    pub const fn set_flags(&mut self, value: u32) {
        self.state.set_flags(value);
    }

    /// Returns `true` when `flag` (one of the `FLAG_*` masks) is set.
    #[must_use]
    pub const fn flag(&self, flag: u32) -> bool {
        self.state.flag_is_set(flag)
    }

    /// Sets or clears one flag.
    pub const fn set_flag(&mut self, flag: u32, enabled: bool) {
        self.state.set_flag(flag, enabled);
    }

    /// Architectural register state.
    #[must_use]
    pub const fn state(&self) -> &ArchitecturalState {
        &self.state
    }

    /// Current run state.
    #[must_use]
    pub const fn run_state(&self) -> RunState {
        self.run_state
    }

    /// Counters since the last reset.
    #[must_use]
    pub const fn stats(&self) -> &CpuStats {
        &self.stats
    }

    /// Configuration the core was built with.
    #[must_use]
    pub const fn config(&self) -> &CpuConfig {
        &self.config
    }

    /// System bus.
    #[must_use]
    pub const fn bus(&self) -> &SystemBus {
        &self.bus
    }

    /// System bus, for host-side device access.
    pub const fn bus_mut(&mut self) -> &mut SystemBus {
        &mut self.bus
    }

    /// MMU.
    #[must_use]
    pub const fn mmu(&self) -> &Mmu {
        self.bus.mmu()
    }

    /// MMU for process and mapping management.
    pub fn mmu_mut(&mut self) -> &mut Mmu {
        self.bus.paging().0
    }
}
