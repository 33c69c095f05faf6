//! Host-facing configuration and run-result types.

use crate::memory::BusLayout;
use crate::mmu::{PageRanges, Privilege};
use crate::{ArchitecturalState, Fault};

/// Construction parameters for a [`Cpu`](crate::Cpu).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct CpuConfig {
    /// Placement of the MMU-translated window.
    pub layout: BusLayout,
    /// User and kernel frame ranges.
    pub page_ranges: PageRanges,
    /// Address of the word that holds the initial PC.
    pub reset_vector: u32,
    /// `swi` target. When `None`, `swi` stops the run loop instead.
    pub trap_vector: Option<u32>,
    /// Privilege applied to core accesses.
    pub privilege: Privilege,
    /// Creates and selects a first process during construction.
    pub initial_process: bool,
}

impl Default for CpuConfig {
    fn default() -> Self {
        Self {
            layout: BusLayout::default(),
            page_ranges: PageRanges::default(),
            reset_vector: 0,
            trap_vector: None,
            privilege: Privilege::Kernel,
            initial_process: true,
        }
    }
}

/// Why a `run` call returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum StopReason {
    /// A `hlt` retired, or the core was already halted.
    Halted,
    /// The instruction budget ran out.
    BudgetExhausted,
    /// An untrapped `swi` retired.
    SoftwareInterrupt {
        /// Interrupt number.
        number: u32,
    },
    /// The instruction at `PC` faulted and committed nothing.
    Fault(Fault),
}

impl StopReason {
    /// Returns the fault, if the run stopped on one.
    #[must_use]
    pub const fn fault(self) -> Option<Fault> {
        match self {
            Self::Fault(fault) => Some(fault),
            Self::Halted | Self::BudgetExhausted | Self::SoftwareInterrupt { .. } => None,
        }
    }
}

/// Result of one instruction attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepOutcome {
    /// Instruction retired and execution continues.
    Retired {
        /// Cycles the instruction cost.
        cycles: u32,
    },
    /// `hlt` retired.
    Halted,
    /// Untrapped `swi` retired.
    SoftwareInterrupt {
        /// Interrupt number.
        number: u32,
    },
    /// Fetch, decode or execute faulted.
    Fault(Fault),
}

/// Aggregated result of a `run` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    /// Terminal condition.
    pub reason: StopReason,
    /// Instructions retired during this call.
    pub executed: u64,
    /// Cycles consumed during this call.
    pub cycles: u64,
    /// Architectural state when the call returned.
    pub snapshot: ArchitecturalState,
}
