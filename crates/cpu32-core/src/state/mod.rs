//! Architectural CPU state model primitives.

/// Architectural register file types and storage model.
pub mod registers;
/// Run-state machine.
pub mod run_state;

pub use registers::{
    ArchitecturalState, Register, FLAGS_ACTIVE_MASK, FLAG_C, FLAG_N, FLAG_V, FLAG_Z,
    GENERAL_REGISTER_COUNT,
};
pub use run_state::RunState;
