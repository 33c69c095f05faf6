/// Instruction classes that have fixed logical cycle costs in the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CycleCostKind {
    /// `nop`, `hlt`.
    Control,
    /// Software interrupt issue.
    SoftwareInterrupt,
    /// Integer add/sub/logic/move/compare.
    Alu,
    /// Integer multiply low/high.
    Multiply,
    /// Integer divide.
    Divide,
    /// Barrel shift instructions.
    Shift,
    /// Memory read.
    Load,
    /// Memory write.
    Store,
    /// Atomic read-modify-write swap.
    Swap,
    /// Conditional branch when the condition fails.
    BranchNotTaken,
    /// Branch taken.
    BranchTaken,
    /// Float add/sub/mul and conversions.
    FloatArith,
    /// Float divide.
    FloatDivide,
    /// Float compare.
    FloatCompare,
}

/// Single source-of-truth cycle-cost table.
pub const CYCLE_COST_TABLE: &[(CycleCostKind, u32)] = &[
    (CycleCostKind::Control, 1),
    (CycleCostKind::SoftwareInterrupt, 3),
    (CycleCostKind::Alu, 1),
    (CycleCostKind::Multiply, 3),
    (CycleCostKind::Divide, 12),
    (CycleCostKind::Shift, 1),
    (CycleCostKind::Load, 2),
    (CycleCostKind::Store, 2),
    (CycleCostKind::Swap, 4),
    (CycleCostKind::BranchNotTaken, 1),
    (CycleCostKind::BranchTaken, 3),
    (CycleCostKind::FloatArith, 4),
    (CycleCostKind::FloatDivide, 14),
    (CycleCostKind::FloatCompare, 2),
];

/// Looks up the cycle cost for a cycle-cost kind.
#[must_use]
pub fn cycle_cost(kind: CycleCostKind) -> u32 {
    CYCLE_COST_TABLE
        .iter()
        .find_map(|(entry_kind, cycles)| (*entry_kind == kind).then_some(*cycles))
        .unwrap_or(1)
}
