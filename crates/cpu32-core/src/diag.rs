//! Execution counters.

use crate::{Fault, FaultClass};

/// Saturating execution and fault counters kept by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct CpuStats {
    /// Retired instructions.
    pub instructions: u64,
    /// Consumed cycles.
    pub cycles: u64,
    /// Most recent fault.
    pub last_fault: Option<Fault>,
    /// Decode-class faults.
    pub decode_faults: u64,
    /// Memory-class faults.
    pub memory_faults: u64,
    /// Paging-class faults.
    pub paging_faults: u64,
    /// Resource-class faults.
    pub resource_faults: u64,
    /// Consistency-class faults.
    pub consistency_faults: u64,
    /// Process-class faults.
    pub process_faults: u64,
}

impl CpuStats {
    /// Records a retired instruction and its cost.
    pub fn record_retired(&mut self, cycles: u32) {
        self.instructions = self.instructions.saturating_add(1);
        self.cycles = self.cycles.saturating_add(u64::from(cycles));
    }

    /// Records a fault, bumping its class counter.
    pub const fn record_fault(&mut self, fault: Fault) {
        self.last_fault = Some(fault);
        let counter = match fault.kind().class() {
            FaultClass::Decode => &mut self.decode_faults,
            FaultClass::Memory => &mut self.memory_faults,
            FaultClass::Paging => &mut self.paging_faults,
            FaultClass::Resource => &mut self.resource_faults,
            FaultClass::Consistency => &mut self.consistency_faults,
            FaultClass::Process => &mut self.process_faults,
        };
        *counter = counter.saturating_add(1);
    }

    /// Total faults across every class.
    #[must_use]
    pub const fn total_faults(&self) -> u64 {
        self.decode_faults
            .saturating_add(self.memory_faults)
            .saturating_add(self.paging_faults)
            .saturating_add(self.resource_faults)
            .saturating_add(self.consistency_faults)
            .saturating_add(self.process_faults)
    }

    /// Clears every counter.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::CpuStats;
    use crate::{Access, Fault, PagePool};

    #[test]
    fn record_fault_increments_matching_class() {
        let mut stats = CpuStats::default();
        stats.record_fault(Fault::InvalidOpcode { word: 0xFF00_0000, pc: 0 });
        stats.record_fault(Fault::WriteToReadOnly { address: 4 });
        stats.record_fault(Fault::PageFault {
            address: 0x40_0000,
            access: Access::Write,
        });
        stats.record_fault(Fault::ResourceExhausted { pool: PagePool::User });
        stats.record_fault(Fault::ConsistencyFault {
            pool: PagePool::Disk,
            page: 3,
        });
        stats.record_fault(Fault::NoProcess);

        assert_eq!(stats.decode_faults, 1);
        assert_eq!(stats.memory_faults, 1);
        assert_eq!(stats.paging_faults, 1);
        assert_eq!(stats.resource_faults, 1);
        assert_eq!(stats.consistency_faults, 1);
        assert_eq!(stats.process_faults, 1);
        assert_eq!(stats.total_faults(), 6);
        assert_eq!(stats.last_fault, Some(Fault::NoProcess));
    }

    #[test]
    fn retired_counters_saturate() {
        let mut stats = CpuStats {
            instructions: u64::MAX,
            cycles: u64::MAX - 1,
            ..CpuStats::default()
        };
        stats.record_retired(12);
        assert_eq!(stats.instructions, u64::MAX);
        assert_eq!(stats.cycles, u64::MAX);
        stats.reset();
        assert_eq!(stats, CpuStats::default());
    }
}
