use thiserror::Error;

/// Kind of memory access that triggered a translation or protection fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Access {
    /// Data read.
    Read,
    /// Data write.
    Write,
    /// Instruction fetch.
    Execute,
}

/// Page pools managed by the MMU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum PagePool {
    /// User physical frames.
    User,
    /// Kernel physical frames.
    Kernel,
    /// Backing-store disk slots.
    Disk,
}

impl std::fmt::Display for PagePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::User => "user",
            Self::Kernel => "kernel",
            Self::Disk => "disk",
        };
        f.write_str(name)
    }
}

/// Fault classes used for statistics aggregation and policy decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum FaultClass {
    /// Decoder rejected an instruction encoding.
    Decode,
    /// Bus routing or device bounds violation.
    Memory,
    /// Virtual-memory translation or permission failure.
    Paging,
    /// A page pool ran dry.
    Resource,
    /// Internal bookkeeping detected a reference-counting bug.
    Consistency,
    /// Process lifecycle misuse.
    Process,
}

/// Stable fault codes, one per [`Fault`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum FaultKind {
    /// Instruction word has no valid decoding.
    InvalidOpcode = 0x01,
    /// Address is outside every device range or outside a device.
    MemoryOutOfBounds = 0x02,
    /// Write targeted a read-only device.
    WriteToReadOnly = 0x03,
    /// Virtual page has no mapping.
    PageFault = 0x04,
    /// Mapping exists but forbids the access.
    ProtectionFault = 0x05,
    /// No free page in a pool.
    ResourceExhausted = 0x06,
    /// A page was returned to a pool that already holds it.
    ConsistencyFault = 0x07,
    /// Virtual page is already mapped.
    AlreadyMapped = 0x08,
    /// No process is current.
    NoProcess = 0x09,
    /// Process id is not live.
    UnknownProcess = 0x0A,
}

impl FaultKind {
    /// Converts a fault kind to its stable byte code.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Converts a stable byte code back into a fault kind.
    #[must_use]
    pub const fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::InvalidOpcode),
            0x02 => Some(Self::MemoryOutOfBounds),
            0x03 => Some(Self::WriteToReadOnly),
            0x04 => Some(Self::PageFault),
            0x05 => Some(Self::ProtectionFault),
            0x06 => Some(Self::ResourceExhausted),
            0x07 => Some(Self::ConsistencyFault),
            0x08 => Some(Self::AlreadyMapped),
            0x09 => Some(Self::NoProcess),
            0x0A => Some(Self::UnknownProcess),
            _ => None,
        }
    }

    /// Returns the statistics class for this fault kind.
    #[must_use]
    pub const fn class(self) -> FaultClass {
        match self {
            Self::InvalidOpcode => FaultClass::Decode,
            Self::MemoryOutOfBounds | Self::WriteToReadOnly => FaultClass::Memory,
            Self::PageFault | Self::ProtectionFault | Self::AlreadyMapped => FaultClass::Paging,
            Self::ResourceExhausted => FaultClass::Resource,
            Self::ConsistencyFault => FaultClass::Consistency,
            Self::NoProcess | Self::UnknownProcess => FaultClass::Process,
        }
    }

    /// Faults a caller can typically repair (by mapping a page, freeing
    /// memory, or switching process) before resuming.
    #[must_use]
    pub const fn is_recoverable(self) -> bool {
        matches!(
            self,
            Self::PageFault | Self::ResourceExhausted | Self::NoProcess
        )
    }
}

/// Structured fault raised by the bus, the MMU or the execution engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Fault {
    /// Instruction word does not decode.
    #[error("invalid opcode {word:#010x} at pc {pc:#010x}")]
    InvalidOpcode {
        /// Raw instruction word.
        word: u32,
        /// Address it was fetched from.
        pc: u32,
    },
    /// No device owns the address, or the access runs past a device's end.
    #[error("memory access out of bounds at {address:#010x}")]
    MemoryOutOfBounds {
        /// Faulting address.
        address: u32,
    },
    /// Architectural write into ROM.
    #[error("write to read-only memory at {address:#010x}")]
    WriteToReadOnly {
        /// Faulting address.
        address: u32,
    },
    /// Virtual address has no mapping in the current page directory.
    #[error("unresolved page fault at {address:#010x} ({access:?})")]
    PageFault {
        /// Faulting virtual address.
        address: u32,
        /// Access that faulted.
        access: Access,
    },
    /// Mapping permissions forbid the access.
    #[error("protection fault at {address:#010x} ({access:?})")]
    ProtectionFault {
        /// Faulting virtual address.
        address: u32,
        /// Access that faulted.
        access: Access,
    },
    /// Pool has no free page and nothing could be evicted.
    #[error("{pool} page pool exhausted")]
    ResourceExhausted {
        /// Depleted pool.
        pool: PagePool,
    },
    /// Page returned to a pool that already holds it, or that it never came from.
    #[error("page {page} released to {pool} pool twice or out of range")]
    ConsistencyFault {
        /// Pool that detected the fault.
        pool: PagePool,
        /// Offending page number.
        page: u32,
    },
    /// Virtual page is already mapped in the current directory.
    #[error("virtual page {vpage:#x} is already mapped")]
    AlreadyMapped {
        /// Virtual page number.
        vpage: u32,
    },
    /// Operation needs a current process and there is none.
    #[error("no current process")]
    NoProcess,
    /// Process id does not name a live process.
    #[error("unknown process {pid}")]
    UnknownProcess {
        /// Requested process id.
        pid: u32,
    },
}

impl Fault {
    /// Returns the stable kind of this fault.
    #[must_use]
    pub const fn kind(&self) -> FaultKind {
        match self {
            Self::InvalidOpcode { .. } => FaultKind::InvalidOpcode,
            Self::MemoryOutOfBounds { .. } => FaultKind::MemoryOutOfBounds,
            Self::WriteToReadOnly { .. } => FaultKind::WriteToReadOnly,
            Self::PageFault { .. } => FaultKind::PageFault,
            Self::ProtectionFault { .. } => FaultKind::ProtectionFault,
            Self::ResourceExhausted { .. } => FaultKind::ResourceExhausted,
            Self::ConsistencyFault { .. } => FaultKind::ConsistencyFault,
            Self::AlreadyMapped { .. } => FaultKind::AlreadyMapped,
            Self::NoProcess => FaultKind::NoProcess,
            Self::UnknownProcess { .. } => FaultKind::UnknownProcess,
        }
    }

    /// Returns the address involved in the fault, when there is one.
    #[must_use]
    pub const fn address(&self) -> Option<u32> {
        match self {
            Self::InvalidOpcode { pc, .. } => Some(*pc),
            Self::MemoryOutOfBounds { address }
            | Self::WriteToReadOnly { address }
            | Self::PageFault { address, .. }
            | Self::ProtectionFault { address, .. } => Some(*address),
            Self::ResourceExhausted { .. }
            | Self::ConsistencyFault { .. }
            | Self::AlreadyMapped { .. }
            | Self::NoProcess
            | Self::UnknownProcess { .. } => None,
        }
    }
}

/// Construction-time configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A page range boundary lies outside the RAM device.
    #[error("{pool} page range {low}..={high} exceeds the {ram_pages} RAM pages")]
    PageRangeOutOfRam {
        /// Offending pool.
        pool: PagePool,
        /// Inclusive low page.
        low: u32,
        /// Inclusive high page.
        high: u32,
        /// Number of whole pages in RAM.
        ram_pages: u32,
    },
    /// A page range has `low > high`.
    #[error("{pool} page range {low}..={high} is inverted")]
    InvertedPageRange {
        /// Offending pool.
        pool: PagePool,
        /// Inclusive low page.
        low: u32,
        /// Inclusive high page.
        high: u32,
    },
    /// User and kernel page ranges share frames.
    #[error("user and kernel page ranges overlap")]
    OverlappingPageRanges,
    /// Two bus regions overlap.
    #[error("bus regions {first} and {second} overlap")]
    OverlappingRegions {
        /// First region name.
        first: &'static str,
        /// Second region name.
        second: &'static str,
    },
    /// A region extends past the end of the 32-bit address space.
    #[error("bus region {region} wraps the 32-bit address space")]
    RegionWraps {
        /// Region name.
        region: &'static str,
    },
    /// A device that holds page frames starts off a page boundary.
    #[error("{region} base {base:#010x} is not page aligned")]
    UnalignedBase {
        /// Region name.
        region: &'static str,
        /// Rejected base address.
        base: u32,
    },
    /// A device or window has zero size.
    #[error("{region} has invalid size {size:#x}")]
    InvalidSize {
        /// Region name.
        region: &'static str,
        /// Rejected size.
        size: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::{Access, Fault, FaultClass, FaultKind, PagePool};

    #[test]
    fn stable_code_roundtrip_is_bijective_for_defined_values() {
        for code in 0x01u8..=0x0A {
            let kind = FaultKind::from_u8(code).expect("defined taxonomy code");
            assert_eq!(kind.as_u8(), code);
        }
    }

    #[test]
    fn unknown_code_is_rejected() {
        assert!(FaultKind::from_u8(0x00).is_none());
        assert!(FaultKind::from_u8(0x0B).is_none());
        assert!(FaultKind::from_u8(0xFF).is_none());
    }

    #[test]
    fn class_mapping_matches_fault_taxonomy() {
        assert_eq!(FaultKind::InvalidOpcode.class(), FaultClass::Decode);
        assert_eq!(FaultKind::WriteToReadOnly.class(), FaultClass::Memory);
        assert_eq!(FaultKind::PageFault.class(), FaultClass::Paging);
        assert_eq!(FaultKind::ResourceExhausted.class(), FaultClass::Resource);
        assert_eq!(
            FaultKind::ConsistencyFault.class(),
            FaultClass::Consistency
        );
        assert_eq!(FaultKind::NoProcess.class(), FaultClass::Process);
    }

    #[test]
    fn page_faults_are_recoverable_but_double_free_is_not() {
        assert!(FaultKind::PageFault.is_recoverable());
        assert!(!FaultKind::ConsistencyFault.is_recoverable());
        assert!(!FaultKind::InvalidOpcode.is_recoverable());
    }

    #[test]
    fn fault_reports_kind_and_address() {
        let fault = Fault::PageFault {
            address: 0x0040_1000,
            access: Access::Write,
        };
        assert_eq!(fault.kind(), FaultKind::PageFault);
        assert_eq!(fault.address(), Some(0x0040_1000));
        assert_eq!(
            Fault::ResourceExhausted {
                pool: PagePool::Disk
            }
            .address(),
            None
        );
    }

    #[test]
    fn display_messages_carry_context() {
        let fault = Fault::InvalidOpcode {
            word: 0xF000_0000,
            pc: 0x10,
        };
        assert_eq!(
            fault.to_string(),
            "invalid opcode 0xf0000000 at pc 0x00000010"
        );
        assert_eq!(
            Fault::ConsistencyFault {
                pool: PagePool::User,
                page: 7
            }
            .to_string(),
            "page 7 released to user pool twice or out of range"
        );
    }
}
