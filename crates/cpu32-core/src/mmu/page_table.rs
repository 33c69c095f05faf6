use std::collections::BTreeMap;

/// Bits in a virtual page number.
pub const VPAGE_BITS: u32 = 20;
/// Largest valid virtual page number.
pub const MAX_VPAGE: u32 = (1 << VPAGE_BITS) - 1;

/// Where a mapped page's contents currently live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum PageLocation {
    /// Physical RAM frame number.
    Resident(u32),
    /// Disk slot number.
    OnDisk(u32),
}

impl PageLocation {
    /// Frame or slot number, whichever this location names.
    #[must_use]
    pub const fn page(self) -> u32 {
        match self {
            Self::Resident(page) | Self::OnDisk(page) => page,
        }
    }
}

/// Permission bits of a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Permissions {
    /// Only kernel-privilege accesses may touch the page.
    pub kernel: bool,
    /// Stores are allowed.
    pub write: bool,
    /// Instruction fetches are allowed.
    pub execute: bool,
}

impl Permissions {
    /// Read-only user data.
    pub const READ_ONLY: Self = Self {
        kernel: false,
        write: false,
        execute: false,
    };
    /// Read/write user data.
    pub const READ_WRITE: Self = Self {
        kernel: false,
        write: true,
        execute: false,
    };
    /// User code.
    pub const READ_EXECUTE: Self = Self {
        kernel: false,
        write: false,
        execute: true,
    };
    /// Everything, user privilege.
    pub const ALL: Self = Self {
        kernel: false,
        write: true,
        execute: true,
    };

    /// Same permissions restricted to kernel privilege.
    #[must_use]
    pub const fn kernel_only(self) -> Self {
        Self {
            kernel: true,
            ..self
        }
    }
}

/// One virtual page mapping. Presence in a [`PageDirectory`] is the valid bit;
/// the reference count lives with the shared location in the MMU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct PageTableEntry {
    /// Backing location.
    pub location: PageLocation,
    /// Permission bits.
    pub permissions: Permissions,
    /// Writes must duplicate the page first.
    pub copy_on_write: bool,
}

/// Sparse page table of one process, keyed by virtual page number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageDirectory {
    entries: BTreeMap<u32, PageTableEntry>,
}

impl PageDirectory {
    /// Looks up the mapping for `vpage`.
    #[must_use]
    pub fn get(&self, vpage: u32) -> Option<&PageTableEntry> {
        self.entries.get(&vpage)
    }

    pub(crate) fn get_mut(&mut self, vpage: u32) -> Option<&mut PageTableEntry> {
        self.entries.get_mut(&vpage)
    }

    pub(crate) fn insert(&mut self, vpage: u32, entry: PageTableEntry) {
        self.entries.insert(vpage, entry);
    }

    pub(crate) fn remove(&mut self, vpage: u32) -> Option<PageTableEntry> {
        self.entries.remove(&vpage)
    }

    pub(crate) fn take_all(&mut self) -> BTreeMap<u32, PageTableEntry> {
        std::mem::take(&mut self.entries)
    }

    pub(crate) fn entries_mut(&mut self) -> impl Iterator<Item = &mut PageTableEntry> {
        self.entries.values_mut()
    }

    /// Mapped pages in ascending virtual page order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &PageTableEntry)> {
        self.entries.iter().map(|(vpage, entry)| (*vpage, entry))
    }

    /// Number of mapped pages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
