//! Bus region layout and address decoding.

use crate::ConfigError;

/// Region classification for bus addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum MemoryRegion {
    /// Read-only device range.
    Rom,
    /// Physical RAM window.
    Ram,
    /// Virtual window translated by the MMU into RAM frames.
    Mapped,
}

impl MemoryRegion {
    /// Stable name used in diagnostics and configuration errors.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Rom => "rom",
            Self::Ram => "ram",
            Self::Mapped => "mapped",
        }
    }
}

/// Inclusive address range owned by one region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionDescriptor {
    /// Region classification.
    pub region: MemoryRegion,
    /// Inclusive start address.
    pub start: u32,
    /// Inclusive end address.
    pub end: u32,
}

impl RegionDescriptor {
    /// Builds the descriptor for `size` bytes at `start`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSize`] for an empty range and
    /// [`ConfigError::RegionWraps`] when the range runs past `u32::MAX`.
    pub fn new(region: MemoryRegion, start: u32, size: u32) -> Result<Self, ConfigError> {
        if size == 0 {
            return Err(ConfigError::InvalidSize {
                region: region.name(),
                size,
            });
        }
        let end = start
            .checked_add(size - 1)
            .ok_or(ConfigError::RegionWraps {
                region: region.name(),
            })?;
        Ok(Self { region, start, end })
    }

    /// Returns `true` when `address` belongs to this range.
    #[must_use]
    pub const fn contains(&self, address: u32) -> bool {
        address >= self.start && address <= self.end
    }

    const fn overlaps(&self, other: &Self) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// Placement of the MMU-translated window. The ROM and RAM ranges come from
/// the devices themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct BusLayout {
    /// First virtual address of the mapped window.
    pub mapped_base: u32,
    /// Window size in bytes.
    pub mapped_size: u32,
}

impl Default for BusLayout {
    fn default() -> Self {
        Self {
            mapped_base: 0x0040_0000,
            mapped_size: 0x0040_0000,
        }
    }
}

/// Validated region table in ascending address order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionMap {
    regions: [RegionDescriptor; 3],
}

impl RegionMap {
    /// Builds and validates the region table.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a region is empty, wraps the address
    /// space, or overlaps another region.
    pub fn new(
        rom: (u32, u32),
        ram: (u32, u32),
        layout: &BusLayout,
    ) -> Result<Self, ConfigError> {
        let mut regions = [
            RegionDescriptor::new(MemoryRegion::Rom, rom.0, rom.1)?,
            RegionDescriptor::new(MemoryRegion::Ram, ram.0, ram.1)?,
            RegionDescriptor::new(MemoryRegion::Mapped, layout.mapped_base, layout.mapped_size)?,
        ];
        regions.sort_by_key(|descriptor| descriptor.start);
        for pair in regions.windows(2) {
            if pair[0].overlaps(&pair[1]) {
                return Err(ConfigError::OverlappingRegions {
                    first: pair[0].region.name(),
                    second: pair[1].region.name(),
                });
            }
        }
        Ok(Self { regions })
    }

    /// Decodes an address into its owning region.
    #[must_use]
    pub fn decode(&self, address: u32) -> Option<RegionDescriptor> {
        self.regions
            .iter()
            .copied()
            .find(|descriptor| descriptor.contains(address))
    }

    /// Descriptor for `region`.
    #[must_use]
    pub fn descriptor(&self, region: MemoryRegion) -> RegionDescriptor {
        let mut found = self.regions[0];
        for descriptor in self.regions {
            if descriptor.region == region {
                found = descriptor;
            }
        }
        found
    }

    /// All regions in ascending address order.
    #[must_use]
    pub const fn regions(&self) -> &[RegionDescriptor; 3] {
        &self.regions
    }
}
