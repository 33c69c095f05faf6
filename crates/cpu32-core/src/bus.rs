//! Address-range router between the core and its memory devices.

use crate::memory::{
    crosses_page, fits_in, validate_region_access, BusLayout, Disk, MemoryRegion, Ram,
    RegionMap, Rom, Width,
};
use crate::mmu::{Mmu, PageRanges, Permissions, Privilege};
use crate::{Access, ConfigError, Fault};

/// Routes every core access to ROM, RAM or the MMU-translated window.
#[derive(Debug, Clone)]
pub struct SystemBus {
    ram: Ram,
    rom: Rom,
    mmu: Mmu,
    map: RegionMap,
    privilege: Privilege,
}

impl SystemBus {
    /// Builds a bus over the given devices. The disk becomes the MMU's backing store.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when regions overlap or page ranges do not fit RAM.
    pub fn new(
        ram: Ram,
        rom: Rom,
        disk: Disk,
        layout: &BusLayout,
        ranges: PageRanges,
    ) -> Result<Self, ConfigError> {
        let map = RegionMap::new((rom.base(), rom.size()), (ram.base(), ram.size()), layout)?;
        let mmu = Mmu::new(&ram, disk, ranges)?;
        Ok(Self {
            ram,
            rom,
            mmu,
            map,
            privilege: Privilege::default(),
        })
    }

    /// Reads a little-endian value.
    ///
    /// # Errors
    ///
    /// Any routing, device or translation fault.
    pub fn read(&mut self, address: u32, width: Width) -> Result<u32, Fault> {
        self.transfer(address, width, Access::Read, None)
    }

    /// Writes a little-endian value; bits above `width` are ignored.
    ///
    /// # Errors
    ///
    /// Any routing, device or translation fault. Nothing is written on error.
    pub fn write(&mut self, address: u32, width: Width, value: u32) -> Result<(), Fault> {
        self.transfer(address, width, Access::Write, Some(value))
            .map(|_| ())
    }

    /// Fetches an instruction word. Mapped pages need execute permission.
    ///
    /// # Errors
    ///
    /// Any routing, device or translation fault.
    pub fn fetch(&mut self, address: u32) -> Result<u32, Fault> {
        self.transfer(address, Width::Word, Access::Execute, None)
    }

    /// Stores `value` and returns the previous contents as one bus operation.
    ///
    /// # Errors
    ///
    /// Any fault a write at `address` would raise. Memory is unchanged on error.
    pub fn swap(&mut self, address: u32, width: Width, value: u32) -> Result<u32, Fault> {
        self.transfer(address, width, Access::Write, Some(value))
    }

    /// Host-side image loader. ROM is burned in, and mapped pages are written
    /// regardless of page permissions. Copy-on-write pages are duplicated
    /// first, as for a store.
    ///
    /// # Errors
    ///
    /// [`Fault::MemoryOutOfBounds`] when a byte falls outside every region, or a
    /// translation fault for an unmapped page.
    pub fn load_image(&mut self, base: u32, bytes: &[u8]) -> Result<(), Fault> {
        if bytes.len() > (u32::MAX - base) as usize + 1 {
            return Err(Fault::MemoryOutOfBounds { address: u32::MAX });
        }
        for (address, byte) in (base..=u32::MAX).zip(bytes) {
            let descriptor = self
                .map
                .decode(address)
                .ok_or(Fault::MemoryOutOfBounds { address })?;
            match descriptor.region {
                MemoryRegion::Rom => self.rom.burn(address, &[*byte])?,
                MemoryRegion::Ram => self.ram.write(address, Width::Byte, u32::from(*byte))?,
                MemoryRegion::Mapped => {
                    let physical = self.mmu.translate_host_write(&mut self.ram, address)?;
                    self.ram.write(physical, Width::Byte, u32::from(*byte))?;
                }
            }
        }
        Ok(())
    }

    /// Reads `out.len()` consecutive bytes.
    ///
    /// # Errors
    ///
    /// The first fault any byte raises.
    pub fn read_bytes(&mut self, address: u32, out: &mut [u8]) -> Result<(), Fault> {
        for (offset, slot) in (0u32..).zip(out.iter_mut()) {
            let value = self.read(address.wrapping_add(offset), Width::Byte)?;
            *slot = value.to_le_bytes()[0];
        }
        Ok(())
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
        self.mmu
            .add_vpage(&mut self.ram, vpage, permissions, copy_on_write)
    }

    /// Privilege applied to core accesses.
    #[must_use]
    pub const fn privilege(&self) -> Privilege {
        self.privilege
    }

    /// Sets the privilege applied to core accesses.
    pub const fn set_privilege(&mut self, privilege: Privilege) {
        self.privilege = privilege;
    }

    /// MMU, for process and mapping management.
    #[must_use]
    pub const fn mmu(&self) -> &Mmu {
        &self.mmu
    }

    /// MMU together with the RAM its frames live in.
    pub fn paging(&mut self) -> (&mut Mmu, &mut Ram) {
        (&mut self.mmu, &mut self.ram)
    }

    /// RAM device.
    #[must_use]
    pub const fn ram(&self) -> &Ram {
        &self.ram
    }

    /// ROM device.
    #[must_use]
    pub const fn rom(&self) -> &Rom {
        &self.rom
    }

    /// Validated region table.
    #[must_use]
    pub const fn regions(&self) -> &RegionMap {
        &self.map
    }

    fn transfer(
        &mut self,
        address: u32,
        width: Width,
        access: Access,
        store: Option<u32>,
    ) -> Result<u32, Fault> {
        let descriptor = self
            .map
            .decode(address)
            .ok_or(Fault::MemoryOutOfBounds { address })?;
        if !fits_in(address, width, descriptor.start, descriptor.end) {
            return Err(Fault::MemoryOutOfBounds { address });
        }
        validate_region_access(descriptor.region, access, address)?;

        match descriptor.region {
            MemoryRegion::Rom => self.rom.read(address, width),
            MemoryRegion::Ram => {
                let old = self.ram.read(address, width)?;
                if let Some(value) = store {
                    self.ram.write(address, width, value)?;
                }
                Ok(old)
            }
            MemoryRegion::Mapped => self.transfer_mapped(address, width, access, store),
        }
    }

    fn transfer_mapped(
        &mut self,
        address: u32,
        width: Width,
        access: Access,
        store: Option<u32>,
    ) -> Result<u32, Fault> {
        if !crosses_page(address, width) {
            let physical = self
                .mmu
                .translate(&mut self.ram, address, access, self.privilege)?;
            let old = self.ram.read(physical, width)?;
            if let Some(value) = store {
                self.ram.write(physical, width, value)?;
            }
            return Ok(old);
        }

        // Both pages resolve before any byte is touched.
        for offset in [0, width.bytes() - 1] {
            self.mmu
                .translate(&mut self.ram, address + offset, access, self.privilege)?;
        }
        let mut old = 0u32;
        for offset in 0..width.bytes() {
            let physical =
                self.mmu
                    .translate(&mut self.ram, address + offset, access, self.privilege)?;
            old |= self.ram.read(physical, Width::Byte)? << (offset * 8);
            if let Some(value) = store {
                self.ram
                    .write(physical, Width::Byte, value >> (offset * 8))?;
            }
        }
        Ok(old)
    }
}

#[cfg(test)]
mod tests {
    use super::SystemBus;
    use crate::memory::{BusLayout, Disk, Ram, Rom, Width};
    use crate::mmu::{PageRanges, Permissions, Privilege, PAGE_SIZE};
    use crate::{Access, ConfigError, Fault};

    const RAM_BASE: u32 = 0x1000_0000;
    const MAPPED_BASE: u32 = 0x0040_0000;

    fn bus() -> SystemBus {
        let ranges = PageRanges {
            user_low: 0,
            user_high: 5,
            kernel_low: 6,
            kernel_high: 7,
        };
        let mut bus = SystemBus::new(
            Ram::new(RAM_BASE, PAGE_SIZE * 8),
            Rom::from_image(0, &[0x78, 0x56, 0x34, 0x12]),
            Disk::new(4),
            &BusLayout {
                mapped_base: MAPPED_BASE,
                mapped_size: PAGE_SIZE * 16,
            },
            ranges,
        )
        .expect("valid layout");
        bus.paging().0.begin_process();
        bus
    }

    #[test]
    fn routes_rom_and_ram() {
        let mut bus = bus();
        assert_eq!(bus.read(0, Width::Word), Ok(0x1234_5678));
        bus.write(RAM_BASE + 8, Width::Halfword, 0xBEEF)
            .expect("ram is writable");
        assert_eq!(bus.read(RAM_BASE + 8, Width::Word), Ok(0xBEEF));
    }

    #[test]
    fn rom_writes_fault_but_host_load_succeeds() {
        let mut bus = bus();
        assert_eq!(
            bus.write(0, Width::Byte, 1),
            Err(Fault::WriteToReadOnly { address: 0 })
        );
        assert_eq!(
            bus.swap(0, Width::Word, 1),
            Err(Fault::WriteToReadOnly { address: 0 })
        );
        bus.load_image(0, &[0xAA]).expect("host burn-in");
        assert_eq!(bus.read(0, Width::Byte), Ok(0xAA));
    }

    #[test]
    fn unowned_addresses_are_out_of_bounds() {
        let mut bus = bus();
        assert_eq!(
            bus.read(0x8000_0000, Width::Byte),
            Err(Fault::MemoryOutOfBounds {
                address: 0x8000_0000
            })
        );
        assert_eq!(
            bus.read(2, Width::Word),
            Err(Fault::MemoryOutOfBounds { address: 2 })
        );
        assert!(bus.load_image(4, &[0]).is_err());
    }

    #[test]
    fn overlapping_layout_is_a_config_error() {
        let error = SystemBus::new(
            Ram::new(0x1000, PAGE_SIZE),
            Rom::new(0, 0x2000),
            Disk::new(0),
            &BusLayout::default(),
            PageRanges {
                user_low: 0,
                user_high: 0,
                kernel_low: 1,
                kernel_high: 1,
            },
        )
        .map(|_| ())
        .expect_err("rom overlaps ram");
        assert_eq!(
            error,
            ConfigError::OverlappingRegions {
                first: "rom",
                second: "ram"
            }
        );
    }

    #[test]
    fn swap_returns_old_value_and_stores_new() {
        let mut bus = bus();
        bus.write(RAM_BASE, Width::Word, 0x3425_1607).expect("ram");
        assert_eq!(bus.swap(RAM_BASE, Width::Word, 0x7654_3210), Ok(0x3425_1607));
        assert_eq!(bus.read(RAM_BASE, Width::Word), Ok(0x7654_3210));
        assert_eq!(bus.swap(RAM_BASE, Width::Byte, 0xFF), Ok(0x10));
        assert_eq!(bus.read(RAM_BASE, Width::Word), Ok(0x7654_32FF));
    }

    #[test]
    fn mapped_window_translates_through_mmu() {
        let mut bus = bus();
        assert_eq!(
            bus.read(MAPPED_BASE, Width::Word),
            Err(Fault::PageFault {
                address: MAPPED_BASE,
                access: Access::Read
            })
        );
        let frame = bus
            .map_page(MAPPED_BASE >> 12, Permissions::READ_WRITE, false)
            .expect("free frame");
        bus.write(MAPPED_BASE + 0x10, Width::Word, 0xC0DE)
            .expect("mapped writable");
        let physical = bus.ram().frame_address(frame) + 0x10;
        assert_eq!(bus.read(physical, Width::Word), Ok(0xC0DE));
        assert_eq!(
            bus.fetch(MAPPED_BASE),
            Err(Fault::ProtectionFault {
                address: MAPPED_BASE,
                access: Access::Execute
            })
        );
    }

    #[test]
    fn user_privilege_cannot_touch_kernel_pages() {
        let mut bus = bus();
        bus.map_page(MAPPED_BASE >> 12, Permissions::ALL.kernel_only(), false)
            .expect("free frame");
        assert!(bus.read(MAPPED_BASE, Width::Byte).is_ok());
        bus.set_privilege(Privilege::User);
        assert_eq!(
            bus.read(MAPPED_BASE, Width::Byte),
            Err(Fault::ProtectionFault {
                address: MAPPED_BASE,
                access: Access::Read
            })
        );
    }

    #[test]
    fn page_crossing_access_splits_per_byte() {
        let mut bus = bus();
        let first = MAPPED_BASE >> 12;
        bus.map_page(first, Permissions::READ_WRITE, false)
            .expect("free frame");
        bus.map_page(first + 1, Permissions::READ_WRITE, false)
            .expect("free frame");
        let boundary = MAPPED_BASE + PAGE_SIZE;
        bus.write(boundary - 2, Width::Word, 0xAABB_CCDD)
            .expect("both pages mapped");
        assert_eq!(bus.read(boundary - 2, Width::Word), Ok(0xAABB_CCDD));
        assert_eq!(bus.read(boundary, Width::Halfword), Ok(0xAABB));
    }

    #[test]
    fn fault_on_second_page_leaves_first_untouched() {
        let mut bus = bus();
        bus.map_page(MAPPED_BASE >> 12, Permissions::READ_WRITE, false)
            .expect("free frame");
        let boundary = MAPPED_BASE + PAGE_SIZE;
        assert_eq!(
            bus.write(boundary - 1, Width::Halfword, 0xFFFF),
            Err(Fault::PageFault {
                address: boundary,
                access: Access::Write
            })
        );
        assert_eq!(bus.read(boundary - 1, Width::Byte), Ok(0));
    }

    #[test]
    fn load_image_fills_mapped_pages_regardless_of_permissions() {
        let mut bus = bus();
        bus.map_page(MAPPED_BASE >> 12, Permissions::READ_EXECUTE, false)
            .expect("free frame");
        bus.load_image(MAPPED_BASE, &[0x00, 0x00, 0x00, 0x01])
            .expect("mapped");
        assert_eq!(bus.fetch(MAPPED_BASE), Ok(0x0100_0000));
        let mut out = [0u8; 4];
        bus.read_bytes(MAPPED_BASE, &mut out).expect("mapped");
        assert_eq!(out, [0, 0, 0, 1]);
    }
}
