//! Fixed-size byte-addressable memory devices.

use crate::mmu::PAGE_SIZE;
use crate::Fault;

/// Access width on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Width {
    /// 8 bits.
    Byte,
    /// 16 bits.
    Halfword,
    /// 32 bits.
    Word,
}

impl Width {
    /// Number of bytes covered by an access of this width.
    #[must_use]
    pub const fn bytes(self) -> u32 {
        match self {
            Self::Byte => 1,
            Self::Halfword => 2,
            Self::Word => 4,
        }
    }

    /// Mask selecting the bits an access of this width carries.
    #[must_use]
    pub const fn mask(self) -> u32 {
        match self {
            Self::Byte => 0xFF,
            Self::Halfword => 0xFFFF,
            Self::Word => u32::MAX,
        }
    }
}

/// Bounds-checked little-endian byte store anchored at a base address.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ByteStore {
    base: u32,
    data: Box<[u8]>,
}

impl ByteStore {
    fn new(base: u32, size: u32) -> Self {
        Self {
            base,
            data: vec![0; size as usize].into_boxed_slice(),
        }
    }

    fn from_bytes(base: u32, bytes: &[u8]) -> Self {
        Self {
            base,
            data: bytes.to_vec().into_boxed_slice(),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn size(&self) -> u32 {
        self.data.len() as u32
    }

    fn span(&self, address: u32, len: u32) -> Result<std::ops::Range<usize>, Fault> {
        let out_of_bounds = Fault::MemoryOutOfBounds { address };
        let offset = address.checked_sub(self.base).ok_or(out_of_bounds)?;
        let end = offset.checked_add(len).ok_or(out_of_bounds)?;
        if end > self.size() {
            return Err(out_of_bounds);
        }
        Ok(offset as usize..end as usize)
    }

    fn read(&self, address: u32, width: Width) -> Result<u32, Fault> {
        let span = self.span(address, width.bytes())?;
        Ok(self.data[span]
            .iter()
            .rev()
            .fold(0u32, |acc, byte| (acc << 8) | u32::from(*byte)))
    }

    fn write(&mut self, address: u32, width: Width, value: u32) -> Result<(), Fault> {
        let span = self.span(address, width.bytes())?;
        let bytes = value.to_le_bytes();
        self.data[span].copy_from_slice(&bytes[..width.bytes() as usize]);
        Ok(())
    }

    fn read_bytes(&self, address: u32, out: &mut [u8]) -> Result<(), Fault> {
        #[allow(clippy::cast_possible_truncation)]
        let span = self.span(address, out.len() as u32)?;
        out.copy_from_slice(&self.data[span]);
        Ok(())
    }

    fn write_bytes(&mut self, address: u32, bytes: &[u8]) -> Result<(), Fault> {
        #[allow(clippy::cast_possible_truncation)]
        let span = self.span(address, bytes.len() as u32)?;
        self.data[span].copy_from_slice(bytes);
        Ok(())
    }
}

/// Read/write random-access memory. Physical page frames for the MMU live here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ram {
    store: ByteStore,
}

impl Ram {
    /// Creates zeroed RAM of `size` bytes at `base`.
    #[must_use]
    pub fn new(base: u32, size: u32) -> Self {
        Self {
            store: ByteStore::new(base, size),
        }
    }

    /// First address owned by this device.
    #[must_use]
    pub const fn base(&self) -> u32 {
        self.store.base
    }

    /// Capacity in bytes.
    #[must_use]
    pub fn size(&self) -> u32 {
        self.store.size()
    }

    /// Number of whole page frames the device holds.
    #[must_use]
    pub fn page_count(&self) -> u32 {
        self.size() / PAGE_SIZE
    }

    /// Absolute address of the first byte of frame `page`.
    #[must_use]
    pub const fn frame_address(&self, page: u32) -> u32 {
        self.store.base.wrapping_add(page.wrapping_mul(PAGE_SIZE))
    }

    /// Reads a little-endian value.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::MemoryOutOfBounds`] when any byte falls outside the device.
    pub fn read(&self, address: u32, width: Width) -> Result<u32, Fault> {
        self.store.read(address, width)
    }

    /// Writes a little-endian value; bits above `width` are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::MemoryOutOfBounds`] when any byte falls outside the device.
    pub fn write(&mut self, address: u32, width: Width, value: u32) -> Result<(), Fault> {
        self.store.write(address, width, value)
    }

    /// Copies bytes out of the device.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::MemoryOutOfBounds`] when the range leaves the device.
    pub fn read_bytes(&self, address: u32, out: &mut [u8]) -> Result<(), Fault> {
        self.store.read_bytes(address, out)
    }

    /// Copies bytes into the device.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::MemoryOutOfBounds`] when the range leaves the device.
    pub fn write_bytes(&mut self, address: u32, bytes: &[u8]) -> Result<(), Fault> {
        self.store.write_bytes(address, bytes)
    }

    /// Copies one frame onto another.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::MemoryOutOfBounds`] when either frame is outside RAM.
    pub fn copy_frame(&mut self, from: u32, to: u32) -> Result<(), Fault> {
        let mut buffer = [0u8; PAGE_SIZE as usize];
        self.read_bytes(self.frame_address(from), &mut buffer)?;
        self.write_bytes(self.frame_address(to), &buffer)
    }

    /// Zero-fills one frame.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::MemoryOutOfBounds`] when the frame is outside RAM.
    pub fn zero_frame(&mut self, page: u32) -> Result<(), Fault> {
        self.write_bytes(self.frame_address(page), &[0u8; PAGE_SIZE as usize])
    }
}

/// Read-only memory. Contents are fixed at construction or burned in by the host loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rom {
    store: ByteStore,
}

impl Rom {
    /// Creates zeroed ROM of `size` bytes at `base`.
    #[must_use]
    pub fn new(base: u32, size: u32) -> Self {
        Self {
            store: ByteStore::new(base, size),
        }
    }

    /// Creates ROM holding exactly `image` at `base`.
    #[must_use]
    pub fn from_image(base: u32, image: &[u8]) -> Self {
        Self {
            store: ByteStore::from_bytes(base, image),
        }
    }

    /// First address owned by this device.
    #[must_use]
    pub const fn base(&self) -> u32 {
        self.store.base
    }

    /// Capacity in bytes.
    #[must_use]
    pub fn size(&self) -> u32 {
        self.store.size()
    }

    /// Reads a little-endian value.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::MemoryOutOfBounds`] when any byte falls outside the device.
    pub fn read(&self, address: u32, width: Width) -> Result<u32, Fault> {
        self.store.read(address, width)
    }

    /// Host-side image burn-in. Architectural writes never reach this.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::MemoryOutOfBounds`] when the image does not fit.
    pub fn burn(&mut self, address: u32, bytes: &[u8]) -> Result<(), Fault> {
        self.store.write_bytes(address, bytes)
    }
}

/// Backing store addressed by page-sized slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disk {
    store: ByteStore,
}

impl Disk {
    /// Creates a zeroed disk of `slots` pages.
    #[must_use]
    pub fn new(slots: u32) -> Self {
        Self {
            store: ByteStore::new(0, slots.saturating_mul(PAGE_SIZE)),
        }
    }

    /// Wraps an existing disk image; a trailing partial page is unusable.
    #[must_use]
    pub fn from_image(image: &[u8]) -> Self {
        Self {
            store: ByteStore::from_bytes(0, image),
        }
    }

    /// Number of whole page slots.
    #[must_use]
    pub fn slot_count(&self) -> u32 {
        self.store.size() / PAGE_SIZE
    }

    /// Raw disk image.
    #[must_use]
    pub fn image(&self) -> &[u8] {
        &self.store.data
    }

    /// Reads slot `slot` into `out`.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::MemoryOutOfBounds`] when the slot does not exist.
    pub fn read_slot(&self, slot: u32, out: &mut [u8; PAGE_SIZE as usize]) -> Result<(), Fault> {
        self.store.read_bytes(slot_address(slot)?, out)
    }

    /// Writes `page` into slot `slot`.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::MemoryOutOfBounds`] when the slot does not exist.
    pub fn write_slot(&mut self, slot: u32, page: &[u8; PAGE_SIZE as usize]) -> Result<(), Fault> {
        self.store.write_bytes(slot_address(slot)?, page)
    }
}

fn slot_address(slot: u32) -> Result<u32, Fault> {
    slot.checked_mul(PAGE_SIZE)
        .ok_or(Fault::MemoryOutOfBounds { address: u32::MAX })
}
