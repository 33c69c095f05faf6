//! Access legality policy per bus region.

use crate::memory::{MemoryRegion, Width};
use crate::mmu::PAGE_SIZE;
use crate::{Access, Fault};

/// Validates an architectural access against the owning region.
///
/// ROM is readable and fetchable but never writable. RAM and the mapped
/// window accept everything here; the mapped window enforces page
/// permissions during translation.
///
/// # Errors
///
/// Returns [`Fault::WriteToReadOnly`] for a write into ROM.
pub const fn validate_region_access(
    region: MemoryRegion,
    access: Access,
    address: u32,
) -> Result<(), Fault> {
    match (region, access) {
        (MemoryRegion::Rom, Access::Write) => Err(Fault::WriteToReadOnly { address }),
        _ => Ok(()),
    }
}

/// Returns `true` when an access of `width` at `address` spans two pages.
#[must_use]
pub const fn crosses_page(address: u32, width: Width) -> bool {
    let offset = address % PAGE_SIZE;
    offset + width.bytes() > PAGE_SIZE
}

/// Returns `true` when the access stays inside `[start, end]`.
#[must_use]
pub const fn fits_in(address: u32, width: Width, start: u32, end: u32) -> bool {
    if address < start || address > end {
        return false;
    }
    (end - address) >= width.bytes() - 1
}
