//! Memory devices, bus region layout and access policy.

/// Region access legality helpers.
pub mod access;
/// RAM, ROM and disk devices.
pub mod device;
/// Bus region layout and decoder.
pub mod map;

pub use access::{crosses_page, fits_in, validate_region_access};
pub use device::{Disk, Ram, Rom, Width};
pub use map::{BusLayout, MemoryRegion, RegionDescriptor, RegionMap};
