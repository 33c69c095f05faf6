//! Paged virtual memory.
//!
//! Each process owns a sparse [`PageDirectory`]. Entries point at RAM frames
//! or disk slots; reference counts live with those locations, so every entry
//! sharing a frame sees the same count. Frames come from the user or kernel
//! [`FreePagePool`] and disk slots from a third pool sized to the disk.

mod page_table;
mod pool;

use std::collections::{BTreeMap, VecDeque};

use log::debug;

pub use page_table::{
    PageDirectory, PageLocation, PageTableEntry, Permissions, MAX_VPAGE, VPAGE_BITS,
};
pub use pool::FreePagePool;

use crate::memory::{Disk, MemoryRegion, Ram};
use crate::{Access, ConfigError, Fault, PagePool};

/// log2 of [`PAGE_SIZE`].
pub const PAGE_SHIFT: u32 = 12;
/// Page and frame size in bytes.
pub const PAGE_SIZE: u32 = 1 << PAGE_SHIFT;

/// Privilege level of an access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Privilege {
    /// May not touch kernel pages.
    User,
    /// May touch every page.
    #[default]
    Kernel,
}

/// Inclusive frame ranges of the user and kernel pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[allow(missing_docs)]
pub struct PageRanges {
    pub user_low: u32,
    pub user_high: u32,
    pub kernel_low: u32,
    pub kernel_high: u32,
}

impl Default for PageRanges {
    fn default() -> Self {
        Self {
            user_low: 0,
            user_high: 191,
            kernel_low: 192,
            kernel_high: 255,
        }
    }
}

/// Paging event counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct MmuStats {
    /// Translations that hit an unmapped page.
    pub page_faults: u64,
    /// Translations rejected by permissions.
    pub protection_faults: u64,
    /// Pages brought back from disk.
    pub page_ins: u64,
    /// Pages written out to disk.
    pub page_outs: u64,
    /// Frames duplicated to break copy-on-write sharing.
    pub copy_on_write_copies: u64,
    /// Page-outs forced by an empty frame pool.
    pub evictions: u64,
}

/// Virtual memory manager.
#[derive(Debug, Clone)]
pub struct Mmu {
    disk: Disk,
    user_pool: FreePagePool,
    kernel_pool: FreePagePool,
    disk_pool: FreePagePool,
    frame_refs: BTreeMap<u32, u32>,
    slot_refs: BTreeMap<u32, u32>,
    resident: VecDeque<u32>,
    processes: BTreeMap<u32, PageDirectory>,
    current: Option<u32>,
    next_pid: u32,
    stats: MmuStats,
}

const fn check_vpage(vpage: u32) -> Result<(), Fault> {
    if vpage > MAX_VPAGE {
        // Carries the rejected page number.
        return Err(Fault::MemoryOutOfBounds { address: vpage });
    }
    Ok(())
}

const fn unmapped(vpage: u32) -> Fault {
    Fault::PageFault {
        address: vpage << PAGE_SHIFT,
        access: Access::Read,
    }
}

impl Mmu {
    /// Builds an MMU whose frames live in `ram` and whose backing store is `disk`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnalignedBase`] when RAM starts off a page
    /// boundary, and a page-range error when a range is inverted, extends past
    /// the last whole RAM page, or overlaps the other range.
    pub fn new(ram: &Ram, disk: Disk, ranges: PageRanges) -> Result<Self, ConfigError> {
        if ram.base() & (PAGE_SIZE - 1) != 0 {
            return Err(ConfigError::UnalignedBase {
                region: MemoryRegion::Ram.name(),
                base: ram.base(),
            });
        }
        let ram_pages = ram.page_count();
        for (pool, low, high) in [
            (PagePool::User, ranges.user_low, ranges.user_high),
            (PagePool::Kernel, ranges.kernel_low, ranges.kernel_high),
        ] {
            if low > high {
                return Err(ConfigError::InvertedPageRange { pool, low, high });
            }
            if high >= ram_pages {
                return Err(ConfigError::PageRangeOutOfRam {
                    pool,
                    low,
                    high,
                    ram_pages,
                });
            }
        }
        if ranges.user_low <= ranges.kernel_high && ranges.kernel_low <= ranges.user_high {
            return Err(ConfigError::OverlappingPageRanges);
        }

        let slots = disk.slot_count();
        let disk_pool = if slots == 0 {
            FreePagePool::new(PagePool::Disk, 1, 0)
        } else {
            FreePagePool::new(PagePool::Disk, 0, slots - 1)
        };

        Ok(Self {
            disk,
            user_pool: FreePagePool::new(PagePool::User, ranges.user_low, ranges.user_high),
            kernel_pool: FreePagePool::new(PagePool::Kernel, ranges.kernel_low, ranges.kernel_high),
            disk_pool,
            frame_refs: BTreeMap::new(),
            slot_refs: BTreeMap::new(),
            resident: VecDeque::new(),
            processes: BTreeMap::new(),
            current: None,
            next_pid: 1,
            stats: MmuStats::default(),
        })
    }

    /// Creates a process with an empty page directory and makes it current.
    pub fn begin_process(&mut self) -> u32 {
        let pid = self.insert_process(PageDirectory::default());
        self.current = Some(pid);
        debug!("mmu: began process {pid}");
        pid
    }

    /// Tears down `pid`'s directory. If it was current, no process is current afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::UnknownProcess`] for a dead pid, or the first
    /// [`Fault::ConsistencyFault`] hit while releasing its pages.
    pub fn end_process(&mut self, pid: u32) -> Result<(), Fault> {
        let mut directory = self
            .processes
            .remove(&pid)
            .ok_or(Fault::UnknownProcess { pid })?;
        if self.current == Some(pid) {
            self.current = None;
        }
        debug!("mmu: ending process {pid} ({} pages)", directory.len());
        self.release_entries(directory.take_all())
    }

    /// Makes `pid` the current process.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::UnknownProcess`] for a dead pid.
    pub fn switch_process(&mut self, pid: u32) -> Result<(), Fault> {
        if !self.processes.contains_key(&pid) {
            return Err(Fault::UnknownProcess { pid });
        }
        self.current = Some(pid);
        debug!("mmu: switched to process {pid}");
        Ok(())
    }

    /// Clones the current directory into a new process and returns its pid.
    /// Every writable page becomes copy-on-write in both directories. The
    /// current process does not change.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::NoProcess`] when no process is current.
    pub fn fork_process(&mut self) -> Result<u32, Fault> {
        let parent = self.current_pid()?;
        let directory = self.directory_mut()?;
        for entry in directory.entries_mut() {
            if entry.permissions.write {
                entry.copy_on_write = true;
            }
        }
        let child = directory.clone();
        let locations: Vec<_> = child.iter().map(|(_, entry)| entry.location).collect();
        for location in locations {
            self.retain(location);
        }
        let pid = self.insert_process(child);
        debug!("mmu: forked process {parent} into {pid}");
        Ok(pid)
    }

    /// Maps `vpage` in the current process onto a fresh zeroed frame taken from
    /// the kernel or user pool, and returns the frame number.
    ///
    /// # Errors
    ///
    /// [`Fault::NoProcess`], [`Fault::AlreadyMapped`], [`Fault::MemoryOutOfBounds`]
    /// for a page number beyond [`MAX_VPAGE`], or [`Fault::ResourceExhausted`].
    pub fn add_vpage(
        &mut self,
        ram: &mut Ram,
        vpage: u32,
        permissions: Permissions,
        copy_on_write: bool,
    ) -> Result<u32, Fault> {
        check_vpage(vpage)?;
        if self.directory()?.get(vpage).is_some() {
            return Err(Fault::AlreadyMapped { vpage });
        }
        let pool = if permissions.kernel {
            PagePool::Kernel
        } else {
            PagePool::User
        };
        let frame = self.allocate_frame(ram, pool, None)?;
        ram.zero_frame(frame)?;
        self.track_frame(frame, 1);
        self.directory_mut()?.insert(
            vpage,
            PageTableEntry {
                location: PageLocation::Resident(frame),
                permissions,
                copy_on_write,
            },
        );
        Ok(frame)
    }

    /// Unmaps `vpage`, freeing its frame or slot once no mapping references it.
    ///
    /// # Errors
    ///
    /// [`Fault::NoProcess`], [`Fault::PageFault`] when the page is not mapped,
    /// or [`Fault::ConsistencyFault`].
    pub fn remove_vpage(&mut self, vpage: u32) -> Result<(), Fault> {
        check_vpage(vpage)?;
        let entry = self
            .directory_mut()?
            .remove(vpage)
            .ok_or_else(|| unmapped(vpage))?;
        self.release_location(entry.location)
    }

    /// Unmaps every page of the current process. The process stays alive.
    ///
    /// # Errors
    ///
    /// [`Fault::NoProcess`], or the first [`Fault::ConsistencyFault`] hit.
    pub fn remove_pagedir(&mut self) -> Result<(), Fault> {
        let entries = self.directory_mut()?.take_all();
        self.release_entries(entries)
    }

    /// Maps `from_pid`'s `from_vpage` at `to_vpage` in the current process.
    /// With `copy_on_write`, a writable page becomes copy-on-write on both sides.
    ///
    /// # Errors
    ///
    /// [`Fault::NoProcess`], [`Fault::UnknownProcess`], [`Fault::PageFault`] when
    /// the source is unmapped, or [`Fault::AlreadyMapped`].
    pub fn share_vpage(
        &mut self,
        from_pid: u32,
        from_vpage: u32,
        to_vpage: u32,
        copy_on_write: bool,
    ) -> Result<(), Fault> {
        check_vpage(from_vpage)?;
        check_vpage(to_vpage)?;
        if self.directory()?.get(to_vpage).is_some() {
            return Err(Fault::AlreadyMapped { vpage: to_vpage });
        }
        let source = self
            .processes
            .get_mut(&from_pid)
            .ok_or(Fault::UnknownProcess { pid: from_pid })?
            .get_mut(from_vpage)
            .ok_or_else(|| unmapped(from_vpage))?;
        if copy_on_write && source.permissions.write {
            source.copy_on_write = true;
        }
        let shared = *source;
        self.retain(shared.location);
        self.directory_mut()?.insert(to_vpage, shared);
        Ok(())
    }

    /// Translates a virtual address into a physical RAM address, paging the
    /// page in from disk and breaking copy-on-write sharing as needed.
    ///
    /// # Errors
    ///
    /// [`Fault::NoProcess`], [`Fault::PageFault`], [`Fault::ProtectionFault`],
    /// or [`Fault::ResourceExhausted`] when a page-in finds no frame.
    pub fn translate(
        &mut self,
        ram: &mut Ram,
        vaddr: u32,
        access: Access,
        privilege: Privilege,
    ) -> Result<u32, Fault> {
        let frame = self.resolve(ram, vaddr >> PAGE_SHIFT, vaddr, access, privilege)?;
        Ok(ram.frame_address(frame) + (vaddr & (PAGE_SIZE - 1)))
    }

    /// Translates a host-side write. Page permissions and privilege are not
    /// checked, but a paged-out page is brought in and copy-on-write sharing
    /// is broken, so other processes never observe the write.
    ///
    /// # Errors
    ///
    /// [`Fault::NoProcess`], [`Fault::PageFault`] when unmapped, or
    /// [`Fault::ResourceExhausted`] when no frame is available.
    pub fn translate_host_write(&mut self, ram: &mut Ram, vaddr: u32) -> Result<u32, Fault> {
        let vpage = vaddr >> PAGE_SHIFT;
        let entry = self.lookup(vpage, vaddr, Access::Write)?;
        let frame = self.materialize(ram, vpage, entry, Access::Write)?;
        Ok(ram.frame_address(frame) + (vaddr & (PAGE_SIZE - 1)))
    }

    /// Translates a virtual page number into a frame number.
    ///
    /// # Errors
    ///
    /// As [`Mmu::translate`], plus [`Fault::MemoryOutOfBounds`] for a page
    /// number beyond [`MAX_VPAGE`].
    pub fn translate_page(
        &mut self,
        ram: &mut Ram,
        vpage: u32,
        access: Access,
        privilege: Privilege,
    ) -> Result<u32, Fault> {
        check_vpage(vpage)?;
        self.resolve(ram, vpage, vpage << PAGE_SHIFT, access, privilege)
    }

    /// Writes a resident page out to a free disk slot. Every mapping of the
    /// frame, in any process, is repointed to the slot. Already paged-out
    /// pages are left alone.
    ///
    /// # Errors
    ///
    /// [`Fault::NoProcess`], [`Fault::PageFault`] when unmapped, or
    /// [`Fault::ResourceExhausted`] when the disk is full.
    pub fn page_out(&mut self, ram: &Ram, vpage: u32) -> Result<(), Fault> {
        check_vpage(vpage)?;
        let entry = self
            .directory()?
            .get(vpage)
            .copied()
            .ok_or_else(|| unmapped(vpage))?;
        match entry.location {
            PageLocation::Resident(frame) => self.evict(ram, frame),
            PageLocation::OnDisk(_) => Ok(()),
        }
    }

    /// Reference count of the location `vpage` maps to in the current process.
    ///
    /// # Errors
    ///
    /// [`Fault::NoProcess`] or [`Fault::PageFault`] when unmapped.
    pub fn reference_count(&self, vpage: u32) -> Result<u32, Fault> {
        check_vpage(vpage)?;
        let entry = self.directory()?.get(vpage).ok_or_else(|| unmapped(vpage))?;
        let refs = match entry.location {
            PageLocation::Resident(_) => &self.frame_refs,
            PageLocation::OnDisk(_) => &self.slot_refs,
        };
        Ok(refs.get(&entry.location.page()).copied().unwrap_or(0))
    }

    /// Current process's mapping of `vpage`, if any.
    #[must_use]
    pub fn mapping(&self, vpage: u32) -> Option<PageTableEntry> {
        self.directory().ok()?.get(vpage).copied()
    }

    /// Page directory of `pid`.
    #[must_use]
    pub fn page_directory(&self, pid: u32) -> Option<&PageDirectory> {
        self.processes.get(&pid)
    }

    /// Current process id, if any.
    #[must_use]
    pub const fn current_process(&self) -> Option<u32> {
        self.current
    }

    /// Live process ids in ascending order.
    pub fn processes(&self) -> impl Iterator<Item = u32> + '_ {
        self.processes.keys().copied()
    }

    /// Free-page pool for `pool`.
    #[must_use]
    pub const fn pool(&self, pool: PagePool) -> &FreePagePool {
        match pool {
            PagePool::User => &self.user_pool,
            PagePool::Kernel => &self.kernel_pool,
            PagePool::Disk => &self.disk_pool,
        }
    }

    /// Backing store.
    #[must_use]
    pub const fn disk(&self) -> &Disk {
        &self.disk
    }

    /// Paging counters.
    #[must_use]
    pub const fn stats(&self) -> &MmuStats {
        &self.stats
    }

    fn insert_process(&mut self, directory: PageDirectory) -> u32 {
        let pid = self.next_pid;
        self.next_pid = self.next_pid.wrapping_add(1).max(1);
        self.processes.insert(pid, directory);
        pid
    }

    fn current_pid(&self) -> Result<u32, Fault> {
        self.current.ok_or(Fault::NoProcess)
    }

    fn directory(&self) -> Result<&PageDirectory, Fault> {
        let pid = self.current_pid()?;
        self.processes
            .get(&pid)
            .ok_or(Fault::UnknownProcess { pid })
    }

    fn directory_mut(&mut self) -> Result<&mut PageDirectory, Fault> {
        let pid = self.current_pid()?;
        self.processes
            .get_mut(&pid)
            .ok_or(Fault::UnknownProcess { pid })
    }

    fn resolve(
        &mut self,
        ram: &mut Ram,
        vpage: u32,
        vaddr: u32,
        access: Access,
        privilege: Privilege,
    ) -> Result<u32, Fault> {
        let entry = self.lookup(vpage, vaddr, access)?;
        let permitted = match access {
            Access::Read => true,
            Access::Write => entry.permissions.write,
            Access::Execute => entry.permissions.execute,
        };
        if !permitted || (entry.permissions.kernel && privilege == Privilege::User) {
            self.stats.protection_faults = self.stats.protection_faults.saturating_add(1);
            return Err(Fault::ProtectionFault {
                address: vaddr,
                access,
            });
        }
        self.materialize(ram, vpage, entry, access)
    }

    fn lookup(&mut self, vpage: u32, vaddr: u32, access: Access) -> Result<PageTableEntry, Fault> {
        match self.directory()?.get(vpage).copied() {
            Some(entry) => Ok(entry),
            None => {
                self.stats.page_faults = self.stats.page_faults.saturating_add(1);
                Err(Fault::PageFault {
                    address: vaddr,
                    access,
                })
            }
        }
    }

    /// Makes `entry` resident and, for writes, private to the current process.
    fn materialize(
        &mut self,
        ram: &mut Ram,
        vpage: u32,
        entry: PageTableEntry,
        access: Access,
    ) -> Result<u32, Fault> {
        let frame = match entry.location {
            PageLocation::Resident(frame) => frame,
            PageLocation::OnDisk(slot) => {
                let pool = if entry.permissions.kernel {
                    PagePool::Kernel
                } else {
                    PagePool::User
                };
                self.page_in(ram, slot, pool)?
            }
        };

        if access == Access::Write && entry.copy_on_write {
            return self.break_copy_on_write(ram, vpage, frame);
        }
        Ok(frame)
    }

    fn page_in(&mut self, ram: &mut Ram, slot: u32, pool: PagePool) -> Result<u32, Fault> {
        let mut buffer = [0u8; PAGE_SIZE as usize];
        self.disk.read_slot(slot, &mut buffer)?;
        let frame = self.allocate_frame(ram, pool, None)?;
        ram.write_bytes(ram.frame_address(frame), &buffer)?;

        let count = self.slot_refs.remove(&slot).ok_or(Fault::ConsistencyFault {
            pool: PagePool::Disk,
            page: slot,
        })?;
        self.disk_pool.release(slot)?;
        self.repoint(PageLocation::OnDisk(slot), PageLocation::Resident(frame));
        self.track_frame(frame, count);
        self.stats.page_ins = self.stats.page_ins.saturating_add(1);
        debug!("mmu: paged in slot {slot} to frame {frame}");
        Ok(frame)
    }

    fn break_copy_on_write(&mut self, ram: &mut Ram, vpage: u32, frame: u32) -> Result<u32, Fault> {
        let shared = self.frame_refs.get(&frame).copied().unwrap_or(0) > 1;
        let target = if shared {
            let pool = self.frame_pool(frame);
            let copy = self.allocate_frame(ram, pool, Some(frame))?;
            ram.copy_frame(frame, copy)?;
            self.track_frame(copy, 1);
            self.release_location(PageLocation::Resident(frame))?;
            self.stats.copy_on_write_copies = self.stats.copy_on_write_copies.saturating_add(1);
            debug!("mmu: copy-on-write vpage {vpage:#x} frame {frame} -> {copy}");
            copy
        } else {
            frame
        };
        if let Some(entry) = self.directory_mut()?.get_mut(vpage) {
            entry.location = PageLocation::Resident(target);
            entry.copy_on_write = false;
        }
        Ok(target)
    }

    /// Takes a frame from `pool`, evicting the oldest resident frame of the
    /// same pool (other than `pinned`) when it is empty.
    fn allocate_frame(
        &mut self,
        ram: &Ram,
        pool: PagePool,
        pinned: Option<u32>,
    ) -> Result<u32, Fault> {
        if let Ok(frame) = self.pool_mut(pool).allocate() {
            return Ok(frame);
        }
        let victim = self
            .resident
            .iter()
            .copied()
            .find(|frame| Some(*frame) != pinned && self.frame_pool(*frame) == pool)
            .ok_or(Fault::ResourceExhausted { pool })?;
        self.evict(ram, victim)?;
        self.stats.evictions = self.stats.evictions.saturating_add(1);
        debug!("mmu: evicted frame {victim} from {pool} pool");
        self.pool_mut(pool).allocate()
    }

    fn evict(&mut self, ram: &Ram, frame: u32) -> Result<(), Fault> {
        let pool = self.frame_pool(frame);
        let count = self
            .frame_refs
            .get(&frame)
            .copied()
            .ok_or(Fault::ConsistencyFault { pool, page: frame })?;
        let mut buffer = [0u8; PAGE_SIZE as usize];
        ram.read_bytes(ram.frame_address(frame), &mut buffer)?;
        let slot = self.disk_pool.allocate()?;
        self.disk.write_slot(slot, &buffer)?;

        self.frame_refs.remove(&frame);
        self.resident.retain(|resident| *resident != frame);
        self.slot_refs.insert(slot, count);
        self.repoint(PageLocation::Resident(frame), PageLocation::OnDisk(slot));
        self.pool_mut(pool).release(frame)?;
        self.stats.page_outs = self.stats.page_outs.saturating_add(1);
        debug!("mmu: paged out frame {frame} to slot {slot}");
        Ok(())
    }

    fn repoint(&mut self, from: PageLocation, to: PageLocation) {
        for directory in self.processes.values_mut() {
            for entry in directory.entries_mut() {
                if entry.location == from {
                    entry.location = to;
                }
            }
        }
    }

    fn track_frame(&mut self, frame: u32, count: u32) {
        self.frame_refs.insert(frame, count);
        self.resident.push_back(frame);
    }

    fn retain(&mut self, location: PageLocation) {
        let refs = match location {
            PageLocation::Resident(_) => &mut self.frame_refs,
            PageLocation::OnDisk(_) => &mut self.slot_refs,
        };
        let count = refs.entry(location.page()).or_insert(0);
        *count = count.saturating_add(1);
    }

    fn release_location(&mut self, location: PageLocation) -> Result<(), Fault> {
        let page = location.page();
        let pool = match location {
            PageLocation::Resident(frame) => self.frame_pool(frame),
            PageLocation::OnDisk(_) => PagePool::Disk,
        };
        let refs = match location {
            PageLocation::Resident(_) => &mut self.frame_refs,
            PageLocation::OnDisk(_) => &mut self.slot_refs,
        };
        let count = refs
            .get_mut(&page)
            .ok_or(Fault::ConsistencyFault { pool, page })?;
        *count = count.saturating_sub(1);
        if *count > 0 {
            return Ok(());
        }
        refs.remove(&page);
        if let PageLocation::Resident(frame) = location {
            self.resident.retain(|resident| *resident != frame);
        }
        self.pool_mut(pool).release(page)
    }

    fn release_entries(&mut self, entries: BTreeMap<u32, PageTableEntry>) -> Result<(), Fault> {
        let mut first_fault = None;
        for entry in entries.into_values() {
            if let Err(fault) = self.release_location(entry.location) {
                first_fault.get_or_insert(fault);
            }
        }
        first_fault.map_or(Ok(()), Err)
    }

    const fn frame_pool(&self, frame: u32) -> PagePool {
        if self.user_pool.owns(frame) {
            PagePool::User
        } else {
            PagePool::Kernel
        }
    }

    fn pool_mut(&mut self, pool: PagePool) -> &mut FreePagePool {
        match pool {
            PagePool::User => &mut self.user_pool,
            PagePool::Kernel => &mut self.kernel_pool,
            PagePool::Disk => &mut self.disk_pool,
        }
    }
}
