use std::collections::BTreeSet;

use crate::{Fault, PagePool};

/// Free pages within an inclusive `[low, high]` page range.
///
/// A range with `low > high` is empty and every allocation fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreePagePool {
    pool: PagePool,
    low: u32,
    high: u32,
    free: BTreeSet<u32>,
}

impl FreePagePool {
    /// Creates a pool with every page in `[low, high]` free.
    #[must_use]
    pub fn new(pool: PagePool, low: u32, high: u32) -> Self {
        Self {
            pool,
            low,
            high,
            free: (low..=high).collect(),
        }
    }

    /// Which pool this is.
    #[must_use]
    pub const fn pool(&self) -> PagePool {
        self.pool
    }

    /// Inclusive low page.
    #[must_use]
    pub const fn low(&self) -> u32 {
        self.low
    }

    /// Inclusive high page.
    #[must_use]
    pub const fn high(&self) -> u32 {
        self.high
    }

    /// Returns `true` when `page` lies inside the configured range.
    #[must_use]
    pub const fn owns(&self, page: u32) -> bool {
        page >= self.low && page <= self.high
    }

    /// Returns `true` when `page` is currently free.
    #[must_use]
    pub fn is_free(&self, page: u32) -> bool {
        self.free.contains(&page)
    }

    /// Number of free pages.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Takes the lowest free page.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::ResourceExhausted`] when no page is free.
    pub fn allocate(&mut self) -> Result<u32, Fault> {
        self.free
            .pop_first()
            .ok_or(Fault::ResourceExhausted { pool: self.pool })
    }

    /// Returns `page` to the pool.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::ConsistencyFault`] when `page` is already free or
    /// lies outside the pool's range.
    pub fn release(&mut self, page: u32) -> Result<(), Fault> {
        if !self.owns(page) || !self.free.insert(page) {
            return Err(Fault::ConsistencyFault {
                pool: self.pool,
                page,
            });
        }
        Ok(())
    }
}
