//! # Address Space
//!
//! One user address space: a [`PageDirectory`] plus the second-level tables
//! it owns. All operations address the 4 KiB page containing the given
//! virtual address.
//!
//! ## Highlights
//!
//! - [`AddressSpace::map`] installs a leaf, creating its table on demand.
//! - [`AddressSpace::unmap`] clears a leaf and returns what it held.
//! - [`AddressSpace::translate`] walks both levels.
//! - [`AddressSpace::set_flags`] and [`AddressSpace::remap`] rewrite a
//!   present leaf in place.
//! - [`AddressSpace::table_pages`] counts the directory and its tables.
//!
//! ## Design
//!
//! - Table memory is owned by the address space and never comes out of the
//!   physical frame pool. Frame references held by leaves are the caller's
//!   business: this layer neither retains nor releases frames.
//! - Kernel addresses (`>= KERNEL_BASE`) are refused.
//! - Second-level tables are kept when their last leaf is removed and only
//!   dropped by [`AddressSpace::clear`].

use crate::error::MapError;
use crate::page_table::{PageDirectory, join_indices, split_indices};
use crate::PageEntryBits;
use alloc::boxed::Box;
use core::fmt;
use kernel_info::memory::KERNEL_BASE;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, VirtualAddress, VirtualPage};
use log::trace;

/// A user address space rooted at its own page directory.
pub struct AddressSpace {
    directory: Box<PageDirectory>,
    tables: usize,
    mapped: usize,
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressSpace {
    /// An empty space: a directory with no tables.
    #[must_use]
    pub fn new() -> Self {
        Self {
            directory: PageDirectory::new_boxed(),
            tables: 0,
            mapped: 0,
        }
    }

    #[inline]
    const fn check_user(va: VirtualAddress) -> Result<(), MapError> {
        if va.as_u64() >= KERNEL_BASE {
            return Err(MapError::NotUserAddress(va));
        }
        Ok(())
    }

    /// Install `page` at `va` with the permission bits of `flags`.
    ///
    /// The present bit is forced on; frame bits in `flags` are replaced.
    ///
    /// # Errors
    /// - [`MapError::NotUserAddress`] for kernel addresses.
    /// - [`MapError::AlreadyMapped`] if a present leaf exists.
    pub fn map(
        &mut self,
        va: VirtualAddress,
        page: PhysicalPage,
        flags: PageEntryBits,
    ) -> Result<(), MapError> {
        Self::check_user(va)?;
        let (i2, i1) = split_indices(va);
        let (table, created) = self.directory.ensure_table(i2);
        if table.get(i1).present() {
            return Err(MapError::AlreadyMapped(va));
        }
        table.set(i1, flags.with_present(true).with_physical_page(page));
        if created {
            self.tables += 1;
        }
        self.mapped += 1;
        trace!("map {} -> {page}", va.page());
        Ok(())
    }

    /// Remove the leaf at `va`, returning the entry it held.
    pub fn unmap(&mut self, va: VirtualAddress) -> Option<PageEntryBits> {
        Self::check_user(va).ok()?;
        let (i2, i1) = split_indices(va);
        let table = self.directory.table_mut(i2)?;
        let old = table.get(i1);
        if !old.present() {
            return None;
        }
        table.set(i1, PageEntryBits::new());
        self.mapped -= 1;
        trace!("unmap {} (was {})", va.page(), old.physical_page());
        Some(old)
    }

    /// The present leaf covering `va`, if any.
    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> Option<PageEntryBits> {
        Self::check_user(va).ok()?;
        let (i2, i1) = split_indices(va);
        let e = self.directory.table(i2)?.get(i1);
        e.present().then_some(e)
    }

    /// Physical address backing `va`, including the in-page offset.
    #[must_use]
    pub fn translate_address(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        self.translate(va)
            .map(|e| e.physical_address() + va.page_offset())
    }

    /// Replace the permission bits of a present leaf; the frame is kept.
    /// Returns the previous entry.
    ///
    /// # Errors
    /// [`MapError::NotMapped`] if no present leaf covers `va`.
    pub fn set_flags(
        &mut self,
        va: VirtualAddress,
        flags: PageEntryBits,
    ) -> Result<PageEntryBits, MapError> {
        self.rewrite(va, |old| flags.with_present(true).with_physical_page(old.physical_page()))
    }

    /// Point a present leaf at a different frame with new permissions.
    /// Returns the previous entry.
    ///
    /// # Errors
    /// [`MapError::NotMapped`] if no present leaf covers `va`.
    pub fn remap(
        &mut self,
        va: VirtualAddress,
        page: PhysicalPage,
        flags: PageEntryBits,
    ) -> Result<PageEntryBits, MapError> {
        self.rewrite(va, |_| flags.with_present(true).with_physical_page(page))
    }

    fn rewrite(
        &mut self,
        va: VirtualAddress,
        f: impl FnOnce(PageEntryBits) -> PageEntryBits,
    ) -> Result<PageEntryBits, MapError> {
        Self::check_user(va)?;
        let (i2, i1) = split_indices(va);
        let table = self
            .directory
            .table_mut(i2)
            .ok_or(MapError::NotMapped(va))?;
        let old = table.get(i1);
        if !old.present() {
            return Err(MapError::NotMapped(va));
        }
        table.set(i1, f(old));
        Ok(old)
    }

    /// Pages backing the translation structures: the directory plus every
    /// second-level table.
    #[must_use]
    pub const fn table_pages(&self) -> usize {
        1 + self.tables
    }

    /// Number of present leaves.
    #[must_use]
    pub const fn mapped_pages(&self) -> usize {
        self.mapped
    }

    /// Every present leaf in ascending address order.
    pub fn mappings(&self) -> impl Iterator<Item = (VirtualPage, PageEntryBits)> + '_ {
        self.directory.tables().flat_map(|(i2, table)| {
            table
                .present()
                .map(move |(i1, e)| (join_indices(i2, i1), e))
        })
    }

    /// Drop all leaves and tables. Frames referenced by the leaves must have
    /// been released by the caller.
    pub fn clear(&mut self) {
        let dropped = self.directory.clear();
        debug_assert_eq!(dropped, self.tables);
        self.tables = 0;
        self.mapped = 0;
    }
}

impl fmt::Debug for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddressSpace")
            .field("tables", &self.tables)
            .field("mapped", &self.mapped)
            .finish()
    }
}
