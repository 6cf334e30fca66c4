//! # Two-Level Page Tables
//!
//! - [`L2Index`]: index into the page directory, VA bits `[31:22]`.
//! - [`L1Index`]: index into a page table, VA bits `[21:12]`.
//! - [`PageDirectory`]: 1024 slots, each an optional second-level table.
//! - [`PageTable`]: 1024 leaf entries, each mapping one 4 KiB page.
//!
//! A directory slot holds its table by ownership, so a table exists exactly
//! as long as the directory refers to it. Leaf entries never point to
//! another table.

use crate::PageEntryBits;
use alloc::boxed::Box;
use kernel_info::memory::ENTRIES_PER_TABLE;
use kernel_memory_addresses::{VirtualAddress, VirtualPage};

const INDEX_MASK: u64 = ENTRIES_PER_TABLE as u64 - 1;
const INDEX_BITS: u32 = ENTRIES_PER_TABLE.trailing_zeros();

/// Index into the [`PageDirectory`] (VA bits `[31:22]`).
#[repr(transparent)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct L2Index(u16);

/// Index into a [`PageTable`] (VA bits `[21:12]`).
#[repr(transparent)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct L1Index(u16);

impl L2Index {
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from(va: VirtualAddress) -> Self {
        Self(((va.page().number() >> INDEX_BITS) & INDEX_MASK) as u16)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl L1Index {
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from(va: VirtualAddress) -> Self {
        Self((va.page().number() & INDEX_MASK) as u16)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Split a virtual address into its directory and table indices.
#[inline]
#[must_use]
pub const fn split_indices(va: VirtualAddress) -> (L2Index, L1Index) {
    (L2Index::from(va), L1Index::from(va))
}

/// Rebuild the page addressed by a pair of indices.
#[inline]
#[must_use]
pub const fn join_indices(i2: usize, i1: usize) -> VirtualPage {
    VirtualPage::from_number(((i2 as u64) << INDEX_BITS) | i1 as u64)
}

/// Second-level table: 1024 leaf entries.
#[doc(alias = "PT")]
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PageEntryBits; ENTRIES_PER_TABLE],
}

impl PageTable {
    #[must_use]
    pub fn new_boxed() -> Box<Self> {
        Box::new(Self {
            entries: [PageEntryBits::new(); ENTRIES_PER_TABLE],
        })
    }

    #[inline]
    #[must_use]
    pub fn get(&self, i: L1Index) -> PageEntryBits {
        self.entries[i.as_usize()]
    }

    #[inline]
    pub fn set(&mut self, i: L1Index, e: PageEntryBits) {
        self.entries[i.as_usize()] = e;
    }

    /// Present entries with their slot numbers.
    pub fn present(&self) -> impl Iterator<Item = (usize, PageEntryBits)> + '_ {
        self.entries
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, e)| e.present())
    }
}

/// Top-level table. Slot `i` owns the table covering VA `i << 22`.
#[doc(alias = "PD")]
pub struct PageDirectory {
    tables: [Option<Box<PageTable>>; ENTRIES_PER_TABLE],
}

impl PageDirectory {
    #[must_use]
    pub fn new_boxed() -> Box<Self> {
        Box::new(Self {
            tables: core::array::from_fn(|_| None),
        })
    }

    #[inline]
    #[must_use]
    pub fn table(&self, i: L2Index) -> Option<&PageTable> {
        self.tables[i.as_usize()].as_deref()
    }

    #[inline]
    pub fn table_mut(&mut self, i: L2Index) -> Option<&mut PageTable> {
        self.tables[i.as_usize()].as_deref_mut()
    }

    /// The table at `i`, created empty if missing. The flag is `true` when a
    /// new table was created.
    pub fn ensure_table(&mut self, i: L2Index) -> (&mut PageTable, bool) {
        let slot = &mut self.tables[i.as_usize()];
        let created = slot.is_none();
        (slot.get_or_insert_with(PageTable::new_boxed), created)
    }

    /// Allocated tables with their slot numbers.
    pub fn tables(&self) -> impl Iterator<Item = (usize, &PageTable)> + '_ {
        self.tables
            .iter()
            .enumerate()
            .filter_map(|(i, t)| t.as_deref().map(|t| (i, t)))
    }

    /// Drop every second-level table; returns how many there were.
    pub fn clear(&mut self) -> usize {
        self.tables.iter_mut().filter_map(Option::take).count()
    }
}
