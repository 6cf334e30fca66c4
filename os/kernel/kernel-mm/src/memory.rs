//! # Process Memory Descriptor
//!
//! ```text
//! 0 ─────────────── size ───────── USER_TOP = SHARED_PAGE_VA ── KERNEL_BASE
//! │ eager pages │ reserved │  (unused)  │        shared page        │ kernel
//! │ (mapped)    │ (lazy)   │            │ (family grant only)       │
//! ```
//!
//! `size` is the declared extent of the process. Pages below it are either
//! mapped, or reserved and waiting for their first touch. The shared page
//! lives above every possible `size` and is accounted for separately.

use alloc::vec::Vec;
use core::fmt;
use core::ops::Range;
use kernel_alloc::FrameIndex;
use kernel_info::memory::{SHARED_PAGE_VA, shared_page_va};
use kernel_memory_addresses::{PAGE_SIZE, VirtualAddress, page_round_down, pages_spanning};
use kernel_vmem::AddressSpace;

/// Process identifier as seen by the memory manager.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Pid(pub u32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid {}", self.0)
    }
}

/// Reserved-but-uncommitted byte ranges of a process, in ascending order.
///
/// A page of a reserved range receives a frame on its first fault and then
/// stays mapped; the range itself is kept so that later faults on the other
/// pages still resolve.
#[derive(Debug, Clone, Default)]
pub struct Reservations {
    ranges: Vec<Range<u64>>,
}

impl Reservations {
    /// Record `range`, merging it with an adjacent predecessor.
    pub(crate) fn insert(&mut self, range: Range<u64>) {
        if range.is_empty() {
            return;
        }
        if let Some(last) = self.ranges.last_mut()
            && last.end == range.start
        {
            last.end = range.end;
            return;
        }
        self.ranges.push(range);
    }

    /// Drop everything at or above `end`.
    pub(crate) fn truncate(&mut self, end: u64) {
        self.ranges.retain_mut(|r| {
            r.end = r.end.min(end);
            !r.is_empty()
        });
    }

    pub(crate) fn clear(&mut self) {
        self.ranges.clear();
    }

    /// `true` if the page holding `va` overlaps a reserved range.
    #[must_use]
    pub fn covers(&self, va: VirtualAddress) -> bool {
        let page = page_round_down(va.as_u64());
        let end = page.saturating_add(PAGE_SIZE);
        self.ranges.iter().any(|r| r.start < end && page < r.end)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Range<u64>> {
        self.ranges.iter()
    }
}

/// The process's view of the family shared page.
///
/// Present only while the process holds the grant; the frame is then mapped
/// writable at [`SHARED_PAGE_VA`] and carries one reference for this process.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SharedSlot {
    pub(crate) frame: FrameIndex,
    /// 0 for the creator, 1 for its direct children. Only generation 0
    /// passes the grant on at fork.
    pub(crate) generation: u8,
}

impl SharedSlot {
    #[must_use]
    pub const fn frame(&self) -> FrameIndex {
        self.frame
    }

    #[must_use]
    pub const fn generation(&self) -> u8 {
        self.generation
    }

    #[must_use]
    pub const fn va(&self) -> VirtualAddress {
        shared_page_va()
    }

    #[must_use]
    pub const fn is_creator(&self) -> bool {
        self.generation == 0
    }
}

/// What a process sees at one page of its address space.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PageState {
    /// Neither mapped nor reserved; any access is a genuine fault.
    Absent,
    /// Reserved by a demand mapping, no frame yet.
    ReservedUncommitted,
    /// Mapped read-only and copy-on-write.
    SharedReadOnly,
    /// Mapped writable and private to this process.
    PrivateWritable,
    /// The family shared page: writable, shared, never copied.
    SharedWritable,
}

/// Memory descriptor of one process.
pub struct UserMemory {
    pub(crate) pid: Pid,
    pub(crate) size: u64,
    pub(crate) space: AddressSpace,
    pub(crate) reserved: Reservations,
    pub(crate) shared: Option<SharedSlot>,
}

impl UserMemory {
    pub(crate) fn new(pid: Pid) -> Self {
        Self {
            pid,
            size: 0,
            space: AddressSpace::new(),
            reserved: Reservations::default(),
            shared: None,
        }
    }

    #[must_use]
    pub const fn pid(&self) -> Pid {
        self.pid
    }

    /// Declared size in bytes (the `sz` of the process).
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    #[must_use]
    pub const fn space(&self) -> &AddressSpace {
        &self.space
    }

    #[must_use]
    pub const fn reservations(&self) -> &Reservations {
        &self.reserved
    }

    #[must_use]
    pub const fn shared_slot(&self) -> Option<&SharedSlot> {
        self.shared.as_ref()
    }

    /// The shared page address if this process holds the grant.
    #[must_use]
    pub const fn lookup_shared(&self) -> Option<VirtualAddress> {
        match self.shared {
            Some(_) => Some(shared_page_va()),
            None => None,
        }
    }

    /// Pages in the declared range (reserved ones included) plus the shared
    /// page when it is mapped.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn virtual_pages(&self) -> usize {
        let shared = if self.shared.is_some() { 1 } else { 0 };
        pages_spanning(self.size) as usize + shared
    }

    /// Pages of this address space backed by a frame.
    #[must_use]
    pub const fn resident_pages(&self) -> usize {
        self.space.mapped_pages()
    }

    /// Pages used by this process's page tables.
    #[must_use]
    pub const fn page_table_pages(&self) -> usize {
        self.space.table_pages()
    }

    /// Classify the page containing `va`.
    #[must_use]
    pub fn page_state(&self, va: VirtualAddress) -> PageState {
        match self.space.translate(va) {
            Some(e) if e.shared() => PageState::SharedWritable,
            Some(e) if e.writable() => PageState::PrivateWritable,
            Some(_) => PageState::SharedReadOnly,
            None if va.as_u64() < self.size && self.reserved.covers(va) => {
                PageState::ReservedUncommitted
            }
            None => PageState::Absent,
        }
    }

    /// `true` if `va` lies on the shared page.
    #[inline]
    pub(crate) const fn is_shared_page(va: VirtualAddress) -> bool {
        page_round_down(va.as_u64()) == SHARED_PAGE_VA
    }
}

impl fmt::Debug for UserMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserMemory")
            .field("pid", &self.pid)
            .field("size", &format_args!("{:#x}", self.size))
            .field("space", &self.space)
            .field("reserved", &self.reserved)
            .field("shared", &self.shared)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reservations_merge_and_truncate() {
        let mut r = Reservations::default();
        r.insert(0x1000..0x3000);
        r.insert(0x3000..0x4000);
        r.insert(0x6000..0x8000);
        assert_eq!(r.iter().count(), 2);
        assert!(r.covers(VirtualAddress::new(0x3FFF)));
        assert!(!r.covers(VirtualAddress::new(0x4000)));

        r.truncate(0x2000);
        assert_eq!(r.iter().cloned().collect::<Vec<_>>(), vec![0x1000..0x2000]);
        r.truncate(0);
        assert!(r.is_empty());
    }

    #[test]
    fn reservation_starting_mid_page_covers_the_page() {
        let mut r = Reservations::default();
        r.insert(0x1800..0x2800);
        assert!(r.covers(VirtualAddress::new(0x1000)));
        assert!(r.covers(VirtualAddress::new(0x2FFF)));
        assert!(!r.covers(VirtualAddress::new(0x3000)));
    }

    #[test]
    fn empty_descriptor_counts() {
        let mem = UserMemory::new(Pid(1));
        assert_eq!(mem.virtual_pages(), 0);
        assert_eq!(mem.resident_pages(), 0);
        assert_eq!(mem.page_table_pages(), 1);
        assert_eq!(mem.lookup_shared(), None);
        assert_eq!(mem.page_state(VirtualAddress::new(0)), PageState::Absent);
        assert!(UserMemory::is_shared_page(VirtualAddress::new(SHARED_PAGE_VA + 5)));
    }
}
