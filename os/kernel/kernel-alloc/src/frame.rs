//! Frame identity.

use core::fmt;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage};

/// Index of a physical frame (`physical address / PAGE_SIZE`).
///
/// The only way to obtain one outside this crate is through the allocator:
/// [`allocate`](crate::FrameAllocator::allocate) or the validating
/// [`frame_of`](crate::FrameAllocator::frame_of). Arbitrary arithmetic on
/// addresses therefore cannot produce a frame that bypasses reference counting.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FrameIndex(u32);

impl FrameIndex {
    #[inline]
    pub(crate) const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Frame containing a page-aligned physical page, unchecked.
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) const fn of_page(page: PhysicalPage) -> Self {
        Self(page.number() as u32)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn page(self) -> PhysicalPage {
        PhysicalPage::from_number(self.0 as u64)
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        self.page().base()
    }
}

impl fmt::Debug for FrameIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame#{}({})", self.0, self.base())
    }
}

impl fmt::Display for FrameIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
