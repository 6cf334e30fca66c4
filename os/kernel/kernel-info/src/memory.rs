//! # Memory Layout

use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, VirtualAddress};

/// Start of kernel space; user virtual addresses lie strictly below it.
pub const KERNEL_BASE: u64 = 0x8000_0000;

/// Conventional virtual address of the family shared page.
///
/// Every process that holds the shared-memory grant maps the shared frame
/// here, so parent and children agree on the address without passing it.
pub const SHARED_PAGE_VA: u64 = KERNEL_BASE - PAGE_SIZE;

/// Exclusive upper bound of a process's declared (heap/mmap) size.
pub const USER_TOP: u64 = SHARED_PAGE_VA;

/// Top of the physical address range known to the kernel.
pub const PHYS_TOP: u64 = 0x0E00_0000; // 224 MiB

/// First physical address after the kernel image; frames below are never managed.
pub const KERNEL_END: u64 = 0x0020_0000; // 2 MiB

/// Upper bound of memory covered by the bootstrap mapping (first boot stage).
pub const EARLY_BOOT_LIMIT: u64 = 0x0040_0000; // 4 MiB

/// Byte written over every frame that returns to the free list.
pub const SCRUB_PATTERN: u8 = 0x01;

/// Entries per page directory / page table (two-level, 10+10+12 split).
pub const ENTRIES_PER_TABLE: usize = 1024;

const _: () = {
    assert!(SHARED_PAGE_VA.is_multiple_of(PAGE_SIZE));
    assert!(USER_TOP <= SHARED_PAGE_VA);
    assert!(KERNEL_END.is_multiple_of(PAGE_SIZE));
    assert!(EARLY_BOOT_LIMIT.is_multiple_of(PAGE_SIZE));
    assert!(PHYS_TOP.is_multiple_of(PAGE_SIZE));
    assert!(KERNEL_END < EARLY_BOOT_LIMIT && EARLY_BOOT_LIMIT < PHYS_TOP);
    assert!((ENTRIES_PER_TABLE * ENTRIES_PER_TABLE) as u64 * PAGE_SIZE == 1 << 32);
};

/// The shared page address as a typed value.
#[inline]
#[must_use]
pub const fn shared_page_va() -> VirtualAddress {
    VirtualAddress::new(SHARED_PAGE_VA)
}

/// Half-open physical range `[start, end)` of whole frames.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FrameRange {
    pub start: PhysicalAddress,
    pub end: PhysicalAddress,
}

impl FrameRange {
    #[must_use]
    pub const fn new(start: u64, end: u64) -> Self {
        Self {
            start: PhysicalAddress::new(start),
            end: PhysicalAddress::new(end),
        }
    }

    /// Number of whole frames in the range (0 for inverted ranges).
    #[must_use]
    pub const fn frames(&self) -> u64 {
        self.end.as_u64().saturating_sub(self.start.as_u64()) / PAGE_SIZE
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.start.as_u64() < other.end.as_u64() && other.start.as_u64() < self.end.as_u64()
    }
}

/// Physical geometry handed to the frame allocator at boot.
///
/// `early` is populated while only the bootstrap mapping exists, `full`
/// after the kernel page tables cover all of physical memory.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PoolLayout {
    pub phys_top: PhysicalAddress,
    pub early: FrameRange,
    pub full: FrameRange,
}

impl PoolLayout {
    /// Layout of the real machine: kernel image below [`KERNEL_END`],
    /// bootstrap stage up to [`EARLY_BOOT_LIMIT`], the rest up to [`PHYS_TOP`].
    #[must_use]
    pub const fn machine() -> Self {
        Self {
            phys_top: PhysicalAddress::new(PHYS_TOP),
            early: FrameRange::new(KERNEL_END, EARLY_BOOT_LIMIT),
            full: FrameRange::new(EARLY_BOOT_LIMIT, PHYS_TOP),
        }
    }

    /// A pool of exactly `frames` frames starting at [`KERNEL_END`], split
    /// roughly in half between the two boot stages.
    #[must_use]
    pub const fn small(frames: u64) -> Self {
        let early_frames = frames / 2;
        let mid = KERNEL_END + early_frames * PAGE_SIZE;
        let top = KERNEL_END + frames * PAGE_SIZE;
        Self {
            phys_top: PhysicalAddress::new(top),
            early: FrameRange::new(KERNEL_END, mid),
            full: FrameRange::new(mid, top),
        }
    }

    /// Frames that will be handed to the pool across both stages.
    #[must_use]
    pub const fn managed_frames(&self) -> u64 {
        self.early.frames() + self.full.frames()
    }

    /// Size of the frame index space (the reference table covers all of it).
    #[must_use]
    pub const fn index_space(&self) -> u64 {
        self.phys_top.as_u64() / PAGE_SIZE
    }

    /// Lowest managed physical address.
    #[must_use]
    pub const fn base(&self) -> PhysicalAddress {
        if self.early.start.as_u64() < self.full.start.as_u64() {
            self.early.start
        } else {
            self.full.start
        }
    }
}
