//! Per-frame reference counts.

use crate::FrameIndex;
use alloc::vec;
use alloc::vec::Vec;

/// Flat `frame → count` table covering the whole physical index space.
///
/// A count is the number of live mappings of the frame. Zero means the frame
/// is free (or not managed at all). The table itself performs no locking; the
/// allocator keeps it behind its own spin lock, separate from the free list.
pub(crate) struct RefTable {
    counts: Vec<u32>,
}

impl RefTable {
    pub(crate) fn new(index_space: usize) -> Self {
        Self {
            counts: vec![0; index_space],
        }
    }

    #[inline]
    pub(crate) fn get(&self, frame: FrameIndex) -> u32 {
        self.counts[frame.as_usize()]
    }

    #[inline]
    pub(crate) fn set(&mut self, frame: FrameIndex, count: u32) {
        self.counts[frame.as_usize()] = count;
    }

    /// Add one reference; `None` on overflow (count left unchanged).
    #[inline]
    pub(crate) fn increment(&mut self, frame: FrameIndex) -> Option<u32> {
        let slot = &mut self.counts[frame.as_usize()];
        *slot = slot.checked_add(1)?;
        Some(*slot)
    }

    /// Drop one reference; `None` if the count was already zero.
    #[inline]
    pub(crate) fn decrement(&mut self, frame: FrameIndex) -> Option<u32> {
        let slot = &mut self.counts[frame.as_usize()];
        *slot = slot.checked_sub(1)?;
        Some(*slot)
    }

    /// Number of frames with at least one reference.
    pub(crate) fn referenced(&self) -> usize {
        self.counts.iter().filter(|&&c| c > 0).count()
    }
}
