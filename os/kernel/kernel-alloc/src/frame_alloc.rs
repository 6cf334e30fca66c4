//! # Reference-Counted Frame Allocator
//!
//! Hands out 4 KiB physical frames from a LIFO free list and tracks, per
//! frame, how many mappings refer to it. A frame returns to the free list
//! only when its last reference is released.
//!
//! ## Boot
//!
//! The pool is filled in two stages, mirroring how a kernel brings up its own
//! page tables: first the frames covered by the bootstrap mapping, then the
//! rest of physical memory once it is reachable.
//!
//! ```text
//! new() ──► boot_early(range) ──► boot_full(range) ──► go_online()
//!  Empty          Early                 Full              Online
//! ```
//!
//! Both population stages take `&mut self` and go through
//! [`SpinLock::get_mut`], so no lock is acquired before the allocator is
//! shared. After [`go_online`](FrameAllocator::go_online) the allocator is
//! only used through `&self`.
//!
//! ## Locking
//!
//! Two independent spin locks guard the free list and the reference table.
//! No code path holds both at once:
//!
//! - [`allocate`](FrameAllocator::allocate) pops under the free-list lock,
//!   drops it, then sets the count under the reference-table lock.
//! - [`release`](FrameAllocator::release) decrements under the
//!   reference-table lock, drops it, and only on the zero crossing scrubs the
//!   frame and pushes it under the free-list lock.
//!
//! Because the decrement is atomic with respect to other releases, exactly
//! one caller observes [`Released::Freed`] for a given zero crossing.

use crate::error::{BootError, FrameAllocError, InvariantViolation};
use crate::free_list::FreeList;
use crate::phys_mapper::{ArenaPhysMapper, FRAME_BYTES, PhysMapper};
use crate::ref_table::RefTable;
use crate::FrameIndex;
use alloc::vec::Vec;
use kernel_info::memory::{FrameRange, PoolLayout, SCRUB_PATTERN};
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress};
use kernel_sync::SpinLock;
use log::{debug, error, info, trace, warn};

/// Lifecycle of the pool; see the module documentation.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub enum BootStage {
    Empty,
    Early,
    Full,
    Online,
}

/// What a successful [`release`](FrameAllocator::release) did.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Released {
    /// Other mappings remain; the count after the release.
    StillShared(u32),
    /// The last reference is gone; the frame is back on the free list.
    Freed,
}

impl Released {
    #[inline]
    #[must_use]
    pub const fn is_freed(self) -> bool {
        matches!(self, Self::Freed)
    }
}

/// Physical frame allocator with per-frame reference counts.
pub struct FrameAllocator<M = ArenaPhysMapper> {
    layout: PoolLayout,
    mapper: M,
    free: SpinLock<FreeList>,
    refs: SpinLock<RefTable>,
    stage: BootStage,
    ranges: Vec<FrameRange>,
    total: usize,
}

impl FrameAllocator<ArenaPhysMapper> {
    /// Heap-backed allocator populated with both stages of `layout` and
    /// brought online.
    ///
    /// # Errors
    /// Any [`BootError`] raised while populating the layout's ranges.
    pub fn boot(layout: PoolLayout) -> Result<Self, BootError> {
        let mut alloc = Self::new(layout, ArenaPhysMapper::for_layout(&layout));
        alloc.boot_early(layout.early)?;
        alloc.boot_full(layout.full)?;
        alloc.go_online()?;
        Ok(alloc)
    }
}

impl<M: PhysMapper> FrameAllocator<M> {
    /// An empty allocator. The reference table covers the whole index space
    /// of `layout`; the free list starts empty.
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(layout: PoolLayout, mapper: M) -> Self {
        let index_space = layout.index_space() as usize;
        Self {
            layout,
            mapper,
            free: SpinLock::new(FreeList::new(index_space)),
            refs: SpinLock::new(RefTable::new(index_space)),
            stage: BootStage::Empty,
            ranges: Vec::new(),
            total: 0,
        }
    }

    /// Stage one: frames reachable through the bootstrap mapping.
    ///
    /// # Errors
    /// [`BootError`] if the range is invalid or the stage is out of order.
    pub fn boot_early(&mut self, range: FrameRange) -> Result<usize, BootError> {
        self.advance(BootStage::Empty, BootStage::Early)?;
        self.populate(range)
    }

    /// Stage two: the remainder of physical memory.
    ///
    /// # Errors
    /// [`BootError`] if the range is invalid or the stage is out of order.
    pub fn boot_full(&mut self, range: FrameRange) -> Result<usize, BootError> {
        self.advance(BootStage::Early, BootStage::Full)?;
        self.populate(range)
    }

    /// Finish booting. The allocator may now be shared between CPUs.
    ///
    /// # Errors
    /// [`BootError::OutOfOrder`] unless both population stages have run.
    pub fn go_online(&mut self) -> Result<(), BootError> {
        self.advance(BootStage::Full, BootStage::Online)?;
        info!(
            "frame allocator online: {} frames free, {} KiB",
            self.total,
            self.total as u64 * PAGE_SIZE / 1024
        );
        Ok(())
    }

    #[must_use]
    pub const fn stage(&self) -> BootStage {
        self.stage
    }

    #[must_use]
    pub const fn layout(&self) -> &PoolLayout {
        &self.layout
    }

    #[must_use]
    pub const fn mapper(&self) -> &M {
        &self.mapper
    }

    fn advance(&mut self, from: BootStage, to: BootStage) -> Result<(), BootError> {
        if self.stage != from {
            return Err(BootError::OutOfOrder(to));
        }
        self.stage = to;
        Ok(())
    }

    fn populate(&mut self, range: FrameRange) -> Result<usize, BootError> {
        let (start, end) = (range.start, range.end);
        if !start.is_page_aligned() || !end.is_page_aligned() {
            return Err(BootError::Unaligned(start, end));
        }
        if start > end
            || start < self.layout.base()
            || end > self.layout.phys_top
        {
            return Err(BootError::OutsidePhysicalRange(start, end));
        }
        if self.ranges.iter().any(|r| r.overlaps(&range)) {
            return Err(BootError::Overlap(start, end));
        }

        let free = self.free.get_mut();
        let mut added = 0;
        let mut pa = start;
        while pa < end {
            let page = pa.page();
            self.mapper.fill(page, SCRUB_PATTERN);
            free.push(FrameIndex::of_page(page))
                .map_err(|()| BootError::Overlap(start, end))?;
            added += 1;
            pa += PAGE_SIZE;
        }

        if !range.is_empty() {
            self.ranges.push(range);
        }
        self.total += added;
        debug!("{:?}: added {added} frames from {start}..{end}", self.stage);
        Ok(added)
    }

    /// Validate a physical address and return its frame.
    ///
    /// # Errors
    /// [`InvariantViolation::Misaligned`] or [`InvariantViolation::OutOfRange`].
    pub fn frame_of(&self, pa: PhysicalAddress) -> Result<FrameIndex, InvariantViolation> {
        if !pa.is_page_aligned() {
            return Err(violation(InvariantViolation::Misaligned(pa)));
        }
        if !self.ranges.iter().any(|r| r.start <= pa && pa < r.end) {
            return Err(violation(InvariantViolation::OutOfRange(pa)));
        }
        Ok(FrameIndex::of_page(pa.page()))
    }

    /// Take one frame off the free list with a reference count of 1.
    ///
    /// The frame holds [`SCRUB_PATTERN`] bytes; callers that hand it to user
    /// space zero or overwrite it first.
    ///
    /// # Errors
    /// [`FrameAllocError::Exhausted`] when the pool is empty.
    pub fn allocate(&self) -> Result<FrameIndex, FrameAllocError> {
        let Some(frame) = self.free.lock().pop() else {
            warn!("frame pool exhausted");
            return Err(FrameAllocError::Exhausted);
        };

        let mut refs = self.refs.lock();
        debug_assert_eq!(refs.get(frame), 0, "free frame {frame} had references");
        refs.set(frame, 1);
        drop(refs);

        trace!("allocate {frame:?}");
        Ok(frame)
    }

    /// Add a reference to an allocated frame.
    ///
    /// # Errors
    /// [`InvariantViolation::NotAllocated`] for a free frame,
    /// [`InvariantViolation::RefCountOverflow`] if the count saturates.
    pub fn retain(&self, frame: FrameIndex) -> Result<u32, InvariantViolation> {
        let mut refs = self.refs.lock();
        if refs.get(frame) == 0 {
            drop(refs);
            return Err(violation(InvariantViolation::NotAllocated(frame)));
        }
        let count = refs.increment(frame);
        drop(refs);

        let count = count.ok_or_else(|| violation(InvariantViolation::RefCountOverflow(frame)))?;
        trace!("retain {frame:?} -> {count}");
        Ok(count)
    }

    /// Drop one reference; the last one scrubs the frame and frees it.
    ///
    /// # Errors
    /// [`InvariantViolation::NotAllocated`] if the count is already zero,
    /// [`InvariantViolation::DoubleFree`] if the frame is somehow still on
    /// the free list.
    pub fn release(&self, frame: FrameIndex) -> Result<Released, InvariantViolation> {
        let remaining = self.refs.lock().decrement(frame);
        let Some(remaining) = remaining else {
            return Err(violation(InvariantViolation::NotAllocated(frame)));
        };

        if remaining > 0 {
            trace!("release {frame:?} -> {remaining}");
            return Ok(Released::StillShared(remaining));
        }

        self.mapper.fill(frame.page(), SCRUB_PATTERN);
        self.free
            .lock()
            .push(frame)
            .map_err(|()| violation(InvariantViolation::DoubleFree(frame)))?;
        trace!("release {frame:?} -> free");
        Ok(Released::Freed)
    }

    /// [`release`](Self::release) by physical address.
    ///
    /// # Errors
    /// Address validation errors from [`frame_of`](Self::frame_of), then
    /// those of [`release`](Self::release).
    pub fn release_address(&self, pa: PhysicalAddress) -> Result<Released, InvariantViolation> {
        let frame = self.frame_of(pa)?;
        self.release(frame)
    }

    /// Current reference count of `frame`.
    #[must_use]
    pub fn ref_count(&self, frame: FrameIndex) -> u32 {
        self.refs.lock().get(frame)
    }

    /// Frames currently on the free list.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free.lock().len()
    }

    /// Frames handed to the pool during boot.
    #[must_use]
    pub const fn total_frames(&self) -> usize {
        self.total
    }

    /// Frames with a non-zero reference count.
    #[must_use]
    pub fn allocated_count(&self) -> usize {
        self.refs.lock().referenced()
    }

    /// Copy bytes out of a frame.
    pub fn read_frame(&self, frame: FrameIndex, offset: usize, buf: &mut [u8]) {
        self.mapper.read(frame.page(), offset, buf);
    }

    /// Copy bytes into a frame.
    pub fn write_frame(&self, frame: FrameIndex, offset: usize, data: &[u8]) {
        self.mapper.write(frame.page(), offset, data);
    }

    /// Duplicate the full contents of `src` into `dst`.
    pub fn copy_frame(&self, src: FrameIndex, dst: FrameIndex) {
        self.mapper.copy_page(src.page(), dst.page());
    }

    pub fn zero_frame(&self, frame: FrameIndex) {
        self.mapper.fill(frame.page(), 0);
    }

    /// A full copy of the frame, mostly useful in tests.
    #[must_use]
    pub fn snapshot(&self, frame: FrameIndex) -> [u8; FRAME_BYTES] {
        let mut bytes = [0u8; FRAME_BYTES];
        self.read_frame(frame, 0, &mut bytes);
        bytes
    }
}

#[cold]
fn violation(v: InvariantViolation) -> InvariantViolation {
    error!("frame allocator invariant violated: {v}");
    v
}
