//! # Physical Frame Access
//!
//! The allocator has to touch frame *contents*: freed frames are scrubbed,
//! demand-paged frames are zeroed, copy-on-write copies bytes from one frame
//! into another. Code can only dereference virtual addresses, so the way a
//! physical frame becomes reachable is abstracted by [`PhysMapper`].
//!
//! ## Implementations
//! - [`DirectMapPhysMapper`]: every physical address `pa` is visible at
//!   `offset + pa` (a higher-half direct map in the kernel proper).
//! - [`ArenaPhysMapper`]: frames live in heap storage with one lock per
//!   frame. Used by hosted builds, the simulator and the tests. Untouched and
//!   scrubbed frames cost no memory.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::ptr;
use kernel_info::memory::{PoolLayout, SCRUB_PATTERN};
use kernel_memory_addresses::{PAGE_SIZE, PhysicalPage};
use kernel_sync::SpinLock;

/// Frame size as a `usize`, for buffer lengths.
pub const FRAME_BYTES: usize = PAGE_SIZE as usize;

/// Byte-level access to physical frames.
///
/// `offset + len` of every call must stay within one frame; implementations
/// panic otherwise, the same way an out-of-bounds slice index does.
pub trait PhysMapper {
    /// Copy bytes out of `page` starting at `offset`.
    fn read(&self, page: PhysicalPage, offset: usize, buf: &mut [u8]);

    /// Copy `data` into `page` starting at `offset`.
    fn write(&self, page: PhysicalPage, offset: usize, data: &[u8]);

    /// Overwrite the whole frame with `byte`.
    fn fill(&self, page: PhysicalPage, byte: u8);

    /// Duplicate the contents of `src` into `dst`.
    fn copy_page(&self, src: PhysicalPage, dst: PhysicalPage) {
        let mut buf = [0u8; FRAME_BYTES];
        self.read(src, 0, &mut buf);
        self.write(dst, 0, &buf);
    }
}

#[inline]
fn check_span(offset: usize, len: usize) {
    assert!(
        offset.checked_add(len).is_some_and(|end| end <= FRAME_BYTES),
        "frame access {offset}+{len} crosses the frame boundary"
    );
}

/// [`PhysMapper`] for kernels that map all of physical memory at a fixed offset.
pub struct DirectMapPhysMapper {
    offset: u64,
}

impl DirectMapPhysMapper {
    /// # Safety
    /// - Every frame the allocator manages must be mapped writable at
    ///   `offset + pa` for as long as this mapper is used.
    /// - Nothing else may hold Rust references into those frames.
    #[must_use]
    pub const unsafe fn new(offset: u64) -> Self {
        Self { offset }
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    fn frame_ptr(&self, page: PhysicalPage) -> *mut u8 {
        ptr::with_exposed_provenance_mut(self.offset.wrapping_add(page.base().as_u64()) as usize)
    }
}

impl PhysMapper for DirectMapPhysMapper {
    fn read(&self, page: PhysicalPage, offset: usize, buf: &mut [u8]) {
        check_span(offset, buf.len());
        // SAFETY: the constructor contract makes the whole frame readable.
        unsafe {
            ptr::copy_nonoverlapping(self.frame_ptr(page).add(offset), buf.as_mut_ptr(), buf.len());
        }
    }

    fn write(&self, page: PhysicalPage, offset: usize, data: &[u8]) {
        check_span(offset, data.len());
        // SAFETY: the constructor contract makes the whole frame writable.
        unsafe {
            ptr::copy_nonoverlapping(data.as_ptr(), self.frame_ptr(page).add(offset), data.len());
        }
    }

    fn fill(&self, page: PhysicalPage, byte: u8) {
        // SAFETY: see `write`.
        unsafe { ptr::write_bytes(self.frame_ptr(page), byte, FRAME_BYTES) }
    }
}

type FrameBytes = [u8; FRAME_BYTES];

/// Heap-backed physical memory.
///
/// A frame slot is `None` while its contents equal [`SCRUB_PATTERN`]
/// everywhere, which is the state of every frame after boot and after it
/// returns to the free list.
pub struct ArenaPhysMapper {
    first: u64,
    frames: Vec<SpinLock<Option<Box<FrameBytes>>>>,
}

impl ArenaPhysMapper {
    /// Arena for `count` frames starting at `first`.
    #[must_use]
    pub fn new(first: PhysicalPage, count: usize) -> Self {
        let mut frames = Vec::with_capacity(count);
        frames.resize_with(count, || SpinLock::new(None));
        Self {
            first: first.number(),
            frames,
        }
    }

    /// Arena covering every frame between the lowest managed address and the
    /// physical top of `layout`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn for_layout(layout: &PoolLayout) -> Self {
        let first = layout.base().page();
        let count = layout.index_space().saturating_sub(first.number());
        Self::new(first, count as usize)
    }

    /// Number of frames holding bytes other than the scrub pattern.
    #[must_use]
    pub fn materialized(&self) -> usize {
        self.frames.iter().filter(|f| f.lock().is_some()).count()
    }

    #[allow(clippy::cast_possible_truncation)]
    fn slot(&self, page: PhysicalPage) -> &SpinLock<Option<Box<FrameBytes>>> {
        let i = page.number().wrapping_sub(self.first) as usize;
        match self.frames.get(i) {
            Some(slot) => slot,
            None => panic!("physical page {page} is outside the arena"),
        }
    }
}

impl PhysMapper for ArenaPhysMapper {
    fn read(&self, page: PhysicalPage, offset: usize, buf: &mut [u8]) {
        check_span(offset, buf.len());
        match &*self.slot(page).lock() {
            Some(bytes) => buf.copy_from_slice(&bytes[offset..offset + buf.len()]),
            None => buf.fill(SCRUB_PATTERN),
        }
    }

    fn write(&self, page: PhysicalPage, offset: usize, data: &[u8]) {
        check_span(offset, data.len());
        let mut slot = self.slot(page).lock();
        let bytes = slot.get_or_insert_with(|| Box::new([SCRUB_PATTERN; FRAME_BYTES]));
        bytes[offset..offset + data.len()].copy_from_slice(data);
    }

    fn fill(&self, page: PhysicalPage, byte: u8) {
        let mut slot = self.slot(page).lock();
        if byte == SCRUB_PATTERN {
            *slot = None;
        } else {
            match slot.as_mut() {
                Some(bytes) => bytes.fill(byte),
                None => *slot = Some(Box::new([byte; FRAME_BYTES])),
            }
        }
    }
}
