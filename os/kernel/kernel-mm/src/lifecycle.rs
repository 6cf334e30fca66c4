//! Process creation, eager growth and teardown.

use crate::memory::UserMemory;
use crate::{MemoryManager, MmError};
use alloc::vec::Vec;
use kernel_alloc::PhysMapper;
use kernel_info::memory::USER_TOP;
use kernel_memory_addresses::{PAGE_SIZE, VirtualAddress, page_round_up};
use kernel_vmem::PageEntryBits;
use log::{debug, warn};

impl<M: PhysMapper> MemoryManager<'_, M> {
    /// An empty process: no pages, size zero.
    #[must_use]
    pub fn fresh(&self) -> UserMemory {
        UserMemory::new(self.next_pid())
    }

    /// A process with `image_pages` eagerly mapped, zeroed pages, standing in
    /// for a loaded program image.
    ///
    /// # Errors
    /// [`MmError::OutOfMemory`] or [`MmError::AddressSpaceExhausted`].
    pub fn spawn(&self, image_pages: u64) -> Result<UserMemory, MmError> {
        let mut mem = self.fresh();
        let bytes = image_pages
            .checked_mul(PAGE_SIZE)
            .and_then(|b| i64::try_from(b).ok())
            .ok_or(MmError::AddressSpaceExhausted)?;
        if bytes > 0 {
            self.grow(&mut mem, bytes)?;
        }
        debug!("{}: spawned with {image_pages} pages", mem.pid);
        Ok(mem)
    }

    /// Change the size of the process by `delta` bytes, mapping or releasing
    /// whole pages eagerly. Returns the old size.
    ///
    /// Growing maps zeroed writable pages for every page newly covered by the
    /// size; if the pool runs dry half way, the pages mapped by this call are
    /// released again. Shrinking releases every page above the new size and
    /// drops reservations beyond it.
    ///
    /// # Errors
    /// - [`MmError::OutOfMemory`] when growing and the pool is exhausted.
    /// - [`MmError::AddressSpaceExhausted`] if the size would reach the
    ///   shared page.
    /// - [`MmError::InvalidLength`] when shrinking below zero.
    pub fn grow(&self, mem: &mut UserMemory, delta: i64) -> Result<VirtualAddress, MmError> {
        let old = mem.size;
        let new = old.checked_add_signed(delta).ok_or(if delta > 0 {
            MmError::AddressSpaceExhausted
        } else {
            MmError::InvalidLength(delta)
        })?;

        if delta > 0 {
            if new > USER_TOP {
                return Err(MmError::AddressSpaceExhausted);
            }
            self.map_eager(mem, old, new)?;
        } else if delta < 0 {
            self.unmap_above(mem, new)?;
            mem.reserved.truncate(new);
        }

        mem.size = new;
        debug!("{}: size {old:#x} -> {new:#x}", mem.pid);
        Ok(VirtualAddress::new(old))
    }

    fn map_eager(&self, mem: &mut UserMemory, old: u64, new: u64) -> Result<(), MmError> {
        let first = page_round_up(old).ok_or(MmError::AddressSpaceExhausted)?;
        let end = page_round_up(new).ok_or(MmError::AddressSpaceExhausted)?;

        let mut va = first;
        while va < end {
            if let Err(e) = self.map_zeroed(mem, VirtualAddress::new(va)) {
                warn!("{}: grow to {new:#x} failed: {e}", mem.pid);
                self.unmap_range(mem, first, va)?;
                return Err(e);
            }
            va += PAGE_SIZE;
        }
        Ok(())
    }

    fn map_zeroed(&self, mem: &mut UserMemory, va: VirtualAddress) -> Result<(), MmError> {
        let frame = self.frames.allocate()?;
        self.frames.zero_frame(frame);
        if let Err(e) = mem.space.map(va, frame.page(), PageEntryBits::user_rw()) {
            self.frames.release(frame)?;
            return Err(e.into());
        }
        Ok(())
    }

    fn unmap_above(&self, mem: &mut UserMemory, size: u64) -> Result<usize, MmError> {
        let start = page_round_up(size).ok_or(MmError::AddressSpaceExhausted)?;
        self.unmap_range(mem, start, USER_TOP)
    }

    /// Unmap and release every present page in `[start, end)`. Returns how
    /// many frames went back to the pool.
    fn unmap_range(&self, mem: &mut UserMemory, start: u64, end: u64) -> Result<usize, MmError> {
        let victims: Vec<_> = mem
            .space
            .mappings()
            .map(|(page, _)| page.base())
            .filter(|va| (start..end).contains(&va.as_u64()))
            .collect();

        let mut freed = 0;
        for va in victims {
            if let Some(e) = mem.space.unmap(va) {
                let frame = self.frame_of(e)?;
                if self.frames.release(frame)?.is_freed() {
                    freed += 1;
                }
            }
        }
        Ok(freed)
    }

    /// Release everything the process holds. Returns the number of frames
    /// that went back to the pool.
    ///
    /// # Errors
    /// Fatal allocator errors only.
    pub fn exit(&self, mem: &mut UserMemory) -> Result<usize, MmError> {
        let pid = mem.pid;
        let freed = self.teardown(mem)?;
        debug!("{pid}: exited, {freed} frames freed");
        Ok(freed)
    }

    pub(crate) fn teardown(&self, mem: &mut UserMemory) -> Result<usize, MmError> {
        let freed = self.unmap_range(mem, 0, u64::MAX)?;
        mem.space.clear();
        mem.reserved.clear();
        mem.shared = None;
        mem.size = 0;
        Ok(freed)
    }
}
