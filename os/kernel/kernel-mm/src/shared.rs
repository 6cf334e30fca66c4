//! # Family Shared Page
//!
//! One page of memory shared by a process (the creator) and its direct
//! children, always at [`SHARED_PAGE_VA`](kernel_info::memory::SHARED_PAGE_VA).
//!
//! ```text
//!   creator (gen 0) ── fork ──► child (gen 1) ── fork ──► grandchild: no grant
//!          │                         │
//!          └──── same frame, writable, never copy-on-write ────┘
//! ```
//!
//! Every holder carries one reference on the frame, so the page survives
//! until the last member releases it or exits.

use crate::memory::{SharedSlot, UserMemory};
use crate::{MemoryManager, MmError};
use kernel_alloc::{PhysMapper, Released};
use kernel_info::memory::shared_page_va;
use kernel_memory_addresses::VirtualAddress;
use kernel_vmem::{MapError, PageEntryBits};
use log::{debug, warn};

impl<M: PhysMapper> MemoryManager<'_, M> {
    /// Map a fresh zeroed shared page, or return the existing one.
    ///
    /// # Errors
    /// [`MmError::OutOfMemory`] if no frame is left.
    pub fn create_shared(&self, mem: &mut UserMemory) -> Result<VirtualAddress, MmError> {
        if let Some(va) = mem.lookup_shared() {
            return Ok(va);
        }

        let frame = self.frames.allocate().inspect_err(|_| {
            warn!("{}: no frame for shared page", mem.pid);
        })?;
        self.frames.zero_frame(frame);

        let va = shared_page_va();
        if let Err(e) = mem.space.map(va, frame.page(), PageEntryBits::user_shared()) {
            self.frames.release(frame)?;
            return Err(e.into());
        }
        mem.shared = Some(SharedSlot {
            frame,
            generation: 0,
        });
        debug!("{}: created shared page {frame}", mem.pid);
        Ok(va)
    }

    /// Unmap the shared page and drop this process's reference.
    ///
    /// The frame returns to the pool only if no other family member still
    /// maps it.
    ///
    /// # Errors
    /// [`MmError::NoSharedMapping`] if the process holds no grant.
    pub fn release_shared(&self, mem: &mut UserMemory) -> Result<Released, MmError> {
        let slot = mem.shared.take().ok_or(MmError::NoSharedMapping)?;
        mem.space
            .unmap(slot.va())
            .ok_or(MmError::PageTable(MapError::NotMapped(slot.va())))?;
        let released = self.frames.release(slot.frame)?;
        debug!("{}: released shared page {} ({released:?})", mem.pid, slot.frame);
        Ok(released)
    }
}
